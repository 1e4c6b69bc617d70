#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};

use totals_scout::flashscore::{FixtureSummary, LiveState, MatchDataSource, RecentMatches};
use totals_scout::notify::PredictionSink;
use totals_scout::prediction::Prediction;
use totals_scout::results_store::ResultsStore;
use totals_scout::retry::FetchError;
use totals_scout::team_stats::RawMatchRecord;

/// In-memory source keyed by fixture id. Unknown ids are unavailable.
#[derive(Default)]
pub struct FakeSource {
    pub fixtures: Vec<FixtureSummary>,
    pub history: HashMap<String, RecentMatches>,
    pub odds: HashMap<String, Option<f64>>,
    pub live: Mutex<HashMap<String, LiveState>>,
    pub live_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FakeSource {
    pub fn set_live(&self, id: &str, live: LiveState) {
        self.live.lock().unwrap().insert(id.to_string(), live);
    }
}

impl MatchDataSource for FakeSource {
    fn list_fixtures(&self, _day_offset: i32) -> Result<Vec<FixtureSummary>, FetchError> {
        Ok(self.fixtures.clone())
    }

    fn fetch_recent_matches(&self, fixture_id: &str) -> Result<RecentMatches, FetchError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.history.get(fixture_id).cloned().ok_or(FetchError::Exhausted {
            attempts: 3,
            last: Box::new(FetchError::Timeout),
        })
    }

    fn fetch_odds(&self, fixture_id: &str) -> Result<Option<f64>, FetchError> {
        self.odds
            .get(fixture_id)
            .copied()
            .ok_or(FetchError::Status(503))
    }

    fn fetch_live_state(&self, fixture_id: &str) -> Result<LiveState, FetchError> {
        self.live_calls.fetch_add(1, Ordering::SeqCst);
        self.live
            .lock()
            .unwrap()
            .get(fixture_id)
            .cloned()
            .ok_or(FetchError::Timeout)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub new: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<Prediction>>,
}

impl PredictionSink for RecordingSink {
    fn on_new_prediction(&self, prediction: &Prediction) {
        self.new.lock().unwrap().push(prediction.key.clone());
    }

    fn on_prediction_finished(&self, prediction: &Prediction) {
        self.finished.lock().unwrap().push(prediction.clone());
    }
}

#[derive(Default)]
pub struct CountingStore {
    pub recorded: Mutex<Vec<String>>,
}

impl ResultsStore for CountingStore {
    fn record(&self, prediction: &Prediction) -> anyhow::Result<bool> {
        self.recorded.lock().unwrap().push(prediction.key.clone());
        Ok(true)
    }
}

pub fn now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_893_400_000, 0).unwrap()
}

pub fn fixture(id: &str, home: &str, away: &str, kickoff: DateTime<Utc>) -> FixtureSummary {
    FixtureSummary {
        id: id.to_string(),
        home: home.to_string(),
        away: away.to_string(),
        kickoff,
        league: "ENGLAND: Premier League".to_string(),
    }
}

/// `n` results alternating home and away, each one ending `scored:conceded`
/// for the team in question.
pub fn history(n: usize, scored: u32, conceded: u32) -> Vec<RawMatchRecord> {
    (0..n)
        .map(|i| {
            let home = i % 2 == 0;
            RawMatchRecord {
                home_team: Some("X".to_string()),
                away_team: Some("Y".to_string()),
                home_goals: Some(if home { scored } else { conceded }),
                away_goals: Some(if home { conceded } else { scored }),
                venue_tag: Some(if home { "home" } else { "away" }.to_string()),
            }
        })
        .collect()
}

pub fn goal_rich() -> RecentMatches {
    RecentMatches {
        home: history(10, 2, 2),
        away: history(10, 3, 1),
    }
}

pub fn hours(n: i64) -> Duration {
    Duration::hours(n)
}
