use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::flashscore::{FixtureSummary, MatchDataSource};
use crate::prediction::{Prediction, prediction_key};
use crate::probability::{ProbabilityEngine, consensus, fair_odds};
use crate::registry::Registry;
use crate::team_stats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceFilters {
    pub min_probability: f64,
    pub min_bookmaker_odds: f64,
    pub max_bookmaker_odds: f64,
    pub min_fair_odds: f64,
    pub max_fair_odds: f64,
}

impl Default for AcceptanceFilters {
    fn default() -> Self {
        Self {
            min_probability: 0.01,
            min_bookmaker_odds: 1.70,
            max_bookmaker_odds: 100.0,
            min_fair_odds: 1.00,
            max_fair_odds: 100.0,
        }
    }
}

impl AcceptanceFilters {
    /// All bounds are inclusive.
    pub fn accepts(&self, probability: f64, bookmaker_odds: f64, fair: f64) -> bool {
        probability >= self.min_probability
            && (self.min_bookmaker_odds..=self.max_bookmaker_odds).contains(&bookmaker_odds)
            && (self.min_fair_odds..=self.max_fair_odds).contains(&fair)
    }
}

pub struct MatchAnalysisPipeline {
    source: Arc<dyn MatchDataSource>,
    engine: ProbabilityEngine,
    filters: AcceptanceFilters,
    registry: Registry,
    day_offset: i32,
    parallelism: usize,
}

impl MatchAnalysisPipeline {
    pub fn new(
        source: Arc<dyn MatchDataSource>,
        engine: ProbabilityEngine,
        filters: AcceptanceFilters,
        registry: Registry,
    ) -> Self {
        Self {
            source,
            engine,
            filters,
            registry,
            day_offset: 0,
            parallelism: 1,
        }
    }

    pub fn with_day_offset(mut self, day_offset: i32) -> Self {
        self.day_offset = day_offset;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Lists fixtures, analyses each one that has not kicked off yet, and
    /// inserts accepted predictions into the registry. Returns only the
    /// predictions this pass inserted, in fixture order.
    pub fn run_once(&self, now: DateTime<Utc>) -> Vec<Prediction> {
        let fixtures = match self.source.list_fixtures(self.day_offset) {
            Ok(fixtures) => fixtures,
            Err(err) => {
                warn!(error = %err, "fixture list unavailable");
                return Vec::new();
            }
        };
        let total = fixtures.len();
        let pending: Vec<FixtureSummary> = fixtures
            .into_iter()
            .filter(|f| f.kickoff > now)
            .collect();
        debug!(total, pending = pending.len(), "fixtures listed");

        let candidates: Vec<Prediction> = with_fetch_pool(self.parallelism, || {
            pending
                .par_iter()
                .filter_map(|fixture| self.assess_fixture(fixture))
                .collect()
        });

        let mut accepted = Vec::new();
        for prediction in candidates {
            if self.registry.insert_if_absent(prediction.clone()) {
                info!(
                    key = %prediction.key,
                    probability = prediction.consensus_probability,
                    odds = prediction.bookmaker_odds,
                    "prediction accepted"
                );
                accepted.push(prediction);
            } else {
                debug!(key = %prediction.key, "already tracked");
            }
        }
        accepted
    }

    /// Runs one fixture through every step. `None` is a skip, logged at
    /// debug level with its reason.
    pub fn assess_fixture(&self, fixture: &FixtureSummary) -> Option<Prediction> {
        let id = fixture.id.as_str();
        let key = prediction_key(&fixture.home, &fixture.away, fixture.kickoff);
        if self.registry.contains(&key) {
            debug!(fixture = id, %key, "skip: already tracked");
            return None;
        }

        let recent = match self.source.fetch_recent_matches(id) {
            Ok(recent) => recent,
            Err(err) => {
                debug!(fixture = id, error = %err, "skip: history unavailable");
                return None;
            }
        };
        let home = team_stats::extract(&recent.home, &fixture.home)?;
        let away = team_stats::extract(&recent.away, &fixture.away)?;

        if !self.engine.is_sufficient(&home, &away) {
            debug!(fixture = id, "skip: insufficient history");
            return None;
        }
        let estimates = self.engine.evaluate(&home, &away);
        let Some(probability) = consensus(&estimates) else {
            debug!(fixture = id, "skip: no estimates");
            return None;
        };

        let bookmaker_odds = match self.source.fetch_odds(id) {
            Ok(Some(odds)) => odds,
            Ok(None) => {
                debug!(fixture = id, "skip: no over 2.5 market");
                return None;
            }
            Err(err) => {
                debug!(fixture = id, error = %err, "skip: odds unavailable");
                return None;
            }
        };

        let fair = fair_odds(probability);
        if !self.filters.accepts(probability, bookmaker_odds, fair) {
            debug!(
                fixture = id,
                probability, bookmaker_odds, fair, "skip: filtered out"
            );
            return None;
        }

        Some(Prediction::upcoming(
            id,
            &fixture.league,
            &fixture.home,
            &fixture.away,
            fixture.kickoff,
            &estimates,
            probability,
            fair,
            bookmaker_odds,
        ))
    }
}

fn with_fetch_pool<T>(threads: usize, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(action),
        Err(_) => action(),
    }
}
