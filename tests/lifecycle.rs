mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Duration;

use totals_scout::flashscore::{LiveState, MatchStatus};
use totals_scout::prediction::{BetOutcome, Prediction, PredictionStatus};
use totals_scout::registry::Registry;
use totals_scout::tracker::{MatchLifecycleTracker, ReconcileReport};

use common::{CountingStore, FakeSource, RecordingSink, hours, now};

fn tracked(id: &str, home: &str, hours_from_now: i64) -> Prediction {
    Prediction::upcoming(
        id,
        "ENGLAND: Premier League",
        home,
        "Opponent",
        now() + hours(hours_from_now),
        &[],
        0.8,
        1.25,
        1.9,
    )
}

fn finished(home: Option<u32>, away: Option<u32>) -> LiveState {
    LiveState {
        score: match (home, away) {
            (Some(h), Some(a)) => Some(format!("{h}:{a}")),
            _ => None,
        },
        status: Some(MatchStatus::Finished),
        home_score: home,
        away_score: away,
    }
}

struct Harness {
    source: Arc<FakeSource>,
    registry: Registry,
    sink: Arc<RecordingSink>,
    store: Arc<CountingStore>,
    tracker: MatchLifecycleTracker,
}

fn harness() -> Harness {
    let source = Arc::new(FakeSource::default());
    let registry = Registry::new();
    let sink = Arc::new(RecordingSink::default());
    let store = Arc::new(CountingStore::default());
    let tracker =
        MatchLifecycleTracker::new(source.clone(), registry.clone(), sink.clone(), Duration::days(2))
            .with_store(store.clone());
    Harness {
        source,
        registry,
        sink,
        store,
        tracker,
    }
}

#[test]
fn settlement_follows_three_goal_rule() {
    let h = harness();
    let cases = [
        ("two", Some(1), Some(1), BetOutcome::Under),
        ("three", Some(2), Some(1), BetOutcome::Over),
        ("four", Some(2), Some(2), BetOutcome::Over),
        ("none", None, None, BetOutcome::Unknown),
    ];
    for (id, home, away, _) in &cases {
        h.registry.insert_if_absent(tracked(id, id, -3));
        h.source.set_live(id, finished(*home, *away));
    }

    let report = h.tracker.reconcile(now());
    assert_eq!(report.finished, 4);

    for (id, _, _, outcome) in &cases {
        let p = h
            .registry
            .snapshot()
            .into_iter()
            .find(|p| p.fixture_id == *id)
            .unwrap();
        assert_eq!(p.status, PredictionStatus::Finished);
        assert_eq!(p.bet_outcome, Some(*outcome), "{id}");
    }
    let four = h
        .registry
        .snapshot()
        .into_iter()
        .find(|p| p.fixture_id == "four")
        .unwrap();
    assert_eq!(four.settled_score.as_deref(), Some("2:2"));

    // Only results with a score reach the store.
    assert_eq!(h.store.recorded.lock().unwrap().len(), 3);
    assert_eq!(h.sink.finished.lock().unwrap().len(), 4);
}

#[test]
fn finished_prediction_is_left_alone() {
    let h = harness();
    let p = tracked("f1", "Arsenal", -3);
    let key = p.key.clone();
    h.registry.insert_if_absent(p);
    h.source.set_live("f1", finished(Some(2), Some(0)));

    h.tracker.reconcile(now());
    // A later, different feed answer changes nothing.
    h.source.set_live("f1", finished(Some(0), Some(0)));
    let second = h.tracker.reconcile(now());

    assert_eq!(second.checked, 0);
    assert_eq!(second.finished, 0);
    assert_eq!(h.source.live_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.recorded.lock().unwrap().len(), 1);
    assert_eq!(h.sink.finished.lock().unwrap().len(), 1);
    let settled = h.registry.get(&key).unwrap();
    assert_eq!(settled.settled_score.as_deref(), Some("2:0"));
    assert_eq!(settled.bet_outcome, Some(BetOutcome::Under));
}

#[test]
fn running_and_unreachable_matches_stay_upcoming() {
    let h = harness();
    h.registry.insert_if_absent(tracked("live", "Live", -1));
    h.registry.insert_if_absent(tracked("offline", "Offline", -1));
    h.source.set_live(
        "live",
        LiveState {
            score: Some("1:0".into()),
            status: Some(MatchStatus::Halftime),
            home_score: Some(1),
            away_score: Some(0),
        },
    );

    let report = h.tracker.reconcile(now());
    assert_eq!(
        report,
        ReconcileReport {
            checked: 2,
            finished: 0,
            unavailable: 1,
            pruned: 0,
        }
    );
    assert_eq!(h.registry.upcoming().len(), 2);
    assert!(h.sink.finished.lock().unwrap().is_empty());
}

#[test]
fn stale_entries_are_pruned_whatever_their_status() {
    let h = harness();
    h.registry.insert_if_absent(tracked("old-upcoming", "OldA", -60));
    h.registry.insert_if_absent(tracked("old-finished", "OldB", -50));
    h.registry.insert_if_absent(tracked("recent", "Recent", -2));
    h.source.set_live("old-finished", finished(Some(3), Some(0)));

    let report = h.tracker.reconcile(now());
    assert_eq!(report.pruned, 2);
    let left: Vec<String> = h
        .registry
        .snapshot()
        .into_iter()
        .map(|p| p.fixture_id)
        .collect();
    assert_eq!(left, vec!["recent".to_string()]);
}
