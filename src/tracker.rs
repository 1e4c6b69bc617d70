use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::flashscore::MatchDataSource;
use crate::notify::PredictionSink;
use crate::prediction::{BetOutcome, Settlement};
use crate::registry::Registry;
use crate::results_store::ResultsStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub checked: usize,
    pub finished: usize,
    pub unavailable: usize,
    pub pruned: usize,
}

/// Moves tracked predictions from upcoming to finished as live results come
/// in, and evicts entries past the retention window.
pub struct MatchLifecycleTracker {
    source: Arc<dyn MatchDataSource>,
    registry: Registry,
    sink: Arc<dyn PredictionSink>,
    store: Option<Arc<dyn ResultsStore>>,
    retention: Duration,
}

impl MatchLifecycleTracker {
    pub fn new(
        source: Arc<dyn MatchDataSource>,
        registry: Registry,
        sink: Arc<dyn PredictionSink>,
        retention: Duration,
    ) -> Self {
        Self {
            source,
            registry,
            sink,
            store: None,
            retention,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResultsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn reconcile(&self, now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for prediction in self.registry.upcoming() {
            report.checked += 1;
            let live = match self.source.fetch_live_state(&prediction.fixture_id) {
                Ok(live) => live,
                Err(err) => {
                    warn!(key = %prediction.key, error = %err, "live state unavailable");
                    report.unavailable += 1;
                    continue;
                }
            };
            if !live.is_finished() {
                debug!(key = %prediction.key, status = ?live.status, "not finished yet");
                continue;
            }

            let settlement = Settlement {
                score: live.score.clone(),
                outcome: BetOutcome::from_scores(live.home_score, live.away_score),
            };
            // The registry decides; a concurrent pass that got there first
            // leaves nothing to do here.
            let Some(settled) = self.registry.settle(&prediction.key, settlement) else {
                continue;
            };
            report.finished += 1;
            info!(
                key = %settled.key,
                score = settled.settled_score.as_deref().unwrap_or("-"),
                outcome = settled.bet_outcome.map(|o| o.label()).unwrap_or("unknown"),
                "prediction settled"
            );
            self.sink.on_prediction_finished(&settled);

            if let (Some(store), Some(_)) = (&self.store, &settled.settled_score) {
                match store.record(&settled) {
                    Ok(true) => debug!(key = %settled.key, "result stored"),
                    Ok(false) => debug!(key = %settled.key, "result already stored"),
                    Err(err) => warn!(key = %settled.key, error = %err, "result store failed"),
                }
            }
        }

        let pruned = self.registry.prune(now, self.retention);
        if !pruned.is_empty() {
            info!(count = pruned.len(), "pruned stale predictions");
        }
        report.pruned = pruned.len();
        report
    }
}
