use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use totals_scout::config::ScoutConfig;
use totals_scout::flashscore::{FlashscoreSource, MatchDataSource};
use totals_scout::notify::{ChannelSink, Notice, PredictionSink};
use totals_scout::persist;
use totals_scout::pipeline::MatchAnalysisPipeline;
use totals_scout::probability::ProbabilityEngine;
use totals_scout::registry::Registry;
use totals_scout::results_store::{ResultsStore, SqliteResultsStore};
use totals_scout::retry::ResilientFetcher;
use totals_scout::scheduler::spawn_periodic;
use totals_scout::tracker::MatchLifecycleTracker;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let config = ScoutConfig::from_env();
    info!(
        gate = ?config.gate,
        day_offset = config.day_offset,
        parallelism = config.parallelism,
        fetch_worst_case = ?config.retry.worst_case(),
        "starting totals scout"
    );

    let registry_path = config
        .registry_persist
        .then(persist::default_registry_path)
        .flatten();
    let registry = match &registry_path {
        Some(path) => persist::load_registry(path),
        None => Registry::new(),
    };
    info!(tracked = registry.len(), "registry ready");

    let store = open_store(&config);

    let (tx, rx) = mpsc::channel::<Notice>();
    let sink: Arc<dyn PredictionSink> = Arc::new(ChannelSink::new(tx));
    let notifier = thread::Builder::new()
        .name("notifier".to_string())
        .spawn(move || {
            for notice in rx {
                info!(route = notice.routing_key(), "\n{}", notice.payload());
            }
        })
        .context("spawn notifier thread")?;

    // Each task gets its own source so a slow retry loop in one never holds
    // the other up.
    let analysis_source: Arc<dyn MatchDataSource> = Arc::new(FlashscoreSource::new(
        ResilientFetcher::over_http(config.retry),
        config.endpoints.clone(),
    ));
    let live_source: Arc<dyn MatchDataSource> = Arc::new(FlashscoreSource::new(
        ResilientFetcher::over_http(config.retry),
        config.endpoints.clone(),
    ));

    let pipeline = MatchAnalysisPipeline::new(
        analysis_source,
        ProbabilityEngine::new(config.methods.clone(), config.gate),
        config.filters,
        registry.clone(),
    )
    .with_day_offset(config.day_offset)
    .with_parallelism(config.parallelism);

    let mut tracker =
        MatchLifecycleTracker::new(live_source, registry.clone(), sink.clone(), config.retention);
    if let Some(store) = store {
        tracker = tracker.with_store(store);
    }

    let analysis_registry = registry.clone();
    let analysis_path = registry_path.clone();
    let analysis_sink = sink.clone();
    let analysis = spawn_periodic(
        "analysis",
        config.analysis_period,
        config.cooldown,
        move || {
            let accepted = pipeline.run_once(Utc::now());
            for prediction in &accepted {
                analysis_sink.on_new_prediction(prediction);
            }
            info!(accepted = accepted.len(), "analysis pass done");
            if !accepted.is_empty() {
                save(&analysis_registry, analysis_path.as_deref())?;
            }
            Ok(())
        },
    )
    .context("spawn analysis task")?;

    let reconcile_registry = registry.clone();
    let reconcile_path = registry_path;
    let reconcile = spawn_periodic(
        "reconcile",
        config.reconcile_period,
        config.cooldown,
        move || {
            let report = tracker.reconcile(Utc::now());
            info!(
                checked = report.checked,
                finished = report.finished,
                unavailable = report.unavailable,
                pruned = report.pruned,
                "reconcile pass done"
            );
            if report.finished > 0 || report.pruned > 0 {
                save(&reconcile_registry, reconcile_path.as_deref())?;
            }
            Ok(())
        },
    )
    .context("spawn reconcile task")?;

    for handle in [analysis, reconcile] {
        if handle.join().is_err() {
            warn!("periodic task exited abnormally");
        }
    }
    drop(sink);
    let _ = notifier.join();
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("totals_scout=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(config: &ScoutConfig) -> Option<Arc<dyn ResultsStore>> {
    if !config.stat_db {
        return None;
    }
    let path = config.stat_db_path.as_ref()?;
    match SqliteResultsStore::open(path) {
        Ok(store) => {
            info!(path = %path.display(), "results store open");
            Some(Arc::new(store))
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "results store disabled");
            None
        }
    }
}

fn save(registry: &Registry, path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(path) => persist::save_registry(registry, path),
        None => Ok(()),
    }
}
