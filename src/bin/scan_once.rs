use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use totals_scout::config::ScoutConfig;
use totals_scout::flashscore::FlashscoreSource;
use totals_scout::pipeline::MatchAnalysisPipeline;
use totals_scout::probability::ProbabilityEngine;
use totals_scout::registry::Registry;
use totals_scout::retry::ResilientFetcher;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("totals_scout=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ScoutConfig::from_env();
    if let Some(offset) = parse_day_arg() {
        config.day_offset = offset;
    }

    let source = FlashscoreSource::new(
        ResilientFetcher::over_http(config.retry),
        config.endpoints.clone(),
    );
    let pipeline = MatchAnalysisPipeline::new(
        Arc::new(source),
        ProbabilityEngine::new(config.methods.clone(), config.gate),
        config.filters,
        Registry::new(),
    )
    .with_day_offset(config.day_offset)
    .with_parallelism(config.parallelism);

    let accepted = pipeline.run_once(Utc::now());
    println!("Accepted predictions: {}", accepted.len());
    for p in &accepted {
        println!(
            "{} {} | {} | {} | p={:.1}% fair={:.2} book={:.2}",
            p.date_str(),
            p.time_str(),
            p.league,
            p.teams(),
            p.consensus_percent(),
            p.fair_odds,
            p.bookmaker_odds
        );
        for (method, prob) in &p.estimates {
            println!("   {:<20} {:>5.1}%", method.label(), prob * 100.0);
        }
    }
    Ok(())
}

fn parse_day_arg() -> Option<i32> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--day=") {
            return raw.trim().parse::<i32>().ok();
        }
        if arg == "--day"
            && let Some(next) = args.get(idx + 1)
        {
            return next.trim().parse::<i32>().ok();
        }
    }
    None
}
