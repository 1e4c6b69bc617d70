use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::flashscore::FeedEndpoints;
use crate::persist;
use crate::pipeline::AcceptanceFilters;
use crate::probability::{GatePolicy, Method, MethodTable};
use crate::retry::RetryPolicy;
use crate::team_stats::MAX_HISTORY;

#[derive(Debug, Clone)]
pub struct ScoutConfig {
    pub filters: AcceptanceFilters,
    pub methods: MethodTable,
    pub gate: GatePolicy,
    pub retry: RetryPolicy,
    pub retention: chrono::Duration,
    pub analysis_period: Duration,
    pub reconcile_period: Duration,
    pub cooldown: Duration,
    pub day_offset: i32,
    pub parallelism: usize,
    pub endpoints: FeedEndpoints,
    pub stat_db: bool,
    pub stat_db_path: Option<PathBuf>,
    pub registry_persist: bool,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ScoutConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset or unparsable
    /// values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let f64_or = |key: &str, default: f64, lo: f64, hi: f64| {
            get(key)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(default)
                .clamp(lo, hi)
        };
        let u64_or = |key: &str, default: u64, lo: u64, hi: u64| {
            get(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
                .clamp(lo, hi)
        };
        let bool_or = |key: &str, default: bool| get(key).map(|v| parse_bool(&v)).unwrap_or(default);
        let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let base = AcceptanceFilters::default();
        let filters = AcceptanceFilters {
            min_probability: f64_or("MIN_AVG_PROBABILITY", base.min_probability, 0.0, 1.0),
            min_bookmaker_odds: f64_or("MIN_BOOKMAKER_ODDS", base.min_bookmaker_odds, 1.0, 1000.0),
            max_bookmaker_odds: f64_or("MAX_BOOKMAKER_ODDS", base.max_bookmaker_odds, 1.0, 1000.0),
            min_fair_odds: f64_or("MIN_FAIR_ODDS", base.min_fair_odds, 1.0, 1000.0),
            max_fair_odds: f64_or("MAX_FAIR_ODDS", base.max_fair_odds, 1.0, 1000.0),
        };

        let mut methods = MethodTable::default();
        for method in Method::ALL {
            let name = method.key().to_ascii_uppercase();
            let current = methods.get(method);
            let enabled = bool_or(&format!("METHOD_{name}_ENABLED"), current.enabled);
            let min_matches = u64_or(
                &format!("METHOD_{name}_MIN_MATCHES"),
                current.min_matches as u64,
                1,
                MAX_HISTORY as u64,
            ) as usize;
            methods = methods.with(method, enabled, min_matches);
        }

        let gate = get("GATE_POLICY")
            .and_then(|v| GatePolicy::parse(&v))
            .unwrap_or_default();

        let retry = RetryPolicy::new(
            u64_or("RETRY_MAX_ATTEMPTS", 30, 1, 100) as u32,
            Duration::from_secs(u64_or("RETRY_TIMEOUT_SECS", 15, 1, 120)),
            Duration::from_secs(u64_or("RETRY_BACKOFF_SECS", 60, 0, 600)),
        );

        let defaults = FeedEndpoints::default();
        let endpoints = FeedEndpoints {
            list_url: string_or("FEED_LIST_URL", &defaults.list_url),
            history_url: string_or("FEED_HISTORY_URL", &defaults.history_url),
            live_url: string_or("FEED_LIVE_URL", &defaults.live_url),
            odds_url: string_or("ODDS_URL", &defaults.odds_url),
            sign: string_or("FEED_SIGN", &defaults.sign),
            geo: string_or("ODDS_GEO", &defaults.geo),
        };

        let day_offset = get("FIXTURE_DAY_OFFSET")
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(0)
            .clamp(-7, 7);

        Self {
            filters,
            methods,
            gate,
            retry,
            retention: chrono::Duration::days(u64_or("RETENTION_DAYS", 2, 1, 30) as i64),
            analysis_period: Duration::from_secs(u64_or("ANALYSIS_PERIOD_SECS", 300, 10, 86_400)),
            reconcile_period: Duration::from_secs(u64_or("RECONCILE_PERIOD_SECS", 300, 10, 86_400)),
            cooldown: Duration::from_secs(u64_or("TASK_COOLDOWN_SECS", 60, 1, 3_600)),
            day_offset,
            parallelism: u64_or("FETCH_PARALLELISM", 6, 2, 32) as usize,
            endpoints,
            stat_db: bool_or("STAT_DB", true),
            stat_db_path: get("STAT_DB_PATH")
                .map(PathBuf::from)
                .or_else(persist::default_results_db_path),
            registry_persist: bool_or("REGISTRY_PERSIST", true),
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ScoutConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ScoutConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_follow_the_bot() {
        let cfg = config(&[]);
        assert_eq!(cfg.filters, AcceptanceFilters::default());
        assert_eq!(cfg.methods, MethodTable::default());
        assert_eq!(cfg.gate, GatePolicy::Strict);
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.retention, chrono::Duration::days(2));
        assert_eq!(cfg.analysis_period, Duration::from_secs(300));
        assert_eq!(cfg.cooldown, Duration::from_secs(60));
        assert_eq!(cfg.parallelism, 6);
        assert_eq!(cfg.endpoints.sign, "SW9D1eZo");
        assert!(cfg.stat_db);
    }

    #[test]
    fn method_keys_toggle_and_tune() {
        let cfg = config(&[
            ("METHOD_ML_APPROACH_ENABLED", "off"),
            ("METHOD_RECENT_FORM_MIN_MATCHES", "3"),
            ("METHOD_POISSON_MIN_MATCHES", "banana"),
            ("GATE_POLICY", "lenient"),
        ]);
        assert!(!cfg.methods.get(Method::MlApproach).enabled);
        assert_eq!(cfg.methods.get(Method::RecentForm).min_matches, 3);
        assert_eq!(cfg.methods.get(Method::Poisson).min_matches, 10);
        assert_eq!(cfg.gate, GatePolicy::Lenient);
    }

    #[test]
    fn numbers_are_clamped() {
        let cfg = config(&[
            ("FETCH_PARALLELISM", "500"),
            ("MIN_AVG_PROBABILITY", "7"),
            ("RETRY_MAX_ATTEMPTS", "0"),
            ("STAT_DB_PATH", "/tmp/results.sqlite"),
        ]);
        assert_eq!(cfg.parallelism, 32);
        assert_eq!(cfg.filters.min_probability, 1.0);
        assert_eq!(cfg.retry.max_attempts, 1);
        assert_eq!(cfg.stat_db_path, Some(PathBuf::from("/tmp/results.sqlite")));
    }
}
