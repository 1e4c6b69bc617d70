use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::team_stats::{MatchLine, TeamRecentStats, Venue};

/// Goal line of the market being priced. Settlement uses the same line.
pub const TOTAL_LINE: f64 = 2.5;
/// Smallest goal count that beats `TOTAL_LINE`.
pub const OVER_MIN_GOALS: u32 = 3;
/// No single estimator reports more than this.
pub const PROBABILITY_CAP: f64 = 0.95;
/// Fair odds reported when the consensus probability is zero.
pub const FAIR_ODDS_SENTINEL: f64 = 999.0;

const POISSON_MAX_GOALS: u32 = 14;
const LAMBDA_SCALE: f64 = 2.5;
const HOME_WEIGHT: f64 = 1.2;
const AWAY_WEIGHT: f64 = 0.8;
const RECENT_WINDOW: usize = 5;
const ATTACK_NORMALIZER: f64 = 3.5;
const PRIOR_ALPHA: f64 = 8.0;
const PRIOR_BETA: f64 = 8.0;
const BAYES_NORMALIZER: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Poisson,
    WeightedPoisson,
    HistoricalTotals,
    RecentForm,
    AttackingPotential,
    Bayesian,
    MlApproach,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Poisson,
        Method::WeightedPoisson,
        Method::HistoricalTotals,
        Method::RecentForm,
        Method::AttackingPotential,
        Method::Bayesian,
        Method::MlApproach,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Method::Poisson => "poisson",
            Method::WeightedPoisson => "weighted_poisson",
            Method::HistoricalTotals => "historical_totals",
            Method::RecentForm => "recent_form",
            Method::AttackingPotential => "attacking_potential",
            Method::Bayesian => "bayesian",
            Method::MlApproach => "ml_approach",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Method::Poisson => "Poisson",
            Method::WeightedPoisson => "Weighted Poisson",
            Method::HistoricalTotals => "Historical totals",
            Method::RecentForm => "Recent form",
            Method::AttackingPotential => "Attacking potential",
            Method::Bayesian => "Bayesian",
            Method::MlApproach => "ML approach",
        }
    }

    pub fn default_min_matches(self) -> usize {
        match self {
            Method::RecentForm => 5,
            _ => 10,
        }
    }

    /// Raw estimate for the fixture, ignoring thresholds.
    pub fn estimate(self, a: &TeamRecentStats, b: &TeamRecentStats) -> f64 {
        let p = match self {
            Method::Poisson => {
                let combined = (a.scoring_rate() + b.scoring_rate()) / 2.0;
                poisson_at_least(combined * LAMBDA_SCALE, OVER_MIN_GOALS)
            }
            Method::WeightedPoisson => {
                let weighted = (a.scoring_rate_at(Venue::Home) * HOME_WEIGHT
                    + b.scoring_rate_at(Venue::Away) * AWAY_WEIGHT
                    + b.scoring_rate_at(Venue::Home) * HOME_WEIGHT
                    + a.scoring_rate_at(Venue::Away) * AWAY_WEIGHT)
                    / 4.0;
                poisson_at_least(weighted * LAMBDA_SCALE, OVER_MIN_GOALS)
            }
            Method::HistoricalTotals => {
                over_share(a.match_details.iter().chain(b.match_details.iter()))
            }
            Method::RecentForm => over_share(
                a.recent(RECENT_WINDOW)
                    .iter()
                    .chain(b.recent(RECENT_WINDOW).iter()),
            ),
            Method::AttackingPotential => {
                let expected = (a.scoring_rate()
                    + b.conceding_rate()
                    + b.scoring_rate()
                    + a.conceding_rate())
                    / 2.0;
                expected / ATTACK_NORMALIZER
            }
            Method::Bayesian => {
                let goals = (a.total_goals_scored + b.total_goals_scored) as f64;
                let matches = (a.matches_processed + b.matches_processed) as f64;
                let posterior_mean = (PRIOR_ALPHA + goals) / (PRIOR_BETA + matches);
                posterior_mean / BAYES_NORMALIZER
            }
            Method::MlApproach => {
                let features = [
                    a.scoring_rate(),
                    b.scoring_rate(),
                    a.conceding_rate(),
                    b.conceding_rate(),
                    a.over_fraction(TOTAL_LINE),
                    b.over_fraction(TOTAL_LINE),
                ];
                features.iter().sum::<f64>() / features.len() as f64
            }
        };
        // The share-based methods can reach 1.0 on their own; they are
        // capped with the rest so no single estimate reads as a certainty.
        p.clamp(0.0, PROBABILITY_CAP)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSetting {
    pub enabled: bool,
    pub min_matches: usize,
}

/// Enable flag and sample threshold for every method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTable {
    settings: BTreeMap<Method, MethodSetting>,
}

impl Default for MethodTable {
    fn default() -> Self {
        let settings = Method::ALL
            .iter()
            .map(|m| {
                (
                    *m,
                    MethodSetting {
                        enabled: true,
                        min_matches: m.default_min_matches(),
                    },
                )
            })
            .collect();
        Self { settings }
    }
}

impl MethodTable {
    pub fn get(&self, method: Method) -> MethodSetting {
        self.settings.get(&method).copied().unwrap_or(MethodSetting {
            enabled: false,
            min_matches: method.default_min_matches(),
        })
    }

    pub fn set(&mut self, method: Method, setting: MethodSetting) {
        self.settings.insert(method, setting);
    }

    pub fn with(mut self, method: Method, enabled: bool, min_matches: usize) -> Self {
        self.set(
            method,
            MethodSetting {
                enabled,
                min_matches,
            },
        );
        self
    }

    pub fn enabled(&self) -> impl Iterator<Item = (Method, MethodSetting)> + '_ {
        self.settings
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(m, s)| (*m, *s))
    }
}

/// What to do with a fixture when some enabled method lacks history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePolicy {
    /// Skip the fixture entirely.
    #[default]
    Strict,
    /// Use whichever enabled methods could run, if any.
    Lenient,
}

impl GatePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "strict" | "all" | "all_or_nothing" => Some(GatePolicy::Strict),
            "lenient" | "any" | "best_effort" => Some(GatePolicy::Lenient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub method: Method,
    pub probability: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ProbabilityEngine {
    methods: MethodTable,
    gate: GatePolicy,
}

impl ProbabilityEngine {
    pub fn new(methods: MethodTable, gate: GatePolicy) -> Self {
        Self { methods, gate }
    }

    fn can_run(setting: MethodSetting, a: &TeamRecentStats, b: &TeamRecentStats) -> bool {
        a.matches_processed >= setting.min_matches && b.matches_processed >= setting.min_matches
    }

    /// Sample-size check done before any estimator runs.
    pub fn is_sufficient(&self, a: &TeamRecentStats, b: &TeamRecentStats) -> bool {
        let mut any_enabled = false;
        let mut any_runnable = false;
        for (method, setting) in self.methods.enabled() {
            any_enabled = true;
            if Self::can_run(setting, a, b) {
                any_runnable = true;
            } else if self.gate == GatePolicy::Strict {
                debug!(
                    %method,
                    home = a.matches_processed,
                    away = b.matches_processed,
                    min = setting.min_matches,
                    "not enough matches for method"
                );
                return false;
            }
        }
        match self.gate {
            GatePolicy::Strict => any_enabled,
            GatePolicy::Lenient => any_runnable,
        }
    }

    /// Runs every enabled method. Under the strict gate the result is empty
    /// as soon as one enabled method cannot run.
    pub fn evaluate(&self, a: &TeamRecentStats, b: &TeamRecentStats) -> Vec<Estimate> {
        let mut estimates = Vec::new();
        let mut short = false;
        for (method, setting) in self.methods.enabled() {
            if !Self::can_run(setting, a, b) {
                debug!(%method, min = setting.min_matches, "method skipped for sample size");
                short = true;
                continue;
            }
            estimates.push(Estimate {
                method,
                probability: method.estimate(a, b),
            });
        }
        if short && self.gate == GatePolicy::Strict {
            return Vec::new();
        }
        estimates
    }
}

/// Unweighted mean of the estimates; `None` when there are none.
pub fn consensus(estimates: &[Estimate]) -> Option<f64> {
    if estimates.is_empty() {
        return None;
    }
    let sum: f64 = estimates.iter().map(|e| e.probability).sum();
    Some(sum / estimates.len() as f64)
}

pub fn fair_odds(probability: f64) -> f64 {
    if probability > 0.0 {
        1.0 / probability
    } else {
        FAIR_ODDS_SENTINEL
    }
}

pub fn poisson_pmf(lambda: f64, k: u32) -> f64 {
    let lambda = lambda.max(0.0);
    let mut p = (-lambda).exp();
    for i in 1..=k {
        p *= lambda / i as f64;
    }
    p
}

/// P(X >= min_goals) for X ~ Poisson(lambda), summed up to 14 goals.
pub fn poisson_at_least(lambda: f64, min_goals: u32) -> f64 {
    (min_goals..=POISSON_MAX_GOALS)
        .map(|k| poisson_pmf(lambda, k))
        .sum()
}

fn over_share<'a>(lines: impl Iterator<Item = &'a MatchLine>) -> f64 {
    let mut total = 0usize;
    let mut over = 0usize;
    for line in lines {
        total += 1;
        if line.total_goals as f64 > TOTAL_LINE {
            over += 1;
        }
    }
    if total == 0 {
        0.5
    } else {
        over as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(lines: &[(Venue, u32, u32)]) -> TeamRecentStats {
        let mut stats = TeamRecentStats::default();
        for (venue, scored, conceded) in lines {
            stats.match_details.push(MatchLine {
                venue: *venue,
                goals_scored: *scored,
                goals_conceded: *conceded,
                total_goals: scored + conceded,
            });
            stats.matches_processed += 1;
            stats.total_goals_scored += scored;
            stats.total_goals_conceded += conceded;
            match venue {
                Venue::Home => stats.home_matches += 1,
                Venue::Away => stats.away_matches += 1,
            }
        }
        stats
    }

    fn repeat(n: usize, venue: Venue, scored: u32, conceded: u32) -> Vec<(Venue, u32, u32)> {
        vec![(venue, scored, conceded); n]
    }

    #[test]
    fn pmf_matches_closed_form() {
        let lambda = 3.75_f64;
        let mut factorial = 1.0;
        for k in 0..=14u32 {
            if k > 0 {
                factorial *= k as f64;
            }
            let direct = (-lambda).exp() * lambda.powi(k as i32) / factorial;
            assert!((poisson_pmf(lambda, k) - direct).abs() < 1e-12);
        }
    }

    #[test]
    fn bayesian_uses_eight_eight_prior() {
        let a = team(&repeat(10, Venue::Home, 2, 0));
        let b = team(&repeat(10, Venue::Away, 1, 0));
        // (8 + 30) / (8 + 20) / 3
        let expected = (38.0 / 28.0) / 3.0;
        assert!((Method::Bayesian.estimate(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn attacking_potential_is_capped() {
        let a = team(&repeat(10, Venue::Home, 5, 5));
        let b = team(&repeat(10, Venue::Away, 5, 5));
        assert_eq!(Method::AttackingPotential.estimate(&a, &b), PROBABILITY_CAP);
    }

    #[test]
    fn weighted_poisson_weights_home_scoring() {
        let a = team(&[(Venue::Home, 2, 0), (Venue::Away, 1, 0)]);
        let b = team(&[(Venue::Home, 2, 0), (Venue::Away, 1, 0)]);
        let lambda = (2.0 * 1.2 + 1.0 * 0.8 + 2.0 * 1.2 + 1.0 * 0.8) / 4.0 * 2.5;
        let expected = poisson_at_least(lambda, 3).min(PROBABILITY_CAP);
        assert!((Method::WeightedPoisson.estimate(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn recent_form_uses_last_five() {
        let mut lines = repeat(5, Venue::Home, 0, 0);
        lines.extend(repeat(5, Venue::Home, 2, 2));
        let a = team(&lines);
        let b = team(&lines);
        assert!((Method::RecentForm.estimate(&a, &b) - PROBABILITY_CAP).abs() < 1e-12);
        assert!((Method::HistoricalTotals.estimate(&a, &b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ml_approach_averages_six_features() {
        let a = team(&repeat(10, Venue::Home, 1, 1));
        let b = team(&repeat(10, Venue::Away, 1, 0));
        // rates 1, 1, 1, 0 and over fractions 0, 0
        assert!((Method::MlApproach.estimate(&a, &b) - 3.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn disabled_methods_are_ignored_by_gate() {
        let table = MethodTable::default().with(Method::Poisson, false, 50);
        let engine = ProbabilityEngine::new(table, GatePolicy::Strict);
        let a = team(&repeat(10, Venue::Home, 1, 1));
        let b = team(&repeat(10, Venue::Away, 1, 1));
        assert!(engine.is_sufficient(&a, &b));
        let estimates = engine.evaluate(&a, &b);
        assert_eq!(estimates.len(), 6);
        assert!(estimates.iter().all(|e| e.method != Method::Poisson));
    }

    #[test]
    fn lenient_gate_keeps_runnable_methods() {
        let engine = ProbabilityEngine::new(MethodTable::default(), GatePolicy::Lenient);
        let a = team(&repeat(6, Venue::Home, 1, 1));
        let b = team(&repeat(6, Venue::Away, 1, 1));
        assert!(engine.is_sufficient(&a, &b));
        let estimates = engine.evaluate(&a, &b);
        assert_eq!(estimates.len(), 1);
        assert_eq!(estimates[0].method, Method::RecentForm);
    }

    #[test]
    fn nothing_enabled_is_never_sufficient() {
        let mut table = MethodTable::default();
        for m in Method::ALL {
            table = table.with(m, false, 0);
        }
        let engine = ProbabilityEngine::new(table, GatePolicy::Strict);
        let a = team(&repeat(10, Venue::Home, 1, 1));
        assert!(!engine.is_sufficient(&a, &a));
        assert!(engine.evaluate(&a, &a).is_empty());
    }

    #[test]
    fn fair_odds_sentinel_for_zero() {
        assert_eq!(fair_odds(0.0), FAIR_ODDS_SENTINEL);
        assert!((fair_odds(0.5) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn gate_policy_parses_aliases() {
        assert_eq!(GatePolicy::parse("STRICT"), Some(GatePolicy::Strict));
        assert_eq!(GatePolicy::parse("lenient"), Some(GatePolicy::Lenient));
        assert_eq!(GatePolicy::parse("maybe"), None);
    }
}
