use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probability::{Estimate, Method, OVER_MIN_GOALS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionStatus {
    Upcoming,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetOutcome {
    Over,
    Under,
    Unknown,
}

impl BetOutcome {
    pub fn from_scores(home: Option<u32>, away: Option<u32>) -> Self {
        match (home, away) {
            (Some(h), Some(a)) if h + a >= OVER_MIN_GOALS => BetOutcome::Over,
            (Some(_), Some(_)) => BetOutcome::Under,
            _ => BetOutcome::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BetOutcome::Over => "over",
            BetOutcome::Under => "under",
            BetOutcome::Unknown => "unknown",
        }
    }
}

/// Traffic-light band of one method's estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    High,
    Medium,
    Low,
}

impl Band {
    pub fn of(probability: f64) -> Self {
        if probability >= 0.80 {
            Band::High
        } else if probability >= 0.60 {
            Band::Medium
        } else {
            Band::Low
        }
    }
}

/// Final score of a finished fixture as applied to a prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub score: Option<String>,
    pub outcome: BetOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub key: String,
    pub fixture_id: String,
    pub league: String,
    pub home: String,
    pub away: String,
    pub kickoff: DateTime<Utc>,
    pub estimates: BTreeMap<Method, f64>,
    pub consensus_probability: f64,
    pub fair_odds: f64,
    pub bookmaker_odds: f64,
    pub status: PredictionStatus,
    #[serde(default)]
    pub settled_score: Option<String>,
    #[serde(default)]
    pub bet_outcome: Option<BetOutcome>,
}

/// Dedup key: team names plus the kickoff's calendar date.
pub fn prediction_key(home: &str, away: &str, kickoff: DateTime<Utc>) -> String {
    format!("{home}_{away}_{}", kickoff.format("%d.%m.%Y"))
}

impl Prediction {
    #[allow(clippy::too_many_arguments)]
    pub fn upcoming(
        fixture_id: &str,
        league: &str,
        home: &str,
        away: &str,
        kickoff: DateTime<Utc>,
        estimates: &[Estimate],
        consensus_probability: f64,
        fair_odds: f64,
        bookmaker_odds: f64,
    ) -> Self {
        Self {
            key: prediction_key(home, away, kickoff),
            fixture_id: fixture_id.to_string(),
            league: league.to_string(),
            home: home.to_string(),
            away: away.to_string(),
            kickoff,
            estimates: estimates.iter().map(|e| (e.method, e.probability)).collect(),
            consensus_probability,
            fair_odds,
            bookmaker_odds,
            status: PredictionStatus::Upcoming,
            settled_score: None,
            bet_outcome: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == PredictionStatus::Finished
    }

    pub fn teams(&self) -> String {
        format!("{} - {}", self.home, self.away)
    }

    pub fn date_str(&self) -> String {
        self.kickoff.format("%d.%m.%Y").to_string()
    }

    pub fn time_str(&self) -> String {
        self.kickoff.format("%H:%M").to_string()
    }

    /// Consensus as a percentage rounded to one decimal.
    pub fn consensus_percent(&self) -> f64 {
        (self.consensus_probability * 1000.0).round() / 10.0
    }

    pub fn method_bands(&self) -> Vec<(Method, Band)> {
        self.estimates
            .iter()
            .map(|(method, p)| (*method, Band::of(*p)))
            .collect()
    }

    /// Moves the prediction to finished. Returns false, leaving it untouched,
    /// when it already was.
    pub fn settle(&mut self, settlement: Settlement) -> bool {
        if self.is_finished() {
            return false;
        }
        self.status = PredictionStatus::Finished;
        self.settled_score = settlement.score;
        self.bet_outcome = Some(settlement.outcome);
        true
    }
}
