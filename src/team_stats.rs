use serde::{Deserialize, Serialize};
use tracing::debug;

/// Only the most recent results of a team are considered.
pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        if tag.eq_ignore_ascii_case("home") {
            Some(Venue::Home)
        } else if tag.eq_ignore_ascii_case("away") {
            Some(Venue::Away)
        } else {
            None
        }
    }
}

/// One row of a team's recent-results feed, as published. Goals are given
/// from the fixture's point of view (home side first); `venue_tag` says on
/// which side the team in question played.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMatchRecord {
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub venue_tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLine {
    pub venue: Venue,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub total_goals: u32,
}

/// Normalized recent form of one team. Never built with zero matches:
/// `extract` returns `None` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecentStats {
    pub matches_processed: usize,
    /// Oldest first.
    pub match_details: Vec<MatchLine>,
    pub total_goals_scored: u32,
    pub total_goals_conceded: u32,
    pub home_matches: usize,
    pub away_matches: usize,
}

impl TeamRecentStats {
    fn push(&mut self, line: MatchLine) {
        self.matches_processed += 1;
        self.total_goals_scored += line.goals_scored;
        self.total_goals_conceded += line.goals_conceded;
        match line.venue {
            Venue::Home => self.home_matches += 1,
            Venue::Away => self.away_matches += 1,
        }
        self.match_details.push(line);
    }

    fn played(&self) -> f64 {
        self.matches_processed.max(1) as f64
    }

    pub fn scoring_rate(&self) -> f64 {
        self.total_goals_scored as f64 / self.played()
    }

    pub fn conceding_rate(&self) -> f64 {
        self.total_goals_conceded as f64 / self.played()
    }

    /// Average goals scored at `venue`; zero when the team never played there.
    pub fn scoring_rate_at(&self, venue: Venue) -> f64 {
        let played = match venue {
            Venue::Home => self.home_matches,
            Venue::Away => self.away_matches,
        };
        let scored: u32 = self
            .match_details
            .iter()
            .filter(|m| m.venue == venue)
            .map(|m| m.goals_scored)
            .sum();
        scored as f64 / played.max(1) as f64
    }

    /// Share of matches whose total went over `line`.
    pub fn over_fraction(&self, line: f64) -> f64 {
        let over = self
            .match_details
            .iter()
            .filter(|m| m.total_goals as f64 > line)
            .count();
        over as f64 / self.played()
    }

    /// The `n` most recent matches, oldest first.
    pub fn recent(&self, n: usize) -> &[MatchLine] {
        let start = self.match_details.len().saturating_sub(n);
        &self.match_details[start..]
    }
}

/// Builds a team summary from its recent-results rows, newest first as the
/// feed lists them. Only the first `MAX_HISTORY` rows are looked at; rows
/// without a recognizable venue or without both scores are skipped.
pub fn extract(records: &[RawMatchRecord], team_label: &str) -> Option<TeamRecentStats> {
    let mut lines = Vec::new();
    for (idx, record) in records.iter().take(MAX_HISTORY).enumerate() {
        let Some(line) = classify(record) else {
            debug!(team = team_label, row = idx, "skipping unusable history row");
            continue;
        };
        lines.push(line);
    }

    if lines.is_empty() {
        debug!(team = team_label, "no usable history rows");
        return None;
    }

    let mut stats = TeamRecentStats::default();
    for line in lines.into_iter().rev() {
        stats.push(line);
    }
    Some(stats)
}

fn classify(record: &RawMatchRecord) -> Option<MatchLine> {
    let venue = Venue::from_tag(record.venue_tag.as_deref()?)?;
    let home_goals = record.home_goals?;
    let away_goals = record.away_goals?;
    let (goals_scored, goals_conceded) = match venue {
        Venue::Home => (home_goals, away_goals),
        Venue::Away => (away_goals, home_goals),
    };
    Some(MatchLine {
        venue,
        goals_scored,
        goals_conceded,
        total_goals: goals_scored + goals_conceded,
    })
}
