use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::feed_codec::{FeedBlock, decode_blocks, decode_flat};
use crate::probability::TOTAL_LINE;
use crate::retry::{FetchError, FetchRequest, ResilientFetcher};
use crate::team_stats::{MAX_HISTORY, RawMatchRecord};

pub const UNKNOWN_LEAGUE: &str = "Unknown";

const DEFAULT_LIST_URL: &str = "https://d.flashscorekz.com/x/feed/";
const DEFAULT_HISTORY_URL: &str = "https://46.flashscore.ninja/46/x/feed/";
const DEFAULT_LIVE_URL: &str = "https://46.flashscore.ninja/46/x/feed/";
const DEFAULT_ODDS_URL: &str = "https://global.ds.lsapp.eu/odds/pq_graphql";
const DEFAULT_SIGN: &str = "SW9D1eZo";
const SIGN_HEADER: &str = "x-fsign";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSummary {
    pub id: String,
    pub home: String,
    pub away: String,
    pub kickoff: DateTime<Utc>,
    pub league: String,
}

/// Recent results of both sides of a fixture, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentMatches {
    pub home: Vec<RawMatchRecord>,
    pub away: Vec<RawMatchRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Upcoming,
    FirstHalf,
    Halftime,
    SecondHalf,
    Finished,
}

impl MatchStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(MatchStatus::Upcoming),
            "1" => Some(MatchStatus::FirstHalf),
            "2" => Some(MatchStatus::SecondHalf),
            "3" => Some(MatchStatus::Finished),
            "4" => Some(MatchStatus::Halftime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveState {
    pub score: Option<String>,
    pub status: Option<MatchStatus>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
}

impl LiveState {
    pub fn is_finished(&self) -> bool {
        self.status == Some(MatchStatus::Finished)
    }
}

/// Everything the pipeline and the tracker read about fixtures. An `Err`
/// means the data is unavailable for this cycle.
pub trait MatchDataSource: Send + Sync {
    fn list_fixtures(&self, day_offset: i32) -> Result<Vec<FixtureSummary>, FetchError>;
    fn fetch_recent_matches(&self, fixture_id: &str) -> Result<RecentMatches, FetchError>;
    /// Bookmaker price for over 2.5 goals, full time. `Ok(None)` when the
    /// market is not offered.
    fn fetch_odds(&self, fixture_id: &str) -> Result<Option<f64>, FetchError>;
    fn fetch_live_state(&self, fixture_id: &str) -> Result<LiveState, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoints {
    pub list_url: String,
    pub history_url: String,
    pub live_url: String,
    pub odds_url: String,
    pub sign: String,
    pub geo: String,
}

impl Default for FeedEndpoints {
    fn default() -> Self {
        Self {
            list_url: DEFAULT_LIST_URL.to_string(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            live_url: DEFAULT_LIVE_URL.to_string(),
            odds_url: DEFAULT_ODDS_URL.to_string(),
            sign: DEFAULT_SIGN.to_string(),
            geo: "RU".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct FlashscoreSource {
    fetcher: ResilientFetcher,
    endpoints: FeedEndpoints,
}

impl FlashscoreSource {
    pub fn new(fetcher: ResilientFetcher, endpoints: FeedEndpoints) -> Self {
        Self { fetcher, endpoints }
    }

    fn request(&self, url: String) -> FetchRequest {
        FetchRequest::get(url).header(SIGN_HEADER, &self.endpoints.sign)
    }
}

impl MatchDataSource for FlashscoreSource {
    fn list_fixtures(&self, day_offset: i32) -> Result<Vec<FixtureSummary>, FetchError> {
        let url = format!("{}f_1_{day_offset}_3_ru_5", self.endpoints.list_url);
        self.fetcher
            .fetch_parsed(&self.request(url), |body| Ok(parse_fixture_list(body)))
    }

    fn fetch_recent_matches(&self, fixture_id: &str) -> Result<RecentMatches, FetchError> {
        let url = format!("{}df_hh_1_{fixture_id}", self.endpoints.history_url);
        self.fetcher
            .fetch_parsed(&self.request(url), parse_recent_matches)
    }

    fn fetch_odds(&self, fixture_id: &str) -> Result<Option<f64>, FetchError> {
        let geo = &self.endpoints.geo;
        let url = format!(
            "{}?_hash=oce&eventId={fixture_id}&projectId=46&geoIpCode={geo}&geoIpSubdivisionCode={geo}",
            self.endpoints.odds_url
        );
        self.fetcher.fetch_parsed(&self.request(url), parse_over_odds)
    }

    fn fetch_live_state(&self, fixture_id: &str) -> Result<LiveState, FetchError> {
        let url = format!("{}dc_1_{fixture_id}", self.endpoints.live_url);
        self.fetcher
            .fetch_parsed(&self.request(url), |body| Ok(parse_live_state(body)))
    }
}

/// Fixtures of the day listing. League header blocks (`~ZA`) name the league
/// of every fixture block (`~AA`) that follows, until the next header.
pub fn parse_fixture_list(raw: &str) -> Vec<FixtureSummary> {
    let (_, fixtures) = decode_blocks(raw).iter().fold(
        (UNKNOWN_LEAGUE.to_string(), Vec::new()),
        |(league, mut fixtures), block| {
            if block.is_opened_by("ZA") {
                let next = block
                    .non_empty("ZA")
                    .map(str::to_string)
                    .unwrap_or_else(|| UNKNOWN_LEAGUE.to_string());
                return (next, fixtures);
            }
            if block.is_opened_by("AA") {
                if let Some(fixture) = fixture_from_block(block, &league) {
                    fixtures.push(fixture);
                }
            }
            (league, fixtures)
        },
    );
    fixtures
}

fn fixture_from_block(block: &FeedBlock, league: &str) -> Option<FixtureSummary> {
    let id = block.non_empty("AA")?;
    let ts = block.non_empty("AD")?.parse::<i64>().ok()?;
    let kickoff = DateTime::<Utc>::from_timestamp(ts, 0)?;
    Some(FixtureSummary {
        id: id.to_string(),
        home: block.non_empty("AE")?.to_string(),
        away: block.non_empty("AF")?.to_string(),
        kickoff,
        league: league.to_string(),
    })
}

/// Head-to-head feed. Each `~KB` block opens a section; the first two
/// sections are the recent results of the home and the away side.
pub fn parse_recent_matches(raw: &str) -> Result<RecentMatches, FetchError> {
    let mut sections: Vec<Vec<RawMatchRecord>> = Vec::new();
    for block in decode_blocks(raw) {
        if block.is_opened_by("KB") {
            sections.push(Vec::new());
        }
        let Some(section) = sections.last_mut() else {
            continue;
        };
        if let Some(record) = record_from_block(&block) {
            if section.len() < MAX_HISTORY {
                section.push(record);
            }
        }
    }

    let mut sections = sections.into_iter();
    match (sections.next(), sections.next()) {
        (Some(home), Some(away)) => Ok(RecentMatches { home, away }),
        _ => Err(FetchError::malformed("history feed lacks both team sections")),
    }
}

fn record_from_block(block: &FeedBlock) -> Option<RawMatchRecord> {
    let home_goals = block.non_empty("KU")?.parse::<u32>().ok()?;
    let away_goals = block.non_empty("KT")?.parse::<u32>().ok()?;
    let venue_tag = block.non_empty("KS")?.to_string();
    Some(RawMatchRecord {
        home_team: block.non_empty("KJ").map(str::to_string),
        away_team: block.non_empty("KK").map(str::to_string),
        home_goals: Some(home_goals),
        away_goals: Some(away_goals),
        venue_tag: Some(venue_tag),
    })
}

/// Picks the full-time over/under price at the 2.5 line.
pub fn parse_over_odds(raw: &str) -> Result<Option<f64>, FetchError> {
    let root: Value = serde_json::from_str(raw.trim())
        .map_err(|err| FetchError::malformed(format!("invalid odds json: {err}")))?;
    let Some(markets) = root
        .pointer("/data/findOddsByEventId/odds")
        .and_then(Value::as_array)
    else {
        return Ok(None);
    };

    for market in markets {
        let betting_type = market.get("bettingType").and_then(Value::as_str);
        let scope = market.get("bettingScope").and_then(Value::as_str);
        if betting_type != Some("OVER_UNDER") || scope != Some("FULL_TIME") {
            continue;
        }
        let Some(prices) = market.get("odds").and_then(Value::as_array) else {
            continue;
        };
        for price in prices {
            let line = price.get("handicap").and_then(|h| number(h.get("value")));
            let selection = price.get("selection").and_then(Value::as_str);
            if selection != Some("OVER") {
                continue;
            }
            if !line.is_some_and(|l| (l - TOTAL_LINE).abs() < 1e-9) {
                continue;
            }
            return Ok(number(price.get("value")));
        }
    }
    Ok(None)
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Live score feed: `DG`/`DH` carry the score, `DA` the status code.
pub fn parse_live_state(raw: &str) -> LiveState {
    let fields = decode_flat(raw);
    let status = fields.get("DA").and_then(|code| MatchStatus::from_code(code));
    let home = fields.get("DG").and_then(|v| v.trim().parse::<u32>().ok());
    let away = fields.get("DH").and_then(|v| v.trim().parse::<u32>().ok());
    match (home, away) {
        (Some(h), Some(a)) => LiveState {
            score: Some(format!("{h}:{a}")),
            status,
            home_score: Some(h),
            away_score: Some(a),
        },
        _ => LiveState {
            score: None,
            status,
            home_score: None,
            away_score: None,
        },
    }
}
