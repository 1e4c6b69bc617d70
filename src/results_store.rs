use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::prediction::Prediction;
use crate::probability::Method;

/// Append-only log of settled predictions.
pub trait ResultsStore: Send + Sync {
    /// Writes one row for a finished prediction. Returns `false` when a row
    /// for the same date and teams already exists.
    fn record(&self, prediction: &Prediction) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub match_date: String,
    pub teams: String,
    pub league: String,
    pub methods: Vec<(Method, Option<f64>)>,
    pub consensus_percent: f64,
    pub fair_odds: f64,
    pub bookmaker_odds: f64,
    pub score: Option<String>,
    pub outcome: Option<String>,
}

pub struct SqliteResultsStore {
    conn: Mutex<Connection>,
}

impl SqliteResultsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open results db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory results db")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn load_all(&self) -> Result<Vec<StoredResult>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn
            .prepare(
                r#"
                SELECT match_date, teams, league,
                       poisson, weighted_poisson, historical_totals, recent_form,
                       attacking_potential, bayesian, ml_approach,
                       consensus_percent, fair_odds, bookmaker_odds, score, outcome
                FROM results
                ORDER BY id ASC
                "#,
            )
            .context("prepare results query")?;
        let rows = stmt
            .query_map([], |row| {
                let mut methods = Vec::with_capacity(Method::ALL.len());
                for (idx, method) in Method::ALL.iter().enumerate() {
                    methods.push((*method, row.get::<_, Option<f64>>(3 + idx)?));
                }
                Ok(StoredResult {
                    match_date: row.get(0)?,
                    teams: row.get(1)?,
                    league: row.get(2)?,
                    methods,
                    consensus_percent: row.get(10)?,
                    fair_odds: row.get(11)?,
                    bookmaker_odds: row.get(12)?,
                    score: row.get(13)?,
                    outcome: row.get(14)?,
                })
            })
            .context("query results")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode results row")?);
        }
        Ok(out)
    }

    /// Writes the whole table to a single-sheet workbook.
    pub fn export_xlsx(&self, path: &Path) -> Result<usize> {
        let results = self.load_all()?;
        let mut rows = vec![header_row()];
        rows.extend(results.iter().map(result_row));

        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Results")?;
            write_rows(sheet, &rows)?;
        }
        workbook
            .save(path)
            .with_context(|| format!("save workbook {}", path.display()))?;
        Ok(results.len())
    }
}

impl ResultsStore for SqliteResultsStore {
    fn record(&self, prediction: &Prediction) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let method = |m: Method| prediction.estimates.get(&m).map(|p| round_to(*p * 100.0, 1));
        let changed = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO results (
                    match_date, teams, league,
                    poisson, weighted_poisson, historical_totals, recent_form,
                    attacking_potential, bayesian, ml_approach,
                    consensus_percent, fair_odds, bookmaker_odds, score, outcome
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    prediction.date_str(),
                    prediction.teams(),
                    prediction.league,
                    method(Method::Poisson),
                    method(Method::WeightedPoisson),
                    method(Method::HistoricalTotals),
                    method(Method::RecentForm),
                    method(Method::AttackingPotential),
                    method(Method::Bayesian),
                    method(Method::MlApproach),
                    prediction.consensus_percent(),
                    round_to(prediction.fair_odds, 2),
                    prediction.bookmaker_odds,
                    prediction.settled_score,
                    prediction.bet_outcome.map(|o| o.label()),
                ],
            )
            .with_context(|| format!("insert result {}", prediction.key))?;
        Ok(changed > 0)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_date TEXT NOT NULL,
            teams TEXT NOT NULL,
            league TEXT NOT NULL,
            poisson REAL NULL,
            weighted_poisson REAL NULL,
            historical_totals REAL NULL,
            recent_form REAL NULL,
            attacking_potential REAL NULL,
            bayesian REAL NULL,
            ml_approach REAL NULL,
            consensus_percent REAL NOT NULL,
            fair_odds REAL NOT NULL,
            bookmaker_odds REAL NOT NULL,
            score TEXT NULL,
            outcome TEXT NULL,
            UNIQUE(match_date, teams)
        );
        "#,
    )
    .context("create results schema")?;
    Ok(())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn header_row() -> Vec<String> {
    let mut row = vec!["Date".to_string(), "Teams".to_string(), "League".to_string()];
    row.extend(Method::ALL.iter().map(|m| format!("{} %", m.label())));
    row.extend(
        ["Consensus %", "Fair odds", "Bookmaker odds", "Score", "Outcome"]
            .iter()
            .map(|s| s.to_string()),
    );
    row
}

fn result_row(result: &StoredResult) -> Vec<String> {
    let mut row = vec![
        result.match_date.clone(),
        result.teams.clone(),
        result.league.clone(),
    ];
    row.extend(
        result
            .methods
            .iter()
            .map(|(_, p)| p.map(|v| format!("{v:.1}")).unwrap_or_default()),
    );
    row.push(format!("{:.1}", result.consensus_percent));
    row.push(format!("{:.2}", result.fair_odds));
    row.push(format!("{:.2}", result.bookmaker_odds));
    row.push(result.score.clone().unwrap_or_default());
    row.push(result.outcome.clone().unwrap_or_default());
    row
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
