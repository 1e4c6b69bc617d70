use std::path::PathBuf;

use anyhow::{Context, Result};

use totals_scout::persist;
use totals_scout::results_store::SqliteResultsStore;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let db_path = parse_path_arg("--db")
        .or_else(|| std::env::var("STAT_DB_PATH").ok().map(PathBuf::from))
        .or_else(persist::default_results_db_path)
        .context("unable to resolve results db path")?;
    let out_path = parse_path_arg("--out").unwrap_or_else(|| PathBuf::from("results.xlsx"));

    let store = SqliteResultsStore::open(&db_path)?;
    let rows = store.export_xlsx(&out_path)?;

    println!("Results export complete");
    println!("DB: {}", db_path.display());
    println!("Rows: {rows}");
    println!("Workbook: {}", out_path.display());
    Ok(())
}

fn parse_path_arg(flag: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&prefix) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(PathBuf::from(next));
            }
        }
    }
    None
}
