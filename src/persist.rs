use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::registry::{Registry, RegistryState};

const CACHE_DIR: &str = "totals_scout";
const REGISTRY_FILE: &str = "registry.json";
const RESULTS_DB: &str = "results.sqlite";
const SNAPSHOT_VERSION: u32 = 1;

// Held from export to rename so the temp file has one writer and the last
// rename carries the newest state.
static SAVE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    state: RegistryState,
}

/// Per-user cache directory of the service.
pub fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_registry_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(REGISTRY_FILE))
}

pub fn default_results_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(RESULTS_DB))
}

/// Loads a registry snapshot. A missing, unreadable or outdated file yields
/// an empty registry.
pub fn load_registry(path: &Path) -> Registry {
    let Ok(raw) = fs::read_to_string(path) else {
        debug!(path = %path.display(), "no registry snapshot");
        return Registry::new();
    };
    let snapshot = match serde_json::from_str::<SnapshotFile>(&raw) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring corrupt registry snapshot");
            return Registry::new();
        }
    };
    if snapshot.version != SNAPSHOT_VERSION {
        warn!(
            found = snapshot.version,
            expected = SNAPSHOT_VERSION,
            "ignoring registry snapshot of another version"
        );
        return Registry::new();
    }
    Registry::from_state(snapshot.state)
}

/// Writes the registry next to `path` and renames it into place.
pub fn save_registry(registry: &Registry, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let _guard = SAVE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let snapshot = SnapshotFile {
        version: SNAPSHOT_VERSION,
        state: registry.export_state(),
    };
    let json = serde_json::to_string(&snapshot).context("serialize registry")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}
