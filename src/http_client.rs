use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

// Per-request timeouts come from the retry policy; these only bound the pool.
const CONNECT_TIMEOUT_SECS: u64 = 10;
const IDLE_TIMEOUT_SECS: u64 = 90;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) totals_scout/0.1";

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Process-wide blocking client. reqwest pools connections internally, so
/// the analysis and reconciliation threads can issue requests concurrently.
pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .pool_idle_timeout(Duration::from_secs(IDLE_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}
