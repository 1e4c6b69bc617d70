use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed,
    Failed,
    Panicked,
}

impl IterationOutcome {
    /// Pause before the next iteration.
    pub fn pause(self, period: Duration, cooldown: Duration) -> Duration {
        match self {
            IterationOutcome::Completed => period,
            IterationOutcome::Failed | IterationOutcome::Panicked => cooldown,
        }
    }
}

/// Runs one iteration of a periodic job, turning errors and panics into an
/// outcome instead of letting them end the task.
pub fn run_iteration(name: &str, job: &mut impl FnMut() -> Result<()>) -> IterationOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| job())) {
        Ok(Ok(())) => IterationOutcome::Completed,
        Ok(Err(err)) => {
            error!(task = name, error = %format!("{err:#}"), "iteration failed");
            IterationOutcome::Failed
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(task = name, %reason, "iteration panicked");
            IterationOutcome::Panicked
        }
    }
}

/// Spawns a named thread that runs `job` forever: after a clean iteration
/// it waits `period`, after a failed one `cooldown`.
pub fn spawn_periodic<F>(
    name: &str,
    period: Duration,
    cooldown: Duration,
    mut job: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut() -> Result<()> + Send + 'static,
{
    let task = name.to_string();
    thread::Builder::new().name(task.clone()).spawn(move || {
        loop {
            let outcome = run_iteration(&task, &mut job);
            let pause = outcome.pause(period, cooldown);
            debug!(task = %task, ?outcome, ?pause, "iteration done");
            thread::sleep(pause);
        }
    })
}
