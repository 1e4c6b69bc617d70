use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::header::HeaderMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::http_client::http_client;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout
                | FetchError::Connect(_)
                | FetchError::Transport(_)
                | FetchError::Status(_)
        )
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        FetchError::Malformed(reason.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
            backoff_base,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }

    /// Upper bound on time spent in one `fetch`, sleeps included.
    pub fn worst_case(&self) -> Duration {
        let sleeps: u32 = (1..self.max_attempts).sum();
        self.timeout
            .saturating_mul(self.max_attempts)
            .saturating_add(self.backoff_base.saturating_mul(sleeps))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(30, Duration::from_secs(15), Duration::from_secs(60))
    }
}

/// One network exchange returning the response body.
pub trait Transport: Send + Sync {
    fn get(&self, request: &FetchRequest, timeout: Duration) -> Result<String, FetchError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReqwestTransport;

impl Transport for ReqwestTransport {
    fn get(&self, request: &FetchRequest, timeout: Duration) -> Result<String, FetchError> {
        let client = http_client().map_err(|err| FetchError::Transport(err.to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) else {
                continue;
            };
            headers.insert(name, value);
        }

        let resp = client
            .get(&request.url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .map_err(classify_reqwest_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        resp.text().map_err(|err| {
            if err.is_decode() {
                FetchError::Malformed(err.to_string())
            } else {
                classify_reqwest_error(err)
            }
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Transport(err.to_string())
    }
}

#[derive(Clone)]
pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn over_http(policy: RetryPolicy) -> Self {
        Self::new(Arc::new(ReqwestTransport), policy)
    }

    /// Runs the request until it succeeds, fails with a non-transient error,
    /// or the attempt budget is spent.
    pub fn fetch(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let max_attempts = self.policy.max_attempts;
        let mut last = FetchError::Transport("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            match self.transport.get(request, self.policy.timeout) {
                Ok(body) => return Ok(body),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    warn!(
                        url = %request.url,
                        attempt,
                        max_attempts,
                        error = %err,
                        "fetch attempt failed"
                    );
                    last = err;
                }
            }
            if attempt < max_attempts {
                let delay = self.policy.delay_after(attempt);
                debug!(url = %request.url, ?delay, "retrying after delay");
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }

    /// Fetches and hands the body to `parse`. Parse failures are not retried.
    pub fn fetch_parsed<T>(
        &self,
        request: &FetchRequest,
        parse: impl FnOnce(&str) -> Result<T, FetchError>,
    ) -> Result<T, FetchError> {
        let body = self.fetch(request)?;
        parse(&body)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<String, FetchError>>>,
        pub calls: AtomicU32,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<String, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn get(&self, _request: &FetchRequest, _timeout: Duration) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Timeout))
        }
    }

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(5), Duration::ZERO)
    }

    #[test]
    fn retries_transient_failures_until_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(FetchError::Timeout),
            Err(FetchError::Status(502)),
            Err(FetchError::Connect("refused".into())),
            Ok("body".into()),
        ]));
        let fetcher = ResilientFetcher::new(transport.clone(), quick_policy(5));
        let body = fetcher.fetch(&FetchRequest::get("http://x")).unwrap();
        assert_eq!(body, "body");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let fetcher = ResilientFetcher::new(transport.clone(), quick_policy(3));
        let err = fetcher.fetch(&FetchRequest::get("http://x")).unwrap_err();
        assert_eq!(
            err,
            FetchError::Exhausted {
                attempts: 3,
                last: Box::new(FetchError::Timeout)
            }
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn malformed_body_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(FetchError::malformed("bad utf8")),
            Ok("never reached".into()),
        ]));
        let fetcher = ResilientFetcher::new(transport.clone(), quick_policy(5));
        let err = fetcher.fetch(&FetchRequest::get("http://x")).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parse_failure_surfaces_once() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok("not json".into())]));
        let fetcher = ResilientFetcher::new(transport.clone(), quick_policy(5));
        let res: Result<u32, _> = fetcher.fetch_parsed(&FetchRequest::get("http://x"), |body| {
            body.parse::<u32>()
                .map_err(|err| FetchError::malformed(err.to_string()))
        });
        assert!(matches!(res, Err(FetchError::Malformed(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::new(4, Duration::from_secs(15), Duration::from_secs(60));
        assert_eq!(policy.delay_after(1), Duration::from_secs(60));
        assert_eq!(policy.delay_after(3), Duration::from_secs(180));
        assert_eq!(policy.worst_case(), Duration::from_secs(60 + 360));
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }
}
