//! Remote lossy PNG shrink service.
//!
//! Protocol, per file:
//!
//! 1. `POST <endpoint>` with the raw PNG bytes, `content-type: image/png`
//!    and a randomized browser `user-agent`.
//! 2. The service answers with JSON. Success carries `output.url`; an
//!    `error` key means the upload was refused (usually rate limiting).
//! 3. `GET output.url` and replace the local file with the result.
//!
//! Any failure along the way (transport error, `error` key, malformed
//! response, failed download) counts as one attempt. Attempts are bounded by
//! `max_attempts`, with exponential backoff plus jitter between them, capped
//! at `max_delay_ms`. After the last attempt the file is left as it was.
//!
//! HTTP goes through the [`ShrinkTransport`] trait so the retry protocol can
//! be tested against a scripted transport.

use super::{CompressError, Compressor};
use crate::config::RemoteConfig;
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Response body of the shrink endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShrinkResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output: Option<ShrinkOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShrinkOutput {
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// HTTP operations the shrink protocol needs.
pub trait ShrinkTransport {
    /// POST `body` as `image/png`; returns the response body text.
    fn post(&self, endpoint: &str, user_agent: &str, body: Vec<u8>)
    -> Result<String, CompressError>;

    /// GET `url`; returns the response bytes.
    fn get(&self, url: &str, user_agent: &str) -> Result<Vec<u8>, CompressError>;
}

/// Blocking `reqwest` transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, CompressError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CompressError::RemoteService(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn transport_error(e: reqwest::Error) -> CompressError {
    CompressError::RemoteService(e.to_string())
}

impl ShrinkTransport for HttpTransport {
    fn post(
        &self,
        endpoint: &str,
        user_agent: &str,
        body: Vec<u8>,
    ) -> Result<String, CompressError> {
        self.client
            .post(endpoint)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .map_err(transport_error)?
            .text()
            .map_err(transport_error)
    }

    fn get(&self, url: &str, user_agent: &str) -> Result<Vec<u8>, CompressError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?;
        Ok(response.bytes().map_err(transport_error)?.to_vec())
    }
}

// =============================================================================
// Randomness for jitter and user agents
// =============================================================================

static RNG_STATE: AtomicU64 = AtomicU64::new(0);

fn seed_state() -> u64 {
    let time_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let state = time_seed ^ ((std::process::id() as u64) << 32) ^ 0x9E37_79B9_7F4A_7C15;
    if state == 0 { 0xA5A5_5A5A_0123_4567 } else { state }
}

/// xorshift64 over a process-wide atomic state.
fn next_random() -> u64 {
    let mut current = RNG_STATE.load(Ordering::Relaxed);
    loop {
        let mut next = if current == 0 { seed_state() } else { current };
        next ^= next << 13;
        next ^= next >> 7;
        next ^= next << 17;

        match RNG_STATE.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => current = observed,
        }
    }
}

fn pick<'a>(items: &[&'a str]) -> &'a str {
    items[(next_random() % items.len() as u64) as usize]
}

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

/// A plausible desktop browser user agent, different on most calls.
pub fn random_user_agent() -> String {
    let platform = pick(PLATFORMS);
    let major = 112 + next_random() % 20;
    match next_random() % 3 {
        0 => format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.0.0 Safari/537.36"
        ),
        1 => format!("Mozilla/5.0 ({platform}; rv:{major}.0) Gecko/20100101 Firefox/{major}.0"),
        _ => format!(
            "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.0.0 Safari/537.36 Edg/{major}.0.0.0"
        ),
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// Bounded retry with exponential backoff and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.retry_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }

    /// Delay before retry number `attempt` (1 = first retry).
    ///
    /// `base * 2^(attempt-1)`, doubling at most 8 times, plus up to a third
    /// of that in jitter; never more than `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling = self.max_delay_ms.max(self.base_delay_ms);
        let exp = self
            .base_delay_ms
            .saturating_mul(1_u64 << attempt.saturating_sub(1).min(8));
        let capped = exp.min(ceiling);
        let jitter_bound = (capped / 3).max(1);
        let jitter = next_random() % (jitter_bound + 1);
        Duration::from_millis(capped.saturating_add(jitter).min(ceiling))
    }
}

// =============================================================================
// Compressor
// =============================================================================

/// PNG compressor backed by the remote shrink service.
pub struct RemoteShrink<T> {
    endpoint: String,
    policy: RetryPolicy,
    transport: T,
}

impl<T: ShrinkTransport> RemoteShrink<T> {
    pub fn new(endpoint: &str, policy: RetryPolicy, transport: T) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            policy,
            transport,
        }
    }

    /// One upload + download. Returns the shrunk bytes.
    fn attempt(&self, data: &[u8]) -> Result<Vec<u8>, CompressError> {
        let body = self
            .transport
            .post(&self.endpoint, &random_user_agent(), data.to_vec())?;

        let response: ShrinkResponse = serde_json::from_str(&body)
            .map_err(|e| CompressError::RemoteService(format!("malformed response: {e}")))?;

        if let Some(error) = response.error {
            let detail = response.message.unwrap_or_default();
            return Err(CompressError::RemoteService(
                format!("{error} {detail}").trim().to_string(),
            ));
        }

        let output = response
            .output
            .ok_or_else(|| CompressError::RemoteService("response has no output".into()))?;
        if let Some(size) = output.size {
            debug!("shrunk {} → {size} bytes", data.len());
        }

        let shrunk = self.transport.get(&output.url, &random_user_agent())?;
        if shrunk.is_empty() {
            return Err(CompressError::RemoteService("empty download".into()));
        }
        Ok(shrunk)
    }
}

impl<T: ShrinkTransport> Compressor for RemoteShrink<T> {
    fn name(&self) -> &str {
        "remote shrink"
    }

    fn compress(&self, path: &Path) -> Result<(), CompressError> {
        let data = std::fs::read(path)?;
        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                let delay = self.policy.delay_for(attempt - 1);
                info!(
                    "{}: retrying in {}ms (attempt {attempt}/{})",
                    path.display(),
                    delay.as_millis(),
                    self.policy.max_attempts
                );
                std::thread::sleep(delay);
            }

            match self.attempt(&data) {
                Ok(shrunk) => {
                    // Write beside the output, then swap, so a failed write
                    // never leaves a truncated cover behind.
                    let partial = path.with_extension("png.part");
                    std::fs::write(&partial, &shrunk)?;
                    std::fs::rename(&partial, path)?;
                    return Ok(());
                }
                Err(e) => {
                    debug!("{}: attempt {attempt} failed: {e}", path.display());
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(CompressError::RemoteService(format!(
            "gave up after {} attempts: {reason}",
            self.policy.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const OK_BODY: &str = r#"{"input":{"size":9000,"type":"image/png"},"output":{"size":4,"type":"image/png","url":"https://shrink.test/output/abc"}}"#;
    const ERROR_BODY: &str = r#"{"error":"TooManyRequests","message":"Slow down"}"#;

    enum Reply {
        Body(&'static str),
        Unreachable,
    }

    /// Scripted transport: POST replies are consumed in order; every GET
    /// returns `download`.
    struct ScriptedTransport {
        replies: Mutex<Vec<Reply>>,
        download: Vec<u8>,
        posts: Mutex<Vec<String>>,
        gets: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>, download: &[u8]) -> Self {
            Self {
                replies: Mutex::new(replies),
                download: download.to_vec(),
                posts: Mutex::new(Vec::new()),
                gets: Mutex::new(Vec::new()),
            }
        }
    }

    impl ShrinkTransport for &ScriptedTransport {
        fn post(
            &self,
            endpoint: &str,
            user_agent: &str,
            _body: Vec<u8>,
        ) -> Result<String, CompressError> {
            assert!(user_agent.starts_with("Mozilla/5.0"));
            self.posts.lock().unwrap().push(endpoint.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(CompressError::RemoteService("script exhausted".into()));
            }
            match replies.remove(0) {
                Reply::Body(b) => Ok(b.to_string()),
                Reply::Unreachable => Err(CompressError::RemoteService("connection refused".into())),
            }
        }

        fn get(&self, url: &str, _user_agent: &str) -> Result<Vec<u8>, CompressError> {
            self.gets.lock().unwrap().push(url.to_string());
            Ok(self.download.clone())
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    fn cover(tmp: &TempDir) -> std::path::PathBuf {
        let path = tmp.path().join("cover.png");
        std::fs::write(&path, vec![1u8; 9000]).unwrap();
        path
    }

    #[test]
    fn success_replaces_file_with_download() {
        let tmp = TempDir::new().unwrap();
        let path = cover(&tmp);
        let transport = ScriptedTransport::new(vec![Reply::Body(OK_BODY)], b"tiny");

        RemoteShrink::new("https://shrink.test/web/shrink", no_wait(3), &transport)
            .compress(&path)
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"tiny");
        assert_eq!(
            *transport.gets.lock().unwrap(),
            vec!["https://shrink.test/output/abc"]
        );
        assert!(!tmp.path().join("cover.png.part").exists());
    }

    #[test]
    fn error_key_is_retried() {
        let tmp = TempDir::new().unwrap();
        let path = cover(&tmp);
        let transport =
            ScriptedTransport::new(vec![Reply::Body(ERROR_BODY), Reply::Body(OK_BODY)], b"ok");

        RemoteShrink::new("e", no_wait(3), &transport)
            .compress(&path)
            .unwrap();
        assert_eq!(transport.posts.lock().unwrap().len(), 2);
        assert_eq!(std::fs::read(&path).unwrap(), b"ok");
    }

    #[test]
    fn malformed_response_and_transport_errors_are_retried() {
        let tmp = TempDir::new().unwrap();
        let path = cover(&tmp);
        let transport = ScriptedTransport::new(
            vec![
                Reply::Body("<html>502 Bad Gateway</html>"),
                Reply::Unreachable,
                Reply::Body(r#"{"input":{}}"#),
                Reply::Body(OK_BODY),
            ],
            b"ok",
        );

        RemoteShrink::new("e", no_wait(4), &transport)
            .compress(&path)
            .unwrap();
        assert_eq!(transport.posts.lock().unwrap().len(), 4);
    }

    #[test]
    fn gives_up_after_max_attempts_and_keeps_file() {
        let tmp = TempDir::new().unwrap();
        let path = cover(&tmp);
        let replies = (0..10).map(|_| Reply::Body(ERROR_BODY)).collect();
        let transport = ScriptedTransport::new(replies, b"never");

        let err = RemoteShrink::new("e", no_wait(3), &transport)
            .compress(&path)
            .unwrap_err();

        assert_eq!(transport.posts.lock().unwrap().len(), 3);
        assert!(transport.gets.lock().unwrap().is_empty());
        assert!(err.to_string().contains("TooManyRequests"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1u8; 9000]);
    }

    #[test]
    fn missing_file_is_io_error_without_upload() {
        let tmp = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![Reply::Body(OK_BODY)], b"x");

        let err = RemoteShrink::new("e", no_wait(3), &transport)
            .compress(&tmp.path().join("gone.png"))
            .unwrap_err();
        assert!(matches!(err, CompressError::Io(_)));
        assert!(transport.posts.lock().unwrap().is_empty());
    }

    #[test]
    fn response_parses_service_shape() {
        let r: ShrinkResponse = serde_json::from_str(OK_BODY).unwrap();
        let out = r.output.unwrap();
        assert_eq!(out.url, "https://shrink.test/output/abc");
        assert_eq!(out.size, Some(4));
        assert!(r.error.is_none());

        let e: ShrinkResponse = serde_json::from_str(ERROR_BODY).unwrap();
        assert_eq!(e.error.as_deref(), Some("TooManyRequests"));
        assert!(e.output.is_none());
    }

    // =========================================================================
    // RetryPolicy
    // =========================================================================

    #[test]
    fn delay_doubles_within_jitter() {
        let p = RetryPolicy {
            max_attempts: 8,
            base_delay_ms: 300,
            max_delay_ms: 60_000,
        };
        for _ in 0..20 {
            let first = p.delay_for(1).as_millis();
            let third = p.delay_for(3).as_millis();
            assert!((300..=400).contains(&first), "first retry {first}ms");
            assert!((1200..=1600).contains(&third), "third retry {third}ms");
        }
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let p = RetryPolicy {
            max_attempts: 30,
            base_delay_ms: 3000,
            max_delay_ms: 10_000,
        };
        for attempt in 1..30 {
            assert!(p.delay_for(attempt) <= Duration::from_millis(10_000));
        }
    }

    #[test]
    fn policy_from_config_has_at_least_one_attempt() {
        let config = RemoteConfig {
            max_attempts: 0,
            ..RemoteConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
        assert_eq!(
            RetryPolicy::from_config(&RemoteConfig::default()),
            RetryPolicy {
                max_attempts: 8,
                base_delay_ms: 3000,
                max_delay_ms: 60_000
            }
        );
    }

    #[test]
    fn user_agents_look_like_browsers() {
        for _ in 0..20 {
            let ua = random_user_agent();
            assert!(ua.starts_with("Mozilla/5.0 ("), "{ua}");
            assert!(PLATFORMS.iter().any(|p| ua.contains(p)), "{ua}");
        }
    }
}
