// ── Retry / backoff executor ──
//
// Every cloud call goes through `RetryPolicy::call`: rate-limit and
// busy rejections sleep and retry the same call, anything else is
// returned at once. Asynchronous operations are then awaited with
// `wait_task`. Backend (de)registration is chunked by
// `apply_in_segments`, which stops at the first failing chunk.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lbsync_api::{Error, TaskStatus};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::metrics::MetricsSink;

/// How the executor reacts to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Request quota exceeded; wait the rate-limit period and retry.
    RateLimited,
    /// Load balancer busy with another task; wait briefly and retry.
    Busy,
    /// Propagate immediately.
    Fatal,
}

impl ErrorClass {
    pub fn label(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Busy => "busy",
            Self::Fatal => "fatal",
        }
    }
}

/// Maps a wire error onto an [`ErrorClass`]; one per provider.
pub type Classifier = fn(&Error) -> ErrorClass;

/// Time source for backoff sleeps.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry with per-class backoff.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait_rate_limited: Duration,
    wait_busy: Duration,
    poll_interval: Duration,
    classify: Classifier,
    sleeper: Arc<dyn Sleeper>,
    metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("wait_rate_limited", &self.wait_rate_limited)
            .field("wait_busy", &self.wait_busy)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, classify: Classifier, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            max_attempts: config.max_attempts,
            wait_rate_limited: config.wait_rate_limited,
            wait_busy: config.wait_busy,
            poll_interval: config.poll_interval,
            classify,
            sleeper: Arc::new(TokioSleeper),
            metrics,
        }
    }

    /// Replace the time source (tests inject a recording sleeper).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// How long to wait before retrying an error of `class`.
    pub fn backoff(&self, class: ErrorClass) -> Option<Duration> {
        match class {
            ErrorClass::RateLimited => Some(self.wait_rate_limited),
            ErrorClass::Busy => Some(self.wait_busy),
            ErrorClass::Fatal => None,
        }
    }

    /// Run `call` until it succeeds, fails fatally, or runs out of attempts.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, Error>> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let err = match call().await {
                Ok(value) => {
                    self.metrics.cloud_call(operation, true);
                    return Ok(value);
                }
                Err(err) => err,
            };

            let class = (self.classify)(&err);
            let Some(wait) = self.backoff(class) else {
                self.metrics.cloud_call(operation, false);
                return Err(err);
            };
            if attempt == self.max_attempts {
                warn!(
                    operation,
                    attempts = self.max_attempts,
                    reason = class.label(),
                    "cloud call retries exhausted"
                );
                break;
            }
            self.metrics.cloud_retry(operation, class.label());
            debug!(
                operation,
                attempt,
                reason = class.label(),
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "cloud call rejected, retrying"
            );
            self.sleeper.sleep(wait).await;
        }

        self.metrics.cloud_call(operation, false);
        Err(Error::RetriesExhausted {
            operation: operation.to_owned(),
            attempts: self.max_attempts,
        })
    }

    /// Poll an asynchronous task until it leaves the `Dealing` state.
    ///
    /// Each poll is itself retried through [`call`](Self::call).
    pub async fn wait_task<F, Fut>(
        &self,
        operation: &str,
        task_id: &str,
        mut poll: F,
    ) -> Result<(), Error>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<TaskStatus, Error>> + Send,
    {
        for _ in 0..self.max_attempts {
            match self.call(operation, &mut poll).await? {
                TaskStatus::Succeeded => return Ok(()),
                TaskStatus::Dealing => self.sleeper.sleep(self.poll_interval).await,
                status @ (TaskStatus::Failed | TaskStatus::Unknown(_)) => {
                    warn!(operation, task_id, status = status.code(), "cloud task failed");
                    return Err(Error::TaskFailed {
                        task_id: task_id.to_owned(),
                        status: status.code(),
                    });
                }
            }
        }
        Err(Error::RetriesExhausted {
            operation: format!("{operation} (task {task_id})"),
            attempts: self.max_attempts,
        })
    }
}

// ── Chunking ─────────────────────────────────────────────────────────

/// `items[cur..cur + len]`, clamped to the end of the list.
///
/// `None` when `cur` is out of bounds or `len` is zero.
pub fn segment<T>(items: &[T], cur: usize, len: usize) -> Option<&[T]> {
    if len == 0 || cur >= items.len() {
        return None;
    }
    let end = cur.saturating_add(len).min(items.len());
    items.get(cur..end)
}

/// Result of applying a list chunk by chunk.
#[derive(Debug)]
pub struct SegmentOutcome<E> {
    /// Length of the prefix that was applied successfully.
    pub applied: usize,
    /// The error that stopped the loop, if any.
    pub error: Option<E>,
}

impl<E> SegmentOutcome<E> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Apply `items` in sequential chunks of at most `len`, stopping at the
/// first failing chunk.
pub async fn apply_in_segments<T, E, F, Fut>(
    items: &[T],
    len: usize,
    mut apply: F,
) -> SegmentOutcome<E>
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let len = len.max(1);
    let mut cur = 0;
    while let Some(chunk) = segment(items, cur, len) {
        let size = chunk.len();
        if let Err(err) = apply(chunk.to_vec()).await {
            return SegmentOutcome {
                applied: cur,
                error: Some(err),
            };
        }
        cur += size;
    }
    SegmentOutcome {
        applied: cur,
        error: None,
    }
}

// ── Provider classifiers ─────────────────────────────────────────────

/// Classifier for the signed query API.
pub fn classify_rest(err: &Error) -> ErrorClass {
    classify_codes(err, lbsync_api::rest::CODE_RATE_LIMITED, lbsync_api::rest::CODE_LB_BUSY)
}

/// Classifier for the JSON SDK API.
pub fn classify_sdk(err: &Error) -> ErrorClass {
    classify_codes(err, lbsync_api::sdk::CODE_RATE_LIMITED, lbsync_api::sdk::CODE_LB_BUSY)
}

fn classify_codes(err: &Error, rate_limited: &str, busy: &str) -> ErrorClass {
    if err.has_code(rate_limited) {
        ErrorClass::RateLimited
    } else if err.has_code(busy) {
        ErrorClass::Busy
    } else {
        ErrorClass::Fatal
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::metrics::testing::RecordingMetrics;

    /// Records requested sleeps without waiting.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        pub slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn api(code: &str) -> Error {
        Error::Api {
            code: code.into(),
            message: String::new(),
            request_id: None,
        }
    }

    fn policy(max_attempts: u32, sleeper: &Arc<RecordingSleeper>) -> RetryPolicy {
        let config = RetryConfig {
            max_attempts,
            ..RetryConfig::default()
        };
        RetryPolicy::new(&config, classify_rest, Arc::new(NoopMetrics))
            .with_sleeper(Arc::clone(sleeper) as Arc<dyn Sleeper>)
    }

    #[tokio::test]
    async fn retries_rate_limit_then_succeeds() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = policy(5, &sleeper);
        let calls = AtomicU32::new(0);

        let result = policy
            .call("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(api("4400")),
                        1 => Err(api("4006")),
                        _ => Ok(n),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(
            *sleeper.slept.lock().unwrap(),
            vec![Duration::from_secs(10), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = policy(5, &sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .call("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(api("9999")) }
            })
            .await;

        assert!(result.unwrap_err().has_code("9999"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_surfaces_timeout() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = policy(3, &sleeper);

        let result: Result<(), _> = policy.call("op", || async { Err(api("4006")) }).await;

        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 3, .. })
        ));
        // No sleep after the final attempt.
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn retries_are_reported_to_metrics() {
        let metrics = Arc::new(RecordingMetrics::default());
        let config = RetryConfig {
            max_attempts: 2,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::new(&config, classify_sdk, metrics.clone())
            .with_sleeper(Arc::new(RecordingSleeper::default()));

        let calls = AtomicU32::new(0);
        let _ = policy
            .call("CreateListener", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(api(lbsync_api::sdk::CODE_RATE_LIMITED))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(
            metrics.events(),
            vec![
                "retry CreateListener rate_limited".to_string(),
                "call CreateListener success".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn final_attempt_is_not_counted_as_a_retry() {
        let metrics = Arc::new(RecordingMetrics::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let config = RetryConfig {
            max_attempts: 3,
            ..RetryConfig::default()
        };
        let policy = RetryPolicy::new(&config, classify_rest, metrics.clone())
            .with_sleeper(Arc::clone(&sleeper) as Arc<dyn Sleeper>);

        let result: Result<(), _> = policy
            .call("DeleteListener", || async { Err(api("4006")) })
            .await;

        assert!(matches!(
            result,
            Err(Error::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(
            metrics.events(),
            vec![
                "retry DeleteListener busy".to_string(),
                "retry DeleteListener busy".to_string(),
                "call DeleteListener error".to_string()
            ]
        );
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn wait_task_polls_until_done() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = policy(10, &sleeper);
        let polls = AtomicU32::new(0);

        policy
            .wait_task("op", "42", || {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(if n < 2 {
                        TaskStatus::Dealing
                    } else {
                        TaskStatus::Succeeded
                    })
                }
            })
            .await
            .unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn wait_task_fails_on_failed_or_unknown_status() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = policy(10, &sleeper);

        let failed = policy
            .wait_task("op", "42", || async { Ok(TaskStatus::Failed) })
            .await;
        assert!(matches!(failed, Err(Error::TaskFailed { status: 1, .. })));

        let unknown = policy
            .wait_task("op", "43", || async { Ok(TaskStatus::Unknown(7)) })
            .await;
        assert!(matches!(unknown, Err(Error::TaskFailed { status: 7, .. })));
    }

    #[tokio::test]
    async fn wait_task_gives_up_after_max_polls() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = policy(4, &sleeper);

        let result = policy
            .wait_task("op", "42", || async { Ok(TaskStatus::Dealing) })
            .await;
        assert!(matches!(result, Err(Error::RetriesExhausted { .. })));
    }

    #[test]
    fn segment_boundaries() {
        let ips = ["a", "b", "c", "d", "e"];
        assert_eq!(segment(&ips, 2, 5), Some(&ips[2..5]));
        assert_eq!(segment(&ips, 2, 5).map(<[_]>::len), Some(3));
        assert_eq!(segment(&ips, 0, 2), Some(&ips[0..2]));
        assert_eq!(segment(&ips, 5, 2), None);
        assert_eq!(segment(&ips, 9, 2), None);
        assert_eq!(segment(&ips, 0, 0), None);
        assert_eq!(segment::<&str>(&[], 0, 3), None);
    }

    #[tokio::test]
    async fn segments_stop_at_first_failure() {
        let items: Vec<u32> = (0..45).collect();
        let mut chunks = Vec::new();

        let outcome = apply_in_segments(&items, 20, |chunk| {
            chunks.push(chunk.len());
            let fail = chunk.first() == Some(&20);
            async move { if fail { Err("boom") } else { Ok(()) } }
        })
        .await;

        assert_eq!(chunks, vec![20, 20]);
        assert_eq!(outcome.applied, 20);
        assert_eq!(outcome.error, Some("boom"));
    }

    #[tokio::test]
    async fn segments_cover_whole_list() {
        let items: Vec<u32> = (0..45).collect();
        let mut chunks = Vec::new();

        let outcome: SegmentOutcome<()> = apply_in_segments(&items, 20, |chunk| {
            chunks.push(chunk.len());
            async { Ok(()) }
        })
        .await;

        assert_eq!(chunks, vec![20, 20, 5]);
        assert_eq!(outcome.applied, 45);
        assert!(outcome.is_complete());
    }

    #[test]
    fn classifiers_match_provider_codes() {
        assert_eq!(classify_rest(&api("4400")), ErrorClass::RateLimited);
        assert_eq!(classify_rest(&api("4006")), ErrorClass::Busy);
        assert_eq!(classify_rest(&api("RequestLimitExceeded")), ErrorClass::Fatal);
        assert_eq!(
            classify_sdk(&api("FailedOperation.ResourceInOperation")),
            ErrorClass::Busy
        );
        assert_eq!(
            classify_sdk(&Error::Http {
                status: 500,
                body: String::new()
            }),
            ErrorClass::Fatal
        );
    }
}
