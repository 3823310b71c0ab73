//! Readiness probing
//!
//! A cluster is eventually consistent: after an action, the only way to know
//! the effect landed is to poll for it. `Prober::wait_until` drives a
//! condition function until it is satisfied, fails fast, or runs out of
//! time, keeping the last observation so a timeout carries something more
//! useful than "timed out".

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use planeup_core::SetupError;

use crate::progress::ProgressSink;

/// One observation of a polled condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// The condition holds; stop waiting
    Satisfied,

    /// Not there yet; `detail` describes what was seen
    Pending(String),

    /// The condition can no longer become true (crash loop, terminal
    /// failure); abort immediately instead of waiting out the timeout
    Failed(String),
}

/// Why a wait ended without satisfaction
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline passed; `last_detail` is the most recent observation
    #[error("timed out after {waited:?}")]
    TimedOut {
        waited: Duration,
        last_detail: Option<String>,
    },

    /// The predicate reported a terminal failure
    #[error("{detail}")]
    Failed { waited: Duration, detail: String },

    /// The wait was cancelled from outside
    #[error("cancelled")]
    Cancelled,
}

impl WaitError {
    /// Convert into the taxonomy error for the thing being waited on
    pub fn into_setup(self, what: &str) -> SetupError {
        match self {
            WaitError::TimedOut { waited, last_detail } => SetupError::NotReady {
                what: what.to_string(),
                waited_secs: waited.as_secs() as i64,
                detail: last_detail.unwrap_or_else(|| "no observation recorded".to_string()),
            },
            WaitError::Failed { waited, detail } => SetupError::NotReady {
                what: what.to_string(),
                waited_secs: waited.as_secs() as i64,
                detail,
            },
            WaitError::Cancelled => SetupError::Interrupted,
        }
    }
}

/// Cooperative cancellation, observed at the top of every poll iteration
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Time source, injectable so tests run without real timers
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Progress is emitted every Nth poll, not every poll
const PROGRESS_CADENCE: u32 = 5;

/// Polls a condition function until satisfied, failed, or timed out
#[derive(Clone)]
pub struct Prober {
    clock: Arc<dyn Clock>,
    cancel: CancelFlag,
}

impl Prober {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            cancel: CancelFlag::new(),
        }
    }

    pub fn cancelled_by(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Poll `probe` every `interval` until it is satisfied or `timeout`
    /// elapses.
    ///
    /// A `Poll::Failed` observation or a probe error aborts immediately; an
    /// exceeded deadline reports the last `Pending` detail. At most one
    /// wait is outstanding per orchestrator invocation, so this takes
    /// `&self` and holds no state across calls.
    pub async fn wait_until<F, Fut>(
        &self,
        what: &str,
        timeout: Duration,
        interval: Duration,
        progress: &dyn ProgressSink,
        mut probe: F,
    ) -> Result<(), WaitError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = planeup_core::Result<Poll>> + Send,
    {
        let started = self.clock.now();
        // Absurd timeouts are capped rather than overflowing the deadline.
        let deadline = started
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(365));
        let mut last_detail: Option<String> = None;
        let mut polls: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(WaitError::Cancelled);
            }

            let waited = self.elapsed(started);
            match probe().await {
                Ok(Poll::Satisfied) => return Ok(()),
                Ok(Poll::Failed(detail)) => {
                    return Err(WaitError::Failed { waited, detail });
                }
                Ok(Poll::Pending(detail)) => {
                    tracing::trace!(what, %detail, "still waiting");
                    last_detail = Some(detail);
                }
                // A broken query is not "not yet ready"; abort with it.
                Err(e) => {
                    return Err(WaitError::Failed {
                        waited,
                        detail: e.to_string(),
                    });
                }
            }

            if self.clock.now() >= deadline {
                return Err(WaitError::TimedOut {
                    waited: self.elapsed(started),
                    last_detail,
                });
            }

            polls += 1;
            if polls % PROGRESS_CADENCE == 0 {
                progress.waiting(what, self.elapsed(started), last_detail.as_deref());
            }

            self.clock.sleep(interval).await;
        }
    }

    fn elapsed(&self, started: DateTime<Utc>) -> Duration {
        (self.clock.now() - started).to_std().unwrap_or_default()
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::FakeClock;
    use crate::progress::SilentProgress;
    use std::sync::Mutex;

    fn prober_with_fake_clock() -> (Prober, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        (Prober::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_satisfied_on_first_poll() {
        let (prober, _clock) = prober_with_fake_clock();
        let result = prober
            .wait_until(
                "anything",
                Duration::from_secs(10),
                Duration::from_secs(1),
                &SilentProgress,
                || async { Ok(Poll::Satisfied) },
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_satisfied_after_retries() {
        let (prober, _clock) = prober_with_fake_clock();
        let attempts = Mutex::new(0);
        let result = prober
            .wait_until(
                "pods",
                Duration::from_secs(60),
                Duration::from_secs(1),
                &SilentProgress,
                || {
                    let mut n = attempts.lock().unwrap();
                    *n += 1;
                    let current = *n;
                    async move {
                        if current < 4 {
                            Ok(Poll::Pending(format!("{current} of 4")))
                        } else {
                            Ok(Poll::Satisfied)
                        }
                    }
                },
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(*attempts.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_timeout_carries_last_detail() {
        let (prober, _clock) = prober_with_fake_clock();
        let attempts = Mutex::new(0);
        let err = prober
            .wait_until(
                "pods",
                Duration::from_secs(10),
                Duration::from_secs(2),
                &SilentProgress,
                || {
                    let mut n = attempts.lock().unwrap();
                    *n += 1;
                    let current = *n;
                    async move { Ok(Poll::Pending(format!("observation #{current}"))) }
                },
            )
            .await
            .unwrap_err();

        match err {
            WaitError::TimedOut { last_detail, .. } => {
                // The detail must be the most recent observation, not the
                // first and not a generic message.
                let detail = last_detail.unwrap();
                let total = *attempts.lock().unwrap();
                assert_eq!(detail, format!("observation #{total}"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_aborts_before_timeout() {
        let (prober, clock) = prober_with_fake_clock();
        let attempts = Mutex::new(0);
        let err = prober
            .wait_until(
                "pods",
                Duration::from_secs(3600),
                Duration::from_secs(1),
                &SilentProgress,
                || {
                    let mut n = attempts.lock().unwrap();
                    *n += 1;
                    let current = *n;
                    async move {
                        if current < 3 {
                            Ok(Poll::Pending("starting".to_string()))
                        } else {
                            Ok(Poll::Failed("pod crash-looping (7 restarts)".to_string()))
                        }
                    }
                },
            )
            .await
            .unwrap_err();

        match err {
            WaitError::Failed { detail, .. } => assert!(detail.contains("crash-looping")),
            other => panic!("unexpected: {other:?}"),
        }
        // Aborted long before the one-hour deadline.
        assert!(clock.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_probe_error_aborts() {
        let (prober, _clock) = prober_with_fake_clock();
        let err = prober
            .wait_until(
                "provider",
                Duration::from_secs(30),
                Duration::from_secs(1),
                &SilentProgress,
                || async {
                    Err(SetupError::invalid_config("query exploded"))
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_observed_at_loop_top() {
        let flag = CancelFlag::new();
        flag.cancel();
        let (prober, _clock) = prober_with_fake_clock();
        let prober = prober.cancelled_by(flag);

        let err = prober
            .wait_until(
                "pods",
                Duration::from_secs(30),
                Duration::from_secs(1),
                &SilentProgress,
                || async { Ok(Poll::Pending("never checked".to_string())) },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WaitError::Cancelled));
    }

    #[test]
    fn test_wait_error_into_setup_keeps_detail() {
        let err = WaitError::TimedOut {
            waited: Duration::from_secs(300),
            last_detail: Some("2/3 pods ready".to_string()),
        };
        match err.into_setup("crossplane pods") {
            SetupError::NotReady { what, waited_secs, detail } => {
                assert_eq!(what, "crossplane pods");
                assert_eq!(waited_secs, 300);
                assert_eq!(detail, "2/3 pods ready");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_cancelled_wait_maps_to_interrupted() {
        assert!(WaitError::Cancelled.into_setup("pods").is_interrupted());
    }
}
