//! 重複取得資源狀態，直到離開等待中的狀態或逾時。

use std::{
    fmt,
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::trace;

/// 預設的輪詢逾時時間。
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(3600);
/// 預設的輪詢間隔。
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 帶有狀態欄位、可以被輪詢的資源。
pub trait Pollable: fmt::Debug {
    type Status: PartialEq + fmt::Display;

    fn status(&self) -> &Self::Status;
}

/// 輪詢逾時，保留最後一次取得的狀態以便診斷。
#[derive(Debug, Error)]
#[error("Polling timed out after {elapsed:?}, last status {last_status}: {last_state}")]
pub struct PollTimeout {
    pub elapsed: Duration,
    pub last_status: String,
    pub last_state: String,
}

/// 輪詢器設定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Poller {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Poller { timeout, interval }
    }

    /// 呼叫 `fetch` 直到狀態不在 `pending` 之中。
    ///
    /// 第一次取得前不等待。每次取得後才檢查是否逾時，逾時時回傳
    /// [`PollTimeout`]（轉換為呼叫端的錯誤型別）。`fetch` 的錯誤直接回傳。
    pub fn poll_until<T, E, F>(&self, mut fetch: F, pending: &[T::Status]) -> Result<T, E>
    where
        T: Pollable,
        E: From<PollTimeout>,
        F: FnMut() -> Result<T, E>,
    {
        let started = Instant::now();

        loop {
            let state = fetch()?;
            if !pending.contains(state.status()) {
                return Ok(state);
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                return Err(PollTimeout {
                    elapsed,
                    last_status: state.status().to_string(),
                    last_state: format!("{:?}", state),
                }
                .into());
            }

            trace!(status = %state.status(), "still pending, waiting");
            thread::sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Phase {
        Pending,
        Processing,
        Done,
    }

    impl fmt::Display for Phase {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    #[derive(Debug)]
    struct Resource {
        phase: Phase,
    }

    impl Pollable for Resource {
        type Status = Phase;

        fn status(&self) -> &Phase {
            &self.phase
        }
    }

    #[derive(Debug, Error)]
    enum TestError {
        #[error(transparent)]
        Timeout(#[from] PollTimeout),
        #[error("fetch failed")]
        Fetch,
    }

    fn fast() -> Poller {
        Poller::new(Duration::from_secs(5), Duration::from_millis(1))
    }

    #[test]
    fn test_defaults() {
        let poller = Poller::default();
        assert_eq!(poller.timeout, Duration::from_secs(3600));
        assert_eq!(poller.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_returns_first_non_pending_state_without_waiting() {
        let calls = Cell::new(0);
        let started = Instant::now();
        let result: Result<Resource, TestError> = Poller::default().poll_until(
            || {
                calls.set(calls.get() + 1);
                Ok(Resource { phase: Phase::Done })
            },
            &[Phase::Pending],
        );
        assert_eq!(result.unwrap().phase, Phase::Done);
        assert_eq!(calls.get(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_waits_through_every_pending_status() {
        let script = [Phase::Pending, Phase::Processing, Phase::Pending, Phase::Done];
        let calls = Cell::new(0);
        let result: Result<Resource, TestError> = fast().poll_until(
            || {
                let phase = script[calls.get()];
                calls.set(calls.get() + 1);
                Ok(Resource { phase })
            },
            &[Phase::Pending, Phase::Processing],
        );
        assert_eq!(result.unwrap().phase, Phase::Done);
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_timeout_carries_last_state() {
        let poller = Poller::new(Duration::ZERO, Duration::from_millis(1));
        let result: Result<Resource, TestError> = poller.poll_until(
            || Ok(Resource { phase: Phase::Processing }),
            &[Phase::Processing],
        );
        match result {
            Err(TestError::Timeout(timeout)) => {
                assert_eq!(timeout.last_status, "Processing");
                assert!(timeout.last_state.contains("Processing"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_error_is_returned() {
        let result: Result<Resource, TestError> =
            fast().poll_until(|| Err(TestError::Fetch), &[Phase::Pending]);
        assert!(matches!(result, Err(TestError::Fetch)));
    }
}
