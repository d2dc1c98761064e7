//! Bounded fixed-interval polling.
//!
//! Render jobs and pending payments are observed by hitting a status
//! endpoint once per interval until an attempt reports a terminal value,
//! the attempt budget runs out, or the [`CancellationToken`] fires.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Tunable parameters for one polling run.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between consecutive attempts.
    pub interval: Duration,
    /// Hard ceiling on attempts before the run gives up.
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 30,
        }
    }
}

impl PollConfig {
    /// Budget for payment-confirmation polling: the job-poll cadence with
    /// a much larger cap, since paying takes however long the user takes.
    pub fn payment_default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 200,
        }
    }
}

/// What one polling attempt concluded.
pub enum PollStep<T> {
    /// Nothing conclusive; try again after the interval.
    Continue,
    /// The run is over with this value.
    Terminal(T),
}

/// How a polling run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// An attempt produced a terminal value.
    Terminal(T),
    /// The attempt budget ran out without a terminal value.
    Exhausted,
    /// The cancellation token fired first.
    Cancelled,
}

/// Drive `op` once per interval until it reports a terminal value, the
/// attempt budget runs out, or `cancel` fires.
///
/// `op` receives the 1-based attempt number. The first attempt runs
/// immediately; the interval only separates attempts, so a run of N
/// attempts sleeps N-1 times.
pub async fn poll_until<T, F, Fut>(
    config: &PollConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    for attempt in 1..=config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            step = op(attempt) => {
                if let PollStep::Terminal(value) = step {
                    return PollOutcome::Terminal(value);
                }
            }
        }

        if attempt == config.max_attempts {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(config.interval) => {}
        }
    }

    PollOutcome::Exhausted
}
