use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::status::Status;

/// Per-call abort signals
///
/// A deadline and an explicit cancellation have the same effect: any in-flight
/// read or write is abandoned and the call ends with `DeadlineExceeded` or
/// `Cancelled`. Clones share the same cancellation token.
#[derive(Debug, Clone)]
pub struct CallOptions {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl CallOptions {
    pub fn new() -> Self {
        Self {
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Fire the cancellation signal
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// True once the call was cancelled or its deadline has passed
    pub fn is_complete(&self) -> bool {
        self.check().is_err()
    }

    /// Fail if either signal has already fired
    ///
    /// An expired deadline is reported in preference to cancellation.
    pub fn check(&self) -> Result<(), Status> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(deadline_exceeded());
            }
        }
        if self.cancellation.is_cancelled() {
            return Err(cancelled());
        }
        Ok(())
    }

    /// Drive a future to completion unless a signal fires first
    ///
    /// Signals are checked before the future is polled and again after it
    /// completes. When both have fired the deadline is reported, as in
    /// `check`.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, Status> {
        self.check()?;

        let output = match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => return Err(deadline_exceeded()),
                    _ = self.cancellation.cancelled() => return Err(self.fired()),
                    output = future => output,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.cancellation.cancelled() => return Err(cancelled()),
                    output = future => output,
                }
            }
        };

        self.check()?;
        Ok(output)
    }

    // The deadline timer may not have been polled yet when it has passed
    fn fired(&self) -> Status {
        self.check().err().unwrap_or_else(cancelled)
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::new()
    }
}

fn cancelled() -> Status {
    Status::cancelled("Call cancelled.")
}

fn deadline_exceeded() -> Status {
    Status::deadline_exceeded("Deadline exceeded.")
}
