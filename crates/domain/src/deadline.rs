//! Request-wide deadline and cancellation scope.
//!
//! A run computes one absolute [`Deadline`] at start. Every downstream call
//! receives a [`CallScope`] derived from it, optionally tightened by an
//! operation-specific timeout, and sharing the caller's cancellation token.
//! The earliest of the three always governs.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scoped operation stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupt {
    #[error("request aborted by client")]
    Cancelled,
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// An absolute expiry instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before expiry, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The earlier of this deadline and `now + timeout`.
    pub fn tightened(&self, timeout: Option<Duration>) -> Self {
        match timeout {
            Some(t) => (*self).min(Self::after(t)),
            None => *self,
        }
    }
}

/// The cancellation context handed to every network or subprocess round trip.
#[derive(Debug, Clone)]
pub struct CallScope {
    deadline: Deadline,
    cancel: CancellationToken,
}

impl CallScope {
    pub fn new(deadline: Deadline, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    /// A scope that is never cancelled and expires after `budget`.
    pub fn detached(budget: Duration) -> Self {
        Self::new(Deadline::after(budget), CancellationToken::new())
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.remaining()
    }

    /// A child scope bounded additionally by `timeout`, sharing cancellation.
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        Self {
            deadline: self.deadline.tightened(timeout),
            cancel: self.cancel.clone(),
        }
    }

    /// Proactive check, used at step boundaries before any I/O starts.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if self.deadline.is_expired() {
            return Err(Interrupt::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the scope is cancelled or expires first.
    ///
    /// Dropping the inner future aborts whatever it was doing (an in-flight
    /// HTTP request, a pending RPC slot wait). Cancellation is polled first so
    /// a simultaneous cancel and expiry reports `Cancelled`.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep_until(self.deadline.instant()) => Err(Interrupt::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_never_increases() {
        let deadline = Deadline::after(Duration::from_secs(10));
        let first = deadline.remaining();
        tokio::time::advance(Duration::from_secs(3)).await;
        let second = deadline.remaining();
        assert!(second <= first);
        assert_eq!(second, Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_saturates_at_zero() {
        let deadline = Deadline::after(Duration::from_millis(5));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn tightened_picks_earliest() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert_eq!(
            deadline.tightened(Some(Duration::from_secs(2))).remaining(),
            Duration::from_secs(2)
        );
        assert_eq!(
            deadline.tightened(Some(Duration::from_secs(60))).remaining(),
            Duration::from_secs(10)
        );
        assert_eq!(deadline.tightened(None), deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_completes_fast_future() {
        let scope = CallScope::detached(Duration::from_secs(1));
        let out = scope.guard(async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn guard_reports_deadline() {
        let scope = CallScope::detached(Duration::from_millis(100));
        let out = scope
            .guard(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupt::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn guard_reports_cancellation() {
        let token = CancellationToken::new();
        let scope = CallScope::new(Deadline::after(Duration::from_secs(60)), token.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let out = scope
            .guard(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        canceller.await.unwrap();
        assert_eq!(out, Err(Interrupt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn child_scope_shares_cancellation() {
        let token = CancellationToken::new();
        let parent = CallScope::new(Deadline::after(Duration::from_secs(60)), token.clone());
        let child = parent.with_timeout(Some(Duration::from_secs(1)));
        assert!(child.remaining() <= Duration::from_secs(1));
        token.cancel();
        assert_eq!(child.check(), Err(Interrupt::Cancelled));
    }

    #[test]
    fn cancel_wins_over_expiry_in_check() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let token = CancellationToken::new();
            token.cancel();
            let scope = CallScope::new(Deadline::after(Duration::ZERO), token);
            assert_eq!(scope.check(), Err(Interrupt::Cancelled));
        });
    }
}
