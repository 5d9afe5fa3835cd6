//! Deadline-bound execution scopes.
//!
//! The context never starts a timer. Call-execution machinery that wants the
//! timeout enforced turns the context into a [`CallScope`] and runs the call
//! inside it.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::errors::{CallError, CallResult};

/// An execution scope with an optional deadline and a cancellation signal.
#[derive(Debug)]
pub struct CallScope {
    timeout: Duration,
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

/// Cancels the [`CallScope`] it was created with.
///
/// Dropping the handle leaves the scope running.
#[derive(Debug)]
pub struct CancelHandle {
    cancel: watch::Sender<bool>,
}

impl CallScope {
    /// Creates a scope that expires `timeout` from now.
    ///
    /// A zero timeout produces an unbounded scope.
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        Self::new(timeout, deadline)
    }

    /// Creates a scope without a deadline.
    pub fn unbounded() -> (Self, CancelHandle) {
        Self::new(Duration::ZERO, None)
    }

    fn new(timeout: Duration, deadline: Option<Instant>) -> (Self, CancelHandle) {
        let (cancel, cancelled) = watch::channel(false);
        (
            Self {
                timeout,
                deadline,
                cancelled,
            },
            CancelHandle { cancel },
        )
    }

    /// The instant at which the scope expires, if bounded.
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` for unbounded scopes.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Runs `future` to completion unless the scope expires or is cancelled
    /// first.
    pub async fn run<F>(self, future: F) -> CallResult<F::Output>
    where
        F: Future,
    {
        let Self {
            timeout,
            deadline,
            mut cancelled,
        } = self;

        tokio::select! {
            biased;
            () = wait_for_cancel(&mut cancelled) => Err(CallError::Cancelled),
            () = sleep_until(deadline) => Err(CallError::DeadlineExceeded(timeout)),
            output = future => Ok(output),
        }
    }
}

impl CancelHandle {
    /// Cancels the scope. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

async fn wait_for_cancel(cancelled: &mut watch::Receiver<bool>) {
    let outcome = cancelled.wait_for(|cancelled| *cancelled).await.map(|_| ());
    if outcome.is_err() {
        // Handle dropped without cancelling.
        std::future::pending::<()>().await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestContext;

    #[tokio::test(start_paused = true)]
    async fn completes_before_deadline() {
        let (scope, _cancel) = CallScope::with_timeout(Duration::from_millis(100));
        let result = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                7
            })
            .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn expires_at_deadline() {
        let (scope, _cancel) = CallScope::with_timeout(Duration::from_millis(100));
        let result = scope
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert_eq!(
            result,
            Err(CallError::DeadlineExceeded(Duration::from_millis(100)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_is_unbounded() {
        let ctx = RequestContext::new("");
        ctx.set_timeout(Duration::ZERO);
        let (scope, _cancel) = ctx.scope();
        assert!(scope.deadline().is_none());
        assert!(scope.remaining().is_none());

        let result = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                "done"
            })
            .await;
        assert_eq!(result, Ok("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn context_timeout_bounds_the_scope() {
        let ctx = RequestContext::new("");
        ctx.set_timeout(Duration::from_millis(250));
        let (scope, _cancel) = ctx.scope();
        assert_eq!(scope.remaining(), Some(Duration::from_millis(250)));

        let result = scope.run(std::future::pending::<()>()).await;
        assert_eq!(
            result,
            Err(CallError::DeadlineExceeded(Duration::from_millis(250)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_call() {
        let (scope, cancel) = CallScope::unbounded();
        let task = tokio::spawn(scope.run(std::future::pending::<()>()));
        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), Err(CallError::Cancelled));
    }

    #[tokio::test]
    async fn cancel_before_run_wins() {
        let (scope, cancel) = CallScope::unbounded();
        cancel.cancel();
        assert!(scope.is_cancelled());
        assert_eq!(scope.run(async { 1 }).await, Err(CallError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_does_not_cancel() {
        let (scope, cancel) = CallScope::with_timeout(Duration::from_millis(100));
        drop(cancel);
        let result = scope
            .run(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "ok"
            })
            .await;
        assert_eq!(result, Ok("ok"));
    }
}
