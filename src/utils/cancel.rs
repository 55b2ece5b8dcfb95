//! Cancellation utilities
//!
//! Provides first-class cancellation handles for retries, streams and other
//! long-running operations. A handle combines an explicit cancellation token
//! with an optional deadline; both surface as [`LlmError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelHandle {
    /// Create a new cancel handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an absolute deadline. Reaching it counts as cancellation.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child handle: cancelled with its parent, but cancelling it leaves the parent alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Request cancellation. Any wrapped streams/futures observing this handle
    /// will stop as soon as possible. Dropping the cancelled stream will close
    /// the underlying HTTP connection so providers stop generating tokens.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if cancellation was requested or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_elapsed()
    }

    fn deadline_elapsed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The error returned to callers once this handle has fired.
    pub fn error(&self) -> LlmError {
        if !self.token.is_cancelled() && self.deadline_elapsed() {
            LlmError::Cancelled("deadline exceeded".to_string())
        } else {
            LlmError::Cancelled("operation cancelled by caller".to_string())
        }
    }

    /// Resolves when cancellation is requested or the deadline elapses.
    pub async fn cancelled(&self) -> LlmError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => self.error(),
                    _ = tokio::time::sleep_until(deadline) => {
                        LlmError::Cancelled("deadline exceeded".to_string())
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                self.error()
            }
        }
    }

    /// Race `future` against this handle. Cancellation wins ties.
    pub async fn run<F, T>(&self, future: F) -> Result<T, LlmError>
    where
        F: Future<Output = Result<T, LlmError>>,
    {
        if self.is_cancelled() {
            return Err(self.error());
        }
        tokio::select! {
            biased;
            err = self.cancelled() => Err(err),
            res = future => res,
        }
    }
}

/// Race `future` against an optional handle.
pub(crate) async fn run_cancellable<F, T>(
    cancel: Option<&CancelHandle>,
    future: F,
) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match cancel {
        Some(handle) => handle.run(future).await,
        None => future.await,
    }
}

/// Make a chunk stream cancellable and return its cancel handle.
///
/// Cancelling ends the stream with a single `Cancelled` error item; the inner
/// stream (and its connection) is dropped at that point.
pub fn make_cancellable_stream(
    stream: crate::streaming::ChunkStream,
) -> (crate::streaming::ChunkStream, CancelHandle) {
    let handle = CancelHandle::new();
    let observer = handle.clone();
    let mut inner = stream;
    let s = async_stream::stream! {
        use futures::StreamExt;
        loop {
            tokio::select! {
                biased;
                err = observer.cancelled() => {
                    yield Err(err);
                    break;
                }
                item = inner.next() => {
                    let Some(item) = item else { break };
                    yield item;
                }
            }
        }
    };
    (Box::pin(s), handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn cancel_wakes_pending_next_immediately() {
        // A stream that never yields and never ends.
        let pending: crate::streaming::ChunkStream =
            Box::pin(futures::stream::pending::<Result<crate::types::Chunk, LlmError>>());
        let (mut s, cancel) = make_cancellable_stream(pending);

        let waiter = tokio::spawn(async move { s.next().await });

        // Give the task a chance to poll and block on `next()`.
        tokio::task::yield_now().await;

        cancel.cancel();

        let out = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("cancel should wake the waiting task")
            .expect("task ok");

        assert!(matches!(out, Some(Err(LlmError::Cancelled(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_as_cancellation() {
        let handle = CancelHandle::new().with_timeout(Duration::from_secs(5));
        assert!(!handle.is_cancelled());

        let res: Result<(), LlmError> = handle
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        match res {
            Err(LlmError::Cancelled(msg)) => assert!(msg.contains("deadline")),
            other => panic!("expected deadline cancellation, got {other:?}"),
        }
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn child_follows_parent_but_not_reverse() {
        let parent = CancelHandle::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        let res = handle.run(async { Ok::<_, LlmError>(1) }).await;
        assert!(matches!(res, Err(LlmError::Cancelled(_))));
    }
}
