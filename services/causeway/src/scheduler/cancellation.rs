use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;

/// Shared flag raised by the dispatcher when a task is no longer wanted.
///
/// Blocking work cannot be aborted from the outside, so it polls this between
/// units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

/// Cooperative time budget of a single task.
///
/// A budget handed out by the dispatcher also holds the task's pool permit, so
/// the slot stays taken for as long as any clone of the budget is alive.
#[derive(Debug, Clone)]
pub struct Budget {
    started: Instant,
    limit: Option<Duration>,
    token: CancellationToken,
    permit: Option<Arc<OwnedSemaphorePermit>>,
}

impl Budget {
    pub fn new(limit: Option<Duration>, token: CancellationToken) -> Self {
        Self {
            started: Instant::now(),
            limit,
            token,
            permit: None,
        }
    }

    pub(crate) fn holding(mut self, permit: Arc<OwnedSemaphorePermit>) -> Self {
        self.permit = Some(permit);
        self
    }

    pub fn unlimited() -> Self {
        Self::new(None, CancellationToken::new())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once the limit has passed or the dispatcher gave up on the task.
    pub fn is_exhausted(&self) -> bool {
        self.token.is_cancelled() || self.limit.is_some_and(|limit| self.elapsed() > limit)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
