//! Run context and provider traits
//!
//! These traits let the engine run without depending on a concrete cloud
//! SDK, progress UI or prompt implementation.

use crate::error::{Error, Result};
use crate::lifecycle::Action;
use crate::types::TaskStatus;
use crate::value::TaskKey;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Provider handle carried by the context
///
/// The engine never calls provider APIs itself; it only needs to know which
/// task errors mean "the resource is already gone".
pub trait Provider: Send + Sync {
    /// Whether `err` is the provider's "not found" answer
    fn is_not_found(&self, err: &anyhow::Error) -> bool;
}

/// Shared cancellation flag
///
/// Clones observe the same flag, so a signal handler or another thread can
/// cancel a run in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Run-scoped context passed through every engine call
pub struct Context<C> {
    provider: C,
    cancel: CancelToken,
    jobs: usize,
}

impl<C> Context<C> {
    /// Create a context with default settings (4 discovery workers)
    pub fn new(provider: C) -> Self {
        Self {
            provider,
            cancel: CancelToken::new(),
            jobs: 4,
        }
    }

    /// Bound the discovery worker pool
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The provider clients
    pub fn provider(&self) -> &C {
        &self.provider
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// `err`, or [`Error::Cancelled`] once the run was cancelled
    ///
    /// A provider call abandoned because of cancellation fails with the
    /// provider's own error; the run reports the cancellation instead.
    pub(crate) fn cancelled_or(&self, err: Error) -> Error {
        if self.cancel.is_cancelled() {
            Error::Cancelled
        } else {
            err
        }
    }
}

/// Progress callback for reconcile runs
///
/// Discovery runs in parallel, so it is reported per wave rather than per task.
pub trait ProgressCallback: Send {
    /// Called before a discovery wave of `count` tasks
    fn on_discovery_start(&mut self, count: usize);

    /// Called after a discovery wave
    fn on_discovery_complete(&mut self);

    /// Called before a task is rendered
    fn on_render_start(&mut self, key: &TaskKey, action: Action);

    /// Called after a task render completes or fails
    fn on_render_complete(&mut self, key: &TaskKey, status: &TaskStatus);
}

/// Confirmation callback, asked once before a live run mutates anything
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool>;
}

impl<T: ProgressCallback + ?Sized> ProgressCallback for &mut T {
    fn on_discovery_start(&mut self, count: usize) {
        (**self).on_discovery_start(count);
    }
    fn on_discovery_complete(&mut self) {
        (**self).on_discovery_complete();
    }
    fn on_render_start(&mut self, key: &TaskKey, action: Action) {
        (**self).on_render_start(key, action);
    }
    fn on_render_complete(&mut self, key: &TaskKey, status: &TaskStatus) {
        (**self).on_render_complete(key, status);
    }
}

impl<T: ConfirmCallback + ?Sized> ConfirmCallback for &mut T {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        (**self).confirm(prompt)
    }
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_discovery_start(&mut self, _count: usize) {}
    fn on_discovery_complete(&mut self) {}
    fn on_render_start(&mut self, _key: &TaskKey, _action: Action) {}
    fn on_render_complete(&mut self, _key: &TaskKey, _status: &TaskStatus) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let ctx = Context::new(()).with_cancel(token.clone());
        assert!(ctx.check_cancelled().is_ok());

        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_jobs_is_at_least_one() {
        assert_eq!(Context::new(()).with_jobs(0).jobs(), 1);
    }
}
