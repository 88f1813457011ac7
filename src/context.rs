use std::sync::Arc;
use std::time::Duration;

use http::Extensions;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-request ambient state threaded through every resolver call.
///
/// Clones share the cancellation token, the deadline and the resolver
/// budget, so cancelling any handle cancels the whole request.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    values: Arc<Extensions>,
    budget: Option<Arc<Semaphore>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext {
            cancellation: CancellationToken::new(),
            deadline: None,
            values: Arc::new(Extensions::new()),
            budget: None,
        }
    }

    /// Ties this request to an externally owned token, e.g. the connection's.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Stores a caller-supplied value, replacing any previous value of the
    /// same type.
    pub fn with_value<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.values).insert(value);
        self
    }

    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Completes once the request is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancellation.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancellation.cancelled().await,
        }
    }

    /// A context cancelled together with this one but cancellable on its own.
    pub fn child(&self) -> Self {
        ExecutionContext {
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Installs a fresh resolver budget of `permits`; zero removes the bound.
    pub(crate) fn with_budget(mut self, permits: u32) -> Self {
        self.budget = match permits {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n as usize))),
        };
        self
    }

    pub(crate) fn budget(&self) -> Option<&Arc<Semaphore>> {
        self.budget.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct User(&'static str);

    #[test]
    fn values_are_typed() {
        let ctx = ExecutionContext::new().with_value(User("admin"));
        assert_eq!(ctx.value::<User>(), Some(&User("admin")));
        assert_eq!(ctx.value::<String>(), None);
    }

    #[test]
    fn clones_share_cancellation() {
        let ctx = ExecutionContext::new();
        let other = ctx.clone();
        let child = ctx.child();
        other.cancel();
        assert!(ctx.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancellation_does_not_leak_upwards() {
        let ctx = ExecutionContext::new();
        let child = ctx.child();
        child.cancel();
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_as_cancellation() {
        let ctx = ExecutionContext::new().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_cancelled());
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
