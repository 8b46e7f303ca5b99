use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::Arc;

use super::Value;
use crate::error::Rejection;

pub type Settlement = Result<Value, Rejection>;

enum Source {
    Settled(Settlement),
    Pending(Shared<BoxFuture<'static, Settlement>>),
}

/// A value that settles exactly once, to either a value or a rejection.
///
/// The underlying computation is driven by a single continuation; every clone
/// of the handle observes the same first settlement.
#[derive(Clone)]
pub struct Deferred {
    source: Arc<Source>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeferredState {
    Pending,
    Resolved(Value),
    Rejected(Rejection),
}

impl Deferred {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Settlement> + Send + 'static,
    {
        Self { source: Arc::new(Source::Pending(future.boxed().shared())) }
    }

    pub fn resolved(value: impl Into<Value>) -> Self {
        Self { source: Arc::new(Source::Settled(Ok(value.into()))) }
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Self { source: Arc::new(Source::Settled(Err(rejection))) }
    }

    /// Waits for the settlement. Already-settled handles complete immediately.
    pub fn settle(&self) -> BoxFuture<'static, Settlement> {
        match self.source.as_ref() {
            Source::Settled(settlement) => futures::future::ready(settlement.clone()).boxed(),
            Source::Pending(shared) => shared.clone().boxed(),
        }
    }

    /// Non-blocking snapshot. A pending computation only reports settlement
    /// once something has polled it.
    pub fn state(&self) -> DeferredState {
        let settlement = match self.source.as_ref() {
            Source::Settled(settlement) => Some(settlement),
            Source::Pending(shared) => shared.peek(),
        };
        match settlement {
            None => DeferredState::Pending,
            Some(Ok(value)) => DeferredState::Resolved(value.clone()),
            Some(Err(rejection)) => DeferredState::Rejected(rejection.clone()),
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self.state(), DeferredState::Pending)
    }

    /// Identity of the underlying computation, shared by all clones.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.source) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Deferred").field(&self.state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_resolved_settles_immediately() {
        let deferred = Deferred::resolved("done");
        assert_eq!(deferred.state(), DeferredState::Resolved(Value::from("done")));
        assert_eq!(deferred.settle().await, Ok(Value::from("done")));
    }

    #[tokio::test]
    async fn test_rejected_settles_with_reason() {
        let deferred = Deferred::rejected(Rejection::new("boom"));
        assert!(deferred.is_settled());
        assert_eq!(deferred.settle().await, Err(Rejection::new("boom")));
    }

    #[tokio::test]
    async fn test_pending_runs_once_for_all_clones() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let deferred = Deferred::pending(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, Rejection>(Value::from(7))
        });
        let other = deferred.clone();

        assert_eq!(deferred.state(), DeferredState::Pending);
        let (a, b) = tokio::join!(deferred.settle(), other.settle());
        assert_eq!(a, Ok(Value::from(7)));
        assert_eq!(b, Ok(Value::from(7)));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.state(), DeferredState::Resolved(Value::from(7)));
    }

    #[tokio::test]
    async fn test_dropped_observer_does_not_lose_settlement() {
        let deferred = Deferred::pending(async {
            tokio::task::yield_now().await;
            Ok::<_, Rejection>(Value::from("late"))
        });
        assert!(deferred.settle().now_or_never().is_none());
        assert_eq!(deferred.settle().await, Ok(Value::from("late")));
    }

    #[test]
    fn test_identity_is_shared_by_clones() {
        let deferred = Deferred::resolved(1);
        let clone = deferred.clone();
        let other = Deferred::resolved(1);
        assert!(deferred.ptr_eq(&clone));
        assert_eq!(deferred.id(), clone.id());
        assert!(!deferred.ptr_eq(&other));
    }
}
