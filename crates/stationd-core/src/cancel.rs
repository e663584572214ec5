//! Cooperative cancellation token (spec §4.E: operations must observe
//! cancellation at safe checkpoints rather than being killed outright).
//!
//! Shared between `stationd-scheduler` (which owns cancellation requests)
//! and `stationd-provider` (whose `CloudProvider` implementations poll it
//! between steps of a multi-call operation like `launch` or template apply).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    canceled: AtomicBool,
    notify: Notify,
}

/// A cloneable handle; cloning shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this token canceled and wake any task blocked in
    /// [`CancellationToken::canceled`].
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancellationToken::cancel`] has been called.
    /// Implementations poll this between the steps of a long-running
    /// provider call so cancellation is observed promptly without being
    /// mid-call-interrupted.
    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        let notified = self.inner.notify.notified();
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canceled_resolves_after_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_canceled());
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.canceled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_canceled());
    }
}
