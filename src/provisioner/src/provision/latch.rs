//! Countdown latch gating the masters-then-nodes ordering.

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Barrier counting down to zero. Tolerates overshooting `count_down`
/// calls; waiters release when the count reaches zero or the context is
/// cancelled.
#[derive(Clone)]
pub struct CountdownLatch {
    inner: Arc<watch::Sender<usize>>,
}

impl CountdownLatch {
    pub fn new(count: usize) -> Self {
        let (tx, _rx) = watch::channel(count);
        CountdownLatch {
            inner: Arc::new(tx),
        }
    }

    /// Decrement the latch, never below zero.
    pub fn count_down(&self) {
        self.inner.send_modify(|count| *count = count.saturating_sub(1));
    }

    pub fn remaining(&self) -> usize {
        *self.inner.borrow()
    }

    /// Block until the count reaches zero or the context cancels.
    /// Returns true when the latch actually released.
    pub async fn wait(&self, ctx: &CancellationToken) -> bool {
        let mut rx = self.inner.subscribe();
        loop {
            if *rx.borrow() == 0 {
                return true;
            }
            tokio::select! {
                _ = ctx.cancelled() => return *rx.borrow() == 0,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return *rx.borrow() == 0;
                    }
                }
            }
        }
    }
}
