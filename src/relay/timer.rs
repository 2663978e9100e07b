//! Cancellable timers with an observable live count.
//!
//! Every connect timeout and backoff delay is a [`Timer`]. A timer counts as
//! live from creation until it is dropped, whether it fired, was cancelled,
//! or the task holding it was torn down.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project_lite::pin_project;
use tokio::time::Sleep;

/// What a timer is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    ConnectTimeout,
    Backoff,
}

/// Source of timers; shares one live counter.
#[derive(Debug, Clone, Default)]
pub struct Timers {
    live: Arc<AtomicUsize>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer that completes after `duration`.
    pub fn start(&self, kind: TimerKind, duration: Duration) -> Timer {
        self.live.fetch_add(1, Ordering::SeqCst);
        Timer {
            sleep: tokio::time::sleep(duration),
            guard: LiveGuard {
                live: Arc::clone(&self.live),
            },
            kind,
        }
    }

    /// Timers created and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct LiveGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pin_project! {
    /// A single cancellable delay.
    #[derive(Debug)]
    pub struct Timer {
        #[pin]
        sleep: Sleep,
        guard: LiveGuard,
        kind: TimerKind,
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.project();
        let poll = this.sleep.poll(cx);
        if poll.is_ready() {
            tracing::trace!(kind = ?this.kind, "timer fired");
        }
        poll
    }
}
