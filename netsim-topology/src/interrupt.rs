//! Cooperative cancellation, checked at the head of every per-router and per-subnet loop.
//!
//! The original tool relies on a signal handler flipping a `volatile int`; a forked child
//! re-installs the handler after `fork()` so `Ctrl-C` still reaches it. We get the same shape
//! with an `AtomicBool` shared across the fork (shared memory semantics of `fork()` mean each
//! child gets its own copy, so each process installs its own listener instead of relying on
//! shared state) plus `tokio::signal::ctrl_c` rather than `signal(2)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The standard POSIX convention for a process terminated by `SIGINT`.
pub const SIGINT_EXIT_CODE: i32 = 130;

#[derive(Clone)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Spawns a task on the current Tokio runtime that sets the flag the first time
    /// `Ctrl-C` is received. Must be called from within a runtime.
    pub fn install(&self) {
        let flag = self.0.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::Release);
            }
        });
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
