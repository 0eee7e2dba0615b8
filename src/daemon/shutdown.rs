//! Signal-driven shutdown.
//!
//! SIGINT and SIGTERM are blocked in the calling thread (and so in every
//! thread spawned after it) and consumed synchronously by a watcher thread,
//! which raises a flag the event loop checks between iterations.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{SigSet, Signal};

/// Shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Create a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if the flag was raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the flag on the first SIGINT or SIGTERM.
    ///
    /// Call before spawning any other thread so the signals are blocked
    /// process-wide and only the watcher receives them.
    pub fn on_signals() -> io::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGINT);
        set.add(Signal::SIGTERM);
        set.thread_block().map_err(io::Error::from)?;

        let flag = Self::new();
        let raised = flag.clone();
        std::thread::Builder::new()
            .name("ccnd-signals".into())
            .spawn(move || match set.wait() {
                Ok(signal) => {
                    tracing::info!(?signal, "shutdown requested");
                    raised.raise();
                }
                Err(e) => tracing::error!(error = %e, "signal wait failed"),
            })?;
        Ok(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_shared_between_clones() {
        let flag = ShutdownFlag::new();
        let other = flag.clone();
        assert!(!flag.is_raised());
        other.raise();
        assert!(flag.is_raised());
    }
}
