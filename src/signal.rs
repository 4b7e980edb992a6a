//! Shutdown signal handling for the watch loop.
//!
//! A first SIGINT/SIGTERM sets a flag the loop polls; a second one while the
//! flag is already set exits immediately with code 1.

use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to the shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request shutdown from code rather than a signal
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Register the termination signal handlers and return the flag they set.
pub fn setup_shutdown_handlers() -> Result<ShutdownFlag, std::io::Error> {
    let term_now = Arc::new(AtomicBool::new(false));

    for sig in TERM_SIGNALS {
        // Only fires once term_now is already true
        flag::register_conditional_shutdown(*sig, 1, Arc::clone(&term_now))?;
        flag::register(*sig, Arc::clone(&term_now))?;
    }

    Ok(ShutdownFlag(term_now))
}
