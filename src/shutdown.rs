//! Process-wide terminate flag.
//!
//! SIGINT, SIGTERM and SIGHUP set a single atomic flag and nothing else; the
//! server loop polls it at the top of each iteration and exits cleanly.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

/// Cloneable handle to the terminate flag.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the termination signal handlers.
    pub fn install(&self) -> io::Result<()> {
        for signal in [SIGINT, SIGTERM, SIGHUP] {
            signal_hook::flag::register(signal, Arc::clone(&self.flag))?;
        }
        Ok(())
    }

    /// Has termination been requested?
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request termination programmatically (tests, embedding).
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
