//! Structured-logging helpers
//!
//! Thin conveniences over `tracing`: an opt-in subscriber for binaries and
//! tests, a timing wrapper, and an RAII scope guard. The library crates
//! emit events and never install a subscriber themselves.

use std::time::Instant;
use tracing::debug;

/// Install a global fmt subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops. Intended for
/// binaries and integration tests, never library code.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Await `future`, logging its duration at debug level.
pub async fn timed<F, T>(name: &str, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    debug!("starting: {name}");
    let result = future.await;
    debug!("completed: {name} in {:?}", start.elapsed());
    result
}

/// RAII guard logging scope entry and exit with elapsed time.
pub struct LogGuard {
    name: String,
    start: Instant,
}

impl LogGuard {
    /// Enter a named scope.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!("entering: {name}");
        Self {
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        debug!("exiting: {} after {:?}", self.name, self.start.elapsed());
    }
}
