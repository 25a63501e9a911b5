//! Byte-progress reporting for remote fetches.
//!
//! The engine reports transfer progress through the `FetchObserver` seam and
//! never depends on what consumes it. The CLI installs a stderr reporter when
//! `--verbose` is given; everything else uses the no-op observer.

/// Observer for bytes transferred during a fetch.
///
/// Implementations must be cheap: `on_bytes` is called once per read chunk
/// from worker threads.
pub trait FetchObserver: Send + Sync {
    /// Called after each chunk with the running total for this reference.
    /// `total` is the server-reported size, when known.
    fn on_bytes(&self, _reference: &str, _transferred: u64, _total: Option<u64>) {}

    /// Called once when a fetch completes successfully.
    fn on_fetched(&self, _reference: &str, _transferred: u64) {}
}

/// Observer that discards all progress events.
pub struct NullObserver;

impl FetchObserver for NullObserver {}

/// Observer that prints one line per completed fetch to stderr.
pub struct StderrReporter;

impl FetchObserver for StderrReporter {
    fn on_fetched(&self, reference: &str, transferred: u64) {
        eprintln!("  fetched {} ({})", reference, human_bytes(transferred));
    }
}

/// Format a byte count for display.
fn human_bytes(n: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if n >= MIB {
        format!("{:.1} MiB", n as f64 / MIB as f64)
    } else if n >= KIB {
        format!("{:.1} KiB", n as f64 / KIB as f64)
    } else {
        format!("{} B", n)
    }
}
