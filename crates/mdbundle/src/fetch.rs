//! Asset fetching: local file copies and bounded-concurrency remote downloads.
//!
//! Remote fetches are plain blocking GETs streamed into the asset file. The
//! number of simultaneous remote fetches is bounded by a counting semaphore
//! owned by the conversion session; local reads run inline and unbounded.
//!
//! There is deliberately no per-fetch timeout or cancellation: a hung
//! connection stalls the conversion.

use crate::error::{Error, Result};
use crate::progress::FetchObserver;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use url::Url;

const COPY_BUF_SIZE: usize = 8 * 1024;

/// Counting semaphore bounding simultaneous remote fetches.
///
/// Permits are RAII: dropping a [`Permit`] returns it to the pool and wakes
/// one waiter. Acquisition blocks the calling thread until a permit is free.
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with the given number of permits (at least one).
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits.max(1)),
            available: Condvar::new(),
        }
    }

    /// Take one permit, blocking until one is available.
    ///
    /// Consumes an `Arc` clone so the returned permit can move into a worker
    /// thread and release itself there.
    pub fn acquire(self: Arc<Self>) -> Permit {
        let mut count = self.permits.lock().unwrap();
        while *count == 0 {
            count = self.available.wait(count).unwrap();
        }
        *count -= 1;
        drop(count);
        Permit { semaphore: self }
    }
}

/// An acquired semaphore permit; released on drop.
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        *self.semaphore.permits.lock().unwrap() += 1;
        self.semaphore.available.notify_one();
    }
}

/// Fetches assets for one conversion.
///
/// Owns the concurrency semaphore and the progress observer; shared across
/// the walk thread and fetch worker threads via `Arc`.
pub struct Fetcher {
    semaphore: Arc<Semaphore>,
    observer: Arc<dyn FetchObserver>,
}

impl Fetcher {
    pub fn new(concurrent: usize, observer: Arc<dyn FetchObserver>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrent)),
            observer,
        }
    }

    /// Block until a remote-fetch permit is available.
    pub fn acquire(&self) -> Permit {
        Arc::clone(&self.semaphore).acquire()
    }

    /// Download `url` into `sink`, streaming chunks and reporting progress.
    ///
    /// Connection failures, transfer interruptions, and non-success statuses
    /// all map to [`Error::Network`] and are fatal for the conversion.
    pub fn fetch_remote(&self, reference: &str, url: &Url, sink: &mut File) -> Result<u64> {
        let response = ureq::get(url.as_str()).call().map_err(|err| match err {
            ureq::Error::Status(code, _) => Error::Network {
                reference: reference.to_string(),
                reason: format!("server returned status {}", code),
            },
            ureq::Error::Transport(transport) => Error::Network {
                reference: reference.to_string(),
                reason: transport.to_string(),
            },
        })?;

        let total = response
            .header("Content-Length")
            .and_then(|value| value.parse::<u64>().ok());

        let mut reader = response.into_reader();
        let mut buf = [0u8; COPY_BUF_SIZE];
        let mut transferred: u64 = 0;
        loop {
            let n = reader.read(&mut buf).map_err(|err| Error::Network {
                reference: reference.to_string(),
                reason: format!("transfer interrupted: {}", err),
            })?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).map_err(|err| {
                Error::filesystem(format!("Failed to write asset for {}", reference), err)
            })?;
            transferred += n as u64;
            self.observer.on_bytes(reference, transferred, total);
        }

        self.observer.on_fetched(reference, transferred);
        Ok(transferred)
    }

    /// Copy a local file, resolved relative to the source document's
    /// directory, into `sink`.
    pub fn fetch_local(&self, source_dir: &Path, reference: &str, sink: &mut File) -> Result<u64> {
        let path = source_dir.join(reference);
        let mut file = File::open(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                reference: reference.to_string(),
            },
            _ => Error::filesystem(format!("Failed to open {}", path.display()), err),
        })?;

        io::copy(&mut file, sink)
            .map_err(|err| Error::filesystem(format!("Failed to copy {}", path.display()), err))
    }
}
