//! Conversion orchestration: one document in, one published bundle out.
//!
//! All per-conversion state (scratch directory, fetch semaphore, rewrite
//! tables) lives in a session owned by a single `convert` call; there are no
//! process-wide singletons. Documents are converted one at a time.

use crate::bundle::{self, ScratchBundle};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::progress::FetchObserver;
use crate::walker::{self, RewriteTables};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Everything needed to convert one Markdown document.
///
/// The creation and modification instants are supplied by the caller (from
/// filesystem metadata or git history); the engine only applies them.
pub struct ConvertRequest {
    /// Raw bytes of the source document
    pub contents: Vec<u8>,
    /// Absolute path of the source document; relative references resolve
    /// against its directory
    pub source_path: PathBuf,
    /// Bundle creation instant
    pub created: SystemTime,
    /// Bundle modification instant
    pub modified: SystemTime,
    /// Destination bundle path, or a directory to publish into
    pub destination: PathBuf,
    /// Rewrite non-remote links into attachment placeholders
    pub process_attachments: bool,
    /// Optional trailer text; `%f` expands to the source filename
    pub trailer: Option<String>,
    /// Maximum simultaneous remote fetches
    pub concurrent: usize,
    /// Progress side-channel for remote fetches
    pub observer: Arc<dyn FetchObserver>,
}

/// Per-conversion state shared between the walk and the fetch workers.
pub(crate) struct Session {
    pub(crate) source_dir: PathBuf,
    pub(crate) process_attachments: bool,
    pub(crate) scratch: ScratchBundle,
    pub(crate) fetcher: Arc<Fetcher>,
    pub(crate) tables: Arc<RewriteTables>,
}

/// Convert one document into a published bundle, returning its path.
///
/// Fail-fast: any parse, fetch, or filesystem error aborts the conversion
/// with nothing visible at the destination. On failure after scratch
/// creation, the hidden scratch directory is left behind for diagnosis.
pub fn convert(request: ConvertRequest) -> Result<PathBuf> {
    let text = String::from_utf8(request.contents).map_err(|err| Error::Parse {
        path: request.source_path.clone(),
        reason: format!("document is not valid UTF-8: {}", err),
    })?;

    let source_dir = match request.source_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let final_path = bundle::resolve_destination(&request.destination, &request.source_path);
    let scratch = ScratchBundle::create(&final_path)?;

    let session = Session {
        source_dir,
        process_attachments: request.process_attachments,
        scratch,
        fetcher: Arc::new(Fetcher::new(request.concurrent, request.observer)),
        tables: Arc::new(RewriteTables::default()),
    };

    // The walk joins every spawned fetch before returning, so all asset
    // files are complete before substitution starts.
    walker::walk(&text, &session)?;

    let Session {
        scratch, tables, ..
    } = session;

    let mut output = bundle::apply_image_rewrites(&text, &tables.images_snapshot());
    output = bundle::apply_link_rewrites(&output, &tables.links_snapshot());

    if let Some(trailer) = request.trailer.as_deref().filter(|t| !t.is_empty()) {
        bundle::append_trailer(&mut output, trailer, &source_file_name(&request.source_path));
    }

    scratch.write_document(&output)?;
    scratch.write_manifest()?;
    bundle::stamp_times(scratch.root(), request.created, request.modified)?;
    scratch.publish(&final_path)
}

fn source_file_name(source_path: &Path) -> String {
    source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}
