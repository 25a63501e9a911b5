//! Bundle assembly: scratch directory, substitution, manifest, publish.
//!
//! A bundle is assembled in a hidden scratch directory created inside the
//! destination's parent directory, so the final publish is one atomic
//! same-filesystem rename. Nothing is ever visible at the destination path
//! until that rename succeeds; a failure before it leaves the scratch
//! directory orphaned on disk and reports the error.

use crate::error::{Error, Result};
use crate::walker::LinkRewrite;
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::time::SystemTime;

pub const BUNDLE_EXTENSION: &str = "textbundle";
pub const DOCUMENT_FILE: &str = "text.markdown";
pub const MANIFEST_FILE: &str = "info.json";
pub const ASSETS_DIR: &str = "assets";

const CREATOR_IDENTIFIER: &str = "com.mdbundle.cli";

/// Fixed bundle manifest, serialized byte-for-byte identically on every run.
#[derive(Serialize)]
struct Manifest {
    transient: bool,
    #[serde(rename = "type")]
    bundle_type: &'static str,
    #[serde(rename = "creatorIdentifier")]
    creator_identifier: &'static str,
    version: u32,
}

fn manifest_json() -> Result<String> {
    let manifest = Manifest {
        transient: true,
        bundle_type: "net.daringfireball.markdown",
        creator_identifier: CREATOR_IDENTIFIER,
        version: 2,
    };
    let mut json = serde_json::to_string_pretty(&manifest)
        .map_err(|err| Error::filesystem("Failed to serialize bundle manifest", err.into()))?;
    json.push('\n');
    Ok(json)
}

/// Resolve where the published bundle will live.
///
/// A destination that is an existing directory receives
/// `<dir>/<source-file-name>.textbundle`; anything else is used as the
/// bundle path itself.
pub fn resolve_destination(destination: &Path, source_path: &Path) -> PathBuf {
    if destination.is_dir() {
        let name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        destination.join(format!("{}.{}", name, BUNDLE_EXTENSION))
    } else {
        destination.to_path_buf()
    }
}

/// Not-yet-published working directory for one bundle.
pub struct ScratchBundle {
    root: PathBuf,
    assets_dir: PathBuf,
}

impl ScratchBundle {
    /// Create the hidden scratch directory next to the final bundle path.
    ///
    /// Nothing ever deletes a scratch directory automatically: a conversion
    /// that fails after this point leaves it behind.
    pub fn create(final_path: &Path) -> Result<Self> {
        let parent = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bundle".to_string());

        let base = format!(".{}.{}", name, process::id());
        let mut root = parent.join(&base);
        let mut attempt = 0;
        loop {
            match fs::create_dir(&root) {
                Ok(()) => break,
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt < 16 => {
                    attempt += 1;
                    root = parent.join(format!("{}.{}", base, attempt));
                }
                Err(err) => {
                    return Err(Error::filesystem(
                        format!("Failed to create scratch directory in {}", parent.display()),
                        err,
                    ))
                }
            }
        }

        let assets_dir = root.join(ASSETS_DIR);
        fs::create_dir(&assets_dir).map_err(|err| {
            Error::filesystem(
                format!("Failed to create assets directory {}", assets_dir.display()),
                err,
            )
        })?;

        Ok(Self { root, assets_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create (truncating) an asset file. Distinct references deriving the
    /// same filename silently overwrite each other.
    pub fn create_asset(&self, filename: &str) -> Result<File> {
        let path = self.assets_dir.join(filename);
        File::create(&path).map_err(|err| {
            Error::filesystem(format!("Failed to create asset file {}", path.display()), err)
        })
    }

    pub fn write_document(&self, text: &str) -> Result<()> {
        let path = self.root.join(DOCUMENT_FILE);
        fs::write(&path, text)
            .map_err(|err| Error::filesystem(format!("Failed to write {}", path.display()), err))
    }

    pub fn write_manifest(&self) -> Result<()> {
        let path = self.root.join(MANIFEST_FILE);
        fs::write(&path, manifest_json()?)
            .map_err(|err| Error::filesystem(format!("Failed to write {}", path.display()), err))
    }

    /// Atomically publish the bundle at its final path.
    pub fn publish(self, final_path: &Path) -> Result<PathBuf> {
        fs::rename(&self.root, final_path).map_err(|err| {
            Error::filesystem(
                format!("Failed to publish bundle to {}", final_path.display()),
                err,
            )
        })?;
        Ok(final_path.to_path_buf())
    }
}

/// Replace every occurrence of each image reference with its asset path.
///
/// Literal substring replacement, applied in sorted reference order. A
/// reference that does not occur leaves the text unchanged.
pub fn apply_image_rewrites(text: &str, rewrites: &BTreeMap<String, String>) -> String {
    let mut output = text.to_string();
    for (reference, asset_path) in rewrites {
        output = output.replace(reference, asset_path);
    }
    output
}

/// Replace each attachment link's markup span with its placeholder.
///
/// The pattern scopes to the Markdown link syntax around the (escaped)
/// destination. When two distinct links share identical destination text,
/// both spans match and are rewritten identically; a known limitation.
pub fn apply_link_rewrites(text: &str, rewrites: &[LinkRewrite]) -> String {
    let mut output = text.to_string();
    for rewrite in rewrites {
        let pattern = format!(
            r"\[[^\]]*\]\([^)]*{}[^)]*\)",
            regex::escape(&rewrite.destination)
        );
        // The destination is escaped, so the pattern always compiles
        let re = Regex::new(&pattern).unwrap();
        output = re
            .replace_all(&output, NoExpand(&rewrite.placeholder))
            .into_owned();
    }
    output
}

/// Expand `%f` to the source filename and append the trailer on its own line.
pub fn append_trailer(text: &mut String, trailer: &str, source_name: &str) {
    let expanded = trailer.replace("%f", source_name);
    text.push('\n');
    text.push_str(&expanded);
    text.push('\n');
}

/// Stamp the bundle directory's timestamps to the caller-supplied instants.
///
/// The modification time is set everywhere; the creation (birth) time only on
/// platforms whose filesystem APIs allow setting it.
pub fn stamp_times(path: &Path, created: SystemTime, modified: SystemTime) -> Result<()> {
    let file = File::open(path)
        .map_err(|err| Error::filesystem(format!("Failed to open {}", path.display()), err))?;

    let times = fs::FileTimes::new().set_modified(modified);
    #[cfg(target_os = "macos")]
    let times = {
        use std::os::macos::fs::FileTimesExt;
        times.set_created(created)
    };
    #[cfg(windows)]
    let times = {
        use std::os::windows::fs::FileTimesExt;
        times.set_created(created)
    };
    #[cfg(not(any(target_os = "macos", windows)))]
    let _ = created;

    file.set_times(times).map_err(|err| {
        Error::filesystem(format!("Failed to stamp timestamps on {}", path.display()), err)
    })
}
