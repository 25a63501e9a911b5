//! Document walking: discover image and link references in document order.
//!
//! The walk runs on the coordinating thread. Remote images acquire a
//! semaphore permit and fetch on a worker thread; local images copy inline.
//! The walk only ever blocks to acquire a permit. After the last node is
//! visited (or the first error aborts the visit), every spawned fetch is
//! joined before the walker returns, so asset files are complete before the
//! assembler starts substituting.

use crate::convert::Session;
use crate::error::{Error, Result};
use crate::reference::{self, RefKind};
use pulldown_cmark::{Event, Options, Parser, Tag};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A pending placeholder substitution for one link node.
///
/// Keyed by the node's document-order index: two links sharing the same
/// destination text are distinct entries, even though the pattern-based
/// substitution cannot always tell their spans apart.
#[derive(Debug, Clone)]
pub struct LinkRewrite {
    pub node_index: usize,
    pub destination: String,
    pub placeholder: String,
}

/// Rewrite tables populated during the walk.
///
/// Image entries are inserted from fetch worker threads, so both tables sit
/// behind mutexes. Images map reference → relative asset path in sorted
/// order; links are kept in visit order.
#[derive(Default)]
pub struct RewriteTables {
    images: Mutex<BTreeMap<String, String>>,
    links: Mutex<Vec<LinkRewrite>>,
}

impl RewriteTables {
    pub fn record_image(&self, reference: String, asset_path: String) {
        self.images.lock().unwrap().insert(reference, asset_path);
    }

    pub fn record_link(&self, rewrite: LinkRewrite) {
        self.links.lock().unwrap().push(rewrite);
    }

    pub fn images_snapshot(&self) -> BTreeMap<String, String> {
        self.images.lock().unwrap().clone()
    }

    pub fn links_snapshot(&self) -> Vec<LinkRewrite> {
        self.links.lock().unwrap().clone()
    }
}

/// Walk the document and populate the session's rewrite tables.
///
/// Fail-fast: the first error aborts the visit, but every already-spawned
/// fetch is drained before returning. When the visit itself succeeded, the
/// first failed fetch in spawn order wins.
pub(crate) fn walk(text: &str, session: &Session) -> Result<()> {
    let mut walker = Walker {
        session,
        handles: Vec::new(),
        seen: HashSet::new(),
    };

    let visited = walker.visit_all(text);
    let drained = walker.drain();
    visited.and(drained)
}

struct Walker<'a> {
    session: &'a Session,
    handles: Vec<JoinHandle<Result<()>>>,
    seen: HashSet<String>,
}

impl Walker<'_> {
    fn visit_all(&mut self, text: &str) -> Result<()> {
        let mut node_index = 0;
        for event in Parser::new_ext(text, Options::empty()) {
            match event {
                Event::Start(Tag::Image(_, destination, _)) => {
                    self.visit_image(&destination, node_index)?;
                    node_index += 1;
                }
                Event::Start(Tag::Link(_, destination, _)) => {
                    self.visit_link(&destination, node_index);
                    node_index += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Fetch one image reference into the scratch assets directory and
    /// record its rewrite entry. A reference already visited in this
    /// conversion is skipped; the recorded mapping is identical either way.
    fn visit_image(&mut self, reference: &str, node_index: usize) -> Result<()> {
        if !self.seen.insert(reference.to_string()) {
            return Ok(());
        }

        let filename = reference::derived_filename(reference, node_index);
        let mut sink = self.session.scratch.create_asset(&filename)?;
        let asset_path = format!("assets/{}", filename);

        match reference::classify(reference) {
            RefKind::Remote(url) => {
                // Acquire on the walk thread so the walk itself is what
                // blocks when the fetch limit is reached.
                let permit = self.session.fetcher.acquire();
                let fetcher = Arc::clone(&self.session.fetcher);
                let tables = Arc::clone(&self.session.tables);
                let reference = reference.to_string();
                self.handles.push(thread::spawn(move || {
                    let _permit = permit;
                    fetcher.fetch_remote(&reference, &url, &mut sink)?;
                    tables.record_image(reference, asset_path);
                    Ok(())
                }));
            }
            RefKind::Local => {
                self.session
                    .fetcher
                    .fetch_local(&self.session.source_dir, reference, &mut sink)?;
                self.session
                    .tables
                    .record_image(reference.to_string(), asset_path);
            }
        }

        Ok(())
    }

    /// Record an attachment placeholder for a non-remote link destination.
    fn visit_link(&mut self, destination: &str, node_index: usize) {
        if !self.session.process_attachments {
            return;
        }
        if reference::classify(destination).is_remote() {
            return;
        }

        let placeholder = format!(
            "#todo/process-attachment ({})",
            reference::basename(destination)
        );
        self.session.tables.record_link(LinkRewrite {
            node_index,
            destination: destination.to_string(),
            placeholder,
        });
    }

    /// Join every spawned fetch, keeping the first error in spawn order.
    fn drain(&mut self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles.drain(..) {
            let outcome = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(Error::Network {
                    reference: "<fetch worker>".to_string(),
                    reason: "fetch thread panicked".to_string(),
                }),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::ScratchBundle;
    use crate::fetch::Fetcher;
    use crate::progress::NullObserver;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn session_in(dir: &Path, process_attachments: bool) -> Session {
        Session {
            source_dir: dir.to_path_buf(),
            process_attachments,
            scratch: ScratchBundle::create(&dir.join("out.textbundle")).unwrap(),
            fetcher: Arc::new(Fetcher::new(5, Arc::new(NullObserver))),
            tables: Arc::new(RewriteTables::default()),
        }
    }

    #[test]
    fn test_walk_copies_local_images_and_records_rewrites() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("logo.png"), b"png bytes").unwrap();
        fs::create_dir(temp.path().join("img")).unwrap();
        fs::write(temp.path().join("img/chart.svg"), b"<svg/>").unwrap();

        let session = session_in(temp.path(), false);
        let text = "# Doc\n\n![Logo](logo.png)\n\nSee ![Chart](./img/chart.svg).\n";
        walk(text, &session).unwrap();

        let images = session.tables.images_snapshot();
        assert_eq!(images.len(), 2);
        assert_eq!(images["logo.png"], "assets/logo.png");
        assert_eq!(images["./img/chart.svg"], "assets/chart.svg");

        let assets = session.scratch.root().join("assets");
        assert_eq!(fs::read(assets.join("logo.png")).unwrap(), b"png bytes");
        assert_eq!(fs::read(assets.join("chart.svg")).unwrap(), b"<svg/>");
    }

    #[test]
    fn test_walk_duplicate_reference_fetched_once() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.png"), b"x").unwrap();

        let session = session_in(temp.path(), false);
        walk("![one](a.png) and ![two](a.png)", &session).unwrap();

        let images = session.tables.images_snapshot();
        assert_eq!(images.len(), 1);
        assert_eq!(images["a.png"], "assets/a.png");
    }

    #[test]
    fn test_walk_missing_local_image_is_fatal() {
        let temp = TempDir::new().unwrap();
        let session = session_in(temp.path(), false);

        let err = walk("![gone](missing.png)", &session).unwrap_err();
        match err {
            Error::NotFound { reference } => assert_eq!(reference, "missing.png"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_walk_records_attachment_links_when_enabled() {
        let temp = TempDir::new().unwrap();
        let session = session_in(temp.path(), true);

        walk(
            "See [notes](docs/notes.txt) and [site](https://example.com/page).",
            &session,
        )
        .unwrap();

        let links = session.tables.links_snapshot();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].destination, "docs/notes.txt");
        assert_eq!(links[0].placeholder, "#todo/process-attachment (notes.txt)");
    }

    #[test]
    fn test_walk_ignores_links_when_disabled() {
        let temp = TempDir::new().unwrap();
        let session = session_in(temp.path(), false);

        walk("See [notes](docs/notes.txt).", &session).unwrap();
        assert!(session.tables.links_snapshot().is_empty());
    }

    #[test]
    fn test_walk_link_identity_is_document_order() {
        let temp = TempDir::new().unwrap();
        let session = session_in(temp.path(), true);

        walk("[a](x.txt) then [b](y.txt)", &session).unwrap();

        let links = session.tables.links_snapshot();
        assert_eq!(links.len(), 2);
        assert!(links[0].node_index < links[1].node_index);
    }
}
