//! Document store: append-only, filesystem-backed persistence of parse results.
//!
//! ## Layout
//!
//! ```text
//! {root}/{document_id}/
//!   content.md
//!   meta.json          { "id": ..., "images": [{id, label, filename}, ...] }
//!   figures/
//!     fig_001.png
//!     fig_002.png
//! ```
//!
//! Every save creates a fresh directory; nothing is ever rewritten in place.
//! The only destructive operation is [`DocumentStore::purge_all`], which drops
//! the whole root. Because each request writes to its own uniquely named
//! subtree, concurrent saves need no locking.
//!
//! ## Failure policy
//!
//! A save that fails part-way returns the error immediately. Files already
//! written are left on disk (no rollback), but `meta.json` is written last
//! and atomically (temp file + rename), so a directory without it is an
//! incomplete document.

use crate::error::ReaderError;
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CONTENT_FILE: &str = "content.md";
const META_FILE: &str = "meta.json";
const FIGURES_DIR: &str = "figures";

/// Opaque, globally unique document identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One stored figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Figure {
    /// `fig_001`, `fig_002`, …
    pub id: String,
    /// `Figure 1`, `Figure 2`, …
    pub label: String,
    /// `fig_001.png`, …
    pub filename: String,
}

impl Figure {
    /// Figure record for 1-based sequence number `n`.
    pub fn numbered(n: usize) -> Self {
        let id = format!("fig_{n:03}");
        Self {
            filename: format!("{id}.png"),
            label: format!("Figure {n}"),
            id,
        }
    }
}

/// The metadata record written as `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,
    /// Figures in document order.
    pub images: Vec<Figure>,
}

/// Filesystem-backed store rooted at `{storage_base_path}/academic`.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    static_base_url: String,
}

impl DocumentStore {
    /// Create a store over `root`, serving figures under `static_base_url`.
    ///
    /// `root` is the academic directory itself (see
    /// [`crate::config::ServerConfig::academic_root`]).
    pub fn new(root: impl Into<PathBuf>, static_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            static_base_url: static_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one document.
    pub fn document_dir(&self, id: &DocumentId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Create the store root if it does not exist.
    pub fn ensure_root(&self) -> Result<(), ReaderError> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| ReaderError::storage(&self.root, e))?;
            info!("Created storage directory {}", self.root.display());
        }
        Ok(())
    }

    /// Persist a parse result under a fresh document id.
    ///
    /// Writes `content.md`, then `figures/fig_NNN.png` for each image in the
    /// given order, then `meta.json`. Returns the metadata record written.
    pub fn save(&self, markdown: &str, images: &[DynamicImage]) -> Result<DocumentMeta, ReaderError> {
        fs::create_dir_all(&self.root).map_err(|e| ReaderError::storage(&self.root, e))?;
        let (id, base_dir) = self.create_document_dir()?;

        let result = self.write_document(&id, &base_dir, markdown, images);
        if let Err(ref e) = result {
            error!(
                "Document {} is incomplete at {}: {}",
                id,
                base_dir.display(),
                e
            );
        }
        result
    }

    fn write_document(
        &self,
        id: &DocumentId,
        base_dir: &Path,
        markdown: &str,
        images: &[DynamicImage],
    ) -> Result<DocumentMeta, ReaderError> {
        let figure_dir = base_dir.join(FIGURES_DIR);
        fs::create_dir(&figure_dir).map_err(|e| ReaderError::storage(&figure_dir, e))?;

        let content_path = base_dir.join(CONTENT_FILE);
        fs::write(&content_path, markdown.as_bytes())
            .map_err(|e| ReaderError::storage(&content_path, e))?;

        let mut figures = Vec::with_capacity(images.len());
        for (idx, img) in images.iter().enumerate() {
            let figure = Figure::numbered(idx + 1);
            let png = encode_png(img).map_err(|source| ReaderError::Encode {
                figure: figure.id.clone(),
                source,
            })?;
            let path = figure_dir.join(&figure.filename);
            fs::write(&path, &png).map_err(|e| ReaderError::storage(&path, e))?;
            debug!("Wrote {} ({} bytes)", path.display(), png.len());
            figures.push(figure);
        }

        let meta = DocumentMeta {
            id: id.clone(),
            images: figures,
        };
        let json = serde_json::to_string_pretty(&meta)?;
        let meta_path = base_dir.join(META_FILE);
        let tmp_path = base_dir.join(format!("{META_FILE}.tmp"));
        fs::write(&tmp_path, json.as_bytes()).map_err(|e| ReaderError::storage(&tmp_path, e))?;
        fs::rename(&tmp_path, &meta_path).map_err(|e| ReaderError::storage(&meta_path, e))?;

        info!(
            "Stored document {} ({} chars, {} figures)",
            id,
            markdown.chars().count(),
            meta.images.len()
        );
        Ok(meta)
    }

    /// Claim a new document directory. An existing directory is never reused.
    fn create_document_dir(&self) -> Result<(DocumentId, PathBuf), ReaderError> {
        loop {
            let id = DocumentId::generate();
            let dir = self.document_dir(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!("Document id {} already taken, generating another", id);
                }
                Err(e) => return Err(ReaderError::storage(&dir, e)),
            }
        }
    }

    /// Public URL of a stored figure. Pure string construction.
    pub fn build_figure_url(&self, id: &str, filename: &str) -> String {
        format!(
            "{}/academic/{}/{}/{}",
            self.static_base_url, id, FIGURES_DIR, filename
        )
    }

    /// Read back a document's `meta.json`.
    pub fn load_meta(&self, id: &DocumentId) -> Result<DocumentMeta, ReaderError> {
        let path = self.document_dir(id).join(META_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| ReaderError::storage(&path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Delete every stored document.
    ///
    /// A missing root is a no-op. Failures are logged, not returned: this
    /// runs at shutdown, where nobody can act on an error.
    pub fn purge_all(&self) {
        if !self.root.exists() {
            debug!("Cleanup: {} does not exist, nothing to delete", self.root.display());
            return;
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => info!("Cleanup: deleted {}", self.root.display()),
            Err(e) => error!("Cleanup failed for {}: {}", self.root.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::is_png;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn bitmap(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 20, 30, 255])))
    }

    fn store(tmp: &TempDir) -> DocumentStore {
        DocumentStore::new(tmp.path().join("academic"), "/static")
    }

    #[test]
    fn figure_numbering() {
        let f = Figure::numbered(7);
        assert_eq!(f.id, "fig_007");
        assert_eq!(f.label, "Figure 7");
        assert_eq!(f.filename, "fig_007.png");
        assert_eq!(Figure::numbered(1000).id, "fig_1000");
    }

    #[test]
    fn save_writes_layout() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let images = vec![bitmap(4, 3), bitmap(8, 6)];

        let meta = store.save("# Paper\n", &images).unwrap();
        let dir = store.document_dir(&meta.id);

        assert_eq!(fs::read_to_string(dir.join("content.md")).unwrap(), "# Paper\n");
        assert_eq!(
            meta.images,
            vec![Figure::numbered(1), Figure::numbered(2)]
        );
        for (fig, img) in meta.images.iter().zip(&images) {
            let bytes = fs::read(dir.join("figures").join(&fig.filename)).unwrap();
            assert!(is_png(&bytes));
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.width(), img.width());
        }
        assert!(!dir.join("meta.json.tmp").exists());
        assert_eq!(store.load_meta(&meta.id).unwrap(), meta);
    }

    #[test]
    fn meta_json_shape() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let meta = store.save("text", &[bitmap(1, 1)]).unwrap();

        let raw = fs::read_to_string(store.document_dir(&meta.id).join("meta.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["id"], meta.id.as_str());
        assert_eq!(value["images"][0]["id"], "fig_001");
        assert_eq!(value["images"][0]["label"], "Figure 1");
        assert_eq!(value["images"][0]["filename"], "fig_001.png");
    }

    #[test]
    fn save_without_figures_creates_empty_figures_dir() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let meta = store.save("", &[]).unwrap();
        assert!(meta.images.is_empty());
        assert!(store.document_dir(&meta.id).join("figures").is_dir());
    }

    #[test]
    fn identical_content_gets_distinct_ids() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let a = store.save("same", &[bitmap(2, 2)]).unwrap();
        let b = store.save("same", &[bitmap(2, 2)]).unwrap();
        assert_ne!(a.id, b.id);

        let (da, db) = (store.document_dir(&a.id), store.document_dir(&b.id));
        assert!(!da.starts_with(&db) && !db.starts_with(&da));
        assert!(da.join("figures/fig_001.png").exists());
        assert!(db.join("figures/fig_001.png").exists());
    }

    #[test]
    fn figure_url_is_pure() {
        let store = DocumentStore::new("/nonexistent/academic", "/static/");
        assert_eq!(
            store.build_figure_url("abc", "fig_001.png"),
            "/static/academic/abc/figures/fig_001.png"
        );
    }

    #[test]
    fn purge_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.save("x", &[bitmap(1, 1)]).unwrap();
        assert!(store.root().exists());

        store.purge_all();
        assert!(!store.root().exists());
        store.purge_all();
        assert!(!store.root().exists());
    }

    #[test]
    fn ensure_root_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.ensure_root().unwrap();
        assert!(store.root().is_dir());
        store.ensure_root().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn unwritable_root_fails_fast() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the root directory should be.
        let blocker = tmp.path().join("academic");
        fs::write(&blocker, b"not a directory").unwrap();
        let store = DocumentStore::new(&blocker, "/static");

        let err = store.save("x", &[]).unwrap_err();
        assert!(matches!(err, ReaderError::Storage { .. }), "got {err:?}");
    }
}
