//! Configuration types for the academic-reader service.
//!
//! All service behaviour is controlled through [`ServerConfig`], built via its
//! [`ServerConfigBuilder`]. Conversion-engine knobs live in the nested
//! [`EngineOptions`] so they can be handed to an engine factory on their own.

use crate::engine::AcceleratorDevice;
use crate::error::ReaderError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Fixed upload cap: 50 MiB.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Subdirectory of the storage base path that holds academic documents.
pub const ACADEMIC_DIR: &str = "academic";

/// Configuration for the HTTP service.
///
/// Built via [`ServerConfig::builder()`] or using [`ServerConfig::default()`].
///
/// # Example
/// ```rust
/// use academic_reader::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .storage_base_path("/var/lib/academic-reader")
///     .frontend_url("http://localhost:3000")
///     .cleanup_on_exit(true)
///     .build()
///     .unwrap();
/// assert!(config.cleanup_on_exit);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address the HTTP listener binds to. Default: `0.0.0.0:8000`.
    pub bind_addr: SocketAddr,

    /// Origin of the browser frontend allowed by CORS. Default: None.
    ///
    /// When unset, no cross-origin requests are granted.
    pub frontend_url: Option<String>,

    /// Root of durable storage. Default: `./storage`.
    ///
    /// Documents live under `{storage_base_path}/academic/{document_id}/`.
    pub storage_base_path: PathBuf,

    /// URL prefix under which stored files are served. Default: `/static`.
    ///
    /// Must start with `/` and must not end with one; figure URLs take the
    /// shape `{static_base_url}/academic/{document_id}/figures/{filename}`.
    pub static_base_url: String,

    /// Delete every stored document when the process shuts down. Default: false.
    pub cleanup_on_exit: bool,

    /// Maximum accepted upload size in bytes. Default: [`MAX_UPLOAD_BYTES`].
    pub max_upload_bytes: usize,

    /// Conversion engine options.
    pub engine: EngineOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            frontend_url: None,
            storage_base_path: PathBuf::from("storage"),
            static_base_url: "/static".to_string(),
            cleanup_on_exit: false,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            engine: EngineOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory holding every academic document: `{storage_base_path}/academic`.
    pub fn academic_root(&self) -> PathBuf {
        self.storage_base_path.join(ACADEMIC_DIR)
    }

    /// Route prefix the stored figures are mounted at: `{static_base_url}/academic`.
    pub fn academic_static_prefix(&self) -> String {
        format!("{}/{}", self.static_base_url, ACADEMIC_DIR)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn frontend_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.frontend_url = if url.trim().is_empty() { None } else { Some(url) };
        self
    }

    pub fn storage_base_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.storage_base_path = path.as_ref().to_path_buf();
        self
    }

    pub fn static_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.static_base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn cleanup_on_exit(mut self, v: bool) -> Self {
        self.config.cleanup_on_exit = v;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n.max(1);
        self
    }

    pub fn engine(mut self, options: EngineOptions) -> Self {
        self.config.engine = options;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, ReaderError> {
        let c = &self.config;
        if !c.static_base_url.starts_with('/') {
            return Err(ReaderError::InvalidConfig(format!(
                "static base URL must start with '/', got '{}'",
                c.static_base_url
            )));
        }
        if c.storage_base_path.as_os_str().is_empty() {
            return Err(ReaderError::InvalidConfig(
                "storage base path must not be empty".into(),
            ));
        }
        if c.engine.conversion_slots == 0 {
            return Err(ReaderError::InvalidConfig(
                "conversion slots must be ≥ 1".into(),
            ));
        }
        if c.engine.conversion_timeout_secs == Some(0) {
            return Err(ReaderError::InvalidConfig(
                "conversion timeout must be ≥ 1s when set".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Interpret the `CLEANUP_ON_EXIT` environment value.
///
/// Only the exact string `"true"` enables the shutdown purge.
pub fn parse_cleanup_flag(value: &str) -> bool {
    value == "true"
}

// ── Engine options ───────────────────────────────────────────────────────

/// Fixed capability set requested from the conversion engine.
///
/// Every flag defaults to `true`: academic papers need OCR for scanned pages,
/// table structure, formula recognition, and rendered images for both
/// pictures and tables. Engines that cannot honour a flag log it once when
/// they are constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Run OCR on bitmap-only text.
    pub do_ocr: bool,
    /// Recognise table structure.
    pub do_table_structure: bool,
    /// Recognise formulas and emit them as LaTeX.
    pub do_formula_enrichment: bool,
    /// Materialise a bitmap for every picture element.
    pub generate_picture_images: bool,
    /// Materialise a bitmap for every table element.
    pub generate_table_images: bool,
    /// Compute device for the engine's models. Default: auto-detect.
    pub device: DeviceSelection,
    /// Conversions allowed to run at once. Default: 1 (serialized).
    ///
    /// The engine is treated as non-reentrant unless this is raised.
    pub conversion_slots: usize,
    /// Upper bound on a single conversion. Default: None (unbounded).
    pub conversion_timeout_secs: Option<u64>,
    /// Directory containing the pdfium shared library. Default: None.
    ///
    /// When unset the engine tries `./` and then the system library path.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            do_ocr: true,
            do_table_structure: true,
            do_formula_enrichment: true,
            generate_picture_images: true,
            generate_table_images: true,
            device: DeviceSelection::default(),
            conversion_slots: 1,
            conversion_timeout_secs: None,
            pdfium_library_path: None,
        }
    }
}

/// How the engine's compute device is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceSelection {
    /// Pick the highest-capability device found at process start. (default)
    #[default]
    Auto,
    /// Use the given device unconditionally.
    Fixed(AcceleratorDevice),
}

impl DeviceSelection {
    /// Parse `auto`, `cuda`, `mps`, or `cpu` (case-insensitive).
    pub fn parse(s: &str) -> Result<Self, ReaderError> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(DeviceSelection::Auto),
            "cuda" | "gpu" => Ok(DeviceSelection::Fixed(AcceleratorDevice::Cuda)),
            "mps" => Ok(DeviceSelection::Fixed(AcceleratorDevice::Mps)),
            "cpu" => Ok(DeviceSelection::Fixed(AcceleratorDevice::Cpu)),
            other => Err(ReaderError::InvalidConfig(format!(
                "unknown device '{other}' (expected auto, cuda, mps, cpu)"
            ))),
        }
    }

    /// Resolve the selection to a concrete device.
    pub fn resolve(self) -> AcceleratorDevice {
        match self {
            DeviceSelection::Auto => AcceleratorDevice::detect(),
            DeviceSelection::Fixed(device) => device,
        }
    }
}
