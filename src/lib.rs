//! # academic-reader
//!
//! HTTP service that turns an academic-paper PDF into Markdown and a set of
//! figure images, stores both under a fresh document id, and answers with
//! URLs the browser frontend can fetch the figures from.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /api/academic/parse (multipart "file")
//!  │
//!  ├─ 1. Validate  declared content type is PDF, size ≤ 50 MiB
//!  ├─ 2. Convert   shared engine on a blocking thread (lazy, single slot)
//!  ├─ 3. Export    structured document → Markdown + figure bitmaps
//!  ├─ 4. Store     {storage}/academic/{id}/content.md, figures/*.png, meta.json
//!  └─ 5. Respond   {filename, text_length, content, images: [{id, label, url}]}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use academic_reader::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .storage_base_path("./storage")
//!         .frontend_url("http://localhost:3000")
//!         .build()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `academic-reader` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another server:
//! ```toml
//! academic-reader = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DeviceSelection, EngineOptions, ServerConfig, ServerConfigBuilder, MAX_UPLOAD_BYTES};
pub use converter::{Converter, EngineFactory, ParseResult, Readiness};
pub use engine::{AcceleratorDevice, ConversionEngine, DocItem, DocumentStream, PdfiumEngine, StructuredDocument};
pub use error::{EngineError, ReaderError};
pub use server::{build_router, run, serve, AppState};
pub use service::{FigureRef, IngestionService, ParseResponse, UploadedFile};
pub use store::{DocumentId, DocumentMeta, DocumentStore, Figure};
