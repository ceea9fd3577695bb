//! Conversion engines: the opaque capability that turns PDF bytes into a
//! [`StructuredDocument`].
//!
//! The service never talks to a backend directly. It goes through the
//! [`ConversionEngine`] trait, so the default [`PdfiumEngine`] can be swapped
//! for a heavier layout/OCR backend (or a scripted engine in tests) without
//! touching the converter, the store, or the HTTP layer.
//!
//! ```text
//! DocumentStream ──▶ ConversionEngine::convert ──▶ StructuredDocument
//!  (name + bytes)      (blocking, CPU-bound)        (items in document order)
//! ```

pub mod device;
pub mod document;
pub mod pdfium;

pub use device::AcceleratorDevice;
pub use document::{DocItem, StructuredDocument};
pub use pdfium::PdfiumEngine;

use crate::error::EngineError;

/// Name given to every uploaded PDF when it is handed to an engine.
pub const INPUT_STREAM_NAME: &str = "input.pdf";

/// Raw document bytes wrapped as a named input stream.
#[derive(Debug, Clone)]
pub struct DocumentStream {
    /// Source name, used in engine diagnostics.
    pub name: String,
    /// The complete PDF file.
    pub bytes: Vec<u8>,
}

impl DocumentStream {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Wrap an upload under the fixed [`INPUT_STREAM_NAME`].
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self::new(INPUT_STREAM_NAME, bytes)
    }
}

/// A document-conversion backend.
///
/// Implementations are constructed once per process (construction is where
/// model loading and library binding happen) and then shared behind an `Arc`.
/// `convert` is blocking and may take tens of seconds; callers run it on a
/// blocking thread.
pub trait ConversionEngine: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Compute device the engine was constructed for.
    fn device(&self) -> AcceleratorDevice;

    /// Convert a PDF into a structured document.
    fn convert(&self, source: DocumentStream) -> Result<StructuredDocument, EngineError>;
}
