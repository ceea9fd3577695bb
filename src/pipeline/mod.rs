//! Stateless pipeline stages shared by the engine and the store.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ converter ──▶ engine ──▶ postprocess ──▶ store ──▶ encode ──▶ figures/*.png
//! (bytes)    (lazy, gated) (items)    (Markdown)      (by id)   (PNG)
//! ```
//!
//! 1. [`postprocess`] — deterministic text-cleanup rules applied to every
//!    Markdown export
//! 2. [`encode`] — PNG-encode each `DynamicImage` before it is written to disk

pub mod encode;
pub mod postprocess;
