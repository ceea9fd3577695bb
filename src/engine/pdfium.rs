//! Default conversion engine backed by pdfium.
//!
//! ## What it extracts
//!
//! * the document title from the PDF metadata dictionary
//! * each page's text layer, grouped into paragraphs, with numbered section
//!   lines (`3.2 Training`) and well-known unnumbered ones (`Abstract`,
//!   `References`) promoted to headings
//! * every embedded image object as a [`DocItem::Picture`], in content-stream
//!   order, after the page's text
//!
//! Layout analysis, OCR, table-structure and formula recognition are model
//! workloads pdfium does not provide. When those capabilities are requested
//! the engine says so once, at construction, and converts what the text
//! layer and image objects offer.
//!
//! ## Why bind per call?
//!
//! pdfium keeps thread-local state and its bindings are not `Send`. The
//! engine verifies the library binds at construction (the expensive,
//! fail-early part) and then binds again inside each blocking conversion, the
//! same way every page render already runs on a dedicated blocking thread.

use crate::config::EngineOptions;
use crate::engine::{AcceleratorDevice, ConversionEngine, DocItem, DocumentStream, StructuredDocument};
use crate::error::EngineError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// pdfium-render backed [`ConversionEngine`].
#[derive(Debug)]
pub struct PdfiumEngine {
    options: EngineOptions,
    library_dir: Option<PathBuf>,
    device: AcceleratorDevice,
}

impl PdfiumEngine {
    /// Construct the engine: resolve the device and verify pdfium can be bound.
    pub fn new(options: EngineOptions) -> Result<Self, EngineError> {
        let device = options.device.resolve();
        info!("[pdfium] Using device: {}", device);

        let engine = Self {
            library_dir: options.pdfium_library_path.clone(),
            options,
            device,
        };

        let start = Instant::now();
        engine.bind()?;
        info!(
            "[pdfium] Library bound in {}ms",
            start.elapsed().as_millis()
        );

        let unsupported: Vec<&str> = [
            (engine.options.do_ocr, "OCR"),
            (engine.options.do_table_structure, "table structure"),
            (engine.options.do_formula_enrichment, "formula recognition"),
        ]
        .into_iter()
        .filter_map(|(requested, name)| requested.then_some(name))
        .collect();
        if !unsupported.is_empty() {
            warn!(
                "[pdfium] Requested capabilities not provided by this backend: {}; \
                 the text layer and embedded images are used instead",
                unsupported.join(", ")
            );
        }

        Ok(engine)
    }

    /// Bind the pdfium library: configured directory, then `./`, then system.
    fn bind(&self) -> Result<Pdfium, EngineError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| EngineError::Unavailable(format!("failed to bind pdfium: {e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

impl ConversionEngine for PdfiumEngine {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn device(&self) -> AcceleratorDevice {
        self.device
    }

    fn convert(&self, source: DocumentStream) -> Result<StructuredDocument, EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&source.bytes, None)
            .map_err(|e| EngineError::InvalidDocument {
                name: source.name.clone(),
                detail: format!("{e:?}"),
            })?;

        let mut out = StructuredDocument::new(source.name.clone());

        if let Some(title) = document
            .metadata()
            .get(PdfDocumentMetadataTagType::Title)
            .map(|t| t.value().trim().to_string())
            .filter(|t| !t.is_empty())
        {
            out.push(DocItem::Title(title));
        }

        for (index, page) in document.pages().iter().enumerate() {
            let page_num = index + 1;

            let text = page
                .text()
                .map_err(|e| EngineError::Extraction {
                    page: page_num,
                    detail: format!("{e:?}"),
                })?
                .all();
            for item in layout_text(&text) {
                out.push(item);
            }

            let mut pictures = 0usize;
            for object in page.objects().iter() {
                let Some(image_object) = object.as_image_object() else {
                    continue;
                };
                let image = if self.options.generate_picture_images {
                    match image_object.get_raw_image() {
                        Ok(img) if img.width() > 0 && img.height() > 0 => Some(img),
                        Ok(_) => None,
                        Err(e) => {
                            warn!("[pdfium] Page {}: image not decodable: {:?}", page_num, e);
                            None
                        }
                    }
                } else {
                    None
                };
                out.push(DocItem::picture(image));
                pictures += 1;
            }
            debug!("[pdfium] Page {}: {} chars, {} pictures", page_num, text.len(), pictures);
        }

        Ok(out)
    }
}

// ── Text layout heuristics ───────────────────────────────────────────────

/// `3 Model Architecture`, `3.2. Attention`, `A.1 Proofs`
static RE_NUMBERED_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<num>\d{1,2}(?:\.\d{1,2})*|[A-Z](?:\.\d{1,2})+)\.?\s+(?P<title>[A-Z][^.!?]{1,78})$",
    )
    .unwrap()
});

static RE_NAMED_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(abstract|introduction|related work|background|conclusions?|acknowledge?ments?|references|bibliography|appendix)$",
    )
    .unwrap()
});

static RE_LIST_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[•▪◦‣\-–*]|\(\w\))\s+(?P<body>.+)$").unwrap());

/// Split a page's text layer into paragraph, heading, and list items.
///
/// Blank lines end a paragraph; heading and list lines stand alone. Lines are
/// re-joined with spaces and a hyphen at a line break is dropped when the
/// next line continues in lowercase (`trans-\nformer` → `transformer`).
fn layout_text(text: &str) -> Vec<DocItem> {
    let mut items = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    let flush = |paragraph: &mut Vec<&str>, items: &mut Vec<DocItem>| {
        if !paragraph.is_empty() {
            items.push(DocItem::Paragraph(join_lines(paragraph)));
            paragraph.clear();
        }
    };

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            flush(&mut paragraph, &mut items);
            continue;
        }
        if let Some(heading) = heading_item(line) {
            flush(&mut paragraph, &mut items);
            items.push(heading);
            continue;
        }
        if let Some(caps) = RE_LIST_ITEM.captures(line) {
            flush(&mut paragraph, &mut items);
            items.push(DocItem::ListItem(caps["body"].to_string()));
            continue;
        }
        paragraph.push(line);
    }
    flush(&mut paragraph, &mut items);
    items
}

fn heading_item(line: &str) -> Option<DocItem> {
    if RE_NAMED_HEADING.is_match(line) {
        return Some(DocItem::SectionHeader {
            level: 1,
            text: line.to_string(),
        });
    }
    let caps = RE_NUMBERED_HEADING.captures(line)?;
    let depth = caps["num"].split('.').filter(|s| !s.is_empty()).count();
    Some(DocItem::SectionHeader {
        level: depth.min(5) as u8,
        text: line.to_string(),
    })
}

fn join_lines(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        if out.ends_with('-') && line.chars().next().is_some_and(char::is_lowercase) {
            out.pop();
        } else if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}
