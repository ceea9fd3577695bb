//! The structured document an engine produces: an ordered list of items.
//!
//! Order is significant. [`StructuredDocument::iterate_items`] walks items in
//! the order the engine emitted them (reading order), and that order decides
//! figure numbering downstream.

use crate::pipeline::postprocess::clean_markdown;
use image::DynamicImage;

/// One element of a converted document.
#[derive(Debug, Clone)]
pub enum DocItem {
    /// Document title.
    Title(String),
    /// Section heading; `level` 1 is a top-level section.
    SectionHeader { level: u8, text: String },
    /// Body text.
    Paragraph(String),
    /// Bulleted or numbered list entry.
    ListItem(String),
    /// Formula as LaTeX source.
    Formula(String),
    /// Figure, chart, or other graphic.
    Picture {
        caption: Option<String>,
        image: Option<DynamicImage>,
    },
    /// Table with optional recognised cells (first row is the header).
    Table {
        rows: Vec<Vec<String>>,
        image: Option<DynamicImage>,
    },
}

impl DocItem {
    pub fn picture(image: Option<DynamicImage>) -> Self {
        DocItem::Picture {
            caption: None,
            image,
        }
    }

    pub fn table(rows: Vec<Vec<String>>, image: Option<DynamicImage>) -> Self {
        DocItem::Table { rows, image }
    }

    /// Whether this item is a picture or a table.
    pub fn is_visual(&self) -> bool {
        matches!(self, DocItem::Picture { .. } | DocItem::Table { .. })
    }

    /// Rendered bitmap of a picture or table, when one was materialised.
    pub fn image(&self) -> Option<&DynamicImage> {
        match self {
            DocItem::Picture { image, .. } | DocItem::Table { image, .. } => image.as_ref(),
            _ => None,
        }
    }

    fn into_image(self) -> Option<DynamicImage> {
        match self {
            DocItem::Picture { image, .. } | DocItem::Table { image, .. } => image,
            _ => None,
        }
    }

    fn to_markdown(&self) -> Option<String> {
        let block = match self {
            DocItem::Title(text) => format!("# {}", text.trim()),
            DocItem::SectionHeader { level, text } => {
                let hashes = "#".repeat(usize::from((*level).clamp(1, 5)) + 1);
                format!("{hashes} {}", text.trim())
            }
            DocItem::Paragraph(text) => text.trim().to_string(),
            DocItem::ListItem(text) => format!("- {}", text.trim()),
            DocItem::Formula(latex) => format!("$$\n{}\n$$", latex.trim()),
            DocItem::Picture { caption, .. } => match caption {
                Some(c) if !c.trim().is_empty() => format!("{}\n\n<!-- image -->", c.trim()),
                _ => "<!-- image -->".to_string(),
            },
            DocItem::Table { rows, .. } => render_table(rows),
        };
        if block.trim().is_empty() {
            None
        } else {
            Some(block)
        }
    }
}

/// A converted document: a name plus items in document order.
#[derive(Debug, Clone, Default)]
pub struct StructuredDocument {
    name: String,
    items: Vec<DocItem>,
}

impl StructuredDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, item: DocItem) {
        self.items.push(item);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, item: DocItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in document order.
    pub fn iterate_items(&self) -> impl Iterator<Item = &DocItem> {
        self.items.iter()
    }

    /// Render the whole document as Markdown.
    ///
    /// Blocks are separated by one blank line and the result is passed
    /// through [`clean_markdown`], so it always ends with a single newline.
    pub fn export_to_markdown(&self) -> String {
        let blocks: Vec<String> = self.items.iter().filter_map(DocItem::to_markdown).collect();
        clean_markdown(&blocks.join("\n\n"))
    }

    /// Consume the document, keeping the bitmap of every picture and table
    /// in document order. Visual items without a bitmap are skipped.
    pub fn into_visual_images(self) -> Vec<DynamicImage> {
        self.items
            .into_iter()
            .filter(DocItem::is_visual)
            .filter_map(DocItem::into_image)
            .collect()
    }
}

fn render_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return "<!-- table -->".to_string();
    }

    let render_row = |row: &[String]| -> String {
        let mut cells: Vec<String> = row
            .iter()
            .map(|c| c.replace('|', "\\|").replace('\n', " ").trim().to_string())
            .collect();
        cells.resize(width, String::new());
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_row(rows[0].as_slice()));
    lines.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        lines.push(render_row(row.as_slice()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn bitmap(w: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, 4, Rgba([0, 0, 0, 255])))
    }

    #[test]
    fn export_headings_and_paragraphs() {
        let doc = StructuredDocument::new("input.pdf")
            .with(DocItem::Title("Attention Is All You Need".into()))
            .with(DocItem::SectionHeader {
                level: 1,
                text: "1 Introduction".into(),
            })
            .with(DocItem::Paragraph("Recurrent networks...".into()))
            .with(DocItem::ListItem("first".into()));
        let md = doc.export_to_markdown();
        assert!(md.starts_with("# Attention Is All You Need\n\n## 1 Introduction\n"));
        assert!(md.contains("\n\nRecurrent networks...\n\n- first\n"));
        assert!(md.ends_with('\n'));
    }

    #[test]
    fn export_picture_and_formula() {
        let doc = StructuredDocument::new("input.pdf")
            .with(DocItem::Picture {
                caption: Some("Figure 1: The Transformer".into()),
                image: Some(bitmap(2)),
            })
            .with(DocItem::Formula("a^2 + b^2 = c^2".into()));
        let md = doc.export_to_markdown();
        assert!(md.contains("Figure 1: The Transformer\n\n<!-- image -->"));
        assert!(md.contains("$$\na^2 + b^2 = c^2\n$$"));
    }

    #[test]
    fn export_table_grid() {
        let rows = vec![
            vec!["Model".to_string(), "BLEU".to_string()],
            vec!["Base".to_string(), "27.3".to_string()],
            vec!["Big".to_string()],
        ];
        let doc = StructuredDocument::new("input.pdf").with(DocItem::table(rows, None));
        let md = doc.export_to_markdown();
        assert_eq!(md, "| Model | BLEU |\n| --- | --- |\n| Base | 27.3 |\n| Big |  |\n");
    }

    #[test]
    fn table_without_cells_is_placeholder() {
        let doc = StructuredDocument::new("input.pdf").with(DocItem::table(vec![], None));
        assert_eq!(doc.export_to_markdown(), "<!-- table -->\n");
    }

    #[test]
    fn empty_blocks_are_dropped() {
        let doc = StructuredDocument::new("input.pdf")
            .with(DocItem::Paragraph("   ".into()))
            .with(DocItem::Paragraph("text".into()));
        assert_eq!(doc.export_to_markdown(), "text\n");
    }

    #[test]
    fn visual_images_keep_order_and_skip_missing() {
        let doc = StructuredDocument::new("input.pdf")
            .with(DocItem::picture(Some(bitmap(1))))
            .with(DocItem::Paragraph("between".into()))
            .with(DocItem::table(vec![], Some(bitmap(2))))
            .with(DocItem::picture(None))
            .with(DocItem::picture(Some(bitmap(3))));
        assert_eq!(doc.iterate_items().filter(|i| i.is_visual()).count(), 4);

        let widths: Vec<u32> = doc.into_visual_images().iter().map(|i| i.width()).collect();
        assert_eq!(widths, vec![1, 2, 3]);
    }
}
