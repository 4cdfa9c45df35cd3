use crate::config::PdfConfig;
use crate::error::app_error::AppError;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument};
use regex::Regex;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, warn};

static LIST_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)*[.)]\s+").expect("numbering regex is valid"));

const INLINE_MARKERS: &[&str] = &["**", "*", "_", "#", "`", "~"];
const BULLETS: &[&str] = &["- ", "• ", "+ "];

/// Page geometry in points, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_left: f32,
    pub margin_top: f32,
    pub max_width: f32,
    pub font_size: f32,
    pub line_height: f32,
    pub paragraph_gap: f32,
    pub page_break_at: f32,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            margin_left: 40.0,
            margin_top: 40.0,
            max_width: 595.0 - 40.0 * 2.0,
            font_size: 14.0,
            line_height: 20.0,
            paragraph_gap: 10.0,
            page_break_at: 800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Distance of the line's top from the top edge of the page.
    pub y: f32,
}

/// Removes markdown residue the model tends to emit despite instructions.
pub fn clean_text(text: &str) -> String {
    let mut result = text.replace("\r\n", "\n");
    for marker in INLINE_MARKERS {
        result = result.replace(marker, "");
    }

    let lines: Vec<String> = result
        .split('\n')
        .map(|line| {
            let mut trimmed = line.trim();
            while let Some(rest) = BULLETS.iter().find_map(|bullet| trimmed.strip_prefix(bullet)) {
                trimmed = rest.trim_start();
            }
            LIST_NUMBERING.replace(trimmed, "").into_owned()
        })
        .collect();
    let mut result = lines.join("\n");

    while result.contains("  ") {
        result = result.replace("  ", " ");
    }
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }

    result
}

/// Approximate advance width of `text` in builtin Helvetica.
pub fn helvetica_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(helvetica_char_width).sum();
    units as f32 * font_size / 1000.0
}

fn helvetica_char_width(c: char) -> u32 {
    match c {
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | 'I' | '[' | '\\' | ']' | 'f' | 't' => 278,
        '"' => 355,
        '\'' => 191,
        '(' | ')' | '-' | '`' | 'r' => 333,
        '*' => 389,
        '+' | '<' | '=' | '>' | '~' => 584,
        '%' => 889,
        '&' | 'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        '@' => 1015,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' | 'w' => 722,
        'F' | 'T' | 'Z' => 611,
        'G' | 'O' | 'Q' => 778,
        'J' | 'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' => 500,
        'L' => 556,
        'M' | 'm' => 833,
        'W' => 944,
        '^' => 469,
        'i' | 'j' | 'l' => 222,
        '{' | '}' => 334,
        '|' => 260,
        _ => 556,
    }
}

/// Greedy word wrap and pagination. Blank lines advance the cursor by the
/// paragraph gap; a new page starts once a written line leaves the cursor
/// past the page break.
pub fn layout_text(text: &str, layout: &PageLayout, measure: impl Fn(&str) -> f32) -> Vec<Vec<PlacedLine>> {
    let mut pages: Vec<Vec<PlacedLine>> = vec![Vec::new()];
    let mut y = layout.margin_top;

    let emit = |line: String, y: &mut f32, pages: &mut Vec<Vec<PlacedLine>>| {
        if let Some(page) = pages.last_mut() {
            page.push(PlacedLine { text: line, y: *y });
        }
        *y += layout.line_height;
        if *y > layout.page_break_at {
            pages.push(Vec::new());
            *y = layout.margin_top;
        }
    };

    for paragraph in text.split('\n') {
        if paragraph.is_empty() {
            y += layout.paragraph_gap;
            continue;
        }

        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };

            if measure(&candidate) > layout.max_width {
                if !current.is_empty() {
                    emit(std::mem::take(&mut current), &mut y, &mut pages);
                }
                current = word.to_string();
            } else {
                current = candidate;
            }
        }

        if !current.is_empty() {
            emit(current, &mut y, &mut pages);
        }
    }

    if pages.len() > 1 && pages.last().is_some_and(Vec::is_empty) {
        pages.pop();
    }
    pages
}

fn pt_to_mm(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

#[derive(Clone)]
pub struct PdfService {
    layout: PageLayout,
    font_path: Option<PathBuf>,
}

impl PdfService {
    pub fn new(config: &PdfConfig) -> Self {
        PdfService {
            layout: PageLayout::default(),
            font_path: config.font_path.as_ref().map(PathBuf::from),
        }
    }

    /// Renders on the blocking pool; printpdf documents are not `Send`.
    pub async fn create_pdf(&self, text: String) -> Result<Vec<u8>, AppError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.render(&text))
            .await
            .map_err(|e| AppError::Pdf {
                message: format!("PDF rendering task failed: {e}"),
            })?
    }

    pub fn render(&self, text: &str) -> Result<Vec<u8>, AppError> {
        let layout = &self.layout;
        let cleaned = clean_text(text);
        let pages = layout_text(&cleaned, layout, |line| helvetica_width(line, layout.font_size));
        debug!(pages = pages.len(), "notes laid out");

        let width = pt_to_mm(layout.page_width);
        let height = pt_to_mm(layout.page_height);
        let (doc, first_page, first_layer) = PdfDocument::new("Notes", width, height, "Layer 1");

        let font = self.load_font(&doc)?;

        for (index, lines) in pages.iter().enumerate() {
            let layer = if index == 0 {
                doc.get_page(first_page).get_layer(first_layer)
            } else {
                let (page, layer) = doc.add_page(width, height, "Layer 1");
                doc.get_page(page).get_layer(layer)
            };

            for line in lines {
                let baseline = layout.page_height - line.y - layout.font_size;
                layer.use_text(line.text.as_str(), layout.font_size, pt_to_mm(layout.margin_left), pt_to_mm(baseline), &font);
            }
        }

        doc.save_to_bytes().map_err(|e| AppError::Pdf {
            message: format!("Failed to save PDF: {e}"),
        })
    }

    fn load_font(&self, doc: &printpdf::PdfDocumentReference) -> Result<IndirectFontRef, AppError> {
        if let Some(path) = self.font_path.as_ref().filter(|p| p.exists()) {
            let file = File::open(path).map_err(|e| AppError::io("Failed to open font file", e))?;
            return doc.add_external_font(BufReader::new(file)).map_err(|e| AppError::Pdf {
                message: format!("Failed to add font: {e}"),
            });
        }

        if let Some(path) = &self.font_path {
            warn!(path = %path.display(), "configured font not found, falling back to Helvetica");
        }

        doc.add_builtin_font(BuiltinFont::Helvetica).map_err(|e| AppError::Pdf {
            message: format!("Failed to add font: {e}"),
        })
    }
}
