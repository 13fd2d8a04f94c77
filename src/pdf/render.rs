use pdfium_render::prelude::*;

use super::{bind, PdfError, PdfResult};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 54.0;
const FONT_SIZE: f32 = 11.0;
const LEADING: f32 = 14.0;
// Helvetica averages a little over half an em per glyph.
const MAX_LINE_CHARS: usize = ((PAGE_WIDTH - 2.0 * MARGIN) / (FONT_SIZE * 0.5)) as usize;

/// Lays plain text out on US Letter pages in Helvetica.
pub fn text_to_pdf(text: &str) -> PdfResult<Vec<u8>> {
    let pdfium = bind()?;
    let mut document = pdfium
        .create_new_pdf()
        .map_err(|err| PdfError::Write(err.to_string()))?;
    let font = document.fonts_mut().helvetica();

    let lines = wrap_text(text, MAX_LINE_CHARS);
    let per_page = lines_per_page();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&lines[..]]
    } else {
        lines.chunks(per_page).collect()
    };

    for chunk in chunks {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::new_portrait(
                PdfPagePaperStandardSize::USLetterAnsiA,
            ))
            .map_err(|err| PdfError::Write(err.to_string()))?;

        let mut y = PAGE_HEIGHT - MARGIN - FONT_SIZE;
        for line in chunk {
            if !line.is_empty() {
                page.objects_mut()
                    .create_text_object(
                        PdfPoints::new(MARGIN),
                        PdfPoints::new(y),
                        line,
                        font,
                        PdfPoints::new(FONT_SIZE),
                    )
                    .map_err(|err| PdfError::Write(err.to_string()))?;
            }
            y -= LEADING;
        }
    }

    document
        .save_to_bytes()
        .map_err(|err| PdfError::Write(err.to_string()))
}

fn lines_per_page() -> usize {
    (((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize).max(1)
}

/// Greedy word wrap. Blank input lines are kept as paragraph breaks and
/// words longer than `width` are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !line.is_empty() {
                    out.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(width);
                out.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > width && !line.is_empty() {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        out.push(line);
    }
    out
}
