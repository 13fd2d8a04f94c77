use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use pdfium_render::prelude::*;
use serde::Serialize;

use super::fields::{detect_fields, DetectedField, PageLayout, Rect, TextChar};
use super::{bind, FieldDetectionConfig, PdfError, PdfResult};

#[derive(Debug, Serialize)]
pub struct AnalyzedPage {
    /// PNG of the page rendered at 1:1 scale, base64 encoded.
    pub image: String,
    pub width: f32,
    pub height: f32,
    pub fields: Vec<DetectedField>,
}

pub fn analyze_pdf(bytes: &[u8], config: &FieldDetectionConfig) -> PdfResult<Vec<AnalyzedPage>> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| PdfError::Load(err.to_string()))?;

    let mut pages = Vec::new();
    for page in document.pages().iter() {
        let layout = extract_layout(&page)?;
        let image = render_page_png(&page, layout.width, layout.height)?;
        let fields = detect_fields(&layout, config);
        pages.push(AnalyzedPage {
            image: STANDARD.encode(image),
            width: layout.width,
            height: layout.height,
            fields,
        });
    }

    tracing::debug!(pages = pages.len(), "analyzed pdf form layout");
    Ok(pages)
}

/// Converts PDF bounds (origin bottom-left) into top-left page coordinates.
fn flip(rect: &PdfRect, page_height: f32) -> Rect {
    Rect::new(
        rect.left.value,
        page_height - rect.top.value,
        rect.right.value,
        page_height - rect.bottom.value,
    )
}

fn extract_layout(page: &PdfPage) -> PdfResult<PageLayout> {
    let width = page.width().value;
    let height = page.height().value;

    let mut shapes = Vec::new();
    for object in page.objects().iter() {
        if object.object_type() != PdfPageObjectType::Path {
            continue;
        }
        if let Ok(bounds) = object.bounds() {
            shapes.push(flip(&bounds.to_rect(), height));
        }
    }

    let text = page
        .text()
        .map_err(|err| PdfError::Page(err.to_string()))?;
    let mut chars = Vec::new();
    for text_char in text.chars().iter() {
        let Some(ch) = text_char.unicode_char() else {
            continue;
        };
        if let Ok(bounds) = text_char.loose_bounds() {
            chars.push(TextChar {
                ch,
                rect: flip(&bounds, height),
            });
        }
    }

    Ok(PageLayout {
        width,
        height,
        shapes,
        chars,
    })
}

fn render_page_png(page: &PdfPage, width: f32, height: f32) -> PdfResult<Vec<u8>> {
    let render_config = PdfRenderConfig::new()
        .set_target_width(width.round() as i32)
        .set_maximum_height(height.round() as i32)
        .render_form_data(true);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|err| PdfError::Render(err.to_string()))?;

    let image = image::DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| PdfError::Render(err.to_string()))?;
    Ok(cursor.into_inner())
}

/// Extracts the text of every page into simple HTML: one `page` div per page
/// and one paragraph per non-empty line.
pub fn pdf_to_html(bytes: &[u8]) -> PdfResult<String> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| PdfError::Load(err.to_string()))?;

    let mut page_texts = Vec::new();
    for page in document.pages().iter() {
        let text = page
            .text()
            .map_err(|err| PdfError::Page(err.to_string()))?;
        page_texts.push(text.all());
    }
    Ok(text_pages_to_html(&page_texts))
}

pub fn text_pages_to_html<S: AsRef<str>>(pages: &[S]) -> String {
    let mut html = String::new();
    for page in pages {
        html.push_str("<div class=\"page\">\n");
        for line in page.as_ref().lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            html.push_str("<p>");
            html.push_str(&quick_xml::escape::escape(line));
            html.push_str("</p>\n");
        }
        html.push_str("</div>\n");
    }
    html
}

#[cfg(test)]
mod tests {
    use super::text_pages_to_html;

    #[test]
    fn html_has_one_div_per_page_and_escapes_text() {
        let html = text_pages_to_html(&["Lease Agreement\n\nTenant & Landlord <sign>", "Page two"]);
        assert_eq!(html.matches("<div class=\"page\">").count(), 2);
        assert!(html.contains("<p>Lease Agreement</p>"));
        assert!(html.contains("<p>Tenant &amp; Landlord &lt;sign&gt;</p>"));
        assert!(!html.contains("<p></p>"));
    }

    #[test]
    fn empty_document_yields_empty_html() {
        let pages: [&str; 0] = [];
        assert!(text_pages_to_html(&pages).is_empty());
    }
}
