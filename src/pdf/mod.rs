pub mod analyze;
pub mod fields;
pub mod render;

use std::panic;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

pub use analyze::{analyze_pdf, pdf_to_html, AnalyzedPage};
pub use fields::{detect_fields, DetectedField, FieldKind, PageLayout, Rect, TextChar};

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF engine is not available")]
    Unavailable,
    #[error("failed to load PDF: {0}")]
    Load(String),
    #[error("failed to read PDF page: {0}")]
    Page(String),
    #[error("failed to render PDF page: {0}")]
    Render(String),
    #[error("failed to write PDF: {0}")]
    Write(String),
}

pub type PdfResult<T> = Result<T, PdfError>;

/// Thresholds used by the form-field detector, in PDF points unless noted.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDetectionConfig {
    /// Fraction of the page width excluded on the left and right.
    pub margin_pct: f32,
    pub line_min_width: f32,
    pub line_max_height: f32,
    pub text_box_height: f32,
    pub overlap_band: f32,
    pub checkbox_min_side: f32,
    pub checkbox_max_side: f32,
    pub checkbox_min_ratio: f32,
    pub checkbox_max_ratio: f32,
    pub underscore_min_run: usize,
    pub label_reach_left: f32,
    pub label_reach_above: f32,
    pub label_reach_below: f32,
}

impl Default for FieldDetectionConfig {
    fn default() -> Self {
        Self {
            margin_pct: 0.10,
            line_min_width: 25.0,
            line_max_height: 5.0,
            text_box_height: 12.0,
            overlap_band: 2.0,
            checkbox_min_side: 8.0,
            checkbox_max_side: 25.0,
            checkbox_min_ratio: 0.8,
            checkbox_max_ratio: 1.2,
            underscore_min_run: 3,
            label_reach_left: 150.0,
            label_reach_above: 10.0,
            label_reach_below: 5.0,
        }
    }
}

/// Binds the system PDFium library. `Pdfium::default` panics when the
/// library cannot be loaded, so the panic is turned into an error here.
pub fn bind() -> PdfResult<Pdfium> {
    panic::catch_unwind(Pdfium::default).map_err(|_| {
        tracing::warn!("failed to initialize PDFium");
        PdfError::Unavailable
    })
}
