//! Form-field detection over an extracted page layout.
//!
//! Coordinates are PDF points with the origin at the top-left corner of the
//! page and `y` growing downward, matching the rendered page image.

use serde::Serialize;

use super::FieldDetectionConfig;

const CHECKBOX_GLYPHS: [char; 3] = ['☐', '☑', '☒'];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True when the interiors overlap; touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextChar {
    pub ch: char,
    pub rect: Rect,
}

/// Everything the detector needs to know about one page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub shapes: Vec<Rect>,
    pub chars: Vec<TextChar>,
}

impl PageLayout {
    /// Text whose glyph centres fall inside `region`, in reading order.
    pub fn text_in(&self, region: &Rect) -> String {
        let mut out = String::new();
        let mut last_y: Option<f32> = None;
        for tc in &self.chars {
            let (cx, cy) = tc.rect.center();
            if !region.contains_point(cx, cy) {
                continue;
            }
            if let Some(prev) = last_y {
                if (cy - prev).abs() > tc.rect.height().max(1.0) {
                    out.push('\n');
                }
            }
            last_y = Some(cy);
            out.push(tc.ch);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedField {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub label: String,
    #[serde(skip)]
    pub rect: Rect,
}

struct Detector<'a> {
    page: &'a PageLayout,
    config: &'a FieldDetectionConfig,
    fields: Vec<DetectedField>,
}

impl<'a> Detector<'a> {
    fn passes_filters(&self, rect: &Rect) -> bool {
        let margin = self.page.width * self.config.margin_pct;
        if rect.x0 < margin || rect.x1 > self.page.width - margin {
            return false;
        }
        let band = Rect::new(rect.x0, rect.y0 - self.config.overlap_band, rect.x1, rect.y0);
        self.page.text_in(&band).trim().is_empty()
    }

    fn add(&mut self, rect: Rect, kind: FieldKind) {
        if self.fields.iter().any(|field| field.rect.intersects(&rect)) {
            return;
        }

        let search = Rect::new(
            rect.x0 - self.config.label_reach_left,
            rect.y0 - self.config.label_reach_above,
            rect.x0,
            rect.y1 + self.config.label_reach_below,
        );
        let label = clean_label(&self.page.text_in(&search));

        let (w, h) = (self.page.width, self.page.height);
        self.fields.push(DetectedField {
            left: rect.x0 / w * 100.0,
            top: rect.y0 / h * 100.0,
            width: rect.width() / w * 100.0,
            height: rect.height() / h * 100.0,
            kind,
            label,
            rect,
        });
    }

    fn detect_shapes(&mut self) {
        let cfg = self.config;
        for shape in &self.page.shapes {
            let (w, h) = (shape.width(), shape.height());
            if w > cfg.line_min_width && h < cfg.line_max_height {
                let input = Rect::new(shape.x0, shape.y0 - cfg.text_box_height, shape.x1, shape.y0);
                if self.passes_filters(&input) {
                    self.add(input, FieldKind::Text);
                }
            } else if w > cfg.checkbox_min_side
                && w < cfg.checkbox_max_side
                && h > cfg.checkbox_min_side
                && h < cfg.checkbox_max_side
            {
                let ratio = w / h;
                if ratio > cfg.checkbox_min_ratio
                    && ratio < cfg.checkbox_max_ratio
                    && self.passes_filters(shape)
                {
                    self.add(*shape, FieldKind::Checkbox);
                }
            }
        }
    }

    fn detect_underscores(&mut self) {
        for run in underscore_runs(&self.page.chars, self.config.underscore_min_run) {
            self.add(run, FieldKind::Text);
        }
    }

    fn detect_glyphs(&mut self) {
        for glyph in CHECKBOX_GLYPHS {
            let hits: Vec<Rect> = self
                .page
                .chars
                .iter()
                .filter(|tc| tc.ch == glyph)
                .map(|tc| tc.rect)
                .collect();
            for rect in hits {
                self.add(rect, FieldKind::Checkbox);
            }
        }
    }
}

/// Finds fillable areas on a page. Earlier detections win over later ones
/// that overlap them: drawn lines and boxes first, then underscore runs,
/// then checkbox glyphs.
pub fn detect_fields(page: &PageLayout, config: &FieldDetectionConfig) -> Vec<DetectedField> {
    if page.width <= 0.0 || page.height <= 0.0 {
        return Vec::new();
    }
    let mut detector = Detector {
        page,
        config,
        fields: Vec::new(),
    };
    detector.detect_shapes();
    detector.detect_underscores();
    detector.detect_glyphs();
    detector.fields
}

fn underscore_runs(chars: &[TextChar], min_run: usize) -> Vec<Rect> {
    let mut runs = Vec::new();
    let mut current: Option<(Rect, usize, f32)> = None;
    let flush = |current: Option<(Rect, usize, f32)>, runs: &mut Vec<Rect>| {
        if let Some((rect, len, _)) = current {
            if len >= min_run {
                runs.push(rect);
            }
        }
    };
    for tc in chars {
        if tc.ch != '_' {
            flush(current.take(), &mut runs);
            continue;
        }
        let (_, cy) = tc.rect.center();
        // A jump in the baseline means the next line started.
        if let Some((_, _, last_y)) = current {
            if (cy - last_y).abs() > tc.rect.height().max(1.0) {
                flush(current.take(), &mut runs);
            }
        }
        current = Some(match current {
            Some((rect, len, _)) => (rect.union(&tc.rect), len + 1, cy),
            None => (tc.rect, 1, cy),
        });
    }
    flush(current, &mut runs);
    runs
}

fn clean_label(raw: &str) -> String {
    raw.replace(':', "")
        .replace('\n', " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER_W: f32 = 612.0;
    const LETTER_H: f32 = 792.0;

    fn page() -> PageLayout {
        PageLayout {
            width: LETTER_W,
            height: LETTER_H,
            ..Default::default()
        }
    }

    fn word(text: &str, x: f32, top: f32) -> Vec<TextChar> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let x0 = x + i as f32 * 6.0;
                TextChar {
                    ch,
                    rect: Rect::new(x0, top, x0 + 6.0, top + 10.0),
                }
            })
            .collect()
    }

    #[test]
    fn horizontal_line_becomes_text_box_above_it() {
        let mut layout = page();
        layout.shapes.push(Rect::new(200.0, 300.0, 400.0, 301.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields.len(), 1);
        let field = &fields[0];
        assert_eq!(field.kind, FieldKind::Text);
        assert_eq!(field.rect, Rect::new(200.0, 288.0, 400.0, 300.0));
        assert!((field.left - 200.0 / LETTER_W * 100.0).abs() < 1e-4);
        assert!((field.height - 12.0 / LETTER_H * 100.0).abs() < 1e-4);
    }

    #[test]
    fn line_inside_margin_is_ignored() {
        let mut layout = page();
        layout.shapes.push(Rect::new(20.0, 300.0, 200.0, 301.0));
        layout.shapes.push(Rect::new(300.0, 400.0, 600.0, 401.0));
        assert!(detect_fields(&layout, &FieldDetectionConfig::default()).is_empty());
    }

    #[test]
    fn line_with_text_directly_above_is_an_underline() {
        let mut layout = page();
        layout.shapes.push(Rect::new(200.0, 300.0, 260.0, 301.0));
        // glyph centred in the 2pt band above the 12pt input box
        layout.chars.push(TextChar {
            ch: 'x',
            rect: Rect::new(210.0, 286.5, 216.0, 287.5),
        });
        assert!(detect_fields(&layout, &FieldDetectionConfig::default()).is_empty());
    }

    #[test]
    fn square_path_is_checkbox_but_wide_box_is_not() {
        let mut layout = page();
        layout.shapes.push(Rect::new(200.0, 100.0, 212.0, 112.0));
        layout.shapes.push(Rect::new(300.0, 100.0, 320.0, 110.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].kind, FieldKind::Checkbox);
    }

    #[test]
    fn underscore_run_becomes_single_text_field() {
        let mut layout = page();
        layout.chars.extend(word("______", 250.0, 500.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].rect, Rect::new(250.0, 500.0, 286.0, 510.0));
    }

    #[test]
    fn underscore_runs_on_consecutive_lines_stay_separate() {
        let mut layout = page();
        layout.chars.extend(word("____", 250.0, 500.0));
        layout.chars.extend(word("____", 250.0, 530.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].rect, Rect::new(250.0, 500.0, 274.0, 510.0));
        assert_eq!(fields[1].rect, Rect::new(250.0, 530.0, 274.0, 540.0));
    }

    #[test]
    fn two_underscores_are_not_a_field() {
        let mut layout = page();
        layout.chars.extend(word("a__b", 250.0, 500.0));
        assert!(detect_fields(&layout, &FieldDetectionConfig::default()).is_empty());
    }

    #[test]
    fn overlapping_candidates_keep_the_first() {
        let mut layout = page();
        layout.shapes.push(Rect::new(250.0, 511.0, 350.0, 512.0));
        // underscores drawn inside the box produced by the line
        layout.chars.extend(word("____", 260.0, 500.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].rect.x1, 350.0);
    }

    #[test]
    fn checkbox_glyphs_are_detected() {
        let mut layout = page();
        layout.chars.extend(word("☐", 150.0, 200.0));
        layout.chars.extend(word("☒", 150.0, 230.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields.len(), 2);
        assert!(fields.iter().all(|f| f.kind == FieldKind::Checkbox));
    }

    #[test]
    fn label_is_taken_from_text_on_the_left() {
        let mut layout = page();
        layout.chars.extend(word("Name:", 140.0, 290.0));
        layout.shapes.push(Rect::new(200.0, 300.0, 400.0, 301.0));
        let fields = detect_fields(&layout, &FieldDetectionConfig::default());
        assert_eq!(fields[0].label, "Name");
    }

    #[test]
    fn multi_line_labels_are_flattened() {
        assert_eq!(clean_label("Date of\nBirth:  "), "Date of Birth");
    }

    #[test]
    fn touching_rectangles_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Rect::new(9.0, 9.0, 12.0, 12.0)));
    }

    #[test]
    fn degenerate_page_yields_nothing() {
        let layout = PageLayout::default();
        assert!(detect_fields(&layout, &FieldDetectionConfig::default()).is_empty());
    }
}
