//! Page reconstruction: clusters positioned text fragments into ordered lines.
//!
//! Coordinates follow the PDF convention: origin at the bottom-left corner,
//! y grows upwards. Lines are therefore ordered by descending y (top to bottom).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// One positioned run of text from a page's text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    /// Origin x (left edge).
    pub x: f32,
    /// Baseline y.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// 1-based page number.
    pub page_number: u32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, x: f32, y: f32, width: f32, height: f32, page_number: u32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
            page_number,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

/// Fragments sharing a baseline, ordered by ascending x.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Representative y: the y of the fragment that opened the line.
    pub y: f32,
    pub fragments: Vec<TextFragment>,
}

impl Line {
    /// Fragment texts concatenated without separator.
    pub fn text(&self) -> String {
        self.joined("")
    }

    /// Fragment texts joined with `sep`.
    pub fn joined(&self, sep: &str) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// A reconstructed page: lines ordered top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageModel {
    /// 1-based page number.
    pub page_number: u32,
    pub lines: Vec<Line>,
    pub width: f32,
    pub height: f32,
}

impl PageModel {
    /// An empty page of the given size.
    pub fn empty(page_number: u32, width: f32, height: f32) -> Self {
        Self {
            page_number,
            lines: Vec::new(),
            width,
            height,
        }
    }

    /// Flattened page text: fragments joined by spaces, lines by newlines.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.joined(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// All fragments of the page in reading order.
    pub fn fragments(&self) -> impl Iterator<Item = &TextFragment> {
        self.lines.iter().flat_map(|l| l.fragments.iter())
    }
}

/// Group fragments of one page into lines.
///
/// Each fragment joins the first existing line whose representative y is
/// within `y_tolerance`, otherwise it opens a new line.
pub fn reconstruct_page(
    fragments: Vec<TextFragment>,
    page_number: u32,
    width: f32,
    height: f32,
    y_tolerance: f32,
) -> PageModel {
    let mut lines: Vec<Line> = Vec::new();

    for fragment in fragments {
        match lines
            .iter_mut()
            .find(|line| (fragment.y - line.y).abs() <= y_tolerance)
        {
            Some(line) => line.fragments.push(fragment),
            None => lines.push(Line {
                y: fragment.y,
                fragments: vec![fragment],
            }),
        }
    }

    for line in &mut lines {
        line.fragments.sort_by(|a, b| cmp_f32(a.x, b.x));
    }
    lines.sort_by(|a, b| cmp_f32(b.y, a.y));

    trace!("Reconstructed page {} into {} lines", page_number, lines.len());

    PageModel {
        page_number,
        lines,
        width,
        height,
    }
}

/// Total order on coordinates; NaN sorts last.
pub(crate) fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}
