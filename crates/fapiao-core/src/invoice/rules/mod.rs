//! Full-text field extractors.
//!
//! These work on the flattened document text and are the degraded path used
//! when coordinate anchors find nothing.

pub mod amounts;
pub mod dates;
pub mod identity;
pub mod patterns;
pub mod rates;

pub use amounts::{normalize_amount, parse_amount, AmountExtractor};
pub use dates::DateExtractor;
pub use identity::{InvoiceTypeExtractor, NumberExtractor};
pub use patterns::CompiledPatterns;
pub use rates::RateExtractor;

use regex::{Captures, Match};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// A value found in text together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Position in source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, source: impl Into<String>) -> Self {
        Self {
            value,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }

    fn from_match(value: T, m: &Match<'_>) -> Self {
        Self::new(value, m.as_str()).with_position(m.start(), m.end())
    }
}

/// The last capture group that participated in the match.
fn last_group<'t>(caps: &Captures<'t>) -> Option<Match<'t>> {
    (1..caps.len()).rev().find_map(|i| caps.get(i))
}
