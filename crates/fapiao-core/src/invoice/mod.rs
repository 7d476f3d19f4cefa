//! Invoice field and line-item extraction.
//!
//! Pipeline stages, leaves first: anchors and columns are located on
//! reconstructed pages, rows are segmented and classified, concatenated
//! numbers are disambiguated and every record is validated.

pub mod anchors;
pub mod columns;
pub mod numeric;
mod parser;
pub mod rows;
pub mod rules;
pub mod strategy;
pub mod validate;

pub use anchors::{AnchorLocator, TotalsRow};
pub use columns::{Column, ColumnField, ColumnMapper, ColumnMapping, ColumnSource, TableRegion};
pub use numeric::{NumericDisambiguator, SplitResult};
pub use parser::InvoiceParser;
pub use rows::{FieldBoundaries, RawRow, RowSegmenter};
pub use strategy::{Attempt, Resolved, StrategyChain};
pub use validate::FieldValidator;

use crate::error::ExtractionError;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;
