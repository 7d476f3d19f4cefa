//! Error types for the fapiao-core library.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the fapiao library.
#[derive(Error, Debug)]
pub enum FapiaoError {
    /// The document bytes could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Line-item extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding a PDF into positioned text.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// A page content stream could not be interpreted.
    #[error("failed to read content of page {page}: {reason}")]
    Content { page: u32, reason: String },

    /// Failed to extract flattened text from the PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),
}

/// Document-level failures of line-item extraction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// No page carries a table header line.
    #[error("line-item table header not found")]
    TableNotFound,

    /// A table was found but yielded no item rows.
    #[error("no line items found in table")]
    NoItems,

    /// The document carries no positioned text at all.
    #[error("document has no positioned text")]
    NoText,
}

/// Failure while turning one raw table row into a line item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowParseError {
    /// A numeric field ended up with a value that is not a plain decimal.
    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    /// Every fragment of the row was filtered out.
    #[error("row has no usable content")]
    EmptyRow,
}

/// Configuration problems detected when building a parser.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A pattern from the configuration does not compile.
    #[error("invalid pattern `{name}`: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Category of a cross-field validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// `quantity x unitPrice` does not match `amount`.
    LineAmount,
    /// `amount x taxRate` does not match `taxAmount`.
    LineTax,
    /// `amount + taxAmount` does not match the grand total.
    DocumentTotal,
    /// Tax rate outside the whitelist.
    TaxRate,
    /// A value does not have the expected shape.
    Format,
    /// A value is out of its allowed range.
    Range,
}

/// A non-fatal finding attached to a record. Never returned as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result type for the fapiao library.
pub type Result<T> = std::result::Result<T, FapiaoError>;
