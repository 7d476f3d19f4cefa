//! Core library for Chinese VAT invoice (fapiao) PDF parsing.
//!
//! This crate provides:
//! - PDF decoding into positioned text fragments
//! - Page reconstruction into y-ordered lines
//! - Anchor, column and row detection for the line-item table
//! - Disambiguation of concatenated numeric tokens
//! - Arithmetic cross-validation of line items and document totals
//! - Bounded-width async batch processing

pub mod error;
pub mod layout;
pub mod models;
pub mod pdf;
pub mod invoice;
#[cfg(feature = "async")]
pub mod batch;

pub use error::{FapiaoError, Result, ValidationWarning, WarningKind};
pub use layout::{reconstruct_page, Line, PageModel, TextFragment};
pub use models::config::ParserConfig;
pub use models::invoice::{
    DocumentResult, FieldsValidation, InvoiceFields, InvoiceType, LineItem, ParseStatus, TaxRate, TaxRateEntry,
    TotalCheck,
};
pub use pdf::{FragmentSource, PdfDecoder, RawPage};
pub use invoice::InvoiceParser;

#[cfg(feature = "async")]
pub use batch::{parse_batch, BatchInput, BatchProgress};
