//! PDF decoding module.

mod extractor;

pub use extractor::{PdfDecoder, RawPage};

use crate::error::DecodeError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Trait for sources of positioned text fragments.
pub trait FragmentSource {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Positioned fragments and page size of one page (1-indexed).
    fn page_fragments(&self, page: u32) -> Result<RawPage>;

    /// Flattened text of the entire PDF, without coordinates.
    fn extract_text(&self) -> Result<String>;
}
