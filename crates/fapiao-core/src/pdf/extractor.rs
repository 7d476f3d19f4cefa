//! Positioned text extraction using lopdf, flattened text via pdf-extract.

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::{FragmentSource, Result};
use crate::error::DecodeError;
use crate::layout::TextFragment;

/// A4 portrait, used when a page carries no MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 595.28, 841.89];

/// Fragments of one page before line reconstruction.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// Page number (1-indexed).
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    pub fragments: Vec<TextFragment>,
}

/// PDF decoder built on lopdf.
pub struct PdfDecoder {
    document: Option<Document>,
    raw_data: Vec<u8>,
}

impl PdfDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
        }
    }

    /// Decode every page. A page whose content stream is unreadable yields
    /// an empty page instead of failing the document.
    pub fn decode_pages(&self) -> Result<Vec<RawPage>> {
        let page_count = self.page_count();
        if page_count == 0 {
            return Err(DecodeError::NoPages);
        }

        let mut pages = Vec::with_capacity(page_count as usize);
        for page_num in 1..=page_count {
            match self.page_fragments(page_num) {
                Ok(page) => pages.push(page),
                Err(DecodeError::Content { page, reason }) => {
                    warn!("Skipping content of page {}: {}", page, reason);
                    let [x0, y0, x1, y1] = self.media_box(page_num);
                    pages.push(RawPage {
                        page_number: page_num,
                        width: x1 - x0,
                        height: y1 - y0,
                        fragments: Vec::new(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Decoded {} pages, {} fragments",
            pages.len(),
            pages.iter().map(|p| p.fragments.len()).sum::<usize>()
        );
        Ok(pages)
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| DecodeError::Parse("No document loaded".to_string()))
    }

    fn media_box(&self, page: u32) -> [f32; 4] {
        let Some(doc) = self.document.as_ref() else {
            return DEFAULT_MEDIA_BOX;
        };
        doc.get_pages()
            .get(&page)
            .and_then(|id| find_media_box(doc, *id))
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }
}

impl Default for PdfDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentSource for PdfDecoder {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| DecodeError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(DecodeError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes
            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data)
                .map_err(|e| DecodeError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(DecodeError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn page_fragments(&self, page: u32) -> Result<RawPage> {
        let doc = self.document()?;
        let pages = doc.get_pages();
        let page_id = *pages.get(&page).ok_or(DecodeError::InvalidPage(page))?;

        let [x0, y0, x1, y1] = find_media_box(doc, page_id).unwrap_or(DEFAULT_MEDIA_BOX);

        let content = doc.get_page_content(page_id).map_err(|e| DecodeError::Content {
            page,
            reason: e.to_string(),
        })?;

        let fonts = page_fonts(doc, page_id);
        let decode = |font: &[u8], bytes: &[u8]| {
            fonts
                .get(font)
                .and_then(|f| f.get_font_encoding(doc).ok())
                .and_then(|encoding| Document::decode_text(&encoding, bytes).ok())
                .unwrap_or_else(|| decode_text_simple(bytes))
        };

        let fragments = interpret_content(&content, decode, page).map_err(|reason| {
            DecodeError::Content { page, reason }
        })?;

        trace!("Page {}: {} fragments", page, fragments.len());

        Ok(RawPage {
            page_number: page,
            width: x1 - x0,
            height: y1 - y0,
            fragments,
        })
    }

    fn extract_text(&self) -> Result<String> {
        let text = pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| DecodeError::TextExtraction(e.to_string()))?;
        Ok(text)
    }
}

/// Look up MediaBox on the page or any ancestor.
fn find_media_box(doc: &Document, node_id: ObjectId) -> Option<[f32; 4]> {
    let dict = doc.get_dictionary(node_id).ok()?;

    if let Ok(obj) = dict.get(b"MediaBox") {
        if let Ok((_, Object::Array(values))) = doc.dereference(obj) {
            let nums: Vec<f32> = values.iter().filter_map(get_number).collect();
            if nums.len() == 4 {
                return Some([nums[0], nums[1], nums[2], nums[3]]);
            }
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => find_media_box(doc, *parent_id),
        _ => None,
    }
}

/// Look up the Resources dictionary on the page or any ancestor.
fn find_resources(doc: &Document, node_id: ObjectId) -> Option<&Dictionary> {
    let dict = doc.get_dictionary(node_id).ok()?;

    if let Ok(obj) = dict.get(b"Resources") {
        if let Ok((_, Object::Dictionary(resources))) = doc.dereference(obj) {
            return Some(resources);
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => find_resources(doc, *parent_id),
        _ => None,
    }
}

/// Font dictionaries of a page, keyed by resource name.
fn page_fonts(doc: &Document, page_id: ObjectId) -> BTreeMap<Vec<u8>, &Dictionary> {
    let Some(fonts) = find_resources(doc, page_id)
        .and_then(|resources| resources.get(b"Font").ok())
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok())
    else {
        return BTreeMap::new();
    };

    fonts
        .iter()
        .filter_map(|(name, obj)| {
            let (_, font) = doc.dereference(obj).ok()?;
            Some((name.clone(), font.as_dict().ok()?))
        })
        .collect()
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let mut m = [0.0; 6];
        for (slot, obj) in m.iter_mut().zip(operands) {
            *slot = get_number(obj)?;
        }
        Some(Matrix(m))
    }

    /// `self x other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn horizontal_scale(&self) -> f32 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1]).sqrt()
    }

    fn vertical_scale(&self) -> f32 {
        (self.0[2] * self.0[2] + self.0[3] * self.0[3]).sqrt()
    }
}

/// Text state carried across a content stream.
struct TextState {
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font: Vec<u8>,
    font_size: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    /// Emit a fragment at the current position and advance past it.
    fn show(&mut self, text: String, em_width: f32, page: u32, out: &mut Vec<TextFragment>) {
        let advance = em_width * self.font_size;
        let rendering = self.text_matrix.then(&self.ctm);
        let [_, _, _, _, x, y] = rendering.0;

        if !text.is_empty() {
            out.push(TextFragment::new(
                text,
                x,
                y,
                advance * rendering.horizontal_scale(),
                self.font_size * rendering.vertical_scale(),
                page,
            ));
        }

        self.text_matrix = Matrix::translation(advance, 0.0).then(&self.text_matrix);
    }
}

/// Walk a decoded content stream and collect one fragment per text-showing operator.
fn interpret_content(
    content: &[u8],
    decode: impl Fn(&[u8], &[u8]) -> String,
    page: u32,
) -> std::result::Result<Vec<TextFragment>, String> {
    let content = Content::decode(content).map_err(|e| e.to_string())?;

    let mut fragments = Vec::new();
    let mut state = TextState::default();

    for op in content.operations {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => state.ctm_stack.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.ctm_stack.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.ctm = m.then(&state.ctm);
                }
            }
            "BT" => {
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if operands.len() >= 2 {
                    if let Object::Name(name) = &operands[0] {
                        state.font = name.clone();
                    }
                    state.font_size = get_number(&operands[1]).unwrap_or(12.0);
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(get_number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                if operands.len() >= 2 {
                    let tx = get_number(&operands[0]).unwrap_or(0.0);
                    let ty = get_number(&operands[1]).unwrap_or(0.0);
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "T*" => state.next_line(),
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    state.next_line();
                }
                let string_operand = if op.operator == "\"" {
                    operands.get(2)
                } else {
                    operands.first()
                };
                if let Some(Object::String(bytes, _)) = string_operand {
                    let text = decode(&state.font[..], &bytes[..]);
                    let em = em_width(&text);
                    state.show(text, em, page, &mut fragments);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut text = String::new();
                    let mut em = 0.0;
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                let decoded = decode(&state.font[..], &bytes[..]);
                                em += em_width(&decoded);
                                text.push_str(&decoded);
                            }
                            // Adjustments are in thousandths of text space, positive moves left
                            other => {
                                if let Some(n) = get_number(other) {
                                    em -= n / 1000.0;
                                }
                            }
                        }
                    }
                    state.show(text, em, page, &mut fragments);
                }
            }
            _ => {}
        }
    }

    Ok(fragments)
}

/// Approximate advance in ems: half an em for narrow glyphs, a full em for wide ones.
fn em_width(text: &str) -> f32 {
    text.chars()
        .map(|c| if c.is_ascii() { 0.5 } else { 1.0 })
        .sum()
}

/// Helper to extract number from PDF object.
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Simple text decoding fallback when no encoding is available.
fn decode_text_simple(bytes: &[u8]) -> String {
    // UTF-16BE with BOM
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};
    use pretty_assertions::assert_eq;

    fn build_pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decoder_new() {
        let decoder = PdfDecoder::new();
        assert!(decoder.document.is_none());
        assert_eq!(decoder.page_count(), 0);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut decoder = PdfDecoder::new();
        let err = decoder.load(b"not a pdf").unwrap_err();
        assert!(matches!(err, DecodeError::Parse(_)));
    }

    #[test]
    fn test_positioned_fragments() {
        let data = build_pdf(vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello")]),
            Operation::new("Td", vec![0.into(), (-20).into()]),
            Operation::new("Tj", vec![Object::string_literal("75.2213%")]),
            Operation::new("ET", vec![]),
        ]);

        let mut decoder = PdfDecoder::new();
        decoder.load(&data).unwrap();
        assert_eq!(decoder.page_count(), 1);

        let page = decoder.page_fragments(1).unwrap();
        assert_eq!(page.width, 595.0);
        assert_eq!(page.height, 842.0);
        assert_eq!(page.fragments.len(), 2);

        let hello = &page.fragments[0];
        assert_eq!(hello.text, "Hello");
        assert_eq!((hello.x, hello.y), (100.0, 600.0));
        assert_eq!(hello.width, 25.0);
        assert_eq!(hello.height, 10.0);

        let numbers = &page.fragments[1];
        assert_eq!(numbers.text, "75.2213%");
        assert_eq!((numbers.x, numbers.y), (100.0, 580.0));
    }

    #[test]
    fn test_cm_and_tm_compose() {
        let data = build_pdf(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![2.into(), 0.into(), 0.into(), 2.into(), 10.into(), 20.into()],
            ),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 5.into()]),
            Operation::new(
                "Tm",
                vec![1.into(), 0.into(), 0.into(), 1.into(), 50.into(), 100.into()],
            ),
            Operation::new("Tj", vec![Object::string_literal("ab")]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ]);

        let mut decoder = PdfDecoder::new();
        decoder.load(&data).unwrap();
        let page = decoder.page_fragments(1).unwrap();

        let frag = &page.fragments[0];
        assert_eq!((frag.x, frag.y), (110.0, 220.0));
        assert_eq!(frag.width, 10.0);
        assert_eq!(frag.height, 10.0);
    }

    #[test]
    fn test_invalid_page() {
        let data = build_pdf(vec![]);
        let mut decoder = PdfDecoder::new();
        decoder.load(&data).unwrap();
        assert!(matches!(decoder.page_fragments(5), Err(DecodeError::InvalidPage(5))));
    }

    #[test]
    fn test_decode_text_simple_utf16() {
        let bytes = [0xFE, 0xFF, 0x54, 0x08, 0x8B, 0xA1];
        assert_eq!(decode_text_simple(&bytes), "合计");
    }
}
