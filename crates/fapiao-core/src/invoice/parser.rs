//! Invoice parser: the pipeline from document bytes to a [`DocumentResult`].

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, DecodeError, ExtractionError, RowParseError};
use crate::layout::{reconstruct_page, PageModel};
use crate::models::config::ParserConfig;
use crate::models::invoice::{DocumentResult, InvoiceFields, LineItem, ParseStatus, TaxRateEntry};
use crate::pdf::{FragmentSource, PdfDecoder};

use super::anchors::AnchorLocator;
use super::columns::{ColumnMapper, ColumnMapping, TableRegion};
use super::rows::RowSegmenter;
use super::rules::{
    AmountExtractor, CompiledPatterns, DateExtractor, FieldExtractor, InvoiceTypeExtractor, NumberExtractor,
    RateExtractor,
};
use super::strategy::{Attempt, Resolved, StrategyChain};
use super::validate::FieldValidator;

/// Parses invoice documents with one configuration.
///
/// Patterns are compiled once in [`InvoiceParser::new`]; the parser holds no
/// mutable state and can be shared across threads.
#[derive(Debug, Clone)]
pub struct InvoiceParser {
    config: ParserConfig,
    patterns: CompiledPatterns,
}

impl InvoiceParser {
    /// Build a parser, compiling every configured pattern.
    pub fn new(config: ParserConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let patterns = CompiledPatterns::from_config(&config)?;
        Ok(Self { config, patterns })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse one PDF document. Never fails: decode errors produce a failed
    /// result.
    pub fn parse_document(&self, file_name: &str, data: &[u8]) -> DocumentResult {
        let start = Instant::now();
        info!("Parsing {} ({} bytes)", file_name, data.len());

        let mut result = match self.decode(data) {
            Ok((pages, text)) => self.parse_pages(file_name, pages, text),
            Err(e) => {
                warn!("{}: {}", file_name, e);
                DocumentResult::failed(file_name, e.to_string())
            }
        };

        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn decode(&self, data: &[u8]) -> Result<(Vec<PageModel>, Option<String>), DecodeError> {
        let mut decoder = PdfDecoder::new();
        decoder.load(data)?;

        let y_tolerance = self.config.layout.y_tolerance;
        let pages: Vec<PageModel> = decoder
            .decode_pages()?
            .into_iter()
            .map(|raw| reconstruct_page(raw.fragments, raw.page_number, raw.width, raw.height, y_tolerance))
            .collect();

        if pages.iter().any(|p| !p.lines.is_empty()) {
            return Ok((pages, None));
        }

        // No positioned text: keep whatever the flattened extractor can read
        match decoder.extract_text() {
            Ok(text) => Ok((pages, Some(text))),
            Err(e) => {
                warn!("Flattened text unavailable: {}", e);
                Ok((pages, None))
            }
        }
    }

    /// Run the pipeline on reconstructed pages.
    ///
    /// `fallback_text` is used for document fields when the pages carry no
    /// positioned text.
    pub fn parse_pages(&self, file_name: &str, pages: Vec<PageModel>, fallback_text: Option<String>) -> DocumentResult {
        let start = Instant::now();

        let has_coordinates = pages.iter().any(|p| !p.lines.is_empty());
        let full_text = if has_coordinates {
            pages.iter().map(PageModel::text).collect::<Vec<_>>().join("\n")
        } else {
            fallback_text.unwrap_or_default()
        };
        debug!(
            "{}: {} pages, coordinates: {}, {} chars of text",
            file_name,
            pages.len(),
            has_coordinates,
            full_text.len()
        );

        let (fields, degraded_fields) = self.extract_fields(&pages, &full_text, has_coordinates);
        if !degraded_fields.is_empty() {
            warn!("{}: fields from full-text fallback: {}", file_name, degraded_fields.join(", "));
        }

        let validator = FieldValidator::new(&self.config);
        let validation = validator.validate_fields(&fields);

        let items = if pages.iter().all(|p| p.lines.is_empty()) {
            Err(ExtractionError::NoText)
        } else {
            self.extract_items(&pages)
        };

        let (items, status, error_message) = match items {
            Ok(mut items) => {
                validator.validate_items(&mut items);
                (items, ParseStatus::Success, None)
            }
            Err(e) => {
                warn!("{}: {}", file_name, e);
                (Vec::new(), ParseStatus::Failed, Some(e.to_string()))
            }
        };

        let result = DocumentResult {
            file_name: file_name.to_string(),
            invoice_number: fields.invoice_number.clone(),
            invoice_date: fields.invoice_date,
            invoice_type: fields.invoice_type,
            items,
            status,
            error_message,
            fields,
            validation,
            degraded_fields,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "{}: {:?}, {} items ({} clean)",
            file_name,
            result.status,
            result.items.len(),
            result.successful_items()
        );
        result
    }

    /// Document fields, each resolved by coordinate anchors first and the
    /// full-text extractors second. Returns the names of degraded fields.
    pub fn extract_fields(&self, pages: &[PageModel], full_text: &str, has_coordinates: bool) -> (InvoiceFields, Vec<String>) {
        let config = &self.config;
        let patterns = &self.patterns;
        let anchors = AnchorLocator::new(config, patterns);
        let exempt_keyword = config.anchors.exempt_keyword.as_str();
        let exempt = !exempt_keyword.is_empty() && full_text.contains(exempt_keyword);

        // Anchors only run on coordinate-bearing pages
        let pages: &[PageModel] = if has_coordinates { pages } else { &[] };
        let totals = anchors.totals(pages, exempt);

        let mut degraded = Vec::new();

        let invoice_number = resolve_into(
            "invoice_number",
            StrategyChain::new("invoice_number")
                .then("label", || Attempt::found(anchors.invoice_number(pages)))
                .then("line-scan", || Attempt::degraded(anchors.invoice_number_in_lines(pages)))
                .then("full-text", || {
                    let extractor = NumberExtractor::new(&patterns.number_fallbacks, config.anchors.invoice_number_digits);
                    Attempt::degraded(extractor.extract(full_text).map(|m| m.value))
                })
                .resolve(),
            &mut degraded,
        );

        let invoice_type = resolve_into(
            "invoice_type",
            StrategyChain::new("invoice_type")
                .then("header-region", || Attempt::found(anchors.invoice_type(pages)))
                .then("full-text", || {
                    let extractor = InvoiceTypeExtractor::new(
                        &patterns.special_type,
                        &patterns.ordinary_type,
                        &patterns.invoice_code,
                        exempt_keyword,
                    );
                    Attempt::degraded(extractor.extract(full_text))
                })
                .resolve(),
            &mut degraded,
        );

        let invoice_date = resolve_into(
            "invoice_date",
            StrategyChain::new("invoice_date")
                .then("first-page", || Attempt::found(anchors.invoice_date(pages)))
                .then("full-text", || {
                    Attempt::degraded(DateExtractor::new(&patterns.date).extract(full_text).map(|m| m.value))
                })
                .resolve(),
            &mut degraded,
        );

        let amount = resolve_into(
            "amount",
            StrategyChain::new("amount")
                .then("totals-row", || Attempt::found(totals.amount.clone()))
                .then("full-text", || {
                    Attempt::degraded(AmountExtractor::new(&patterns.amount_fallbacks).extract(full_text).map(|m| m.value))
                })
                .resolve(),
            &mut degraded,
        );

        let tax_amount = resolve_into(
            "tax_amount",
            StrategyChain::new("tax_amount")
                .then("totals-row", || Attempt::found(totals.tax_amount.clone()))
                .then("full-text", || {
                    if exempt {
                        return Attempt::Degraded("0.00".to_string());
                    }
                    Attempt::degraded(AmountExtractor::new(&patterns.tax_fallbacks).extract(full_text).map(|m| m.value))
                })
                .resolve(),
            &mut degraded,
        );

        let total_amount = resolve_into(
            "total_amount",
            StrategyChain::new("total_amount")
                .then("grand-total-row", || Attempt::found(anchors.grand_total(pages)))
                .then("full-text", || {
                    Attempt::degraded(AmountExtractor::new(&patterns.total_fallbacks).extract(full_text).map(|m| m.value))
                })
                .resolve(),
            &mut degraded,
        );

        let tax_rates = resolve_into(
            "tax_rates",
            StrategyChain::new("tax_rates")
                .then("rate-column", || {
                    let entries = anchors.tax_rates(pages, exempt);
                    Attempt::found((!entries.is_empty()).then_some(entries))
                })
                .then("full-text", || {
                    let rates = RateExtractor::new(&patterns.rate_fallbacks, &config.tax.whitelist).rates(full_text, exempt_keyword);
                    let entries: Vec<TaxRateEntry> = rates
                        .into_iter()
                        .zip(1..)
                        .map(|(rate, index)| TaxRateEntry {
                            rate,
                            amount: None,
                            index,
                        })
                        .collect();
                    Attempt::degraded((!entries.is_empty()).then_some(entries))
                })
                .resolve(),
            &mut degraded,
        )
        .unwrap_or_default();

        let fields = InvoiceFields {
            invoice_number,
            invoice_type,
            invoice_date,
            amount,
            tax_amount,
            total_amount,
            tax_rates,
        };
        (fields, degraded)
    }

    /// Table region per page, all sharing the column mapping of the first
    /// page that carries a header line.
    ///
    /// Pages after the first without a header continue the table from the
    /// page top.
    pub fn detect_table_regions(&self, pages: &[PageModel]) -> Result<Vec<Option<TableRegion>>, ExtractionError> {
        let anchors = AnchorLocator::new(&self.config, &self.patterns);
        let mapper = ColumnMapper::new(&self.config.columns);

        let mut mapping: Option<ColumnMapping> = None;
        let mut bounds: Vec<Option<(f32, Option<f32>)>> = Vec::with_capacity(pages.len());

        for page in pages {
            let footer_y = anchors.find_footer_line(page).map(|line| line.y);

            match anchors.find_header_line(page) {
                Some(header) => {
                    if mapping.is_none() {
                        let detected = mapper.detect(header);
                        info!("Page {}: table header at y={:.1}, {} columns", page.page_number, header.y, detected.len());
                        mapping = Some(detected);
                    }
                    bounds.push(Some((header.y, footer_y)));
                }
                None if page.page_number > 1 => bounds.push(Some((page.height, footer_y))),
                None => bounds.push(None),
            }
        }

        let mapping = mapping.ok_or(ExtractionError::TableNotFound)?;

        Ok(bounds
            .into_iter()
            .map(|bound| {
                bound.map(|(header_y, footer_y)| TableRegion {
                    header_y,
                    footer_y,
                    mapping: mapping.clone(),
                })
            })
            .collect())
    }

    /// Line items of every page. A row that cannot be parsed becomes a failed
    /// item; its siblings are unaffected.
    pub fn extract_items(&self, pages: &[PageModel]) -> Result<Vec<LineItem>, ExtractionError> {
        let regions = self.detect_table_regions(pages)?;
        let segmenter = RowSegmenter::new(&self.config, &self.patterns);
        let mut items: Vec<LineItem> = Vec::new();

        for (page, region) in pages.iter().zip(&regions) {
            let Some(region) = region else {
                continue;
            };

            for row in segmenter.segment(page, region) {
                let line_number = items.len() as u32 + 1;

                match segmenter.parse_row(&row, &region.mapping, page.width) {
                    Ok(mut item) => {
                        let invalid_name = item
                            .goods_name
                            .as_deref()
                            .is_some_and(|name| self.patterns.is_invalid_row(name));
                        if invalid_name || (item.goods_name.is_none() && item.amount.is_none()) {
                            debug!("Dropping row at y={:.1}: {:?}", row.y, item.goods_name);
                            continue;
                        }
                        item.line_number = line_number;
                        items.push(item);
                    }
                    Err(RowParseError::EmptyRow) => {
                        debug!("Dropping empty row at y={:.1}", row.y);
                    }
                    Err(e) => {
                        warn!("Row {} on page {} failed: {}", line_number, page.page_number, e);
                        items.push(LineItem::failed(line_number, page.page_number, e.to_string()));
                    }
                }
            }
        }

        if items.is_empty() {
            return Err(ExtractionError::NoItems);
        }

        debug!("Extracted {} line items", items.len());
        Ok(items)
    }
}

fn resolve_into<T>(field: &str, resolved: Option<Resolved<T>>, degraded: &mut Vec<String>) -> Option<T> {
    let resolved = resolved?;
    if resolved.degraded {
        degraded.push(field.to_string());
    }
    Some(resolved.value)
}
