//! Anchor Locator: document fields and table boundaries found by keyword
//! anchors on reconstructed pages.

use chrono::NaiveDate;
use tracing::debug;

use crate::layout::{cmp_f32, Line, PageModel};
use crate::models::config::ParserConfig;
use crate::models::invoice::{InvoiceType, TaxRate, TaxRateEntry};

use super::rules::patterns::{CURRENCY_AMOUNT, EXEMPT_GLYPHS, MONEY_FRAGMENT, RATE_IN_TEXT};
use super::rules::{normalize_amount, CompiledPatterns, DateExtractor, FieldExtractor, InvoiceTypeExtractor};

/// Net amount and tax read from the totals row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TotalsRow {
    pub amount: Option<String>,
    pub tax_amount: Option<String>,
}

/// Locates anchors on coordinate-bearing pages.
pub struct AnchorLocator<'a> {
    config: &'a ParserConfig,
    patterns: &'a CompiledPatterns,
}

impl<'a> AnchorLocator<'a> {
    pub fn new(config: &'a ParserConfig, patterns: &'a CompiledPatterns) -> Self {
        Self { config, patterns }
    }

    /// First line containing a table header keyword.
    pub fn find_header_line<'p>(&self, page: &'p PageModel) -> Option<&'p Line> {
        let keywords = &self.config.table.header_keywords;
        page.lines.iter().find(|line| {
            let text = line.text();
            keywords.iter().any(|k| text.contains(k.as_str()))
        })
    }

    /// First line containing a footer keyword that is not the grand-total row.
    pub fn find_footer_line<'p>(&self, page: &'p PageModel) -> Option<&'p Line> {
        let table = &self.config.table;
        page.lines.iter().find(|line| {
            let text = line.text();
            table.footer_keywords.iter().any(|k| text.contains(k.as_str()))
                && !table.footer_exclusions.iter().any(|k| text.contains(k.as_str()))
        })
    }

    /// Invoice number printed after its label on the first page.
    pub fn invoice_number(&self, pages: &[PageModel]) -> Option<String> {
        let first = first_text_page(pages)?;
        let label = self.config.anchors.invoice_number_label.as_str();

        for line in &first.lines {
            for (i, fragment) in line.fragments.iter().enumerate() {
                if !fragment.text.contains(label) {
                    continue;
                }
                let found = line.fragments[i + 1..]
                    .iter()
                    .find_map(|f| self.patterns.invoice_number.find(&f.text));
                if let Some(m) = found {
                    debug!("Invoice number {} next to label at y={:.1}", m.as_str(), line.y);
                    return Some(m.as_str().to_string());
                }
            }
        }

        None
    }

    /// Any invoice-number-length digit run on any line, fragments joined
    /// without separator.
    pub fn invoice_number_in_lines(&self, pages: &[PageModel]) -> Option<String> {
        pages
            .iter()
            .flat_map(|p| p.lines.iter())
            .find_map(|line| {
                self.patterns
                    .invoice_number
                    .find(&line.text())
                    .map(|m| m.as_str().to_string())
            })
    }

    /// First date on the first page.
    pub fn invoice_date(&self, pages: &[PageModel]) -> Option<NaiveDate> {
        let first = first_text_page(pages)?;
        let extractor = DateExtractor::new(&self.patterns.date);
        first
            .lines
            .iter()
            .find_map(|line| extractor.extract(&line.joined(" ")))
            .map(|m| m.value)
    }

    /// Invoice type from a type phrase in the header region of the first page.
    pub fn invoice_type(&self, pages: &[PageModel]) -> Option<InvoiceType> {
        let first = first_text_page(pages)?;
        let threshold = first.height * self.config.layout.header_region_ratio;
        let extractor = InvoiceTypeExtractor::new(
            &self.patterns.special_type,
            &self.patterns.ordinary_type,
            &self.patterns.invoice_code,
            &self.config.anchors.exempt_keyword,
        );

        first
            .lines
            .iter()
            .filter(|line| line.y >= threshold)
            .find_map(|line| extractor.from_phrase(&line.text()))
    }

    /// Amount and tax from the first totals row of the last page: the
    /// second-to-last and last money values by x. An exempt invoice has a
    /// tax of `0.00`.
    pub fn totals(&self, pages: &[PageModel], exempt: bool) -> TotalsRow {
        let mut totals = TotalsRow::default();

        if let Some(last) = last_text_page(pages) {
            for line in &last.lines {
                if !self.patterns.total_row.is_match(&line.text()) {
                    continue;
                }

                let mut values: Vec<(f32, String)> = line
                    .fragments
                    .iter()
                    .filter_map(|f| {
                        MONEY_FRAGMENT
                            .captures(&f.text)
                            .map(|caps| (f.x, normalize_amount(&caps[1])))
                    })
                    .collect();
                if values.is_empty() {
                    continue;
                }
                values.sort_by(|a, b| cmp_f32(a.0, b.0));

                let amount_index = values.len().saturating_sub(2);
                totals.amount = Some(values[amount_index].1.clone());
                totals.tax_amount = values.last().map(|v| v.1.clone());
                debug!("Totals row at y={:.1}: {:?}", line.y, totals);
                break;
            }
        }

        if exempt {
            totals.tax_amount = Some("0.00".to_string());
        }
        totals
    }

    /// Grand total: first currency amount on the grand-total row of the last page.
    pub fn grand_total(&self, pages: &[PageModel]) -> Option<String> {
        let last = last_text_page(pages)?;

        last.lines
            .iter()
            .filter(|line| self.patterns.grand_total.is_match(&line.joined(" ")))
            .find_map(|line| {
                line.fragments
                    .iter()
                    .find_map(|f| CURRENCY_AMOUNT.captures(&f.text).map(|caps| normalize_amount(&caps[1])))
            })
    }

    /// Rates read down the tax-rate column, in order of first appearance.
    ///
    /// The column is the x of the first tax-rate label on any page; fragments
    /// within `x_tolerance` of it are scanned on every page.
    pub fn tax_rates(&self, pages: &[PageModel], exempt: bool) -> Vec<TaxRateEntry> {
        if exempt {
            return vec![TaxRateEntry {
                rate: TaxRate::Exempt,
                amount: None,
                index: 1,
            }];
        }

        let Some(column_x) = pages
            .iter()
            .flat_map(|p| p.fragments())
            .find(|f| self.patterns.tax_rate_label.is_match(&f.text))
            .map(|f| f.x)
        else {
            return Vec::new();
        };

        let whitelist = &self.config.tax.whitelist;
        let tolerance = self.config.layout.x_tolerance;
        let mut rates: Vec<TaxRate> = Vec::new();

        for fragment in pages.iter().flat_map(|p| p.fragments()) {
            if (fragment.x - column_x).abs() > tolerance {
                continue;
            }

            if let Some(caps) = RATE_IN_TEXT.captures(&fragment.text) {
                if let Ok(percent) = caps[1].parse::<u32>() {
                    let rate = TaxRate::Percent(percent);
                    if rate.is_allowed(whitelist) && !rates.contains(&rate) {
                        rates.push(rate);
                    }
                }
            }
            if EXEMPT_GLYPHS.is_match(&fragment.text) && !rates.contains(&TaxRate::Exempt) {
                rates.push(TaxRate::Exempt);
            }
        }

        debug!("Tax-rate column at x={:.1}: {:?}", column_x, rates);
        rates
            .into_iter()
            .zip(1..)
            .map(|(rate, index)| TaxRateEntry {
                rate,
                amount: None,
                index,
            })
            .collect()
    }
}

/// Blank pages carry no anchors.
fn first_text_page(pages: &[PageModel]) -> Option<&PageModel> {
    pages.iter().find(|p| !p.lines.is_empty())
}

fn last_text_page(pages: &[PageModel]) -> Option<&PageModel> {
    pages.iter().rev().find(|p| !p.lines.is_empty())
}
