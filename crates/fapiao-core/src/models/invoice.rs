//! Invoice data models: line items, document fields and parse results.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationWarning;

/// Outcome of parsing a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    #[default]
    Success,
    Failed,
}

/// A tax rate as printed on the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaxRate {
    /// Percentage rate, e.g. 13 for "13%".
    Percent(u32),
    /// Tax exempt (免税, or masked as `***`).
    Exempt,
}

impl TaxRate {
    /// Parse a rate from "13%", "13", "exempt" or the exemption glyphs.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s {
            "exempt" | "免税" => return Some(TaxRate::Exempt),
            _ if !s.is_empty() && s.chars().all(|c| c == '*') => return Some(TaxRate::Exempt),
            _ => {}
        }
        s.trim_end_matches('%').parse::<u32>().ok().map(TaxRate::Percent)
    }

    /// The rate as a multiplier (0.13 for 13%, zero when exempt).
    pub fn as_decimal(&self) -> Decimal {
        match self {
            TaxRate::Percent(p) => Decimal::new(*p as i64, 2),
            TaxRate::Exempt => Decimal::ZERO,
        }
    }

    /// Whether the rate is exempt or one of the whitelisted percentages.
    pub fn is_allowed(&self, whitelist: &[u32]) -> bool {
        match self {
            TaxRate::Percent(p) => whitelist.contains(p),
            TaxRate::Exempt => true,
        }
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxRate::Percent(p) => write!(f, "{}%", p),
            TaxRate::Exempt => f.write_str("exempt"),
        }
    }
}

impl From<TaxRate> for String {
    fn from(rate: TaxRate) -> Self {
        rate.to_string()
    }
}

impl TryFrom<String> for TaxRate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TaxRate::parse(&value).ok_or_else(|| format!("invalid tax rate: {}", value))
    }
}

/// Kind of VAT invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceType {
    /// Special VAT invoice (增值税专用发票).
    #[serde(rename = "专票")]
    Special,
    /// Ordinary VAT invoice, paper or electronic.
    #[serde(rename = "普票")]
    Ordinary,
}

impl InvoiceType {
    /// Short label used on exports.
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceType::Special => "专票",
            InvoiceType::Ordinary => "普票",
        }
    }
}

/// One row of the invoice line-item table.
///
/// Field values are kept exactly as read from the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goods_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<TaxRate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<String>,

    /// 1-based position within the document.
    pub line_number: u32,

    /// 1-based page the row was read from.
    pub page_number: u32,

    pub status: ParseStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl LineItem {
    /// A row that could not be parsed at all.
    pub fn failed(line_number: u32, page_number: u32, reason: impl Into<String>) -> Self {
        Self {
            line_number,
            page_number,
            status: ParseStatus::Failed,
            error_message: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Mark the item failed with the given warnings. Field values are kept.
    pub fn flag(&mut self, warnings: &[ValidationWarning]) {
        if warnings.is_empty() {
            return;
        }
        self.status = ParseStatus::Failed;
        let joined = warnings
            .iter()
            .map(|w| w.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{}; {}", existing, joined),
            None => joined,
        });
    }
}

/// One entry of the document tax-rate summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRateEntry {
    pub rate: TaxRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// 1-based order of first appearance.
    pub index: u32,
}

/// Document-level fields of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_type: Option<InvoiceType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<NaiveDate>,

    /// Net amount from the totals row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<String>,

    /// Grand total (amount + tax).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<String>,

    pub tax_rates: Vec<TaxRateEntry>,
}

/// Result of the document `amount + tax = total` check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TotalCheck {
    Passed { difference: Decimal },
    Failed { difference: Decimal },
    /// One of the three values is missing or unreadable.
    Skipped,
}

/// Validation outcome for [`InvoiceFields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldsValidation {
    pub valid: bool,
    pub warnings: Vec<ValidationWarning>,
    pub total_check: TotalCheck,
}

impl Default for FieldsValidation {
    fn default() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            total_check: TotalCheck::Skipped,
        }
    }
}

/// Complete parse result for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResult {
    pub file_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_type: Option<InvoiceType>,

    pub items: Vec<LineItem>,

    pub status: ParseStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Whole-invoice totals and tax-rate summary.
    pub fields: InvoiceFields,

    pub validation: FieldsValidation,

    /// Fields that were only found by the full-text fallback.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub degraded_fields: Vec<String>,

    pub processing_time_ms: u64,
}

impl DocumentResult {
    /// A document that failed before any field could be read.
    pub fn failed(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            invoice_number: None,
            invoice_date: None,
            invoice_type: None,
            items: Vec::new(),
            status: ParseStatus::Failed,
            error_message: Some(reason.into()),
            fields: InvoiceFields::default(),
            validation: FieldsValidation::default(),
            degraded_fields: Vec::new(),
            processing_time_ms: 0,
        }
    }

    /// Number of items that parsed cleanly.
    pub fn successful_items(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.status == ParseStatus::Success)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WarningKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tax_rate_parsing() {
        assert_eq!(TaxRate::parse("13%"), Some(TaxRate::Percent(13)));
        assert_eq!(TaxRate::parse("6"), Some(TaxRate::Percent(6)));
        assert_eq!(TaxRate::parse("免税"), Some(TaxRate::Exempt));
        assert_eq!(TaxRate::parse("***"), Some(TaxRate::Exempt));
        assert_eq!(TaxRate::parse("exempt"), Some(TaxRate::Exempt));
        assert_eq!(TaxRate::parse("abc"), None);
    }

    #[test]
    fn test_tax_rate_display_and_decimal() {
        assert_eq!(TaxRate::Percent(9).to_string(), "9%");
        assert_eq!(TaxRate::Exempt.to_string(), "exempt");
        assert_eq!(TaxRate::Percent(13).as_decimal(), Decimal::new(13, 2));
        assert_eq!(TaxRate::Exempt.as_decimal(), Decimal::ZERO);
    }

    #[test]
    fn test_tax_rate_whitelist() {
        let whitelist = [0, 1, 3, 5, 6, 9, 10, 11, 13, 16, 17];
        assert!(TaxRate::Percent(13).is_allowed(&whitelist));
        assert!(TaxRate::Exempt.is_allowed(&whitelist));
        assert!(!TaxRate::Percent(23).is_allowed(&whitelist));
    }

    #[test]
    fn test_line_item_serializes_camel_case() {
        let item = LineItem {
            goods_name: Some("*办公用品*纸".to_string()),
            unit_price: Some("45.75".to_string()),
            tax_rate: Some(TaxRate::Percent(13)),
            line_number: 1,
            page_number: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["unitPrice"], "45.75");
        assert_eq!(json["taxRate"], "13%");
        assert_eq!(json["status"], "success");
        assert!(json.get("quantity").is_none());
    }

    #[test]
    fn test_flag_keeps_values() {
        let mut item = LineItem {
            amount: Some("10.00".to_string()),
            ..Default::default()
        };
        item.flag(&[
            ValidationWarning::new(WarningKind::LineAmount, "a"),
            ValidationWarning::new(WarningKind::LineTax, "b"),
        ]);
        assert_eq!(item.status, ParseStatus::Failed);
        assert_eq!(item.error_message.as_deref(), Some("a; b"));
        assert_eq!(item.amount.as_deref(), Some("10.00"));
    }

    #[test]
    fn test_invoice_type_serialization() {
        assert_eq!(serde_json::to_string(&InvoiceType::Special).unwrap(), "\"专票\"");
        assert_eq!(InvoiceType::Ordinary.label(), "普票");
    }
}
