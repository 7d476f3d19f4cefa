//! Field Validator: arithmetic and range cross-checks.
//!
//! Validation only annotates. Field values are never rewritten; a failing
//! line item is marked failed and keeps its best-effort values.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::error::{ValidationWarning, WarningKind};
use crate::models::config::ParserConfig;
use crate::models::invoice::{FieldsValidation, InvoiceFields, LineItem, TotalCheck};

use super::numeric::is_valid_number_format;
use super::rules::identity::is_invoice_number;
use super::rules::parse_amount;

/// Cross-checks line items and document fields.
pub struct FieldValidator<'a> {
    config: &'a ParserConfig,
}

impl<'a> FieldValidator<'a> {
    pub fn new(config: &'a ParserConfig) -> Self {
        Self { config }
    }

    /// Findings for one line item.
    pub fn validate_line(&self, item: &LineItem) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let tolerance = self.config.tolerance.line;

        let numeric_fields = [
            ("quantity", &item.quantity),
            ("unit price", &item.unit_price),
            ("amount", &item.amount),
            ("tax amount", &item.tax_amount),
        ];
        for (name, value) in numeric_fields {
            if let Some(value) = value {
                if !is_valid_number_format(value) {
                    warnings.push(ValidationWarning::new(
                        WarningKind::Format,
                        format!("{} '{}' is not a plain decimal", name, value),
                    ));
                }
            }
        }

        let quantity = item.quantity.as_deref().and_then(parse_amount);
        let unit_price = item.unit_price.as_deref().and_then(parse_amount);
        let amount = item.amount.as_deref().and_then(parse_amount);
        let tax_amount = item.tax_amount.as_deref().and_then(parse_amount);

        if let (Some(quantity), Some(unit_price), Some(amount)) = (quantity, unit_price, amount) {
            match quantity.checked_mul(unit_price) {
                Some(expected) if tolerance.accepts(expected, amount) => {}
                Some(expected) => warnings.push(ValidationWarning::new(
                    WarningKind::LineAmount,
                    format!("quantity x unit price = {} but amount is {}", expected.round_dp(4), amount),
                )),
                None => warnings.push(ValidationWarning::new(
                    WarningKind::LineAmount,
                    format!("quantity {} x unit price {} is out of range", quantity, unit_price),
                )),
            }
        }

        if let Some(rate) = item.tax_rate {
            if !rate.is_allowed(&self.config.tax.whitelist) {
                warnings.push(ValidationWarning::new(
                    WarningKind::TaxRate,
                    format!("tax rate {} is not an allowed rate", rate),
                ));
            }

            if let (Some(amount), Some(tax_amount)) = (amount, tax_amount) {
                match amount.checked_mul(rate.as_decimal()) {
                    Some(expected) if tolerance.accepts(expected, tax_amount) => {}
                    Some(expected) => warnings.push(ValidationWarning::new(
                        WarningKind::LineTax,
                        format!("amount x {} = {} but tax amount is {}", rate, expected.round_dp(4), tax_amount),
                    )),
                    None => warnings.push(ValidationWarning::new(
                        WarningKind::LineTax,
                        format!("amount {} x {} is out of range", amount, rate),
                    )),
                }
            }
        }

        warnings
    }

    /// Validate every item in place, marking failing items.
    pub fn validate_items(&self, items: &mut [LineItem]) {
        for item in items.iter_mut() {
            let warnings = self.validate_line(item);
            if !warnings.is_empty() {
                debug!("Line {} flagged: {:?}", item.line_number, warnings);
            }
            item.flag(&warnings);
        }
    }

    /// Findings for the document-level fields.
    pub fn validate_fields(&self, fields: &InvoiceFields) -> FieldsValidation {
        let mut warnings = Vec::new();

        if let Some(number) = &fields.invoice_number {
            let digits = self.config.anchors.invoice_number_digits;
            if !is_invoice_number(number, digits) {
                warnings.push(ValidationWarning::new(
                    WarningKind::Format,
                    format!("invoice number '{}' is not {} digits", number, digits),
                ));
            }
        }

        let amount = fields.amount.as_deref().and_then(parse_amount);
        let tax_amount = fields.tax_amount.as_deref().and_then(parse_amount);
        let total = fields.total_amount.as_deref().and_then(parse_amount);

        if let Some(amount) = amount {
            if amount <= Decimal::ZERO {
                warnings.push(range("amount must be positive"));
            }
        }
        if let Some(tax_amount) = tax_amount {
            if tax_amount < Decimal::ZERO {
                warnings.push(range("tax amount must not be negative"));
            }
        }
        if let Some(total) = total {
            if total <= Decimal::ZERO {
                warnings.push(range("total amount must be positive"));
            }
            if tax_amount.is_some_and(|tax| tax > total) {
                warnings.push(range("tax amount exceeds total amount"));
            }
        }

        for entry in &fields.tax_rates {
            if !entry.rate.is_allowed(&self.config.tax.whitelist) {
                warnings.push(ValidationWarning::new(
                    WarningKind::TaxRate,
                    format!("tax rate {} is not an allowed rate", entry.rate),
                ));
            }
        }

        let total_check = match (amount, tax_amount, total) {
            (Some(amount), Some(tax_amount), Some(total)) => match cents(amount).checked_add(cents(tax_amount)) {
                Some(expected) => {
                    let actual = cents(total);
                    let difference = expected.checked_sub(actual).map(|d| d.abs()).unwrap_or(Decimal::MAX);
                    if self.config.tolerance.document.accepts(expected, actual) {
                        TotalCheck::Passed { difference }
                    } else {
                        warnings.push(ValidationWarning::new(
                            WarningKind::DocumentTotal,
                            format!("amount + tax = {} but total is {} (difference {})", expected, actual, difference),
                        ));
                        TotalCheck::Failed { difference }
                    }
                }
                None => {
                    warnings.push(range("amount + tax is out of range"));
                    TotalCheck::Skipped
                }
            },
            _ => TotalCheck::Skipped,
        };

        debug!("Document validation: {} warnings, {:?}", warnings.len(), total_check);
        FieldsValidation {
            valid: warnings.is_empty(),
            warnings,
            total_check,
        }
    }
}

fn range(message: &str) -> ValidationWarning {
    ValidationWarning::new(WarningKind::Range, message)
}

fn cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
