//! Regex patterns for invoice extraction.
//!
//! Shape patterns that do not depend on the invoice language are compiled once
//! as statics. Locale patterns come from [`ParserConfig`] and are compiled into
//! a [`CompiledPatterns`] table when a parser is built.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ConfigError;
use crate::models::config::ParserConfig;

lazy_static! {
    // Numeric field shape: digits with an optional fraction
    pub static ref VALID_NUMBER: Regex = Regex::new(r"^\d+(\.\d+)?$").unwrap();

    pub static ref PURE_NUMERIC: Regex = Regex::new(r"^[\d.,-]+$").unwrap();

    // Anything made only of digits, separators, currency glyphs and percent signs
    pub static ref NUMERIC_VALUE: Regex = Regex::new(r"^[\d.,\-￥¥%]+$").unwrap();

    pub static ref PERCENT_ONLY: Regex = Regex::new(r"^\d+%$").unwrap();

    pub static ref DECIMAL: Regex = Regex::new(r"^\d+\.\d+$").unwrap();

    // Two two-decimal numbers rendered back to back, e.g. "9.080.82"
    pub static ref TWO_DECIMAL_PAIR: Regex = Regex::new(r"^(\d+\.\d{2})(\d+\.\d{2})$").unwrap();

    pub static ref NUMBER_RUN: Regex = Regex::new(r"\d+\.?\d*").unwrap();

    pub static ref LEADING_NUMBER: Regex = Regex::new(r"^[\d.]+").unwrap();

    // Digits past the second decimal, right before an unrecognised `%`
    pub static ref TRAILING_RATE: Regex = Regex::new(r"^(.*\.\d{2})(\d{1,2})$").unwrap();

    pub static ref TWO_DECIMALS: Regex = Regex::new(r"\.\d{2}$").unwrap();

    // Money values inside a totals line, optionally prefixed by a currency glyph
    pub static ref MONEY_FRAGMENT: Regex = Regex::new(r"[￥¥]?\s*([\d,]+\.\d+)").unwrap();

    pub static ref CURRENCY_AMOUNT: Regex = Regex::new(r"[￥¥]\s*([\d,]+\.\d+)").unwrap();

    pub static ref RATE_IN_TEXT: Regex = Regex::new(r"(\d+)%").unwrap();

    // Exemption printed in the rate column, alone or next to other glyphs
    pub static ref EXEMPT_GLYPHS: Regex = Regex::new(r"\*+|免税").unwrap();
}

/// Locale patterns compiled from configuration.
#[derive(Debug, Clone)]
pub struct CompiledPatterns {
    pub item_marker: Regex,
    pub exempt_marker: Regex,
    pub irrelevant: Vec<Regex>,
    pub invalid_text: Vec<Regex>,
    pub invalid_row: Vec<Regex>,
    pub concatenated_rate: Regex,
    pub invoice_number: Regex,
    pub date: Regex,
    pub special_type: Regex,
    pub ordinary_type: Regex,
    pub total_row: Regex,
    pub grand_total: Regex,
    pub tax_rate_label: Regex,
    pub invoice_code: Regex,
    pub number_fallbacks: Vec<Regex>,
    pub amount_fallbacks: Vec<Regex>,
    pub tax_fallbacks: Vec<Regex>,
    pub total_fallbacks: Vec<Regex>,
    pub rate_fallbacks: Vec<Regex>,
}

impl CompiledPatterns {
    /// Compile every pattern of the configuration.
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        let rows = &config.rows;
        let anchors = &config.anchors;

        Ok(Self {
            item_marker: compile("rows.item_marker", &rows.item_marker)?,
            exempt_marker: compile("rows.exempt_marker", &rows.exempt_marker)?,
            irrelevant: compile_all("rows.irrelevant_patterns", &rows.irrelevant_patterns)?,
            invalid_text: compile_all("rows.invalid_text_patterns", &rows.invalid_text_patterns)?,
            invalid_row: compile_all("rows.invalid_row_patterns", &rows.invalid_row_patterns)?,
            concatenated_rate: compile("tax.concatenated_rate_pattern", &config.tax.rate_pattern())?,
            invoice_number: compile(
                "anchors.invoice_number_digits",
                &format!(r"\d{{{}}}", anchors.invoice_number_digits),
            )?,
            date: compile("anchors.date_pattern", &anchors.date_pattern)?,
            special_type: compile("anchors.special_type_pattern", &anchors.special_type_pattern)?,
            ordinary_type: compile("anchors.ordinary_type_pattern", &anchors.ordinary_type_pattern)?,
            total_row: compile("anchors.total_row_pattern", &anchors.total_row_pattern)?,
            grand_total: compile("anchors.grand_total_pattern", &anchors.grand_total_pattern)?,
            tax_rate_label: compile("anchors.tax_rate_label_pattern", &anchors.tax_rate_label_pattern)?,
            invoice_code: compile("anchors.invoice_code_pattern", &anchors.invoice_code_pattern)?,
            number_fallbacks: compile_all("anchors.number_fallbacks", &anchors.number_fallbacks)?,
            amount_fallbacks: compile_all("anchors.amount_fallbacks", &anchors.amount_fallbacks)?,
            tax_fallbacks: compile_all("anchors.tax_fallbacks", &anchors.tax_fallbacks)?,
            total_fallbacks: compile_all("anchors.total_fallbacks", &anchors.total_fallbacks)?,
            rate_fallbacks: compile_all("anchors.rate_fallbacks", &anchors.rate_fallbacks)?,
        })
    }

    pub fn is_irrelevant(&self, text: &str) -> bool {
        self.irrelevant.iter().any(|re| re.is_match(text))
    }

    pub fn is_invalid_text(&self, text: &str) -> bool {
        self.invalid_text.iter().any(|re| re.is_match(text))
    }

    pub fn is_invalid_row(&self, name: &str) -> bool {
        self.invalid_row.iter().any(|re| re.is_match(name))
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        name: name.to_string(),
        source,
    })
}

fn compile_all(name: &str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, p)| compile(&format!("{}[{}]", name, i), p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_compiles() {
        let patterns = CompiledPatterns::from_config(&ParserConfig::default()).unwrap();
        assert!(patterns.item_marker.is_match("*办公用品*复印纸"));
        assert!(patterns.exempt_marker.is_match("免税"));
        assert!(patterns.exempt_marker.is_match("***"));
        assert!(!patterns.exempt_marker.is_match("*"));
        assert!(patterns.invoice_number.is_match("24312000000012345678"));
    }

    #[test]
    fn test_invalid_pattern_is_reported_by_name() {
        let mut config = ParserConfig::default();
        config.rows.irrelevant_patterns.push("(unclosed".to_string());

        match CompiledPatterns::from_config(&config) {
            Err(ConfigError::InvalidPattern { name, .. }) => {
                assert_eq!(name, "rows.irrelevant_patterns[6]");
            }
            other => panic!("expected InvalidPattern, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_filters() {
        let patterns = CompiledPatterns::from_config(&ParserConfig::default()).unwrap();
        assert!(patterns.is_irrelevant("壹佰圆整"));
        assert!(patterns.is_irrelevant("¥51.70"));
        assert!(patterns.is_invalid_text("（小写）"));
        assert!(patterns.is_invalid_row("合 计"));
        assert!(!patterns.is_invalid_row("*办公用品*复印纸"));
    }

    #[test]
    fn test_shape_patterns() {
        assert!(VALID_NUMBER.is_match("45.75"));
        assert!(!VALID_NUMBER.is_match("45."));
        assert!(PURE_NUMERIC.is_match("1,234.50"));
        assert!(PERCENT_ONLY.is_match("13%"));
        assert!(!PERCENT_ONLY.is_match("75.2213%"));
    }
}
