//! Money amount extraction.

use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;

use super::{last_group, ExtractionMatch, FieldExtractor};

/// Extracts an amount with an ordered list of labelled patterns.
///
/// The last participating capture group of a match holds the value. Earlier
/// patterns take precedence over later ones.
pub struct AmountExtractor<'a> {
    patterns: &'a [Regex],
}

impl<'a> AmountExtractor<'a> {
    pub fn new(patterns: &'a [Regex]) -> Self {
        Self { patterns }
    }
}

impl FieldExtractor for AmountExtractor<'_> {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for pattern in self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(m) = last_group(&caps) else {
                    continue;
                };
                let value = normalize_amount(m.as_str());
                match parse_amount(&value) {
                    Some(amount) if amount >= Decimal::ZERO => {
                        results.push(ExtractionMatch::from_match(value, &m));
                    }
                    _ => {}
                }
            }
        }

        results
    }
}

/// Drop thousands separators, currency glyphs and whitespace.
pub fn normalize_amount(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ',' | '，' | '￥' | '¥') && !c.is_whitespace())
        .collect()
}

/// Parse an amount as printed on an invoice (e.g. "1,234.50" or "¥ 51.70").
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned = normalize_amount(s);
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::rules::CompiledPatterns;
    use crate::models::config::ParserConfig;

    fn patterns() -> CompiledPatterns {
        CompiledPatterns::from_config(&ParserConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50"), Some(Decimal::from_str("1234.50").unwrap()));
        assert_eq!(parse_amount("¥ 51.70"), Some(Decimal::from_str("51.70").unwrap()));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn test_total_row_amounts() {
        let p = patterns();
        let text = "合 计 ¥1,045.75 ¥135.95";

        let amount = AmountExtractor::new(&p.amount_fallbacks).extract(text).unwrap();
        assert_eq!(amount.value, "1045.75");

        let tax = AmountExtractor::new(&p.tax_fallbacks).extract(text).unwrap();
        assert_eq!(tax.value, "135.95");
    }

    #[test]
    fn test_grand_total_takes_last_group() {
        let p = patterns();
        let text = "价税合计（大写） 壹仟壹佰捌拾壹圆柒角 （小写）¥1181.70";

        let total = AmountExtractor::new(&p.total_fallbacks).extract(text).unwrap();
        assert_eq!(total.value, "1181.70");
        assert!(total.position.is_some());
    }

    #[test]
    fn test_no_match() {
        let p = patterns();
        assert!(AmountExtractor::new(&p.amount_fallbacks).extract("nothing here").is_none());
    }
}
