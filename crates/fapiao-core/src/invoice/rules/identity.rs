//! Invoice number and invoice type extraction.

use regex::Regex;

use crate::models::invoice::InvoiceType;

use super::{ExtractionMatch, FieldExtractor};

/// Extracts fixed-length invoice numbers with an ordered list of patterns.
pub struct NumberExtractor<'a> {
    patterns: &'a [Regex],
    digits: usize,
}

impl<'a> NumberExtractor<'a> {
    pub fn new(patterns: &'a [Regex], digits: usize) -> Self {
        Self { patterns, digits }
    }
}

impl FieldExtractor for NumberExtractor<'_> {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for pattern in self.patterns {
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(1) else {
                    continue;
                };
                let number = m.as_str();
                if is_invoice_number(number, self.digits)
                    && !results.iter().any(|r| r.value == number)
                {
                    results.push(ExtractionMatch::from_match(number.to_string(), &m));
                }
            }
        }

        results
    }
}

/// Exactly `digits` ASCII digits.
pub fn is_invoice_number(s: &str, digits: usize) -> bool {
    s.len() == digits && s.bytes().all(|b| b.is_ascii_digit())
}

/// Classifies the invoice from type phrases, then the invoice code, then
/// the exemption keyword.
pub struct InvoiceTypeExtractor<'a> {
    special: &'a Regex,
    ordinary: &'a Regex,
    invoice_code: &'a Regex,
    exempt_keyword: &'a str,
}

impl<'a> InvoiceTypeExtractor<'a> {
    pub fn new(special: &'a Regex, ordinary: &'a Regex, invoice_code: &'a Regex, exempt_keyword: &'a str) -> Self {
        Self {
            special,
            ordinary,
            invoice_code,
            exempt_keyword,
        }
    }

    /// Type from the type phrases alone.
    pub fn from_phrase(&self, text: &str) -> Option<InvoiceType> {
        if self.special.is_match(text) {
            Some(InvoiceType::Special)
        } else if self.ordinary.is_match(text) {
            Some(InvoiceType::Ordinary)
        } else {
            None
        }
    }

    fn from_code(&self, text: &str) -> Option<InvoiceType> {
        let code = self.invoice_code.captures(text)?.get(1)?;
        // First digit of the invoice code encodes the invoice kind
        match code.as_str().as_bytes().first()? {
            b'1' => Some(InvoiceType::Special),
            b'2' | b'3' | b'4' => Some(InvoiceType::Ordinary),
            _ => None,
        }
    }
}

impl FieldExtractor for InvoiceTypeExtractor<'_> {
    type Output = InvoiceType;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.from_phrase(text)
            .or_else(|| self.from_code(text))
            .or_else(|| {
                (!self.exempt_keyword.is_empty() && text.contains(self.exempt_keyword))
                    .then_some(InvoiceType::Ordinary)
            })
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        self.extract(text).into_iter().collect()
    }
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
    fn test_number_prefers_labelled_pattern() {
        let p = patterns();
        let extractor = NumberExtractor::new(&p.number_fallbacks, 20);

        let text = "99999999999999999999\n发票号码：24312000000012345678";
        let found = extractor.extract(text).unwrap();
        assert_eq!(found.value, "24312000000012345678");
    }

    #[test]
    fn test_number_requires_exact_length() {
        assert!(is_invoice_number("24312000000012345678", 20));
        assert!(!is_invoice_number("2431200000001234567", 20));
        assert!(!is_invoice_number("2431200000001234567a", 20));
    }

    #[test]
    fn test_type_from_phrase_and_code() {
        let p = patterns();
        let extractor = InvoiceTypeExtractor::new(&p.special_type, &p.ordinary_type, &p.invoice_code, "免税");

        assert_eq!(extractor.extract("电子发票（增值税专用发票）"), Some(InvoiceType::Special));
        assert_eq!(extractor.extract("电子发票（普通发票）"), Some(InvoiceType::Ordinary));
        assert_eq!(extractor.extract("发票代码：144031900111"), Some(InvoiceType::Special));
        assert_eq!(extractor.extract("发票代码: 044031900111"), None);
        assert_eq!(extractor.extract("发票代码：244031900111"), Some(InvoiceType::Ordinary));
        assert_eq!(extractor.extract("*农产品*大米 免税"), Some(InvoiceType::Ordinary));
    }
}
