//! Tax rate extraction from flattened text.

use regex::Regex;

use crate::models::invoice::TaxRate;

use super::{ExtractionMatch, FieldExtractor};

/// Tax rate extractor. Capture group 1 of each pattern is the percentage;
/// rates outside the whitelist are ignored and duplicates are dropped.
pub struct RateExtractor<'a> {
    patterns: &'a [Regex],
    whitelist: &'a [u32],
}

impl<'a> RateExtractor<'a> {
    pub fn new(patterns: &'a [Regex], whitelist: &'a [u32]) -> Self {
        Self { patterns, whitelist }
    }

    /// Rates of a document. An exempt document yields `[Exempt]`; otherwise
    /// the first pattern with any whitelisted match wins.
    pub fn rates(&self, text: &str, exempt_keyword: &str) -> Vec<TaxRate> {
        if !exempt_keyword.is_empty() && text.contains(exempt_keyword) {
            return vec![TaxRate::Exempt];
        }

        self.patterns
            .iter()
            .map(|pattern| self.collect(std::slice::from_ref(pattern), text))
            .find(|found| !found.is_empty())
            .map(|found| found.into_iter().map(|m| m.value).collect())
            .unwrap_or_default()
    }

    fn collect(&self, patterns: &[Regex], text: &str) -> Vec<ExtractionMatch<TaxRate>> {
        let mut results: Vec<ExtractionMatch<TaxRate>> = Vec::new();

        for pattern in patterns {
            for caps in pattern.captures_iter(text) {
                let Some(m) = caps.get(1) else {
                    continue;
                };
                let Ok(percent) = m.as_str().parse::<u32>() else {
                    continue;
                };
                let rate = TaxRate::Percent(percent);
                if !rate.is_allowed(self.whitelist) || results.iter().any(|r| r.value == rate) {
                    continue;
                }
                results.push(ExtractionMatch::from_match(rate, &m));
            }
        }

        results
    }
}

impl FieldExtractor for RateExtractor<'_> {
    type Output = ExtractionMatch<TaxRate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        self.collect(self.patterns, text)
    }
}
