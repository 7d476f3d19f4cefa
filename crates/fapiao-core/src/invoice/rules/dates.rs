//! Invoice date extraction.

use chrono::NaiveDate;
use regex::{Captures, Regex};

use super::{ExtractionMatch, FieldExtractor};

/// Date extractor over a year/month/day pattern with three capture groups.
pub struct DateExtractor<'a> {
    pattern: &'a Regex,
}

impl<'a> DateExtractor<'a> {
    pub fn new(pattern: &'a Regex) -> Self {
        Self { pattern }
    }
}

impl FieldExtractor for DateExtractor<'_> {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in self.pattern.captures_iter(text) {
            let (Some(full_match), Some(date)) = (caps.get(0), ymd(&caps)) else {
                continue;
            };
            if results.iter().any(|r: &ExtractionMatch<NaiveDate>| r.value == date) {
                continue;
            }
            results.push(ExtractionMatch::from_match(date, &full_match));
        }

        results
    }
}

fn ymd(caps: &Captures<'_>) -> Option<NaiveDate> {
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::AnchorConfig;

    fn pattern() -> Regex {
        Regex::new(&AnchorConfig::default().date_pattern).unwrap()
    }

    #[test]
    fn test_extract_date() {
        let re = pattern();
        let extractor = DateExtractor::new(&re);

        let found = extractor.extract("开票日期：2024年3月5日").unwrap();
        assert_eq!(found.value, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(found.value.to_string(), "2024-03-05");
        assert_eq!(found.source, "2024年3月5日");
    }

    #[test]
    fn test_invalid_calendar_date_is_skipped() {
        let re = pattern();
        let extractor = DateExtractor::new(&re);

        let all = extractor.extract_all("2024年2月30日 2024年12月31日 2024年12月31日");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }
}
