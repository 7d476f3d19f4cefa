//! Numeric disambiguation of concatenated table values.
//!
//! Invoice PDFs often render quantity, unit price, amount, tax rate and tax
//! amount of a row as one text run with no separators, e.g.
//! `"444.16176.6413%22.96"`. [`NumericDisambiguator::split`] searches every
//! partition of such a run and keeps the one whose arithmetic agrees.

use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::trace;

use crate::models::config::Tolerance;
use crate::models::invoice::{LineItem, TaxRate};

use super::rules::patterns::{DECIMAL, LEADING_NUMBER, NUMBER_RUN, TRAILING_RATE, TWO_DECIMAL_PAIR, VALID_NUMBER};

/// Fields recovered from one concatenated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitResult {
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub amount: Option<String>,
    pub tax_rate: TaxRate,
    pub tax_amount: Option<String>,
    /// No partition passed the arithmetic checks; `amount` is the whole
    /// text before the rate.
    pub degraded: bool,
}

/// One accepted interpretation of the text before the rate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SplitCandidate {
    /// The whole text is the amount.
    BareAmount { amount: String },
    /// Quantity, unit price and amount, checked by multiplication.
    Full {
        quantity: String,
        unit_price: String,
        amount: String,
        tax_checked: bool,
    },
    /// Integer quantity followed by the amount; no unit price printed.
    QuantityOnly {
        quantity: String,
        amount: String,
        tax_checked: bool,
    },
    /// Unit price equal to the amount, quantity of one left implicit.
    ImplicitUnit {
        unit_price: String,
        amount: String,
        tax_checked: bool,
    },
}

impl SplitCandidate {
    /// Lower is better: fewer free variables and more satisfied checks.
    fn score(&self) -> u32 {
        match self {
            SplitCandidate::BareAmount { .. } => 0,
            SplitCandidate::Full { tax_checked: true, .. } => 1,
            SplitCandidate::Full { tax_checked: false, .. } => 2,
            SplitCandidate::ImplicitUnit { tax_checked: true, .. } => 2,
            SplitCandidate::ImplicitUnit { tax_checked: false, .. } => 3,
            SplitCandidate::QuantityOnly { tax_checked: true, .. } => 3,
            SplitCandidate::QuantityOnly { tax_checked: false, .. } => 10,
        }
    }

    fn into_result(self, tax_rate: TaxRate, tax_amount: Option<String>) -> SplitResult {
        let (quantity, unit_price, amount) = match self {
            SplitCandidate::BareAmount { amount } => (None, None, amount),
            SplitCandidate::Full {
                quantity,
                unit_price,
                amount,
                ..
            } => (Some(quantity), Some(unit_price), amount),
            SplitCandidate::QuantityOnly { quantity, amount, .. } => (Some(quantity), None, amount),
            SplitCandidate::ImplicitUnit { unit_price, amount, .. } => {
                (Some("1".to_string()), Some(unit_price), amount)
            }
        };

        SplitResult {
            quantity,
            unit_price,
            amount: Some(amount),
            tax_rate,
            tax_amount,
            degraded: false,
        }
    }
}

/// Splits concatenated numeric runs that carry a tax rate.
pub struct NumericDisambiguator<'a> {
    rate_pattern: &'a Regex,
    whitelist: &'a [u32],
    tolerance: Tolerance,
}

impl<'a> NumericDisambiguator<'a> {
    /// `rate_pattern` finds an `n%` inside a run; capture group 1 is the
    /// percentage. Only readings in `whitelist` are accepted.
    pub fn new(rate_pattern: &'a Regex, whitelist: &'a [u32], tolerance: Tolerance) -> Self {
        Self {
            rate_pattern,
            whitelist,
            tolerance,
        }
    }

    /// Split `text`, or `None` when it carries no recognised tax rate.
    ///
    /// The digits before `%` may be read as a longer or a shorter rate
    /// (`16%` or `6%`); the first reading with a consistent split wins.
    pub fn split(&self, text: &str) -> Option<SplitResult> {
        let cleaned: String = text
            .chars()
            .filter(|c| !matches!(c, ',' | '，' | '￥' | '¥') && !c.is_whitespace())
            .collect();

        // Rightmost rate wins; the amount sits before it
        let rate_match = self.rate_pattern.captures_iter(&cleaned).last()?;
        let whole = rate_match.get(0)?;
        let digits = rate_match.get(1)?;

        let tax_amount = LEADING_NUMBER
            .find(&cleaned[whole.end()..])
            .map(|m| m.as_str().to_string());
        let tax_value = tax_amount
            .as_deref()
            .and_then(|t| Decimal::from_str(t).ok())
            .filter(|t| *t > Decimal::ZERO);

        let mut fallback = None;
        for (offset, percent) in self.rate_readings(digits.as_str()) {
            let before_rate = &cleaned[..digits.start() + offset];
            let result = self.split_before_rate(text, before_rate, TaxRate::Percent(percent), &tax_amount, tax_value);
            if !result.degraded {
                return Some(result);
            }
            fallback.get_or_insert(result);
        }

        fallback
    }

    /// Whitelisted rates that end the captured digits, longest first, with
    /// the offset at which each starts.
    fn rate_readings(&self, digits: &str) -> Vec<(usize, u32)> {
        char_boundaries(digits)
            .filter_map(|offset| {
                let suffix = &digits[offset..];
                if suffix.len() > 1 && suffix.starts_with('0') {
                    return None;
                }
                let percent: u32 = suffix.parse().ok()?;
                self.whitelist.contains(&percent).then_some((offset, percent))
            })
            .collect()
    }

    fn split_before_rate(
        &self,
        text: &str,
        before_rate: &str,
        tax_rate: TaxRate,
        tax_amount: &Option<String>,
        tax_value: Option<Decimal>,
    ) -> SplitResult {
        if before_rate.is_empty() {
            return SplitResult {
                quantity: None,
                unit_price: None,
                amount: None,
                tax_rate,
                tax_amount: tax_amount.clone(),
                degraded: false,
            };
        }

        let mut candidates = self.candidates(before_rate, tax_rate.as_decimal(), tax_value);
        // Stable: ties keep enumeration order
        candidates.sort_by_key(SplitCandidate::score);

        match candidates.into_iter().next() {
            Some(best) => {
                trace!("Split {:?} as {:?}", text, best);
                best.into_result(tax_rate, tax_amount.clone())
            }
            None => {
                trace!("No consistent split for {:?} at {}", text, tax_rate);
                SplitResult {
                    quantity: None,
                    unit_price: None,
                    amount: Some(before_rate.to_string()),
                    tax_rate,
                    tax_amount: tax_amount.clone(),
                    degraded: true,
                }
            }
        }
    }

    /// Every arithmetically consistent reading of `before_rate`, in
    /// enumeration order. Products outside the decimal range reject the
    /// partition.
    fn candidates(&self, before_rate: &str, rate: Decimal, tax: Option<Decimal>) -> Vec<SplitCandidate> {
        let tax_ok = |amount: Decimal| match tax {
            Some(tax) => amount
                .checked_mul(rate)
                .is_some_and(|expected| self.tolerance.accepts(expected, tax)),
            None => true,
        };
        let has_tax = tax.is_some();

        let mut candidates = Vec::new();

        for amount_start in char_boundaries(before_rate) {
            let amount_str = &before_rate[amount_start..];
            let Some(amount) = positive_number(amount_str) else {
                continue;
            };
            let prefix = &before_rate[..amount_start];

            if prefix.is_empty() {
                if tax_ok(amount) {
                    candidates.push(SplitCandidate::BareAmount {
                        amount: amount_str.to_string(),
                    });
                }
                continue;
            }

            for price_start in char_boundaries(prefix).chain(std::iter::once(prefix.len())) {
                let quantity_str = &prefix[..price_start];
                let price_str = &prefix[price_start..];

                match (quantity_str.is_empty(), price_str.is_empty()) {
                    (false, false) => {
                        let (Some(quantity), Some(price)) =
                            (positive_number(quantity_str), positive_number(price_str))
                        else {
                            continue;
                        };
                        let Some(product) = quantity.checked_mul(price) else {
                            continue;
                        };
                        if self.tolerance.accepts(product, amount) && tax_ok(amount) {
                            candidates.push(SplitCandidate::Full {
                                quantity: quantity_str.to_string(),
                                unit_price: price_str.to_string(),
                                amount: amount_str.to_string(),
                                tax_checked: has_tax,
                            });
                        }
                    }
                    (false, true) => {
                        let Some(quantity) = positive_number(quantity_str) else {
                            continue;
                        };
                        if quantity.fract().is_zero() && tax_ok(amount) {
                            candidates.push(SplitCandidate::QuantityOnly {
                                quantity: quantity_str.to_string(),
                                amount: amount_str.to_string(),
                                tax_checked: has_tax,
                            });
                        }
                    }
                    (true, false) => {
                        let Some(price) = positive_number(price_str) else {
                            continue;
                        };
                        if self.tolerance.accepts(price, amount) && tax_ok(amount) {
                            candidates.push(SplitCandidate::ImplicitUnit {
                                unit_price: price_str.to_string(),
                                amount: amount_str.to_string(),
                                tax_checked: has_tax,
                            });
                        }
                    }
                    (true, true) => {}
                }
            }
        }

        candidates
    }
}

/// Read a run whose percentage is not a recognised rate as a plain
/// multi-number run. Digits past the second decimal right before the `%`
/// are returned as the printed rate.
pub fn split_plain_run(text: &str) -> (Vec<String>, Option<TaxRate>) {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '，') && !c.is_whitespace())
        .collect();

    let Some((before, after)) = cleaned.rsplit_once('%') else {
        return (extract_all_numbers(&cleaned), None);
    };

    let (numbers_part, rate) = match TRAILING_RATE.captures(before) {
        Some(caps) => (
            caps.get(1).map_or(before, |m| m.as_str()),
            caps[2].parse().ok().map(TaxRate::Percent),
        ),
        None => (before, None),
    };

    let mut numbers = extract_all_numbers(numbers_part);
    numbers.extend(extract_all_numbers(after));
    (numbers, rate)
}

/// Byte offsets of every char start in `s`.
fn char_boundaries(s: &str) -> impl Iterator<Item = usize> + '_ {
    s.char_indices().map(|(i, _)| i)
}

fn positive_number(s: &str) -> Option<Decimal> {
    if !is_valid_number_format(s) {
        return None;
    }
    Decimal::from_str(s).ok().filter(|v| *v > Decimal::ZERO)
}

/// Plain decimal without a dangling dot or a leading zero (other than `0`
/// and `0.x`).
pub fn is_valid_number_format(s: &str) -> bool {
    if !VALID_NUMBER.is_match(s) {
        return false;
    }
    let bytes = s.as_bytes();
    !(bytes.len() > 1 && bytes[0] == b'0' && bytes[1] != b'.')
}

/// Split a run of numbers without a tax rate, e.g. `"9.080.82"` into
/// `["9.08", "0.82"]`. Runs with thousands separators yield nothing.
pub fn extract_all_numbers(text: &str) -> Vec<String> {
    if text.contains([',', '，']) {
        return Vec::new();
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '￥' | '¥' | '-') && !c.is_whitespace())
        .collect();
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return Vec::new();
    }

    if let Some(caps) = TWO_DECIMAL_PAIR.captures(&cleaned) {
        return vec![caps[1].to_string(), caps[2].to_string()];
    }

    let dots: Vec<usize> = cleaned.match_indices('.').map(|(i, _)| i).collect();
    if let &[_, second_dot] = dots.as_slice() {
        let bytes = cleaned.as_bytes();
        let mut split_index = second_dot.saturating_sub(1);
        while split_index > 0 && bytes[split_index - 1].is_ascii_digit() {
            if let (Some(before), Some(after)) = (cleaned.get(..split_index), cleaned.get(split_index..)) {
                if DECIMAL.is_match(before) && DECIMAL.is_match(after) {
                    return vec![before.to_string(), after.to_string()];
                }
            }
            split_index -= 1;
        }
    }

    NUMBER_RUN
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .filter(|n| Decimal::from_str(n.trim_end_matches('.')).is_ok_and(|v| v > Decimal::ZERO))
        .map(str::to_string)
        .collect()
}

/// Split an amount that is really `amount` + `taxAmount` rendered back to
/// back. Applies only when the item has no tax amount and the second value
/// is under a fifth of the first.
pub fn split_concatenated_amounts(item: &mut LineItem) {
    if item.tax_amount.is_some() {
        return;
    }
    let Some(amount) = item.amount.as_deref() else {
        return;
    };
    let Some(caps) = TWO_DECIMAL_PAIR.captures(amount) else {
        return;
    };
    let (first, second) = (caps[1].to_string(), caps[2].to_string());
    let (Ok(a), Ok(b)) = (Decimal::from_str(&first), Decimal::from_str(&second)) else {
        return;
    };

    if b < a && b < a * Decimal::new(2, 1) {
        trace!("Split amount {} into {} + {}", amount, first, second);
        item.amount = Some(first);
        item.tax_amount = Some(second);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{TaxConfig, ToleranceConfig};
    use pretty_assertions::assert_eq;

    fn split(text: &str) -> Option<SplitResult> {
        let tax = TaxConfig::default();
        let re = Regex::new(&tax.rate_pattern()).unwrap();
        NumericDisambiguator::new(&re, &tax.whitelist, ToleranceConfig::default().line).split(text)
    }

    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_amount_and_rate() {
        let result = split("75.2213%").unwrap();
        assert_eq!(
            result,
            SplitResult {
                quantity: None,
                unit_price: None,
                amount: Some("75.22".to_string()),
                tax_rate: TaxRate::Percent(13),
                tax_amount: None,
                degraded: false,
            }
        );
    }

    #[test]
    fn test_quantity_one_full_row() {
        let result = split("145.7545.7513%5.95").unwrap();
        assert_eq!(result.quantity.as_deref(), Some("1"));
        assert_eq!(result.unit_price.as_deref(), Some("45.75"));
        assert_eq!(result.amount.as_deref(), Some("45.75"));
        assert_eq!(result.tax_rate, TaxRate::Percent(13));
        assert_eq!(result.tax_amount.as_deref(), Some("5.95"));
        assert!(!result.degraded);
    }

    #[test]
    fn test_multi_quantity_full_row() {
        let result = split("444.16176.6413%22.96").unwrap();
        assert_eq!(result.quantity.as_deref(), Some("4"));
        assert_eq!(result.unit_price.as_deref(), Some("44.16"));
        assert_eq!(result.amount.as_deref(), Some("176.64"));
        assert_eq!(result.tax_amount.as_deref(), Some("22.96"));
    }

    #[test]
    fn test_rate_and_tax_only() {
        let result = split("13%15.19").unwrap();
        assert_eq!(result.amount, None);
        assert_eq!(result.quantity, None);
        assert_eq!(result.tax_rate, TaxRate::Percent(13));
        assert_eq!(result.tax_amount.as_deref(), Some("15.19"));
    }

    #[test]
    fn test_no_rate_returns_none() {
        assert_eq!(split("9.080.82"), None);
        assert_eq!(split("45.75"), None);
    }

    #[test]
    fn test_separators_are_stripped() {
        let result = split("1,045.7513% ¥135.95").unwrap();
        assert_eq!(result.amount.as_deref(), Some("1045.75"));
        assert_eq!(result.tax_amount.as_deref(), Some("135.95"));
    }

    #[test]
    fn test_inconsistent_run_degrades() {
        let result = split("0.0013%99.99").unwrap();
        assert!(result.degraded);
        assert_eq!(result.amount.as_deref(), Some("0.00"));
    }

    #[test]
    fn test_split_is_deterministic() {
        for text in ["145.7545.7513%5.95", "75.2213%", "2100.00200.006%12.00"] {
            assert_eq!(split(text), split(text));
        }
    }

    #[test]
    fn test_recovers_concatenated_fields() {
        let cases = [
            ("2", "100.00", "200.00", 6, "12.00"),
            ("3", "15.50", "46.50", 13, "6.05"),
            ("10", "9.90", "99.00", 9, "8.91"),
            ("1", "300.00", "300.00", 3, "9.00"),
        ];
        for (quantity, price, amount, rate, tax) in cases {
            let text = format!("{}{}{}{}%{}", quantity, price, amount, rate, tax);
            let result = split(&text).unwrap();
            assert_eq!(result.quantity.as_deref(), Some(quantity), "{}", text);
            assert_eq!(result.unit_price.as_deref(), Some(price), "{}", text);
            assert_eq!(result.amount.as_deref(), Some(amount), "{}", text);
            assert_eq!(result.tax_rate, TaxRate::Percent(rate), "{}", text);
            assert_eq!(result.tax_amount.as_deref(), Some(tax), "{}", text);
        }
    }

    #[test]
    fn test_every_whitelisted_rate_splits() {
        let tax = TaxConfig::default();
        let amount = Decimal::from_str("46.50").unwrap();
        for rate in &tax.whitelist {
            let expected_tax = (amount * Decimal::new(*rate as i64, 2)).round_dp(2).to_string();
            let text = format!("315.5046.50{}%{}", rate, expected_tax);

            let result = split(&text).unwrap();
            assert!(!result.degraded, "{}", text);
            assert_eq!(result.quantity.as_deref(), Some("3"), "{}", text);
            assert_eq!(result.unit_price.as_deref(), Some("15.50"), "{}", text);
            assert_eq!(result.amount.as_deref(), Some("46.50"), "{}", text);
            assert_eq!(result.tax_rate, TaxRate::Percent(*rate), "{}", text);
            assert_eq!(result.tax_amount.as_deref(), Some(expected_tax.as_str()), "{}", text);
        }

        let result = split("210.0020.005%1.00").unwrap();
        assert_eq!(result.quantity.as_deref(), Some("2"));
        assert_eq!(result.unit_price.as_deref(), Some("10.00"));
        assert_eq!(result.amount.as_deref(), Some("20.00"));
        assert_eq!(result.tax_rate, TaxRate::Percent(5));
    }

    #[test]
    fn test_shorter_rate_reading_when_longer_is_inconsistent() {
        // "16%" leaves 12.0 with no consistent split; "6%" reads 12.01
        let result = split("12.016%0.72").unwrap();
        assert!(!result.degraded);
        assert_eq!(result.amount.as_deref(), Some("12.01"));
        assert_eq!(result.tax_rate, TaxRate::Percent(6));
    }

    #[test]
    fn test_unlisted_rate_returns_none() {
        assert_eq!(split("9.082%0.82"), None);
    }

    #[test]
    fn test_huge_factors_do_not_overflow() {
        let result = split("300000000000000.0300000000000000.01.0013%0.13");
        assert!(result.is_some());
    }

    #[test]
    fn test_split_plain_run() {
        assert_eq!(
            split_plain_run("9.082%0.82"),
            (owned(&["9.08", "0.82"]), Some(TaxRate::Percent(2)))
        );
        assert_eq!(split_plain_run("45.75%"), (owned(&["45.75"]), None));
    }

    #[test]
    fn test_leading_zero_rejection() {
        assert!(!is_valid_number_format("0055"));
        assert!(!is_valid_number_format("00.5"));
        assert!(!is_valid_number_format("55."));
        assert!(is_valid_number_format("0"));
        assert!(is_valid_number_format("0.45"));
        assert!(is_valid_number_format("123.45"));
    }

    #[test]
    fn test_extract_all_numbers() {
        assert_eq!(extract_all_numbers("9.080.82"), owned(&["9.08", "0.82"]));
        assert_eq!(extract_all_numbers("-92.00"), owned(&["92.00"]));
        assert_eq!(extract_all_numbers("33.962.045"), owned(&["33.96", "2.045"]));
        assert_eq!(extract_all_numbers("45.75"), owned(&["45.75"]));
        assert!(extract_all_numbers("1,234.50").is_empty());
        assert!(extract_all_numbers("-").is_empty());
    }

    #[test]
    fn test_split_concatenated_amounts() {
        let mut item = LineItem {
            amount: Some("9.080.82".to_string()),
            ..Default::default()
        };
        split_concatenated_amounts(&mut item);
        assert_eq!(item.amount.as_deref(), Some("9.08"));
        assert_eq!(item.tax_amount.as_deref(), Some("0.82"));

        // Second value too large to be a tax amount
        let mut item = LineItem {
            amount: Some("9.085.00".to_string()),
            ..Default::default()
        };
        split_concatenated_amounts(&mut item);
        assert_eq!(item.amount.as_deref(), Some("9.085.00"));
        assert_eq!(item.tax_amount, None);
    }
}
