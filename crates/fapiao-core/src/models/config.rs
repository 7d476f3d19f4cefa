//! Configuration structures for the invoice parsing pipeline.
//!
//! Every locale-specific keyword list and pattern lives here so that the
//! classification code stays independent of the invoice language. Defaults
//! describe the Chinese VAT invoice layout family.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Main configuration for the fapiao pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Line clustering and region tolerances.
    pub layout: LayoutConfig,

    /// Column header detection.
    pub columns: ColumnConfig,

    /// Table header/footer anchors.
    pub table: TableConfig,

    /// Row segmentation and fragment classification.
    pub rows: RowConfig,

    /// Document-level field anchors and full-text fallbacks.
    pub anchors: AnchorConfig,

    /// Arithmetic tolerances.
    pub tolerance: ToleranceConfig,

    /// Tax-rate whitelist and markers.
    pub tax: TaxConfig,

    /// Batch processing.
    pub batch: BatchConfig,
}

/// Coordinate tolerances used by page reconstruction and anchor scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Maximum y distance for two fragments to share a line.
    pub y_tolerance: f32,

    /// Maximum x distance for a fragment to belong to the tax-rate column.
    pub x_tolerance: f32,

    /// Lines with `y >= ratio * page height` form the header region.
    pub header_region_ratio: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            y_tolerance: 3.0,
            x_tolerance: 20.0,
            header_region_ratio: 0.8,
        }
    }
}

/// Keyword lists for each table column, in matching priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnKeywords {
    pub goods_name: Vec<String>,
    pub specification: Vec<String>,
    pub unit: Vec<String>,
    pub quantity: Vec<String>,
    pub unit_price: Vec<String>,
    pub amount: Vec<String>,
    pub tax_rate: Vec<String>,
    pub tax_amount: Vec<String>,
}

impl Default for ColumnKeywords {
    fn default() -> Self {
        Self {
            goods_name: strings(&["货物或应税劳务", "服务名称", "项目名称", "货物或应税劳务、服务名称"]),
            specification: strings(&["规格型号", "规格"]),
            unit: strings(&["单位", "计量单位"]),
            quantity: strings(&["数量"]),
            unit_price: strings(&["单价", "含税单价", "不含税单价"]),
            amount: strings(&["金额", "不含税金额"]),
            tax_rate: strings(&["税率", "征收率", "税率/征收率"]),
            tax_amount: strings(&["税额"]),
        }
    }
}

/// A two-glyph column label rendered as two separate fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitLabel {
    /// Column the label names.
    pub field: String,
    /// First glyph.
    pub first: String,
    /// Second glyph.
    pub second: String,
}

impl SplitLabel {
    fn new(field: &str, first: &str, second: &str) -> Self {
        Self {
            field: field.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        }
    }
}

/// Column mapping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    /// Keywords per column.
    pub keywords: ColumnKeywords,

    /// Labels that can be split into two single-glyph fragments.
    pub split_labels: Vec<SplitLabel>,

    /// How many fragments after the first glyph are searched for the second.
    pub pair_scan_window: usize,

    /// Gap used when the median column gap cannot be measured.
    pub default_gap: f32,

    /// Width of an inferred column as a fraction of the median gap.
    pub inferred_width_ratio: f32,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            keywords: ColumnKeywords::default(),
            split_labels: vec![
                SplitLabel::new("unit", "单", "位"),
                SplitLabel::new("quantity", "数", "量"),
                SplitLabel::new("unit_price", "单", "价"),
                SplitLabel::new("amount", "金", "额"),
                SplitLabel::new("tax_amount", "税", "额"),
            ],
            pair_scan_window: 10,
            default_gap: 60.0,
            inferred_width_ratio: 0.8,
        }
    }
}

/// Table boundary anchors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// A line containing any of these is the table header.
    pub header_keywords: Vec<String>,

    /// A line containing any of these is the table footer.
    pub footer_keywords: Vec<String>,

    /// A footer candidate containing any of these is the grand-total row instead.
    pub footer_exclusions: Vec<String>,

    /// Fragments containing any of these are header/footer repeats inside the table.
    pub skip_keywords: Vec<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            header_keywords: strings(&["货物或应税劳务", "服务名称", "项目名称", "规格型号"]),
            footer_keywords: strings(&["合计", "合  计", "价税合计"]),
            footer_exclusions: strings(&["价税合计"]),
            skip_keywords: strings(&[
                "货物或应税劳务",
                "服务名称",
                "规格型号",
                "合计",
                "价税合计",
                "销售方",
                "购买方",
                "开票人",
                "收款人",
                "复核",
                "备注",
            ]),
        }
    }
}

/// Page-width fractions used for field boundaries when no columns are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryRatios {
    pub name_right: f32,
    pub spec_left: f32,
    pub spec_right: f32,
    pub unit_left: f32,
}

impl Default for BoundaryRatios {
    fn default() -> Self {
        Self {
            name_right: 0.28,
            spec_left: 0.25,
            spec_right: 0.38,
            unit_left: 0.38,
        }
    }
}

/// Row segmentation and fragment classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowConfig {
    /// Pattern of the fragment that starts an item (`*category*name`).
    pub item_marker: String,

    /// Pattern of a fragment that marks a tax-exempt row.
    pub exempt_marker: String,

    /// Window around the unit column center.
    pub unit_window: f32,

    /// Window around the specification column center.
    pub spec_window: f32,

    /// Base distance for matching numbers to numeric columns.
    pub numeric_column_tolerance: f32,

    /// Longest text accepted as a unit.
    pub unit_max_chars: usize,

    /// Specification text must be shorter than this.
    pub spec_max_chars: usize,

    /// A pure digit run at least this long is a specification code.
    pub spec_code_min_digits: usize,

    /// An item group reaches this far above its marker.
    pub group_top_margin: f32,

    /// An item group stops this far above the next marker.
    pub group_bottom_margin: f32,

    /// Fallback field boundaries.
    pub boundary_ratios: BoundaryRatios,

    /// Fragments matching any of these are noise (codes, amounts in words).
    pub irrelevant_patterns: Vec<String>,

    /// Fragments matching any of these never belong to an item.
    pub invalid_text_patterns: Vec<String>,

    /// Items whose name matches any of these are dropped.
    pub invalid_row_patterns: Vec<String>,
}

impl Default for RowConfig {
    fn default() -> Self {
        Self {
            item_marker: r"^\*[^*]+\*".to_string(),
            exempt_marker: r"^(免税|\*{2,})$".to_string(),
            unit_window: 25.0,
            spec_window: 35.0,
            numeric_column_tolerance: 25.0,
            unit_max_chars: 4,
            spec_max_chars: 50,
            spec_code_min_digits: 6,
            group_top_margin: 10.0,
            group_bottom_margin: 5.0,
            boundary_ratios: BoundaryRatios::default(),
            irrelevant_patterns: strings(&[
                r"(?i)^zp\d+",
                r"^\(\d+,\d+\)$",
                r"^[注备合计]$",
                r"^[零壹贰叁肆伍陆柒捌玖拾佰仟万亿圆角分整]+$",
                r"^\d{10,}$",
                r"^[¥￥][\d.]+$",
            ]),
            invalid_text_patterns: strings(&[
                r"^[(（]小写[)）]$",
                r"^备注",
                r"^合计",
                r"^价税合计",
                r"^[￥¥]",
                r"^[零壹贰叁肆伍陆柒捌玖拾佰仟万亿圆角分整]+$",
            ]),
            invalid_row_patterns: strings(&[
                r"^合\s*计$",
                r"^小\s*计$",
                r"^备\s*注",
                r"^价税合计",
                r"(?i)^[a-z]{2}\d+",
                r"^\d{10,}",
                r"^[(（]\d+[)）]",
            ]),
        }
    }
}

/// Document-level anchors and full-text fallback patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Label fragment preceding the invoice number.
    pub invoice_number_label: String,

    /// Number of digits in an invoice number.
    pub invoice_number_digits: usize,

    /// Year/month/day pattern with three capture groups.
    pub date_pattern: String,

    /// Phrase identifying a special VAT invoice.
    pub special_type_pattern: String,

    /// Phrase identifying an ordinary VAT invoice.
    pub ordinary_type_pattern: String,

    /// Line containing the per-table totals.
    pub total_row_pattern: String,

    /// Line containing the grand total.
    pub grand_total_pattern: String,

    /// Header fragment of the tax-rate column.
    pub tax_rate_label_pattern: String,

    /// Text marking a tax-exempt invoice.
    pub exempt_keyword: String,

    /// Full-text fallbacks for the invoice number; capture group 1.
    pub number_fallbacks: Vec<String>,

    /// Full-text pattern for the invoice code; capture group 1.
    pub invoice_code_pattern: String,

    /// Full-text fallbacks for the net amount.
    pub amount_fallbacks: Vec<String>,

    /// Full-text fallbacks for the tax amount.
    pub tax_fallbacks: Vec<String>,

    /// Full-text fallbacks for the grand total; the last capture group wins.
    pub total_fallbacks: Vec<String>,

    /// Full-text fallbacks for tax rates; capture group 1 is the percentage.
    pub rate_fallbacks: Vec<String>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            invoice_number_label: "发票号码".to_string(),
            invoice_number_digits: 20,
            date_pattern: r"(\d{4})年(\d{1,2})月(\d{1,2})日".to_string(),
            special_type_pattern: "增值税专用发票|专票".to_string(),
            ordinary_type_pattern: "普通发票|普票|电子(?:普通)?发票.*普通".to_string(),
            total_row_pattern: r"合\s*计".to_string(),
            grand_total_pattern: "价税合计|小写".to_string(),
            tax_rate_label_pattern: r"税\s*率".to_string(),
            exempt_keyword: "免税".to_string(),
            number_fallbacks: strings(&[r"发票号码[：:]\s*(\d{20})", r"(?i)No\.\s*(\d{20})", r"(\d{20})"]),
            invoice_code_pattern: r"发票代码[：:]*\s*(\d{10,12})".to_string(),
            amount_fallbacks: strings(&[
                r"不含税金额[：:]\s*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"金额[：:]\s*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"小计[：:]\s*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"合\s+计[：:\s]*[￥$¥]?\s*([\d,]+\.\d+)",
                r"合计[：:\s]*[￥$¥]?\s*([\d,]+\.\d+)",
            ]),
            tax_fallbacks: strings(&[
                r"税额[：:]\s*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"税金[：:]\s*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"合\s+计[：:\s]*[￥$¥]?\s*[\d,]+\.\d+\s+[￥$¥]?\s*([\d,]+\.\d+)",
                r"合计[：:\s]*[￥$¥]?\s*[\d,]+\.\d+\s+[￥$¥]?\s*([\d,]+\.\d+)",
            ]),
            total_fallbacks: strings(&[
                r"[(（]小写[)）]\s*[￥¥]\s*([\d,]+\.\d+)",
                r"[一二三四五六七八九十零壹贰叁肆伍陆柒捌玖拾佰仟万千分角元圆整]+\s+[￥¥]\s*([\d,]+\.\d+)",
                r"(?:价税合计|合\s*计)[：:\s]*[(（](?:大写|小写)[)）][：:\s]*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"(?:价税合计|合\s*计)[：:\s]*[￥$¥]?\s*([\d,]+\.?\d*)",
                r"总计[：:\s]*[￥$¥]?\s*([\d,]+\.?\d*)",
            ]),
            rate_fallbacks: strings(&[
                r"[\d,]+\.\d+\s+(\d+)%",
                r"\s(\d+)%\s",
                r"税率[\s/征收率]*[:：]?\s*(\d+)%",
            ]),
        }
    }
}

/// Absolute/relative tolerance pair: `|expected - actual| <= max(absolute, |actual| * relative)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub absolute: Decimal,
    pub relative: Decimal,
}

impl Tolerance {
    pub const fn new(absolute: Decimal, relative: Decimal) -> Self {
        Self { absolute, relative }
    }

    /// Allowed deviation around `actual`.
    pub fn allowance(&self, actual: Decimal) -> Decimal {
        let relative = actual.abs().checked_mul(self.relative).unwrap_or(Decimal::MAX);
        self.absolute.max(relative)
    }

    /// Whether `expected` is close enough to the observed `actual`. A
    /// difference outside the decimal range is never close enough.
    pub fn accepts(&self, expected: Decimal, actual: Decimal) -> bool {
        expected
            .checked_sub(actual)
            .is_some_and(|difference| difference.abs() <= self.allowance(actual))
    }
}

/// Arithmetic tolerances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Line-level checks and split validation.
    pub line: Tolerance,

    /// Document-level `amount + tax = total` check.
    pub document: Tolerance,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            line: Tolerance::new(Decimal::new(2, 2), Decimal::new(1, 2)),
            document: Tolerance::new(Decimal::new(5, 2), Decimal::ZERO),
        }
    }
}

/// Tax-rate rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    /// Percentages accepted as tax rates.
    pub whitelist: Vec<u32>,

    /// Rate pattern searched inside concatenated numeric strings; capture
    /// group 1 is the percentage. Derived from `whitelist` when unset.
    pub concatenated_rate_pattern: Option<String>,
}

impl TaxConfig {
    /// The configured concatenated-rate pattern, or one alternative per
    /// whitelisted rate with longer rates tried first.
    pub fn rate_pattern(&self) -> String {
        if let Some(pattern) = &self.concatenated_rate_pattern {
            return pattern.clone();
        }
        if self.whitelist.is_empty() {
            return r"(\d{1,2})%".to_string();
        }

        let mut rates: Vec<String> = self.whitelist.iter().map(u32::to_string).collect();
        rates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| b.cmp(a)));
        rates.dedup();
        format!("({})%", rates.join("|"))
    }
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            whitelist: vec![0, 1, 3, 5, 6, 9, 10, 11, 13, 16, 17],
            concatenated_rate_pattern: None,
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Documents processed concurrently per chunk.
    pub width: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { width: 10 }
    }
}

impl ParserConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check numeric settings that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layout.y_tolerance < 0.0 || self.layout.x_tolerance < 0.0 {
            return Err(ConfigError::Invalid("tolerances must not be negative".to_string()));
        }
        if !(0.0..=1.0).contains(&self.layout.header_region_ratio) {
            return Err(ConfigError::Invalid(format!(
                "header_region_ratio {} is outside 0..=1",
                self.layout.header_region_ratio
            )));
        }
        if self.batch.width == 0 {
            return Err(ConfigError::Invalid("batch width must be at least 1".to_string()));
        }
        if self.anchors.invoice_number_digits == 0 {
            return Err(ConfigError::Invalid("invoice_number_digits must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tolerance_uses_larger_bound() {
        let tol = ToleranceConfig::default().line;
        // 1% of 100 is 1.00, larger than 0.02
        assert!(tol.accepts(Decimal::new(10090, 2), Decimal::new(100, 0)));
        // small values fall back to the absolute bound
        assert!(tol.accepts(Decimal::new(102, 2), Decimal::ONE));
        assert!(!tol.accepts(Decimal::new(103, 2), Decimal::ONE));
    }

    #[test]
    fn test_tolerance_rejects_out_of_range_difference() {
        let tol = ToleranceConfig::default().line;
        assert!(!tol.accepts(Decimal::MAX, Decimal::MIN));
        assert!(tol.accepts(Decimal::MAX, Decimal::MAX));
    }

    #[test]
    fn test_rate_pattern_covers_whitelist() {
        let tax = TaxConfig::default();
        assert_eq!(tax.rate_pattern(), "(17|16|13|11|10|9|6|5|3|1|0)%");

        let re = regex::Regex::new(&tax.rate_pattern()).unwrap();
        for rate in &tax.whitelist {
            let text = format!("100.00{}%", rate);
            let caps = re.captures(&text).unwrap();
            assert_eq!(&caps[1], rate.to_string(), "{}", text);
        }

        let custom = TaxConfig {
            concatenated_rate_pattern: Some(r"(13)%".to_string()),
            ..TaxConfig::default()
        };
        assert_eq!(custom.rate_pattern(), "(13)%");
    }

    #[test]
    fn test_config_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ParserConfig::default();
        config.batch.width = 3;
        config.save(&path).unwrap();

        let loaded = ParserConfig::from_file(&path).unwrap();
        assert_eq!(loaded.batch.width, 3);
        assert_eq!(loaded.tax.whitelist, config.tax.whitelist);
        assert_eq!(loaded.tolerance.line, config.tolerance.line);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ParserConfig = serde_json::from_str(r#"{"layout": {"y_tolerance": 5.0}}"#).unwrap();
        assert_eq!(config.layout.y_tolerance, 5.0);
        assert_eq!(config.layout.x_tolerance, 20.0);
        assert_eq!(config.batch.width, 10);
    }

    #[test]
    fn test_validate_rejects_zero_batch_width() {
        let mut config = ParserConfig::default();
        config.batch.width = 0;
        assert!(config.validate().is_err());
        assert!(ParserConfig::default().validate().is_ok());
    }
}
