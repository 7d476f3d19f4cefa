//! Row segmentation and fragment classification.
//!
//! A table region is cut into item groups starting at each `*category*name`
//! marker. Every fragment of a group is then classified into a line-item
//! field by text shape and by position relative to the mapped columns.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::error::RowParseError;
use crate::layout::{cmp_f32, PageModel, TextFragment};
use crate::models::config::{BoundaryRatios, ParserConfig};
use crate::models::invoice::{LineItem, TaxRate};

use super::columns::{Column, ColumnField, ColumnMapping, TableRegion};
use super::numeric::{
    extract_all_numbers, split_concatenated_amounts, split_plain_run, NumericDisambiguator, SplitResult,
};
use super::rules::patterns::{NUMERIC_VALUE, PERCENT_ONLY, PURE_NUMERIC, TWO_DECIMALS};
use super::rules::{parse_amount, CompiledPatterns};

const NUMERIC_COLUMNS: [ColumnField; 4] = [
    ColumnField::Quantity,
    ColumnField::UnitPrice,
    ColumnField::Amount,
    ColumnField::TaxAmount,
];

/// Specification text found by position alone must be shorter than this.
const LOOSE_SPEC_MAX_CHARS: usize = 40;

/// Margin kept between a loose specification and the quantity column.
const QUANTITY_MARGIN: f32 = 15.0;

/// Fragments belonging to one line item.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Top of the group.
    pub y: f32,
    pub page_number: u32,
    /// Fragments sorted by ascending x.
    pub fragments: Vec<TextFragment>,
}

/// X positions separating the name, specification and unit zones of a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldBoundaries {
    pub name_right: f32,
    pub spec_left: f32,
    pub spec_right: f32,
    pub unit_left: f32,
}

impl FieldBoundaries {
    /// Boundaries from the specification and unit columns, falling back to
    /// page-width ratios measured from the start of the item name.
    pub fn compute(name_start_x: f32, mapping: &ColumnMapping, page_width: f32, ratios: &BoundaryRatios) -> Self {
        let at = |ratio: f32| name_start_x + page_width * ratio;

        match (mapping.specification, mapping.unit) {
            (Some(spec), Some(unit)) => Self {
                name_right: spec.center_x - spec.width / 2.0 - 10.0,
                spec_left: spec.center_x - spec.width / 2.0 - 15.0,
                spec_right: spec.center_x + spec.width / 2.0 + 15.0,
                unit_left: unit.center_x - unit.width / 2.0 - 15.0,
            },
            (Some(spec), None) => Self {
                name_right: spec.center_x - spec.width / 2.0 - 10.0,
                spec_left: spec.center_x - spec.width / 2.0 - 15.0,
                spec_right: spec.center_x + spec.width / 2.0 + 15.0,
                unit_left: at(ratios.unit_left),
            },
            (None, Some(unit)) => Self {
                name_right: unit.center_x - unit.width / 2.0 - 30.0,
                spec_left: at(ratios.spec_left),
                spec_right: unit.center_x - unit.width / 2.0 - 10.0,
                unit_left: unit.center_x - unit.width / 2.0 - 15.0,
            },
            (None, None) => Self {
                name_right: at(ratios.name_right),
                spec_left: at(ratios.spec_left),
                spec_right: at(ratios.spec_right),
                unit_left: at(ratios.unit_left),
            },
        }
    }
}

/// A number read from a row, with the column it was matched to.
#[derive(Debug, Clone, PartialEq)]
struct NumericValue {
    value: String,
    x: f32,
    column: Option<ColumnField>,
}

/// Cuts table regions into rows and turns rows into [`LineItem`]s.
pub struct RowSegmenter<'a> {
    config: &'a ParserConfig,
    patterns: &'a CompiledPatterns,
}

impl<'a> RowSegmenter<'a> {
    pub fn new(config: &'a ParserConfig, patterns: &'a CompiledPatterns) -> Self {
        Self { config, patterns }
    }

    /// Group the fragments between header and footer into one row per item
    /// marker, top to bottom.
    pub fn segment(&self, page: &PageModel, region: &TableRegion) -> Vec<RawRow> {
        let rows = &self.config.rows;
        let skip = &self.config.table.skip_keywords;

        let fragments: Vec<&TextFragment> = page
            .lines
            .iter()
            .filter(|line| line.y < region.header_y && region.footer_y.map_or(true, |f| line.y > f))
            .flat_map(|line| line.fragments.iter())
            .filter(|f| {
                let text = f.text.trim();
                !text.is_empty() && !skip.iter().any(|k| text.contains(k.as_str()))
            })
            .collect();

        let mut markers: Vec<&TextFragment> = fragments
            .iter()
            .copied()
            .filter(|f| self.patterns.item_marker.is_match(f.text.trim()))
            .collect();
        markers.sort_by(|a, b| cmp_f32(b.y, a.y));

        let floor = region.footer_y.unwrap_or(0.0);
        let mut result = Vec::with_capacity(markers.len());

        for (i, marker) in markers.iter().enumerate() {
            let top = marker.y + rows.group_top_margin;
            let bottom = markers
                .get(i + 1)
                .map(|next| next.y + rows.group_bottom_margin)
                .unwrap_or(floor);

            let mut group: Vec<TextFragment> = fragments
                .iter()
                .filter(|f| f.y <= top && f.y > bottom)
                .map(|f| (*f).clone())
                .collect();
            group.sort_by(|a, b| cmp_f32(a.x, b.x));

            trace!("Row at y={:.1} on page {}: {} fragments", top, page.page_number, group.len());
            result.push(RawRow {
                y: top,
                page_number: page.page_number,
                fragments: group,
            });
        }

        debug!("Page {}: {} rows between y={:.1} and {:?}", page.page_number, result.len(), region.header_y, region.footer_y);
        result
    }

    /// Classify the fragments of a row and assemble a line item.
    ///
    /// The returned item has no line number yet.
    pub fn parse_row(&self, row: &RawRow, mapping: &ColumnMapping, page_width: f32) -> Result<LineItem, RowParseError> {
        let rows = &self.config.rows;
        let patterns = self.patterns;

        let mut fragments: Vec<&TextFragment> = row.fragments.iter().collect();
        fragments.sort_by(|a, b| cmp_f32(a.x, b.x));

        let marker = fragments.iter().find(|f| patterns.item_marker.is_match(f.text.trim()));
        let name_start_x = marker.map(|f| f.x).unwrap_or(0.0);
        let has_marker = marker.is_some();
        let bounds = FieldBoundaries::compute(name_start_x, mapping, page_width, &rows.boundary_ratios);
        let disambiguator = NumericDisambiguator::new(
            &patterns.concatenated_rate,
            &self.config.tax.whitelist,
            self.config.tolerance.line,
        );

        let mut names: Vec<&str> = Vec::new();
        let mut specs: Vec<&str> = Vec::new();
        let mut numbers: Vec<NumericValue> = Vec::new();
        // Values of one run share an x, so they skip column matching
        let mut run_values: Vec<NumericValue> = Vec::new();
        let mut unit: Option<&str> = None;
        let mut tax_rate: Option<TaxRate> = None;
        let mut split: Option<SplitResult> = None;
        let mut classified = 0usize;

        for fragment in fragments {
            let text = fragment.text.trim();
            if text.is_empty() || patterns.is_invalid_text(text) || patterns.is_irrelevant(text) {
                continue;
            }
            classified += 1;

            let x = fragment.x;
            let chars = text.chars().count();
            let numeric_looking = NUMERIC_VALUE.is_match(text);

            if PERCENT_ONLY.is_match(text) {
                tax_rate = TaxRate::parse(text);
                continue;
            }
            if patterns.exempt_marker.is_match(text) {
                tax_rate = Some(TaxRate::Exempt);
                continue;
            }
            if patterns.item_marker.is_match(text) {
                names.push(text);
                continue;
            }

            if let Some(column) = mapping.unit {
                if in_column(x, &column, rows.unit_window)
                    && (1..=rows.unit_max_chars).contains(&chars)
                    && !PURE_NUMERIC.is_match(text)
                {
                    unit = Some(text);
                    continue;
                }
            }

            if let Some(column) = mapping.specification {
                let is_code = text.len() >= rows.spec_code_min_digits && text.bytes().all(|b| b.is_ascii_digit());
                if in_column(x, &column, rows.spec_window) && (is_code || (!numeric_looking && chars < rows.spec_max_chars)) {
                    specs.push(text);
                    continue;
                }
            }

            if text.contains('%') && text.bytes().any(|b| b.is_ascii_digit()) {
                match disambiguator.split(text) {
                    Some(result) => {
                        tax_rate = Some(result.tax_rate);
                        split = Some(result);
                    }
                    None => {
                        let (values, printed_rate) = split_plain_run(text);
                        trace!("Unrecognised rate in {:?}, read as {:?}", text, values);
                        if tax_rate.is_none() {
                            tax_rate = printed_rate;
                        }
                        run_values.extend(values.into_iter().map(|value| NumericValue {
                            value,
                            x,
                            column: None,
                        }));
                    }
                }
                continue;
            }

            if PURE_NUMERIC.is_match(text) && text != "-" {
                numbers.extend(extract_all_numbers(text).into_iter().map(|value| NumericValue {
                    value,
                    x,
                    column: None,
                }));
                continue;
            }

            let loose_spec = !numeric_looking && chars < LOOSE_SPEC_MAX_CHARS;

            if mapping.specification.is_none() {
                let right = match (mapping.unit, mapping.quantity) {
                    (Some(_), _) => Some(bounds.unit_left),
                    (None, Some(quantity)) => Some(quantity.center_x - QUANTITY_MARGIN),
                    (None, None) => None,
                };
                if let Some(right) = right {
                    if x > bounds.spec_left && x < right && loose_spec {
                        specs.push(text);
                        continue;
                    }
                }
            }

            if has_marker && x < bounds.name_right {
                names.push(text);
                continue;
            }

            if x > bounds.spec_left && x < bounds.spec_right && loose_spec {
                specs.push(text);
                continue;
            }

            names.push(text);
        }

        if classified == 0 {
            return Err(RowParseError::EmptyRow);
        }

        let mut item = LineItem {
            page_number: row.page_number,
            unit: unit.map(str::to_string),
            tax_rate,
            ..Default::default()
        };

        let name = names.concat();
        if !name.is_empty() {
            item.goods_name = Some(name);
        }

        let specs: Vec<&str> = specs
            .into_iter()
            .filter(|s| s.chars().count() < rows.spec_max_chars - 1)
            .collect();
        if !specs.is_empty() {
            item.specification = Some(specs.join(" "));
        }

        for value in &mut numbers {
            value.column = match_numeric_column(value.x, mapping, rows.numeric_column_tolerance);
        }
        for field in NUMERIC_COLUMNS {
            if let Some(value) = numbers.iter().find(|n| n.column == Some(field)) {
                if let Some(slot) = numeric_slot(&mut item, field) {
                    *slot = Some(value.value.clone());
                }
            }
        }

        let unmatched: Vec<NumericValue> = numbers
            .into_iter()
            .filter(|n| n.column.is_none())
            .chain(run_values)
            .collect();
        match &split {
            Some(split) => apply_split(&mut item, split),
            None if !unmatched.is_empty() => assign_unmatched(&mut item, unmatched),
            None => {}
        }

        if item.tax_rate == Some(TaxRate::Exempt) && item.tax_amount.is_none() {
            item.tax_amount = Some("0".to_string());
        }

        split_concatenated_amounts(&mut item);
        check_numeric_fields(&item)?;

        trace!(
            "Row {:?}: qty={:?} price={:?} amount={:?} rate={:?} tax={:?}",
            item.goods_name,
            item.quantity,
            item.unit_price,
            item.amount,
            item.tax_rate,
            item.tax_amount
        );
        Ok(item)
    }
}

/// Whether `x` lies within `window` of the column's extent.
fn in_column(x: f32, column: &Column, window: f32) -> bool {
    let half = column.width / 2.0;
    x >= column.center_x - half - window && x <= column.center_x + half + window
}

/// Nearest numeric column within an adaptive tolerance, or within twice the
/// tolerance when nothing is close enough.
fn match_numeric_column(x: f32, mapping: &ColumnMapping, base_tolerance: f32) -> Option<ColumnField> {
    let columns: Vec<(ColumnField, &Column)> = NUMERIC_COLUMNS
        .into_iter()
        .filter_map(|field| mapping.get(field).map(|c| (field, c)))
        .collect();

    let adaptive = match columns.len() {
        n if n >= 4 => base_tolerance * 0.8,
        3 => base_tolerance,
        _ => base_tolerance * 1.2,
    };

    let nearest = |limit: &dyn Fn(&Column) -> f32| {
        columns
            .iter()
            .map(|(field, column)| (*field, (x - column.center_x).abs(), limit(column)))
            .filter(|(_, distance, limit)| distance <= limit)
            .min_by(|a, b| cmp_f32(a.1, b.1))
            .map(|(field, _, _)| field)
    };

    nearest(&|column: &Column| adaptive.min(column.width * 0.6)).or_else(|| nearest(&|_: &Column| adaptive * 2.0))
}

fn numeric_slot(item: &mut LineItem, field: ColumnField) -> Option<&mut Option<String>> {
    match field {
        ColumnField::Quantity => Some(&mut item.quantity),
        ColumnField::UnitPrice => Some(&mut item.unit_price),
        ColumnField::Amount => Some(&mut item.amount),
        ColumnField::TaxAmount => Some(&mut item.tax_amount),
        _ => None,
    }
}

fn apply_split(item: &mut LineItem, split: &SplitResult) {
    let values = [
        (ColumnField::Quantity, &split.quantity),
        (ColumnField::UnitPrice, &split.unit_price),
        (ColumnField::Amount, &split.amount),
        (ColumnField::TaxAmount, &split.tax_amount),
    ];
    for (field, value) in values {
        if let (Some(value), Some(slot)) = (value, numeric_slot(item, field)) {
            *slot = Some(value.clone());
        }
    }
}

/// Assign numbers that matched no column to the still empty numeric fields.
fn assign_unmatched(item: &mut LineItem, mut values: Vec<NumericValue>) {
    values.sort_by(|a, b| cmp_f32(a.x, b.x));

    let open: Vec<ColumnField> = NUMERIC_COLUMNS
        .into_iter()
        .filter(|field| numeric_slot(item, *field).is_some_and(|slot| slot.is_none()))
        .collect();
    let values: Vec<String> = values.into_iter().map(|v| v.value).collect();

    let assignments: Vec<(ColumnField, String)> = if values.len() == 4 && open.len() == 4 {
        assign_by_shape(values)
    } else if values.len() >= open.len() {
        open.into_iter().zip(values).collect()
    } else {
        open.into_iter().rev().zip(values.into_iter().rev()).collect()
    };

    for (field, value) in assignments {
        if let Some(slot) = numeric_slot(item, field) {
            *slot = Some(value);
        }
    }
}

/// Four numbers for four fields: a small whole quantity, a two-decimal tax
/// under 1000, and the larger of the rest as the amount.
fn assign_by_shape(mut values: Vec<String>) -> Vec<(ColumnField, String)> {
    let magnitude = |s: &str| Decimal::from_str(s).unwrap_or(Decimal::ZERO);

    let quantity_index = values
        .iter()
        .position(|v| magnitude(v) <= Decimal::from(20) && !TWO_DECIMALS.is_match(v))
        .unwrap_or(0);
    let quantity = values.remove(quantity_index);

    let tax_index = values
        .iter()
        .position(|v| TWO_DECIMALS.is_match(v) && magnitude(v) < Decimal::from(1000))
        .unwrap_or(values.len() - 1);
    let tax = values.remove(tax_index);

    let (price, amount) = if magnitude(&values[0]) > magnitude(&values[1]) {
        (values[1].clone(), values[0].clone())
    } else {
        (values[0].clone(), values[1].clone())
    };

    vec![
        (ColumnField::Quantity, quantity),
        (ColumnField::UnitPrice, price),
        (ColumnField::Amount, amount),
        (ColumnField::TaxAmount, tax),
    ]
}

/// Every numeric field must read as a decimal.
fn check_numeric_fields(item: &LineItem) -> Result<(), RowParseError> {
    let fields = [
        ("quantity", &item.quantity),
        ("unit_price", &item.unit_price),
        ("amount", &item.amount),
        ("tax_amount", &item.tax_amount),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            if parse_amount(value).is_none() {
                return Err(RowParseError::InvalidNumber {
                    field,
                    value: value.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Line;
    use crate::invoice::columns::ColumnSource;
    use crate::models::invoice::ParseStatus;
    use pretty_assertions::assert_eq;

    const PAGE_WIDTH: f32 = 595.0;

    fn column(center_x: f32, width: f32) -> Option<Column> {
        Some(Column {
            center_x,
            width,
            source: ColumnSource::Keyword,
        })
    }

    fn full_mapping() -> ColumnMapping {
        ColumnMapping {
            goods_name: column(60.0, 80.0),
            specification: column(170.0, 40.0),
            unit: column(240.0, 20.0),
            quantity: column(290.0, 20.0),
            unit_price: column(350.0, 20.0),
            amount: column(420.0, 20.0),
            tax_rate: column(485.0, 50.0),
            tax_amount: column(550.0, 20.0),
        }
    }

    fn row(items: &[(&str, f32)]) -> RawRow {
        RawRow {
            y: 410.0,
            page_number: 1,
            fragments: items
                .iter()
                .map(|(text, x)| TextFragment::new(*text, *x, 400.0, 20.0, 9.0, 1))
                .collect(),
        }
    }

    fn parse(items: &[(&str, f32)], mapping: &ColumnMapping) -> Result<LineItem, RowParseError> {
        let config = ParserConfig::default();
        let patterns = CompiledPatterns::from_config(&config).unwrap();
        RowSegmenter::new(&config, &patterns).parse_row(&row(items), mapping, PAGE_WIDTH)
    }

    fn line(y: f32, items: &[(&str, f32)]) -> Line {
        Line {
            y,
            fragments: items
                .iter()
                .map(|(text, x)| TextFragment::new(*text, *x, y, 20.0, 9.0, 1))
                .collect(),
        }
    }

    #[test]
    fn test_row_with_all_columns() {
        let item = parse(
            &[
                ("*办公用品*复印纸", 20.0),
                ("A4", 160.0),
                ("箱", 235.0),
                ("2", 285.0),
                ("22.875", 340.0),
                ("45.75", 410.0),
                ("13%", 470.0),
                ("5.95", 545.0),
            ],
            &full_mapping(),
        )
        .unwrap();

        assert_eq!(item.goods_name.as_deref(), Some("*办公用品*复印纸"));
        assert_eq!(item.specification.as_deref(), Some("A4"));
        assert_eq!(item.unit.as_deref(), Some("箱"));
        assert_eq!(item.quantity.as_deref(), Some("2"));
        assert_eq!(item.unit_price.as_deref(), Some("22.875"));
        assert_eq!(item.amount.as_deref(), Some("45.75"));
        assert_eq!(item.tax_rate, Some(TaxRate::Percent(13)));
        assert_eq!(item.tax_amount.as_deref(), Some("5.95"));
        assert_eq!(item.page_number, 1);
    }

    #[test]
    fn test_concatenated_numbers_are_split() {
        let item = parse(&[("*餐饮服务*餐费", 20.0), ("145.7545.7513%5.95", 300.0)], &full_mapping()).unwrap();

        assert_eq!(item.quantity.as_deref(), Some("1"));
        assert_eq!(item.unit_price.as_deref(), Some("45.75"));
        assert_eq!(item.amount.as_deref(), Some("45.75"));
        assert_eq!(item.tax_rate, Some(TaxRate::Percent(13)));
        assert_eq!(item.tax_amount.as_deref(), Some("5.95"));
    }

    #[test]
    fn test_five_percent_run_is_split() {
        let item = parse(&[("*运输服务*运费", 20.0), ("100.005%5.00", 400.0)], &full_mapping()).unwrap();

        assert_eq!(item.amount.as_deref(), Some("100.00"));
        assert_eq!(item.tax_rate, Some(TaxRate::Percent(5)));
        assert_eq!(item.tax_amount.as_deref(), Some("5.00"));
        assert_eq!(item.status, ParseStatus::Success);
    }

    #[test]
    fn test_unrecognised_rate_run_keeps_numbers() {
        let item = parse(&[("*服务*咨询费", 20.0), ("9.082%0.82", 400.0)], &full_mapping()).unwrap();

        assert_eq!(item.amount.as_deref(), Some("9.08"));
        assert_eq!(item.tax_amount.as_deref(), Some("0.82"));
        // Printed rate is kept for the validator to flag
        assert_eq!(item.tax_rate, Some(TaxRate::Percent(2)));
    }

    #[test]
    fn test_unmatched_numbers_assigned_by_shape() {
        let item = parse(
            &[
                ("*电子设备*显示器", 20.0),
                ("10", 300.0),
                ("120.5", 350.0),
                ("1205.00", 400.0),
                ("156.65", 450.0),
            ],
            &ColumnMapping::default(),
        )
        .unwrap();

        assert_eq!(item.quantity.as_deref(), Some("10"));
        assert_eq!(item.unit_price.as_deref(), Some("120.5"));
        assert_eq!(item.amount.as_deref(), Some("1205.00"));
        assert_eq!(item.tax_amount.as_deref(), Some("156.65"));
    }

    #[test]
    fn test_fewer_numbers_fill_from_the_right() {
        let item = parse(&[("*服务*咨询费", 20.0), ("45.75", 400.0), ("5.95", 450.0)], &ColumnMapping::default()).unwrap();

        assert_eq!(item.quantity, None);
        assert_eq!(item.unit_price, None);
        assert_eq!(item.amount.as_deref(), Some("45.75"));
        assert_eq!(item.tax_amount.as_deref(), Some("5.95"));
    }

    #[test]
    fn test_exempt_row_gets_zero_tax() {
        let item = parse(&[("*农产品*大米", 20.0), ("100.00", 410.0), ("***", 470.0)], &full_mapping()).unwrap();

        assert_eq!(item.tax_rate, Some(TaxRate::Exempt));
        assert_eq!(item.amount.as_deref(), Some("100.00"));
        assert_eq!(item.tax_amount.as_deref(), Some("0"));
    }

    #[test]
    fn test_noise_only_row_is_empty() {
        let result = parse(&[("（小写）", 20.0), ("壹佰圆整", 100.0)], &full_mapping());
        assert_eq!(result, Err(RowParseError::EmptyRow));
    }

    #[test]
    fn test_unreadable_number_is_rejected() {
        let item = LineItem {
            amount: Some("1.2.3".to_string()),
            ..Default::default()
        };
        match check_numeric_fields(&item) {
            Err(RowParseError::InvalidNumber { field, value }) => {
                assert_eq!(field, "amount");
                assert_eq!(value, "1.2.3");
            }
            other => panic!("expected InvalidNumber, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_column_tolerance_adapts() {
        let mapping = full_mapping();
        // four columns: tolerance 20, capped at 60% of the width (12)
        assert_eq!(match_numeric_column(285.0, &mapping, 25.0), Some(ColumnField::Quantity));
        // 20 away: outside 12, inside the doubled tolerance
        assert_eq!(match_numeric_column(370.0, &mapping, 25.0), Some(ColumnField::UnitPrice));
        assert_eq!(match_numeric_column(100.0, &mapping, 25.0), None);
    }

    #[test]
    fn test_boundaries_fall_back_to_page_ratios() {
        let ratios = BoundaryRatios::default();
        let bounds = FieldBoundaries::compute(20.0, &ColumnMapping::default(), 500.0, &ratios);
        assert_eq!(bounds.name_right, 160.0);
        assert_eq!(bounds.spec_left, 145.0);
        assert_eq!(bounds.spec_right, 210.0);

        let with_columns = FieldBoundaries::compute(20.0, &full_mapping(), 500.0, &ratios);
        assert_eq!(with_columns.name_right, 140.0);
        assert_eq!(with_columns.spec_right, 205.0);
        assert_eq!(with_columns.unit_left, 215.0);
    }

    #[test]
    fn test_segment_groups_rows_between_header_and_footer() {
        let config = ParserConfig::default();
        let patterns = CompiledPatterns::from_config(&config).unwrap();
        let page = PageModel {
            page_number: 1,
            width: PAGE_WIDTH,
            height: 842.0,
            lines: vec![
                line(500.0, &[("项目名称", 20.0), ("金额", 410.0)]),
                line(480.0, &[("*办公用品*复印", 20.0), ("45.75", 410.0)]),
                line(470.0, &[("纸", 25.0)]),
                line(440.0, &[("*餐饮服务*餐费", 20.0), ("100.00", 410.0)]),
                line(430.0, &[("备注", 20.0)]),
                line(400.0, &[("合计", 20.0), ("145.75", 410.0)]),
                line(380.0, &[("*其他*不应出现", 20.0)]),
            ],
        };
        let region = TableRegion {
            header_y: 500.0,
            footer_y: Some(400.0),
            mapping: full_mapping(),
        };

        let rows = RowSegmenter::new(&config, &patterns).segment(&page, &region);

        assert_eq!(rows.len(), 2);
        let first: Vec<&str> = rows[0].fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(first, vec!["*办公用品*复印", "纸", "45.75"]);
        assert_eq!(rows[0].y, 490.0);
        let second: Vec<&str> = rows[1].fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(second, vec!["*餐饮服务*餐费", "100.00"]);
    }
}
