//! Column mapping from the line-item table header.

use serde::Serialize;
use tracing::{debug, warn};

use crate::layout::{cmp_f32, Line, TextFragment};
use crate::models::config::ColumnConfig;

/// The eight columns of the line-item table, in their printed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnField {
    GoodsName,
    Specification,
    Unit,
    Quantity,
    UnitPrice,
    Amount,
    TaxRate,
    TaxAmount,
}

impl ColumnField {
    /// Canonical left-to-right order.
    pub const ALL: [ColumnField; 8] = [
        ColumnField::GoodsName,
        ColumnField::Specification,
        ColumnField::Unit,
        ColumnField::Quantity,
        ColumnField::UnitPrice,
        ColumnField::Amount,
        ColumnField::TaxRate,
        ColumnField::TaxAmount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColumnField::GoodsName => "goods_name",
            ColumnField::Specification => "specification",
            ColumnField::Unit => "unit",
            ColumnField::Quantity => "quantity",
            ColumnField::UnitPrice => "unit_price",
            ColumnField::Amount => "amount",
            ColumnField::TaxRate => "tax_rate",
            ColumnField::TaxAmount => "tax_amount",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }
}

/// How a column position was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    Keyword,
    SplitLabel,
    Inferred,
}

/// Horizontal extent of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Column {
    pub center_x: f32,
    pub width: f32,
    pub source: ColumnSource,
}

/// Column positions for the known table fields. Any slot may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    pub goods_name: Option<Column>,
    pub specification: Option<Column>,
    pub unit: Option<Column>,
    pub quantity: Option<Column>,
    pub unit_price: Option<Column>,
    pub amount: Option<Column>,
    pub tax_rate: Option<Column>,
    pub tax_amount: Option<Column>,
}

impl ColumnMapping {
    pub fn get(&self, field: ColumnField) -> Option<&Column> {
        match field {
            ColumnField::GoodsName => self.goods_name.as_ref(),
            ColumnField::Specification => self.specification.as_ref(),
            ColumnField::Unit => self.unit.as_ref(),
            ColumnField::Quantity => self.quantity.as_ref(),
            ColumnField::UnitPrice => self.unit_price.as_ref(),
            ColumnField::Amount => self.amount.as_ref(),
            ColumnField::TaxRate => self.tax_rate.as_ref(),
            ColumnField::TaxAmount => self.tax_amount.as_ref(),
        }
    }

    fn slot_mut(&mut self, field: ColumnField) -> &mut Option<Column> {
        match field {
            ColumnField::GoodsName => &mut self.goods_name,
            ColumnField::Specification => &mut self.specification,
            ColumnField::Unit => &mut self.unit,
            ColumnField::Quantity => &mut self.quantity,
            ColumnField::UnitPrice => &mut self.unit_price,
            ColumnField::Amount => &mut self.amount,
            ColumnField::TaxRate => &mut self.tax_rate,
            ColumnField::TaxAmount => &mut self.tax_amount,
        }
    }

    pub fn is_mapped(&self, field: ColumnField) -> bool {
        self.get(field).is_some()
    }

    /// Mapped columns in canonical order.
    pub fn columns(&self) -> impl Iterator<Item = (ColumnField, &Column)> + '_ {
        ColumnField::ALL
            .into_iter()
            .filter_map(move |f| self.get(f).map(|c| (f, c)))
    }

    pub fn len(&self) -> usize {
        self.columns().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set(&mut self, field: ColumnField, column: Column) {
        *self.slot_mut(field) = Some(column);
    }
}

/// Where the line-item table sits on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    /// Rows lie strictly below this y.
    pub header_y: f32,
    /// Rows lie strictly above this y; `None` when the page has no footer.
    pub footer_y: Option<f32>,
    pub mapping: ColumnMapping,
}

/// Derives a [`ColumnMapping`] from a table header line.
pub struct ColumnMapper<'a> {
    config: &'a ColumnConfig,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(config: &'a ColumnConfig) -> Self {
        Self { config }
    }

    /// Map columns from keyword matches, split labels, then spacing inference.
    pub fn detect(&self, header: &Line) -> ColumnMapping {
        let fragments: Vec<&TextFragment> = header
            .fragments
            .iter()
            .filter(|f| !f.text.trim().is_empty())
            .collect();

        let mut mapping = ColumnMapping::default();
        self.match_keywords(&fragments, &mut mapping);
        self.match_split_labels(&fragments, &mut mapping);
        self.infer_missing(&mut mapping);

        debug!(
            "Column mapping: {}",
            mapping
                .columns()
                .map(|(f, c)| format!("{}={:.0}", f.name(), c.center_x))
                .collect::<Vec<_>>()
                .join(", ")
        );

        mapping
    }

    fn keywords(&self, field: ColumnField) -> &[String] {
        let k = &self.config.keywords;
        match field {
            ColumnField::GoodsName => &k.goods_name,
            ColumnField::Specification => &k.specification,
            ColumnField::Unit => &k.unit,
            ColumnField::Quantity => &k.quantity,
            ColumnField::UnitPrice => &k.unit_price,
            ColumnField::Amount => &k.amount,
            ColumnField::TaxRate => &k.tax_rate,
            ColumnField::TaxAmount => &k.tax_amount,
        }
    }

    fn match_keywords(&self, fragments: &[&TextFragment], mapping: &mut ColumnMapping) {
        for fragment in fragments {
            let text: String = fragment.text.chars().filter(|c| !c.is_whitespace()).collect();

            for field in ColumnField::ALL {
                if mapping.is_mapped(field) {
                    continue;
                }
                let matched = self.keywords(field).iter().any(|keyword| {
                    let keyword: String = keyword.chars().filter(|c| !c.is_whitespace()).collect();
                    !keyword.is_empty() && text.contains(&keyword)
                });
                if matched {
                    mapping.set(
                        field,
                        Column {
                            center_x: fragment.center_x(),
                            width: fragment.width,
                            source: ColumnSource::Keyword,
                        },
                    );
                }
            }
        }
    }

    /// Two-glyph labels printed as two fragments, e.g. "金" ... "额".
    fn match_split_labels(&self, fragments: &[&TextFragment], mapping: &mut ColumnMapping) {
        for label in &self.config.split_labels {
            let Some(field) = ColumnField::from_name(&label.field) else {
                warn!("Unknown column `{}` in split label", label.field);
                continue;
            };
            if mapping.is_mapped(field) {
                continue;
            }

            'first: for (i, first) in fragments.iter().enumerate() {
                if first.text.trim() != label.first {
                    continue;
                }
                let window_end = (i + self.config.pair_scan_window).min(fragments.len());
                for second in fragments.iter().take(window_end).skip(i + 1) {
                    if second.text.trim() == label.second {
                        let width = second.right() - first.x;
                        mapping.set(
                            field,
                            Column {
                                center_x: first.x + width / 2.0,
                                width,
                                source: ColumnSource::SplitLabel,
                            },
                        );
                        break 'first;
                    }
                }
            }
        }
    }

    /// Place missing columns between or beside their nearest detected
    /// neighbours, using the median gap between detected columns.
    fn infer_missing(&self, mapping: &mut ColumnMapping) {
        let detected = mapping.clone();
        if detected.len() < 2 {
            return;
        }

        let mut centers: Vec<f32> = detected.columns().map(|(_, c)| c.center_x).collect();
        centers.sort_by(|a, b| cmp_f32(*a, *b));
        let mut gaps: Vec<f32> = centers.windows(2).map(|w| w[1] - w[0]).collect();
        gaps.sort_by(|a, b| cmp_f32(*a, *b));
        let gap = match gaps.get(gaps.len() / 2) {
            Some(g) if *g > 0.0 => *g,
            _ => self.config.default_gap,
        };

        for field in ColumnField::ALL {
            if detected.is_mapped(field) {
                continue;
            }
            let index = field.position();

            let left = ColumnField::ALL[..index]
                .iter()
                .rev()
                .find_map(|f| detected.get(*f).map(|c| (*f, c.center_x)));
            let right = ColumnField::ALL[index + 1..]
                .iter()
                .find_map(|f| detected.get(*f).map(|c| (*f, c.center_x)));

            let center_x = match (left, right) {
                (Some((_, l)), Some((_, r))) => (l + r) / 2.0,
                (Some((lf, l)), None) => l + gap * (index - lf.position()) as f32,
                (None, Some((rf, r))) => r - gap * (rf.position() - index) as f32,
                (None, None) => continue,
            };

            debug!("Inferred column {} at x={:.0}", field.name(), center_x);
            mapping.set(
                field,
                Column {
                    center_x,
                    width: gap * self.config.inferred_width_ratio,
                    source: ColumnSource::Inferred,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(items: &[(&str, f32, f32)]) -> Line {
        Line {
            y: 500.0,
            fragments: items
                .iter()
                .map(|(text, x, width)| TextFragment::new(*text, *x, 500.0, *width, 9.0, 1))
                .collect(),
        }
    }

    fn center(mapping: &ColumnMapping, field: ColumnField) -> f32 {
        mapping.get(field).map(|c| c.center_x).unwrap()
    }

    #[test]
    fn test_full_header_by_keyword() {
        let config = ColumnConfig::default();
        let line = header(&[
            ("项目名称", 40.0, 40.0),
            ("规格型号", 150.0, 40.0),
            ("单位", 230.0, 20.0),
            ("数量", 280.0, 20.0),
            ("单价", 340.0, 20.0),
            ("金额", 410.0, 20.0),
            ("税率/征收率", 460.0, 50.0),
            ("税额", 540.0, 20.0),
        ]);

        let mapping = ColumnMapper::new(&config).detect(&line);

        assert_eq!(mapping.len(), 8);
        assert_eq!(center(&mapping, ColumnField::GoodsName), 60.0);
        assert_eq!(center(&mapping, ColumnField::Unit), 240.0);
        assert_eq!(center(&mapping, ColumnField::TaxRate), 485.0);
        assert!(mapping.columns().all(|(_, c)| c.source == ColumnSource::Keyword));
    }

    #[test]
    fn test_spaced_keyword_and_blank_fragments() {
        let config = ColumnConfig::default();
        let line = header(&[("  ", 10.0, 5.0), ("数  量", 280.0, 30.0)]);

        let mapping = ColumnMapper::new(&config).detect(&line);
        assert_eq!(mapping.len(), 1);
        assert_eq!(center(&mapping, ColumnField::Quantity), 295.0);
    }

    #[test]
    fn test_split_glyph_labels() {
        let config = ColumnConfig::default();
        let line = header(&[
            ("项目名称", 40.0, 40.0),
            ("金", 400.0, 10.0),
            ("额", 430.0, 10.0),
            ("税", 530.0, 10.0),
            ("额", 560.0, 10.0),
        ]);

        let mapping = ColumnMapper::new(&config).detect(&line);

        let amount = mapping.get(ColumnField::Amount).unwrap();
        assert_eq!(amount.center_x, 420.0);
        assert_eq!(amount.width, 40.0);
        assert_eq!(amount.source, ColumnSource::SplitLabel);
        assert_eq!(center(&mapping, ColumnField::TaxAmount), 550.0);
    }

    #[test]
    fn test_missing_columns_inferred_from_median_gap() {
        let config = ColumnConfig::default();
        // quantity 300, amount 400, tax amount 600 detected
        let line = header(&[("数量", 290.0, 20.0), ("金额", 390.0, 20.0), ("税额", 590.0, 20.0)]);

        let mapping = ColumnMapper::new(&config).detect(&line);

        // gaps 100, 200 -> median 200
        assert_eq!(center(&mapping, ColumnField::UnitPrice), 350.0);
        assert_eq!(center(&mapping, ColumnField::TaxRate), 500.0);
        assert_eq!(center(&mapping, ColumnField::Unit), 100.0);
        assert_eq!(center(&mapping, ColumnField::GoodsName), -300.0);

        let unit_price = mapping.get(ColumnField::UnitPrice).unwrap();
        assert_eq!(unit_price.source, ColumnSource::Inferred);
        assert_eq!(unit_price.width, 160.0);
    }

    #[test]
    fn test_single_column_is_not_inferred() {
        let config = ColumnConfig::default();
        let line = header(&[("金额", 390.0, 20.0)]);

        let mapping = ColumnMapper::new(&config).detect(&line);
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_field_names_roundtrip() {
        for field in ColumnField::ALL {
            assert_eq!(ColumnField::from_name(field.name()), Some(field));
        }
        assert_eq!(ColumnField::from_name("unknown"), None);
    }
}
