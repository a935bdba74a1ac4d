//! Column-type inference and natural keys
//!
//! A [`ColumnPlan`] is derived once per batch and passed explicitly to the
//! provisioner and loader. Inference per column:
//!
//! 1. every non-empty value parses as `i64` → integer
//! 2. else every non-empty value parses as a finite `f64` → float
//! 3. else text
//!
//! Columns named as numeric hints skip step 3. They are typed from the values
//! that do parse (integer if all of those are integers, else float) and the
//! rest are nulled on coercion.
//!
//! A column with no non-empty value carries no evidence: it is typed text, or
//! float when hinted, and marked unobserved so an existing table's stored type
//! is adopted instead of checked.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::batch::Batch;
use crate::database::{CellValue, ColumnType};

/// Columns whose values together identify one trade-flow observation
pub const NATURAL_KEY: [&str; 8] = [
    "CO_ANO",
    "CO_MES",
    "CO_NCM",
    "CO_UNID",
    "CO_PAIS",
    "SG_UF_NCM",
    "CO_VIA",
    "CO_URF",
];

/// Separator between key fragments in a composite key string
pub const KEY_SEPARATOR: char = '|';

/// The natural key resolved against a concrete set of column names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    /// Actual column names, in `NATURAL_KEY` order
    pub columns: Vec<String>,
}

impl NaturalKey {
    /// Resolve key columns case-insensitively against `available`
    ///
    /// # Returns
    /// The resolved key, or the names of the key columns not found
    pub fn resolve<S: AsRef<str>>(available: &[S]) -> Result<Self, Vec<String>> {
        let mut columns = Vec::with_capacity(NATURAL_KEY.len());
        let mut missing = Vec::new();

        for key in NATURAL_KEY {
            match available
                .iter()
                .find(|name| name.as_ref().eq_ignore_ascii_case(key))
            {
                Some(name) => columns.push(name.as_ref().to_string()),
                None => missing.push(key.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(Self { columns })
        } else {
            Err(missing)
        }
    }

    /// Compose the key string of one typed row
    ///
    /// `positions` are the indexes of the key columns within `row`.
    pub fn compose(positions: &[usize], row: &[CellValue]) -> String {
        let mut key = String::new();
        for (i, &pos) in positions.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            if let Some(cell) = row.get(pos) {
                key.push_str(&cell.key_fragment());
            }
        }
        key
    }
}

/// One column of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedColumn {
    /// Column name as it appears in the batch header
    pub name: String,
    /// Inferred type
    pub column_type: ColumnType,
    /// Whether the batch held at least one non-empty value for the column
    #[serde(default = "observed_default")]
    pub observed: bool,
}

fn observed_default() -> bool {
    true
}

/// Column name → semantic type, in batch column order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnPlan {
    pub columns: Vec<PlannedColumn>,
}

impl ColumnPlan {
    /// Column names, in order
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Type of a column, matched case-insensitively
    pub fn type_of(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.column_type)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the plan has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolve the natural key against this plan's columns
    pub fn natural_key(&self) -> Result<NaturalKey, Vec<String>> {
        NaturalKey::resolve(&self.names())
    }
}

/// Derive a plan from a batch
///
/// # Arguments
/// * `batch` - Parsed rows
/// * `numeric_hints` - Columns never typed text (matched case-insensitively)
pub fn infer_plan<S: AsRef<str>>(batch: &Batch, numeric_hints: &[S]) -> ColumnPlan {
    if batch.is_empty() {
        tracing::debug!("Empty batch; no column carries type evidence");
    }

    let hints: HashSet<String> = numeric_hints
        .iter()
        .map(|h| h.as_ref().to_lowercase())
        .collect();

    let columns = batch
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values = batch.column_values(idx).flatten();
            let hinted = hints.contains(&name.to_lowercase());
            let observed = values.clone().next().is_some();
            let column_type = match infer_column(values.clone()) {
                _ if !observed && hinted => ColumnType::Float,
                ColumnType::Text if hinted => {
                    tracing::debug!("Column {} hinted numeric; non-numeric values will be nulled", name);
                    match infer_column(values.filter(|v| parse_float(v).is_some())) {
                        ColumnType::Integer => ColumnType::Integer,
                        _ => ColumnType::Float,
                    }
                }
                other => other,
            };
            PlannedColumn {
                name: name.clone(),
                column_type,
                observed,
            }
        })
        .collect();

    ColumnPlan { columns }
}

fn infer_column<'a>(values: impl Iterator<Item = &'a str> + Clone) -> ColumnType {
    let mut values = values.peekable();
    if values.peek().is_none() {
        return ColumnType::Text;
    }
    if values.clone().all(|v| parse_integer(v).is_some()) {
        ColumnType::Integer
    } else if values.all(|v| parse_float(v).is_some()) {
        ColumnType::Float
    } else {
        ColumnType::Text
    }
}

fn parse_integer(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Coerce a raw cell to a column type; `None` when the value does not fit
pub fn coerce(raw: Option<&str>, column_type: ColumnType) -> Option<CellValue> {
    let Some(raw) = raw else {
        return Some(CellValue::Null);
    };
    match column_type {
        ColumnType::Integer => parse_integer(raw).map(CellValue::Integer),
        ColumnType::Float => parse_float(raw).map(CellValue::Float),
        ColumnType::Text => Some(CellValue::Text(raw.to_string())),
    }
}

/// Typed rows produced from a batch under a plan
#[derive(Debug, Clone, Default)]
pub struct TypedRows {
    /// Column names, positional with each row
    pub columns: Vec<String>,
    /// Coerced rows
    pub rows: Vec<Vec<CellValue>>,
    /// Cells that failed coercion and were nulled
    pub cells_nulled: usize,
}

/// Coerce every cell of a batch; values that fail their column's type become
/// null rather than rejecting the row
pub fn coerce_batch(batch: &Batch, plan: &ColumnPlan) -> TypedRows {
    let types: Vec<ColumnType> = batch
        .columns
        .iter()
        .map(|name| plan.type_of(name).unwrap_or(ColumnType::Text))
        .collect();

    let mut cells_nulled = 0;
    let rows = batch
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            row.iter()
                .zip(&types)
                .zip(&batch.columns)
                .map(|((raw, ty), name)| match coerce(raw.as_deref(), *ty) {
                    Some(cell) => cell,
                    None => {
                        cells_nulled += 1;
                        tracing::warn!(
                            "Row {}: {} value {:?} is not {}; stored as null",
                            row_idx + 1,
                            name,
                            raw.as_deref().unwrap_or_default(),
                            ty
                        );
                        CellValue::Null
                    }
                })
                .collect()
        })
        .collect();

    TypedRows {
        columns: batch.columns.clone(),
        rows,
        cells_nulled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(columns: &[&str], rows: &[&[&str]]) -> Batch {
        Batch::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| {
                    r.iter()
                        .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn test_infer_integer_float_text() {
        let b = batch(
            &["CO_ANO", "VL_FOB", "SG_UF_NCM"],
            &[&["2021", "10.5", "SP"], &["2022", "3", "MG"]],
        );
        let plan = infer_plan(&b, &[] as &[&str]);
        assert_eq!(plan.type_of("CO_ANO"), Some(ColumnType::Integer));
        assert_eq!(plan.type_of("VL_FOB"), Some(ColumnType::Float));
        assert_eq!(plan.type_of("SG_UF_NCM"), Some(ColumnType::Text));
    }

    #[test]
    fn test_empty_cells_do_not_block_numeric_inference() {
        let b = batch(&["QT_ESTAT"], &[&["5"], &[""], &["7"]]);
        let plan = infer_plan(&b, &[] as &[&str]);
        assert_eq!(plan.type_of("QT_ESTAT"), Some(ColumnType::Integer));
    }

    #[test]
    fn test_zero_padded_codes_are_integers() {
        let b = batch(&["CO_NCM"], &[&["01012100"], &["02023000"]]);
        let plan = infer_plan(&b, &[] as &[&str]);
        assert_eq!(plan.type_of("CO_NCM"), Some(ColumnType::Integer));
    }

    #[test]
    fn test_nan_is_not_numeric() {
        let b = batch(&["X"], &[&["1.5"], &["NaN"]]);
        let plan = infer_plan(&b, &[] as &[&str]);
        assert_eq!(plan.type_of("X"), Some(ColumnType::Text));
    }

    #[test]
    fn test_numeric_hint_nulls_unparseable() {
        let b = batch(&["KG_LIQUIDO"], &[&["100"], &["n/a"]]);
        let plan = infer_plan(&b, &["kg_liquido"]);
        assert_eq!(plan.type_of("KG_LIQUIDO"), Some(ColumnType::Integer));

        let typed = coerce_batch(&b, &plan);
        assert_eq!(typed.rows[0][0], CellValue::Integer(100));
        assert_eq!(typed.rows[1][0], CellValue::Null);
        assert_eq!(typed.cells_nulled, 1);
    }

    #[test]
    fn test_numeric_hint_with_fractions_is_float() {
        let b = batch(&["VL_FOB"], &[&["1.5"], &["-"], &["2"]]);
        let plan = infer_plan(&b, &["VL_FOB"]);
        assert_eq!(plan.type_of("VL_FOB"), Some(ColumnType::Float));
    }

    #[test]
    fn test_numeric_hint_without_values_is_float() {
        let b = batch(&["QT_ESTAT", "X"], &[&["", "a"], &["", "b"]]);
        let plan = infer_plan(&b, &["QT_ESTAT"]);
        assert_eq!(plan.type_of("QT_ESTAT"), Some(ColumnType::Float));
        assert_eq!(plan.type_of("X"), Some(ColumnType::Text));
    }

    #[test]
    fn test_empty_batch_carries_no_evidence() {
        let b = batch(&["CO_ANO", "SG_UF_NCM"], &[]);
        let plan = infer_plan(&b, &["CO_ANO"]);
        assert_eq!(plan.len(), 2);
        assert!(plan.columns.iter().all(|c| !c.observed));
        assert_eq!(plan.type_of("CO_ANO"), Some(ColumnType::Float));
        assert_eq!(plan.type_of("SG_UF_NCM"), Some(ColumnType::Text));
    }

    #[test]
    fn test_blank_column_is_unobserved() {
        let b = batch(&["CO_URF", "CO_VIA"], &[&["", "1"], &["", "4"]]);
        let plan = infer_plan(&b, &[] as &[&str]);
        assert!(!plan.columns[0].observed);
        assert_eq!(plan.columns[0].column_type, ColumnType::Text);
        assert!(plan.columns[1].observed);
        assert_eq!(plan.columns[1].column_type, ColumnType::Integer);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let b = batch(
            &["CO_ANO", "VL_FOB", "SG_UF_NCM"],
            &[&["2021", "1", "SP"], &["2021", "1.25", "RJ"]],
        );
        let first = infer_plan(&b, &["VL_FOB"]);
        for _ in 0..5 {
            assert_eq!(infer_plan(&b, &["VL_FOB"]), first);
        }
    }

    #[test]
    fn test_natural_key_resolves_case_insensitively() {
        let names: Vec<String> = NATURAL_KEY.iter().map(|k| k.to_lowercase()).collect();
        let key = NaturalKey::resolve(&names).unwrap();
        assert_eq!(key.columns[0], "co_ano");
        assert_eq!(key.columns.len(), 8);
    }

    #[test]
    fn test_natural_key_reports_missing() {
        let missing = NaturalKey::resolve(&["CO_ANO", "CO_MES"]).unwrap_err();
        assert_eq!(missing.len(), 6);
        assert!(missing.contains(&"CO_URF".to_string()));
    }

    #[test]
    fn test_compose_key() {
        let row = vec![
            CellValue::Integer(2021),
            CellValue::Text("SP".into()),
            CellValue::Null,
            CellValue::Float(1.0),
        ];
        assert_eq!(NaturalKey::compose(&[0, 1, 2, 3], &row), "2021|SP||1");
        assert_eq!(NaturalKey::compose(&[3, 0], &row), "1|2021");
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce(None, ColumnType::Integer), Some(CellValue::Null));
        assert_eq!(
            coerce(Some(" 42 "), ColumnType::Integer),
            Some(CellValue::Integer(42))
        );
        assert_eq!(coerce(Some("4.2"), ColumnType::Integer), None);
        assert_eq!(
            coerce(Some("01012100"), ColumnType::Text),
            Some(CellValue::Text("01012100".into()))
        );
    }
}
