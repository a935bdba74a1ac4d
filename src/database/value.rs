//! Typed cell values exchanged with the store

use serde::{Deserialize, Serialize};

/// A single typed cell, as coerced from input text or read back from a table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// SQL NULL
    #[default]
    Null,
    /// 64-bit integer
    Integer(i64),
    /// Double precision float
    Float(f64),
    /// Free text
    Text(String),
}

impl CellValue {
    /// Check whether the value is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Canonical text used when comparing composite keys.
    ///
    /// Floats without a fractional part render like integers so that a code
    /// stored as `DOUBLE` matches the same code parsed as an integer.
    pub fn key_fragment(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    format!("{}", *f as i64)
                } else {
                    format!("{}", f)
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Null => write!(f, "null"),
            other => write!(f, "{}", other.key_fragment()),
        }
    }
}
