//! Column types and schema-definition statements
//!
//! The statements here are valid for both DuckDB and PostgreSQL. Anything
//! dialect-specific (uniqueness constraints, bulk transfer) lives on the
//! backends.

use serde::{Deserialize, Serialize};

use super::sql::{Ident, column_list, quote_literal};

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit integer
    Integer,
    /// Double precision float
    Float,
    /// Free text
    Text,
}

impl ColumnType {
    /// SQL type used when creating a column
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
        }
    }

    /// Map a type name reported by `information_schema.columns`
    ///
    /// Precision suffixes such as `DECIMAL(18,3)` are ignored. Unknown names
    /// map to text.
    pub fn from_sql_type(name: &str) -> Self {
        let lower = name.trim().to_lowercase();
        let base = lower.split('(').next().unwrap_or_default().trim();
        match base {
            "bigint" | "integer" | "int" | "smallint" | "tinyint" | "hugeint" | "int2"
            | "int4" | "int8" | "ubigint" | "uinteger" | "usmallint" | "utinyint" => {
                ColumnType::Integer
            }
            "double" | "double precision" | "float" | "float4" | "float8" | "real"
            | "numeric" | "decimal" => ColumnType::Float,
            _ => ColumnType::Text,
        }
    }

    /// Whether a column of this type can hold values of `incoming` without loss
    pub fn can_hold(&self, incoming: ColumnType) -> bool {
        match (self, incoming) {
            (ColumnType::Text, _) => true,
            (ColumnType::Float, ColumnType::Integer | ColumnType::Float) => true,
            (ColumnType::Integer, ColumnType::Integer) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// Statement builder for the trade tables
pub struct TableSchema;

impl TableSchema {
    /// `CREATE TABLE IF NOT EXISTS` with every column nullable
    pub fn create_table_sql(table: &Ident, columns: &[(Ident, ColumnType)]) -> String {
        let defs: Vec<String> = columns
            .iter()
            .map(|(name, ty)| format!("    {} {}", name, ty.sql_type()))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            table,
            defs.join(",\n")
        )
    }

    /// Append a nullable column
    pub fn add_column_sql(table: &Ident, column: &Ident, ty: ColumnType) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table,
            column,
            ty.sql_type()
        )
    }

    /// Select the given columns of every stored row
    pub fn select_columns_sql(table: &Ident, columns: &[Ident]) -> String {
        format!("SELECT {} FROM {}", column_list(columns), table)
    }

    /// Does a table exist in the current schema
    pub fn table_exists_sql(table: &Ident) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = {}",
            quote_literal(table.as_str())
        )
    }

    /// Column names and types of a table, in ordinal order
    pub fn table_columns_sql(table: &Ident) -> String {
        format!(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = {} \
             ORDER BY ordinal_position",
            quote_literal(table.as_str())
        )
    }

    /// Count stored rows
    pub fn count_sql(table: &Ident) -> String {
        format!("SELECT COUNT(*) AS row_count FROM {}", table)
    }

    /// Count rows whose column is not null
    pub fn count_not_null_sql(table: &Ident, column: &Ident) -> String {
        format!(
            "SELECT COUNT(*) AS row_count FROM {} WHERE {} IS NOT NULL",
            table, column
        )
    }

    /// Name of the uniqueness constraint over the natural key
    pub fn natural_key_constraint(table: &Ident) -> String {
        format!("{}_natural_key", table.as_str())
    }
}
