//! Identifier and literal rendering
//!
//! Table and column names are dynamic (they come from input headers), so they
//! are validated into an [`Ident`] before they reach a statement. Values are
//! only ever rendered through [`quote_literal`]. The two never mix.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{DatabaseError, DatabaseResult};

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENT_LEN: usize = 63;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// A validated SQL identifier, rendered double-quoted
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    /// Validate a raw name
    pub fn new(name: &str) -> DatabaseResult<Self> {
        if name.len() > MAX_IDENT_LEN {
            return Err(DatabaseError::InvalidInput(format!(
                "Identifier longer than {} characters: {}",
                MAX_IDENT_LEN, name
            )));
        }
        if !IDENT_RE.is_match(name) {
            return Err(DatabaseError::InvalidInput(format!(
                "Invalid identifier: {:?}",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The unquoted name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The quoted form for use inside a statement
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// Validate a list of names
pub fn idents<S: AsRef<str>>(names: &[S]) -> DatabaseResult<Vec<Ident>> {
    names.iter().map(|n| Ident::new(n.as_ref())).collect()
}

/// Render a comma-separated quoted column list
pub fn column_list(columns: &[Ident]) -> String {
    columns
        .iter()
        .map(Ident::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a string value as a SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_accepts_column_names() {
        let ident = Ident::new("KG_LIQUIDO").unwrap();
        assert_eq!(ident.quoted(), "\"KG_LIQUIDO\"");
        assert_eq!(ident.as_str(), "KG_LIQUIDO");
    }

    #[test]
    fn test_ident_rejects_injection() {
        assert!(Ident::new("export_data\"; DROP TABLE x; --").is_err());
        assert!(Ident::new("1column").is_err());
        assert!(Ident::new("").is_err());
        assert!(Ident::new(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_quote_literal_doubles_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("plain"), "'plain'");
    }

    #[test]
    fn test_column_list() {
        let cols = idents(&["CO_ANO", "CO_MES"]).unwrap();
        assert_eq!(column_list(&cols), "\"CO_ANO\", \"CO_MES\"");
    }
}
