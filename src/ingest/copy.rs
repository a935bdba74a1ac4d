//! `COPY ... FROM STDIN` text encoding
//!
//! Rows are written tab-separated, one per line. Null is the empty field,
//! and backslash, tab, newline and carriage return are escaped.

use crate::database::CellValue;
use crate::database::sql::{Ident, column_list};

/// Build the `COPY` statement matching [`encode_rows`] output
pub fn copy_statement(table: &Ident, columns: &[Ident]) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT text, NULL '')",
        table,
        column_list(columns)
    )
}

/// Encode rows in `COPY` text format
pub fn encode_rows(rows: &[Vec<CellValue>]) -> Vec<u8> {
    let mut out = String::new();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            encode_cell(cell, &mut out);
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn encode_cell(cell: &CellValue, out: &mut String) {
    match cell {
        CellValue::Null => {}
        CellValue::Integer(n) => out.push_str(&n.to_string()),
        CellValue::Float(f) => out.push_str(&f.to_string()),
        CellValue::Text(s) => {
            // An empty string would read back as null
            if s.is_empty() {
                return;
            }
            for c in s.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '\t' => out.push_str("\\t"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    other => out.push(other),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_statement() {
        let table = Ident::new("export_data").unwrap();
        let columns = vec![Ident::new("CO_ANO").unwrap(), Ident::new("VL_FOB").unwrap()];
        assert_eq!(
            copy_statement(&table, &columns),
            "COPY \"export_data\" (\"CO_ANO\", \"VL_FOB\") FROM STDIN WITH (FORMAT text, NULL '')"
        );
    }

    #[test]
    fn test_encode_rows() {
        let rows = vec![
            vec![
                CellValue::Integer(2021),
                CellValue::Float(10.5),
                CellValue::Text("SP".into()),
            ],
            vec![CellValue::Integer(2022), CellValue::Null, CellValue::Null],
        ];
        assert_eq!(
            String::from_utf8(encode_rows(&rows)).unwrap(),
            "2021\t10.5\tSP\n2022\t\t\n"
        );
    }

    #[test]
    fn test_encode_escapes_control_characters() {
        let rows = vec![vec![CellValue::Text("a\tb\\c\nd".into())]];
        assert_eq!(
            String::from_utf8(encode_rows(&rows)).unwrap(),
            "a\\tb\\\\c\\nd\n"
        );
    }
}
