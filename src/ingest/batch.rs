//! Trade extracts parsed into batches

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use super::error::{IngestError, IngestResult};
use super::reader::{csv_reader, decode_record, read_file};

/// Trade flow direction; selects the destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Exports, stored in `export_data`
    Export,
    /// Imports, stored in `import_data`
    Import,
}

impl Direction {
    /// Both directions, in table order
    pub const ALL: [Direction; 2] = [Direction::Export, Direction::Import];

    /// Destination table name
    pub fn table_name(&self) -> &'static str {
        match self {
            Direction::Export => "export_data",
            Direction::Import => "import_data",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "e" | "export" | "exp" => Ok(Direction::Export),
            "i" | "import" | "imp" => Ok(Direction::Import),
            _ => Err(format!(
                "Unknown direction: {}. Use 'E' (export) or 'I' (import).",
                s
            )),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Export => write!(f, "export"),
            Direction::Import => write!(f, "import"),
        }
    }
}

/// One parsed input file
///
/// Rows are positional with `columns`; an empty cell is `None`.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Source file, when read from disk
    pub source: Option<PathBuf>,
    /// Header names in file order
    pub columns: Vec<String>,
    /// Raw cell text per row
    pub rows: Vec<Vec<Option<String>>>,
    /// Rows dropped while parsing (more cells than headers)
    pub rejected_rows: usize,
}

impl Batch {
    /// Build a batch from in-memory rows; short rows are padded with nulls
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, None);
                row
            })
            .collect();
        Self {
            source: None,
            columns,
            rows,
            rejected_rows: 0,
        }
    }

    /// Read and parse an extract file
    pub fn from_path(path: &Path, delimiter: u8, encoding: &'static Encoding) -> IngestResult<Self> {
        let bytes = read_file(path)?;
        let mut batch = Self::from_reader(bytes.as_slice(), delimiter, encoding).map_err(|e| {
            match e {
                IngestError::Parse { message, .. } => IngestError::Parse {
                    path: path.to_path_buf(),
                    message,
                },
                other => other,
            }
        })?;
        batch.source = Some(path.to_path_buf());
        tracing::info!(
            "Parsed {} rows x {} columns from {}",
            batch.len(),
            batch.columns.len(),
            path.display()
        );
        Ok(batch)
    }

    /// Parse delimited text: header row first, `"` quoting
    pub fn from_reader<R: Read>(
        input: R,
        delimiter: u8,
        encoding: &'static Encoding,
    ) -> IngestResult<Self> {
        let mut reader = csv_reader(input, delimiter);
        let mut records = reader.byte_records();

        let header = match records.next() {
            Some(record) => record.map_err(|e| parse_error(format!("Bad header: {}", e)))?,
            None => return Err(parse_error("File has no header row".to_string())),
        };
        let columns = decode_record(&header, encoding);
        validate_headers(&columns)?;

        let width = columns.len();
        let mut rows = Vec::new();
        let mut rejected_rows = 0;

        for (index, record) in records.enumerate() {
            let record = record.map_err(|e| parse_error(format!("Row {}: {}", index + 1, e)))?;
            let cells = decode_record(&record, encoding);

            // A trailing blank line decodes to a single empty cell
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            if cells.len() > width {
                tracing::warn!(
                    "Row {} has {} cells but only {} headers; skipped",
                    index + 1,
                    cells.len(),
                    width
                );
                rejected_rows += 1;
                continue;
            }

            let mut row: Vec<Option<String>> = cells
                .into_iter()
                .map(|c| if c.is_empty() { None } else { Some(c) })
                .collect();
            row.resize(width, None);
            rows.push(row);
        }

        Ok(Self {
            source: None,
            columns,
            rows,
            rejected_rows,
        })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Raw value of a cell by row and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Iterate the raw values of one column
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = Option<&str>> + Clone {
        self.rows
            .iter()
            .map(move |row| row.get(idx).and_then(|c| c.as_deref()))
    }
}

fn parse_error(message: String) -> IngestError {
    IngestError::Parse {
        path: PathBuf::new(),
        message,
    }
}

fn validate_headers(columns: &[String]) -> IngestResult<()> {
    let mut seen = HashSet::new();
    for (idx, name) in columns.iter().enumerate() {
        if name.is_empty() {
            return Err(parse_error(format!("Header at index {} is empty", idx)));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(parse_error(format!("Duplicate header: {}", name)));
        }
    }
    Ok(())
}
