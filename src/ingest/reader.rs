//! Delimited-text reading shared by extracts and the reference file

use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;

use super::error::{IngestError, IngestResult};

/// Resolve an encoding label such as `utf-8` or `iso-8859-1`
///
/// Labels follow the WHATWG Encoding Standard, so `iso-8859-1` and `latin1`
/// resolve to windows-1252, a superset of ISO-8859-1 for printable text.
pub fn resolve_encoding(label: &str) -> IngestResult<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| IngestError::UnknownEncoding(label.to_string()))
}

/// Build a `csv` reader over raw bytes; decoding happens per field
pub fn csv_reader<R: Read>(input: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .quote(b'"')
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

/// Decode one record with the given encoding, trimming whitespace and any
/// stray wrapping quotes
pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Vec<String> {
    record
        .iter()
        .map(|field| {
            let (text, _) = encoding.decode_with_bom_removal(field);
            text.trim().trim_matches('"').trim().to_string()
        })
        .collect()
}

/// Convert a configured delimiter character to the byte `csv` expects
pub fn delimiter_byte(delimiter: char) -> IngestResult<u8> {
    if delimiter.is_ascii() {
        Ok(delimiter as u8)
    } else {
        Err(IngestError::Parse {
            path: Default::default(),
            message: format!("Delimiter must be a single ASCII character, got {:?}", delimiter),
        })
    }
}

/// Pick the most frequent of `;`, `,` and tab in the header line
pub fn sniff_delimiter(header_line: &[u8]) -> u8 {
    let candidates = [b';', b',', b'\t'];
    candidates
        .iter()
        .copied()
        .max_by_key(|c| header_line.iter().filter(|b| *b == c).count())
        .filter(|c| header_line.contains(c))
        .unwrap_or(b';')
}

/// Read a whole file as bytes, keeping the path on failure
pub fn read_file(path: &Path) -> IngestResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })
}
