// src/serialize.rs

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// A sparse matrix row: column index -> value, ascending by column.
pub type SparseRow = BTreeMap<usize, i64>;

/// Quotes and escapes `s` so that it is a valid YAML scalar.
pub fn safe_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Writes `{0: 3, 4: 1}`.
pub fn write_inline_row(writer: &mut dyn Write, row: &SparseRow) -> std::io::Result<()> {
    write!(writer, "{{")?;
    for (i, (column, value)) in row.iter().enumerate() {
        if i > 0 {
            write!(writer, ", ")?;
        }
        write!(writer, "{column}: {value}")?;
    }
    write!(writer, "}}")
}

/// Square matrix stored as row boundaries plus column/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedSparseRow {
    pub number_of_rows: u32,
    pub number_of_columns: u32,
    pub data: Vec<i64>,
    pub indices: Vec<u32>,
    pub indptr: Vec<u64>,
}

impl CompressedSparseRow {
    pub fn from_rows(rows: &[SparseRow]) -> Self {
        let mut matrix = Self {
            number_of_rows: rows.len() as u32,
            number_of_columns: rows.len() as u32,
            indptr: vec![0],
            ..Self::default()
        };
        for row in rows {
            for (&column, &value) in row {
                matrix.indices.push(column as u32);
                matrix.data.push(value);
            }
            matrix.indptr.push(matrix.data.len() as u64);
        }
        matrix
    }

    /// Expands the matrix back into sparse rows.
    pub fn to_rows(&self) -> Result<Vec<SparseRow>> {
        if self.indices.len() != self.data.len() || self.indptr.len() != self.number_of_rows as usize + 1 {
            return Err(AnalysisError::Decode("sparse matrix dimensions do not agree".to_string()));
        }
        self.indptr
            .windows(2)
            .map(|bounds| {
                let (start, end) = (bounds[0] as usize, bounds[1] as usize);
                if start > end || end > self.data.len() {
                    return Err(AnalysisError::Decode(format!("bad row bounds {start}..{end}")));
                }
                Ok(self.indices[start..end]
                    .iter()
                    .zip(&self.data[start..end])
                    .map(|(&column, &value)| (column as usize, value))
                    .collect())
            })
            .collect()
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bitcode::serialize(value).map_err(|e| AnalysisError::Encode(e.to_string()))
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    bitcode::deserialize(bytes).map_err(|e| AnalysisError::Decode(e.to_string()))
}

/// Version of the report layout
pub const FORMAT_VERSION: u32 = 1;

/// Facts about the whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u32,
    pub repository: String,
    pub begin_unix_time: i64,
    pub end_unix_time: i64,
    pub commits: u32,
    pub run_time: u64,
}

impl Metadata {
    pub fn write_text(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        writeln!(writer, "git_coupling:")?;
        writeln!(writer, "  version: {}", self.version)?;
        writeln!(writer, "  repository: {}", safe_string(&self.repository))?;
        writeln!(writer, "  begin_unix_time: {}", self.begin_unix_time)?;
        writeln!(writer, "  end_unix_time: {}", self.end_unix_time)?;
        writeln!(writer, "  commits: {}", self.commits)?;
        writeln!(writer, "  run_time: {}", self.run_time)
    }

    /// Widens the time span and sums the counters. The repository is left to the caller.
    pub fn merge(&mut self, other: &Metadata) {
        self.begin_unix_time = self.begin_unix_time.min(other.begin_unix_time);
        self.end_unix_time = self.end_unix_time.max(other.end_unix_time);
        self.commits += other.commits;
        self.run_time += other.run_time;
    }
}

/// The binary report: the header plus one encoded message per analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub header: Metadata,
    pub contents: BTreeMap<String, Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_string() {
        assert_eq!(safe_string("plain"), "\"plain\"");
        assert_eq!(safe_string(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_inline_row() {
        let mut out = Vec::new();
        let row: SparseRow = [(4, 1), (0, 3)].into_iter().collect();
        write_inline_row(&mut out, &row).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{0: 3, 4: 1}");

        let mut out = Vec::new();
        write_inline_row(&mut out, &SparseRow::new()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{}");
    }

    #[test]
    fn test_csr_layout() {
        let rows: Vec<SparseRow> = vec![
            [(0, 3), (2, 1)].into_iter().collect(),
            SparseRow::new(),
            [(1, 5)].into_iter().collect(),
        ];
        let csr = CompressedSparseRow::from_rows(&rows);
        assert_eq!(csr.number_of_rows, 3);
        assert_eq!(csr.indptr, vec![0, 2, 2, 3]);
        assert_eq!(csr.indices, vec![0, 2, 1]);
        assert_eq!(csr.data, vec![3, 1, 5]);
        assert_eq!(csr.to_rows().unwrap(), rows);

        let mut broken = csr.clone();
        broken.indptr[3] = 7;
        assert!(matches!(broken.to_rows(), Err(AnalysisError::Decode(_))));
        broken.indptr.pop();
        assert!(matches!(broken.to_rows(), Err(AnalysisError::Decode(_))));
    }

    #[test]
    fn test_binary_envelope() {
        let mut results = AnalysisResults {
            header: Metadata { version: 1, commits: 2, ..Metadata::default() },
            ..AnalysisResults::default()
        };
        results.contents.insert("Couples".to_string(), vec![1, 2, 3]);
        let bytes = encode(&results).unwrap();
        let back: AnalysisResults = decode(&bytes).unwrap();
        assert_eq!(back, results);
        assert!(matches!(decode::<AnalysisResults>(&bytes[..bytes.len() / 2]), Err(AnalysisError::Decode(_))));
    }

    #[test]
    fn test_metadata_merge() {
        let mut first = Metadata { begin_unix_time: 100, end_unix_time: 200, commits: 3, run_time: 10, ..Metadata::default() };
        let second = Metadata { begin_unix_time: 50, end_unix_time: 150, commits: 4, run_time: 5, ..Metadata::default() };
        first.merge(&second);
        assert_eq!((first.begin_unix_time, first.end_unix_time), (50, 200));
        assert_eq!((first.commits, first.run_time), (7, 15));
    }
}
