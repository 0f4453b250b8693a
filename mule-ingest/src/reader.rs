//! CSV upload reader
//!
//! Columns are located by header name, so their order in the file does not
//! matter. Short records yield empty fields rather than errors.

use crate::error::{IngestError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use mule_engine::TransactionRow;
use std::path::Path;
use tracing::{debug, info};

/// Columns every upload must carry
pub const REQUIRED_COLUMNS: [&str; 5] = ["transaction_id", "sender_id", "receiver_id", "amount", "timestamp"];

/// Decodes transaction uploads into rows for the engine
///
/// Only structure is checked here (file type, encoding, header). Field
/// contents are validated by the engine, which skips and reports bad rows.
#[derive(Debug, Clone, Default)]
pub struct CsvIngestor;

impl CsvIngestor {
    /// Create new ingestor
    pub fn new() -> Self {
        Self
    }

    /// Read a `.csv` file
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<Vec<TransactionRow>> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(IngestError::NotCsv(path.display().to_string()));
        }

        let bytes = std::fs::read(path)?;
        let content = String::from_utf8(bytes).map_err(|_| IngestError::Encoding)?;

        let rows = self.read_str(&content)?;
        info!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(rows)
    }

    /// Read CSV text
    pub fn read_str(&self, content: &str) -> Result<Vec<TransactionRow>> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let columns = column_positions(reader.headers()?)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(columns[i]).unwrap_or("").to_string();
            rows.push(TransactionRow::new(field(0), field(1), field(2), field(3), field(4)));
        }

        debug!("Decoded {} CSV records", rows.len());
        Ok(rows)
    }
}

/// Position of each required column in the header
fn column_positions(headers: &StringRecord) -> Result<[usize; 5]> {
    let mut positions = [0usize; 5];
    let mut missing = Vec::new();

    for (slot, name) in REQUIRED_COLUMNS.iter().enumerate() {
        match headers.iter().position(|h| h.trim() == *name) {
            Some(index) => positions[slot] = index,
            None => missing.push(name.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(IngestError::MissingColumns(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "transaction_id,sender_id,receiver_id,amount,timestamp\n\
        TX001,ACC_A,ACC_B,1500.00,2024-01-15 10:30:00\n\
        TX002,ACC_B,ACC_C,1450.00,2024-01-15 11:00:00\n";

    #[test]
    fn test_read_rows() {
        let rows = CsvIngestor::new().read_str(SAMPLE).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transaction_id, "TX001");
        assert_eq!(rows[1].receiver_id, "ACC_C");
        assert_eq!(rows[1].amount, "1450.00");
        assert_eq!(rows[0].timestamp, "2024-01-15 10:30:00");
    }

    #[test]
    fn test_columns_any_order_and_extra_columns() {
        let content = "note, timestamp ,amount,receiver_id,sender_id,transaction_id\n\
            x,2024-01-15 10:30:00,99.5,B,A,T1\n";

        let rows = CsvIngestor::new().read_str(content).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender_id, "A");
        assert_eq!(rows[0].receiver_id, "B");
        assert_eq!(rows[0].amount, "99.5");
        assert_eq!(rows[0].timestamp, "2024-01-15 10:30:00");
    }

    #[test]
    fn test_missing_columns() {
        let err = CsvIngestor::new()
            .read_str("transaction_id,sender_id,amount\nT1,A,10\n")
            .unwrap_err();

        match err {
            IngestError::MissingColumns(cols) => assert_eq!(cols, vec!["receiver_id", "timestamp"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_short_record_yields_empty_fields() {
        let content = "transaction_id,sender_id,receiver_id,amount,timestamp\nT1,A\n";

        let rows = CsvIngestor::new().read_str(content).unwrap();

        assert_eq!(rows[0].sender_id, "A");
        assert_eq!(rows[0].receiver_id, "");
        assert_eq!(rows[0].timestamp, "");
    }

    #[test]
    fn test_byte_order_mark_ignored() {
        let content = format!("\u{feff}{}", SAMPLE);
        assert_eq!(CsvIngestor::new().read_str(&content).unwrap().len(), 2);
    }

    #[test]
    fn test_read_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let rows = CsvIngestor::new().read_path(&path).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_rejects_non_csv_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.xlsx");
        std::fs::write(&path, SAMPLE).unwrap();

        let err = CsvIngestor::new().read_path(&path).unwrap_err();
        assert!(matches!(err, IngestError::NotCsv(_)));
        assert!(err.to_string().starts_with("Invalid file type. Only CSV allowed."));
    }

    #[test]
    fn test_rejects_non_utf8() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"transaction_id,sender_id\n\xff\xfe,A\n").unwrap();

        let err = CsvIngestor::new().read_path(file.path()).unwrap_err();
        assert!(matches!(err, IngestError::Encoding));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = CsvIngestor::new().read_path("/nonexistent/upload.csv").unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
