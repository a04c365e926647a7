//! CSV row source and row sink.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecordsIntoIter, WriterBuilder};
use tracing::debug;

use crate::error::{CsvSqlError, Result};
use crate::pipeline::RowSink;
use crate::row::Row;
use crate::types::{format_number, Value};

/// Options shared by the reader and the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Whether the writer emits a header row.
    pub headers: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            headers: true,
        }
    }
}

/// Lazily reads rows from CSV input. The first record names the columns and
/// every field is read as text.
pub struct CsvSource<R: Read> {
    columns: Vec<String>,
    records: StringRecordsIntoIter<R>,
}

impl CsvSource<File> {
    pub fn open(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CsvSqlError::Io(io::Error::new(
                e.kind(),
                format!("cannot open {:?}: {}", path.display().to_string(), e),
            ))
        })?;
        debug!(path = %path.display(), "opened table");
        Self::from_reader(file, options)
    }
}

impl<R: Read> CsvSource<R> {
    pub fn from_reader(reader: R, options: &CsvOptions) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(true)
            .from_reader(reader);
        let columns = reader.headers()?.iter().map(String::from).collect();
        Ok(CsvSource {
            columns,
            records: reader.into_records(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };
        let row = self
            .columns
            .iter()
            .zip(record.iter())
            .map(|(name, field)| (name.as_str(), field))
            .collect();
        Some(Ok(row))
    }
}

/// Render a value as a CSV field: NULL is empty and booleans are `1` / `0`.
pub fn format_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Number(n) => format_number(*n),
        Value::Text(s) => s.clone(),
    }
}

/// Writes rows as CSV. The header row is taken from the first row written.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    headers: bool,
    wrote_header: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, options: &CsvOptions) -> Self {
        CsvSink {
            writer: WriterBuilder::new()
                .delimiter(options.delimiter)
                .has_headers(false)
                .from_writer(writer),
            headers: options.headers,
            wrote_header: false,
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| CsvSqlError::Io(e.into_error()))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn write_row(&mut self, row: Row) -> Result<()> {
        if self.headers && !self.wrote_header {
            self.writer.write_record(row.column_names())?;
            self.wrote_header = true;
        }
        self.writer.write_record(row.values().map(format_field))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
