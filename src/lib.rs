//! csvsql: `SELECT` queries over CSV files.
//!
//! A query is tokenized, parsed, checked for aggregate calls and then run as
//! a pipeline of row stages over a row source:
//!
//! ```no_run
//! use csvsql::{execute_query, CsvOptions};
//!
//! let out = execute_query(
//!     r#"SELECT gender, COUNT(*) FROM "people.csv" GROUP BY gender"#,
//!     &CsvOptions::default(),
//!     Vec::new(),
//! )?;
//! print!("{}", String::from_utf8_lossy(&out));
//! # Ok::<(), csvsql::CsvSqlError>(())
//! ```

pub mod aggregates;
pub mod ast;
pub mod csv_io;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod group_by;
pub mod limit;
pub mod operators;
pub mod order_by;
pub mod parser;
pub mod pattern;
pub mod pipeline;
pub mod row;
pub mod select;
pub mod tokenizer;
pub mod types;

use std::io::Write;

pub use ast::Query;
pub use csv_io::{CsvOptions, CsvSink, CsvSource};
pub use error::{CsvSqlError, Result};
pub use pipeline::{run, Pipeline, RowSink};
pub use row::Row;
pub use types::Value;

/// Parse `text` and resolve its aggregates, ready to build a pipeline from.
pub fn compile_query(text: &str) -> Result<Query> {
    aggregates::identify_aggregates(parser::parse_query(text)?)
}

/// Run a query over in-memory rows.
pub fn query_rows<I>(text: &str, rows: I) -> Result<Vec<Row>>
where
    I: IntoIterator<Item = Row>,
{
    let query = compile_query(text)?;
    let mut out = Vec::new();
    run(&query, rows.into_iter().map(Ok), &mut out)?;
    Ok(out)
}

/// Run a query against the CSV file named in its FROM clause, writing CSV
/// to `out`. Returns the writer once everything has been flushed.
pub fn execute_query<W: Write>(text: &str, options: &CsvOptions, out: W) -> Result<W> {
    let query = compile_query(text)?;
    let source = CsvSource::open(&query.from, options)?;
    let mut sink = CsvSink::new(out, options);
    run(&query, source, &mut sink)?;
    sink.into_inner()
}
