use thiserror::Error;

/// Top-level error type for csvsql.
#[derive(Debug, Error)]
pub enum CsvSqlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("tokenize error: {0}")]
    Tokenize(String),

    #[error("syntax error: expected {expected}, found \"{found}\"")]
    Syntax { expected: String, found: String },

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("SQL function not found: {0}")]
    UnknownFunction(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),
}

impl CsvSqlError {
    pub(crate) fn syntax(expected: impl Into<String>, found: impl Into<String>) -> Self {
        CsvSqlError::Syntax {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// True for failures raised while evaluating an expression against a row.
    pub fn is_evaluation(&self) -> bool {
        matches!(
            self,
            CsvSqlError::ColumnNotFound(_)
                | CsvSqlError::UnknownFunction(_)
                | CsvSqlError::UnknownOperator(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CsvSqlError>;
