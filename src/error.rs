#[derive(Debug, thiserror::Error)]
pub enum PivotError {
    #[error("Schema Error: {0}")]
    SchemaError(String),

    #[error("Type Error: {0}")]
    TypeError(String),

    #[error("Query Build Error: {0}")]
    QueryBuildError(String),

    #[error("Compile Error: {0}")]
    CompileError(String),

    /// Backing engine failure. Carries the statement that was being run.
    #[error("Eval Error: {message} (query: {query})")]
    EvalError { message: String, query: String },

    #[error("IO Error: {0}")]
    IoError(String),

    #[error("Serialization Error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PivotError {
    pub fn eval(message: impl ToString, query: impl Into<String>) -> Self {
        PivotError::EvalError { message: message.to_string(), query: query.into() }
    }
}

pub type Result<T> = std::result::Result<T, PivotError>;
