use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported filter type: '{0}'")]
    UnsupportedFilterType(String),

    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FilterError {
    /// Only a bad record can be skipped; everything else aborts a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FilterError::MalformedRecord(_))
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        FilterError::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for FilterError {
    fn from(err: base64::DecodeError) -> Self {
        FilterError::MalformedRecord(format!("invalid base64 payload: {err}"))
    }
}
