use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid value for field {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("invalid field spec: {0}")]
    InvalidFieldSpec(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
