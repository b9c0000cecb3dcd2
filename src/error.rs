use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid period '{0}': expected YYYY-MM")]
    InvalidPeriod(String),

    #[error("Missing category {category} for period {period}")]
    MissingCategory { period: String, category: String },

    #[error("Insufficient history: {required} usable observations required, {available} available")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Invalid forecast horizon {0}: must be at least 1")]
    InvalidHorizon(usize),

    #[error("Non-finite observation for period {0}")]
    NonFiniteObservation(String),

    #[error("Regression system is singular: {0}")]
    SingularModel(String),

    #[error("Invalid node reference: {0}")]
    InvalidNode(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Document '{document}' could not be processed: {details}")]
    DocumentError { document: String, details: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
