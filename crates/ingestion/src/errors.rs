//! Ingestion pipeline error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Extraction failed for {file}: {message}")]
    Extraction { file: String, message: String },

    #[error("Unsupported file format: {file}")]
    UnsupportedFormat { file: String },

    #[error("No extractable content in {file}")]
    EmptyContent { file: String },

    #[error("Vector store error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<querybridge_common::errors::AppError> for IngestionError {
    fn from(e: querybridge_common::errors::AppError) -> Self {
        IngestionError::Storage(e.to_string())
    }
}
