//! Error types for CREMI file operations

use thiserror::Error;

/// Main error type for CREMI operations
#[derive(Error, Debug)]
pub enum CremiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    #[error("Chunked store error: {0}")]
    Store(String),

    #[error("there is no annotation with id {0}")]
    AnnotationNotFound(u64),

    #[error("Dependency missing: {0}")]
    DependencyMissing(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a dataset: {0}")]
    NotADataset(String),

    #[error("Not a group: {0}")]
    NotAGroup(String),

    #[error("Missing attribute '{name}' on {path}")]
    MissingAttribute { path: String, name: String },

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Container opened read-only: {0}")]
    ReadOnly(String),
}

/// Specialized Result type for CREMI operations
pub type Result<T> = std::result::Result<T, CremiError>;

impl From<ndarray::ShapeError> for CremiError {
    fn from(err: ndarray::ShapeError) -> Self {
        CremiError::InvalidDimensions(err.to_string())
    }
}
