//! Defines [`GeoBlobError`], representing all errors returned by this crate.

use std::fmt::Debug;

use arrow_schema::ArrowError;
use datafusion::error::DataFusionError;
use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
pub enum GeoBlobError {
    /// A non-empty blob, text or encoded value could not be decoded into a geometry.
    #[error("parse error: {0}")]
    Parse(String),

    /// The call shape was rejected before any row was processed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The input decoded fine but the requested operation is undefined for it.
    #[error("geometry error: {0}")]
    Geometry(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    DataFusion(#[from] DataFusionError),
}

/// Crate-specific result type.
pub type GeoBlobResult<T> = std::result::Result<T, GeoBlobError>;

impl GeoBlobError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry(message.into())
    }
}

impl From<GeoBlobError> for DataFusionError {
    fn from(value: GeoBlobError) -> Self {
        match value {
            GeoBlobError::Arrow(err) => err.into(),
            GeoBlobError::DataFusion(err) => err,
            GeoBlobError::InvalidArgument(msg) => DataFusionError::Plan(msg),
            err => DataFusionError::External(Box::new(err)),
        }
    }
}
