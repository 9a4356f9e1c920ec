#[cfg(feature = "python")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

use crate::model::{CanalId, Level};

pub type Result<T> = std::result::Result<T, TurnError>;

#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Missing table: {0}")]
    MissingTable(&'static str),

    #[error("Missing column '{column}' in table '{table}'")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    #[error("Zero irrigation area at {level} level (id {id})")]
    ZeroArea { level: Level, id: String },

    #[error("No mode entry for canal {canal}")]
    InvalidMode { canal: CanalId },

    #[error("Ambiguous delivery priority for canal {canal}: {value}")]
    AmbiguousPriority { canal: CanalId, value: String },

    #[error("Inconsistent hierarchy: {0}")]
    InconsistentHierarchy(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "python")]
impl From<TurnError> for PyErr {
    fn from(err: TurnError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
