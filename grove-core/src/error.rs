//! Error types for the choreography engine.

use thiserror::Error;

use crate::types::ElementId;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An id that the registry does not hold. This is an integration bug and
    /// is never retried.
    #[error("unknown scene element: {0}")]
    UnknownElement(ElementId),

    #[error("render surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("config file error: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        EngineError::Configuration(message.into())
    }
}

/// Rejection reported by a [`crate::surface::RenderSurface`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("surface rejected {operation}: {reason}")]
pub struct SurfaceError {
    pub operation: &'static str,
    pub reason: String,
}

impl SurfaceError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}
