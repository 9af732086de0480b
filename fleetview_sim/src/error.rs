//! Harness errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Route file holds no coordinates")]
    EmptyRoute,
}
