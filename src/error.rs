//! Error types for the rendering pipeline

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while turning a request into a PDF
#[derive(Error, Debug)]
pub enum Error {
    /// One or more request parameters were rejected
    #[error("Bad request: {0}")]
    BadRequest(ValidationFailure),

    /// Failed to launch or connect to the browser
    #[error("Browser initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Failed to capture the PDF
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The engine is not accepting renders (not started or shutting down)
    #[error("Render engine is not ready")]
    NotReady,

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<ValidationFailure> for Error {
    fn from(failure: ValidationFailure) -> Self {
        Error::BadRequest(failure)
    }
}

/// Field-addressed validation failures, keyed by parameter name.
///
/// Serializes as a flat JSON object, e.g. `{"format": "Must be one of ..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationFailure {
    fields: BTreeMap<String, String>,
}

impl ValidationFailure {
    /// A failure for a single field
    pub fn field(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.into(), reason.into());
        Self { fields }
    }

    /// Fold another failure into this one. An existing reason for a field wins.
    pub fn merge(&mut self, other: ValidationFailure) {
        for (name, reason) in other.fields {
            self.fields.entry(name).or_insert(reason);
        }
    }

    /// Reason recorded for `name`, if any
    pub fn reason(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, reason) in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, reason)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}
