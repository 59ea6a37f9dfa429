//! `Content-Disposition` resolution for rendered PDFs

use std::fmt;

use serde::Serialize;

use crate::error::ValidationFailure;
use crate::params::{extract, validators, FieldSpec, ParamSource};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Whether the client should display the PDF or download it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Inline,
    Attachment,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery mode plus the filename taken from the route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentDisposition {
    pub disposition: Disposition,
    pub filename: String,
}

impl ContentDisposition {
    /// Value of the `Content-Disposition` header, e.g. `inline; filename=report.pdf`
    pub fn header_value(&self) -> String {
        format!("{}; filename={}", self.disposition, self.filename)
    }

    /// `Content-Type` and `Content-Disposition` header pairs for the response
    pub fn headers(&self) -> [(&'static str, String); 2] {
        [
            ("Content-Type", PDF_CONTENT_TYPE.to_string()),
            ("Content-Disposition", self.header_value()),
        ]
    }
}

/// Read `disposition` from the query (default `inline`) and pair it with
/// `filename`.
pub fn resolve_disposition<S: ParamSource + ?Sized>(
    source: &S,
    filename: &str,
) -> Result<ContentDisposition, ValidationFailure> {
    let spec = FieldSpec::query()
        .default_value(Disposition::Inline.as_str())
        .validate(validators::one_of([
            Disposition::Inline.as_str(),
            Disposition::Attachment.as_str(),
        ]));

    let disposition = match extract(source, "disposition", &spec)?.as_ref().and_then(|v| v.as_str()) {
        Some("attachment") => Disposition::Attachment,
        _ => Disposition::Inline,
    };

    Ok(ContentDisposition {
        disposition,
        filename: filename.to_string(),
    })
}
