//! Picking the HTML to render out of a request body
//!
//! The HTTP layer parses the `Content-Type` header into a [`ContentKind`],
//! decodes the body into the [`RequestBody`] shape that kind calls for and
//! hands it over; [`html_from_body`] then takes the HTML out of it.

use std::collections::HashMap;

use crate::engine::check_html_len;
use crate::error::ValidationFailure;

/// Body field holding the document for structured submissions
pub const HTML_FIELD: &str = "html";

/// Parsed request content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    PlainText,
    Json,
    FormUrlEncoded,
    Multipart,
    Other(String),
    Missing,
}

/// How a body of a given [`ContentKind`] has to be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyShape {
    /// The whole body is the document
    RawText,
    /// A JSON object with an `html` member
    JsonObject,
    /// URL-encoded form fields
    Form,
    /// `multipart/form-data` fields
    Multipart,
    /// Nothing to read
    Unsupported,
}

impl ContentKind {
    /// Parse a `Content-Type` header value; parameters such as `charset` are
    /// ignored.
    pub fn parse(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return ContentKind::Missing;
        };
        let essence = header.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "" => ContentKind::Missing,
            "text/html" => ContentKind::Html,
            "text/plain" => ContentKind::PlainText,
            "application/json" => ContentKind::Json,
            "application/x-www-form-urlencoded" => ContentKind::FormUrlEncoded,
            "multipart/form-data" => ContentKind::Multipart,
            _ => ContentKind::Other(essence),
        }
    }

    pub fn shape(&self) -> BodyShape {
        match self {
            ContentKind::Html | ContentKind::PlainText => BodyShape::RawText,
            ContentKind::Json => BodyShape::JsonObject,
            ContentKind::FormUrlEncoded => BodyShape::Form,
            ContentKind::Multipart => BodyShape::Multipart,
            ContentKind::Other(_) | ContentKind::Missing => BodyShape::Unsupported,
        }
    }
}

/// A decoded request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Text(String),
    Fields(HashMap<String, String>),
    Empty,
}

impl RequestBody {
    /// String members of a JSON object. Anything else yields no fields.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => RequestBody::Fields(
                map.into_iter()
                    .filter_map(|(k, v)| match v {
                        serde_json::Value::String(s) => Some((k, s)),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => RequestBody::Empty,
        }
    }
}

/// The document to render, or a failure on the `html` field. Documents too
/// large to navigate to are rejected here, before any page is opened.
pub fn html_from_body(body: RequestBody) -> Result<String, ValidationFailure> {
    let html = match body {
        RequestBody::Text(text) => Some(text),
        RequestBody::Fields(mut fields) => fields.remove(HTML_FIELD),
        RequestBody::Empty => None,
    };
    match html {
        Some(html) if !html.is_empty() => {
            check_html_len(&html)?;
            Ok(html)
        }
        _ => Err(ValidationFailure::field(HTML_FIELD, "Required value")),
    }
}
