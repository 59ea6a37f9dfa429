//! Named parameter lookup with validation, coercion and defaults
//!
//! The HTTP layer hands the pipeline a [`ParamSource`] exposing two
//! namespaces: route segments (`path`) and the query string. Each field is
//! described by a [`FieldSpec`] which says where to look, which validators to
//! run on the raw value, how to coerce it and what to fall back to.
//!
//! ```
//! use rfpdf::params::{extract, formatters, validators, FieldSpec, ParamValue, RequestParams};
//!
//! let params = RequestParams::new().with_query("scale", "1.5");
//! let spec = FieldSpec::query().format(formatters::number);
//! assert_eq!(extract(&params, "scale", &spec).unwrap(), Some(ParamValue::Number(1.5)));
//!
//! let spec = FieldSpec::query().validate(validators::required());
//! assert!(extract(&params, "url", &spec).is_err());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use crate::error::ValidationFailure;

/// Named lookup over the two parameter namespaces of a request
pub trait ParamSource {
    /// Value of a route segment, e.g. `filename` in `/{filename}`
    fn path_param(&self, name: &str) -> Option<&str>;

    /// Value of a query-string parameter
    fn query_param(&self, name: &str) -> Option<&str>;
}

/// Owned [`ParamSource`] built from already-decoded maps
#[derive(Debug, Clone, Default)]
pub struct RequestParams {
    path: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(path: HashMap<String, String>, query: HashMap<String, String>) -> Self {
        Self { path, query }
    }

    pub fn with_path(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }
}

impl ParamSource for RequestParams {
    fn path_param(&self, name: &str) -> Option<&str> {
        self.path.get(name).map(String::as_str)
    }

    fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// A resolved parameter value after coercion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl ParamValue {
    /// Whether the value counts as "not supplied" for default substitution:
    /// the empty string, zero and `false`.
    pub fn is_empty(&self) -> bool {
        match self {
            ParamValue::Text(s) => s.is_empty(),
            ParamValue::Number(n) => *n == 0.0 || n.is_nan(),
            ParamValue::Bool(b) => !*b,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Checks a raw value; returns the failure reason or `None` when it passes.
///
/// Arguments are the raw value (absent when the parameter was not supplied)
/// and the parameter name.
pub type Validator = Arc<dyn Fn(Option<&str>, &str) -> Option<String> + Send + Sync>;

/// Coerces a present, non-empty raw value. The error is the failure reason.
pub type Formatter = fn(&str) -> std::result::Result<ParamValue, String>;

/// How a single parameter is looked up and resolved
#[derive(Clone, Default)]
pub struct FieldSpec {
    pub from_query: bool,
    pub default: Option<ParamValue>,
    pub validators: Vec<Validator>,
    pub formatter: Option<Formatter>,
}

impl FieldSpec {
    /// A field read from the query string
    pub fn query() -> Self {
        Self {
            from_query: true,
            ..Default::default()
        }
    }

    /// A field read from the route segments
    pub fn path() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn format(mut self, formatter: Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }
}

/// Resolved parameters keyed by name. Absent fields have no entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamMap(BTreeMap<String, ParamValue>);

impl ParamMap {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve a single parameter.
///
/// Validators run in order against the raw value and the first failure wins.
/// A missing or empty raw value resolves to the field default without going
/// through the formatter; a formatted value that is itself empty (zero,
/// `false`) also falls back to the default.
pub fn extract<S: ParamSource + ?Sized>(
    source: &S,
    name: &str,
    spec: &FieldSpec,
) -> std::result::Result<Option<ParamValue>, ValidationFailure> {
    let raw = if spec.from_query {
        source.query_param(name)
    } else {
        source.path_param(name)
    };

    if let Some(reason) = spec.validators.iter().find_map(|v| v(raw, name)) {
        return Err(ValidationFailure::field(name, reason));
    }

    let value = match raw {
        Some(raw) if !raw.is_empty() => match spec.formatter {
            Some(format) => format(raw).map_err(|reason| ValidationFailure::field(name, reason))?,
            None => ParamValue::from(raw),
        },
        _ => return Ok(spec.default.clone()),
    };

    if value.is_empty() {
        return Ok(spec.default.clone());
    }
    Ok(Some(value))
}

/// Resolve a table of fields into one [`ParamMap`].
///
/// Fields that resolve to nothing are left out of the map. Every field is
/// evaluated; when any fail, the failures of all fields are returned together.
pub fn extract_all<S: ParamSource + ?Sized>(
    source: &S,
    fields: &[(&str, FieldSpec)],
) -> std::result::Result<ParamMap, ValidationFailure> {
    let mut resolved = BTreeMap::new();
    let mut failure = ValidationFailure::default();

    for (name, spec) in fields {
        match extract(source, name, spec) {
            Ok(Some(value)) => {
                resolved.insert((*name).to_string(), value);
            }
            Ok(None) => {}
            Err(err) => failure.merge(err),
        }
    }

    if failure.is_empty() {
        Ok(ParamMap(resolved))
    } else {
        Err(failure)
    }
}

/// Built-in validators
pub mod validators {
    use super::Validator;
    use std::sync::Arc;

    /// Fails with `Required value` when the value is missing or empty
    pub fn required() -> Validator {
        Arc::new(|value: Option<&str>, _name: &str| match value {
            Some(v) if !v.is_empty() => None,
            _ => Some("Required value".to_string()),
        })
    }

    /// Fails when a supplied value is not one of `allowed`
    pub fn one_of<I, S>(allowed: I) -> Validator
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        let reason = format!("Must be one of {}", allowed.join(" | "));
        Arc::new(move |value: Option<&str>, _name: &str| match value {
            Some(v) if !v.is_empty() && !allowed.iter().any(|a| a == v) => Some(reason.clone()),
            _ => None,
        })
    }

    /// Fails when a supplied value contains control characters, which cannot
    /// travel in a response header
    pub fn printable() -> Validator {
        Arc::new(|value: Option<&str>, _name: &str| match value {
            Some(v) if v.chars().any(char::is_control) => Some("Must not contain control characters".to_string()),
            _ => None,
        })
    }
}

/// Built-in formatters
pub mod formatters {
    use super::ParamValue;

    /// Identity
    pub fn text(raw: &str) -> Result<ParamValue, String> {
        Ok(ParamValue::Text(raw.to_string()))
    }

    /// Finite decimal number; surrounding whitespace is ignored
    pub fn number(raw: &str) -> Result<ParamValue, String> {
        match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(ParamValue::Number(n)),
            _ => Err("Must be a number".to_string()),
        }
    }

    /// `false`, `0`, `no` and `off` are false; any other value is true
    pub fn boolean(raw: &str) -> Result<ParamValue, String> {
        let lowered = raw.trim().to_ascii_lowercase();
        let value = !matches!(lowered.as_str(), "false" | "0" | "no" | "off");
        Ok(ParamValue::Bool(value))
    }
}
