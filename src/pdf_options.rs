//! PDF capture options built from query parameters

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationFailure;
use crate::params::{extract_all, formatters, validators, FieldSpec, ParamMap, ParamSource};

/// Named paper sizes accepted by the `format` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
}

impl PaperFormat {
    pub const ALL: [PaperFormat; 10] = [
        PaperFormat::Letter,
        PaperFormat::Legal,
        PaperFormat::Tabloid,
        PaperFormat::Ledger,
        PaperFormat::A0,
        PaperFormat::A1,
        PaperFormat::A2,
        PaperFormat::A3,
        PaperFormat::A4,
        PaperFormat::A5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaperFormat::Letter => "Letter",
            PaperFormat::Legal => "Legal",
            PaperFormat::Tabloid => "Tabloid",
            PaperFormat::Ledger => "Ledger",
            PaperFormat::A0 => "A0",
            PaperFormat::A1 => "A1",
            PaperFormat::A2 => "A2",
            PaperFormat::A3 => "A3",
            PaperFormat::A4 => "A4",
            PaperFormat::A5 => "A5",
        }
    }

    /// Paper width and height in inches (portrait)
    pub fn size_inches(&self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
        }
    }
}

impl FromStr for PaperFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaperFormat::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("Unknown paper format: {}", s))
    }
}

impl fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page margins; each side is a unit-suffixed length such as `1cm` or `20px`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Margin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
}

impl Margin {
    /// Parse a CSS-style shorthand of one to four lengths
    /// (`all`, `vertical horizontal`, `top horizontal bottom`, `top right bottom left`).
    pub fn parse_shorthand(s: &str) -> Margin {
        let parts: Vec<String> = s.split_whitespace().map(str::to_string).collect();
        let (top, right, bottom, left) = match parts.as_slice() {
            [] => return Margin::default(),
            [all] => (all, all, all, all),
            [v, h] => (v, h, v, h),
            [t, h, b] => (t, h, b, h),
            [t, r, b, l, ..] => (t, r, b, l),
        };
        Margin {
            top: Some(top.clone()),
            right: Some(right.clone()),
            bottom: Some(bottom.clone()),
            left: Some(left.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.right.is_none() && self.bottom.is_none() && self.left.is_none()
    }
}

/// Options for the PDF capture step.
///
/// Every field is optional; `None` means "use the browser default".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_header_footer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<PaperFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<Margin>,
}

impl PdfOptions {
    /// Paper width and height in inches. Explicit `width`/`height` win over
    /// `format`; a dimension left as `None` keeps the browser default.
    pub fn paper_size_inches(&self) -> Result<(Option<f64>, Option<f64>), String> {
        let (mut width, mut height) = match self.format {
            Some(format) => {
                let (w, h) = format.size_inches();
                (Some(w), Some(h))
            }
            None => (None, None),
        };
        if let Some(w) = &self.width {
            width = Some(length_to_inches(w)?);
        }
        if let Some(h) = &self.height {
            height = Some(length_to_inches(h)?);
        }
        Ok((width, height))
    }

    /// Margins in inches as `(top, right, bottom, left)`
    pub fn margin_inches(&self) -> Result<[Option<f64>; 4], String> {
        let margin = match &self.margin {
            Some(m) => m,
            None => return Ok([None; 4]),
        };
        let convert = |side: &Option<String>| side.as_deref().map(length_to_inches).transpose();
        Ok([
            convert(&margin.top)?,
            convert(&margin.right)?,
            convert(&margin.bottom)?,
            convert(&margin.left)?,
        ])
    }
}

const CSS_PIXELS_PER_INCH: f64 = 96.0;

/// Convert a length such as `210mm`, `8.5in`, `2cm`, `640px` or `640` into
/// inches. Bare numbers are CSS pixels.
pub fn length_to_inches(value: &str) -> Result<f64, String> {
    let text = value.trim();
    let lowered = text.to_ascii_lowercase();
    let (number, pixels_per_unit) = match lowered.get(lowered.len().saturating_sub(2)..) {
        Some("px") => (&text[..text.len() - 2], 1.0),
        Some("in") => (&text[..text.len() - 2], CSS_PIXELS_PER_INCH),
        Some("cm") => (&text[..text.len() - 2], 37.8),
        Some("mm") => (&text[..text.len() - 2], 3.78),
        _ => (text, 1.0),
    };
    match number.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n * pixels_per_unit / CSS_PIXELS_PER_INCH),
        _ => Err(format!("Failed to parse length: {}", value)),
    }
}

const MARGIN_SIDES: [(&str, &str); 4] = [
    ("top", "margin[top]"),
    ("right", "margin[right]"),
    ("bottom", "margin[bottom]"),
    ("left", "margin[left]"),
];

fn pdf_option_fields() -> Vec<(&'static str, FieldSpec)> {
    let mut fields = vec![
        ("scale", FieldSpec::query().format(formatters::number)),
        ("displayHeaderFooter", FieldSpec::query().format(formatters::boolean)),
        ("headerTemplate", FieldSpec::query().format(formatters::text)),
        ("footerTemplate", FieldSpec::query().format(formatters::text)),
        ("printBackground", FieldSpec::query().format(formatters::boolean)),
        ("landscape", FieldSpec::query().format(formatters::boolean)),
        ("pageRanges", FieldSpec::query().format(formatters::text)),
        (
            "format",
            FieldSpec::query().validate(validators::one_of(PaperFormat::ALL.iter().map(|f| f.as_str()))),
        ),
        ("width", FieldSpec::query().format(formatters::text)),
        ("height", FieldSpec::query().format(formatters::text)),
        ("margin", FieldSpec::query().format(formatters::text)),
    ];
    fields.extend(
        MARGIN_SIDES
            .iter()
            .map(|(_, key)| (*key, FieldSpec::query().format(formatters::text))),
    );
    fields
}

/// Build [`PdfOptions`] from the query parameters of a request.
///
/// Unknown `format` values are rejected; parameters that are not supplied are
/// left as `None`.
pub fn build_pdf_options<S: ParamSource + ?Sized>(source: &S) -> Result<PdfOptions, ValidationFailure> {
    let params = extract_all(source, &pdf_option_fields())?;
    Ok(from_params(&params))
}

fn from_params(params: &ParamMap) -> PdfOptions {
    let text = |name: &str| params.get_str(name).map(str::to_string);

    let mut margin = params.get_str("margin").map(Margin::parse_shorthand).unwrap_or_default();
    for (side, key) in MARGIN_SIDES {
        if let Some(value) = text(key) {
            match side {
                "top" => margin.top = Some(value),
                "right" => margin.right = Some(value),
                "bottom" => margin.bottom = Some(value),
                _ => margin.left = Some(value),
            }
        }
    }

    PdfOptions {
        scale: params.get_f64("scale"),
        display_header_footer: params.get_bool("displayHeaderFooter"),
        header_template: text("headerTemplate"),
        footer_template: text("footerTemplate"),
        print_background: params.get_bool("printBackground"),
        landscape: params.get_bool("landscape"),
        page_ranges: text("pageRanges"),
        format: params.get_str("format").and_then(|f| f.parse().ok()),
        width: text("width"),
        height: text("height"),
        margin: if margin.is_empty() { None } else { Some(margin) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RequestParams;

    #[test]
    fn no_parameters_means_browser_defaults() {
        let options = build_pdf_options(&RequestParams::new()).unwrap();
        assert_eq!(options, PdfOptions::default());
        assert_eq!(serde_json::to_value(&options).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn coerces_typed_fields() {
        let params = RequestParams::new()
            .with_query("scale", "0.5")
            .with_query("landscape", "true")
            .with_query("printBackground", "1")
            .with_query("pageRanges", "1-3")
            .with_query("format", "A4");

        let options = build_pdf_options(&params).unwrap();
        assert_eq!(options.scale, Some(0.5));
        assert_eq!(options.landscape, Some(true));
        assert_eq!(options.print_background, Some(true));
        assert_eq!(options.page_ranges.as_deref(), Some("1-3"));
        assert_eq!(options.format, Some(PaperFormat::A4));
        assert_eq!(options.display_header_footer, None);
    }

    #[test]
    fn every_named_format_is_accepted() {
        for format in PaperFormat::ALL {
            let params = RequestParams::new().with_query("format", format.as_str());
            let options = build_pdf_options(&params).unwrap();
            assert_eq!(options.format, Some(format));
        }
    }

    #[test]
    fn unknown_format_lists_allowed_values() {
        let params = RequestParams::new().with_query("format", "B5");
        let err = build_pdf_options(&params).unwrap_err();
        assert_eq!(
            err.reason("format"),
            Some("Must be one of Letter | Legal | Tabloid | Ledger | A0 | A1 | A2 | A3 | A4 | A5")
        );
    }

    #[test]
    fn format_is_case_sensitive() {
        let params = RequestParams::new().with_query("format", "a4");
        assert!(build_pdf_options(&params).is_err());
    }

    #[test]
    fn margin_shorthand_and_sides() {
        let params = RequestParams::new()
            .with_query("margin", "1cm 2cm")
            .with_query("margin[left]", "5mm");

        let margin = build_pdf_options(&params).unwrap().margin.unwrap();
        assert_eq!(margin.top.as_deref(), Some("1cm"));
        assert_eq!(margin.right.as_deref(), Some("2cm"));
        assert_eq!(margin.bottom.as_deref(), Some("1cm"));
        assert_eq!(margin.left.as_deref(), Some("5mm"));
    }

    #[test]
    fn single_side_margin() {
        let params = RequestParams::new().with_query("margin[top]", "1in");
        let margin = build_pdf_options(&params).unwrap().margin.unwrap();
        assert_eq!(margin.top.as_deref(), Some("1in"));
        assert_eq!(margin.bottom, None);
    }

    #[test]
    fn lengths_convert_to_inches() {
        assert_eq!(length_to_inches("96").unwrap(), 1.0);
        assert_eq!(length_to_inches("96px").unwrap(), 1.0);
        assert_eq!(length_to_inches("2in").unwrap(), 2.0);
        assert!((length_to_inches("2.54cm").unwrap() - 1.0).abs() < 0.01);
        assert!((length_to_inches("25.4mm").unwrap() - 1.0).abs() < 0.01);
        assert!(length_to_inches("wide").is_err());
    }

    #[test]
    fn explicit_size_overrides_format() {
        let options = PdfOptions {
            format: Some(PaperFormat::A4),
            width: Some("4in".into()),
            ..Default::default()
        };
        assert_eq!(options.paper_size_inches().unwrap(), (Some(4.0), Some(11.7)));
        assert_eq!(PdfOptions::default().paper_size_inches().unwrap(), (None, None));
    }
}
