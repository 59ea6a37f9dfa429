//! Request-level orchestration: parameters in, PDF out
//!
//! These are the two operations the HTTP layer calls. Both resolve the
//! disposition and the PDF options up front and report every invalid
//! parameter at once before any page is opened.

use log::info;

use crate::body::{html_from_body, RequestBody};
use crate::disposition::{resolve_disposition, ContentDisposition};
use crate::engine::RenderEngine;
use crate::error::ValidationFailure;
use crate::params::{extract, validators, FieldSpec, ParamSource};
use crate::pdf_options::{build_pdf_options, PdfOptions};
use crate::Result;

/// A rendered document and how to deliver it
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub disposition: ContentDisposition,
    pub pdf: Vec<u8>,
}

struct Prepared {
    disposition: ContentDisposition,
    options: PdfOptions,
}

/// Collect the outcome of each step; all failures are merged into one.
fn collect<T>(result: std::result::Result<T, ValidationFailure>, failure: &mut ValidationFailure) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            failure.merge(err);
            None
        }
    }
}

fn prepare<S: ParamSource + ?Sized>(
    source: &S,
    failure: &mut ValidationFailure,
) -> Option<Prepared> {
    let filename_spec = FieldSpec::path().validate(validators::printable());
    let filename = collect(extract(source, "filename", &filename_spec), failure)
        .flatten()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let disposition = collect(resolve_disposition(source, &filename), failure);
    let options = collect(build_pdf_options(source), failure);

    Some(Prepared {
        disposition: disposition?,
        options: options?,
    })
}

/// `GET /{filename}?url=...`: render the page at the `url` query parameter
pub async fn render_url_request<S>(engine: &RenderEngine, source: &S) -> Result<RenderedPdf>
where
    S: ParamSource + Sync + ?Sized,
{
    let mut failure = ValidationFailure::default();
    let prepared = prepare(source, &mut failure);
    let url = collect(
        extract(source, "url", &FieldSpec::query().validate(validators::required())),
        &mut failure,
    )
    .flatten()
    .and_then(|v| v.as_str().map(str::to_string));

    let (Some(prepared), Some(url), true) = (prepared, url, failure.is_empty()) else {
        return Err(failure.into());
    };

    info!(
        "GET {} {} {}",
        prepared.disposition.filename,
        url,
        serde_json::to_string(&prepared.options).unwrap_or_default()
    );

    let pdf = engine.render_url(&url, &prepared.options).await?;
    Ok(RenderedPdf {
        disposition: prepared.disposition,
        pdf,
    })
}

/// `POST /{filename}`: render the HTML carried by the request body
pub async fn render_html_request<S>(engine: &RenderEngine, source: &S, body: RequestBody) -> Result<RenderedPdf>
where
    S: ParamSource + Sync + ?Sized,
{
    let mut failure = ValidationFailure::default();
    let prepared = prepare(source, &mut failure);
    let html = collect(html_from_body(body), &mut failure);

    let (Some(prepared), Some(html), true) = (prepared, html, failure.is_empty()) else {
        return Err(failure.into());
    };

    info!(
        "POST {} ({} bytes) {}",
        prepared.disposition.filename,
        html.len(),
        serde_json::to_string(&prepared.options).unwrap_or_default()
    );

    let pdf = engine.render_html(&html, &prepared.options).await?;
    Ok(RenderedPdf {
        disposition: prepared.disposition,
        pdf,
    })
}
