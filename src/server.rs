//! HTTP front-end
//!
//! A thin adapter over [`crate::request`]: route segments and the query string
//! become [`RequestParams`], the body is decoded according to its parsed
//! content type and failures are turned into responses by [`crate::report`].
//!
//! | route | |
//! |---|---|
//! | `GET /{filename}?url=...` | render a URL |
//! | `POST /{filename}` | render the HTML in the body |
//! | anything else | `404: Not Found` |

use std::collections::HashMap;
use std::future::Future;

use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use log::{debug, info};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::body::{BodyShape, ContentKind, RequestBody, HTML_FIELD};
use crate::engine::RenderEngine;
use crate::error::{Error, ValidationFailure};
use crate::params::RequestParams;
use crate::report::{report, ErrorReport};
use crate::request::{render_html_request, render_url_request, RenderedPdf};

/// Largest accepted request body. Form and JSON encodings carry overhead;
/// the HTML itself is capped at [`crate::engine::MAX_HTML_BYTES`].
pub const BODY_LIMIT: usize = 10_000_000;

/// Where the server listens
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: RenderEngine,
}

/// Build the router (shared between `serve` and tests)
pub fn router(engine: RenderEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/{filename}",
            get(render_url_handler).post(render_html_handler).fallback(not_found),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .with_state(AppState { engine })
}

/// Serve until `shutdown` resolves. Once it does, the engine stops taking
/// new renders and in-flight requests are drained.
pub async fn serve<F>(listener: TcpListener, engine: RenderEngine, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("server started at: {}", listener.local_addr()?);

    let app = router(engine.clone());
    let signal = async move {
        shutdown.await;
        info!("shutdown requested");
        engine.shutdown();
    };

    axum::serve(listener, app).with_graceful_shutdown(signal).await
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn request_params(filename: String, query: HashMap<String, String>) -> RequestParams {
    RequestParams::from_parts(HashMap::from([("filename".to_string(), filename)]), query)
}

fn respond(result: crate::Result<RenderedPdf>) -> Response {
    match result {
        Ok(rendered) => (rendered.disposition.headers(), rendered.pdf).into_response(),
        Err(err) => report(&err).into_response(),
    }
}

async fn render_url_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let params = request_params(filename, query);
    respond(render_url_request(&state.engine, &params).await)
}

async fn render_html_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> Response {
    let params = request_params(filename, query);
    let kind = ContentKind::parse(
        request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );

    let body = match read_body(&kind, request).await {
        Ok(body) => body,
        Err(failure) => return report(&Error::BadRequest(failure)).into_response(),
    };
    respond(render_html_request(&state.engine, &params, body).await)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404: Not Found")
}

fn body_rejected(reason: String) -> ValidationFailure {
    ValidationFailure::field(HTML_FIELD, reason)
}

async fn read_body(kind: &ContentKind, request: Request) -> Result<RequestBody, ValidationFailure> {
    match kind.shape() {
        BodyShape::RawText => String::from_request(request, &())
            .await
            .map(RequestBody::Text)
            .map_err(|e| body_rejected(e.body_text())),
        BodyShape::JsonObject => Json::<serde_json::Value>::from_request(request, &())
            .await
            .map(|Json(value)| RequestBody::from_json(value))
            .map_err(|e| body_rejected(e.body_text())),
        BodyShape::Form => Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map(|Form(fields)| RequestBody::Fields(fields))
            .map_err(|e| body_rejected(e.body_text())),
        BodyShape::Multipart => read_multipart(request).await,
        BodyShape::Unsupported => {
            debug!("no document in body with content type {:?}", kind);
            Ok(RequestBody::Empty)
        }
    }
}

/// Text fields of a multipart submission. File parts are skipped.
async fn read_multipart(request: Request) -> Result<RequestBody, ValidationFailure> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| body_rejected(e.body_text()))?;

    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| body_rejected(e.body_text()))? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(|e| body_rejected(e.body_text()))?;
        fields.insert(name, value);
    }
    Ok(RequestBody::Fields(fields))
}
