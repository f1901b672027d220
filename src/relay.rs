#![forbid(unsafe_code)]

//! Same-origin relay for the catalog front end.
//!
//! `GET /api/proxy?url=<absolute url>` fetches the target with no extra
//! headers and hands back the upstream status, body and content type
//! untouched. Nothing is cached, retried or allow-listed. Anything outside
//! `/api` is served from the optional static asset root so the browser sees
//! a single origin.

use std::{
    io::Read,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use mime_guess::MimeGuess;
use serde::Deserialize;
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

pub const PROXY_ROUTE: &str = "/api/proxy";
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing url")]
    InvalidRequest,
    #[error("upstream fetch error: {0}")]
    Upstream(String),
    #[error("{0}")]
    NotFound(String),
}

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

type RelayResult<T> = Result<T, RelayError>;

/// Shared state injected into the relay handlers.
#[derive(Clone)]
pub struct RelayState {
    agent: ureq::Agent,
    www_root: Option<Arc<PathBuf>>,
}

impl RelayState {
    pub fn new(www_root: Option<PathBuf>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(UPSTREAM_TIMEOUT).build();
        Self {
            agent,
            www_root: www_root.map(Arc::new),
        }
    }
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(PROXY_ROUTE, get(proxy))
        .fallback(static_fallback)
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

pub async fn proxy(
    State(state): State<RelayState>,
    Query(query): Query<ProxyQuery>,
) -> RelayResult<Response> {
    let target = query
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(RelayError::InvalidRequest)?;
    debug!(%target, "relaying request");

    let agent = state.agent.clone();
    let fetched = tokio::task::spawn_blocking(move || fetch_upstream(&agent, &target))
        .await
        .map_err(|err| RelayError::Upstream(err.to_string()))?;

    match fetched {
        Ok(upstream) => Ok(upstream.into_response()),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "upstream request failed");
            Err(RelayError::Upstream(format!("{err:#}")))
        }
    }
}

/// Upstream reply captured in full before it is handed back to the caller.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = self
            .content_type
            .as_deref()
            .and_then(|value| HeaderValue::from_str(value).ok())
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
    }
}

/// Blocking fetch of `target`. Non-2xx replies are returned as data; only
/// transport failures (DNS, refused connection, timeout, bad URL) are errors.
pub fn fetch_upstream(agent: &ureq::Agent, target: &str) -> Result<UpstreamResponse> {
    let response = match agent.get(target).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(err).with_context(|| format!("requesting {target}")),
    };

    let status = response.status();
    let content_type = response
        .header(header::CONTENT_TYPE.as_str())
        .map(str::to_string);
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .with_context(|| format!("reading body from {target}"))?;

    Ok(UpstreamResponse {
        status,
        content_type,
        body,
    })
}

async fn static_fallback(State(state): State<RelayState>, uri: Uri) -> Response {
    let path = uri.path();
    if path == "/api" || path.starts_with("/api/") {
        return RelayError::NotFound("endpoint not found".into()).into_response();
    }
    let Some(root) = state.www_root.as_deref() else {
        return RelayError::NotFound("file not found".into()).into_response();
    };

    match serve_www_path(root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

const INDEX_FILE: &str = "index.html";

async fn serve_www_path(root: &Path, request_path: &str) -> RelayResult<Response> {
    let Some(target) = asset_path(root, request_path) else {
        return Err(RelayError::NotFound("file not found".into()));
    };
    let file = match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_file() => target,
        Ok(_) => root.join(INDEX_FILE),
        Err(_) if is_client_route(request_path) => root.join(INDEX_FILE),
        Err(_) => return Err(RelayError::NotFound("file not found".into())),
    };
    stream_file(file).await
}

/// File under `root` named by `request_path`, or `None` when the path has
/// anything but plain segments (`..`, a root, a prefix). The bare root maps
/// to the index page.
fn asset_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(request_path.trim_start_matches('/')).components() {
        let Component::Normal(segment) = component else {
            return None;
        };
        resolved.push(segment);
    }
    if resolved.as_path() == root {
        resolved.push(INDEX_FILE);
    }
    Some(resolved)
}

// The app's own routes never contain a dot in their last segment.
fn is_client_route(request_path: &str) -> bool {
    request_path
        .rsplit('/')
        .next()
        .is_none_or(|last| !last.contains('.'))
}

async fn stream_file(path: PathBuf) -> RelayResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| RelayError::NotFound("file not found".into()))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
