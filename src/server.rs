//! HTTP front end: `POST /generate_palette`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Form, FromRequest, Multipart, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PaletteError, Result};
use crate::{HueDistance, NumColors, PaletteEntry, PaletteOptions, extract_palette_bytes};

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; img-src 'self' https:; script-src 'self'; style-src 'self' 'unsafe-inline';";

const INVALID_URL: &str = "Invalid image URL.";
const MISSING_SOURCE: &str = "Missing image source: provide image_url or an image upload.";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Width images are reduced to before quantization; 0 disables resizing.
    pub resize_width: u32,
    /// Cap on request bodies and on fetched images.
    pub max_upload_bytes: usize,
    pub fetch_timeout: Duration,
    /// Route image fetches through the proxies named in the environment.
    pub use_system_proxy: bool,
    pub hue_distance: HueDistance,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            resize_width: crate::DEFAULT_RESIZE_WIDTH,
            max_upload_bytes: 10 * 1024 * 1024,
            fetch_timeout: Duration::from_secs(30),
            use_system_proxy: true,
            hue_distance: HueDistance::Linear,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn palette_options(&self) -> PaletteOptions {
        PaletteOptions {
            resize_width: (self.resize_width > 0).then_some(self.resize_width),
            hue_distance: self.hue_distance,
            ..PaletteOptions::default()
        }
    }
}

/// Per-process, read-only request context.
struct AppState {
    options: PaletteOptions,
    client: reqwest::Client,
    max_fetch_bytes: usize,
}

/// Build the router for `cfg`.
pub fn app(cfg: &ServerConfig) -> anyhow::Result<Router> {
    let mut builder = reqwest::Client::builder().timeout(cfg.fetch_timeout);
    if !cfg.use_system_proxy {
        builder = builder.no_proxy();
    }
    let client = builder.build()?;
    let state = Arc::new(AppState {
        options: cfg.palette_options(),
        client,
        max_fetch_bytes: cfg.max_upload_bytes,
    });

    Ok(Router::new()
        .route("/generate_palette", post(generate_palette))
        .route("/healthz", get(|| async { "ok" }))
        .fallback(|| async { (StatusCode::NOT_FOUND, Json(ErrorBody { error: "Not found.".into() })) })
        .layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(middleware::from_fn(security_headers))
        .with_state(state))
}

/// Bind and serve until the process is stopped.
pub async fn serve(cfg: ServerConfig) -> anyhow::Result<()> {
    let router = app(&cfg)?;
    let bind_addr = cfg.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("API running on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

/// CORS and CSP on every response; preflight requests end here.
async fn security_headers(req: Request, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = resp.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CONTENT_SECURITY_POLICY));
    resp
}

// ------------------------------------------------------------
// Request bodies
// ------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct FormBody {
    image_url: Option<String>,
    num_colors: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonBody {
    image_url: Option<String>,
    #[serde(default)]
    num_colors: serde_json::Value,
}

/// Fields common to every accepted body encoding.
#[derive(Debug, Default)]
struct PaletteRequest {
    image_url: Option<String>,
    num_colors: Option<String>,
    upload: Option<Bytes>,
}

impl From<FormBody> for PaletteRequest {
    fn from(body: FormBody) -> Self {
        Self { image_url: body.image_url, num_colors: body.num_colors, upload: None }
    }
}

impl From<JsonBody> for PaletteRequest {
    fn from(body: JsonBody) -> Self {
        let num_colors = match body.num_colors {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };
        Self { image_url: body.image_url, num_colors, upload: None }
    }
}

enum ImageSource {
    Upload(Bytes),
    Url(String),
}

impl PaletteRequest {
    async fn extract(req: Request) -> Result<Self> {
        let content_type = content_type(req.headers());
        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, &())
                .await
                .map_err(|e| PaletteError::Validation(e.body_text()))?;
            Self::from_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<JsonBody>::from_request(req, &())
                .await
                .map_err(|e| PaletteError::Validation(e.body_text()))?;
            Ok(body.into())
        } else {
            let Form(body) = Form::<FormBody>::from_request(req, &())
                .await
                .map_err(|e| PaletteError::Validation(e.body_text()))?;
            Ok(body.into())
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut out = PaletteRequest::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| PaletteError::Validation(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_owned();
            let is_file = field.file_name().is_some();
            if is_file || name == "image" {
                let data = field.bytes().await.map_err(|e| PaletteError::Validation(e.body_text()))?;
                // browsers send an empty part when no file was chosen
                if !data.is_empty() {
                    out.upload = Some(data);
                }
                continue;
            }
            let text = field.text().await.map_err(|e| PaletteError::Validation(e.body_text()))?;
            match name.as_str() {
                "image_url" => out.image_url = Some(text),
                "num_colors" => out.num_colors = Some(text),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Check the image source first, then the color count.
    fn validate(self) -> Result<(ImageSource, NumColors)> {
        let url = self.image_url.map(|u| u.trim().to_owned()).filter(|u| !u.is_empty());
        let source = match (self.upload, url) {
            (Some(bytes), _) => ImageSource::Upload(bytes),
            (None, Some(url)) if is_valid_image_url(&url) => ImageSource::Url(url),
            (None, Some(_)) => return Err(PaletteError::Validation(INVALID_URL.into())),
            (None, None) => return Err(PaletteError::Validation(MISSING_SOURCE.into())),
        };
        let num_colors = parse_num_colors(self.num_colors.as_deref())?;
        Ok((source, num_colors))
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Absent or blank means the default.
fn parse_num_colors(raw: Option<&str>) -> Result<NumColors> {
    match raw.map(str::trim) {
        None | Some("") => Ok(NumColors::default()),
        Some(s) => match s.parse::<i64>() {
            Ok(n) => NumColors::try_from(n),
            Err(_) => NumColors::new(0),
        },
    }
}

/// `^https?://[^\s/$.?#].[^\s]*$`
pub fn is_valid_image_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    let Some(rest) = rest else {
        return false;
    };
    let mut chars = rest.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if first.is_whitespace() || "/$.?#".contains(first) {
        return false;
    }
    match chars.next() {
        Some(c) if !matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}') => {}
        _ => return false,
    }
    chars.all(|c| !c.is_whitespace())
}

// ------------------------------------------------------------
// Handler
// ------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PaletteResponse {
    palette: Vec<PaletteEntry>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps pipeline errors to HTTP; details stay in the server log.
#[derive(Debug)]
pub struct ApiError(PaletteError);

impl From<PaletteError> for ApiError {
    fn from(e: PaletteError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            warn!("rejected palette request: {}", self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!("Error during palette generation: {:?}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

async fn generate_palette(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> std::result::Result<Json<PaletteResponse>, ApiError> {
    let (source, num_colors) = PaletteRequest::extract(req).await?.validate()?;

    let (bytes, origin) = match source {
        ImageSource::Upload(bytes) => (bytes, "upload".to_owned()),
        ImageSource::Url(url) => (fetch_image(&state, &url).await?, url),
    };

    let options = state.options.clone();
    let palette = tokio::task::spawn_blocking(move || extract_palette_bytes(&bytes, num_colors, &options))
        .await
        .map_err(|e| PaletteError::Worker(e.to_string()))??;

    info!("generated {} colors from {}", palette.len(), origin);
    Ok(Json(PaletteResponse { palette }))
}

async fn fetch_image(state: &AppState, url: &str) -> Result<Bytes> {
    let mut resp = state
        .client
        .get(url)
        .send()
        .await
        .map_err(|e| PaletteError::Fetch(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(PaletteError::Fetch(
            status.canonical_reason().unwrap_or(status.as_str()).to_owned(),
        ));
    }
    if resp.content_length().is_some_and(|len| len > state.max_fetch_bytes as u64) {
        return Err(PaletteError::Fetch(format!("image larger than {} bytes", state.max_fetch_bytes)));
    }

    // chunked responses carry no length, so the cap is enforced while reading
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(|e| PaletteError::Fetch(e.to_string()))? {
        if body.len() + chunk.len() > state.max_fetch_bytes {
            return Err(PaletteError::Fetch(format!("image larger than {} bytes", state.max_fetch_bytes)));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pattern_matches_reference_behaviour() {
        assert!(is_valid_image_url("https://example.com/cat.png"));
        assert!(is_valid_image_url("http://a.b"));
        assert!(!is_valid_image_url("not-a-url"));
        assert!(!is_valid_image_url("ftp://example.com/x.png"));
        assert!(!is_valid_image_url("https://"));
        assert!(!is_valid_image_url("https://.example.com"));
        assert!(!is_valid_image_url("https://e"));
        assert!(!is_valid_image_url("https://example.com/with space.png"));
    }

    #[test]
    fn num_colors_defaults_and_bounds() {
        assert_eq!(parse_num_colors(None).unwrap().get(), 16);
        assert_eq!(parse_num_colors(Some("  ")).unwrap().get(), 16);
        assert_eq!(parse_num_colors(Some("7")).unwrap().get(), 7);
        assert!(parse_num_colors(Some("0")).is_err());
        assert!(parse_num_colors(Some("101")).is_err());
        assert!(parse_num_colors(Some("eight")).is_err());
    }

    #[test]
    fn upload_wins_over_url() {
        let req = PaletteRequest {
            image_url: Some("not-a-url".into()),
            num_colors: None,
            upload: Some(Bytes::from_static(b"png")),
        };
        let (source, _) = req.validate().unwrap();
        assert!(matches!(source, ImageSource::Upload(_)));
    }

    #[test]
    fn missing_source_is_rejected() {
        let err = PaletteRequest::default().validate().err().unwrap();
        assert_eq!(err.to_string(), MISSING_SOURCE);
    }

    #[test]
    fn json_numbers_and_strings_are_accepted() {
        let body: JsonBody = serde_json::from_str(r#"{"image_url":"https://x.io/a.png","num_colors":8}"#).unwrap();
        assert_eq!(PaletteRequest::from(body).num_colors.as_deref(), Some("8"));
        let body: JsonBody = serde_json::from_str(r#"{"image_url":"https://x.io/a.png","num_colors":"9"}"#).unwrap();
        assert_eq!(PaletteRequest::from(body).num_colors.as_deref(), Some("9"));
        let body: JsonBody = serde_json::from_str(r#"{"image_url":"https://x.io/a.png"}"#).unwrap();
        assert_eq!(PaletteRequest::from(body).num_colors, None);
    }
}
