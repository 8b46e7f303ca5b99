use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::DEFAULT_CONTENT_TYPE;
use crate::error::FlightError;
use crate::options::{EncodeOptions, OnError};
use crate::runtime::{FlightStream, encode};
use crate::types::Value;

/// Server-level settings layered under the per-call [`EncodeOptions`].
#[derive(Clone, Default)]
pub struct ServerOptions {
    pub on_error: Option<OnError>,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&FlightError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions").field("on_error", &self.on_error.is_some()).finish()
    }
}

/// Encodes `value` with the server options merged under the encode options;
/// hooks set on `encode_options` win.
pub fn render_to_stream(
    value: impl Into<Value>,
    encode_options: EncodeOptions,
    options: ServerOptions,
) -> FlightStream {
    let mut merged = encode_options;
    if merged.on_error.is_none() {
        merged.on_error = options.on_error;
    }
    encode(value, merged)
}

/// Encodes `value` into an HTTP response whose content type comes from
/// `encode_options.config`.
pub fn render_to_response(
    value: impl Into<Value>,
    encode_options: EncodeOptions,
    options: ServerOptions,
) -> FlightResponse {
    let content_type = encode_options.config.content_type.clone();
    FlightResponse::new(render_to_stream(value, encode_options, options))
        .with_content_type(content_type)
}

/// Pipes the encoded stream into `writer` and returns the number of bytes
/// written. The writer is flushed once the stream ends.
pub async fn render_to_writer<W>(
    value: impl Into<Value>,
    encode_options: EncodeOptions,
    options: ServerOptions,
    writer: &mut W,
) -> Result<usize, FlightError>
where
    W: AsyncWrite + Unpin,
{
    let mut stream = render_to_stream(value, encode_options, options);
    let mut written = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len();
    }
    writer.flush().await?;

    debug!("Wrote {} bytes of flight data", written);
    Ok(written)
}

/// Streams a [`FlightStream`] as an HTTP response body.
pub struct FlightResponse {
    stream: FlightStream,
    content_type: String,
}

impl FlightResponse {
    pub fn new(stream: FlightStream) -> Self {
        Self { stream, content_type: DEFAULT_CONTENT_TYPE.to_string() }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl IntoResponse for FlightResponse {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type).unwrap_or_else(|_| {
            warn!("Invalid content type {:?}, using {}", self.content_type, DEFAULT_CONTENT_TYPE);
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE)
        });

        let stream = self.stream.map(|chunk| {
            chunk.map_err(|e| {
                warn!("Flight stream failed mid-response: {}", e);
                std::io::Error::other(e.to_string())
            })
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = StatusCode::OK;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, content_type);
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    }
}
