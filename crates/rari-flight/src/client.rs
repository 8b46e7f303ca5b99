use futures::Stream;
use http::StatusCode;
use std::future::Future;
use tracing::{Instrument, debug, error};

use crate::error::FlightError;
use crate::options::DecodeOptions;
use crate::runtime::{Decoded, decode};
use crate::types::Value;

/// Decodes an already-open byte stream and returns the root value.
///
/// Failures of the rest of the stream are logged rather than returned; they
/// surface to the tree through the rejected placeholders they leave behind.
pub async fn create_from_stream<S, B, E>(stream: S, options: DecodeOptions) -> Result<Value, FlightError>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<FlightError> + Send + 'static,
{
    let Decoded { value, done } = decode(stream, options).await?;

    tokio::spawn(
        async move {
            if let Err(e) = done.await {
                error!("Flight stream failed after the root value was delivered: {}", e);
            }
        }
        .in_current_span(),
    );

    Ok(value)
}

/// Awaits a pending HTTP response and decodes its body.
pub async fn create_from_fetch<F>(response: F, options: DecodeOptions) -> Result<Value, FlightError>
where
    F: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let response = response.await?;
    let status = response.status();

    if !has_readable_body(&response) {
        return Err(FlightError::network(format!("Response body is not readable (status {status})")));
    }
    if !status.is_success() {
        return Err(FlightError::network(format!("Request failed with status {status}")));
    }

    debug!("Decoding flight response from {}", response.url());
    create_from_stream(response.bytes_stream(), options).await
}

fn has_readable_body(response: &reqwest::Response) -> bool {
    if matches!(response.status(), StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED) {
        return false;
    }
    response.content_length() != Some(0)
}
