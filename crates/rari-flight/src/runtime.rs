use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error};

use crate::codec::{DecodePlugin, Decoder, EncodePlugin, Encoder};
use crate::error::FlightError;
use crate::options::{DecodeOptions, EncodeOptions};
use crate::plugins::{FlightDecodePlugin, FlightEncodePlugin};
use crate::types::{Settlement, Value};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FlightError>> + Send>>;

/// Encoded rows of a component tree, one chunk per row.
pub struct FlightStream {
    inner: ByteStream,
}

impl FlightStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, FlightError>> + Send + 'static,
    {
        Self { inner: Box::pin(stream) }
    }

    /// Drains the stream into one buffer, failing on the first error item.
    pub async fn collect_bytes(mut self) -> Result<Vec<u8>, FlightError> {
        let mut buffer = Vec::new();
        while let Some(chunk) = self.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer)
    }
}

impl Stream for FlightStream {
    type Item = Result<Bytes, FlightError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for FlightStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightStream").finish_non_exhaustive()
    }
}

/// Encodes a tree into a row stream.
///
/// Component invocations happen while the row that contains them is
/// serialized; their failures are reported through `on_error` and streamed as
/// rejections. Configuration and structural errors, including rows larger
/// than the configured `max_row_bytes`, are reported too, then end the stream
/// with an error item.
pub fn encode(value: impl Into<Value>, options: EncodeOptions) -> FlightStream {
    let plugin: Arc<dyn EncodePlugin> = Arc::new(FlightEncodePlugin::new(&options));
    let encoder = Encoder::new(vec![plugin], options.config.max_row_bytes);
    let rows = encoder.into_stream(value.into(), options.cancel.clone());

    FlightStream::new(rows.inspect(move |item| {
        if let Err(error) = item
            && !matches!(error, FlightError::Cancelled)
        {
            error!("Encode failed: {}", error);
            options.report(error);
        }
    }))
}

/// Completion signal of a decode: settles once the whole stream has been
/// consumed and every deferred value in it has settled.
pub struct Completion {
    handle: JoinHandle<Result<(), FlightError>>,
}

impl Future for Completion {
    type Output = Result<(), FlightError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(FlightError::TaskFailed(e.to_string())),
        })
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").field("finished", &self.handle.is_finished()).finish()
    }
}

#[derive(Debug)]
pub struct Decoded {
    pub value: Value,
    pub done: Completion,
}

/// Decodes a row stream. Returns as soon as the root row has been revived;
/// the rest of the stream keeps being consumed in the background.
///
/// A rejected root row fails with [`FlightError::Rejected`]. Configuration
/// and structural errors abort the decode: deferred values still pending are
/// rejected and `done` resolves to the error.
pub async fn decode<S, B, E>(stream: S, options: DecodeOptions) -> Result<Decoded, FlightError>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<FlightError> + Send + 'static,
{
    let plugin: Arc<dyn DecodePlugin> = Arc::new(FlightDecodePlugin::new(&options));
    let decoder = Decoder::new(vec![plugin], options.config.max_row_bytes);
    let (root_tx, root_rx) = oneshot::channel();

    debug!("Starting decode");
    let handle = tokio::spawn(drive(stream, decoder, root_tx).in_current_span());

    let value = root_rx
        .await
        .map_err(|_| FlightError::malformed("decoder stopped before the root row"))??;

    Ok(Decoded { value, done: Completion { handle } })
}

type RootSender = Option<oneshot::Sender<Result<Value, FlightError>>>;

async fn drive<S, B, E>(
    stream: S,
    mut decoder: Decoder,
    root_tx: oneshot::Sender<Result<Value, FlightError>>,
) -> Result<(), FlightError>
where
    S: Stream<Item = Result<B, E>> + Send,
    B: AsRef<[u8]> + Send,
    E: Into<FlightError> + Send,
{
    let mut root_tx = Some(root_tx);
    let result = pump(stream, &mut decoder, &mut root_tx).await;

    if let Err(error) = &result {
        decoder.abort(error);
        if let Some(tx) = root_tx.take() {
            let _ = tx.send(Err(error.clone()));
        }
    }
    result
}

async fn pump<S, B, E>(stream: S, decoder: &mut Decoder, root_tx: &mut RootSender) -> Result<(), FlightError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<FlightError>,
{
    let mut stream = pin!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::<FlightError>::into)?;
        if let Some(root) = decoder.feed(chunk.as_ref())? {
            deliver_root(root_tx, root);
        }
    }

    if let Some(root) = decoder.flush()? {
        deliver_root(root_tx, root);
    }
    decoder.finish()
}

fn deliver_root(root_tx: &mut RootSender, root: Settlement) {
    if let Some(tx) = root_tx.take() {
        let _ = tx.send(root.map_err(FlightError::Rejected));
    }
}
