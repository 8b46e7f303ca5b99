use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::escape::{TUPLE_MARKER, deferred_ref, escape_string, symbol_ref};
use super::row::{ROOT_ROW_ID, Row};
use super::{EncodePlugin, PluginTuple};
use crate::error::FlightError;
use crate::types::{Deferred, Settlement, Value};

type PendingSettlement = BoxFuture<'static, (u32, Settlement)>;

/// Serializes a value tree into rows, appending a row for every deferred
/// value as it settles.
pub struct Encoder {
    plugins: Vec<Arc<dyn EncodePlugin>>,
    max_row_bytes: usize,
    next_row_id: u32,
    /// Holds each handle so its address cannot be reused by a later deferred
    /// value while the encode is running.
    assigned: FxHashMap<usize, (u32, Deferred)>,
    pending: FuturesUnordered<PendingSettlement>,
    rows_written: usize,
}

impl Encoder {
    pub fn new(plugins: Vec<Arc<dyn EncodePlugin>>, max_row_bytes: usize) -> Self {
        Self {
            plugins,
            max_row_bytes,
            next_row_id: ROOT_ROW_ID + 1,
            assigned: FxHashMap::default(),
            pending: FuturesUnordered::new(),
            rows_written: 0,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Encodes one row. Serializing the value may discover further deferred
    /// values, which are queued for later rows.
    pub fn encode_row(&mut self, id: u32, settlement: Settlement) -> Result<String, FlightError> {
        let row = match settlement {
            Ok(value) => Row::model(id, self.serialize(&value)?),
            Err(rejection) => {
                warn!("Deferred value {} rejected: {}", id, rejection);
                Row::error(id, rejection)
            }
        };
        let line = row.to_line()?;
        let len = line.len() - 1;
        if len > self.max_row_bytes {
            return Err(FlightError::row_too_large(len, self.max_row_bytes));
        }
        self.rows_written += 1;
        Ok(line)
    }

    /// Waits for the next queued deferred value to settle, in completion order.
    pub async fn next_settled(&mut self) -> Option<(u32, Settlement)> {
        self.pending.next().await
    }

    pub fn serialize(&mut self, value: &Value) -> Result<JsonValue, FlightError> {
        match value {
            Value::Null => Ok(JsonValue::Null),
            Value::Bool(b) => Ok(JsonValue::Bool(*b)),
            Value::Number(n) => Ok(JsonValue::Number(n.clone())),
            Value::String(s) => Ok(JsonValue::String(escape_string(s))),
            Value::Array(items) => {
                let items = items.iter().map(|item| self.serialize(item)).collect::<Result<_, _>>()?;
                Ok(JsonValue::Array(items))
            }
            Value::Object(props) => {
                let mut map = serde_json::Map::new();
                for (key, item) in props {
                    map.insert(key.clone(), self.serialize(item)?);
                }
                Ok(JsonValue::Object(map))
            }
            Value::Symbol(marker) => Ok(JsonValue::String(symbol_ref(marker.registry_name()))),
            Value::Deferred(deferred) => {
                let id = self.reference_deferred(deferred);
                Ok(JsonValue::String(deferred_ref(id)))
            }
            other => self.serialize_with_plugins(other),
        }
    }

    fn serialize_with_plugins(&mut self, value: &Value) -> Result<JsonValue, FlightError> {
        let plugins: Vec<Arc<dyn EncodePlugin>> = self.plugins.iter().map(Arc::clone).collect();
        for plugin in plugins {
            if let Some(tuple) = plugin.encode(value)? {
                return self.serialize_tuple(tuple);
            }
        }
        Err(FlightError::not_serializable(format!("no plugin handles a {}", value.type_name())))
    }

    fn serialize_tuple(&mut self, tuple: PluginTuple) -> Result<JsonValue, FlightError> {
        let mut encoded = Vec::with_capacity(tuple.fields.len() + 2);
        encoded.push(JsonValue::String(TUPLE_MARKER.to_string()));
        encoded.push(JsonValue::String(tuple.tag));
        for field in &tuple.fields {
            encoded.push(self.serialize(field)?);
        }
        Ok(JsonValue::Array(encoded))
    }

    /// Assigns a row id to a deferred value, reusing the id when the same
    /// handle is referenced again.
    fn reference_deferred(&mut self, deferred: &Deferred) -> u32 {
        if let Some((id, _)) = self.assigned.get(&deferred.id()) {
            return *id;
        }

        let id = self.next_row_id;
        self.next_row_id += 1;
        self.assigned.insert(deferred.id(), (id, deferred.clone()));

        let settle = deferred.settle();
        self.pending.push(settle.map(move |settlement| (id, settlement)).boxed());
        id
    }

    /// Drives the whole encode: the root row first, then one row per deferred
    /// value as it settles. Structural errors end the stream with an error item;
    /// cancellation ends it with [`FlightError::Cancelled`] and drops in-flight
    /// settlements.
    pub fn into_stream(
        mut self,
        root: Value,
        cancel: Option<CancellationToken>,
    ) -> impl Stream<Item = Result<Bytes, FlightError>> + Send + 'static {
        let cancel = cancel.unwrap_or_default();

        async_stream::stream! {
            if cancel.is_cancelled() {
                yield Err(FlightError::Cancelled);
                return;
            }

            match self.encode_row(ROOT_ROW_ID, Ok(root)) {
                Ok(line) => yield Ok(Bytes::from(line)),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }

            while self.has_pending() {
                let settled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    settled = self.next_settled() => settled,
                };

                let Some((id, settlement)) = settled else {
                    debug!("Encode cancelled with {} pending row(s)", self.pending.len());
                    yield Err(FlightError::Cancelled);
                    return;
                };

                match self.encode_row(id, settlement) {
                    Ok(line) => yield Ok(Bytes::from(line)),
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            debug!("Encoded {} row(s)", self.rows_written());
        }
    }
}
