use bytes::{Buf, BytesMut};
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::escape::{TUPLE_MARKER, WireString, parse_string};
use super::row::{ROOT_ROW_ID, Row, RowPayload};
use super::{DecodeOutcome, DecodePlugin, Fields};
use crate::error::{FlightError, Rejection};
use crate::types::{Deferred, Marker, Props, Settlement, Value};

pub const CONNECTION_CLOSED: &str = "Connection closed";

struct Slot {
    sender: Option<oneshot::Sender<Settlement>>,
    deferred: Deferred,
}

impl Slot {
    fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let deferred = Deferred::pending(async move {
            receiver.await.unwrap_or_else(|_| Err(Rejection::new(CONNECTION_CLOSED)))
        });
        Self { sender: Some(sender), deferred }
    }

    fn is_settled(&self) -> bool {
        self.sender.is_none()
    }
}

/// Incremental row decoder. Bytes may arrive split at any position; each
/// complete row is revived as soon as its newline is seen, and forward
/// references become pending [`Deferred`] handles until their row arrives.
pub struct Decoder {
    plugins: Vec<Arc<dyn DecodePlugin>>,
    buffer: BytesMut,
    scanned: usize,
    max_row_bytes: usize,
    slots: FxHashMap<u32, Slot>,
    root_seen: bool,
    rows_read: usize,
}

impl Decoder {
    pub fn new(plugins: Vec<Arc<dyn DecodePlugin>>, max_row_bytes: usize) -> Self {
        Self {
            plugins,
            buffer: BytesMut::new(),
            scanned: 0,
            max_row_bytes,
            slots: FxHashMap::default(),
            root_seen: false,
            rows_read: 0,
        }
    }

    pub fn root_seen(&self) -> bool {
        self.root_seen
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    pub fn unsettled(&self) -> usize {
        self.slots.values().filter(|slot| !slot.is_settled()).count()
    }

    /// Consumes a chunk and returns the root settlement if the root row was
    /// completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Settlement>, FlightError> {
        self.buffer.extend_from_slice(chunk);
        let mut root = None;

        while let Some(pos) = self.next_newline() {
            if pos > self.max_row_bytes {
                return Err(FlightError::row_too_large(pos, self.max_row_bytes));
            }
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            self.scanned = 0;

            if let Some(settlement) = self.process_line(&line)? {
                root = Some(settlement);
            }
        }

        if self.buffer.len() > self.max_row_bytes {
            return Err(FlightError::row_too_large(self.buffer.len(), self.max_row_bytes));
        }

        Ok(root)
    }

    /// Finds the next newline without rescanning bytes already known to
    /// contain none.
    fn next_newline(&mut self) -> Option<usize> {
        let found = self.buffer[self.scanned..].iter().position(|b| *b == b'\n');
        match found {
            Some(offset) => Some(self.scanned + offset),
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    /// Processes a trailing row that was not newline-terminated.
    pub fn flush(&mut self) -> Result<Option<Settlement>, FlightError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let line = self.buffer.split();
        self.scanned = 0;
        self.process_line(&line)
    }

    /// Marks the end of input. Every deferred value still waiting for its row
    /// is rejected.
    pub fn finish(&mut self) -> Result<(), FlightError> {
        if !self.root_seen {
            let error = FlightError::malformed("stream ended before the root row");
            self.abort(&error);
            return Err(error);
        }

        let unsettled = self.reject_unsettled(&Rejection::new(CONNECTION_CLOSED));
        if unsettled > 0 {
            warn!("Stream closed with {} unsettled deferred value(s)", unsettled);
            return Err(FlightError::Incomplete(unsettled));
        }

        debug!("Decoded {} row(s)", self.rows_read);
        Ok(())
    }

    /// Rejects every unsettled deferred value with the given error.
    pub fn abort(&mut self, error: &FlightError) {
        let rejected = self.reject_unsettled(&Rejection::from(error));
        if rejected > 0 {
            debug!("Aborted decode with {} unsettled deferred value(s): {}", rejected, error);
        }
    }

    fn reject_unsettled(&mut self, rejection: &Rejection) -> usize {
        let mut count = 0;
        for slot in self.slots.values_mut() {
            if let Some(sender) = slot.sender.take() {
                let _ = sender.send(Err(rejection.clone()));
                count += 1;
            }
        }
        count
    }

    fn process_line(&mut self, line: &[u8]) -> Result<Option<Settlement>, FlightError> {
        let line = std::str::from_utf8(line)
            .map_err(|e| FlightError::malformed(format!("row is not valid UTF-8: {e}")))?;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return Ok(None);
        }

        let row = Row::parse(line)?;
        self.rows_read += 1;
        debug!("Decoding row {} ({:?})", row.id, row.tag());

        let settlement = match row.payload {
            RowPayload::Model(json) => Ok(self.revive(json)?),
            RowPayload::Error(rejection) => Err(rejection),
        };

        if row.id == ROOT_ROW_ID {
            if self.root_seen {
                return Err(FlightError::malformed("duplicate root row"));
            }
            self.root_seen = true;
            return Ok(Some(settlement));
        }

        let slot = self.slots.entry(row.id).or_insert_with(Slot::new);
        let sender = slot
            .sender
            .take()
            .ok_or_else(|| FlightError::malformed(format!("row {} settled twice", row.id)))?;
        let _ = sender.send(settlement);
        Ok(None)
    }

    fn reference(&mut self, id: u32) -> Result<Value, FlightError> {
        if id == ROOT_ROW_ID {
            return Err(FlightError::malformed("forward reference to the root row"));
        }
        let slot = self.slots.entry(id).or_insert_with(Slot::new);
        Ok(Value::Deferred(slot.deferred.clone()))
    }

    fn revive(&mut self, json: JsonValue) -> Result<Value, FlightError> {
        match json {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(b)),
            JsonValue::Number(n) => Ok(Value::Number(n)),
            JsonValue::String(s) => self.revive_string(&s),
            JsonValue::Array(items) => {
                if let Some(JsonValue::String(first)) = items.first()
                    && first == TUPLE_MARKER
                {
                    return self.revive_tuple(items);
                }
                let items = items.into_iter().map(|item| self.revive(item)).collect::<Result<_, _>>()?;
                Ok(Value::Array(items))
            }
            JsonValue::Object(map) => {
                let mut props = Props::new();
                for (key, item) in map {
                    props.insert(key, self.revive(item)?);
                }
                Ok(Value::Object(props))
            }
        }
    }

    fn revive_string(&mut self, raw: &str) -> Result<Value, FlightError> {
        match parse_string(raw) {
            Some(WireString::Plain(s)) | Some(WireString::Escaped(s)) => Ok(Value::String(s.to_string())),
            Some(WireString::Deferred(id)) => self.reference(id),
            Some(WireString::Symbol(name)) => Marker::from_registry_name(name)
                .map(Value::Symbol)
                .ok_or_else(|| FlightError::malformed(format!("unknown symbol '{name}'"))),
            None => Err(FlightError::malformed(format!("unknown reference '{raw}'"))),
        }
    }

    fn revive_tuple(&mut self, items: Vec<JsonValue>) -> Result<Value, FlightError> {
        let mut items = items.into_iter().skip(1);
        let tag = match items.next() {
            Some(JsonValue::String(tag)) => tag,
            other => return Err(FlightError::malformed(format!("tuple without a tag: {other:?}"))),
        };

        let mut fields = Fields::new();
        for item in items {
            fields.push(self.revive(item)?);
        }

        for plugin in &self.plugins {
            match plugin.decode(&tag, fields)? {
                DecodeOutcome::Decoded(value) => return Ok(value),
                DecodeOutcome::Unhandled(returned) => fields = returned,
            }
        }

        Err(FlightError::malformed(format!("unknown tuple tag '{tag}'")))
    }
}
