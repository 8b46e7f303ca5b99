//! Plugin-extensible streaming value codec.
//!
//! Values the codec cannot represent natively are handed to plugins, which
//! reduce them to tagged tuples of simpler values (encode) or rebuild them from
//! such tuples (decode). Deferred values travel as forward references that are
//! settled by later rows.

use smallvec::SmallVec;

use crate::error::FlightError;
use crate::types::Value;

pub mod decoder;
pub mod encoder;
pub mod escape;
pub mod row;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use row::{ROOT_ROW_ID, Row, RowPayload, RowTag};

pub type Fields = SmallVec<[Value; 4]>;

#[derive(Debug, Clone, PartialEq)]
pub struct PluginTuple {
    pub tag: String,
    pub fields: Fields,
}

impl PluginTuple {
    pub fn new(tag: impl Into<String>, fields: impl IntoIterator<Item = Value>) -> Self {
        Self { tag: tag.into(), fields: fields.into_iter().collect() }
    }
}

pub trait EncodePlugin: Send + Sync {
    /// Returns `Ok(None)` for values this plugin does not handle.
    fn encode(&self, value: &Value) -> Result<Option<PluginTuple>, FlightError>;
}

#[derive(Debug)]
pub enum DecodeOutcome {
    Decoded(Value),
    /// Hands the fields back so the next plugin can try.
    Unhandled(Fields),
}

pub trait DecodePlugin: Send + Sync {
    fn decode(&self, tag: &str, fields: Fields) -> Result<DecodeOutcome, FlightError>;
}
