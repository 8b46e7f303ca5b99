//! Codec plugins for the component-tree vocabulary: elements, async values,
//! client references and server references.

pub mod decode;
pub mod encode;
pub mod shape;

pub use decode::FlightDecodePlugin;
pub use encode::FlightEncodePlugin;
pub use shape::{Shape, classify};

/// Closed tag vocabulary shared by the encode and decode plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireTag {
    Element,
    Async,
    Client,
    Server,
}

impl WireTag {
    pub const ALL: [WireTag; 4] = [Self::Element, Self::Async, Self::Client, Self::Server];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Element => "j",
            Self::Async => "a",
            Self::Client => "c",
            Self::Server => "s",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == tag)
    }
}

impl std::fmt::Display for WireTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
