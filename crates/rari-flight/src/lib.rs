//! Streaming encode/decode of server component trees.
//!
//! [`encode`] walks a [`Value`] tree and produces a row stream in which
//! elements, component output, client references and server references are
//! reduced to tagged tuples and deferred subtrees follow as later rows.
//! [`decode`] rebuilds the tree incrementally: deferred subtrees become lazy
//! placeholders, client references are resolved through
//! [`LoadClientReference`], and server references become callable
//! [`ServerAction`] proxies.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod options;
pub mod plugins;
pub mod render;
pub mod runtime;
pub mod server;
pub mod types;

pub use client::{create_from_fetch, create_from_stream};
pub use config::FlightConfig;
pub use error::{FlightError, Rejection};
pub use options::{
    CallServer, ClientReferenceMetadata, DecodeOptions, EncodeOptions, LoadClientReference, OnError,
};
pub use render::render_to_string;
pub use runtime::{Completion, Decoded, FlightStream, decode, encode};
pub use server::{
    FlightResponse, ServerOptions, render_to_response, render_to_stream, render_to_writer,
};
pub use types::{
    ClientReference, Component, Deferred, DeferredState, Element, ElementKind, Key, Marker, Props,
    ServerAction, ServerReference, Value,
};
