use std::sync::Arc;
use tracing::{debug, warn};

use super::WireTag;
use super::shape::{Shape, classify};
use crate::codec::{EncodePlugin, PluginTuple};
use crate::error::FlightError;
use crate::options::{ClientReferenceMetadata, EncodeOptions, OnError};
use crate::types::{ClientReference, Component, Deferred, Element, Marker, ServerReference, Value};

/// Reduces elements, component invocations, client references and server
/// references to wire tuples.
#[derive(Clone, Default)]
pub struct FlightEncodePlugin {
    client_reference_metadata: Option<Arc<dyn ClientReferenceMetadata>>,
    on_error: Option<OnError>,
}

impl FlightEncodePlugin {
    pub fn new(options: &EncodeOptions) -> Self {
        Self {
            client_reference_metadata: options.client_reference_metadata.as_ref().map(Arc::clone),
            on_error: options.on_error.as_ref().map(Arc::clone),
        }
    }

    fn element_tuple(element_type: Value, element: &Element) -> PluginTuple {
        PluginTuple::new(
            WireTag::Element.as_str(),
            [element_type, key_value(element), Value::Object(element.props.clone())],
        )
    }

    /// Runs the component now. A failure is reported and travels as a rejected
    /// async value so sibling content keeps streaming.
    fn invoke(&self, element: &Element, component: &Component) -> PluginTuple {
        let result = match component.invoke(&element.props) {
            Ok(value) => value,
            Err(rejection) => {
                warn!("Component {} failed: {}", component.name(), rejection);
                if let Some(on_error) = &self.on_error {
                    on_error(&FlightError::Rejected(rejection.clone()));
                }
                Value::Deferred(Deferred::rejected(rejection))
            }
        };
        PluginTuple::new(WireTag::Async.as_str(), [result])
    }

    fn client_tuple(
        &self,
        element: &Element,
        reference: &ClientReference,
    ) -> Result<PluginTuple, FlightError> {
        let describe = self.client_reference_metadata.as_ref().ok_or_else(|| {
            FlightError::configuration(format!(
                "clientReferenceMetadata is required to encode client reference {}#{}",
                reference.id, reference.name
            ))
        })?;
        let metadata = describe.client_reference_metadata(reference)?;
        debug!("Encoding client reference {}#{}", reference.id, reference.name);

        let mut fields = vec![key_value(element), Value::Object(element.props.clone())];
        fields.extend(metadata);
        Ok(PluginTuple::new(WireTag::Client.as_str(), fields))
    }

    fn server_tuple(reference: &ServerReference) -> PluginTuple {
        let mut fields = Vec::with_capacity(reference.bound_args().len() + 1);
        fields.push(Value::from(reference.id.as_str()));
        fields.extend(reference.bound_args().iter().cloned());
        PluginTuple::new(WireTag::Server.as_str(), fields)
    }
}

impl EncodePlugin for FlightEncodePlugin {
    fn encode(&self, value: &Value) -> Result<Option<PluginTuple>, FlightError> {
        let tuple = match classify(value)? {
            Shape::Intrinsic(element, tag) => Self::element_tuple(Value::from(tag), element),
            Shape::Fragment(element) => Self::element_tuple(Value::Symbol(Marker::Fragment), element),
            Shape::DeferredRegion(element) => {
                Self::element_tuple(Value::Symbol(Marker::Suspense), element)
            }
            Shape::ComponentInvocation(element, component) => self.invoke(element, component),
            Shape::ClientRef(element, reference) => self.client_tuple(element, reference)?,
            Shape::ServerRef(reference) => Self::server_tuple(reference),
            Shape::Opaque => return Ok(None),
        };
        Ok(Some(tuple))
    }
}

fn key_value(element: &Element) -> Value {
    element.key.clone().map(Value::from).unwrap_or_default()
}
