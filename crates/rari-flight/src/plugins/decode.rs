use std::sync::Arc;
use tracing::debug;

use super::WireTag;
use crate::codec::{DecodeOutcome, DecodePlugin, Fields};
use crate::error::{FlightError, Rejection};
use crate::options::{CallServer, DecodeOptions, LoadClientReference};
use crate::types::{
    Deferred, Element, Key, Marker, Props, ServerAction, ServerReference, Value, split_children,
};

/// Rebuilds elements, lazy placeholders and server action proxies from wire
/// tuples.
#[derive(Clone, Default)]
pub struct FlightDecodePlugin {
    call_server: Option<Arc<dyn CallServer>>,
    load_client_reference: Option<Arc<dyn LoadClientReference>>,
}

impl FlightDecodePlugin {
    pub fn new(options: &DecodeOptions) -> Self {
        Self {
            call_server: options.call_server.as_ref().map(Arc::clone),
            load_client_reference: options.load_client_reference.as_ref().map(Arc::clone),
        }
    }

    fn decode_element(fields: Fields) -> Result<Value, FlightError> {
        let [element_type, key, props] = exact_fields(WireTag::Element, fields)?;
        let (props, children) = split_children(props_from(props)?);

        let element = match element_type {
            Value::String(tag) => Element::intrinsic(tag),
            Value::Symbol(Marker::Fragment) => Element::fragment(),
            Value::Symbol(Marker::Suspense) => Element::suspense(),
            other => {
                return Err(FlightError::invalid_node(format!(
                    "unknown element type {}",
                    describe(&other)
                )));
            }
        };

        let mut element = element.with_props(props).with_children(children);
        element.key = key_from(key)?;
        Ok(Value::from(element))
    }

    fn decode_async(fields: Fields) -> Result<Value, FlightError> {
        let [value] = exact_fields(WireTag::Async, fields)?;
        Ok(match value {
            Value::Deferred(deferred) => Value::from(Element::lazy(deferred)),
            settled => settled,
        })
    }

    fn decode_client(&self, fields: Fields) -> Result<Value, FlightError> {
        let loader = self.load_client_reference.as_ref().map(Arc::clone).ok_or_else(|| {
            FlightError::configuration("loadClientReference is required to decode client references")
        })?;
        if fields.len() < 2 {
            return Err(FlightError::malformed(format!(
                "'{}' tuple expects at least 2 fields, got {}",
                WireTag::Client,
                fields.len()
            )));
        }

        let mut fields = fields.into_iter();
        let key = key_from(fields.next().unwrap_or_default())?;
        let (props, children) = split_children(props_from(fields.next().unwrap_or_default())?);
        let metadata: Vec<Value> = fields.collect();

        debug!("Loading client reference {:?}", metadata);
        let deferred = Deferred::pending(async move {
            let component = loader.load_client_reference(metadata).await?;
            let mut element = Element::component(component).with_props(props).with_children(children);
            element.key = key;
            Ok::<_, Rejection>(Value::from(element))
        });

        // Start loading right away so the resolver runs once even if nothing
        // renders the placeholder.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(deferred.settle());
        }

        Ok(Value::from(Element::lazy(deferred)))
    }

    fn decode_server(&self, fields: Fields) -> Result<Value, FlightError> {
        let mut fields = fields.into_iter();
        let id = match fields.next() {
            Some(Value::String(id)) => id,
            other => {
                return Err(FlightError::invalid_node(format!(
                    "server reference id must be a string, got {}",
                    other.as_ref().map(describe).unwrap_or("nothing")
                )));
            }
        };
        let bound: Vec<Value> = fields.collect();
        let reference = if bound.is_empty() {
            ServerReference::new(id)
        } else {
            ServerReference::with_bound_args(id, bound)
        };
        Ok(Value::from(ServerAction::new(reference, self.call_server.as_ref().map(Arc::clone))))
    }
}

impl DecodePlugin for FlightDecodePlugin {
    fn decode(&self, tag: &str, fields: Fields) -> Result<DecodeOutcome, FlightError> {
        let Some(tag) = WireTag::parse(tag) else {
            return Ok(DecodeOutcome::Unhandled(fields));
        };

        let value = match tag {
            WireTag::Element => Self::decode_element(fields)?,
            WireTag::Async => Self::decode_async(fields)?,
            WireTag::Client => self.decode_client(fields)?,
            WireTag::Server => self.decode_server(fields)?,
        };
        Ok(DecodeOutcome::Decoded(value))
    }
}

fn exact_fields<const N: usize>(tag: WireTag, fields: Fields) -> Result<[Value; N], FlightError> {
    let len = fields.len();
    fields.into_vec().try_into().map_err(|_| {
        FlightError::malformed(format!("'{tag}' tuple expects {N} fields, got {len}"))
    })
}

fn props_from(value: Value) -> Result<Props, FlightError> {
    match value {
        Value::Object(props) => Ok(props),
        Value::Null => Ok(Props::new()),
        other => Err(FlightError::invalid_node(format!("props must be an object, got {}", describe(&other)))),
    }
}

fn key_from(value: Value) -> Result<Option<Key>, FlightError> {
    match value {
        Value::Null => Ok(None),
        Value::String(key) => Ok(Some(Key::String(key))),
        Value::Number(n) => n
            .as_i64()
            .map(|n| Some(Key::Number(n)))
            .ok_or_else(|| FlightError::invalid_node(format!("key {n} is not an integer"))),
        other => Err(FlightError::invalid_node(format!("invalid key {}", describe(&other)))),
    }
}

fn describe(value: &Value) -> &'static str {
    value.type_name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Component, ElementKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn decoded(outcome: DecodeOutcome) -> Value {
        match outcome {
            DecodeOutcome::Decoded(value) => value,
            DecodeOutcome::Unhandled(_) => panic!("expected the tuple to be handled"),
        }
    }

    fn element_fields(element_type: Value, key: Value, props: Props) -> Fields {
        [element_type, key, Value::Object(props)].into_iter().collect()
    }

    #[test]
    fn test_decode_intrinsic_element_with_children() {
        let plugin = FlightDecodePlugin::default();
        let mut props = Props::new();
        props.insert("id".to_string(), Value::from("x"));
        props.insert("children".to_string(), Value::Array(vec![Value::from("a"), Value::from("b")]));

        let value = decoded(plugin.decode("j", element_fields(Value::from("div"), Value::from("k"), props)).unwrap());
        let element = value.as_element().unwrap();
        assert_eq!(element.kind, ElementKind::Intrinsic("div".to_string()));
        assert_eq!(element.key, Some(Key::from("k")));
        assert_eq!(element.get_prop("id"), Some(&Value::from("x")));
        assert_eq!(element.children(), Some(&Value::Array(vec![Value::from("a"), Value::from("b")])));
    }

    #[test]
    fn test_decode_marker_elements() {
        let plugin = FlightDecodePlugin::default();
        let fragment = decoded(
            plugin.decode("j", element_fields(Value::Symbol(Marker::Fragment), Value::Null, Props::new())).unwrap(),
        );
        assert_eq!(fragment.as_element().unwrap().kind, ElementKind::Marker(Marker::Fragment));

        let suspense = decoded(
            plugin.decode("j", element_fields(Value::Symbol(Marker::Suspense), Value::from(3), Props::new())).unwrap(),
        );
        let suspense = suspense.as_element().unwrap();
        assert_eq!(suspense.kind, ElementKind::Marker(Marker::Suspense));
        assert_eq!(suspense.key, Some(Key::Number(3)));
    }

    #[test]
    fn test_decode_unknown_element_type_is_invalid() {
        let plugin = FlightDecodePlugin::default();
        let err = plugin
            .decode("j", element_fields(Value::Symbol(Marker::Profiler), Value::Null, Props::new()))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_NODE");

        let err = plugin.decode("j", element_fields(Value::from(1), Value::Null, Props::new())).unwrap_err();
        assert_eq!(err.code(), "INVALID_NODE");
    }

    #[test]
    fn test_decode_wrong_arity_is_malformed() {
        let plugin = FlightDecodePlugin::default();
        let fields: Fields = [Value::from("div")].into_iter().collect();
        assert!(matches!(plugin.decode("j", fields), Err(FlightError::Malformed(_))));
    }

    #[test]
    fn test_decode_async_wraps_pending_values() {
        let plugin = FlightDecodePlugin::default();
        let deferred = Deferred::resolved("later");
        let fields: Fields = [Value::from(deferred.clone())].into_iter().collect();
        let value = decoded(plugin.decode("a", fields).unwrap());
        match &value.as_element().unwrap().kind {
            ElementKind::Lazy(inner) => assert!(inner.ptr_eq(&deferred)),
            other => panic!("expected lazy element, got {other:?}"),
        }

        let fields: Fields = [Value::from("now")].into_iter().collect();
        assert_eq!(decoded(plugin.decode("a", fields).unwrap()), Value::from("now"));
    }

    #[test]
    fn test_decode_client_without_loader_is_configuration_error() {
        let plugin = FlightDecodePlugin::default();
        let fields: Fields = [Value::Null, Value::Object(Props::new())].into_iter().collect();
        assert!(plugin.decode("c", fields).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_decode_client_loads_component_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let options = DecodeOptions::new().with_load_client_reference(move |metadata: Vec<Value>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                assert_eq!(metadata, vec![Value::from("m"), Value::from("N")]);
                Ok::<_, Rejection>(Component::new("N", |_| Ok(Value::Null)))
            }
        });
        let plugin = FlightDecodePlugin::new(&options);

        let mut props = Props::new();
        props.insert("title".to_string(), Value::from("t"));
        props.insert("children".to_string(), Value::from("child"));
        let fields: Fields =
            [Value::from("k"), Value::Object(props), Value::from("m"), Value::from("N")].into_iter().collect();

        let value = decoded(plugin.decode("c", fields).unwrap());
        let ElementKind::Lazy(deferred) = &value.as_element().unwrap().kind else {
            panic!("expected lazy element");
        };

        let resolved = deferred.settle().await.unwrap();
        let element = resolved.as_element().unwrap();
        assert!(matches!(&element.kind, ElementKind::Component(c) if c.name() == "N"));
        assert_eq!(element.key, Some(Key::from("k")));
        assert_eq!(element.get_prop("title"), Some(&Value::from("t")));
        assert_eq!(element.children(), Some(&Value::from("child")));

        deferred.settle().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decode_client_load_failure_rejects_placeholder() {
        let options = DecodeOptions::new().with_load_client_reference(|_metadata: Vec<Value>| async {
            Err::<Component, _>(Rejection::new("module missing"))
        });
        let plugin = FlightDecodePlugin::new(&options);
        let fields: Fields = [Value::Null, Value::Null, Value::from("m")].into_iter().collect();

        let value = decoded(plugin.decode("c", fields).unwrap());
        let ElementKind::Lazy(deferred) = &value.as_element().unwrap().kind else {
            panic!("expected lazy element");
        };
        assert_eq!(deferred.settle().await, Err(Rejection::new("module missing")));
    }

    #[test]
    fn test_decode_server_reference() {
        let plugin = FlightDecodePlugin::default();
        let fields: Fields = [Value::from("act"), Value::from("a")].into_iter().collect();
        let value = decoded(plugin.decode("s", fields).unwrap());
        let action = value.as_server_action().unwrap();
        assert_eq!(action.id(), "act");
        assert_eq!(action.bound(), &[Value::from("a")]);

        let fields: Fields = [Value::from(1)].into_iter().collect();
        assert!(plugin.decode("s", fields).is_err());
    }

    #[test]
    fn test_unknown_tag_is_unhandled() {
        let plugin = FlightDecodePlugin::default();
        let fields: Fields = [Value::from(1)].into_iter().collect();
        match plugin.decode("z", fields).unwrap() {
            DecodeOutcome::Unhandled(returned) => assert_eq!(returned.len(), 1),
            DecodeOutcome::Decoded(_) => panic!("unknown tag must not be handled"),
        }
    }
}
