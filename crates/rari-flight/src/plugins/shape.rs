use crate::error::FlightError;
use crate::types::{ClientReference, Component, Element, ElementKind, Marker, ServerReference, Value};

/// The domain shape of a value, decided once before encoding.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Intrinsic(&'a Element, &'a str),
    Fragment(&'a Element),
    DeferredRegion(&'a Element),
    ComponentInvocation(&'a Element, &'a Component),
    ClientRef(&'a Element, &'a ClientReference),
    ServerRef(&'a ServerReference),
    Opaque,
}

pub fn classify(value: &Value) -> Result<Shape<'_>, FlightError> {
    match value {
        Value::Element(element) => classify_element(element),
        Value::ServerReference(reference) => Ok(Shape::ServerRef(reference)),
        Value::ServerAction(action) => Ok(Shape::ServerRef(action.reference())),
        _ => Ok(Shape::Opaque),
    }
}

fn classify_element(element: &Element) -> Result<Shape<'_>, FlightError> {
    match &element.kind {
        ElementKind::Intrinsic(tag) => Ok(Shape::Intrinsic(element, tag)),
        ElementKind::Marker(Marker::Fragment) => Ok(Shape::Fragment(element)),
        ElementKind::Marker(Marker::Suspense) => Ok(Shape::DeferredRegion(element)),
        ElementKind::Marker(other) => Err(FlightError::unsupported_element(other.to_string())),
        ElementKind::Component(component) => Ok(Shape::ComponentInvocation(element, component)),
        ElementKind::Client(reference) => Ok(Shape::ClientRef(element, reference)),
        ElementKind::Lazy(_) => {
            Err(FlightError::invalid_node("lazy placeholders cannot be encoded"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Deferred, ServerAction};

    #[test]
    fn test_classify_elements() {
        let div = Value::from(Element::intrinsic("div"));
        assert!(matches!(classify(&div).unwrap(), Shape::Intrinsic(_, "div")));
        assert!(matches!(classify(&Value::from(Element::fragment())).unwrap(), Shape::Fragment(_)));
        assert!(matches!(
            classify(&Value::from(Element::suspense())).unwrap(),
            Shape::DeferredRegion(_)
        ));

        let component = Component::new("Hello", |_| Ok(Value::Null));
        assert!(matches!(
            classify(&Value::from(Element::component(component))).unwrap(),
            Shape::ComponentInvocation(_, c) if c.name() == "Hello"
        ));

        let client = Value::from(Element::client(ClientReference::new("m", "N")));
        assert!(matches!(classify(&client).unwrap(), Shape::ClientRef(_, r) if r.id == "m"));
    }

    #[test]
    fn test_classify_server_references() {
        let reference = ServerReference::new("act");
        assert!(matches!(classify(&Value::from(reference.clone())).unwrap(), Shape::ServerRef(_)));

        let action = ServerAction::new(reference.with_bound([Value::from("a")]), None);
        match classify(&Value::from(action)).unwrap() {
            Shape::ServerRef(r) => assert_eq!(r.bound_args(), &[Value::from("a")]),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_classify_opaque_values() {
        assert!(matches!(classify(&Value::from("text")).unwrap(), Shape::Opaque));
        assert!(matches!(classify(&Value::Null).unwrap(), Shape::Opaque));
        assert!(matches!(classify(&Value::from(Deferred::resolved(1))).unwrap(), Shape::Opaque));
    }

    #[test]
    fn test_unsupported_markers_and_lazy_nodes_fail() {
        let err = classify(&Value::from(Element::marker(Marker::Profiler))).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_ELEMENT");

        let err = classify(&Value::from(Element::lazy(Deferred::resolved(1)))).unwrap_err();
        assert_eq!(err.code(), "INVALID_NODE");
    }
}
