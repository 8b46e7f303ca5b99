use std::collections::BTreeMap;

pub mod deferred;
pub mod element;
pub mod reference;

pub use deferred::{Deferred, DeferredState, Settlement};
pub use element::{CHILDREN_PROP, Component, Element, ElementKind, Key, Marker, split_children};
pub use reference::{ClientReference, ServerAction, ServerReference};

/// Props are kept ordered so that encoding and rendering are deterministic.
pub type Props = BTreeMap<String, Value>;

/// Everything that can appear in a component tree.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(Props),
    Symbol(Marker),
    Element(Box<Element>),
    Deferred(Deferred),
    ServerReference(ServerReference),
    ServerAction(ServerAction),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Value::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_server_action(&self) -> Option<&ServerAction> {
        match self {
            Value::ServerAction(action) => Some(action),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Value::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Symbol(_) => "symbol",
            Value::Element(_) => "element",
            Value::Deferred(_) => "deferred",
            Value::ServerReference(_) => "server reference",
            Value::ServerAction(_) => "server action",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Element(a), Value::Element(b)) => a == b,
            (Value::Deferred(a), Value::Deferred(b)) => a.ptr_eq(b),
            (Value::ServerReference(a), Value::ServerReference(b)) => a == b,
            (Value::ServerAction(a), Value::ServerAction(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Props> for Value {
    fn from(value: Props) -> Self {
        Value::Object(value)
    }
}

impl From<Marker> for Value {
    fn from(value: Marker) -> Self {
        Value::Symbol(value)
    }
}

impl From<Element> for Value {
    fn from(value: Element) -> Self {
        Value::Element(Box::new(value))
    }
}

impl From<Deferred> for Value {
    fn from(value: Deferred) -> Self {
        Value::Deferred(value)
    }
}

impl From<ServerReference> for Value {
    fn from(value: ServerReference) -> Self {
        Value::ServerReference(value)
    }
}

impl From<ServerAction> for Value {
    fn from(value: ServerAction) -> Self {
        Value::ServerAction(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
