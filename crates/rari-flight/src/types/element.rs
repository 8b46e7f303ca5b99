use std::future::Future;
use std::sync::Arc;

use super::deferred::Deferred;
use super::reference::ClientReference;
use super::{Props, Value};
use crate::error::Rejection;

pub const CHILDREN_PROP: &str = "children";

/// Built-in element markers shared by the encoding and decoding sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Fragment,
    Suspense,
    StrictMode,
    Profiler,
}

impl Marker {
    pub const ALL: [Marker; 4] =
        [Marker::Fragment, Marker::Suspense, Marker::StrictMode, Marker::Profiler];

    pub const fn registry_name(self) -> &'static str {
        match self {
            Self::Fragment => "react.fragment",
            Self::Suspense => "react.suspense",
            Self::StrictMode => "react.strict_mode",
            Self::Profiler => "react.profiler",
        }
    }

    pub fn from_registry_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|marker| marker.registry_name() == name)
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.registry_name())
    }
}

type RenderFn = dyn Fn(&Props) -> Result<Value, Rejection> + Send + Sync;

/// A server component: a named render function over props.
#[derive(Clone)]
pub struct Component {
    name: Arc<str>,
    render: Arc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: impl Into<Arc<str>>, render: F) -> Self
    where
        F: Fn(&Props) -> Result<Value, Rejection> + Send + Sync + 'static,
    {
        Self { name: name.into(), render: Arc::new(render) }
    }

    /// A component whose output is computed asynchronously. Invoking it
    /// returns a pending [`Deferred`].
    pub fn from_async<F, Fut>(name: impl Into<Arc<str>>, render: F) -> Self
    where
        F: Fn(Props) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Rejection>> + Send + 'static,
    {
        Self::new(name, move |props| Ok(Value::Deferred(Deferred::pending(render(props.clone())))))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, props: &Props) -> Result<Value, Rejection> {
        (self.render)(props)
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.render, &other.render)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    String(String),
    Number(i64),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::String(s) => Value::String(s),
            Key::Number(n) => Value::from(n),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Intrinsic(String),
    Marker(Marker),
    Component(Component),
    Client(ClientReference),
    /// Placeholder whose render output is the settlement of a deferred value.
    Lazy(Deferred),
}

impl PartialEq for ElementKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Intrinsic(a), Self::Intrinsic(b)) => a == b,
            (Self::Marker(a), Self::Marker(b)) => a == b,
            (Self::Component(a), Self::Component(b)) => a.ptr_eq(b),
            (Self::Client(a), Self::Client(b)) => a == b,
            (Self::Lazy(a), Self::Lazy(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<Key>,
    pub props: Props,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self { kind, key: None, props: Props::new() }
    }

    pub fn intrinsic(tag: impl Into<String>) -> Self {
        Self::new(ElementKind::Intrinsic(tag.into()))
    }

    pub fn fragment() -> Self {
        Self::new(ElementKind::Marker(Marker::Fragment))
    }

    pub fn suspense() -> Self {
        Self::new(ElementKind::Marker(Marker::Suspense))
    }

    pub fn marker(marker: Marker) -> Self {
        Self::new(ElementKind::Marker(marker))
    }

    pub fn component(component: Component) -> Self {
        Self::new(ElementKind::Component(component))
    }

    pub fn client(reference: ClientReference) -> Self {
        Self::new(ElementKind::Client(reference))
    }

    pub fn lazy(deferred: Deferred) -> Self {
        Self::new(ElementKind::Lazy(deferred))
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Appends a child: the first child is stored as a single value, further
    /// children turn `children` into a sequence.
    pub fn child(mut self, child: impl Into<Value>) -> Self {
        let child = child.into();
        let children = match self.props.remove(CHILDREN_PROP) {
            None => child,
            Some(Value::Array(mut items)) => {
                items.push(child);
                Value::Array(items)
            }
            Some(existing) => Value::Array(vec![existing, child]),
        };
        self.props.insert(CHILDREN_PROP.to_string(), children);
        self
    }

    /// Sets children from an argument list: none, one (stored as-is) or many
    /// (stored as a sequence).
    pub fn with_children(mut self, children: Vec<Value>) -> Self {
        self.props.remove(CHILDREN_PROP);
        let mut children = children;
        match children.len() {
            0 => {}
            1 => {
                if let Some(only) = children.pop() {
                    self.props.insert(CHILDREN_PROP.to_string(), only);
                }
            }
            _ => {
                self.props.insert(CHILDREN_PROP.to_string(), Value::Array(children));
            }
        }
        self
    }

    pub fn get_prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn children(&self) -> Option<&Value> {
        self.props.get(CHILDREN_PROP)
    }
}

/// Splits `children` out of `props`, normalized to an argument list.
pub fn split_children(mut props: Props) -> (Props, Vec<Value>) {
    let children = match props.remove(CHILDREN_PROP) {
        None => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };
    (props, children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_registry_names_roundtrip() {
        for marker in Marker::ALL {
            assert_eq!(Marker::from_registry_name(marker.registry_name()), Some(marker));
        }
        assert_eq!(Marker::from_registry_name("react.portal"), None);
    }

    #[test]
    fn test_child_accumulates_into_sequence() {
        let element = Element::intrinsic("ul").child("a");
        assert_eq!(element.children(), Some(&Value::from("a")));

        let element = element.child("b").child("c");
        assert_eq!(
            element.children(),
            Some(&Value::Array(vec![Value::from("a"), Value::from("b"), Value::from("c")]))
        );
    }

    #[test]
    fn test_with_children_normalizes_argument_list() {
        let none = Element::fragment().with_children(vec![]);
        assert!(none.children().is_none());

        let one = Element::fragment().with_children(vec![Value::from("only")]);
        assert_eq!(one.children(), Some(&Value::from("only")));

        let many = Element::fragment().with_children(vec![Value::from(1), Value::from(2)]);
        assert_eq!(many.children(), Some(&Value::Array(vec![Value::from(1), Value::from(2)])));
    }

    #[test]
    fn test_split_children() {
        let element = Element::intrinsic("p").prop("id", "x").child("a").child("b");
        let (props, children) = split_children(element.props);
        assert_eq!(children, vec![Value::from("a"), Value::from("b")]);
        assert_eq!(props.get("id"), Some(&Value::from("x")));
        assert!(!props.contains_key(CHILDREN_PROP));
    }

    #[test]
    fn test_component_invoke() {
        let greeting = Component::new("Greeting", |props| {
            let name = props.get("name").and_then(Value::as_str).unwrap_or("world");
            Ok(Element::intrinsic("h1").child(format!("Hello, {name}!")).into())
        });

        let rendered = greeting.invoke(&Props::from([("name".to_string(), Value::from("rari"))]));
        let Ok(Value::Element(element)) = rendered else {
            panic!("Expected element");
        };
        assert_eq!(element.children(), Some(&Value::from("Hello, rari!")));
        assert_eq!(greeting.name(), "Greeting");
    }

    #[test]
    fn test_async_component_returns_pending_deferred() {
        let component = Component::from_async("Slow", |_props| async { Ok::<_, Rejection>(Value::Null) });
        match component.invoke(&Props::new()) {
            Ok(Value::Deferred(deferred)) => assert!(!deferred.is_settled()),
            other => panic!("Expected deferred, got {other:?}"),
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(Key::from("row-1").to_string(), "row-1");
        assert_eq!(Key::from(42).to_string(), "42");
    }
}
