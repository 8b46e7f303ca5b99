use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::Value;
use crate::error::FlightError;
use crate::options::CallServer;

/// Identity of a component implemented in the receiving environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientReference {
    pub id: String,
    pub name: String,
}

impl ClientReference {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// Identity of a remotely callable action plus its accumulated argument
/// prefix. `bound == None` means no partial application has happened yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerReference {
    pub id: String,
    pub bound: Option<Vec<Value>>,
}

impl ServerReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), bound: None }
    }

    pub fn with_bound_args(id: impl Into<String>, bound: Vec<Value>) -> Self {
        Self { id: id.into(), bound: Some(bound) }
    }

    pub fn bound_args(&self) -> &[Value] {
        self.bound.as_deref().unwrap_or_default()
    }

    /// Returns a new reference whose prefix is this prefix followed by `args`.
    pub fn with_bound(&self, args: impl IntoIterator<Item = Value>) -> Self {
        let mut bound = self.bound_args().to_vec();
        bound.extend(args);
        Self { id: self.id.clone(), bound: Some(bound) }
    }
}

/// Decoded, callable proxy for a [`ServerReference`].
#[derive(Clone)]
pub struct ServerAction {
    reference: ServerReference,
    call_server: Option<Arc<dyn CallServer>>,
}

impl ServerAction {
    pub fn new(reference: ServerReference, call_server: Option<Arc<dyn CallServer>>) -> Self {
        Self { reference, call_server }
    }

    pub fn id(&self) -> &str {
        &self.reference.id
    }

    pub fn bound(&self) -> &[Value] {
        self.reference.bound_args()
    }

    pub fn reference(&self) -> &ServerReference {
        &self.reference
    }

    pub fn bind(&self, args: impl IntoIterator<Item = Value>) -> ServerAction {
        ServerAction {
            reference: self.reference.with_bound(args),
            call_server: self.call_server.clone(),
        }
    }

    /// Partial application with an explicit receiver. A server action is not
    /// a method, so only a null receiver is accepted.
    pub fn bind_with_this(
        &self,
        this: &Value,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<ServerAction, FlightError> {
        if !this.is_null() {
            return Err(FlightError::configuration(
                "Cannot bind \"this\" of a server action. Pass null as the receiver.",
            ));
        }
        Ok(self.bind(args))
    }

    /// Invokes the remote action with the bound prefix followed by `args`.
    pub async fn call(&self, args: impl IntoIterator<Item = Value>) -> Result<Value, FlightError> {
        let call_server = self.call_server.as_ref().ok_or_else(|| {
            FlightError::configuration("callServer is not implemented in this environment")
        })?;

        let mut all_args = self.bound().to_vec();
        all_args.extend(args);

        debug!("Calling server action {} with {} argument(s)", self.id(), all_args.len());

        call_server.call_server(self.id(), all_args).await.map_err(FlightError::Rejected)
    }
}

impl PartialEq for ServerAction {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl std::fmt::Debug for ServerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerAction")
            .field("id", &self.reference.id)
            .field("bound", &self.reference.bound)
            .field("callable", &self.call_server.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;
    use parking_lot::Mutex;

    type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

    fn recording_action(id: &str, bound: Vec<Value>) -> (ServerAction, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let call_server = move |id: String, args: Vec<Value>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push((id, args));
                Ok::<_, Rejection>(Value::Null)
            }
        };
        let action = ServerAction::new(
            ServerReference::with_bound_args(id, bound),
            Some(Arc::new(call_server) as Arc<dyn CallServer>),
        );
        (action, calls)
    }

    #[test]
    fn test_with_bound_extends_prefix() {
        let reference = ServerReference::new("act");
        assert!(reference.bound.is_none());
        assert!(reference.bound_args().is_empty());

        let once = reference.with_bound([Value::from("a")]);
        let twice = once.with_bound([Value::from("b")]);
        assert_eq!(once.bound_args(), &[Value::from("a")]);
        assert_eq!(twice.bound_args(), &[Value::from("a"), Value::from("b")]);
    }

    #[tokio::test]
    async fn test_call_appends_args_after_bound_prefix() {
        let (action, calls) = recording_action("act", vec![Value::from("a")]);
        let bound = action.bind([Value::from("b")]);
        bound.call([Value::from("c")]).await.unwrap();

        assert_eq!(
            calls.lock().as_slice(),
            &[("act".to_string(), vec![Value::from("a"), Value::from("b"), Value::from("c")])]
        );
    }

    #[tokio::test]
    async fn test_each_bind_is_independent() {
        let (action, calls) = recording_action("act", vec![]);
        let left = action.bind([Value::from("l")]);
        let right = action.bind([Value::from("r")]);
        left.bind([Value::from("l2")]).call([]).await.unwrap();
        right.call([]).await.unwrap();

        let calls = calls.lock();
        assert_eq!(calls[0].1, vec![Value::from("l"), Value::from("l2")]);
        assert_eq!(calls[1].1, vec![Value::from("r")]);
    }

    #[tokio::test]
    async fn test_bind_with_this_rejects_receiver_before_calling() {
        let (action, calls) = recording_action("act", vec![]);
        let result = action.bind_with_this(&Value::from("receiver"), [Value::from("a")]);
        assert!(matches!(result, Err(FlightError::Configuration(_))));
        assert!(calls.lock().is_empty());

        let ok = action.bind_with_this(&Value::Null, [Value::from("a")]).unwrap();
        assert_eq!(ok.bound(), &[Value::from("a")]);
    }

    #[tokio::test]
    async fn test_call_without_call_server_fails_at_call_time() {
        let action = ServerAction::new(ServerReference::new("act"), None);
        let bound = action.bind([Value::from(1)]);
        assert_eq!(bound.bound(), &[Value::from(1)]);

        let err = bound.call([]).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_call_surfaces_remote_rejection() {
        let call_server = |_id: String, _args: Vec<Value>| async {
            Err::<Value, _>(Rejection::new("denied"))
        };
        let action = ServerAction::new(
            ServerReference::new("act"),
            Some(Arc::new(call_server) as Arc<dyn CallServer>),
        );
        assert_eq!(
            action.call([]).await,
            Err(FlightError::Rejected(Rejection::new("denied")))
        );
    }
}
