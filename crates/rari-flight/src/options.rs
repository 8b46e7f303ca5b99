use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::FlightConfig;
use crate::error::{FlightError, Rejection};
use crate::types::{ClientReference, Component, Value};

/// Describes a client reference for transport. The returned tuple is opaque
/// to the codec, typically a module id and an export name.
pub trait ClientReferenceMetadata: Send + Sync {
    fn client_reference_metadata(&self, reference: &ClientReference)
    -> Result<Vec<Value>, Rejection>;
}

impl<F> ClientReferenceMetadata for F
where
    F: Fn(&ClientReference) -> Result<Vec<Value>, Rejection> + Send + Sync,
{
    fn client_reference_metadata(
        &self,
        reference: &ClientReference,
    ) -> Result<Vec<Value>, Rejection> {
        self(reference)
    }
}

/// Performs the remote invocation of a server action.
#[async_trait]
pub trait CallServer: Send + Sync {
    async fn call_server(&self, id: &str, args: Vec<Value>) -> Result<Value, Rejection>;
}

#[async_trait]
impl<F, Fut> CallServer for F
where
    F: Fn(String, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Rejection>> + Send + 'static,
{
    async fn call_server(&self, id: &str, args: Vec<Value>) -> Result<Value, Rejection> {
        self(id.to_string(), args).await
    }
}

/// Resolves client reference metadata back into a concrete component.
#[async_trait]
pub trait LoadClientReference: Send + Sync {
    async fn load_client_reference(&self, metadata: Vec<Value>) -> Result<Component, Rejection>;
}

#[async_trait]
impl<F, Fut> LoadClientReference for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Component, Rejection>> + Send + 'static,
{
    async fn load_client_reference(&self, metadata: Vec<Value>) -> Result<Component, Rejection> {
        self(metadata).await
    }
}

pub type OnError = Arc<dyn Fn(&FlightError) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EncodeOptions {
    pub client_reference_metadata: Option<Arc<dyn ClientReferenceMetadata>>,
    pub on_error: Option<OnError>,
    pub cancel: Option<CancellationToken>,
    pub config: FlightConfig,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_reference_metadata<M>(mut self, metadata: M) -> Self
    where
        M: ClientReferenceMetadata + 'static,
    {
        self.client_reference_metadata = Some(Arc::new(metadata));
        self
    }

    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&FlightError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_config(mut self, config: FlightConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn report(&self, error: &FlightError) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

impl std::fmt::Debug for EncodeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodeOptions")
            .field("client_reference_metadata", &self.client_reference_metadata.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("cancel", &self.cancel)
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct DecodeOptions {
    pub call_server: Option<Arc<dyn CallServer>>,
    pub load_client_reference: Option<Arc<dyn LoadClientReference>>,
    pub config: FlightConfig,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_server<C>(mut self, call_server: C) -> Self
    where
        C: CallServer + 'static,
    {
        self.call_server = Some(Arc::new(call_server));
        self
    }

    pub fn with_load_client_reference<L>(mut self, loader: L) -> Self
    where
        L: LoadClientReference + 'static,
    {
        self.load_client_reference = Some(Arc::new(loader));
        self
    }

    pub fn with_config(mut self, config: FlightConfig) -> Self {
        self.config = config;
        self
    }
}

impl std::fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("call_server", &self.call_server.is_some())
            .field("load_client_reference", &self.load_client_reference.is_some())
            .field("config", &self.config)
            .finish()
    }
}
