//! Method registry: the Rust-native substitute for the original's
//! attribute-reflection-based `@remote` marker (see the protocol spec's
//! design notes, §9). A name's presence in a [`MethodRegistry`] *is* the
//! remote marker; there is no runtime `hasattr`/`getattr` equivalent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::RemoteException;

/// A pending call result, boxed so the registry can hold handlers with
/// differing concrete future types.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RemoteException>> + Send>>;

/// A registered remote method: takes the shared service instance plus the
/// call's positional and keyword arguments, and returns a boxed future of
/// the result.
pub trait MethodHandler<S>: Send + Sync {
    fn call(&self, service: Arc<S>, args: Vec<Value>, kwargs: Map<String, Value>) -> HandlerFuture;
}

impl<S, F, Fut> MethodHandler<S> for F
where
    F: Fn(Arc<S>, Vec<Value>, Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, RemoteException>> + Send + 'static,
{
    fn call(&self, service: Arc<S>, args: Vec<Value>, kwargs: Map<String, Value>) -> HandlerFuture {
        Box::pin((self)(service, args, kwargs))
    }
}

/// Name → handler map. Building one is the only way to opt a method into
/// remote invocation; there is no reflection fallback.
pub struct MethodRegistry<S> {
    handlers: HashMap<String, Box<dyn MethodHandler<S>>>,
}

impl<S> Default for MethodRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MethodRegistry<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `name` as remotely callable. Overwrites any prior handler
    /// registered under the same name.
    pub fn method(mut self, name: impl Into<String>, handler: impl MethodHandler<S> + 'static) -> Self {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub async fn invoke(
        &self,
        name: &str,
        service: Arc<S>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Option<Result<Value, RemoteException>> {
        let handler = self.handlers.get(name)?;
        Some(handler.call(service, args, kwargs).await)
    }
}
