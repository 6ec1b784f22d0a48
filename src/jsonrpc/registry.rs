//! Procedure registry
//!
//! Maps method names to procedures. Built once at startup and shared read-only
//! by every request afterwards.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::jsonrpc::codec::Params;

/// Failure reported by a procedure. The message is sent to the client verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ProcedureError {
    message: String,
    data: Option<Map<String, Value>>,
}

impl ProcedureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn bad_params() -> Self {
        Self::new("bad params")
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_parts(self) -> (String, Option<Map<String, Value>>) {
        (self.message, self.data)
    }
}

#[async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, params: Params) -> Result<Value, ProcedureError>;
}

/// Adapts an async closure into a [`Procedure`].
pub struct FnProcedure<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Procedure for FnProcedure<F>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ProcedureError>> + Send + 'static,
{
    async fn call(&self, params: Params) -> Result<Value, ProcedureError> {
        (self.f)(params).await
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    procedures: Arc<HashMap<String, Arc<dyn Procedure>>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Procedure>> {
        self.procedures.get(method).cloned()
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    procedures: HashMap<String, Arc<dyn Procedure>>,
}

impl RegistryBuilder {
    /// Registering the same name twice keeps the last procedure.
    pub fn register<P>(mut self, method: impl Into<String>, procedure: P) -> Self
    where
        P: Procedure + 'static,
    {
        self.procedures.insert(method.into(), Arc::new(procedure));
        self
    }

    pub fn register_fn<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ProcedureError>> + Send + 'static,
    {
        self.register(method, FnProcedure { f })
    }

    pub fn build(self) -> Registry {
        Registry {
            procedures: Arc::new(self.procedures),
        }
    }
}
