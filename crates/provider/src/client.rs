//! Provider traits consumed by the rule engine.
//!
//! A `Provider` describes itself and produces a `ServiceClient` at init time;
//! the engine only ever talks to `ServiceClient`. Out-of-process providers
//! (language servers, dependency resolvers) implement the same trait behind
//! their own transport.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::types::{Capability, Dependency, EvaluationResponse, ProviderConfig};

/// A backend provider factory: advertises capabilities and builds clients.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name conditions reference (e.g. `builtin`).
    fn name(&self) -> &str;

    /// Capabilities this provider advertises.
    fn capabilities(&self) -> Vec<Capability>;

    /// Initialize a client bound to the given source tree.
    async fn init(&self, config: ProviderConfig) -> Result<Arc<dyn ServiceClient>>;
}

/// An initialized provider client the engine evaluates conditions against.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Capabilities this client serves. Mirrors the provider's advertisement.
    fn capabilities(&self) -> Vec<Capability>;

    /// Whether the client serves the named capability.
    fn has_capability(&self, name: &str) -> bool {
        self.capabilities().iter().any(|c| c.name == name)
    }

    /// Evaluate one leaf condition. The payload arrives exactly as written
    /// in the rule (after chain-template rendering); the engine never
    /// interprets it.
    async fn evaluate(
        &self,
        cancel: &CancelToken,
        capability: &str,
        payload: &serde_yaml::Value,
    ) -> Result<EvaluationResponse>;

    /// Project dependencies, for dependency conditions and reporting.
    async fn get_dependencies(&self, cancel: &CancelToken) -> Result<Vec<Dependency>>;

    /// Release any resources held by the client.
    async fn stop(&self) {}
}
