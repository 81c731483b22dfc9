// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin SDK: manifests, operations, policy hooks, and the registry.
//!
//! Plugins compose external domain logic into the core without linking to
//! it. Registration is transactional: a plugin that errors mid-register
//! leaves no trace behind. Handlers are thunks resolved on first use so
//! unused plugins cost nothing at startup.

use crate::bootstrap::AppContext;
use kagan_core::CapabilityProfile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Identity and entrypoint of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub entrypoint: String,
    #[serde(default)]
    pub description: String,
}

impl PluginManifest {
    /// Load a manifest from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Self, PluginError> {
        let content = std::fs::read_to_string(path)
            .map_err(|error| PluginError::Manifest(error.to_string()))?;
        serde_json::from_str(&content).map_err(|error| PluginError::Manifest(error.to_string()))
    }
}

/// Future returned by plugin handlers.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, kagan_wire::ErrorBody>> + Send>>;

/// A resolved plugin handler.
pub type PluginHandler =
    Arc<dyn Fn(Arc<AppContext>, serde_json::Value) -> HandlerFuture + Send + Sync>;

/// Lazily-resolved handler: the factory runs the first time the operation
/// fires, mirroring deferred module loading.
pub struct HandlerThunk {
    factory: Box<dyn Fn() -> PluginHandler + Send + Sync>,
    resolved: OnceLock<PluginHandler>,
}

impl HandlerThunk {
    pub fn new(factory: impl Fn() -> PluginHandler + Send + Sync + 'static) -> Self {
        Self { factory: Box::new(factory), resolved: OnceLock::new() }
    }

    /// Thunk over a handler that is cheap to build.
    pub fn direct(handler: PluginHandler) -> Self {
        Self::new(move || Arc::clone(&handler))
    }

    pub fn resolve(&self) -> &PluginHandler {
        self.resolved.get_or_init(|| (self.factory)())
    }

    /// True once the handler has been constructed.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

/// Inputs handed to a policy hook.
#[derive(Debug, Clone)]
pub struct PolicyRequest<'a> {
    pub capability: &'a str,
    pub method: &'a str,
    pub session_id: &'a str,
    pub profile: CapabilityProfile,
    pub params: &'a serde_json::Value,
}

/// Decision returned by a policy hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { code: String, message: String },
}

pub type PolicyHook = Arc<dyn Fn(&PolicyRequest<'_>) -> PolicyDecision + Send + Sync>;

/// One capability/method operation contributed by a plugin.
pub struct PluginOperation {
    pub plugin_id: String,
    pub capability: String,
    pub method: String,
    pub handler: HandlerThunk,
    pub mutating: bool,
    pub minimum_profile: CapabilityProfile,
    pub policy_hook: Option<PolicyHook>,
}

impl PluginOperation {
    pub fn new(
        plugin_id: impl Into<String>,
        capability: impl Into<String>,
        method: impl Into<String>,
        handler: HandlerThunk,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            capability: capability.into(),
            method: method.into(),
            handler,
            mutating: false,
            minimum_profile: CapabilityProfile::Operator,
            policy_hook: None,
        }
    }

    pub fn mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    pub fn minimum_profile(mut self, profile: CapabilityProfile) -> Self {
        self.minimum_profile = profile;
        self
    }

    pub fn policy_hook(mut self, hook: PolicyHook) -> Self {
        self.policy_hook = Some(hook);
        self
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid plugin manifest: {0}")]
    Manifest(String),

    #[error("plugin {0} is already registered")]
    DuplicatePlugin(String),

    #[error("operation {capability}/{method} already registered by plugin {owner}")]
    DuplicateOperation {
        capability: String,
        method: String,
        owner: String,
    },

    #[error("plugin {0} must register at least one operation")]
    NoOperations(String),

    #[error("plugin registration failed: {0}")]
    Registration(String),
}

/// Narrow registration surface handed to `Plugin::register`.
pub struct PluginRegistrationApi {
    staged: Vec<PluginOperation>,
}

impl PluginRegistrationApi {
    fn new() -> Self {
        Self { staged: Vec::new() }
    }

    pub fn register_operation(&mut self, operation: PluginOperation) {
        self.staged.push(operation);
    }
}

/// A plugin: a manifest plus a transactional `register` step.
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;
    fn register(&self, api: &mut PluginRegistrationApi) -> Result<(), PluginError>;
}

/// Registry of plugin manifests and their operations.
///
/// `(capability, method)` ownership is exclusive across all plugins.
#[derive(Default)]
pub struct PluginRegistry {
    manifests: Vec<PluginManifest>,
    operations: HashMap<(String, String), Arc<PluginOperation>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin transactionally.
    ///
    /// On any failure — duplicate ID, duplicate operation, a `register`
    /// error, or zero registered operations — the registry is unchanged.
    pub fn register_plugin(&mut self, plugin: &dyn Plugin) -> Result<(), PluginError> {
        let manifest = plugin.manifest().clone();
        if self.manifests.iter().any(|existing| existing.id == manifest.id) {
            return Err(PluginError::DuplicatePlugin(manifest.id));
        }

        let mut api = PluginRegistrationApi::new();
        plugin.register(&mut api)?;

        if api.staged.is_empty() {
            return Err(PluginError::NoOperations(manifest.id));
        }

        // Validate the staged batch before committing anything.
        let mut seen: HashMap<(String, String), ()> = HashMap::new();
        for operation in &api.staged {
            let key = (operation.capability.clone(), operation.method.clone());
            if let Some(existing) = self.operations.get(&key) {
                return Err(PluginError::DuplicateOperation {
                    capability: key.0,
                    method: key.1,
                    owner: existing.plugin_id.clone(),
                });
            }
            if seen.insert(key.clone(), ()).is_some() {
                return Err(PluginError::DuplicateOperation {
                    capability: key.0,
                    method: key.1,
                    owner: manifest.id.clone(),
                });
            }
        }

        for operation in api.staged {
            let key = (operation.capability.clone(), operation.method.clone());
            self.operations.insert(key, Arc::new(operation));
        }
        self.manifests.push(manifest);
        Ok(())
    }

    pub fn resolve_operation(
        &self,
        capability: &str,
        method: &str,
    ) -> Option<Arc<PluginOperation>> {
        self.operations
            .get(&(capability.to_string(), method.to_string()))
            .cloned()
    }

    pub fn operations_for_method(&self, method: &str) -> Vec<Arc<PluginOperation>> {
        let mut operations: Vec<Arc<PluginOperation>> = self
            .operations
            .values()
            .filter(|operation| operation.method == method)
            .cloned()
            .collect();
        operations.sort_by(|a, b| a.capability.cmp(&b.capability));
        operations
    }

    pub fn registered_manifests(&self) -> &[PluginManifest] {
        &self.manifests
    }
}

/// Conformance fixture: a `noop` plugin exercising the SDK surface.
///
/// The policy hook denies requests carrying `{"disabled": true}`, which
/// the host surfaces as `PLUGIN_POLICY_DENIED`.
pub struct NoopPlugin {
    manifest: PluginManifest,
}

impl Default for NoopPlugin {
    fn default() -> Self {
        Self {
            manifest: PluginManifest {
                id: "example.noop".to_string(),
                name: "Noop Plugin".to_string(),
                version: "0.1.0".to_string(),
                entrypoint: "kagan_host::plugins::NoopPlugin".to_string(),
                description: "Conformance fixture for the plugin SDK.".to_string(),
            },
        }
    }
}

impl Plugin for NoopPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn register(&self, api: &mut PluginRegistrationApi) -> Result<(), PluginError> {
        let plugin_id = self.manifest.id.clone();
        let handler_plugin_id = plugin_id.clone();
        let handler = HandlerThunk::new(move || {
            let plugin_id = handler_plugin_id.clone();
            Arc::new(move |_ctx: Arc<AppContext>, params: serde_json::Value| {
                let plugin_id = plugin_id.clone();
                Box::pin(async move {
                    let mut result = serde_json::json!({
                        "success": true,
                        "plugin_id": plugin_id,
                    });
                    if let Some(echo) = params.get("echo") {
                        result["echo"] = echo.clone();
                    }
                    Ok(result)
                }) as HandlerFuture
            })
        });

        let hook: PolicyHook = Arc::new(|request: &PolicyRequest<'_>| {
            if request.params.get("disabled").and_then(|value| value.as_bool()) == Some(true) {
                return PolicyDecision::Deny {
                    code: "NOOP_DISABLED".to_string(),
                    message: "noop operation is disabled for this request".to_string(),
                };
            }
            PolicyDecision::Allow
        });

        api.register_operation(
            PluginOperation::new(plugin_id, "plugins", "noop_ping", handler)
                .minimum_profile(CapabilityProfile::Operator)
                .policy_hook(hook),
        );
        Ok(())
    }
}

/// Register the bundled conformance plugins.
pub fn register_example_plugins(registry: &mut PluginRegistry) -> Result<(), PluginError> {
    registry.register_plugin(&NoopPlugin::default())
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod tests;
