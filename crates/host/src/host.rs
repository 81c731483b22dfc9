// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core host: session registry, authorization, and request dispatch.

use crate::bootstrap::AppContext;
use crate::dispatch::{build_request_dispatch_map, DispatchMap};
use crate::plugins::{PolicyDecision, PolicyRequest};
use chrono::Utc;
use kagan_core::CapabilityProfile;
use kagan_wire::{CoreRequest, CoreResponse, ErrorBody};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// One registered client session.
#[derive(Debug, Clone)]
struct SessionEntry {
    profile: CapabilityProfile,
}

/// The request dispatcher and session registry.
pub struct CoreHost {
    ctx: Arc<AppContext>,
    dispatch: DispatchMap,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    last_activity: Mutex<Instant>,
}

impl CoreHost {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            dispatch: build_request_dispatch_map(),
            sessions: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Register a client session with its authorization profile.
    pub fn register_session(&self, session_id: &str, profile: CapabilityProfile) {
        self.sessions
            .lock()
            .insert(session_id.to_string(), SessionEntry { profile });
        self.touch();
    }

    pub fn unregister_session(&self, session_id: &str) {
        self.sessions.lock().remove(session_id);
        self.touch();
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Seconds since the last request or registration change.
    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn session_profile(&self, session_id: &str) -> Option<CapabilityProfile> {
        self.sessions.lock().get(session_id).map(|entry| entry.profile)
    }

    /// Handle one capability-addressed request.
    pub async fn handle_request(&self, request: CoreRequest) -> CoreResponse {
        self.touch();
        let response = self.dispatch_request(&request).await;
        self.record_audit(&request, &response);
        response
    }

    async fn dispatch_request(&self, request: &CoreRequest) -> CoreResponse {
        // Session registration is the one operation an unknown session may
        // perform; everything else requires a registered identity.
        if request.capability == "core" && request.method == "register_session" {
            return self.handle_register_session(request);
        }

        let Some(profile) = self.session_profile(&request.session_id) else {
            return CoreResponse::failure(
                ErrorBody::new(kagan_wire::UNKNOWN_SESSION, "session is not registered")
                    .with_hint("register the session before issuing requests")
                    .with_next_tool("core.register_session"),
            );
        };

        let key = crate::dispatch::dispatch_key(&request.capability, &request.method);
        if let Some(builtin) = self.dispatch.get(&key) {
            if !profile.satisfies(builtin.minimum_profile) {
                return CoreResponse::failure(ErrorBody::new(
                    kagan_wire::AUTHORIZATION_DENIED,
                    format!(
                        "operation {}/{} requires the {} profile",
                        request.capability, request.method, builtin.minimum_profile
                    ),
                ));
            }
            return match (builtin.handler)(Arc::clone(&self.ctx), request.params.clone()).await
            {
                Ok(result) => CoreResponse::success(result),
                Err(error) => CoreResponse::failure(error),
            };
        }

        if let Some(operation) = self
            .ctx
            .plugins
            .resolve_operation(&request.capability, &request.method)
        {
            if !profile.satisfies(operation.minimum_profile) {
                return CoreResponse::failure(ErrorBody::new(
                    kagan_wire::AUTHORIZATION_DENIED,
                    format!(
                        "operation {}/{} requires the {} profile",
                        request.capability, request.method, operation.minimum_profile
                    ),
                ));
            }

            if let Some(ref hook) = operation.policy_hook {
                let decision = hook(&PolicyRequest {
                    capability: &request.capability,
                    method: &request.method,
                    session_id: &request.session_id,
                    profile,
                    params: &request.params,
                });
                if let PolicyDecision::Deny { code, message } = decision {
                    return CoreResponse::failure(
                        ErrorBody::new(kagan_wire::PLUGIN_POLICY_DENIED, message)
                            .with_details(serde_json::json!({ "code": code })),
                    );
                }
            }

            let handler = operation.handler.resolve();
            return match handler(Arc::clone(&self.ctx), request.params.clone()).await {
                Ok(result) => CoreResponse::success(result),
                Err(error) => {
                    tracing::error!(
                        capability = %request.capability,
                        method = %request.method,
                        plugin = %operation.plugin_id,
                        error = %error.message,
                        "plugin handler failed"
                    );
                    CoreResponse::failure(error)
                }
            };
        }

        CoreResponse::failure(ErrorBody::new(
            kagan_wire::UNKNOWN_OPERATION,
            format!("no operation {}/{}", request.capability, request.method),
        ))
    }

    fn handle_register_session(&self, request: &CoreRequest) -> CoreResponse {
        let profile = request
            .params
            .get("profile")
            .and_then(|value| value.as_str())
            .and_then(CapabilityProfile::parse)
            .unwrap_or(CapabilityProfile::Viewer);
        self.register_session(&request.session_id, profile);
        CoreResponse::success(serde_json::json!({
            "session_id": request.session_id,
            "profile": profile.to_string(),
        }))
    }

    /// Append an audit row for the request. Audit is a side-effect only:
    /// a closing repository is not an error here.
    fn record_audit(&self, request: &CoreRequest, response: &CoreResponse) {
        let payload = serde_json::to_string(&request.params).unwrap_or_else(|_| "{}".to_string());
        let result = response
            .error
            .as_ref()
            .map(|error| serde_json::json!({ "code": error.code }).to_string())
            .unwrap_or_else(|| "{}".to_string());
        match self.ctx.audit.record(
            "session",
            &request.session_id,
            Some(&request.session_id),
            &request.capability,
            &request.method,
            &payload,
            &result,
            response.ok,
            Utc::now(),
        ) {
            Ok(()) => {}
            Err(error) if error.is_closing() => {}
            Err(error) => {
                tracing::warn!(error = %error, "failed to record audit event");
            }
        }
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
