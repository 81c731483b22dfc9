// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response contracts for the capability-addressed RPC.

use serde::{Deserialize, Serialize};

/// One IPC request: capability-addressed with session identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreRequest {
    pub session_id: String,
    pub capability: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CoreRequest {
    pub fn new(
        session_id: impl Into<String>,
        capability: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            capability: capability.into(),
            method: method.into(),
            params,
        }
    }
}

/// Machine-readable error payload.
///
/// `hint` carries actionable remediation and `next_tool` a follow-up
/// operation suggestion, when one applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_tool: Option<String>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
            next_tool: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_next_tool(mut self, next_tool: impl Into<String>) -> Self {
        self.next_tool = Some(next_tool.into());
        self
    }
}

/// One IPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl CoreResponse {
    pub fn success(result: serde_json::Value) -> Self {
        Self { ok: true, result: Some(result), error: None }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self { ok: false, result: None, error: Some(error) }
    }
}

#[cfg(test)]
#[path = "contracts_tests.rs"]
mod tests;
