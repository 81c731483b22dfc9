// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kagan-host: plugin registry, policy gate, request dispatcher, IPC
//! listener, and application bootstrap.

pub mod bootstrap;
pub mod dispatch;
pub mod host;
pub mod listener;
pub mod plugins;

pub use bootstrap::{
    create_app_context, create_app_context_in_memory, execute_job_action, AppContext,
    BootstrapError, CoreJobExecutor,
};
pub use dispatch::{build_request_dispatch_map, dispatch_key, BuiltinOperation, DispatchMap};
pub use host::CoreHost;
pub use listener::Listener;
pub use plugins::{
    register_example_plugins, HandlerFuture, HandlerThunk, NoopPlugin, Plugin, PluginError,
    PluginHandler, PluginManifest, PluginOperation, PluginRegistrationApi, PluginRegistry,
    PolicyDecision, PolicyHook, PolicyRequest,
};
