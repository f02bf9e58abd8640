// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// App name registered with the server when none is given.
pub const DEFAULT_APP_NAME: &str = "OctoBridge";

/// How long to keep asking the server whether the user approved a key request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Wait between two status polls while the request is pending.
    pub interval: Duration,
    /// Maximum number of status polls before giving up.
    pub max_attempts: u32,
    /// Overall time budget for the approval phase, if any.
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
            deadline: Some(Duration::from_secs(300)),
        }
    }
}

/// Settings for the app-key handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeOptions {
    /// Per-request timeout for probe, request and poll calls.
    pub timeout: Duration,
    pub poll: PollPolicy,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(9),
            poll: PollPolicy::default(),
        }
    }
}

/// Per-device client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for every read operation.
    pub read_timeout: Duration,
    /// Timeout for job commands and settings writes.
    pub command_timeout: Duration,
    /// Timeout for key revocation.
    pub revoke_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// App name used when the setup flow provisions a key.
    pub app_name: String,
    pub handshake: HandshakeOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(9),
            command_timeout: Duration::from_secs(9),
            revoke_timeout: Duration::from_secs(1),
            user_agent: format!("octobridge/{}", env!("CARGO_PKG_VERSION")),
            app_name: DEFAULT_APP_NAME.to_string(),
            handshake: HandshakeOptions::default(),
        }
    }
}
