// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Setup flow for adding a printer server to the home-automation platform.
//
// The platform renders the form; this module decides what happens with what
// the user typed: reject a second instance, check a pasted key against the
// server, or provision a fresh key through the app-key handshake.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use octobridge_core::config::ClientConfig;
use octobridge_core::types::{ConfigEntry, DeviceEndpoint};

use crate::client::DeviceClient;

/// Abort reason when an entry already exists.
pub const SINGLE_INSTANCE_ALLOWED: &str = "single_instance_allowed";

/// Check that `api_key` unlocks the server at `host:port`.
///
/// Sends one authenticated version read; true only if it returns a parsed
/// version payload.
pub async fn test_credentials(host: &str, port: u16, api_key: &str) -> bool {
    test_credentials_with(host, port, api_key, &ClientConfig::default()).await
}

#[instrument(skip(api_key, config))]
pub async fn test_credentials_with(
    host: &str,
    port: u16,
    api_key: &str,
    config: &ClientConfig,
) -> bool {
    let endpoint = match DeviceEndpoint::new(host, port) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!(error = %e, "credential test skipped");
            return false;
        }
    };
    let mut client = match DeviceClient::with_config(endpoint, config.clone()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "credential test skipped");
            return false;
        }
    };
    client.connect_with_key(api_key).await
}

/// What the user submitted on the setup form.
#[derive(Debug, Clone, Default)]
pub struct SetupInput {
    pub host: String,
    /// Port exactly as typed.
    pub port: String,
    /// A key copied from the server's settings; empty or absent means
    /// "provision one for me".
    pub api_key: Option<String>,
    /// User who should approve a provisioned key; anyone if absent.
    pub user: Option<String>,
}

/// Next step of the setup flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStep {
    /// Persist this entry and finish.
    CreateEntry { title: String, entry: ConfigEntry },
    /// Show the form again with errors keyed by field (`base` for the form).
    ShowForm { errors: BTreeMap<String, String> },
    /// Stop the flow.
    Abort { reason: &'static str },
}

impl SetupStep {
    fn form_error(field: &str, key: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), key.to_string());
        Self::ShowForm { errors }
    }
}

/// Drives one setup attempt.
pub struct SetupFlow {
    config: ClientConfig,
    existing_entries: usize,
    cancel: CancellationToken,
}

impl SetupFlow {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            existing_entries: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Number of printer entries the platform already has.
    pub fn with_existing_entries(mut self, count: usize) -> Self {
        self.existing_entries = count;
        self
    }

    /// Token that aborts a running key provisioning when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle one form submission.
    #[instrument(skip(self, input), fields(host = %input.host))]
    pub async fn submit(&self, input: SetupInput) -> SetupStep {
        if self.existing_entries > 0 {
            return SetupStep::Abort {
                reason: SINGLE_INSTANCE_ALLOWED,
            };
        }

        let Ok(port) = input.port.trim().parse::<u16>() else {
            return SetupStep::form_error("port", "invalid_port");
        };
        let host = input.host.trim().to_string();
        let endpoint = match DeviceEndpoint::new(host.clone(), port) {
            Ok(endpoint) => endpoint,
            Err(_) => return SetupStep::form_error("host", "invalid_host"),
        };

        let api_key = input
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());

        let api_key = match api_key {
            Some(key) => {
                if !test_credentials_with(&host, port, key, &self.config).await {
                    return SetupStep::form_error("base", "auth");
                }
                key.to_string()
            }
            None => match self.provision(endpoint, input.user.as_deref()).await {
                Ok(key) => key,
                Err(step) => return step,
            },
        };

        info!("printer server added");
        SetupStep::CreateEntry {
            title: format!("OctoPrint ({host})"),
            entry: ConfigEntry {
                host,
                port,
                api_key,
            },
        }
    }

    async fn provision(
        &self,
        endpoint: DeviceEndpoint,
        user: Option<&str>,
    ) -> std::result::Result<String, SetupStep> {
        let mut client = DeviceClient::with_config(endpoint, self.config.clone())
            .map_err(|_| SetupStep::form_error("base", "unknown"))?;
        let options = self.config.handshake;
        client
            .acquire_api_key_with(&self.config.app_name, user, &options, &self.cancel)
            .await
            .map_err(|e| {
                warn!(error = %e, "key provisioning failed");
                SetupStep::form_error("base", e.form_key())
            })
    }
}
