// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the OctoBridge adapter: where a server lives, what a
// read or command produced, and the payloads the server returns.

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{OctoError, Result};

/// Network location of one printer server.
///
/// Immutable after construction.  Every request URL is `base_url()` followed
/// by a fixed sub-path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    host: String,
    port: u16,
    base_path: String,
}

impl DeviceEndpoint {
    /// Endpoint served from the root path `/`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::with_base_path(host, port, "/")
    }

    /// Endpoint served below `base_path` (for servers behind a reverse proxy).
    ///
    /// The path is used verbatim, so it should start and end with `/`.
    /// IPv6 literals are accepted with or without brackets; any other host
    /// containing `:` is rejected.
    pub fn with_base_path(
        host: impl Into<String>,
        port: u16,
        base_path: impl Into<String>,
    ) -> Result<Self> {
        let host = host.into();
        let base_path = base_path.into();
        if host.trim().is_empty() {
            return Err(OctoError::InvalidEndpoint("host is empty".into()));
        }
        if host.contains('/') || host.contains(char::is_whitespace) {
            return Err(OctoError::InvalidEndpoint(format!("invalid host '{host}'")));
        }
        let host = match ipv6_literal(&host) {
            Some(addr) => addr.to_string(),
            None if host.contains([':', '[', ']']) => {
                return Err(OctoError::InvalidEndpoint(format!(
                    "invalid host '{host}' (give the port separately)"
                )));
            }
            None => host,
        };
        Ok(Self {
            host,
            port,
            base_path,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `http://{host}:{port}{base_path}`, with IPv6 hosts in brackets.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}{}", self.host, self.port, self.base_path)
        } else {
            format!("http://{}:{}{}", self.host, self.port, self.base_path)
        }
    }

    /// Full URL for a server sub-path such as `api/version`.
    pub fn url(&self, sub_path: &str) -> String {
        format!("{}{}", self.base_url(), sub_path)
    }
}

fn ipv6_literal(host: &str) -> Option<Ipv6Addr> {
    let bare = host
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse().ok()
}

/// What the external platform persists for one configured printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub host: String,
    pub port: u16,
    pub api_key: String,
}

/// Outcome of a read operation.
///
/// Reads degrade quietly: an `Unavailable` result means "no data this
/// cycle" and callers should keep their previous state.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading<T> {
    Data(T),
    Unavailable(Unavailable),
}

impl<T> Reading<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    /// The payload, discarding the reason it was missing.
    pub fn data(self) -> Option<T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        match self {
            Self::Data(value) => Reading::Data(f(value)),
            Self::Unavailable(reason) => Reading::Unavailable(reason),
        }
    }
}

/// Why a read produced no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// The body did not parse as the expected payload.
    Malformed,
    /// The server answered with a non-success status.
    Status(u16),
    /// The request timed out.
    NoResponse,
    /// Nothing is listening at the endpoint.
    ConnectionRefused,
    /// Any other network-level failure.
    Transport,
}

/// Outcome of a command (pause, resume, settings write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The server accepted the command.
    Completed,
    /// The server answered with a non-success status.
    Rejected { status: u16 },
    /// The client holds no accepted key, so nothing was sent.
    NotConnected,
    /// Nothing is listening at the endpoint.
    ConnectionRefused,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Job control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Pause,
    Resume,
}

impl JobAction {
    /// Body for `POST api/job`.
    ///
    /// Both actions go through the server's `pause` command; the `action`
    /// field selects the direction.
    pub fn payload(&self) -> Value {
        match self {
            Self::Pause => json!({ "command": "pause", "action": "pause" }),
            Self::Resume => json!({ "command": "pause", "action": "resume" }),
        }
    }
}

// ---------------------------------------------------------------------------
// Server payloads
// ---------------------------------------------------------------------------

/// `GET api/version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerVersion {
    pub api: String,
    pub server: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// One heater's temperatures in °C.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureData {
    #[serde(default)]
    pub actual: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
}

/// Heater name (`tool0`, `bed`, `chamber`, ...) to its temperatures.
pub type TemperatureReadings = BTreeMap<String, TemperatureData>;

/// `GET api/printer/sd`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdState {
    #[serde(default)]
    pub ready: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterFlags {
    #[serde(default)]
    pub operational: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub printing: bool,
    #[serde(default)]
    pub pausing: bool,
    #[serde(default)]
    pub cancelling: bool,
    #[serde(default)]
    pub sd_ready: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub closed_or_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub text: String,
    #[serde(default)]
    pub flags: PrinterFlags,
}

/// `GET api/printer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterState {
    #[serde(default)]
    pub temperature: TemperatureReadings,
    #[serde(default)]
    pub sd: Option<SdState>,
    pub state: PrinterStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConnection {
    pub state: String,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub baudrate: Option<u32>,
    #[serde(default)]
    pub printer_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub baudrates: Vec<u32>,
    #[serde(default)]
    pub printer_profiles: Vec<ProfileRef>,
    #[serde(default)]
    pub port_preference: Option<String>,
    #[serde(default)]
    pub baudrate_preference: Option<u32>,
    #[serde(default)]
    pub printer_profile_preference: Option<String>,
    #[serde(default)]
    pub autoconnect: Option<bool>,
}

/// `GET api/connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub current: CurrentConnection,
    #[serde(default)]
    pub options: ConnectionOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub date: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetails {
    #[serde(default)]
    pub file: JobFile,
    #[serde(default)]
    pub estimated_print_time: Option<f64>,
    #[serde(default)]
    pub filament: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// Percentage done, 0-100.
    #[serde(default)]
    pub completion: Option<f64>,
    #[serde(default)]
    pub filepos: Option<u64>,
    #[serde(default)]
    pub print_time: Option<u64>,
    #[serde(default)]
    pub print_time_left: Option<u64>,
}

/// `GET api/job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInformation {
    #[serde(default)]
    pub job: JobDetails,
    #[serde(default)]
    pub progress: JobProgress,
    pub state: String,
}

/// An app key the server has issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppKey {
    pub api_key: String,
    pub app_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `GET api/plugin/appkeys`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppKeyListing {
    pub keys: Vec<AppKey>,
    #[serde(default)]
    pub pending: Value,
}
