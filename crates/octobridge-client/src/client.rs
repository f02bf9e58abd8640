// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async REST client for a single OctoPrint server.
//
// Reads cover the server's status endpoints:
//   - api/version, api/printer (+ tool, bed, chamber, sd), api/connection
//   - api/job, api/files, api/printerprofiles, api/settings, api/slicing
//   - api/system/commands, api/timelapse, api/plugin/appkeys
//
// Commands (pause/resume) need an accepted key; the app-key handshake and
// revocation live in `appkeys.rs`.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use octobridge_core::config::ClientConfig;
use octobridge_core::error::{OctoError, Result, TransportFailure};
use octobridge_core::types::{
    AppKeyListing, CommandOutcome, ConnectionInfo, DeviceEndpoint, JobAction, JobInformation,
    PrinterState, Reading, SdState, ServerVersion, TemperatureReadings,
};

use crate::transport;

/// Header carrying the API key on every authenticated request.
pub const API_KEY_HEADER: &str = "x-api-key";

pub(crate) mod paths {
    pub const VERSION: &str = "api/version";
    pub const PRINTER: &str = "api/printer";
    pub const CONNECTION: &str = "api/connection";
    pub const FILES: &str = "api/files?recursive=true";
    pub const JOB: &str = "api/job";
    pub const TOOL: &str = "api/printer/tool";
    pub const BED: &str = "api/printer/bed";
    pub const CHAMBER: &str = "api/printer/chamber";
    pub const SD: &str = "api/printer/sd";
    pub const PRINTER_PROFILES: &str = "api/printerprofiles";
    pub const SETTINGS: &str = "api/settings";
    pub const SLICING: &str = "api/slicing";
    pub const SYSTEM_COMMANDS: &str = "api/system/commands";
    pub const TIMELAPSE: &str = "api/timelapse";
    pub const APPKEYS: &str = "api/plugin/appkeys";
    pub const APPKEYS_PROBE: &str = "plugin/appkeys/probe";
    pub const APPKEYS_REQUEST: &str = "plugin/appkeys/request";
}

/// Client bound to one OctoPrint server.
///
/// Holds the API key and whether the server has accepted it.  One instance
/// per configured printer; it is not shared between tasks that mutate it.
pub struct DeviceClient {
    endpoint: DeviceEndpoint,
    config: ClientConfig,
    pub(crate) http: Client,
    api_key: Option<String>,
    headers: HeaderMap,
    connected: bool,
}

impl DeviceClient {
    /// Create a client with default timeouts.
    pub fn new(endpoint: DeviceEndpoint) -> Result<Self> {
        Self::with_config(endpoint, ClientConfig::default())
    }

    pub fn with_config(endpoint: DeviceEndpoint, config: ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| OctoError::HttpClient(e.to_string()))?;
        debug!(base_url = %endpoint.base_url(), "device client created");
        Ok(Self {
            endpoint,
            config,
            http,
            api_key: None,
            headers: HeaderMap::new(),
            connected: false,
        })
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> String {
        self.endpoint.base_url()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the server has accepted the stored key.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Store `key` and rebuild the header set around it.
    ///
    /// Does not touch the connection flag.
    pub fn set_api_key(&mut self, key: impl Into<String>) {
        let key = key.into();
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&key) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
            }
            Err(_) => warn!("API key contains characters not allowed in a header; not sending it"),
        }
        self.headers = headers;
        self.api_key = Some(key);
    }

    pub(crate) fn clear_api_key(&mut self) {
        self.api_key = None;
        self.headers = HeaderMap::new();
    }

    /// Store a key the server has just issued and mark the client connected.
    pub(crate) fn accept_api_key(&mut self, key: impl Into<String>) {
        self.set_api_key(key);
        self.connected = true;
    }

    pub(crate) fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Adopt an externally supplied key, keeping it only if the server
    /// answers an authenticated version read.
    ///
    /// Returns whether the client is now connected.  On failure the key stays
    /// stored but the client remains disconnected.
    #[instrument(skip(self, key), fields(base_url = %self.endpoint.base_url()))]
    pub async fn connect_with_key(&mut self, key: impl Into<String>) -> bool {
        self.set_api_key(key);
        match self.version().await {
            Reading::Data(version) => {
                info!(server = %version.server, api = %version.api, "API key accepted");
                self.connected = true;
            }
            Reading::Unavailable(reason) => {
                warn!(?reason, "API key could not be verified");
                self.connected = false;
            }
        }
        self.connected
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// GET a sub-path and parse its body as `T`.
    ///
    /// Never fails: every problem is reported as `Reading::Unavailable`.
    #[instrument(skip(self), fields(base_url = %self.endpoint.base_url()))]
    pub async fn read<T: DeserializeOwned>(&self, sub_path: &str) -> Reading<T> {
        let url = self.endpoint.url(sub_path);
        match transport::send::<()>(
            &self.http,
            Method::GET,
            &url,
            &self.headers,
            None,
            self.config.read_timeout,
        )
        .await
        {
            Ok(response) => transport::read_payload(response).await,
            Err(failure) => {
                warn!(error = %failure, "read failed");
                Reading::Unavailable(transport::unavailable_from(&failure))
            }
        }
    }

    pub async fn version(&self) -> Reading<ServerVersion> {
        self.read(paths::VERSION).await
    }

    /// Temperatures, SD state and state flags.
    pub async fn printer(&self) -> Reading<PrinterState> {
        self.read(paths::PRINTER).await
    }

    pub async fn connection(&self) -> Reading<ConnectionInfo> {
        self.read(paths::CONNECTION).await
    }

    /// All files on local storage and SD card, folders expanded.
    pub async fn files(&self) -> Reading<Value> {
        self.read(paths::FILES).await
    }

    pub async fn job(&self) -> Reading<JobInformation> {
        self.read(paths::JOB).await
    }

    pub async fn tool(&self) -> Reading<TemperatureReadings> {
        self.read(paths::TOOL).await
    }

    pub async fn bed(&self) -> Reading<TemperatureReadings> {
        self.read(paths::BED).await
    }

    pub async fn chamber(&self) -> Reading<TemperatureReadings> {
        self.read(paths::CHAMBER).await
    }

    pub async fn sd(&self) -> Reading<SdState> {
        self.read(paths::SD).await
    }

    pub async fn printer_profiles(&self) -> Reading<Value> {
        self.read(paths::PRINTER_PROFILES).await
    }

    pub async fn settings(&self) -> Reading<Value> {
        self.read(paths::SETTINGS).await
    }

    /// Slicers and their profiles.
    pub async fn slicing(&self) -> Reading<Value> {
        self.read(paths::SLICING).await
    }

    pub async fn system_commands(&self) -> Reading<Value> {
        self.read(paths::SYSTEM_COMMANDS).await
    }

    /// Rendered timelapses and the current timelapse config.
    pub async fn timelapse(&self) -> Reading<Value> {
        self.read(paths::TIMELAPSE).await
    }

    /// Keys issued to the current user, plus pending requests.
    pub async fn app_keys(&self) -> Reading<AppKeyListing> {
        self.read(paths::APPKEYS).await
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub async fn pause_job(&self) -> Result<CommandOutcome> {
        self.job_command(JobAction::Pause).await
    }

    pub async fn resume_job(&self) -> Result<CommandOutcome> {
        self.job_command(JobAction::Resume).await
    }

    /// Send a job command.  Nothing is sent unless the client is connected.
    #[instrument(skip(self), fields(base_url = %self.endpoint.base_url()))]
    pub async fn job_command(&self, action: JobAction) -> Result<CommandOutcome> {
        if !self.connected {
            debug!("not connected; job command skipped");
            return Ok(CommandOutcome::NotConnected);
        }
        info!(?action, "sending job command");
        self.post_command(paths::JOB, &action.payload()).await
    }

    /// Write a fixed appearance setting.
    ///
    /// Only demonstrates the settings write path; it is not a general
    /// settings API.
    #[instrument(skip(self), fields(base_url = %self.endpoint.base_url()))]
    pub async fn set_settings(&self) -> Result<CommandOutcome> {
        let body = json!({ "appearance": { "color": "green" } });
        self.post_command(paths::SETTINGS, &body).await
    }

    async fn post_command(&self, sub_path: &str, body: &Value) -> Result<CommandOutcome> {
        let url = self.endpoint.url(sub_path);
        let response = match transport::send(
            &self.http,
            Method::POST,
            &url,
            &self.headers,
            Some(body),
            self.config.command_timeout,
        )
        .await
        {
            Ok(response) => response,
            Err(TransportFailure::ConnectionRefused) => {
                warn!("connection refused");
                return Ok(CommandOutcome::ConnectionRefused);
            }
            Err(failure) => return Err(failure.into()),
        };

        let status = response.status();
        if status.is_success() {
            Ok(CommandOutcome::Completed)
        } else {
            warn!(status = status.as_u16(), "command rejected");
            Ok(CommandOutcome::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    use octobridge_core::error::HandshakeError;
    use octobridge_core::types::Unavailable;

    use super::*;

    pub(crate) const API_KEY: &str = "0123456789ABCDEF0123456789ABCDEF";

    pub(crate) fn client_for(server: &MockServer) -> DeviceClient {
        let address = server.address();
        let endpoint = DeviceEndpoint::new(address.ip().to_string(), address.port()).unwrap();
        DeviceClient::new(endpoint).unwrap()
    }

    pub(crate) fn unused_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn is_malformed<T>(reading: &Reading<T>) -> bool {
        matches!(reading, Reading::Unavailable(Unavailable::Malformed))
    }

    pub(crate) async fn connected_client(server: &MockServer) -> DeviceClient {
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "api": "0.1", "server": "1.9.3", "text": "OctoPrint 1.9.3"
            })))
            .mount(server)
            .await;
        let mut client = client_for(server);
        assert!(client.connect_with_key(API_KEY).await);
        client
    }

    #[tokio::test]
    async fn version_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "api": "0.1", "server": "1.3.10", "text": "OctoPrint 1.3.10"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let version = client.version().await.data().unwrap();
        assert_eq!(version.server, "1.3.10");
    }

    #[tokio::test]
    async fn malformed_bodies_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(is_malformed(&client.version().await));
        assert!(is_malformed(&client.printer().await));
        assert!(is_malformed(&client.connection().await));
        assert!(is_malformed(&client.job().await));
        assert!(is_malformed(&client.files().await));
        assert!(is_malformed(&client.tool().await));
        assert!(is_malformed(&client.bed().await));
        assert!(is_malformed(&client.chamber().await));
        assert!(is_malformed(&client.sd().await));
        assert!(is_malformed(&client.printer_profiles().await));
        assert!(is_malformed(&client.settings().await));
        assert!(is_malformed(&client.slicing().await));
        assert!(is_malformed(&client.system_commands().await));
        assert!(is_malformed(&client.timelapse().await));
        assert!(is_malformed(&client.app_keys().await));
    }

    #[tokio::test]
    async fn non_conforming_json_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/job"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": 1 })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.job().await,
            Reading::Unavailable(Unavailable::Malformed)
        ));
    }

    #[tokio::test]
    async fn error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/printer"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "error": "Printer is not operational" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.printer().await,
            Reading::Unavailable(Unavailable::Status(409))
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let endpoint = DeviceEndpoint::new("127.0.0.1", unused_port()).unwrap();
        let client = DeviceClient::new(endpoint).unwrap();
        assert_eq!(
            client.version().await,
            Reading::Unavailable(Unavailable::ConnectionRefused)
        );
    }

    #[tokio::test]
    async fn reads_send_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/printer/tool"))
            .and(header("x-api-key", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tool0": { "actual": 21.5, "target": 0.0, "offset": 0 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        client.set_api_key(API_KEY);
        let tools = client.tool().await.data().unwrap();
        assert_eq!(tools["tool0"].actual, Some(21.5));
    }

    #[tokio::test]
    async fn files_are_listed_recursively() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/files"))
            .and(query_param("recursive", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.files().await.is_available());
    }

    #[tokio::test]
    async fn base_path_prefixes_every_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/octoprint/api/connection"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": { "state": "Operational", "port": "/dev/ttyACM0",
                             "baudrate": 250000, "printerProfile": "_default" },
                "options": { "ports": ["/dev/ttyACM0"], "baudrates": [250000],
                             "printerProfiles": [{ "id": "_default", "name": "Default" }],
                             "autoconnect": true }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let address = server.address();
        let endpoint =
            DeviceEndpoint::with_base_path(address.ip().to_string(), address.port(), "/octoprint/")
                .unwrap();
        let mut client = DeviceClient::new(endpoint).unwrap();
        let connection = client.connection().await.data().unwrap();
        assert_eq!(connection.current.baudrate, Some(250000));
        assert_eq!(connection.options.printer_profiles[0].id, "_default");

        Mock::given(method("GET"))
            .and(path("/octoprint/plugin/appkeys/probe"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/octoprint/api/job"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/octoprint/api/plugin/appkeys"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            client.acquire_api_key("OctoBridge", None).await.unwrap_err(),
            HandshakeError::NotSupported { status: 404 }
        );
        client.accept_api_key(API_KEY);
        assert_eq!(client.pause_job().await.unwrap(), CommandOutcome::Completed);
        assert!(client.revoke().await.unwrap());

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.url.path().starts_with("/octoprint/")));
    }

    #[test]
    fn set_api_key_is_idempotent() {
        let endpoint = DeviceEndpoint::new("octopi.local", 80).unwrap();
        let mut once = DeviceClient::new(endpoint.clone()).unwrap();
        let mut twice = DeviceClient::new(endpoint).unwrap();

        once.set_api_key(API_KEY);
        twice.set_api_key(API_KEY);
        twice.set_api_key(API_KEY);

        assert_eq!(once.headers(), twice.headers());
        assert_eq!(twice.headers().len(), 1);
        assert_eq!(twice.api_key(), Some(API_KEY));
        assert!(!twice.is_connected());
    }

    #[tokio::test]
    async fn commands_need_a_connection() {
        let server = MockServer::start().await;
        let mut client = client_for(&server);
        client.set_api_key(API_KEY);

        assert_eq!(client.pause_job().await.unwrap(), CommandOutcome::NotConnected);
        assert_eq!(client.resume_job().await.unwrap(), CommandOutcome::NotConnected);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 0);
    }

    #[tokio::test]
    async fn pause_and_resume_post_job_commands() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/job"))
            .and(header("x-api-key", API_KEY))
            .and(body_json(json!({ "command": "pause", "action": "pause" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/job"))
            .and(body_json(json!({ "command": "pause", "action": "resume" })))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;

        let client = connected_client(&server).await;
        assert_eq!(client.pause_job().await.unwrap(), CommandOutcome::Completed);
        assert_eq!(
            client.resume_job().await.unwrap(),
            CommandOutcome::Rejected { status: 409 }
        );
    }

    #[tokio::test]
    async fn refused_command_is_reported_not_raised() {
        let endpoint = DeviceEndpoint::new("127.0.0.1", unused_port()).unwrap();
        let mut client = DeviceClient::new(endpoint).unwrap();
        client.accept_api_key(API_KEY);

        assert_eq!(
            client.pause_job().await.unwrap(),
            CommandOutcome::ConnectionRefused
        );
    }

    #[tokio::test]
    async fn set_settings_posts_fixed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/settings"))
            .and(body_json(json!({ "appearance": { "color": "green" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.set_settings().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn rejected_key_leaves_client_disconnected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        assert!(!client.connect_with_key("wrong").await);
        assert!(!client.is_connected());
        assert_eq!(client.api_key(), Some("wrong"));
    }
}
