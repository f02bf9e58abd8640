// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// App-key provisioning and revocation.
//
// The handshake obtains a long-lived API key without the user copying one:
//   1. GET  plugin/appkeys/probe            -> 204 if the plugin is present
//   2. POST plugin/appkeys/request          -> 201 with an app_token
//   3. GET  plugin/appkeys/request/{token}  -> 202 pending, 200 approved,
//                                              404 denied
// The user approves the request in the OctoPrint web interface while step 3
// polls.  Revocation posts a `revoke` command to api/plugin/appkeys.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use octobridge_core::config::HandshakeOptions;
use octobridge_core::error::{HandshakeError, Result, TransportFailure};

use crate::client::{DeviceClient, paths};
use crate::poll::{self, PollStep};
use crate::transport::{self, DecodeError};

#[derive(Debug, Serialize)]
struct KeyRequestBody<'a> {
    app: &'a str,
    user: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct KeyRequestCreated {
    app_token: String,
}

#[derive(Debug, Deserialize)]
struct KeyApproved {
    api_key: String,
}

#[derive(Debug, Serialize)]
struct RevokeBody<'a> {
    command: &'static str,
    key: &'a str,
}

impl From<DecodeError> for HandshakeError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Transport(failure) => HandshakeError::Transport(failure),
            DecodeError::Malformed(detail) => HandshakeError::MalformedResponse(detail),
        }
    }
}

impl DeviceClient {
    /// Run the app-key handshake with the configured timeouts and poll policy.
    ///
    /// On success the key is stored, the client is marked connected and the
    /// key is returned so the caller can persist it.
    pub async fn acquire_api_key(
        &mut self,
        app_name: &str,
        user_name: Option<&str>,
    ) -> std::result::Result<String, HandshakeError> {
        let options = self.config().handshake;
        self.acquire_api_key_with(app_name, user_name, &options, &CancellationToken::new())
            .await
    }

    /// Run the app-key handshake with explicit options.
    ///
    /// Cancelling `cancel` ends the handshake with
    /// [`HandshakeError::Cancelled`], including while a request is in
    /// flight.  An already cancelled token sends nothing.  No client state
    /// changes unless the handshake succeeds.
    #[instrument(
        skip(self, options, cancel),
        fields(base_url = %self.base_url(), app = app_name)
    )]
    pub async fn acquire_api_key_with(
        &mut self,
        app_name: &str,
        user_name: Option<&str>,
        options: &HandshakeOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, HandshakeError> {
        if cancel.is_cancelled() {
            debug!("handshake cancelled before it started");
            return Err(HandshakeError::Cancelled);
        }

        // 1. Probe
        let response = unless_cancelled(
            cancel,
            self.handshake_send::<()>(Method::GET, paths::APPKEYS_PROBE, None, options.timeout),
        )
        .await?;
        if response.status() != StatusCode::NO_CONTENT {
            let status = response.status().as_u16();
            warn!(status, "app keys plugin not available");
            return Err(HandshakeError::NotSupported { status });
        }

        // 2. Request a token
        let body = KeyRequestBody {
            app: app_name,
            user: user_name,
        };
        let response = unless_cancelled(
            cancel,
            self.handshake_send(Method::POST, paths::APPKEYS_REQUEST, Some(&body), options.timeout),
        )
        .await?;
        if response.status() != StatusCode::CREATED {
            let status = response.status().as_u16();
            warn!(status, "app key request not created");
            return Err(HandshakeError::NotCreated { status });
        }
        let created: KeyRequestCreated = unless_cancelled(cancel, decode(response)).await?;
        info!("app key requested; waiting for approval in the OctoPrint UI");

        // 3. Wait for the user's decision
        let api_key = self
            .await_approval(&created.app_token, options, cancel)
            .await?;
        if HeaderValue::from_str(&api_key).is_err() {
            warn!("granted key cannot be sent as a header");
            return Err(HandshakeError::MalformedResponse(
                "granted API key contains characters not allowed in a header".into(),
            ));
        }
        self.accept_api_key(api_key.clone());
        info!("app key granted");
        Ok(api_key)
    }

    async fn await_approval(
        &self,
        app_token: &str,
        options: &HandshakeOptions,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, HandshakeError> {
        let sub_path = format!("{}/{}", paths::APPKEYS_REQUEST, app_token);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(HandshakeError::Cancelled);
            }
            attempt += 1;

            // The request in flight may not outlive the poll deadline.
            let remaining = options
                .poll
                .deadline
                .map(|deadline| deadline.saturating_sub(started.elapsed()));
            let timeout = remaining.map_or(options.timeout, |left| left.min(options.timeout));
            if timeout.is_zero() {
                return Err(HandshakeError::ApprovalTimedOut { attempts: attempt - 1 });
            }

            let sent = unless_cancelled(
                cancel,
                self.handshake_send::<()>(Method::GET, &sub_path, None, timeout),
            )
            .await;
            let response = match sent {
                Ok(response) => response,
                Err(HandshakeError::Transport(TransportFailure::NoResponse))
                    if timeout < options.timeout =>
                {
                    info!(attempt, "poll deadline reached while waiting for a response");
                    return Err(HandshakeError::ApprovalTimedOut { attempts: attempt });
                }
                Err(err) => return Err(err),
            };
            let status = response.status().as_u16();

            match poll::next_step(status, attempt, started.elapsed(), &options.poll) {
                PollStep::Approved => {
                    let approved: KeyApproved = unless_cancelled(cancel, decode(response)).await?;
                    return Ok(approved.api_key);
                }
                PollStep::WaitFor(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(attempt, "approval wait cancelled");
                            return Err(HandshakeError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                PollStep::Denied => return Err(HandshakeError::AccessDenied),
                PollStep::Exhausted => return Err(HandshakeError::ApprovalTimedOut { attempts: attempt }),
                PollStep::Unexpected(status) => {
                    return Err(HandshakeError::UnexpectedStatus { status });
                }
            }
        }
    }

    async fn handshake_send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        sub_path: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> std::result::Result<Response, HandshakeError> {
        let url = self.endpoint().url(sub_path);
        transport::send(&self.http, method, &url, self.headers(), body, timeout)
            .await
            .map_err(|failure| {
                warn!(error = %failure, "handshake request failed");
                HandshakeError::Transport(failure)
            })
    }

    /// Revoke the stored key on the server.
    ///
    /// Returns `Ok(true)` only when the server answers 204; the client is
    /// then disconnected and forgets the key.  A refused connection or any
    /// other status returns `Ok(false)` and leaves the state untouched.
    #[instrument(skip(self), fields(base_url = %self.base_url()))]
    pub async fn revoke(&mut self) -> Result<bool> {
        let Some(key) = self.api_key().map(str::to_owned) else {
            debug!("no API key stored; nothing to revoke");
            return Ok(false);
        };

        let body = RevokeBody {
            command: "revoke",
            key: &key,
        };
        let url = self.endpoint().url(paths::APPKEYS);
        let response = match transport::send(
            &self.http,
            Method::POST,
            &url,
            self.headers(),
            Some(&body),
            self.config().revoke_timeout,
        )
        .await
        {
            Ok(response) => response,
            Err(TransportFailure::ConnectionRefused) => {
                warn!("could not connect; key not revoked");
                return Ok(false);
            }
            Err(failure) => return Err(failure.into()),
        };

        if response.status() == StatusCode::NO_CONTENT {
            self.mark_disconnected();
            self.clear_api_key();
            info!("app key revoked");
            Ok(true)
        } else {
            warn!(status = response.status().as_u16(), "revocation rejected");
            Ok(false)
        }
    }
}

/// Run `step` unless `cancel` fires first; an in-flight request is dropped.
async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = std::result::Result<T, HandshakeError>>,
) -> std::result::Result<T, HandshakeError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("handshake cancelled");
            Err(HandshakeError::Cancelled)
        }
        result = step => result,
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
) -> std::result::Result<T, HandshakeError> {
    Ok(transport::decode(response).await?)
}
