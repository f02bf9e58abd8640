// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP plumbing shared by every operation.
//
// All network failures pass through `classify` exactly once; operations
// decide what a `TransportFailure` means for their caller, never how to
// detect one.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use octobridge_core::error::TransportFailure;
use octobridge_core::types::{Reading, Unavailable};

/// Map a `reqwest` error onto the three transport cases callers care about.
pub(crate) fn classify(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::NoResponse
    } else if err.is_connect() {
        TransportFailure::ConnectionRefused
    } else {
        TransportFailure::Other(err.to_string())
    }
}

/// Send one request with the given headers, optional JSON body and timeout.
pub(crate) async fn send<B: Serialize + ?Sized>(
    http: &Client,
    method: Method,
    url: &str,
    headers: &HeaderMap,
    body: Option<&B>,
    timeout: Duration,
) -> Result<Response, TransportFailure> {
    let mut request = http
        .request(method.clone(), url)
        .headers(headers.clone())
        .timeout(timeout);
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request.send().await.map_err(|e| {
        let failure = classify(&e);
        debug!(%method, url, error = %failure, "request failed");
        failure
    })?;

    debug!(%method, url, status = response.status().as_u16(), "response received");
    Ok(response)
}

/// Turn a response into a read outcome.
///
/// Non-success statuses, unreadable bodies and bodies that do not match `T`
/// all become `Unavailable`; this never fails.
pub(crate) async fn read_payload<T: DeserializeOwned>(response: Response) -> Reading<T> {
    let status = response.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), "read returned non-success status");
        return Reading::Unavailable(Unavailable::Status(status.as_u16()));
    }

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return Reading::Unavailable(unavailable_from(&classify(&e))),
    };

    match serde_json::from_slice::<T>(&bytes) {
        Ok(payload) => Reading::Data(payload),
        Err(e) => {
            warn!(error = %e, "response body is not the expected payload");
            Reading::Unavailable(Unavailable::Malformed)
        }
    }
}

/// Decode a JSON body, reporting what went wrong as a string.
pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, DecodeError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| DecodeError::Transport(classify(&e)))?;
    serde_json::from_slice(&bytes).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Failure while reading a body the caller requires.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Transport(TransportFailure),
    #[error("malformed body: {0}")]
    Malformed(String),
}

pub(crate) fn unavailable_from(failure: &TransportFailure) -> Unavailable {
    match failure {
        TransportFailure::NoResponse => Unavailable::NoResponse,
        TransportFailure::ConnectionRefused => Unavailable::ConnectionRefused,
        TransportFailure::Other(_) => Unavailable::Transport,
    }
}
