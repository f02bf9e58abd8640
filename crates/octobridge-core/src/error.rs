// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for OctoBridge.

use thiserror::Error;

/// Why a request never produced an HTTP response.
///
/// Every network failure is folded into one of these by the client's
/// transport layer, so callers only ever match on three cases.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("could not connect to server, no response")]
    NoResponse,

    #[error("could not connect to server, connection refused")]
    ConnectionRefused,

    #[error("transport error: {0}")]
    Other(String),
}

/// Terminal outcome of a failed app-key handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("instance does not seem to support the application keys plugin (probe status {status})")]
    NotSupported { status: u16 },

    #[error("app key request was not created (status {status})")]
    NotCreated { status: u16 },

    #[error("user denied access")]
    AccessDenied,

    #[error("unexpected status {status} while waiting for approval")]
    UnexpectedStatus { status: u16 },

    #[error("no decision after {attempts} approval polls")]
    ApprovalTimedOut { attempts: u32 },

    #[error("handshake cancelled")]
    Cancelled,

    #[error("malformed handshake response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

impl HandshakeError {
    /// Whether running the handshake again could plausibly succeed without
    /// the user changing anything on the server.
    ///
    /// Capability and authorization failures are terminal.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ApprovalTimedOut { .. } | Self::Cancelled => true,
            Self::NotSupported { .. }
            | Self::NotCreated { .. }
            | Self::AccessDenied
            | Self::UnexpectedStatus { .. }
            | Self::MalformedResponse(_) => false,
        }
    }

    /// Short machine key for the setup form's error slot.
    pub fn form_key(&self) -> &'static str {
        match self {
            Self::NotSupported { .. } => "not_supported",
            Self::NotCreated { .. } => "not_created",
            Self::AccessDenied => "denied",
            Self::ApprovalTimedOut { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Transport(TransportFailure::NoResponse) => "no_response",
            Self::Transport(TransportFailure::ConnectionRefused) => "connection_refused",
            Self::UnexpectedStatus { .. }
            | Self::MalformedResponse(_)
            | Self::Transport(TransportFailure::Other(_)) => "unknown",
        }
    }
}

/// Top-level error type for all OctoBridge operations.
#[derive(Debug, Error)]
pub enum OctoError {
    #[error("invalid device endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Transport(#[from] TransportFailure),

    #[error("app key handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OctoError>;
