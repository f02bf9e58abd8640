// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for whatever UI drives printer setup.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The severity drives presentation; `retriable` tells the UI whether a
// "Try again" button makes sense.

use crate::error::{HandshakeError, OctoError, TransportFailure};

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout; trying again may work.
    Transient,
    /// User must do something (approve the request, fix the address).
    ActionRequired,
    /// Cannot be fixed by retrying, e.g. the server lacks a capability.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether offering a retry makes sense.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert an `OctoError` into a `HumanError`.
pub fn humanize_error(err: &OctoError) -> HumanError {
    match err {
        OctoError::InvalidEndpoint(detail) => HumanError {
            message: "The printer address doesn't look right.".into(),
            suggestion: format!(
                "Enter just the host name or IP address, like octopi.local or 192.168.1.50. ({detail})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        OctoError::HttpClient(_) => HumanError {
            message: "The network connection couldn't be set up.".into(),
            suggestion: "Try restarting the application. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        OctoError::Transport(failure) => humanize_transport(failure),

        OctoError::Handshake(handshake) => humanize_handshake_error(handshake),
    }
}

/// Convert a handshake failure into setup-screen wording.
pub fn humanize_handshake_error(err: &HandshakeError) -> HumanError {
    match err {
        HandshakeError::NotSupported { .. } => HumanError {
            message: "This OctoPrint server can't hand out app keys.".into(),
            suggestion: "Update OctoPrint to 1.5 or later, or enable the Application Keys plugin. You can also paste an API key from OctoPrint's settings instead.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        HandshakeError::NotCreated { status } => HumanError {
            message: "OctoPrint didn't accept the access request.".into(),
            suggestion: format!(
                "Check the user name, or leave it empty so any admin can approve. (Status {status})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        HandshakeError::AccessDenied => HumanError {
            message: "The access request was denied.".into(),
            suggestion: "Start setup again and choose Allow in the OctoPrint web interface.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        HandshakeError::ApprovalTimedOut { .. } => HumanError {
            message: "Nobody approved the access request in time.".into(),
            suggestion: "Open the OctoPrint web interface before starting setup, then choose Allow when the request pops up.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        HandshakeError::Cancelled => HumanError {
            message: "Setup was cancelled.".into(),
            suggestion: "Start setup again whenever you're ready.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        HandshakeError::UnexpectedStatus { status } => HumanError {
            message: "OctoPrint answered in an unexpected way.".into(),
            suggestion: format!(
                "Try again. If this keeps happening, check the OctoPrint log. (Status {status})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        HandshakeError::MalformedResponse(_) => HumanError {
            message: "OctoPrint sent a reply we couldn't read.".into(),
            suggestion: "Check that the address points at OctoPrint and not another web service.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        HandshakeError::Transport(failure) => humanize_transport(failure),
    }
}

fn humanize_transport(failure: &TransportFailure) -> HumanError {
    match failure {
        TransportFailure::NoResponse => HumanError {
            message: "The printer server didn't respond in time.".into(),
            suggestion: "Check that the machine running OctoPrint is switched on and on the same network, then try again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
        TransportFailure::ConnectionRefused => HumanError {
            message: "The printer server refused the connection.".into(),
            suggestion: "Check the host and port. OctoPrint usually listens on port 80, or 5000 when run by hand.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },
        TransportFailure::Other(detail) => HumanError {
            message: "The connection to the printer server failed.".into(),
            suggestion: format!("Try again in a moment. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
