// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OctoBridge Client: REST client for one OctoPrint server, the app-key
// handshake that provisions its credential, and the setup flow built on
// top of both.

pub mod appkeys;
pub mod client;
pub mod poll;
pub mod setup;
mod transport;

pub use client::DeviceClient;
pub use setup::{SetupFlow, SetupInput, SetupStep, test_credentials};
pub use tokio_util::sync::CancellationToken;
