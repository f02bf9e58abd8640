// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OctoBridge pairing tool.
//
// Requests an app key from an OctoPrint server, waits for the user to
// approve it in the web interface, then prints the printer state and the
// current job.  Ctrl-C cancels the wait.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;

use octobridge_client::{CancellationToken, DeviceClient};
use octobridge_core::config::{ClientConfig, DEFAULT_APP_NAME};
use octobridge_core::human_errors::humanize_handshake_error;
use octobridge_core::types::{DeviceEndpoint, Reading};

#[derive(Debug, Parser)]
#[command(name = "octobridge-pair", version, about = "Pair with an OctoPrint server")]
struct Args {
    /// Host name or IP address of the OctoPrint server.
    host: String,

    #[arg(short, long, default_value_t = 80)]
    port: u16,

    /// Path OctoPrint is served under, with leading and trailing slash.
    #[arg(long, default_value = "/")]
    base_path: String,

    /// App name shown in the approval dialog.
    #[arg(long, default_value = DEFAULT_APP_NAME)]
    app: String,

    /// Only this user may approve the request.
    #[arg(long)]
    user: Option<String>,

    /// Revoke the key again before exiting.
    #[arg(long)]
    revoke: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let endpoint = match DeviceEndpoint::with_base_path(&args.host, args.port, &args.base_path) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let config = ClientConfig {
        app_name: args.app.clone(),
        ..ClientConfig::default()
    };
    let mut client = match DeviceClient::with_config(endpoint, config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    tracing::info!(base_url = %client.base_url(), "requesting app key");
    println!("Approve the request for \"{}\" in the OctoPrint web interface...", args.app);

    let options = client.config().handshake;
    let api_key = match client
        .acquire_api_key_with(&args.app, args.user.as_deref(), &options, &cancel)
        .await
    {
        Ok(key) => key,
        Err(e) => {
            let human = humanize_handshake_error(&e);
            eprintln!("{}\n{}", human.message, human.suggestion);
            return ExitCode::FAILURE;
        }
    };
    println!("API key: {api_key}");

    print_reading("printer", client.printer().await);
    print_reading("job", client.job().await);

    if args.revoke {
        match client.revoke().await {
            Ok(true) => println!("key revoked"),
            Ok(false) => println!("key was not revoked"),
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_reading<T: Serialize>(label: &str, reading: Reading<T>) {
    match reading {
        Reading::Data(value) => match serde_json::to_string_pretty(&value) {
            Ok(json) => println!("{label}: {json}"),
            Err(e) => println!("{label}: unprintable ({e})"),
        },
        Reading::Unavailable(reason) => println!("{label}: unavailable ({reason:?})"),
    }
}
