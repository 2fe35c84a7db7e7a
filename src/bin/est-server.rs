// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! EST Server
//!
//! Serves `/.well-known/est/{cacerts,simpleenroll,simplereenroll}` and
//! `/x509/inspect` over plain HTTP and HTTPS.
//!
//! # Usage
//!
//! ```text
//! est-server [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>        Path to configuration file
//!       --port <PORT>          HTTP port [env: PORT]
//!       --tls-port <PORT>      HTTPS port [env: TLS_PORT]
//!       --tls-cert <PATH>      CA certificate PEM [env: TLS_CERT]
//!       --tls-key <PATH>       CA private key PEM [env: TLS_KEY]
//!       --tls-debug            Log every TLS handshake [env: TLS_DEBUG]
//!       --no-https             Serve plain HTTP only
//!       --validity-secs <N>    Lifetime of issued certificates
//!       --serial-number <S>    "random" or a fixed integer
//!   -v, --verbose              Enable debug logging
//!       --json-logs            Log as JSON
//!       --print-config         Print the effective configuration and exit
//! ```
//!
//! The CA certificate and key double as the HTTPS server identity unless
//! `tls_cert_path`/`tls_key_path` are set in the configuration file.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use usg_est_server::config::EstServerConfig;
use usg_est_server::logging::{self, LogLevel};
use usg_est_server::operations::SerialNumberPolicy;
use usg_est_server::server;

/// EST Server
#[derive(Parser)]
#[command(name = "est-server")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Minimal EST (RFC 7030) enrollment server", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "PORT", value_name = "PORT")]
    port: Option<u16>,

    /// HTTPS port
    #[arg(long, env = "TLS_PORT", value_name = "PORT")]
    tls_port: Option<u16>,

    /// CA certificate PEM file
    #[arg(long, env = "TLS_CERT", value_name = "PATH")]
    tls_cert: Option<PathBuf>,

    /// CA private key PEM file
    #[arg(long, env = "TLS_KEY", value_name = "PATH")]
    tls_key: Option<PathBuf>,

    /// Log every TLS handshake
    #[arg(long, env = "TLS_DEBUG", value_parser = clap::builder::BoolishValueParser::new())]
    tls_debug: bool,

    /// Serve plain HTTP only
    #[arg(long)]
    no_https: bool,

    /// Lifetime of issued certificates in seconds
    #[arg(long, value_name = "SECONDS")]
    validity_secs: Option<u64>,

    /// Serial number policy: "random" or a fixed integer
    #[arg(long, value_name = "POLICY")]
    serial_number: Option<SerialNumberPolicy>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn into_config(self) -> Result<(EstServerConfig, bool), Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => EstServerConfig::from_file(path)?,
            None => EstServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.http_addr.set_port(port);
        }
        if let Some(port) = self.tls_port {
            config.https_addr.set_port(port);
        }
        if let Some(path) = self.tls_cert {
            config.ca_cert_path = path;
        }
        if let Some(path) = self.tls_key {
            config.ca_key_path = path;
        }
        if self.tls_debug {
            config.tls_debug = true;
        }
        if self.no_https {
            config.https_enabled = false;
        }
        if let Some(secs) = self.validity_secs {
            config.validity_secs = secs;
        }
        if let Some(policy) = self.serial_number {
            config.serial_number = policy;
        }
        if self.verbose {
            config.logging.level = LogLevel::Debug;
        }
        if self.json_logs {
            config.logging.json_format = true;
        }

        config.validate()?;
        Ok((config, self.print_config))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, print_config) = match cli.into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if print_config {
        return match config.to_toml() {
            Ok(toml) => {
                print!("{}", toml);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "EST server failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
