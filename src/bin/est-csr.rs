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

//! CSR Generation Tool
//!
//! Generates a private key and a PKCS#10 request ready to post to
//! `simpleenroll`.
//!
//! # Examples
//!
//! ```bash
//! # Key to client.key, base64 DER request straight to the server
//! est-csr --cn client-1 --key-out client.key \
//!   | curl --data-binary @- http://localhost:8080/.well-known/est/simpleenroll
//!
//! # PEM request for inspection with openssl
//! est-csr --cn client-1 --key-out client.key --csr-format pem --csr-out client.csr
//! ```

use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use usg_est_server::csr::{CsrBuilder, CsrFormat, KeyAlgorithm};

/// CSR Generation Tool
#[derive(Parser)]
#[command(name = "est-csr")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate a key pair and CSR for EST simple enrollment", long_about = None)]
struct Cli {
    /// Common Name to be used for the CSR
    #[arg(long, default_value = "StormForger")]
    cn: String,

    /// Key algorithm: ecdsa-p256, ecdsa-p384 or ed25519
    #[arg(long, default_value = "ecdsa-p256")]
    key_algorithm: KeyAlgorithm,

    /// File to store the PKCS#8 private key to; - for stdout
    #[arg(long, default_value = "-", value_name = "PATH")]
    key_out: PathBuf,

    /// Output format: pem, der or der-base64
    #[arg(long, default_value = "der-base64")]
    csr_format: CsrFormat,

    /// File to store the CSR to; - for stdout
    #[arg(long, default_value = "-", value_name = "PATH")]
    csr_out: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.cn.is_empty() {
        return Err("Common Name (CN) may not be empty".into());
    }

    let (csr_der, key_pair) = CsrBuilder::new()
        .common_name(cli.cn.as_str())
        .key_algorithm(cli.key_algorithm)
        .build()?;

    write_output(&cli.key_out, key_pair.serialize_pem().as_bytes())?;
    write_output(&cli.csr_out, &cli.csr_format.encode(&csr_der))?;

    Ok(())
}

fn write_output(target: &Path, data: &[u8]) -> std::io::Result<()> {
    if target == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(data)?;
        stdout.flush()
    } else {
        std::fs::write(target, data)
    }
}
