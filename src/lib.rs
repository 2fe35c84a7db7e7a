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

//! # usg-est-server
//!
//! A minimal EST (Enrollment over Secure Transport, RFC 7030) server.
//!
//! The server acts as a small issuing CA: it distributes its own certificate
//! as a certs-only PKCS#7 bundle, turns PKCS#10 requests into short-lived
//! client-authentication certificates and reports the client certificate
//! presented on a TLS connection.
//!
//! ## Features
//!
//! - **CA loading** from PEM (RSA, ECDSA P-256/P-384, Ed25519 keys)
//! - **EST operations**: cacerts, simpleenroll, simplereenroll
//! - **Proof of possession**: every CSR self-signature is verified before issuance
//! - **TLS inspection** endpoint reporting the peer certificate subject
//! - **CSR generation helpers** for clients and tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use usg_est_server::{config::EstServerConfig, server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EstServerConfig::builder()
//!         .ca_files("data/pki/server.cert.pem", "data/pki/server.key.pem")
//!         .build()?;
//!
//!     server::run(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Enrolling Without HTTP
//!
//! ```no_run
//! use std::sync::Arc;
//! use base64::prelude::*;
//! use usg_est_server::{CaMaterial, Enroller, SerialNumberPolicy};
//! use usg_est_server::csr::CsrBuilder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ca = Arc::new(CaMaterial::load_files("ca.pem", "ca.key")?);
//! let enroller = Enroller::new(
//!     ca,
//!     std::time::Duration::from_secs(24 * 60 * 60),
//!     SerialNumberPolicy::Random,
//! );
//!
//! let (csr_der, _key) = CsrBuilder::new().common_name("client-1").build()?;
//! let issued = enroller.enroll(BASE64_STANDARD.encode(csr_der).as_bytes())?;
//! println!("Issued {} (serial {})", issued.subject(), issued.serial_hex());
//! # Ok(())
//! # }
//! ```
//!
//! ## RFC 7030 Coverage
//!
//! - Section 4.1: Distribution of CA Certificates
//! - Section 4.2: Simple Enrollment and Re-enrollment (treated identically)
//!
//! Full CMC, server-side key generation and CSR attributes are not offered.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ca;
pub mod config;
pub mod csr;
pub mod error;
pub mod logging;
pub mod operations;
pub mod server;
pub mod tls;
pub mod types;

// Re-export main types at crate root for convenience
pub use ca::{CaKeyAlgorithm, CaMaterial};
pub use config::{EstServerConfig, EstServerConfigBuilder};
pub use error::{EstError, Result};
pub use operations::{
    Enroller, InspectionStatus, SerialNumberPolicy, TlsInspection, TlsSession,
};
pub use server::{router, AppState, ConnectionInfo, TlsListener};
pub use types::IssuedCertificate;

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
