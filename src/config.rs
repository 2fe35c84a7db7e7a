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

//! Configuration types for the EST server.
//!
//! The server is configured from a TOML file, programmatically through
//! [`EstServerConfig::builder`], or both (the binary loads the file and
//! then applies command-line overrides).
//!
//! # Example
//!
//! ```toml
//! http_addr = "0.0.0.0:8080"
//! https_addr = "0.0.0.0:8443"
//! ca_cert_path = "data/pki/server.cert.pem"
//! ca_key_path = "data/pki/server.key.pem"
//! validity_secs = 86400
//! serial_number = "random"
//!
//! [logging]
//! level = "info"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EstError, Result};
use crate::logging::LogConfig;
use crate::operations::enroll::SerialNumberPolicy;

/// Configuration for the EST server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstServerConfig {
    /// Plain HTTP listen address.
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// HTTPS listen address.
    #[serde(default = "default_https_addr")]
    pub https_addr: SocketAddr,

    /// Serve HTTPS in addition to plain HTTP.
    #[serde(default = "default_true")]
    pub https_enabled: bool,

    /// PEM file holding the CA certificate (optionally followed by its chain).
    #[serde(default = "default_ca_cert_path")]
    pub ca_cert_path: PathBuf,

    /// PEM file holding the CA private key.
    #[serde(default = "default_ca_key_path")]
    pub ca_key_path: PathBuf,

    /// Separate HTTPS certificate. Defaults to the CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cert_path: Option<PathBuf>,

    /// Separate HTTPS private key. Defaults to the CA key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_key_path: Option<PathBuf>,

    /// Lifetime of issued client certificates, in seconds.
    #[serde(default = "default_validity_secs")]
    pub validity_secs: u64,

    /// Serial number assignment: `"random"` or a fixed integer.
    #[serde(default)]
    pub serial_number: SerialNumberPolicy,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log details of every TLS handshake.
    #[serde(default)]
    pub tls_debug: bool,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_https_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

fn default_true() -> bool {
    true
}

fn default_ca_cert_path() -> PathBuf {
    PathBuf::from("data/pki/server.cert.pem")
}

fn default_ca_key_path() -> PathBuf {
    PathBuf::from("data/pki/server.key.pem")
}

fn default_validity_secs() -> u64 {
    24 * 60 * 60
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for EstServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            https_addr: default_https_addr(),
            https_enabled: true,
            ca_cert_path: default_ca_cert_path(),
            ca_key_path: default_ca_key_path(),
            tls_cert_path: None,
            tls_key_path: None,
            validity_secs: default_validity_secs(),
            serial_number: SerialNumberPolicy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            tls_debug: false,
            logging: LogConfig::default(),
        }
    }
}

impl EstServerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> EstServerConfigBuilder {
        EstServerConfigBuilder::new()
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or contains unknown keys.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| EstError::config(format!("Invalid TOML: {e}")))
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EstError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EstError::config(format!("TOML serialize: {e}")))
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.validity_secs == 0 {
            errors.push("validity_secs must be > 0".to_string());
        }

        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be > 0".to_string());
        }

        if self.ca_cert_path.as_os_str().is_empty() {
            errors.push("ca_cert_path is required".to_string());
        }

        if self.ca_key_path.as_os_str().is_empty() {
            errors.push("ca_key_path is required".to_string());
        }

        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            errors.push("tls_cert_path and tls_key_path must be set together".to_string());
        }

        if self.https_enabled && self.http_addr == self.https_addr {
            errors.push("http_addr and https_addr must differ".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EstError::config(errors.join("; ")))
        }
    }

    /// Lifetime of issued client certificates.
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Certificate and key files presented by the HTTPS listener.
    pub fn tls_identity_paths(&self) -> (&Path, &Path) {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => (&self.ca_cert_path, &self.ca_key_path),
        }
    }
}

/// Builder for [`EstServerConfig`].
#[derive(Debug, Default)]
pub struct EstServerConfigBuilder {
    config: EstServerConfig,
}

impl EstServerConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plain HTTP listen address.
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.config.http_addr = addr;
        self
    }

    /// Set the HTTPS listen address.
    pub fn https_addr(mut self, addr: SocketAddr) -> Self {
        self.config.https_addr = addr;
        self.config.https_enabled = true;
        self
    }

    /// Disable the HTTPS listener.
    pub fn disable_https(mut self) -> Self {
        self.config.https_enabled = false;
        self
    }

    /// Set the CA certificate and key files.
    pub fn ca_files(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.config.ca_cert_path = cert.into();
        self.config.ca_key_path = key.into();
        self
    }

    /// Use a separate certificate and key for HTTPS.
    pub fn tls_files(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.config.tls_cert_path = Some(cert.into());
        self.config.tls_key_path = Some(key.into());
        self
    }

    /// Set the issued certificate lifetime.
    pub fn validity(mut self, validity: Duration) -> Self {
        self.config.validity_secs = validity.as_secs();
        self
    }

    /// Set the serial number policy.
    pub fn serial_number(mut self, policy: SerialNumberPolicy) -> Self {
        self.config.serial_number = policy;
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Log TLS handshake details.
    pub fn tls_debug(mut self, enabled: bool) -> Self {
        self.config.tls_debug = enabled;
        self
    }

    /// Set the logging configuration.
    pub fn logging(mut self, logging: LogConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<EstServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
