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

//! CSR (Certificate Signing Request) generation utilities.
//!
//! This module provides a builder for creating PKCS#10 Certificate Signing
//! Requests in the formats `simpleenroll` accepts. The `est-csr` binary is
//! a thin wrapper around it.

use std::fmt;
use std::str::FromStr;

use base64::prelude::*;
use rcgen::{CertificateParams, DnType, KeyPair};

use crate::error::{EstError, Result};

/// Key algorithms available for generated CSR keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    /// ECDSA P-256 with SHA-256.
    #[default]
    EcdsaP256,
    /// ECDSA P-384 with SHA-384.
    EcdsaP384,
    /// Ed25519.
    Ed25519,
}

impl KeyAlgorithm {
    fn signature_algorithm(&self) -> &'static rcgen::SignatureAlgorithm {
        match self {
            Self::EcdsaP256 => &rcgen::PKCS_ECDSA_P256_SHA256,
            Self::EcdsaP384 => &rcgen::PKCS_ECDSA_P384_SHA384,
            Self::Ed25519 => &rcgen::PKCS_ED25519,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EcdsaP256 => "ecdsa-p256",
            Self::EcdsaP384 => "ecdsa-p384",
            Self::Ed25519 => "ed25519",
        })
    }
}

impl FromStr for KeyAlgorithm {
    type Err = EstError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ecdsa-p256" | "p256" => Ok(Self::EcdsaP256),
            "ecdsa-p384" | "p384" => Ok(Self::EcdsaP384),
            "ed25519" => Ok(Self::Ed25519),
            other if other.starts_with("rsa") => Err(EstError::csr(
                "RSA key generation is not supported; use ecdsa-p256, ecdsa-p384 or ed25519",
            )),
            other => Err(EstError::csr(format!("Unknown key algorithm: {}", other))),
        }
    }
}

/// Output encodings for a generated CSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CsrFormat {
    /// `CERTIFICATE REQUEST` PEM block.
    Pem,
    /// Raw DER.
    Der,
    /// Base64 of the DER, as posted to `simpleenroll`.
    #[default]
    DerBase64,
}

impl CsrFormat {
    /// Encode a DER CSR in this format.
    pub fn encode(&self, csr_der: &[u8]) -> Vec<u8> {
        match self {
            Self::Pem => pem_encode("CERTIFICATE REQUEST", csr_der).into_bytes(),
            Self::Der => csr_der.to_vec(),
            Self::DerBase64 => BASE64_STANDARD.encode(csr_der).into_bytes(),
        }
    }
}

impl fmt::Display for CsrFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pem => "pem",
            Self::Der => "der",
            Self::DerBase64 => "der-base64",
        })
    }
}

impl FromStr for CsrFormat {
    type Err = EstError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pem" => Ok(Self::Pem),
            "der" => Ok(Self::Der),
            "der-base64" => Ok(Self::DerBase64),
            other => Err(EstError::csr(format!(
                "Output format must be pem, der or der-base64, got '{}'",
                other
            ))),
        }
    }
}

/// Builder for creating Certificate Signing Requests.
///
/// # Example
///
/// ```no_run
/// use usg_est_server::csr::{CsrBuilder, KeyAlgorithm};
///
/// let (csr_der, key_pair) = CsrBuilder::new()
///     .common_name("client-1")
///     .organization("Example Corp")
///     .key_algorithm(KeyAlgorithm::EcdsaP384)
///     .build()
///     .expect("Failed to generate CSR");
/// ```
pub struct CsrBuilder {
    params: CertificateParams,
    algorithm: KeyAlgorithm,
    key_pair: Option<KeyPair>,
}

impl Default for CsrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrBuilder {
    /// Create a new CSR builder with default parameters.
    pub fn new() -> Self {
        Self {
            params: CertificateParams::default(),
            algorithm: KeyAlgorithm::default(),
            key_pair: None,
        }
    }

    /// Set the Common Name (CN) for the subject.
    pub fn common_name(mut self, cn: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::CommonName, cn.into());
        self
    }

    /// Set the Organization (O) for the subject.
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::OrganizationName, org.into());
        self
    }

    /// Set the Organizational Unit (OU) for the subject.
    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::OrganizationalUnitName, ou.into());
        self
    }

    /// Set the Country (C) for the subject.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::CountryName, country.into());
        self
    }

    /// Choose the algorithm of the generated key.
    pub fn key_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Use an existing key pair instead of generating a new one.
    pub fn with_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Build the CSR, generating a key pair unless one was supplied.
    ///
    /// Returns the DER-encoded CSR and the key pair.
    pub fn build(self) -> Result<(Vec<u8>, KeyPair)> {
        let key_pair = match self.key_pair {
            Some(kp) => kp,
            None => KeyPair::generate_for(self.algorithm.signature_algorithm())
                .map_err(|e| EstError::csr(format!("Failed to generate key pair: {}", e)))?,
        };

        let csr = self
            .params
            .serialize_request(&key_pair)
            .map_err(|e| EstError::csr(format!("Failed to serialize CSR: {}", e)))?;

        Ok((csr.der().to_vec(), key_pair))
    }

    /// Build the CSR using the provided key pair.
    ///
    /// Returns only the DER-encoded CSR.
    pub fn build_with_key(self, key_pair: &KeyPair) -> Result<Vec<u8>> {
        let csr = self
            .params
            .serialize_request(key_pair)
            .map_err(|e| EstError::csr(format!("Failed to serialize CSR: {}", e)))?;

        Ok(csr.der().to_vec())
    }
}

fn pem_encode(label: &str, der: &[u8]) -> String {
    let encoded = BASE64_STANDARD.encode(der);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for line in encoded.as_bytes().chunks(64) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}
