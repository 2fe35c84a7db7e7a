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

//! CA material loading.
//!
//! [`CaMaterial`] holds everything the server needs to act as an issuing
//! CA: the parsed CA certificate, its signing key, the PEM it was loaded
//! from and the precomputed `/cacerts` trust bundle. It is built once at
//! startup and shared read-only behind an `Arc`.
//!
//! # Supported key formats
//!
//! | PEM label          | Encoding | Algorithms                             |
//! |--------------------|----------|----------------------------------------|
//! | `PRIVATE KEY`      | PKCS#8   | RSA, ECDSA P-256, ECDSA P-384, Ed25519 |
//! | `RSA PRIVATE KEY`  | PKCS#1   | RSA                                    |
//! | `EC PRIVATE KEY`   | SEC1     | ECDSA P-256, ECDSA P-384               |
//!
//! The signature algorithm follows the CA certificate's public key, and
//! the key must match that public key.
//!
//! # Example
//!
//! ```no_run
//! use usg_est_server::ca::CaMaterial;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ca = CaMaterial::load_files("data/pki/server.cert.pem", "data/pki/server.key.pem")?;
//! println!("Issuing as {}", ca.subject());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use const_oid::db::rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER;
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ID_EC_PUBLIC_KEY, RSA_ENCRYPTION,
    SECP_256_R_1, SECP_384_R_1, SHA_256_WITH_RSA_ENCRYPTION,
};
use const_oid::db::rfc8410::ID_ED_25519;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, AnyRef};
use der::Decode;
use rustls::sign::Signer;
use rustls::SignatureScheme;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use sha2::{Digest, Sha256};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{EstError, Result};
use crate::operations::cacerts::{build_certs_only_bundle, fingerprint, format_fingerprint};
use crate::tls::{parse_pem_certificates, parse_pem_private_key};

/// Signing algorithms a CA key may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaKeyAlgorithm {
    /// RSA key, signing with PKCS#1 v1.5 and SHA-256.
    Rsa,
    /// ECDSA on the NIST P-256 curve, signing with SHA-256.
    EcdsaP256,
    /// ECDSA on the NIST P-384 curve, signing with SHA-384.
    EcdsaP384,
    /// Ed25519.
    Ed25519,
}

impl CaKeyAlgorithm {
    /// Short lowercase name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::EcdsaP256 => "ecdsa-p256",
            Self::EcdsaP384 => "ecdsa-p384",
            Self::Ed25519 => "ed25519",
        }
    }

    /// The TLS signature scheme whose signer produces X.509 signatures
    /// for this key.
    pub fn signature_scheme(&self) -> SignatureScheme {
        match self {
            Self::Rsa => SignatureScheme::RSA_PKCS1_SHA256,
            Self::EcdsaP256 => SignatureScheme::ECDSA_NISTP256_SHA256,
            Self::EcdsaP384 => SignatureScheme::ECDSA_NISTP384_SHA384,
            Self::Ed25519 => SignatureScheme::ED25519,
        }
    }

    /// `signatureAlgorithm` of certificates signed with this key.
    pub fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        match self {
            Self::Rsa => AlgorithmIdentifierOwned {
                oid: SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            Self::EcdsaP256 => AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA_256,
                parameters: None,
            },
            Self::EcdsaP384 => AlgorithmIdentifierOwned {
                oid: ECDSA_WITH_SHA_384,
                parameters: None,
            },
            Self::Ed25519 => AlgorithmIdentifierOwned {
                oid: ID_ED_25519,
                parameters: None,
            },
        }
    }

    fn key_family(&self) -> rustls::SignatureAlgorithm {
        match self {
            Self::Rsa => rustls::SignatureAlgorithm::RSA,
            Self::EcdsaP256 | Self::EcdsaP384 => rustls::SignatureAlgorithm::ECDSA,
            Self::Ed25519 => rustls::SignatureAlgorithm::ED25519,
        }
    }

    /// Detect the algorithm from a certificate's public key.
    pub fn from_public_key(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let oid = spki.algorithm.oid;

        if oid == RSA_ENCRYPTION {
            return Ok(Self::Rsa);
        }
        if oid == ID_ED_25519 {
            return Ok(Self::Ed25519);
        }
        if oid == ID_EC_PUBLIC_KEY {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| EstError::certificate_parsing("EC public key without named curve"))?
                .decode_as::<ObjectIdentifier>()
                .map_err(|e| {
                    EstError::certificate_parsing(format!("EC public key without named curve: {}", e))
                })?;
            if curve == SECP_256_R_1 {
                return Ok(Self::EcdsaP256);
            }
            if curve == SECP_384_R_1 {
                return Ok(Self::EcdsaP384);
            }
            return Err(EstError::certificate_parsing(format!(
                "Unsupported EC curve: {}",
                curve
            )));
        }

        Err(EstError::certificate_parsing(format!(
            "Unsupported CA key algorithm: {}",
            oid
        )))
    }
}

impl fmt::Display for CaKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issuing CA identity, loaded once and shared read-only.
pub struct CaMaterial {
    certificate: Certificate,
    certificate_der: CertificateDer<'static>,
    cert_pem: Vec<u8>,
    signer: Box<dyn Signer>,
    key_algorithm: CaKeyAlgorithm,
    key_identifier: Vec<u8>,
    cacerts_bundle: Vec<u8>,
}

impl CaMaterial {
    /// Load CA material from PEM-encoded certificate and private key.
    ///
    /// The first `CERTIFICATE` block is the CA certificate; any further
    /// blocks are treated as its chain and only appear in the trust
    /// bundle. The key must hold the private half of the CA certificate's
    /// public key.
    pub fn load(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let mut blocks = parse_pem_certificates(cert_pem)?;
        let certificate_der = blocks.swap_remove(0);

        let certificate = Certificate::from_der(certificate_der.as_ref()).map_err(|e| {
            EstError::certificate_parsing(format!("Invalid CA certificate: {}", e))
        })?;

        let spki = &certificate.tbs_certificate.subject_public_key_info;
        let key_algorithm = CaKeyAlgorithm::from_public_key(spki)?;
        let signer = load_signer(parse_pem_private_key(key_pem)?, key_algorithm, spki)?;
        let key_identifier = ca_key_identifier(&certificate)?;

        let cacerts_bundle = build_certs_only_bundle(cert_pem)?;

        let ca = Self {
            certificate,
            certificate_der,
            cert_pem: cert_pem.to_vec(),
            signer,
            key_algorithm,
            key_identifier,
            cacerts_bundle,
        };

        tracing::info!(
            subject = %ca.subject(),
            algorithm = %ca.key_algorithm,
            fingerprint = %ca.fingerprint_hex(),
            "Loaded CA material"
        );

        Ok(ca)
    }

    /// Read the CA certificate and key from PEM files and [`load`](Self::load) them.
    pub fn load_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let cert_path = cert_path.as_ref();
        let key_path = key_path.as_ref();

        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            EstError::config(format!(
                "Failed to read CA certificate {}: {}",
                cert_path.display(),
                e
            ))
        })?;
        let key_pem = std::fs::read(key_path).map_err(|e| {
            EstError::config(format!("Failed to read CA key {}: {}", key_path.display(), e))
        })?;

        Self::load(&cert_pem, &key_pem)
    }

    /// The parsed CA certificate.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// DER encoding of the CA certificate.
    pub fn certificate_der(&self) -> &CertificateDer<'static> {
        &self.certificate_der
    }

    /// The CA subject name, exactly as encoded in the certificate.
    pub fn subject(&self) -> &Name {
        &self.certificate.tbs_certificate.subject
    }

    /// PEM bytes the certificate was loaded from.
    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    /// Base64 certs-only PKCS#7 bundle served by `/cacerts`.
    pub fn cacerts_bundle(&self) -> &[u8] {
        &self.cacerts_bundle
    }

    /// Algorithm of the CA signing key.
    pub fn key_algorithm(&self) -> CaKeyAlgorithm {
        self.key_algorithm
    }

    /// Key identifier placed in the authority key identifier of issued
    /// certificates.
    pub fn key_identifier(&self) -> &[u8] {
        &self.key_identifier
    }

    /// Sign DER bytes with the CA key.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signer
            .sign(message)
            .map_err(|e| EstError::signing(format!("CA key failed to sign: {}", e)))
    }

    fn fingerprint_hex(&self) -> String {
        fingerprint(&self.certificate)
            .map(|fp| format_fingerprint(&fp))
            .unwrap_or_default()
    }
}

impl fmt::Debug for CaMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaMaterial")
            .field("subject", &self.subject().to_string())
            .field("key_algorithm", &self.key_algorithm)
            .field("cacerts_bundle_len", &self.cacerts_bundle.len())
            .finish_non_exhaustive()
    }
}

/// Load the private key and check it against the certificate's public key.
fn load_signer(
    key: PrivateKeyDer<'static>,
    algorithm: CaKeyAlgorithm,
    spki: &SubjectPublicKeyInfoOwned,
) -> Result<Box<dyn Signer>> {
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| EstError::private_key(format!("Unusable CA key: {}", e)))?;

    if signing_key.algorithm() != algorithm.key_family() {
        return Err(EstError::private_key(format!(
            "CA key is {:?} but the CA certificate key is {}",
            signing_key.algorithm(),
            algorithm
        )));
    }

    if let Some(public_key) = signing_key.public_key() {
        let key_spki = SubjectPublicKeyInfoOwned::from_der(public_key.as_ref())
            .map_err(|e| EstError::private_key(format!("Invalid CA public key: {}", e)))?;
        if key_spki.subject_public_key != spki.subject_public_key {
            return Err(EstError::private_key("CA key does not match the CA certificate"));
        }
    }

    signing_key
        .choose_scheme(&[algorithm.signature_scheme()])
        .ok_or_else(|| EstError::private_key(format!("CA key cannot sign as {}", algorithm)))
}

/// The CA's subject key identifier, or one derived from its public key.
fn ca_key_identifier(certificate: &Certificate) -> Result<Vec<u8>> {
    let tbs = &certificate.tbs_certificate;
    let extension = tbs
        .extensions
        .iter()
        .flatten()
        .find(|ext| ext.extn_id == ID_CE_SUBJECT_KEY_IDENTIFIER);

    match extension {
        Some(ext) => {
            let ski = SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                EstError::certificate_parsing(format!("Invalid CA subject key identifier: {}", e))
            })?;
            Ok(ski.0.as_bytes().to_vec())
        }
        None => Ok(key_identifier(&tbs.subject_public_key_info)),
    }
}

/// 160-bit key identifier: the leftmost bits of the SHA-256 hash of the
/// public key bits (RFC 7093 method 1).
pub(crate) fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    let digest = Sha256::digest(spki.subject_public_key.raw_bytes());
    digest[..20].to_vec()
}
