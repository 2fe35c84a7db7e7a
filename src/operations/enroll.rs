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

//! Simple Enrollment operation (POST /simpleenroll, POST /simplereenroll).
//!
//! This module implements the server side of the simple enrollment
//! operation defined in RFC 7030 Section 4.2. A request body is processed
//! strictly in this order, stopping at the first failure:
//!
//! 1. base64 decode
//! 2. PKCS#10 DER parse
//! 3. CSR self-signature verification (proof of possession)
//! 4. certificate template construction
//! 5. signing with the CA key
//!
//! Only the CSR subject and public key are used. Requested extensions,
//! including subject alternative names, are ignored; every issued
//! certificate is a client-authentication leaf.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use const_oid::db::rfc5280::{
    ID_CE_AUTHORITY_KEY_IDENTIFIER, ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE,
    ID_CE_SUBJECT_KEY_IDENTIFIER, ID_KP_CLIENT_AUTH,
};
use const_oid::ObjectIdentifier;
use der::asn1::{BitString, GeneralizedTime, OctetString, UtcTime};
use der::{DateTime, Decode, Encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x509_cert::certificate::Version;
use x509_cert::ext::pkix::{
    AuthorityKeyIdentifier, ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

use crate::ca::{key_identifier, CaMaterial};
use crate::error::{EstError, Result};
use crate::types::{decode_base64, IssuedCertificate};

/// Default lifetime of issued client certificates.
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// How serial numbers are assigned to issued certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "SerialNumberRepr", into = "SerialNumberRepr")]
pub enum SerialNumberPolicy {
    /// 128-bit random positive serial per certificate.
    #[default]
    Random,
    /// The same serial for every certificate.
    ///
    /// Only useful for reproducing fixed-serial demo deployments.
    Fixed(u64),
}

impl SerialNumberPolicy {
    fn next_serial(&self) -> Result<SerialNumber> {
        let serial = match self {
            Self::Random => {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                // Positive and exactly 16 bytes once DER-encoded.
                bytes[0] = (bytes[0] & 0x7f) | 0x40;
                SerialNumber::new(&bytes)
            }
            Self::Fixed(value) => SerialNumber::new(&minimal_positive_bytes(*value)),
        };

        serial.map_err(|e| EstError::signing(format!("Invalid serial number: {}", e)))
    }
}

/// Big-endian bytes of `value` in minimal positive DER INTEGER form.
fn minimal_positive_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);

    let mut out = Vec::with_capacity(9);
    if bytes[start] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[start..]);
    out
}

impl fmt::Display for SerialNumberPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => f.write_str("random"),
            Self::Fixed(value) => write!(f, "{}", value),
        }
    }
}

impl FromStr for SerialNumberPolicy {
    type Err = EstError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("random") {
            return Ok(Self::Random);
        }
        s.parse::<u64>().map(Self::Fixed).map_err(|_| {
            EstError::config(format!(
                "Invalid serial number policy '{}': expected \"random\" or an integer",
                s
            ))
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SerialNumberRepr {
    Fixed(u64),
    Named(String),
}

impl TryFrom<SerialNumberRepr> for SerialNumberPolicy {
    type Error = EstError;

    fn try_from(repr: SerialNumberRepr) -> Result<Self> {
        match repr {
            SerialNumberRepr::Fixed(value) => Ok(Self::Fixed(value)),
            SerialNumberRepr::Named(name) => name.parse(),
        }
    }
}

impl From<SerialNumberPolicy> for SerialNumberRepr {
    fn from(policy: SerialNumberPolicy) -> Self {
        match policy {
            SerialNumberPolicy::Random => Self::Named("random".to_string()),
            SerialNumberPolicy::Fixed(value) => Self::Fixed(value),
        }
    }
}

/// Issues client certificates from CSRs using a shared CA.
///
/// The enroller holds no per-request state; the only mutable field is the
/// issuance counter, so one instance can serve all connections.
#[derive(Debug)]
pub struct Enroller {
    ca: Arc<CaMaterial>,
    validity: Duration,
    serial: SerialNumberPolicy,
    issued: AtomicU64,
}

impl Enroller {
    /// Create an enroller. Sub-second parts of `validity` are dropped.
    pub fn new(ca: Arc<CaMaterial>, validity: Duration, serial: SerialNumberPolicy) -> Self {
        Self {
            ca,
            validity: Duration::from_secs(validity.as_secs()),
            serial,
            issued: AtomicU64::new(0),
        }
    }

    /// The CA this enroller signs with.
    pub fn ca(&self) -> &Arc<CaMaterial> {
        &self.ca
    }

    /// Lifetime of issued certificates.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Number of certificates signed so far.
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Process a `simpleenroll` request body.
    ///
    /// `request_body` is a base64 DER PKCS#10 request; whitespace and line
    /// breaks are ignored.
    pub fn enroll(&self, request_body: &[u8]) -> Result<IssuedCertificate> {
        let result = self.try_enroll(request_body);

        match &result {
            Ok(issued) => tracing::info!(
                subject = %issued.subject(),
                serial = %issued.serial_hex(),
                validity_secs = self.validity.as_secs(),
                "Issued client certificate"
            ),
            Err(e) if e.is_client_error() => {
                tracing::warn!(error = %e, "Rejected enrollment request")
            }
            Err(e) => tracing::error!(error = %e, "Enrollment failed"),
        }

        result
    }

    fn try_enroll(&self, request_body: &[u8]) -> Result<IssuedCertificate> {
        let csr_der = decode_base64(request_body).map_err(EstError::InvalidBase64)?;

        verify_csr(&csr_der)?;

        let request = CertReq::from_der(&csr_der)
            .map_err(|e| EstError::invalid_csr(e.to_string()))?;
        let info = request.info;

        let ca = &self.ca;
        let algorithm = ca.key_algorithm().signature_algorithm();

        // Subject name and public key are copied from the request as encoded.
        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: self.serial.next_serial()?,
            signature: algorithm.clone(),
            issuer: ca.subject().clone(),
            validity: self.validity_from_now()?,
            extensions: Some(client_extensions(
                &key_identifier(&info.public_key),
                ca.key_identifier(),
            )?),
            subject: info.subject,
            subject_public_key_info: info.public_key,
            issuer_unique_id: None,
            subject_unique_id: None,
        };

        let tbs_der = tbs_certificate
            .to_der()
            .map_err(|e| EstError::signing(format!("Failed to encode certificate: {}", e)))?;
        let signature = ca.sign(&tbs_der)?;

        let certificate = Certificate {
            tbs_certificate,
            signature_algorithm: algorithm,
            signature: BitString::from_bytes(&signature)
                .map_err(|e| EstError::signing(e.to_string()))?,
        };
        let der = certificate
            .to_der()
            .map_err(|e| EstError::signing(format!("Failed to encode certificate: {}", e)))?;

        self.issued.fetch_add(1, Ordering::Relaxed);

        Ok(IssuedCertificate::new(certificate, der))
    }

    /// Validity from the current second to `validity` later.
    fn validity_from_now(&self) -> Result<Validity> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| EstError::signing(format!("Clock before UNIX epoch: {}", e)))?;
        let not_before = Duration::from_secs(now.as_secs());
        let not_after = not_before
            .checked_add(self.validity)
            .ok_or_else(|| EstError::signing("Validity period out of range"))?;

        Ok(Validity {
            not_before: x509_time(not_before)?,
            not_after: x509_time(not_after)?,
        })
    }
}

/// UTCTime through 2049, GeneralizedTime after (RFC 5280 4.1.2.5).
fn x509_time(since_epoch: Duration) -> Result<Time> {
    let out_of_range = |e: der::Error| EstError::signing(format!("Time out of range: {}", e));
    let date_time = DateTime::from_unix_duration(since_epoch).map_err(out_of_range)?;

    if date_time.year() < 2050 {
        Ok(Time::UtcTime(
            UtcTime::from_date_time(date_time).map_err(out_of_range)?,
        ))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
    }
}

/// Extensions of an issued client certificate.
fn client_extensions(subject_key_id: &[u8], authority_key_id: &[u8]) -> Result<Vec<Extension>> {
    let authority_key_id = OctetString::new(authority_key_id)
        .map_err(|e| EstError::signing(e.to_string()))?;
    let subject_key_id = OctetString::new(subject_key_id)
        .map_err(|e| EstError::signing(e.to_string()))?;

    Ok(vec![
        extension(
            ID_CE_KEY_USAGE,
            true,
            &KeyUsage(KeyUsages::DigitalSignature.into()),
        )?,
        extension(
            ID_CE_EXT_KEY_USAGE,
            false,
            &ExtendedKeyUsage(vec![ID_KP_CLIENT_AUTH]),
        )?,
        extension(
            ID_CE_SUBJECT_KEY_IDENTIFIER,
            false,
            &SubjectKeyIdentifier(subject_key_id),
        )?,
        extension(
            ID_CE_AUTHORITY_KEY_IDENTIFIER,
            false,
            &AuthorityKeyIdentifier {
                key_identifier: Some(authority_key_id),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            },
        )?,
    ])
}

fn extension(extn_id: ObjectIdentifier, critical: bool, value: &impl Encode) -> Result<Extension> {
    let der = value
        .to_der()
        .map_err(|e| EstError::signing(format!("Failed to encode extension {}: {}", extn_id, e)))?;

    Ok(Extension {
        extn_id,
        critical,
        extn_value: OctetString::new(der).map_err(|e| EstError::signing(e.to_string()))?,
    })
}

/// Parse a DER PKCS#10 request and verify its self-signature.
pub fn verify_csr(csr_der: &[u8]) -> Result<()> {
    let (rest, csr) = X509CertificationRequest::from_der(csr_der)
        .map_err(|e| EstError::invalid_csr(e.to_string()))?;

    if !rest.is_empty() {
        return Err(EstError::invalid_csr(format!(
            "{} trailing bytes after CSR",
            rest.len()
        )));
    }

    csr.verify_signature()
        .map_err(|e| EstError::invalid_csr_signature(e.to_string()))
}
