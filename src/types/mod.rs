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

//! EST message types and encoding utilities.
//!
//! This module provides the response types produced by the server and the
//! PKCS#7/CMS certs-only codec used by `/cacerts` and the enrollment
//! endpoints.

mod pkcs7;

pub use pkcs7::{build_certs_only, decode_base64, parse_certs_only};

use base64::prelude::*;
use x509_cert::Certificate;

/// A client certificate issued by a simple enrollment or re-enrollment.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    /// The issued certificate.
    pub certificate: Box<Certificate>,

    /// DER encoding of the certificate as signed.
    pub der: Vec<u8>,
}

impl IssuedCertificate {
    /// Create a new issued certificate from its parsed and DER forms.
    pub fn new(certificate: Certificate, der: Vec<u8>) -> Self {
        Self {
            certificate: Box::new(certificate),
            der,
        }
    }

    /// Subject distinguished name in RFC 4514 form.
    pub fn subject(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }

    /// Serial number as lowercase hex.
    pub fn serial_hex(&self) -> String {
        self.certificate
            .tbs_certificate
            .serial_number
            .as_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Base64 (standard alphabet, unwrapped) of the DER certificate.
    ///
    /// This is the response body of `simpleenroll`.
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.der)
    }
}

/// Content types used in EST protocol.
pub mod content_types {
    /// PKCS#10 CSR content type.
    pub const PKCS10: &str = "application/pkcs10";

    /// PKCS#7 certs-only content type with smime-type parameter.
    pub const PKCS7_CERTS_ONLY: &str = "application/pkcs7-mime; smime-type=certs-only";

    /// Transfer encoding announced on every PKCS#7 response.
    pub const TRANSFER_ENCODING_BASE64: &str = "base64";

    /// Plain text error responses.
    pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

    /// JSON inspection reports.
    pub const JSON: &str = "application/json";
}

/// EST operation paths.
pub mod operations {
    /// Well-known prefix shared by all EST endpoints.
    pub const WELL_KNOWN_PREFIX: &str = "/.well-known/est";

    /// CA certificates endpoint.
    pub const CACERTS: &str = "cacerts";

    /// Simple enrollment endpoint.
    pub const SIMPLE_ENROLL: &str = "simpleenroll";

    /// Simple re-enrollment endpoint.
    pub const SIMPLE_REENROLL: &str = "simplereenroll";

    /// TLS client certificate inspection path (outside the EST prefix).
    pub const INSPECT_PATH: &str = "/x509/inspect";
}
