//! CA Certificates operation (GET /cacerts).
//!
//! This module builds the trust bundle served by the CA certificates
//! distribution operation defined in RFC 7030 Section 4.1, plus a few
//! helpers used when logging the loaded CA.

use base64::prelude::*;
use der::Decode;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use crate::error::{EstError, Result};
use crate::tls::parse_pem_certificates;
use crate::types::build_certs_only;

/// Build the base64 certs-only PKCS#7 bundle for a PEM certificate input.
///
/// Every `CERTIFICATE` block in `cert_pem` is included, so a chain file
/// produces a bundle holding the whole chain. The result is base64 with
/// the standard alphabet and no line wrapping.
pub fn build_certs_only_bundle(cert_pem: &[u8]) -> Result<Vec<u8>> {
    let blocks = parse_pem_certificates(cert_pem)
        .map_err(|e| EstError::bundle(format!("No certificates to bundle: {}", e)))?;

    let certificates = blocks
        .iter()
        .map(|der| {
            Certificate::from_der(der.as_ref())
                .map_err(|e| EstError::bundle(format!("Invalid certificate in bundle: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    let der = build_certs_only(&certificates)?;

    tracing::debug!(
        certificates = certificates.len(),
        der_len = der.len(),
        "Built certs-only trust bundle"
    );

    Ok(BASE64_STANDARD.encode(der).into_bytes())
}

/// Compute the SHA-256 fingerprint of a certificate.
///
/// The fingerprint is computed over the DER-encoded certificate.
pub fn fingerprint(cert: &Certificate) -> Result<[u8; 32]> {
    use der::Encode;

    let der = cert
        .to_der()
        .map_err(|e| EstError::certificate_parsing(format!("Failed to encode certificate: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&der);
    Ok(hasher.finalize().into())
}

/// Format a fingerprint as a colon-separated hex string.
///
/// Example output: "AB:CD:EF:01:23:45:..."
pub fn format_fingerprint(fp: &[u8; 32]) -> String {
    fp.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}
