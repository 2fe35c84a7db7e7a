//! PKCS#7/CMS certs-only utilities.
//!
//! This module builds and parses the degenerate "certs-only" SignedData
//! structure that EST uses to distribute CA certificates: a `ContentInfo`
//! of type `id-signedData` carrying a certificate set and no signers.

use base64::prelude::*;
use cms::cert::CertificateChoices;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{CertificateSet, EncapsulatedContentInfo, SignedData, SignerInfos};
use const_oid::db::rfc5911::{ID_DATA, ID_SIGNED_DATA};
use der::asn1::SetOfVec;
use der::{Any, Decode, Encode};
use x509_cert::Certificate;

use crate::error::{EstError, Result};

/// Build a DER-encoded certs-only `ContentInfo` from certificates.
///
/// The SignedData has version 1, no digest algorithms, an empty
/// `id-data` encapsulated content and no signer infos. DER requires the
/// certificate SET to be sorted, so input order is not preserved.
pub fn build_certs_only(certificates: &[Certificate]) -> Result<Vec<u8>> {
    if certificates.is_empty() {
        return Err(EstError::bundle("no certificates to bundle"));
    }

    let choices = certificates
        .iter()
        .cloned()
        .map(CertificateChoices::Certificate)
        .collect::<Vec<_>>();

    let certificate_set = SetOfVec::try_from(choices)
        .map_err(|e| EstError::bundle(format!("Failed to build certificate set: {}", e)))?;

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(certificate_set)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::new()),
    };

    let content = Any::encode_from(&signed_data)
        .map_err(|e| EstError::bundle(format!("Failed to encode SignedData: {}", e)))?;

    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content,
    };

    content_info
        .to_der()
        .map_err(|e| EstError::bundle(format!("Failed to encode ContentInfo: {}", e)))
}

/// Parse a base64-encoded PKCS#7 certs-only structure.
pub fn parse_certs_only(body: &[u8]) -> Result<Vec<Certificate>> {
    let der_bytes = decode_base64(body)
        .map_err(|e| EstError::cms_parsing(format!("Invalid base64: {}", e)))?;

    let content_info = ContentInfo::from_der(&der_bytes)
        .map_err(|e| EstError::cms_parsing(format!("Failed to parse ContentInfo: {}", e)))?;

    let signed_data = extract_signed_data(&content_info)?;

    extract_certificates(&signed_data)
}

/// Decode base64 data, ignoring line breaks and other whitespace.
pub fn decode_base64(data: &[u8]) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    BASE64_STANDARD.decode(&cleaned)
}

fn extract_signed_data(content_info: &ContentInfo) -> Result<SignedData> {
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(EstError::cms_parsing(format!(
            "Expected SignedData OID, got {}",
            content_info.content_type
        )));
    }

    let content = content_info
        .content
        .to_der()
        .map_err(|e| EstError::cms_parsing(format!("Failed to encode content: {}", e)))?;

    SignedData::from_der(&content)
        .map_err(|e| EstError::cms_parsing(format!("Failed to parse SignedData: {}", e)))
}

fn extract_certificates(signed_data: &SignedData) -> Result<Vec<Certificate>> {
    let cert_set = match &signed_data.certificates {
        Some(certs) => certs,
        None => return Ok(Vec::new()),
    };

    let mut certificates = Vec::new();

    for cert_choice in cert_set.0.iter() {
        match cert_choice {
            CertificateChoices::Certificate(cert) => certificates.push(cert.clone()),
            CertificateChoices::Other(_) => {
                tracing::warn!("Skipping non-X.509 certificate choice");
            }
        }
    }

    Ok(certificates)
}
