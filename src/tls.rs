//! TLS configuration helpers for the EST server.
//!
//! This module provides PEM parsing helpers shared by the CA loader and the
//! HTTPS listener, and builds the rustls server configuration used to
//! terminate TLS in front of the EST endpoints.
//!
//! The server requests a client certificate on every handshake but neither
//! requires one nor validates its chain. `/x509/inspect` only reports what
//! the peer presented; proof of possession is still enforced because rustls
//! verifies the handshake signature made with the client key.

use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, ServerConfig, SignatureScheme};

use crate::error::{EstError, Result};

/// Build a rustls ServerConfig for the HTTPS listener.
///
/// `cert_pem` may contain a chain; the first certificate is the server's
/// own. The configuration advertises HTTP/1.1 via ALPN.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = parse_pem_certificates(cert_pem)?;
    let key = parse_pem_private_key(key_pem)?;

    let provider = Arc::new(ring::default_provider());
    let verifier = Arc::new(RequestClientCert::new(provider.clone()));

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| EstError::tls(format!("Unsupported protocol versions: {}", e)))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| EstError::tls(format!("Failed to configure server certificate: {}", e)))?;

    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Client certificate verifier that asks for, but never insists on, a
/// client certificate and accepts whatever chain is offered.
#[derive(Debug)]
pub struct RequestClientCert {
    provider: Arc<CryptoProvider>,
}

impl RequestClientCert {
    /// Create a verifier that checks handshake signatures with `provider`.
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ClientCertVerifier for RequestClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Parse PEM-encoded certificates.
///
/// Non-certificate PEM sections are skipped.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EstError::invalid_pem(format!("Failed to parse PEM: {}", e)))?;

    if certs.is_empty() {
        return Err(EstError::invalid_pem("no certificate PEM block found"));
    }

    Ok(certs)
}

/// Parse a PEM-encoded private key.
///
/// Returns the first PKCS#8, PKCS#1 or SEC1 key found; other PEM sections
/// are skipped.
pub fn parse_pem_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem_data);

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => {
                return Ok(PrivateKeyDer::Sec1(key));
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                return Err(EstError::invalid_pem(format!("Failed to parse PEM: {}", e)));
            }
        }
    }

    Err(EstError::invalid_pem("no private key PEM block found"))
}
