//! Error types for the EST server.
//!
//! This module defines all error types that can occur while loading CA
//! material, building the trust bundle, enrolling clients and inspecting
//! TLS connections. Errors fall into three classes: configuration errors
//! (fatal at startup), client input errors (reported as HTTP 400) and
//! signing errors (reported as HTTP 500).

use thiserror::Error;

/// Result type alias using [`EstError`].
pub type Result<T> = std::result::Result<T, EstError>;

/// Errors that can occur during EST server operations.
#[derive(Debug, Error)]
pub enum EstError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid PEM data.
    #[error("Invalid PEM data: {0}")]
    InvalidPem(String),

    /// Failed to parse X.509 certificate.
    #[error("Certificate parsing error: {0}")]
    CertificateParsing(String),

    /// Failed to parse or use the CA private key.
    #[error("Private key error: {0}")]
    PrivateKey(String),

    /// Failed to build the PKCS#7 certs-only bundle.
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// Failed to parse a CMS/PKCS#7 structure.
    #[error("CMS/PKCS#7 parsing error: {0}")]
    CmsParsing(String),

    /// Failed to generate a CSR.
    #[error("CSR generation error: {0}")]
    Csr(String),

    /// Enrollment request body is not valid base64.
    #[error("invalid base64 encoding")]
    InvalidBase64(#[source] base64::DecodeError),

    /// Enrollment request body is not a DER-encoded PKCS#10 request.
    #[error("invalid CSR encoding")]
    InvalidCsr(String),

    /// CSR self-signature does not verify against its public key.
    #[error("invalid CSR signature")]
    InvalidCsrSignature(String),

    /// The TLS peer presented a certificate that is not valid X.509 DER.
    #[error("invalid client certificate")]
    InvalidPeerCertificate(String),

    /// Inspection was requested over a connection without TLS.
    #[error("No TLS connection")]
    NotTls,

    /// The CA failed to sign an otherwise valid request.
    #[error("Certificate signing failed: {0}")]
    Signing(String),

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EstError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error with the given message.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create an invalid PEM error.
    pub fn invalid_pem(msg: impl Into<String>) -> Self {
        Self::InvalidPem(msg.into())
    }

    /// Create a certificate parsing error with the given message.
    pub fn certificate_parsing(msg: impl Into<String>) -> Self {
        Self::CertificateParsing(msg.into())
    }

    /// Create a private key error with the given message.
    pub fn private_key(msg: impl Into<String>) -> Self {
        Self::PrivateKey(msg.into())
    }

    /// Create a bundle construction error with the given message.
    pub fn bundle(msg: impl Into<String>) -> Self {
        Self::Bundle(msg.into())
    }

    /// Create a CMS parsing error with the given message.
    pub fn cms_parsing(msg: impl Into<String>) -> Self {
        Self::CmsParsing(msg.into())
    }

    /// Create a CSR generation error with the given message.
    pub fn csr(msg: impl Into<String>) -> Self {
        Self::Csr(msg.into())
    }

    /// Create an invalid CSR error with the given detail.
    pub fn invalid_csr(detail: impl Into<String>) -> Self {
        Self::InvalidCsr(detail.into())
    }

    /// Create an invalid CSR signature error with the given detail.
    pub fn invalid_csr_signature(detail: impl Into<String>) -> Self {
        Self::InvalidCsrSignature(detail.into())
    }

    /// Create an invalid peer certificate error.
    pub fn invalid_peer_certificate(detail: impl Into<String>) -> Self {
        Self::InvalidPeerCertificate(detail.into())
    }

    /// Create a signing error with the given message.
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Returns true if the caller's input caused this error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidBase64(_)
                | Self::InvalidCsr(_)
                | Self::InvalidCsrSignature(_)
                | Self::InvalidPeerCertificate(_)
                | Self::NotTls
        )
    }

    /// HTTP status code this error maps to when returned from a handler.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// Short, non-sensitive text suitable for an HTTP response body.
    ///
    /// Client errors describe what was wrong with the request. Server-side
    /// failures are collapsed into a generic message so parser and key
    /// details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidBase64(_)
            | Self::InvalidCsr(_)
            | Self::InvalidCsrSignature(_)
            | Self::InvalidPeerCertificate(_)
            | Self::NotTls => self.to_string(),
            Self::Signing(_) => "certificate issuance failed".to_string(),
            _ => "internal server error".to_string(),
        }
    }
}
