//! TLS client certificate inspection (GET /x509/inspect).
//!
//! Reports what the peer presented during the TLS handshake. No chain
//! validation happens here; the listener accepts any client certificate
//! whose handshake signature verifies.

use der::Decode;
use rustls_pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use x509_cert::Certificate;

use crate::error::{EstError, Result};

/// Whether the peer presented a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    /// TLS connection without a client certificate.
    NoCert,
    /// TLS connection with at least one client certificate.
    ClientCert,
}

/// Inspection report returned as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsInspection {
    /// SNI sent by the client, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Certificate status.
    pub status: InspectionStatus,

    /// RFC 4514 subject of the first peer certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl TlsInspection {
    /// Pretty-printed JSON body.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EstError::config(format!("Failed to serialize inspection: {}", e)))
    }
}

/// TLS metadata captured when a connection's handshake completed.
#[derive(Debug, Clone, Default)]
pub struct TlsSession {
    /// SNI host name.
    pub server_name: Option<String>,

    /// Peer certificate chain, leaf first.
    pub peer_certificates: Vec<CertificateDer<'static>>,
}

/// Build an inspection report from a peer certificate chain.
pub fn inspect(peer_certificates: &[Certificate], server_name: Option<&str>) -> TlsInspection {
    let server_name = server_name.filter(|s| !s.is_empty()).map(str::to_string);

    match peer_certificates.first() {
        Some(leaf) => TlsInspection {
            server_name,
            status: InspectionStatus::ClientCert,
            subject: Some(leaf.tbs_certificate.subject.to_string()),
        },
        None => TlsInspection {
            server_name,
            status: InspectionStatus::NoCert,
            subject: None,
        },
    }
}

/// Inspect a connection. `None` means the connection is plain TCP.
pub fn inspect_session(session: Option<&TlsSession>) -> Result<TlsInspection> {
    let session = session.ok_or(EstError::NotTls)?;

    // Only the leaf is reported; the rest of the chain is never decoded.
    let leaf = session
        .peer_certificates
        .first()
        .map(|der| {
            Certificate::from_der(der.as_ref())
                .map_err(|e| EstError::invalid_peer_certificate(e.to_string()))
        })
        .transpose()?;

    let peers = leaf.into_iter().collect::<Vec<_>>();
    let report = inspect(&peers, session.server_name.as_deref());

    match report.status {
        InspectionStatus::ClientCert => tracing::info!(
            server_name = report.server_name.as_deref().unwrap_or(""),
            subject = report.subject.as_deref().unwrap_or(""),
            "Client certificate presented"
        ),
        InspectionStatus::NoCert => tracing::warn!(
            server_name = report.server_name.as_deref().unwrap_or(""),
            "No client certificate presented"
        ),
    }

    Ok(report)
}
