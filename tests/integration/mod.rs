//! Integration test utilities and helpers
//!
//! This module provides the common test infrastructure: a loopback EST
//! server with both listeners, CA fixtures and client helpers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use tokio::net::TcpListener;
use tokio::sync::watch;
use usg_est_server::csr::CsrBuilder;
use usg_est_server::server::{serve_http, serve_https};
use usg_est_server::tls::build_server_config;
use usg_est_server::{
    router, AppState, CaMaterial, Enroller, SerialNumberPolicy, TlsListener,
};

/// EST operation paths
pub const PATH_CACERTS: &str = "/.well-known/est/cacerts";
pub const PATH_SIMPLEENROLL: &str = "/.well-known/est/simpleenroll";
pub const PATH_SIMPLEREENROLL: &str = "/.well-known/est/simplereenroll";
pub const PATH_INSPECT: &str = "/x509/inspect";

/// Content types used in EST protocol
pub const CONTENT_TYPE_PKCS7: &str = "application/pkcs7-mime; smime-type=certs-only";
pub const CONTENT_TYPE_PKCS10: &str = "application/pkcs10";

/// Host name the HTTPS client sends as SNI.
pub const TLS_SERVER_NAME: &str = "est.test";

pub const RSA_CA_PEM: &[u8] = include_bytes!("../fixtures/certs/rsa-ca.pem");
pub const RSA_CA_KEY_PEM: &[u8] = include_bytes!("../fixtures/certs/rsa-ca-key.pkcs8.pem");
pub const RSA_CLIENT_CSR: &[u8] = include_bytes!("../fixtures/certs/rsa-client.csr.b64");

/// CA whose subject repeats the DC attribute, with a SEC1 P-384 key.
pub const DC_CA_PEM: &[u8] = include_bytes!("../fixtures/certs/dc-ca.pem");
pub const DC_CA_KEY_PEM: &[u8] = include_bytes!("../fixtures/certs/dc-ca-key.sec1.pem");
pub const DC_CLIENT_CSR: &[u8] = include_bytes!("../fixtures/certs/dc-client.csr.b64");
pub const MULTI_RDN_CSR: &[u8] = include_bytes!("../fixtures/certs/multi-rdn.csr.b64");
/// P-384 key, signed with ecdsa-with-SHA256.
pub const P384_SHA256_CSR: &[u8] = include_bytes!("../fixtures/certs/ec-p384-sha256.csr.b64");

/// EST server listening on loopback HTTP and HTTPS ports.
///
/// Both listeners shut down when the value is dropped.
pub struct TestServer {
    pub http_addr: SocketAddr,
    pub https_addr: SocketAddr,
    pub ca: Arc<CaMaterial>,
    pub enroller: Arc<Enroller>,
    shutdown: watch::Sender<bool>,
}

impl TestServer {
    /// Start a server backed by the RSA fixture CA.
    pub async fn start() -> Self {
        Self::start_with(RSA_CA_PEM, RSA_CA_KEY_PEM, SerialNumberPolicy::Random).await
    }

    /// Start a server for the given CA, which also serves as TLS identity.
    pub async fn start_with(cert_pem: &[u8], key_pem: &[u8], serial: SerialNumberPolicy) -> Self {
        let ca = Arc::new(CaMaterial::load(cert_pem, key_pem).expect("CA should load"));
        let enroller = Arc::new(Enroller::new(
            ca.clone(),
            Duration::from_secs(24 * 60 * 60),
            serial,
        ));
        let app = router(
            AppState::new(enroller.clone()).with_request_timeout(Duration::from_secs(5)),
        );

        let http_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind HTTP");
        let http_addr = http_listener.local_addr().expect("HTTP address");

        let tls_config = build_server_config(cert_pem, key_pem).expect("TLS config");
        let https_listener = TlsListener::new(
            TcpListener::bind("127.0.0.1:0").await.expect("bind HTTPS"),
            tls_config,
        )
        .with_handshake_timeout(Duration::from_secs(5));
        let https_addr = https_listener.local_addr().expect("HTTPS address");

        let (shutdown, rx) = watch::channel(false);
        tokio::spawn(serve_http(http_listener, app.clone(), wait_for_shutdown(rx.clone())));
        tokio::spawn(serve_https(https_listener, app, wait_for_shutdown(rx)));

        Self {
            http_addr,
            https_addr,
            ca,
            enroller,
            shutdown,
        }
    }

    /// URL of `path` on the plain HTTP listener.
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }

    /// URL of `path` on the HTTPS listener, addressed by [`TLS_SERVER_NAME`].
    pub fn https_url(&self, path: &str) -> String {
        format!("https://{}:{}{}", TLS_SERVER_NAME, self.https_addr.port(), path)
    }

    /// Client for the HTTPS listener, optionally presenting `identity`.
    pub fn https_client(&self, identity: Option<reqwest::Identity>) -> reqwest::Client {
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .danger_accept_invalid_certs(true)
            .resolve(TLS_SERVER_NAME, self.https_addr);

        if let Some(identity) = identity {
            builder = builder.identity(identity);
        }

        builder.build().expect("HTTPS client")
    }

    /// Issue a client certificate for `cn` and package it with its key.
    pub fn client_identity(&self, cn: &str) -> reqwest::Identity {
        let (csr_der, key_pair) = CsrBuilder::new()
            .common_name(cn)
            .build()
            .expect("CSR generation");
        let issued = self
            .enroller
            .enroll(BASE64_STANDARD.encode(csr_der).as_bytes())
            .expect("enrollment");

        let mut pem = pem_wrap("CERTIFICATE", &issued.der);
        pem.push_str(&key_pair.serialize_pem());
        reqwest::Identity::from_pem(pem.as_bytes()).expect("client identity")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Client for the plain HTTP listener.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("HTTP client")
}

/// Generate a self-signed ECDSA P-256 CA as PEM (certificate, key).
pub fn generate_ecdsa_ca(cn: &str) -> (String, String) {
    let key = KeyPair::generate().expect("CA key");
    let mut params = CertificateParams::new(Vec::new()).expect("CA params");
    params.distinguished_name.push(DnType::CommonName, cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let cert = params.self_signed(&key).expect("self-signed CA");
    (cert.pem(), key.serialize_pem())
}

/// Base64 of a freshly generated ECDSA CSR for `cn`.
pub fn ecdsa_csr_base64(cn: &str) -> String {
    let (der, _) = CsrBuilder::new()
        .common_name(cn)
        .build()
        .expect("CSR generation");
    BASE64_STANDARD.encode(der)
}

pub fn pem_wrap(label: &str, der: &[u8]) -> String {
    let encoded = BASE64_STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(line).expect("base64 is ASCII"));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_starts_on_loopback() {
        let server = TestServer::start().await;
        assert!(server.http_addr.ip().is_loopback());
        assert_ne!(server.http_addr.port(), server.https_addr.port());
        assert!(server.https_url(PATH_INSPECT).starts_with("https://est.test:"));
    }

    #[test]
    fn test_generated_ca_loads() {
        let (cert_pem, key_pem) = generate_ecdsa_ca("Generated Test CA");
        let ca = CaMaterial::load(cert_pem.as_bytes(), key_pem.as_bytes()).unwrap();
        assert!(ca.subject().to_string().contains("CN=Generated Test CA"));
    }
}
