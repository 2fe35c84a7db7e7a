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

//! Integration tests for POST /simpleenroll and /simplereenroll

use crate::integration::{
    ecdsa_csr_base64, generate_ecdsa_ca, http_client, TestServer, CONTENT_TYPE_PKCS10,
    CONTENT_TYPE_PKCS7, DC_CA_KEY_PEM, DC_CA_PEM, DC_CLIENT_CSR, MULTI_RDN_CSR,
    P384_SHA256_CSR, PATH_SIMPLEENROLL, PATH_SIMPLEREENROLL, RSA_CLIENT_CSR,
};
use base64::prelude::*;
use der::{Decode, Encode};
use x509_cert::request::CertReq;
use usg_est_server::csr::CsrBuilder;
use usg_est_server::types::parse_certs_only;
use usg_est_server::{Certificate, SerialNumberPolicy};

async fn post_csr(server: &TestServer, path: &str, body: impl Into<reqwest::Body>) -> reqwest::Response {
    http_client()
        .post(server.http_url(path))
        .header("Content-Type", CONTENT_TYPE_PKCS10)
        .body(body)
        .send()
        .await
        .expect("request failed")
}

async fn issued_certificate(response: reqwest::Response) -> Certificate {
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        CONTENT_TYPE_PKCS7
    );

    let body = response.bytes().await.unwrap();
    let mut certs = parse_certs_only(&body).expect("certs-only response");
    assert_eq!(certs.len(), 1, "response must carry exactly the issued certificate");
    certs.remove(0)
}

#[tokio::test]
async fn test_successful_enrollment() {
    let server = TestServer::start().await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, ecdsa_csr_base64("client-1")).await;
    let cert = issued_certificate(response).await;

    let tbs = &cert.tbs_certificate;
    assert!(tbs.subject.to_string().contains("CN=client-1"));
    assert_eq!(tbs.issuer.to_string(), server.ca.subject().to_string());

    let lifetime =
        tbs.validity.not_after.to_unix_duration() - tbs.validity.not_before.to_unix_duration();
    assert_eq!(lifetime.as_secs(), 24 * 60 * 60);
    assert_eq!(server.enroller.issued_count(), 1);
}

#[tokio::test]
async fn test_issued_certificate_is_client_auth_only() {
    let server = TestServer::start().await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, ecdsa_csr_base64("client-1")).await;
    let der = issued_certificate(response).await.to_der().unwrap();

    let (_, cert) = x509_parser::parse_x509_certificate(&der).unwrap();
    let eku = cert.extended_key_usage().unwrap().unwrap().value;
    assert!(eku.client_auth);
    assert!(!eku.server_auth);
    assert!(cert.basic_constraints().unwrap().is_none());

    let (_, ca) =
        x509_parser::parse_x509_certificate(server.ca.certificate_der().as_ref()).unwrap();
    cert.verify_signature(Some(ca.public_key()))
        .expect("issued certificate must verify against the CA key");
}

#[tokio::test]
async fn test_enroll_rsa_csr_with_ecdsa_ca() {
    let (cert_pem, key_pem) = generate_ecdsa_ca("ECDSA Issuing CA");
    let server = TestServer::start_with(
        cert_pem.as_bytes(),
        key_pem.as_bytes(),
        SerialNumberPolicy::Random,
    )
    .await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, RSA_CLIENT_CSR.to_vec()).await;
    let cert = issued_certificate(response).await;

    assert!(cert
        .tbs_certificate
        .issuer
        .to_string()
        .contains("CN=ECDSA Issuing CA"));
}

/// The issued certificate must carry the request's subject and key
/// exactly as encoded, and the CA subject as issuer.
fn assert_request_copied(server: &TestServer, csr_b64: &[u8], cert: &Certificate) {
    let csr_der = BASE64_STANDARD.decode(csr_b64.trim_ascii()).unwrap();
    let request = CertReq::from_der(&csr_der).unwrap();
    let tbs = &cert.tbs_certificate;

    assert_eq!(
        tbs.subject.to_der().unwrap(),
        request.info.subject.to_der().unwrap()
    );
    assert_eq!(
        tbs.subject_public_key_info.to_der().unwrap(),
        request.info.public_key.to_der().unwrap()
    );
    assert_eq!(
        tbs.issuer.to_der().unwrap(),
        server.ca.subject().to_der().unwrap()
    );

    let der = cert.to_der().unwrap();
    let (_, parsed) = x509_parser::parse_x509_certificate(&der).unwrap();
    let (_, ca) =
        x509_parser::parse_x509_certificate(server.ca.certificate_der().as_ref()).unwrap();
    parsed
        .verify_signature(Some(ca.public_key()))
        .expect("issued certificate must verify against the CA key");
}

#[tokio::test]
async fn test_p384_key_with_sha256_signature() {
    let server = TestServer::start().await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, P384_SHA256_CSR.to_vec()).await;
    let cert = issued_certificate(response).await;

    assert_request_copied(&server, P384_SHA256_CSR, &cert);
}

#[tokio::test]
async fn test_repeated_and_multi_valued_subject_attributes() {
    let server = TestServer::start().await;

    for csr in [DC_CLIENT_CSR, MULTI_RDN_CSR] {
        let response = post_csr(&server, PATH_SIMPLEENROLL, csr.to_vec()).await;
        let cert = issued_certificate(response).await;
        assert_request_copied(&server, csr, &cert);
    }
    assert_eq!(server.enroller.issued_count(), 2);
}

#[tokio::test]
async fn test_ca_subject_with_repeated_attributes() {
    let server =
        TestServer::start_with(DC_CA_PEM, DC_CA_KEY_PEM, SerialNumberPolicy::Random).await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, DC_CLIENT_CSR.to_vec()).await;
    let cert = issued_certificate(response).await;

    assert_request_copied(&server, DC_CLIENT_CSR, &cert);
    assert_eq!(cert.tbs_certificate.issuer.0.len(), 3);
}

#[tokio::test]
async fn test_reenroll_behaves_like_enroll() {
    let server = TestServer::start().await;

    let response = post_csr(&server, PATH_SIMPLEREENROLL, ecdsa_csr_base64("renewing")).await;
    let cert = issued_certificate(response).await;

    assert!(cert.tbs_certificate.subject.to_string().contains("CN=renewing"));
    assert_eq!(server.enroller.issued_count(), 1);
}

#[tokio::test]
async fn test_multiline_base64_body() {
    let server = TestServer::start().await;

    let (der, _) = CsrBuilder::new().common_name("wrapped").build().unwrap();
    let encoded = BASE64_STANDARD.encode(der);
    let body = encoded
        .as_bytes()
        .chunks(64)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\r\n");

    let response = post_csr(&server, PATH_SIMPLEENROLL, body).await;
    issued_certificate(response).await;
}

#[tokio::test]
async fn test_random_serials_are_unique() {
    let server = TestServer::start().await;

    let first = issued_certificate(
        post_csr(&server, PATH_SIMPLEENROLL, ecdsa_csr_base64("a")).await,
    )
    .await;
    let second = issued_certificate(
        post_csr(&server, PATH_SIMPLEENROLL, ecdsa_csr_base64("b")).await,
    )
    .await;

    assert_ne!(
        first.tbs_certificate.serial_number,
        second.tbs_certificate.serial_number
    );
}

#[tokio::test]
async fn test_fixed_serial_number() {
    let (cert_pem, key_pem) = generate_ecdsa_ca("Fixed Serial CA");
    let server = TestServer::start_with(
        cert_pem.as_bytes(),
        key_pem.as_bytes(),
        SerialNumberPolicy::Fixed(2),
    )
    .await;

    let cert = issued_certificate(
        post_csr(&server, PATH_SIMPLEENROLL, ecdsa_csr_base64("fixed")).await,
    )
    .await;

    assert_eq!(cert.tbs_certificate.serial_number.as_bytes(), &[0x02]);
}

#[tokio::test]
async fn test_invalid_base64_is_rejected() {
    let server = TestServer::start().await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, "!!! not base64 !!!").await;

    assert_eq!(response.status(), 400);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(response.text().await.unwrap(), "invalid base64 encoding");
    assert_eq!(server.enroller.issued_count(), 0);
}

#[tokio::test]
async fn test_garbage_der_is_rejected() {
    let server = TestServer::start().await;

    let body = BASE64_STANDARD.encode(b"definitely not a PKCS#10 request");
    let response = post_csr(&server, PATH_SIMPLEENROLL, body).await;

    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "invalid CSR encoding");
}

#[tokio::test]
async fn test_bad_csr_signature_is_rejected() {
    let server = TestServer::start().await;

    let (mut der, _) = CsrBuilder::new().common_name("forged").build().unwrap();
    let last = der.len() - 1;
    der[last] ^= 0x01;

    let response = post_csr(&server, PATH_SIMPLEENROLL, BASE64_STANDARD.encode(der)).await;

    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "invalid CSR signature");
    assert_eq!(server.enroller.issued_count(), 0);
}

#[tokio::test]
async fn test_empty_body_is_rejected() {
    let server = TestServer::start().await;

    let response = post_csr(&server, PATH_SIMPLEENROLL, "").await;

    assert_eq!(response.status(), 400);
    assert_eq!(server.enroller.issued_count(), 0);
}

#[tokio::test]
async fn test_enroll_over_https() {
    let server = TestServer::start().await;

    let response = server
        .https_client(None)
        .post(server.https_url(PATH_SIMPLEENROLL))
        .header("Content-Type", CONTENT_TYPE_PKCS10)
        .body(ecdsa_csr_base64("over-tls"))
        .send()
        .await
        .expect("TLS request failed");

    let cert = issued_certificate(response).await;
    assert!(cert.tbs_certificate.subject.to_string().contains("CN=over-tls"));
}

#[tokio::test]
async fn test_get_on_enroll_is_not_allowed() {
    let server = TestServer::start().await;

    let response = http_client()
        .get(server.http_url(PATH_SIMPLEENROLL))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
}
