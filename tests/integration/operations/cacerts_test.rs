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

//! Integration tests for GET /cacerts operation

use crate::integration::{
    generate_ecdsa_ca, http_client, TestServer, CONTENT_TYPE_PKCS7, PATH_CACERTS,
};
use der::Encode;
use usg_est_server::types::parse_certs_only;
use usg_est_server::SerialNumberPolicy;

#[tokio::test]
async fn test_successful_cacerts_retrieval() {
    let server = TestServer::start().await;

    let response = http_client()
        .get(server.http_url(PATH_CACERTS))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        CONTENT_TYPE_PKCS7
    );
    assert_eq!(
        response.headers()["content-transfer-encoding"]
            .to_str()
            .unwrap(),
        "base64"
    );

    let body = response.bytes().await.unwrap();
    let certs = parse_certs_only(&body).expect("certs-only bundle");
    assert_eq!(certs.len(), 1);
    assert_eq!(
        certs[0].to_der().unwrap(),
        server.ca.certificate_der().as_ref()
    );
}

#[tokio::test]
async fn test_cacerts_is_stable_across_requests() {
    let server = TestServer::start().await;
    let client = http_client();

    let first = client
        .get(server.http_url(PATH_CACERTS))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let second = client
        .get(server.http_url(PATH_CACERTS))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.as_ref(), server.ca.cacerts_bundle());
}

#[tokio::test]
async fn test_cacerts_over_https() {
    let (cert_pem, key_pem) = generate_ecdsa_ca("ECDSA Test CA");
    let server = TestServer::start_with(
        cert_pem.as_bytes(),
        key_pem.as_bytes(),
        SerialNumberPolicy::Random,
    )
    .await;

    let response = server
        .https_client(None)
        .get(server.https_url(PATH_CACERTS))
        .send()
        .await
        .expect("TLS request failed");

    assert_eq!(response.status(), 200);
    let certs = parse_certs_only(&response.bytes().await.unwrap()).unwrap();
    assert!(certs[0]
        .tbs_certificate
        .subject
        .to_string()
        .contains("CN=ECDSA Test CA"));
}

#[tokio::test]
async fn test_cacerts_rejects_post() {
    let server = TestServer::start().await;

    let response = http_client()
        .post(server.http_url(PATH_CACERTS))
        .body("ignored")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let server = TestServer::start().await;

    let response = http_client()
        .get(server.http_url("/.well-known/est/csrattrs"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}
