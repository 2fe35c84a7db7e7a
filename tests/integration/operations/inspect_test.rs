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

//! Integration tests for GET /x509/inspect

use std::time::Duration;

use crate::integration::{
    generate_ecdsa_ca, http_client, TestServer, PATH_CACERTS, PATH_INSPECT, TLS_SERVER_NAME,
};
use usg_est_server::{InspectionStatus, SerialNumberPolicy, TlsInspection};

async fn inspection(response: reqwest::Response) -> TlsInspection {
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    serde_json::from_str(&response.text().await.unwrap()).expect("JSON inspection report")
}

#[tokio::test]
async fn test_inspect_over_plain_http_is_rejected() {
    let server = TestServer::start().await;

    let response = http_client()
        .get(server.http_url(PATH_INSPECT))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "No TLS connection");
}

#[tokio::test]
async fn test_inspect_without_client_certificate() {
    let server = TestServer::start().await;

    let response = server
        .https_client(None)
        .get(server.https_url(PATH_INSPECT))
        .send()
        .await
        .expect("TLS request failed");
    let report = inspection(response).await;

    assert_eq!(report.status, InspectionStatus::NoCert);
    assert_eq!(report.server_name.as_deref(), Some(TLS_SERVER_NAME));
    assert!(report.subject.is_none());
}

#[tokio::test]
async fn test_inspect_with_client_certificate() {
    let server = TestServer::start().await;
    let identity = server.client_identity("inspector");

    let response = server
        .https_client(Some(identity))
        .get(server.https_url(PATH_INSPECT))
        .send()
        .await
        .expect("mTLS request failed");
    let report = inspection(response).await;

    assert_eq!(report.status, InspectionStatus::ClientCert);
    assert!(report.subject.unwrap().contains("CN=inspector"));
}

#[tokio::test]
async fn test_inspect_with_ecdsa_server_identity() {
    let (cert_pem, key_pem) = generate_ecdsa_ca("ECDSA Server CA");
    let server = TestServer::start_with(
        cert_pem.as_bytes(),
        key_pem.as_bytes(),
        SerialNumberPolicy::Random,
    )
    .await;
    let identity = server.client_identity("ecdsa-client");

    let response = server
        .https_client(Some(identity))
        .get(server.https_url(PATH_INSPECT))
        .send()
        .await
        .expect("mTLS request failed");
    let report = inspection(response).await;

    assert_eq!(report.status, InspectionStatus::ClientCert);
    assert!(report.subject.unwrap().contains("CN=ecdsa-client"));
}

#[tokio::test]
async fn test_plain_http_to_tls_port_does_not_stop_listener() {
    let server = TestServer::start().await;

    // Handshake fails; the listener must keep accepting.
    let _ = http_client()
        .get(format!("http://{}{}", server.https_addr, PATH_INSPECT))
        .send()
        .await;

    let response = server
        .https_client(None)
        .get(server.https_url(PATH_INSPECT))
        .send()
        .await
        .expect("listener should survive a failed handshake");
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_idle_connection_does_not_block_other_clients() {
    let server = TestServer::start().await;

    // Connects but never sends a ClientHello.
    let _idle = tokio::net::TcpStream::connect(server.https_addr)
        .await
        .unwrap();

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        server
            .https_client(None)
            .get(server.https_url(PATH_CACERTS))
            .send(),
    )
    .await
    .expect("HTTPS request stalled behind an idle connection")
    .expect("TLS request failed");
    assert_eq!(response.status(), 200);
}
