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

//! HTTP surface of the EST server.
//!
//! One axum [`Router`] serves both the plain HTTP and the HTTPS listener.
//! Handlers learn which kind of connection they are on through
//! [`ConnectionInfo`], which is attached per connection via axum's
//! `ConnectInfo` mechanism:
//!
//! - [`TcpListener`] connections carry `tls: None`.
//! - [`TlsListener`] connections carry the SNI and peer certificates
//!   captured when the handshake completed.
//!
//! | Method | Path                              | Handler            |
//! |--------|-----------------------------------|--------------------|
//! | GET    | `/.well-known/est/cacerts`        | trust bundle       |
//! | POST   | `/.well-known/est/simpleenroll`   | enrollment         |
//! | POST   | `/.well-known/est/simplereenroll` | enrollment         |
//! | GET    | `/x509/inspect`                   | TLS inspection     |

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::connect_info::Connected;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::ca::CaMaterial;
use crate::config::EstServerConfig;
use crate::error::{EstError, Result};
use crate::operations::{inspect_session, Enroller, TlsSession};
use crate::tls::build_server_config;
use crate::types::{content_types, operations};

const CONTENT_TRANSFER_ENCODING: HeaderName = HeaderName::from_static("content-transfer-encoding");

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Issuing CA.
    pub ca: Arc<CaMaterial>,
    /// Enrollment engine bound to `ca`.
    pub enroller: Arc<Enroller>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl AppState {
    /// Create state for an enroller, using its CA.
    pub fn new(enroller: Arc<Enroller>) -> Self {
        Self {
            ca: enroller.ca().clone(),
            enroller,
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Load the CA and build the enroller described by `config`.
    pub fn from_config(config: &EstServerConfig) -> Result<Self> {
        let ca = Arc::new(CaMaterial::load_files(
            &config.ca_cert_path,
            &config.ca_key_path,
        )?);
        let enroller = Arc::new(Enroller::new(ca, config.validity(), config.serial_number));

        Ok(Self::new(enroller).with_request_timeout(config.request_timeout()))
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Per-connection metadata made available to handlers.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote socket address.
    pub peer_addr: SocketAddr,
    /// TLS session details; `None` on plain TCP.
    pub tls: Option<TlsSession>,
}

impl<'a> Connected<axum::serve::IncomingStream<'a, TcpListener>> for ConnectionInfo {
    fn connect_info(target: axum::serve::IncomingStream<'a, TcpListener>) -> Self {
        Self {
            peer_addr: *target.remote_addr(),
            tls: None,
        }
    }
}

impl<'a> Connected<axum::serve::IncomingStream<'a, TlsListener>> for ConnectionInfo {
    fn connect_info(target: axum::serve::IncomingStream<'a, TlsListener>) -> Self {
        let (_, conn) = target.io().get_ref();
        let tls = TlsSession {
            server_name: conn.server_name().map(str::to_string),
            peer_certificates: conn
                .peer_certificates()
                .map(|certs| certs.iter().map(|c| c.clone().into_owned()).collect())
                .unwrap_or_default(),
        };

        Self {
            peer_addr: *target.remote_addr(),
            tls: Some(tls),
        }
    }
}

/// Build the EST router.
///
/// Serve it with `into_make_service_with_connect_info::<ConnectionInfo>()`;
/// [`serve_http`] and [`serve_https`] do this.
pub fn router(state: AppState) -> Router {
    let prefix = operations::WELL_KNOWN_PREFIX;
    let timeout = state.request_timeout;

    Router::new()
        .route(&format!("{prefix}/{}", operations::CACERTS), get(cacerts))
        .route(
            &format!("{prefix}/{}", operations::SIMPLE_ENROLL),
            post(simple_enroll),
        )
        .route(
            &format!("{prefix}/{}", operations::SIMPLE_REENROLL),
            post(simple_enroll),
        )
        .route(operations::INSPECT_PATH, get(inspect))
        .with_state(state)
        .layer(request_timeout_layer(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Answer requests that outlive `timeout` with 408 Request Timeout.
fn request_timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

async fn cacerts(State(state): State<AppState>) -> Response {
    pkcs7_response(Bytes::copy_from_slice(state.ca.cacerts_bundle()))
}

async fn simple_enroll(
    State(state): State<AppState>,
    ConnectInfo(conn): ConnectInfo<ConnectionInfo>,
    body: Bytes,
) -> Response {
    debug!(peer_addr = %conn.peer_addr, body_len = body.len(), "Enrollment request");

    let enroller = state.enroller.clone();
    match tokio::task::spawn_blocking(move || enroller.enroll(&body)).await {
        Ok(Ok(issued)) => pkcs7_response(Bytes::from(issued.to_base64())),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!(error = %e, "Enrollment task failed");
            EstError::signing("enrollment task aborted").into_response()
        }
    }
}

async fn inspect(ConnectInfo(conn): ConnectInfo<ConnectionInfo>) -> Response {
    let report = match inspect_session(conn.tls.as_ref()) {
        Ok(report) => report,
        Err(e) => {
            warn!(peer_addr = %conn.peer_addr, error = %e, "Inspection rejected");
            return e.into_response();
        }
    };

    match report.to_json() {
        Ok(json) => ([(header::CONTENT_TYPE, content_types::JSON)], json).into_response(),
        Err(e) => e.into_response(),
    }
}

fn pkcs7_response(body: Bytes) -> Response {
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(content_types::PKCS7_CERTS_ONLY),
            ),
            (
                CONTENT_TRANSFER_ENCODING,
                HeaderValue::from_static(content_types::TRANSFER_ENCODING_BASE64),
            ),
        ],
        body,
    )
        .into_response()
}

impl IntoResponse for EstError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        (
            status,
            [(header::CONTENT_TYPE, content_types::TEXT_PLAIN)],
            self.public_message(),
        )
            .into_response()
    }
}

/// Connections with a completed handshake, waiting for axum.
const HANDSHAKE_BACKLOG: usize = 64;

type Handshaken = (TlsStream<TcpStream>, SocketAddr);

/// Listener that terminates TLS before handing connections to axum.
///
/// TCP connections are accepted by a background task and every handshake
/// runs in its own task, so a client that stalls mid-handshake only holds
/// up itself.
pub struct TlsListener {
    tcp_listener: Arc<TcpListener>,
    acceptor: TlsAcceptor,
    handshake_timeout: Duration,
    tls_debug: bool,
    incoming: Option<mpsc::Receiver<Handshaken>>,
}

impl TlsListener {
    /// Wrap a bound TCP listener.
    pub fn new(tcp_listener: TcpListener, config: Arc<ServerConfig>) -> Self {
        Self {
            tcp_listener: Arc::new(tcp_listener),
            acceptor: TlsAcceptor::from(config),
            handshake_timeout: Duration::from_secs(15),
            tls_debug: false,
            incoming: None,
        }
    }

    /// Abort handshakes that take longer than `timeout`.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Log SNI, protocol, cipher suite and client certificate count of
    /// every handshake at info level.
    pub fn with_tls_debug(mut self, enabled: bool) -> Self {
        self.tls_debug = enabled;
        self
    }

    /// Returns the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp_listener.local_addr()
    }

    /// Start the accept loop. It stops once the receiver is dropped.
    fn spawn_accept_loop(&self) -> mpsc::Receiver<Handshaken> {
        let (tx, rx) = mpsc::channel(HANDSHAKE_BACKLOG);
        let listener = self.tcp_listener.clone();
        let acceptor = self.acceptor.clone();
        let handshake_timeout = self.handshake_timeout;
        let tls_debug = self.tls_debug;

        tokio::spawn(async move {
            loop {
                let (stream, addr) = tokio::select! {
                    _ = tx.closed() => return,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!(error = %e, "TCP accept error");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    },
                };

                let acceptor = acceptor.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await {
                        Ok(Ok(tls_stream)) => {
                            log_handshake(addr, &tls_stream, tls_debug);
                            let _ = tx.send((tls_stream, addr)).await;
                        }
                        Ok(Err(e)) => {
                            warn!(peer_addr = %addr, error = %e, "TLS handshake failed");
                        }
                        Err(_) => {
                            warn!(peer_addr = %addr, "TLS handshake timed out");
                        }
                    }
                });
            }
        });

        rx
    }
}

fn log_handshake(addr: SocketAddr, stream: &TlsStream<TcpStream>, tls_debug: bool) {
    let (_, conn) = stream.get_ref();
    let server_name = conn.server_name().unwrap_or("");
    let version = conn
        .protocol_version()
        .map(|v| format!("{:?}", v))
        .unwrap_or_default();
    let cipher_suite = conn
        .negotiated_cipher_suite()
        .map(|s| format!("{:?}", s.suite()))
        .unwrap_or_default();
    let peer_certificates = conn.peer_certificates().map_or(0, |c| c.len());

    if tls_debug {
        info!(
            peer_addr = %addr,
            server_name,
            version = %version,
            cipher_suite = %cipher_suite,
            peer_certificates,
            "TLS handshake complete"
        );
    } else {
        debug!(
            peer_addr = %addr,
            server_name,
            peer_certificates,
            "TLS handshake complete"
        );
    }
}

impl axum::serve::Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        if self.incoming.is_none() {
            self.incoming = Some(self.spawn_accept_loop());
        }

        match self.incoming.as_mut() {
            Some(incoming) => match incoming.recv().await {
                Some(handshaken) => handshaken,
                // The accept loop never exits while we hold the receiver.
                None => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.tcp_listener.local_addr()
    }
}

/// Serve `app` over plain HTTP until `shutdown` resolves.
pub async fn serve_http<F>(listener: TcpListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<ConnectionInfo>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Serve `app` over HTTPS until `shutdown` resolves.
pub async fn serve_https<F>(listener: TlsListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Starting HTTPS server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<ConnectionInfo>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Run the HTTP and (if enabled) HTTPS servers until Ctrl-C.
pub async fn run(config: EstServerConfig) -> Result<()> {
    config.validate()?;

    let state = AppState::from_config(&config)?;
    let app = router(state);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let shutdown = move || {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    };

    let http_listener = TcpListener::bind(config.http_addr).await?;
    let mut servers = tokio::task::JoinSet::new();
    servers.spawn(serve_http(http_listener, app.clone(), shutdown()));

    if config.https_enabled {
        let (cert_path, key_path) = config.tls_identity_paths();
        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            EstError::config(format!("Failed to read {}: {}", cert_path.display(), e))
        })?;
        let key_pem = std::fs::read(key_path).map_err(|e| {
            EstError::config(format!("Failed to read {}: {}", key_path.display(), e))
        })?;

        let tls_listener = TlsListener::new(
            TcpListener::bind(config.https_addr).await?,
            build_server_config(&cert_pem, &key_pem)?,
        )
        .with_handshake_timeout(config.request_timeout())
        .with_tls_debug(config.tls_debug);

        servers.spawn(serve_https(tls_listener, app, shutdown()));
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down");
        }
        Some(exited) = servers.join_next() => {
            // A listener only returns early on failure.
            let exited = exited.map_err(|e| EstError::config(format!("Server task failed: {}", e)))?;
            exited?;
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(result) = servers.join_next().await {
        if let Ok(Err(e)) = result {
            warn!(error = %e, "Server exited with error during shutdown");
        }
    }

    Ok(())
}
