//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! A simple register center with heartbeat-based liveness.
//!
//! Servers `POST` their address periodically; clients `GET` the list of
//! servers whose last heartbeat is younger than the TTL. Entries past the
//! TTL are evicted lazily on every query. The registry is best-effort and
//! in-memory only.
//!
//! Wire surface (single handler at [`DEFAULT_REGISTRY_PATH`]):
//!
//! - `GET` → response header `X-Minirpc-Servers: addr1,addr2,...`
//!   (ascending, comma-separated), empty body.
//! - `POST` with request header `X-Minirpc-Server: <addr>` → upsert;
//!   missing or empty header → `500`.
//! - anything else → `405`.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Path the registry handler is mounted at.
pub const DEFAULT_REGISTRY_PATH: &str = "/_minirpc_/registry";

/// Default entry TTL: a server that has not heartbeated for this long is
/// considered dead.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Response header carrying the alive-server list on `GET`.
pub const SERVERS_HEADER: &str = "x-minirpc-servers";

/// Request header carrying a server's own address on `POST`.
pub const SERVER_HEADER: &str = "x-minirpc-server";

/// Errors talking to a registry over HTTP.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry URL did not parse or lacks an authority.
    #[error("rpc registry: invalid url {0}")]
    BadUrl(String),

    /// Connecting to the registry failed.
    #[error("rpc registry: connect error: {source}")]
    Connect {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The HTTP exchange itself failed.
    #[error("rpc registry: request error: {0}")]
    Http(String),

    /// The registry answered with a non-success status.
    #[error("rpc registry: unexpected status {0}")]
    Status(u16),
}

/// In-memory directory of server addresses kept alive by heartbeats.
pub struct Registry {
    timeout: Duration,
    servers: Mutex<HashMap<String, Instant>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Registry {
    /// Creates a registry with the given TTL. A zero TTL means entries
    /// never expire.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Records a heartbeat for `addr`, creating the entry if needed.
    pub fn put_server(&self, addr: &str) {
        let mut servers = self.servers.lock();
        servers.insert(addr.to_string(), Instant::now());
    }

    /// Returns the alive servers in ascending order, evicting every entry
    /// whose last heartbeat is older than the TTL.
    pub fn alive_servers(&self) -> Vec<String> {
        let mut servers = self.servers.lock();
        let timeout = self.timeout;
        let now = Instant::now();
        let mut alive: Vec<String> = Vec::with_capacity(servers.len());
        servers.retain(|addr, last_heartbeat| {
            if timeout.is_zero() || *last_heartbeat + timeout > now {
                alive.push(addr.clone());
                true
            } else {
                false
            }
        });
        alive.sort();
        alive
    }

    /// Builds the axum router serving this registry at
    /// [`DEFAULT_REGISTRY_PATH`].
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route(DEFAULT_REGISTRY_PATH, any(handle))
            .with_state(self)
    }

    /// Serves the registry on a listener until the server fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> io::Result<()> {
        info!("rpc registry path: {DEFAULT_REGISTRY_PATH}");
        axum::serve(listener, self.router()).await
    }
}

async fn handle(
    State(registry): State<Arc<Registry>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    match method {
        Method::GET => {
            let alive = registry.alive_servers().join(",");
            match HeaderValue::from_str(&alive) {
                Ok(value) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(HeaderName::from_static(SERVERS_HEADER), value);
                    (StatusCode::OK, headers).into_response()
                }
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
        Method::POST => {
            let addr = headers
                .get(HeaderName::from_static(SERVER_HEADER))
                .and_then(|value| value.to_str().ok())
                .filter(|addr| !addr.is_empty());
            match addr {
                Some(addr) => {
                    debug!(%addr, "rpc registry: heartbeat");
                    registry.put_server(addr);
                    StatusCode::OK.into_response()
                }
                None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Registers `addr` with the registry and keeps it alive with periodic
/// heartbeats on a background task.
///
/// The first beat is sent before returning so registration failures
/// surface to the caller; the background task stops on its first failure.
/// The default period is the registry's default TTL minus one minute.
pub async fn heartbeat(
    registry: &str,
    addr: &str,
    period: Option<Duration>,
) -> Result<(), RegistryError> {
    let period = period.unwrap_or(DEFAULT_TIMEOUT - Duration::from_secs(60));
    send_heartbeat(registry, addr).await?;

    let registry = registry.to_string();
    let addr = addr.to_string();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // the immediate first tick; already beat above
        loop {
            ticker.tick().await;
            if let Err(e) = send_heartbeat(&registry, &addr).await {
                error!("rpc server: heart beat error: {e}");
                break;
            }
        }
    });
    Ok(())
}

async fn send_heartbeat(registry: &str, addr: &str) -> Result<(), RegistryError> {
    debug!("{addr} send heart beat to registry {registry}");
    let response = http1_request(Method::POST, registry, Some((SERVER_HEADER, addr))).await?;
    if !response.status().is_success() {
        return Err(RegistryError::Status(response.status().as_u16()));
    }
    Ok(())
}

/// One-shot HTTP/1 request over a fresh TCP connection.
pub(crate) async fn http1_request(
    method: Method,
    url: &str,
    header: Option<(&'static str, &str)>,
) -> Result<hyper::Response<Incoming>, RegistryError> {
    let uri: hyper::Uri = url
        .parse()
        .map_err(|_| RegistryError::BadUrl(url.to_string()))?;
    let authority = uri
        .authority()
        .ok_or_else(|| RegistryError::BadUrl(url.to_string()))?
        .clone();

    let stream = TcpStream::connect(authority.as_str())
        .await
        .map_err(|source| RegistryError::Connect { source })?;
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| RegistryError::Http(e.to_string()))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!("rpc registry: connection error: {e}");
        }
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(uri.path())
        .header(hyper::header::HOST, authority.as_str());
    if let Some((name, value)) = header {
        builder = builder.header(HeaderName::from_static(name), value);
    }
    let request = builder
        .body(Full::new(Bytes::new()))
        .map_err(|e| RegistryError::Http(e.to_string()))?;

    sender
        .send_request(request)
        .await
        .map_err(|e| RegistryError::Http(e.to_string()))
}
