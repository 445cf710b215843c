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

//! Server core: per-connection request serving.
//!
//! The server reads the option preamble, constructs the negotiated codec,
//! then loops reading one (header, body) pair at a time. Every well-formed
//! request is handled on its own task so user code never blocks the read
//! loop; response writes serialise through the codec's sending lock. The
//! loop exits on end of stream and waits for all outstanding handlers
//! before returning.

pub(crate) mod http;

pub use http::{DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};

use crate::codec::{Codec, CodecKind, Header, EMPTY_BODY};
use crate::options::Options;
use crate::service::{DispatchError, MethodError, RegisterError, Service};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// An RPC server holding the registered services.
///
/// A server is shared across connections behind an [`Arc`]; each accepted
/// stream is served by its own task with no cross-connection state.
///
/// # Examples
///
/// ```rust,no_run
/// use minirpc::{Server, Service};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// struct Echo;
///
/// let server = Arc::new(Server::new());
/// server.register(
///     Service::build(Echo)
///         .method("Echo", |_: &Echo, text: String, reply: &mut String| {
///             *reply = text;
///             Ok(())
///         })
///         .finish()?,
/// )?;
///
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
/// server.accept(listener).await;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl Server {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::Duplicate`] if a service with the same name
    /// is already registered.
    pub fn register(&self, service: Service) -> Result<(), RegisterError> {
        let mut services = self.services.write();
        match services.entry(service.name().to_string()) {
            Entry::Occupied(entry) => Err(RegisterError::Duplicate(entry.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(service));
                Ok(())
            }
        }
    }

    /// Resolves a `"Service.Method"` target, verifying the method exists.
    ///
    /// Safe under concurrent registration; lookups take the read side of
    /// the service map.
    pub fn find_service(
        &self,
        service_method: &str,
    ) -> Result<(Arc<Service>, String), DispatchError> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .ok_or_else(|| DispatchError::IllFormed(service_method.to_string()))?;
        let service = self
            .services
            .read()
            .get(service_name)
            .cloned()
            .ok_or_else(|| DispatchError::NoSuchService(service_name.to_string()))?;
        if service.method(method_name).is_none() {
            return Err(DispatchError::NoSuchMethod(method_name.to_string()));
        }
        Ok((service, method_name.to_string()))
    }

    /// Accepts connections on the listener and serves each on its own task.
    ///
    /// Returns when the listener fails.
    pub async fn accept(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "rpc server: accepted connection");
                    let server = Arc::clone(&self);
                    tokio::spawn(server.serve_connection(stream));
                }
                Err(e) => {
                    error!("rpc server: accept error: {e}");
                    return;
                }
            }
        }
    }

    /// Accepts connections on a Unix domain socket listener and serves each
    /// on its own task. Returns when the listener fails.
    #[cfg(unix)]
    pub async fn accept_unix(self: Arc<Self>, listener: tokio::net::UnixListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = ?peer, "rpc server: accepted connection");
                    let server = Arc::clone(&self);
                    tokio::spawn(server.serve_connection(stream));
                }
                Err(e) => {
                    error!("rpc server: accept error: {e}");
                    return;
                }
            }
        }
    }

    /// Serves a single bidirectional stream: option handshake, codec
    /// construction, then the request loop until the peer goes away.
    ///
    /// Illegal preambles (parse error, wrong magic, unknown codec id) are
    /// logged and the connection is closed without a reply.
    pub async fn serve_connection<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let opts = match Options::read_from(&mut reader).await {
            Ok(opts) => opts,
            Err(e) => {
                warn!("rpc server: options error: {e}");
                return;
            }
        };
        let kind = match CodecKind::from_name(&opts.codec) {
            Ok(kind) => kind,
            Err(e) => {
                warn!("rpc server: options error: {e}");
                return;
            }
        };

        let codec: Arc<dyn Codec> = Arc::new(kind.new_codec(reader, write_half));
        self.serve_codec(codec, kind, opts.handle_timeout).await;
    }

    async fn serve_codec(
        self: Arc<Self>,
        codec: Arc<dyn Codec>,
        kind: CodecKind,
        handle_timeout: Duration,
    ) {
        let mut handlers = JoinSet::new();
        loop {
            let mut header = match codec.read_header().await {
                Ok(header) => header,
                Err(e) => {
                    if !e.is_disconnect() {
                        warn!("rpc server: read header error: {e}");
                    }
                    break;
                }
            };

            // The body record always follows the header; consume it even
            // when dispatch fails so framing stays aligned.
            let body = codec.read_body().await;
            let lookup = self.find_service(&header.service_method);
            let (service, method, body) = match (body, lookup) {
                (Err(e), _) => {
                    header.error = format!("rpc server: read body error: {e}");
                    send_response(&codec, &header, EMPTY_BODY).await;
                    continue;
                }
                (Ok(_), Err(e)) => {
                    header.error = e.to_string();
                    send_response(&codec, &header, EMPTY_BODY).await;
                    continue;
                }
                (Ok(body), Ok((service, method))) => (service, method, body),
            };

            handlers.spawn(handle_request(
                Arc::clone(&codec),
                service,
                method,
                header,
                body,
                kind,
                handle_timeout,
            ));
        }

        // Barrier: the connection is done only once every outstanding
        // handler has finished.
        while handlers.join_next().await.is_some() {}
    }
}

/// Handles one request, bounded by `handle_timeout` when non-zero.
///
/// The invocation runs on its own task and signals `called` (the method
/// returned) then `sent` (the response was written). If the timer wins the
/// race against `called`, a synthetic timeout reply is sent and the
/// invocation is left to finish in the background; the signals have
/// capacity 1 so the abandoned task never blocks on them. An in-flight
/// response write is never abandoned mid-frame.
async fn handle_request(
    codec: Arc<dyn Codec>,
    service: Arc<Service>,
    method: String,
    header: Header,
    body: Vec<u8>,
    kind: CodecKind,
    handle_timeout: Duration,
) {
    let (called_tx, mut called_rx) = mpsc::channel::<()>(1);
    let (sent_tx, mut sent_rx) = mpsc::channel::<()>(1);

    let invoke_codec = Arc::clone(&codec);
    let mut invoke_header = header.clone();
    tokio::spawn(async move {
        // User methods are synchronous and may block; keep them off the
        // runtime workers. They are never cancelled, only their response
        // may lose the race below.
        let outcome =
            tokio::task::spawn_blocking(move || service.call(&method, kind, &body)).await;
        let _ = called_tx.send(()).await;
        let result = match outcome {
            Ok(result) => result,
            Err(e) => Err(MethodError::User(format!("rpc server: method panicked: {e}"))),
        };
        match result {
            Ok(reply) => send_response(&invoke_codec, &invoke_header, &reply).await,
            Err(e) => {
                invoke_header.error = e.to_string();
                send_response(&invoke_codec, &invoke_header, EMPTY_BODY).await;
            }
        }
        let _ = sent_tx.send(()).await;
    });

    if handle_timeout.is_zero() {
        let _ = called_rx.recv().await;
        let _ = sent_rx.recv().await;
        return;
    }

    tokio::select! {
        _ = tokio::time::sleep(handle_timeout) => {
            let mut header = header;
            header.error = format!(
                "rpc server: request handle timeout: expect within {handle_timeout:?}"
            );
            send_response(&codec, &header, EMPTY_BODY).await;
        }
        _ = called_rx.recv() => {
            let _ = sent_rx.recv().await;
        }
    }
}

async fn send_response(codec: &Arc<dyn Codec>, header: &Header, body: &[u8]) {
    if let Err(e) = codec.write(header, body).await {
        error!("rpc server: write response error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Args {
        num1: i32,
        num2: i32,
    }

    struct Foo;

    fn test_server() -> Server {
        let server = Server::new();
        server
            .register(
                Service::build(Foo)
                    .method("Sum", |_: &Foo, args: Args, reply: &mut i32| {
                        *reply = args.num1 + args.num2;
                        Ok(())
                    })
                    .finish()
                    .unwrap(),
            )
            .unwrap();
        server
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let server = test_server();
        let result = server.register(
            Service::build(Foo)
                .method("Sum", |_: &Foo, _: Args, _: &mut i32| Ok(()))
                .finish()
                .unwrap(),
        );
        assert!(matches!(result, Err(RegisterError::Duplicate(_))));
    }

    #[test]
    fn test_find_service() {
        let server = test_server();
        let (service, method) = server.find_service("Foo.Sum").unwrap();
        assert_eq!(service.name(), "Foo");
        assert_eq!(method, "Sum");
    }

    #[test]
    fn test_find_service_failures() {
        let server = test_server();
        assert!(matches!(
            server.find_service("FooSum"),
            Err(DispatchError::IllFormed(_))
        ));
        assert!(matches!(
            server.find_service("Bar.Sum"),
            Err(DispatchError::NoSuchService(_))
        ));
        assert!(matches!(
            server.find_service("Foo.Product"),
            Err(DispatchError::NoSuchMethod(_))
        ));
    }

    #[test]
    fn test_split_at_last_dot() {
        let server = Server::new();
        // "a.b.c" resolves service "a.b", method "c".
        let err = server.find_service("a.b.c").unwrap_err();
        assert!(matches!(err, DispatchError::NoSuchService(name) if name == "a.b"));
    }
}
