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

//! Client core: the call multiplexer.
//!
//! One [`Client`] owns one connection and any number of concurrent
//! in-flight calls. Requests carry a strictly monotonic sequence number;
//! a background receiver task matches responses back to their callers
//! purely by that number. A call completes exactly once — with the reply,
//! a server-reported error, a transport error, cancellation, or shutdown.

mod http;

use crate::codec::{Codec, CodecKind, Header};
use crate::options::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors surfaced by client operations.
///
/// Cloneable so a connection failure can fail every pending call with the
/// same error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The client is closing or the connection has shut down.
    #[error("connection is shut down")]
    Shutdown,

    /// Connect plus handshake did not finish within the connect timeout.
    #[error("rpc client: connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    /// The server reported an error for this call; the message is carried
    /// verbatim from `Header.error`.
    #[error("{0}")]
    Remote(String),

    /// The caller's cancellation token fired before the call completed.
    #[error("rpc client: call failed: {0}")]
    Cancelled(String),

    /// Reading or writing the connection failed.
    #[error("rpc client: transport error: {0}")]
    Transport(String),

    /// The arguments failed to encode; nothing was sent.
    #[error("rpc client: encode arguments error: {0}")]
    EncodeArgs(String),

    /// The reply bytes did not decode as the expected type.
    #[error("rpc client: decode reply error: {0}")]
    DecodeReply(String),

    /// The HTTP upgrade handshake was rejected.
    #[error("rpc client: unexpected HTTP response: {0}")]
    HttpHandshake(String),

    /// An address did not match the `protocol@addr` form.
    #[error("rpc client err: wrong format '{0}', expect protocol@addr")]
    BadAddress(String),

    /// The `protocol@addr` protocol is not supported by this build.
    #[error("rpc client: unsupported protocol {0}")]
    UnsupportedProtocol(String),

    /// Connection setup failed before any call was possible.
    #[error("rpc client: options error: {0}")]
    Protocol(String),
}

type CallOutcome = Result<Vec<u8>, ClientError>;

struct ClientState {
    seq: u64,
    pending: HashMap<u64, oneshot::Sender<CallOutcome>>,
    closing: bool,
    shutdown: bool,
}

struct ClientInner {
    codec: Arc<dyn Codec>,
    kind: CodecKind,
    send_lock: tokio::sync::Mutex<()>,
    state: Mutex<ClientState>,
    shutdown: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// An RPC client over one connection.
///
/// Cloning is cheap and clones share the connection; any number of tasks
/// may issue calls concurrently.
///
/// # Examples
///
/// ```rust,no_run
/// use minirpc::{Client, Options};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::dial("127.0.0.1:9999", Options::default()).await?;
/// let reply: i32 = client
///     .call(&CancellationToken::new(), "Foo.Sum", &(1, 2))
///     .await?;
/// println!("sum = {reply}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// An in-flight call issued by [`Client::go`].
///
/// Completion fires exactly once; [`Call::join`] waits for it and decodes
/// the reply.
pub struct Call<R> {
    seq: Option<u64>,
    service_method: String,
    kind: CodecKind,
    done: oneshot::Receiver<CallOutcome>,
    _reply: PhantomData<fn() -> R>,
}

impl<R> Call<R>
where
    R: DeserializeOwned,
{
    /// The sequence number assigned to this call, if it was sent.
    pub fn seq(&self) -> Option<u64> {
        self.seq
    }

    /// The `"Service.Method"` target of this call.
    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// Waits for completion and decodes the reply.
    pub async fn join(self) -> Result<R, ClientError> {
        let bytes = self.done.await.map_err(|_| ClientError::Shutdown)??;
        self.kind
            .decode(&bytes)
            .map_err(|e| ClientError::DecodeReply(e.to_string()))
    }
}

impl Client {
    /// Creates a client over an established stream: validates the codec id,
    /// writes the option preamble, and spawns the receiver task.
    pub async fn new<S>(stream: S, opts: Options) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let kind = CodecKind::from_name(&opts.codec)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        let (read_half, mut write_half) = tokio::io::split(stream);
        opts.write_to(&mut write_half)
            .await
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        let inner = Arc::new(ClientInner {
            codec: Arc::new(kind.new_codec(read_half, write_half)),
            kind,
            send_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(receive(Arc::clone(&inner)));
        Ok(Self { inner })
    }

    /// Connects over TCP, bounded by `opts.connect_timeout` (unbounded when
    /// zero). The bound covers the TCP connect and the option handshake
    /// together.
    pub async fn dial(addr: &str, opts: Options) -> Result<Self, ClientError> {
        Self::dial_with(addr.to_string(), opts, |addr, opts| async move {
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            Self::new(stream, opts).await
        })
        .await
    }

    /// Connects over a Unix domain socket, bounded like [`Client::dial`].
    #[cfg(unix)]
    pub async fn dial_unix(path: &str, opts: Options) -> Result<Self, ClientError> {
        Self::dial_with(path.to_string(), opts, |path, opts| async move {
            let stream = tokio::net::UnixStream::connect(&path)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            Self::new(stream, opts).await
        })
        .await
    }

    /// Dials a `protocol@addr` style address: `http@host:port` for the
    /// HTTP upgrade path, `tcp@host:port` for a raw connection,
    /// `unix@/path` for a Unix socket.
    pub async fn xdial(rpc_addr: &str, opts: Options) -> Result<Self, ClientError> {
        let (protocol, addr) = rpc_addr
            .split_once('@')
            .ok_or_else(|| ClientError::BadAddress(rpc_addr.to_string()))?;
        match protocol {
            "http" => Self::dial_http(addr, opts).await,
            "tcp" => Self::dial(addr, opts).await,
            #[cfg(unix)]
            "unix" => Self::dial_unix(addr, opts).await,
            other => Err(ClientError::UnsupportedProtocol(other.to_string())),
        }
    }

    /// Runs `connect` on a subtask and races it against the connect
    /// timeout. A handshake that loses the race finishes off to the side
    /// and the abandoned client is closed best-effort.
    async fn dial_with<F, Fut>(
        addr: String,
        opts: Options,
        connect: F,
    ) -> Result<Self, ClientError>
    where
        F: FnOnce(String, Options) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Self, ClientError>> + Send,
    {
        let connect_timeout = opts.connect_timeout;
        let (tx, mut rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(connect(addr, opts).await);
        });

        if connect_timeout.is_zero() {
            return rx.await.map_err(|_| ClientError::Shutdown)?;
        }

        let raced = tokio::select! {
            _ = tokio::time::sleep(connect_timeout) => None,
            result = &mut rx => Some(result),
        };
        match raced {
            Some(result) => result.map_err(|_| ClientError::Shutdown)?,
            None => {
                tokio::spawn(async move {
                    if let Ok(Ok(client)) = rx.await {
                        let _ = client.close().await;
                    }
                });
                Err(ClientError::ConnectTimeout(connect_timeout))
            }
        }
    }

    /// Issues a call asynchronously and returns its handle.
    ///
    /// Failures before or during the send (argument encoding, shutdown,
    /// write errors) complete the handle immediately.
    pub async fn go<A, R>(&self, service_method: &str, args: &A) -> Call<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (tx, rx) = oneshot::channel();
        let seq = self.send(service_method, args, tx).await;
        Call {
            seq,
            service_method: service_method.to_string(),
            kind: self.inner.kind,
            done: rx,
            _reply: PhantomData,
        }
    }

    /// Issues a call and waits for it, racing the caller's cancellation
    /// token. Cancellation releases the pending slot; a late response is
    /// drained silently by the receiver.
    pub async fn call<A, R>(
        &self,
        cx: &CancellationToken,
        service_method: &str,
        args: &A,
    ) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut call: Call<R> = self.go(service_method, args).await;
        tokio::select! {
            _ = cx.cancelled() => {
                if let Some(seq) = call.seq {
                    self.remove_call(seq);
                }
                Err(ClientError::Cancelled("context canceled".to_string()))
            }
            outcome = &mut call.done => {
                let bytes = outcome.map_err(|_| ClientError::Shutdown)??;
                call.kind
                    .decode(&bytes)
                    .map_err(|e| ClientError::DecodeReply(e.to_string()))
            }
        }
    }

    /// Whether the client is neither closing nor shut down.
    pub fn is_available(&self) -> bool {
        let state = self.inner.state.lock();
        !state.closing && !state.shutdown
    }

    /// Closes the client. The first close succeeds and fails every pending
    /// call; subsequent closes return [`ClientError::Shutdown`].
    pub async fn close(&self) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock();
            if state.closing {
                return Err(ClientError::Shutdown);
            }
            state.closing = true;
        }
        self.inner.shutdown.cancel();
        self.inner
            .codec
            .close()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn send(
        &self,
        service_method: &str,
        args: &(impl Serialize + ?Sized),
        tx: oneshot::Sender<CallOutcome>,
    ) -> Option<u64> {
        let body = match self.inner.kind.encode(args) {
            Ok(body) => body,
            Err(e) => {
                let _ = tx.send(Err(ClientError::EncodeArgs(e.to_string())));
                return None;
            }
        };

        let _sending = self.inner.send_lock.lock().await;
        let seq = {
            let mut state = self.inner.state.lock();
            if state.closing || state.shutdown {
                drop(state);
                let _ = tx.send(Err(ClientError::Shutdown));
                return None;
            }
            let seq = state.seq;
            state.seq += 1;
            state.pending.insert(seq, tx);
            seq
        };

        let header = Header {
            service_method: service_method.to_string(),
            seq,
            error: String::new(),
        };
        if let Err(e) = self.inner.codec.write(&header, &body).await {
            // The entry may already be gone if the receiver raced us.
            if let Some(tx) = self.remove_call(seq) {
                let _ = tx.send(Err(ClientError::Transport(e.to_string())));
            }
        }
        Some(seq)
    }

    fn remove_call(&self, seq: u64) -> Option<oneshot::Sender<CallOutcome>> {
        self.inner.state.lock().pending.remove(&seq)
    }
}

/// Receiver task: the sole reader of the codec. Matches responses to
/// pending calls by sequence number until the connection dies, then fails
/// everything still pending.
async fn receive(inner: Arc<ClientInner>) {
    let err = loop {
        let header = tokio::select! {
            _ = inner.shutdown.cancelled() => break ClientError::Shutdown,
            header = inner.codec.read_header() => match header {
                Ok(header) => header,
                Err(e) if e.is_disconnect() => break ClientError::Shutdown,
                Err(e) => break ClientError::Transport(e.to_string()),
            }
        };

        let pending = inner.state.lock().pending.remove(&header.seq);
        // One body record always follows, even for error replies; reading
        // it keeps the stream aligned and drains late responses whose call
        // was already removed.
        let body = inner.codec.read_body().await;
        match (pending, body) {
            (None, Ok(_)) => {
                debug!(seq = header.seq, "rpc client: dropping unmatched response");
            }
            (Some(tx), _) if !header.error.is_empty() => {
                let _ = tx.send(Err(ClientError::Remote(header.error)));
            }
            (Some(tx), Ok(bytes)) => {
                let _ = tx.send(Ok(bytes));
            }
            (Some(tx), Err(e)) => {
                let err = ClientError::Transport(e.to_string());
                let _ = tx.send(Err(err.clone()));
                break err;
            }
            (None, Err(e)) => break ClientError::Transport(e.to_string()),
        }
    };
    terminate_calls(&inner, err).await;
}

/// Fails every pending call with `err` and marks the client shut down.
async fn terminate_calls(inner: &Arc<ClientInner>, err: ClientError) {
    let _sending = inner.send_lock.lock().await;
    let mut state = inner.state.lock();
    state.shutdown = true;
    for (_, tx) in state.pending.drain() {
        let _ = tx.send(Err(err.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_xdial_rejects_malformed_address() {
        let err = Client::xdial("127.0.0.1:9999", Options::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::BadAddress(_)));
    }

    #[tokio::test]
    async fn test_xdial_rejects_unknown_protocol() {
        let err = Client::xdial("carrier-pigeon@coop:1", Options::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnsupportedProtocol(_)));
    }

    #[tokio::test]
    async fn test_new_rejects_unknown_codec() {
        let (near, _far) = tokio::io::duplex(1024);
        let err = Client::new(near, Options::with_codec("gob"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
