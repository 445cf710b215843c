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

//! HTTP `CONNECT` upgrade: tunnelling the RPC protocol through HTTP
//! proxies.
//!
//! The client sends a `CONNECT` request; the server answers with a fixed
//! `HTTP/1.0 200 Connected to Mini RPC` status line and from that point the
//! raw stream speaks the native RPC protocol — the HTTP layer is out of the
//! picture. Any other method is answered with `405 Method Not Allowed`.

use crate::server::Server;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

/// Path the RPC `CONNECT` handshake is addressed to.
pub const DEFAULT_RPC_PATH: &str = "/_minirpc_/";

/// Path reserved for a diagnostics handler.
pub const DEFAULT_DEBUG_PATH: &str = "/debug/minirpc";

/// Exact success status line of the upgrade handshake.
pub(crate) const CONNECTED: &str = "HTTP/1.0 200 Connected to Mini RPC";

const METHOD_NOT_ALLOWED: &[u8] = b"HTTP/1.0 405 Method Not Allowed\r\n\
Content-Type: text/plain; charset=utf-8\r\n\r\n405 must CONNECT\n";

impl Server {
    /// Accepts HTTP connections and serves the RPC protocol over the
    /// `CONNECT` upgrade on each. Returns when the listener fails.
    pub async fn accept_http(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "rpc server: accepted http connection");
                    let server = Arc::clone(&self);
                    tokio::spawn(server.serve_http_connection(stream));
                }
                Err(e) => {
                    error!("rpc server: accept error: {e}");
                    return;
                }
            }
        }
    }

    /// Handles one HTTP connection: hijacks the stream on `CONNECT`,
    /// rejects everything else.
    pub async fn serve_http_connection(self: Arc<Self>, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut request_line = String::new();
        match reader.read_line(&mut request_line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        // Drain the request headers; CONNECT carries nothing we need.
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) if line == "\r\n" || line == "\n" => break,
                Ok(_) => {}
            }
        }

        let method = request_line.split_whitespace().next().unwrap_or("");
        if method != "CONNECT" {
            warn!("rpc server: rejecting http method {method}");
            let _ = write_half.write_all(METHOD_NOT_ALLOWED).await;
            return;
        }

        // Note the two bare line feeds: the exact bytes the client expects.
        if write_half
            .write_all(format!("{CONNECTED}\n\n").as_bytes())
            .await
            .is_err()
        {
            return;
        }

        // The HTTP layer is done; the buffered reader carries over so no
        // bytes are lost to the RPC stream.
        self.serve_connection(tokio::io::join(reader, write_half))
            .await;
    }
}
