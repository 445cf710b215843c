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

//! Client side of the HTTP `CONNECT` upgrade.

use crate::client::{Client, ClientError};
use crate::options::Options;
use crate::server::http::CONNECTED;
use crate::server::DEFAULT_RPC_PATH;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

impl Client {
    /// Connects to an RPC server listening on the HTTP `CONNECT` upgrade
    /// path, bounded by `opts.connect_timeout` like [`Client::dial`].
    pub async fn dial_http(addr: &str, opts: Options) -> Result<Self, ClientError> {
        Self::dial_with(addr.to_string(), opts, |addr, opts| async move {
            let stream = TcpStream::connect(&addr)
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            let stream = http_handshake(stream).await?;
            Self::new(stream, opts).await
        })
        .await
    }
}

/// Sends the `CONNECT` request and verifies the server's status line before
/// handing the raw stream over to the RPC protocol.
async fn http_handshake(
    stream: TcpStream,
) -> Result<impl tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static, ClientError>
{
    let (read_half, mut write_half) = stream.into_split();

    write_half
        .write_all(format!("CONNECT {DEFAULT_RPC_PATH} HTTP/1.0\r\n\r\n").as_bytes())
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;

    let mut reader = BufReader::new(read_half);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    let status = status_line.trim_end_matches(['\r', '\n']);
    if status != CONNECTED {
        return Err(ClientError::HttpHandshake(status.to_string()));
    }

    // Consume the remaining response head up to the blank line.
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    // Keep the buffered reader: bytes the server sent right behind its
    // status line must reach the RPC stream.
    Ok(tokio::io::join(reader, write_half))
}
