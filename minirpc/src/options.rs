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

//! The per-connection option preamble.
//!
//! The first bytes on every RPC connection are a single line of JSON
//! encoding [`Options`]: the magic sentinel, the body codec to use for the
//! rest of the connection, and the connection's timeouts. JSON is used
//! unconditionally here — the preamble must be parseable *before* a codec
//! has been selected — and the line terminator gives the reader an
//! unambiguous end of record.
//!
//! Wire picture:
//!
//! ```text
//! | Options{magic, codec, ...}\n | Header | Body | Header | Body | ...
//! | <------ always JSON ------>  | <- encoded by Options.codec ->
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Magic sentinel marking a connection as speaking this RPC protocol.
pub const MAGIC: u32 = 0x3bef5c;

/// Default client-side bound on TCP connect plus option handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection preamble: selects the body codec and the timeouts that govern
/// the connection.
///
/// A zero duration means unlimited for both timeout fields.
///
/// # Examples
///
/// ```rust
/// use minirpc::options::Options;
/// use std::time::Duration;
///
/// let opts = Options {
///     handle_timeout: Duration::from_millis(500),
///     ..Options::default()
/// };
/// assert_eq!(opts.codec, "json");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Marks this connection as a minirpc connection; must equal [`MAGIC`].
    pub magic: u32,
    /// Identifier of the body codec, resolved by
    /// [`CodecKind::from_name`](crate::codec::CodecKind::from_name).
    pub codec: String,
    /// Client-side bound on connect plus handshake; zero is unlimited.
    pub connect_timeout: Duration,
    /// Server-side bound on producing a response; zero is unlimited.
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            codec: "json".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    /// Creates default options with the given codec id.
    pub fn with_codec(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            ..Self::default()
        }
    }

    /// Writes the preamble line to a stream and flushes.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut line = serde_json::to_vec(self).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        line.push(b'\n');
        writer
            .write_all(&line)
            .await
            .map_err(|source| ProtocolError::Io { source })?;
        writer
            .flush()
            .await
            .map_err(|source| ProtocolError::Io { source })?;
        Ok(())
    }

    /// Reads and validates the preamble line from a buffered stream.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Malformed`] if the line is not valid JSON for
    ///   [`Options`] or the stream ends before a full line arrives.
    /// - [`ProtocolError::BadMagic`] if the magic sentinel does not match.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| ProtocolError::Io { source })?;
        if n == 0 || line.last() != Some(&b'\n') {
            return Err(ProtocolError::Malformed(
                "connection closed before option preamble".to_string(),
            ));
        }

        let opts: Options =
            serde_json::from_slice(&line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if opts.magic != MAGIC {
            return Err(ProtocolError::BadMagic(opts.magic));
        }
        Ok(opts)
    }
}

/// Errors in connection setup, before any codec exists.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The preamble's magic sentinel did not match [`MAGIC`].
    #[error("invalid magic number {0:#x}")]
    BadMagic(u32),

    /// The preamble named a codec this build does not know.
    #[error("invalid codec type {0}")]
    UnknownCodec(String),

    /// The preamble could not be parsed.
    #[error("malformed option preamble: {0}")]
    Malformed(String),

    /// Reading or writing the preamble failed.
    #[error("option exchange failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_options_roundtrip() {
        let opts = Options {
            magic: MAGIC,
            codec: "postcard".to_string(),
            connect_timeout: Duration::from_millis(1500),
            handle_timeout: Duration::from_secs(2),
        };

        let mut buffer = Vec::new();
        opts.write_to(&mut buffer).await.unwrap();
        assert_eq!(*buffer.last().unwrap(), b'\n');

        let mut reader = &buffer[..];
        let decoded = Options::read_from(&mut reader).await.unwrap();
        assert_eq!(decoded, opts);
    }

    #[tokio::test]
    async fn test_zero_durations_roundtrip() {
        let opts = Options {
            connect_timeout: Duration::ZERO,
            handle_timeout: Duration::ZERO,
            ..Options::default()
        };

        let mut buffer = Vec::new();
        opts.write_to(&mut buffer).await.unwrap();

        let mut reader = &buffer[..];
        let decoded = Options::read_from(&mut reader).await.unwrap();
        assert_eq!(decoded.connect_timeout, Duration::ZERO);
        assert_eq!(decoded.handle_timeout, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_bad_magic_rejected() {
        let opts = Options {
            magic: 0xdeadbe,
            ..Options::default()
        };

        let mut buffer = Vec::new();
        opts.write_to(&mut buffer).await.unwrap();

        let mut reader = &buffer[..];
        let err = Options::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic(0xdeadbe)));
    }

    #[tokio::test]
    async fn test_garbage_preamble_rejected() {
        let mut reader: &[u8] = b"GET / HTTP/1.1\n";
        let err = Options::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_truncated_preamble_rejected() {
        let mut reader: &[u8] = b"{\"magic\":392";
        let err = Options::read_from(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }
}
