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

//! Per-frame metadata and the pluggable codec contract.
//!
//! After the option preamble, a connection carries an unbounded sequence of
//! (header, body) record pairs. The [`Codec`] trait owns framing and header
//! encoding; bodies are opaque bytes produced and consumed by the typed
//! adapters in [`crate::service`] and [`crate::client`].
//!
//! Record rule: every header record is followed by exactly one body record.
//! Replies that carry an error use an empty body record, so readers always
//! drain one body per header and framing stays aligned on every path.

use crate::options::ProtocolError;
use crate::serialization::framing;
use crate::serialization::{
    DeserializeError, JsonSerializer, PostcardSerializer, SerializeError, Serializer,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// The "no body" sentinel written with error replies.
pub const EMPTY_BODY: &[u8] = &[];

/// Per-frame metadata.
///
/// `error` is empty on success; on failure it carries a human-readable
/// description and the body record is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Target in `"Service.Method"` form.
    pub service_method: String,
    /// Client-chosen sequence number, unique within a connection.
    pub seq: u64,
    /// Empty on success; the error description otherwise.
    pub error: String,
}

/// Errors raised by a [`Codec`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The codec has been closed; no further writes are possible.
    #[error("codec is closed")]
    Closed,

    /// Encoding or writing a record failed. The codec closes itself.
    #[error(transparent)]
    Encode(#[from] SerializeError),

    /// Reading or decoding a record failed.
    #[error(transparent)]
    Decode(#[from] DeserializeError),
}

impl CodecError {
    /// Whether this error means the peer went away (end of stream or
    /// truncated record) rather than a malformed record.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Decode(e) if e.is_disconnect())
    }
}

/// Pluggable transport codec.
///
/// A codec owns exclusive access to the connection's read side (a single
/// reader task) and serialised access to its write side: [`Codec::write`]
/// emits the header and body as one atomic unit, so records from concurrent
/// writers never interleave on the wire.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Reads the next header record.
    async fn read_header(&self) -> Result<Header, CodecError>;

    /// Reads the next body record as opaque bytes.
    async fn read_body(&self) -> Result<Vec<u8>, CodecError>;

    /// Writes one header record immediately followed by one body record and
    /// flushes. Either both records are fully emitted or the call fails; on
    /// failure the codec closes itself.
    async fn write(&self, header: &Header, body: &[u8]) -> Result<(), CodecError>;

    /// Shuts down the write side. Idempotent.
    async fn close(&self) -> Result<(), CodecError>;
}

/// Codec registry: maps a codec id from the option preamble to a concrete
/// serializer.
///
/// Unknown ids are a fatal connection-setup error on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecKind {
    /// Self-describing JSON records (the default).
    Json,
    /// Compact Postcard binary records.
    Postcard,
}

impl CodecKind {
    /// Resolves a codec id from the option preamble.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownCodec`] for ids this build does not
    /// provide.
    pub fn from_name(name: &str) -> Result<Self, ProtocolError> {
        match name {
            "json" => Ok(Self::Json),
            "postcard" => Ok(Self::Postcard),
            other => Err(ProtocolError::UnknownCodec(other.to_string())),
        }
    }

    /// The id under which this codec is negotiated.
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => JsonSerializer.name(),
            Self::Postcard => PostcardSerializer.name(),
        }
    }

    /// Encodes a typed value as body bytes.
    pub fn encode<T>(self, value: &T) -> Result<Vec<u8>, SerializeError>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Self::Json => JsonSerializer.serialize(value),
            Self::Postcard => PostcardSerializer.serialize(value),
        }
    }

    /// Decodes body bytes into a typed value.
    pub fn decode<T>(self, bytes: &[u8]) -> Result<T, DeserializeError>
    where
        T: DeserializeOwned,
    {
        match self {
            Self::Json => JsonSerializer.deserialize(bytes),
            Self::Postcard => PostcardSerializer.deserialize(bytes),
        }
    }

    /// Constructs a [`FrameCodec`] over split stream halves.
    pub fn new_codec<R, W>(self, reader: R, writer: W) -> FrameCodec<R, W>
    where
        R: AsyncRead + Send + Unpin,
        W: AsyncWrite + Send + Unpin,
    {
        FrameCodec::new(self, reader, writer)
    }
}

/// The built-in codec implementation: length-prefixed records whose
/// payloads are encoded by the negotiated [`CodecKind`].
///
/// The reader half sits behind its own mutex (there is exactly one consumer
/// task per connection); the writer mutex is the per-connection sending
/// lock — held for the full header+body pair and never across a method
/// invocation.
pub struct FrameCodec<R, W> {
    kind: CodecKind,
    reader: Mutex<R>,
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<R, W> FrameCodec<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    /// Wraps split stream halves in a codec.
    pub fn new(kind: CodecKind, reader: R, writer: W) -> Self {
        Self {
            kind,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }

    /// The negotiated codec kind.
    pub fn kind(&self) -> CodecKind {
        self.kind
    }
}

#[async_trait]
impl<R, W> Codec for FrameCodec<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn read_header(&self) -> Result<Header, CodecError> {
        let mut reader = self.reader.lock().await;
        let bytes = framing::read_frame(&mut *reader).await?;
        Ok(self.kind.decode(&bytes)?)
    }

    async fn read_body(&self) -> Result<Vec<u8>, CodecError> {
        let mut reader = self.reader.lock().await;
        Ok(framing::read_frame(&mut *reader).await?)
    }

    async fn write(&self, header: &Header, body: &[u8]) -> Result<(), CodecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CodecError::Closed);
        }
        let header_bytes = self.kind.encode(header)?;

        let mut writer = self.writer.lock().await;
        for record in [header_bytes.as_slice(), body] {
            if let Err(e) = framing::write_frame(&mut *writer, record).await {
                self.closed.store(true, Ordering::Release);
                let _ = writer.shutdown().await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), CodecError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        writer
            .shutdown()
            .await
            .map_err(|source| CodecError::Encode(SerializeError::Io { source }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn duplex_codecs(kind: CodecKind) -> (Arc<dyn Codec>, Arc<dyn Codec>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (ar, aw) = tokio::io::split(a);
        let (br, bw) = tokio::io::split(b);
        (
            Arc::new(kind.new_codec(ar, aw)),
            Arc::new(kind.new_codec(br, bw)),
        )
    }

    #[tokio::test]
    async fn test_header_body_roundtrip() {
        for kind in [CodecKind::Json, CodecKind::Postcard] {
            let (near, far) = duplex_codecs(kind);
            let header = Header {
                service_method: "Foo.Sum".to_string(),
                seq: 7,
                error: String::new(),
            };
            let body = kind.encode(&(1i32, 2i32)).unwrap();

            near.write(&header, &body).await.unwrap();

            assert_eq!(far.read_header().await.unwrap(), header);
            let got: (i32, i32) = kind.decode(&far.read_body().await.unwrap()).unwrap();
            assert_eq!(got, (1, 2));
        }
    }

    #[tokio::test]
    async fn test_error_reply_carries_empty_body() {
        let (near, far) = duplex_codecs(CodecKind::Json);
        let header = Header {
            service_method: "Foo.Sum".to_string(),
            seq: 1,
            error: "boom".to_string(),
        };

        near.write(&header, EMPTY_BODY).await.unwrap();

        assert_eq!(far.read_header().await.unwrap().error, "boom");
        assert!(far.read_body().await.unwrap().is_empty());
    }

    // Concurrent writers must never interleave the records of two frames.
    #[tokio::test]
    async fn test_concurrent_writes_do_not_interleave() {
        let (near, far) = duplex_codecs(CodecKind::Json);
        let kind = CodecKind::Json;

        let mut writers = Vec::new();
        for seq in 0..16u64 {
            let codec = near.clone();
            writers.push(tokio::spawn(async move {
                let header = Header {
                    service_method: "Echo.Echo".to_string(),
                    seq,
                    error: String::new(),
                };
                let body = kind.encode(&vec![seq; seq as usize + 1]).unwrap();
                codec.write(&header, &body).await.unwrap();
            }));
        }

        let mut seen = HashSet::new();
        for _ in 0..16 {
            let header = far.read_header().await.unwrap();
            let body: Vec<u64> = kind.decode(&far.read_body().await.unwrap()).unwrap();
            assert_eq!(body, vec![header.seq; header.seq as usize + 1]);
            assert!(seen.insert(header.seq));
        }
        for writer in writers {
            writer.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (near, _far) = duplex_codecs(CodecKind::Json);
        near.close().await.unwrap();
        let err = near
            .write(&Header::default(), EMPTY_BODY)
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (near, _far) = duplex_codecs(CodecKind::Json);
        near.close().await.unwrap();
        near.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_is_disconnect() {
        let (near, far) = duplex_codecs(CodecKind::Json);
        drop(near);
        let err = far.read_header().await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_unknown_codec_id() {
        assert!(CodecKind::from_name("json").is_ok());
        assert!(CodecKind::from_name("postcard").is_ok());
        assert!(CodecKind::from_name("gob").is_err());
    }
}
