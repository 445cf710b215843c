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

//! Length-prefixed record framing.
//!
//! Every record on a connection (after the preamble line) is a 4-byte
//! big-endian length followed by that many payload bytes:
//!
//! ```text
//! +------------------+-------------------+
//! | Length (4 bytes) | Payload (N bytes) |
//! +------------------+-------------------+
//! ```
//!
//! A record is whatever the codec considers one unit — a header or a body.
//! Writers flush after every record.

use crate::serialization::{DeserializeError, SerializeError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum record size (16 MB). Guards against a corrupt or hostile length
/// prefix committing the reader to an absurd allocation.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Size of the record length prefix in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Writes one length-prefixed record and flushes.
///
/// # Errors
///
/// Returns a [`SerializeError`] if the payload exceeds [`MAX_FRAME_SIZE`]
/// or the underlying write fails.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), SerializeError>
where
    W: AsyncWrite + Unpin,
{
    let len = payload.len();
    if len > MAX_FRAME_SIZE {
        return Err(SerializeError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    writer
        .write_all(&(len as u32).to_be_bytes())
        .await
        .map_err(|source| SerializeError::Io { source })?;
    writer
        .write_all(payload)
        .await
        .map_err(|source| SerializeError::Io { source })?;
    writer
        .flush()
        .await
        .map_err(|source| SerializeError::Io { source })?;

    Ok(())
}

/// Reads one length-prefixed record.
///
/// # Errors
///
/// Returns a [`DeserializeError`] if the length prefix exceeds
/// [`MAX_FRAME_SIZE`], the read fails, or the stream ends mid-record.
/// End-of-stream at a record boundary surfaces as an
/// [`std::io::ErrorKind::UnexpectedEof`] I/O error, which
/// [`DeserializeError::is_disconnect`] classifies as a clean disconnect.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, DeserializeError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; FRAME_HEADER_SIZE];
    reader
        .read_exact(&mut len_bytes)
        .await
        .map_err(|source| DeserializeError::Io { source })?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(DeserializeError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|source| DeserializeError::Io { source })?;

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"Hello, world!").await.unwrap();

        let mut reader = &buffer[..];
        let decoded = read_frame(&mut reader).await.unwrap();
        assert_eq!(decoded, b"Hello, world!");
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"").await.unwrap();

        assert_eq!(buffer, 0u32.to_be_bytes());

        let mut reader = &buffer[..];
        let decoded = read_frame(&mut reader).await.unwrap();
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_frames() {
        let mut buffer = Vec::new();
        let records: [&[u8]; 3] = [b"first", b"second", b"third"];
        for record in records {
            write_frame(&mut buffer, record).await.unwrap();
        }

        let mut reader = &buffer[..];
        for expected in records {
            assert_eq!(read_frame(&mut reader).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let mut buffer = Vec::new();
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        let result = write_frame(&mut buffer, &payload).await;
        assert!(matches!(result, Err(SerializeError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_oversized_length_prefix() {
        let buffer = ((MAX_FRAME_SIZE as u32) + 1).to_be_bytes();
        let mut reader = &buffer[..];
        let result = read_frame(&mut reader).await;
        assert!(matches!(
            result,
            Err(DeserializeError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_at_boundary_is_disconnect() {
        let mut reader: &[u8] = &[];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_disconnect() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&10u32.to_be_bytes());
        buffer.extend_from_slice(b"short");

        let mut reader = &buffer[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
