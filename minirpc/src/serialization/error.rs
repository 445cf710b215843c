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

//! Serialization error types.

use std::io;
use thiserror::Error;

/// Error that occurs while serializing a value to bytes.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The value could not be encoded in the selected format.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Writing the encoded record to the stream failed.
    #[error("write failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The encoded record exceeds the maximum frame size.
    #[error("frame size {size} exceeds maximum allowed size {max}")]
    FrameTooLarge {
        /// Size of the offending record in bytes.
        size: usize,
        /// The configured maximum in bytes.
        max: usize,
    },
}

impl From<serde_json::Error> for SerializeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Encode(error.to_string())
    }
}

impl From<::postcard::Error> for SerializeError {
    fn from(error: ::postcard::Error) -> Self {
        Self::Encode(error.to_string())
    }
}

/// Error that occurs while deserializing a value from bytes.
#[derive(Debug, Error)]
pub enum DeserializeError {
    /// The bytes did not decode as a value of the expected type.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Reading the record from the stream failed.
    #[error("read failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The record's declared length exceeds the maximum frame size.
    #[error("frame size {size} exceeds maximum allowed size {max}")]
    FrameTooLarge {
        /// Declared size of the record in bytes.
        size: usize,
        /// The configured maximum in bytes.
        max: usize,
    },
}

impl DeserializeError {
    /// Whether this error indicates the peer closed the stream, either
    /// cleanly (end of stream at a record boundary) or mid-record.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io { source } if source.kind() == io::ErrorKind::UnexpectedEof
        )
    }
}

impl From<serde_json::Error> for DeserializeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<::postcard::Error> for DeserializeError {
    fn from(error: ::postcard::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
