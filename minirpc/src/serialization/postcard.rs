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

//! Postcard serializer implementation.

use crate::serialization::{DeserializeError, SerializeError, Serializer};

/// Postcard serializer.
///
/// `PostcardSerializer` produces a very compact binary encoding with fast
/// serialization and deserialization. Both peers must agree on the message
/// types; the format is not self-describing.
///
/// # Examples
///
/// ```rust
/// use minirpc::serialization::{PostcardSerializer, Serializer};
///
/// let serializer = PostcardSerializer::default();
/// let bytes = serializer.serialize(&(7u32, "hi")).unwrap();
/// let decoded: (u32, String) = serializer.deserialize(&bytes).unwrap();
/// assert_eq!(decoded, (7, "hi".to_string()));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardSerializer;

impl PostcardSerializer {
    /// Creates a new Postcard serializer.
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for PostcardSerializer {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializeError>
    where
        T: serde::Serialize + ?Sized,
    {
        postcard::to_allocvec(value).map_err(Into::into)
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializeError>
    where
        T: serde::de::DeserializeOwned,
    {
        postcard::from_bytes(bytes).map_err(Into::into)
    }

    fn name(&self) -> &'static str {
        "postcard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct TestMessage {
        id: u32,
        text: String,
        values: Vec<i32>,
    }

    #[test]
    fn test_postcard_roundtrip() {
        let serializer = PostcardSerializer::default();
        let message = TestMessage {
            id: u32::MAX,
            text: "x".repeat(1000),
            values: (0..100).collect(),
        };

        let bytes = serializer.serialize(&message).unwrap();
        let decoded: TestMessage = serializer.deserialize(&bytes).unwrap();

        assert_eq!(message, decoded);
    }

    #[test]
    fn test_postcard_compact() {
        let serializer = PostcardSerializer::default();
        let bytes = serializer.serialize(&1u64).unwrap();
        // Varint encoding: small integers stay small.
        assert_eq!(bytes.len(), 1);
    }

    #[test]
    fn test_postcard_truncated_data() {
        let serializer = PostcardSerializer::default();
        let bytes = serializer
            .serialize(&TestMessage {
                id: 9,
                text: "truncate me".to_string(),
                values: vec![1, 2, 3],
            })
            .unwrap();

        let result: Result<TestMessage, _> = serializer.deserialize(&bytes[..bytes.len() / 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_postcard_name() {
        assert_eq!(PostcardSerializer::default().name(), "postcard");
    }
}
