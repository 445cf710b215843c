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

//! JSON serializer implementation.

use crate::serialization::{DeserializeError, SerializeError, Serializer};

/// JSON serializer.
///
/// `JsonSerializer` produces compact, self-describing, human-readable
/// records. It is the default body codec: any peer can decode its output
/// without schema knowledge, which is also why the connection preamble is
/// always JSON regardless of the negotiated body codec.
///
/// Trade-off: larger and slower than [`PostcardSerializer`]
/// (the compact binary alternative).
///
/// [`PostcardSerializer`]: crate::serialization::PostcardSerializer
///
/// # Examples
///
/// ```rust
/// use minirpc::serialization::{JsonSerializer, Serializer};
///
/// let serializer = JsonSerializer::default();
/// let bytes = serializer.serialize(&vec![1, 2, 3]).unwrap();
/// let decoded: Vec<i32> = serializer.deserialize(&bytes).unwrap();
/// assert_eq!(decoded, vec![1, 2, 3]);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Creates a new JSON serializer.
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializeError>
    where
        T: serde::Serialize + ?Sized,
    {
        serde_json::to_vec(value).map_err(Into::into)
    }

    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializeError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(Into::into)
    }

    fn name(&self) -> &'static str {
        "json"
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
    fn test_json_roundtrip() {
        let serializer = JsonSerializer::default();
        let message = TestMessage {
            id: 42,
            text: "Hello, world!".to_string(),
            values: vec![1, 2, 3, 4, 5],
        };

        let bytes = serializer.serialize(&message).unwrap();
        let decoded: TestMessage = serializer.deserialize(&bytes).unwrap();

        assert_eq!(message, decoded);
    }

    #[test]
    fn test_json_empty_fields() {
        let serializer = JsonSerializer::default();
        let message = TestMessage {
            id: 0,
            text: String::new(),
            values: vec![],
        };

        let bytes = serializer.serialize(&message).unwrap();
        let decoded: TestMessage = serializer.deserialize(&bytes).unwrap();

        assert_eq!(message, decoded);
    }

    #[test]
    fn test_json_invalid_data() {
        let serializer = JsonSerializer::default();
        let result: Result<TestMessage, _> = serializer.deserialize(b"not valid json {");
        assert!(result.is_err());
    }

    #[test]
    fn test_json_name() {
        assert_eq!(JsonSerializer::default().name(), "json");
    }

    #[test]
    fn test_json_unicode() {
        let serializer = JsonSerializer::default();
        let message = TestMessage {
            id: 1,
            text: "Hello \"world\" with\nnewlines and 世界".to_string(),
            values: vec![],
        };

        let bytes = serializer.serialize(&message).unwrap();
        let decoded: TestMessage = serializer.deserialize(&bytes).unwrap();

        assert_eq!(message, decoded);
    }
}
