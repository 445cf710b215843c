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

//! Serialization trait definitions.

use crate::serialization::{DeserializeError, SerializeError};

/// Trait for serializing and deserializing values.
///
/// The `Serializer` trait provides a pluggable abstraction over concrete
/// serialization formats. Implementations must be thread-safe
/// (`Send + Sync + 'static`) so a single instance can serve concurrent
/// requests on one connection.
///
/// # Examples
///
/// ```rust
/// use minirpc::serialization::{JsonSerializer, Serializer};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Debug, PartialEq)]
/// struct Message {
///     id: u32,
///     text: String,
/// }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let serializer = JsonSerializer::default();
/// let message = Message { id: 42, text: "Hello".to_string() };
///
/// let bytes = serializer.serialize(&message)?;
/// let decoded: Message = serializer.deserialize(&bytes)?;
/// assert_eq!(message, decoded);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub trait Serializer: Send + Sync + 'static {
    /// Serializes a value to bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`SerializeError`] if the value cannot be represented in
    /// this format.
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, SerializeError>
    where
        T: serde::Serialize + ?Sized;

    /// Deserializes bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns a [`DeserializeError`] if the bytes are not a valid encoding
    /// of `T` in this format.
    fn deserialize<T>(&self, bytes: &[u8]) -> Result<T, DeserializeError>
    where
        T: serde::de::DeserializeOwned;

    /// Returns the name of this serializer.
    ///
    /// The name is the codec identifier exchanged during the option
    /// handshake; it must be unique and stable.
    fn name(&self) -> &'static str;
}
