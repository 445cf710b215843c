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

//! Serialization layer for minirpc.
//!
//! This module provides the pluggable serialization system used for message
//! bodies and frame headers:
//!
//! - **[`Serializer`] trait**: pluggable abstraction over formats
//! - **Backends**: [`JsonSerializer`] (self-describing, default) and
//!   [`PostcardSerializer`] (compact binary)
//! - **[`framing`] module**: length-prefixed records over a byte stream
//! - **Error types**: [`SerializeError`] and [`DeserializeError`]
//!
//! The serializer in effect on a connection is chosen by name during the
//! option handshake; see [`crate::codec`].

mod error;
pub mod framing;
mod json;
mod postcard;
mod traits;

pub use error::{DeserializeError, SerializeError};
pub use json::JsonSerializer;
pub use postcard::PostcardSerializer;
pub use traits::Serializer;
