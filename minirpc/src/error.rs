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

//! Top-level error type composing the per-layer errors.
//!
//! Each layer defines its own error enum close to the code that raises it;
//! [`Error`] exists for callers that cross layers (the load-balanced client
//! in particular, where one call can fail in discovery, dialing, or the
//! call itself).

use crate::client::ClientError;
use crate::codec::CodecError;
use crate::options::ProtocolError;
use crate::registry::RegistryError;
use crate::serialization::{DeserializeError, SerializeError};
use crate::service::{DispatchError, MethodError, RegisterError};
use crate::xclient::DiscoveryError;
use thiserror::Error;

/// Any error this crate can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection setup failed before a codec existed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Encoding a value or record failed.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Decoding a value or record failed.
    #[error(transparent)]
    Deserialize(#[from] DeserializeError),

    /// A codec read or write failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A `"Service.Method"` target could not be resolved.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Registering a service failed.
    #[error(transparent)]
    Register(#[from] RegisterError),

    /// Invoking a resolved method failed.
    #[error(transparent)]
    Method(#[from] MethodError),

    /// A client operation failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Talking to the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Discovery produced no usable server.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

impl Error {
    /// Whether this is an error the remote service method returned,
    /// delivered verbatim through the response header.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Client(ClientError::Remote(_)))
    }

    /// Whether this error came from using a closing or shut-down client.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Client(ClientError::Shutdown))
    }
}
