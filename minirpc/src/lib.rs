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

#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod codec;
pub mod error;
pub mod options;
pub mod registry;
pub mod serialization;
pub mod server;
pub mod service;
pub mod xclient;

pub use client::{Call, Client, ClientError};
pub use codec::{Codec, CodecError, CodecKind, Header};
pub use error::Error;
pub use options::{Options, ProtocolError, MAGIC};
pub use registry::{Registry, RegistryError};
pub use server::{Server, DEFAULT_RPC_PATH};
pub use service::{
    DispatchError, MethodDescriptor, MethodError, RegisterError, Service, ServiceBuilder,
};
pub use xclient::{
    Discovery, DiscoveryError, RegistryDiscovery, SelectMode, StaticDiscovery, XClient,
};
