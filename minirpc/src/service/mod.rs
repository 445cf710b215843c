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

//! Service registration and method dispatch.
//!
//! A [`Service`] exposes a receiver's methods under `"Service.Method"`
//! names. Methods are registered through a typed builder: each method is a
//! closure `Fn(&Receiver, Args, &mut Reply) -> Result<(), String>` whose
//! bounds encode the eligibility rules — arguments must deserialize, the
//! reply must serialize and start from its `Default` value (collections
//! therefore start empty and callees can insert without allocating).
//! Shapes that don't fit simply cannot be registered.
//!
//! ```rust
//! use minirpc::service::Service;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Args { num1: i32, num2: i32 }
//!
//! struct Foo;
//!
//! let service = Service::build(Foo)
//!     .method("Sum", |_foo: &Foo, args: Args, reply: &mut i32| {
//!         *reply = args.num1 + args.num2;
//!         Ok(())
//!     })
//!     .finish()
//!     .unwrap();
//! assert_eq!(service.name(), "Foo");
//! ```

use crate::codec::CodecKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors registering a service.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The receiver's type name does not begin with an upper-case letter.
    #[error("rpc server: {0} is not a valid service name")]
    InvalidName(String),

    /// A service with this name is already registered.
    #[error("rpc: service already defined: {0}")]
    Duplicate(String),
}

/// Errors resolving a `"Service.Method"` target.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The target string contains no `.` separator.
    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormed(String),

    /// No service is registered under this name.
    #[error("rpc server: can't find service {0}")]
    NoSuchService(String),

    /// The service exists but has no such method.
    #[error("rpc server: can't find method {0}")]
    NoSuchMethod(String),
}

/// Errors invoking a resolved method.
#[derive(Debug, Error)]
pub enum MethodError {
    /// The service has no such method.
    #[error("rpc server: can't find method {0}")]
    NoSuchMethod(String),

    /// The request body did not decode as the method's argument type.
    #[error("rpc server: read body error: {0}")]
    DecodeArgs(String),

    /// The reply failed to encode.
    #[error("rpc server: write reply error: {0}")]
    EncodeReply(String),

    /// The method returned an error; the message travels verbatim.
    #[error("{0}")]
    User(String),
}

type Handler = Box<dyn Fn(CodecKind, &[u8]) -> Result<Vec<u8>, MethodError> + Send + Sync>;

/// One registered method: its adapter plus a call counter.
pub struct MethodDescriptor {
    calls: AtomicU64,
    handler: Handler,
}

impl MethodDescriptor {
    /// How many times this method has been invoked.
    pub fn num_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("calls", &self.num_calls())
            .finish_non_exhaustive()
    }
}

/// A registered receiver exposing its methods by name.
#[derive(Debug)]
pub struct Service {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl Service {
    /// Starts building a service around a receiver.
    ///
    /// The service name is derived from the receiver's concrete type name;
    /// [`ServiceBuilder::finish`] rejects names that do not begin with an
    /// upper-case letter.
    pub fn build<T>(receiver: T) -> ServiceBuilder<T>
    where
        T: Send + Sync + 'static,
    {
        ServiceBuilder {
            receiver: Arc::new(receiver),
            name: short_type_name::<T>(),
            methods: HashMap::new(),
        }
    }

    /// The service's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a method descriptor by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Invokes a method: bumps its call counter, decodes the arguments with
    /// the connection's codec, runs the handler, and encodes the reply.
    pub fn call(
        &self,
        method: &str,
        kind: CodecKind,
        args: &[u8],
    ) -> Result<Vec<u8>, MethodError> {
        let descriptor = self
            .methods
            .get(method)
            .ok_or_else(|| MethodError::NoSuchMethod(method.to_string()))?;
        descriptor.calls.fetch_add(1, Ordering::Relaxed);
        (descriptor.handler)(kind, args)
    }
}

/// Builder collecting a receiver's methods into a [`Service`].
pub struct ServiceBuilder<T> {
    receiver: Arc<T>,
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl<T> ServiceBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Registers a method under `name`.
    ///
    /// The handler receives the receiver, the decoded arguments, and a
    /// mutable reply initialised to `Reply::default()`. Returning `Err`
    /// delivers the message verbatim to the caller.
    pub fn method<A, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        R: serde::Serialize + Default + Send + 'static,
        F: Fn(&T, A, &mut R) -> Result<(), String> + Send + Sync + 'static,
    {
        let receiver = Arc::clone(&self.receiver);
        let adapter = move |kind: CodecKind, bytes: &[u8]| -> Result<Vec<u8>, MethodError> {
            let args: A = kind
                .decode(bytes)
                .map_err(|e| MethodError::DecodeArgs(e.to_string()))?;
            let mut reply = R::default();
            handler(&receiver, args, &mut reply).map_err(MethodError::User)?;
            kind.encode(&reply)
                .map_err(|e| MethodError::EncodeReply(e.to_string()))
        };
        self.methods.insert(
            name.into(),
            MethodDescriptor {
                calls: AtomicU64::new(0),
                handler: Box::new(adapter),
            },
        );
        self
    }

    /// Finalises the service, validating its name.
    pub fn finish(self) -> Result<Service, RegisterError> {
        if !self.name.chars().next().is_some_and(char::is_uppercase) {
            return Err(RegisterError::InvalidName(self.name));
        }
        Ok(Service {
            name: self.name,
            methods: self.methods,
        })
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize)]
    struct Args {
        num1: i32,
        num2: i32,
    }

    struct Foo;

    fn sum_service() -> Service {
        Service::build(Foo)
            .method("Sum", |_: &Foo, args: Args, reply: &mut i32| {
                *reply = args.num1 + args.num2;
                Ok(())
            })
            .method("Fail", |_: &Foo, _args: Args, _reply: &mut i32| {
                Err("boom".to_string())
            })
            .finish()
            .unwrap()
    }

    #[test]
    fn test_name_from_receiver_type() {
        assert_eq!(sum_service().name(), "Foo");
    }

    #[test]
    fn test_call_and_counter() {
        let kind = CodecKind::Json;
        let service = sum_service();

        let args = kind.encode(&Args { num1: 1, num2: 2 }).unwrap();
        let reply = service.call("Sum", kind, &args).unwrap();
        assert_eq!(kind.decode::<i32>(&reply).unwrap(), 3);

        let args = kind.encode(&Args { num1: 7, num2: 49 }).unwrap();
        let reply = service.call("Sum", kind, &args).unwrap();
        assert_eq!(kind.decode::<i32>(&reply).unwrap(), 56);

        assert_eq!(service.method("Sum").unwrap().num_calls(), 2);
        assert_eq!(service.method("Fail").unwrap().num_calls(), 0);
    }

    #[test]
    fn test_user_error_verbatim() {
        let kind = CodecKind::Json;
        let service = sum_service();
        let args = kind.encode(&Args { num1: 0, num2: 0 }).unwrap();

        let err = service.call("Fail", kind, &args).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_unknown_method() {
        let service = sum_service();
        let err = service.call("Missing", CodecKind::Json, &[]).unwrap_err();
        assert!(matches!(err, MethodError::NoSuchMethod(_)));
    }

    #[test]
    fn test_bad_arguments_reported() {
        let service = sum_service();
        let err = service
            .call("Sum", CodecKind::Json, b"not json")
            .unwrap_err();
        assert!(matches!(err, MethodError::DecodeArgs(_)));
    }

    #[test]
    fn test_reply_collections_start_empty() {
        let kind = CodecKind::Json;
        let service = Service::build(Foo)
            .method(
                "Tally",
                |_: &Foo, args: Vec<String>, reply: &mut HashMap<String, u32>| {
                    for word in args {
                        *reply.entry(word).or_default() += 1;
                    }
                    Ok(())
                },
            )
            .finish()
            .unwrap();

        let args = kind
            .encode(&vec!["a".to_string(), "b".to_string(), "a".to_string()])
            .unwrap();
        let reply: HashMap<String, u32> = kind
            .decode(&service.call("Tally", kind, &args).unwrap())
            .unwrap();
        assert_eq!(reply["a"], 2);
        assert_eq!(reply["b"], 1);
    }

    #[allow(non_camel_case_types)]
    struct lowercase;

    #[test]
    fn test_unexported_name_rejected() {
        let result = Service::build(lowercase)
            .method("M", |_: &lowercase, _: i32, _: &mut i32| Ok(()))
            .finish();
        assert!(matches!(result, Err(RegisterError::InvalidName(_))));
    }
}
