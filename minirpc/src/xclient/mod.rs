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

//! Load-balanced, connection-pooling client.
//!
//! An [`XClient`] fronts a [`Discovery`]: every call picks a server by the
//! configured [`SelectMode`], reuses a cached connection to it when one is
//! still healthy, and dials (via `protocol@addr`) otherwise.

mod discovery;

pub use discovery::{
    Discovery, DiscoveryError, RegistryDiscovery, SelectMode, StaticDiscovery,
    DEFAULT_UPDATE_INTERVAL,
};

use crate::client::{Client, ClientError};
use crate::error::Error;
use crate::options::Options;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct BroadcastState<R> {
    error: Option<Error>,
    reply: Option<R>,
}

/// A client that load-balances calls across the servers a [`Discovery`]
/// knows about, caching one [`Client`] per address.
///
/// # Examples
///
/// ```rust,no_run
/// use minirpc::{Options, SelectMode, StaticDiscovery, XClient};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let discovery = Arc::new(StaticDiscovery::new(vec![
///     "tcp@127.0.0.1:9998".to_string(),
///     "tcp@127.0.0.1:9999".to_string(),
/// ]));
/// let xclient = XClient::new(discovery, SelectMode::RoundRobin, Options::default());
///
/// let reply: i32 = xclient
///     .call(&CancellationToken::new(), "Foo.Sum", &(1, 2))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct XClient {
    discovery: Arc<dyn Discovery>,
    mode: SelectMode,
    opts: Options,
    clients: tokio::sync::Mutex<HashMap<String, Client>>,
}

impl XClient {
    /// Creates a load-balanced client.
    pub fn new(discovery: Arc<dyn Discovery>, mode: SelectMode, opts: Options) -> Self {
        Self {
            discovery,
            mode,
            opts,
            clients: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns a healthy client for `rpc_addr`, reusing the cached one when
    /// it is still available and replacing it otherwise.
    async fn dial(&self, rpc_addr: &str) -> Result<Client, ClientError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(rpc_addr) {
            if client.is_available() {
                return Ok(client.clone());
            }
            if let Some(stale) = clients.remove(rpc_addr) {
                let _ = stale.close().await;
            }
        }

        let client = Client::xdial(rpc_addr, self.opts.clone()).await?;
        clients.insert(rpc_addr.to_string(), client.clone());
        Ok(client)
    }

    async fn call_addr<A, R>(
        &self,
        cx: &CancellationToken,
        rpc_addr: &str,
        service_method: &str,
        args: &A,
    ) -> Result<R, Error>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let client = self.dial(rpc_addr).await?;
        Ok(client.call(cx, service_method, args).await?)
    }

    /// Invokes `service_method` on one server chosen by this client's
    /// select mode.
    pub async fn call<A, R>(
        &self,
        cx: &CancellationToken,
        service_method: &str,
        args: &A,
    ) -> Result<R, Error>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let rpc_addr = self.discovery.get(self.mode).await?;
        self.call_addr(cx, &rpc_addr, service_method, args).await
    }

    /// Invokes `service_method` on every known server concurrently.
    ///
    /// Fail-fast: the first error cancels every other in-flight sub-call
    /// and is returned once all of them have wound down. On full success
    /// the first reply to arrive is returned.
    pub async fn broadcast<A, R>(
        &self,
        cx: &CancellationToken,
        service_method: &str,
        args: &A,
    ) -> Result<R, Error>
    where
        A: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Send,
    {
        let servers = self.discovery.get_all().await?;
        if servers.is_empty() {
            return Err(DiscoveryError::NoServers.into());
        }

        let child = cx.child_token();
        let state = Mutex::new(BroadcastState::<R> {
            error: None,
            reply: None,
        });

        let calls = servers.iter().map(|rpc_addr| {
            let child = &child;
            let state = &state;
            async move {
                let result = self
                    .call_addr::<A, R>(child, rpc_addr, service_method, args)
                    .await;
                let mut state = state.lock();
                match result {
                    Err(e) => {
                        if state.error.is_none() {
                            state.error = Some(e);
                            child.cancel();
                        }
                    }
                    Ok(reply) => {
                        if state.reply.is_none() {
                            state.reply = Some(reply);
                        }
                    }
                }
            }
        });
        futures_util::future::join_all(calls).await;

        let state = state.into_inner();
        match state.error {
            Some(e) => Err(e),
            None => state.reply.ok_or_else(|| DiscoveryError::NoServers.into()),
        }
    }

    /// Closes and drops every cached client. Idempotent.
    pub async fn close(&self) {
        let mut clients = self.clients.lock().await;
        for (_, client) in clients.drain() {
            let _ = client.close().await;
        }
    }
}
