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

//! Server discovery for the load-balanced client.

use crate::registry::{self, RegistryError, SERVERS_HEADER};
use async_trait::async_trait;
use axum::http::Method;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Load-balancing policy for [`Discovery::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectMode {
    /// Pick uniformly at random from the current list.
    Random,
    /// Rotate through the list; the starting point is randomised to spread
    /// load across processes.
    RoundRobin,
}

/// Errors raised by discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The current server list is empty.
    #[error("rpc discovery: no available servers")]
    NoServers,

    /// Refreshing from the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Abstract source of current server addresses.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-reads the server list from its origin, if any.
    async fn refresh(&self) -> Result<(), DiscoveryError>;

    /// Replaces the server list.
    async fn update(&self, servers: Vec<String>) -> Result<(), DiscoveryError>;

    /// Selects one server address by `mode`.
    async fn get(&self, mode: SelectMode) -> Result<String, DiscoveryError>;

    /// Returns a copy of the full server list.
    async fn get_all(&self) -> Result<Vec<String>, DiscoveryError>;
}

struct Rotation {
    servers: Vec<String>,
    index: usize,
}

/// Discovery over a hand-maintained server list, without a registry.
pub struct StaticDiscovery {
    inner: RwLock<Rotation>,
}

impl StaticDiscovery {
    /// Creates a discovery over a fixed list of `protocol@addr` addresses.
    pub fn new(servers: Vec<String>) -> Self {
        // Randomised start so multiple processes don't all hit server 0.
        let index = rand::thread_rng().gen_range(0..u32::MAX as usize);
        Self {
            inner: RwLock::new(Rotation { servers, index }),
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn refresh(&self) -> Result<(), DiscoveryError> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<(), DiscoveryError> {
        self.inner.write().servers = servers;
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String, DiscoveryError> {
        let mut inner = self.inner.write();
        let n = inner.servers.len();
        if n == 0 {
            return Err(DiscoveryError::NoServers);
        }
        match mode {
            SelectMode::Random => {
                let pick = rand::thread_rng().gen_range(0..n);
                Ok(inner.servers[pick].clone())
            }
            SelectMode::RoundRobin => {
                // Modulo the current length: the list may have shrunk since
                // the index was last advanced.
                let server = inner.servers[inner.index % n].clone();
                inner.index = (inner.index + 1) % n;
                Ok(server)
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.inner.read().servers.clone())
    }
}

/// Default staleness bound before [`RegistryDiscovery`] re-reads the
/// registry.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Discovery backed by a [`Registry`](crate::registry::Registry) over HTTP.
///
/// The server list is re-fetched lazily: any `get`/`get_all` first refreshes
/// when the cached list is older than the update interval.
pub struct RegistryDiscovery {
    servers: StaticDiscovery,
    registry: String,
    update_interval: Duration,
    last_update: Mutex<Option<Instant>>,
}

impl RegistryDiscovery {
    /// Creates a discovery polling `registry` (a full URL such as
    /// `http://127.0.0.1:9999/_minirpc_/registry`).
    pub fn new(registry: impl Into<String>, update_interval: Option<Duration>) -> Self {
        Self {
            servers: StaticDiscovery::new(Vec::new()),
            registry: registry.into(),
            update_interval: update_interval.unwrap_or(DEFAULT_UPDATE_INTERVAL),
            last_update: Mutex::new(None),
        }
    }

    fn is_fresh(&self) -> bool {
        self.last_update
            .lock()
            .is_some_and(|at| at.elapsed() < self.update_interval)
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<(), DiscoveryError> {
        if self.is_fresh() {
            return Ok(());
        }
        debug!("rpc registry: refresh servers from registry {}", self.registry);

        let response = registry::http1_request(Method::GET, &self.registry, None).await?;
        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()).into());
        }
        let servers: Vec<String> = response
            .headers()
            .get(SERVERS_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(String::from)
            .collect();

        self.servers.update(servers).await?;
        *self.last_update.lock() = Some(Instant::now());
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<(), DiscoveryError> {
        self.servers.update(servers).await?;
        *self.last_update.lock() = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String, DiscoveryError> {
        self.refresh().await?;
        self.servers.get(mode).await
    }

    async fn get_all(&self) -> Result<Vec<String>, DiscoveryError> {
        self.refresh().await?;
        self.servers.get_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::collections::HashSet;

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("tcp@127.0.0.1:{}", 1000 + i)).collect()
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let discovery = StaticDiscovery::new(addresses(4));
        let mut counts: HashMap<String, u32> = HashMap::new();
        for _ in 0..4 * 5 {
            let server = discovery.get(SelectMode::RoundRobin).await.unwrap();
            *counts.entry(server).or_default() += 1;
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&count| count == 5));
    }

    #[tokio::test]
    async fn test_random_stays_in_list() {
        let servers = addresses(3);
        let discovery = StaticDiscovery::new(servers.clone());
        let set: HashSet<_> = servers.into_iter().collect();
        for _ in 0..50 {
            let server = discovery.get(SelectMode::Random).await.unwrap();
            assert!(set.contains(&server));
        }
    }

    #[tokio::test]
    async fn test_empty_list_errors() {
        let discovery = StaticDiscovery::new(Vec::new());
        assert!(matches!(
            discovery.get(SelectMode::Random).await,
            Err(DiscoveryError::NoServers)
        ));
        assert!(discovery.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_robin_survives_shrinking() {
        let discovery = StaticDiscovery::new(addresses(5));
        for _ in 0..3 {
            discovery.get(SelectMode::RoundRobin).await.unwrap();
        }
        discovery.update(addresses(2)).await.unwrap();
        // Must not panic and must return a live address.
        let server = discovery.get(SelectMode::RoundRobin).await.unwrap();
        assert!(addresses(2).contains(&server));
    }

    #[tokio::test]
    async fn test_update_replaces_list() {
        let discovery = StaticDiscovery::new(addresses(2));
        discovery
            .update(vec!["tcp@10.0.0.1:1".to_string()])
            .await
            .unwrap();
        assert_eq!(discovery.get_all().await.unwrap(), vec!["tcp@10.0.0.1:1"]);
    }
}
