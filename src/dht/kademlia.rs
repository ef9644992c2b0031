/* This file is part of nzcore.
 *
 * Copyright (C) 2024-2026 NewZone Project Contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Iterative FIND_NODE/FIND_VALUE/STORE lookups over an abstract
//! `Transport`. Every outstanding request is identified by a short
//! random `rpc_id`; this module doesn't track pending calls itself
//! (that belongs to a real network `Transport` implementation) — it
//! only drives the iterative lookup state machine described in the
//! component design.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use smol::lock::Mutex;

use crate::{
    crypto::primitives,
    dht::{
        kbucket::{Contact, K},
        node_id::NodeId,
        routing_table::RoutingTable,
    },
    error::Result,
};

pub const ALPHA: usize = 3;
pub const REPLICATION: usize = K;
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 60 * 60;
pub const DEFAULT_REPUBLISH_INTERVAL_SECS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub enum RpcRequest {
    Ping,
    FindNode { target: NodeId },
    FindValue { key: String },
    Store { key: String, value: Vec<u8> },
}

#[derive(Clone, Debug)]
pub enum RpcResponse {
    Pong,
    Nodes(Vec<Contact>),
    Value(Vec<u8>),
    /// STORE's acknowledgement reuses the STORE message type rather
    /// than a dedicated ACK, per the source; callers accept any
    /// response carrying the matching `rpc_id` as success.
    Ack,
}

/// Abstract RPC transport: `call` performs one request/response
/// round-trip (including whatever timeout and `rpc_id` bookkeeping the
/// real implementation needs) and resolves or rejects accordingly.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, to: &Contact, rpc_id: String, request: RpcRequest) -> Result<RpcResponse>;
}

#[derive(Clone)]
pub struct KademliaConfig {
    pub k: usize,
    pub alpha: usize,
    pub replication: usize,
    pub rpc_timeout_secs: u64,
    pub refresh_interval_secs: i64,
    pub republish_interval_secs: i64,
}

impl Default for KademliaConfig {
    fn default() -> Self {
        Self {
            k: K,
            alpha: ALPHA,
            replication: REPLICATION,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            republish_interval_secs: DEFAULT_REPUBLISH_INTERVAL_SECS,
        }
    }
}

struct StoredValue {
    value: Vec<u8>,
    #[allow(dead_code)]
    stored_at: i64,
    #[allow(dead_code)]
    stored_by: NodeId,
}

pub struct Kademlia {
    pub local: Contact,
    pub routing_table: Mutex<RoutingTable>,
    storage: Mutex<HashMap<String, StoredValue>>,
    transport: Arc<dyn Transport>,
    pub config: KademliaConfig,
}

impl Kademlia {
    pub fn new(local: Contact, transport: Arc<dyn Transport>, config: KademliaConfig) -> Self {
        let routing_table = RoutingTable::with_refresh_interval(local.id, config.refresh_interval_secs);
        Self { local, routing_table: Mutex::new(routing_table), storage: Mutex::new(HashMap::new()), transport, config }
    }

    /// Every inbound RPC adds the sender to the routing table first.
    pub async fn handle_rpc(&self, from: Contact, request: RpcRequest, now: i64) -> RpcResponse {
        self.routing_table.lock().await.add_node(from.clone(), now).await;

        match request {
            RpcRequest::Ping => RpcResponse::Pong,
            RpcRequest::FindNode { target } => {
                RpcResponse::Nodes(self.routing_table.lock().await.get_closest(&target, self.config.k))
            }
            RpcRequest::FindValue { key } => {
                if let Some(stored) = self.storage.lock().await.get(&key) {
                    RpcResponse::Value(stored.value.clone())
                } else {
                    let target = NodeId::from_string(&key);
                    RpcResponse::Nodes(self.routing_table.lock().await.get_closest(&target, self.config.k))
                }
            }
            RpcRequest::Store { key, value } => {
                self.storage.lock().await.insert(key, StoredValue { value, stored_at: now, stored_by: from.id });
                RpcResponse::Ack
            }
        }
    }

    /// Iteratively resolve the `k` contacts closest to `target`. See
    /// the component design's termination rule: a round that adds no
    /// new contacts decrements a converged-rounds counter seeded at
    /// `alpha`; reaching zero is convergence, not failure.
    pub async fn find_node(&self, target: NodeId, now: i64) -> Vec<Contact> {
        let alpha = self.config.alpha;
        let k = self.config.k;

        let mut candidates = self.routing_table.lock().await.get_closest(&target, alpha.max(k));
        let mut seen: HashSet<NodeId> = candidates.iter().map(|c| c.id).collect();
        seen.insert(self.local.id);
        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut active_queries = alpha;

        loop {
            if candidates.iter().any(|c| c.id == target) {
                break
            }

            candidates.sort_by_key(|c| target.distance(&c.id));
            let to_query: Vec<Contact> =
                candidates.iter().filter(|c| !queried.contains(&c.id)).take(alpha).cloned().collect();
            if to_query.is_empty() {
                break
            }
            for c in &to_query {
                queried.insert(c.id);
            }

            let responses = futures::future::join_all(to_query.iter().map(|c| {
                let transport = self.transport.clone();
                let contact = c.clone();
                let rpc_id = primitives::random_hex(8);
                async move { transport.call(&contact, rpc_id, RpcRequest::FindNode { target }).await }
            }))
            .await;

            let mut added_new = false;
            for response in responses.into_iter().filter_map(std::result::Result::ok) {
                if let RpcResponse::Nodes(nodes) = response {
                    for contact in nodes {
                        if !seen.contains(&contact.id) {
                            seen.insert(contact.id);
                            candidates.push(contact.clone());
                            added_new = true;
                        }
                        self.routing_table.lock().await.add_node(contact, now).await;
                    }
                }
            }

            candidates.sort_by_key(|c| target.distance(&c.id));
            candidates.truncate((k * 4).max(alpha));

            if added_new {
                active_queries = alpha;
            } else {
                active_queries -= 1;
                if active_queries == 0 {
                    break
                }
            }
        }

        candidates.sort_by_key(|c| target.distance(&c.id));
        candidates.truncate(k);
        candidates
    }

    /// Run `find_node(key)`, then STORE in parallel to the resulting
    /// closest contacts. Returns the count of acknowledgements.
    pub async fn put(&self, key: &str, value: Vec<u8>, now: i64) -> usize {
        let target = NodeId::from_string(key);
        let closest = self.find_node(target, now).await;

        let responses = futures::future::join_all(closest.iter().map(|c| {
            let transport = self.transport.clone();
            let contact = c.clone();
            let rpc_id = primitives::random_hex(8);
            let key = key.to_string();
            let value = value.clone();
            async move { transport.call(&contact, rpc_id, RpcRequest::Store { key, value }).await }
        }))
        .await;

        responses.into_iter().filter(std::result::Result::is_ok).count()
    }

    /// Local storage first; otherwise iteratively query via
    /// FIND_VALUE, caching the first value found.
    pub async fn get(&self, key: &str, now: i64) -> Option<Vec<u8>> {
        if let Some(stored) = self.storage.lock().await.get(key) {
            return Some(stored.value.clone())
        }

        let target = NodeId::from_string(key);
        let alpha = self.config.alpha;
        let k = self.config.k;

        let mut candidates = self.routing_table.lock().await.get_closest(&target, alpha.max(k));
        let mut seen: HashSet<NodeId> = candidates.iter().map(|c| c.id).collect();
        seen.insert(self.local.id);
        let mut queried: HashSet<NodeId> = HashSet::new();

        loop {
            candidates.sort_by_key(|c| target.distance(&c.id));
            let to_query: Vec<Contact> =
                candidates.iter().filter(|c| !queried.contains(&c.id)).take(alpha).cloned().collect();
            if to_query.is_empty() {
                return None
            }
            for c in &to_query {
                queried.insert(c.id);
            }

            let responses = futures::future::join_all(to_query.iter().map(|c| {
                let transport = self.transport.clone();
                let contact = c.clone();
                let rpc_id = primitives::random_hex(8);
                let key = key.to_string();
                async move { transport.call(&contact, rpc_id, RpcRequest::FindValue { key }).await }
            }))
            .await;

            for response in responses.into_iter().filter_map(std::result::Result::ok) {
                match response {
                    RpcResponse::Value(value) => {
                        self.storage.lock().await.insert(
                            key.to_string(),
                            StoredValue { value: value.clone(), stored_at: now, stored_by: self.local.id },
                        );
                        return Some(value)
                    }
                    RpcResponse::Nodes(nodes) => {
                        for contact in nodes {
                            if !seen.contains(&contact.id) {
                                seen.insert(contact.id);
                                candidates.push(contact.clone());
                            }
                            self.routing_table.lock().await.add_node(contact, now).await;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Periodic refresh: for every stale bucket, run `find_node` on a
    /// random target sharing its prefix, then mark it refreshed.
    pub async fn refresh_stale_buckets(&self, now: i64) {
        let stale = self.routing_table.lock().await.get_stale_buckets(now);
        for idx in stale {
            let target = self.routing_table.lock().await.get_node_for_refresh(idx);
            self.find_node(target, now).await;
            self.routing_table.lock().await.mark_refreshed(idx, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    struct SimTransport {
        nodes: Mutex<StdHashMap<NodeId, Arc<Kademlia>>>,
    }

    #[async_trait]
    impl Transport for SimTransport {
        async fn call(&self, to: &Contact, _rpc_id: String, request: RpcRequest) -> Result<RpcResponse> {
            let node = self.nodes.lock().await.get(&to.id).cloned();
            let node = node.ok_or(crate::error::Error::UnknownNode(to.id.to_hex()))?;
            let caller_id = NodeId::random(); // anonymous caller identity irrelevant to this simulation
            let from = Contact { id: caller_id, address: "sim".into(), port: 0, last_seen: 0, vector_clock: 0 };
            Ok(node.handle_rpc(from, request, 0).await)
        }
    }

    fn make_contact(id: NodeId) -> Contact {
        Contact { id, address: "sim".into(), port: 0, last_seen: 0, vector_clock: 0 }
    }

    #[test]
    fn iterative_find_node_converges_on_simulated_network() {
        smol::block_on(async {
            let transport = Arc::new(SimTransport { nodes: Mutex::new(StdHashMap::new()) });
            let mut ids = Vec::new();
            for _ in 0..50 {
                let id = NodeId::random();
                ids.push(id);
                let node = Arc::new(Kademlia::new(make_contact(id), transport.clone(), KademliaConfig::default()));
                transport.nodes.lock().await.insert(id, node);
            }

            // Cross-wire every node into every other node's routing table
            // so a single find_node can discover the whole network.
            for &id in &ids {
                let node = transport.nodes.lock().await.get(&id).unwrap().clone();
                for &other in &ids {
                    if other != id {
                        node.routing_table.lock().await.add_node(make_contact(other), 0).await;
                    }
                }
            }

            let querying_node = transport.nodes.lock().await.get(&ids[0]).unwrap().clone();
            let target = NodeId::random();
            let result = querying_node.find_node(target, 0).await;

            assert_eq!(result.len(), K);
            for pair in result.windows(2) {
                assert!(target.distance(&pair[0].id) <= target.distance(&pair[1].id));
            }
        });
    }

    #[test]
    fn put_then_get_round_trips_a_value() {
        smol::block_on(async {
            let transport = Arc::new(SimTransport { nodes: Mutex::new(StdHashMap::new()) });
            let mut ids = Vec::new();
            for _ in 0..10 {
                let id = NodeId::random();
                ids.push(id);
                let node = Arc::new(Kademlia::new(make_contact(id), transport.clone(), KademliaConfig::default()));
                transport.nodes.lock().await.insert(id, node);
            }
            for &id in &ids {
                let node = transport.nodes.lock().await.get(&id).unwrap().clone();
                for &other in &ids {
                    if other != id {
                        node.routing_table.lock().await.add_node(make_contact(other), 0).await;
                    }
                }
            }

            let writer = transport.nodes.lock().await.get(&ids[0]).unwrap().clone();
            let acked = writer.put("hello-key", b"hello-value".to_vec(), 0).await;
            assert!(acked > 0);

            let reader = transport.nodes.lock().await.get(&ids[1]).unwrap().clone();
            let value = reader.get("hello-key", 0).await;
            assert_eq!(value, Some(b"hello-value".to_vec()));
        });
    }

    #[test]
    fn get_returns_none_for_unknown_key() {
        smol::block_on(async {
            let transport = Arc::new(SimTransport { nodes: Mutex::new(StdHashMap::new()) });
            let id = NodeId::random();
            let node = Arc::new(Kademlia::new(make_contact(id), transport.clone(), KademliaConfig::default()));
            transport.nodes.lock().await.insert(id, node.clone());

            assert_eq!(node.get("nonexistent", 0).await, None);
        });
    }
}
