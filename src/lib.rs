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

//! nzcore: cryptographic identity, secure channels, and Kademlia DHT
//! core for a peer-to-peer node daemon.
//!
//! No process-wide singletons: construction happens once at startup
//! into an [`AppContext`], which is what request handlers and network
//! tasks are handed. See §9 of the design notes this crate follows.

pub mod bootstrap;
pub mod config;
pub mod crypto;
pub mod dht;
pub mod error;
pub mod nat;
pub mod net;
pub mod system;
pub mod util;

pub use error::{Error, Result};

use std::sync::Arc;

use smol::lock::Mutex;

use crate::{
    bootstrap::Env,
    crypto::{channel::Role, handshake, identity::TrustStore},
    dht::{kademlia::Kademlia, node_id::NodeId, routing_table::RoutingTable},
    net::pool::{ConnectionPool, PoolConfig},
};

/// The single explicit construction graph handed to request handlers
/// and network tasks in place of the source's singleton collaborators
/// (identity manager, audit logger, auth manager, backup manager).
pub struct AppContext<W> {
    pub env: Env,
    pub node_id: NodeId,
    pub pool: Arc<ConnectionPool<W>>,
    pub routing_table: Arc<Mutex<RoutingTable>>,
    pub trust_store: Arc<Mutex<TrustStore>>,
}

impl<W: futures::io::AsyncWrite + Unpin + Send + 'static> AppContext<W> {
    /// Build the context from an unlocked `Env`: derives the node id
    /// from the Ed25519 public key, and wires up an empty pool, routing
    /// table, and trust store rooted at `env.paths`.
    pub fn new(env: Env, pool_config: PoolConfig) -> Self {
        let node_id = NodeId::from_public_key(&env.identity.ed25519_public);
        let routing_table = Arc::new(Mutex::new(RoutingTable::new(node_id)));
        let trust_store = Arc::new(Mutex::new(TrustStore::new(env.paths.trust())));
        let pool = ConnectionPool::new(pool_config);
        Self { env, node_id, pool, routing_table, trust_store }
    }

    /// This node's role-`Alice` transcript label helper: every peer
    /// that initiates a handshake toward us acts as `Role::Bob` on our
    /// side of the resulting `SecureChannel`.
    pub fn responder_role() -> Role {
        Role::Bob
    }

    pub fn initiator_role() -> Role {
        Role::Alice
    }

    pub fn start_handshake(&self) -> Result<(handshake::InitiatorState, handshake::AliceHello)> {
        handshake::initiator_start(&self.env.identity.ed25519_seed)
    }
}
