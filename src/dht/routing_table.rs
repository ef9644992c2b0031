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

//! Wraps `KBucketList` with a per-bucket refresh policy (default 1h)
//! and a per-`NodeId` pending-pings counter, mirroring the source's
//! event-emitter wiring with an explicit `Subscriber<RoutingEvent>`.

use std::collections::HashMap;

use crate::{
    crypto::primitives,
    dht::{
        kbucket::{AddOutcome, Contact, KBucketList},
        node_id::NodeId,
    },
    system::{Subscriber, SubscriberPtr},
};

pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 60 * 60;
pub const MAX_PENDING_PINGS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingEvent {
    NodeAdded(NodeId),
    NodeUpdated(NodeId),
    SelfRejected,
    PingRequired(Contact),
}

pub struct RoutingTable {
    local: NodeId,
    buckets: KBucketList,
    refresh_interval_secs: i64,
    pending_pings: HashMap<NodeId, u32>,
    pub events: SubscriberPtr<RoutingEvent>,
}

impl RoutingTable {
    pub fn new(local: NodeId) -> Self {
        Self::with_refresh_interval(local, DEFAULT_REFRESH_INTERVAL_SECS)
    }

    pub fn with_refresh_interval(local: NodeId, refresh_interval_secs: i64) -> Self {
        Self {
            buckets: KBucketList::new(local),
            local,
            refresh_interval_secs,
            pending_pings: HashMap::new(),
            events: Subscriber::new(),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local
    }

    /// Add or refresh `contact`. Refuses the local node itself. When
    /// the owning bucket is full and pending a replacement, emits
    /// `PingRequired` for the caller to ping out-of-band.
    pub async fn add_node(&mut self, contact: Contact, now: i64) {
        if contact.id == self.local {
            self.events.notify(RoutingEvent::SelfRejected).await;
            return
        }

        let result = self.buckets.add(contact.clone(), now);
        match result.outcome {
            AddOutcome::Added => self.events.notify(RoutingEvent::NodeAdded(contact.id)).await,
            AddOutcome::Updated => self.events.notify(RoutingEvent::NodeUpdated(contact.id)).await,
            AddOutcome::Pending => {
                if let Some(ping_candidate) = result.ping_candidate {
                    self.events.notify(RoutingEvent::PingRequired(ping_candidate)).await;
                }
            }
        }
    }

    /// A ping to a node in the pending state succeeded: touch it and
    /// clear its pending-pings counter.
    pub fn handle_pong(&mut self, id: &NodeId, now: i64) {
        self.pending_pings.remove(id);
        let idx = self.local.bucket_index(id);
        // Re-adding an existing contact touches it and moves it to the
        // tail, preserving the "most-recently-seen at tail" invariant.
        if let Some(existing) = self.buckets.bucket(idx).contacts().iter().find(|c| &c.id == id).cloned() {
            self.buckets.bucket_mut(idx).add(existing, now);
        }
    }

    /// A ping timed out. After `MAX_PENDING_PINGS` consecutive misses,
    /// remove the node from its bucket.
    pub fn handle_ping_timeout(&mut self, id: &NodeId) {
        let count = self.pending_pings.entry(*id).or_insert(0);
        *count += 1;
        if *count >= MAX_PENDING_PINGS {
            self.buckets.remove(id);
            self.pending_pings.remove(id);
        }
    }

    pub fn get_closest(&self, target: &NodeId, n: usize) -> Vec<Contact> {
        self.buckets.get_closest(target, n)
    }

    /// Buckets whose `last_refresh` is older than `refresh_interval`
    /// and which hold at least one contact.
    pub fn get_stale_buckets(&self, now: i64) -> Vec<usize> {
        (0..256)
            .filter(|&i| {
                let bucket = self.buckets.bucket(i);
                !bucket.is_empty() && now - bucket.last_refresh > self.refresh_interval_secs
            })
            .collect()
    }

    pub fn mark_refreshed(&mut self, idx: usize, now: i64) {
        self.buckets.bucket_mut(idx).last_refresh = now;
    }

    /// A random NodeId sharing exactly `idx` leading bits with `local`
    /// (same prefix, flipped bit at position `idx`, random tail), used
    /// as a lookup target to refresh bucket `idx`.
    pub fn get_node_for_refresh(&self, idx: usize) -> NodeId {
        let mut bytes = self.local.0;
        let byte_idx = idx / 8;
        let bit_in_byte = idx % 8;
        let flip_mask = 0x80u8 >> bit_in_byte;
        bytes[byte_idx] ^= flip_mask;

        let tail_start = byte_idx + 1;
        if tail_start < 32 {
            let random_tail = primitives::random_bytes(32 - tail_start);
            bytes[tail_start..].copy_from_slice(&random_tail);
        }
        // Randomize any bits after the flip within byte_idx itself.
        let keep_bits = 8 - bit_in_byte - 1;
        if keep_bits > 0 {
            let random_byte = primitives::random_bytes(1)[0];
            let mask = (1u8 << keep_bits) - 1;
            bytes[byte_idx] = (bytes[byte_idx] & !mask) | (random_byte & mask);
        }

        NodeId(bytes)
    }

    /// The closest known contact to the refresh target for bucket `idx`.
    pub fn closest_for_refresh(&self, idx: usize) -> Option<Contact> {
        let target = self.get_node_for_refresh(idx);
        self.get_closest(&target, 1).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: NodeId) -> Contact {
        Contact { id, address: "127.0.0.1".into(), port: 9000, last_seen: 0, vector_clock: 0 }
    }

    #[test]
    fn self_node_is_rejected() {
        smol::block_on(async {
            let local = NodeId::random();
            let mut table = RoutingTable::new(local);
            let sub = table.events.subscribe().await;
            table.add_node(contact(local), 0).await;
            assert_eq!(sub.receive().await, RoutingEvent::SelfRejected);
        });
    }

    #[test]
    fn node_added_event_fires() {
        smol::block_on(async {
            let local = NodeId::random();
            let mut table = RoutingTable::new(local);
            let sub = table.events.subscribe().await;
            let peer = NodeId::random();
            table.add_node(contact(peer), 0).await;
            assert_eq!(sub.receive().await, RoutingEvent::NodeAdded(peer));
        });
    }

    #[test]
    fn ping_timeout_removes_after_max_misses() {
        smol::block_on(async {
            let local = NodeId::random();
            let mut table = RoutingTable::new(local);
            let peer = NodeId::random();
            table.add_node(contact(peer), 0).await;

            for _ in 0..MAX_PENDING_PINGS {
                table.handle_ping_timeout(&peer);
            }
            assert_eq!(table.get_closest(&peer, 20).len(), 0);
        });
    }

    #[test]
    fn get_node_for_refresh_shares_exact_prefix() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);
        for idx in [0usize, 8, 17, 255] {
            let target = table.get_node_for_refresh(idx);
            assert_eq!(local.bucket_index(&target), idx);
        }
    }

    #[test]
    fn stale_buckets_are_empty_at_start() {
        let local = NodeId::random();
        let table = RoutingTable::new(local);
        assert!(table.get_stale_buckets(i64::MAX).is_empty());
    }
}
