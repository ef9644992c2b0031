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

//! `KBucket` holds up to `k=20` contacts, most-recently-seen at the
//! tail, plus at most one pending replacement contact waiting for the
//! oldest entry to be pinged out. `KBucketList` is the 256-bucket array
//! indexed by `NodeId::bucket_index`.

use crate::dht::node_id::NodeId;

pub const K: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contact {
    pub id: NodeId,
    pub address: String,
    pub port: u16,
    pub last_seen: i64,
    pub vector_clock: u64,
}

impl Contact {
    pub fn touch(&mut self, now: i64) {
        self.last_seen = now;
        self.vector_clock += 1;
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Updated,
    Pending,
}

#[derive(Default)]
pub struct KBucket {
    contacts: Vec<Contact>,
    pending: Option<Contact>,
    pub last_refresh: i64,
}

impl KBucket {
    pub fn new() -> Self {
        Self { contacts: Vec::new(), pending: None, last_refresh: 0 }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn oldest(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    /// Returns `Pending` when the bucket is full and unable to make
    /// room without the caller pinging the oldest entry first; in that
    /// case the caller is expected to signal `ping_required` upward.
    pub fn add(&mut self, mut contact: Contact, now: i64) -> AddOutcome {
        if let Some(pos) = self.contacts.iter().position(|c| c.id == contact.id) {
            let mut existing = self.contacts.remove(pos);
            existing.touch(now);
            existing.address = contact.address;
            existing.port = contact.port;
            self.contacts.push(existing);
            return AddOutcome::Updated
        }

        if self.contacts.len() < K {
            contact.touch(now);
            self.contacts.push(contact);
            return AddOutcome::Added
        }

        self.pending = Some(contact);
        AddOutcome::Pending
    }

    /// Remove `id` if present; if a pending replacement exists, promote
    /// it to the tail.
    pub fn remove(&mut self, id: &NodeId) -> bool {
        let had = if let Some(pos) = self.contacts.iter().position(|c| &c.id == id) {
            self.contacts.remove(pos);
            true
        } else {
            false
        };
        if had {
            if let Some(promoted) = self.pending.take() {
                self.contacts.push(promoted);
            }
        }
        had
    }

    /// Stable-sort a copy of the contacts by XOR distance to `target`
    /// ascending, truncated to `n`.
    pub fn get_closest(&self, target: &NodeId, n: usize) -> Vec<Contact> {
        let mut sorted = self.contacts.clone();
        sorted.sort_by_key(|c| target.distance(&c.id));
        sorted.truncate(n);
        sorted
    }
}

/// 256 buckets indexed by `local.bucket_index(contact.id)`.
pub struct KBucketList {
    local: NodeId,
    buckets: Vec<KBucket>,
}

pub struct AddResult {
    pub outcome: AddOutcome,
    pub bucket_index: usize,
    pub ping_candidate: Option<Contact>,
}

impl KBucketList {
    pub fn new(local: NodeId) -> Self {
        Self { local, buckets: (0..256).map(|_| KBucket::new()).collect() }
    }

    pub fn bucket(&self, idx: usize) -> &KBucket {
        &self.buckets[idx]
    }

    pub fn bucket_mut(&mut self, idx: usize) -> &mut KBucket {
        &mut self.buckets[idx]
    }

    pub fn add(&mut self, contact: Contact, now: i64) -> AddResult {
        let idx = self.local.bucket_index(&contact.id);
        let bucket = &mut self.buckets[idx];
        let ping_candidate = bucket.oldest().cloned();
        let outcome = bucket.add(contact, now);
        AddResult {
            ping_candidate: if outcome == AddOutcome::Pending { ping_candidate } else { None },
            outcome,
            bucket_index: idx,
        }
    }

    pub fn remove(&mut self, id: &NodeId) -> bool {
        let idx = self.local.bucket_index(id);
        self.buckets[idx].remove(id)
    }

    /// Flatten every bucket's contacts, sort by distance to `target`,
    /// truncate to `n`.
    pub fn get_closest(&self, target: &NodeId, n: usize) -> Vec<Contact> {
        let mut all: Vec<Contact> = self.buckets.iter().flat_map(|b| b.contacts().to_vec()).collect();
        all.sort_by_key(|c| target.distance(&c.id));
        all.truncate(n);
        all
    }
}
