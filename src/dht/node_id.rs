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

//! 32-byte NodeID with the XOR metric used throughout the DHT.

use std::fmt;

use crate::crypto::primitives;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn random() -> Self {
        Self(primitives::random_bytes(32).try_into().unwrap())
    }

    pub fn from_public_key(pk: &[u8]) -> Self {
        Self(primitives::sha256(pk))
    }

    pub fn from_string(s: &str) -> Self {
        Self(primitives::sha256(s.as_bytes()))
    }

    pub fn distance(&self, other: &NodeId) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = self.0[i] ^ other.0[i];
        }
        out
    }

    /// 0-based index of the most-significant 1-bit of `distance(self,
    /// other)`, scanning from the MSB of byte 0. Identical ids (an
    /// all-zero distance) return 0 by convention.
    pub fn bucket_index(&self, other: &NodeId) -> usize {
        let distance = self.distance(other);
        for (byte_idx, byte) in distance.iter().enumerate() {
            if *byte != 0 {
                return byte_idx * 8 + byte.leading_zeros() as usize
            }
        }
        0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &self.to_hex()[..8])
    }
}

/// Total ordering over the XOR distance of two ids to a shared
/// `target`, used to keep candidate lists sorted by closeness.
pub fn xor_distance_key(target: &NodeId, id: &NodeId) -> [u8; 32] {
    target.distance(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric_and_zero_for_self() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&a), [0u8; 32]);
    }

    #[test]
    fn bucket_index_is_bounded() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert!(a.bucket_index(&b) < 256);
        assert_eq!(a.bucket_index(&a), 0);
    }

    #[test]
    fn bucket_index_msb_differs_gives_zero() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[0] = 0b1000_0000;
        b[0] = 0b0000_0000;
        assert_eq!(NodeId(a).bucket_index(&NodeId(b)), 0);
    }

    #[test]
    fn bucket_index_lsb_differs_gives_255() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[31] = 0b0000_0001;
        b[31] = 0b0000_0000;
        assert_eq!(NodeId(a).bucket_index(&NodeId(b)), 255);
    }

    #[test]
    fn from_public_key_is_deterministic() {
        let pk = [7u8; 32];
        assert_eq!(NodeId::from_public_key(&pk), NodeId::from_public_key(&pk));
    }

    #[test]
    fn hex_roundtrip() {
        let id = NodeId::random();
        assert_eq!(NodeId::from_hex(&id.to_hex()), Some(id));
    }
}
