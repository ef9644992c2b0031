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

//! RFC 5766 TURN client: allocation lifecycle, permissions, channel
//! binding, and the ChannelData fast path. Message encoding reuses the
//! STUN header shape (`nat::stun`'s magic cookie and transaction id).

use std::{
    collections::{HashMap, HashSet},
    net::{IpAddr, Ipv4Addr},
};

use crate::{
    crypto::primitives,
    error::{Error, Result},
    nat::stun::MAGIC_COOKIE,
};

pub const ALLOCATE_REQUEST: u16 = 0x0003;
pub const ALLOCATE_SUCCESS: u16 = 0x0103;
pub const ALLOCATE_ERROR: u16 = 0x0113;
pub const REFRESH_REQUEST: u16 = 0x0004;
pub const CREATE_PERMISSION_REQUEST: u16 = 0x0008;
pub const CHANNEL_BIND_REQUEST: u16 = 0x0009;
pub const SEND_INDICATION: u16 = 0x0016;
pub const DATA_INDICATION: u16 = 0x0017;

const ATTR_CHANNEL_NUMBER: u16 = 0x000C;
const ATTR_LIFETIME: u16 = 0x000D;
const ATTR_XOR_PEER_ADDRESS: u16 = 0x0012;
const ATTR_DATA: u16 = 0x0013;
const ATTR_XOR_RELAYED_ADDRESS: u16 = 0x0016;
const ATTR_REQUESTED_TRANSPORT: u16 = 0x0019;
const ATTR_ERROR_CODE: u16 = 0x0009;

pub const REQUESTED_TRANSPORT_UDP: u8 = 17;
pub const DEFAULT_LIFETIME_SECS: u32 = 600;
pub const CHANNEL_NUMBER_MIN: u16 = 0x4000;
pub const CHANNEL_NUMBER_MAX: u16 = 0x7FFF;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationState {
    None,
    Pending,
    Active,
    Expired,
    Failed,
}

#[derive(Debug)]
pub enum TurnError {
    /// Maps an RFC 5766 error-code attribute (403, 437, 438, 486, 508).
    Code(u16),
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddr {
    pub addr: IpAddr,
    pub port: u16,
}

fn xor_ipv4(addr: Ipv4Addr, port: u16) -> (u32, u16) {
    (u32::from(addr) ^ MAGIC_COOKIE, port ^ (MAGIC_COOKIE >> 16) as u16)
}

fn encode_xor_peer_address(peer: PeerAddr) -> Vec<u8> {
    let IpAddr::V4(addr) = peer.addr else { unimplemented!("IPv6 TURN peers are out of scope here") };
    let (xaddr, xport) = xor_ipv4(addr, peer.port);
    let mut v = vec![0u8, 0x01];
    v.extend_from_slice(&xport.to_be_bytes());
    v.extend_from_slice(&xaddr.to_be_bytes());
    v
}

fn decode_xor_address(value: &[u8]) -> Option<PeerAddr> {
    if value.len() < 8 || value[1] != 0x01 {
        return None
    }
    let xport = u16::from_be_bytes(value[2..4].try_into().unwrap());
    let xaddr = u32::from_be_bytes(value[4..8].try_into().unwrap());
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;
    let addr = xaddr ^ MAGIC_COOKIE;
    Some(PeerAddr { addr: IpAddr::V4(Ipv4Addr::from(addr)), port })
}

fn pad4(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

fn push_attr(message: &mut Vec<u8>, attr_type: u16, value: &[u8]) {
    message.extend_from_slice(&attr_type.to_be_bytes());
    message.extend_from_slice(&(value.len() as u16).to_be_bytes());
    message.extend_from_slice(value);
    message.extend(std::iter::repeat(0u8).take(pad4(value.len())));
}

fn build_message(msg_type: u16, transaction_id: &[u8; 12], attrs: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(20 + attrs.len());
    message.extend_from_slice(&msg_type.to_be_bytes());
    message.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    message.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    message.extend_from_slice(transaction_id);
    message.extend_from_slice(attrs);
    message
}

fn new_transaction_id() -> [u8; 12] {
    primitives::random_bytes(12).try_into().unwrap()
}

/// TURN client allocation and the permissions/channel bindings layered
/// on top of it. Owns no socket; callers feed it wire bytes and send
/// whatever it builds.
pub struct TurnClient {
    pub state: AllocationState,
    pub relayed_address: Option<PeerAddr>,
    pub lifetime_secs: u32,
    permissions: HashSet<(IpAddr, u16)>,
    channel_bindings: HashMap<u16, (IpAddr, u16)>,
    next_channel: u16,
}

impl Default for TurnClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnClient {
    pub fn new() -> Self {
        Self {
            state: AllocationState::None,
            relayed_address: None,
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            permissions: HashSet::new(),
            channel_bindings: HashMap::new(),
            next_channel: CHANNEL_NUMBER_MIN,
        }
    }

    /// Build an ALLOCATE request with REQUESTED-TRANSPORT=UDP and the
    /// requested LIFETIME. Transitions `None -> Pending`.
    pub fn build_allocate_request(&mut self, requested_lifetime_secs: u32) -> (Vec<u8>, [u8; 12]) {
        let transaction_id = new_transaction_id();
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_REQUESTED_TRANSPORT, &[REQUESTED_TRANSPORT_UDP, 0, 0, 0]);
        push_attr(&mut attrs, ATTR_LIFETIME, &requested_lifetime_secs.to_be_bytes());
        self.state = AllocationState::Pending;
        (build_message(ALLOCATE_REQUEST, &transaction_id, &attrs), transaction_id)
    }

    /// Parse an ALLOCATE response: success yields the granted lifetime
    /// and relayed address and moves to `Active`; an error-code
    /// attribute moves to `Failed` and surfaces the RFC code. Callers
    /// should schedule a refresh at 80% of the granted lifetime.
    pub fn handle_allocate_response(&mut self, message: &[u8]) -> std::result::Result<(), TurnError> {
        let (msg_type, attrs) = parse_header(message).ok_or(TurnError::Timeout)?;
        match msg_type {
            ALLOCATE_SUCCESS => {
                for (attr_type, value) in attrs {
                    match attr_type {
                        ATTR_XOR_RELAYED_ADDRESS => self.relayed_address = decode_xor_address(value),
                        ATTR_LIFETIME if value.len() == 4 => {
                            self.lifetime_secs = u32::from_be_bytes(value.try_into().unwrap())
                        }
                        _ => {}
                    }
                }
                self.state = AllocationState::Active;
                Ok(())
            }
            ALLOCATE_ERROR => {
                self.state = AllocationState::Failed;
                Err(TurnError::Code(extract_error_code(&attrs).unwrap_or(500)))
            }
            _ => Err(TurnError::Timeout),
        }
    }

    /// REFRESH with LIFETIME=0 deletes the allocation on close.
    pub fn build_refresh_request(&mut self, lifetime_secs: u32) -> (Vec<u8>, [u8; 12]) {
        let transaction_id = new_transaction_id();
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_LIFETIME, &lifetime_secs.to_be_bytes());
        if lifetime_secs == 0 {
            self.state = AllocationState::Expired;
        }
        (build_message(REFRESH_REQUEST, &transaction_id, &attrs), transaction_id)
    }

    /// CREATE_PERMISSION for `peer`, cached locally once acknowledged.
    pub fn build_create_permission_request(&self, peer: PeerAddr) -> (Vec<u8>, [u8; 12]) {
        let transaction_id = new_transaction_id();
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_XOR_PEER_ADDRESS, &encode_xor_peer_address(peer));
        (build_message(CREATE_PERMISSION_REQUEST, &transaction_id, &attrs), transaction_id)
    }

    pub fn confirm_permission(&mut self, peer: PeerAddr) {
        self.permissions.insert((peer.addr, peer.port));
    }

    pub fn has_permission(&self, peer: PeerAddr) -> bool {
        self.permissions.contains(&(peer.addr, peer.port))
    }

    /// CHANNEL_BIND a peer to the next available channel number in
    /// `[0x4000, 0x7FFF]`.
    pub fn build_channel_bind_request(&mut self, peer: PeerAddr) -> Result<(Vec<u8>, [u8; 12], u16)> {
        if self.next_channel > CHANNEL_NUMBER_MAX {
            return Err(Error::InvalidInput("TURN channel number space exhausted".into()))
        }
        let channel = self.next_channel;
        self.next_channel += 1;

        let transaction_id = new_transaction_id();
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_CHANNEL_NUMBER, &[(channel >> 8) as u8, channel as u8, 0, 0]);
        push_attr(&mut attrs, ATTR_XOR_PEER_ADDRESS, &encode_xor_peer_address(peer));
        Ok((build_message(CHANNEL_BIND_REQUEST, &transaction_id, &attrs), transaction_id, channel))
    }

    pub fn confirm_channel_bind(&mut self, channel: u16, peer: PeerAddr) {
        self.channel_bindings.insert(channel, (peer.addr, peer.port));
    }

    pub fn channel_for(&self, peer: PeerAddr) -> Option<u16> {
        self.channel_bindings.iter().find(|(_, v)| **v == (peer.addr, peer.port)).map(|(k, _)| *k)
    }

    /// SEND indication, used when no channel is bound yet.
    pub fn build_send_indication(&self, peer: PeerAddr, data: &[u8]) -> Vec<u8> {
        let transaction_id = new_transaction_id();
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_XOR_PEER_ADDRESS, &encode_xor_peer_address(peer));
        push_attr(&mut attrs, ATTR_DATA, data);
        build_message(SEND_INDICATION, &transaction_id, &attrs)
    }

    /// ChannelData framing: `channel(2B) | length(2B) | data`, used
    /// once a channel is bound, for lower per-message overhead than a
    /// full STUN-shaped SEND indication.
    pub fn encode_channel_data(channel: u16, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + data.len());
        out.extend_from_slice(&channel.to_be_bytes());
        out.extend_from_slice(&(data.len() as u16).to_be_bytes());
        out.extend_from_slice(data);
        out
    }

    pub fn decode_channel_data(bytes: &[u8]) -> Option<(u16, &[u8])> {
        if bytes.len() < 4 {
            return None
        }
        let channel = u16::from_be_bytes(bytes[0..2].try_into().unwrap());
        let length = u16::from_be_bytes(bytes[2..4].try_into().unwrap()) as usize;
        if bytes.len() < 4 + length {
            return None
        }
        Some((channel, &bytes[4..4 + length]))
    }

    /// Parse an inbound DATA indication into `(data, peer_addr,
    /// peer_port)`.
    pub fn parse_data_indication(message: &[u8]) -> Option<(Vec<u8>, PeerAddr)> {
        let (msg_type, attrs) = parse_header(message)?;
        if msg_type != DATA_INDICATION {
            return None
        }
        let mut data = None;
        let mut peer = None;
        for (attr_type, value) in attrs {
            match attr_type {
                ATTR_DATA => data = Some(value.to_vec()),
                ATTR_XOR_PEER_ADDRESS => peer = decode_xor_address(value),
                _ => {}
            }
        }
        Some((data?, peer?))
    }
}

fn parse_header(message: &[u8]) -> Option<(u16, Vec<(u16, &[u8])>)> {
    if message.len() < 20 {
        return None
    }
    let msg_type = u16::from_be_bytes(message[0..2].try_into().ok()?);
    let length = u16::from_be_bytes(message[2..4].try_into().ok()?) as usize;
    let cookie = u32::from_be_bytes(message[4..8].try_into().ok()?);
    if cookie != MAGIC_COOKIE || message.len() < 20 + length {
        return None
    }

    let mut attrs = Vec::new();
    let mut offset = 20;
    let end = 20 + length;
    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes(message[offset..offset + 2].try_into().ok()?);
        let attr_len = u16::from_be_bytes(message[offset + 2..offset + 4].try_into().ok()?) as usize;
        let value_start = offset + 4;
        let value_end = value_start + attr_len;
        if value_end > end {
            return None
        }
        attrs.push((attr_type, &message[value_start..value_end]));
        offset = value_end + pad4(attr_len);
    }
    Some((msg_type, attrs))
}

fn extract_error_code(attrs: &[(u16, &[u8])]) -> Option<u16> {
    attrs.iter().find(|(t, _)| *t == ATTR_ERROR_CODE).and_then(|(_, v)| {
        if v.len() < 4 {
            return None
        }
        Some(v[2] as u16 * 100 + v[3] as u16)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_request_has_requested_transport_and_lifetime() {
        let mut client = TurnClient::new();
        let (bytes, _txid) = client.build_allocate_request(DEFAULT_LIFETIME_SECS);
        assert_eq!(client.state, AllocationState::Pending);
        assert_eq!(u16::from_be_bytes(bytes[0..2].try_into().unwrap()), ALLOCATE_REQUEST);
    }

    #[test]
    fn allocate_success_transitions_to_active_with_relayed_address() {
        let mut client = TurnClient::new();
        let transaction_id = [0u8; 12];
        let peer = PeerAddr { addr: IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), port: 45000 };

        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_XOR_RELAYED_ADDRESS, &encode_xor_peer_address(peer));
        push_attr(&mut attrs, ATTR_LIFETIME, &600u32.to_be_bytes());
        let message = build_message(ALLOCATE_SUCCESS, &transaction_id, &attrs);

        client.handle_allocate_response(&message).unwrap();
        assert_eq!(client.state, AllocationState::Active);
        assert_eq!(client.relayed_address, Some(peer));
        assert_eq!(client.lifetime_secs, 600);
    }

    #[test]
    fn allocate_error_surfaces_rfc_code() {
        let mut client = TurnClient::new();
        let transaction_id = [0u8; 12];
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_ERROR_CODE, &[0, 0, 4, 37]); // 437: Allocation Mismatch
        let message = build_message(ALLOCATE_ERROR, &transaction_id, &attrs);

        let result = client.handle_allocate_response(&message);
        assert!(matches!(result, Err(TurnError::Code(437))));
        assert_eq!(client.state, AllocationState::Failed);
    }

    #[test]
    fn channel_bind_assigns_numbers_in_range() {
        let mut client = TurnClient::new();
        let peer = PeerAddr { addr: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), port: 1000 };
        let (_bytes, _txid, channel) = client.build_channel_bind_request(peer).unwrap();
        assert!((CHANNEL_NUMBER_MIN..=CHANNEL_NUMBER_MAX).contains(&channel));
    }

    #[test]
    fn channel_data_roundtrip() {
        let encoded = TurnClient::encode_channel_data(0x4000, b"payload");
        let (channel, data) = TurnClient::decode_channel_data(&encoded).unwrap();
        assert_eq!(channel, 0x4000);
        assert_eq!(data, b"payload");
    }

    #[test]
    fn data_indication_roundtrip() {
        let transaction_id = [0u8; 12];
        let peer = PeerAddr { addr: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), port: 53 };
        let mut attrs = Vec::new();
        push_attr(&mut attrs, ATTR_XOR_PEER_ADDRESS, &encode_xor_peer_address(peer));
        push_attr(&mut attrs, ATTR_DATA, b"dns response bytes");
        let message = build_message(DATA_INDICATION, &transaction_id, &attrs);

        let (data, parsed_peer) = TurnClient::parse_data_indication(&message).unwrap();
        assert_eq!(data, b"dns response bytes");
        assert_eq!(parsed_peer, peer);
    }
}
