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

//! RFC 5389 STUN binding request/response over UDP: encode a Binding
//! Request, parse a response's attributes, and recover the external
//! address via XOR-MAPPED-ADDRESS (preferred) or MAPPED-ADDRESS.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{
    crypto::primitives,
    error::{Error, Result},
};

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
const ATTR_ERROR_CODE: u16 = 0x0009;
const ATTR_SOFTWARE: u16 = 0x8022;

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedAddress {
    pub addr: IpAddr,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StunError {
    pub code: u16,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingResponse {
    pub mapped: Option<MappedAddress>,
    pub error: Option<StunError>,
}

/// Build a Binding Request: type 0x0001, magic cookie, 12-byte
/// transaction id, and an optional SOFTWARE attribute.
pub fn build_binding_request(software: Option<&str>) -> (Vec<u8>, [u8; 12]) {
    let transaction_id: [u8; 12] = primitives::random_bytes(12).try_into().unwrap();
    let mut attrs = Vec::new();
    if let Some(sw) = software {
        attrs.extend_from_slice(&ATTR_SOFTWARE.to_be_bytes());
        let padded_len = (sw.len() + 3) / 4 * 4;
        attrs.extend_from_slice(&(sw.len() as u16).to_be_bytes());
        attrs.extend_from_slice(sw.as_bytes());
        attrs.extend(std::iter::repeat(0u8).take(padded_len - sw.len()));
    }

    let mut message = Vec::with_capacity(20 + attrs.len());
    message.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    message.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    message.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    message.extend_from_slice(&transaction_id);
    message.extend_from_slice(&attrs);

    (message, transaction_id)
}

fn xor_decode_ipv4(xport: u16, xaddr: u32) -> MappedAddress {
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;
    let addr = xaddr ^ MAGIC_COOKIE;
    MappedAddress { addr: IpAddr::V4(Ipv4Addr::from(addr)), port }
}

fn xor_decode_ipv6(xport: u16, xaddr: &[u8; 16], transaction_id: &[u8; 12]) -> MappedAddress {
    let port = xport ^ (MAGIC_COOKIE >> 16) as u16;
    let mut key = [0u8; 16];
    key[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    key[4..16].copy_from_slice(transaction_id);
    let mut addr_bytes = [0u8; 16];
    for i in 0..16 {
        addr_bytes[i] = xaddr[i] ^ key[i];
    }
    MappedAddress { addr: IpAddr::V6(Ipv6Addr::from(addr_bytes)), port }
}

/// Parse a Binding Response or Binding Error Response message.
/// Attributes are iterated with 4-byte padding as RFC 5389 requires;
/// XOR-MAPPED-ADDRESS is preferred over MAPPED-ADDRESS when both are
/// present.
pub fn parse_binding_response(message: &[u8], transaction_id: &[u8; 12]) -> Result<BindingResponse> {
    if message.len() < 20 {
        return Err(Error::StunError("message shorter than STUN header".into()))
    }
    let msg_type = u16::from_be_bytes(message[0..2].try_into().unwrap());
    let length = u16::from_be_bytes(message[2..4].try_into().unwrap()) as usize;
    let cookie = u32::from_be_bytes(message[4..8].try_into().unwrap());
    if cookie != MAGIC_COOKIE {
        return Err(Error::StunError("bad magic cookie".into()))
    }
    if message.len() < 20 + length {
        return Err(Error::StunError("truncated attribute section".into()))
    }

    let mut response = BindingResponse::default();
    let mut offset = 20;
    let end = 20 + length;

    while offset + 4 <= end {
        let attr_type = u16::from_be_bytes(message[offset..offset + 2].try_into().unwrap());
        let attr_len = u16::from_be_bytes(message[offset + 2..offset + 4].try_into().unwrap()) as usize;
        let value_start = offset + 4;
        let value_end = value_start + attr_len;
        if value_end > end {
            return Err(Error::StunError("attribute overruns message".into()))
        }
        let value = &message[value_start..value_end];

        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => {
                if value.len() >= 8 && value[1] == 0x01 {
                    let xport = u16::from_be_bytes(value[2..4].try_into().unwrap());
                    let xaddr = u32::from_be_bytes(value[4..8].try_into().unwrap());
                    response.mapped = Some(xor_decode_ipv4(xport, xaddr));
                } else if value.len() >= 20 && value[1] == 0x02 {
                    let xport = u16::from_be_bytes(value[2..4].try_into().unwrap());
                    let xaddr: [u8; 16] = value[4..20].try_into().unwrap();
                    response.mapped = Some(xor_decode_ipv6(xport, &xaddr, transaction_id));
                }
            }
            ATTR_MAPPED_ADDRESS if response.mapped.is_none() => {
                if value.len() >= 8 && value[1] == 0x01 {
                    let port = u16::from_be_bytes(value[2..4].try_into().unwrap());
                    let addr = u32::from_be_bytes(value[4..8].try_into().unwrap());
                    response.mapped = Some(MappedAddress { addr: IpAddr::V4(Ipv4Addr::from(addr)), port });
                }
            }
            ATTR_ERROR_CODE if value.len() >= 4 => {
                let class = value[2] as u16;
                let number = value[3] as u16;
                let code = class * 100 + number;
                let reason = String::from_utf8_lossy(&value[4..]).to_string();
                response.error = Some(StunError { code, reason });
            }
            _ => {}
        }

        offset = value_end + ((4 - (attr_len % 4)) % 4);
    }

    if msg_type != BINDING_RESPONSE && msg_type != BINDING_ERROR_RESPONSE {
        return Err(Error::StunError(format!("unexpected message type {msg_type:#06x}")))
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_xor_mapped_address_ipv4(port: u16, addr: Ipv4Addr, transaction_id: &[u8; 12]) -> Vec<u8> {
        let _ = transaction_id;
        let xport = port ^ (MAGIC_COOKIE >> 16) as u16;
        let xaddr = u32::from(addr) ^ MAGIC_COOKIE;

        let mut attr_value = vec![0u8, 0x01];
        attr_value.extend_from_slice(&xport.to_be_bytes());
        attr_value.extend_from_slice(&xaddr.to_be_bytes());

        let mut message = Vec::new();
        message.extend_from_slice(&BINDING_RESPONSE.to_be_bytes());
        message.extend_from_slice(&(attr_value.len() as u16 + 4).to_be_bytes());
        message.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        message.extend_from_slice(transaction_id);
        message.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
        message.extend_from_slice(&(attr_value.len() as u16).to_be_bytes());
        message.extend_from_slice(&attr_value);
        message
    }

    #[test]
    fn xor_mapped_address_ipv4_roundtrip() {
        let transaction_id = [0u8; 12];
        let addr = Ipv4Addr::new(203, 0, 113, 42);
        let port = 54321u16;
        let message = encode_xor_mapped_address_ipv4(port, addr, &transaction_id);

        let response = parse_binding_response(&message, &transaction_id).unwrap();
        assert_eq!(response.mapped, Some(MappedAddress { addr: IpAddr::V4(addr), port }));
    }

    #[test]
    fn binding_request_has_correct_header() {
        let (bytes, transaction_id) = build_binding_request(Some("nzcored"));
        assert_eq!(u16::from_be_bytes(bytes[0..2].try_into().unwrap()), BINDING_REQUEST);
        assert_eq!(u32::from_be_bytes(bytes[4..8].try_into().unwrap()), MAGIC_COOKIE);
        assert_eq!(&bytes[8..20], &transaction_id);
    }

    #[test]
    fn rejects_bad_magic_cookie() {
        let mut bytes = vec![0u8; 20];
        bytes[0..2].copy_from_slice(&BINDING_RESPONSE.to_be_bytes());
        let result = parse_binding_response(&bytes, &[0u8; 12]);
        assert!(result.is_err());
    }

    #[test]
    fn error_code_attribute_is_surfaced() {
        let transaction_id = [0u8; 12];
        let mut attr_value = vec![0u8, 0u8, 4u8, 0u8]; // class=4, number=0 -> 400
        attr_value.extend_from_slice(b"Bad Request");
        let unpadded_len = attr_value.len() as u16;
        let padded_len = (attr_value.len() + 3) / 4 * 4;
        attr_value.resize(padded_len, 0);

        let mut message = Vec::new();
        message.extend_from_slice(&BINDING_ERROR_RESPONSE.to_be_bytes());
        message.extend_from_slice(&(4u16 + attr_value.len() as u16).to_be_bytes());
        message.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        message.extend_from_slice(&transaction_id);
        message.extend_from_slice(&ATTR_ERROR_CODE.to_be_bytes());
        message.extend_from_slice(&unpadded_len.to_be_bytes());
        message.extend_from_slice(&attr_value);

        let response = parse_binding_response(&message, &transaction_id).unwrap();
        assert_eq!(response.error.unwrap().code, 400);
    }
}
