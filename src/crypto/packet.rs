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

//! Signed, routing, and encrypted packet formats. Canonical JSON (see
//! `util::canonical_json`) is the only serialization ever fed to a
//! signature; every verification path returns a stable reason string
//! rather than a generic error so callers can build interop test
//! suites against the exact taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    crypto::primitives,
    error::Result,
    util::canonical_json,
};

const DEFAULT_MAX_SKEW_SEC: i64 = 300;
const DEFAULT_MAX_SKEW_MS: i64 = 300_000;
const ROUTING_VERSION: &str = "nz-routing-crypto-01";
const ENCRYPTED_VERSION: &str = "nz-crypto-01";
const ENCRYPTED_CIPHER: &str = "chacha20-poly1305";

// ------------------------------------------------------------------ SignedPacket

#[derive(Clone, Serialize, Deserialize)]
pub struct SignedAuth {
    pub node_id: String,
    pub timestamp: i64,
    pub nonce: String,
    pub body_hash: String,
    pub signature: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SignedPacket {
    pub auth: SignedAuth,
    pub body: Value,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SignedVerifyError {
    MissingAuthOrBody,
    MissingAuthFields,
    TimestampOutOfRange,
    ReplayNonce,
    BodyHashMismatch,
    UnknownNode,
    InvalidSignature,
}

impl SignedVerifyError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingAuthOrBody => "missing_auth_or_body",
            Self::MissingAuthFields => "missing_auth_fields",
            Self::TimestampOutOfRange => "timestamp_out_of_range",
            Self::ReplayNonce => "replay_nonce",
            Self::BodyHashMismatch => "body_hash_mismatch",
            Self::UnknownNode => "unknown_node",
            Self::InvalidSignature => "invalid_signature",
        }
    }
}

fn auth_signing_value(auth: &SignedAuth) -> Value {
    json!({
        "node_id": auth.node_id,
        "timestamp": auth.timestamp,
        "nonce": auth.nonce,
        "body_hash": auth.body_hash,
    })
}

/// Build a signed packet: `body_hash = sha256_hex(canonical(body))`,
/// then sign `sha256_hex(canonical(auth_without_signature))` with the
/// node's Ed25519 identity seed.
pub fn build_signed_packet(node_id: &str, body: Value, identity_seed: &[u8], now_s: i64) -> Result<SignedPacket> {
    use base64::Engine;

    let body_hash = primitives::sha256_hex(canonical_json::canonicalize(&body)?.as_bytes());
    let auth_no_sig = SignedAuth {
        node_id: node_id.to_string(),
        timestamp: now_s,
        nonce: primitives::random_hex(16),
        body_hash,
        signature: String::new(),
    };
    let auth_hash = primitives::sha256_hex(canonical_json::canonicalize(&auth_signing_value(&auth_no_sig))?.as_bytes());
    let sig = primitives::ed25519_sign(identity_seed, auth_hash.as_bytes())?;
    let signature = base64::engine::general_purpose::STANDARD.encode(sig);

    Ok(SignedPacket { auth: SignedAuth { signature, ..auth_no_sig }, body })
}

/// Verify an incoming signed packet. `resolve_pubkey` maps `node_id` to
/// its known Ed25519 public key; `seen_nonce` is an optional replay
/// oracle over `(node_id, nonce)`.
pub fn verify_signed_packet(
    packet: &SignedPacket,
    resolve_pubkey: impl FnOnce(&str) -> Option<[u8; 32]>,
    seen_nonce: Option<impl FnOnce(&str, &str) -> bool>,
    now_s: i64,
    max_skew_sec: Option<i64>,
) -> std::result::Result<(), SignedVerifyError> {
    let auth = &packet.auth;
    if auth.node_id.is_empty() || auth.nonce.is_empty() || auth.body_hash.is_empty() || auth.signature.is_empty() {
        return Err(SignedVerifyError::MissingAuthFields)
    }

    let skew = max_skew_sec.unwrap_or(DEFAULT_MAX_SKEW_SEC);
    if (now_s - auth.timestamp).abs() > skew {
        return Err(SignedVerifyError::TimestampOutOfRange)
    }

    if let Some(seen) = seen_nonce {
        if seen(&auth.node_id, &auth.nonce) {
            return Err(SignedVerifyError::ReplayNonce)
        }
    }

    let expected_body_hash =
        primitives::sha256_hex(canonical_json::canonicalize(&packet.body).map_err(|_| SignedVerifyError::BodyHashMismatch)?.as_bytes());
    if expected_body_hash != auth.body_hash {
        return Err(SignedVerifyError::BodyHashMismatch)
    }

    let pubkey = resolve_pubkey(&auth.node_id).ok_or(SignedVerifyError::UnknownNode)?;

    let auth_hash = primitives::sha256_hex(
        canonical_json::canonicalize(&auth_signing_value(auth)).map_err(|_| SignedVerifyError::InvalidSignature)?.as_bytes(),
    );
    let sig_bytes = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&auth.signature)
            .map_err(|_| SignedVerifyError::InvalidSignature)?
    };
    primitives::ed25519_verify(&pubkey, auth_hash.as_bytes(), &sig_bytes).map_err(|_| SignedVerifyError::InvalidSignature)
}

// ----------------------------------------------------------------- RoutingPacket

#[derive(Clone, Serialize, Deserialize)]
pub struct RoutingPacket {
    pub version: String,
    pub node_id: String,
    pub ts_ms: i64,
    pub nonce: String,
    pub payload: Value,
    pub signature: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RoutingVerifyError {
    UnsupportedVersion,
    MissingNodeId,
    InvalidTs,
    InvalidNonce,
    MissingSignature,
    TsSkew,
    UnknownNode,
    InvalidSignature,
}

impl RoutingVerifyError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedVersion => "unsupported-version",
            Self::MissingNodeId => "missing-node-id",
            Self::InvalidTs => "invalid-ts",
            Self::InvalidNonce => "invalid-nonce",
            Self::MissingSignature => "missing-signature",
            Self::TsSkew => "ts-skew",
            Self::UnknownNode => "unknown-node",
            Self::InvalidSignature => "invalid-signature",
        }
    }
}

fn routing_signing_value(p: &RoutingPacket) -> Value {
    json!({
        "version": p.version,
        "node_id": p.node_id,
        "ts": p.ts_ms,
        "nonce": p.nonce,
        "payload": p.payload,
    })
}

pub fn build_routing_packet(node_id: &str, payload: Value, identity_seed: &[u8], now_ms: i64) -> Result<RoutingPacket> {
    use base64::Engine;

    let nonce = primitives::random_hex(8);
    let unsigned = RoutingPacket {
        version: ROUTING_VERSION.to_string(),
        node_id: node_id.to_string(),
        ts_ms: now_ms,
        nonce,
        payload,
        signature: String::new(),
    };
    let signing_bytes = canonical_json::canonicalize(&routing_signing_value(&unsigned))?;
    let sig = primitives::ed25519_sign(identity_seed, signing_bytes.as_bytes())?;
    let signature = base64::engine::general_purpose::STANDARD.encode(sig);
    Ok(RoutingPacket { signature, ..unsigned })
}

pub fn verify_routing_packet(
    packet: &RoutingPacket,
    resolve_pubkey: impl FnOnce(&str) -> Option<[u8; 32]>,
    now_ms: i64,
    max_skew_ms: Option<i64>,
) -> std::result::Result<(), RoutingVerifyError> {
    if packet.version != ROUTING_VERSION {
        return Err(RoutingVerifyError::UnsupportedVersion)
    }
    if packet.node_id.is_empty() {
        return Err(RoutingVerifyError::MissingNodeId)
    }
    if packet.ts_ms <= 0 {
        return Err(RoutingVerifyError::InvalidTs)
    }
    if packet.nonce.is_empty() {
        return Err(RoutingVerifyError::InvalidNonce)
    }
    if packet.signature.is_empty() {
        return Err(RoutingVerifyError::MissingSignature)
    }

    let skew = max_skew_ms.unwrap_or(DEFAULT_MAX_SKEW_MS);
    if (now_ms - packet.ts_ms).abs() > skew {
        return Err(RoutingVerifyError::TsSkew)
    }

    let pubkey = resolve_pubkey(&packet.node_id).ok_or(RoutingVerifyError::UnknownNode)?;

    let signing_bytes =
        canonical_json::canonicalize(&routing_signing_value(packet)).map_err(|_| RoutingVerifyError::InvalidSignature)?;
    let sig_bytes = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(&packet.signature)
            .map_err(|_| RoutingVerifyError::InvalidSignature)?
    };
    primitives::ed25519_verify(&pubkey, signing_bytes.as_bytes(), &sig_bytes).map_err(|_| RoutingVerifyError::InvalidSignature)
}

// --------------------------------------------------------------- EncryptedPacket

#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedPacket {
    pub version: String,
    pub cipher: String,
    pub sender_node_id: String,
    pub receiver_node_id: String,
    pub nonce: String,
    pub tag: String,
    pub ciphertext: String,
    pub context: Option<String>,
}

fn packet_aad(sender: &str, receiver: &str) -> Vec<u8> {
    format!("{sender}->{receiver}").into_bytes()
}

pub fn build_encrypted_packet(
    session_key: &[u8],
    sender_node_id: &str,
    receiver_node_id: &str,
    plaintext: &[u8],
    context: Option<String>,
) -> Result<EncryptedPacket> {
    use base64::Engine;

    let nonce = primitives::random_nonce();
    let aad = packet_aad(sender_node_id, receiver_node_id);
    let (ciphertext, tag) = primitives::aead_encrypt(session_key, &nonce, plaintext, &aad)?;

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(EncryptedPacket {
        version: ENCRYPTED_VERSION.to_string(),
        cipher: ENCRYPTED_CIPHER.to_string(),
        sender_node_id: sender_node_id.to_string(),
        receiver_node_id: receiver_node_id.to_string(),
        nonce: b64.encode(nonce),
        tag: b64.encode(tag),
        ciphertext: b64.encode(&ciphertext),
        context,
    })
}

/// Decrypt `packet` with `session_key`. Enforces the `version`/`cipher`
/// fields and raises `Error::AeadAuthFailed` (the `PacketAuthFailed`
/// condition named in the wire spec) on any AEAD failure.
pub fn open_encrypted_packet(packet: &EncryptedPacket, session_key: &[u8]) -> Result<Vec<u8>> {
    use base64::Engine;
    use crate::error::Error;

    if packet.version != ENCRYPTED_VERSION || packet.cipher != ENCRYPTED_CIPHER {
        return Err(Error::InvalidInput(format!(
            "unsupported encrypted packet version/cipher: {}/{}",
            packet.version, packet.cipher
        )))
    }

    let b64 = base64::engine::general_purpose::STANDARD;
    let nonce = b64.decode(&packet.nonce).map_err(|_| Error::InvalidInput("bad nonce encoding".into()))?;
    let tag = b64.decode(&packet.tag).map_err(|_| Error::InvalidInput("bad tag encoding".into()))?;
    let ciphertext = b64.decode(&packet.ciphertext).map_err(|_| Error::InvalidInput("bad ciphertext encoding".into()))?;
    let aad = packet_aad(&packet.sender_node_id, &packet.receiver_node_id);

    primitives::aead_decrypt(session_key, &nonce, &ciphertext, &tag, &aad)
}
