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

//! Two-message authenticated X25519 key exchange, signed with the
//! long-term Ed25519 identity key. Identity private keys never touch
//! the wire, only their signatures over the ephemeral public key.

use serde::{Deserialize, Serialize};

use crate::{
    crypto::primitives,
    error::{Error, Result},
};

const TRANSCRIPT_LABEL: &[u8] = b"NZ-CRYPTO-02/handshake/v1";

/// serde only derives `Serialize`/`Deserialize` for arrays up to 32
/// bytes; 64-byte signatures go over the wire as hex, same as the
/// teacher's JSON-RPC surfaces.
mod sig_hex {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(sig: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(sig).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AliceHello {
    pub e_pub: [u8; 32],
    #[serde(with = "sig_hex")]
    pub sig: [u8; 64],
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BobHello {
    pub e_pub: [u8; 32],
    #[serde(with = "sig_hex")]
    pub sig: [u8; 64],
}

fn transcript(e_pub: &[u8; 32]) -> Vec<u8> {
    let mut t = Vec::with_capacity(TRANSCRIPT_LABEL.len() + 32);
    t.extend_from_slice(TRANSCRIPT_LABEL);
    t.extend_from_slice(e_pub);
    t
}

/// A.start: generate the initiator's ephemeral key and sign it with the
/// long-term identity seed. Keep `e_priv` to finish the handshake later.
pub struct InitiatorState {
    pub e_priv: [u8; 32],
}

pub fn initiator_start(identity_seed: &[u8]) -> Result<(InitiatorState, AliceHello)> {
    let e_priv = primitives::random_seed();
    let e_pub = primitives::x25519_base(&e_priv)?;
    let sig = primitives::ed25519_sign(identity_seed, &transcript(&e_pub))?;
    Ok((InitiatorState { e_priv }, AliceHello { e_pub, sig }))
}

/// B.respond: verify Alice's signed ephemeral key, generate Bob's own
/// ephemeral key, and compute the shared secret. Returns
/// `Error::HandshakeFailed` (wrapping `SignatureInvalid`) on any
/// verification failure; there is no retry path.
pub fn responder_respond(
    identity_seed: &[u8],
    initiator_identity_pub: &[u8],
    alice_hello: &AliceHello,
) -> Result<(BobHello, [u8; 32])> {
    primitives::ed25519_verify(initiator_identity_pub, &transcript(&alice_hello.e_pub), &alice_hello.sig)
        .map_err(|_| Error::HandshakeFailed("alice signature invalid".into()))?;

    let e_priv = primitives::random_seed();
    let e_pub = primitives::x25519_base(&e_priv)?;
    let sig = primitives::ed25519_sign(identity_seed, &transcript(&e_pub))?;
    let shared_secret = primitives::x25519_dh(&e_priv, &alice_hello.e_pub)?;

    Ok((BobHello { e_pub, sig }, shared_secret))
}

/// A.finish: verify Bob's signed ephemeral key and compute the shared
/// secret. On success, both sides hold an identical `shared_secret`.
pub fn initiator_finish(
    state: InitiatorState,
    responder_identity_pub: &[u8],
    bob_hello: &BobHello,
) -> Result<[u8; 32]> {
    primitives::ed25519_verify(responder_identity_pub, &transcript(&bob_hello.e_pub), &bob_hello.sig)
        .map_err(|_| Error::HandshakeFailed("bob signature invalid".into()))?;

    primitives::x25519_dh(&state.e_priv, &bob_hello.e_pub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{identity, keymaterial};

    fn fresh_identity() -> ([u8; 32], [u8; 32]) {
        let seed = primitives::random_seed();
        let kp = identity::derive_identity(&seed).unwrap();
        (kp.ed25519_seed, kp.ed25519_public)
    }

    #[test]
    fn handshake_produces_matching_shared_secret() {
        let (a_seed, a_pub) = fresh_identity();
        let (b_seed, b_pub) = fresh_identity();

        let (init_state, alice_hello) = initiator_start(&a_seed).unwrap();
        let (bob_hello, ss_b) = responder_respond(&b_seed, &a_pub, &alice_hello).unwrap();
        let ss_a = initiator_finish(init_state, &b_pub, &bob_hello).unwrap();

        assert_eq!(ss_a, ss_b);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let (a_seed, a_pub) = fresh_identity();
        let (b_seed, _b_pub) = fresh_identity();

        let (_init_state, mut alice_hello) = initiator_start(&a_seed).unwrap();
        alice_hello.sig[0] ^= 1;

        let result = responder_respond(&b_seed, &a_pub, &alice_hello);
        assert!(result.is_err());
    }

    #[test]
    fn identity_keys_are_never_serialized_on_the_wire() {
        // AliceHello/BobHello only carry the ephemeral pub key + signature.
        let (a_seed, _) = fresh_identity();
        let (_state, hello) = initiator_start(&a_seed).unwrap();
        let json = serde_json::to_string(&hello).unwrap();
        assert!(!json.contains(&hex::encode(keymaterial::derive_key(&a_seed, "unused").unwrap().as_slice())));
    }
}
