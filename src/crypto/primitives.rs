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

//! The fixed, audited algorithm set: Ed25519, X25519, ChaCha20-Poly1305,
//! BLAKE2b and a CSPRNG. Every other module in `crypto/` builds on these
//! primitives only; nothing here is a protocol, just raw operations.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use crate::error::{Error, Result};

pub const SEED_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;
pub const AEAD_KEY_LEN: usize = 32;
pub const AEAD_NONCE_LEN: usize = 12;
pub const AEAD_TAG_LEN: usize = 16;

// ---------------------------------------------------------------- Ed25519

/// Sign `message` with the Ed25519 key derived from the 32-byte `seed`.
pub fn ed25519_sign(seed: &[u8], message: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
    let seed = ed25519_compact::Seed::from_slice(seed)
        .map_err(|_| Error::InvalidInput("ed25519 seed must be 32 bytes".into()))?;
    let kp = ed25519_compact::KeyPair::from_seed(seed);
    let sig = kp.sk.sign(message, None);
    Ok(*sig.as_ref().try_into().expect("ed25519 signature is 64 bytes"))
}

/// Derive the 32-byte Ed25519 public key from a 32-byte seed.
pub fn ed25519_public(seed: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let seed = ed25519_compact::Seed::from_slice(seed)
        .map_err(|_| Error::InvalidInput("ed25519 seed must be 32 bytes".into()))?;
    let kp = ed25519_compact::KeyPair::from_seed(seed);
    Ok(*kp.pk.as_ref())
}

/// Verify an Ed25519 signature. Returns `Error::SignatureInvalid` on any
/// failure (bad length or cryptographic rejection); callers never need
/// to distinguish the two.
pub fn ed25519_verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let pk = ed25519_compact::PublicKey::from_slice(public_key)
        .map_err(|_| Error::SignatureInvalid)?;
    let sig = ed25519_compact::Signature::from_slice(signature)
        .map_err(|_| Error::SignatureInvalid)?;
    pk.verify(message, &sig).map_err(|_| Error::SignatureInvalid)
}

// ----------------------------------------------------------------- X25519

/// X25519 base-point multiplication: `priv -> pub`.
pub fn x25519_base(private: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let private: [u8; 32] =
        private.try_into().map_err(|_| Error::InvalidInput("x25519 key must be 32 bytes".into()))?;
    Ok(x25519_dalek::x25519(private, x25519_dalek::X25519_BASEPOINT_BYTES))
}

/// X25519 Diffie-Hellman: `dh(priv, peer_pub) -> shared secret`.
pub fn x25519_dh(private: &[u8], peer_public: &[u8]) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let private: [u8; 32] =
        private.try_into().map_err(|_| Error::InvalidInput("x25519 key must be 32 bytes".into()))?;
    let peer_public: [u8; 32] = peer_public
        .try_into()
        .map_err(|_| Error::InvalidInput("x25519 peer public key must be 32 bytes".into()))?;
    Ok(x25519_dalek::x25519(private, peer_public))
}

// --------------------------------------------------------- ChaCha20-Poly1305

/// AEAD-encrypt `plaintext`, returning `(ciphertext, tag)` split apart as
/// the wire formats in `spec.md` require separate fields.
pub fn aead_encrypt(
    key: &[u8],
    nonce: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN])> {
    if key.len() != AEAD_KEY_LEN {
        return Err(Error::InvalidInput("AEAD key must be 32 bytes".into()))
    }
    if nonce.len() != AEAD_NONCE_LEN {
        return Err(Error::InvalidInput("AEAD nonce must be 12 bytes".into()))
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut out = cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| Error::AeadAuthFailed)?;
    let tag_at = out.len() - AEAD_TAG_LEN;
    let tag: [u8; AEAD_TAG_LEN] = out[tag_at..].try_into().unwrap();
    out.truncate(tag_at);
    Ok((out, tag))
}

/// AEAD-decrypt `ciphertext` against the detached `tag`. Returns
/// `Error::AeadAuthFailed` on any authentication failure; never panics
/// on malformed input.
pub fn aead_decrypt(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    if key.len() != AEAD_KEY_LEN {
        return Err(Error::InvalidInput("AEAD key must be 32 bytes".into()))
    }
    if nonce.len() != AEAD_NONCE_LEN {
        return Err(Error::InvalidInput("AEAD nonce must be 12 bytes".into()))
    }
    if tag.len() != AEAD_TAG_LEN {
        return Err(Error::InvalidInput("AEAD tag must be 16 bytes".into()))
    }
    let mut combined = Vec::with_capacity(ciphertext.len() + AEAD_TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: &combined, aad })
        .map_err(|_| Error::AeadAuthFailed)
}

// -------------------------------------------------------------------- SHA-256

use sha2::Digest;

/// SHA-256, used for NodeID derivation and packet signing inputs.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha2::Sha256::digest(data).into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

// ------------------------------------------------------------------ BLAKE2b

/// BLAKE2b with a configurable output length in `1..=64` bytes.
pub fn blake2b(data: &[u8], out_len: usize) -> Result<Vec<u8>> {
    if out_len == 0 || out_len > 64 {
        return Err(Error::InvalidInput("blake2b output length must be 1..=64".into()))
    }
    let hash = blake2b_simd::Params::new().hash_length(out_len).to_state().update(data).finalize();
    Ok(hash.as_bytes().to_vec())
}

/// BLAKE2b-256, the fixed-output form used for `mnemonic -> seed`.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b(data, 32).expect("32 is a valid blake2b output length").try_into().unwrap()
}

// ------------------------------------------------------------------- Random

pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

pub fn random_seed() -> [u8; SEED_LEN] {
    random_bytes(SEED_LEN).try_into().unwrap()
}

pub fn random_nonce() -> [u8; AEAD_NONCE_LEN] {
    random_bytes(AEAD_NONCE_LEN).try_into().unwrap()
}

pub fn random_hex(n: usize) -> String {
    hex::encode(random_bytes(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_sign_verify_roundtrip() {
        let seed = random_seed();
        let pk = ed25519_public(&seed).unwrap();
        let sig = ed25519_sign(&seed, b"hello").unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        ed25519_verify(&pk, b"hello", &sig).unwrap();
        assert!(ed25519_verify(&pk, b"tampered", &sig).is_err());
    }

    #[test]
    fn x25519_dh_is_symmetric() {
        let a_priv = random_seed();
        let b_priv = random_seed();
        let a_pub = x25519_base(&a_priv).unwrap();
        let b_pub = x25519_base(&b_priv).unwrap();
        let ss_a = x25519_dh(&a_priv, &b_pub).unwrap();
        let ss_b = x25519_dh(&b_priv, &a_pub).unwrap();
        assert_eq!(ss_a, ss_b);
    }

    #[test]
    fn aead_roundtrip_and_auth_failure() {
        let key = random_bytes(32);
        let nonce = random_nonce();
        let (ct, tag) = aead_encrypt(&key, &nonce, b"secret message", b"aad").unwrap();
        let pt = aead_decrypt(&key, &nonce, &ct, &tag, b"aad").unwrap();
        assert_eq!(pt, b"secret message");

        let mut bad_tag = tag;
        bad_tag[0] ^= 1;
        assert!(aead_decrypt(&key, &nonce, &ct, &bad_tag, b"aad").is_err());
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(sha256_hex(b""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn blake2b_respects_output_length() {
        assert_eq!(blake2b(b"x", 16).unwrap().len(), 16);
        assert!(blake2b(b"x", 0).is_err());
        assert!(blake2b(b"x", 65).is_err());
    }

    #[test]
    fn random_helpers_produce_expected_lengths() {
        assert_eq!(random_seed().len(), 32);
        assert_eq!(random_nonce().len(), 12);
        assert_eq!(random_hex(8).len(), 16);
    }
}
