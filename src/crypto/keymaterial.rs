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

//! BIP-39 mnemonic <-> entropy, mnemonic -> seed, and the RFC 5869 HKDF
//! used for every subkey in the system. All sensitive outputs come back
//! wrapped in `zeroize::Zeroizing`, which the caller is expected to hold
//! onto for as short a time as possible.

use hkdf::Hkdf;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

pub type SecretBytes = Zeroizing<Vec<u8>>;

/// The two PRFs HKDF may run over, per the named-derivation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prf {
    Sha512,
    Blake2b512,
}

/// RFC 5869 Extract-and-Expand in one call. `len` must be `<= 255 *
/// hLen` (64 for both supported PRFs, so `<= 16320`).
pub fn hkdf(prf: Prf, ikm: &[u8], salt: Option<&[u8]>, info: &[u8], len: usize) -> Result<SecretBytes> {
    if len > 255 * 64 {
        return Err(Error::InvalidInput("HKDF output length exceeds 255*hLen".into()))
    }
    let mut okm = vec![0u8; len];
    match prf {
        Prf::Sha512 => {
            let hk = Hkdf::<sha2::Sha512>::new(salt, ikm);
            hk.expand(info, &mut okm).map_err(|_| Error::InvalidInput("HKDF expand failed".into()))?;
        }
        Prf::Blake2b512 => {
            // blake2::Blake2b512's block size is 128 bytes, matching
            // BLAKE2b's native block size (not BLAKE2s's 64).
            let hk = Hkdf::<blake2::Blake2b512>::new(salt, ikm);
            hk.expand(info, &mut okm).map_err(|_| Error::InvalidInput("HKDF expand failed".into()))?;
        }
    }
    Ok(Zeroizing::new(okm))
}

fn label_info(prefix: &str, label: &str) -> Vec<u8> {
    format!("{prefix}:{label}").into_bytes()
}

/// `nzcore:key:<label>` -> 32 bytes, the BLAKE2b-PRF named derivation
/// used for identity/ecdh/sign/box subkeys.
pub fn derive_key(ikm: &[u8], label: &str) -> Result<SecretBytes> {
    hkdf(Prf::Blake2b512, ikm, None, &label_info("nzcore:key", label), 32)
}

/// `nzcore:nonce:<label>` -> 12-byte nonce base.
pub fn derive_nonce_base(ikm: &[u8], label: &str) -> Result<[u8; 12]> {
    let bytes = hkdf(Prf::Blake2b512, ikm, None, &label_info("nzcore:nonce", label), 12)?;
    Ok((*bytes).clone().try_into().unwrap())
}

/// `nzcore:session:<ctx>||0x01` / `||0x02` -> (send_key, recv_key).
pub fn derive_session_keys(shared_secret: &[u8], ctx: &str) -> Result<(SecretBytes, SecretBytes)> {
    let mut info_send = label_info("nzcore:session", ctx);
    info_send.push(0x01);
    let mut info_recv = label_info("nzcore:session", ctx);
    info_recv.push(0x02);
    let send = hkdf(Prf::Blake2b512, shared_secret, None, &info_send, 32)?;
    let recv = hkdf(Prf::Blake2b512, shared_secret, None, &info_recv, 32)?;
    Ok((send, recv))
}

/// `nzcore:box:<label>` -> 32-byte AEAD key from a shared secret.
pub fn derive_box_key(shared_secret: &[u8], label: &str) -> Result<SecretBytes> {
    hkdf(Prf::Blake2b512, shared_secret, None, &label_info("nzcore:box", label), 32)
}

/// `nzcore:jwt:v1` -> 32-byte HMAC key for the administrative API
/// collaborator. The API itself is out of scope; deriving its key from
/// the same seed material is in scope.
pub fn derive_jwt_key(seed: &[u8]) -> Result<SecretBytes> {
    hkdf(Prf::Blake2b512, seed, None, b"nzcore:jwt:v1", 32)
}

// ----------------------------------------------------------------- Mnemonic

/// Valid BIP-39 entropy sizes, in bits.
pub const ENTROPY_BITS: [usize; 5] = [128, 160, 192, 224, 256];

/// Generate a fresh random entropy of `bits` size and encode it as a
/// mnemonic. `bits` must be one of `ENTROPY_BITS`.
pub fn generate_mnemonic(bits: usize) -> Result<String> {
    if !ENTROPY_BITS.contains(&bits) {
        return Err(Error::InvalidInput("entropy size must be 128/160/192/224/256 bits".into()))
    }
    let entropy = crate::crypto::primitives::random_bytes(bits / 8);
    entropy_to_mnemonic(&entropy)
}

/// `entropy -> mnemonic`: word count and checksum follow BIP-39 exactly.
pub fn entropy_to_mnemonic(entropy: &[u8]) -> Result<String> {
    let bits = entropy.len() * 8;
    if !ENTROPY_BITS.contains(&bits) {
        return Err(Error::InvalidMnemonic)
    }
    let m = bip39::Mnemonic::from_entropy(entropy).map_err(|_| Error::InvalidMnemonic)?;
    Ok(m.to_string())
}

/// `mnemonic -> entropy`, rejecting invalid words or a checksum mismatch
/// with `Error::InvalidMnemonic`.
pub fn mnemonic_to_entropy(mnemonic: &str) -> Result<Vec<u8>> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();
    if words.len() % 3 != 0 || words.is_empty() {
        return Err(Error::InvalidMnemonic)
    }
    let m = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, mnemonic)
        .map_err(|_| Error::InvalidMnemonic)?;
    Ok(m.to_entropy())
}

/// `mnemonic -> seed = BLAKE2b-256(entropy)`. Deterministic, 32 bytes.
pub fn mnemonic_to_seed(mnemonic: &str) -> Result<SecretBytes> {
    let entropy = mnemonic_to_entropy(mnemonic)?;
    let seed = crate::crypto::primitives::blake2b_256(&entropy);
    Ok(Zeroizing::new(seed.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_entropy_roundtrip() {
        let entropy = vec![0u8; 16];
        let mnemonic = entropy_to_mnemonic(&entropy).unwrap();
        assert_eq!(mnemonic.split_whitespace().count(), 12);
        let back = mnemonic_to_entropy(&mnemonic).unwrap();
        assert_eq!(back, entropy);
    }

    #[test]
    fn deterministic_identity_vector() {
        // From spec.md scenario 2: the all-zero 16-byte entropy mnemonic.
        let mnemonic = "abandon abandon abandon abandon abandon abandon abandon abandon \
                         abandon abandon abandon about";
        let seed = mnemonic_to_seed(mnemonic).unwrap();
        let seed2 = mnemonic_to_seed(mnemonic).unwrap();
        assert_eq!(*seed, *seed2);

        let identity_seed = derive_key(&seed, "identity").unwrap();
        let pub1 = crate::crypto::primitives::ed25519_public(&identity_seed).unwrap();
        let pub2 = crate::crypto::primitives::ed25519_public(&identity_seed).unwrap();
        assert_eq!(pub1, pub2);
    }

    #[test]
    fn rejects_bad_checksum() {
        let words = "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo";
        assert!(mnemonic_to_entropy(words).is_err());
    }

    #[test]
    fn hkdf_output_length_matches_request() {
        let out = derive_key(b"ikm", "test").unwrap();
        assert_eq!(out.len(), 32);
        let nonce = derive_nonce_base(b"ikm", "test").unwrap();
        assert_eq!(nonce.len(), 12);
    }

    #[test]
    fn session_keys_are_distinct() {
        let (send, recv) = derive_session_keys(b"shared-secret", "ctx").unwrap();
        assert_ne!(*send, *recv);
    }
}
