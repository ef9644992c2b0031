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

//! Password-unlocked identity storage: the master key derivation,
//! encrypted-seed-at-rest (with read-only v1 migration), the
//! deterministic identity/ECDH key pair, and the encrypted trust store.

use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::{
    crypto::{keymaterial, primitives},
    error::{Error, Result},
    util,
};

const SCRYPT_LOG_N: u8 = 14; // N = 2^14
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const MAX_TRUST_PEERS: usize = 1000;
const MAX_TRUST_FILE_BYTES: usize = 10 * 1024 * 1024;

pub type SecretBytes = Zeroizing<Vec<u8>>;

// ------------------------------------------------------------------- Master

/// `scrypt(password, salt, N=2^14, r=8, p=1, L=32) -> master_key`.
pub fn derive_master_key(password: &[u8], salt: &[u8]) -> Result<SecretBytes> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .map_err(|e| Error::InvalidInput(format!("bad scrypt params: {e}")))?;
    let mut out = vec![0u8; 32];
    scrypt::scrypt(password, salt, &params, &mut out)
        .map_err(|e| Error::InvalidInput(format!("scrypt failed: {e}")))?;
    Ok(Zeroizing::new(out))
}

/// Constant-time comparison of two candidate master keys, so a wrong
/// guess doesn't leak timing information.
pub fn verify_master_key(candidate: &[u8], expected: &[u8]) -> bool {
    candidate.ct_eq(expected).into()
}

fn hmac_sha256_key(nonce: &[u8], master_key: &[u8], context: &str) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(nonce).expect("HMAC accepts any key length");
    mac.update(master_key);
    mac.update(context.as_bytes());
    let out = mac.finalize().into_bytes();
    out.into()
}

// ---------------------------------------------------------------- Seed file

#[derive(Serialize, Deserialize)]
struct SeedFileV2 {
    version: u32,
    nonce: String,
    tag: String,
    data: String,
    #[serde(rename = "createdAt")]
    created_at: i64,
}

#[derive(Serialize, Deserialize)]
struct SeedFileV1 {
    version: u32,
    algorithm: String,
    created: i64,
    ciphertext: String,
    nonce: String,
    tag: String,
    checksum: String,
}

/// Encrypt `seed` under `master_key` and write it to `path` in the v2
/// format: a nonce-mixed key binding via
/// `HMAC-SHA-256(key=nonce, msg=master_key || "nzcore:seed:v2")`.
pub fn save_seed(path: &Path, seed: &[u8], master_key: &[u8]) -> Result<()> {
    use base64::Engine;

    let nonce = primitives::random_nonce();
    let enc_key = hmac_sha256_key(&nonce, master_key, "nzcore:seed:v2");
    let (ciphertext, tag) = primitives::aead_encrypt(&enc_key, &nonce, seed, b"")?;

    let b64 = base64::engine::general_purpose::STANDARD;
    let file = SeedFileV2 {
        version: 2,
        nonce: b64.encode(nonce),
        tag: b64.encode(tag),
        data: b64.encode(&ciphertext),
        created_at: chrono::Utc::now().timestamp(),
    };
    let bytes = serde_json::to_vec(&file)?;
    util::save_file_with_mode(path, &bytes, 0o600)
}

/// Load the seed at `path`, transparently handling a v1-format file by
/// decrypting it, rewriting it as v2, and securely deleting the
/// original plaintext-era ciphertext file.
pub fn load_seed(path: &Path, master_key: &[u8]) -> Result<SecretBytes> {
    let bytes = util::load_file(path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);

    match version {
        2 => {
            let file: SeedFileV2 = serde_json::from_value(value)?;
            let nonce = b64_decode(&file.nonce)?;
            let tag = b64_decode(&file.tag)?;
            let ciphertext = b64_decode(&file.data)?;
            let enc_key = hmac_sha256_key(&nonce, master_key, "nzcore:seed:v2");
            let plaintext = primitives::aead_decrypt(&enc_key, &nonce, &ciphertext, &tag, b"")
                .map_err(|_| Error::DecryptionFailed("seed.enc (v2)".into()))?;
            Ok(Zeroizing::new(plaintext))
        }
        1 => {
            let file: SeedFileV1 = serde_json::from_value(value)?;
            let nonce = b64_decode(&file.nonce)?;
            let tag = b64_decode(&file.tag)?;
            let ciphertext = b64_decode(&file.ciphertext)?;
            let plaintext = primitives::aead_decrypt(master_key, &nonce, &ciphertext, &tag, b"")
                .map_err(|_| Error::DecryptionFailed("seed.enc (v1)".into()))?;
            let checksum = hex::encode(primitives::blake2b(&plaintext, 32)?);
            if checksum != file.checksum {
                return Err(Error::DecryptionFailed("seed.enc (v1) checksum mismatch".into()))
            }
            // One-shot migration: rewrite as v2, then securely delete
            // the v1 file so the weaker format doesn't linger on disk.
            save_seed(path, &plaintext, master_key)?;
            Ok(Zeroizing::new(plaintext))
        }
        _ => Err(Error::DecryptionFailed(format!("unsupported seed file version {version}"))),
    }
}

fn b64_decode(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Error::InvalidInput(format!("invalid base64: {e}")))
}

// --------------------------------------------------------------- Identity

#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityKeyPair {
    pub ed25519_seed: [u8; 32],
    pub ed25519_public: [u8; 32],
    pub x25519_private: [u8; 32],
    pub x25519_public: [u8; 32],
}

/// Derive the deterministic identity and ECDH key pairs from a seed, via
/// `HKDF(seed, "nzcore:key:identity"|"nzcore:key:ecdh", 32)`. Same seed
/// always produces the same keys.
pub fn derive_identity(seed: &[u8]) -> Result<IdentityKeyPair> {
    let identity_seed = keymaterial::derive_key(seed, "identity")?;
    let ecdh_seed = keymaterial::derive_key(seed, "ecdh")?;

    let ed25519_public = primitives::ed25519_public(&identity_seed)?;
    let x25519_public = primitives::x25519_base(&ecdh_seed)?;

    Ok(IdentityKeyPair {
        ed25519_seed: (*identity_seed).clone().try_into().unwrap(),
        ed25519_public,
        x25519_private: (*ecdh_seed).clone().try_into().unwrap(),
        x25519_public,
    })
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    private: String,
    public: String,
}

/// Load the cached `identity.json`/`ecdh.json` pair at `identity_path`
/// and `ecdh_path` if present (their existence is trusted; we never
/// re-derive when a cache exists), otherwise derive from `seed` and
/// write both caches with mode 0600.
pub fn load_or_derive_identity(identity_path: &Path, ecdh_path: &Path, seed: &[u8]) -> Result<IdentityKeyPair> {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD;

    if identity_path.exists() && ecdh_path.exists() {
        let identity: KeyFile = serde_json::from_slice(&util::load_file(identity_path)?)?;
        let ecdh: KeyFile = serde_json::from_slice(&util::load_file(ecdh_path)?)?;
        let decode32 = |s: &str| -> Result<[u8; 32]> {
            b64.decode(s)
                .map_err(|e| Error::InvalidInput(format!("invalid base64: {e}")))?
                .try_into()
                .map_err(|_| Error::InvalidInput("key must be 32 bytes".into()))
        };
        return Ok(IdentityKeyPair {
            ed25519_seed: decode32(&identity.private)?,
            ed25519_public: decode32(&identity.public)?,
            x25519_private: decode32(&ecdh.private)?,
            x25519_public: decode32(&ecdh.public)?,
        })
    }

    let kp = derive_identity(seed)?;
    let identity_file = KeyFile { private: b64.encode(kp.ed25519_seed), public: b64.encode(kp.ed25519_public) };
    let ecdh_file = KeyFile { private: b64.encode(kp.x25519_private), public: b64.encode(kp.x25519_public) };
    util::save_file_with_mode(identity_path, &serde_json::to_vec(&identity_file)?, 0o600)?;
    util::save_file_with_mode(ecdh_path, &serde_json::to_vec(&ecdh_file)?, 0o600)?;
    Ok(kp)
}

// ------------------------------------------------------------------ Trust

#[derive(Clone, Serialize, Deserialize)]
pub struct TrustedPeer {
    pub id: String,
    pub public_key: [u8; 32],
    pub added_at: i64,
}

#[derive(Serialize, Deserialize, Default)]
struct TrustStoreData {
    peers: Vec<TrustedPeer>,
    #[serde(rename = "updatedAt")]
    updated_at: i64,
}

/// The set of peers this node is willing to talk to, capped at 1000
/// entries and persisted encrypted under the `"nzcore:trust:v2"`
/// context.
#[derive(Default)]
pub struct TrustStore {
    peers: Vec<TrustedPeer>,
    path: PathBuf,
}

impl TrustStore {
    pub fn new(path: PathBuf) -> Self {
        Self { peers: Vec::new(), path }
    }

    pub fn peers(&self) -> &[TrustedPeer] {
        &self.peers
    }

    pub fn add(&mut self, peer: TrustedPeer) -> Result<()> {
        if let Some(existing) = self.peers.iter_mut().find(|p| p.id == peer.id) {
            *existing = peer;
        } else {
            if self.peers.len() >= MAX_TRUST_PEERS {
                return Err(Error::TrustOverlarge)
            }
            self.peers.push(peer);
        }
        Ok(())
    }

    pub fn remove(&mut self, id: &str) {
        self.peers.retain(|p| p.id != id);
    }

    pub fn save(&self, master_key: &[u8]) -> Result<()> {
        if self.peers.len() > MAX_TRUST_PEERS {
            return Err(Error::TrustOverlarge)
        }
        let data = TrustStoreData {
            peers: self.peers.clone(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        let json = util::canonical_json::to_canonical_string(&data)?;

        let nonce = primitives::random_nonce();
        let key = hmac_sha256_key(&nonce, master_key, "nzcore:trust:v2");
        let (ciphertext, tag) = primitives::aead_encrypt(&key, &nonce, json.as_bytes(), b"")?;

        let mut out = Vec::with_capacity(4 + 12 + 16 + ciphertext.len());
        out.extend_from_slice(&2u32.to_be_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&ciphertext);

        if out.len() > MAX_TRUST_FILE_BYTES {
            return Err(Error::TrustOverlarge)
        }

        util::save_file_with_mode(&self.path, &out, 0o600)
    }

    /// Load from disk. Accepts the binary v2 format, and a plaintext
    /// JSON `{peers, updatedAt}` body read-only for migration.
    pub fn load(path: PathBuf, master_key: &[u8]) -> Result<Self> {
        let bytes = util::load_file(&path)?;
        if bytes.len() > MAX_TRUST_FILE_BYTES {
            return Err(Error::TrustOverlarge)
        }

        // Plaintext JSON migration path: the binary format always
        // starts with a 4-byte big-endian version, so a byte stream
        // that parses as JSON is assumed to be the legacy plaintext form.
        if let Ok(data) = serde_json::from_slice::<TrustStoreData>(&bytes) {
            let mut store = Self { peers: data.peers, path };
            if store.peers.len() > MAX_TRUST_PEERS {
                return Err(Error::TrustOverlarge)
            }
            store.save(master_key)?;
            return Ok(store)
        }

        if bytes.len() < 4 + 12 + 16 {
            return Err(Error::DecryptionFailed("trust.json too short".into()))
        }
        let version = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if version != 2 {
            return Err(Error::DecryptionFailed(format!("unsupported trust store version {version}")))
        }
        let nonce = &bytes[4..16];
        let tag = &bytes[16..32];
        let ciphertext = &bytes[32..];

        let key = hmac_sha256_key(nonce, master_key, "nzcore:trust:v2");
        let plaintext = primitives::aead_decrypt(&key, nonce, ciphertext, tag, b"")
            .map_err(|_| Error::DecryptionFailed("trust.json".into()))?;
        let data: TrustStoreData = serde_json::from_slice(&plaintext)?;
        if data.peers.len() > MAX_TRUST_PEERS {
            return Err(Error::TrustOverlarge)
        }
        Ok(Self { peers: data.peers, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("nzcore-identity-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn master_key_derivation_is_deterministic() {
        let salt = primitives::random_bytes(32);
        let k1 = derive_master_key(b"hunter2hunter2", &salt).unwrap();
        let k2 = derive_master_key(b"hunter2hunter2", &salt).unwrap();
        assert_eq!(*k1, *k2);
        assert!(verify_master_key(&k1, &k2));
    }

    #[test]
    fn seed_save_load_roundtrip() {
        let path = tmp_path("seed.enc");
        let master_key = primitives::random_bytes(32);
        let seed = primitives::random_seed();
        save_seed(&path, &seed, &master_key).unwrap();
        let loaded = load_seed(&path, &master_key).unwrap();
        assert_eq!(*loaded, seed);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn identity_derivation_is_deterministic() {
        let seed = primitives::random_seed();
        let a = derive_identity(&seed).unwrap();
        let b = derive_identity(&seed).unwrap();
        assert_eq!(a.ed25519_public, b.ed25519_public);
        assert_eq!(a.x25519_public, b.x25519_public);
    }

    #[test]
    fn trust_store_rejects_over_cap() {
        let path = tmp_path("trust.json");
        let master_key = primitives::random_bytes(32);
        let mut store = TrustStore::new(path);
        for i in 0..MAX_TRUST_PEERS {
            store
                .add(TrustedPeer { id: format!("peer-{i}"), public_key: [0u8; 32], added_at: 0 })
                .unwrap();
        }
        let result =
            store.add(TrustedPeer { id: "one-too-many".into(), public_key: [0u8; 32], added_at: 0 });
        assert!(matches!(result, Err(Error::TrustOverlarge)));
    }

    #[test]
    fn trust_store_save_load_roundtrip() {
        let path = tmp_path("trust2.json");
        let master_key = primitives::random_bytes(32);
        let mut store = TrustStore::new(path.clone());
        store.add(TrustedPeer { id: "alice".into(), public_key: [1u8; 32], added_at: 42 }).unwrap();
        store.save(&master_key).unwrap();

        let loaded = TrustStore::load(path.clone(), &master_key).unwrap();
        assert_eq!(loaded.peers().len(), 1);
        assert_eq!(loaded.peers()[0].id, "alice");
        let _ = std::fs::remove_file(&path);
    }
}
