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

//! Initializes and unlocks the `env/` directory: master key bootstrap
//! (with the `NODE_ENV=production` temporary-key guard), password
//! validation, and wiring the seed/identity/trust files into one
//! `Env` handle the daemon hands to its collaborators.

use std::path::{Path, PathBuf};

use log::warn;

use crate::{
    config,
    crypto::{identity, keymaterial, primitives},
    error::{Error, Result},
    util,
};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Reject passwords under `MIN_PASSWORD_LEN` chars. The bootstrap CLI
/// confirms the password separately; this only checks shape.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::InvalidPassword)
    }
    Ok(())
}

/// Layout under `env/`, mirroring §6 of the persisted-state contract.
pub struct EnvPaths {
    pub root: PathBuf,
}

impl EnvPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn master_key(&self) -> PathBuf {
        self.root.join("master.key")
    }

    pub fn master_salt(&self) -> PathBuf {
        self.root.join("master.salt")
    }

    pub fn seed(&self) -> PathBuf {
        self.root.join("seed.enc")
    }

    pub fn identity_key(&self) -> PathBuf {
        self.root.join("keys/identity.json")
    }

    pub fn ecdh_key(&self) -> PathBuf {
        self.root.join("keys/ecdh.json")
    }

    pub fn trust(&self) -> PathBuf {
        self.root.join("trust.json")
    }
}

/// The unlocked runtime handle: master key in memory, identity/ECDH
/// keypair, and the env paths everything else is persisted under.
/// Handed to request handlers in place of process-wide singletons.
pub struct Env {
    pub paths: EnvPaths,
    pub master_key: identity::SecretBytes,
    pub identity: identity::IdentityKeyPair,
}

fn init_master_salt(paths: &EnvPaths) -> Result<Vec<u8>> {
    if paths.master_salt().exists() {
        return util::load_file(&paths.master_salt())
    }
    let salt = primitives::random_bytes(32);
    util::save_file_with_mode(&paths.master_salt(), &salt, 0o600)?;
    Ok(salt)
}

/// Full `env/` initialization from a password and an optional mnemonic:
/// derives or generates the salt, derives the master key from the
/// password via scrypt and persists it to `master.key` for unattended
/// restarts, generates a mnemonic if none is supplied, persists the
/// seed and identity/ecdh keys, and returns the unlocked `Env`. The CLI
/// caller is responsible for prompting/confirming the password and
/// exiting non-zero on `Err`.
pub fn init_env(root: impl Into<PathBuf>, password: &str, mnemonic: Option<String>) -> Result<Env> {
    validate_password(password)?;
    let paths = EnvPaths::new(root);

    let salt = init_master_salt(&paths)?;
    let master_key = identity::derive_master_key(password.as_bytes(), &salt)?;
    util::save_file_with_mode(&paths.master_key(), &master_key, 0o600)?;

    let mnemonic = match mnemonic {
        Some(m) => {
            keymaterial::mnemonic_to_entropy(&m)?;
            m
        }
        None => keymaterial::generate_mnemonic(256)?,
    };
    let seed = keymaterial::mnemonic_to_seed(&mnemonic)?;

    identity::save_seed(&paths.seed(), &seed, &master_key)?;
    let kp = identity::load_or_derive_identity(&paths.identity_key(), &paths.ecdh_key(), &seed)?;

    Ok(Env { paths, master_key, identity: kp })
}

/// Unlock an already-initialized `env/` directory with its password.
/// Re-derives the master key from the password and `master.salt`, and
/// rejects it with `Error::InvalidPassword` if it doesn't match the
/// persisted `master.key` before ever touching the seed file.
pub fn unlock_env(root: impl Into<PathBuf>, password: &str) -> Result<Env> {
    validate_password(password)?;
    let paths = EnvPaths::new(root);

    let salt = init_master_salt(&paths)?;
    let master_key = identity::derive_master_key(password.as_bytes(), &salt)?;

    let stored = util::load_file(&paths.master_key())?;
    if !identity::verify_master_key(&master_key, &stored) {
        return Err(Error::InvalidPassword)
    }

    let seed = identity::load_seed(&paths.seed(), &master_key)?;
    let kp = identity::load_or_derive_identity(&paths.identity_key(), &paths.ecdh_key(), &seed)?;

    Ok(Env { paths, master_key, identity: kp })
}

/// Unattended daemon startup with no interactive password: `initMasterKey`.
/// Loads `env/master.key` if present, otherwise honors `NZCORE_MASTER_KEY`
/// in production, or (outside production) generates and persists a
/// temporary key with a logged warning. Fatal with `MasterKeyMissing` if
/// production and neither is available.
pub fn start_daemon_env(root: impl Into<PathBuf>) -> Result<Env> {
    let paths = EnvPaths::new(root);
    let master_key = init_master_key(&paths)?;
    let seed = identity::load_seed(&paths.seed(), &master_key)?;
    let kp = identity::load_or_derive_identity(&paths.identity_key(), &paths.ecdh_key(), &seed)?;
    Ok(Env { paths, master_key, identity: kp })
}

fn init_master_key(paths: &EnvPaths) -> Result<identity::SecretBytes> {
    if paths.master_key().exists() {
        let bytes = util::load_file(&paths.master_key())?;
        if bytes.len() != 32 {
            return Err(Error::InvalidInput("master.key must be 32 bytes".into()))
        }
        return Ok(zeroize::Zeroizing::new(bytes))
    }

    if let Some(override_key) = config::master_key_override() {
        util::save_file_with_mode(&paths.master_key(), &override_key, 0o600)?;
        return Ok(zeroize::Zeroizing::new(override_key.to_vec()))
    }

    if config::is_production() {
        return Err(Error::MasterKeyMissing)
    }

    warn!("no env/master.key and NODE_ENV is not production: generating a temporary master key");
    let key = primitives::random_bytes(32);
    util::save_file_with_mode(&paths.master_key(), &key, 0o600)?;
    Ok(zeroize::Zeroizing::new(key))
}

/// Whether `root` already looks like an initialized `env/` directory.
pub fn is_initialized(root: &Path) -> bool {
    root.join("seed.enc").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("nzcore-bootstrap-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn rejects_short_password() {
        assert!(matches!(validate_password("short"), Err(Error::InvalidPassword)));
        assert!(validate_password("longenough").is_ok());
    }

    #[test]
    fn init_then_unlock_recovers_same_identity() {
        let root = tmp_root("init-unlock");
        let env1 = init_env(&root, "correct horse battery", None).unwrap();
        let env2 = unlock_env(&root, "correct horse battery").unwrap();
        assert_eq!(env1.identity.ed25519_public, env2.identity.ed25519_public);
        assert_eq!(env1.identity.x25519_public, env2.identity.x25519_public);
        assert!(is_initialized(&root));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn unlock_with_wrong_password_is_rejected_before_touching_seed() {
        let root = tmp_root("wrong-password");
        init_env(&root, "correct horse battery", None).unwrap();
        let result = unlock_env(&root, "totally different password");
        assert!(matches!(result, Err(Error::InvalidPassword)));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn daemon_startup_reuses_persisted_master_key() {
        let root = tmp_root("daemon-startup");
        let env1 = init_env(&root, "correct horse battery", None).unwrap();
        let env2 = start_daemon_env(&root).unwrap();
        assert_eq!(*env1.master_key, *env2.master_key);
        assert_eq!(env1.identity.ed25519_public, env2.identity.ed25519_public);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn init_with_explicit_mnemonic_is_deterministic() {
        let root = tmp_root("explicit-mnemonic");
        let mnemonic = "abandon abandon abandon abandon abandon abandon abandon abandon \
                         abandon abandon abandon about"
            .to_string();
        let env = init_env(&root, "correct horse battery", Some(mnemonic)).unwrap();
        let expected = identity::derive_identity(&keymaterial::mnemonic_to_seed(
            "abandon abandon abandon abandon abandon abandon abandon abandon \
             abandon abandon abandon about",
        )
        .unwrap())
        .unwrap();
        assert_eq!(env.identity.ed25519_public, expected.ed25519_public);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn init_writes_full_env_layout() {
        let root = tmp_root("layout");
        init_env(&root, "correct horse battery", None).unwrap();
        assert!(root.join("master.salt").exists());
        assert!(root.join("seed.enc").exists());
        assert!(root.join("keys/identity.json").exists());
        assert!(root.join("keys/ecdh.json").exists());
        let _ = std::fs::remove_dir_all(&root);
    }
}
