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

//! Small filesystem and encoding helpers shared across the core.

pub mod canonical_json;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Expand a leading `~` to the user's home directory. Paths without one
/// are returned unchanged.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return Ok(Path::new(&home).join(rest))
        }
    }
    Ok(PathBuf::from(path))
}

/// Read a file's full contents as raw bytes.
pub fn load_file(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

/// Write `data` to `path`, creating parent directories as needed and
/// setting the file mode to `mode` on unix. Used for every persisted
/// secret in `env/` (master key, salt, seed, identity keys, trust store).
pub fn save_file_with_mode(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    set_mode(path, mode)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Securely delete a file: overwrite its contents with zeroes before
/// unlinking, best-effort. Used when migrating the v1 plaintext seed
/// format to v2.
pub fn secure_delete(path: &Path) -> Result<()> {
    if let Ok(meta) = std::fs::metadata(path) {
        let zeros = vec![0u8; meta.len() as usize];
        let _ = std::fs::write(path, &zeros);
    }
    std::fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_leaves_absolute_paths_alone() {
        let p = expand_path("/tmp/foo").unwrap();
        assert_eq!(p, PathBuf::from("/tmp/foo"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("nzcore-test-{}", std::process::id()));
        let path = dir.join("a/b/file.bin");
        save_file_with_mode(&path, b"hello", 0o600).unwrap();
        let back = load_file(&path).unwrap();
        assert_eq!(back, b"hello");
        let _ = std::fs::remove_dir_all(&dir);
    }
}
