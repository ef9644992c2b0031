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

//! Environment variables the core itself consumes. The HTTP admin API
//! these gate is out of scope, but `initMasterKey`'s production-mode
//! check is in scope (it's part of identity bootstrap, C3).

/// Whether `NODE_ENV` names the production environment.
pub fn is_production() -> bool {
    std::env::var("NODE_ENV").map(|v| v == "production").unwrap_or(false)
}

/// A pre-provisioned master key override for production bootstrap, as
/// 64 hex characters (32 bytes). Returns `None` if unset or malformed.
pub fn master_key_override() -> Option<[u8; 32]> {
    let raw = std::env::var("NZCORE_MASTER_KEY").ok()?;
    let bytes = hex::decode(raw).ok()?;
    bytes.try_into().ok()
}

pub fn api_host() -> String {
    std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub fn api_port() -> u16 {
    std::env::var("API_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(3000)
}

pub fn allowed_origins() -> Vec<String> {
    std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        assert_eq!(api_host(), "127.0.0.1");
        assert_eq!(api_port(), 3000);
        assert_eq!(
            allowed_origins(),
            vec!["http://localhost:3000".to_string(), "http://127.0.0.1:3000".to_string()]
        );
    }
}
