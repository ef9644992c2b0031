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

/// Error taxonomy for the core. Kinds, not instances: callers match on
/// the variant, not the message, per the error handling design.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("AEAD authentication failed")]
    AeadAuthFailed,

    #[error("Ed25519 signature verification failed")]
    SignatureInvalid,

    #[error("Replay detected: {0}")]
    ReplayDetected(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Frame error: {0}")]
    FrameError(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection pool is full")]
    PoolFull,

    #[error("No connection available for peer")]
    NoConnection,

    #[error("Master key is missing")]
    MasterKeyMissing,

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Trust store is too large")]
    TrustOverlarge,

    #[error("Invalid mnemonic")]
    InvalidMnemonic,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("TURN error: {0}")]
    TurnError(String),

    #[error("STUN error: {0}")]
    StunError(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("URL parse error: {0}")]
    UrlParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::UrlParse(err.to_string())
    }
}
