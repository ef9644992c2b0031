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

//! Cryptographic identity, secure channel, and packet layer: the
//! lowest-level fixed algorithm set (`primitives`), key derivation
//! (`keymaterial`), persistent identity and trust (`identity`), the
//! authenticated handshake (`handshake`), the epoch-keyed secure
//! channel (`channel`), and signed/routing/encrypted wire packets
//! (`packet`).

pub mod channel;
pub mod handshake;
pub mod identity;
pub mod keymaterial;
pub mod packet;
pub mod primitives;
