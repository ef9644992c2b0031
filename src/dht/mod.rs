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

//! Kademlia DHT: 256-bit node ids with XOR distance (`node_id`), the
//! k-bucket routing slots (`kbucket`), the refresh-aware routing table
//! (`routing_table`), and the iterative RPC layer (`kademlia`).

pub mod kademlia;
pub mod kbucket;
pub mod node_id;
pub mod routing_table;
