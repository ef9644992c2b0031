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

//! Deterministic JSON encoding used as the sole serialization for every
//! signature input in the codec layer: object keys in ascending
//! code-point order, arrays in input order, no whitespace, `null`
//! fields dropped rather than emitted. `serde_json::Value`'s map is
//! `BTreeMap`-backed (the `preserve_order` feature is never enabled in
//! this crate), so sorted keys fall out of the ordinary compact
//! serializer for free; we only need to strip nulls ourselves.

use serde_json::Value;

use crate::error::Result;

/// Recursively drop object entries whose value is `Value::Null`,
/// mirroring "undefined fields are omitted" for a language without an
/// `undefined`.
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if v.is_null() {
                    continue
                }
                out.insert(k.clone(), strip_nulls(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// Encode `value` as canonical JSON: sorted keys, no whitespace, no
/// null fields.
pub fn canonicalize(value: &Value) -> Result<String> {
    let stripped = strip_nulls(value);
    Ok(serde_json::to_string(&stripped)?)
}

/// Encode a serializable value as canonical JSON in one step.
pub fn to_canonical_string<T: serde::Serialize>(value: &T) -> Result<String> {
    let v = serde_json::to_value(value)?;
    canonicalize(&v)
}
