// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque secret generation.

use nanoid::nanoid;

/// Generate a per-run api key. 32 url-safe characters of entropy; the value
/// is opaque and only ever compared in constant time.
pub fn new_api_key() -> String {
    nanoid!(32)
}
