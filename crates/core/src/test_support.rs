// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers and proptest strategies for tests across crates.

pub mod strategies {
    use crate::status::BuildStatus;
    use proptest::prelude::*;

    pub fn arb_status() -> impl Strategy<Value = BuildStatus> {
        prop_oneof![
            Just(BuildStatus::Queued),
            Just(BuildStatus::Running),
            Just(BuildStatus::Uploading),
            Just(BuildStatus::Cancelling),
            Just(BuildStatus::Passed),
            Just(BuildStatus::Failed),
            Just(BuildStatus::Cancelled),
            Just(BuildStatus::Promoted),
            Just(BuildStatus::Skipped),
        ]
    }

    pub fn arb_terminal_status() -> impl Strategy<Value = BuildStatus> {
        prop_oneof![
            Just(BuildStatus::Passed),
            Just(BuildStatus::Failed),
            Just(BuildStatus::Cancelled),
        ]
    }

    /// Lowercase tag of 1..8 chars, the shape real host-tags take.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }
}
