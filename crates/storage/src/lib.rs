// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! foreman-storage: the entity store and blob store.
//!
//! Entities live in a materialized in-memory state rebuilt from an
//! append-only WAL; a zstd-compressed snapshot compacts the log. The store's
//! single write lock is what makes the two compound operations (dense
//! build-id allocation and queued-run claiming) serialisable.

pub mod blob;
pub mod state;
pub mod store;
pub mod wal;

pub use blob::{ArtifactEntry, BlobError, BlobStore, LocalBlobStore};
pub use state::{StoreEvent, StoreState, WorkerPatch};
pub use store::{Store, StoreError};
pub use wal::{Wal, WalError};
