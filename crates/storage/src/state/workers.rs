// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker event handlers.

use super::{StoreEvent, StoreState};

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::WorkerCreated { worker } => {
            if !state.workers.contains_key(&worker.name) {
                state.workers.insert(worker.name.clone(), worker.clone());
            }
        }

        StoreEvent::WorkerUpdated { name, patch } => {
            let Some(w) = state.workers.get_mut(name) else { return };
            if let Some(v) = &patch.distro {
                w.distro.clone_from(v);
            }
            if let Some(v) = patch.mem_total {
                w.mem_total = v;
            }
            if let Some(v) = patch.cpu_total {
                w.cpu_total = v;
            }
            if let Some(v) = &patch.cpu_type {
                w.cpu_type.clone_from(v);
            }
            if let Some(v) = patch.concurrent_runs {
                w.concurrent_runs = v;
            }
            if let Some(v) = &patch.host_tags {
                w.host_tags.clone_from(v);
            }
            if let Some(v) = patch.surges_only {
                w.surges_only = v;
            }
            if let Some(v) = patch.enlisted {
                w.enlisted = v;
            }
            if let Some(v) = &patch.allowed_tags {
                w.allowed_tags.clone_from(v);
            }
        }

        StoreEvent::WorkerPinged { name, time_ms } => {
            if let Some(w) = state.workers.get_mut(name) {
                w.last_ping_ms = Some(*time_ms);
                w.online = true;
            }
        }

        StoreEvent::WorkerOnline { name, online } => {
            if let Some(w) = state.workers.get_mut(name) {
                w.online = *online;
            }
        }

        StoreEvent::WorkerDeleted { name } => {
            // Soft delete; the row keeps its history but is skipped by auth
            // and dispatch.
            if let Some(w) = state.workers.get_mut(name) {
                w.deleted = true;
                w.online = false;
            }
        }

        _ => {}
    }
}
