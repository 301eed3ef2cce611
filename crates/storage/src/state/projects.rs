// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project and trigger event handlers.

use super::{StoreEvent, StoreState};

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::ProjectCreated { project } => {
            if !state.projects.contains_key(&project.name) {
                state.projects.insert(project.name.clone(), project.clone());
            }
        }

        StoreEvent::ProjectDeleted { name } => {
            // Soft delete: builds and triggers remain, new work is refused.
            if let Some(p) = state.projects.get_mut(name) {
                p.deleted = true;
            }
        }

        StoreEvent::TriggerCreated { trigger } => {
            state.triggers.entry(trigger.id).or_insert_with(|| trigger.clone());
            if state.next_trigger_id <= trigger.id {
                state.next_trigger_id = trigger.id + 1;
            }
        }

        StoreEvent::TriggerUpdated { id, secrets_enc, definition_repo, definition_file } => {
            if let Some(t) = state.triggers.get_mut(id) {
                if let Some(enc) = secrets_enc {
                    t.secrets_enc = enc.clone();
                }
                if definition_repo.is_some() {
                    t.definition_repo = definition_repo.clone();
                }
                if definition_file.is_some() {
                    t.definition_file = definition_file.clone();
                }
            }
        }

        StoreEvent::TriggerDeleted { id } => {
            state.triggers.remove(id);
        }

        _ => {}
    }
}
