//! Conflict merge
//!
//! Combines the server and client copies of a task reported as a push
//! conflict. The server is authoritative for task-level fields; checklists
//! are unioned by item id so concurrent checklist edits are not lost.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::types::{ChecklistItem, Task};

/// Merge a conflicting pair into one reconciled task.
///
/// Every top-level field comes from `server` except `checklist`, which is
/// the union produced by [`merge_checklists`].
pub fn merge_task(server: &Task, client: &Task) -> Task {
    Task {
        checklist: merge_checklists(&server.checklist, &client.checklist),
        ..server.clone()
    }
}

/// Union two checklists keyed by item id.
///
/// Server items keep their order; client items overlay matching ids field
/// by field and unknown ids are appended in client order.
pub fn merge_checklists(server: &[ChecklistItem], client: &[ChecklistItem]) -> Vec<ChecklistItem> {
    let mut merged: Vec<ChecklistItem> = server.to_vec();
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id.clone(), i))
        .collect();

    for item in client {
        match index.get(&item.id) {
            Some(&i) => overlay_item(&mut merged[i], item),
            None => {
                index.insert(item.id.clone(), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged
}

/// Client fields win; server fields the client did not send survive
fn overlay_item(base: &mut ChecklistItem, client: &ChecklistItem) {
    if client.text.is_some() {
        base.text = client.text.clone();
    }
    if client.status.is_some() {
        base.status = client.status;
    }
    overlay_fields(&mut base.extra, &client.extra);
}

fn overlay_fields(base: &mut Map<String, Value>, client: &Map<String, Value>) {
    for (key, value) in client {
        base.insert(key.clone(), value.clone());
    }
}
