//! Routing diff
//!
//! Compares the current routing table with the desired one and classifies
//! every `(model, stage)` binding as create, update or delete. Bindings with
//! equal version sets are left alone.

use modelsync_types::{RoutingDiff, RoutingTable, StageBinding, StageKey};

/// Actions taking `current` to `desired`
pub fn diff(current: &RoutingTable, desired: &RoutingTable) -> RoutingDiff {
    let mut out = RoutingDiff::default();

    for (model, stage, versions) in desired.iter() {
        let binding = StageBinding {
            model: model.to_string(),
            stage: stage.to_string(),
            versions: versions.clone(),
        };
        match current.get(model, stage) {
            // An empty current binding serves nothing.
            Some(existing) if !existing.is_empty() => {
                if existing != versions {
                    out.update.push(binding);
                }
            }
            _ => out.create.push(binding),
        }
    }

    for (model, stage, _) in current.iter() {
        if !desired.contains(model, stage) {
            out.delete.push(StageKey::new(model, stage));
        }
    }

    out
}
