//! Property tests: routing diff.

use modelsync_deploy::diff;
use modelsync_types::RoutingTable;
use proptest::prelude::*;
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Generate a routing table over a small name space so tables overlap.
fn arb_table() -> impl Strategy<Value = RoutingTable> {
    let stage = prop_oneof![Just("Production"), Just("Staging"), Just("Latest")];
    let binding = ("m[0-2]", stage, prop::collection::btree_set("[1-5]", 1..4));
    prop::collection::vec(binding, 0..8).prop_map(|bindings| {
        let mut table = RoutingTable::default();
        for (model, stage, versions) in bindings {
            table.insert(&model, stage, versions);
        }
        table
    })
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Applying the diff reaches the desired table, after which there is nothing left to do.
    #[test]
    fn diff_is_idempotent_after_apply(current in arb_table(), desired in arb_table()) {
        let actions = diff(&current, &desired);
        let mut applied = current.clone();
        applied.apply(&actions);

        prop_assert_eq!(&applied, &desired);
        prop_assert!(diff(&applied, &desired).is_empty());
    }

    /// A table never differs from itself.
    #[test]
    fn equal_tables_are_noop(table in arb_table()) {
        prop_assert!(diff(&table, &table.clone()).is_empty());
    }

    /// Each action targets a distinct (model, stage).
    #[test]
    fn actions_target_distinct_bindings(current in arb_table(), desired in arb_table()) {
        let actions = diff(&current, &desired);
        let keys: Vec<_> = actions
            .create
            .iter()
            .chain(&actions.update)
            .map(|b| b.key())
            .chain(actions.delete.iter().cloned())
            .collect();
        let unique: BTreeSet<_> = keys.iter().cloned().collect();
        prop_assert_eq!(keys.len(), unique.len());
    }

    /// Bindings with the same version set are never touched.
    #[test]
    fn unchanged_bindings_are_left_alone(current in arb_table(), desired in arb_table()) {
        let actions = diff(&current, &desired);
        for binding in actions.create.iter().chain(&actions.update) {
            prop_assert_ne!(current.get(&binding.model, &binding.stage), Some(&binding.versions));
        }
    }
}
