//! Version set differences
//!
//! The per-version resources a deploy target owns are independent of stage,
//! so additions and removals are computed over the union of every stage.

use crate::model::Model;
use crate::version::ModelVersion;
use std::collections::BTreeSet;

/// Versions to create and versions to retire in one reconciliation tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDelta {
    /// Desired but not deployed
    pub new: BTreeSet<ModelVersion>,
    /// Deployed but no longer desired by any stage
    pub expired: BTreeSet<ModelVersion>,
}

impl VersionDelta {
    pub fn between(desired: &[Model], current: &[Model]) -> Self {
        let desired = union_of(desired);
        let current = union_of(current);
        Self {
            new: desired.difference(&current).cloned().collect(),
            expired: current.difference(&desired).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.expired.is_empty()
    }
}

/// Union of `unique_versions` across models
pub fn union_of(models: &[Model]) -> BTreeSet<ModelVersion> {
    models.iter().flat_map(Model::unique_versions).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ModelEndpoint;

    #[test]
    fn test_between() {
        let desired = vec![Model::new("m1")
            .with_stage("Prod", ["1", "2"])
            .with_stage("Latest", ["3"])];
        let current = vec![
            Model::new("m1").with_stage("Prod", ["1"]),
            Model::new("m2").with_stage("Prod", ["1"]),
        ];

        let delta = VersionDelta::between(&desired, &current);
        assert_eq!(
            delta.new,
            [ModelVersion::new("m1", "2"), ModelVersion::new("m1", "3")]
                .into_iter()
                .collect()
        );
        assert_eq!(
            delta.expired,
            [ModelVersion::new("m2", "1")].into_iter().collect()
        );
    }

    #[test]
    fn test_version_moving_between_stages_is_not_expired() {
        let desired = vec![Model::new("m1").with_stage("Staging", ["1"])];
        let current = vec![Model::new("m1").with_stage("Prod", ["1"])];

        assert!(VersionDelta::between(&desired, &current).is_empty());
    }

    #[test]
    fn test_location_does_not_create_spurious_delta() {
        let desired = vec![Model::new("m1").with_stage("Prod", ["1"])];
        let mut observed = Model::new("m1");
        observed.bind(
            "Prod",
            ModelEndpoint::new(ModelVersion::new("m1", "1")).with_location("https://m1"),
        );

        assert!(VersionDelta::between(&desired, &[observed]).is_empty());
    }
}
