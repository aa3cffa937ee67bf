//! Routing tables and routing diffs
//!
//! A [`RoutingTable`] is the comparison-friendly projection of a list of
//! models: `model -> stage -> version ids`. It is always derived from live
//! models and never carried from one reconciliation tick to the next.

use crate::model::Model;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `model -> stage -> version ids`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable(BTreeMap<String, BTreeMap<String, BTreeSet<String>>>);

impl RoutingTable {
    /// Project models onto a routing table
    ///
    /// A stage with no versions is not a binding and is left out.
    pub fn from_models<'a, I>(models: I) -> Self
    where
        I: IntoIterator<Item = &'a Model>,
    {
        let mut table = Self::default();
        for model in models {
            for (stage, endpoints) in &model.versions {
                if endpoints.is_empty() {
                    continue;
                }
                let ids = endpoints
                    .iter()
                    .map(|endpoint| endpoint.version_id().to_string())
                    .collect();
                table.insert(&model.name, stage, ids);
            }
        }
        table
    }

    pub fn get(&self, model: &str, stage: &str) -> Option<&BTreeSet<String>> {
        self.0.get(model).and_then(|stages| stages.get(stage))
    }

    pub fn contains(&self, model: &str, stage: &str) -> bool {
        self.get(model, stage).is_some()
    }

    pub fn insert(&mut self, model: &str, stage: &str, versions: BTreeSet<String>) {
        self.0
            .entry(model.to_string())
            .or_default()
            .insert(stage.to_string(), versions);
    }

    pub fn remove(&mut self, model: &str, stage: &str) -> Option<BTreeSet<String>> {
        let stages = self.0.get_mut(model)?;
        let removed = stages.remove(stage);
        if stages.is_empty() {
            self.0.remove(model);
        }
        removed
    }

    /// Iterate `(model, stage, versions)` in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &BTreeSet<String>)> {
        self.0.iter().flat_map(|(model, stages)| {
            stages
                .iter()
                .map(move |(stage, versions)| (model.as_str(), stage.as_str(), versions))
        })
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into `(model, stage, version)` triples
    pub fn deployments(&self) -> BTreeSet<(String, String, String)> {
        self.iter()
            .flat_map(|(model, stage, versions)| {
                versions
                    .iter()
                    .map(move |v| (model.to_string(), stage.to_string(), v.clone()))
            })
            .collect()
    }

    /// Apply a diff in place, as a deploy target that honoured it would
    pub fn apply(&mut self, diff: &RoutingDiff) {
        for binding in diff.create.iter().chain(&diff.update) {
            self.insert(&binding.model, &binding.stage, binding.versions.clone());
        }
        for key in &diff.delete {
            self.remove(&key.model, &key.stage);
        }
    }
}

/// Addresses one `(model, stage)` binding
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageKey {
    pub model: String,
    pub stage: String,
}

impl StageKey {
    pub fn new(model: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stage: stage.into(),
        }
    }
}

impl std::fmt::Display for StageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.model, self.stage)
    }
}

/// A `(model, stage)` binding with the versions it should route to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBinding {
    pub model: String,
    pub stage: String,
    pub versions: BTreeSet<String>,
}

impl StageBinding {
    pub fn key(&self) -> StageKey {
        StageKey::new(&self.model, &self.stage)
    }
}

/// Actions that take a current routing table to a desired one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDiff {
    /// Bindings absent from the current table
    pub create: Vec<StageBinding>,
    /// Bindings present in both tables with different version sets
    pub update: Vec<StageBinding>,
    /// Bindings present only in the current table
    pub delete: Vec<StageKey>,
}

impl RoutingDiff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_models() {
        let models = vec![
            Model::new("m1")
                .with_stage("Prod", ["1", "2"])
                .with_stage("Latest", ["3"]),
            Model::new("m2").with_stage("Prod", ["1"]),
        ];
        let table = RoutingTable::from_models(&models);

        assert_eq!(table.get("m1", "Prod"), Some(&ids(&["1", "2"])));
        assert_eq!(table.get("m1", "Latest"), Some(&ids(&["3"])));
        assert_eq!(table.get("m2", "Prod"), Some(&ids(&["1"])));
        assert_eq!(table.get("m2", "Latest"), None);
        assert_eq!(table.iter().count(), 3);
    }

    #[test]
    fn test_empty_stage_is_not_a_binding() {
        let mut model = Model::new("m1").with_stage("Prod", ["1"]);
        model.versions.insert("Staging".into(), BTreeSet::new());
        let table = RoutingTable::from_models([&model]);

        assert!(table.contains("m1", "Prod"));
        assert!(!table.contains("m1", "Staging"));
    }

    #[test]
    fn test_deployments_flatten() {
        let models = vec![Model::new("m1")
            .with_stage("Prod", ["1", "2"])
            .with_stage("Staging", ["2"])];
        let deployments = RoutingTable::from_models(&models).deployments();

        assert_eq!(deployments.len(), 3);
        assert!(deployments.contains(&("m1".into(), "Staging".into(), "2".into())));
    }

    #[test]
    fn test_remove_drops_empty_models() {
        let mut table = RoutingTable::default();
        table.insert("m1", "Prod", ids(&["1"]));
        assert_eq!(table.remove("m1", "Prod"), Some(ids(&["1"])));
        assert!(table.is_empty());
        assert_eq!(table.remove("m1", "Prod"), None);
    }

    #[test]
    fn test_apply() {
        let mut table = RoutingTable::default();
        table.insert("m1", "Prod", ids(&["1"]));
        table.insert("m2", "Prod", ids(&["1"]));

        let diff = RoutingDiff {
            create: vec![StageBinding {
                model: "m1".into(),
                stage: "Latest".into(),
                versions: ids(&["3"]),
            }],
            update: vec![StageBinding {
                model: "m1".into(),
                stage: "Prod".into(),
                versions: ids(&["1", "2"]),
            }],
            delete: vec![StageKey::new("m2", "Prod")],
        };
        table.apply(&diff);

        assert_eq!(table.get("m1", "Prod"), Some(&ids(&["1", "2"])));
        assert_eq!(table.get("m1", "Latest"), Some(&ids(&["3"])));
        assert!(!table.contains("m2", "Prod"));
        assert_eq!(diff.len(), 3);
    }
}
