//! Deployment tags
//!
//! Registries mark versions with the URL they are served at so that users
//! browsing the registry can see what is live. Tags are write-only from the
//! controller's point of view.

use dashmap::DashMap;
use modelsync_types::{Model, ModelVersion};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Tag key holding the serving URL of a deployed version
pub const DEPLOY_URL_TAG: &str = "modelsync.deployment.url";

/// Tag key holding the stages a version is deployed to
pub const DEPLOY_STAGE_TAG: &str = "modelsync.deployment.stage";

/// Deployment tags currently set on a registry
#[derive(Debug, Default)]
pub struct TagBook {
    tags: DashMap<ModelVersion, VersionTags>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionTags {
    pub url: Option<String>,
    pub stages: BTreeSet<String>,
}

impl VersionTags {
    /// Render as registry tag key/value pairs
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        if let Some(url) = &self.url {
            map.insert(DEPLOY_URL_TAG, url.clone());
        }
        if !self.stages.is_empty() {
            let stages: Vec<&str> = self.stages.iter().map(String::as_str).collect();
            map.insert(DEPLOY_STAGE_TAG, stages.join(","));
        }
        map
    }
}

impl TagBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every deployed version and untag every version that is not
    ///
    /// `models` is the whole deployed state, so a model missing from it has
    /// nothing deployed and loses all its tags.
    pub fn tag_deployed(&self, models: &[Model]) {
        let mut observed: BTreeMap<ModelVersion, VersionTags> = BTreeMap::new();

        for model in models {
            for (stage, endpoints) in &model.versions {
                for endpoint in endpoints {
                    let tags = observed.entry(endpoint.version.clone()).or_default();
                    tags.stages.insert(stage.clone());
                    if endpoint.location.is_some() {
                        tags.url = endpoint.location.clone();
                    }
                }
            }
        }

        self.tags.retain(|version, _| {
            let keep = observed.contains_key(version);
            if !keep {
                info!(version = %version, "Untagging version no longer deployed");
            }
            keep
        });

        for (version, tags) in observed {
            let mut entry = self.tags.entry(version.clone()).or_default();
            if tags.url.is_some() && entry.url != tags.url {
                info!(version = %version, url = ?tags.url, "Tagging deployed version");
                entry.url = tags.url;
            }
            entry.stages = tags.stages;
        }
    }

    pub fn get(&self, version: &ModelVersion) -> Option<VersionTags> {
        self.tags.get(version).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn reset(&self) {
        let count = self.tags.len();
        self.tags.clear();
        if count > 0 {
            info!(count, "Reset deployment tags");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelsync_types::ModelEndpoint;

    fn deployed(name: &str, stage: &str, version: &str, url: Option<&str>) -> Model {
        let mut model = Model::new(name);
        let mut endpoint = ModelEndpoint::new(ModelVersion::new(name, version));
        endpoint.location = url.map(str::to_string);
        model.bind(stage, endpoint);
        model
    }

    #[test]
    fn test_tags_deployed_versions() {
        let book = TagBook::new();
        book.tag_deployed(&[deployed("m1", "Prod", "1", Some("https://m1-prod"))]);

        let tags = book.get(&ModelVersion::new("m1", "1")).unwrap();
        assert_eq!(tags.url.as_deref(), Some("https://m1-prod"));
        assert!(tags.stages.contains("Prod"));

        let map = tags.to_map();
        assert_eq!(map[DEPLOY_URL_TAG], "https://m1-prod");
        assert_eq!(map[DEPLOY_STAGE_TAG], "Prod");
    }

    #[test]
    fn test_untags_versions_no_longer_deployed() {
        let book = TagBook::new();
        book.tag_deployed(&[
            deployed("m1", "Prod", "1", Some("https://m1-prod")),
            deployed("m2", "Prod", "1", Some("https://m2-prod")),
        ]);
        book.tag_deployed(&[deployed("m1", "Prod", "2", Some("https://m1-prod"))]);

        assert!(book.get(&ModelVersion::new("m1", "1")).is_none());
        assert!(book.get(&ModelVersion::new("m1", "2")).is_some());
        // m2 has nothing deployed any more.
        assert!(book.get(&ModelVersion::new("m2", "1")).is_none());

        book.tag_deployed(&[]);
        assert!(book.is_empty());
    }

    #[test]
    fn test_stage_moves_are_reflected() {
        let book = TagBook::new();
        book.tag_deployed(&[deployed("m1", "Staging", "1", None)]);
        book.tag_deployed(&[deployed("m1", "Prod", "1", None)]);

        let tags = book.get(&ModelVersion::new("m1", "1")).unwrap();
        assert_eq!(tags.stages.into_iter().collect::<Vec<_>>(), vec!["Prod".to_string()]);
    }

    #[test]
    fn test_reset() {
        let book = TagBook::new();
        book.tag_deployed(&[deployed("m1", "Prod", "1", None)]);
        assert_eq!(book.len(), 1);
        book.reset();
        assert!(book.is_empty());
    }
}
