//! Model version identity
//!
//! A [`ModelVersion`] is identified by `(model_name, version_id)` alone. A
//! [`ModelEndpoint`] adds the serving location reported by a deploy target;
//! the location never participates in equality, ordering or hashing so that
//! observed and declared bindings land in the same set slot.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Identity of one deployable version of a registered model
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub model_name: String,

    /// Registry-assigned version identifier
    pub version_id: String,
}

impl ModelVersion {
    pub fn new(model_name: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            version_id: version_id.into(),
        }
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.model_name, self.version_id)
    }
}

/// A version bound to a stage, optionally carrying where it is served
///
/// `location` is payload only. Two endpoints with the same version compare
/// equal and hash identically whatever their locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpoint {
    /// Identity of the served version
    #[serde(flatten)]
    pub version: ModelVersion,

    /// Externally reachable URL, when the deploy target knows one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ModelEndpoint {
    pub fn new(version: ModelVersion) -> Self {
        Self {
            version,
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn model_name(&self) -> &str {
        &self.version.model_name
    }

    pub fn version_id(&self) -> &str {
        &self.version.version_id
    }
}

impl From<ModelVersion> for ModelEndpoint {
    fn from(version: ModelVersion) -> Self {
        Self::new(version)
    }
}

impl PartialEq for ModelEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for ModelEndpoint {}

impl Hash for ModelEndpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version.hash(state);
    }
}

impl PartialOrd for ModelEndpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModelEndpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

// Eq, Ord and Hash all delegate to `version`, which keeps set lookups by
// `&ModelVersion` consistent.
impl Borrow<ModelVersion> for ModelEndpoint {
    fn borrow(&self) -> &ModelVersion {
        &self.version
    }
}

impl std::fmt::Display for ModelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} @ {}", self.version, location),
            None => write!(f, "{}", self.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::{BTreeSet, HashSet};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_location_is_not_identity() {
        let a = ModelEndpoint::new(ModelVersion::new("m1", "1")).with_location("https://a");
        let b = ModelEndpoint::new(ModelVersion::new("m1", "1")).with_location("https://b");
        let c = ModelEndpoint::new(ModelVersion::new("m1", "1"));

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&c));
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn test_different_versions_differ() {
        let a = ModelEndpoint::new(ModelVersion::new("m1", "1"));
        let b = ModelEndpoint::new(ModelVersion::new("m1", "2"));
        let c = ModelEndpoint::new(ModelVersion::new("m2", "1"));

        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sets_do_not_fragment_on_location() {
        let mut set = HashSet::new();
        set.insert(ModelEndpoint::new(ModelVersion::new("m1", "1")).with_location("https://a"));
        set.insert(ModelEndpoint::new(ModelVersion::new("m1", "1")));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&ModelVersion::new("m1", "1")));

        let ordered: BTreeSet<ModelEndpoint> = set.into_iter().collect();
        assert!(ordered.contains(&ModelVersion::new("m1", "1")));
    }

    #[test]
    fn test_display() {
        let v = ModelVersion::new("churn", "7");
        assert_eq!(v.to_string(), "churn:7");
        let e = ModelEndpoint::new(v).with_location("https://x");
        assert_eq!(e.to_string(), "churn:7 @ https://x");
    }

    #[test]
    fn test_endpoint_serializes_flat() {
        let e = ModelEndpoint::new(ModelVersion::new("m1", "3"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["model_name"], "m1");
        assert_eq!(json["version_id"], "3");
        assert!(json.get("location").is_none());
    }
}
