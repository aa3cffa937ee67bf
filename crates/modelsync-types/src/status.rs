//! Observed endpoint status
//!
//! Platform endpoints move through their lifecycle on their own schedule; the
//! controller only ever sees a snapshot of the current status.

use serde::{Deserialize, Serialize};

/// Status of a serving endpoint as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointStatus {
    Creating,
    Updating,
    SystemUpdating,
    RollingBack,
    InService,
    OutOfService,
    Deleting,
    Failed,
    /// A status this controller does not know about
    Other(String),
}

impl EndpointStatus {
    /// Statuses that represent a meaningful current binding
    ///
    /// Endpoints in any other status are left out of the actual state.
    pub const LISTED: [EndpointStatus; 5] = [
        EndpointStatus::Creating,
        EndpointStatus::Updating,
        EndpointStatus::SystemUpdating,
        EndpointStatus::InService,
        EndpointStatus::Failed,
    ];

    pub fn parse(raw: &str) -> Self {
        match raw {
            "Creating" => Self::Creating,
            "Updating" => Self::Updating,
            "SystemUpdating" => Self::SystemUpdating,
            "RollingBack" => Self::RollingBack,
            "InService" => Self::InService,
            "OutOfService" => Self::OutOfService,
            "Deleting" => Self::Deleting,
            "Failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "Creating",
            Self::Updating => "Updating",
            Self::SystemUpdating => "SystemUpdating",
            Self::RollingBack => "RollingBack",
            Self::InService => "InService",
            Self::OutOfService => "OutOfService",
            Self::Deleting => "Deleting",
            Self::Failed => "Failed",
            Self::Other(raw) => raw,
        }
    }

    /// The platform is converging this endpoint and rejects mutation
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Updating | Self::SystemUpdating | Self::RollingBack
        )
    }

    pub fn is_listed(&self) -> bool {
        Self::LISTED.contains(self)
    }
}

impl std::fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndpointStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_known_statuses() {
        for raw in [
            "Creating",
            "Updating",
            "SystemUpdating",
            "RollingBack",
            "InService",
            "OutOfService",
            "Deleting",
            "Failed",
        ] {
            assert_eq!(EndpointStatus::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status = EndpointStatus::parse("Hibernating");
        assert_eq!(status, EndpointStatus::Other("Hibernating".into()));
        assert!(!status.is_listed());
        assert!(!status.is_transitional());
    }

    #[test]
    fn test_listed_whitelist() {
        assert!(EndpointStatus::Failed.is_listed());
        assert!(EndpointStatus::SystemUpdating.is_listed());
        assert!(!EndpointStatus::Deleting.is_listed());
        assert!(!EndpointStatus::OutOfService.is_listed());
        assert!(!EndpointStatus::RollingBack.is_listed());
    }
}
