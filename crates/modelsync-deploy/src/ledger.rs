//! Endpoint status ledger
//!
//! Remembers the last status observed per endpoint so that transitions and
//! repeated deferrals can be logged across ticks. Never consulted when
//! deciding what to do.

use dashmap::DashMap;
use modelsync_types::EndpointStatus;
use tracing::{info, warn};

/// Consecutive deferrals after which a stuck endpoint is reported
const STUCK_AFTER: u32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Last observed status, `None` when the endpoint was absent
    pub status: Option<EndpointStatus>,
    /// Consecutive ticks the endpoint could not be modified
    pub deferrals: u32,
}

#[derive(Debug, Default)]
pub struct EndpointLedger {
    entries: DashMap<String, LedgerEntry>,
}

impl EndpointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, logging a transition if the status changed
    pub fn observe(&self, endpoint: &str, status: Option<&EndpointStatus>) {
        let mut entry = self.entries.entry(endpoint.to_string()).or_default();
        if entry.status.as_ref() != status {
            info!(
                endpoint,
                from = entry.status.as_ref().map(EndpointStatus::as_str).unwrap_or("absent"),
                to = status.map(EndpointStatus::as_str).unwrap_or("absent"),
                "Endpoint status changed"
            );
            entry.status = status.cloned();
            entry.deferrals = 0;
        }
    }

    /// Count a deferral and return how many happened in a row
    pub fn defer(&self, endpoint: &str) -> u32 {
        let mut entry = self.entries.entry(endpoint.to_string()).or_default();
        entry.deferrals += 1;
        if entry.deferrals == STUCK_AFTER {
            warn!(
                endpoint,
                deferrals = entry.deferrals,
                status = ?entry.status,
                "Endpoint has not left its transitional status"
            );
        }
        entry.deferrals
    }

    /// Reset the deferral streak after a successful mutation
    pub fn settled(&self, endpoint: &str) {
        if let Some(mut entry) = self.entries.get_mut(endpoint) {
            entry.deferrals = 0;
        }
    }

    pub fn forget(&self, endpoint: &str) {
        self.entries.remove(endpoint);
    }

    pub fn get(&self, endpoint: &str) -> Option<LedgerEntry> {
        self.entries.get(endpoint).map(|e| e.clone())
    }
}
