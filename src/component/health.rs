use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tri-state component health, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

impl HealthStatus {
    /// Worst status of the set; an empty set is healthy
    pub fn worst<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses.into_iter().max().unwrap_or(HealthStatus::Healthy)
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, HealthStatus::Unavailable)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Aggregated readiness signal for an external health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub overall: HealthStatus,
    pub components: BTreeMap<String, HealthStatus>,
    pub checked_at: DateTime<Utc>,
}

impl ReadinessReport {
    pub fn from_components(components: BTreeMap<String, HealthStatus>) -> Self {
        Self {
            overall: HealthStatus::worst(components.values().copied()),
            components,
            checked_at: Utc::now(),
        }
    }

    /// Ready means nothing is unavailable; degraded components still serve
    pub fn is_ready(&self) -> bool {
        self.overall.is_available()
    }

    pub fn components_with(&self, status: HealthStatus) -> Vec<&str> {
        self.components
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
