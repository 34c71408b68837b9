//! Aggregate component health.
//!
//! Each external dependency exposes a deadline-bounded check; the system
//! report is the worst of the embedding provider, the vector store, the
//! metadata store, and the breaker states. Readiness requires all three
//! dependencies reachable; liveness only requires the process itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ComponentHealth {
    /// The worse of two health states.
    #[must_use]
    pub fn worst(self, other: ComponentHealth) -> ComponentHealth {
        self.max(other)
    }
}

/// Aggregated system health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub components: BTreeMap<String, ComponentHealth>,
}

impl SystemHealth {
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, component: impl Into<String>, health: ComponentHealth) {
        self.components.insert(component.into(), health);
    }

    /// Worst-of across all recorded components.
    #[must_use]
    pub fn overall(&self) -> ComponentHealth {
        self.components
            .values()
            .copied()
            .fold(ComponentHealth::Healthy, ComponentHealth::worst)
    }

    /// Ready to serve: every component is at least degraded-reachable.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.components
            .values()
            .all(|h| *h != ComponentHealth::Unhealthy)
    }
}

impl Default for SystemHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_of_ordering() {
        assert_eq!(
            ComponentHealth::Healthy.worst(ComponentHealth::Degraded),
            ComponentHealth::Degraded
        );
        assert_eq!(
            ComponentHealth::Degraded.worst(ComponentHealth::Unhealthy),
            ComponentHealth::Unhealthy
        );
    }

    #[test]
    fn readiness_requires_all_reachable() {
        let mut health = SystemHealth::new();
        health.record("embedding", ComponentHealth::Healthy);
        health.record("vector_store", ComponentHealth::Degraded);
        health.record("metadata", ComponentHealth::Healthy);
        assert!(health.ready());
        assert_eq!(health.overall(), ComponentHealth::Degraded);

        health.record("vector_store", ComponentHealth::Unhealthy);
        assert!(!health.ready());
        assert_eq!(health.overall(), ComponentHealth::Unhealthy);
    }
}
