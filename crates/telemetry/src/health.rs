//! Connectivity state of the storage backends.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Backends the service depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    EventStore,
    ProfileStore,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::EventStore, Component::ProfileStore];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Outcome of the latest probe.
#[derive(Debug, Clone, Default)]
struct Probe {
    up: bool,
    failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub component: Component,
    pub up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentReport>,
}

/// Probe results, one slot per [`Component`]. Everything starts down.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    probes: RwLock<[Probe; 2]>,
}

impl HealthRegistry {
    pub fn mark_up(&self, component: Component) {
        self.probes.write()[component.slot()] = Probe {
            up: true,
            failure: None,
        };
    }

    pub fn mark_down(&self, component: Component, failure: impl Into<String>) {
        self.probes.write()[component.slot()] = Probe {
            up: false,
            failure: Some(failure.into()),
        };
    }

    pub fn is_up(&self, component: Component) -> bool {
        self.probes.read()[component.slot()].up
    }

    pub fn report(&self) -> HealthReport {
        let probes = self.probes.read().clone();
        let components: Vec<ComponentReport> = Component::ALL
            .iter()
            .map(|&component| {
                let probe = &probes[component.slot()];
                ComponentReport {
                    component,
                    up: probe.up,
                    failure: probe.failure.clone(),
                }
            })
            .collect();

        let up = components.iter().filter(|c| c.up).count();
        let status = match up {
            n if n == components.len() => HealthStatus::Healthy,
            0 => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        };

        HealthReport { status, components }
    }

    /// Tracking only needs the event store; profile folds retry on their own.
    pub fn is_ready(&self) -> bool {
        self.is_up(Component::EventStore)
    }
}

static HEALTH: LazyLock<HealthRegistry> = LazyLock::new(HealthRegistry::default);

/// Process-wide health registry.
pub fn health() -> &'static HealthRegistry {
    &HEALTH
}
