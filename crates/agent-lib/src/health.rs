//! Per-component health derived from collection cycle outcomes
//!
//! Each cycle the collection loop records whether discovery, resolution
//! and the node pressure read succeeded. One failed cycle marks the
//! component degraded; [`UNHEALTHY_AFTER`] consecutive failures mark it
//! unhealthy, which also takes the agent out of readiness.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive failed cycles before a component counts as unhealthy
pub const UNHEALTHY_AFTER: u32 = 3;

/// Parts of the agent that report on every cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// Scanning procfs for JVM processes
    Discovery,
    /// Resolving JVM configuration
    Resolver,
    /// Reading node pressure and memory
    Pressure,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Discovery,
        Component::Resolver,
        Component::Pressure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Discovery => "discovery",
            Component::Resolver => "resolver",
            Component::Pressure => "pressure",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Outcome of the most recent cycles for one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    /// Error from the last failed cycle, cleared on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    fn failed(&self, message: String) -> Self {
        let consecutive_failures = self.consecutive_failures + 1;
        let status = if consecutive_failures >= UNHEALTHY_AFTER {
            ComponentStatus::Unhealthy
        } else {
            ComponentStatus::Degraded
        };
        Self {
            status,
            message: Some(message),
            consecutive_failures,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    first_cycle_done: bool,
}

/// Shared health state, cheap to clone
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy; readiness waits for the first cycle
    pub fn new() -> Self {
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::healthy()))
            .collect();
        Self {
            state: Arc::new(RwLock::new(State {
                components,
                first_cycle_done: false,
            })),
        }
    }

    /// Record one cycle's outcome for `component`
    pub async fn record<T, E: fmt::Display>(&self, component: Component, outcome: &Result<T, E>) {
        let mut state = self.state.write().await;
        let entry = state
            .components
            .entry(component)
            .or_insert_with(ComponentHealth::healthy);
        *entry = match outcome {
            Ok(_) => ComponentHealth::healthy(),
            Err(e) => entry.failed(e.to_string()),
        };
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.first_cycle_done = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let unhealthy: Vec<&str> = state
            .components
            .iter()
            .filter(|(_, health)| health.status == ComponentStatus::Unhealthy)
            .map(|(component, _)| component.as_str())
            .collect();

        let reason = if !state.first_cycle_done {
            Some("First collection cycle not finished".to_string())
        } else if !unhealthy.is_empty() {
            Some(format!("Unhealthy components: {}", unhealthy.join(", ")))
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
