//! Health check types for AppContext components
//!
//! A `HealthStatus` aggregates individual `ComponentHealth` checks into an
//! overall score so the health endpoint can distinguish "one worker is
//! stopped" from "the database is gone".

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Overall health of the application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall health indicator
    pub is_healthy: bool,

    /// Health score from 0.0 (completely unhealthy) to 1.0 (fully healthy),
    /// calculated as healthy_components / total_components
    pub score: f64,

    /// Optional message describing overall health state
    pub message: Option<String>,

    /// Individual component health checks
    pub components: Vec<ComponentHealth>,

    /// Unix timestamp when the health check was performed
    pub timestamp: i64,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            is_healthy: true,
            score: 1.0,
            message: None,
            components: Vec::new(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default(),
        }
    }

    /// Add a component health check, returning self for chaining
    #[must_use]
    pub fn add_component(mut self, component: ComponentHealth) -> Self {
        self.components.push(component);
        self
    }

    /// Recompute the score and the overall flag from the components
    ///
    /// The application counts as healthy when at least 80% of its
    /// components are.
    pub fn calculate_score(&mut self) {
        if self.components.is_empty() {
            self.score = 1.0;
            self.is_healthy = true;
            return;
        }

        let healthy = self.components.iter().filter(|c| c.is_healthy).count();
        self.score = healthy as f64 / self.components.len() as f64;
        self.is_healthy = self.score >= 0.8;

        if !self.is_healthy {
            let failing: Vec<&str> = self
                .components
                .iter()
                .filter(|c| !c.is_healthy)
                .map(|c| c.name.as_str())
                .collect();
            self.message = Some(format!("unhealthy components: {}", failing.join(", ")));
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Health of a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub is_healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: true, message: None }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), is_healthy: false, message: Some(message.into()) }
    }
}
