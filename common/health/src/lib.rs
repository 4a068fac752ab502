use std::collections::HashMap;
use std::ops::Add;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Liveness reporting for the long-lived pieces of the service.
///
/// The ingestion server depends on a handful of external collaborators
/// (registry, object store, notification bus). The process should only be
/// trusted with traffic while all of them are reachable, so each one gets a
/// handle it must ping more often than its deadline. A component that stops
/// pinging is counted as stalled and takes the liveness probe down with it.

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Set at registration, before the first report.
    Starting,
    /// Healthy until the deadline passes without a new report.
    HealthyUntil(time::OffsetDateTime),
    /// The component reported a failure itself.
    Unhealthy,
    /// The HealthyUntil deadline lapsed.
    Stalled,
}

#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let body = format!("{self:?}");
        match self.healthy {
            true => (StatusCode::OK, body),
            false => (StatusCode::INTERNAL_SERVER_ERROR, body),
        }
        .into_response()
    }
}

#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    deadline: Duration,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

impl HealthHandle {
    /// Must be called more frequently than the registered deadline.
    pub fn report_healthy(&self) {
        self.report_status(ComponentStatus::HealthyUntil(
            time::OffsetDateTime::now_utc().add(self.deadline),
        ));
    }

    pub fn report_status(&self, status: ComponentStatus) {
        match self.components.write() {
            Ok(mut map) => {
                map.insert(self.component.clone(), status);
            }
            // Poisoned lock: the probe will fail and the process restart.
            Err(err) => warn!("failed to report health status: {}", err),
        }
    }
}

#[derive(Clone, Default)]
pub struct HealthRegistry {
    name: String,
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

impl HealthRegistry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            components: Default::default(),
        }
    }

    /// Registers a component and returns the handle it should report through.
    /// Components start out in `Starting` and the probe stays red until every
    /// registered component has reported healthy.
    pub fn register(&self, component: impl Into<String>, deadline: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component: component.into(),
            deadline,
            components: self.components.clone(),
        };
        handle.report_status(ComponentStatus::Starting);
        handle
    }

    /// Overall process status: healthy only if every component reported
    /// healthy recently enough. Usable as an axum handler through
    /// `HealthStatus: IntoResponse`.
    pub fn get_status(&self) -> HealthStatus {
        let components = match self.components.read() {
            Ok(map) => map,
            Err(err) => {
                warn!("poisoned health registry lock: {}", err);
                return HealthStatus::default();
            }
        };

        let now = time::OffsetDateTime::now_utc();
        let mut status = HealthStatus {
            healthy: !components.is_empty(),
            components: HashMap::with_capacity(components.len()),
        };

        for (name, component) in components.iter() {
            match component {
                ComponentStatus::HealthyUntil(until) if until.gt(&now) => {
                    status.components.insert(name.clone(), component.clone());
                }
                ComponentStatus::HealthyUntil(_) => {
                    status.healthy = false;
                    status
                        .components
                        .insert(name.clone(), ComponentStatus::Stalled);
                }
                other => {
                    status.healthy = false;
                    status.components.insert(name.clone(), other.clone());
                }
            }
        }

        if !status.healthy {
            warn!("{} health check failed: {:?}", self.name, status.components);
        }
        status
    }
}
