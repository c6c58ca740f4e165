//! Service raising, listing and resolving alerts.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::common::error::CoreResult;
use crate::common::time;
use crate::events::bus::EventBus;
use crate::events::domain::Channel;
use crate::store::Store;
use crate::training::domain::ModelType;

use super::domain::{Alert, AlertType, Severity};

/// Owns the alert lifecycle; the sole mutator of `resolved_at`.
pub struct AlertManager {
    store: Arc<dyn Store>,
    bus: EventBus,
}

impl AlertManager {
    pub fn new(store: Arc<dyn Store>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Raise an alert, deduplicating against an existing unresolved row for
    /// the same (machine, model type, alert type). Publishes `system_alert`
    /// on the events channel either way.
    pub fn raise(
        &self,
        alert_type: AlertType,
        severity: Severity,
        machine_id: &str,
        model_type: ModelType,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> CoreResult<Alert> {
        let alert = Alert {
            id: Uuid::new_v4(),
            alert_type,
            severity,
            machine_id: machine_id.to_string(),
            model_type,
            message: message.into(),
            details,
            created_at: time::now(),
            resolved_at: None,
        };
        let stored = self.store.upsert_unresolved(alert)?;
        info!(
            alert_id = %stored.id,
            machine_id = %stored.machine_id,
            alert_type = ?stored.alert_type,
            "alert raised"
        );
        self.bus.publish(
            Channel::Events,
            "system_alert",
            serde_json::to_value(&stored).unwrap_or_default(),
        );
        Ok(stored)
    }

    /// Resolve an alert. Idempotent: resolving an already-resolved alert
    /// returns the original `resolved_at`.
    pub fn resolve(&self, id: Uuid) -> CoreResult<DateTime<Utc>> {
        self.store.resolve_alert(id)
    }

    /// Unresolved alerts, severity descending then newest first.
    pub fn active(&self, machine_id: Option<&str>, model_type: Option<ModelType>) -> Vec<Alert> {
        let mut alerts = self.store.unresolved_alerts(machine_id, model_type);
        alerts.sort_by(|a, b| {
            b.severity
                .rank()
                .cmp(&a.severity.rank())
                .then(b.created_at.cmp(&a.created_at))
        });
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::bus::MemBroker;
    use crate::events::domain::Channel;
    use crate::store::mem::MemStore;

    fn manager() -> (AlertManager, EventBus) {
        let bus = EventBus::new(Arc::new(MemBroker::new(16)));
        (AlertManager::new(MemStore::shared(), bus.clone()), bus)
    }

    #[tokio::test]
    async fn repeat_raise_refreshes_instead_of_duplicating() {
        let (manager, _bus) = manager();
        let first = manager
            .raise(
                AlertType::Drift,
                Severity::Warning,
                "press-1",
                ModelType::Baseline,
                "drift score 1.3",
                serde_json::json!({}),
            )
            .unwrap();
        let second = manager
            .raise(
                AlertType::Drift,
                Severity::Critical,
                "press-1",
                ModelType::Baseline,
                "drift score 1.8",
                serde_json::json!({}),
            )
            .unwrap();

        // Same row, refreshed in place.
        assert_eq!(first.id, second.id);
        assert!(second.created_at >= first.created_at);
        assert_eq!(second.severity, Severity::Critical);
        let active = manager.active(Some("press-1"), None);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message, "drift score 1.8");
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let (manager, _bus) = manager();
        let alert = manager
            .raise(
                AlertType::TrainingFailed,
                Severity::Critical,
                "mill-2",
                ModelType::Anomaly,
                "solver blew up",
                serde_json::json!({}),
            )
            .unwrap();
        let first = manager.resolve(alert.id).unwrap();
        assert!(first >= alert.created_at);
        let second = manager.resolve(alert.id).unwrap();
        assert_eq!(first, second);
        assert!(manager.active(Some("mill-2"), None).is_empty());
    }

    #[tokio::test]
    async fn active_sorts_by_severity_then_recency() {
        let (manager, _bus) = manager();
        manager
            .raise(
                AlertType::Degradation,
                Severity::Warning,
                "a",
                ModelType::Baseline,
                "older warning",
                serde_json::json!({}),
            )
            .unwrap();
        manager
            .raise(
                AlertType::TrainingFailed,
                Severity::Critical,
                "b",
                ModelType::Baseline,
                "critical",
                serde_json::json!({}),
            )
            .unwrap();
        manager
            .raise(
                AlertType::Drift,
                Severity::Warning,
                "c",
                ModelType::Baseline,
                "newer warning",
                serde_json::json!({}),
            )
            .unwrap();

        let active = manager.active(None, None);
        assert_eq!(active.len(), 3);
        assert_eq!(active[0].severity, Severity::Critical);
        assert_eq!(active[1].message, "newer warning");
        assert_eq!(active[2].message, "older warning");
    }

    #[tokio::test]
    async fn raise_publishes_system_alert() {
        let (manager, bus) = manager();
        let mut rx = bus.subscribe(Channel::Events);
        manager
            .raise(
                AlertType::Drift,
                Severity::Warning,
                "press-1",
                ModelType::Forecast,
                "drifting",
                serde_json::json!({}),
            )
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event_type, "system_alert");
        assert_eq!(msg.payload["machine_id"], "press-1");
    }
}
