//! Alert persistence behind a capability trait. Production binds the
//! dual KV+TSDB store; tests bind the in-memory store.
//!
//! Dual-write contract: the KV store is the online source of truth and a
//! KV failure aborts the logical operation. The TSDB write is the audit
//! trail; its failure (after internal retries) is logged without
//! reverting the KV state.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use surveil_model::{Alert, AlertPriority, InstrumentId, ResolutionKind};
use surveil_storage::{KvStore, StorageError, TimeSeriesStore};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("alert {0} not found")]
    NotFound(String),
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Persists a new or updated alert to both stores.
    async fn save(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError>;

    async fn get_active_alerts(&self) -> Result<Vec<Alert>, StoreError>;

    async fn get_alerts_by_priority(
        &self,
        priority: AlertPriority,
    ) -> Result<Vec<Alert>, StoreError>;

    async fn get_alerts_by_instrument(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<Alert>, StoreError>;

    /// active -> resolved in both stores; computes duration_seconds and
    /// drops the alert from every active index.
    async fn update_resolution(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
        resolution_type: ResolutionKind,
        resolution_value: Option<Decimal>,
    ) -> Result<Option<Alert>, StoreError>;

    async fn update_escalation(
        &self,
        alert_id: &str,
        new_priority: AlertPriority,
        escalated_at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;

    /// No-op when the stored peak is still more extreme under the
    /// condition's direction.
    async fn update_peak(
        &self,
        alert_id: &str,
        value: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;

    /// Active, un-escalated P2 alerts older than the threshold.
    async fn get_alerts_for_escalation_check(
        &self,
        threshold_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError>;
}

// ---------------------------------------------------------------------
// dual store
// ---------------------------------------------------------------------

pub struct DualAlertStore {
    kv: KvStore,
    tsdb: TimeSeriesStore,
}

impl DualAlertStore {
    pub fn new(kv: KvStore, tsdb: TimeSeriesStore) -> Self {
        Self { kv, tsdb }
    }

    /// Audit write; failures are surfaced in the log only.
    async fn audit(&self, alert: &Alert) {
        if let Err(err) = self.tsdb.upsert_alert(alert).await {
            error!(alert_id = %alert.alert_id, %err, "tsdb alert write failed after retries");
        }
    }

    async fn mutate<F>(&self, alert_id: &str, transition: F) -> Result<Option<Alert>, StoreError>
    where
        F: FnOnce(Alert) -> Option<Alert>,
    {
        let Some(alert) = self.kv.get_alert(alert_id).await? else {
            return Ok(None);
        };
        let Some(updated) = transition(alert) else {
            return Ok(None);
        };
        self.kv.set_alert(&updated).await?;
        self.audit(&updated).await;
        Ok(Some(updated))
    }
}

#[async_trait]
impl AlertStore for DualAlertStore {
    async fn save(&self, alert: &Alert) -> Result<(), StoreError> {
        // KV is critical for correctness: a failure here fails the save
        self.kv.set_alert(alert).await?;
        self.audit(alert).await;
        Ok(())
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self.kv.get_alert(alert_id).await?)
    }

    async fn get_active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self.kv.get_active_alerts().await?)
    }

    async fn get_alerts_by_priority(
        &self,
        priority: AlertPriority,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(self.kv.get_alerts_by_priority(priority).await?)
    }

    async fn get_alerts_by_instrument(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(self.kv.get_alerts_by_instrument(instrument).await?)
    }

    async fn update_resolution(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
        resolution_type: ResolutionKind,
        resolution_value: Option<Decimal>,
    ) -> Result<Option<Alert>, StoreError> {
        self.mutate(alert_id, |alert| {
            Some(alert.resolve(resolution_type, resolution_value, resolved_at))
        })
        .await
    }

    async fn update_escalation(
        &self,
        alert_id: &str,
        new_priority: AlertPriority,
        escalated_at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        self.mutate(alert_id, |alert| Some(alert.escalate(new_priority, escalated_at)))
            .await
    }

    async fn update_peak(
        &self,
        alert_id: &str,
        value: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        self.mutate(alert_id, |mut alert| {
            alert.update_peak(value, at).then_some(alert)
        })
        .await
    }

    async fn get_alerts_for_escalation_check(
        &self,
        threshold_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        let p2 = self.kv.get_alerts_by_priority(AlertPriority::P2).await?;
        Ok(filter_escalation_eligible(p2, threshold_seconds, now))
    }
}

fn filter_escalation_eligible(
    alerts: Vec<Alert>,
    threshold_seconds: u64,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    alerts
        .into_iter()
        .filter(|a| {
            a.is_active()
                && !a.escalated
                && now - a.triggered_at >= Duration::seconds(threshold_seconds as i64)
        })
        .collect()
}

// ---------------------------------------------------------------------
// in-memory store
// ---------------------------------------------------------------------

/// HashMap-backed store with the same contract; used by tests and local
/// tooling.
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<HashMap<String, Alert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn save(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts
            .lock()
            .insert(alert.alert_id.clone(), alert.clone());
        Ok(())
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.lock().get(alert_id).cloned())
    }

    async fn get_active_alerts(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .lock()
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn get_alerts_by_priority(
        &self,
        priority: AlertPriority,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .lock()
            .values()
            .filter(|a| a.is_active() && a.priority == priority)
            .cloned()
            .collect())
    }

    async fn get_alerts_by_instrument(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<Alert>, StoreError> {
        Ok(self
            .alerts
            .lock()
            .values()
            .filter(|a| a.is_active() && &a.instrument == instrument)
            .cloned()
            .collect())
    }

    async fn update_resolution(
        &self,
        alert_id: &str,
        resolved_at: DateTime<Utc>,
        resolution_type: ResolutionKind,
        resolution_value: Option<Decimal>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut alerts = self.alerts.lock();
        let Some(alert) = alerts.get(alert_id).cloned() else {
            return Ok(None);
        };
        let resolved = alert.resolve(resolution_type, resolution_value, resolved_at);
        alerts.insert(alert_id.to_string(), resolved.clone());
        Ok(Some(resolved))
    }

    async fn update_escalation(
        &self,
        alert_id: &str,
        new_priority: AlertPriority,
        escalated_at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut alerts = self.alerts.lock();
        let Some(alert) = alerts.get(alert_id).cloned() else {
            return Ok(None);
        };
        let escalated = alert.escalate(new_priority, escalated_at);
        alerts.insert(alert_id.to_string(), escalated.clone());
        Ok(Some(escalated))
    }

    async fn update_peak(
        &self,
        alert_id: &str,
        value: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut alerts = self.alerts.lock();
        let Some(mut alert) = alerts.get(alert_id).cloned() else {
            return Ok(None);
        };
        if alert.update_peak(value, at) {
            alerts.insert(alert_id.to_string(), alert.clone());
            Ok(Some(alert))
        } else {
            Ok(None)
        }
    }

    async fn get_alerts_for_escalation_check(
        &self,
        threshold_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        let p2 = self.get_alerts_by_priority(AlertPriority::P2).await?;
        Ok(filter_escalation_eligible(p2, threshold_seconds, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use surveil_model::{
        AlertCondition, AlertDefinition, AlertSeverity, Venue,
    };

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn sample_alert() -> Alert {
        let definition = AlertDefinition {
            alert_type: "spread_warning".to_string(),
            name: "Spread Warning".to_string(),
            metric_name: "spread_bps".to_string(),
            default_priority: AlertPriority::P2,
            default_severity: AlertSeverity::Warning,
            condition: AlertCondition::Gt,
            requires_zscore: true,
            persistence_seconds: None,
            throttle_seconds: 60,
            escalation_seconds: None,
            escalates_to: None,
            enabled: true,
        };
        Alert::new(
            &definition,
            AlertPriority::P2,
            AlertSeverity::Warning,
            Venue::Binance,
            "BTC-USDT-PERP".into(),
            dec!(3.5),
            dec!(3.0),
            Some(dec!(2.5)),
            Some(dec!(2.0)),
            ts(0),
        )
    }

    #[tokio::test]
    async fn test_save_then_get_returns_equal_alert() -> eyre::Result<()> {
        let store = MemoryAlertStore::new();
        let alert = sample_alert();
        store.save(&alert).await?;
        let loaded = store.get_alert(&alert.alert_id).await?.unwrap();
        assert_eq!(loaded, alert);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolution_removes_from_active() -> eyre::Result<()> {
        let store = MemoryAlertStore::new();
        let alert = sample_alert();
        store.save(&alert).await?;
        assert_eq!(store.get_active_alerts().await?.len(), 1);

        let resolved = store
            .update_resolution(&alert.alert_id, ts(95), ResolutionKind::Auto, Some(dec!(1.2)))
            .await?
            .unwrap();
        assert_eq!(resolved.duration_seconds, Some(95));
        assert!(store.get_active_alerts().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_escalation_check_filters_by_age_and_flag() -> eyre::Result<()> {
        let store = MemoryAlertStore::new();
        let young = sample_alert();
        store.save(&young).await?;

        let mut old = sample_alert();
        old.triggered_at = ts(-400);
        store.save(&old).await?;

        let eligible = store.get_alerts_for_escalation_check(300, ts(0)).await?;
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].alert_id, old.alert_id);

        // escalated alerts never come back
        store
            .update_escalation(&old.alert_id, AlertPriority::P1, ts(0))
            .await?;
        assert!(store
            .get_alerts_for_escalation_check(300, ts(0))
            .await?
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_peak_noop_when_less_extreme() -> eyre::Result<()> {
        let store = MemoryAlertStore::new();
        let alert = sample_alert();
        store.save(&alert).await?;

        assert!(store
            .update_peak(&alert.alert_id, dec!(3.0), ts(10))
            .await?
            .is_none());
        let updated = store
            .update_peak(&alert.alert_id, dec!(4.2), ts(20))
            .await?
            .unwrap();
        assert_eq!(updated.peak_value, Some(dec!(4.2)));
        Ok(())
    }
}
