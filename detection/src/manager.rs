//! Alert lifecycle orchestration: evaluation, persistence gating,
//! throttling, deduplication, peak tracking, auto-resolution and
//! escalation. Runs on a single task per service, which serializes alert
//! creation per condition key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use surveil_model::{
    condition_key, AggregatedMetrics, Alert, AlertDefinition, AlertPriority, AlertThreshold,
    InstrumentId, ResolutionKind, Venue,
};
use tracing::{debug, error, info};

use crate::evaluator::AlertEvaluator;
use crate::persistence::PersistenceTracker;
use crate::store::{AlertStore, StoreError};

pub const DEFAULT_THROTTLE_SECONDS: u64 = 60;
pub const DEFAULT_ESCALATION_SECONDS: u64 = 300;

/// Outcome of one metrics tick: alerts created and alerts auto-resolved.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub triggered: Vec<Alert>,
    pub resolved: Vec<Alert>,
}

pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    evaluator: AlertEvaluator,
    persistence: PersistenceTracker,
    definitions: BTreeMap<String, AlertDefinition>,
    /// instrument -> alert_type -> thresholds; `*` is the wildcard row.
    thresholds: BTreeMap<String, BTreeMap<String, AlertThreshold>>,
    global_throttle_seconds: u64,
    escalation_seconds: u64,
    auto_resolve: bool,

    /// condition_key -> last firing time (throttle).
    last_fired: HashMap<String, DateTime<Utc>>,
    /// condition keys with a live alert (dedup).
    active_conditions: HashSet<String>,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        definitions: BTreeMap<String, AlertDefinition>,
        thresholds: BTreeMap<String, BTreeMap<String, AlertThreshold>>,
        global_throttle_seconds: u64,
        escalation_seconds: u64,
        auto_resolve: bool,
    ) -> Self {
        info!(
            definitions = definitions.len(),
            instruments_with_thresholds = thresholds.len(),
            global_throttle_seconds,
            escalation_seconds,
            auto_resolve,
            "alert manager initialized"
        );
        Self {
            store,
            evaluator: AlertEvaluator::new(),
            persistence: PersistenceTracker::new(),
            definitions,
            thresholds,
            global_throttle_seconds,
            escalation_seconds,
            auto_resolve,
            last_fired: HashMap::new(),
            active_conditions: HashSet::new(),
        }
    }

    /// Seeds the dedup set from the store, so a restart cannot create a
    /// second active alert for a condition that is already live.
    pub async fn load_active_conditions(&mut self) -> Result<(), StoreError> {
        for alert in self.store.get_active_alerts().await? {
            self.active_conditions.insert(alert.condition_key());
        }
        info!(count = self.active_conditions.len(), "active conditions loaded");
        Ok(())
    }

    pub fn active_condition_count(&self) -> usize {
        self.active_conditions.len()
    }

    /// Administrative/test operation.
    pub fn clear_throttle_state(&mut self) {
        self.last_fired.clear();
    }

    /// Administrative/test operation.
    pub fn clear_dedup_state(&mut self) {
        self.active_conditions.clear();
    }

    /// Evaluates every applicable definition against one metrics record.
    pub async fn process_metrics(
        &mut self,
        venue: Venue,
        instrument: &InstrumentId,
        metrics: &AggregatedMetrics,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, StoreError> {
        let mut outcome = ProcessOutcome::default();
        let mut current_conditions: HashSet<String> = HashSet::new();

        let instrument_thresholds = self
            .thresholds
            .get(instrument.as_str())
            .or_else(|| self.thresholds.get("*"))
            .cloned()
            .unwrap_or_default();

        let definitions: Vec<AlertDefinition> = self.definitions.values().cloned().collect();
        for definition in definitions {
            let Some(threshold) = instrument_thresholds.get(&definition.alert_type) else {
                continue;
            };
            let Some(metric_value) = metrics.metric_value(&definition.metric_name) else {
                continue;
            };
            let zscore_value = metrics.metric_zscore(&definition.metric_name);
            let key = condition_key(&definition.alert_type, instrument, venue);

            let result =
                self.evaluator
                    .evaluate(&definition, metric_value, zscore_value, threshold);

            // persistence always sees the raw triggered flag, independent
            // of throttling and dedup, so the clock accumulates or resets
            // on its own schedule
            self.persistence.track(&key, result.triggered, now);

            if !result.triggered {
                continue;
            }
            current_conditions.insert(key.clone());

            if definition.has_persistence()
                && !self.persistence.is_persistence_met(
                    &key,
                    definition.persistence_seconds.unwrap_or(0),
                    now,
                )
            {
                debug!(condition_key = %key, "waiting for persistence");
                continue;
            }

            if self.should_throttle(&definition, &key, now) {
                info!(condition_key = %key, "alert throttled");
                continue;
            }

            if self.active_conditions.contains(&key) {
                // duplicate of a live alert: track its extreme instead
                self.update_existing_alert_peak(&key, metric_value, now)
                    .await?;
                continue;
            }

            let alert = Alert::new(
                &definition,
                result.priority.unwrap_or(definition.default_priority),
                result.severity.unwrap_or(definition.default_severity),
                venue,
                instrument.clone(),
                metric_value,
                threshold.threshold,
                zscore_value,
                threshold.zscore_threshold,
                now,
            );

            self.store.save(&alert).await?;
            self.last_fired.insert(key.clone(), now);
            self.active_conditions.insert(key.clone());
            // the alert fired; the clock for the next occurrence starts
            // from the next continuous run
            self.persistence.clear(&key);

            info!(
                alert_type = %alert.alert_type,
                alert_id = %alert.alert_id,
                priority = %alert.priority,
                metric_value = %metric_value,
                "alert triggered"
            );
            outcome.triggered.push(alert);
        }

        if self.auto_resolve {
            outcome.resolved = self
                .resolve_cleared_conditions(&current_conditions, venue, instrument, metrics, now)
                .await?;
        }

        Ok(outcome)
    }

    /// Promotes every eligible P2 alert to P1.
    pub async fn check_escalations(&mut self, now: DateTime<Utc>) -> Result<Vec<Alert>, StoreError> {
        let mut escalated_alerts = Vec::new();
        let eligible = match self
            .store
            .get_alerts_for_escalation_check(self.escalation_seconds, now)
            .await
        {
            Ok(eligible) => eligible,
            Err(err) => {
                error!(%err, "escalation check failed");
                return Ok(escalated_alerts);
            }
        };

        for alert in eligible {
            if let Some(escalated) = self
                .store
                .update_escalation(&alert.alert_id, AlertPriority::P1, now)
                .await?
            {
                info!(
                    alert_id = %escalated.alert_id,
                    from_priority = %alert.priority,
                    to_priority = %escalated.priority,
                    age_seconds = (now - alert.triggered_at).num_seconds(),
                    "alert escalated"
                );
                escalated_alerts.push(escalated);
            }
        }
        Ok(escalated_alerts)
    }

    /// Manual resolution path.
    pub async fn resolve_alert(
        &mut self,
        alert_id: &str,
        resolution_type: ResolutionKind,
        resolution_value: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let resolved = self
            .store
            .update_resolution(alert_id, now, resolution_type, resolution_value)
            .await?;
        if let Some(resolved) = &resolved {
            self.active_conditions.remove(&resolved.condition_key());
        }
        Ok(resolved)
    }

    fn should_throttle(
        &self,
        definition: &AlertDefinition,
        condition_key: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(last) = self.last_fired.get(condition_key) else {
            return false;
        };
        let throttle = if definition.throttle_seconds > 0 {
            definition.throttle_seconds
        } else {
            self.global_throttle_seconds
        };
        (now - *last).num_seconds() < throttle as i64
    }

    async fn update_existing_alert_peak(
        &self,
        condition_key: &str,
        metric_value: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for alert in self.store.get_active_alerts().await? {
            if alert.condition_key() == condition_key {
                self.store
                    .update_peak(&alert.alert_id, metric_value, now)
                    .await?;
                break;
            }
        }
        Ok(())
    }

    /// Auto-resolves alerts whose conditions cleared on this tick.
    async fn resolve_cleared_conditions(
        &mut self,
        current_conditions: &HashSet<String>,
        venue: Venue,
        instrument: &InstrumentId,
        metrics: &AggregatedMetrics,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        let suffix = format!(":{}:{}", instrument, venue);
        let cleared: Vec<String> = self
            .active_conditions
            .iter()
            .filter(|key| !current_conditions.contains(*key) && key.ends_with(&suffix))
            .cloned()
            .collect();

        let mut resolved_alerts = Vec::new();
        for key in cleared {
            let active = self.store.get_active_alerts().await?;
            for alert in active {
                if alert.condition_key() != key {
                    continue;
                }
                let resolution_value = metrics.metric_value(&alert.trigger_metric);
                if let Some(resolved) = self
                    .store
                    .update_resolution(&alert.alert_id, now, ResolutionKind::Auto, resolution_value)
                    .await?
                {
                    self.active_conditions.remove(&key);
                    info!(
                        alert_id = %resolved.alert_id,
                        alert_type = %resolved.alert_type,
                        duration_seconds = ?resolved.duration_seconds,
                        "alert auto-resolved"
                    );
                    resolved_alerts.push(resolved);
                }
                break;
            }
        }
        Ok(resolved_alerts)
    }
}
