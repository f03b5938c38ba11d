//! Alert records and the documented lifecycle transitions. Alerts are
//! mutated only through `resolve`, `escalate`, `update_peak` and
//! `acknowledge`; everything else is set at creation.

use chrono::{DateTime, Utc};
use parse_display::{Display, FromStr};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{InstrumentId, Venue};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, FromStr,
)]
pub enum AlertPriority {
    P1,
    P2,
    P3,
}

impl AlertPriority {
    pub fn is_critical(&self) -> bool {
        matches!(self, AlertPriority::P1)
    }

    pub fn is_actionable(&self) -> bool {
        matches!(self, AlertPriority::P1 | AlertPriority::P2)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromStr,
)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    Gt,
    Lt,
    AbsGt,
    AbsLt,
}

impl AlertCondition {
    pub fn evaluate(&self, value: Decimal, threshold: Decimal) -> bool {
        match self {
            AlertCondition::Gt => value > threshold,
            AlertCondition::Lt => value < threshold,
            AlertCondition::AbsGt => value.abs() > threshold,
            AlertCondition::AbsLt => value.abs() < threshold,
        }
    }

    /// Upward family: more extreme means larger magnitude.
    pub fn is_upward(&self) -> bool {
        matches!(self, AlertCondition::Gt | AlertCondition::AbsGt)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, FromStr,
)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    Auto,
    Manual,
    Timeout,
}

/// Configuration-driven alert type definition; immutable per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDefinition {
    pub alert_type: String,
    pub name: String,
    pub metric_name: String,
    pub default_priority: AlertPriority,
    pub default_severity: AlertSeverity,
    pub condition: AlertCondition,
    #[serde(default)]
    pub requires_zscore: bool,
    #[serde(default)]
    pub persistence_seconds: Option<u64>,
    #[serde(default = "default_throttle_seconds")]
    pub throttle_seconds: u64,
    #[serde(default)]
    pub escalation_seconds: Option<u64>,
    #[serde(default)]
    pub escalates_to: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_throttle_seconds() -> u64 {
    60
}

fn default_enabled() -> bool {
    true
}

impl AlertDefinition {
    pub fn has_persistence(&self) -> bool {
        self.persistence_seconds.map_or(false, |s| s > 0)
    }

    pub fn can_escalate(&self) -> bool {
        self.escalates_to.is_some()
    }
}

/// Per-instrument threshold values for one alert type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThreshold {
    pub threshold: Decimal,
    #[serde(default)]
    pub zscore_threshold: Option<Decimal>,
}

/// Result of one evaluation. Expected gating outcomes (warmup, disabled,
/// misconfiguration) travel as `skip_reason`, not as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResult {
    pub triggered: bool,
    pub alert_type: String,
    pub priority: Option<AlertPriority>,
    pub severity: Option<AlertSeverity>,
    pub skip_reason: Option<String>,
    pub message: Option<String>,
}

impl AlertResult {
    pub fn not_triggered(alert_type: &str) -> Self {
        Self {
            triggered: false,
            alert_type: alert_type.to_string(),
            priority: None,
            severity: None,
            skip_reason: None,
            message: None,
        }
    }

    pub fn skipped(alert_type: &str, skip_reason: &str, message: impl Into<String>) -> Self {
        Self {
            triggered: false,
            alert_type: alert_type.to_string(),
            priority: None,
            severity: None,
            skip_reason: Some(skip_reason.to_string()),
            message: Some(message.into()),
        }
    }

    pub fn was_skipped(&self) -> bool {
        !self.triggered && self.skip_reason.is_some()
    }
}

/// Active or historical alert instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub alert_type: String,
    /// Current priority; changes only via the escalate transition.
    pub priority: AlertPriority,
    pub severity: AlertSeverity,
    pub venue: Venue,
    pub instrument: InstrumentId,

    pub trigger_metric: String,
    pub trigger_value: Decimal,
    pub trigger_threshold: Decimal,
    pub trigger_condition: AlertCondition,
    pub zscore_value: Option<Decimal>,
    pub zscore_threshold: Option<Decimal>,

    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,

    pub peak_value: Option<Decimal>,
    pub peak_at: Option<DateTime<Utc>>,

    pub escalated: bool,
    pub escalated_at: Option<DateTime<Utc>>,
    pub original_priority: Option<AlertPriority>,

    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,

    pub resolution_type: Option<ResolutionKind>,
    pub resolution_value: Option<Decimal>,
}

impl Alert {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        definition: &AlertDefinition,
        priority: AlertPriority,
        severity: AlertSeverity,
        venue: Venue,
        instrument: InstrumentId,
        trigger_value: Decimal,
        trigger_threshold: Decimal,
        zscore_value: Option<Decimal>,
        zscore_threshold: Option<Decimal>,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4().to_string(),
            alert_type: definition.alert_type.clone(),
            priority,
            severity,
            venue,
            instrument,
            trigger_metric: definition.metric_name.clone(),
            trigger_value,
            trigger_threshold,
            trigger_condition: definition.condition,
            zscore_value,
            zscore_threshold,
            triggered_at,
            acknowledged_at: None,
            resolved_at: None,
            duration_seconds: None,
            peak_value: Some(trigger_value),
            peak_at: Some(triggered_at),
            escalated: false,
            escalated_at: None,
            original_priority: None,
            context: Default::default(),
            resolution_type: None,
            resolution_value: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    pub fn condition_key(&self) -> String {
        condition_key(&self.alert_type, &self.instrument, self.venue)
    }

    pub fn acknowledge(mut self, timestamp: DateTime<Utc>) -> Self {
        self.acknowledged_at = Some(timestamp);
        self
    }

    pub fn resolve(
        mut self,
        resolution_type: ResolutionKind,
        resolution_value: Option<Decimal>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        self.duration_seconds = Some((timestamp - self.triggered_at).num_seconds());
        self.resolved_at = Some(timestamp);
        self.resolution_type = Some(resolution_type);
        self.resolution_value = resolution_value;
        self
    }

    pub fn escalate(mut self, new_priority: AlertPriority, timestamp: DateTime<Utc>) -> Self {
        self.original_priority = Some(self.priority);
        self.priority = new_priority;
        self.escalated = true;
        self.escalated_at = Some(timestamp);
        self
    }

    /// Replaces the peak when the new observation is more extreme under the
    /// condition's direction: larger |value| for gt/abs_gt, smaller for
    /// lt/abs_lt. Returns whether the peak changed.
    pub fn update_peak(&mut self, value: Decimal, timestamp: DateTime<Utc>) -> bool {
        let should_update = match self.peak_value {
            None => true,
            Some(peak) => {
                if self.trigger_condition.is_upward() {
                    value.abs() > peak.abs()
                } else {
                    value.abs() < peak.abs()
                }
            }
        };
        if should_update {
            self.peak_value = Some(value);
            self.peak_at = Some(timestamp);
        }
        should_update
    }
}

/// `alert_type:instrument:venue`, the identity used for persistence,
/// throttling and deduplication.
pub fn condition_key(alert_type: &str, instrument: &InstrumentId, venue: Venue) -> String {
    format!("{}:{}:{}", alert_type, instrument, venue)
}
