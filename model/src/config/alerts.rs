use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AlertCondition, AlertDefinition, AlertPriority, AlertSeverity, AlertThreshold};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsFile {
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    pub global: AlertsGlobalConfig,
    pub priorities: BTreeMap<AlertPriority, PriorityConfig>,
    /// alert_type -> definition fields (the key is the alert type).
    pub definitions: BTreeMap<String, AlertDefinitionSpec>,
    /// instrument -> alert_type -> threshold; `*` is the wildcard fallback.
    pub thresholds: BTreeMap<String, BTreeMap<String, AlertThreshold>>,
    #[serde(default)]
    pub channels: BTreeMap<String, AlertChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsGlobalConfig {
    #[serde(default = "default_throttle")]
    pub throttle_seconds: u64,
    #[serde(default = "default_dedup_window")]
    pub dedup_window_seconds: u64,
    #[serde(default = "default_auto_resolve")]
    pub auto_resolve: bool,
}

fn default_throttle() -> u64 {
    60
}
fn default_dedup_window() -> u64 {
    300
}
fn default_auto_resolve() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Ordered channel names this priority dispatches to.
    pub channels: Vec<String>,
    #[serde(default)]
    pub escalation_seconds: Option<u64>,
    #[serde(default)]
    pub color: Option<String>,
}

/// AlertDefinition minus the alert type, which is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDefinitionSpec {
    pub name: String,
    pub metric_name: String,
    pub default_priority: AlertPriority,
    pub default_severity: AlertSeverity,
    pub condition: AlertCondition,
    #[serde(default)]
    pub requires_zscore: bool,
    #[serde(default)]
    pub persistence_seconds: Option<u64>,
    #[serde(default = "default_throttle")]
    pub throttle_seconds: u64,
    #[serde(default)]
    pub escalation_seconds: Option<u64>,
    #[serde(default)]
    pub escalates_to: Option<String>,
    #[serde(default = "default_definition_enabled")]
    pub enabled: bool,
}

fn default_definition_enabled() -> bool {
    true
}

impl AlertDefinitionSpec {
    pub fn to_definition(&self, alert_type: &str) -> AlertDefinition {
        AlertDefinition {
            alert_type: alert_type.to_string(),
            name: self.name.clone(),
            metric_name: self.metric_name.clone(),
            default_priority: self.default_priority,
            default_severity: self.default_severity,
            condition: self.condition,
            requires_zscore: self.requires_zscore,
            persistence_seconds: self.persistence_seconds,
            throttle_seconds: self.throttle_seconds,
            escalation_seconds: self.escalation_seconds,
            escalates_to: self.escalates_to.clone(),
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannelConfig {
    #[serde(default = "default_channel_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub format: Option<String>,
    /// Target channel label for webhook-style integrations.
    #[serde(default)]
    pub channel: Option<String>,
}

fn default_channel_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_definition_spec_to_definition() -> eyre::Result<()> {
        let spec: AlertDefinitionSpec = serde_yaml::from_str(
            r#"
name: Spread Warning
metric_name: spread_bps
default_priority: P2
default_severity: warning
condition: gt
requires_zscore: true
"#,
        )?;
        let def = spec.to_definition("spread_warning");
        assert_eq!(def.alert_type, "spread_warning");
        assert_eq!(def.default_priority, AlertPriority::P2);
        assert_eq!(def.condition, AlertCondition::Gt);
        assert!(def.enabled);
        assert_eq!(def.throttle_seconds, 60);
        Ok(())
    }

    #[test]
    fn test_threshold_decimal_strings() -> eyre::Result<()> {
        let threshold: AlertThreshold = serde_yaml::from_str(
            r#"
threshold: "3.0"
zscore_threshold: "2.0"
"#,
        )?;
        assert_eq!(threshold.threshold, dec!(3.0));
        assert_eq!(threshold.zscore_threshold, Some(dec!(2.0)));
        Ok(())
    }
}
