//! Dual-condition alert evaluation: primary threshold AND z-score.
//!
//! Expected gating outcomes travel as skip reasons in the result, never
//! as errors: a missing z-score during warmup is correct behavior and the
//! evaluation simply does not trigger.

use rust_decimal::Decimal;
use surveil_model::{AlertCondition, AlertDefinition, AlertResult, AlertThreshold};
use tracing::{debug, warn};

/// Stateless evaluator; persistence gating is layered on by the manager.
#[derive(Default)]
pub struct AlertEvaluator;

impl AlertEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        definition: &AlertDefinition,
        metric_value: Decimal,
        zscore_value: Option<Decimal>,
        threshold: &AlertThreshold,
    ) -> AlertResult {
        if !definition.enabled {
            debug!(alert_type = %definition.alert_type, "alert disabled");
            return AlertResult::skipped(
                &definition.alert_type,
                "alert_disabled",
                format!("Alert {} is disabled", definition.alert_type),
            );
        }

        if !definition.condition.evaluate(metric_value, threshold.threshold) {
            return AlertResult::not_triggered(&definition.alert_type);
        }

        if definition.requires_zscore {
            let Some(zscore) = zscore_value else {
                // warmup: required behavior, not an error
                debug!(
                    alert_type = %definition.alert_type,
                    metric_value = %metric_value,
                    "alert skipped, zscore warming up"
                );
                return AlertResult::skipped(
                    &definition.alert_type,
                    "zscore_warmup",
                    "Z-score not available (warmup period)",
                );
            };

            let Some(zscore_threshold) = threshold.zscore_threshold else {
                warn!(
                    alert_type = %definition.alert_type,
                    "requires_zscore set but no zscore_threshold configured"
                );
                return AlertResult::skipped(
                    &definition.alert_type,
                    "config_error",
                    "Z-score threshold not configured",
                );
            };

            // z-score gate is always a magnitude comparison
            if zscore.abs() <= zscore_threshold {
                return AlertResult::not_triggered(&definition.alert_type);
            }
        }

        AlertResult {
            triggered: true,
            alert_type: definition.alert_type.clone(),
            priority: Some(definition.default_priority),
            severity: Some(definition.default_severity),
            skip_reason: None,
            message: Some(trigger_message(definition, metric_value, threshold, zscore_value)),
        }
    }

    /// Threshold + z-score first, then the persistence requirement.
    pub fn evaluate_with_persistence(
        &self,
        definition: &AlertDefinition,
        metric_value: Decimal,
        zscore_value: Option<Decimal>,
        threshold: &AlertThreshold,
        persistence_met: bool,
    ) -> AlertResult {
        let result = self.evaluate(definition, metric_value, zscore_value, threshold);
        if !result.triggered {
            return result;
        }
        if definition.has_persistence() && !persistence_met {
            return AlertResult {
                triggered: false,
                alert_type: definition.alert_type.clone(),
                priority: None,
                severity: None,
                skip_reason: None,
                message: Some(format!(
                    "Persistence not met: requires {}s",
                    definition.persistence_seconds.unwrap_or(0)
                )),
            };
        }
        result
    }
}

fn trigger_message(
    definition: &AlertDefinition,
    metric_value: Decimal,
    threshold: &AlertThreshold,
    zscore_value: Option<Decimal>,
) -> String {
    let symbol = match definition.condition {
        AlertCondition::Gt => ">",
        AlertCondition::Lt => "<",
        AlertCondition::AbsGt => "|x| >",
        AlertCondition::AbsLt => "|x| <",
    };
    let mut message = format!(
        "{}: {} {} {}",
        definition.metric_name, metric_value, symbol, threshold.threshold
    );
    if let (true, Some(z), Some(zt)) = (
        definition.requires_zscore,
        zscore_value,
        threshold.zscore_threshold,
    ) {
        message.push_str(&format!(" (z: {:.2} > {})", z, zt));
    }
    message
}
