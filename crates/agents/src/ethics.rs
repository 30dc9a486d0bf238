//! Ethical monitoring agent - bias audit over decision logs and cohorts.
//!
//! Log entries are scanned for bias markers. When a cohort is supplied the
//! agent also compares the high-BMI selection rate across genders and
//! reports the demographic parity difference.

use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const ID: &str = "ethical_monitoring";

const BIAS_MARKERS: &[&str] = &["bias", "disparity", "discriminat", "unfair"];

/// BMI above which a cohort row counts as selected.
const SELECTION_BMI: f64 = 30.0;

/// Largest acceptable gap between group selection rates.
pub const PARITY_TOLERANCE: f64 = 0.1;

/// Selection rates per group and the largest gap between them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParityReport {
    pub selection_rate_by_group: BTreeMap<String, f64>,
    pub demographic_parity_difference: f64,
}

pub fn demographic_parity(cohort: &[Value]) -> Option<ParityReport> {
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for row in cohort {
        let (Some(group), Some(bmi)) = (
            row.get("gender").or_else(|| row.get("sex")).and_then(Value::as_str),
            row.get("bmi").and_then(Value::as_f64),
        ) else {
            continue;
        };
        let entry = counts.entry(group.to_string()).or_default();
        entry.1 += 1;
        if bmi > SELECTION_BMI {
            entry.0 += 1;
        }
    }
    if counts.is_empty() {
        return None;
    }

    let rates: BTreeMap<String, f64> = counts
        .into_iter()
        .map(|(group, (selected, total))| (group, selected as f64 / total as f64))
        .collect();
    let max = rates.values().copied().fold(f64::MIN, f64::max);
    let min = rates.values().copied().fold(f64::MAX, f64::min);

    Some(ParityReport {
        selection_rate_by_group: rates,
        demographic_parity_difference: max - min,
    })
}

pub struct EthicalMonitoringAgent;

impl EthicalMonitoringAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, logs: &[String], cohort: Option<&[Value]>) -> Value {
        let flagged: Vec<&String> = logs
            .iter()
            .filter(|entry| {
                let lower = entry.to_lowercase();
                BIAS_MARKERS.iter().any(|m| lower.contains(m))
            })
            .collect();

        let mut report = Map::new();
        report.insert("entries_checked".into(), json!(logs.len()));
        report.insert("flagged".into(), json!(flagged));

        let mut biased = !flagged.is_empty();
        if let Some(parity) = cohort.and_then(demographic_parity) {
            if parity.demographic_parity_difference > PARITY_TOLERANCE {
                warn!(
                    agent = ID,
                    difference = parity.demographic_parity_difference,
                    "Selection rates diverge across groups"
                );
                biased = true;
            }
            report.insert(
                "selection_rate_by_group".into(),
                json!(parity.selection_rate_by_group),
            );
            report.insert(
                "demographic_parity_difference".into(),
                json!((parity.demographic_parity_difference * 1000.0).round() / 1000.0),
            );
        }

        let verdict = if biased {
            "Potential bias detected. See audit logs."
        } else {
            "No bias detected."
        };
        report.insert("verdict".into(), json!(verdict));
        Value::Object(report)
    }
}

impl Default for EthicalMonitoringAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for EthicalMonitoringAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let logs: Vec<String> = match args.get("logs") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(other) => {
                return Err(AgentError::InvalidInput(format!(
                    "'logs' must be an array, got {}",
                    other
                )))
            }
        };
        let cohort = match args.get("cohort") {
            None => None,
            Some(Value::Array(rows)) => Some(rows.as_slice()),
            Some(other) => {
                return Err(AgentError::InvalidInput(format!(
                    "'cohort' must be an array, got {}",
                    other
                )))
            }
        };
        if logs.is_empty() && cohort.is_none() {
            return Err(AgentError::InvalidInput("nothing to audit".into()));
        }

        info!(agent = ID, entries = logs.len(), cohort = cohort.map_or(0, <[serde_json::Value]>::len), "Auditing");
        Ok(self.check(&logs, cohort))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn logs(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_logs() {
        let report = EthicalMonitoringAgent::new().check(&logs(&["decisionA", "decisionB"]), None);
        assert_eq!(report["entries_checked"], 2);
        assert_eq!(report["flagged"], json!([]));
        assert_eq!(report["verdict"], "No bias detected.");
        assert!(report.get("demographic_parity_difference").is_none());
    }

    #[test]
    fn test_flagged_entry() {
        let report = EthicalMonitoringAgent::new()
            .check(&logs(&["triage ok", "Outcome Disparity in ward 3"]), None);
        assert_eq!(report["flagged"], json!(["Outcome Disparity in ward 3"]));
        assert_eq!(report["verdict"], "Potential bias detected. See audit logs.");
    }

    #[test]
    fn test_parity_over_cohort() {
        let cohort = vec![
            json!({"gender": "Female", "bmi": 32.0}),
            json!({"gender": "Female", "bmi": 24.0}),
            json!({"gender": "Male", "bmi": 22.0}),
            json!({"gender": "Male", "bmi": 26.5}),
            json!({"age": 40}),
        ];
        let parity = demographic_parity(&cohort).unwrap();
        assert_eq!(parity.selection_rate_by_group["Female"], 0.5);
        assert_eq!(parity.selection_rate_by_group["Male"], 0.0);
        assert_eq!(parity.demographic_parity_difference, 0.5);

        let report = EthicalMonitoringAgent::new().check(&[], Some(&cohort));
        assert_eq!(report["verdict"], "Potential bias detected. See audit logs.");
        assert_eq!(report["selection_rate_by_group"], json!({"Female": 0.5, "Male": 0.0}));
    }

    #[test]
    fn test_balanced_cohort() {
        let cohort = vec![
            json!({"gender": "Female", "bmi": 31.0}),
            json!({"gender": "Male", "bmi": 33.0}),
        ];
        let report = EthicalMonitoringAgent::new().check(&[], Some(&cohort));
        assert_eq!(report["demographic_parity_difference"], 0.0);
        assert_eq!(report["verdict"], "No bias detected.");
    }

    #[tokio::test]
    async fn test_requires_logs_or_cohort() {
        let err = EthicalMonitoringAgent::new().invoke(&AgentArgs::new(), None).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));

        let mut args = AgentArgs::new();
        args.insert("logs".into(), json!("not a list"));
        assert!(EthicalMonitoringAgent::new().invoke(&args, None).await.is_err());
    }
}
