//! Treatment optimization agent - dose level from an estimated severity.

use crate::args::{as_u64, required_object, string_list};
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{json, Map, Value};
use tracing::info;

pub const ID: &str = "treatment_optimization";

const BASE_SEVERITY: f64 = 5.0;
const MAX_SEVERITY: f64 = 10.0;

/// Severity ceilings for each dose level, mildest first.
const DOSE_POLICY: &[(f64, &str)] = &[
    (2.0, "No dose"),
    (4.5, "Low dose"),
    (7.0, "Medium dose"),
    (MAX_SEVERITY, "High dose"),
];

pub struct TreatmentOptimizationAgent;

impl TreatmentOptimizationAgent {
    pub fn new() -> Self {
        Self
    }

    /// Severity on a 0-10 scale. An explicit `severity` wins; otherwise it
    /// grows with age past 40 and with each known condition.
    pub fn severity(&self, patient: &Map<String, Value>) -> f64 {
        if let Some(explicit) = patient.get("severity").and_then(Value::as_f64) {
            return explicit.clamp(0.0, MAX_SEVERITY);
        }
        let age = patient.get("age").and_then(as_u64).unwrap_or(40);
        let age_factor = age.saturating_sub(40) as f64 * 0.05;
        let condition_factor = string_list(patient.get("conditions")).len() as f64;
        (BASE_SEVERITY + age_factor + condition_factor).clamp(0.0, MAX_SEVERITY)
    }

    pub fn plan(&self, patient: &Map<String, Value>) -> Value {
        let severity = self.severity(patient);
        let dose = DOSE_POLICY
            .iter()
            .find(|(ceiling, _)| severity < *ceiling)
            .map_or("High dose", |(_, dose)| *dose);

        json!({
            "severity": (severity * 100.0).round() / 100.0,
            "dose": dose,
        })
    }
}

impl Default for TreatmentOptimizationAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for TreatmentOptimizationAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let patient = required_object(args, "patient")?;
        let plan = self.plan(patient);
        info!(agent = ID, dose = %plan["dose"], "Treatment planned");
        Ok(plan)
    }
}
