//! Diet planner agent - condition-aware nutrition guidelines.

use crate::args::{as_u64, required_object, sex, string_list};
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{json, Map, Value};
use tracing::info;

pub const ID: &str = "diet_planner";

const BASELINE_GUIDELINE: &str =
    "Build meals around vegetables, whole grains and lean protein; limit ultra-processed food.";

/// Condition keyword → guideline.
const CONDITION_GUIDELINES: &[(&str, &str)] = &[
    (
        "diabet",
        "Choose low glycaemic index carbohydrates and spread them evenly across meals.",
    ),
    (
        "hypertens",
        "Follow a DASH pattern and keep sodium under 2,300 mg per day.",
    ),
    (
        "asthma",
        "Include oily fish and fresh fruit; avoid sulphite-preserved foods.",
    ),
    (
        "cancer",
        "Prioritise protein and energy density to maintain weight during treatment.",
    ),
];

pub struct DietPlannerAgent;

impl DietPlannerAgent {
    pub fn new() -> Self {
        Self
    }

    /// Daily calorie target and guidelines for a patient.
    pub fn plan(&self, patient: &Map<String, Value>) -> Value {
        let conditions: Vec<String> = string_list(patient.get("conditions"))
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();

        let mut calories: i64 = match sex(patient) {
            Some("F") => 1800,
            Some("M") => 2200,
            _ => 2000,
        };
        if let Some(age) = patient.get("age").and_then(as_u64) {
            // Energy needs fall roughly 10 kcal per year after 50.
            if age > 50 {
                calories -= 10 * (age as i64 - 50).min(30);
            }
        }
        if conditions.iter().any(|c| c.contains("diabet")) {
            calories -= 200;
        }

        let mut guidelines = vec![BASELINE_GUIDELINE.to_string()];
        for (keyword, guideline) in CONDITION_GUIDELINES {
            if conditions.iter().any(|c| c.contains(keyword)) {
                guidelines.push(guideline.to_string());
            }
        }
        let preferences = string_list(patient.get("preferences"));
        if !preferences.is_empty() {
            guidelines.push(format!("Respect preferences: {}.", preferences.join(", ")));
        }

        json!({
            "calories": calories,
            "guidelines": guidelines,
        })
    }
}

impl Default for DietPlannerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DietPlannerAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let patient = required_object(args, "patient")?;
        info!(agent = ID, "Building diet plan");
        Ok(self.plan(patient))
    }
}
