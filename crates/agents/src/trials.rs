//! Trial matching agent - offline clinical trial matcher.
//!
//! Trials are filtered by age window, then ranked by how closely the
//! patient's conditions match the trial condition.

use crate::args::{as_u64, required_object, string_list};
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const ID: &str = "trial_matching";

/// Trials returned per request at most.
pub const MAX_MATCHES: usize = 5;

const MIN_SIMILARITY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: String,
    pub title: String,
    pub condition: String,
    pub min_age: u64,
    pub max_age: u64,
    pub summary: String,
    pub locations: Vec<String>,
}

fn trial(
    id: &str,
    title: &str,
    condition: &str,
    ages: (u64, u64),
    summary: &str,
    locations: &[&str],
) -> Trial {
    Trial {
        id: id.into(),
        title: title.into(),
        condition: condition.into(),
        min_age: ages.0,
        max_age: ages.1,
        summary: summary.into(),
        locations: locations.iter().map(|l| l.to_string()).collect(),
    }
}

/// The built-in catalogue.
pub fn default_catalogue() -> Vec<Trial> {
    vec![
        trial(
            "NCT-DM-0001",
            "Phase 3: Metformin vs. SGLT2 add-on for Type 2 Diabetes",
            "Diabetes",
            (18, 75),
            "Compares glycemic control and safety outcomes for T2D adults on metformin with or without an SGLT2 inhibitor.",
            &["Boston, MA", "Chicago, IL"],
        ),
        trial(
            "NCT-HTN-0002",
            "Lifestyle/DASH vs ARB monotherapy in Stage 1 Hypertension",
            "Hypertension",
            (30, 70),
            "Evaluates blood pressure reduction with DASH diet and exercise vs ARB alone over 24 weeks.",
            &["Dallas, TX", "Seattle, WA"],
        ),
        trial(
            "NCT-DM-0003",
            "GLP-1 RA adjunct therapy for Type 2 Diabetes with obesity",
            "Diabetes Mellitus",
            (18, 80),
            "Assesses weight and A1c change when adding a GLP-1 RA to standard of care.",
            &["San Diego, CA"],
        ),
        trial(
            "NCT-MIX-0004",
            "Cardio-metabolic outcomes in mixed metabolic syndrome",
            "Metabolic Syndrome",
            (40, 85),
            "Longitudinal outcomes registry for patients with diabetes and hypertension overlap.",
            &["Remote"],
        ),
        trial(
            "NCT-LC-0005",
            "Low-dose CT screening follow-up with targeted therapy in Lung Cancer",
            "Lung Cancer",
            (45, 80),
            "Evaluates progression-free survival with targeted therapy for EGFR-positive lung cancer.",
            &["Boston, MA", "New York, NY"],
        ),
        trial(
            "NCT-BC-0006",
            "PARP inhibitor maintenance in BRCA-mutated Breast Cancer",
            "Breast Cancer",
            (25, 75),
            "Tests PARP inhibitor maintenance after first-line chemotherapy in BRCA carriers.",
            &["Houston, TX", "Boston, MA"],
        ),
        trial(
            "NCT-AS-0007",
            "Biologic add-on for severe eosinophilic Asthma",
            "Asthma",
            (12, 65),
            "Measures exacerbation rate with anti-IL-5 biologic added to inhaled therapy.",
            &["Denver, CO"],
        ),
    ]
}

/// Catalogue conditions scanned for in a free-text diagnosis.
const DIAGNOSIS_KEYWORDS: &[&str] = &[
    "diabetes",
    "hypertension",
    "asthma",
    "lung cancer",
    "breast cancer",
    "metabolic syndrome",
];

pub struct TrialMatchingAgent {
    catalogue: Vec<Trial>,
}

impl TrialMatchingAgent {
    pub fn new() -> Self {
        Self::with_catalogue(default_catalogue())
    }

    pub fn with_catalogue(catalogue: Vec<Trial>) -> Self {
        Self { catalogue }
    }

    /// Rank trials for a patient.
    pub fn match_trials(
        &self,
        age: Option<u64>,
        conditions: &[String],
        location: Option<&str>,
    ) -> Vec<Trial> {
        let conditions: Vec<String> = conditions.iter().map(|c| normalize(c)).collect();
        let mut ranked: Vec<(f64, &Trial)> = Vec::new();

        for trial in &self.catalogue {
            if let Some(age) = age {
                if age < trial.min_age || age > trial.max_age {
                    continue;
                }
            }

            let condition = normalize(&trial.condition);
            let score = conditions
                .iter()
                .map(|c| similarity(c, &condition))
                .fold(1.0_f64, f64::min);
            if !conditions.is_empty() && score < MIN_SIMILARITY {
                continue;
            }

            // Prefer narrower age windows, then nearby sites.
            let span = (trial.max_age - trial.min_age).max(1) as f64;
            let mut rank = score + 0.1 / span;
            if let Some(location) = location {
                let location = location.to_lowercase();
                if trial.locations.iter().any(|l| l.to_lowercase().contains(&location)) {
                    rank += 0.05;
                }
            }
            ranked.push((rank, trial));
        }

        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked
            .into_iter()
            .take(MAX_MATCHES)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

impl Default for TrialMatchingAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Ratio of matching characters, `2 * lcs / (|a| + |b|)`.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    2.0 * prev[b.len()] as f64 / (a.len() + b.len()) as f64
}

fn conditions_for(patient: &Map<String, Value>, diagnosis: Option<&Value>) -> Vec<String> {
    let conditions = string_list(patient.get("conditions"));
    if !conditions.is_empty() {
        return conditions;
    }
    let Some(text) = diagnosis.and_then(Value::as_str) else {
        return Vec::new();
    };
    let text = text.to_lowercase();
    DIAGNOSIS_KEYWORDS
        .iter()
        .filter(|k| text.contains(*k))
        .map(|k| k.to_string())
        .collect()
}

#[async_trait]
impl Agent for TrialMatchingAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let patient = required_object(args, "patient")?;
        let age = patient.get("age").and_then(as_u64);
        let conditions = conditions_for(patient, args.get("diagnosis"));
        let location = patient.get("location").and_then(Value::as_str);

        debug!(agent = ID, ?age, ?conditions, ?location, "Matching trials");
        let matches = self.match_trials(age, &conditions, location);
        info!(agent = ID, matches = matches.len(), "Trial matching complete");

        serde_json::to_value(matches).map_err(|e| AgentError::InternalFailure(e.to_string()))
    }
}
