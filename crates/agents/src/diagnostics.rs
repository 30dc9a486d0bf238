//! Diagnostics agent - rule-based diagnostic impressions.
//!
//! Combines the patient's symptoms and known conditions with whatever
//! upstream steps contributed (imaging findings, a genomic classification,
//! a synthetic cohort) into a single impression.

use crate::args::{as_u64, required_object, sex, string_list};
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{Map, Value};
use tracing::info;

pub const ID: &str = "diagnostics";

struct SymptomRule {
    /// All of these symptoms must be present.
    symptoms: &'static [&'static str],
    impression: &'static str,
    workup: &'static str,
}

/// Most specific combinations first.
const RULES: &[SymptomRule] = &[
    SymptomRule {
        symptoms: &["chest pain", "shortness of breath"],
        impression: "possible acute coronary syndrome or pulmonary embolism",
        workup: "urgent ECG, troponin and D-dimer",
    },
    SymptomRule {
        symptoms: &["cough", "fever"],
        impression: "likely lower respiratory tract infection",
        workup: "chest X-ray and complete blood count",
    },
    SymptomRule {
        symptoms: &["chest pain"],
        impression: "chest pain of undetermined origin, cardiac cause not excluded",
        workup: "ECG and troponin",
    },
    SymptomRule {
        symptoms: &["cough"],
        impression: "acute bronchitis or upper airway irritation",
        workup: "symptomatic care; chest X-ray if persisting beyond three weeks",
    },
    SymptomRule {
        symptoms: &["shortness of breath"],
        impression: "dyspnoea, differential includes asthma and heart failure",
        workup: "spirometry and BNP",
    },
    SymptomRule {
        symptoms: &["headache", "fever"],
        impression: "febrile headache, meningitis must be excluded",
        workup: "neurological examination and urgent review",
    },
    SymptomRule {
        symptoms: &["headache"],
        impression: "primary headache disorder most likely",
        workup: "headache diary and blood pressure check",
    },
    SymptomRule {
        symptoms: &["fatigue"],
        impression: "fatigue, differential includes anaemia and thyroid disease",
        workup: "full blood count, ferritin and TSH",
    },
    SymptomRule {
        symptoms: &["fever"],
        impression: "febrile illness of unclear source",
        workup: "blood cultures and urinalysis",
    },
];

pub struct DiagnosticsAgent;

impl DiagnosticsAgent {
    pub fn new() -> Self {
        Self
    }

    /// Build the impression text.
    pub fn diagnose(&self, patient: &Map<String, Value>, context: &UpstreamContext) -> String {
        let symptoms: Vec<String> = string_list(patient.get("symptoms"))
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        let conditions = string_list(patient.get("conditions"));

        let mut sentences = vec![describe_patient(patient)];

        match RULES
            .iter()
            .find(|rule| rule.symptoms.iter().all(|s| symptoms.iter().any(|p| p == s)))
        {
            Some(rule) => sentences.push(format!(
                "Impression: {}. Suggested workup: {}.",
                rule.impression, rule.workup
            )),
            None if symptoms.is_empty() => {
                sentences.push("No presenting symptoms reported; routine review advised.".into())
            }
            None => sentences.push(format!(
                "Symptoms ({}) do not match a known pattern; clinical review advised.",
                symptoms.join(", ")
            )),
        }

        if !conditions.is_empty() {
            sentences.push(format!("Known conditions: {}.", conditions.join(", ")));
        }
        if let Some(findings) = &context.imaging_findings {
            sentences.push(format!("Imaging: {}.", findings));
        }
        if let Some(genomics) = &context.genomics {
            sentences.push(format!("Genomics: {}.", genomics));
        }
        if let Some(cohort) = context.cohort_size {
            sentences.push(format!("Compared against a synthetic cohort of {}.", cohort));
        }

        sentences.join(" ")
    }
}

impl Default for DiagnosticsAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// What upstream steps handed over.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpstreamContext {
    pub imaging_findings: Option<String>,
    pub genomics: Option<String>,
    pub cohort_size: Option<usize>,
}

impl UpstreamContext {
    fn from_args(args: &AgentArgs) -> Self {
        let imaging_findings = args.get("imaging").map(|imaging| {
            let findings = string_list(imaging.get("findings"));
            if findings.is_empty() {
                imaging.to_string()
            } else {
                findings.join("; ")
            }
        });
        let genomics = args.get("genomics").map(|g| {
            match (g.get("variant").and_then(Value::as_str), g.get("classification").and_then(Value::as_str)) {
                (Some(variant), Some(class)) => format!("{} classified as {}", variant, class),
                _ => g.to_string(),
            }
        });
        let cohort_size = args.get("synthetic").and_then(Value::as_array).map(Vec::len);

        Self {
            imaging_findings,
            genomics,
            cohort_size,
        }
    }
}

fn describe_patient(patient: &Map<String, Value>) -> String {
    let age = patient.get("age").and_then(as_u64);
    let sex = match sex(patient) {
        Some("F") => Some("female"),
        Some("M") => Some("male"),
        _ => None,
    };
    match (age, sex) {
        (Some(age), Some(sex)) => format!("Patient: {}-year-old {}.", age, sex),
        (Some(age), None) => format!("Patient: {} years old.", age),
        (None, Some(sex)) => format!("Patient: {}.", sex),
        (None, None) => "Patient: demographics not provided.".to_string(),
    }
}

#[async_trait]
impl Agent for DiagnosticsAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let patient = required_object(args, "patient")?;
        let context = UpstreamContext::from_args(args);
        info!(
            agent = ID,
            with_imaging = context.imaging_findings.is_some(),
            with_genomics = context.genomics.is_some(),
            "Producing diagnostic impression"
        );
        Ok(Value::String(self.diagnose(patient, &context)))
    }
}
