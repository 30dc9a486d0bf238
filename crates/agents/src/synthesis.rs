//! Data synthesis agent - synthetic patient records.

use crate::args::as_u64;
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

pub const ID: &str = "data_synthesis";

/// Largest cohort one request may ask for.
pub const MAX_COUNT: u64 = 100;

const DEFAULT_SEED: u64 = 42;

/// One generated patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPatient {
    pub patient_id: String,
    pub age: u64,
    pub gender: String,
    pub bmi: f64,
    pub conditions: Vec<String>,
}

/// Generates synthetic patient rows from a seeded RNG.
///
/// Every invocation restarts from the same seed, so equal requests yield
/// equal cohorts.
pub struct DataSynthesisAgent {
    seed: u64,
}

impl DataSynthesisAgent {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    pub fn generate(&self, count: u64) -> Vec<SyntheticPatient> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (1..=count).map(|i| patient(&mut rng, i)).collect()
    }
}

impl Default for DataSynthesisAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn patient(rng: &mut StdRng, index: u64) -> SyntheticPatient {
    let age = rng.gen_range(20..80);
    let gender = if rng.gen_bool(0.5) { "Male" } else { "Female" };

    // Approximately normal around 27 with spread 5 (Irwin-Hall).
    let noise: f64 = (0..12).map(|_| rng.gen::<f64>()).sum::<f64>() - 6.0;
    let bmi = ((27.0 + 5.0 * noise).clamp(15.0, 45.0) * 10.0).round() / 10.0;

    let conditions = match rng.gen_range(0..10) {
        0..=4 => vec![],
        5 | 6 => vec!["Diabetes".to_string()],
        7 | 8 => vec!["Hypertension".to_string()],
        _ => vec!["Diabetes".to_string(), "Hypertension".to_string()],
    };

    SyntheticPatient {
        patient_id: format!("SYN-{:04}", index),
        age,
        gender: gender.to_string(),
        bmi,
        conditions,
    }
}

#[async_trait]
impl Agent for DataSynthesisAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let count = match args.get("count") {
            None | Some(Value::Null) => 1,
            Some(value) => as_u64(value).ok_or_else(|| {
                AgentError::InvalidInput(format!("'count' must be a whole number, got {}", value))
            })?,
        }
        .max(1);

        if count > MAX_COUNT {
            return Err(AgentError::InvalidInput(format!(
                "count {} exceeds the limit of {}",
                count, MAX_COUNT
            )));
        }

        info!(agent = ID, count, "Generating synthetic patients");
        serde_json::to_value(self.generate(count))
            .map_err(|e| AgentError::InternalFailure(e.to_string()))
    }
}
