//! Drug discovery agent - candidate compounds for a named condition.
//!
//! Screens a small built-in compound library against the indications found
//! in free text (a request or an upstream diagnostic impression).

use crate::args::required_str;
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

pub const ID: &str = "drug_discovery";

/// Candidates returned per request.
pub const MAX_CANDIDATES: usize = 3;

/// One screened compound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    pub name: String,
    pub smiles: String,
    pub mechanism: String,
}

struct LibraryEntry {
    name: &'static str,
    smiles: &'static str,
    mechanism: &'static str,
    /// Lower-case keywords this compound is indicated for.
    indications: &'static [&'static str],
}

const LIBRARY: &[LibraryEntry] = &[
    LibraryEntry {
        name: "Metformin",
        smiles: "CN(C)C(=N)N=C(N)N",
        mechanism: "biguanide; lowers hepatic glucose output",
        indications: &["diabetes"],
    },
    LibraryEntry {
        name: "Hydrochlorothiazide",
        smiles: "C1=C2C(=CC(=C1Cl)S(=O)(=O)N)S(=O)(=O)NCN2",
        mechanism: "thiazide diuretic",
        indications: &["hypertension"],
    },
    LibraryEntry {
        name: "Salbutamol",
        smiles: "CC(C)(C)NCC(C1=CC(=C(C=C1)O)CO)O",
        mechanism: "short-acting beta-2 agonist",
        indications: &["asthma", "dyspnoea", "shortness of breath"],
    },
    LibraryEntry {
        name: "Tamoxifen",
        smiles: "CCC(=C(C1=CC=CC=C1)C2=CC=C(C=C2)OCCN(C)C)C3=CC=CC=C3",
        mechanism: "selective oestrogen receptor modulator",
        indications: &["breast cancer"],
    },
    LibraryEntry {
        name: "Gefitinib",
        smiles: "COC1=C(C=C2C(=C1)N=CN=C2NC3=CC(=C(C=C3)F)Cl)OCCCN4CCOCC4",
        mechanism: "EGFR tyrosine kinase inhibitor",
        indications: &["lung cancer", "egfr"],
    },
    LibraryEntry {
        name: "Amoxicillin",
        smiles: "CC1(C(N2C(S1)C(C2=O)NC(=O)C(C3=CC=C(C=C3)O)N)C(=O)O)C",
        mechanism: "beta-lactam antibiotic",
        indications: &["pneumonia", "infection"],
    },
    LibraryEntry {
        name: "Aspirin",
        smiles: "CC(=O)OC1=CC=CC=C1C(=O)O",
        mechanism: "irreversible COX inhibitor; antiplatelet",
        indications: &["coronary", "chest pain", "headache", "fever"],
    },
    LibraryEntry {
        name: "Ibuprofen",
        smiles: "CC(C)CC1=CC=C(C=C1)C(C)C(=O)O",
        mechanism: "non-selective COX inhibitor",
        indications: &["headache", "fever", "pain"],
    },
    LibraryEntry {
        name: "Paracetamol",
        smiles: "CC(=O)NC1=CC=C(O)C=C1",
        mechanism: "central COX inhibition; antipyretic",
        indications: &["fever", "headache"],
    },
];

pub struct DrugDiscoveryAgent;

impl DrugDiscoveryAgent {
    pub fn new() -> Self {
        Self
    }

    /// Rank the library against the indications named in `query`.
    pub fn suggest(&self, query: &str) -> Result<Value, AgentError> {
        let lower = query.to_lowercase();

        let mut indications: Vec<&str> = Vec::new();
        let mut ranked: Vec<(usize, &LibraryEntry)> = Vec::new();
        for entry in LIBRARY {
            let hits: Vec<&str> = entry
                .indications
                .iter()
                .copied()
                .filter(|i| lower.contains(*i))
                .collect();
            if hits.is_empty() {
                continue;
            }
            for &hit in &hits {
                if !indications.contains(&hit) {
                    indications.push(hit);
                }
            }
            ranked.push((hits.len(), entry));
        }

        if ranked.is_empty() {
            return Err(AgentError::InvalidInput(format!(
                "no known indication in '{}'",
                query
            )));
        }

        // Stable sort keeps library order among equal scores.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        let candidates: Vec<Compound> = ranked
            .into_iter()
            .take(MAX_CANDIDATES)
            .map(|(_, e)| Compound {
                name: e.name.to_string(),
                smiles: e.smiles.to_string(),
                mechanism: e.mechanism.to_string(),
            })
            .collect();
        debug!(agent = ID, ?indications, candidates = candidates.len(), "Screened library");

        let description = format!(
            "Top candidates for {}: {}.",
            indications.join(", "),
            candidates
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(json!({
            "indications": indications,
            "candidates": candidates,
            "description": description,
        }))
    }
}

impl Default for DrugDiscoveryAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DrugDiscoveryAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let query = required_str(args, "query")?;
        info!(agent = ID, query = %query, "Suggesting candidates");
        self.suggest(query)
    }
}
