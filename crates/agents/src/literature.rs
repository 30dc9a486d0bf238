//! Literature surveillance agent - ranked search over a bundled abstract corpus.

use crate::args::{as_u64, required_str};
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};

pub const ID: &str = "literature_surveillance";

pub const DEFAULT_TOP_K: usize = 3;
const MAX_TOP_K: u64 = 10;

struct Abstract {
    citation: &'static str,
    text: &'static str,
}

const CORPUS: &[Abstract] = &[
    Abstract {
        citation: "Reck et al. Pembrolizumab versus chemotherapy for PD-L1-positive non-small-cell lung cancer. 2016.",
        text: "Pembrolizumab immunotherapy improved progression-free and overall survival over platinum chemotherapy in advanced non-small-cell lung cancer with high PD-L1 expression.",
    },
    Abstract {
        citation: "Mok et al. Gefitinib or carboplatin-paclitaxel in pulmonary adenocarcinoma. 2009.",
        text: "In EGFR-mutant lung adenocarcinoma, first-line gefitinib prolonged progression-free survival compared with carboplatin and paclitaxel chemotherapy.",
    },
    Abstract {
        citation: "Robson et al. Olaparib for metastatic breast cancer in patients with a germline BRCA mutation. 2017.",
        text: "The PARP inhibitor olaparib extended progression-free survival in HER2-negative metastatic breast cancer carrying germline BRCA1 or BRCA2 mutations.",
    },
    Abstract {
        citation: "UKPDS Group. Effect of intensive blood-glucose control with metformin in overweight type 2 diabetes. 1998.",
        text: "Metformin as initial therapy for overweight patients with type 2 diabetes reduced diabetes-related endpoints and all-cause mortality.",
    },
    Abstract {
        citation: "SPRINT Research Group. A randomized trial of intensive versus standard blood-pressure control. 2015.",
        text: "Targeting systolic blood pressure below 120 mmHg in adults with hypertension lowered cardiovascular events and death compared with a 140 mmHg target.",
    },
    Abstract {
        citation: "Estruch et al. Primary prevention of cardiovascular disease with a Mediterranean diet. 2018.",
        text: "A Mediterranean diet supplemented with olive oil or nuts reduced major cardiovascular events in adults at high cardiovascular risk.",
    },
    Abstract {
        citation: "Rajkomar et al. Ensuring fairness in machine learning to advance health equity. 2018.",
        text: "Clinical machine learning models can encode bias against under-represented groups; audit of training data and outcomes by demographic group is recommended.",
    },
    Abstract {
        citation: "Cuijpers et al. Psychotherapy for depression in adults: a meta-analysis. 2013.",
        text: "Cognitive behavioural therapy and other psychotherapies showed moderate to large effects on depression and anxiety symptoms in adults.",
    },
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "about", "from", "into", "that", "this", "what", "are", "was",
    "literature", "papers", "paper", "studies", "study", "search", "find", "latest", "recent",
];

/// Lower-case word tokens longer than two characters, minus stopwords.
fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 2 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

pub struct LiteratureSurveillanceAgent;

impl LiteratureSurveillanceAgent {
    pub fn new() -> Self {
        Self
    }

    /// Abstracts ranked by the share of query terms they contain.
    pub fn search(&self, query: &str, top_k: usize) -> Value {
        let terms = tokens(query);

        let mut scored: Vec<(f64, &Abstract)> = if terms.is_empty() {
            Vec::new()
        } else {
            CORPUS
                .iter()
                .filter_map(|doc| {
                    let mut words = tokens(doc.text);
                    words.extend(tokens(doc.citation));
                    let hits = terms.intersection(&words).count();
                    (hits > 0).then(|| (hits as f64 / terms.len() as f64, doc))
                })
                .collect()
        };
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);
        debug!(agent = ID, terms = terms.len(), matches = scored.len(), "Ranked corpus");

        let summary = if scored.is_empty() {
            "No matching literature found.".to_string()
        } else {
            scored
                .iter()
                .map(|(_, doc)| doc.text)
                .collect::<Vec<_>>()
                .join(" ")
        };

        json!({
            "query": query,
            "summary": summary,
            "citations": scored.iter().map(|(_, doc)| doc.citation).collect::<Vec<_>>(),
        })
    }
}

impl Default for LiteratureSurveillanceAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for LiteratureSurveillanceAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let query = required_str(args, "query")?;
        let top_k = match args.get("top_k").map(as_u64) {
            None => DEFAULT_TOP_K,
            Some(Some(k)) if (1..=MAX_TOP_K).contains(&k) => k as usize,
            Some(_) => {
                return Err(AgentError::InvalidInput(format!(
                    "'top_k' must be between 1 and {}",
                    MAX_TOP_K
                )))
            }
        };
        info!(agent = ID, query = %query, top_k, "Searching literature");
        Ok(self.search(query, top_k))
    }
}
