//! Genomics agent - classifies single gene variants.

use crate::args::required_str;
use async_trait::async_trait;
use medorch_common::{Agent, AgentArgs, AgentError, SessionHandle};
use serde_json::{json, Value};
use tracing::info;

pub const ID: &str = "genomics";

/// Curated variants with an established classification.
const KNOWN_VARIANTS: &[(&str, &str, &str)] = &[
    ("BRCA1", "5382insC", "pathogenic"),
    ("BRCA1", "185delAG", "pathogenic"),
    ("BRCA2", "6174delT", "pathogenic"),
    ("TP53", "R175H", "pathogenic"),
    ("CFTR", "F508del", "pathogenic"),
    ("APOE", "C112R", "risk factor"),
    ("MTHFR", "C677T", "benign"),
];

/// Genes where loss-of-function changes are clinically actionable.
const LOF_GENES: &[&str] = &["BRCA1", "BRCA2", "TP53", "MLH1", "MSH2", "APC", "CFTR"];

pub struct GenomicsAgent;

impl GenomicsAgent {
    pub fn new() -> Self {
        Self
    }

    /// Classify a `GENE change` token such as `BRCA1 5382insC`.
    pub fn classify(&self, variant: &str) -> Result<Value, AgentError> {
        let mut parts = variant.split_whitespace();
        let (gene, change) = match (parts.next(), parts.next()) {
            (Some(gene), Some(change)) => (gene.to_uppercase(), change.to_string()),
            _ => {
                return Err(AgentError::InvalidInput(format!(
                    "expected '<GENE> <change>', got '{}'",
                    variant
                )))
            }
        };
        let bare_change = change
            .trim_start_matches("c.")
            .trim_start_matches("p.")
            .trim_start_matches("g.");

        let classification = KNOWN_VARIANTS
            .iter()
            .find(|(g, c, _)| *g == gene && c.eq_ignore_ascii_case(bare_change))
            .map(|(_, _, class)| *class)
            .unwrap_or_else(|| heuristic(&gene, bare_change));

        Ok(json!({
            "variant": format!("{} {}", gene, change),
            "gene": gene,
            "classification": classification,
        }))
    }
}

impl Default for GenomicsAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn heuristic(gene: &str, change: &str) -> &'static str {
    let lower = change.to_lowercase();
    let truncating = lower.contains("del") || lower.contains("ins") || lower.contains("fs") || lower.ends_with('*');
    if truncating && LOF_GENES.contains(&gene) {
        "likely pathogenic"
    } else {
        "uncertain significance"
    }
}

#[async_trait]
impl Agent for GenomicsAgent {
    fn id(&self) -> &str {
        ID
    }

    async fn invoke(
        &self,
        args: &AgentArgs,
        _session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError> {
        let variant = required_str(args, "variant")?;
        info!(agent = ID, variant = %variant, "Classifying variant");
        self.classify(variant)
    }
}
