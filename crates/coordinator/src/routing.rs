//! Verb to pipeline routing.
//!
//! One canonical table maps every dispatchable verb to an ordered list of
//! agent steps and their input bindings.

use crate::config::{FanoutPolicy, RoutingConfig};
use crate::registry::AgentRegistry;
use medorch_common::{
    DispatchError, InputSource, Intent, PipelineSpec, PipelineStep, Verb,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ids of the agents the routing table refers to.
pub mod agent_ids {
    pub const DATA_SYNTHESIS: &str = "data_synthesis";
    pub const DIAGNOSTICS: &str = "diagnostics";
    pub const IMAGING: &str = "imaging";
    pub const GENOMICS: &str = "genomics";
    pub const TRIAL_MATCHING: &str = "trial_matching";
    pub const DIET_PLANNER: &str = "diet_planner";
    pub const MENTAL_HEALTH: &str = "mental_health";
    pub const DRUG_DISCOVERY: &str = "drug_discovery";
    pub const TREATMENT_OPTIMIZATION: &str = "treatment_optimization";
    pub const LITERATURE_SURVEILLANCE: &str = "literature_surveillance";
    pub const ETHICAL_MONITORING: &str = "ethical_monitoring";
}

use agent_ids::*;

/// Entity naming the subset of steps a `run_pipeline` request wants.
pub const AGENTS_ENTITY: &str = "agents";

/// Single-agent verbs and the agent each one routes to.
const VERB_AGENTS: &[(Verb, &str)] = &[
    (Verb::Synthesize, DATA_SYNTHESIS),
    (Verb::Diagnose, DIAGNOSTICS),
    (Verb::MatchTrials, TRIAL_MATCHING),
    (Verb::AnalyzeImaging, IMAGING),
    (Verb::AnalyzeVariant, GENOMICS),
    (Verb::PlanDiet, DIET_PLANNER),
    (Verb::Counsel, MENTAL_HEALTH),
    (Verb::SuggestDrugs, DRUG_DISCOVERY),
    (Verb::PlanTreatment, TREATMENT_OPTIMIZATION),
    (Verb::SearchLiterature, LITERATURE_SURVEILLANCE),
    (Verb::CheckEthics, ETHICAL_MONITORING),
];

/// Turns an [`Intent`] into a [`PipelineSpec`].
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    routing: RoutingConfig,
    registry: Option<Arc<AgentRegistry>>,
}

impl Dispatcher {
    pub fn new(routing: RoutingConfig) -> Self {
        Self {
            routing,
            registry: None,
        }
    }

    /// Check routed ids against a registry and warn about missing agents.
    pub fn with_registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the pipeline for an intent.
    pub fn resolve(&self, intent: &Intent) -> Result<PipelineSpec, DispatchError> {
        let spec = match intent.verb() {
            Verb::Unknown => {
                return Err(DispatchError::UnknownVerb(intent.raw_text().to_string()));
            }
            Verb::ParseError => {
                let (fragment, message) = intent
                    .parse_failure()
                    .map(|f| (f.fragment.clone(), f.message.clone()))
                    .unwrap_or_else(|| (intent.raw_text().to_string(), "unparseable".into()));
                return Err(DispatchError::Unparseable { fragment, message });
            }
            Verb::RunPipeline => self.run_pipeline(intent)?,
            Verb::Diagnose => self.diagnose(intent),
            verb => {
                let mut spec = PipelineSpec::new(verb);
                if let Some(step) = self.single_step(verb, intent) {
                    spec = spec.push(step);
                }
                spec
            }
        };

        if let Some(registry) = &self.registry {
            for id in spec.agent_ids() {
                if !registry.contains(id) {
                    warn!(agent = %id, verb = %spec.verb, "Routed to an unregistered agent");
                }
            }
        }

        debug!(
            verb = %spec.verb,
            steps = ?spec.agent_ids().collect::<Vec<_>>(),
            "Resolved pipeline"
        );
        Ok(spec)
    }

    fn synthesis_step(&self, intent: &Intent) -> PipelineStep {
        let count = if intent.has_entity("count") {
            InputSource::entity("count")
        } else {
            InputSource::literal(self.routing.default_synthetic_count)
        };
        PipelineStep::new(DATA_SYNTHESIS).with_optional("count", count)
    }

    /// The one-agent routes, keyed by verb.
    fn single_step(&self, verb: Verb, intent: &Intent) -> Option<PipelineStep> {
        let step = match verb {
            Verb::Synthesize => self.synthesis_step(intent),
            Verb::MatchTrials => {
                PipelineStep::new(TRIAL_MATCHING).with_required("patient", InputSource::Entities)
            }
            Verb::AnalyzeImaging => imaging_step(),
            Verb::AnalyzeVariant => genomics_step(),
            Verb::PlanDiet => {
                PipelineStep::new(DIET_PLANNER).with_required("patient", InputSource::Entities)
            }
            Verb::Counsel => PipelineStep::new(MENTAL_HEALTH)
                .with_required("message", InputSource::entity("message")),
            Verb::Diagnose => PipelineStep::new(DIAGNOSTICS)
                .with_required("patient", InputSource::Entities),
            Verb::SuggestDrugs => {
                PipelineStep::new(DRUG_DISCOVERY).with_required("query", InputSource::entity("query"))
            }
            Verb::PlanTreatment => PipelineStep::new(TREATMENT_OPTIMIZATION)
                .with_required("patient", InputSource::Entities),
            Verb::SearchLiterature => PipelineStep::new(LITERATURE_SURVEILLANCE)
                .with_required("query", InputSource::entity("query")),
            Verb::CheckEthics => PipelineStep::new(ETHICAL_MONITORING)
                .with_required("logs", InputSource::entity("logs")),
            _ => return None,
        };
        Some(step)
    }

    fn diagnose(&self, intent: &Intent) -> PipelineSpec {
        let policy = self.routing.diagnose_fanout;
        let fan_out = |entity: &str| match policy {
            FanoutPolicy::Always => true,
            FanoutPolicy::Never => false,
            FanoutPolicy::OnEntity => intent.has_entity(entity),
        };

        let mut diagnostics =
            PipelineStep::new(DIAGNOSTICS).with_required("patient", InputSource::Entities);
        let mut spec = PipelineSpec::new(Verb::Diagnose);
        let mut extra = Vec::new();

        if fan_out("imaging_report") {
            diagnostics = diagnostics.with_optional("imaging", InputSource::step_output(IMAGING));
            extra.push(imaging_step());
        }
        if fan_out("genomics_summary") {
            diagnostics =
                diagnostics.with_optional("genomics", InputSource::step_output(GENOMICS));
            extra.push(genomics_step());
        }

        spec = spec.push(diagnostics);
        for step in extra {
            spec = spec.push(step);
        }
        spec
    }

    fn run_pipeline(&self, intent: &Intent) -> Result<PipelineSpec, DispatchError> {
        let canonical = vec![
            self.synthesis_step(intent),
            PipelineStep::new(DIAGNOSTICS)
                .with_required("patient", InputSource::Entities)
                .with_optional("synthetic", InputSource::step_output(DATA_SYNTHESIS)),
            PipelineStep::new(TRIAL_MATCHING)
                .with_required("patient", InputSource::Entities)
                .with_optional("diagnosis", InputSource::step_output(DIAGNOSTICS)),
        ];

        let Some(selection) = intent.entity(AGENTS_ENTITY) else {
            return Ok(canonical
                .into_iter()
                .fold(PipelineSpec::new(Verb::RunPipeline), PipelineSpec::push));
        };

        let names = selection_names(selection)?;
        let wanted: Vec<String> = names.iter().map(|n| canonical_id(n)).collect();

        let mut steps: Vec<PipelineStep> = canonical
            .into_iter()
            .filter(|s| wanted.contains(&s.agent_id))
            .collect();

        for id in &wanted {
            if steps.iter().any(|s| &s.agent_id == id) {
                continue;
            }
            steps.push(self.pipeline_extra(id, intent, &wanted));
        }

        let selected: HashSet<String> = steps.iter().map(|s| s.agent_id.clone()).collect();
        for step in &mut steps {
            let agent_id = step.agent_id.clone();
            step.input_mapping.retain(|param, binding| match binding.source.upstream() {
                Some(target) if !selected.contains(target) => {
                    debug!(step = %agent_id, param = %param, "Dropping binding to unselected step");
                    false
                }
                _ => true,
            });
        }

        Ok(steps
            .into_iter()
            .fold(PipelineSpec::new(Verb::RunPipeline), PipelineSpec::push))
    }

    /// A selected agent outside the canonical chain. Text agents read the
    /// diagnostic impression when the request carries no query, and the
    /// ethics audit reviews the synthetic cohort alongside any logs.
    fn pipeline_extra(&self, id: &str, intent: &Intent, wanted: &[String]) -> PipelineStep {
        let diagnosed = wanted.iter().any(|w| w == DIAGNOSTICS);
        match id {
            DRUG_DISCOVERY | LITERATURE_SURVEILLANCE if diagnosed && !intent.has_entity("query") => {
                PipelineStep::new(id).with_required("query", InputSource::step_output(DIAGNOSTICS))
            }
            ETHICAL_MONITORING => PipelineStep::new(id)
                .with_optional("logs", InputSource::entity("logs"))
                .with_optional("cohort", InputSource::step_output(DATA_SYNTHESIS)),
            _ => verb_for_agent(id)
                .and_then(|verb| self.single_step(verb, intent))
                .unwrap_or_else(|| PipelineStep::new(id)),
        }
    }
}

fn imaging_step() -> PipelineStep {
    PipelineStep::new(IMAGING).with_required("report", InputSource::entity("imaging_report"))
}

fn genomics_step() -> PipelineStep {
    PipelineStep::new(GENOMICS).with_required("variant", InputSource::entity("genomics_summary"))
}

fn selection_names(value: &Value) -> Result<Vec<String>, DispatchError> {
    let invalid = || {
        DispatchError::InvalidPipeline(format!(
            "'{}' must be an array of agent ids or verb names, got {}",
            AGENTS_ENTITY, value
        ))
    };
    let items = value.as_array().ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

/// Map a verb name to the agent it routes to; agent ids pass through.
fn canonical_id(name: &str) -> String {
    Verb::from_name(name)
        .and_then(agent_for_verb)
        .unwrap_or(name)
        .to_string()
}

fn agent_for_verb(verb: Verb) -> Option<&'static str> {
    VERB_AGENTS.iter().find(|(v, _)| *v == verb).map(|(_, id)| *id)
}

fn verb_for_agent(id: &str) -> Option<Verb> {
    VERB_AGENTS.iter().find(|(_, a)| *a == id).map(|(verb, _)| *verb)
}
