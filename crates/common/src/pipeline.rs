//! Pipeline specification and per-step results.

use crate::error::ExecutorError;
use crate::intent::Verb;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Where a step parameter gets its value from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSource {
    /// A fixed value.
    Literal { value: Value },
    /// One intent entity.
    Entity { name: String },
    /// All intent entities as a single object.
    Entities,
    /// The original request text.
    RawText,
    /// A `{entity}` placeholder template rendered from intent entities.
    Template { template: String },
    /// The output of another step, optionally a single top-level field of it.
    StepOutput {
        step: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl InputSource {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self::Entity { name: name.into() }
    }

    pub fn template(template: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
        }
    }

    pub fn step_output(step: impl Into<String>) -> Self {
        Self::StepOutput {
            step: step.into(),
            field: None,
        }
    }

    pub fn step_field(step: impl Into<String>, field: impl Into<String>) -> Self {
        Self::StepOutput {
            step: step.into(),
            field: Some(field.into()),
        }
    }

    /// The step this source depends on, if any.
    pub fn upstream(&self) -> Option<&str> {
        match self {
            InputSource::StepOutput { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// A parameter binding: a source plus whether the step can run without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBinding {
    pub source: InputSource,
    #[serde(default)]
    pub required: bool,
}

impl InputBinding {
    pub fn required(source: InputSource) -> Self {
        Self {
            source,
            required: true,
        }
    }

    pub fn optional(source: InputSource) -> Self {
        Self {
            source,
            required: false,
        }
    }
}

/// One agent invocation inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub agent_id: String,
    #[serde(default)]
    pub input_mapping: BTreeMap<String, InputBinding>,
}

impl PipelineStep {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            input_mapping: BTreeMap::new(),
        }
    }

    pub fn with_required(mut self, param: impl Into<String>, source: InputSource) -> Self {
        self.input_mapping
            .insert(param.into(), InputBinding::required(source));
        self
    }

    pub fn with_optional(mut self, param: impl Into<String>, source: InputSource) -> Self {
        self.input_mapping
            .insert(param.into(), InputBinding::optional(source));
        self
    }

    /// Steps whose output this step reads.
    pub fn upstream_steps(&self) -> impl Iterator<Item = &str> {
        self.input_mapping.values().filter_map(|b| b.source.upstream())
    }
}

/// Ordered set of agent invocations answering one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub verb: Verb,
    pub steps: Vec<PipelineStep>,
}

impl PipelineSpec {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            steps: Vec::new(),
        }
    }

    pub fn push(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.agent_id.as_str())
    }

    /// Group step indices into dependency tiers.
    ///
    /// A step lands in tier `k` when every step it reads from sits in a tier
    /// below `k`. Indices inside a tier keep declaration order.
    pub fn tiers(&self) -> std::result::Result<Vec<Vec<usize>>, ExecutorError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.agent_id.as_str(), i).is_some() {
                return Err(ExecutorError::DuplicateStep(step.agent_id.clone()));
            }
        }

        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let mut step_deps = Vec::new();
            for target in step.upstream_steps() {
                let dep = index.get(target).copied().ok_or_else(|| {
                    ExecutorError::DanglingReference {
                        step: step.agent_id.clone(),
                        target: target.to_string(),
                    }
                })?;
                step_deps.push(dep);
            }
            deps.push(step_deps);
        }

        let mut tier_of: Vec<Option<usize>> = vec![None; self.steps.len()];
        let mut tiers: Vec<Vec<usize>> = Vec::new();
        let mut placed = 0;

        while placed < self.steps.len() {
            let current: Vec<usize> = (0..self.steps.len())
                .filter(|&i| tier_of[i].is_none() && deps[i].iter().all(|&d| tier_of[d].is_some()))
                .collect();

            if current.is_empty() {
                let stuck = (0..self.steps.len())
                    .filter(|&i| tier_of[i].is_none())
                    .map(|i| self.steps[i].agent_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ExecutorError::Cycle(stuck));
            }

            for &i in &current {
                tier_of[i] = Some(tiers.len());
            }
            placed += current.len();
            tiers.push(current);
        }

        Ok(tiers)
    }
}

/// Outcome category of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Unavailable,
    MissingInput,
    Timeout,
    InternalFailure,
    Cancelled,
}

impl StepStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Ok)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Ok => "ok",
            StepStatus::Unavailable => "unavailable",
            StepStatus::MissingInput => "missing input",
            StepStatus::Timeout => "timeout",
            StepStatus::InternalFailure => "internal failure",
            StepStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Result of a single pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub agent_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Why the step did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn ok(agent_id: impl Into<String>, output: Value, duration_ms: u64) -> Self {
        Self {
            agent_id: agent_id.into(),
            status: StepStatus::Ok,
            output: Some(output),
            detail: None,
            duration_ms,
        }
    }

    pub fn failed(agent_id: impl Into<String>, status: StepStatus, detail: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status,
            output: None,
            detail: Some(detail.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str) -> PipelineStep {
        PipelineStep::new(id)
    }

    #[test]
    fn test_independent_steps_share_a_tier() {
        let spec = PipelineSpec::new(Verb::Diagnose)
            .push(step("imaging"))
            .push(step("genomics"));
        assert_eq!(spec.tiers().unwrap(), vec![vec![0, 1]]);
    }

    #[test]
    fn test_dependency_pushes_consumer_to_later_tier() {
        // Consumer declared first still runs after its producers.
        let spec = PipelineSpec::new(Verb::Diagnose)
            .push(step("diagnostics").with_optional("imaging", InputSource::step_output("imaging")))
            .push(step("imaging"))
            .push(step("genomics"));
        assert_eq!(spec.tiers().unwrap(), vec![vec![1, 2], vec![0]]);
    }

    #[test]
    fn test_chain_gives_one_step_per_tier() {
        let spec = PipelineSpec::new(Verb::RunPipeline)
            .push(step("a"))
            .push(step("b").with_required("x", InputSource::step_output("a")))
            .push(step("c").with_required("y", InputSource::step_field("b", "summary")));
        assert_eq!(spec.tiers().unwrap(), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let spec = PipelineSpec::new(Verb::RunPipeline)
            .push(step("a").with_required("x", InputSource::step_output("b")))
            .push(step("b").with_required("y", InputSource::step_output("a")));
        assert!(matches!(spec.tiers(), Err(ExecutorError::Cycle(_))));
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let spec = PipelineSpec::new(Verb::RunPipeline)
            .push(step("a").with_required("x", InputSource::step_output("ghost")));
        assert_eq!(
            spec.tiers(),
            Err(ExecutorError::DanglingReference {
                step: "a".into(),
                target: "ghost".into()
            })
        );
    }

    #[test]
    fn test_duplicate_step_is_rejected() {
        let spec = PipelineSpec::new(Verb::Synthesize).push(step("a")).push(step("a"));
        assert_eq!(spec.tiers(), Err(ExecutorError::DuplicateStep("a".into())));
    }

    #[test]
    fn test_empty_spec_has_no_tiers() {
        assert!(PipelineSpec::new(Verb::Synthesize).tiers().unwrap().is_empty());
    }

    #[test]
    fn test_input_source_wire_format() {
        let source = InputSource::step_field("diagnostics", "summary");
        assert_eq!(
            serde_json::to_value(&source).unwrap(),
            json!({"kind": "step_output", "step": "diagnostics", "field": "summary"})
        );
        let back: InputSource = serde_json::from_value(json!({"kind": "entities"})).unwrap();
        assert_eq!(back, InputSource::Entities);
    }

    #[test]
    fn test_step_result_constructors() {
        let ok = StepResult::ok("imaging", json!({"findings": []}), 12);
        assert!(ok.is_ok());
        assert_eq!(ok.duration_ms, 12);

        let failed = StepResult::failed("genomics", StepStatus::Timeout, "took too long");
        assert!(!failed.is_ok());
        assert!(failed.output.is_none());
        assert_eq!(failed.detail.as_deref(), Some("took too long"));
        assert_eq!(StepStatus::MissingInput.to_string(), "missing input");
    }
}
