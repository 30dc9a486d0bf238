//! Pipeline execution.
//!
//! Steps are grouped into dependency tiers. Tiers run one after another;
//! the steps inside a tier run concurrently on their own tokio tasks,
//! bounded by a semaphore. Every step produces exactly one [`StepResult`]
//! and results come back in declaration order whatever order steps finish
//! in. Agent failures, timeouts and panics become step statuses; only a
//! fault in the executor itself aborts the request.

use crate::config::RouterConfig;
use crate::registry::{AgentRegistry, Readiness};
use medorch_common::{
    AgentArgs, AgentError, Entities, ExecutorError, InputSource, Intent, PipelineSpec,
    PipelineStep, SessionHandle, StepResult, StepStatus,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs a [`PipelineSpec`] against the agents of a registry.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: Arc<AgentRegistry>,
    max_concurrent_steps: usize,
    step_timeout: Duration,
    load_timeout: Duration,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self::from_config(registry, &RouterConfig::default())
    }

    pub fn from_config(registry: Arc<AgentRegistry>, config: &RouterConfig) -> Self {
        Self {
            registry,
            max_concurrent_steps: config.max_concurrent_steps.max(1),
            step_timeout: config.step_timeout(),
            load_timeout: config.load_timeout(),
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrent_steps = max.max(1);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Execute every step of `spec`.
    ///
    /// The returned vector has one entry per step, index-aligned with
    /// `spec.steps`.
    pub async fn execute(
        &self,
        spec: &PipelineSpec,
        intent: &Intent,
        session: Option<Arc<SessionHandle>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StepResult>, ExecutorError> {
        let tiers = spec.tiers().map_err(|e| {
            error!(verb = %spec.verb, error = %e, "Rejected pipeline");
            e
        })?;

        info!(
            verb = %spec.verb,
            steps = spec.len(),
            tiers = tiers.len(),
            "Executing pipeline"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_steps));
        let mut results: Vec<Option<StepResult>> = vec![None; spec.len()];
        let mut outputs: HashMap<String, Value> = HashMap::new();

        for (tier_index, tier) in tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                for &i in tier {
                    results[i] = Some(cancelled(&spec.steps[i].agent_id));
                }
                continue;
            }

            debug!(tier = tier_index, steps = tier.len(), "Starting tier");
            let mut handles: Vec<(usize, JoinHandle<Result<StepResult, ExecutorError>>)> =
                Vec::with_capacity(tier.len());

            for &i in tier {
                let step = &spec.steps[i];
                let args = match resolve_args(step, intent, &outputs) {
                    Ok(args) => args,
                    Err(detail) => {
                        warn!(agent = %step.agent_id, detail = %detail, "Step skipped");
                        results[i] = Some(StepResult::failed(
                            &step.agent_id,
                            StepStatus::MissingInput,
                            detail,
                        ));
                        continue;
                    }
                };

                let task = StepTask {
                    agent_id: step.agent_id.clone(),
                    args,
                    registry: self.registry.clone(),
                    session: session.clone(),
                    semaphore: semaphore.clone(),
                    cancel: cancel.clone(),
                    timeout: self.step_timeout,
                    load_timeout: self.load_timeout,
                };
                handles.push((i, tokio::spawn(task.run())));
            }

            for (i, handle) in handles {
                let agent_id = &spec.steps[i].agent_id;
                let result = match handle.await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        error!(agent = %agent_id, error = %e, "Executor fault");
                        return Err(e);
                    }
                    Err(e) => {
                        error!(agent = %agent_id, error = %e, "Agent panicked");
                        StepResult::failed(
                            agent_id,
                            StepStatus::InternalFailure,
                            format!("agent panicked: {}", e),
                        )
                    }
                };
                results[i] = Some(result);
            }

            for &i in tier {
                if let Some(StepResult {
                    status: StepStatus::Ok,
                    output: Some(output),
                    agent_id,
                    ..
                }) = &results[i]
                {
                    outputs.insert(agent_id.clone(), output.clone());
                }
            }
        }

        let results: Vec<StepResult> = results
            .into_iter()
            .zip(&spec.steps)
            .map(|(result, step)| {
                result.unwrap_or_else(|| {
                    StepResult::failed(
                        &step.agent_id,
                        StepStatus::InternalFailure,
                        "step was never scheduled",
                    )
                })
            })
            .collect();

        info!(
            verb = %spec.verb,
            ok = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| !r.is_ok()).count(),
            "Pipeline finished"
        );
        Ok(results)
    }
}

/// Everything one spawned step needs.
struct StepTask {
    agent_id: String,
    args: AgentArgs,
    registry: Arc<AgentRegistry>,
    session: Option<Arc<SessionHandle>>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    load_timeout: Duration,
}

impl StepTask {
    async fn run(self) -> Result<StepResult, ExecutorError> {
        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|e| ExecutorError::WorkerPool(e.to_string()))?
            }
            _ = self.cancel.cancelled() => return Ok(cancelled(&self.agent_id)),
        };
        if self.cancel.is_cancelled() {
            return Ok(cancelled(&self.agent_id));
        }

        let started = Instant::now();
        // An abandoned load leaves the registry slot empty, so the next
        // request loads again.
        let load = tokio::time::timeout(
            self.load_timeout,
            self.registry.ensure_loaded(&self.agent_id),
        );
        let readiness = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Ok(cancelled(&self.agent_id).with_duration(started.elapsed().as_millis() as u64));
            }
            loaded = load => match loaded {
                Ok(readiness) => readiness,
                Err(_) => {
                    warn!(agent = %self.agent_id, timeout_ms = self.load_timeout.as_millis() as u64, "Agent load timed out");
                    return Ok(StepResult::failed(
                        &self.agent_id,
                        StepStatus::Timeout,
                        format!("agent did not load within {} ms", self.load_timeout.as_millis()),
                    )
                    .with_duration(started.elapsed().as_millis() as u64));
                }
            },
        };
        let agent = match readiness {
            Readiness::Ready(agent) => agent,
            Readiness::Unavailable { reason } => {
                warn!(agent = %self.agent_id, reason = %reason, "Agent unavailable");
                return Ok(StepResult::failed(
                    &self.agent_id,
                    StepStatus::Unavailable,
                    reason,
                ));
            }
        };

        debug!(agent = %self.agent_id, args = ?self.args.keys().collect::<Vec<_>>(), "Invoking agent");
        let invocation = agent.invoke(&self.args, self.session.as_deref());

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => cancelled(&self.agent_id),
            outcome = tokio::time::timeout(self.timeout, invocation) => match outcome {
                Ok(Ok(output)) => StepResult::ok(&self.agent_id, output, 0),
                Ok(Err(e)) => {
                    warn!(agent = %self.agent_id, error = %e, "Agent failed");
                    let detail = match e {
                        AgentError::InvalidInput(msg) => format!("invalid input: {}", msg),
                        AgentError::InternalFailure(msg) => msg,
                    };
                    StepResult::failed(&self.agent_id, StepStatus::InternalFailure, detail)
                }
                Err(_) => {
                    warn!(agent = %self.agent_id, timeout_ms = self.timeout.as_millis() as u64, "Agent timed out");
                    StepResult::failed(
                        &self.agent_id,
                        StepStatus::Timeout,
                        format!("no response within {} ms", self.timeout.as_millis()),
                    )
                }
            },
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(agent = %self.agent_id, status = %result.status, duration_ms, "Step finished");
        Ok(result.with_duration(duration_ms))
    }
}

fn cancelled(agent_id: &str) -> StepResult {
    StepResult::failed(agent_id, StepStatus::Cancelled, "request cancelled")
}

/// Resolve a step's bindings into invocation arguments.
///
/// Missing optional inputs are left out; a missing required input fails the
/// whole step with a description of what was missing.
fn resolve_args(
    step: &PipelineStep,
    intent: &Intent,
    outputs: &HashMap<String, Value>,
) -> Result<AgentArgs, String> {
    let mut args = AgentArgs::new();
    for (param, binding) in &step.input_mapping {
        match resolve_source(&binding.source, intent, outputs) {
            Some(value) => {
                args.insert(param.clone(), value);
            }
            None if binding.required => {
                return Err(format!(
                    "required input '{}' is unavailable ({})",
                    param,
                    describe(&binding.source)
                ));
            }
            None => {}
        }
    }
    Ok(args)
}

fn resolve_source(
    source: &InputSource,
    intent: &Intent,
    outputs: &HashMap<String, Value>,
) -> Option<Value> {
    match source {
        InputSource::Literal { value } => Some(value.clone()),
        InputSource::Entity { name } => intent.entity(name).cloned(),
        InputSource::Entities => Some(entities_object(intent.entities())),
        InputSource::RawText => Some(Value::String(intent.raw_text().to_string())),
        InputSource::Template { template } => {
            render_template(template, intent.entities()).map(Value::String)
        }
        InputSource::StepOutput { step, field } => {
            let output = outputs.get(step)?;
            match field {
                Some(field) => output.get(field).cloned(),
                None => Some(output.clone()),
            }
        }
    }
}

fn entities_object(entities: &Entities) -> Value {
    Value::Object(
        entities
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>(),
    )
}

/// Substitute `{name}` placeholders. `None` when a placeholder has no entity.
fn render_template(template: &str, entities: &Entities) -> Option<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        rendered.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        match entities.get(name)? {
            Value::String(s) => rendered.push_str(s),
            other => rendered.push_str(&other.to_string()),
        }
        rest = &rest[open + close + 1..];
    }
    rendered.push_str(rest);
    Some(rendered)
}

fn describe(source: &InputSource) -> String {
    match source {
        InputSource::Literal { .. } => "literal".to_string(),
        InputSource::Entity { name } => format!("entity '{}'", name),
        InputSource::Entities => "request entities".to_string(),
        InputSource::RawText => "request text".to_string(),
        InputSource::Template { template } => format!("template '{}'", template),
        InputSource::StepOutput { step, field: None } => format!("output of '{}'", step),
        InputSource::StepOutput {
            step,
            field: Some(field),
        } => format!("field '{}' of '{}' output", field, step),
    }
}
