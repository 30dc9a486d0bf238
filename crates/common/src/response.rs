//! The router's answer to one request.

use crate::intent::Verb;
use crate::pipeline::StepResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Token placed on every text line of a step that did not succeed.
pub const FAILURE_MARKER: &str = "[unavailable]";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub verb: Verb,
    /// Human-readable summary, one line per step in declaration order.
    pub text: String,
    /// Output of every successful step, keyed by agent id.
    pub payload: BTreeMap<String, Value>,
    /// True when at least one step did not succeed.
    pub partial: bool,
    /// Per-step results in declaration order.
    pub steps: Vec<StepResult>,
}

impl Response {
    pub fn output(&self, agent_id: &str) -> Option<&Value> {
        self.payload.get(agent_id)
    }

    pub fn step(&self, agent_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.agent_id == agent_id)
    }
}
