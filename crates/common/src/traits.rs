//! The agent contract and registration types.
//!
//! These live in `medorch-common` so the coordinator and the agent crates
//! can both reference them without depending on each other.

use crate::error::AgentError;
use crate::session::SessionHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Named arguments passed to `Agent::invoke`.
pub type AgentArgs = BTreeMap<String, Value>;

/// What a specialist agent can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    /// Generates synthetic patient records
    DataSynthesis,
    /// Produces a diagnostic impression
    Diagnosis,
    /// Reads imaging studies or reports
    Imaging,
    /// Classifies genomic variants
    Genomics,
    /// Matches patients to clinical trials
    TrialMatching,
    /// Builds nutrition plans
    DietPlanning,
    /// Holds supportive conversations
    MentalHealth,
    /// Proposes candidate compounds for a condition
    DrugDiscovery,
    /// Chooses a treatment intensity
    TreatmentPlanning,
    /// Searches and summarises medical literature
    LiteratureSurveillance,
    /// Audits decisions and cohorts for bias
    EthicalMonitoring,
}

impl fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentCapability::DataSynthesis => "data_synthesis",
            AgentCapability::Diagnosis => "diagnosis",
            AgentCapability::Imaging => "imaging",
            AgentCapability::Genomics => "genomics",
            AgentCapability::TrialMatching => "trial_matching",
            AgentCapability::DietPlanning => "diet_planning",
            AgentCapability::MentalHealth => "mental_health",
            AgentCapability::DrugDiscovery => "drug_discovery",
            AgentCapability::TreatmentPlanning => "treatment_planning",
            AgentCapability::LiteratureSurveillance => "literature_surveillance",
            AgentCapability::EthicalMonitoring => "ethical_monitoring",
        };
        f.write_str(name)
    }
}

/// The core trait every specialist agent implements.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Unique identifier, matching the id the agent is registered under.
    fn id(&self) -> &str;

    /// Run the agent on resolved arguments.
    ///
    /// `session` is only provided when the request carries a session id.
    async fn invoke(
        &self,
        args: &AgentArgs,
        session: Option<&SessionHandle>,
    ) -> Result<Value, AgentError>;

    /// Health check consulted once when the agent is loaded.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Builds an agent on first use.
#[async_trait]
pub trait AgentLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Agent>, AgentError>;
}

/// Loader backed by a synchronous constructor.
pub struct FnLoader<F>(pub F);

#[async_trait]
impl<F> AgentLoader for FnLoader<F>
where
    F: Fn() -> Result<Arc<dyn Agent>, AgentError> + Send + Sync,
{
    async fn load(&self) -> Result<Arc<dyn Agent>, AgentError> {
        (self.0)()
    }
}

/// Loader that hands out an already-built agent.
struct PrebuiltLoader(Arc<dyn Agent>);

#[async_trait]
impl AgentLoader for PrebuiltLoader {
    async fn load(&self) -> Result<Arc<dyn Agent>, AgentError> {
        Ok(self.0.clone())
    }
}

/// Everything the registry needs to know about an agent at startup.
#[derive(Clone)]
pub struct AgentRegistration {
    pub id: String,
    pub name: String,
    pub capabilities: BTreeSet<AgentCapability>,
    /// Output depends on conversation history.
    pub session_bound: bool,
    pub loader: Arc<dyn AgentLoader>,
}

impl AgentRegistration {
    pub fn new(id: impl Into<String>, loader: Arc<dyn AgentLoader>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            capabilities: BTreeSet::new(),
            session_bound: false,
            loader,
        }
    }

    /// Register a lazily constructed agent.
    pub fn from_fn<F>(id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Agent>, AgentError> + Send + Sync + 'static,
    {
        Self::new(id, Arc::new(FnLoader(constructor)))
    }

    /// Register an agent that is already constructed.
    pub fn prebuilt(agent: Arc<dyn Agent>) -> Self {
        Self::new(agent.id().to_string(), Arc::new(PrebuiltLoader(agent)))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capability(mut self, capability: AgentCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn session_bound(mut self, value: bool) -> Self {
        self.session_bound = value;
        self
    }
}

impl fmt::Debug for AgentRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("session_bound", &self.session_bound)
            .finish_non_exhaustive()
    }
}
