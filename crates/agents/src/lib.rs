//! Built-in specialist agents for MedOrch.
//!
//! Offline, deterministic stand-ins for the hospital's specialists:
//!
//! - **Data Synthesis**: synthetic patient cohorts from a seeded RNG
//! - **Diagnostics**: rule-based diagnostic impressions
//! - **Imaging**: study descriptions from imaging file references
//! - **Genomics**: single-variant classification
//! - **Trial Matching**: clinical trial catalogue search
//! - **Diet Planner**: condition-aware nutrition guidelines
//! - **Mental Health**: supportive, session-aware conversation
//! - **Drug Discovery**: candidate compounds for named indications
//! - **Treatment Optimization**: dose level from estimated severity
//! - **Literature Surveillance**: ranked search over bundled abstracts
//! - **Ethical Monitoring**: bias audit of decision logs and cohorts
//!
//! Nothing here is constructed until the router's registry loads it; the
//! registrations returned by [`builtin_registrations`] only carry loaders.

mod args;
pub mod diagnostics;
pub mod diet;
pub mod drug_discovery;
pub mod ethics;
pub mod genomics;
pub mod imaging;
pub mod literature;
pub mod mental_health;
pub mod synthesis;
pub mod treatment;
pub mod trials;

pub use diagnostics::DiagnosticsAgent;
pub use diet::DietPlannerAgent;
pub use drug_discovery::DrugDiscoveryAgent;
pub use ethics::EthicalMonitoringAgent;
pub use genomics::GenomicsAgent;
pub use imaging::ImagingAgent;
pub use literature::LiteratureSurveillanceAgent;
pub use mental_health::MentalHealthAgent;
pub use synthesis::DataSynthesisAgent;
pub use treatment::TreatmentOptimizationAgent;
pub use trials::TrialMatchingAgent;

use medorch_common::{Agent, AgentCapability, AgentRegistration};
use std::sync::Arc;

/// Registrations for every built-in agent, in routing-table order.
pub fn builtin_registrations() -> Vec<AgentRegistration> {
    vec![
        AgentRegistration::from_fn(synthesis::ID, || {
            Ok(Arc::new(DataSynthesisAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Data Synthesis Agent")
        .with_capability(AgentCapability::DataSynthesis),
        AgentRegistration::from_fn(diagnostics::ID, || {
            Ok(Arc::new(DiagnosticsAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Diagnostics Agent")
        .with_capability(AgentCapability::Diagnosis),
        AgentRegistration::from_fn(imaging::ID, || {
            Ok(Arc::new(ImagingAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Imaging Agent")
        .with_capability(AgentCapability::Imaging),
        AgentRegistration::from_fn(genomics::ID, || {
            Ok(Arc::new(GenomicsAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Genomics Agent")
        .with_capability(AgentCapability::Genomics),
        AgentRegistration::from_fn(trials::ID, || {
            Ok(Arc::new(TrialMatchingAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Trial Matching Agent")
        .with_capability(AgentCapability::TrialMatching),
        AgentRegistration::from_fn(diet::ID, || {
            Ok(Arc::new(DietPlannerAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Diet Planner Agent")
        .with_capability(AgentCapability::DietPlanning),
        AgentRegistration::from_fn(mental_health::ID, || {
            Ok(Arc::new(MentalHealthAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Mental Health Agent")
        .with_capability(AgentCapability::MentalHealth)
        .session_bound(true),
        AgentRegistration::from_fn(drug_discovery::ID, || {
            Ok(Arc::new(DrugDiscoveryAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Drug Discovery Agent")
        .with_capability(AgentCapability::DrugDiscovery),
        AgentRegistration::from_fn(treatment::ID, || {
            Ok(Arc::new(TreatmentOptimizationAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Treatment Optimization Agent")
        .with_capability(AgentCapability::TreatmentPlanning),
        AgentRegistration::from_fn(literature::ID, || {
            Ok(Arc::new(LiteratureSurveillanceAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Literature Surveillance Agent")
        .with_capability(AgentCapability::LiteratureSurveillance),
        AgentRegistration::from_fn(ethics::ID, || {
            Ok(Arc::new(EthicalMonitoringAgent::new()) as Arc<dyn Agent>)
        })
        .with_name("Ethical Monitoring Agent")
        .with_capability(AgentCapability::EthicalMonitoring),
    ]
}
