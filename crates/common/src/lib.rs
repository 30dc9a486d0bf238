//! Common types and traits shared across MedOrch crates.
//!
//! This crate provides the foundational abstractions the router and the
//! specialist agents use to talk to each other: the agent contract, the
//! request/pipeline data model, session state and the error taxonomy.

pub mod error;
pub mod intent;
pub mod pipeline;
pub mod response;
pub mod session;
pub mod traits;

pub use error::{AgentError, DispatchError, ExecutorError, RegistryError, Result, RouterError};
pub use intent::{Entities, Intent, ParseFailure, Verb};
pub use pipeline::{InputBinding, InputSource, PipelineSpec, PipelineStep, StepResult, StepStatus};
pub use response::{FAILURE_MARKER, Response};
pub use session::{MessageRole, SessionHandle, SessionStore, SessionTurn, new_session_id};
pub use traits::{Agent, AgentArgs, AgentCapability, AgentLoader, AgentRegistration, FnLoader};
