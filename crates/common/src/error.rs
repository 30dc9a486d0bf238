//! Error types for MedOrch.
//!
//! Each layer of the router owns one enum. Only [`RouterError`] crosses the
//! library boundary; per-step agent failures never do, they are folded into
//! a [`StepStatus`](crate::StepStatus) by the executor.

use thiserror::Error;

/// Failure reported by an agent's `invoke`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

/// Errors raised by the agent registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("Agent '{0}' is not registered")]
    NotFound(String),
}

/// The dispatcher could not turn an intent into a pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unrecognized request: {0}")]
    UnknownVerb(String),

    #[error("Malformed structured input '{fragment}': {message}")]
    Unparseable { fragment: String, message: String },

    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),
}

/// A fault in the executor's own control logic. Fatal for the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Step '{step}' references unknown step '{target}'")]
    DanglingReference { step: String, target: String },

    #[error("Dependency cycle between pipeline steps: {0}")]
    Cycle(String),

    #[error("Duplicate step '{0}' in pipeline")]
    DuplicateStep(String),

    #[error("Worker pool closed: {0}")]
    WorkerPool(String),
}

/// Whole-request failure surfaced by the router.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Parse error in '{fragment}': {message}")]
    Parse { fragment: String, message: String },

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutorError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RouterError {
    /// Whether the request was rejected before any agent ran.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RouterError::Parse { .. } | RouterError::Dispatch(_))
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let parse = RouterError::Parse {
            fragment: "{bad".into(),
            message: "EOF".into(),
        };
        assert!(parse.is_rejection());
        assert!(RouterError::from(DispatchError::UnknownVerb("hello".into())).is_rejection());
        assert!(!RouterError::from(ExecutorError::Cycle("a -> b -> a".into())).is_rejection());
        assert!(!RouterError::Config("bad".into()).is_rejection());
    }

    #[test]
    fn test_error_messages_name_the_agent() {
        let err = RegistryError::DuplicateAgent("imaging".into());
        assert_eq!(err.to_string(), "Agent 'imaging' is already registered");
    }
}
