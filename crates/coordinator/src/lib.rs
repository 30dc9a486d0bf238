//! Request routing for the MedOrch virtual hospital.
//!
//! The router is the front door:
//! 1. Parses a free-text request into an intent
//! 2. Resolves the intent into a pipeline of agent steps
//! 3. Runs the pipeline, tier by tier, against lazily loaded agents
//! 4. Folds per-step results into one response
//!
//! # Architecture
//!
//! ```text
//! Request text
//!      │
//!      ▼
//! ┌──────────────┐   ┌────────────┐   ┌──────────────────┐   ┌────────────┐
//! │ IntentParser │──▶│ Dispatcher │──▶│ PipelineExecutor │──▶│ aggregate  │
//! └──────────────┘   └────────────┘   └────────┬─────────┘   └────────────┘
//!                                              │ ensure_loaded
//!                                              ▼
//!                                      ┌───────────────┐
//!                                      │ AgentRegistry │
//!                                      └───────────────┘
//! ```

pub mod aggregate;
pub mod config;
pub mod executor;
pub mod intent;
pub mod registry;
pub mod router;
pub mod routing;

pub use aggregate::aggregate;
pub use config::{FanoutPolicy, RouterConfig, RoutingConfig, DISABLED_AGENTS_ENV};
pub use executor::PipelineExecutor;
pub use intent::{Extractor, IntentParser, IntentRule};
pub use registry::{AgentDescriptor, AgentRegistry, AgentStatus, Readiness, DISABLED_REASON};
pub use router::{Router, SelfTestCheck, SelfTestReport};
pub use routing::{agent_ids, Dispatcher, AGENTS_ENTITY};

pub use tokio_util::sync::CancellationToken;
