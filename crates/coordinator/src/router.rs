//! The request router.
//!
//! Ties the pieces together: parse the text, resolve a pipeline, run it and
//! aggregate the results. One `Router` is built at startup and shared.

use crate::aggregate::aggregate;
use crate::config::RouterConfig;
use crate::executor::PipelineExecutor;
use crate::intent::IntentParser;
use crate::registry::{AgentDescriptor, AgentRegistry};
use crate::routing::Dispatcher;
use medorch_common::{
    new_session_id, AgentRegistration, Intent, PipelineSpec, Response, Result, RouterError,
    SessionStore, Verb,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Canned requests run by [`Router::self_test`], one per capability.
const SELF_TEST_REQUESTS: &[(&str, bool)] = &[
    ("create 2 synthetic patients", false),
    ("diagnose a 55 yo female with chest pain and cough", false),
    ("analyze image data/sample_chest_xray.png", false),
    ("analyze variant BRCA1 5382insC", false),
    ("find clinical trials for a 65 yo male with lung cancer in Boston", false),
    ("diet plan for a 60 yo male with diabetes", false),
    ("I feel anxious about my test results", true),
    ("suggest drugs for breast cancer", false),
    ("treatment plan for a 50 yo female with hypertension", false),
    ("search literature for lung cancer immunotherapy", false),
    (r#"ethics check on ["decisionA","decisionB"]"#, false),
];

/// Outcome of one self-test request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfTestCheck {
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verb: Option<Verb>,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfTestReport {
    pub checks: Vec<SelfTestCheck>,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SelfTestCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Entry point for routing free-text requests to agents.
pub struct Router {
    config: RouterConfig,
    parser: IntentParser,
    dispatcher: Dispatcher,
    executor: PipelineExecutor,
    registry: Arc<AgentRegistry>,
    sessions: SessionStore,
}

impl Router {
    /// Build a router and register `agents`.
    ///
    /// Agents listed in `config.disabled_agents` are registered but never
    /// loaded.
    pub fn new(
        config: RouterConfig,
        agents: impl IntoIterator<Item = AgentRegistration>,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = AgentRegistry::with_disabled(config.disabled_agents.iter().cloned());
        registry.register_all(agents)?;
        let registry = Arc::new(registry);

        info!(
            agents = registry.len(),
            disabled = ?config.disabled_agents,
            max_concurrent_steps = config.max_concurrent_steps,
            step_timeout_ms = config.step_timeout_ms,
            "Router initialized"
        );

        Ok(Self {
            parser: IntentParser::new(),
            dispatcher: Dispatcher::new(config.routing.clone()).with_registry(registry.clone()),
            executor: PipelineExecutor::from_config(registry.clone(), &config),
            registry,
            sessions: SessionStore::new(),
            config,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Snapshots of every registered agent.
    pub fn agents(&self) -> Vec<AgentDescriptor> {
        self.registry.descriptors()
    }

    /// Live conversation sessions. Sessions idle past
    /// `session_idle_ms` are dropped on the next session-bearing request;
    /// hosts that know a conversation is over should call
    /// [`Router::end_session`].
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Forget a conversation. Returns whether it existed.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let ended = self.sessions.end(session_id).await;
        if ended {
            debug!(session = %session_id, "Session ended");
        }
        ended
    }

    pub fn parse(&self, text: &str) -> Intent {
        self.parser.parse(text)
    }

    /// Parse and resolve without running anything.
    pub fn plan(&self, text: &str) -> Result<(Intent, PipelineSpec)> {
        let intent = self.parser.parse(text);
        if let Some(failure) = intent.parse_failure() {
            warn!(fragment = %failure.fragment, error = %failure.message, "Rejected malformed request");
            return Err(RouterError::Parse {
                fragment: failure.fragment.clone(),
                message: failure.message.clone(),
            });
        }
        let spec = self.dispatcher.resolve(&intent).map_err(|e| {
            warn!(verb = %intent.verb(), error = %e, "Request not dispatchable");
            e
        })?;
        Ok((intent, spec))
    }

    /// Route one request.
    pub async fn route(&self, text: &str, session_id: Option<&str>) -> Result<Response> {
        self.route_with_cancel(text, session_id, &CancellationToken::new())
            .await
    }

    /// Route one request, stopping early when `cancel` fires.
    ///
    /// Steps that had not finished when the token fired come back as
    /// cancelled in an otherwise normal, partial response.
    pub async fn route_with_cancel(
        &self,
        text: &str,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let (intent, spec) = self.plan(text)?;
        info!(
            verb = %intent.verb(),
            session = session_id.unwrap_or("-"),
            steps = spec.len(),
            "Routing request"
        );

        let session = match session_id {
            Some(id) => {
                let evicted = self.sessions.evict_idle(self.config.session_idle()).await;
                if evicted > 0 {
                    debug!(evicted, "Dropped idle sessions");
                }
                Some(self.sessions.get_or_create(id).await)
            }
            None => None,
        };

        let results = self.executor.execute(&spec, &intent, session, cancel).await?;
        let response = aggregate(results, &intent);

        if response.partial {
            warn!(
                verb = %response.verb,
                failed = ?response.steps.iter().filter(|s| !s.is_ok()).map(|s| &s.agent_id).collect::<Vec<_>>(),
                "Partial response"
            );
        } else {
            info!(verb = %response.verb, "Request complete");
        }
        Ok(response)
    }

    /// Run one canned request per built-in capability.
    pub async fn self_test(&self) -> SelfTestReport {
        let session = new_session_id();
        let mut report = SelfTestReport::default();

        for (request, needs_session) in SELF_TEST_REQUESTS {
            let session_id = needs_session.then_some(session.as_str());
            let check = match self.route(request, session_id).await {
                Ok(response) => SelfTestCheck {
                    request: request.to_string(),
                    verb: Some(response.verb),
                    passed: !response.partial && !response.steps.is_empty(),
                    detail: response.text,
                },
                Err(e) => SelfTestCheck {
                    request: request.to_string(),
                    verb: None,
                    passed: false,
                    detail: e.to_string(),
                },
            };
            debug!(request = %check.request, passed = check.passed, "Self-test check");
            report.checks.push(check);
        }

        self.end_session(&session).await;
        info!(
            checks = report.checks.len(),
            failed = report.failures().count(),
            "Self-test finished"
        );
        report
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
