//! Agent registry with lazy, at-most-once loading.
//!
//! Agents are registered by value at startup. Nothing is constructed until
//! the first `ensure_loaded` call for an id; the outcome of that load,
//! success or failure, is cached until `reset`.

use medorch_common::{Agent, AgentCapability, AgentRegistration, RegistryError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Reason reported for agents switched off in configuration.
pub const DISABLED_REASON: &str = "disabled by configuration";

/// Load state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, never loaded
    Unloaded,
    /// Loaded and passed its health check
    Ready,
    /// Load failed, health check failed, or disabled
    Unavailable,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentStatus::Unloaded => "unloaded",
            AgentStatus::Ready => "ready",
            AgentStatus::Unavailable => "unavailable",
        };
        f.write_str(label)
    }
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: BTreeSet<AgentCapability>,
    pub status: AgentStatus,
    pub session_bound: bool,
    /// Set when `status` is `Unavailable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of [`AgentRegistry::ensure_loaded`].
#[derive(Clone)]
pub enum Readiness {
    Ready(Arc<dyn Agent>),
    Unavailable { reason: String },
}

impl Readiness {
    fn unavailable(reason: impl Into<String>) -> Self {
        Readiness::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready(agent) => f.debug_tuple("Ready").field(&agent.id()).finish(),
            Readiness::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

type LoadOutcome = std::result::Result<Arc<dyn Agent>, String>;

struct AgentEntry {
    registration: AgentRegistration,
    // Swapped for a fresh cell on reset.
    slot: RwLock<Arc<OnceCell<LoadOutcome>>>,
}

impl AgentEntry {
    fn new(registration: AgentRegistration) -> Self {
        Self {
            registration,
            slot: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    fn cell(&self) -> Arc<OnceCell<LoadOutcome>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn reset(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new());
    }
}

/// Registry of every agent the router can dispatch to.
#[derive(Default)]
pub struct AgentRegistry {
    entries: Vec<AgentEntry>,
    index: HashMap<String, usize>,
    disabled: HashSet<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where the given ids never load.
    pub fn with_disabled<I, S>(disabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled: disabled.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add an agent. Startup only: the registry is shared immutably afterwards.
    pub fn register(&mut self, registration: AgentRegistration) -> Result<(), RegistryError> {
        if self.index.contains_key(&registration.id) {
            return Err(RegistryError::DuplicateAgent(registration.id));
        }

        info!(
            agent = %registration.id,
            capabilities = ?registration.capabilities,
            disabled = self.disabled.contains(&registration.id),
            "Registering agent"
        );
        self.index
            .insert(registration.id.clone(), self.entries.len());
        self.entries.push(AgentEntry::new(registration));
        Ok(())
    }

    /// Register several agents, stopping at the first duplicate.
    pub fn register_all(
        &mut self,
        registrations: impl IntoIterator<Item = AgentRegistration>,
    ) -> Result<(), RegistryError> {
        for registration in registrations {
            self.register(registration)?;
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> Option<&AgentEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    /// Describe one agent.
    pub fn lookup(&self, id: &str) -> Result<AgentDescriptor, RegistryError> {
        self.entry(id)
            .map(|entry| self.describe(entry))
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Every agent, in registration order.
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.entries.iter().map(|e| self.describe(e)).collect()
    }

    /// Agents advertising a capability, in registration order.
    pub fn agents_with(&self, capability: AgentCapability) -> Vec<AgentDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.registration.capabilities.contains(&capability))
            .map(|e| self.describe(e))
            .collect()
    }

    fn describe(&self, entry: &AgentEntry) -> AgentDescriptor {
        let registration = &entry.registration;
        let (status, reason) = if self.is_disabled(&registration.id) {
            (AgentStatus::Unavailable, Some(DISABLED_REASON.to_string()))
        } else {
            match entry.cell().get() {
                None => (AgentStatus::Unloaded, None),
                Some(Ok(_)) => (AgentStatus::Ready, None),
                Some(Err(reason)) => (AgentStatus::Unavailable, Some(reason.clone())),
            }
        };

        AgentDescriptor {
            id: registration.id.clone(),
            name: registration.name.clone(),
            capabilities: registration.capabilities.clone(),
            status,
            session_bound: registration.session_bound,
            reason,
        }
    }

    /// Resolve an agent, loading it on first use.
    ///
    /// Concurrent first callers share one load. Unknown and disabled ids
    /// resolve as unavailable without touching any loader.
    pub async fn ensure_loaded(&self, id: &str) -> Readiness {
        let Some(entry) = self.entry(id) else {
            warn!(agent = %id, "Requested agent is not registered");
            return Readiness::unavailable(format!("agent '{}' is not registered", id));
        };

        if self.is_disabled(id) {
            debug!(agent = %id, "Agent disabled by configuration");
            return Readiness::unavailable(DISABLED_REASON);
        }

        let cell = entry.cell();
        let outcome = cell
            .get_or_init(|| load_agent(entry.registration.clone()))
            .await;

        match outcome {
            Ok(agent) => Readiness::Ready(agent.clone()),
            Err(reason) => Readiness::unavailable(reason.clone()),
        }
    }

    /// Forget a cached load outcome so the next `ensure_loaded` retries.
    pub fn reset(&self, id: &str) -> Result<(), RegistryError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        entry.reset();
        info!(agent = %id, "Agent load state reset");
        Ok(())
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field(
                "agents",
                &self.entries.iter().map(|e| &e.registration.id).collect::<Vec<_>>(),
            )
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Run a loader on its own task so a panic becomes a cached failure.
async fn load_agent(registration: AgentRegistration) -> LoadOutcome {
    let id = registration.id;
    let loader = registration.loader;
    debug!(agent = %id, "Loading agent");

    let agent = match tokio::spawn(async move { loader.load().await }).await {
        Ok(Ok(agent)) => agent,
        Ok(Err(e)) => {
            warn!(agent = %id, error = %e, "Agent failed to load");
            return Err(format!("load failed: {}", e));
        }
        Err(e) => {
            error!(agent = %id, error = %e, "Agent loader panicked");
            return Err(format!("loader panicked: {}", e));
        }
    };

    if !agent.is_ready() {
        warn!(agent = %id, "Agent failed its health check");
        return Err("health check failed".to_string());
    }

    info!(agent = %id, "Agent ready");
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medorch_common::{AgentArgs, AgentError, AgentLoader, SessionHandle};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubAgent {
        id: String,
        ready: bool,
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn id(&self) -> &str {
            &self.id
        }

        async fn invoke(
            &self,
            _args: &AgentArgs,
            _session: Option<&SessionHandle>,
        ) -> Result<Value, AgentError> {
            Ok(json!(self.id))
        }

        fn is_ready(&self) -> bool {
            self.ready
        }
    }

    /// Counts loads; fails until `fail_until` attempts have been made.
    struct CountingLoader {
        id: &'static str,
        loads: Arc<AtomicUsize>,
        fail_until: usize,
        delay: Duration,
    }

    #[async_trait]
    impl AgentLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn Agent>, AgentError> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if attempt <= self.fail_until {
                return Err(AgentError::InternalFailure("model weights missing".into()));
            }
            Ok(Arc::new(StubAgent {
                id: self.id.to_string(),
                ready: true,
            }))
        }
    }

    fn counting(id: &'static str, fail_until: usize, delay: Duration) -> (AgentRegistration, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            id,
            loads: loads.clone(),
            fail_until,
            delay,
        };
        (AgentRegistration::new(id, Arc::new(loader)), loads)
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = AgentRegistry::new();
        let (a, _) = counting("imaging", 0, Duration::ZERO);
        let (b, _) = counting("imaging", 0, Duration::ZERO);
        registry.register(a).unwrap();
        assert_eq!(
            registry.register(b).unwrap_err(),
            RegistryError::DuplicateAgent("imaging".into())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_and_capabilities() {
        let mut registry = AgentRegistry::new();
        let (a, _) = counting("imaging", 0, Duration::ZERO);
        let (b, _) = counting("genomics", 0, Duration::ZERO);
        registry
            .register_all([
                a.with_capability(AgentCapability::Imaging).with_name("Imaging Agent"),
                b.with_capability(AgentCapability::Genomics),
            ])
            .unwrap();

        let descriptor = registry.lookup("imaging").unwrap();
        assert_eq!(descriptor.name, "Imaging Agent");
        assert_eq!(descriptor.status, AgentStatus::Unloaded);
        assert_eq!(
            registry.lookup("ghost").unwrap_err(),
            RegistryError::NotFound("ghost".into())
        );

        let genomic: Vec<String> = registry
            .agents_with(AgentCapability::Genomics)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(genomic, vec!["genomics".to_string()]);

        let order: Vec<String> = registry.descriptors().into_iter().map(|d| d.id).collect();
        assert_eq!(order, vec!["imaging".to_string(), "genomics".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_load_once() {
        let mut registry = AgentRegistry::new();
        let (registration, loads) = counting("diagnostics", 0, Duration::from_millis(50));
        registry.register(registration).unwrap();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.ensure_loaded("diagnostics").await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ready());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.lookup("diagnostics").unwrap().status,
            AgentStatus::Ready
        );
    }

    #[tokio::test]
    async fn test_failed_load_cached_until_reset() {
        let mut registry = AgentRegistry::new();
        let (registration, loads) = counting("genomics", 1, Duration::ZERO);
        registry.register(registration).unwrap();

        let first = registry.ensure_loaded("genomics").await;
        assert!(matches!(first, Readiness::Unavailable { ref reason } if reason.contains("model weights missing")));
        let second = registry.ensure_loaded("genomics").await;
        assert!(!second.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.lookup("genomics").unwrap().status,
            AgentStatus::Unavailable
        );

        registry.reset("genomics").unwrap();
        assert_eq!(
            registry.lookup("genomics").unwrap().status,
            AgentStatus::Unloaded
        );
        assert!(registry.ensure_loaded("genomics").await.is_ready());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_loader_is_unavailable() {
        let mut registry = AgentRegistry::new();
        registry
            .register(AgentRegistration::from_fn("boom", || panic!("loader exploded")))
            .unwrap();

        let readiness = registry.ensure_loaded("boom").await;
        assert!(matches!(readiness, Readiness::Unavailable { ref reason } if reason.contains("panicked")));
    }

    #[tokio::test]
    async fn test_failed_health_check_is_unavailable() {
        let mut registry = AgentRegistry::new();
        registry
            .register(AgentRegistration::from_fn("sick", || {
                Ok(Arc::new(StubAgent {
                    id: "sick".into(),
                    ready: false,
                }) as Arc<dyn Agent>)
            }))
            .unwrap();

        let readiness = registry.ensure_loaded("sick").await;
        assert!(matches!(readiness, Readiness::Unavailable { ref reason } if reason == "health check failed"));
    }

    #[tokio::test]
    async fn test_unknown_id_is_unavailable() {
        let registry = AgentRegistry::new();
        assert!(!registry.ensure_loaded("nope").await.is_ready());
        assert_eq!(
            registry.reset("nope").unwrap_err(),
            RegistryError::NotFound("nope".into())
        );
    }

    #[tokio::test]
    async fn test_disabled_agent_never_loads() {
        let mut registry = AgentRegistry::with_disabled(["imaging"]);
        let (registration, loads) = counting("imaging", 0, Duration::ZERO);
        registry.register(registration).unwrap();

        let readiness = registry.ensure_loaded("imaging").await;
        assert!(matches!(readiness, Readiness::Unavailable { ref reason } if reason == DISABLED_REASON));
        assert_eq!(loads.load(Ordering::SeqCst), 0);

        let descriptor = registry.lookup("imaging").unwrap();
        assert_eq!(descriptor.status, AgentStatus::Unavailable);
        assert_eq!(descriptor.reason.as_deref(), Some(DISABLED_REASON));
    }
}
