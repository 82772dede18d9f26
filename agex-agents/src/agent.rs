//! `Agent`: one agent's fixed identity (name, capability `Policy`, LLM
//! client, runtime configuration) plus the process-wide registries that
//! let a fingerprint or a name recover the `Agent` that produced it
//! (SPEC_FULL.md §5 "Shared-resource policy" — agent registry).
//!
//! `NativeRegistry` itself is not `Send` (its closures are `Rc`-held, see
//! `agex_dsl::eval::value::NativeFn`), so an `Agent` sitting in a
//! cross-thread `Arc` can't embed one directly. Instead it carries a
//! `natives_builder` that rebuilds a fresh registry on demand; a task
//! invocation calls it once at the start of its (single-threaded, see
//! SPEC_FULL.md §5 "Scheduling model") run.

use agex_core::{AgexError, ConfigError, Fingerprint, PolicyError, RuntimeConfig};
use agex_dsl::eval::NativeRegistry;
use agex_llm::LlmClient;
use agex_policy::Policy;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One agent: a name, the capabilities it may reach, the LLM it talks to,
/// and the resource limits its task loop enforces. Held behind `Arc` so
/// the registries below and every `Task` built from it can share one
/// instance without cloning the `Policy`.
pub struct Agent {
    pub name: String,
    pub policy: Policy,
    pub(crate) natives_builder: Arc<dyn Fn() -> NativeRegistry + Send + Sync>,
    pub llm: Arc<dyn LlmClient + Send + Sync>,
    pub config: RuntimeConfig,
    fingerprint: Fingerprint,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("fingerprint", &agex_core::fingerprint_to_hex(&self.fingerprint))
            .finish()
    }
}

impl Agent {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub(crate) fn natives(&self) -> NativeRegistry {
        (self.natives_builder)()
    }
}

fn empty_natives() -> NativeRegistry {
    NativeRegistry::default()
}

/// Builds an `Agent` the way `Policy` itself is built: start from a primer,
/// register capabilities, then attach the runtime-only pieces (natives,
/// LLM client, config) that can't live on `Policy` itself.
pub struct AgentBuilder {
    name: String,
    policy: Policy,
    natives_builder: Arc<dyn Fn() -> NativeRegistry + Send + Sync>,
    llm: Option<Arc<dyn LlmClient + Send + Sync>>,
    config: RuntimeConfig,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, primer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: Policy::new(primer),
            natives_builder: Arc::new(empty_natives),
            llm: None,
            config: RuntimeConfig::default(),
        }
    }

    /// The mutable `Policy` this agent is being built around — register
    /// functions, classes, modules, and instances on it directly.
    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    /// Installs the closure that rebuilds this agent's `NativeRegistry` at
    /// the start of every task invocation. Must register the same dotted
    /// names the policy declares reachable, or a sandboxed call to one will
    /// fail with "no native registered" at call time.
    pub fn with_natives(mut self, builder: impl Fn() -> NativeRegistry + Send + Sync + 'static) -> Self {
        self.natives_builder = Arc::new(builder);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Finishes the agent, computes its fingerprint, and registers it in
    /// both process-wide registries. Fails if another agent already holds
    /// this name, or if no LLM client was attached.
    pub fn build_and_register(self) -> Result<Arc<Agent>, AgexError> {
        let llm = self.llm.ok_or_else(|| {
            AgexError::Config(ConfigError::MissingRequired {
                field: "llm".to_string(),
            })
        })?;
        let fingerprint = self.policy.fingerprint();
        let agent = Arc::new(Agent {
            name: self.name,
            policy: self.policy,
            natives_builder: self.natives_builder,
            llm,
            config: self.config,
            fingerprint,
        });
        register_agent(agent.clone())?;
        Ok(agent)
    }
}

static BY_NAME: Lazy<RwLock<HashMap<String, Arc<Agent>>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static BY_FINGERPRINT: Lazy<RwLock<HashMap<Fingerprint, Arc<Agent>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers `agent` in both process-wide registries. Name collisions are
/// rejected (SPEC_FULL.md §5: "Name collisions raise an error"); fingerprint
/// collisions are not, since two agents with identical declared surfaces
/// and primer are, by definition, interchangeable for capability purposes.
fn register_agent(agent: Arc<Agent>) -> Result<(), AgexError> {
    let mut by_name = BY_NAME.write().expect("agent name registry poisoned");
    if by_name.contains_key(&agent.name) {
        return Err(AgexError::Policy(PolicyError::DuplicateAgentName { name: agent.name.clone() }));
    }
    by_name.insert(agent.name.clone(), agent.clone());
    BY_FINGERPRINT
        .write()
        .expect("agent fingerprint registry poisoned")
        .insert(agent.fingerprint(), agent);
    Ok(())
}

pub fn agent_by_name(name: &str) -> Option<Arc<Agent>> {
    BY_NAME.read().expect("agent name registry poisoned").get(name).cloned()
}

pub fn agent_by_fingerprint(fingerprint: &Fingerprint) -> Result<Arc<Agent>, PolicyError> {
    BY_FINGERPRINT
        .read()
        .expect("agent fingerprint registry poisoned")
        .get(fingerprint)
        .cloned()
        .ok_or_else(|| PolicyError::UnknownFingerprint {
            fingerprint: agex_core::fingerprint_to_hex(fingerprint),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agex_test_utils::DummyLlmClient;

    fn dummy_llm() -> Arc<dyn LlmClient + Send + Sync> {
        Arc::new(DummyLlmClient::new())
    }

    #[test]
    fn builds_and_registers_under_a_unique_name() {
        let agent = AgentBuilder::new("agent-a-tests", "a test agent")
            .with_llm(dummy_llm())
            .build_and_register()
            .unwrap();
        assert_eq!(agent_by_name("agent-a-tests").unwrap().name, "agent-a-tests");
        assert_eq!(agent_by_fingerprint(&agent.fingerprint()).unwrap().name, "agent-a-tests");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let _first = AgentBuilder::new("agent-b-tests", "first").with_llm(dummy_llm()).build_and_register().unwrap();
        let second = AgentBuilder::new("agent-b-tests", "second").with_llm(dummy_llm()).build_and_register();
        assert!(matches!(second, Err(AgexError::Policy(PolicyError::DuplicateAgentName { .. }))));
    }

    #[test]
    fn missing_llm_is_rejected() {
        let result = AgentBuilder::new("agent-c-tests", "no llm").build_and_register();
        assert!(matches!(result, Err(AgexError::Config(ConfigError::MissingRequired { .. }))));
    }

    #[test]
    fn unknown_fingerprint_is_an_error() {
        assert!(agent_by_fingerprint(&[0u8; 32]).is_err());
    }
}
