//! Agent boundary.
//!
//! An [`AgentAdapter`] takes one node's objective, context and target schema
//! and hands back raw structured output. It never returns a typed result:
//! the executor validates everything against the schema registry before a
//! node can resolve.

pub mod model;
pub mod prompt;
pub mod researcher;
pub mod search;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ResolvedContext, TaskNode};
use crate::schema::{FieldViolation, SchemaRef};
use crate::{Error, Result};

pub use model::{HeadlessModel, LanguageModel, ModelReply};
pub use researcher::ResearchAgent;
pub use search::{GoogleSearch, OfflineSearch, SearchTool};

/// Capabilities an agent may invoke while working a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRef {
    WebSearch,
}

impl std::fmt::Display for ToolRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolRef::WebSearch => write!(f, "web_search"),
        }
    }
}

/// Name of a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRef(pub String);

impl AgentRef {
    pub const RESEARCHER: &'static str = "researcher";

    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentRef {
    fn default() -> Self {
        Self::new(Self::RESEARCHER)
    }
}

impl std::fmt::Display for AgentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything an agent needs to work one node.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Node name, for logs only.
    pub node: String,
    pub objective: String,
    pub instructions: Option<String>,
    pub tools: BTreeSet<ToolRef>,
    pub context: ResolvedContext,
    pub schema: SchemaRef,
    /// Violations from the previous attempt when this is the schema retry.
    pub feedback: Vec<FieldViolation>,
}

impl AgentRequest {
    pub fn for_node(node: &TaskNode, context: ResolvedContext) -> Self {
        Self {
            node: node.name.clone(),
            objective: node.objective.clone(),
            instructions: node.instructions.clone(),
            tools: node.tools.clone(),
            context,
            schema: node.result_schema,
            feedback: Vec::new(),
        }
    }

    pub fn with_feedback(mut self, violations: Vec<FieldViolation>) -> Self {
        self.feedback = violations;
        self
    }

    pub fn is_retry(&self) -> bool {
        !self.feedback.is_empty()
    }

    pub fn allows(&self, tool: ToolRef) -> bool {
        self.tools.contains(&tool)
    }
}

/// Raw agent output plus what it cost to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub output: Value,
    /// Search calls attempted, including ones that failed.
    pub tool_invocation_count: u32,
    /// False when the agent worked without real-time search.
    pub real_time_data_available: bool,
}

impl AgentOutcome {
    pub fn new(output: Value, tool_invocation_count: u32) -> Self {
        Self {
            output,
            tool_invocation_count,
            real_time_data_available: true,
        }
    }

    pub fn offline(mut self) -> Self {
        self.real_time_data_available = false;
        self
    }
}

/// Runs an objective against a schema.
///
/// # Errors
///
/// Implementations return `Error::AgentExecution` when no output could be
/// produced at all. Search outages must not surface here; the adapter
/// degrades to offline mode instead.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentOutcome>;
}

/// Registered agents, selected per node by [`AgentRef`].
#[derive(Clone)]
pub struct AgentRoster {
    agents: HashMap<AgentRef, Arc<dyn AgentAdapter>>,
    default: AgentRef,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            default: AgentRef::default(),
        }
    }

    /// Roster with a single agent registered as the default.
    pub fn single(agent: Arc<dyn AgentAdapter>) -> Self {
        let mut roster = Self::new();
        roster.register(AgentRef::default(), agent);
        roster
    }

    pub fn register(&mut self, name: AgentRef, agent: Arc<dyn AgentAdapter>) {
        self.agents.insert(name, agent);
    }

    pub fn with_default(mut self, name: AgentRef) -> Self {
        self.default = name;
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// First registered agent among `allowed`, or the default when the set
    /// is empty.
    pub fn select(&self, allowed: &BTreeSet<AgentRef>) -> Result<(AgentRef, Arc<dyn AgentAdapter>)> {
        if allowed.is_empty() {
            return self
                .agents
                .get(&self.default)
                .map(|a| (self.default.clone(), Arc::clone(a)))
                .ok_or_else(|| {
                    Error::AgentExecution(format!("default agent '{}' is not registered", self.default))
                });
        }

        allowed
            .iter()
            .find_map(|name| self.agents.get(name).map(|a| (name.clone(), Arc::clone(a))))
            .ok_or_else(|| {
                let names: Vec<_> = allowed.iter().map(AgentRef::as_str).collect();
                Error::AgentExecution(format!("no registered agent among: {}", names.join(", ")))
            })
    }
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.agents.keys().map(AgentRef::as_str).collect();
        names.sort_unstable();
        f.debug_struct("AgentRoster")
            .field("agents", &names)
            .field("default", &self.default.as_str())
            .finish()
    }
}
