//! Task node model for the research DAG.
//!
//! A node is one research question handed to an agent. It declares what it
//! needs in its `context`; entries that point at other nodes become the
//! dependency edges of the graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::{AgentRef, ToolRef};
use crate::schema::{FieldViolation, SchemaRef, TypedResult};
use crate::{Error, Result};

/// Unique identifier for a node within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID, for log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Why a node ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureCause {
    /// Agent output still broke the schema after the retry.
    SchemaValidation {
        schema: SchemaRef,
        violations: Vec<FieldViolation>,
    },
    /// The agent produced no usable result.
    AgentExecution { message: String },
    /// Required upstream inputs were missing.
    IncompleteInput { missing: Vec<String> },
    /// A direct or transitive dependency failed; the node never ran.
    Upstream { node: NodeId, name: String },
    Other { message: String },
}

impl FailureCause {
    /// Rebuild an error value carrying the same information.
    pub fn to_error(&self) -> Error {
        match self {
            FailureCause::SchemaValidation { schema, violations } => Error::SchemaValidation {
                schema: *schema,
                violations: violations.clone(),
            },
            FailureCause::AgentExecution { message } => Error::AgentExecution(message.clone()),
            FailureCause::IncompleteInput { missing } => Error::IncompleteInput {
                missing: missing.clone(),
            },
            FailureCause::Upstream { node, name } => Error::UpstreamFailed {
                node: *node,
                name: name.clone(),
            },
            FailureCause::Other { message } => Error::Validation(message.clone()),
        }
    }

    /// The originating node when this is an upstream failure.
    pub fn upstream(&self) -> Option<(NodeId, &str)> {
        match self {
            FailureCause::Upstream { node, name } => Some((*node, name.as_str())),
            _ => None,
        }
    }
}

impl From<&Error> for FailureCause {
    fn from(err: &Error) -> Self {
        match err {
            Error::SchemaValidation { schema, violations } => FailureCause::SchemaValidation {
                schema: *schema,
                violations: violations.clone(),
            },
            Error::AgentExecution(message) => FailureCause::AgentExecution {
                message: message.clone(),
            },
            Error::IncompleteInput { missing } => FailureCause::IncompleteInput {
                missing: missing.clone(),
            },
            Error::UpstreamFailed { node, name } => FailureCause::Upstream {
                node: *node,
                name: name.clone(),
            },
            Error::NodeExecution { cause, .. } => FailureCause::from(cause.as_ref()),
            other => FailureCause::Other {
                message: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NodeState {
    #[default]
    Pending,
    Running,
    Resolved,
    Failed { cause: FailureCause },
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Resolved | NodeState::Failed { .. })
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Pending => write!(f, "pending"),
            NodeState::Running => write!(f, "running"),
            NodeState::Resolved => write!(f, "resolved"),
            NodeState::Failed { cause } => write!(f, "failed: {}", cause),
        }
    }
}

/// A declared context entry: another node's result or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Node(NodeId),
    Literal(Value),
}

/// A context entry after upstream substitution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolvedValue {
    Result(TypedResult),
    Literal(Value),
}

/// Context handed to the agent, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedContext(BTreeMap<String, ResolvedValue>);

impl ResolvedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_result(&mut self, key: &str, result: TypedResult) {
        self.0.insert(key.to_string(), ResolvedValue::Result(result));
    }

    pub fn insert_literal(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), ResolvedValue::Literal(value));
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.0.get(key)
    }

    pub fn result(&self, key: &str) -> Option<&TypedResult> {
        match self.0.get(key) {
            Some(ResolvedValue::Result(r)) => Some(r),
            _ => None,
        }
    }

    pub fn literal(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(ResolvedValue::Literal(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when any upstream result was produced without real-time data.
    pub fn any_offline(&self) -> bool {
        self.0.values().any(|v| match v {
            ResolvedValue::Result(r) => !r.real_time_data_available(),
            ResolvedValue::Literal(_) => false,
        })
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Per-node extension points run by the executor around the agent call.
///
/// `prepare` may add or check context before the agent sees it; `finalize`
/// may normalise the validated result. Neither may touch node state.
pub trait NodeHook: Send + Sync {
    fn prepare(&self, _context: &mut ResolvedContext) -> Result<()> {
        Ok(())
    }

    fn finalize(&self, result: TypedResult) -> Result<TypedResult> {
        Ok(result)
    }
}

/// A single unit of research in the DAG.
#[derive(Clone)]
pub struct TaskNode {
    pub id: NodeId,
    /// Stable human-readable name, e.g. "employee_count".
    pub name: String,
    pub objective: String,
    pub instructions: Option<String>,
    pub tools: BTreeSet<ToolRef>,
    /// Agents allowed to run the node. Empty means the default agent.
    pub agents: BTreeSet<AgentRef>,
    pub context: BTreeMap<String, ContextValue>,
    pub result_schema: SchemaRef,
    pub state: NodeState,
    /// Set only while `state` is `Resolved`.
    pub result: Option<TypedResult>,
    pub tool_invocation_count: u32,
    /// Agent calls made, including the schema retry.
    pub attempts: u32,
    pub hook: Option<Arc<dyn NodeHook>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskNode {
    pub fn new(name: &str, objective: &str, result_schema: SchemaRef) -> Self {
        Self {
            id: NodeId::new(),
            name: name.to_string(),
            objective: objective.to_string(),
            instructions: None,
            tools: BTreeSet::new(),
            agents: BTreeSet::new(),
            context: BTreeMap::new(),
            result_schema,
            state: NodeState::Pending,
            result: None,
            tool_invocation_count: 0,
            attempts: 0,
            hook: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_tool(mut self, tool: ToolRef) -> Self {
        self.tools.insert(tool);
        self
    }

    pub fn with_agent(mut self, agent: AgentRef) -> Self {
        self.agents.insert(agent);
        self
    }

    /// Declare that `key` is filled from another node's result.
    pub fn with_context_node(mut self, key: &str, node: NodeId) -> Self {
        self.context
            .insert(key.to_string(), ContextValue::Node(node));
        self
    }

    pub fn with_context_literal(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context
            .insert(key.to_string(), ContextValue::Literal(value.into()));
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn NodeHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Nodes referenced from `context`, deduplicated, in key order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        self.context
            .values()
            .filter_map(|v| match v {
                ContextValue::Node(id) => Some(*id),
                ContextValue::Literal(_) => None,
            })
            .filter(|id| seen.insert(*id))
            .collect()
    }

    pub fn start(&mut self) {
        self.state = NodeState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn resolve(&mut self, result: TypedResult) {
        self.state = NodeState::Resolved;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, cause: FailureCause) {
        self.state = NodeState::Failed { cause };
        self.result = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, NodeState::Resolved)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn failure(&self) -> Option<&FailureCause> {
        match &self.state {
            NodeState::Failed { cause } => Some(cause),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TaskNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskNode")
            .field("id", &self.id.short())
            .field("name", &self.name)
            .field("schema", &self.result_schema)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies().len())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
