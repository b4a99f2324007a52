//! DAG executor.
//!
//! Drives every node of a [`TaskGraph`] to a terminal state. Ready nodes
//! are dispatched concurrently up to the worker pool's capacity; each
//! agent reply is validated against the schema registry, with one
//! re-prompt on schema violations. A failed node takes all of its
//! transitive dependents down with it without running them, while
//! independent branches keep going.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;

use super::pool::WorkerPool;
use crate::agent::{AgentAdapter, AgentRequest, AgentRoster};
use crate::config::Config;
use crate::core::{FailureCause, NodeHook, NodeId, NodeState, TaskGraph, TaskNode};
use crate::schema::{SchemaRef, SchemaRegistry, TypedResult};
use crate::{slog, slog_debug, slog_error, slog_warn, Error, Result};

const OFFLINE_NOTE: &str = "researched without real-time data; confidence lowered";
const OFFLINE_INPUT_NOTE: &str = "derived from inputs researched without real-time data; confidence lowered";

/// Progress notifications, sent in the order things happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    NodeStarted {
        node: NodeId,
        name: String,
    },
    NodeResolved {
        node: NodeId,
        name: String,
        tool_invocation_count: u32,
        attempts: u32,
    },
    NodeFailed {
        node: NodeId,
        name: String,
        cause: String,
    },
    /// Marked failed without running because `upstream` failed.
    NodeSkipped {
        node: NodeId,
        name: String,
        upstream: String,
    },
    RunComplete {
        resolved: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_concurrency: usize,
    /// Re-prompts after a schema violation, capped at 1.
    pub schema_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            schema_retries: 1,
        }
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            schema_retries: config.schema_retries,
        }
    }
}

/// Owned inputs for one in-flight node.
struct Job {
    node: NodeId,
    name: String,
    schema: SchemaRef,
    agent: Arc<dyn AgentAdapter>,
    registry: Arc<SchemaRegistry>,
    hook: Option<Arc<dyn NodeHook>>,
    request: AgentRequest,
    retries: u32,
}

/// What came back from one in-flight node.
struct NodeRun {
    node: NodeId,
    attempts: u32,
    tool_invocation_count: u32,
    result: Result<TypedResult>,
}

pub struct Executor {
    roster: AgentRoster,
    registry: Arc<SchemaRegistry>,
    config: ExecutorConfig,
    event_tx: Option<mpsc::Sender<ExecutorEvent>>,
}

impl Executor {
    pub fn new(roster: AgentRoster, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            roster,
            registry,
            config: ExecutorConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = ExecutorConfig {
            max_concurrency: config.max_concurrency.max(1),
            schema_retries: config.schema_retries.min(1),
        };
        self
    }

    /// Send progress events to `tx`. Events that do not fit are dropped.
    pub fn with_events(mut self, tx: mpsc::Sender<ExecutorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> ExecutorConfig {
        self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Run every node to a terminal state.
    ///
    /// # Errors
    ///
    /// Only configuration problems abort the run, before any node executes:
    /// `EmptyInput` for no nodes, `UnknownNode` for a dangling context
    /// reference, `CyclicDependency` for a cycle, `Validation` for a node that
    /// is not pending. Node failures are recorded
    /// in the report instead.
    pub async fn run(&self, nodes: Vec<TaskNode>) -> Result<ExecutionReport> {
        if nodes.is_empty() {
            return Err(Error::EmptyInput("no task nodes to execute".to_string()));
        }

        if let Some(node) = nodes.iter().find(|n| n.state != NodeState::Pending) {
            return Err(Error::Validation(format!(
                "node '{}' ({}) is {}, expected pending",
                node.name,
                node.id.short(),
                node.state
            )));
        }

        let mut graph = TaskGraph::from_nodes(nodes)?;
        let order: Vec<NodeId> = graph.topological_order()?.iter().map(|n| n.id).collect();
        slog!(
            "Executor: running {} nodes ({} edges), max_concurrency={}",
            graph.len(),
            graph.edge_count(),
            self.config.max_concurrency
        );

        let mut pool = WorkerPool::new(self.config.max_concurrency);
        let mut in_flight = FuturesUnordered::new();

        loop {
            for id in graph.ready_nodes() {
                if !pool.has_capacity() {
                    break;
                }
                match self.prepare(&graph, &id) {
                    Ok(job) => {
                        pool.acquire(id)?;
                        let name = job.name.clone();
                        if let Some(node) = graph.node_mut(&id) {
                            node.start();
                        }
                        slog_debug!("Executor: dispatching '{}' ({})", name, id.short());
                        self.emit(ExecutorEvent::NodeStarted { node: id, name });
                        in_flight.push(drive(job));
                    }
                    Err(e) => self.fail_node(&mut graph, &id, &e),
                }
            }

            let Some(run) = in_flight.next().await else {
                break;
            };
            pool.release(&run.node);
            self.finish_node(&mut graph, run);
        }

        let report = ExecutionReport::new(graph.into_nodes(), &order);
        slog!(
            "Executor: run complete, {} resolved, {} failed, {} searches",
            report.resolved_count(),
            report.failures().len(),
            report.total_tool_invocations()
        );
        self.emit(ExecutorEvent::RunComplete {
            resolved: report.resolved_count(),
            failed: report.failures().len(),
        });
        Ok(report)
    }

    /// Substitute context, run the node's prepare hook, pick its agent.
    fn prepare(&self, graph: &TaskGraph, id: &NodeId) -> Result<Job> {
        let node = graph
            .node(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))?;

        let mut context = graph.resolved_context(id)?;
        if let Some(hook) = &node.hook {
            hook.prepare(&mut context)?;
        }
        let (agent_name, agent) = self.roster.select(&node.agents)?;
        slog_debug!(
            "Executor: '{}' gets agent '{}' with {} context entries",
            node.name,
            agent_name,
            context.len()
        );

        Ok(Job {
            node: node.id,
            name: node.name.clone(),
            schema: node.result_schema,
            agent,
            registry: Arc::clone(&self.registry),
            hook: node.hook.clone(),
            request: AgentRequest::for_node(node, context),
            retries: self.config.schema_retries,
        })
    }

    fn finish_node(&self, graph: &mut TaskGraph, run: NodeRun) {
        let id = run.node;
        match run.result {
            Ok(result) => {
                let Some(node) = graph.node_mut(&id) else {
                    return;
                };
                node.tool_invocation_count = run.tool_invocation_count;
                node.attempts = run.attempts;
                node.resolve(result);
                let name = node.name.clone();
                slog!(
                    "Executor: '{}' resolved ({} searches, {} attempts)",
                    name,
                    run.tool_invocation_count,
                    run.attempts
                );
                self.emit(ExecutorEvent::NodeResolved {
                    node: id,
                    name,
                    tool_invocation_count: run.tool_invocation_count,
                    attempts: run.attempts,
                });
            }
            Err(e) => {
                if let Some(node) = graph.node_mut(&id) {
                    node.tool_invocation_count = run.tool_invocation_count;
                    node.attempts = run.attempts;
                }
                self.fail_node(graph, &id, &e);
            }
        }
    }

    /// Mark `id` failed and every downstream node failed with it.
    fn fail_node(&self, graph: &mut TaskGraph, id: &NodeId, err: &Error) {
        let Some(node) = graph.node_mut(id) else {
            return;
        };
        node.fail(FailureCause::from(err));
        let name = node.name.clone();
        slog_error!("Executor: '{}' failed: {}", name, err);
        self.emit(ExecutorEvent::NodeFailed {
            node: *id,
            name: name.clone(),
            cause: err.to_string(),
        });

        for downstream in graph.transitive_dependents(id) {
            let Some(dependent) = graph.node_mut(&downstream) else {
                continue;
            };
            if dependent.is_terminal() {
                continue;
            }
            dependent.fail(FailureCause::Upstream {
                node: *id,
                name: name.clone(),
            });
            let skipped = dependent.name.clone();
            slog_warn!("Executor: skipping '{}' because '{}' failed", skipped, name);
            self.emit(ExecutorEvent::NodeSkipped {
                node: downstream,
                name: skipped,
                upstream: name.clone(),
            });
        }
    }

    /// Never waits on the receiver; a full channel drops the event.
    fn emit(&self, event: ExecutorEvent) {
        let Some(tx) = &self.event_tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                slog_warn!("Executor: event channel full, dropped {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Run one node's agent, validating and retrying once on schema errors.
async fn drive(job: Job) -> NodeRun {
    let Job {
        node,
        name,
        schema,
        agent,
        registry,
        hook,
        mut request,
        retries,
    } = job;
    let mut attempts = 0u32;
    let mut tool_invocation_count = 0u32;

    let result = loop {
        attempts += 1;
        let outcome = match agent.execute(&request).await {
            Ok(outcome) => outcome,
            Err(e) => break Err(e),
        };
        tool_invocation_count += outcome.tool_invocation_count;

        let checked = validate(
            &registry,
            schema,
            hook.as_deref(),
            &request,
            outcome.output,
            outcome.real_time_data_available,
        );
        match checked {
            Ok(result) => break Ok(result),
            Err(Error::SchemaValidation { violations, .. }) if attempts <= retries => {
                slog_warn!(
                    "Executor: '{}' broke the {} schema on attempt {}, re-prompting: {} violations",
                    name,
                    schema,
                    attempts,
                    violations.len()
                );
                request = request.with_feedback(violations);
            }
            Err(e) => break Err(e),
        }
    };

    NodeRun {
        node,
        attempts,
        tool_invocation_count,
        result,
    }
}

/// Schema-check a reply and lower its confidence when it was produced
/// without real-time data, whichever side says so.
fn validate(
    registry: &SchemaRegistry,
    schema: SchemaRef,
    hook: Option<&dyn NodeHook>,
    request: &AgentRequest,
    output: serde_json::Value,
    real_time_data_available: bool,
) -> Result<TypedResult> {
    let mut result = registry.validate(schema, &output)?;

    if !real_time_data_available || !result.real_time_data_available() {
        result.degrade_for_offline(OFFLINE_NOTE);
    } else if request.context.any_offline() {
        result.degrade_for_offline(OFFLINE_INPUT_NOTE);
    }

    if let Some(hook) = hook {
        result = hook.finalize(result)?;
        registry.check(&result, schema)?;
    }
    Ok(result)
}

/// Terminal state of every node after a run, in dependency order.
#[derive(Debug)]
pub struct ExecutionReport {
    nodes: Vec<TaskNode>,
    index: HashMap<NodeId, usize>,
}

impl ExecutionReport {
    fn new(mut nodes: Vec<TaskNode>, order: &[NodeId]) -> Self {
        let rank: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        nodes.sort_by_key(|n| rank.get(&n.id).copied().unwrap_or(usize::MAX));
        let index = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        Self { nodes, index }
    }

    /// Every node, dependencies before dependents.
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_by_name(&self, name: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn state(&self, id: &NodeId) -> Option<&NodeState> {
        self.node(id).map(|n| &n.state)
    }

    pub fn result(&self, id: &NodeId) -> Option<&TypedResult> {
        self.node(id).and_then(|n| n.result.as_ref())
    }

    /// Results of every resolved node, keyed by node identity.
    pub fn results(&self) -> BTreeMap<NodeId, &TypedResult> {
        self.nodes
            .iter()
            .filter_map(|n| n.result.as_ref().map(|r| (n.id, r)))
            .collect()
    }

    pub fn failures(&self) -> Vec<&TaskNode> {
        self.nodes.iter().filter(|n| n.failure().is_some()).collect()
    }

    pub fn resolved_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_resolved()).count()
    }

    pub fn is_success(&self) -> bool {
        self.nodes.iter().all(TaskNode::is_resolved)
    }

    /// The node's result, or its failure wrapped with its identity.
    pub fn require(&self, id: &NodeId) -> Result<&TypedResult> {
        let node = self
            .node(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))?;
        match (&node.state, &node.result) {
            (NodeState::Resolved, Some(result)) => Ok(result),
            (NodeState::Failed { cause }, _) => Err(Error::NodeExecution {
                node: node.id,
                name: node.name.clone(),
                cause: Box::new(cause.to_error()),
            }),
            (state, _) => Err(Error::NodeExecution {
                node: node.id,
                name: node.name.clone(),
                cause: Box::new(Error::Validation(format!("node ended in state {}", state))),
            }),
        }
    }

    pub fn total_tool_invocations(&self) -> u32 {
        self.nodes.iter().map(|n| n.tool_invocation_count).sum()
    }
}
