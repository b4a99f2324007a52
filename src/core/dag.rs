//! Dependency graph over task nodes.
//!
//! Edges are derived from each node's `context`: an entry that names another
//! node adds an edge from that node to the one declaring it, weighted with
//! the context key. The graph owns the nodes for the length of a run.

use std::collections::HashMap;

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;

use super::task::{ContextValue, NodeId, NodeState, ResolvedContext, TaskNode};
use crate::{Error, Result};

/// The node dependency graph.
///
/// Nodes are [`TaskNode`]s; an edge `a -> b` labelled `key` means `b`
/// receives `a`'s result under `key`.
pub struct TaskGraph {
    graph: DiGraph<TaskNode, String>,
    index: HashMap<NodeId, NodeIndex>,
}

impl TaskGraph {
    /// Build a graph from a set of nodes, wiring edges from their context.
    ///
    /// # Errors
    /// - `Error::UnknownNode` if a context entry references a node that is
    ///   not part of the set.
    /// - `Error::CyclicDependency` if the references form a cycle. Nothing
    ///   has executed at that point.
    pub fn from_nodes(nodes: Vec<TaskNode>) -> Result<Self> {
        let mut dag = Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        };

        for node in nodes {
            if dag.index.contains_key(&node.id) {
                return Err(Error::Validation(format!(
                    "Node {} ('{}') added twice",
                    node.id, node.name
                )));
            }
            let id = node.id;
            let index = dag.graph.add_node(node);
            dag.index.insert(id, index);
        }

        let mut edges = Vec::new();
        for node in dag.graph.node_weights() {
            for (key, value) in &node.context {
                if let ContextValue::Node(dep) = value {
                    edges.push((*dep, node.id, key.clone()));
                }
            }
        }

        for (from, to, key) in edges {
            dag.add_dependency(&from, &to, key)?;
        }

        Ok(dag)
    }

    fn add_dependency(&mut self, from: &NodeId, to: &NodeId, key: String) -> Result<()> {
        let to_index = self
            .index
            .get(to)
            .copied()
            .ok_or_else(|| Error::UnknownNode(to.to_string()))?;

        let from_index = self.index.get(from).copied().ok_or_else(|| {
            let name = self.graph[to_index].name.as_str();
            Error::UnknownNode(format!("{} (context '{}' of '{}')", from, key, name))
        })?;

        self.graph.add_edge(from_index, to_index, key);

        if is_cyclic_directed(&self.graph) {
            return Err(Error::CyclicDependency {
                node: self.graph[to_index].name.clone(),
            });
        }

        Ok(())
    }

    pub fn node(&self, id: &NodeId) -> Option<&TaskNode> {
        self.index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut TaskNode> {
        let index = *self.index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.graph.node_weights()
    }

    /// Nodes the given node reads from.
    pub fn dependencies(&self, id: &NodeId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Nodes that read the given node's result directly.
    pub fn dependents(&self, id: &NodeId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &NodeId, direction: Direction) -> Vec<&TaskNode> {
        self.index
            .get(id)
            .map(|&index| {
                self.graph
                    .neighbors_directed(index, direction)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every node reachable downstream of `id`, excluding `id` itself.
    pub fn transitive_dependents(&self, id: &NodeId) -> Vec<NodeId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            if index != start {
                out.push(self.graph[index].id);
            }
        }
        out
    }

    /// Pending nodes whose dependencies have all resolved.
    pub fn ready_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&index| {
                let node = &self.graph[index];
                node.state == NodeState::Pending
                    && self
                        .graph
                        .neighbors_directed(index, Direction::Incoming)
                        .all(|dep| self.graph[dep].is_resolved())
            })
            .map(|index| self.graph[index].id)
            .collect()
    }

    /// Substitute upstream results into a node's declared context.
    ///
    /// Literal entries pass through unchanged.
    ///
    /// # Errors
    /// `Error::IncompleteInput` naming every context key whose node has no
    /// result yet.
    pub fn resolved_context(&self, id: &NodeId) -> Result<ResolvedContext> {
        let node = self
            .node(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))?;

        let mut context = ResolvedContext::new();
        let mut missing = Vec::new();
        for (key, value) in &node.context {
            match value {
                ContextValue::Literal(v) => context.insert_literal(key, v.clone()),
                ContextValue::Node(dep) => match self.node(dep).and_then(|n| n.result.clone()) {
                    Some(result) => context.insert_result(key, result),
                    None => missing.push(key.clone()),
                },
            }
        }

        if missing.is_empty() {
            Ok(context)
        } else {
            Err(Error::IncompleteInput { missing })
        }
    }

    /// Nodes ordered so each comes after everything it depends on.
    pub fn topological_order(&self) -> Result<Vec<&TaskNode>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| Error::CyclicDependency {
            node: self
                .graph
                .node_weight(cycle.node_id())
                .map(|n| n.name.clone())
                .unwrap_or_else(|| "unknown".to_string()),
        })?;

        Ok(sorted
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }

    pub fn all_terminal(&self) -> bool {
        self.graph.node_weights().all(TaskNode::is_terminal)
    }

    /// Consume the graph, returning nodes in insertion order.
    pub fn into_nodes(self) -> Vec<TaskNode> {
        let (nodes, _) = self.graph.into_nodes_edges();
        nodes.into_iter().map(|n| n.weight).collect()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("nodes", &self.len())
            .field("edges", &self.edge_count())
            .finish()
    }
}
