//! Research flows and the pipeline entry point.
//!
//! Each flow is a function that builds the node graph for one company;
//! the [`Pipeline`] hands it to the executor and turns the execution
//! report into either the target result or a partial-failure report.

use std::sync::Arc;

use serde::Serialize;

use super::aggregator::{
    ScoringAggregator, DATA_PROFESSIONAL_COUNT_KEY, DATA_STACK_KEY, EMPLOYEE_COUNT_KEY,
};
use super::executor::{ExecutionReport, Executor};
use crate::agent::ToolRef;
use crate::config::ScoringConfig;
use crate::core::{FailureCause, NodeId, TaskNode};
use crate::schema::{IcpScore, SchemaRef, TypedResult};
use crate::{slog, slog_warn, Error, Result};

pub const EMPLOYEE_COUNT_NODE: &str = "employee_count";
pub const DATA_PROFESSIONAL_COUNT_NODE: &str = "data_professional_count";
pub const DATA_STACK_NODE: &str = "data_stack";
pub const ICP_SCORE_NODE: &str = "icp_score";

const COMPANY_KEY: &str = "company";

/// Nodes of one flow and the node whose result the flow is for.
#[derive(Debug)]
pub struct FlowGraph {
    pub nodes: Vec<TaskNode>,
    pub target: NodeId,
}

impl FlowGraph {
    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

fn company_name(company: &str) -> Result<&str> {
    let company = company.trim();
    if company.is_empty() {
        return Err(Error::EmptyInput("company name is blank".into()));
    }
    Ok(company)
}

fn research_node(name: &str, objective: String, schema: SchemaRef, company: &str) -> TaskNode {
    TaskNode::new(name, &objective, schema)
        .with_tool(ToolRef::WebSearch)
        .with_context_literal(COMPANY_KEY, company)
}

pub fn employee_count_node(company: &str) -> TaskNode {
    research_node(
        EMPLOYEE_COUNT_NODE,
        format!(
            "Research and report on {}'s employee count:\n\
             - State whether real-time search tools were available.\n\
             - Determine the current total employee count, as a range if sources disagree.\n\
             - Give the annual growth rate and how the headcount compares to the industry, if known.\n\
             - Rate your confidence (0-5) in each figure with a brief explanation.\n\
             - Note any significant events or discrepancies.\n\
             - Provide the date of the most recent source used.",
            company
        ),
        SchemaRef::EmployeeCount,
        company,
    )
}

pub fn data_professional_node(company: &str) -> TaskNode {
    research_node(
        DATA_PROFESSIONAL_COUNT_NODE,
        format!(
            "Find the current number of data professionals at {}.\n\
             - Count data scientists, data engineers, analysts, quantitative researchers and data research teams.\n\
             - Break the count down by role where possible.\n\
             - Rate your confidence (0-5) in the count with a brief explanation.",
            company
        ),
        SchemaRef::DataProfessionalCount,
        company,
    )
}

pub fn data_stack_node(company: &str) -> TaskNode {
    research_node(
        DATA_STACK_NODE,
        format!(
            "Research the data technology stack used at {}. Look for mentions of specific tools, \
             technologies and programming languages commonly used in their data workflows and projects.\n\
             - Rate your confidence (0-5) in each tool you identify.\n\
             - Note any emerging trends or recent changes in the stack.",
            company
        ),
        SchemaRef::DataStack,
        company,
    )
    .with_instructions(
        "Use job descriptions as the primary source. Reference postings for data scientists, \
         data engineers, analysts, quantitative researchers and data research teams.",
    )
}

/// Scoring node fed by the given research nodes.
pub fn score_node(
    company: &str,
    aggregator: Arc<ScoringAggregator>,
    employee: NodeId,
    data_professionals: Option<NodeId>,
    stack: NodeId,
) -> TaskNode {
    let mut node = TaskNode::new(
        ICP_SCORE_NODE,
        &aggregator.scoring_objective(company),
        SchemaRef::IcpScore,
    )
    .with_context_literal(COMPANY_KEY, company)
    .with_context_node(EMPLOYEE_COUNT_KEY, employee)
    .with_context_node(DATA_STACK_KEY, stack);
    if let Some(id) = data_professionals {
        node = node.with_context_node(DATA_PROFESSIONAL_COUNT_KEY, id);
    }
    node.with_hook(aggregator)
}

/// Full ICP flow: three independent research nodes feeding the score.
pub fn icp_graph(company: &str, aggregator: Arc<ScoringAggregator>) -> Result<FlowGraph> {
    let company = company_name(company)?;
    let employee = employee_count_node(company);
    let data_professionals = data_professional_node(company);
    let stack = data_stack_node(company);
    let score = score_node(
        company,
        aggregator,
        employee.id,
        Some(data_professionals.id),
        stack.id,
    );
    let target = score.id;

    Ok(FlowGraph {
        nodes: vec![employee, data_professionals, stack, score],
        target,
    })
}

/// Score from employee count and data stack only.
pub fn quick_score_graph(company: &str, aggregator: Arc<ScoringAggregator>) -> Result<FlowGraph> {
    let company = company_name(company)?;
    let employee = employee_count_node(company);
    let stack = data_stack_node(company);
    let score = score_node(company, aggregator, employee.id, None, stack.id);
    let target = score.id;

    Ok(FlowGraph {
        nodes: vec![employee, stack, score],
        target,
    })
}

/// Headcount report on its own.
pub fn headcount_graph(company: &str) -> Result<FlowGraph> {
    let employee = employee_count_node(company_name(company)?);
    let target = employee.id;
    Ok(FlowGraph {
        nodes: vec![employee],
        target,
    })
}

/// A resolved node's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedResult {
    pub node: NodeId,
    pub name: String,
    pub tool_invocation_count: u32,
    pub result: TypedResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFailure {
    pub node: NodeId,
    pub name: String,
    pub cause: FailureCause,
}

/// What failed and what still came through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialFailureReport {
    pub company: String,
    pub failures: Vec<NodeFailure>,
    pub resolved: Vec<NamedResult>,
}

impl PartialFailureReport {
    pub fn failure(&self, name: &str) -> Option<&NodeFailure> {
        self.failures.iter().find(|f| f.name == name)
    }

    pub fn resolved(&self, name: &str) -> Option<&NamedResult> {
        self.resolved.iter().find(|r| r.name == name)
    }

    /// True when not a single node produced a result.
    pub fn is_total_failure(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every node resolved. `result` is the flow's target.
    Complete {
        company: String,
        result: TypedResult,
        resolved: Vec<NamedResult>,
    },
    Partial(PartialFailureReport),
}

impl PipelineOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, PipelineOutcome::Complete { .. })
    }

    pub fn result(&self) -> Option<&TypedResult> {
        match self {
            PipelineOutcome::Complete { result, .. } => Some(result),
            PipelineOutcome::Partial(_) => None,
        }
    }

    pub fn icp_score(&self) -> Option<&IcpScore> {
        self.result().and_then(TypedResult::as_icp_score)
    }

    pub fn partial(&self) -> Option<&PartialFailureReport> {
        match self {
            PipelineOutcome::Partial(report) => Some(report),
            PipelineOutcome::Complete { .. } => None,
        }
    }

    fn from_report(company: &str, target: &NodeId, report: &ExecutionReport) -> Self {
        let resolved: Vec<NamedResult> = report
            .nodes()
            .iter()
            .filter_map(|n| {
                n.result.as_ref().map(|r| NamedResult {
                    node: n.id,
                    name: n.name.clone(),
                    tool_invocation_count: n.tool_invocation_count,
                    result: r.clone(),
                })
            })
            .collect();

        if report.is_success() {
            if let Some(result) = report.result(target) {
                return PipelineOutcome::Complete {
                    company: company.to_string(),
                    result: result.clone(),
                    resolved,
                };
            }
        }

        let failures = report
            .failures()
            .into_iter()
            .filter_map(|n| {
                n.failure().map(|cause| NodeFailure {
                    node: n.id,
                    name: n.name.clone(),
                    cause: cause.clone(),
                })
            })
            .collect();

        PipelineOutcome::Partial(PartialFailureReport {
            company: company.to_string(),
            failures,
            resolved,
        })
    }
}

/// Runs the research flows on one executor.
pub struct Pipeline {
    executor: Executor,
    full: Arc<ScoringAggregator>,
    quick: Arc<ScoringAggregator>,
}

impl Pipeline {
    pub fn new(executor: Executor, scoring: &ScoringConfig) -> Self {
        let aggregator = ScoringAggregator::new(scoring);
        Self {
            executor,
            quick: Arc::new(aggregator.clone().without_data_professionals()),
            full: Arc::new(aggregator),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Employee count, data professionals and data stack, then the score.
    ///
    /// # Errors
    ///
    /// Only for conditions that stop the run before any node executes
    /// (blank company name, invalid graph). Node failures come back as
    /// [`PipelineOutcome::Partial`].
    pub async fn run_icp_pipeline(&self, company: &str) -> Result<PipelineOutcome> {
        let flow = icp_graph(company, self.full.clone())?;
        self.run_flow(company, flow).await
    }

    pub async fn run_quick_score(&self, company: &str) -> Result<PipelineOutcome> {
        let flow = quick_score_graph(company, self.quick.clone())?;
        self.run_flow(company, flow).await
    }

    pub async fn run_headcount(&self, company: &str) -> Result<PipelineOutcome> {
        let flow = headcount_graph(company)?;
        self.run_flow(company, flow).await
    }

    async fn run_flow(&self, company: &str, flow: FlowGraph) -> Result<PipelineOutcome> {
        let company = company.trim();
        slog!("Pipeline: {} nodes for '{}'", flow.nodes.len(), company);

        let report = self.executor.run(flow.nodes).await?;
        let outcome = PipelineOutcome::from_report(company, &flow.target, &report);

        match &outcome {
            PipelineOutcome::Complete { .. } => {
                slog!(
                    "Pipeline: '{}' complete, {} tool calls",
                    company,
                    report.total_tool_invocations()
                );
            }
            PipelineOutcome::Partial(partial) => {
                slog_warn!(
                    "Pipeline: '{}' partial, {} failed, {} resolved",
                    company,
                    partial.failures.len(),
                    partial.resolved.len()
                );
            }
        }
        Ok(outcome)
    }
}
