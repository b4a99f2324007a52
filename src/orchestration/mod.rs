//! Orchestration layer.
//!
//! The executor drives a task graph through a bounded worker pool, the
//! scoring aggregator prepares and tidies the ICP node, and the flows
//! module builds the research graphs and runs them as a pipeline.

mod aggregator;
mod executor;
mod flows;
mod pool;

pub use aggregator::ScoringAggregator;
pub use executor::{ExecutionReport, Executor, ExecutorConfig, ExecutorEvent};
pub use flows::{
    data_professional_node, data_stack_node, employee_count_node, headcount_graph, icp_graph,
    quick_score_graph, score_node, FlowGraph, NamedResult, NodeFailure, PartialFailureReport,
    Pipeline, PipelineOutcome, DATA_PROFESSIONAL_COUNT_NODE, DATA_STACK_NODE,
    EMPLOYEE_COUNT_NODE, ICP_SCORE_NODE,
};
pub use pool::WorkerPool;
