//! Failure propagation across the ICP graph.

use std::sync::Arc;

use scout::core::FailureCause;
use scout::orchestration::{
    PipelineOutcome, DATA_PROFESSIONAL_COUNT_NODE, DATA_STACK_NODE, EMPLOYEE_COUNT_NODE,
    ICP_SCORE_NODE,
};
use scout::schema::SchemaRef;

use crate::fixtures::{
    acme_model, data_professionals_json, employee_json, research_pipeline, ScriptedModel,
    ScriptedSearch, COMPANY,
};

/// Test: a failed data-stack node takes the score down, nothing else
/// Given a model that never answers the data-stack node with JSON
/// When the full pipeline runs
/// Then headcount and data team still resolve
/// And the score fails naming data_stack without ever being prompted
#[tokio::test]
async fn test_data_stack_failure_propagates_to_score_only() {
    let model = Arc::new(
        acme_model(&[]).with(SchemaRef::DataStack, |_| "I could not find anything useful.".to_string()),
    );
    let outcome = research_pipeline(model.clone(), Arc::new(ScriptedSearch::new()))
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();

    let report = match &outcome {
        PipelineOutcome::Partial(report) => report,
        other => panic!("Expected Partial, got {:?}", other),
    };

    assert!(report.resolved(EMPLOYEE_COUNT_NODE).is_some());
    assert!(report.resolved(DATA_PROFESSIONAL_COUNT_NODE).is_some());
    assert!(report.resolved(DATA_STACK_NODE).is_none());
    assert!(report.resolved(ICP_SCORE_NODE).is_none());

    let stack = report.failure(DATA_STACK_NODE).unwrap();
    assert!(
        matches!(stack.cause, FailureCause::AgentExecution { ref message } if message.contains("malformed")),
        "got {:?}",
        stack.cause
    );

    let score = report.failure(ICP_SCORE_NODE).unwrap();
    let (upstream_id, upstream_name) = score.cause.upstream().unwrap();
    assert_eq!(upstream_name, DATA_STACK_NODE);
    assert_eq!(upstream_id, stack.node);

    assert!(model.prompts_for(SchemaRef::IcpScore).is_empty());
    assert!(outcome.icp_score().is_none());
    assert!(!report.is_total_failure());
}

#[tokio::test]
async fn test_two_branches_fail_independently() {
    let model = Arc::new(
        ScriptedModel::new()
            .answering(SchemaRef::EmployeeCount, employee_json(500, 5))
            .answering(SchemaRef::DataProfessionalCount, data_professionals_json(40, 3)),
    );
    // No script for the data stack or the score: the stack node errors.
    let outcome = research_pipeline(model, Arc::new(ScriptedSearch::new()))
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();

    let report = outcome.partial().unwrap();
    assert_eq!(report.resolved.len(), 2);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failure(ICP_SCORE_NODE).unwrap().cause.upstream().is_some());
}

#[tokio::test]
async fn test_every_branch_failing_is_total_failure() {
    let outcome = research_pipeline(Arc::new(ScriptedModel::new()), Arc::new(ScriptedSearch::new()))
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();

    let report = outcome.partial().unwrap();
    assert!(report.is_total_failure());
    assert_eq!(report.failures.len(), 4);

    // The score is skipped on account of the first research node that failed.
    let score = report.failure(ICP_SCORE_NODE).unwrap();
    assert!(matches!(score.cause, FailureCause::Upstream { .. }));
}

#[tokio::test]
async fn test_blank_company_aborts() {
    let err = research_pipeline(Arc::new(ScriptedModel::new()), Arc::new(ScriptedSearch::new()))
        .run_icp_pipeline("   ")
        .await
        .unwrap_err();
    assert!(err.is_fatal_to_pipeline());
}
