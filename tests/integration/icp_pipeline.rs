//! Full ICP pipeline through the research agent with scripted doubles.

use std::sync::Arc;

use serde_json::json;

use scout::config::ScoringConfig;
use scout::orchestration::{icp_graph, NamedResult, PipelineOutcome, ScoringAggregator};
use scout::schema::{Confidence, SchemaRef, TotalCount, TypedResult};

use crate::fixtures::{
    acme_model, final_reply, prompt_context, research_executor, research_pipeline,
    score_from_context, ScriptedSearch, COMPANY,
};

const ACME_STACK: &[(&str, u8)] = &[("Python", 5), ("Snowflake", 4), ("Apache Kafka", 4), ("Tableau", 3)];

fn resolved(outcome: &PipelineOutcome) -> &[NamedResult] {
    match outcome {
        PipelineOutcome::Complete { resolved, .. } => resolved,
        PipelineOutcome::Partial(report) => panic!("Expected Complete, got {:?}", report),
    }
}

fn by_name<'a>(results: &'a [NamedResult], name: &str) -> &'a NamedResult {
    results.iter().find(|r| r.name == name).unwrap()
}

/// Test: Acme Co end to end
/// Given a model that finds 500 employees with confidence 5
/// When the full pipeline runs
/// Then the employee count carries that figure and the score is in range
#[tokio::test]
async fn test_acme_full_pipeline() {
    let model = Arc::new(acme_model(ACME_STACK));
    let search = Arc::new(ScriptedSearch::new());
    let outcome = research_pipeline(model.clone(), search.clone())
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();

    let results = resolved(&outcome);
    assert_eq!(results.len(), 4);

    let employees = by_name(results, "employee_count")
        .result
        .as_employee_count()
        .unwrap();
    assert_eq!(employees.total.value, Some(TotalCount::Exact(500)));
    assert_eq!(employees.total.confidence, Confidence::MAX);
    assert!(employees.real_time_data_available);

    let score = outcome.icp_score().unwrap();
    assert!(score.score <= 100);
    assert_eq!(score.key_tools, vec!["python", "snowflake", "kafka"]);

    // One search per research node, none for scoring.
    assert_eq!(search.calls(), 3);
    for name in ["employee_count", "data_professional_count", "data_stack"] {
        assert_eq!(by_name(results, name).tool_invocation_count, 1, "{}", name);
    }
    assert_eq!(by_name(results, "icp_score").tool_invocation_count, 0);
}

/// Test: the scoring node sees every upstream result
#[tokio::test]
async fn test_score_prompt_receives_packaged_context() {
    let model = Arc::new(acme_model(ACME_STACK));
    research_pipeline(model.clone(), Arc::new(ScriptedSearch::new()))
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();

    let prompts = model.prompts_for(SchemaRef::IcpScore);
    assert_eq!(prompts.len(), 1);
    let context = prompt_context(&prompts[0]);

    assert_eq!(context["company"], COMPANY);
    assert_eq!(context["employee_count"]["schema"], "employee_count");
    assert_eq!(context["data_professional_count"]["schema"], "data_professional_count");
    assert_eq!(context["data_stack"]["schema"], "data_stack");
    assert_eq!(context["priority_tools_found"], json!(["python", "snowflake", "kafka"]));
    assert_eq!(context["factor_weights"]["tech_stack_factor"], 0.4);
    assert!(prompts[0].contains("No tools are needed"));
}

/// Test: richer stacks score higher
/// Given two runs that differ only in the data stack
/// Then three priority tools give a larger tech factor than none
#[tokio::test]
async fn test_priority_tools_raise_tech_factor() {
    let rich = research_pipeline(Arc::new(acme_model(ACME_STACK)), Arc::new(ScriptedSearch::new()))
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();
    let bare = research_pipeline(
        Arc::new(acme_model(&[("Tableau", 4), ("Excel", 5)])),
        Arc::new(ScriptedSearch::new()),
    )
    .run_icp_pipeline(COMPANY)
    .await
    .unwrap();

    let rich = rich.icp_score().unwrap();
    let bare = bare.icp_score().unwrap();
    assert!(rich.tech_stack_factor > bare.tech_stack_factor);
    assert!(rich.score > bare.score);
    assert_eq!(bare.tech_stack_factor, 0.0);
    assert!(bare.key_tools.is_empty());
}

/// Test: identical inputs give identical results
#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let model = Arc::new(acme_model(ACME_STACK));
    let search = Arc::new(ScriptedSearch::new());
    let pipeline = research_pipeline(model, search);

    let first = pipeline.run_icp_pipeline(COMPANY).await.unwrap();
    let second = pipeline.run_icp_pipeline(COMPANY).await.unwrap();

    let strip = |outcome: &PipelineOutcome| -> Vec<(String, u32, TypedResult)> {
        resolved(outcome)
            .iter()
            .map(|r| (r.name.clone(), r.tool_invocation_count, r.result.clone()))
            .collect()
    };
    assert_eq!(strip(&first), strip(&second));
    assert_eq!(first.icp_score(), second.icp_score());
}

/// Test: a schema violation gets exactly one re-prompt
/// Given a scoring model whose first answer has confidence 9
/// When the graph runs
/// Then the re-prompt lists the violation and the node resolves on attempt 2
#[tokio::test]
async fn test_schema_violation_reprompted_once() {
    let model = Arc::new(acme_model(ACME_STACK).with(SchemaRef::IcpScore, |prompt| {
        if prompt.contains("YOUR PREVIOUS RESULT WAS REJECTED") {
            score_from_context(prompt)
        } else {
            final_reply(&json!({
                "score": 60,
                "employee_factor": 0.5,
                "data_team_factor": 0.5,
                "tech_stack_factor": 0.5,
                "explanation": "guess",
                "confidence": 9,
                "confidence_explanation": "very sure"
            }))
        }
    }));

    let aggregator = Arc::new(ScoringAggregator::new(&ScoringConfig::default()));
    let flow = icp_graph(COMPANY, aggregator).unwrap();
    let report = research_executor(model.clone(), Arc::new(ScriptedSearch::new()))
        .run(flow.nodes)
        .await
        .unwrap();

    assert!(report.is_success());
    let icp = report.node(&flow.target).unwrap();
    assert_eq!(icp.attempts, 2);

    let prompts = model.prompts_for(SchemaRef::IcpScore);
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("- confidence: must be between 0 and 5"));
}

#[tokio::test]
async fn test_quick_score_without_data_team() {
    let model = Arc::new(acme_model(ACME_STACK));
    let outcome = research_pipeline(model.clone(), Arc::new(ScriptedSearch::new()))
        .run_quick_score(COMPANY)
        .await
        .unwrap();

    assert!(outcome.icp_score().is_some());
    assert!(model.prompts_for(SchemaRef::DataProfessionalCount).is_empty());
    let context = prompt_context(&model.prompts_for(SchemaRef::IcpScore)[0]);
    assert!(context.get("data_professional_count").is_none());
}

#[tokio::test]
async fn test_headcount_only() {
    let model = Arc::new(acme_model(ACME_STACK));
    let outcome = research_pipeline(model.clone(), Arc::new(ScriptedSearch::new()))
        .run_headcount(COMPANY)
        .await
        .unwrap();

    let count = outcome.result().and_then(TypedResult::as_employee_count).unwrap();
    assert_eq!(count.total.value, Some(TotalCount::Exact(500)));
    assert!(model.prompts_for(SchemaRef::IcpScore).is_empty());
}
