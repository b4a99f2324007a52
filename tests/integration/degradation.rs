//! Research without real-time search.

use std::sync::Arc;

use scout::orchestration::{NamedResult, PipelineOutcome};
use scout::schema::{Confidence, TypedResult, OFFLINE_CONFIDENCE_CAP};

use crate::fixtures::{acme_model, research_pipeline, ScriptedSearch, COMPANY};

const STACK: &[(&str, u8)] = &[("python", 5), ("dbt", 1)];

async fn run(search: ScriptedSearch) -> (PipelineOutcome, Arc<ScriptedSearch>) {
    let search = Arc::new(search);
    let outcome = research_pipeline(Arc::new(acme_model(STACK)), search.clone())
        .run_icp_pipeline(COMPANY)
        .await
        .unwrap();
    (outcome, search)
}

fn resolved(outcome: &PipelineOutcome) -> Vec<NamedResult> {
    match outcome {
        PipelineOutcome::Complete { resolved, .. } => resolved.clone(),
        PipelineOutcome::Partial(report) => panic!("Expected Complete, got {:?}", report),
    }
}

fn confidences(result: &TypedResult) -> Vec<(String, Confidence)> {
    result.confidences()
}

/// Test: no confidence rises when real-time data disappears
/// Given the same scripted research online and offline
/// Then every offline confidence is below its online counterpart
/// And at most the offline cap
#[tokio::test]
async fn test_offline_confidence_is_lower_than_online() {
    let (online, _) = run(ScriptedSearch::new()).await;
    let (offline, search) = run(ScriptedSearch::unavailable()).await;
    assert_eq!(search.calls(), 0);

    let online = resolved(&online);
    let offline = resolved(&offline);
    assert_eq!(online.len(), offline.len());

    for (on, off) in online.iter().zip(offline.iter()) {
        assert_eq!(on.name, off.name);
        assert!(!off.result.real_time_data_available(), "{} claims real-time data", off.name);

        let on_conf = confidences(&on.result);
        let off_conf = confidences(&off.result);
        assert_eq!(on_conf.len(), off_conf.len());
        for ((field, a), (_, b)) in on_conf.iter().zip(off_conf.iter()) {
            if a.value() > 0 {
                assert!(b < a, "{}.{} stayed at {} offline", on.name, field, a);
            } else {
                assert_eq!(b.value(), 0, "{}.{} rose offline", on.name, field);
            }
            assert!(b.value() <= OFFLINE_CONFIDENCE_CAP, "{}.{} is {}", on.name, field, b);
        }
    }
}

#[tokio::test]
async fn test_offline_results_carry_a_note() {
    let (offline, _) = run(ScriptedSearch::unavailable()).await;
    for named in resolved(&offline) {
        let notes = named.result.notes().unwrap_or_default();
        assert!(notes.contains("without real-time data"), "{}: {:?}", named.name, notes);
    }
}

/// Test: a search that fails mid-run degrades instead of failing
#[tokio::test]
async fn test_failing_search_degrades_instead_of_failing() {
    let (outcome, search) = run(ScriptedSearch::failing()).await;
    assert!(outcome.is_complete());
    // One attempted search per research node, each counted.
    assert_eq!(search.calls(), 3);

    for named in resolved(&outcome) {
        assert!(!named.result.real_time_data_available(), "{}", named.name);
    }
    let score = outcome.icp_score().unwrap();
    assert!(score.confidence.value() <= OFFLINE_CONFIDENCE_CAP);
}

#[tokio::test]
async fn test_online_run_keeps_ratings() {
    let (online, _) = run(ScriptedSearch::new()).await;
    let employees = resolved(&online)
        .into_iter()
        .find(|r| r.name == "employee_count")
        .unwrap();
    assert_eq!(
        employees.result.as_employee_count().unwrap().total.confidence,
        Confidence::MAX
    );
}
