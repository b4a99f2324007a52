//! The research agent: a language model driven through a search tool loop.
//!
//! Each turn the model either asks for a web search or hands back its final
//! JSON result. Search outages switch the loop to offline mode rather than
//! failing; the outcome is then flagged so the executor can degrade the
//! result's confidence.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::model::LanguageModel;
use super::prompt::{self, Exchange, Turn};
use super::search::SearchTool;
use super::{AgentAdapter, AgentOutcome, AgentRequest, ToolRef};
use crate::schema::SchemaRegistry;
use crate::{slog_debug, slog_trace, slog_warn, Error, Result};

/// Malformed replies tolerated before the node fails.
const MAX_MALFORMED_REPLIES: u32 = 1;

/// Turns allowed beyond the search budget: the final answer, one
/// malformed reply, and one refused search.
const EXTRA_TURNS: u32 = 3;

static FENCED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// What the model asked for in one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Search(String),
    Final(Value),
}

pub struct ResearchAgent {
    model: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchTool>,
    registry: Arc<SchemaRegistry>,
    max_tool_calls: u32,
}

impl ResearchAgent {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchTool>,
        registry: Arc<SchemaRegistry>,
    ) -> Self {
        Self {
            model,
            search,
            registry,
            max_tool_calls: 8,
        }
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }
}

#[async_trait]
impl AgentAdapter for ResearchAgent {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentOutcome> {
        let contract = self.registry.contract(request.schema).ok_or_else(|| {
            Error::AgentExecution(format!("no contract registered for {}", request.schema))
        })?;

        let wants_search = request.allows(ToolRef::WebSearch);
        let mut search_enabled = wants_search && self.search.is_available();
        let mut offline = wants_search && !search_enabled;
        if offline {
            slog_warn!(
                "[{}] search unavailable before start, researching without real-time data",
                request.node
            );
        }

        let mut transcript: Vec<Exchange> = Vec::new();
        let mut calls = 0u32;
        let mut malformed = 0u32;
        let max_turns = self.max_tool_calls + EXTRA_TURNS;

        for turn in 0..max_turns {
            let text = prompt::build(&Turn {
                request,
                contract,
                transcript: &transcript,
                search_enabled,
                remaining_searches: self.max_tool_calls.saturating_sub(calls),
            })?;
            slog_debug!("[{}] turn {} prompt: {} chars", request.node, turn + 1, text.len());

            let reply = self.model.complete(&text).await.map_err(|e| match e {
                Error::AgentExecution(_) => e,
                other => Error::AgentExecution(other.to_string()),
            })?;
            slog_trace!("[{}] reply: {}", request.node, reply);

            match parse_action(&reply) {
                Ok(Action::Final(output)) => {
                    slog_debug!(
                        "[{}] final answer after {} turns, {} searches",
                        request.node,
                        turn + 1,
                        calls
                    );
                    let outcome = AgentOutcome::new(output, calls);
                    return Ok(if offline { outcome.offline() } else { outcome });
                }
                Ok(Action::Search(query)) => {
                    if !search_enabled {
                        transcript.push(Exchange::Refused {
                            query,
                            reason: "real-time web search is not available".into(),
                        });
                        continue;
                    }
                    if calls >= self.max_tool_calls {
                        transcript.push(Exchange::Refused {
                            query,
                            reason: "tool budget exhausted, give your final answer".into(),
                        });
                        continue;
                    }

                    calls += 1;
                    match self.search.search(&query).await {
                        Ok(result) => transcript.push(Exchange::Search { query, result }),
                        Err(e) => {
                            slog_warn!(
                                "[{}] search failed, switching to offline mode: {}",
                                request.node,
                                e
                            );
                            search_enabled = false;
                            offline = true;
                            transcript.push(Exchange::Search {
                                query,
                                result: format!(
                                    "search failed ({}); continue without real-time data",
                                    e
                                ),
                            });
                        }
                    }
                }
                Err(reason) => {
                    malformed += 1;
                    if malformed > MAX_MALFORMED_REPLIES {
                        return Err(Error::AgentExecution(format!(
                            "malformed reply after re-prompt: {}",
                            reason
                        )));
                    }
                    slog_warn!("[{}] malformed reply, re-prompting: {}", request.node, reason);
                    transcript.push(Exchange::Malformed { reason });
                }
            }
        }

        Err(Error::AgentExecution(format!(
            "no final answer after {} turns",
            max_turns
        )))
    }
}

/// Pull the action out of a reply that may wrap its JSON in prose or a
/// code fence. A bare object without an `action` key is taken as the
/// final result.
pub fn parse_action(reply: &str) -> std::result::Result<Action, String> {
    let value = extract_json(reply).ok_or_else(|| "no JSON object found".to_string())?;
    let Value::Object(object) = &value else {
        return Err("reply is not a JSON object".to_string());
    };

    match object.get("action").and_then(Value::as_str) {
        Some("search") => match object.get("query").and_then(Value::as_str) {
            Some(q) if !q.trim().is_empty() => Ok(Action::Search(q.trim().to_string())),
            _ => Err("search action without a query".to_string()),
        },
        Some("final") => match object.get("result") {
            Some(result @ Value::Object(_)) => Ok(Action::Final(result.clone())),
            _ => Err("final action without a result object".to_string()),
        },
        Some(other) => Err(format!("unknown action '{}'", other)),
        None => Ok(Action::Final(value)),
    }
}

fn extract_json(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(caps) = FENCED_JSON_RE.captures(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::OfflineSearch;
    use crate::core::{ResolvedContext, TaskNode};
    use crate::schema::SchemaRef;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Script(Mutex<VecDeque<String>>);

    impl Script {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                replies.iter().map(|s| s.to_string()).collect(),
            )))
        }
    }

    #[async_trait]
    impl LanguageModel for Script {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::AgentExecution("script exhausted".into()))
        }
    }

    struct CountingSearch {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl SearchTool for CountingSearch {
        async fn search(&self, query: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::SearchUnavailable("quota exceeded".into()))
            } else {
                Ok(format!("results for {}", query))
            }
        }
    }

    fn search(fail: bool) -> Arc<CountingSearch> {
        Arc::new(CountingSearch {
            calls: AtomicU32::new(0),
            fail,
        })
    }

    fn request(with_search: bool) -> AgentRequest {
        let mut node = TaskNode::new("employee_count", "count staff", SchemaRef::EmployeeCount);
        if with_search {
            node = node.with_tool(ToolRef::WebSearch);
        }
        AgentRequest::for_node(&node, ResolvedContext::new())
    }

    fn agent(model: Arc<dyn LanguageModel>, search: Arc<dyn SearchTool>) -> ResearchAgent {
        ResearchAgent::new(model, search, Arc::new(SchemaRegistry::standard()))
            .with_max_tool_calls(2)
    }

    // parse_action tests

    #[test]
    fn test_parse_plain_actions() {
        assert_eq!(
            parse_action(r#"{"action":"search","query":" acme headcount "}"#),
            Ok(Action::Search("acme headcount".into()))
        );
        assert_eq!(
            parse_action(r#"{"action":"final","result":{"total":500}}"#),
            Ok(Action::Final(json!({"total": 500})))
        );
    }

    #[test]
    fn test_parse_fenced_and_prose() {
        let fenced = "Here you go:\n```json\n{\"action\":\"final\",\"result\":{\"a\":1}}\n```\nThanks";
        assert_eq!(parse_action(fenced), Ok(Action::Final(json!({"a": 1}))));

        let prose = "I will search now {\"action\": \"search\", \"query\": \"acme\"} ok";
        assert_eq!(parse_action(prose), Ok(Action::Search("acme".into())));
    }

    #[test]
    fn test_parse_bare_result() {
        assert_eq!(
            parse_action(r#"{"company":"Acme Co"}"#),
            Ok(Action::Final(json!({"company": "Acme Co"})))
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_action("no json here").is_err());
        assert!(parse_action("[1, 2]").is_err());
        assert!(parse_action(r#"{"action":"search"}"#).is_err());
        assert!(parse_action(r#"{"action":"final","result":3}"#).is_err());
        assert!(parse_action(r#"{"action":"dance"}"#).is_err());
    }

    // Tool loop tests

    #[tokio::test]
    async fn test_search_then_final_counts_invocations() {
        let model = Script::new(&[
            r#"{"action":"search","query":"acme employees"}"#,
            r#"{"action":"search","query":"acme linkedin"}"#,
            r#"{"action":"final","result":{"company":"Acme Co"}}"#,
        ]);
        let tool = search(false);
        let outcome = agent(model, tool.clone())
            .execute(&request(true))
            .await
            .unwrap();

        assert_eq!(outcome.tool_invocation_count, 2);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
        assert!(outcome.real_time_data_available);
        assert_eq!(outcome.output["company"], "Acme Co");
    }

    #[tokio::test]
    async fn test_budget_exhausted_refuses_search() {
        let model = Script::new(&[
            r#"{"action":"search","query":"a"}"#,
            r#"{"action":"search","query":"b"}"#,
            r#"{"action":"search","query":"c"}"#,
            r#"{"action":"final","result":{}}"#,
        ]);
        let tool = search(false);
        let outcome = agent(model, tool.clone())
            .execute(&request(true))
            .await
            .unwrap();
        assert_eq!(outcome.tool_invocation_count, 2);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_runtime_search_failure_goes_offline() {
        let model = Script::new(&[
            r#"{"action":"search","query":"a"}"#,
            r#"{"action":"search","query":"b"}"#,
            r#"{"action":"final","result":{}}"#,
        ]);
        let tool = search(true);
        let outcome = agent(model, tool.clone())
            .execute(&request(true))
            .await
            .unwrap();

        // The second request is refused without calling the tool.
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.tool_invocation_count, 1);
        assert!(!outcome.real_time_data_available);
    }

    #[tokio::test]
    async fn test_unavailable_search_flags_offline_up_front() {
        let model = Script::new(&[r#"{"action":"final","result":{}}"#]);
        let outcome = agent(model, Arc::new(OfflineSearch))
            .execute(&request(true))
            .await
            .unwrap();
        assert!(!outcome.real_time_data_available);
        assert_eq!(outcome.tool_invocation_count, 0);
    }

    #[tokio::test]
    async fn test_node_without_search_tool_stays_online() {
        let model = Script::new(&[r#"{"action":"final","result":{}}"#]);
        let outcome = agent(model, Arc::new(OfflineSearch))
            .execute(&request(false))
            .await
            .unwrap();
        assert!(outcome.real_time_data_available);
    }

    #[tokio::test]
    async fn test_one_malformed_reply_is_tolerated() {
        let model = Script::new(&["thinking...", r#"{"action":"final","result":{}}"#]);
        assert!(agent(model, search(false))
            .execute(&request(true))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_second_malformed_reply_fails() {
        let model = Script::new(&["thinking...", "still thinking"]);
        let err = agent(model, search(false))
            .execute(&request(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AgentExecution(ref m) if m.contains("malformed")));
    }

    #[tokio::test]
    async fn test_model_error_becomes_agent_execution() {
        let model = Script::new(&[]);
        let err = agent(model, search(false))
            .execute(&request(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AgentExecution(_)));
    }
}
