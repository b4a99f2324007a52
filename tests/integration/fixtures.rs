//! Test doubles and canned research data for integration tests.
//!
//! - `ScriptedModel`: a language model that answers per result schema
//! - `ScriptedSearch`: a search tool that counts calls and can fail
//! - `StaticAgent`: an agent adapter with one fixed reply per node

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use scout::agent::prompt::schema_header;
use scout::agent::{
    AgentAdapter, AgentOutcome, AgentRequest, AgentRoster, LanguageModel, ResearchAgent,
    SearchTool,
};
use scout::config::ScoringConfig;
use scout::core::TaskNode;
use scout::orchestration::{Executor, Pipeline};
use scout::schema::{SchemaRef, SchemaRegistry};
use scout::{Error, Result};

pub const COMPANY: &str = "Acme Co";

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Answers each prompt with the responder registered for the schema
/// named in its `RESULT SCHEMA:` line.
pub struct ScriptedModel {
    responders: HashMap<SchemaRef, Responder>,
    prompts: Mutex<Vec<(SchemaRef, String)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            responders: HashMap::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with(
        mut self,
        schema: SchemaRef,
        responder: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.responders.insert(schema, Box::new(responder));
        self
    }

    /// Search once when search is offered, then answer with `result`.
    pub fn researching(self, schema: SchemaRef, query: &str, result: Value) -> Self {
        let query = query.to_string();
        self.with(schema, move |prompt| {
            let searched = prompt.contains("> search:");
            if !searched && prompt.contains("Real-time web search is available") {
                search_reply(&query)
            } else {
                final_reply(&result)
            }
        })
    }

    /// Answer straight away with `result`.
    pub fn answering(self, schema: SchemaRef, result: Value) -> Self {
        self.with(schema, move |_| final_reply(&result))
    }

    pub fn prompts_for(&self, schema: SchemaRef) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == schema)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

fn schema_of(prompt: &str) -> Option<SchemaRef> {
    SchemaRef::ALL
        .into_iter()
        .find(|s| prompt.lines().any(|line| line == schema_header(*s)))
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let schema = schema_of(prompt)
            .ok_or_else(|| Error::AgentExecution("prompt names no result schema".into()))?;
        self.prompts
            .lock()
            .unwrap()
            .push((schema, prompt.to_string()));
        let responder = self
            .responders
            .get(&schema)
            .ok_or_else(|| Error::AgentExecution(format!("no script for {}", schema)))?;
        Ok(responder(prompt))
    }
}

pub fn search_reply(query: &str) -> String {
    json!({ "action": "search", "query": query }).to_string()
}

pub fn final_reply(result: &Value) -> String {
    format!(
        "Here is what I found.\n```json\n{}\n```",
        json!({ "action": "final", "result": result })
    )
}

/// The CONTEXT section of a prompt as JSON, or Null when absent.
pub fn prompt_context(prompt: &str) -> Value {
    let start = prompt.find("CONTEXT:\n").map(|i| i + "CONTEXT:\n".len());
    let end = prompt.find("\n\nTOOLS:");
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&prompt[s..e]).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Scores from the packaged context: the stack factor is the share of
/// priority tools found, the other factors are fixed at 0.5.
pub fn score_from_context(prompt: &str) -> String {
    let context = prompt_context(prompt);
    let found: Vec<String> = context["priority_tools_found"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let priority = context["tool_priority"].as_array().map(|a| a.len()).unwrap_or(1).max(1);

    let tech = found.len() as f64 / priority as f64;
    let score = (100.0 * (0.3 * 0.5 + 0.3 * 0.5 + 0.4 * tech)).round() as u64;
    final_reply(&json!({
        "score": score,
        "employee_factor": 0.5,
        "data_team_factor": 0.5,
        "tech_stack_factor": tech,
        "key_tools": found,
        "explanation": format!("{} priority tools in the stack", found.len()),
        "confidence": 4,
        "confidence_explanation": "inputs are well sourced"
    }))
}

/// Search double that counts every call.
pub struct ScriptedSearch {
    calls: AtomicU32,
    available: bool,
    failing: bool,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            available: true,
            failing: false,
        }
    }

    /// Reports itself unavailable, like missing credentials.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Available, but every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchTool for ScriptedSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::SearchUnavailable("daily quota exceeded".into()));
        }
        Ok(format!(
            "1. {} - company profile\n   https://example.com/acme\n   Acme Co has about 500 employees.",
            query
        ))
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Agent double with one reply per node name. A Null reply fails the node.
pub struct StaticAgent {
    replies: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl StaticAgent {
    pub fn new(replies: &[(&str, Value)]) -> Arc<Self> {
        Arc::new(Self {
            replies: replies
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentAdapter for StaticAgent {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentOutcome> {
        self.calls.lock().unwrap().push(request.node.clone());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        match self.replies.get(&request.node) {
            Some(Value::Null) | None => Err(Error::AgentExecution("agent gave up".into())),
            Some(reply) => Ok(AgentOutcome::new(reply.clone(), 0)),
        }
    }
}

pub fn static_executor(agent: Arc<StaticAgent>) -> Executor {
    Executor::new(
        AgentRoster::single(agent),
        Arc::new(SchemaRegistry::standard()),
    )
}

pub fn research_executor(model: Arc<ScriptedModel>, search: Arc<ScriptedSearch>) -> Executor {
    let registry = Arc::new(SchemaRegistry::standard());
    let agent = ResearchAgent::new(model, search, registry.clone());
    Executor::new(AgentRoster::single(Arc::new(agent)), registry)
}

pub fn research_pipeline(model: Arc<ScriptedModel>, search: Arc<ScriptedSearch>) -> Pipeline {
    Pipeline::new(research_executor(model, search), &ScoringConfig::default())
}

pub fn stack_node(name: &str) -> TaskNode {
    TaskNode::new(name, "Research the data stack", SchemaRef::DataStack)
}

// Canned results

pub fn employee_json(total: u64, confidence: u8) -> Value {
    json!({
        "company": COMPANY,
        "real_time_data_available": true,
        "data_as_of": "2024-06-01",
        "total": total,
        "total_confidence": confidence,
        "total_confidence_explanation": "company site and two professional networks agree",
        "industry_comparison": "average",
        "sources": ["acme.com/about", "linkedin.com/company/acme"]
    })
}

pub fn data_professionals_json(count: u64, confidence: u8) -> Value {
    json!({
        "company": COMPANY,
        "data_professional_count": count,
        "data_professional_count_confidence": confidence,
        "data_professional_count_confidence_explanation": "profile search for data titles",
        "roles": { "data engineer": 15, "data scientist": 10, "analyst": 15 },
        "sources": ["linkedin.com"]
    })
}

pub fn stack_json(tools: &[(&str, u8)]) -> Value {
    json!({
        "company": COMPANY,
        "tools": tools.iter().map(|(name, confidence)| json!({
            "name": name,
            "confidence": confidence,
            "confidence_explanation": "named in current job postings"
        })).collect::<Vec<_>>(),
        "primary_languages": ["SQL"],
        "sources": ["acme.com/careers"]
    })
}

/// A full research model for Acme Co with the given stack.
pub fn acme_model(tools: &[(&str, u8)]) -> ScriptedModel {
    ScriptedModel::new()
        .researching(SchemaRef::EmployeeCount, "Acme Co employees", employee_json(500, 5))
        .researching(
            SchemaRef::DataProfessionalCount,
            "Acme Co data engineer",
            data_professionals_json(40, 3),
        )
        .researching(SchemaRef::DataStack, "Acme Co data jobs", stack_json(tools))
        .with(SchemaRef::IcpScore, score_from_context)
}
