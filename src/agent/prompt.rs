//! Prompt assembly for the research loop.

use crate::schema::{FieldViolation, SchemaContract, SchemaRef, OFFLINE_CONFIDENCE_CAP};
use crate::Result;

use super::{AgentRequest, ToolRef};

/// Standing instructions for every research turn.
pub const PERSONA: &str = "\
You are a company research agent.
Rules:
1. Cross-reference every finding with at least one or two independent sources.
2. Prefer the most recent data and report the date of your newest source.
3. Cite every source you relied on, most reliable first.
4. Rate each measured quantity with a confidence from 0 to 5:
   5 = multiple independent sources corroborate the figure
   4 = strong agreement with minor variations
   3 = moderate support, some conflicting information
   2 = low support, significant gaps or conflicts
   1 = mostly educated guesses
   0 = pure speculation
5. Explain every confidence rating in one or two sentences.
6. Keep facts and guesses apart; never present an estimate as a fact.
7. When sources disagree, report a range or the most credible figure and say why.
8. Note biases or limitations of the sources you used.
9. Adapt your approach to the company: public filings for listed companies, \
job postings and professional networks for private ones.
10. Before researching, check whether real-time web search is available. \
If it is not, say so in the notes and lower every confidence rating.
11. Use null for any value you could not determine. Never invent a number to fill a field.";

const PROTOCOL: &str = "\
Reply with exactly one JSON object and nothing else.
To run a web search:  {\"action\": \"search\", \"query\": \"<query>\"}
To finish:            {\"action\": \"final\", \"result\": { ...fields below... }}";

/// First line of the schema section. Stable, so tooling can route on it.
pub fn schema_header(schema: SchemaRef) -> String {
    format!("RESULT SCHEMA: {}", schema)
}

/// One step of the conversation so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Exchange {
    /// A search that ran, with its text result or the failure message.
    Search { query: String, result: String },
    /// A search request that was not run.
    Refused { query: String, reason: String },
    /// A reply that could not be understood.
    Malformed { reason: String },
}

/// Inputs for one model turn.
pub struct Turn<'a> {
    pub request: &'a AgentRequest,
    pub contract: &'a SchemaContract,
    pub transcript: &'a [Exchange],
    pub search_enabled: bool,
    pub remaining_searches: u32,
}

/// Render the full prompt for one turn.
pub fn build(turn: &Turn<'_>) -> Result<String> {
    let request = turn.request;
    let mut sections = vec![PERSONA.to_string()];

    let mut task = format!("OBJECTIVE:\n{}", request.objective.trim());
    if let Some(instructions) = request.instructions.as_deref() {
        task.push_str(&format!("\n\nINSTRUCTIONS:\n{}", instructions.trim()));
    }
    sections.push(task);

    if !request.context.is_empty() {
        let context = serde_json::to_string_pretty(&request.context.to_json()?)?;
        sections.push(format!("CONTEXT:\n{}", context));
    }

    sections.push(tool_status(turn));
    sections.push(PROTOCOL.to_string());
    sections.push(format!(
        "{}\n{}",
        schema_header(request.schema),
        turn.contract.describe()
    ));

    if request.is_retry() {
        sections.push(feedback(&request.feedback));
    }

    if !turn.transcript.is_empty() {
        sections.push(transcript(turn.transcript));
    }

    Ok(sections.join("\n\n"))
}

fn tool_status(turn: &Turn<'_>) -> String {
    if !turn.request.allows(ToolRef::WebSearch) {
        return "TOOLS:\nNo tools are needed for this task. Work from the context provided.".to_string();
    }
    if turn.search_enabled {
        format!(
            "TOOLS:\nReal-time web search is available. You may run up to {} more searches.",
            turn.remaining_searches
        )
    } else {
        format!(
            "TOOLS:\nReal-time web search is NOT available. Answer from what you already know, \
set real_time_data_available to false, and keep every confidence at {} or below.",
            OFFLINE_CONFIDENCE_CAP
        )
    }
}

fn feedback(violations: &[FieldViolation]) -> String {
    let lines: Vec<String> = violations.iter().map(|v| format!("- {}", v)).collect();
    format!(
        "YOUR PREVIOUS RESULT WAS REJECTED. Fix these fields:\n{}",
        lines.join("\n")
    )
}

fn transcript(exchanges: &[Exchange]) -> String {
    let mut out = String::from("HISTORY:");
    for exchange in exchanges {
        match exchange {
            Exchange::Search { query, result } => {
                out.push_str(&format!("\n\n> search: {}\n{}", query, result));
            }
            Exchange::Refused { query, reason } => {
                out.push_str(&format!("\n\n> search: {}\n(not run: {})", query, reason));
            }
            Exchange::Malformed { reason } => {
                out.push_str(&format!(
                    "\n\n> your last reply was not understood: {}. Reply with one JSON object.",
                    reason
                ));
            }
        }
    }
    out
}
