//! Scoring aggregator.
//!
//! Packages the three research results into the ICP node's context and
//! tidies the score the agent hands back. It never computes or adjusts the
//! score itself: that judgement belongs to the scoring agent.

use serde_json::json;

use crate::config::{FactorWeights, ScoringConfig};
use crate::core::{NodeHook, ResolvedContext, ResolvedValue};
use crate::schema::{DataStack, IcpScore, SchemaRef, TypedResult};
use crate::{slog_debug, Error, Result};

pub const EMPLOYEE_COUNT_KEY: &str = "employee_count";
pub const DATA_PROFESSIONAL_COUNT_KEY: &str = "data_professional_count";
pub const DATA_STACK_KEY: &str = "data_stack";
pub const TOOL_PRIORITY_KEY: &str = "tool_priority";
pub const FACTOR_WEIGHTS_KEY: &str = "factor_weights";
pub const PRIORITY_TOOLS_FOUND_KEY: &str = "priority_tools_found";

#[derive(Debug, Clone)]
pub struct ScoringAggregator {
    /// Lower-cased, most important first.
    tool_priority: Vec<String>,
    weights: FactorWeights,
    require_data_professionals: bool,
}

impl ScoringAggregator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            tool_priority: config
                .tool_priority
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            weights: config.weights,
            require_data_professionals: true,
        }
    }

    /// Accept a missing data-professional count (quick score).
    pub fn without_data_professionals(mut self) -> Self {
        self.require_data_professionals = false;
        self
    }

    pub fn requires_data_professionals(&self) -> bool {
        self.require_data_professionals
    }

    pub fn tool_priority(&self) -> &[String] {
        &self.tool_priority
    }

    pub fn weights(&self) -> FactorWeights {
        self.weights
    }

    /// Context for the scoring node.
    ///
    /// # Errors
    ///
    /// `Error::IncompleteInput` naming each required input that is absent
    /// or of the wrong schema.
    pub fn build_score_context(
        &self,
        employee: Option<&TypedResult>,
        data_professionals: Option<&TypedResult>,
        stack: Option<&TypedResult>,
    ) -> Result<ResolvedContext> {
        let mut missing = Vec::new();

        let employee = check_input(employee, SchemaRef::EmployeeCount, EMPLOYEE_COUNT_KEY, &mut missing);
        let data_professionals = match data_professionals {
            None if !self.require_data_professionals => None,
            other => check_input(
                other,
                SchemaRef::DataProfessionalCount,
                DATA_PROFESSIONAL_COUNT_KEY,
                &mut missing,
            ),
        };
        let stack = check_input(stack, SchemaRef::DataStack, DATA_STACK_KEY, &mut missing);

        let (Some(employee), Some(stack)) = (employee, stack) else {
            return Err(Error::IncompleteInput { missing });
        };
        if !missing.is_empty() {
            return Err(Error::IncompleteInput { missing });
        }

        let found = stack
            .as_data_stack()
            .map(|s| self.priority_tools_found(s))
            .unwrap_or_default();
        slog_debug!("Aggregator: priority tools found: {:?}", found);

        let mut context = ResolvedContext::new();
        context.insert_result(EMPLOYEE_COUNT_KEY, employee.clone());
        if let Some(data_professionals) = data_professionals {
            context.insert_result(DATA_PROFESSIONAL_COUNT_KEY, data_professionals.clone());
        }
        context.insert_result(DATA_STACK_KEY, stack.clone());
        context.insert_literal(TOOL_PRIORITY_KEY, json!(self.tool_priority));
        context.insert_literal(
            FACTOR_WEIGHTS_KEY,
            json!({
                "employee_factor": self.weights.employee,
                "data_team_factor": self.weights.data_team,
                "tech_stack_factor": self.weights.tech_stack,
            }),
        );
        context.insert_literal(PRIORITY_TOOLS_FOUND_KEY, json!(found));
        Ok(context)
    }

    /// Priority tools named anywhere in the stack, in priority order.
    ///
    /// Names are matched word by word, so "AWS Glue" counts as aws and
    /// "Apache Kafka" as kafka.
    pub fn priority_tools_found(&self, stack: &DataStack) -> Vec<String> {
        let words: Vec<String> = stack
            .tools
            .iter()
            .map(|t| t.name.as_str())
            .chain(stack.primary_languages.iter().map(String::as_str))
            .flat_map(tokens)
            .collect();

        self.tool_priority
            .iter()
            .filter(|tool| words.iter().any(|w| w == *tool))
            .cloned()
            .collect()
    }

    /// Lower-case and de-duplicate `key_tools`, priority tools first.
    pub fn normalize(&self, mut score: IcpScore) -> IcpScore {
        let mut seen = Vec::new();
        for tool in &score.key_tools {
            let tool = tool.trim().to_lowercase();
            if !tool.is_empty() && !seen.contains(&tool) {
                seen.push(tool);
            }
        }

        let rank = |t: &String| {
            self.tool_priority
                .iter()
                .position(|p| p == t)
                .unwrap_or(self.tool_priority.len())
        };
        // Stable sort keeps non-priority tools in the agent's order.
        seen.sort_by_key(rank);
        score.key_tools = seen;
        score
    }

    /// Objective text for the scoring node.
    pub fn scoring_objective(&self, company: &str) -> String {
        let mut objective = format!(
            "Determine the Ideal Customer Profile (ICP) score for {} on a scale of 0-100.\n\
             - Consider the total number of employees, the size of the data team, and the technology stack.\n\
             - Larger employee counts and larger data teams score higher.\n\
             - Evaluate the stack by the presence of these tools, most important first: {}.\n\
             - Combinations of these tools score higher still.\n\
             - Weigh the factors as given in factor_weights; priority_tools_found lists the tools already matched.\n\
             - Give the final score with each factor between 0 and 1, the key tools, and a short explanation.",
            company,
            self.tool_priority.join(", ")
        );
        if !self.require_data_professionals {
            objective.push_str(
                "\n- No data-professional count is available; estimate the data team factor from the stack alone.",
            );
        }
        objective
    }
}

fn check_input<'a>(
    input: Option<&'a TypedResult>,
    schema: SchemaRef,
    key: &str,
    missing: &mut Vec<String>,
) -> Option<&'a TypedResult> {
    match input {
        Some(result) if result.schema() == schema => Some(result),
        _ => {
            missing.push(key.to_string());
            None
        }
    }
}

fn tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

impl NodeHook for ScoringAggregator {
    fn prepare(&self, context: &mut ResolvedContext) -> Result<()> {
        let mut packaged = self.build_score_context(
            context.result(EMPLOYEE_COUNT_KEY),
            context.result(DATA_PROFESSIONAL_COUNT_KEY),
            context.result(DATA_STACK_KEY),
        )?;

        for (key, value) in context.iter() {
            if packaged.get(key).is_none() {
                if let ResolvedValue::Literal(v) = value {
                    packaged.insert_literal(key, v.clone());
                }
            }
        }
        *context = packaged;
        Ok(())
    }

    fn finalize(&self, result: TypedResult) -> Result<TypedResult> {
        match result {
            TypedResult::IcpScore(score) => Ok(TypedResult::IcpScore(self.normalize(score))),
            other => Ok(other),
        }
    }
}
