//! Plain-text rendering of results, pipeline outcomes and progress events.
//!
//! Every field gets its own `Title Cased Name: value` line. Lists are
//! joined with commas and absent values print as `unknown`.

use std::fmt::Display;

use crate::orchestration::{ExecutorEvent, NamedResult, PipelineOutcome};
use crate::schema::{TypedResult, UNKNOWN};

const NONE: &str = "none";

/// `data_as_of` -> `Data As Of`.
pub fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

struct Lines(Vec<String>);

impl Lines {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn field(&mut self, key: &str, value: impl Display) {
        self.0.push(format!("{}: {}", title_case(key), value));
    }

    fn flag(&mut self, key: &str, value: bool) {
        self.field(key, if value { "yes" } else { "no" });
    }

    fn text(&mut self, key: &str, value: &str) {
        let value = value.trim();
        self.field(key, if value.is_empty() { UNKNOWN } else { value });
    }

    fn optional(&mut self, key: &str, value: Option<&str>) {
        self.text(key, value.unwrap_or(UNKNOWN));
    }

    fn list<T: AsRef<str>>(&mut self, key: &str, items: &[T]) {
        if items.is_empty() {
            self.field(key, NONE);
        } else {
            let joined: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
            self.field(key, joined.join(", "));
        }
    }

    fn factor(&mut self, key: &str, value: f64) {
        self.field(key, format!("{:.2}", value));
    }

    fn finish(self) -> String {
        self.0.join("\n")
    }
}

/// Render one result, a field per line.
pub fn format(result: &TypedResult) -> String {
    let mut lines = Lines::new();
    match result {
        TypedResult::EmployeeCount(r) => {
            lines.text("company", &r.company);
            lines.flag("real_time_data_available", r.real_time_data_available);
            lines.text("data_as_of", &r.data_as_of);
            lines.field("total", r.total.display_value());
            lines.field("total_confidence", r.total.confidence);
            lines.text("total_confidence_explanation", &r.total.confidence_explanation);
            match &r.growth_rate {
                Some(growth) => {
                    let value = growth
                        .value
                        .map(|v| format!("{:.1}%", v))
                        .unwrap_or_else(|| UNKNOWN.to_string());
                    lines.field("growth_rate", value);
                    lines.field("growth_rate_confidence", growth.confidence);
                    lines.text("growth_rate_confidence_explanation", &growth.confidence_explanation);
                }
                None => lines.field("growth_rate", UNKNOWN),
            }
            lines.text("industry_comparison", &r.industry_comparison);
            lines.list("sources", &r.sources);
            lines.optional("notes", r.notes.as_deref());
        }
        TypedResult::DataProfessionalCount(r) => {
            lines.text("company", &r.company);
            lines.flag("real_time_data_available", r.real_time_data_available);
            lines.field("data_professional_count", r.count.display_value());
            lines.field("data_professional_count_confidence", r.count.confidence);
            lines.text(
                "data_professional_count_confidence_explanation",
                &r.count.confidence_explanation,
            );
            let roles: Vec<String> = r.roles.iter().map(|(role, n)| format!("{} {}", n, role)).collect();
            lines.list("roles", &roles);
            lines.list("sources", &r.sources);
            lines.optional("notes", r.notes.as_deref());
        }
        TypedResult::DataStack(r) => {
            lines.text("company", &r.company);
            lines.flag("real_time_data_available", r.real_time_data_available);
            let tools: Vec<String> = r
                .tools
                .iter()
                .map(|t| format!("{} ({})", t.name, t.confidence))
                .collect();
            lines.list("tools", &tools);
            lines.list("primary_languages", &r.primary_languages);
            lines.list("sources", &r.sources);
            lines.optional("notes", r.notes.as_deref());
        }
        TypedResult::IcpScore(r) => {
            lines.field("score", r.score);
            lines.factor("employee_factor", r.employee_factor);
            lines.factor("data_team_factor", r.data_team_factor);
            lines.factor("tech_stack_factor", r.tech_stack_factor);
            lines.list("key_tools", &r.key_tools);
            lines.text("explanation", &r.explanation);
            lines.field("confidence", r.confidence);
            lines.text("confidence_explanation", &r.confidence_explanation);
            lines.flag("real_time_data_available", r.real_time_data_available);
            lines.list("sources", &r.sources);
            lines.optional("notes", r.notes.as_deref());
        }
    }
    lines.finish()
}

fn section(named: &NamedResult) -> String {
    format!(
        "== {} ({} searches) ==\n{}",
        named.name,
        named.tool_invocation_count,
        format(&named.result)
    )
}

/// Render a pipeline outcome: every resolved result, and for a partial
/// run the failed nodes with their causes first.
pub fn format_outcome(outcome: &PipelineOutcome) -> String {
    let mut blocks = Vec::new();
    match outcome {
        PipelineOutcome::Complete {
            company, resolved, ..
        } => {
            blocks.push(format!("Research complete for {}", company));
            blocks.extend(resolved.iter().map(section));
        }
        PipelineOutcome::Partial(report) => {
            blocks.push(format!(
                "Research incomplete for {}: {} failed, {} resolved",
                report.company,
                report.failures.len(),
                report.resolved.len()
            ));
            let failed: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("  {}: {}", f.name, f.cause))
                .collect();
            blocks.push(format!("Failed:\n{}", failed.join("\n")));
            blocks.extend(report.resolved.iter().map(section));
        }
    }
    blocks.join("\n\n")
}

/// One-line progress message.
pub fn format_event(event: &ExecutorEvent) -> String {
    match event {
        ExecutorEvent::NodeStarted { name, .. } => format!("started   {}", name),
        ExecutorEvent::NodeResolved {
            name,
            tool_invocation_count,
            attempts,
            ..
        } => {
            if *attempts > 1 {
                format!(
                    "resolved  {} ({} searches, {} attempts)",
                    name, tool_invocation_count, attempts
                )
            } else {
                format!("resolved  {} ({} searches)", name, tool_invocation_count)
            }
        }
        ExecutorEvent::NodeFailed { name, cause, .. } => format!("failed    {}: {}", name, cause),
        ExecutorEvent::NodeSkipped { name, upstream, .. } => {
            format!("skipped   {} (upstream {} failed)", name, upstream)
        }
        ExecutorEvent::RunComplete { resolved, failed } => {
            format!("done      {} resolved, {} failed", resolved, failed)
        }
    }
}
