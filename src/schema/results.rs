//! Result types produced by research nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::confidence::{Confidence, Measured, UNKNOWN};
use super::registry::FieldViolation;

/// Identifies the contract a node's result must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRef {
    EmployeeCount,
    DataProfessionalCount,
    DataStack,
    IcpScore,
}

impl SchemaRef {
    pub const ALL: [SchemaRef; 4] = [
        SchemaRef::EmployeeCount,
        SchemaRef::DataProfessionalCount,
        SchemaRef::DataStack,
        SchemaRef::IcpScore,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SchemaRef::EmployeeCount => "employee_count",
            SchemaRef::DataProfessionalCount => "data_professional_count",
            SchemaRef::DataStack => "data_stack",
            SchemaRef::IcpScore => "icp_score",
        }
    }
}

impl std::fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Headcount as reported by sources: an exact figure or a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TotalCount {
    Exact(u64),
    Range { min: u64, max: u64 },
}

impl TotalCount {
    /// Midpoint used when a single figure is needed.
    pub fn estimate(&self) -> u64 {
        match *self {
            TotalCount::Exact(n) => n,
            TotalCount::Range { min, max } => min + (max - min) / 2,
        }
    }
}

impl std::fmt::Display for TotalCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TotalCount::Exact(n) => write!(f, "{}", n),
            TotalCount::Range { min, max } => write!(f, "{}-{}", min, max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeCount {
    pub company: String,
    pub real_time_data_available: bool,
    /// Date of the most recent source, or [`UNKNOWN`].
    pub data_as_of: String,
    pub total: Measured<TotalCount>,
    pub growth_rate: Option<Measured<f64>>,
    /// Comparison to the industry average, or [`UNKNOWN`].
    pub industry_comparison: String,
    pub sources: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataProfessionalCount {
    pub company: String,
    pub real_time_data_available: bool,
    pub count: Measured<u64>,
    /// Headcount per role, e.g. "data engineer" -> 40.
    pub roles: BTreeMap<String, u64>,
    pub sources: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedTool {
    pub name: String,
    pub confidence: Confidence,
    pub confidence_explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStack {
    pub company: String,
    pub real_time_data_available: bool,
    pub tools: Vec<RatedTool>,
    pub primary_languages: Vec<String>,
    pub sources: Vec<String>,
    pub notes: Option<String>,
}

impl DataStack {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IcpScore {
    /// Overall score, 0..=100.
    pub score: u8,
    pub employee_factor: f64,
    pub data_team_factor: f64,
    pub tech_stack_factor: f64,
    pub key_tools: Vec<String>,
    pub explanation: String,
    pub confidence: Confidence,
    pub confidence_explanation: String,
    pub real_time_data_available: bool,
    pub sources: Vec<String>,
    pub notes: Option<String>,
}

/// A validated node result, one variant per schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum TypedResult {
    EmployeeCount(EmployeeCount),
    DataProfessionalCount(DataProfessionalCount),
    DataStack(DataStack),
    IcpScore(IcpScore),
}

impl TypedResult {
    pub fn schema(&self) -> SchemaRef {
        match self {
            TypedResult::EmployeeCount(_) => SchemaRef::EmployeeCount,
            TypedResult::DataProfessionalCount(_) => SchemaRef::DataProfessionalCount,
            TypedResult::DataStack(_) => SchemaRef::DataStack,
            TypedResult::IcpScore(_) => SchemaRef::IcpScore,
        }
    }

    pub fn sources(&self) -> &[String] {
        match self {
            TypedResult::EmployeeCount(r) => &r.sources,
            TypedResult::DataProfessionalCount(r) => &r.sources,
            TypedResult::DataStack(r) => &r.sources,
            TypedResult::IcpScore(r) => &r.sources,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            TypedResult::EmployeeCount(r) => r.notes.as_deref(),
            TypedResult::DataProfessionalCount(r) => r.notes.as_deref(),
            TypedResult::DataStack(r) => r.notes.as_deref(),
            TypedResult::IcpScore(r) => r.notes.as_deref(),
        }
    }

    pub fn real_time_data_available(&self) -> bool {
        match self {
            TypedResult::EmployeeCount(r) => r.real_time_data_available,
            TypedResult::DataProfessionalCount(r) => r.real_time_data_available,
            TypedResult::DataStack(r) => r.real_time_data_available,
            TypedResult::IcpScore(r) => r.real_time_data_available,
        }
    }

    pub fn as_employee_count(&self) -> Option<&EmployeeCount> {
        match self {
            TypedResult::EmployeeCount(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_data_professional_count(&self) -> Option<&DataProfessionalCount> {
        match self {
            TypedResult::DataProfessionalCount(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_data_stack(&self) -> Option<&DataStack> {
        match self {
            TypedResult::DataStack(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_icp_score(&self) -> Option<&IcpScore> {
        match self {
            TypedResult::IcpScore(r) => Some(r),
            _ => None,
        }
    }

    /// Every confidence rating in the result, keyed by field path.
    pub fn confidences(&self) -> Vec<(String, Confidence)> {
        match self {
            TypedResult::EmployeeCount(r) => {
                let mut out = vec![("total".to_string(), r.total.confidence)];
                if let Some(g) = &r.growth_rate {
                    out.push(("growth_rate".to_string(), g.confidence));
                }
                out
            }
            TypedResult::DataProfessionalCount(r) => {
                vec![("data_professional_count".to_string(), r.count.confidence)]
            }
            TypedResult::DataStack(r) => r
                .tools
                .iter()
                .map(|t| (format!("tools.{}", t.name), t.confidence))
                .collect(),
            TypedResult::IcpScore(r) => vec![("score".to_string(), r.confidence)],
        }
    }

    /// Mark the result as produced without real-time data and lower every
    /// rating accordingly.
    pub fn degrade_for_offline(&mut self, reason: &str) {
        match self {
            TypedResult::EmployeeCount(r) => {
                r.total.degrade();
                if let Some(g) = r.growth_rate.as_mut() {
                    g.degrade();
                }
                r.real_time_data_available = false;
                append_note(&mut r.notes, reason);
            }
            TypedResult::DataProfessionalCount(r) => {
                r.count.degrade();
                r.real_time_data_available = false;
                append_note(&mut r.notes, reason);
            }
            TypedResult::DataStack(r) => {
                for tool in r.tools.iter_mut() {
                    tool.confidence = tool.confidence.degraded();
                }
                r.real_time_data_available = false;
                append_note(&mut r.notes, reason);
            }
            TypedResult::IcpScore(r) => {
                r.confidence = r.confidence.degraded();
                r.real_time_data_available = false;
                append_note(&mut r.notes, reason);
            }
        }
    }

    /// Invariant violations in an already-typed result.
    ///
    /// Used to re-check results that did not come through the registry's
    /// JSON parser.
    pub fn violations(&self) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        match self {
            TypedResult::EmployeeCount(r) => {
                need_explanation(&mut out, "total", &r.total.confidence_explanation);
                if let Some(g) = &r.growth_rate {
                    need_explanation(&mut out, "growth_rate", &g.confidence_explanation);
                }
                if let Some(TotalCount::Range { min, max }) = r.total.value {
                    if min > max {
                        out.push(FieldViolation::new("total", "range minimum exceeds maximum"));
                    }
                }
            }
            TypedResult::DataProfessionalCount(r) => {
                need_explanation(
                    &mut out,
                    "data_professional_count",
                    &r.count.confidence_explanation,
                );
            }
            TypedResult::DataStack(r) => {
                for tool in &r.tools {
                    need_explanation(
                        &mut out,
                        &format!("tools.{}", tool.name),
                        &tool.confidence_explanation,
                    );
                }
            }
            TypedResult::IcpScore(r) => {
                need_explanation(&mut out, "score", &r.confidence_explanation);
                if r.score > 100 {
                    out.push(FieldViolation::new("score", "must be between 0 and 100"));
                }
                for (field, value) in [
                    ("employee_factor", r.employee_factor),
                    ("data_team_factor", r.data_team_factor),
                    ("tech_stack_factor", r.tech_stack_factor),
                ] {
                    if !(0.0..=1.0).contains(&value) {
                        out.push(FieldViolation::new(field, "must be between 0 and 1"));
                    }
                }
            }
        }
        out
    }
}

fn need_explanation(out: &mut Vec<FieldViolation>, field: &str, explanation: &str) {
    if explanation.trim().is_empty() {
        out.push(FieldViolation::new(
            &format!("{}_confidence_explanation", field),
            "must be non-empty when a confidence rating is given",
        ));
    }
}

fn append_note(notes: &mut Option<String>, addition: &str) {
    match notes {
        Some(existing) if !existing.trim().is_empty() && existing != UNKNOWN => {
            existing.push_str(" | ");
            existing.push_str(addition);
        }
        _ => *notes = Some(addition.to_string()),
    }
}
