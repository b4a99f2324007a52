//! Schema registry: JSON contracts and their validating parsers.
//!
//! Agent output is never trusted as conformant. Every raw JSON object goes
//! through a [`SchemaContract`] parser which records each offending field
//! instead of stopping at the first problem, so a re-prompt can list all of
//! them at once.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};

use super::confidence::{Confidence, Measured, UNKNOWN};
use super::results::{
    DataProfessionalCount, DataStack, EmployeeCount, IcpScore, RatedTool, SchemaRef, TotalCount,
    TypedResult,
};
use crate::{Error, Result};

/// A single field that failed validation and the constraint it broke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub constraint: String,
}

impl FieldViolation {
    pub fn new(field: &str, constraint: &str) -> Self {
        Self {
            field: field.to_string(),
            constraint: constraint.to_string(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

/// Description of one JSON field, used both for prompting and for docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

const fn field(
    name: &'static str,
    kind: &'static str,
    required: bool,
    description: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
        description,
    }
}

const EMPLOYEE_COUNT_FIELDS: &[FieldSpec] = &[
    field("company", "string", true, "Name of the company"),
    field("real_time_data_available", "boolean", false, "Whether real-time search data backed this research"),
    field("data_as_of", "string", false, "Date of the most recent source used"),
    field("total", "integer | [min, max]", false, "Total employee count or range"),
    field("total_confidence", "integer 0-5", true, "Confidence rating for the total count"),
    field("total_confidence_explanation", "string", true, "Why the total count has that rating"),
    field("growth_rate", "number", false, "Annual growth rate as a percentage"),
    field("growth_rate_confidence", "integer 0-5", false, "Confidence rating for the growth rate"),
    field("growth_rate_confidence_explanation", "string", false, "Why the growth rate has that rating"),
    field("industry_comparison", "string", false, "'above average', 'average' or 'below average'"),
    field("sources", "string[]", false, "Sources used, most reliable first"),
    field("notes", "string", false, "Additional context or discrepancies"),
];

const DATA_PROFESSIONAL_FIELDS: &[FieldSpec] = &[
    field("company", "string", true, "Name of the company"),
    field("real_time_data_available", "boolean", false, "Whether real-time search data backed this research"),
    field("data_professional_count", "integer", false, "Total count of data professionals"),
    field("data_professional_count_confidence", "integer 0-5", true, "Confidence rating for the count"),
    field("data_professional_count_confidence_explanation", "string", true, "Why the count has that rating"),
    field("roles", "object of role -> integer", false, "Breakdown of data roles and their counts"),
    field("sources", "string[]", false, "Sources used, most reliable first"),
    field("notes", "string", false, "Additional context or discrepancies"),
];

const DATA_STACK_FIELDS: &[FieldSpec] = &[
    field("company", "string", true, "Name of the company"),
    field("real_time_data_available", "boolean", false, "Whether real-time search data backed this research"),
    field(
        "tools",
        "[{name, confidence 0-5, confidence_explanation}]",
        false,
        "Data tools in use, e.g. Python, Databricks, Snowflake, dbt, Kubernetes, Kafka, OpenAI, AWS/GCP/Azure",
    ),
    field("primary_languages", "string[]", false, "Main programming languages of the data stack"),
    field("sources", "string[]", false, "Sources used, job descriptions preferred"),
    field("notes", "string", false, "Additional observations about the stack"),
];

const ICP_SCORE_FIELDS: &[FieldSpec] = &[
    field("score", "integer 0-100", true, "Overall ICP score"),
    field("employee_factor", "number 0-1", true, "Contribution of total employee count"),
    field("data_team_factor", "number 0-1", true, "Contribution of data team size"),
    field("tech_stack_factor", "number 0-1", true, "Contribution of the technology stack"),
    field("key_tools", "string[]", false, "Prioritised tools that contributed to the score"),
    field("explanation", "string", true, "How the score was reached"),
    field("confidence", "integer 0-5", true, "Confidence rating for the score"),
    field("confidence_explanation", "string", true, "Why the score has that rating"),
    field("real_time_data_available", "boolean", false, "Whether the inputs were backed by real-time data"),
    field("sources", "string[]", false, "Sources behind the inputs"),
    field("notes", "string", false, "Caveats"),
];

/// Contract for one schema: its field list and validating parser.
#[derive(Clone)]
pub struct SchemaContract {
    pub schema: SchemaRef,
    pub fields: &'static [FieldSpec],
    parser: fn(&mut FieldReader<'_>) -> TypedResult,
}

impl std::fmt::Debug for SchemaContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaContract")
            .field("schema", &self.schema)
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl SchemaContract {
    /// Field list rendered for a prompt, one field per line.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "- {} ({}, {}): {}",
                    f.name,
                    f.kind,
                    if f.required { "required" } else { "optional" },
                    f.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name)
    }
}

/// Maps each [`SchemaRef`] to its contract.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    contracts: HashMap<SchemaRef, SchemaContract>,
}

impl SchemaRegistry {
    /// Registry holding the four research contracts.
    pub fn standard() -> Self {
        let contracts = [
            SchemaContract {
                schema: SchemaRef::EmployeeCount,
                fields: EMPLOYEE_COUNT_FIELDS,
                parser: parse_employee_count,
            },
            SchemaContract {
                schema: SchemaRef::DataProfessionalCount,
                fields: DATA_PROFESSIONAL_FIELDS,
                parser: parse_data_professional_count,
            },
            SchemaContract {
                schema: SchemaRef::DataStack,
                fields: DATA_STACK_FIELDS,
                parser: parse_data_stack,
            },
            SchemaContract {
                schema: SchemaRef::IcpScore,
                fields: ICP_SCORE_FIELDS,
                parser: parse_icp_score,
            },
        ]
        .into_iter()
        .map(|c| (c.schema, c))
        .collect();

        Self { contracts }
    }

    pub fn contract(&self, schema: SchemaRef) -> Option<&SchemaContract> {
        self.contracts.get(&schema)
    }

    /// Parse raw agent output into a typed result.
    ///
    /// # Errors
    ///
    /// `Error::SchemaValidation` listing every offending field, or
    /// `Error::Validation` when no contract is registered for `schema`.
    pub fn validate(&self, schema: SchemaRef, raw: &Value) -> Result<TypedResult> {
        let contract = self
            .contract(schema)
            .ok_or_else(|| Error::Validation(format!("no contract registered for {}", schema)))?;

        let object = raw.as_object().ok_or_else(|| Error::SchemaValidation {
            schema,
            violations: vec![FieldViolation::new("$", "result must be a JSON object")],
        })?;

        let mut reader = FieldReader::new(object);
        let result = (contract.parser)(&mut reader);
        let mut violations = reader.into_violations();
        if violations.is_empty() {
            violations = result.violations();
        }

        if violations.is_empty() {
            Ok(result)
        } else {
            Err(Error::SchemaValidation { schema, violations })
        }
    }

    /// Re-check a result that was handed back already typed.
    pub fn check(&self, result: &TypedResult, expected: SchemaRef) -> Result<()> {
        if result.schema() != expected {
            return Err(Error::SchemaValidation {
                schema: expected,
                violations: vec![FieldViolation::new(
                    "$",
                    &format!("expected a {} result, got {}", expected, result.schema()),
                )],
            });
        }
        let violations = result.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaValidation {
                schema: expected,
                violations,
            })
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Reads typed fields out of a JSON object, collecting violations.
///
/// `null` is treated the same as an absent field. Nothing is coerced: a
/// numeric string is not a number, and a float is not an integer.
struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    violations: Vec<FieldViolation>,
}

impl<'a> FieldReader<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            violations: Vec::new(),
        }
    }

    fn into_violations(self) -> Vec<FieldViolation> {
        self.violations
    }

    fn violate(&mut self, field: &str, constraint: &str) {
        self.violations.push(FieldViolation::new(field, constraint));
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.object.get(field).filter(|v| !v.is_null())
    }

    fn optional_text(&mut self, field: &str) -> Option<String> {
        match self.get(field) {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.violate(field, "must be a string");
                None
            }
        }
    }

    fn required_text(&mut self, field: &str) -> String {
        if self.get(field).is_none() {
            self.violate(field, "required field is missing");
            return String::new();
        }
        self.optional_text(field).unwrap_or_default()
    }

    fn text_or_unknown(&mut self, field: &str) -> String {
        self.optional_text(field)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn flag(&mut self, field: &str, default: bool) -> bool {
        match self.get(field) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.violate(field, "must be a boolean");
                default
            }
        }
    }

    fn text_list(&mut self, field: &str) -> Vec<String> {
        match self.get(field) {
            None => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => {
                            self.violate(field, "must contain only strings");
                            return Vec::new();
                        }
                    }
                }
                out
            }
            Some(_) => {
                self.violate(field, "must be an array of strings");
                Vec::new()
            }
        }
    }

    fn optional_count(&mut self, field: &str) -> Option<u64> {
        let value = self.get(field)?;
        match value.as_u64() {
            Some(n) => Some(n),
            None => {
                self.violate(field, "must be a non-negative integer");
                None
            }
        }
    }

    fn optional_number(&mut self, field: &str) -> Option<f64> {
        let value = self.get(field)?;
        match value.as_f64() {
            Some(n) if n.is_finite() => Some(n),
            _ => {
                self.violate(field, "must be a number");
                None
            }
        }
    }

    fn confidence_value(&mut self, field: &str, value: &Value) -> Confidence {
        match value.as_i64() {
            Some(n) => match Confidence::new(n) {
                Some(c) => c,
                None => {
                    self.violate(field, "must be between 0 and 5");
                    Confidence::MIN
                }
            },
            None => {
                self.violate(field, "must be an integer between 0 and 5");
                Confidence::MIN
            }
        }
    }

    fn confidence(&mut self, field: &str) -> Confidence {
        match self.get(field) {
            None => {
                self.violate(field, "required field is missing");
                Confidence::MIN
            }
            Some(value) => self.confidence_value(field, value),
        }
    }

    fn explanation(&mut self, field: &str) -> String {
        let text = self.optional_text(field).unwrap_or_default();
        if text.trim().is_empty() {
            self.violate(field, "must be non-empty when a confidence rating is given");
        }
        text
    }

    /// `<prefix>`, `<prefix>_confidence`, `<prefix>_confidence_explanation`.
    fn rating_for(&mut self, prefix: &str) -> (Confidence, String) {
        let confidence = self.confidence(&format!("{}_confidence", prefix));
        let explanation = self.explanation(&format!("{}_confidence_explanation", prefix));
        (confidence, explanation)
    }

    fn unit_interval(&mut self, field: &str) -> f64 {
        match self.get(field) {
            None => {
                self.violate(field, "required field is missing");
                0.0
            }
            Some(value) => match value.as_f64() {
                Some(n) if (0.0..=1.0).contains(&n) => n,
                Some(_) => {
                    self.violate(field, "must be between 0 and 1");
                    0.0
                }
                None => {
                    self.violate(field, "must be a number between 0 and 1");
                    0.0
                }
            },
        }
    }

    fn total_count(&mut self, field: &str) -> Option<TotalCount> {
        let value = self.get(field)?;
        if let Some(n) = value.as_u64() {
            return Some(TotalCount::Exact(n));
        }
        if let Some([min, max]) = value.as_array().map(|a| a.as_slice()) {
            if let (Some(min), Some(max)) = (min.as_u64(), max.as_u64()) {
                if min <= max {
                    return Some(TotalCount::Range { min, max });
                }
                self.violate(field, "range minimum exceeds maximum");
                return None;
            }
        }
        self.violate(field, "must be a non-negative integer or a [min, max] pair");
        None
    }
}

fn parse_employee_count(r: &mut FieldReader<'_>) -> TypedResult {
    let company = r.required_text("company");
    let real_time_data_available = r.flag("real_time_data_available", true);
    let data_as_of = r.text_or_unknown("data_as_of");

    let total_value = r.total_count("total");
    let (confidence, explanation) = r.rating_for("total");
    let total = Measured {
        value: total_value,
        confidence,
        confidence_explanation: explanation,
    };

    let growth_value = r.optional_number("growth_rate");
    let growth_rated = r.get("growth_rate_confidence").is_some();
    let growth_rate = if growth_value.is_some() || growth_rated {
        let (confidence, explanation) = r.rating_for("growth_rate");
        Some(Measured {
            value: growth_value,
            confidence,
            confidence_explanation: explanation,
        })
    } else {
        None
    };

    TypedResult::EmployeeCount(EmployeeCount {
        company,
        real_time_data_available,
        data_as_of,
        total,
        growth_rate,
        industry_comparison: r.text_or_unknown("industry_comparison"),
        sources: r.text_list("sources"),
        notes: r.optional_text("notes"),
    })
}

fn parse_data_professional_count(r: &mut FieldReader<'_>) -> TypedResult {
    let company = r.required_text("company");
    let real_time_data_available = r.flag("real_time_data_available", true);
    let value = r.optional_count("data_professional_count");
    let (confidence, explanation) = r.rating_for("data_professional_count");

    let mut roles = BTreeMap::new();
    match r.get("roles") {
        None => {}
        Some(Value::Object(map)) => {
            for (role, count) in map {
                match count.as_u64() {
                    Some(n) => {
                        roles.insert(role.clone(), n);
                    }
                    None => r.violate(
                        &format!("roles.{}", role),
                        "must be a non-negative integer",
                    ),
                }
            }
        }
        Some(_) => r.violate("roles", "must be an object of role -> count"),
    }

    TypedResult::DataProfessionalCount(DataProfessionalCount {
        company,
        real_time_data_available,
        count: Measured {
            value,
            confidence,
            confidence_explanation: explanation,
        },
        roles,
        sources: r.text_list("sources"),
        notes: r.optional_text("notes"),
    })
}

fn parse_data_stack(r: &mut FieldReader<'_>) -> TypedResult {
    let company = r.required_text("company");
    let real_time_data_available = r.flag("real_time_data_available", true);

    let mut tools = Vec::new();
    match r.get("tools") {
        None => {}
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let path = format!("tools[{}]", i);
                let Some(entry) = item.as_object() else {
                    r.violate(&path, "must be an object with name and confidence");
                    continue;
                };
                let name = match entry.get("name").and_then(Value::as_str) {
                    Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                    _ => {
                        r.violate(&format!("{}.name", path), "required field is missing");
                        continue;
                    }
                };
                let confidence = match entry.get("confidence").filter(|v| !v.is_null()) {
                    Some(v) => r.confidence_value(&format!("{}.confidence", path), v),
                    None => {
                        r.violate(&format!("{}.confidence", path), "required field is missing");
                        Confidence::MIN
                    }
                };
                let explanation = entry
                    .get("confidence_explanation")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if explanation.trim().is_empty() {
                    r.violate(
                        &format!("{}.confidence_explanation", path),
                        "must be non-empty when a confidence rating is given",
                    );
                }
                tools.push(RatedTool {
                    name,
                    confidence,
                    confidence_explanation: explanation,
                });
            }
        }
        Some(_) => r.violate("tools", "must be an array of rated tools"),
    }

    TypedResult::DataStack(DataStack {
        company,
        real_time_data_available,
        tools,
        primary_languages: r.text_list("primary_languages"),
        sources: r.text_list("sources"),
        notes: r.optional_text("notes"),
    })
}

fn parse_icp_score(r: &mut FieldReader<'_>) -> TypedResult {
    let score = match r.get("score") {
        None => {
            r.violate("score", "required field is missing");
            0
        }
        Some(value) => match value.as_u64() {
            Some(n) if n <= 100 => n as u8,
            Some(_) => {
                r.violate("score", "must be between 0 and 100");
                0
            }
            None => {
                r.violate("score", "must be an integer between 0 and 100");
                0
            }
        },
    };

    let employee_factor = r.unit_interval("employee_factor");
    let data_team_factor = r.unit_interval("data_team_factor");
    let tech_stack_factor = r.unit_interval("tech_stack_factor");
    let key_tools = r.text_list("key_tools");
    let explanation = r.required_text("explanation");
    let confidence = r.confidence("confidence");
    let confidence_explanation = r.explanation("confidence_explanation");

    TypedResult::IcpScore(IcpScore {
        score,
        employee_factor,
        data_team_factor,
        tech_stack_factor,
        key_tools,
        explanation,
        confidence,
        confidence_explanation,
        real_time_data_available: r.flag("real_time_data_available", true),
        sources: r.text_list("sources"),
        notes: r.optional_text("notes"),
    })
}
