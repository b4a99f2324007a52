//! Typed result contracts for research nodes.
//!
//! Every research node must hand back one of the [`TypedResult`] variants.
//! The [`SchemaRegistry`] turns an agent's raw JSON into a typed result or
//! rejects it with the offending fields listed.

mod confidence;
mod registry;
mod results;

pub use confidence::{Confidence, Measured, OFFLINE_CONFIDENCE_CAP, OFFLINE_PENALTY, UNKNOWN};
pub use registry::{FieldSpec, FieldViolation, SchemaContract, SchemaRegistry};
pub use results::{
    DataProfessionalCount, DataStack, EmployeeCount, IcpScore, RatedTool, SchemaRef, TotalCount,
    TypedResult,
};
