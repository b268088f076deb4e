//! Structured-output contract with the model
//!
//! The JSON Schema is derived from the wire types, so the field names, nesting
//! and enum values the model is told about are exactly the ones that
//! deserialization accepts.

use serde_json::{json, Value};

use crate::types::RuleCandidate;

/// Name under which the schema is registered with the model
pub const SCHEMA_NAME: &str = "rule_output";

/// JSON Schema of a [`RuleCandidate`]
pub fn rule_output_schema() -> Value {
    schemars::schema_for!(RuleCandidate).as_value().clone()
}

/// `response_format` value for OpenAI-compatible chat completions
pub fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "schema": rule_output_schema(),
        }
    })
}
