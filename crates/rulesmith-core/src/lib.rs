//! Rulesmith Core
//!
//! Core types and pure logic shared across Rulesmith components.
//!
//! This crate provides:
//! - The structured rule schema: wire shape and validated shape
//! - The rule validator with numbered, short-circuiting checks
//! - The JSON Schema describing the expected model output
//! - Multimodal prompt assembly and media classification
//! - The OpenAI-compatible request/response adapter
//! - Infix rendering of rule graphs
//! - Error types and result handling

pub mod adapters;
pub mod error;
pub mod expression;
pub mod media;
pub mod prompt;
pub mod schema;
pub mod types;
pub mod validate;

pub use adapters::OpenAiAdapter;
pub use error::{Error, ErrorKind, Result, UpstreamError};
pub use expression::{ExprToken, Expression};
pub use media::{MediaKind, MediaReference, UnsupportedMediaError};
pub use prompt::{ContentPart, PromptAssembler, PromptPayload, RuleRequest};
pub use types::{
    CandidateNode, Edge, LogicOperator, Node, NodeKind, RuleCandidate, RuleOutput,
    TemporalThreshold, TriggerLogic, VisualDetection,
};
pub use validate::{validate, ValidationError, ValidationRule};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::media::{MediaKind, MediaReference};
    pub use crate::prompt::{PromptAssembler, RuleRequest};
    pub use crate::types::{RuleCandidate, RuleOutput};
    pub use crate::validate::{validate, ValidationError};
}
