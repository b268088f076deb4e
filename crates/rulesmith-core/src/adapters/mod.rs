//! Model Adapters
//!
//! Request builders and response parsers for the model endpoints Rulesmith talks to.

mod openai;

pub use openai::{
    parse_candidate, ChatCompletionRequest, ChatMessage, OpenAiAdapter, DEFAULT_FREQUENCY_PENALTY,
    DEFAULT_TEMPERATURE,
};
