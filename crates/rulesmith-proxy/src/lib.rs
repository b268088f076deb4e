//! Rulesmith Proxy
//!
//! HTTP service that turns a rule name, a monitoring intent and reference media
//! into a validated rule graph by prompting a multimodal model.

pub mod cli;
pub mod config;
pub mod proxy;
pub mod routes;
pub mod security;
pub mod upload;
pub mod upstream;

pub use config::ServiceConfig;
pub use proxy::AppState;
pub use routes::create_router;
pub use upload::UploadStore;
pub use upstream::{OpenAiGenerator, RuleGenerator};
