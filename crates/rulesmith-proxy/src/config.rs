//! Service configuration

use rulesmith_core::adapters::{DEFAULT_FREQUENCY_PENALTY, DEFAULT_TEMPERATURE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::ServeArgs;
use crate::security::{check_model_endpoint, EndpointPolicy};

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub uploads: UploadConfig,
}

impl ServiceConfig {
    /// Load configuration from file and CLI/environment overrides
    pub fn load(args: &ServeArgs) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(&args.config).exists() {
            let content = std::fs::read_to_string(&args.config)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(args);
        config.check()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    fn apply_overrides(&mut self, args: &ServeArgs) {
        if let Some(listen) = &args.listen {
            self.server.listen = listen.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(base_url) = &args.base_url {
            self.model.base_url = base_url.clone();
        }
        if let Some(api_key) = args.api_key.as_ref().filter(|k| !k.is_empty()) {
            self.model.api_key = Some(api_key.clone());
        }
        if let Some(model) = &args.model {
            self.model.model = model.clone();
        }
        if let Some(dir) = &args.upload_dir {
            self.uploads.dir = dir.clone();
        }
        if let Some(secs) = args.timeout_secs {
            self.model.timeout_secs = secs;
        }
    }

    /// Reject settings the service cannot run with
    pub fn check(&self) -> anyhow::Result<()> {
        let policy = if self.model.allow_local_endpoint {
            EndpointPolicy::local()
        } else {
            EndpointPolicy::default()
        };
        check_model_endpoint(&self.model.base_url, &policy)
            .map_err(|e| anyhow::anyhow!("Invalid model base_url '{}': {}", self.model.base_url, e))?;

        if self.model.timeout_secs == 0 {
            anyhow::bail!("model.timeout_secs must be greater than 0");
        }
        if self.model.model.trim().is_empty() {
            anyhow::bail!("model.model must not be empty");
        }
        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; usually supplied through `OPENAI_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_frequency_penalty")]
    pub frequency_penalty: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Allow plain HTTP and loopback/private hosts (self-hosted models)
    #[serde(default)]
    pub allow_local_endpoint: bool,
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            frequency_penalty: default_frequency_penalty(),
            timeout_secs: default_timeout_secs(),
            allow_local_endpoint: false,
        }
    }
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Largest accepted request body, files included
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Keep uploaded files on disk after the request
    #[serde(default = "default_true")]
    pub retain: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_request_bytes: default_max_request_bytes(),
            retain: true,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://127.0.0.1:5173".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_frequency_penalty() -> f32 {
    DEFAULT_FREQUENCY_PENALTY
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploaded_files")
}

fn default_max_request_bytes() -> usize {
    200 * 1024 * 1024
}

fn default_true() -> bool {
    true
}
