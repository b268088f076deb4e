use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rulesmith_core::{schema, validate, RuleCandidate, TemporalThreshold};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "rulesmith-proxy")]
#[command(
    author,
    version,
    about = "Turns monitoring intents and reference media into validated rule graphs"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Validate a rule JSON file and print its expressions
    Validate {
        /// Path to the rule JSON file
        path: PathBuf,
    },

    /// Print the JSON Schema sent to the model
    Schema,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "rulesmith.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// API key for the model endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name
    #[arg(short, long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// Directory for uploaded reference files
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Model call timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Validate a rule file and describe it, one expression per line
pub fn validate_rule_file(path: &Path) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let candidate: RuleCandidate = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a rule document", path.display()))?;
    let rule = validate(candidate).map_err(|e| anyhow::anyhow!("Invalid rule ({}): {}", e.rule(), e))?;

    let mut report = String::new();
    writeln!(report, "Targets: {}", rule.visual_detection().target_objects().join(", "))?;
    for expression in rule.expressions() {
        writeln!(report, "Trigger: {}", expression)?;
    }
    match rule.trigger_logic().temporal_threshold() {
        TemporalThreshold::Seconds(secs) => writeln!(report, "Sustained for: {}s", secs)?,
        TemporalThreshold::SpecifiedInConditions => {
            writeln!(report, "Sustained for: see conditions")?
        }
    }
    write!(report, "Alert: {}", rule.alert_message())?;
    Ok(report)
}

/// Pretty-printed structured-output schema
pub fn schema_document() -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&schema::response_format())?)
}
