//! Rule generation pipeline

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use rulesmith_core::{
    validate, Error, MediaReference, PromptAssembler, RuleOutput, RuleRequest,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::upload::{StoredUpload, UploadStore};
use crate::upstream::{OpenAiGenerator, RuleGenerator};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServiceConfig>,

    /// Model client producing rule candidates
    pub generator: Arc<dyn RuleGenerator>,

    pub assembler: PromptAssembler,

    /// Where uploaded reference media is written
    pub uploads: UploadStore,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Initialize application state from configuration
    pub async fn new(config: ServiceConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        info!("Initializing application state");

        let generator = OpenAiGenerator::new(&config.model)?;
        if let Err(e) = generator.ready() {
            warn!("{}; rule generation will answer 503 until it is set", e);
        }

        let uploads = UploadStore::open(&config.uploads.dir).await?;
        info!("Uploads stored in {}", uploads.dir().display());

        Ok(Self::with_generator(
            config,
            Arc::new(generator),
            uploads,
            metrics_handle,
        ))
    }

    /// Build state around an existing generator
    pub fn with_generator(
        config: ServiceConfig,
        generator: Arc<dyn RuleGenerator>,
        uploads: UploadStore,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            generator,
            assembler: PromptAssembler::new(),
            uploads,
            metrics_handle,
        }
    }
}

/// Generate a request ID
pub fn generate_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

/// Encode stored uploads for the prompt, skipping anything that is not image or video
pub async fn encode_media(uploads: &[StoredUpload]) -> rulesmith_core::Result<Vec<MediaReference>> {
    let mut media = Vec::with_capacity(uploads.len());

    for upload in uploads {
        match upload.to_media_reference().await {
            Ok(reference) => media.push(reference),
            Err(Error::UnsupportedMedia(e)) => {
                warn!("Skipping reference file: {}", e);
                metrics::counter!("rulesmith_media_skipped_total").increment(1);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(media)
}

/// Prompt the model and validate what it returns
pub async fn generate_rule(
    state: &AppState,
    request_id: &str,
    request: &RuleRequest,
    media: &[MediaReference],
) -> rulesmith_core::Result<RuleOutput> {
    state.generator.ready()?;

    let payload = state.assembler.assemble(request, media);
    debug!(
        "[{}] Prompt assembled: {} parts, {} media",
        request_id,
        payload.parts().len(),
        payload.media_count()
    );

    let candidate = state.generator.generate(&payload).await?;

    let rule = validate(candidate).map_err(|e| {
        warn!("[{}] Model output rejected by {}: {}", request_id, e.rule(), e);
        metrics::counter!(
            "rulesmith_validation_failures_total",
            "rule" => e.rule().number().to_string()
        )
        .increment(1);
        e
    })?;

    for expression in rule.expressions() {
        info!("[{}] Rule '{}' generated: {}", request_id, request.name, expression);
    }

    Ok(rule)
}
