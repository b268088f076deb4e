//! Reference media storage
//!
//! Uploaded files are streamed to disk under a unique name, classified as image
//! or video, and re-read as base64 `data:` URIs when the prompt is assembled.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use rulesmith_core::{MediaKind, MediaReference, UnsupportedMediaError};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),

    /// The client body broke off or was malformed mid-file
    #[error("failed to read upload '{file_name}': {message}")]
    Stream { file_name: String, message: String },
}

/// A file persisted to the upload directory
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub path: PathBuf,
    /// Name as sent by the client
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

impl StoredUpload {
    pub fn media_kind(&self) -> Result<MediaKind, UnsupportedMediaError> {
        MediaKind::classify(&self.file_name, &self.content_type)
    }

    /// Read the file back as a `data:{mime};base64,...` reference
    pub async fn to_media_reference(&self) -> rulesmith_core::Result<MediaReference> {
        let kind = self.media_kind()?;
        let bytes = tokio::fs::read(&self.path).await?;
        let encoded = format!(
            "data:{};base64,{}",
            mime_essence(&self.content_type),
            STANDARD.encode(bytes)
        );
        Ok(MediaReference::new(kind, self.file_name.clone(), encoded))
    }
}

/// Upload directory handle
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Open the store, creating the directory when missing
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stream a file body to disk without buffering it whole
    pub async fn persist<S, E>(
        &self,
        file_name: &str,
        declared_type: Option<&str>,
        body: S,
    ) -> Result<StoredUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let path = self
            .dir
            .join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(file_name)));
        let content_type = resolve_content_type(file_name, declared_type);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut size = 0u64;

        futures_util::pin_mut!(body);
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(UploadError::Stream {
                        file_name: file_name.to_string(),
                        message: e.to_string(),
                    });
                }
            };
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(
            "Stored upload '{}' ({}, {} bytes) at {}",
            file_name,
            content_type,
            size,
            path.display()
        );

        Ok(StoredUpload {
            path,
            file_name: file_name.to_string(),
            content_type,
            size,
        })
    }

    /// Delete stored files, logging failures
    pub async fn remove_all(&self, uploads: &[StoredUpload]) {
        for upload in uploads {
            if let Err(e) = tokio::fs::remove_file(&upload.path).await {
                warn!("Failed to remove upload {}: {}", upload.path.display(), e);
            }
        }
    }
}

/// Keep only the final path component and a conservative character set
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Declared type, or a guess from the extension when the client sent none
fn resolve_content_type(file_name: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim) {
        Some(ct) if !ct.is_empty() && !ct.eq_ignore_ascii_case(FALLBACK_CONTENT_TYPE) => {
            ct.to_string()
        }
        _ => mime_guess::from_path(file_name)
            .first_raw()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string(),
    }
}

fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}
