//! Media classification for reference uploads

use serde::{Deserialize, Serialize};

/// Kind of reference media the model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// An uploaded file whose declared type is neither image nor video
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported media type '{content_type}' for file '{file_name}'")]
pub struct UnsupportedMediaError {
    pub file_name: String,
    pub content_type: String,
}

impl MediaKind {
    /// Classify by declared content type: `image/*` or `video/*`.
    ///
    /// Matching ignores case and any parameters after `;`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        let (top, sub) = essence.split_once('/')?;
        if sub.is_empty() {
            return None;
        }
        if top.eq_ignore_ascii_case("image") {
            Some(MediaKind::Image)
        } else if top.eq_ignore_ascii_case("video") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Like [`MediaKind::from_content_type`] but names the file on failure
    pub fn classify(file_name: &str, content_type: &str) -> Result<Self, UnsupportedMediaError> {
        Self::from_content_type(content_type).ok_or_else(|| UnsupportedMediaError {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// An already-encoded media reference handed to the prompt assembler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub kind: MediaKind,
    pub file_name: String,
    /// Encoded reference, typically a `data:` URI
    pub encoded: String,
}

impl MediaReference {
    pub fn new(kind: MediaKind, file_name: impl Into<String>, encoded: impl Into<String>) -> Self {
        Self {
            kind,
            file_name: file_name.into(),
            encoded: encoded.into(),
        }
    }
}
