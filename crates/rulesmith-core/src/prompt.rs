//! Multimodal prompt assembly
//!
//! Builds the single user message sent to the model: an instruction block that
//! embeds the rule name and intent, followed by the reference media in upload
//! order. The output depends only on the inputs.

use serde::{Deserialize, Serialize};

use crate::media::{MediaKind, MediaReference};

/// Rule name and monitoring intent supplied by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRequest {
    pub name: String,
    pub intent: String,
}

impl RuleRequest {
    pub fn new(name: impl AsRef<str>, intent: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_string(),
            intent: intent.as_ref().trim().to_string(),
        }
    }
}

/// One element of a multimodal chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: MediaUrl },
    VideoUrl { video_url: MediaUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrl {
    pub url: String,
}

impl From<&MediaReference> for ContentPart {
    fn from(media: &MediaReference) -> Self {
        let url = MediaUrl {
            url: media.encoded.clone(),
        };
        match media.kind {
            MediaKind::Image => ContentPart::ImageUrl { image_url: url },
            MediaKind::Video => ContentPart::VideoUrl { video_url: url },
        }
    }
}

/// Ordered model input: instruction text first, then media
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PromptPayload {
    parts: Vec<ContentPart>,
}

impl PromptPayload {
    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn into_parts(self) -> Vec<ContentPart> {
        self.parts
    }

    /// The instruction block
    pub fn instructions(&self) -> &str {
        match self.parts.first() {
            Some(ContentPart::Text { text }) => text,
            _ => "",
        }
    }

    pub fn media_count(&self) -> usize {
        self.parts.len().saturating_sub(1)
    }
}

const GUIDANCE: &str = r#"Important: temporal_threshold_seconds works as follows. If the monitoring intent states a duration explicitly, set temporal_threshold_seconds to -1 and put the duration into the content node labels; otherwise give a recommended threshold in seconds (> 0).

Each content node describes one atomic, observable violation state. Its subject or object should appear in target_objects. Logic nodes combine content nodes with AND or OR, carry an empty label, and point to each operand with one edge (source = logic node, target = operand).

Example: detect whether a worker is playing with a phone or is not wearing a yellow helmet
{
  "visual_detection": {
    "target_objects": ["worker", "phone", "yellow helmet"]
  },
  "trigger_logic": {
    "nodes": [
      {"id": "0", "type": "logic", "data": {"logicType": "OR", "label": ""}},
      {"id": "1", "type": "content", "data": {"logicType": "", "label": "worker is playing with a phone"}},
      {"id": "2", "type": "content", "data": {"logicType": "", "label": "worker is not wearing a yellow helmet"}}
    ],
    "edges": [
      {"id": "0", "source": "0", "target": "1"},
      {"id": "1", "source": "0", "target": "2"}
    ],
    "temporal_threshold_seconds": 5
  },
  "alert_message": "A worker is using a phone or is not wearing a yellow helmet. Remind the worker of site safety rules."
}

If the intent does not need to be split, a single content node is enough, with no logic node and no edges. Example: detect whether a worker is playing with a phone
{
  "trigger_logic": {
    "nodes": [
      {"id": "0", "type": "content", "data": {"logicType": "", "label": "worker is playing with a phone"}}
    ],
    "edges": [],
    ...
  },
  ...
}"#;

/// Assembles model input from a rule request and its media
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, request: &RuleRequest, media: &[MediaReference]) -> PromptPayload {
        let mut parts = Vec::with_capacity(media.len() + 1);
        parts.push(ContentPart::Text {
            text: self.instructions(request, media.len()),
        });
        parts.extend(media.iter().map(ContentPart::from));

        tracing::debug!(
            rule = %request.name,
            media = media.len(),
            "assembled prompt payload"
        );

        PromptPayload { parts }
    }

    fn instructions(&self, request: &RuleRequest, media_count: usize) -> String {
        let references = if media_count == 0 {
            "none provided"
        } else {
            "images and video frames are attached to this message"
        };

        format!(
            "You are an expert in configuring visual rule engines. Analyse the monitoring intent \
             and visual references below and produce the structured JSON rule strictly following \
             the provided schema.\n\n\
             1. Rule name: {name}\n\
             2. Monitoring intent: {intent}\n\
             3. Visual references (optional): {references}\n\n\
             {guidance}\n",
            name = request.name,
            guidance = GUIDANCE,
            intent = request.intent,
        )
    }
}
