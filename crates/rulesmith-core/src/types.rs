//! Rule graph types
//!
//! Two shapes live here. The `Candidate*` structs mirror the JSON the model is
//! asked to produce, field for field, and are what gets deserialized from the
//! model's answer. [`RuleOutput`] and friends are the validated form: logic and
//! content nodes are distinct variants, and the only way to obtain one is
//! through [`crate::validate`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU32;

use crate::validate::{validate, ValidationError};

// =============================================================================
// Wire shape
// =============================================================================

/// Complete structured rule as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleCandidate {
    /// Objects the downstream vision model must focus on.
    pub visual_detection: CandidateVisualDetection,

    /// Logic graph describing when the rule is violated.
    pub trigger_logic: CandidateTriggerLogic,

    /// Alert and advice shown to the operator once the rule is violated. Must state
    /// clearly what to do next.
    pub alert_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateVisualDetection {
    /// Objects the vision model must detect when evaluating the rule. Each entry is a
    /// detailed, precise and visually distinguishable natural-language description.
    pub target_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateTriggerLogic {
    /// Nodes of the logic graph.
    pub nodes: Vec<CandidateNode>,

    /// Edges of the logic graph, from a logic node to each of its operands.
    pub edges: Vec<Edge>,

    /// How many seconds a condition must persist to count as a violation. -1 when the
    /// monitoring intent states the duration explicitly (the duration then appears in
    /// the content node labels); otherwise a recommended threshold greater than 0.
    pub temporal_threshold_seconds: i64,
}

/// A node of the logic graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateNode {
    /// Unique node id.
    pub id: String,

    /// 'logic' for AND/OR combinators, 'content' for rule conditions.
    #[serde(rename = "type")]
    pub node_type: NodeType,

    pub data: CandidateNodeData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Logic,
    Content,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Logic => "logic",
            NodeType::Content => "content",
        }
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateNodeData {
    /// 'AND' or 'OR' only when type is 'logic', otherwise ''.
    #[serde(rename = "logicType")]
    pub logic_type: LogicTypeTag,

    /// Rule condition, only meaningful when type is 'content' (otherwise ''). Its
    /// subject or object should appear in target_objects, it describes one concrete
    /// violation state and should be as atomic as possible.
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum LogicTypeTag {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "")]
    None,
}

/// An edge of the logic graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    /// Unique edge id.
    pub id: String,

    /// Source node id.
    pub source: String,

    /// Target node id.
    pub target: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

impl CandidateNode {
    /// Create a logic node carrying the given operator
    pub fn logic(id: impl Into<String>, operator: LogicOperator) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Logic,
            data: CandidateNodeData {
                logic_type: operator.into(),
                label: String::new(),
            },
        }
    }

    /// Create a content node carrying the given condition
    pub fn content(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Content,
            data: CandidateNodeData {
                logic_type: LogicTypeTag::None,
                label: label.into(),
            },
        }
    }
}

// =============================================================================
// Validated shape
// =============================================================================

/// A rule that satisfied every structural check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RuleCandidate", try_from = "RuleCandidate")]
pub struct RuleOutput {
    pub(crate) visual_detection: VisualDetection,
    pub(crate) trigger_logic: TriggerLogic,
    pub(crate) alert_message: String,
}

impl RuleOutput {
    pub fn visual_detection(&self) -> &VisualDetection {
        &self.visual_detection
    }

    pub fn trigger_logic(&self) -> &TriggerLogic {
        &self.trigger_logic
    }

    pub fn alert_message(&self) -> &str {
        &self.alert_message
    }

    /// Convert back into the wire shape
    pub fn to_candidate(&self) -> RuleCandidate {
        self.clone().into()
    }
}

impl TryFrom<RuleCandidate> for RuleOutput {
    type Error = ValidationError;

    fn try_from(candidate: RuleCandidate) -> Result<Self, Self::Error> {
        validate(candidate)
    }
}

impl From<RuleOutput> for RuleCandidate {
    fn from(rule: RuleOutput) -> Self {
        let RuleOutput {
            visual_detection,
            trigger_logic,
            alert_message,
        } = rule;

        RuleCandidate {
            visual_detection: CandidateVisualDetection {
                target_objects: visual_detection.target_objects,
            },
            trigger_logic: CandidateTriggerLogic {
                temporal_threshold_seconds: trigger_logic.temporal_threshold.as_seconds(),
                nodes: trigger_logic.nodes.into_iter().map(CandidateNode::from).collect(),
                edges: trigger_logic.edges,
            },
            alert_message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualDetection {
    pub(crate) target_objects: Vec<String>,
}

impl VisualDetection {
    pub fn target_objects(&self) -> &[String] {
        &self.target_objects
    }
}

/// Validated logic graph. Every edge endpoint resolves, there are no cycles, and
/// content nodes are leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerLogic {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) temporal_threshold: TemporalThreshold,
}

impl TriggerLogic {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn temporal_threshold(&self) -> TemporalThreshold {
        self.temporal_threshold
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Operands of a node, in edge order
    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == id)
            .filter_map(move |e| self.node(&e.target))
    }

    /// Nodes that are not the target of any edge, in node order
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .iter()
            .filter(move |n| !targets.contains(n.id.as_str()))
    }

    pub fn content_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_content())
    }

    pub fn logic_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_logic())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_logic(&self) -> bool {
        matches!(self.kind, NodeKind::Logic(_))
    }

    pub fn is_content(&self) -> bool {
        matches!(self.kind, NodeKind::Content { .. })
    }

    /// Condition text of a content node
    pub fn label(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Content { label } => Some(label),
            NodeKind::Logic(_) => None,
        }
    }

    pub fn operator(&self) -> Option<LogicOperator> {
        match self.kind {
            NodeKind::Logic(op) => Some(op),
            NodeKind::Content { .. } => None,
        }
    }
}

impl From<Node> for CandidateNode {
    fn from(node: Node) -> Self {
        match node.kind {
            NodeKind::Logic(op) => CandidateNode::logic(node.id, op),
            NodeKind::Content { label } => CandidateNode::content(node.id, label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// AND/OR combinator over its children
    Logic(LogicOperator),
    /// Leaf condition describing one observable violation state
    Content { label: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicOperator {
    And,
    Or,
}

impl LogicOperator {
    pub fn from_tag(tag: LogicTypeTag) -> Option<Self> {
        match tag {
            LogicTypeTag::And => Some(LogicOperator::And),
            LogicTypeTag::Or => Some(LogicOperator::Or),
            LogicTypeTag::None => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicOperator::And => "AND",
            LogicOperator::Or => "OR",
        }
    }
}

impl From<LogicOperator> for LogicTypeTag {
    fn from(op: LogicOperator) -> Self {
        match op {
            LogicOperator::And => LogicTypeTag::And,
            LogicOperator::Or => LogicTypeTag::Or,
        }
    }
}

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Duration a condition must persist before it counts as a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalThreshold {
    /// The intent states the duration itself; it lives in the condition labels.
    SpecifiedInConditions,
    /// Recommended threshold in seconds.
    Seconds(NonZeroU32),
}

impl TemporalThreshold {
    /// Wire value of the "specified in conditions" sentinel
    pub const SENTINEL: i64 = -1;

    /// Parse the wire value; anything other than -1 or a positive `u32` is rejected
    pub fn from_seconds(value: i64) -> Option<Self> {
        if value == Self::SENTINEL {
            return Some(TemporalThreshold::SpecifiedInConditions);
        }
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(TemporalThreshold::Seconds)
    }

    pub fn as_seconds(&self) -> i64 {
        match self {
            TemporalThreshold::SpecifiedInConditions => Self::SENTINEL,
            TemporalThreshold::Seconds(secs) => i64::from(secs.get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_field_names() {
        let json = r#"{
            "visual_detection": {"target_objects": ["worker", "phone"]},
            "trigger_logic": {
                "nodes": [
                    {"id": "0", "type": "content", "data": {"logicType": "", "label": "worker is using a phone"}}
                ],
                "edges": [],
                "temporal_threshold_seconds": 10
            },
            "alert_message": "Worker on the phone, please intervene"
        }"#;

        let candidate: RuleCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.trigger_logic.nodes[0].node_type, NodeType::Content);
        assert_eq!(candidate.trigger_logic.nodes[0].data.logic_type, LogicTypeTag::None);
        assert_eq!(candidate.trigger_logic.temporal_threshold_seconds, 10);
    }

    #[test]
    fn test_unknown_enum_values_fail_to_deserialize() {
        let bad_type = r#"{"id": "0", "type": "todo", "data": {"logicType": "", "label": "x"}}"#;
        assert!(serde_json::from_str::<CandidateNode>(bad_type).is_err());

        let bad_logic = r#"{"id": "0", "type": "logic", "data": {"logicType": "XOR", "label": ""}}"#;
        assert!(serde_json::from_str::<CandidateNode>(bad_logic).is_err());
    }

    #[test]
    fn test_node_serializes_with_wire_names() {
        let node = CandidateNode::logic("root", LogicOperator::Or);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "logic");
        assert_eq!(value["data"]["logicType"], "OR");
        assert_eq!(value["data"]["label"], "");
    }

    #[test]
    fn test_temporal_threshold_parsing() {
        assert_eq!(
            TemporalThreshold::from_seconds(-1),
            Some(TemporalThreshold::SpecifiedInConditions)
        );
        assert_eq!(
            TemporalThreshold::from_seconds(30).map(|t| t.as_seconds()),
            Some(30)
        );
        assert_eq!(TemporalThreshold::from_seconds(0), None);
        assert_eq!(TemporalThreshold::from_seconds(-5), None);
        assert_eq!(TemporalThreshold::from_seconds(i64::from(u32::MAX) + 1), None);
    }

    #[test]
    fn test_rule_output_deserializes_through_validation() {
        let json = r#"{
            "visual_detection": {"target_objects": []},
            "trigger_logic": {"nodes": [], "edges": [], "temporal_threshold_seconds": 5},
            "alert_message": "alert"
        }"#;

        let err = serde_json::from_str::<RuleOutput>(json).unwrap_err();
        assert!(err.to_string().contains("target_objects"));
    }
}
