//! Rule schema validation
//!
//! The model is asked to follow the rule schema, but its claim of conformance is
//! not trusted. [`validate`] runs the numbered checks below in order and stops at
//! the first failure:
//!
//! 1. `target_objects` is non-empty and has no blank entries
//! 2. node ids are non-empty and unique
//! 3. logic nodes carry AND/OR and an empty label
//! 4. content nodes carry no operator and a non-blank label
//! 5. edge ids are unique and every endpoint resolves to a node
//! 6. the graph is a connected DAG whose leaves are the content nodes
//! 7. `temporal_threshold_seconds` is -1 or positive
//! 8. `alert_message` is non-blank

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::types::{
    CandidateNode, Edge, LogicOperator, LogicTypeTag, Node, NodeKind, NodeType, RuleCandidate,
    RuleOutput, TemporalThreshold, TriggerLogic, VisualDetection,
};

/// Numbered validation rules, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValidationRule {
    TargetObjects = 1,
    UniqueNodeIds = 2,
    LogicNodeShape = 3,
    ContentNodeShape = 4,
    EdgeReferences = 5,
    GraphShape = 6,
    TemporalThreshold = 7,
    AlertMessage = 8,
}

impl ValidationRule {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ValidationRule::TargetObjects => "target_objects",
            ValidationRule::UniqueNodeIds => "unique_node_ids",
            ValidationRule::LogicNodeShape => "logic_node_shape",
            ValidationRule::ContentNodeShape => "content_node_shape",
            ValidationRule::EdgeReferences => "edge_references",
            ValidationRule::GraphShape => "graph_shape",
            ValidationRule::TemporalThreshold => "temporal_threshold",
            ValidationRule::AlertMessage => "alert_message",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule {} ({})", self.number(), self.name())
    }
}

/// Why a candidate rule was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("visual_detection.target_objects must not be empty")]
    NoTargetObjects,

    #[error("target object at index {index} is blank")]
    BlankTargetObject { index: usize },

    #[error("node at index {index} has an empty id")]
    EmptyNodeId { index: usize },

    #[error("node id '{id}' is used more than once")]
    DuplicateNodeId { id: String },

    #[error("logic node '{id}' must carry logicType AND or OR")]
    MissingLogicOperator { id: String },

    #[error("logic node '{id}' must have an empty label")]
    LabelOnLogicNode { id: String },

    #[error("content node '{id}' must not carry a logicType")]
    OperatorOnContentNode { id: String },

    #[error("content node '{id}' must have a non-empty label")]
    EmptyContentLabel { id: String },

    #[error("edge id '{id}' is used more than once")]
    DuplicateEdgeId { id: String },

    #[error("edge '{edge}' references unknown node '{node}'")]
    DanglingEdge { edge: String, node: String },

    #[error("trigger logic must contain at least one content node")]
    NoConditions,

    #[error("{conditions} content nodes must be combined by at least one logic node")]
    MissingLogicNode { conditions: usize },

    #[error("edge '{edge}' starts at content node '{node}'; content nodes are leaves")]
    ContentNodeHasChildren { edge: String, node: String },

    #[error("cycle detected through node '{node}'")]
    Cycle { node: String },

    #[error("content node '{id}' is not attached to any logic node")]
    DetachedCondition { id: String },

    #[error("node '{id}' is disconnected from the rest of the graph")]
    DisconnectedNode { id: String },

    #[error("temporal_threshold_seconds must be -1 or a positive number of seconds, got {value}")]
    InvalidTemporalThreshold { value: i64 },

    #[error("alert_message must not be empty")]
    EmptyAlertMessage,
}

impl ValidationError {
    /// The numbered rule this failure belongs to
    pub fn rule(&self) -> ValidationRule {
        use ValidationError::*;
        match self {
            NoTargetObjects | BlankTargetObject { .. } => ValidationRule::TargetObjects,
            EmptyNodeId { .. } | DuplicateNodeId { .. } => ValidationRule::UniqueNodeIds,
            MissingLogicOperator { .. } | LabelOnLogicNode { .. } => ValidationRule::LogicNodeShape,
            OperatorOnContentNode { .. } | EmptyContentLabel { .. } => {
                ValidationRule::ContentNodeShape
            }
            DuplicateEdgeId { .. } | DanglingEdge { .. } => ValidationRule::EdgeReferences,
            NoConditions
            | MissingLogicNode { .. }
            | ContentNodeHasChildren { .. }
            | Cycle { .. }
            | DetachedCondition { .. }
            | DisconnectedNode { .. } => ValidationRule::GraphShape,
            InvalidTemporalThreshold { .. } => ValidationRule::TemporalThreshold,
            EmptyAlertMessage => ValidationRule::AlertMessage,
        }
    }

    /// Id of the offending node or edge, when there is one
    pub fn subject(&self) -> Option<&str> {
        use ValidationError::*;
        match self {
            DuplicateNodeId { id }
            | MissingLogicOperator { id }
            | LabelOnLogicNode { id }
            | OperatorOnContentNode { id }
            | EmptyContentLabel { id }
            | DuplicateEdgeId { id }
            | DetachedCondition { id }
            | DisconnectedNode { id } => Some(id),
            DanglingEdge { edge, .. } | ContentNodeHasChildren { edge, .. } => Some(edge),
            Cycle { node } => Some(node),
            _ => None,
        }
    }
}

/// Validate a candidate and turn it into a [`RuleOutput`].
///
/// Pure; the candidate is consumed only so its strings move into the result.
pub fn validate(candidate: RuleCandidate) -> Result<RuleOutput, ValidationError> {
    let RuleCandidate {
        visual_detection,
        trigger_logic,
        alert_message,
    } = candidate;

    // 1
    check_target_objects(&visual_detection.target_objects)?;

    // 2
    check_node_ids(&trigger_logic.nodes)?;

    // 3
    for node in trigger_logic.nodes.iter().filter(|n| n.node_type == NodeType::Logic) {
        if LogicOperator::from_tag(node.data.logic_type).is_none() {
            return Err(ValidationError::MissingLogicOperator { id: node.id.clone() });
        }
        if !node.data.label.is_empty() {
            return Err(ValidationError::LabelOnLogicNode { id: node.id.clone() });
        }
    }

    // 4
    let nodes = trigger_logic
        .nodes
        .into_iter()
        .map(into_node)
        .collect::<Result<Vec<_>, _>>()?;

    // 5
    let graph = Graph::build(&nodes, &trigger_logic.edges)?;

    // 6
    graph.check_shape(&trigger_logic.edges)?;

    // 7
    let temporal_threshold = TemporalThreshold::from_seconds(trigger_logic.temporal_threshold_seconds)
        .ok_or(ValidationError::InvalidTemporalThreshold {
            value: trigger_logic.temporal_threshold_seconds,
        })?;

    // 8
    if alert_message.trim().is_empty() {
        return Err(ValidationError::EmptyAlertMessage);
    }

    Ok(RuleOutput {
        visual_detection: VisualDetection {
            target_objects: visual_detection.target_objects,
        },
        trigger_logic: TriggerLogic {
            nodes,
            edges: trigger_logic.edges,
            temporal_threshold,
        },
        alert_message,
    })
}

fn check_target_objects(objects: &[String]) -> Result<(), ValidationError> {
    if objects.is_empty() {
        return Err(ValidationError::NoTargetObjects);
    }
    match objects.iter().position(|o| o.trim().is_empty()) {
        Some(index) => Err(ValidationError::BlankTargetObject { index }),
        None => Ok(()),
    }
}

fn check_node_ids(nodes: &[CandidateNode]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for (index, node) in nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(ValidationError::EmptyNodeId { index });
        }
        if !seen.insert(node.id.as_str()) {
            return Err(ValidationError::DuplicateNodeId { id: node.id.clone() });
        }
    }
    Ok(())
}

fn into_node(node: CandidateNode) -> Result<Node, ValidationError> {
    let CandidateNode { id, node_type, data } = node;
    let kind = match node_type {
        NodeType::Logic => match LogicOperator::from_tag(data.logic_type) {
            Some(op) => NodeKind::Logic(op),
            None => return Err(ValidationError::MissingLogicOperator { id }),
        },
        NodeType::Content => {
            if data.logic_type != LogicTypeTag::None {
                return Err(ValidationError::OperatorOnContentNode { id });
            }
            if data.label.trim().is_empty() {
                return Err(ValidationError::EmptyContentLabel { id });
            }
            NodeKind::Content { label: data.label }
        }
    };
    Ok(Node { id, kind })
}

/// Index-based view of the rule graph. Node positions are the arena keys; edges
/// are stored as resolved `(source, target)` index pairs.
struct Graph<'a> {
    nodes: &'a [Node],
    links: Vec<(usize, usize)>,
    children: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl<'a> Graph<'a> {
    fn build(nodes: &'a [Node], edges: &[Edge]) -> Result<Self, ValidationError> {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut edge_ids = HashSet::with_capacity(edges.len());
        for edge in edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(ValidationError::DuplicateEdgeId { id: edge.id.clone() });
            }
        }

        let mut links = Vec::with_capacity(edges.len());
        let mut children = vec![Vec::new(); nodes.len()];
        for edge in edges {
            let resolve = |id: &str| {
                index.get(id).copied().ok_or_else(|| ValidationError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: id.to_string(),
                })
            };
            let source = resolve(&edge.source)?;
            let target = resolve(&edge.target)?;
            links.push((source, target));
            children[source].push(target);
        }

        Ok(Self {
            nodes,
            links,
            children,
        })
    }

    fn check_shape(&self, edges: &[Edge]) -> Result<(), ValidationError> {
        let conditions = self.nodes.iter().filter(|n| n.is_content()).count();
        if conditions == 0 {
            return Err(ValidationError::NoConditions);
        }
        if conditions > 1 && !self.nodes.iter().any(Node::is_logic) {
            return Err(ValidationError::MissingLogicNode { conditions });
        }

        for (edge, &(source, _)) in edges.iter().zip(&self.links) {
            if self.nodes[source].is_content() {
                return Err(ValidationError::ContentNodeHasChildren {
                    edge: edge.id.clone(),
                    node: self.nodes[source].id.clone(),
                });
            }
        }

        self.check_acyclic()?;

        if self.nodes.len() > 1 {
            self.check_connected()?;
        }

        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), ValidationError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            // (node, index of the next child to visit)
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::InProgress;

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let Some(&child) = self.children[node].get(top.1) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                top.1 += 1;

                match marks[child] {
                    Mark::InProgress => {
                        return Err(ValidationError::Cycle {
                            node: self.nodes[child].id.clone(),
                        })
                    }
                    Mark::Unvisited => {
                        marks[child] = Mark::InProgress;
                        stack.push((child, 0));
                    }
                    Mark::Done => {}
                }
            }
        }

        Ok(())
    }

    fn check_connected(&self) -> Result<(), ValidationError> {
        let mut has_parent = vec![false; self.nodes.len()];
        let mut neighbours = vec![Vec::new(); self.nodes.len()];
        for &(source, target) in &self.links {
            has_parent[target] = true;
            neighbours[source].push(target);
            neighbours[target].push(source);
        }

        if let Some(node) = self
            .nodes
            .iter()
            .zip(&has_parent)
            .find(|(n, parent)| n.is_content() && !**parent)
            .map(|(n, _)| n)
        {
            return Err(ValidationError::DetachedCondition { id: node.id.clone() });
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([0usize]);
        seen[0] = true;
        while let Some(node) = queue.pop_front() {
            for &next in &neighbours[node] {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }

        match seen.iter().position(|s| !s) {
            Some(i) => Err(ValidationError::DisconnectedNode {
                id: self.nodes[i].id.clone(),
            }),
            None => Ok(()),
        }
    }
}
