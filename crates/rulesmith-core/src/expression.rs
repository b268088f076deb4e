//! Infix rendering of a validated rule graph
//!
//! Each root of the graph becomes one expression. Logic nodes render as a
//! parenthesised group with their operator between operands; content nodes render
//! as their condition text. Rendering uses an explicit work stack, so graph depth
//! is not bounded by the thread's stack.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::types::{LogicOperator, Node, NodeKind, RuleOutput, TriggerLogic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExprToken {
    Open { node_id: String },
    Close { node_id: String },
    Operator { node_id: String, operator: LogicOperator },
    Condition { node_id: String, label: String },
    /// A logic node already expanded earlier in the rule
    Ref { node_id: String },
}

/// Token stream for one root of the rule graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expression {
    pub root_id: String,
    pub tokens: Vec<ExprToken>,
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            match token {
                ExprToken::Open { .. } => f.write_str("(")?,
                ExprToken::Close { .. } => f.write_str(")")?,
                ExprToken::Operator { operator, .. } => write!(f, " {} ", operator)?,
                ExprToken::Condition { label, .. } => f.write_str(label)?,
                ExprToken::Ref { node_id } => write!(f, "[{}]", node_id)?,
            }
        }
        Ok(())
    }
}

impl RuleOutput {
    /// Render every root of the trigger graph, in node order
    ///
    /// A logic node reached more than once is expanded on first use and
    /// rendered as a [`ExprToken::Ref`] afterwards, across all roots, so the
    /// output stays linear in the size of the graph.
    pub fn expressions(&self) -> Vec<Expression> {
        Renderer::new(self.trigger_logic()).render_all()
    }
}

enum Step {
    Visit(usize),
    Operator(usize),
    Close(usize),
}

struct Renderer<'a> {
    nodes: &'a [Node],
    children: Vec<Vec<usize>>,
    has_parent: Vec<bool>,
    renders: Vec<bool>,
    expanded: Vec<bool>,
}

impl<'a> Renderer<'a> {
    fn new(logic: &'a TriggerLogic) -> Self {
        let nodes = logic.nodes();
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut children = vec![Vec::new(); nodes.len()];
        let mut has_parent = vec![false; nodes.len()];
        for edge in logic.edges() {
            if let (Some(&source), Some(&target)) = (
                index.get(edge.source.as_str()),
                index.get(edge.target.as_str()),
            ) {
                children[source].push(target);
                has_parent[target] = true;
            }
        }

        let renders = renders_tokens(nodes, &children);
        Self {
            nodes,
            children,
            has_parent,
            renders,
            expanded: vec![false; nodes.len()],
        }
    }

    fn render_all(mut self) -> Vec<Expression> {
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| !self.has_parent[i])
            .collect();
        roots
            .into_iter()
            .map(|root| Expression {
                root_id: self.nodes[root].id.clone(),
                tokens: self.render(root),
            })
            .collect()
    }

    fn render(&mut self, root: usize) -> Vec<ExprToken> {
        let mut tokens = Vec::new();
        if !self.renders[root] {
            return tokens;
        }

        let nodes = self.nodes;
        let mut stack = vec![Step::Visit(root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(i) => {
                    let node = &nodes[i];
                    match &node.kind {
                        NodeKind::Content { label } => tokens.push(ExprToken::Condition {
                            node_id: node.id.clone(),
                            label: label.clone(),
                        }),
                        NodeKind::Logic(_) if self.expanded[i] => tokens.push(ExprToken::Ref {
                            node_id: node.id.clone(),
                        }),
                        NodeKind::Logic(_) => {
                            self.expanded[i] = true;
                            tokens.push(ExprToken::Open {
                                node_id: node.id.clone(),
                            });

                            // Pushed in reverse so operands pop in edge order
                            stack.push(Step::Close(i));
                            let operands: Vec<usize> = self.children[i]
                                .iter()
                                .copied()
                                .filter(|&c| self.renders[c])
                                .collect();
                            for (k, &child) in operands.iter().enumerate().rev() {
                                stack.push(Step::Visit(child));
                                if k > 0 {
                                    stack.push(Step::Operator(i));
                                }
                            }
                        }
                    }
                }
                Step::Operator(i) => {
                    if let NodeKind::Logic(operator) = nodes[i].kind {
                        tokens.push(ExprToken::Operator {
                            node_id: nodes[i].id.clone(),
                            operator,
                        });
                    }
                }
                Step::Close(i) => tokens.push(ExprToken::Close {
                    node_id: nodes[i].id.clone(),
                }),
            }
        }
        tokens
    }
}

/// Whether each node produces any tokens: conditions always do, logic nodes
/// only when some operand does. Computed in post-order over the acyclic graph.
fn renders_tokens(nodes: &[Node], children: &[Vec<usize>]) -> Vec<bool> {
    let mut renders = vec![false; nodes.len()];
    let mut done = vec![false; nodes.len()];

    for start in 0..nodes.len() {
        if done[start] {
            continue;
        }
        // (node, index of the next child to visit)
        let mut stack = vec![(start, 0usize)];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if let Some(&child) = children[node].get(top.1) {
                top.1 += 1;
                if !done[child] {
                    stack.push((child, 0));
                }
                continue;
            }
            renders[node] = match nodes[node].kind {
                NodeKind::Content { .. } => true,
                NodeKind::Logic(_) => children[node].iter().any(|&c| renders[c]),
            };
            done[node] = true;
            stack.pop();
        }
    }
    renders
}
