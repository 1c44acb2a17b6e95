//! Endpoint template compilation and concrete path resolution.
//!
//! Every interface carries a set of mapping endpoints such as
//! `/sensors/%{sensor_id}/value`. Segments are either literals or named
//! parameters; a parameter matches exactly one concrete segment. The full
//! set is compiled once into an [`EndpointAutomaton`] (a segment trie), and
//! concrete paths resolve against it in time proportional to their depth.
//!
//! Resolution is deterministic: at every position a literal child wins over
//! the parameter child, with backtracking into the parameter branch when the
//! literal branch dead-ends deeper down. Two templates that could claim the
//! same concrete path without a literal tiebreak are rejected when the
//! automaton is built, never at resolution time.

use std::collections::HashMap;

use crate::interface::InterfaceError;

/// One segment of an endpoint template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Matches exactly this text.
    Literal(String),
    /// `%{name}` — matches any single concrete segment.
    Parameter(String),
}

/// Split and validate an endpoint template into segments.
pub(crate) fn parse_template(endpoint: &str) -> Result<Vec<Segment>, InterfaceError> {
    let rest = endpoint
        .strip_prefix('/')
        .ok_or_else(|| InterfaceError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "must start with '/'".to_string(),
        })?;
    if rest.is_empty() {
        return Err(InterfaceError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "must contain at least one segment".to_string(),
        });
    }

    let mut segments = Vec::new();
    for raw in rest.split('/') {
        if raw.is_empty() {
            return Err(InterfaceError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "empty segment".to_string(),
            });
        }
        if let Some(name) = raw.strip_prefix("%{").and_then(|s| s.strip_suffix('}')) {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(InterfaceError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: format!("invalid parameter name '{}'", raw),
                });
            }
            segments.push(Segment::Parameter(name.to_string()));
        } else if raw.contains('%') || raw.contains('+') || raw.contains('#') {
            return Err(InterfaceError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("invalid literal segment '{}'", raw),
            });
        } else {
            segments.push(Segment::Literal(raw.to_string()));
        }
    }
    Ok(segments)
}

#[derive(Debug, Default)]
struct Node {
    literals: HashMap<String, Node>,
    parameter: Option<Box<Node>>,
    /// Index into the interface's mapping list, set on terminal nodes.
    mapping: Option<usize>,
}

/// Compiled matcher from one interface's endpoint templates to mapping
/// indices.
#[derive(Debug, Default)]
pub struct EndpointAutomaton {
    root: Node,
}

impl EndpointAutomaton {
    /// Compile a set of endpoint templates.
    ///
    /// `templates` holds each mapping's parsed segments, in mapping order.
    /// Fails if two templates could accept the same concrete path with no
    /// literal segment to break the tie.
    pub(crate) fn build(templates: &[Vec<Segment>]) -> Result<Self, InterfaceError> {
        let mut root = Node::default();
        for (index, segments) in templates.iter().enumerate() {
            let mut node = &mut root;
            for segment in segments {
                node = match segment {
                    Segment::Literal(text) => node.literals.entry(text.clone()).or_default(),
                    Segment::Parameter(_) => node.parameter.get_or_insert_with(Default::default),
                };
            }
            if node.mapping.is_some() {
                return Err(InterfaceError::AmbiguousEndpoint { index });
            }
            node.mapping = Some(index);
        }
        Ok(Self { root })
    }

    /// Resolve a rooted concrete path (`/like/this`) to a mapping index.
    pub fn resolve(&self, path: &str) -> Option<usize> {
        let rest = path.strip_prefix('/')?;
        if rest.is_empty() {
            return None;
        }
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        self.resolve_segments(&segments)
    }

    /// Resolve a path already split into concrete segments.
    pub fn resolve_segments(&self, segments: &[&str]) -> Option<usize> {
        if segments.is_empty() {
            return None;
        }
        Self::walk(&self.root, segments)
    }

    fn walk(node: &Node, segments: &[&str]) -> Option<usize> {
        match segments.split_first() {
            None => node.mapping,
            Some((head, tail)) => {
                // Literal branch first; fall back to the parameter branch if
                // the literal subtree dead-ends.
                if let Some(child) = node.literals.get(*head) {
                    if let Some(index) = Self::walk(child, tail) {
                        return Some(index);
                    }
                }
                node.parameter
                    .as_deref()
                    .and_then(|child| Self::walk(child, tail))
            }
        }
    }
}
