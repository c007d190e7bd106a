//! Prefix tree of beam-search hypotheses.
//!
//! All nodes of one decoding stream live in a [`PathTrie`] arena and refer to their parent by
//! [`NodeId`]. Nodes are never freed individually, so a parent always outlives its children and
//! every handle stays valid until the arena is cleared or dropped. Traversal only ever goes
//! upward: the context a scorer needs (trailing word, grapheme, n-gram) is recomputed on demand
//! instead of being stored on each node.

use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::text::byte_is_codepoint_boundary;

/// Label reported by [`PathNode::character`] for the synthetic root node.
pub const ROOT_LABEL: i64 = -1;

/// Handle to a node inside a [`PathTrie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One decoded label of one hypothesis.
///
/// The score fields belong to the decoder; nothing in this crate reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct PathNode {
    pub timestep: u32,
    pub log_prob_b_prev: f32,
    pub log_prob_nb_prev: f32,
    pub log_prob_b_cur: f32,
    pub log_prob_nb_cur: f32,
    pub log_prob_c: f32,
    pub score: f32,
    pub approx_ctc: f32,
    label: Option<u32>,
    parent: Option<NodeId>,
    depth: usize,
}

impl PathNode {
    fn new(label: Option<u32>, timestep: u32, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            timestep,
            log_prob_b_prev: f32::NEG_INFINITY,
            log_prob_nb_prev: f32::NEG_INFINITY,
            log_prob_b_cur: f32::NEG_INFINITY,
            log_prob_nb_cur: f32::NEG_INFINITY,
            log_prob_c: f32::NEG_INFINITY,
            score: f32::NEG_INFINITY,
            approx_ctc: 0.0,
            label,
            parent,
            depth,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Number of labels between the root and this node.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Only the root has no parent; every appended node carries a label.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The node's label, or `None` for the root.
    pub fn label(&self) -> Option<u32> {
        self.label
    }

    /// The label widened to `i64`, with [`ROOT_LABEL`] for the root.
    pub fn character(&self) -> i64 {
        self.label.map_or(ROOT_LABEL, i64::from)
    }
}

/// Labels and timesteps of a trailing word or grapheme, plus the node the walk stopped at.
///
/// `stop` is the word-boundary (or root) node for words, and the lead-byte node for graphemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingUnit {
    pub labels: Vec<u32>,
    pub timesteps: Vec<u32>,
    pub stop: NodeId,
}

/// Arena of path-trie nodes for one decoding stream.
#[derive(Debug, Clone)]
pub struct PathTrie {
    nodes: Vec<PathNode>,
}

impl PathTrie {
    /// A trie holding only the root. The root starts with blank probability 0 (log 1).
    pub fn new() -> Self {
        let mut root = PathNode::new(None, 0, None, 0);
        root.log_prob_b_prev = 0.0;
        root.score = 0.0;
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Extend `parent` by one label.
    pub fn append(&mut self, parent: NodeId, label: u32, timestep: u32) -> NodeId {
        let depth = self.nodes[parent.0].depth + 1;
        let id = NodeId(self.nodes.len());
        self.nodes.push(PathNode::new(Some(label), timestep, Some(parent), depth));
        id
    }

    /// Extend `parent` by a sequence of labels, returning the last node.
    pub fn extend(&mut self, parent: NodeId, labels: &[u32], first_timestep: u32) -> NodeId {
        labels
            .iter()
            .zip(first_timestep..)
            .fold(parent, |node, (&label, t)| self.append(node, label, t))
    }

    pub fn node(&self, id: NodeId) -> &PathNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut PathNode {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true: the root always exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node except a fresh root. Outstanding handles become invalid.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Walk from `id` (inclusive) up to the root (inclusive).
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            trie: self,
            next: Some(id),
        }
    }

    /// Labels from the root down to `id`.
    pub fn path_labels(&self, id: NodeId) -> Vec<u32> {
        let mut labels: Vec<u32> = self
            .ancestors(id)
            .filter_map(|node| self.node(node).label())
            .collect();
        labels.reverse();
        labels
    }

    /// The labels after the last word boundary up to and including `id`.
    ///
    /// Stops at the nearest node (starting with `id` itself) that is the space label or the root.
    pub fn prev_word(&self, id: NodeId, space_label: Option<u32>) -> TrailingUnit {
        let mut labels = Vec::new();
        let mut timesteps = Vec::new();
        let mut stop = id;

        for node_id in self.ancestors(id) {
            stop = node_id;
            let node = self.node(node_id);
            match node.label() {
                Some(label) if Some(label) != space_label => {
                    labels.push(label);
                    timesteps.push(node.timestep);
                }
                _ => break,
            }
        }

        labels.reverse();
        timesteps.reverse();
        TrailingUnit {
            labels,
            timesteps,
            stop,
        }
    }

    /// The bytes of the codepoint ending at `id`, walking up to its lead byte.
    ///
    /// Labels are interpreted through a byte alphabet. If the walk reaches the root before
    /// finding a lead byte, `stop` is the root.
    pub fn prev_grapheme(&self, id: NodeId, alphabet: &Alphabet) -> TrailingUnit {
        let mut labels = Vec::new();
        let mut timesteps = Vec::new();
        let mut stop = id;

        for node_id in self.ancestors(id) {
            stop = node_id;
            let node = self.node(node_id);
            let Some(label) = node.label() else {
                break;
            };
            labels.push(label);
            timesteps.push(node.timestep);
            if first_byte(alphabet, label).is_none_or(byte_is_codepoint_boundary) {
                break;
            }
        }

        labels.reverse();
        timesteps.reverse();
        TrailingUnit {
            labels,
            timesteps,
            stop,
        }
    }

    /// Number of bytes from the nearest lead byte down to `id` (inclusive), and that lead byte.
    ///
    /// Fails if the root is reached without seeing a lead byte, which a vocabulary automaton
    /// over valid UTF-8 never allows.
    pub fn distance_to_codepoint_boundary(&self, id: NodeId, alphabet: &Alphabet) -> Result<(usize, u8)> {
        for (distance, node_id) in self.ancestors(id).enumerate() {
            let Some(label) = self.node(node_id).label() else {
                break;
            };
            let byte = first_byte(alphabet, label).ok_or_else(|| {
                Error::InternalInconsistency(format!("label {label} is not in the alphabet"))
            })?;
            if byte_is_codepoint_boundary(byte) {
                return Ok((distance + 1, byte));
            }
        }

        Err(Error::InternalInconsistency(format!(
            "no codepoint lead byte above node {}",
            id.0
        )))
    }
}

impl Default for PathTrie {
    fn default() -> Self {
        Self::new()
    }
}

fn first_byte(alphabet: &Alphabet, label: u32) -> Option<u8> {
    alphabet.label_bytes(label).and_then(|bytes| bytes.first().copied())
}

/// Upward iterator returned by [`PathTrie::ancestors`].
pub struct Ancestors<'a> {
    trie: &'a PathTrie,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.trie.parent(current);
        Some(current)
    }
}
