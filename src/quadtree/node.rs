//! QuadtreeNode - a chunk that is either drawn itself or split into four.

use super::chunk::{ChunkConfig, ChunkKey};

/// Lifecycle state of a node.
///
/// `Splitting` and `Merging` only exist while an update pass holds the tree
/// exclusively; readers only ever see `Leaf` and `Split`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Active: the node's own payload is drawn
    Leaf,
    /// Children are being attached
    Splitting,
    /// Four children are active instead of this node
    Split,
    /// Children are being detached
    Merging,
}

/// A node of the LOD quadtree.
///
/// A leaf owns a payload and no children; a split node owns exactly four
/// children and no payload.
#[derive(Debug)]
pub struct QuadtreeNode<P> {
    config: ChunkConfig,
    state: NodeState,
    children: Option<Box<[QuadtreeNode<P>; 4]>>,
    payload: Option<P>,
}

impl<P> QuadtreeNode<P> {
    /// Create an active leaf.
    pub fn leaf(config: ChunkConfig, payload: P) -> Self {
        Self {
            config,
            state: NodeState::Leaf,
            children: None,
            payload: Some(payload),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn key(&self) -> ChunkKey {
        self.config.key()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_leaf(&self) -> bool {
        self.state == NodeState::Leaf
    }

    /// Children in quadrant order, if split.
    pub fn children(&self) -> Option<&[QuadtreeNode<P>; 4]> {
        self.children.as_deref()
    }

    /// The node's payload, if it is a leaf.
    pub fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    /// Call `f` for every active leaf below (and including) this node,
    /// depth-first in quadrant order.
    pub fn visit_leaves(&self, f: &mut impl FnMut(&ChunkConfig, &P)) {
        match (&self.children, &self.payload) {
            (Some(children), _) => {
                for child in children.iter() {
                    child.visit_leaves(f);
                }
            }
            (None, Some(payload)) => f(&self.config, payload),
            (None, None) => {}
        }
    }

    pub fn leaf_count(&self) -> usize {
        match &self.children {
            Some(children) => children.iter().map(|c| c.leaf_count()).sum(),
            None => 1,
        }
    }

    /// Finest LOD present below this node.
    pub fn max_depth(&self) -> u32 {
        match &self.children {
            Some(children) => children.iter().map(|c| c.max_depth()).max().unwrap_or(self.config.lod),
            None => self.config.lod,
        }
    }

    /// Check the leaf/split shape invariant for this subtree.
    ///
    /// Returns the key of the first offending node.
    pub fn validate_shape(&self) -> Result<(), ChunkKey> {
        let well_formed = match self.state {
            NodeState::Leaf => self.children.is_none() && self.payload.is_some(),
            NodeState::Split => self.children.is_some() && self.payload.is_none(),
            NodeState::Splitting | NodeState::Merging => false,
        };
        if !well_formed {
            return Err(self.key());
        }
        if let Some(children) = &self.children {
            for (quadrant, child) in children.iter().enumerate() {
                if child.key() != self.key().child(quadrant) {
                    return Err(child.key());
                }
                child.validate_shape()?;
            }
        }
        Ok(())
    }

    /// Follow a quadrant path down from this node.
    pub(crate) fn descendant_mut(&mut self, path: &[u8]) -> Option<&mut Self> {
        match path.split_first() {
            None => Some(self),
            Some((&quadrant, rest)) => self
                .children
                .as_mut()?
                .get_mut(quadrant as usize)?
                .descendant_mut(rest),
        }
    }

    /// Replace this leaf's payload with four children.
    ///
    /// Returns the detached payload, which the caller must cache or destroy.
    pub(crate) fn split(&mut self, children: [QuadtreeNode<P>; 4]) -> Option<P> {
        debug_assert_eq!(self.state, NodeState::Leaf, "split of non-leaf {:?}", self.key());
        self.state = NodeState::Splitting;
        self.children = Some(Box::new(children));
        let retired = self.payload.take();
        self.state = NodeState::Split;
        retired
    }

    /// Collapse this split node back into a leaf carrying `payload`.
    ///
    /// Every payload of the detached subtree is appended to `retired`.
    pub(crate) fn merge(&mut self, payload: P, retired: &mut Vec<(ChunkKey, P)>) {
        debug_assert_eq!(self.state, NodeState::Split, "merge of non-split {:?}", self.key());
        self.state = NodeState::Merging;
        if let Some(children) = self.children.take() {
            for child in *children {
                child.into_payloads(retired);
            }
        }
        self.payload = Some(payload);
        self.state = NodeState::Leaf;
    }

    /// Consume the subtree, collecting every payload it owned.
    pub(crate) fn into_payloads(self, out: &mut Vec<(ChunkKey, P)>) {
        let key = self.key();
        if let Some(payload) = self.payload {
            out.push((key, payload));
        }
        if let Some(children) = self.children {
            for child in *children {
                child.into_payloads(out);
            }
        }
    }
}
