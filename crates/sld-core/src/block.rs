//! Decomposition blocks.
//!
//! A cell's switch topology is described by a tree of blocks:
//!
//! - **Primary**: a chain `terminal - switch* - terminal`
//! - **Serial**: two blocks joined end to end at a common node
//! - **Parallel**: blocks sharing both extremities
//! - **Undefined**: blocks that could not be merged further
//!
//! Blocks live in an arena owned by the [`Graph`]; parents and children are
//! plain [`BlockId`] handles. Cardinalities are computed on demand from the
//! current children so they never go stale when a sub-block is reversed or
//! regrouped.

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::cell::{CellId, CellKind};
use crate::graph::Graph;
use crate::node::NodeType;
use crate::position::{Coord, Orientation, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(usize);

impl BlockId {
    #[inline]
    pub fn new(value: usize) -> Self {
        BlockId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockKind {
    Primary,
    Serial,
    Parallel,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremity {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockContent {
    Primary {
        nodes: Vec<NodeIndex>,
        /// Bus-side blocks sharing a column with this one
        stackable: Vec<BlockId>,
    },
    Serial {
        /// Embeds the busbar when only one side does
        lower: BlockId,
        upper: BlockId,
        /// Vertical lower block continued by a horizontal upper block
        h2v: bool,
    },
    Parallel {
        subs: Vec<BlockId>,
    },
    Undefined {
        subs: Vec<BlockId>,
    },
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub content: BlockContent,
    pub parent: Option<BlockId>,
    pub cell: CellId,
    pub position: Position,
    pub coord: Coord,
}

impl Block {
    pub fn new(cell: CellId, content: BlockContent) -> Self {
        Self {
            id: BlockId::new(usize::MAX),
            content,
            parent: None,
            cell,
            position: Position::default(),
            coord: Coord::default(),
        }
    }

    pub fn kind(&self) -> BlockKind {
        match self.content {
            BlockContent::Primary { .. } => BlockKind::Primary,
            BlockContent::Serial { .. } => BlockKind::Serial,
            BlockContent::Parallel { .. } => BlockKind::Parallel,
            BlockContent::Undefined { .. } => BlockKind::Undefined,
        }
    }

    /// Nodes of a primary block, empty for composed blocks
    pub fn primary_nodes(&self) -> &[NodeIndex] {
        match &self.content {
            BlockContent::Primary { nodes, .. } => nodes,
            _ => &[],
        }
    }

    pub fn stackable(&self) -> &[BlockId] {
        match &self.content {
            BlockContent::Primary { stackable, .. } => stackable,
            _ => &[],
        }
    }

    /// Direct children, lower before upper for serial blocks
    pub fn sub_blocks(&self) -> Vec<BlockId> {
        match &self.content {
            BlockContent::Primary { .. } => Vec::new(),
            BlockContent::Serial { lower, upper, .. } => vec![*lower, *upper],
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => subs.clone(),
        }
    }
}

/// Default orientation of blocks created for a cell of this kind
fn orientation_for(kind: CellKind) -> Orientation {
    match kind {
        CellKind::InternBound | CellKind::Shunt => Orientation::Horizontal,
        _ => Orientation::Vertical,
    }
}

impl Graph {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a primary block. The chain is oriented so that a busbar, if
    /// any, comes first and a feeder comes last.
    pub fn new_primary_block(&mut self, cell: CellId, mut nodes: Vec<NodeIndex>) -> BlockId {
        assert!(!nodes.is_empty(), "primary block needs at least one node");
        let first = self.node_type(nodes[0]);
        let last = self.node_type(nodes[nodes.len() - 1]);
        if first == NodeType::Feeder || last == NodeType::Bus {
            nodes.reverse();
        }
        let content = BlockContent::Primary {
            nodes,
            stackable: Vec::new(),
        };
        self.register_block(cell, content)
    }

    /// Chain `b1` and `b2` at `common`. The lower block is the one carrying
    /// the busbar (or, failing that, not carrying the feeder); it ends at
    /// `common` and the upper block starts there.
    pub fn new_serial_block(
        &mut self,
        cell: CellId,
        b1: BlockId,
        b2: BlockId,
        common: NodeIndex,
    ) -> BlockId {
        let (lower, upper) =
            if self.block_embeds(b1, NodeType::Bus) || self.block_embeds(b2, NodeType::Feeder) {
                (b1, b2)
            } else {
                (b2, b1)
            };
        self.block_mut(upper).position.set_hv(0, 1);
        self.block_mut(lower).position.set_hv(0, 0);
        self.define_extremity(upper, common, Extremity::Start);
        self.define_extremity(lower, common, Extremity::End);
        let content = BlockContent::Serial {
            lower,
            upper,
            h2v: false,
        };
        self.register_block(cell, content)
    }

    /// Bundle blocks sharing both extremities. With `allow_merge`, nested
    /// parallel blocks are flattened into the new one.
    pub fn new_parallel_block(
        &mut self,
        cell: CellId,
        subs: Vec<BlockId>,
        allow_merge: bool,
    ) -> BlockId {
        assert!(!subs.is_empty(), "parallel block needs sub-blocks");
        let node0s = self.block_start(subs[0]);
        let node0e = self.block_end(subs[0]);

        let mut flat = Vec::with_capacity(subs.len());
        for sub in subs {
            match &self.block(sub).content {
                BlockContent::Parallel { subs: inner } if allow_merge => {
                    flat.extend(inner.iter().copied())
                }
                _ => flat.push(sub),
            }
        }
        for &sub in &flat {
            if self.block_start(sub) != node0s && self.block_end(sub) != node0e {
                self.reverse_block(sub);
            }
        }
        self.register_block(cell, BlockContent::Parallel { subs: flat })
    }

    /// Opaque stack of blocks that no merge rule applies to
    pub fn new_undefined_block(&mut self, cell: CellId, subs: Vec<BlockId>) -> BlockId {
        assert!(!subs.is_empty(), "undefined block needs sub-blocks");
        self.register_block(cell, BlockContent::Undefined { subs })
    }

    fn register_block(&mut self, cell: CellId, content: BlockContent) -> BlockId {
        let children = match &content {
            BlockContent::Primary { .. } => Vec::new(),
            BlockContent::Serial { lower, upper, .. } => vec![*lower, *upper],
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => subs.clone(),
        };
        let id = self.add_block(Block::new(cell, content));
        for child in children {
            self.block_mut(child).parent = Some(id);
        }
        let orientation = orientation_for(self.cell(cell).kind);
        self.set_block_orientation(id, orientation);
        id
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn block_start(&self, id: BlockId) -> NodeIndex {
        match &self.block(id).content {
            BlockContent::Primary { nodes, .. } => nodes[0],
            BlockContent::Serial { lower, .. } => self.block_start(*lower),
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => {
                self.block_start(subs[0])
            }
        }
    }

    pub fn block_end(&self, id: BlockId) -> NodeIndex {
        match &self.block(id).content {
            BlockContent::Primary { nodes, .. } => nodes[nodes.len() - 1],
            BlockContent::Serial { upper, .. } => self.block_end(*upper),
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => {
                self.block_end(subs[0])
            }
        }
    }

    pub fn block_extremity(&self, id: BlockId, extremity: Extremity) -> NodeIndex {
        match extremity {
            Extremity::Start => self.block_start(id),
            Extremity::End => self.block_end(id),
        }
    }

    fn cardinality_start(&self, id: BlockId) -> usize {
        match &self.block(id).content {
            BlockContent::Primary { .. } => 1,
            BlockContent::Serial { lower, .. } => {
                self.block_cardinality(*lower, self.block_start(*lower))
            }
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => subs.len(),
        }
    }

    fn cardinality_end(&self, id: BlockId) -> usize {
        match &self.block(id).content {
            BlockContent::Primary { .. } => 1,
            BlockContent::Serial { upper, .. } => {
                self.block_cardinality(*upper, self.block_end(*upper))
            }
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => subs.len(),
        }
    }

    /// Number of leaf chains of `id` ending at `node`; 0 when `node` is not
    /// an extremity.
    pub fn block_cardinality(&self, id: BlockId, node: NodeIndex) -> usize {
        if node == self.block_start(id) {
            self.cardinality_start(id)
        } else if node == self.block_end(id) {
            self.cardinality_end(id)
        } else {
            0
        }
    }

    pub fn block_embeds(&self, id: BlockId, node_type: NodeType) -> bool {
        match &self.block(id).content {
            BlockContent::Primary { nodes, .. } => {
                nodes.iter().any(|&n| self.node_type(n) == node_type)
            }
            BlockContent::Serial { lower, upper, .. } => {
                self.block_embeds(*lower, node_type) || self.block_embeds(*upper, node_type)
            }
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => {
                subs.iter().any(|&s| self.block_embeds(s, node_type))
            }
        }
    }

    /// Feeder order used to sort sibling blocks, 0 without a feeder end.
    /// Bundles only look at the node they start from.
    pub fn block_order(&self, id: BlockId) -> i32 {
        match &self.block(id).content {
            BlockContent::Primary { nodes, .. } => {
                let feeder_end = [nodes[nodes.len() - 1], nodes[0]]
                    .into_iter()
                    .find_map(|n| self.node(n).feeder_data().map(|f| f.order));
                feeder_end.unwrap_or(0)
            }
            BlockContent::Serial { upper, .. } => self.block_order(*upper),
            BlockContent::Parallel { .. } | BlockContent::Undefined { .. } => self
                .node(self.block_start(id))
                .feeder_data()
                .map_or(0, |f| f.order),
        }
    }

    /// Busbar a bus-side primary block starts from
    pub fn block_bus_node(&self, id: BlockId) -> Option<NodeIndex> {
        match &self.block(id).content {
            BlockContent::Primary { nodes, .. } if self.node(nodes[0]).is_bus() => Some(nodes[0]),
            _ => None,
        }
    }

    /// Every node spanned by the block, without duplicates
    pub fn block_nodes(&self, id: BlockId) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        for leaf in self.primary_leaves(id) {
            for &n in self.block(leaf).primary_nodes() {
                if !out.contains(&n) {
                    out.push(n);
                }
            }
        }
        out
    }

    /// Primary blocks under `id`, left to right
    pub fn primary_leaves(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(b) = stack.pop() {
            let block = self.block(b);
            if block.kind() == BlockKind::Primary {
                out.push(b);
            } else {
                stack.extend(block.sub_blocks().into_iter().rev());
            }
        }
        out
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Swap start and end, recursively.
    pub fn reverse_block(&mut self, id: BlockId) {
        match self.block(id).content.clone() {
            BlockContent::Primary { .. } => {
                if let BlockContent::Primary { nodes, .. } = &mut self.block_mut(id).content {
                    nodes.reverse();
                }
            }
            BlockContent::Serial { lower, upper, h2v } => {
                self.block_mut(id).content = BlockContent::Serial {
                    lower: upper,
                    upper: lower,
                    h2v,
                };
                self.reverse_block(upper);
                self.reverse_block(lower);
            }
            BlockContent::Parallel { subs } => {
                for sub in subs {
                    self.reverse_block(sub);
                }
            }
            BlockContent::Undefined { .. } => {}
        }
    }

    /// Reverse the block if `node` is not already at `extremity`.
    pub fn define_extremity(&mut self, id: BlockId, node: NodeIndex, extremity: Extremity) {
        if self.block_extremity(id, extremity) != node {
            self.reverse_block(id);
        }
    }

    /// Set the orientation of a block and all its descendants.
    pub fn set_block_orientation(&mut self, id: BlockId, orientation: Orientation) {
        self.block_mut(id).position.orientation = orientation;
        for sub in self.block(id).sub_blocks() {
            self.set_block_orientation(sub, orientation);
        }
    }

    pub fn add_stackable(&mut self, id: BlockId, other: BlockId) {
        if let BlockContent::Primary { stackable, .. } = &mut self.block_mut(id).content {
            if !stackable.contains(&other) {
                stackable.push(other);
            }
        }
    }
}
