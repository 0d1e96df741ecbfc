//! Voltage-level connectivity graph.
//!
//! Nodes and edges live in a `petgraph` [`StableGraph`] so that removing a
//! node during normalization never invalidates the handles held elsewhere.
//! Cells and blocks are stored next to it, addressed by [`CellId`] and
//! [`BlockId`].
//!
//! Iteration order is part of the contract: nodes are listed in insertion
//! order, adjacency in edge-insertion order and cells by number, so two runs
//! over the same input visit everything in the same sequence.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{Dfs, EdgeRef, NodeFiltered};
use petgraph::Undirected;
use tracing::{debug, info};

use crate::block::{Block, BlockId};
use crate::cell::{Cell, CellId, CellKind};
use crate::diagnostics::Diagnostics;
use crate::error::{SldError, SldResult};
use crate::node::{Node, NodeType};
use crate::position::Position;

/// Edge payload: insertion sequence number, used to order adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub seq: u64,
}

/// Node/edge/cell/block collection for one voltage level.
#[derive(Debug, Clone)]
pub struct Graph {
    id: String,
    graph: StableGraph<Node, Edge, Undirected>,
    ids: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
    next_edge_seq: u64,
    cells: BTreeMap<CellId, Cell>,
    blocks: Vec<Block>,
    max_bus_position: Position,
    bus_grid: BTreeMap<(i32, i32), NodeIndex>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graph: StableGraph::default(),
            ids: HashMap::new(),
            order: Vec::new(),
            next_edge_seq: 0,
            cells: BTreeMap::new(),
            blocks: Vec::new(),
            max_bus_position: Position::new(0, 0),
            bus_grid: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id given to a fictitious node created for this graph
    pub fn fictitious_id(&self, name: &str) -> String {
        format!("FICT_{}_{}", self.id, name)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub fn add_node(&mut self, node: Node) -> SldResult<NodeIndex> {
        if self.ids.contains_key(&node.id) {
            return Err(SldError::Graph(format!("duplicate node id '{}'", node.id)));
        }
        let id = node.id.clone();
        let ix = self.graph.add_node(node);
        self.ids.insert(id, ix);
        self.order.push(ix);
        Ok(ix)
    }

    /// Remove a node together with its incident edges.
    pub fn remove_node(&mut self, ix: NodeIndex) -> Option<Node> {
        let node = self.graph.remove_node(ix)?;
        self.ids.remove(&node.id);
        self.order.retain(|&n| n != ix);
        Some(node)
    }

    pub fn node(&self, ix: NodeIndex) -> &Node {
        &self.graph[ix]
    }

    pub fn node_mut(&mut self, ix: NodeIndex) -> &mut Node {
        &mut self.graph[ix]
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.ids.get(id).copied()
    }

    /// Lookup that reports unknown ids as construction errors
    pub fn require_node(&self, id: &str) -> SldResult<NodeIndex> {
        self.node_index(id)
            .ok_or_else(|| SldError::Graph(format!("unknown node '{}'", id)))
    }

    pub fn node_type(&self, ix: NodeIndex) -> NodeType {
        self.graph[ix].node_type()
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> &[NodeIndex] {
        &self.order
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Busbar nodes in insertion order
    pub fn bus_nodes(&self) -> Vec<NodeIndex> {
        self.order
            .iter()
            .copied()
            .filter(|&n| self.graph[n].is_bus())
            .collect()
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<NodeIndex> {
        self.order
            .iter()
            .copied()
            .filter(|&n| self.graph[n].node_type() == node_type)
            .collect()
    }

    // =========================================================================
    // Edges
    // =========================================================================

    pub fn add_edge(&mut self, n1: NodeIndex, n2: NodeIndex) -> EdgeIndex {
        let seq = self.next_edge_seq;
        self.next_edge_seq += 1;
        self.graph.add_edge(n1, n2, Edge { seq })
    }

    /// Remove the oldest edge between `n1` and `n2`. Returns false when none exists.
    pub fn remove_edge(&mut self, n1: NodeIndex, n2: NodeIndex) -> bool {
        let first = self
            .graph
            .edges(n1)
            .filter(|e| Self::other_end(e.source(), e.target(), n1) == n2)
            .min_by_key(|e| e.weight().seq)
            .map(|e| e.id());
        match first {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    fn other_end(source: NodeIndex, target: NodeIndex, from: NodeIndex) -> NodeIndex {
        if source == from {
            target
        } else {
            source
        }
    }

    /// Neighbours in edge-insertion order; parallel edges yield repeated entries.
    pub fn adjacent_nodes(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        let mut adj: Vec<(u64, NodeIndex)> = self
            .graph
            .edges(ix)
            .map(|e| (e.weight().seq, Self::other_end(e.source(), e.target(), ix)))
            .collect();
        adj.sort_by_key(|(seq, _)| *seq);
        adj.into_iter().map(|(_, n)| n).collect()
    }

    pub fn degree(&self, ix: NodeIndex) -> usize {
        self.graph.edges(ix).count()
    }

    /// Neighbours of `ix` that belong to `cell`
    pub fn adjacent_in_cell(&self, ix: NodeIndex, cell: CellId) -> Vec<NodeIndex> {
        let members = &self.cell(cell).nodes;
        self.adjacent_nodes(ix)
            .into_iter()
            .filter(|n| members.contains(n))
            .collect()
    }

    /// Edge ends as (node id, node id) pairs, in insertion order
    pub fn edge_list(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(u64, String, String)> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                Some((
                    self.graph[e].seq,
                    self.graph[a].id.clone(),
                    self.graph[b].id.clone(),
                ))
            })
            .collect();
        edges.sort_by_key(|(seq, _, _)| *seq);
        edges.into_iter().map(|(_, a, b)| (a, b)).collect()
    }

    // =========================================================================
    // Connectivity
    // =========================================================================

    /// Partition `subset` into maximal connected components, using only
    /// edges whose both ends are in `subset`. Components come out in the
    /// order of their first member in `subset`.
    pub fn connected_components(&self, subset: &[NodeIndex]) -> Vec<Vec<NodeIndex>> {
        let inside: HashSet<NodeIndex> = subset.iter().copied().collect();
        let filtered = NodeFiltered::from_fn(&self.graph, |n| inside.contains(&n));
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut components = Vec::new();

        for &start in subset {
            if seen.contains(&start) {
                continue;
            }
            let mut dfs = Dfs::new(&filtered, start);
            let mut component = Vec::new();
            while let Some(n) = dfs.next(&filtered) {
                seen.insert(n);
                component.push(n);
            }
            components.push(component);
        }
        components
    }

    /// Check that the whole graph is one component. Disconnection is a
    /// warning, not an error.
    pub fn check_connected(&self, diag: &mut Diagnostics) -> bool {
        let components = self.connected_components(&self.order);
        if components.len() > 1 {
            diag.record_warning(
                "graph",
                format!("{} connected components found", components.len()),
            );
            let mut by_size = components.clone();
            by_size.sort_by_key(|c| c.len());
            for component in by_size {
                let mut ids: Vec<&str> = component
                    .iter()
                    .map(|&n| self.graph[n].id.as_str())
                    .collect();
                ids.sort();
                debug!("   - {:?}", ids);
            }
        }
        components.len() <= 1
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// Register a cell and give it ownership of its nodes. Busbars stay
    /// unowned; a shunt cell leaves shunt nodes to their extern cell.
    pub fn add_cell(&mut self, cell: Cell) -> CellId {
        let id = cell.id;
        for &n in &cell.nodes {
            let node = &mut self.graph[n];
            if node.is_bus() {
                continue;
            }
            if cell.kind == CellKind::Shunt && node.node_type() == NodeType::Shunt {
                continue;
            }
            node.cell = Some(id);
        }
        self.cells.insert(id, cell);
        id
    }

    pub fn remove_cell(&mut self, id: CellId) -> Option<Cell> {
        let cell = self.cells.remove(&id)?;
        for &n in &cell.nodes {
            if self.graph.contains_node(n) && self.graph[n].cell == Some(id) {
                self.graph[n].cell = None;
            }
        }
        Some(cell)
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[&id]
    }

    pub fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        self.cells.get_mut(&id).expect("unknown cell id")
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Cell ids in numbering order
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells.keys().copied().collect()
    }

    pub fn cell_ids_of_kind(&self, kind: CellKind) -> Vec<CellId> {
        self.cells
            .values()
            .filter(|c| c.kind == kind)
            .map(|c| c.id)
            .collect()
    }

    /// Intern, intern-bound and extern cells
    pub fn bus_cell_ids(&self) -> Vec<CellId> {
        self.cells
            .values()
            .filter(|c| c.kind.is_bus_cell())
            .map(|c| c.id)
            .collect()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Busbars of a cell, in cell order
    pub fn cell_buses(&self, id: CellId) -> Vec<NodeIndex> {
        self.cell(id)
            .nodes
            .iter()
            .copied()
            .filter(|&n| self.graph[n].is_bus())
            .collect()
    }

    /// Kind name followed by the sorted node ids, e.g. `EXTERN[b, bbs, d, l]`
    pub fn full_id(&self, id: CellId) -> String {
        let cell = self.cell(id);
        let mut ids: Vec<&str> = cell
            .nodes
            .iter()
            .map(|&n| self.graph[n].id.as_str())
            .collect();
        ids.sort();
        format!("{}[{}]", cell.kind, ids.join(", "))
    }

    pub fn signature_sorted_cells_content(&self) -> Vec<String> {
        let mut signature: Vec<String> = self.cells.keys().map(|&c| self.full_id(c)).collect();
        signature.sort();
        signature
    }

    pub fn compare_cell_detection(&self, other: &Graph) -> bool {
        self.signature_sorted_cells_content() == other.signature_sorted_cells_content()
    }

    /// Number of cells per kind
    pub fn cell_counts(&self) -> BTreeMap<CellKind, usize> {
        let mut counts = BTreeMap::new();
        for cell in self.cells.values() {
            *counts.entry(cell.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Log the detection outcome and warn about nodes left without a cell.
    pub fn log_cell_detection_status(&self, diag: &mut Diagnostics) {
        if self.cells.is_empty() {
            diag.record_warning("cells", "No cell detected");
        } else {
            info!(
                "{} cells detected ({:?})",
                self.cells.len(),
                self.cell_counts()
            );
        }

        let remaining: Vec<NodeIndex> = self
            .order
            .iter()
            .copied()
            .filter(|&n| !self.graph[n].is_bus() && self.graph[n].cell.is_none())
            .collect();
        if !remaining.is_empty() {
            let mut by_type: BTreeMap<NodeType, usize> = BTreeMap::new();
            for &n in &remaining {
                *by_type.entry(self.graph[n].node_type()).or_insert(0) += 1;
            }
            diag.record_warning(
                "cells",
                format!(
                    "{}/{} nodes not associated to a cell ({:?})",
                    remaining.len(),
                    self.order.len(),
                    by_type
                ),
            );
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn add_block(&mut self, mut block: Block) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        block.id = id;
        self.blocks.push(block);
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.value()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.value()]
    }

    // =========================================================================
    // Busbar grid
    // =========================================================================

    /// Compute the maximum structural position over all busbars and index
    /// busbars by (v, h).
    pub fn set_max_bus_position(&mut self) -> SldResult<()> {
        let mut max_h = 0;
        let mut max_v = 0;
        self.bus_grid.clear();
        for bus in self.bus_nodes() {
            let node = &self.graph[bus];
            let pos = node.structural_position().ok_or_else(|| {
                SldError::Layout(format!("busbar '{}' has no structural position", node.id))
            })?;
            max_h = max_h.max(pos.h);
            max_v = max_v.max(pos.v);
            self.bus_grid.insert((pos.v, pos.h), bus);
        }
        self.max_bus_position = Position::new(max_h, max_v);
        Ok(())
    }

    pub fn max_bus_position(&self) -> Position {
        self.max_bus_position
    }

    /// Busbar at structural row `v` and column `h`
    pub fn bus_at(&self, v: i32, h: i32) -> Option<NodeIndex> {
        self.bus_grid.get(&(v, h)).copied()
    }
}
