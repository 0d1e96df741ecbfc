//! Decomposition of each cell into a block tree.
//!
//! Primary blocks are extracted by walking switch chains from the first
//! busbar of the cell. They are then merged, serially at connection nodes
//! where nothing else terminates and in parallel where extremities are
//! similar, until one root is left. When no rule applies the remaining
//! blocks are wrapped in an undefined block and a warning is recorded.

use std::collections::HashSet;

use petgraph::stable_graph::NodeIndex;
use sld_core::{BlockId, CellId, CellKind, Graph, NodeType, SldError, SldResult};
use tracing::{debug, info, trace};

use crate::context::LayoutContext;

/// Decompose every bus cell, then every shunt cell.
pub fn decompose_cells(graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<()> {
    info!("Organizing graph cells into blocks");
    for cell in graph.bus_cell_ids() {
        determine_blocks(graph, ctx, cell)?;
    }
    for cell in graph.cell_ids_of_kind(CellKind::Shunt) {
        determine_blocks(graph, ctx, cell)?;
    }
    Ok(())
}

/// Build the block tree of one cell and register its root and bus blocks.
pub fn determine_blocks(graph: &mut Graph, ctx: &mut LayoutContext, cell: CellId) -> SldResult<()> {
    match graph.cell(cell).kind {
        CellKind::InternBound | CellKind::Shunt => {
            determine_singular_cell(graph, cell);
            Ok(())
        }
        _ => determine_complex_cell(graph, ctx, cell),
    }
}

/// A cell that is one chain: a 3-node coupling or a shunt branch.
fn determine_singular_cell(graph: &mut Graph, cell: CellId) {
    let nodes = graph.cell(cell).nodes.clone();
    let root = graph.new_primary_block(cell, nodes);
    let c = graph.cell_mut(cell);
    c.root = Some(root);
    c.bus_blocks = if c.kind == CellKind::InternBound {
        vec![root]
    } else {
        Vec::new()
    };
}

fn determine_complex_cell(
    graph: &mut Graph,
    ctx: &mut LayoutContext,
    cell: CellId,
) -> SldResult<()> {
    let bus = graph.cell_buses(cell).first().copied().ok_or_else(|| {
        SldError::Layout(format!("cell {} has no busbar", graph.full_id(cell)))
    })?;

    let mut treated: HashSet<NodeIndex> = HashSet::new();
    let mut blocks: Vec<BlockId> = Vec::new();
    for n in graph.adjacent_in_cell(bus, cell) {
        if !treated.contains(&n) {
            elaborate_primary_blocks(graph, cell, n, bus, &mut treated, vec![bus], &mut blocks);
        }
    }

    let bus_blocks: Vec<BlockId> = blocks
        .iter()
        .copied()
        .filter(|&b| graph.node(graph.block_start(b)).is_bus())
        .collect();

    // bus-side blocks last, so chaining is tried before bundling them
    let mut organised: Vec<BlockId> = Vec::with_capacity(blocks.len());
    for b in blocks {
        if graph.block_embeds(b, NodeType::Bus) {
            organised.push(b);
        } else {
            organised.insert(0, b);
        }
    }

    while organised.len() > 1 {
        let chained = search_serial_merge(graph, cell, &mut organised);
        let bundled = organised.len() > 1 && search_parallel_merge(graph, cell, &mut organised);
        if !chained && !bundled {
            let full_id = graph.full_id(cell);
            ctx.warn_for(
                "blocks",
                format!("{} blocks could not be merged, kept as an undefined block", organised.len()),
                &full_id,
            );
            let undefined = graph.new_undefined_block(cell, std::mem::take(&mut organised));
            organised.push(undefined);
        }
    }

    let root = organised[0];
    graph.block_mut(root).parent = None;
    let c = graph.cell_mut(cell);
    c.root = Some(root);
    c.bus_blocks = bus_blocks;
    debug!(cell = %graph.full_id(cell), root = root.value(), "cell decomposed");
    Ok(())
}

/// Follow a chain of switches from `current` and emit one primary block per
/// maximal chain, then recurse into the unvisited branches of its end.
fn elaborate_primary_blocks(
    graph: &mut Graph,
    cell: CellId,
    current: NodeIndex,
    parent: NodeIndex,
    treated: &mut HashSet<NodeIndex>,
    mut block_nodes: Vec<NodeIndex>,
    blocks: &mut Vec<BlockId>,
) {
    let mut current = current;
    let mut parent = parent;
    treated.insert(current);
    block_nodes.push(current);

    while graph.node(current).is_switch_like() {
        let adj = graph.adjacent_nodes(current);
        assert!(
            adj.len() == 2,
            "switch node {} does not have exactly two neighbours",
            graph.node(current).id
        );
        let next = if adj[0] == parent { adj[1] } else { adj[0] };
        parent = current;
        current = next;
        if !graph.node(current).is_bus() {
            treated.insert(current);
        }
        block_nodes.push(current);
    }

    let block = graph.new_primary_block(cell, block_nodes.clone());
    blocks.push(block);

    if graph.node(current).is_bus() {
        return;
    }
    for n in graph.adjacent_in_cell(current, cell) {
        if !treated.contains(&n) && !block_nodes.contains(&n) {
            elaborate_primary_blocks(graph, cell, n, current, treated, vec![current], blocks);
        }
    }
}

/// Number of cell edges meeting at `node`
fn node_cardinality(graph: &Graph, cell: CellId, node: NodeIndex) -> usize {
    graph.adjacent_in_cell(node, cell).len()
}

/// Connection node shared by an extremity of `b1` and one of `b2`
fn compare_block_path(graph: &Graph, b1: BlockId, b2: BlockId) -> Option<NodeIndex> {
    let (s1, e1) = (graph.block_start(b1), graph.block_end(b1));
    let (s2, e2) = (graph.block_start(b2), graph.block_end(b2));
    let connection = |n: NodeIndex| matches!(graph.node_type(n), NodeType::Fictitious | NodeType::Shunt);
    if connection(s1) && (s1 == s2 || s1 == e2) {
        Some(s1)
    } else if connection(e1) && (e1 == s2 || e1 == e2) {
        Some(e1)
    } else {
        None
    }
}

/// Merge the first pair of blocks chained at a node where no other block
/// terminates.
fn search_serial_merge(graph: &mut Graph, cell: CellId, blocks: &mut Vec<BlockId>) -> bool {
    for i in 0..blocks.len() {
        for j in (i + 1)..blocks.len() {
            let (b1, b2) = (blocks[i], blocks[j]);
            let Some(common) = compare_block_path(graph, b1, b2) else {
                continue;
            };
            let cardinality =
                graph.block_cardinality(b1, common) + graph.block_cardinality(b2, common);
            trace!(b1 = b1.value(), b2 = b2.value(), cardinality, "serial candidate");
            if node_cardinality(graph, cell, common) == cardinality {
                let serial = graph.new_serial_block(cell, b1, b2, common);
                blocks.retain(|&b| b != b1 && b != b2);
                blocks.push(serial);
                return true;
            }
        }
    }
    false
}

/// Busbars are similar to each other; feeders and dangling fictitious
/// nodes are similar to each other.
fn similar(graph: &Graph, a: NodeIndex, b: NodeIndex) -> bool {
    let feeder_like = |n: NodeIndex| {
        let node = graph.node(n);
        node.is_feeder() || (node.is_plain_fictitious() && graph.degree(n) == 1)
    };
    a == b
        || (feeder_like(a) && feeder_like(b))
        || (graph.node(a).is_bus() && graph.node(b).is_bus())
}

fn compare_block_parallel(graph: &Graph, b1: BlockId, b2: BlockId) -> bool {
    let (s1, e1) = (graph.block_start(b1), graph.block_end(b1));
    let (s2, e2) = (graph.block_start(b2), graph.block_end(b2));
    (similar(graph, s1, s2) && similar(graph, e1, e2))
        || (similar(graph, s1, e2) && similar(graph, e1, s2))
}

/// Bundle every group of blocks with similar extremities.
fn search_parallel_merge(graph: &mut Graph, cell: CellId, blocks: &mut Vec<BlockId>) -> bool {
    let mut bundles: Vec<Vec<BlockId>> = Vec::new();
    let mut i = 0;
    while i < blocks.len() {
        let mut bundle: Vec<BlockId> = blocks[(i + 1)..]
            .iter()
            .copied()
            .filter(|&b| compare_block_parallel(graph, blocks[i], b))
            .collect();
        if bundle.is_empty() {
            i += 1;
        } else {
            bundle.push(blocks[i]);
            blocks.retain(|b| !bundle.contains(b));
            bundles.push(bundle);
        }
    }
    let merged = !bundles.is_empty();
    for bundle in bundles {
        let parallel = graph.new_parallel_block(cell, bundle, true);
        blocks.push(parallel);
    }
    merged
}

/// Pair up 3-node bus blocks of one cell that end at the same node from
/// different busbars.
pub fn determine_stackable_blocks(graph: &mut Graph) {
    info!("Determining stackable blocks");
    for cell in graph.bus_cell_ids() {
        let blocks = graph.cell(cell).bus_blocks.clone();
        for (i, &b1) in blocks.iter().enumerate() {
            if graph.block(b1).primary_nodes().len() != 3 {
                continue;
            }
            for &b2 in &blocks[(i + 1)..] {
                if graph.block(b2).primary_nodes().len() == 3
                    && graph.block_end(b1) == graph.block_end(b2)
                    && graph.block_start(b1) != graph.block_start(b2)
                {
                    graph.add_stackable(b1, b2);
                    graph.add_stackable(b2, b1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sld_core::{BlockKind, Cell, ComponentType, Direction, Node, SwitchKind};

    /// bus - d - f - b - l, already normalized
    fn extern_cell() -> (Graph, CellId) {
        let mut g = Graph::new("vl");
        let bus = g.add_node(Node::bus("bbs")).unwrap();
        let d = g.add_node(Node::switch("d", SwitchKind::Disconnector, false)).unwrap();
        let f = g.add_node(Node::fictitious("f")).unwrap();
        let b = g.add_node(Node::switch("b", SwitchKind::Breaker, false)).unwrap();
        let l = g
            .add_node(Node::feeder("l", ComponentType::Line, 1, Direction::Top))
            .unwrap();
        g.add_edge(bus, d);
        g.add_edge(d, f);
        g.add_edge(f, b);
        g.add_edge(b, l);
        let cell = g.add_cell(Cell::new(CellId::new(0), CellKind::Extern, vec![l, b, f, d, bus]));
        (g, cell)
    }

    #[test]
    fn test_serial_decomposition() {
        let (mut g, cell) = extern_cell();
        let mut ctx = LayoutContext::new();
        determine_blocks(&mut g, &mut ctx, cell).unwrap();

        let root = g.cell(cell).root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Serial);
        assert_eq!(g.node(g.block_start(root)).id, "bbs");
        assert_eq!(g.node(g.block_end(root)).id, "l");
        assert_eq!(g.cell(cell).bus_blocks.len(), 1);
        assert_eq!(ctx.diagnostics.warning_count(), 0);
    }

    #[test]
    fn test_parallel_legs_from_two_buses() {
        let mut g = Graph::new("vl");
        let b1 = g.add_node(Node::bus("b1")).unwrap();
        let b2 = g.add_node(Node::bus("b2")).unwrap();
        let d1 = g.add_node(Node::switch("d1", SwitchKind::Disconnector, false)).unwrap();
        let d2 = g.add_node(Node::switch("d2", SwitchKind::Disconnector, false)).unwrap();
        let f = g.add_node(Node::fictitious("f")).unwrap();
        let br = g.add_node(Node::switch("br", SwitchKind::Breaker, false)).unwrap();
        let l = g
            .add_node(Node::feeder("l", ComponentType::Load, 1, Direction::Top))
            .unwrap();
        g.add_edge(b1, d1);
        g.add_edge(d1, f);
        g.add_edge(b2, d2);
        g.add_edge(d2, f);
        g.add_edge(f, br);
        g.add_edge(br, l);
        let cell = g.add_cell(Cell::new(
            CellId::new(0),
            CellKind::Extern,
            vec![b1, b2, d1, d2, f, br, l],
        ));

        let mut ctx = LayoutContext::new();
        determine_blocks(&mut g, &mut ctx, cell).unwrap();
        let root = g.cell(cell).root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Serial);
        let lower = g.block(root).sub_blocks()[0];
        assert_eq!(g.block(lower).kind(), BlockKind::Parallel);
        assert_eq!(g.block_cardinality(lower, f), 2);

        determine_stackable_blocks(&mut g);
        let legs = g.cell(cell).bus_blocks.clone();
        assert_eq!(legs.len(), 2);
        assert_eq!(g.block(legs[0]).stackable(), &[legs[1]]);
    }

    #[test]
    fn test_similarity() {
        let (g, _) = extern_cell();
        let bus = g.node_index("bbs").unwrap();
        let l = g.node_index("l").unwrap();
        let f = g.node_index("f").unwrap();
        assert!(similar(&g, bus, bus));
        assert!(!similar(&g, bus, l));
        assert!(!similar(&g, f, l));
    }
}
