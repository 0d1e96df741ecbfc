//! Shape of intern cells once busbar positions are known.
//!
//! An intern cell joining two adjacent sections of one busbar row is drawn
//! flat in the row. A cell whose busbars all sit in one column is a
//! vertical coupling. Any other cell is horizontal: its block tree is
//! rebuilt as `Parallel[Serial(left leg, central block), right leg]` so the
//! positioner can open the left leg in one subsection and close the right
//! leg in a later one.
//!
//! Decomposition usually hands over a bus-to-bus coupling as
//! `Parallel[Serial(leg, central), other legs..]`, since all busbar
//! extremities are similar to each other. The serial sub-block gives one leg
//! and the central block, the remaining sub-blocks form the other leg.

use petgraph::stable_graph::NodeIndex;
use sld_core::{
    BlockContent, BlockId, BlockKind, CellId, CellKind, Direction, Extremity, Graph, InternShape,
    NodeType, Orientation, Position, Side, SldError, SldResult,
};
use tracing::{debug, info};

use crate::context::LayoutContext;

/// Classify every intern cell and rebuild the horizontal ones.
pub fn post_positioning(graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<()> {
    info!("Settling intern cells");
    let interns: Vec<CellId> = graph
        .cell_ids()
        .into_iter()
        .filter(|&c| graph.cell(c).kind.is_intern())
        .collect();
    for cell in interns {
        settle(graph, ctx, cell)?;
    }
    Ok(())
}

fn bus_position(graph: &Graph, bus: NodeIndex) -> SldResult<Position> {
    graph.node(bus).structural_position().ok_or_else(|| {
        SldError::Layout(format!(
            "busbar '{}' has no structural position",
            graph.node(bus).id
        ))
    })
}

fn settle(graph: &mut Graph, ctx: &mut LayoutContext, cell: CellId) -> SldResult<()> {
    let buses = graph.cell_buses(cell);
    let positions = buses
        .iter()
        .map(|&b| bus_position(graph, b))
        .collect::<SldResult<Vec<Position>>>()?;
    let root = graph
        .cell(cell)
        .root
        .ok_or_else(|| SldError::Layout(format!("cell {} has no block", graph.full_id(cell))))?;

    graph.cell_mut(cell).intern = Default::default();

    let flat = positions.len() == 2
        && (positions[0].h - positions[1].h).abs() == 1
        && positions[0].v == positions[1].v;
    if flat {
        graph.set_block_orientation(root, Orientation::Horizontal);
        let c = graph.cell_mut(cell);
        c.direction = Direction::Flat;
        c.intern.shape = InternShape::Flat;
        if c.kind == CellKind::InternBound {
            c.intern.central = Some(root);
        }
        return Ok(());
    }

    let vertical = positions.windows(2).all(|w| w[0].h == w[1].h);
    graph.cell_mut(cell).direction = Direction::Top;
    graph.cell_mut(cell).intern.shape = if vertical {
        InternShape::Vertical
    } else {
        InternShape::Horizontal
    };

    if graph.cell(cell).kind == CellKind::InternBound {
        return handle_non_flat_intern_bound(graph, cell, root);
    }
    if vertical {
        graph.block_mut(root).position.v = 1;
        return Ok(());
    }

    match unravel(graph, root) {
        Some(legs) => {
            let central = build_central(graph, cell, &legs.middle);
            let other = match legs.last.as_slice() {
                [single] => *single,
                _ => graph.new_parallel_block(cell, legs.last.clone(), true),
            };
            let (left, right) = if leg_h(graph, legs.first) <= leg_h(graph, other) {
                (legs.first, other)
            } else {
                (other, legs.first)
            };
            refactor_blocks(graph, cell, left, central, right);
        }
        None => {
            let full_id = graph.full_id(cell);
            ctx.warn_for("intern", "Intern cell structure not handled", &full_id);
            let c = graph.cell_mut(cell);
            c.intern.shape = InternShape::Vertical;
            graph.block_mut(root).position.v = 1;
        }
    }
    Ok(())
}

/// Pad the coupling switch on both sides and turn the cell into a regular
/// intern cell with two legs and a central block.
fn handle_non_flat_intern_bound(graph: &mut Graph, cell: CellId, root: BlockId) -> SldResult<()> {
    let nodes = graph.block(root).primary_nodes().to_vec();
    assert!(
        nodes.len() == 3,
        "intern bound cell {} is not a 3-node chain",
        graph.full_id(cell)
    );
    let switch = nodes[1];
    let [p0, p1] = graph.extend_switch_between_bus(switch)?;

    for n in [p0.switch, p0.node, p1.switch, p1.node] {
        graph.cell_mut(cell).nodes.push(n);
        graph.node_mut(n).cell = Some(cell);
    }
    graph.cell_mut(cell).kind = CellKind::Intern;

    let block0 = graph.new_primary_block(cell, vec![p0.bus, p0.switch, p0.node]);
    let block1 = graph.new_primary_block(cell, vec![p1.bus, p1.switch, p1.node]);
    let central = graph.new_primary_block(cell, vec![p0.node, switch, p1.node]);
    graph.cell_mut(cell).bus_blocks = vec![block0, block1];

    let h0 = bus_position(graph, p0.bus)?.h;
    let h1 = bus_position(graph, p1.bus)?.h;
    let (left, right) = if h0 < h1 {
        (block0, block1)
    } else {
        (block1, block0)
    };
    refactor_blocks(graph, cell, left, central, right);
    Ok(())
}

/// Blocks of a serial chain, in path order.
fn serial_chain(graph: &Graph, id: BlockId, out: &mut Vec<BlockId>) {
    match graph.block(id).content {
        BlockContent::Serial { lower, upper, .. } => {
            serial_chain(graph, lower, out);
            serial_chain(graph, upper, out);
        }
        _ => out.push(id),
    }
}

/// Legs and central part read off a decomposed intern cell.
#[derive(Debug, Clone)]
struct Legs {
    first: BlockId,
    /// Central blocks in path order
    middle: Vec<BlockId>,
    /// Blocks forming the other leg, bundled when there are several
    last: Vec<BlockId>,
}

impl Legs {
    /// Both legs reach busbars, the central part does not, and each leg
    /// touches the central part.
    fn is_consistent(&self, graph: &Graph) -> bool {
        let (Some(&head), Some(&tail)) = (self.middle.first(), self.middle.last()) else {
            return false;
        };
        !self.last.is_empty()
            && graph.block_embeds(self.first, NodeType::Bus)
            && self.last.iter().all(|&b| graph.block_embeds(b, NodeType::Bus))
            && self.middle.iter().all(|&b| !graph.block_embeds(b, NodeType::Bus))
            && shared_extremity(graph, self.first, head).is_some()
            && self
                .last
                .iter()
                .all(|&b| shared_extremity(graph, b, tail).is_some())
    }
}

/// Split the root of an intern cell into legs and central blocks.
///
/// A parallel root contributes the lower block of its serial sub-block as
/// one leg and the upper block as the central block; its other sub-blocks
/// make up the second leg. A serial root is split at both ends of its chain.
fn unravel(graph: &Graph, root: BlockId) -> Option<Legs> {
    let legs = match &graph.block(root).content {
        BlockContent::Parallel { subs } => {
            let serial = subs
                .iter()
                .copied()
                .find(|&s| graph.block(s).kind() == BlockKind::Serial)?;
            let BlockContent::Serial { lower, upper, .. } = graph.block(serial).content else {
                return None;
            };
            Legs {
                first: lower,
                middle: vec![upper],
                last: subs.iter().copied().filter(|&s| s != serial).collect(),
            }
        }
        BlockContent::Serial { .. } => {
            let mut chain = Vec::new();
            serial_chain(graph, root, &mut chain);
            if chain.len() < 3 {
                return None;
            }
            Legs {
                first: chain[0],
                middle: chain[1..chain.len() - 1].to_vec(),
                last: vec![chain[chain.len() - 1]],
            }
        }
        _ => return None,
    };
    legs.is_consistent(graph).then_some(legs)
}

fn leg_buses(graph: &Graph, blocks: &[BlockId]) -> Vec<NodeIndex> {
    let mut buses = Vec::new();
    for &b in blocks {
        for n in graph.block_nodes(b) {
            if graph.node(n).is_bus() && !buses.contains(&n) {
                buses.push(n);
            }
        }
    }
    buses
}

/// Leftmost busbar column reached by a leg
fn leg_h(graph: &Graph, leg: BlockId) -> i32 {
    graph
        .block_nodes(leg)
        .into_iter()
        .filter_map(|n| graph.node(n).structural_position())
        .map(|p| p.h)
        .min()
        .unwrap_or(i32::MAX)
}

/// Extremity shared by two blocks
fn shared_extremity(graph: &Graph, a: BlockId, b: BlockId) -> Option<NodeIndex> {
    let ends_b = [graph.block_start(b), graph.block_end(b)];
    [graph.block_start(a), graph.block_end(a)]
        .into_iter()
        .find(|n| ends_b.contains(n))
}

fn build_central(graph: &mut Graph, cell: CellId, middle: &[BlockId]) -> BlockId {
    let mut acc = middle[0];
    for &m in &middle[1..] {
        let common = shared_extremity(graph, acc, m)
            .expect("consecutive chain blocks share an extremity");
        acc = graph.new_serial_block(cell, acc, m, common);
    }
    acc
}

/// Rebuild the root as `Parallel[Serial(left, central), right]`.
fn refactor_blocks(graph: &mut Graph, cell: CellId, left: BlockId, central: BlockId, right: BlockId) {
    let left_attach = shared_extremity(graph, left, central)
        .expect("left leg touches the central block");
    let right_attach = shared_extremity(graph, right, central)
        .expect("right leg touches the central block");
    graph.define_extremity(left, left_attach, Extremity::End);
    graph.define_extremity(right, right_attach, Extremity::End);

    let serial = graph.new_serial_block(cell, left, central, left_attach);
    let parallel = graph.new_parallel_block(cell, vec![serial, right], false);
    graph.block_mut(parallel).parent = None;

    graph.set_block_orientation(parallel, Orientation::Vertical);
    graph.set_block_orientation(serial, Orientation::Horizontal);
    graph.set_block_orientation(left, Orientation::Vertical);

    let c = graph.cell_mut(cell);
    c.root = Some(parallel);
    c.intern.left = Some(left);
    c.intern.right = Some(right);
    c.intern.central = Some(central);
    debug!(cell = %graph.full_id(cell), "intern cell refactored");
}

/// Swap the legs of a horizontal intern cell.
pub fn reverse_cell(graph: &mut Graph, cell: CellId) {
    let layout = graph.cell(cell).intern;
    if let (Some(left), Some(central), Some(right)) = (layout.left, layout.central, layout.right) {
        refactor_blocks(graph, cell, right, central, left);
    }
}

/// Busbars reached by one side of an intern cell. Cells without legs report
/// all their busbars on either side.
pub fn side_buses(graph: &Graph, cell: CellId, side: Side) -> Vec<NodeIndex> {
    let c = graph.cell(cell);
    let buses = graph.cell_buses(cell);
    if c.intern.shape == InternShape::Flat {
        let mut sorted = buses;
        sorted.sort_by_key(|&b| graph.node(b).structural_position().map(|p| p.h));
        return match side {
            Side::Left => sorted.first().copied().into_iter().collect(),
            Side::Right => sorted.last().copied().into_iter().collect(),
            Side::Undefined => sorted,
        };
    }
    let leg = match side {
        Side::Left => c.intern.left,
        Side::Right => c.intern.right,
        Side::Undefined => None,
    };
    match leg {
        Some(leg) => leg_buses(graph, &[leg]),
        None => buses,
    }
}

/// Busbar groups of an intern cell before any position is known: each
/// busbar of a 3-node coupling, the busbars of each leg, or all busbars
/// together.
pub fn bus_groups(graph: &Graph, cell: CellId) -> Vec<Vec<NodeIndex>> {
    let c = graph.cell(cell);
    let buses = graph.cell_buses(cell);
    if c.kind == CellKind::InternBound {
        return buses.into_iter().map(|b| vec![b]).collect();
    }
    match c.root.and_then(|root| unravel(graph, root)) {
        Some(legs) => vec![leg_buses(graph, &[legs.first]), leg_buses(graph, &legs.last)],
        None => vec![buses],
    }
}

/// Column of a side of a horizontal intern cell, once blocks are placed
pub fn side_h_pos(graph: &Graph, cell: CellId, side: Side) -> i32 {
    let c = graph.cell(cell);
    let root = match c.root {
        Some(root) => graph.block(root).position,
        None => return 0,
    };
    match (side, c.intern.right) {
        (Side::Right, Some(right)) => {
            let right = graph.block(right).position;
            if right.absolute {
                right.h
            } else {
                root.h + right.h
            }
        }
        _ => root.h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_decomposer::determine_blocks;
    use sld_core::{BlockKind, Cell, Node, SwitchKind};

    fn coupling(h2: i32, v2: i32) -> (Graph, CellId) {
        let mut g = Graph::new("vl");
        let mut b1 = Node::bus("b1");
        b1.bus_data_mut().unwrap().structural_position = Some(Position::new(1, 1).with_h_span(1));
        let mut b2 = Node::bus("b2");
        b2.bus_data_mut().unwrap().structural_position = Some(Position::new(h2, v2).with_h_span(1));
        let b1 = g.add_node(b1).unwrap();
        let b2 = g.add_node(b2).unwrap();
        let s = g.add_node(Node::switch("s", SwitchKind::Disconnector, false)).unwrap();
        g.add_edge(b1, s);
        g.add_edge(s, b2);
        let cell = g.add_cell(Cell::new(CellId::new(0), CellKind::InternBound, vec![b2, s, b1]));
        let mut ctx = LayoutContext::new();
        determine_blocks(&mut g, &mut ctx, cell).unwrap();
        (g, cell)
    }

    #[test]
    fn test_flat_coupling() {
        let (mut g, cell) = coupling(2, 1);
        let mut ctx = LayoutContext::new();
        post_positioning(&mut g, &mut ctx).unwrap();
        let c = g.cell(cell);
        assert_eq!(c.direction, Direction::Flat);
        assert_eq!(c.kind, CellKind::InternBound);
        let root = c.root.unwrap();
        assert_eq!(g.block(root).position.orientation, Orientation::Horizontal);
        assert_eq!(g.block(root).kind(), BlockKind::Primary);

        let left = side_buses(&g, cell, Side::Left);
        assert_eq!(g.node(left[0]).id, "b1");
    }

    #[test]
    fn test_non_flat_intern_bound_is_padded() {
        let (mut g, cell) = coupling(3, 1);
        let mut ctx = LayoutContext::new();
        post_positioning(&mut g, &mut ctx).unwrap();

        let c = g.cell(cell);
        assert_eq!(c.kind, CellKind::Intern);
        assert_eq!(c.intern.shape, InternShape::Horizontal);
        assert_eq!(c.nodes.len(), 7);
        let root = c.root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Parallel);
        assert_eq!(g.block(root).position.orientation, Orientation::Vertical);

        let central = c.intern.central.unwrap();
        let ids: Vec<&str> = g
            .block(central)
            .primary_nodes()
            .iter()
            .map(|&n| g.node(n).id.as_str())
            .collect();
        assert_eq!(ids, vec!["FICT_vl_sfNode0", "s", "FICT_vl_sfNode1"]);
        assert_eq!(g.block(central).position.orientation, Orientation::Horizontal);

        let left = side_buses(&g, cell, Side::Left);
        let right = side_buses(&g, cell, Side::Right);
        assert_eq!(g.node(left[0]).id, "b1");
        assert_eq!(g.node(right[0]).id, "b2");
    }

    #[test]
    fn test_reverse_cell_swaps_legs() {
        let (mut g, cell) = coupling(3, 1);
        let mut ctx = LayoutContext::new();
        post_positioning(&mut g, &mut ctx).unwrap();
        let before = g.cell(cell).intern;
        reverse_cell(&mut g, cell);
        let after = g.cell(cell).intern;
        assert_eq!(after.left, before.right);
        assert_eq!(after.right, before.left);
        assert_eq!(after.central, before.central);
        let root = g.cell(cell).root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Parallel);
    }

    fn positioned_bus(g: &mut Graph, id: &str, h: i32, v: i32) -> NodeIndex {
        let mut bus = Node::bus(id);
        bus.bus_data_mut().unwrap().structural_position = Some(Position::new(h, v).with_h_span(1));
        g.add_node(bus).unwrap()
    }

    /// Coupling from `b1` at column 1 to `b3` at column 3 through
    /// `d1 - f1 - br - f2 - d2`, plus an optional second busbar at column 1
    /// joined to `f1`.
    fn long_coupling(second_bus: bool) -> (Graph, CellId) {
        let mut g = Graph::new("vl");
        let b1 = positioned_bus(&mut g, "b1", 1, 1);
        let b3 = positioned_bus(&mut g, "b3", 3, 1);
        let d1 = g.add_node(Node::switch("d1", SwitchKind::Disconnector, false)).unwrap();
        let f1 = g.add_node(Node::fictitious("f1")).unwrap();
        let br = g.add_node(Node::switch("br", SwitchKind::Breaker, false)).unwrap();
        let f2 = g.add_node(Node::fictitious("f2")).unwrap();
        let d2 = g.add_node(Node::switch("d2", SwitchKind::Disconnector, false)).unwrap();
        for (a, b) in [(b1, d1), (d1, f1), (f1, br), (br, f2), (f2, d2), (d2, b3)] {
            g.add_edge(a, b);
        }
        let mut nodes = vec![b1, d1, f1, br, f2, d2, b3];
        if second_bus {
            let b2 = positioned_bus(&mut g, "b2", 1, 2);
            let d3 = g.add_node(Node::switch("d3", SwitchKind::Disconnector, false)).unwrap();
            g.add_edge(b2, d3);
            g.add_edge(d3, f1);
            nodes.extend([b2, d3]);
        }
        let cell = g.add_cell(Cell::new(CellId::new(0), CellKind::Intern, nodes));
        let mut ctx = LayoutContext::new();
        determine_blocks(&mut g, &mut ctx, cell).unwrap();
        (g, cell)
    }

    fn bus_ids(g: &Graph, buses: &[NodeIndex]) -> Vec<String> {
        let mut ids: Vec<String> = buses.iter().map(|&b| g.node(b).id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_parallel_root_becomes_horizontal() {
        let (mut g, cell) = long_coupling(false);
        let root = g.cell(cell).root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Parallel);

        let mut ctx = LayoutContext::new();
        post_positioning(&mut g, &mut ctx).unwrap();
        assert!(!ctx.diagnostics.has_warnings());

        let c = g.cell(cell);
        assert_eq!(c.intern.shape, InternShape::Horizontal);
        assert_eq!(c.direction, Direction::Top);
        let central = c.intern.central.unwrap();
        let ids: Vec<&str> = g
            .block(central)
            .primary_nodes()
            .iter()
            .map(|&n| g.node(n).id.as_str())
            .collect();
        assert_eq!(ids, vec!["f1", "br", "f2"]);
        assert_eq!(bus_ids(&g, &side_buses(&g, cell, Side::Left)), vec!["b1"]);
        assert_eq!(bus_ids(&g, &side_buses(&g, cell, Side::Right)), vec!["b3"]);

        let root = g.cell(cell).root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Parallel);
        assert_eq!(g.block(root).position.orientation, Orientation::Vertical);
        assert_eq!(g.block(central).position.orientation, Orientation::Horizontal);
    }

    #[test]
    fn test_remaining_legs_are_bundled() {
        let (mut g, cell) = long_coupling(true);
        let mut ctx = LayoutContext::new();
        post_positioning(&mut g, &mut ctx).unwrap();
        assert!(!ctx.diagnostics.has_warnings());

        let c = g.cell(cell);
        assert_eq!(c.intern.shape, InternShape::Horizontal);
        let left = c.intern.left.unwrap();
        assert_eq!(g.block(left).kind(), BlockKind::Parallel);
        assert_eq!(bus_ids(&g, &side_buses(&g, cell, Side::Left)), vec!["b1", "b2"]);
        assert_eq!(bus_ids(&g, &side_buses(&g, cell, Side::Right)), vec!["b3"]);
    }

    #[test]
    fn test_bus_groups_follow_legs() {
        let (g, cell) = long_coupling(true);
        let mut groups: Vec<Vec<String>> = bus_groups(&g, cell)
            .iter()
            .map(|group| bus_ids(&g, group))
            .collect();
        groups.sort();
        assert_eq!(groups, vec![vec!["b1".to_string(), "b2".to_string()], vec!["b3".to_string()]]);
    }

    #[test]
    fn test_bus_groups_before_positioning() {
        let (g, cell) = coupling(3, 1);
        let groups = bus_groups(&g, cell);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|group| group.len() == 1));
    }
}
