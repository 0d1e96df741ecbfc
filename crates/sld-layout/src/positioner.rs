//! Horizontal placement of cells and busbar sections.
//!
//! Subsections are walked left to right with a running column `h_pos`. In
//! each one, horizontal intern cells opened earlier are closed first, then
//! vertical couplings and extern cells are laid out, then new horizontal
//! intern cells are opened. Busbar sections start when their row key
//! changes and end when it changes again.

use petgraph::stable_graph::NodeIndex;
use sld_core::{CellId, Direction, Graph, Side, SldError, SldResult};
use tracing::{debug, info};

use crate::subsections::{HorizontalSubSection, SubSections};

/// Running state of the left-to-right walk.
#[derive(Debug, Default)]
struct Walk {
    h_pos: i32,
    prev_h_pos: i32,
    /// Width taken by flat cells at the end of the previous subsection
    h_space: i32,
    /// Horizontal intern cells opened and not yet closed, in opening order
    to_close: Vec<CellId>,
}

/// Assign the h of every bus-cell root block and the h/h_span of every
/// busbar section.
pub fn determine_block_positions(graph: &mut Graph, subsections: &SubSections) -> SldResult<()> {
    info!("Determining block positions");
    let rows = subsections.rows();
    for bus in graph.bus_nodes() {
        let v = graph
            .node(bus)
            .structural_position()
            .map(|p| p.v)
            .ok_or_else(|| {
                SldError::Layout(format!("busbar '{}' has no structural position", graph.node(bus).id))
            })?;
        if let Some(data) = graph.node_mut(bus).bus_data_mut() {
            data.position.v = v;
        }
    }

    let mut walk = Walk::default();
    let mut previous = vec![0; rows];
    for (key, hss) in subsections.iter() {
        for row in 0..rows {
            if key[row] != previous[row] {
                update_bus_position(graph, row, walk.h_pos, walk.h_space, &previous, Side::Left);
                update_bus_position(graph, row, walk.h_pos, 0, key, Side::Right);
            }
        }
        let (h, _) = place_horizontal_intern(graph, &mut walk, hss, Side::Left)?;
        walk.h_pos = h;
        walk.h_pos = place_vertical_couplings(graph, walk.h_pos, hss)?;
        walk.h_pos = place_extern_cells(graph, walk.h_pos, hss)?;
        let (h, width) = place_horizontal_intern(graph, &mut walk, hss, Side::Right)?;
        walk.h_pos = h;
        walk.h_space = width;

        if walk.h_pos == walk.prev_h_pos {
            walk.h_pos += 1;
        }
        walk.prev_h_pos = walk.h_pos;
        previous = key.to_vec();
    }
    for row in 0..rows {
        update_bus_position(graph, row, walk.h_pos, walk.h_space, &previous, Side::Left);
    }
    debug!(width = walk.h_pos, "block positions determined");
    Ok(())
}

fn root_of(graph: &Graph, cell: CellId) -> SldResult<sld_core::BlockId> {
    graph
        .cell(cell)
        .root
        .ok_or_else(|| SldError::Layout(format!("cell {} has no block", graph.full_id(cell))))
}

/// A section starts (`Right`) at the current column unless it already has
/// one, and ends (`Left`) with a span reaching the current column.
fn update_bus_position(
    graph: &mut Graph,
    row: usize,
    h_pos: i32,
    h_space: i32,
    key: &[i32],
    side: Side,
) {
    if key[row] == 0 {
        return;
    }
    let Some(bus) = graph.bus_at(row as i32 + 1, key[row]) else {
        return;
    };
    let Some(data) = graph.node_mut(bus).bus_data_mut() else {
        return;
    };
    let p = &mut data.position;
    match side {
        Side::Left => p.h_span = h_pos - p.h.max(0) - h_space,
        Side::Right if p.h == -1 || h_pos == 0 => p.h = h_pos,
        _ => {}
    }
}

fn place_vertical_couplings(graph: &mut Graph, h_pos: i32, hss: &HorizontalSubSection) -> SldResult<i32> {
    let mut h = h_pos;
    for cell in hss.side_intern_cells(Side::Undefined) {
        let root = root_of(graph, cell)?;
        let position = &mut graph.block_mut(root).position;
        position.h = h;
        h += position.h_span;
    }
    Ok(h)
}

fn place_extern_cells(graph: &mut Graph, h_pos: i32, hss: &HorizontalSubSection) -> SldResult<i32> {
    let mut h = h_pos;
    for cell in hss.extern_cells() {
        let root = root_of(graph, cell)?;
        let position = &mut graph.block_mut(root).position;
        position.set_hv(h, 0);
        h += position.h_span;
    }
    Ok(h)
}

/// Open (`Right`) or close (`Left`) the horizontal intern cells filed on
/// `side`, then place flat cells. Returns the next column and the width
/// taken by flat cells.
fn place_horizontal_intern(
    graph: &mut Graph,
    walk: &mut Walk,
    hss: &HorizontalSubSection,
    side: Side,
) -> SldResult<(i32, i32)> {
    let (flat, mut non_flat): (Vec<CellId>, Vec<CellId>) = hss
        .side_intern_cells(side)
        .into_iter()
        .partition(|&c| graph.cell(c).direction == Direction::Flat);
    // Last opened is closed first.
    non_flat.sort_by_key(|c| {
        let index = walk.to_close.iter().position(|o| o == c).map_or(-1, |i| i as i64);
        -index
    });

    let mut res = walk.h_pos;
    if side == Side::Right {
        res = open_non_flat(graph, res, &non_flat)?;
        walk.to_close.extend(non_flat.iter().copied());
    } else {
        res = close_non_flat(graph, res, &non_flat);
        walk.to_close.retain(|c| !non_flat.contains(c));
    }

    let mut shift = 0;
    if side == Side::Right {
        for cell in flat {
            if walk.prev_h_pos == res {
                res += 1;
            }
            let v = graph
                .cell_buses(cell)
                .first()
                .and_then(|&b| graph.node(b).structural_position())
                .map_or(0, |p| p.v);
            let root = root_of(graph, cell)?;
            let position = &mut graph.block_mut(root).position;
            position.set_hv(res, v);
            shift = shift.max(position.h_span);
        }
    }
    Ok((res + shift, shift))
}

fn open_non_flat(graph: &mut Graph, h_pos: i32, cells: &[CellId]) -> SldResult<i32> {
    let mut h = h_pos;
    for &cell in cells {
        let root = root_of(graph, cell)?;
        let right_span = graph
            .cell(cell)
            .intern
            .right
            .map_or(0, |b| graph.block(b).position.h_span);
        let position = &mut graph.block_mut(root).position;
        position.set_hv(h, 0);
        h += position.h_span - right_span;
    }
    Ok(h)
}

fn close_non_flat(graph: &mut Graph, h_pos: i32, cells: &[CellId]) -> i32 {
    let mut h = h_pos;
    for &cell in cells {
        if let Some(right) = graph.cell(cell).intern.right {
            let position = &mut graph.block_mut(right).position;
            position.h = h;
            position.absolute = true;
            h += position.h_span;
        }
    }
    h
}

/// Column range of a busbar section, once placed
pub fn bus_section_range(graph: &Graph, bus: NodeIndex) -> Option<(i32, i32)> {
    graph
        .node(bus)
        .bus_data()
        .map(|d| (d.position.h, d.position.h + d.position.h_span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_decomposer::decompose_cells;
    use crate::cell_detector::ImplicitCellDetector;
    use crate::context::LayoutContext;
    use crate::dimensions::dimension_bus_cells;
    use crate::intern_cell::post_positioning;
    use crate::position_finder::{PositionFinder, PositionFromExtension};
    use sld_core::{ComponentType, Diagnostics, GraphBuilder, SwitchKind};

    fn place(builder: GraphBuilder) -> Graph {
        let mut diag = Diagnostics::new();
        let mut g = builder.build(&mut diag).unwrap();
        let mut ctx = LayoutContext::new();
        ImplicitCellDetector::default()
            .detect_cells(&mut g, &mut ctx)
            .unwrap();
        decompose_cells(&mut g, &mut ctx).unwrap();
        PositionFromExtension.build_layout(&mut g, &mut ctx).unwrap();
        post_positioning(&mut g, &mut ctx).unwrap();
        let subsections = SubSections::build(&mut g, &mut ctx).unwrap();
        dimension_bus_cells(&mut g, &mut ctx).unwrap();
        determine_block_positions(&mut g, &subsections).unwrap();
        g
    }

    fn cell_of(g: &Graph, node: &str) -> CellId {
        g.node(g.node_index(node).unwrap()).cell.unwrap()
    }

    fn root_h(g: &Graph, node: &str) -> i32 {
        let root = g.cell(cell_of(g, node)).root.unwrap();
        g.block(root).position.h
    }

    #[test]
    fn test_extern_cells_follow_feeder_order() {
        let mut b = GraphBuilder::new("vl");
        b.visit_bus(0, "bbs", Some((1, 1)))
            .visit_feeder(3, "l1", ComponentType::Line, 2, Direction::Top)
            .visit_switch("d1", SwitchKind::Disconnector, false, 0, 1)
            .visit_switch("b1", SwitchKind::Breaker, false, 1, 3)
            .visit_feeder(4, "l2", ComponentType::Line, 1, Direction::Top)
            .visit_switch("d2", SwitchKind::Disconnector, false, 0, 2)
            .visit_switch("b2", SwitchKind::Breaker, false, 2, 4);
        let g = place(b);

        assert_eq!(root_h(&g, "l2"), 0);
        assert_eq!(root_h(&g, "l1"), 1);
        let bus = g.node_index("bbs").unwrap();
        assert_eq!(bus_section_range(&g, bus), Some((0, 2)));
    }

    #[test]
    fn test_flat_coupling_between_sections() {
        let mut b = GraphBuilder::new("vl");
        b.visit_bus(0, "bbs1", Some((1, 1)))
            .visit_bus(1, "bbs2", Some((2, 1)))
            .visit_switch("c", SwitchKind::Disconnector, false, 0, 1)
            .visit_feeder(4, "l1", ComponentType::Line, 1, Direction::Top)
            .visit_switch("d1", SwitchKind::Disconnector, false, 0, 2)
            .visit_switch("b1", SwitchKind::Breaker, false, 2, 4)
            .visit_feeder(5, "l2", ComponentType::Line, 2, Direction::Top)
            .visit_switch("d2", SwitchKind::Disconnector, false, 1, 3)
            .visit_switch("b2", SwitchKind::Breaker, false, 3, 5);
        let g = place(b);

        let coupling = cell_of(&g, "c");
        assert_eq!(g.cell(coupling).direction, Direction::Flat);
        // the coupling sits on the boundary between the two sections
        assert_eq!(root_h(&g, "l1"), 0);
        assert_eq!(root_h(&g, "c"), 1);
        assert_eq!(root_h(&g, "l2"), 1);

        assert_eq!(bus_section_range(&g, g.node_index("bbs1").unwrap()), Some((0, 1)));
        assert_eq!(bus_section_range(&g, g.node_index("bbs2").unwrap()), Some((1, 2)));
    }
}
