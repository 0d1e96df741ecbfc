//! Grid extent of every block and the relative position of its children.
//!
//! Spans are computed bottom-up; a parent places each child at an `(h, v)`
//! offset inside its own extent. Absolute positions are only assigned later
//! by the positioner.

use sld_core::{BlockContent, BlockId, BlockKind, Graph, NodeType, Orientation, SldResult};
use tracing::trace;

use crate::context::LayoutContext;

/// Dimension the block tree of every busbar cell.
pub fn dimension_bus_cells(graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<()> {
    for cell in graph.bus_cell_ids() {
        if let Some(root) = graph.cell(cell).root {
            if embeds_horizontal_undefined(graph, root) {
                let full_id = graph.full_id(cell);
                ctx.warn_for(
                    "blocks",
                    "undefined block drawn horizontally, sub-blocks stacked",
                    &full_id,
                );
            }
            calculate_dimension_and_intern_pos(graph, root)?;
        }
    }
    Ok(())
}

fn embeds_horizontal_undefined(graph: &Graph, block: BlockId) -> bool {
    let b = graph.block(block);
    (b.kind() == BlockKind::Undefined && b.position.orientation == Orientation::Horizontal)
        || b
            .sub_blocks()
            .into_iter()
            .any(|sub| embeds_horizontal_undefined(graph, sub))
}

/// Compute `h_span`/`v_span` of `block` and the relative positions of its
/// sub-blocks.
pub fn calculate_dimension_and_intern_pos(graph: &mut Graph, block: BlockId) -> SldResult<()> {
    let orientation = graph.block(block).position.orientation;
    match graph.block(block).content.clone() {
        BlockContent::Primary { nodes, stackable } => {
            let (h_span, v_span) = if nodes.iter().any(|&n| graph.node(n).is_bus()) {
                let cell = graph.block(block).cell;
                if graph.cell(cell).is_flat() || !stackable.is_empty() {
                    (0, 0)
                } else {
                    (1, 0)
                }
            } else {
                let links = nodes.len() as i32 - 1;
                match orientation {
                    Orientation::Vertical => (1, links),
                    Orientation::Horizontal => (links / 2, 1),
                }
            };
            set_spans(graph, block, h_span, v_span);
        }
        BlockContent::Serial { lower, upper, .. } => {
            calculate_dimension_and_intern_pos(graph, lower)?;
            calculate_dimension_and_intern_pos(graph, upper)?;
            let l = graph.block(lower).position;
            let u = graph.block(upper).position;
            match orientation {
                Orientation::Vertical => {
                    set_spans(graph, block, l.h_span.max(u.h_span), l.v_span + u.v_span);
                    graph.block_mut(lower).position.set_hv(0, 0);
                    graph.block_mut(upper).position.set_hv(0, l.v_span);
                }
                Orientation::Horizontal => {
                    let h2v = l.orientation == Orientation::Vertical
                        && u.orientation == Orientation::Horizontal;
                    let shift = i32::from(h2v);
                    set_spans(graph, block, l.h_span + u.h_span - shift, l.v_span.max(u.v_span));
                    graph.block_mut(lower).position.set_hv(0, 0);
                    graph.block_mut(upper).position.set_hv(l.h_span - shift, 0);
                    graph.block_mut(block).content = BlockContent::Serial { lower, upper, h2v };
                }
            }
        }
        BlockContent::Parallel { subs } => {
            for &sub in &subs {
                calculate_dimension_and_intern_pos(graph, sub)?;
            }
            match orientation {
                Orientation::Vertical => {
                    let v_span = subs
                        .iter()
                        .map(|&s| graph.block(s).position.v_span)
                        .max()
                        .unwrap_or(0);
                    let h_span = if graph.block_embeds(block, NodeType::Bus) {
                        stack_bus_blocks(graph, &subs)
                    } else {
                        let mut sorted = subs.clone();
                        sorted.sort_by_key(|&s| graph.block_order(s));
                        let mut h = 0;
                        for &s in &sorted {
                            graph.block_mut(s).position.set_hv(h, 0);
                            h += graph.block(s).position.h_span;
                        }
                        graph.block_mut(block).content = BlockContent::Parallel { subs: sorted };
                        h
                    };
                    set_spans(graph, block, h_span, v_span);
                }
                Orientation::Horizontal => {
                    let h_span = subs
                        .iter()
                        .map(|&s| graph.block(s).position.h_span)
                        .max()
                        .unwrap_or(0);
                    let mut v = 0;
                    for &s in &subs {
                        graph.block_mut(s).position.set_hv(0, v);
                        v += graph.block(s).position.v_span;
                    }
                    set_spans(graph, block, h_span, v);
                }
            }
        }
        // Sub-blocks are stacked on one another whatever the orientation.
        BlockContent::Undefined { subs } => {
            for &sub in &subs {
                calculate_dimension_and_intern_pos(graph, sub)?;
                graph.block_mut(sub).position.set_hv(0, 0);
            }
            let h_span = subs.iter().map(|&s| graph.block(s).position.h_span).max().unwrap_or(0);
            let v_span = subs.iter().map(|&s| graph.block(s).position.v_span).max().unwrap_or(0);
            set_spans(graph, block, h_span, v_span);
        }
    }
    trace!(
        block = block.value(),
        h_span = graph.block(block).position.h_span,
        v_span = graph.block(block).position.v_span,
        "block dimensioned"
    );
    Ok(())
}

fn set_spans(graph: &mut Graph, block: BlockId, h_span: i32, v_span: i32) {
    let position = &mut graph.block_mut(block).position;
    position.h_span = h_span;
    position.v_span = v_span;
}

/// Walk the bus-side blocks left to right; a group of stackable blocks
/// shares a single column. Returns the total width.
fn stack_bus_blocks(graph: &mut Graph, subs: &[BlockId]) -> i32 {
    let mut remaining = subs.to_vec();
    let mut h = 0;
    while !remaining.is_empty() {
        let b = remaining.remove(0);
        graph.block_mut(b).position.set_hv(h, 0);
        let stackable = graph.block(b).stackable().to_vec();
        if stackable.is_empty() {
            h += graph.block(b).position.h_span;
        } else {
            for &s in &stackable {
                graph.block_mut(s).position.set_hv(h, 0);
            }
            remaining.retain(|r| !stackable.contains(r));
            h += 1;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use sld_core::{Cell, CellId, CellKind, Node, SwitchKind};

    fn graph_with_cell() -> (Graph, CellId) {
        let mut g = Graph::new("vl");
        let cell = g.add_cell(Cell::new(CellId::new(0), CellKind::Extern, Vec::new()));
        (g, cell)
    }

    fn add_nodes(g: &mut Graph, cell: CellId, ids: &[&str]) -> Vec<sld_core::NodeIndex> {
        ids.iter()
            .map(|id| {
                let node = if id.starts_with("bbs") {
                    Node::bus(*id)
                } else {
                    Node::switch(*id, SwitchKind::Disconnector, false)
                };
                let ix = g.add_node(node).unwrap();
                g.cell_mut(cell).nodes.push(ix);
                ix
            })
            .collect()
    }

    #[test]
    fn test_primary_spans() {
        let (mut g, cell) = graph_with_cell();
        let n = add_nodes(&mut g, cell, &["bbs", "d", "x", "y"]);
        let bus_block = g.new_primary_block(cell, vec![n[0], n[1], n[2]]);
        let chain = g.new_primary_block(cell, vec![n[1], n[2], n[3]]);
        calculate_dimension_and_intern_pos(&mut g, bus_block).unwrap();
        calculate_dimension_and_intern_pos(&mut g, chain).unwrap();
        assert_eq!(g.block(bus_block).position.h_span, 1);
        assert_eq!(g.block(bus_block).position.v_span, 0);
        assert_eq!(g.block(chain).position.h_span, 1);
        assert_eq!(g.block(chain).position.v_span, 2);

        g.set_block_orientation(chain, Orientation::Horizontal);
        calculate_dimension_and_intern_pos(&mut g, chain).unwrap();
        assert_eq!(g.block(chain).position.h_span, 1);
        assert_eq!(g.block(chain).position.v_span, 1);
    }

    #[test]
    fn test_vertical_serial_stacks_upper() {
        let (mut g, cell) = graph_with_cell();
        let n = add_nodes(&mut g, cell, &["bbs", "d", "f", "b", "l"]);
        let lower = g.new_primary_block(cell, vec![n[0], n[1], n[2]]);
        let upper = g.new_primary_block(cell, vec![n[2], n[3], n[4]]);
        let serial = g.new_serial_block(cell, lower, upper, n[2]);
        calculate_dimension_and_intern_pos(&mut g, serial).unwrap();

        let pos = g.block(serial).position;
        assert_eq!((pos.h_span, pos.v_span), (1, 2));
        let BlockContent::Serial { lower, upper, .. } = g.block(serial).content else {
            panic!("serial block expected");
        };
        assert_eq!(g.block(lower).position.v, 0);
        assert_eq!(g.block(upper).position.v, 0);
    }

    #[test]
    fn test_stackable_blocks_share_a_column() {
        let (mut g, cell) = graph_with_cell();
        let n = add_nodes(&mut g, cell, &["bbs1", "bbs2", "d1", "d2", "f"]);
        let b1 = g.new_primary_block(cell, vec![n[0], n[2], n[4]]);
        let b2 = g.new_primary_block(cell, vec![n[1], n[3], n[4]]);
        g.add_stackable(b1, b2);
        g.add_stackable(b2, b1);
        let parallel = g.new_parallel_block(cell, vec![b1, b2], false);
        calculate_dimension_and_intern_pos(&mut g, parallel).unwrap();

        assert_eq!(g.block(parallel).position.h_span, 1);
        assert_eq!(g.block(b1).position.h, 0);
        assert_eq!(g.block(b2).position.h, 0);
    }

    #[test]
    fn test_unstacked_bus_blocks_side_by_side() {
        let (mut g, cell) = graph_with_cell();
        let n = add_nodes(&mut g, cell, &["bbs1", "bbs2", "d1", "d2", "f"]);
        let b1 = g.new_primary_block(cell, vec![n[0], n[2], n[4]]);
        let b2 = g.new_primary_block(cell, vec![n[1], n[3], n[4]]);
        let parallel = g.new_parallel_block(cell, vec![b1, b2], false);
        calculate_dimension_and_intern_pos(&mut g, parallel).unwrap();

        assert_eq!(g.block(parallel).position.h_span, 2);
        assert_eq!(g.block(b1).position.h, 0);
        assert_eq!(g.block(b2).position.h, 1);
    }

    #[test]
    fn test_horizontal_undefined_stacks_sub_blocks() {
        let (mut g, cell) = graph_with_cell();
        let n = add_nodes(&mut g, cell, &["a", "b", "c", "d"]);
        let p1 = g.new_primary_block(cell, vec![n[0], n[1], n[2]]);
        let p2 = g.new_primary_block(cell, vec![n[1], n[2], n[3]]);
        let undefined = g.new_undefined_block(cell, vec![p1, p2]);
        g.set_block_orientation(undefined, Orientation::Horizontal);
        g.cell_mut(cell).root = Some(undefined);
        assert!(embeds_horizontal_undefined(&g, undefined));

        let mut ctx = LayoutContext::new();
        dimension_bus_cells(&mut g, &mut ctx).unwrap();
        let pos = g.block(undefined).position;
        assert_eq!((pos.h_span, pos.v_span), (1, 1));
        assert_eq!((g.block(p2).position.h, g.block(p2).position.v), (0, 0));
        assert_eq!(ctx.diagnostics.in_stage("blocks").count(), 1);
    }
}
