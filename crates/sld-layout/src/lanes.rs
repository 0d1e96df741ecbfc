//! Lane assignment for horizontal intern cells.
//!
//! Two horizontal intern cells overlap when their column intervals
//! intersect. Overlapping cells are pushed to successive lanes until every
//! lane holds pairwise disjoint cells; lanes then alternate above and below
//! the busbars, moving one step further out every two lanes.

use std::collections::BTreeSet;

use sld_core::{CellId, CellKind, Direction, Graph, Side};
use tracing::debug;

use crate::intern_cell::side_h_pos;

/// Spread overlapping horizontal intern cells over lanes.
pub fn manage_intern_cell_overlaps(graph: &mut Graph) {
    let cells: BTreeSet<CellId> = graph
        .cell_ids_of_kind(CellKind::Intern)
        .into_iter()
        .filter(|&c| {
            let cell = graph.cell(c);
            cell.direction != Direction::Flat && cell.intern.central.is_some()
        })
        .collect();
    if cells.is_empty() {
        return;
    }

    let mut lanes = vec![cells];
    bundle(graph, &mut lanes, 0);

    for (i, lane) in lanes.iter().enumerate() {
        let direction = if i % 2 == 0 {
            Direction::Top
        } else {
            Direction::Bottom
        };
        let v = 1 + (i / 2) as i32;
        for &cell in lane {
            graph.cell_mut(cell).direction = direction;
            if let Some(root) = graph.cell(cell).root {
                graph.block_mut(root).position.v = v;
            }
        }
    }
    debug!(lanes = lanes.len(), "intern cell lanes resolved");
}

fn interval(graph: &Graph, cell: CellId) -> (i32, i32) {
    (side_h_pos(graph, cell, Side::Left), side_h_pos(graph, cell, Side::Right))
}

fn overlap(a: (i32, i32), b: (i32, i32)) -> bool {
    a.1 > b.0 && b.1 > a.0
}

/// Move the most conflicting cell of lane `i` to lane `i + 1` until lane
/// `i` is free of overlaps. Ties go to the lowest cell number.
fn bundle(graph: &Graph, lanes: &mut Vec<BTreeSet<CellId>>, i: usize) {
    loop {
        let mut worst: Option<(usize, CellId)> = None;
        for &a in &lanes[i] {
            let conflicts = lanes[i]
                .iter()
                .filter(|&&b| b != a && overlap(interval(graph, a), interval(graph, b)))
                .count();
            if conflicts > 0 && worst.map_or(true, |(n, _)| conflicts > n) {
                worst = Some((conflicts, a));
            }
        }
        let Some((_, cell)) = worst else {
            return;
        };
        lanes[i].remove(&cell);
        if lanes.len() == i + 1 {
            lanes.push(BTreeSet::new());
        }
        lanes[i + 1].insert(cell);
        bundle(graph, lanes, i + 1);
    }
}
