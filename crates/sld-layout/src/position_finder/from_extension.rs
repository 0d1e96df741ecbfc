//! Positions read from the hints carried by the graph: busbar structural
//! positions and feeder order/direction.

use sld_core::{CellId, CellKind, Direction, Graph, NodeType, SldError, SldResult};
use tracing::{debug, info};

use super::PositionFinder;
use crate::context::LayoutContext;

/// Cells drawn without a direction hint go above the busbars
const DEFAULT_DIRECTION: Direction = Direction::Top;

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionFromExtension;

impl PositionFinder for PositionFromExtension {
    fn name(&self) -> &'static str {
        "from-extension"
    }

    fn build_layout(&self, graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<()> {
        info!("Reading positions from feeder and busbar hints");
        gather_layout_hints(graph);

        let problematic: Vec<CellId> = graph
            .cell_ids_of_kind(CellKind::Extern)
            .into_iter()
            .filter(|&c| graph.cell(c).order == -1)
            .collect();
        if !problematic.is_empty() {
            for &cell in &problematic {
                let full_id = graph.full_id(cell);
                ctx.warn_for("position", "Extern cell has no feeder order", &full_id);
            }
            return Err(SldError::Layout(format!(
                "unable to build the layout from hints: {} extern cell(s) without order",
                problematic.len()
            )));
        }

        graph.set_max_bus_position()?;
        force_same_direction_for_shunted_cells(graph);
        Ok(())
    }
}

fn gather_layout_hints(graph: &mut Graph) {
    for feeder in graph.nodes_of_type(NodeType::Feeder) {
        let node = graph.node(feeder);
        let (Some(cell), Some(data)) = (node.cell, node.feeder_data().copied()) else {
            continue;
        };
        let c = graph.cell_mut(cell);
        c.direction = match data.direction {
            Direction::Undefined => DEFAULT_DIRECTION,
            direction => direction,
        };
        c.order = data.order;
    }
    for cell in graph.cell_ids_of_kind(CellKind::Extern) {
        order_from_feeder_orders(graph, cell);
    }
}

/// Smallest non-negative feeder order of the cell, -1 without one.
fn order_from_feeder_orders(graph: &mut Graph, cell: CellId) {
    let order = graph
        .cell(cell)
        .nodes
        .iter()
        .filter_map(|&n| graph.node(n).feeder_data())
        .map(|f| f.order)
        .filter(|&o| o >= 0)
        .min()
        .unwrap_or(-1);
    graph.cell_mut(cell).order = order;
}

/// Both extern cells joined by a shunt are drawn on the same side.
fn force_same_direction_for_shunted_cells(graph: &mut Graph) {
    for shunt in graph.cell_ids_of_kind(CellKind::Shunt) {
        if let Some((first, second)) = graph.cell(shunt).bridged {
            let direction = graph.cell(first).direction;
            graph.cell_mut(second).direction = direction;
            debug!(
                cell = %graph.full_id(second),
                %direction,
                "direction aligned on shunted cell"
            );
        }
    }
}
