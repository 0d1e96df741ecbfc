//! Pixel coordinates from grid positions.
//!
//! Busbars are projected first, then the block tree of every bus cell from
//! its root down, then shunt cells, whose inner nodes are spread between
//! the two extern cells they join.

use sld_core::{
    BlockContent, BlockId, CellKind, Coord, Direction, Graph, NodeIndex, Orientation, SldResult,
};
use tracing::{info, trace};

use crate::params::LayoutParameters;

/// Projects grid positions onto the drawing plane.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateProjector<'a> {
    params: &'a LayoutParameters,
    max_v: i32,
}

impl<'a> CoordinateProjector<'a> {
    pub fn new(params: &'a LayoutParameters, graph: &Graph) -> Self {
        Self {
            params,
            max_v: graph.max_bus_position().v,
        }
    }

    /// Assign x/y to every node and a [`Coord`] to every bus-cell block.
    pub fn run(&self, graph: &mut Graph) -> SldResult<()> {
        info!("Calculating coordinates");
        self.project_buses(graph);
        for cell in graph.bus_cell_ids() {
            if let Some(root) = graph.cell(cell).root {
                self.calculate_coord(graph, root)?;
            }
        }
        for cell in graph.cell_ids_of_kind(CellKind::Shunt) {
            if let Some(root) = graph.cell(cell).root {
                self.calculate_coord(graph, root)?;
            }
        }
        Ok(())
    }

    fn project_buses(&self, graph: &mut Graph) {
        let p = self.params;
        for bus in graph.bus_nodes() {
            let node = graph.node_mut(bus);
            let Some(data) = node.bus_data_mut() else {
                continue;
            };
            let pos = data.position;
            data.px_width = f64::from(pos.h_span) * p.cell_width - p.horizontal_bus_padding;
            let x = p.initial_x_bus + f64::from(pos.h) * p.cell_width + p.horizontal_bus_padding / 2.0;
            let y = p.initial_y_bus + f64::from(pos.v - 1) * p.vertical_space_bus;
            node.set_x(x, true);
            node.set_y(y, true);
        }
    }

    fn calculate_coord(&self, graph: &mut Graph, block: BlockId) -> SldResult<()> {
        let cell = graph.block(block).cell;
        if graph.cell(cell).kind == CellKind::Shunt {
            self.coord_shunt_case(graph, block);
            return Ok(());
        }
        let b = graph.block(block);
        if b.parent.is_none() || b.position.absolute {
            self.calculate_root_coord(graph, block);
        }
        match graph.block(block).position.orientation {
            Orientation::Vertical => self.coord_vertical_case(graph, block),
            Orientation::Horizontal => self.coord_horizontal_case(graph, block),
        }
    }

    fn calculate_root_coord(&self, graph: &mut Graph, block: BlockId) {
        let p = self.params;
        let b = graph.block(block);
        let cell = graph.cell(b.cell);
        let pos = b.position;

        let x_span = f64::from(pos.h_span) * p.cell_width;
        let (y_span, dy) = if cell.kind.is_intern() {
            let dy = if cell.direction == Direction::Flat {
                0.0
            } else {
                p.intern_cell_height * f64::from(pos.v)
            };
            (0.0, dy)
        } else {
            (p.extern_cell_height, p.extern_cell_height / 2.0 + p.stack_height)
        };
        let x = p.initial_x_bus + p.cell_width * f64::from(pos.h) + x_span / 2.0;
        let y = match cell.direction {
            Direction::Bottom => {
                p.initial_y_bus + f64::from(self.max_v - 1) * p.vertical_space_bus + dy
            }
            Direction::Flat => p.initial_y_bus + f64::from(pos.v - 1) * p.vertical_space_bus,
            Direction::Top | Direction::Undefined => p.initial_y_bus - dy,
        };
        graph.block_mut(block).coord = Coord {
            x,
            y,
            x_span,
            y_span,
        };
        trace!(block = block.value(), x, y, "root block projected");
    }

    fn coord_vertical_case(&self, graph: &mut Graph, block: BlockId) -> SldResult<()> {
        let b = graph.block(block);
        let coord = b.coord;
        let pos = b.position;
        let sign = direction_sign(graph, block);
        match b.content.clone() {
            BlockContent::Primary { nodes, .. } => {
                self.primary_vertical(graph, block, &nodes);
                Ok(())
            }
            BlockContent::Serial { lower, upper, .. } => {
                let y0 = coord.y + sign * coord.y_span / 2.0;
                let step = if pos.v_span == 0 {
                    0.0
                } else {
                    -sign * coord.y_span / f64::from(pos.v_span)
                };
                for sub in [lower, upper] {
                    let sp = graph.block(sub).position;
                    let y_span = if pos.v_span == 0 {
                        0.0
                    } else {
                        coord.y_span * f64::from(sp.v_span) / f64::from(pos.v_span)
                    };
                    graph.block_mut(sub).coord = Coord {
                        x: coord.x,
                        y: y0 + step * (f64::from(sp.v) + f64::from(sp.v_span) / 2.0),
                        x_span: coord.x_span,
                        y_span,
                    };
                    self.calculate_coord(graph, sub)?;
                }
                Ok(())
            }
            BlockContent::Parallel { subs } => {
                let (x0, step) = if pos.h_span != 1 && pos.h_span != 0 {
                    (coord.x - coord.x_span / 2.0, coord.x_span / f64::from(pos.h_span))
                } else {
                    (coord.x, 0.0)
                };
                for sub in subs {
                    let sp = graph.block(sub).position;
                    graph.block_mut(sub).coord = Coord {
                        x: x0 + (f64::from(sp.h) + f64::from(sp.h_span) / 2.0) * step,
                        y: coord.y,
                        x_span: step * f64::from(sp.h_span),
                        y_span: coord.y_span,
                    };
                    self.calculate_coord(graph, sub)?;
                }
                Ok(())
            }
            BlockContent::Undefined { subs } => {
                for sub in subs {
                    graph.block_mut(sub).coord = coord;
                    self.coord_vertical_case(graph, sub)?;
                }
                Ok(())
            }
        }
    }

    fn coord_horizontal_case(&self, graph: &mut Graph, block: BlockId) -> SldResult<()> {
        let b = graph.block(block);
        let coord = b.coord;
        let pos = b.position;
        match b.content.clone() {
            BlockContent::Primary { nodes, .. } => {
                self.primary_horizontal(graph, block, &nodes);
                Ok(())
            }
            BlockContent::Serial { lower, upper, h2v } => {
                let x0 = coord.x - coord.x_span / 2.0;
                let step = if pos.h_span == 0 {
                    0.0
                } else {
                    coord.x_span / f64::from(pos.h_span)
                };
                let translate = if h2v { self.params.cell_width / 2.0 } else { 0.0 };
                for sub in [lower, upper] {
                    let sp = graph.block(sub).position;
                    let shift = if sub == upper { translate } else { 0.0 };
                    graph.block_mut(sub).coord = Coord {
                        x: x0 + (f64::from(sp.h) + f64::from(sp.h_span) / 2.0) * step + shift,
                        y: coord.y,
                        x_span: f64::from(sp.h_span) * step,
                        y_span: coord.y_span,
                    };
                    self.calculate_coord(graph, sub)?;
                }
                Ok(())
            }
            BlockContent::Parallel { subs } | BlockContent::Undefined { subs } => {
                for sub in subs {
                    graph.block_mut(sub).coord = coord;
                    self.calculate_coord(graph, sub)?;
                }
                Ok(())
            }
        }
    }

    fn primary_vertical(&self, graph: &mut Graph, block: BlockId, nodes: &[NodeIndex]) {
        let coord = graph.block(block).coord;
        let pos = graph.block(block).position;
        if let Some(bus) = graph.block_bus_node(block) {
            let bus_y = graph.node(bus).y;
            let middle = graph.node_mut(nodes[1]);
            middle.set_x(coord.x, false);
            middle.set_y(bus_y, false);
            if nodes.len() == 3 {
                let side = if bus == nodes[0] { nodes[2] } else { nodes[0] };
                let cell = graph.cell(graph.block(block).cell);
                let lone_leg = cell.kind == CellKind::Intern && cell.intern.central.is_none();
                let side = graph.node_mut(side);
                side.set_x(coord.x, true);
                if lone_leg {
                    side.set_y(self.params.initial_y_bus - self.params.intern_cell_height, false);
                }
            }
            return;
        }
        let sign = direction_sign(graph, block);
        let y0 = coord.y + sign * coord.y_span / 2.0;
        let step = if pos.v_span == 0 || nodes.len() < 2 {
            0.0
        } else {
            sign * coord.y_span / (nodes.len() - 1) as f64
        };
        for (i, &n) in nodes.iter().enumerate() {
            let node = graph.node_mut(n);
            node.set_x(coord.x, false);
            node.set_y(y0 - step * i as f64, false);
            node.rotated = false;
        }
    }

    fn primary_horizontal(&self, graph: &mut Graph, block: BlockId, nodes: &[NodeIndex]) {
        let coord = graph.block(block).coord;
        if let Some(bus) = graph.block_bus_node(block) {
            let bus_y = graph.node(bus).y;
            let middle = graph.node_mut(nodes[1]);
            middle.set_x(coord.x + coord.x_span / 2.0, false);
            middle.set_y(bus_y, false);
            if nodes.len() == 3 {
                let side = if bus == nodes[0] { nodes[2] } else { nodes[0] };
                graph.node_mut(side).set_y(bus_y, true);
            }
            return;
        }
        let x0 = coord.x - coord.x_span / 2.0;
        let step = if nodes.len() < 2 {
            0.0
        } else {
            coord.x_span / (nodes.len() - 1) as f64
        };
        for (i, &n) in nodes.iter().enumerate() {
            let node = graph.node_mut(n);
            node.set_y(coord.y, false);
            node.set_x(x0 + step * i as f64, false);
            node.rotated = true;
        }
    }

    /// Spread the inner nodes of a shunt chain between its two ends.
    fn coord_shunt_case(&self, graph: &mut Graph, block: BlockId) {
        let nodes = graph.block(block).primary_nodes().to_vec();
        if nodes.len() < 3 {
            return;
        }
        let start = graph.node(graph.block_start(block));
        let (x0, y0) = (start.x, start.y);
        let end = graph.node(graph.block_end(block));
        let (x1, y1) = (end.x, end.y);
        let links = (nodes.len() - 1) as f64;
        let dx = (x1 - x0) / links;
        let dy = (y1 - y0) / links;
        for (i, &n) in nodes.iter().enumerate().take(nodes.len() - 1).skip(1) {
            let node = graph.node_mut(n);
            node.set_x(x0 + i as f64 * dx, false);
            node.set_y(y0 + i as f64 * dy, false);
            if dy == 0.0 {
                node.rotated = true;
            }
        }
    }
}

/// +1 for cells drawn above the busbars, -1 otherwise.
fn direction_sign(graph: &Graph, block: BlockId) -> f64 {
    match graph.cell(graph.block(block).cell).direction {
        Direction::Top => 1.0,
        _ => -1.0,
    }
}
