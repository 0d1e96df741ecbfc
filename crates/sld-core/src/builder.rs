//! Graph construction from topology visit events.
//!
//! Two flavours mirror the two ways a voltage level can be described:
//!
//! - [`GraphBuilder`] for node-breaker topologies, where every piece of
//!   equipment is attached to a numbered connection node and switches join
//!   two connection nodes;
//! - [`BusBreakerBuilder`] for bus-breaker topologies, where feeders hang
//!   directly off configured buses.
//!
//! Events are recorded first and materialized by `build`, equipment first,
//! then switches, then internal connections. Connection nodes that carry no
//! equipment become fictitious nodes named `FICT_<graph>_<number>`.

use std::collections::{BTreeMap, HashMap};

use petgraph::stable_graph::NodeIndex;
use tracing::info;

use crate::diagnostics::Diagnostics;
use crate::error::{SldError, SldResult};
use crate::graph::Graph;
use crate::node::{ComponentType, Node, SwitchKind};
use crate::position::{Direction, Position};

#[derive(Debug, Clone)]
enum Equipment {
    Bus {
        id: String,
        position: Option<(i32, i32)>,
    },
    Feeder {
        id: String,
        component_type: ComponentType,
        order: i32,
        direction: Direction,
    },
}

#[derive(Debug, Clone)]
struct SwitchEvent {
    id: String,
    kind: SwitchKind,
    open: bool,
    node1: u32,
    node2: u32,
}

/// Node-breaker graph builder.
///
/// ```
/// use sld_core::{GraphBuilder, Diagnostics, Direction, ComponentType, SwitchKind};
///
/// let mut builder = GraphBuilder::new("vl");
/// builder
///     .visit_bus(0, "bbs", Some((1, 1)))
///     .visit_feeder(2, "l", ComponentType::Line, 0, Direction::Top)
///     .visit_switch("d", SwitchKind::Disconnector, false, 0, 1)
///     .visit_switch("b", SwitchKind::Breaker, false, 1, 2);
/// let mut diag = Diagnostics::new();
/// let graph = builder.build(&mut diag).unwrap();
/// assert!(graph.node_index("FICT_vl_1").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    graph_id: String,
    equipment: Vec<(u32, Equipment)>,
    switches: Vec<SwitchEvent>,
    internal_connections: Vec<(u32, u32)>,
    labels: HashMap<String, String>,
}

impl GraphBuilder {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            equipment: Vec::new(),
            switches: Vec::new(),
            internal_connections: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Busbar section attached to connection node `node`, with an optional
    /// `(section index, busbar index)` structural position.
    pub fn visit_bus(&mut self, node: u32, id: &str, position: Option<(i32, i32)>) -> &mut Self {
        self.equipment.push((
            node,
            Equipment::Bus {
                id: id.to_string(),
                position,
            },
        ));
        self
    }

    pub fn visit_feeder(
        &mut self,
        node: u32,
        id: &str,
        component_type: ComponentType,
        order: i32,
        direction: Direction,
    ) -> &mut Self {
        self.equipment.push((
            node,
            Equipment::Feeder {
                id: id.to_string(),
                component_type,
                order,
                direction,
            },
        ));
        self
    }

    pub fn visit_switch(
        &mut self,
        id: &str,
        kind: SwitchKind,
        open: bool,
        node1: u32,
        node2: u32,
    ) -> &mut Self {
        self.switches.push(SwitchEvent {
            id: id.to_string(),
            kind,
            open,
            node1,
            node2,
        });
        self
    }

    pub fn visit_internal_connection(&mut self, node1: u32, node2: u32) -> &mut Self {
        self.internal_connections.push((node1, node2));
        self
    }

    /// Display label for a visited element (defaults to its id)
    pub fn label(&mut self, id: &str, label: &str) -> &mut Self {
        self.labels.insert(id.to_string(), label.to_string());
        self
    }

    pub fn build(&self, diag: &mut Diagnostics) -> SldResult<Graph> {
        info!("Building '{}' graph...", self.graph_id);
        let mut graph = Graph::new(self.graph_id.clone());
        let mut by_number: BTreeMap<u32, NodeIndex> = BTreeMap::new();

        for (number, equipment) in &self.equipment {
            let node = match equipment {
                Equipment::Bus { id, position } => {
                    let mut node = Node::bus(id.as_str());
                    if let (Some((h, v)), Some(bus)) = (position, node.bus_data_mut()) {
                        bus.structural_position = Some(Position::new(*h, *v).with_h_span(1));
                    }
                    node
                }
                Equipment::Feeder {
                    id,
                    component_type,
                    order,
                    direction,
                } => Node::feeder(id.as_str(), *component_type, *order, *direction),
            };
            let node = self.labelled(node);
            if by_number.contains_key(number) {
                return Err(SldError::Graph(format!(
                    "connection node {} has more than one equipment ('{}')",
                    number, node.id
                )));
            }
            let ix = graph.add_node(node)?;
            by_number.insert(*number, ix);
        }

        for sw in &self.switches {
            let n1 = Self::ensure_node_exists(&mut graph, &mut by_number, sw.node1)?;
            let n2 = Self::ensure_node_exists(&mut graph, &mut by_number, sw.node2)?;
            let node = self.labelled(Node::switch(sw.id.as_str(), sw.kind, sw.open));
            let ix = graph.add_node(node)?;
            graph.add_edge(n1, ix);
            graph.add_edge(ix, n2);
        }

        for &(node1, node2) in &self.internal_connections {
            let n1 = Self::ensure_node_exists(&mut graph, &mut by_number, node1)?;
            let n2 = Self::ensure_node_exists(&mut graph, &mut by_number, node2)?;
            graph.add_edge(n1, n2);
        }

        info!("Number of node : {}", graph.node_count());
        graph.check_connected(diag);
        Ok(graph)
    }

    fn labelled(&self, node: Node) -> Node {
        match self.labels.get(&node.id) {
            Some(label) => node.with_label(label.as_str()),
            None => node,
        }
    }

    fn ensure_node_exists(
        graph: &mut Graph,
        by_number: &mut BTreeMap<u32, NodeIndex>,
        number: u32,
    ) -> SldResult<NodeIndex> {
        if let Some(&ix) = by_number.get(&number) {
            return Ok(ix);
        }
        let id = graph.fictitious_id(&number.to_string());
        let ix = graph.add_node(Node::fictitious(id))?;
        by_number.insert(number, ix);
        Ok(ix)
    }
}

/// Bus-breaker graph builder.
///
/// Buses are stacked in one column (`h = 1`, `v` = visit ordinal from 1).
/// Each feeder gets the next order, alternating `Top`/`Bottom`, and is tied
/// to its bus through a synthetic disconnector `<bus>_<feeder>`.
#[derive(Debug, Clone)]
pub struct BusBreakerBuilder {
    graph_id: String,
    buses: Vec<String>,
    feeders: Vec<(String, String, ComponentType)>,
}

impl BusBreakerBuilder {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            buses: Vec::new(),
            feeders: Vec::new(),
        }
    }

    pub fn visit_bus(&mut self, id: &str) -> &mut Self {
        self.buses.push(id.to_string());
        self
    }

    pub fn visit_feeder(&mut self, bus: &str, id: &str, component_type: ComponentType) -> &mut Self {
        self.feeders
            .push((bus.to_string(), id.to_string(), component_type));
        self
    }

    pub fn build(&self, diag: &mut Diagnostics) -> SldResult<Graph> {
        info!("Building '{}' graph...", self.graph_id);
        let mut graph = Graph::new(self.graph_id.clone());

        for (v, id) in self.buses.iter().enumerate() {
            let mut node = Node::bus(id.as_str());
            if let Some(bus) = node.bus_data_mut() {
                bus.structural_position = Some(Position::new(1, v as i32 + 1).with_h_span(1));
            }
            graph.add_node(node)?;
        }

        for (i, (bus_id, feeder_id, component_type)) in self.feeders.iter().enumerate() {
            let bus = graph.require_node(bus_id)?;
            if !graph.node(bus).is_bus() {
                return Err(SldError::Graph(format!("'{}' is not a bus", bus_id)));
            }
            let order = i as i32 + 1;
            let direction = if order % 2 == 1 {
                Direction::Top
            } else {
                Direction::Bottom
            };
            let feeder = graph.add_node(Node::feeder(
                feeder_id.as_str(),
                *component_type,
                order,
                direction,
            ))?;
            let switch_id = format!("{}_{}", bus_id, feeder_id);
            let sw = graph.add_node(Node::switch(switch_id, SwitchKind::Disconnector, false))?;
            graph.add_edge(bus, sw);
            graph.add_edge(sw, feeder);
        }

        info!("Number of node : {}", graph.node_count());
        graph.check_connected(diag);
        Ok(graph)
    }
}
