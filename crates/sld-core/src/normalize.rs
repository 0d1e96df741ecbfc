//! Structural rewrites applied to a freshly built graph before cell
//! detection.
//!
//! Each pass inserts or removes fictitious nodes so that every bay ends up
//! with the same shape on the busbar side (`bus - switch - connection
//! point`) and every feeder has a single attachment point. Fictitious nodes
//! created here are named `FICT_<graph>_<name>`.

use petgraph::stable_graph::NodeIndex;
use tracing::{debug, info};

use crate::error::{SldError, SldResult};
use crate::graph::Graph;
use crate::node::{FeederData, Node, NodeKind, NodeType, SwitchKind};
use crate::position::Direction;

/// Nodes inserted between a busbar and the element it was attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub bus: NodeIndex,
    /// Fictitious switch next to the busbar
    pub switch: NodeIndex,
    /// Fictitious connection point next to the original element
    pub node: NodeIndex,
}

impl Graph {
    /// Fictitious id for `name`, made unique by a numeric suffix when taken
    fn unique_fictitious_id(&self, name: &str) -> String {
        let base = self.fictitious_id(name);
        if self.node_index(&base).is_none() {
            return base;
        }
        let mut i = 1;
        loop {
            let candidate = format!("{}{}", base, i);
            if self.node_index(&candidate).is_none() {
                return candidate;
            }
            i += 1;
        }
    }

    /// Drop plain fictitious nodes of degree 2 and join their neighbours.
    pub fn remove_unnecessary_fictitious_nodes(&mut self) -> usize {
        let candidates: Vec<NodeIndex> = self
            .nodes()
            .iter()
            .copied()
            .filter(|&n| self.node(n).is_plain_fictitious() && self.degree(n) == 2)
            .collect();

        let mut removed = 0;
        for n in candidates {
            let adj = self.adjacent_nodes(n);
            if adj.len() != 2 || adj[0] == adj[1] {
                continue;
            }
            info!(
                "Remove unnecessary node between {} and {}",
                self.node(adj[0]).id,
                self.node(adj[1]).id
            );
            self.remove_node(n);
            self.add_edge(adj[0], adj[1]);
            removed += 1;
        }
        removed
    }

    /// Give every feeder attached through several branches a fictitious hub.
    pub fn extend_feeder_with_multiple_switches(&mut self) -> SldResult<usize> {
        let feeders: Vec<NodeIndex> = self
            .nodes_of_type(NodeType::Feeder)
            .into_iter()
            .filter(|&n| self.degree(n) > 1)
            .collect();

        for &feeder in &feeders {
            let name = format!("{}Fictif", self.node(feeder).id);
            let hub = self.add_node(Node::fictitious(self.unique_fictitious_id(&name)))?;
            for neighbour in self.adjacent_nodes(feeder) {
                self.add_edge(hub, neighbour);
                self.remove_edge(feeder, neighbour);
            }
            self.add_edge(feeder, hub);
            debug!(feeder = %self.node(feeder).id, "feeder hub inserted");
        }
        Ok(feeders.len())
    }

    /// Separate a bus-side switch from a following switch with a fictitious node.
    pub fn extend_first_outside_node(&mut self) -> SldResult<usize> {
        let mut inserted = 0;
        for bus in self.bus_nodes() {
            for sw in self.adjacent_nodes(bus) {
                if self.node_type(sw) != NodeType::Switch {
                    continue;
                }
                for other in self.adjacent_nodes(sw) {
                    if self.node_type(other) != NodeType::Switch {
                        continue;
                    }
                    self.remove_edge(other, sw);
                    let name = format!("{}Fictif", self.node(sw).id);
                    let fict = self.add_node(Node::fictitious(self.unique_fictitious_id(&name)))?;
                    self.add_edge(other, fict);
                    self.add_edge(sw, fict);
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    /// Turn dangling plain fictitious nodes into feeders without order.
    pub fn substitute_singular_fictitious_by_feeder(&mut self) -> usize {
        let singular: Vec<NodeIndex> = self
            .nodes()
            .iter()
            .copied()
            .filter(|&n| self.node(n).is_plain_fictitious() && self.degree(n) == 1)
            .collect();
        for &n in &singular {
            debug!(node = %self.node(n).id, "fictitious node substituted by a feeder");
            self.node_mut(n).kind = NodeKind::Feeder(FeederData {
                order: -1,
                direction: Direction::Undefined,
            });
        }
        singular.len()
    }

    /// Pad every breaker (any switch but a disconnector) touching a busbar.
    pub fn extend_breaker_connected_to_bus(&mut self) -> SldResult<usize> {
        let mut padded = 0;
        for bus in self.bus_nodes() {
            for n in self.adjacent_nodes(bus) {
                let is_breaker = matches!(
                    self.node(n).switch_kind(),
                    Some(kind) if kind != SwitchKind::Disconnector
                );
                if is_breaker {
                    self.add_double_node(bus, n, "")?;
                    padded += 1;
                }
            }
        }
        Ok(padded)
    }

    /// Pad every feeder directly attached to a busbar.
    pub fn extend_feeder_connected_to_bus(&mut self) -> SldResult<usize> {
        let mut padded = 0;
        for bus in self.bus_nodes() {
            for n in self.adjacent_nodes(bus) {
                if self.node(n).is_feeder() {
                    self.add_double_node(bus, n, "")?;
                    padded += 1;
                }
            }
        }
        Ok(padded)
    }

    /// Pad both sides of a switch joining two busbars, with suffixes `0` and `1`.
    pub fn extend_switch_between_bus(&mut self, sw: NodeIndex) -> SldResult<[Padding; 2]> {
        let adj = self.adjacent_nodes(sw);
        if adj.len() != 2 || !adj.iter().all(|&n| self.node(n).is_bus()) {
            return Err(SldError::Graph(format!(
                "switch '{}' does not join two busbars",
                self.node(sw).id
            )));
        }
        let first = self.add_double_node(adj[0], sw, "0")?;
        let second = self.add_double_node(adj[1], sw, "1")?;
        Ok([first, second])
    }

    /// Replace the edge `bus - target` by `bus - fSwitch - fNode - target`.
    fn add_double_node(
        &mut self,
        bus: NodeIndex,
        target: NodeIndex,
        suffix: &str,
    ) -> SldResult<Padding> {
        self.remove_edge(bus, target);
        let target_id = self.node(target).id.clone();
        let switch_id = self.unique_fictitious_id(&format!("{}fSwitch{}", target_id, suffix));
        let switch = self.add_node(Node::fictitious_switch(switch_id))?;
        let node_id = self.unique_fictitious_id(&format!("{}fNode{}", target_id, suffix));
        let node = self.add_node(Node::fictitious(node_id))?;
        self.add_edge(bus, switch);
        self.add_edge(switch, node);
        self.add_edge(node, target);
        Ok(Padding { bus, switch, node })
    }
}
