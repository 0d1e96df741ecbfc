//! Partition of a voltage-level graph into cells.
//!
//! Detection runs in three steps over a cleaned graph:
//!
//! 1. **Intern pass**: from every busbar, explore each branch; a branch
//!    that reaches other busbars without meeting a feeder becomes an intern
//!    cell.
//! 2. **Extern pass**: the same exploration stopping at busbars and
//!    feeders, over the nodes not yet claimed, yields undefined groups.
//! 3. **Classification**: a group that one node removal splits into
//!    feeder-only and bus-only components is an extern cell; otherwise a
//!    shunt pivot is searched and the group is split into two extern cells
//!    bridged by a shunt cell.

use std::collections::{BTreeSet, HashSet};

use petgraph::stable_graph::NodeIndex;
use sld_core::{Cell, CellId, CellKind, Graph, NodeKind, NodeType, SldResult};
use tracing::{debug, info};

use crate::context::LayoutContext;
use crate::params::LayoutOptions;

/// Exploration stop rule
#[derive(Clone, Copy)]
enum Stop {
    /// Busbars (intern pass)
    Bus,
    /// Busbars and feeders (extern pass)
    BusOrFeeder,
    /// Busbars, feeders and shunt nodes (shunt pivot check)
    BusFeederOrShunt,
}

impl Stop {
    fn matches(self, node_type: NodeType) -> bool {
        match self {
            Stop::Bus => node_type == NodeType::Bus,
            Stop::BusOrFeeder => matches!(node_type, NodeType::Bus | NodeType::Feeder),
            Stop::BusFeederOrShunt => {
                matches!(node_type, NodeType::Bus | NodeType::Feeder | NodeType::Shunt)
            }
        }
    }
}

/// Cell detector working on the implicit topology of the graph.
#[derive(Debug, Clone)]
pub struct ImplicitCellDetector {
    remove_unnecessary_fictitious_nodes: bool,
    substitute_singular_fictitious_by_feeder: bool,
}

impl Default for ImplicitCellDetector {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl ImplicitCellDetector {
    pub fn new(
        remove_unnecessary_fictitious_nodes: bool,
        substitute_singular_fictitious_by_feeder: bool,
    ) -> Self {
        Self {
            remove_unnecessary_fictitious_nodes,
            substitute_singular_fictitious_by_feeder,
        }
    }

    pub fn from_options(options: &LayoutOptions) -> Self {
        Self::new(
            options.remove_unnecessary_fictitious_nodes,
            options.substitute_singular_fictitious_by_feeder,
        )
    }

    /// Normalization passes, in the order detection relies on.
    pub fn cleaning(&self, graph: &mut Graph) -> SldResult<()> {
        if self.remove_unnecessary_fictitious_nodes {
            graph.remove_unnecessary_fictitious_nodes();
        }
        graph.extend_feeder_with_multiple_switches()?;
        graph.extend_first_outside_node()?;
        if self.substitute_singular_fictitious_by_feeder {
            graph.substitute_singular_fictitious_by_feeder();
        }
        graph.extend_breaker_connected_to_bus()?;
        graph.extend_feeder_connected_to_bus()?;
        Ok(())
    }

    /// Clean the graph, then detect and classify its cells.
    pub fn detect_cells(&self, graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<()> {
        self.cleaning(graph)?;
        info!("Detecting cells...");

        let mut allocated: HashSet<NodeIndex> = HashSet::new();
        generic_detect_cell(graph, ctx, Stop::Bus, &[NodeType::Feeder], true, &mut allocated);
        generic_detect_cell(graph, ctx, Stop::BusOrFeeder, &[], false, &mut allocated);

        for cell in graph.cell_ids_of_kind(CellKind::Undefined) {
            if !type_extern_cell(graph, cell) {
                detect_and_type_shunt(graph, ctx, cell);
            }
        }

        // groups that are neither extern nor splittable around a shunt
        for cell in graph.cell_ids_of_kind(CellKind::Undefined) {
            graph.cell_mut(cell).kind = CellKind::Extern;
            let full_id = graph.full_id(cell);
            ctx.warn_for("cells", "Cell could not be classified, drawn as extern", &full_id);
        }

        graph.log_cell_detection_status(&mut ctx.diagnostics);
        Ok(())
    }
}

/// Explore from `node`, collecting the nodes reached before stop nodes.
///
/// Returns false as soon as an exclusion type is met. Stop nodes are added
/// to `result` and marked explored but not crossed.
fn delimited_exploration(
    graph: &Graph,
    node: NodeIndex,
    stop: Stop,
    exclusion: &[NodeType],
    result: &mut Vec<NodeIndex>,
    explored: &mut HashSet<NodeIndex>,
) -> bool {
    if !explored.insert(node) {
        return true;
    }
    let to_visit: Vec<NodeIndex> = graph
        .adjacent_nodes(node)
        .into_iter()
        .filter(|n| !explored.contains(n))
        .collect();

    for n in to_visit {
        if explored.contains(&n) {
            // reached meanwhile through a sibling branch
            continue;
        }
        let node_type = graph.node_type(n);
        if exclusion.contains(&node_type) {
            return false;
        } else if stop.matches(node_type) {
            result.push(n);
            explored.insert(n);
        } else if delimited_exploration(graph, n, stop, exclusion, result, explored) {
            result.push(n);
        } else {
            return false;
        }
    }
    true
}

fn generic_detect_cell(
    graph: &mut Graph,
    ctx: &mut LayoutContext,
    stop: Stop,
    exclusion: &[NodeType],
    intern: bool,
    allocated: &mut HashSet<NodeIndex>,
) {
    for bus in graph.bus_nodes() {
        for adj in graph.adjacent_nodes(bus) {
            if graph.node(adj).is_bus() {
                continue;
            }
            let mut explored = allocated.clone();
            explored.insert(bus);
            let mut result = Vec::new();
            let ok = delimited_exploration(graph, adj, stop, exclusion, &mut result, &mut explored);
            if !ok || result.is_empty() {
                continue;
            }

            let mut nodes = Vec::with_capacity(result.len() + 2);
            for n in result.into_iter().chain([adj, bus]) {
                if !nodes.contains(&n) {
                    nodes.push(n);
                }
            }
            let kind = match (intern, nodes.len()) {
                (true, 3) => CellKind::InternBound,
                (true, _) => CellKind::Intern,
                (false, _) => CellKind::Undefined,
            };
            allocated.extend(nodes.iter().copied().filter(|&n| !graph.node(n).is_bus()));
            let id = graph.add_cell(Cell::new(ctx.next_cell_id(), kind, nodes));
            debug!(cell = %graph.full_id(id), "cell detected");
        }
    }
}

/// Type the cell as extern when removing one node splits it into
/// feeder-only and bus-only components.
fn type_extern_cell(graph: &mut Graph, cell: CellId) -> bool {
    let nodes = graph.cell(cell).nodes.clone();
    for &n in &nodes {
        let rest: Vec<NodeIndex> = nodes.iter().copied().filter(|&m| m != n).collect();
        let components = graph.connected_components(&rest);
        if check_extern_components(graph, &components) {
            graph.cell_mut(cell).kind = CellKind::Extern;
            return true;
        }
    }
    false
}

fn check_extern_components(graph: &Graph, components: &[Vec<NodeIndex>]) -> bool {
    if components.len() <= 1 {
        return false;
    }
    let mut has_feeder_branch = false;
    let mut has_bus_branch = false;
    let mut has_mixed_branch = false;
    for component in components {
        let has_feeder = component.iter().any(|&n| graph.node(n).is_feeder());
        let has_bus = component.iter().any(|&n| graph.node(n).is_bus());
        match (has_bus, has_feeder) {
            (true, true) => has_mixed_branch = true,
            (false, false) => return false,
            (false, true) => has_feeder_branch = true,
            (true, false) => has_bus_branch = true,
        }
    }
    has_bus_branch && has_feeder_branch && !has_mixed_branch
}

/// Split a suspected shunt group around the first qualifying pivot, in
/// ascending node-id order, then recurse on the two extern cells.
fn detect_and_type_shunt(graph: &mut Graph, ctx: &mut LayoutContext, cell: CellId) {
    let cell_nodes = graph.cell(cell).nodes.clone();
    let inside: HashSet<NodeIndex> = cell_nodes.iter().copied().collect();
    let external: HashSet<NodeIndex> = graph
        .nodes()
        .iter()
        .copied()
        .filter(|n| !inside.contains(n))
        .collect();

    let mut candidates: Vec<NodeIndex> = cell_nodes
        .iter()
        .copied()
        .filter(|&n| !graph.node(n).is_bus() && graph.degree(n) > 2)
        .collect();
    candidates.sort_by(|a, b| graph.node(*a).id.cmp(&graph.node(*b).id));

    for n in candidates {
        let Some(mut extern1) = check_candidate_shunt_node(graph, n, &external) else {
            continue;
        };
        info!("Found shunt at {}", graph.node(n).id);

        graph.remove_cell(cell);
        graph.node_mut(n).kind = NodeKind::Shunt;
        extern1.push(n);
        let extern1_id = graph.add_cell(Cell::new(
            ctx.next_cell_id(),
            CellKind::Extern,
            extern1.clone(),
        ));

        let shunt_nodes = shunt_branch(graph, ctx, n, &extern1);
        let shunt_id = graph.add_cell(Cell::new(
            ctx.next_cell_id(),
            CellKind::Shunt,
            shunt_nodes.clone(),
        ));

        let mut extern2: Vec<NodeIndex> = cell_nodes
            .iter()
            .copied()
            .filter(|&m| {
                (!extern1.contains(&m) || graph.node(m).is_bus())
                    && (!shunt_nodes.contains(&m) || graph.node_type(m) == NodeType::Shunt)
            })
            .collect();
        let lonely_buses: Vec<NodeIndex> = extern2
            .iter()
            .copied()
            .filter(|&m| {
                graph.node(m).is_bus()
                    && !graph.adjacent_nodes(m).iter().any(|a| extern2.contains(a))
            })
            .collect();
        extern2.retain(|m| !lonely_buses.contains(m));
        let extern2_id = graph.add_cell(Cell::new(ctx.next_cell_id(), CellKind::Extern, extern2));

        graph.cell_mut(shunt_id).bridged = Some((extern1_id, extern2_id));

        detect_and_type_shunt(graph, ctx, extern1_id);
        detect_and_type_shunt(graph, ctx, extern2_id);
        break;
    }
}

/// A pivot qualifies when its branches include a bus-only branch, a
/// feeder-only branch and a mixed branch. Returns the nodes of the bus-only
/// and feeder-only branches.
fn check_candidate_shunt_node(
    graph: &Graph,
    n: NodeIndex,
    external: &HashSet<NodeIndex>,
) -> Option<Vec<NodeIndex>> {
    let mut visited = external.clone();
    visited.insert(n);

    let mut extern_nodes: Vec<NodeIndex> = Vec::new();
    let mut has_feeder_branch = false;
    let mut has_bus_branch = false;
    let mut has_mixed_branch = false;

    let adj_list: Vec<NodeIndex> = graph
        .adjacent_nodes(n)
        .into_iter()
        .filter(|a| !visited.contains(a))
        .collect();
    for adj in adj_list {
        if visited.contains(&adj) {
            continue;
        }
        let mut result = Vec::new();
        delimited_exploration(graph, adj, Stop::BusFeederOrShunt, &[], &mut result, &mut visited);
        result.push(adj);

        let types: BTreeSet<NodeType> = result
            .iter()
            .map(|&m| graph.node_type(m))
            .filter(|&t| Stop::BusFeederOrShunt.matches(t))
            .collect();
        if types.len() > 1 {
            has_mixed_branch = true;
        } else if let Some(&node_type) = types.iter().next() {
            match node_type {
                NodeType::Bus => {
                    has_bus_branch = true;
                    extern_nodes.extend(result.iter().copied());
                }
                NodeType::Feeder => {
                    has_feeder_branch = true;
                    extern_nodes.extend(result.iter().copied());
                }
                _ => {}
            }
        }
        for m in result {
            if graph.node(m).is_bus() {
                visited.remove(&m);
            }
        }
    }

    if has_bus_branch && has_feeder_branch && has_mixed_branch {
        let mut unique = Vec::with_capacity(extern_nodes.len());
        for m in extern_nodes {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        Some(unique)
    } else {
        None
    }
}

/// Walk from the pivot into the mixed branch through degree-2 nodes; the
/// node where the walk stops becomes the other shunt end.
fn shunt_branch(
    graph: &mut Graph,
    ctx: &mut LayoutContext,
    pivot: NodeIndex,
    extern1: &[NodeIndex],
) -> Vec<NodeIndex> {
    let mut nodes = vec![pivot];
    let Some(mut current) = graph
        .adjacent_nodes(pivot)
        .into_iter()
        .find(|a| !extern1.contains(a))
    else {
        return nodes;
    };

    loop {
        let adj = graph.adjacent_nodes(current);
        if adj.len() != 2 {
            break;
        }
        nodes.push(current);
        let next = if nodes.contains(&adj[0]) { adj[1] } else { adj[0] };
        if nodes.contains(&next) {
            break;
        }
        current = next;
    }
    if !nodes.contains(&current) {
        nodes.push(current);
    }

    let end = graph.node(current);
    if end.is_plain_fictitious() {
        graph.node_mut(current).kind = NodeKind::Shunt;
    } else if end.node_type() != NodeType::Shunt {
        let id = end.id.clone();
        ctx.warn_for("cells", "Shunt branch does not end on a connection node", &id);
    }
    nodes
}
