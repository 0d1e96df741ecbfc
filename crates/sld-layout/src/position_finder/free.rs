//! Positions computed from the topology alone.
//!
//! Busbars are numbered by sorted id. Each extern cell, and each side of an
//! intern cell, contributes a *vertical bus connection pattern*: a set of
//! busbars that must be stacked in one column. Intern cells joining exactly
//! two busbars that no pattern stacks link those busbars into *horizontal
//! chains* (sections of one row). Patterns and chains connect busbars into
//! clusters; each cluster is laid out independently, chains getting rows
//! and busbars getting consecutive sections along their chain.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::stable_graph::NodeIndex;
use sld_core::{CellId, CellKind, Direction, Graph, Position, SldResult};
use tracing::{debug, info};

use super::PositionFinder;
use crate::context::LayoutContext;
use crate::intern_cell::bus_groups;

/// Busbar number, 1-based in sorted id order
type BusNb = usize;

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionFree;

impl PositionFinder for PositionFree {
    fn name(&self) -> &'static str {
        "free"
    }

    fn build_layout(&self, graph: &mut Graph, _ctx: &mut LayoutContext) -> SldResult<()> {
        info!("Computing busbar positions from topology");
        let mut layout = FreeLayout::new(graph);
        layout.add_extern_cells(graph);
        let structuring = layout.identify_structuring_cells(graph);
        let flat_candidates: Vec<CellId> = structuring
            .into_iter()
            .filter(|&c| graph.cell_buses(c).len() == 2)
            .collect();
        layout.chain_buses_with_flat_cells(graph, &flat_candidates);
        layout.build_belongings();

        let mut first_h = 1;
        let mut first_feeder_order = 1;
        for mut cluster in layout.connected_clusters(graph) {
            layout.align_chains(&cluster);
            layout.sort_patterns(&mut cluster);
            layout.organize_chains_vertically(&cluster);
            first_h = layout.set_structural_positions(graph, &cluster, first_h);
            first_feeder_order = layout.set_cell_orders(graph, &cluster, first_feeder_order);
        }
        debug!(
            patterns = layout.patterns.len(),
            chains = layout.chains.len(),
            "free positions assigned"
        );
        graph.set_max_bus_position()
    }
}

/// Busbars stacked in one column, and the extern cells drawn there.
#[derive(Debug, Clone)]
struct Pattern {
    buses: BTreeSet<BusNb>,
    cells: Vec<CellId>,
}

/// Busbars drawn side by side in one row.
#[derive(Debug, Clone, Default)]
struct HorizontalChain {
    buses: Vec<BusNb>,
    v: i32,
}

impl HorizontalChain {
    fn position(&self, bus: BusNb) -> Option<usize> {
        self.buses.iter().position(|&b| b == bus)
    }

    /// Reverse the chain if it orders two shared busbars the other way round.
    fn align_to(&mut self, other: &HorizontalChain) {
        let shared: Vec<BusNb> = other
            .buses
            .iter()
            .copied()
            .filter(|b| self.buses.contains(b))
            .collect();
        for (i, &b1) in shared.iter().enumerate() {
            for &b2 in &shared[i + 1..] {
                let delta = |chain: &HorizontalChain| {
                    chain.position(b1).unwrap_or(0) as i64 - chain.position(b2).unwrap_or(0) as i64
                };
                if delta(&*self) * delta(other) < 0 {
                    self.buses.reverse();
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Belonging {
    patterns: Vec<usize>,
    chain: usize,
}

/// Patterns and chains reachable from one another through shared busbars.
#[derive(Debug, Clone)]
struct Cluster {
    patterns: Vec<usize>,
    chains: Vec<usize>,
}

struct FreeLayout {
    buses: Vec<NodeIndex>,
    numbers: HashMap<NodeIndex, BusNb>,
    patterns: Vec<Pattern>,
    chains: Vec<HorizontalChain>,
    belongings: Vec<Belonging>,
}

impl FreeLayout {
    fn new(graph: &Graph) -> Self {
        let mut buses = graph.bus_nodes();
        buses.sort_by(|&a, &b| graph.node(a).id.cmp(&graph.node(b).id));
        let numbers = buses.iter().enumerate().map(|(i, &b)| (b, i + 1)).collect();
        Self {
            buses,
            numbers,
            patterns: Vec::new(),
            chains: Vec::new(),
            belongings: Vec::new(),
        }
    }

    fn bus_set(&self, buses: &[NodeIndex]) -> BTreeSet<BusNb> {
        buses.iter().map(|b| self.numbers[b]).collect()
    }

    /// Register a busbar set. A set included in an existing pattern joins
    /// it; a set including an existing pattern replaces its busbars.
    fn add_bus_set(&mut self, set: BTreeSet<BusNb>, cell: Option<CellId>) {
        let mut target = None;
        for (i, pattern) in self.patterns.iter_mut().enumerate() {
            if set.is_subset(&pattern.buses) {
                target = Some(i);
                break;
            }
            if pattern.buses.is_subset(&set) {
                pattern.buses = set.clone();
                target = Some(i);
                break;
            }
        }
        let index = match target {
            Some(i) => i,
            None => {
                self.patterns.push(Pattern {
                    buses: set,
                    cells: Vec::new(),
                });
                self.patterns.len() - 1
            }
        };
        if let Some(cell) = cell {
            self.patterns[index].cells.push(cell);
        }
    }

    fn add_extern_cells(&mut self, graph: &Graph) {
        for cell in graph.cell_ids_of_kind(CellKind::Extern) {
            let set = self.bus_set(&graph.cell_buses(cell));
            self.add_bus_set(set, Some(cell));
        }
    }

    /// Register intern-cell sides as patterns and return the intern cells
    /// whose busbars are not already stacked by a pattern.
    fn identify_structuring_cells(&mut self, graph: &Graph) -> Vec<CellId> {
        let interns: Vec<CellId> = graph
            .cell_ids()
            .into_iter()
            .filter(|&c| graph.cell(c).kind.is_intern())
            .collect();
        let groups: Vec<Vec<BTreeSet<BusNb>>> = interns
            .iter()
            .map(|&c| {
                bus_groups(graph, c)
                    .iter()
                    .map(|group| self.bus_set(group))
                    .collect()
            })
            .collect();
        let sides = groups.iter().map(Vec::len).max().unwrap_or(0);
        for side in 0..sides {
            for cell_groups in &groups {
                if let Some(set) = cell_groups.get(side) {
                    self.add_bus_set(set.clone(), None);
                }
            }
        }

        interns
            .into_iter()
            .filter(|&c| {
                let all = self.bus_set(&graph.cell_buses(c));
                !self.patterns.iter().any(|p| all.is_subset(&p.buses))
            })
            .collect()
    }

    fn chain_buses_with_flat_cells(&mut self, graph: &Graph, flat_cells: &[CellId]) {
        let mut bus_to_flat: BTreeMap<BusNb, Vec<CellId>> = BTreeMap::new();
        for &cell in flat_cells {
            for bus in graph.cell_buses(cell) {
                bus_to_flat.entry(self.numbers[&bus]).or_default().push(cell);
            }
        }

        // Chain ends (one flat cell) come first so that open chains are
        // walked from one extremity.
        let mut pending: Vec<BusNb> = bus_to_flat.keys().copied().collect();
        pending.sort_by_key(|b| bus_to_flat[b].len());

        let mut chains = Vec::new();
        while let Some(&first) = pending.first() {
            let mut chain = HorizontalChain::default();
            self.build_chain(graph, &mut chain, first, &mut pending, &bus_to_flat);
            chains.push(chain);
        }
        for nb in 1..=self.buses.len() {
            if !bus_to_flat.contains_key(&nb) {
                chains.push(HorizontalChain {
                    buses: vec![nb],
                    v: 0,
                });
            }
        }
        chains.sort_by_key(|c| std::cmp::Reverse(c.buses.len()));
        self.chains = chains;
    }

    fn build_chain(
        &self,
        graph: &Graph,
        chain: &mut HorizontalChain,
        bus: BusNb,
        pending: &mut Vec<BusNb>,
        bus_to_flat: &BTreeMap<BusNb, Vec<CellId>>,
    ) {
        chain.buses.push(bus);
        pending.retain(|&b| b != bus);
        for &cell in &bus_to_flat[&bus] {
            let other = graph
                .cell_buses(cell)
                .iter()
                .map(|b| self.numbers[b])
                .find(|&b| b != bus);
            if let Some(other) = other {
                if pending.contains(&other) {
                    self.build_chain(graph, chain, other, pending, bus_to_flat);
                }
            }
        }
    }

    fn build_belongings(&mut self) {
        self.belongings = vec![Belonging::default(); self.buses.len()];
        for (i, pattern) in self.patterns.iter().enumerate() {
            for &bus in &pattern.buses {
                self.belongings[bus - 1].patterns.push(i);
            }
        }
        for (i, chain) in self.chains.iter().enumerate() {
            for &bus in &chain.buses {
                self.belongings[bus - 1].chain = i;
            }
        }
    }

    fn connected_clusters(&self, graph: &Graph) -> Vec<Cluster> {
        let mut remaining: Vec<BusNb> = graph.bus_nodes().iter().map(|b| self.numbers[b]).collect();
        let mut clusters = Vec::new();
        while let Some(&start) = remaining.first() {
            let mut buses = Vec::new();
            self.collect_cluster(start, &mut remaining, &mut buses);

            let mut patterns: Vec<usize> = buses
                .iter()
                .flat_map(|&b| self.belongings[b - 1].patterns.iter().copied())
                .collect();
            patterns.sort_unstable();
            patterns.dedup();
            let mut chains: Vec<usize> = buses.iter().map(|&b| self.belongings[b - 1].chain).collect();
            chains.sort_unstable();
            chains.dedup();
            clusters.push(Cluster { patterns, chains });
        }
        clusters
    }

    fn collect_cluster(&self, bus: BusNb, remaining: &mut Vec<BusNb>, out: &mut Vec<BusNb>) {
        let Some(pos) = remaining.iter().position(|&b| b == bus) else {
            return;
        };
        remaining.remove(pos);
        out.push(bus);
        let belonging = &self.belongings[bus - 1];
        let mut next: Vec<BusNb> = belonging
            .patterns
            .iter()
            .flat_map(|&p| self.patterns[p].buses.iter().copied())
            .collect();
        next.extend(self.chains[belonging.chain].buses.iter().copied());
        for b in next {
            self.collect_cluster(b, remaining, out);
        }
    }

    fn align_chains(&mut self, cluster: &Cluster) {
        for (i, &reference) in cluster.chains.iter().enumerate() {
            for &other in &cluster.chains[i + 1..] {
                let reference = self.chains[reference].clone();
                self.chains[other].align_to(&reference);
            }
        }
    }

    fn pattern_chains(&self, pattern: usize) -> Vec<usize> {
        self.patterns[pattern]
            .buses
            .iter()
            .map(|&b| self.belongings[b - 1].chain)
            .collect()
    }

    /// Relative order of two patterns along the chains they share; 0 when
    /// no shared chain decides.
    fn compare_patterns(&self, p1: usize, p2: usize) -> i64 {
        let chains2 = self.pattern_chains(p2);
        for chain in self.pattern_chains(p1) {
            if !chains2.contains(&chain) {
                continue;
            }
            let chain = &self.chains[chain];
            let first_in = |p: usize| {
                chain
                    .buses
                    .iter()
                    .position(|b| self.patterns[p].buses.contains(b))
            };
            if let (Some(i1), Some(i2)) = (first_in(p1), first_in(p2)) {
                if i1 != i2 {
                    return i1 as i64 - i2 as i64;
                }
            }
        }
        0
    }

    fn try_insert(&self, pattern: usize, sorted: &mut Vec<usize>) -> bool {
        let slot = sorted.iter().enumerate().find_map(|(pos, &placed)| {
            let cmp = self.compare_patterns(pattern, placed);
            (cmp != 0).then_some(if cmp < 0 { pos } else { pos + 1 })
        });
        match slot {
            Some(slot) => {
                sorted.insert(slot, pattern);
                true
            }
            None => false,
        }
    }

    /// Insertion sort by [`Self::compare_patterns`]. A pattern unrelated to
    /// every sorted one is appended.
    fn sort_patterns(&self, cluster: &mut Cluster) {
        if cluster.patterns.is_empty() {
            return;
        }
        let mut remaining = cluster.patterns.clone();
        let mut sorted = vec![remaining.remove(0)];
        while !remaining.is_empty() {
            let inserted = remaining
                .iter()
                .position(|&p| self.try_insert(p, &mut sorted));
            match inserted {
                Some(i) => {
                    remaining.remove(i);
                }
                None => sorted.push(remaining.remove(0)),
            }
        }
        cluster.patterns = sorted;
    }

    /// Give each chain the first row not used by the other chains of the
    /// patterns it appears in.
    fn organize_chains_vertically(&mut self, cluster: &Cluster) {
        for &p in &cluster.patterns {
            let buses: Vec<BusNb> = self.patterns[p].buses.iter().copied().collect();
            let mut booked: BTreeSet<i32> = buses
                .iter()
                .map(|&b| self.chains[self.belongings[b - 1].chain].v)
                .collect();
            for bus in buses {
                let chain = self.belongings[bus - 1].chain;
                if self.chains[chain].v == 0 {
                    let row = first_available_row(&booked);
                    self.chains[chain].v = row;
                    booked.insert(row);
                }
            }
        }
        for &c in &cluster.chains {
            if self.chains[c].v == 0 {
                self.chains[c].v = 1;
            }
        }
    }

    /// Returns the first free section index after the cluster.
    fn set_structural_positions(&self, graph: &mut Graph, cluster: &Cluster, first_h: i32) -> i32 {
        let mut max_h = first_h;
        for &c in &cluster.chains {
            let chain = &self.chains[c];
            let mut h = first_h;
            for &bus in &chain.buses {
                let node = graph.node_mut(self.buses[bus - 1]);
                if let Some(data) = node.bus_data_mut() {
                    data.structural_position = Some(Position::new(h, chain.v).with_h_span(1));
                }
                h += 1;
            }
            max_h = max_h.max(h);
        }
        max_h
    }

    /// Order extern cells pattern by pattern, alternating sides, and
    /// renumber their feeders. Returns the next feeder order.
    fn set_cell_orders(&self, graph: &mut Graph, cluster: &Cluster, first_feeder_order: i32) -> i32 {
        let mut feeder_order = first_feeder_order;
        let mut cell_pos = 0;
        for &p in &cluster.patterns {
            for &cell in &self.patterns[p].cells {
                let c = graph.cell_mut(cell);
                c.direction = if cell_pos % 2 == 0 {
                    Direction::Top
                } else {
                    Direction::Bottom
                };
                c.order = cell_pos;
                cell_pos += 1;

                let feeders: Vec<NodeIndex> = graph
                    .cell(cell)
                    .nodes
                    .iter()
                    .copied()
                    .filter(|&n| graph.node(n).is_feeder())
                    .collect();
                for feeder in feeders {
                    if let Some(data) = graph.node_mut(feeder).feeder_data_mut() {
                        data.order = feeder_order;
                    }
                    feeder_order += 1;
                }
            }
        }
        feeder_order
    }
}

fn first_available_row(booked: &BTreeSet<i32>) -> i32 {
    let mut row = 1;
    while booked.contains(&row) {
        row += 1;
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_decomposer::decompose_cells;
    use crate::cell_detector::ImplicitCellDetector;
    use sld_core::{ComponentType, Diagnostics, GraphBuilder, SwitchKind};

    fn prepare(builder: &GraphBuilder) -> Graph {
        let mut diag = Diagnostics::new();
        let mut graph = builder.build(&mut diag).unwrap();
        let mut ctx = LayoutContext::new();
        ImplicitCellDetector::default()
            .detect_cells(&mut graph, &mut ctx)
            .unwrap();
        decompose_cells(&mut graph, &mut ctx).unwrap();
        graph
    }

    fn structural(graph: &Graph, id: &str) -> (i32, i32) {
        let pos = graph
            .node(graph.node_index(id).unwrap())
            .structural_position()
            .unwrap();
        (pos.h, pos.v)
    }

    #[test]
    fn test_first_available_row() {
        assert_eq!(first_available_row(&BTreeSet::new()), 1);
        assert_eq!(first_available_row(&[0].into_iter().collect()), 1);
        assert_eq!(first_available_row(&[0, 1, 3].into_iter().collect()), 2);
        assert_eq!(first_available_row(&[2].into_iter().collect()), 1);
    }

    #[test]
    fn test_coupled_sections_share_a_row() {
        let mut builder = GraphBuilder::new("vl");
        builder
            .visit_bus(0, "bbs1", None)
            .visit_bus(1, "bbs2", None)
            .visit_switch("c", SwitchKind::Disconnector, false, 0, 1)
            .visit_feeder(3, "l1", ComponentType::Line, -1, Direction::Undefined)
            .visit_switch("d1", SwitchKind::Disconnector, false, 0, 2)
            .visit_switch("b1", SwitchKind::Breaker, false, 2, 3)
            .visit_feeder(5, "l2", ComponentType::Line, -1, Direction::Undefined)
            .visit_switch("d2", SwitchKind::Disconnector, false, 1, 4)
            .visit_switch("b2", SwitchKind::Breaker, false, 4, 5);
        let mut graph = prepare(&builder);
        let mut ctx = LayoutContext::new();
        PositionFree.build_layout(&mut graph, &mut ctx).unwrap();

        assert_eq!(structural(&graph, "bbs1"), (1, 1));
        assert_eq!(structural(&graph, "bbs2"), (2, 1));

        let l1 = graph.node_index("l1").unwrap();
        let l2 = graph.node_index("l2").unwrap();
        let c1 = graph.cell(graph.node(l1).cell.unwrap());
        let c2 = graph.cell(graph.node(l2).cell.unwrap());
        assert_eq!((c1.order, c1.direction), (0, Direction::Top));
        assert_eq!((c2.order, c2.direction), (1, Direction::Bottom));
        assert_eq!(graph.node(l1).feeder_data().unwrap().order, 1);
        assert_eq!(graph.node(l2).feeder_data().unwrap().order, 2);

        let max = graph.max_bus_position();
        assert_eq!((max.h, max.v), (2, 1));
    }

    #[test]
    fn test_stacked_busbars_get_rows() {
        let mut builder = GraphBuilder::new("vl");
        builder
            .visit_bus(0, "bbs1", None)
            .visit_bus(1, "bbs2", None)
            .visit_switch("d1", SwitchKind::Disconnector, false, 0, 2)
            .visit_switch("d2", SwitchKind::Disconnector, false, 1, 2)
            .visit_switch("b", SwitchKind::Breaker, false, 2, 3)
            .visit_feeder(3, "l", ComponentType::Line, -1, Direction::Undefined);
        let mut graph = prepare(&builder);
        let mut ctx = LayoutContext::new();
        PositionFree.build_layout(&mut graph, &mut ctx).unwrap();

        assert_eq!(structural(&graph, "bbs1"), (1, 1));
        assert_eq!(structural(&graph, "bbs2"), (1, 2));
        let max = graph.max_bus_position();
        assert_eq!((max.h, max.v), (1, 2));
    }
}
