//! Horizontal subsections: the left-to-right slices of a voltage level.
//!
//! Every bus cell is filed under a key holding, for each busbar row, the
//! section index it touches there (0 when it does not touch the row). Extern
//! cells and vertical couplings are filed whole. A horizontal intern cell is
//! filed twice, once per leg: its left leg opens on the right of one
//! subsection and its right leg closes on the left of a later one.
//!
//! Keys agreeing on every row where both are set are merged until none
//! are left, then the ordered keys give the placement order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use petgraph::stable_graph::NodeIndex;
use sld_core::{CellId, CellKind, Graph, InternShape, Side, SldError, SldResult};
use tracing::{debug, info};

use crate::context::LayoutContext;
use crate::intern_cell::{reverse_cell, side_buses};

/// Section index per busbar row, 0 for rows the subsection does not touch
pub type SubSectionKey = Vec<i32>;

/// Cells drawn in one subsection.
#[derive(Debug, Clone, Default)]
pub struct HorizontalSubSection {
    /// Sorted by (order, cell number)
    extern_cells: BTreeSet<(i32, CellId)>,
    intern_sides: BTreeMap<CellId, Side>,
    buses: BTreeSet<NodeIndex>,
}

impl HorizontalSubSection {
    fn add_extern(&mut self, graph: &Graph, cell: CellId) {
        self.extern_cells.insert((graph.cell(cell).order, cell));
        self.buses.extend(graph.cell_buses(cell));
    }

    /// File one leg of an intern cell. The left leg opens on the right of
    /// the subsection and the right leg closes on its left, so sides are
    /// stored inverted; a cell filed twice is a vertical coupling here.
    fn add_intern(&mut self, graph: &Graph, cell: CellId, side: Side) {
        let stored = if side == Side::Undefined || self.intern_sides.contains_key(&cell) {
            Side::Undefined
        } else {
            side.flip()
        };
        self.intern_sides.insert(cell, stored);
        self.buses.extend(graph.cell_buses(cell));
    }

    fn merge(&mut self, other: HorizontalSubSection) {
        self.extern_cells.extend(other.extern_cells);
        self.buses.extend(other.buses);
        for (cell, side) in other.intern_sides {
            self.intern_sides
                .entry(cell)
                .and_modify(|existing| {
                    if *existing != side {
                        *existing = Side::Undefined;
                    }
                })
                .or_insert(side);
        }
    }

    /// Extern cells in drawing order
    pub fn extern_cells(&self) -> Vec<CellId> {
        self.extern_cells.iter().map(|&(_, cell)| cell).collect()
    }

    pub fn intern_cells(&self) -> Vec<CellId> {
        self.intern_sides.keys().copied().collect()
    }

    /// Intern cells filed on `side`, by cell number
    pub fn side_intern_cells(&self, side: Side) -> Vec<CellId> {
        self.intern_sides
            .iter()
            .filter(|(_, &s)| s == side)
            .map(|(&cell, _)| cell)
            .collect()
    }

    pub fn side_of(&self, cell: CellId) -> Option<Side> {
        self.intern_sides.get(&cell).copied()
    }

    fn set_side(&mut self, cell: CellId, side: Side) {
        self.intern_sides.insert(cell, side);
    }

    pub fn buses(&self) -> &BTreeSet<NodeIndex> {
        &self.buses
    }
}

/// Order of two subsection keys.
///
/// Rows set in both keys decide first. When a row is unset in either key
/// and the set rows agree, the key reaching the larger section comes
/// last, then raw values decide. The relation is not transitive, which is
/// why keys are kept in an insertion-ordered list.
pub fn compare_keys(a: &[i32], b: &[i32]) -> Ordering {
    let mut has_zero = false;
    for (x, y) in a.iter().zip(b) {
        if *x != 0 && *y != 0 {
            if x != y {
                return x.cmp(y);
            }
        } else {
            has_zero = true;
        }
    }
    if !has_zero {
        return Ordering::Equal;
    }
    let max_a = a.iter().max().copied().unwrap_or(0);
    let max_b = b.iter().max().copied().unwrap_or(0);
    max_a.cmp(&max_b).then_with(|| a.cmp(b))
}

/// Union of two keys, `None` when they disagree on a row set in both.
pub fn merge_keys(a: &[i32], b: &[i32]) -> Option<SubSectionKey> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| match (x, y) {
            (0, _) | (_, 0) => Some(x.max(y)),
            _ if x == y => Some(x),
            _ => None,
        })
        .collect()
}

/// Whether `existing` holds every section `key` sets.
fn matches_set_rows(existing: &[i32], key: &[i32]) -> bool {
    existing
        .iter()
        .zip(key)
        .all(|(&e, &k)| k == 0 || e == k)
}

/// Ordered subsections of a voltage level.
#[derive(Debug, Clone, Default)]
pub struct SubSections {
    rows: usize,
    entries: Vec<(SubSectionKey, HorizontalSubSection)>,
}

impl SubSections {
    /// Build, merge and check the subsections of `graph`. Horizontal intern
    /// cells whose legs come out crossed are reversed.
    pub fn build(graph: &mut Graph, ctx: &mut LayoutContext) -> SldResult<Self> {
        info!("Building horizontal subsections");
        let mut subsections = SubSections {
            rows: graph.max_bus_position().v.max(0) as usize,
            entries: Vec::new(),
        };

        for cell in graph.cell_ids_of_kind(CellKind::Extern) {
            let key = subsections.key_for(graph, &graph.cell_buses(cell))?;
            let idx = subsections.get_or_insert(key);
            subsections.entries[idx].1.add_extern(graph, cell);
        }

        let interns: Vec<CellId> = graph
            .cell_ids()
            .into_iter()
            .filter(|&c| graph.cell(c).kind.is_intern())
            .collect();
        let (vertical, horizontal): (Vec<CellId>, Vec<CellId>) = interns
            .into_iter()
            .partition(|&c| is_vertical_coupling(graph, c));
        for &cell in &vertical {
            let key = subsections.key_for(graph, &graph.cell_buses(cell))?;
            let idx = subsections.get_or_insert(key);
            subsections.entries[idx].1.add_intern(graph, cell, Side::Undefined);
        }
        for &cell in &horizontal {
            for side in [Side::Left, Side::Right] {
                let key = subsections.key_for(graph, &side_buses(graph, cell, side))?;
                let idx = subsections.side_target(key, side);
                subsections.entries[idx].1.add_intern(graph, cell, side);
            }
        }

        subsections.merge_similar();
        subsections.check_intern_cell_orientation(graph);
        if !subsections.check_cell_order_consistency() {
            ctx.warn("subsections", "Cells order not consistent with Subsections order");
        }
        debug!("Subsections\n{}", subsections);
        Ok(subsections)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[i32], &HorizontalSubSection)> {
        self.entries.iter().map(|(k, hss)| (k.as_slice(), hss))
    }

    pub fn keys(&self) -> Vec<SubSectionKey> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    fn key_for(&self, graph: &Graph, buses: &[NodeIndex]) -> SldResult<SubSectionKey> {
        let mut key = vec![0; self.rows];
        for &bus in buses {
            let node = graph.node(bus);
            let pos = node.structural_position().ok_or_else(|| {
                SldError::Layout(format!("busbar '{}' has no structural position", node.id))
            })?;
            let row = pos.v - 1;
            if row < 0 || row as usize >= self.rows {
                return Err(SldError::Layout(format!(
                    "busbar '{}' row {} outside the {} known rows",
                    node.id, pos.v, self.rows
                )));
            }
            key[row as usize] = pos.h;
        }
        Ok(key)
    }

    fn position(&self, key: &[i32]) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Insert before the first key ordered after it.
    fn insert(&mut self, key: SubSectionKey, hss: HorizontalSubSection) -> usize {
        let idx = self
            .entries
            .iter()
            .position(|(k, _)| compare_keys(&key, k) == Ordering::Less)
            .unwrap_or(self.entries.len());
        self.entries.insert(idx, (key, hss));
        idx
    }

    fn get_or_insert(&mut self, key: SubSectionKey) -> usize {
        match self.position(&key) {
            Some(idx) => idx,
            None => self.insert(key, HorizontalSubSection::default()),
        }
    }

    /// Subsection receiving one leg of a horizontal intern cell: among the
    /// subsections matching the leg on its rows, the last one for a left
    /// leg and the first one for a right leg.
    fn side_target(&mut self, key: SubSectionKey, side: Side) -> usize {
        if !self.entries.iter().any(|(k, _)| matches_set_rows(k, &key)) {
            return self.insert(key, HorizontalSubSection::default());
        }
        let mut best: Option<usize> = None;
        for (idx, (k, _)) in self.entries.iter().enumerate() {
            if !matches_set_rows(k, &key) {
                continue;
            }
            best = match best {
                None => Some(idx),
                Some(b) => {
                    let cmp = compare_keys(k, &self.entries[b].0);
                    let better = match side {
                        Side::Left => cmp == Ordering::Greater,
                        _ => cmp == Ordering::Less,
                    };
                    Some(if better { idx } else { b })
                }
            };
        }
        best.unwrap_or(0)
    }

    fn merge_similar(&mut self) {
        loop {
            let mut found = None;
            'search: for i in 0..self.entries.len() {
                for j in i + 1..self.entries.len() {
                    if let Some(key) = merge_keys(&self.entries[i].0, &self.entries[j].0) {
                        found = Some((i, j, key));
                        break 'search;
                    }
                }
            }
            let Some((i, j, key)) = found else {
                break;
            };
            let (_, second) = self.entries.remove(j);
            let (_, mut first) = self.entries.remove(i);
            first.merge(second);
            if let Some(existing) = self.position(&key) {
                let (_, hss) = self.entries.remove(existing);
                first.merge(hss);
            }
            self.insert(key, first);
        }
    }

    /// Reverse horizontal intern cells whose left leg ended up in a later
    /// subsection than their right leg.
    fn check_intern_cell_orientation(&mut self, graph: &mut Graph) {
        let mut cell_to_entries: BTreeMap<CellId, Vec<usize>> = BTreeMap::new();
        for (idx, (_, hss)) in self.entries.iter().enumerate() {
            for cell in hss.intern_cells() {
                if graph.cell(cell).intern.central.is_some() {
                    cell_to_entries.entry(cell).or_default().push(idx);
                }
            }
        }
        for (cell, entries) in cell_to_entries {
            if entries.len() != 2 || graph.cell(cell).intern.shape != InternShape::Horizontal {
                continue;
            }
            let (first, second) = (entries[0], entries[1]);
            if self.entries[first].1.side_of(cell) == Some(Side::Left)
                && self.entries[second].1.side_of(cell) == Some(Side::Right)
            {
                reverse_cell(graph, cell);
                self.entries[first].1.set_side(cell, Side::Right);
                self.entries[second].1.set_side(cell, Side::Left);
                debug!(cell = %graph.full_id(cell), "intern cell reversed");
            }
        }
    }

    /// Extern cell orders must not decrease from one subsection to the next.
    fn check_cell_order_consistency(&self) -> bool {
        let mut previous_max = 0;
        let mut ok = true;
        for (_, hss) in &self.entries {
            let (Some(&(min, _)), Some(&(max, _))) =
                (hss.extern_cells.first(), hss.extern_cells.last())
            else {
                continue;
            };
            ok &= min >= previous_max;
            previous_max = max;
        }
        ok
    }
}

/// Intern cells drawn in a single column
fn is_vertical_coupling(graph: &Graph, cell: CellId) -> bool {
    if graph.cell(cell).intern.shape == InternShape::Vertical {
        return true;
    }
    let mut hs = graph
        .cell_buses(cell)
        .into_iter()
        .filter_map(|b| graph.node(b).structural_position())
        .map(|p| p.h);
    match hs.next() {
        Some(first) => hs.all(|h| h == first),
        None => true,
    }
}

impl fmt::Display for SubSections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, hss) in &self.entries {
            write!(f, "{:?}: {} extern", key, hss.extern_cells.len())?;
            for side in [Side::Left, Side::Undefined, Side::Right] {
                let cells = hss.side_intern_cells(side);
                if !cells.is_empty() {
                    let numbers: Vec<usize> = cells.iter().map(|c| c.value()).collect();
                    write!(f, ", intern {:?} {:?}", side, numbers)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
