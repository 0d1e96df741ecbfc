//! Cells: the topological units (bays) a voltage level is partitioned into.

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::position::Direction;

/// Cell handle. Cells are numbered in creation order and iterated in that
/// order, so the id doubles as the deterministic sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(usize);

impl CellId {
    #[inline]
    pub fn new(value: usize) -> Self {
        CellId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellKind {
    /// Found by the extern pass, not yet classified
    Undefined,
    /// Bus to bus, no feeder
    Intern,
    /// Three-node intern cell (bus, switch, bus)
    InternBound,
    /// Bus to feeder
    Extern,
    /// Bridge between two extern cells
    Shunt,
}

impl CellKind {
    pub fn is_intern(self) -> bool {
        matches!(self, CellKind::Intern | CellKind::InternBound)
    }

    /// Cells that touch busbars and get placed by the positioner
    pub fn is_bus_cell(self) -> bool {
        matches!(
            self,
            CellKind::Intern | CellKind::InternBound | CellKind::Extern
        )
    }
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CellKind::Undefined => "UNDEFINED",
            CellKind::Intern => "INTERN",
            CellKind::InternBound => "INTERNBOUND",
            CellKind::Extern => "EXTERN",
            CellKind::Shunt => "SHUNT",
        };
        write!(f, "{}", name)
    }
}

/// How an intern cell is drawn once bus positions are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternShape {
    #[default]
    Undetermined,
    /// Two adjacent sections of one busbar row
    Flat,
    /// All busbars in one column
    Vertical,
    /// Left leg, central block, right leg
    Horizontal,
}

/// Leg and central blocks of an intern cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InternLayout {
    pub shape: InternShape,
    pub left: Option<BlockId>,
    pub right: Option<BlockId>,
    pub central: Option<BlockId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub id: CellId,
    pub kind: CellKind,
    #[serde(skip)]
    pub nodes: Vec<NodeIndex>,
    pub root: Option<BlockId>,
    pub direction: Direction,
    /// Minimum feeder order (extern cells), -1 when unknown
    pub order: i32,
    /// Primary blocks starting at a busbar
    pub bus_blocks: Vec<BlockId>,
    pub intern: InternLayout,
    /// Extern cells joined by a shunt cell
    pub bridged: Option<(CellId, CellId)>,
}

impl Cell {
    pub fn new(id: CellId, kind: CellKind, nodes: Vec<NodeIndex>) -> Self {
        Self {
            id,
            kind,
            nodes,
            root: None,
            direction: Direction::Undefined,
            order: -1,
            bus_blocks: Vec::new(),
            intern: InternLayout::default(),
            bridged: None,
        }
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.nodes.contains(&node)
    }

    pub fn is_flat(&self) -> bool {
        self.direction == Direction::Flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_and_predicates() {
        assert_eq!(CellKind::Extern.to_string(), "EXTERN");
        assert_eq!(CellKind::InternBound.to_string(), "INTERNBOUND");
        assert!(CellKind::InternBound.is_intern());
        assert!(CellKind::Extern.is_bus_cell());
        assert!(!CellKind::Shunt.is_bus_cell());
    }

    #[test]
    fn test_new_cell_defaults() {
        let cell = Cell::new(CellId::new(3), CellKind::Undefined, vec![NodeIndex::new(0)]);
        assert_eq!(cell.id.value(), 3);
        assert_eq!(cell.order, -1);
        assert_eq!(cell.direction, Direction::Undefined);
        assert!(cell.contains(NodeIndex::new(0)));
        assert!(cell.root.is_none());
    }
}
