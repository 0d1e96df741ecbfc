//! Graph vertices: busbars, feeders, switches and the fictitious connection
//! points inserted between them.

use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::position::{Direction, Position};

/// Coarse node classification used by every detection and decomposition step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Bus,
    Feeder,
    Fictitious,
    Switch,
    Shunt,
    Other,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeType::Bus => "BUS",
            NodeType::Feeder => "FEEDER",
            NodeType::Fictitious => "FICTITIOUS",
            NodeType::Switch => "SWITCH",
            NodeType::Shunt => "SHUNT",
            NodeType::Other => "OTHER",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    Breaker,
    Disconnector,
    LoadBreakSwitch,
}

/// Descriptive equipment tag handed to the renderer; the layout ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    BusbarSection,
    Breaker,
    Disconnector,
    LoadBreakSwitch,
    Line,
    Load,
    Generator,
    TwoWindingsTransformer,
    Capacitor,
    Inductor,
    StaticVarCompensator,
    VscConverterStation,
    DanglingLine,
    Node,
}

impl From<SwitchKind> for ComponentType {
    fn from(kind: SwitchKind) -> Self {
        match kind {
            SwitchKind::Breaker => ComponentType::Breaker,
            SwitchKind::Disconnector => ComponentType::Disconnector,
            SwitchKind::LoadBreakSwitch => ComponentType::LoadBreakSwitch,
        }
    }
}

/// Busbar-specific state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusData {
    /// Logical (row, column) slot, `h` = section index, `v` = busbar index
    pub structural_position: Option<Position>,
    /// Grid position computed by the positioner
    pub position: Position,
    pub px_width: f64,
}

impl Default for BusData {
    fn default() -> Self {
        Self {
            structural_position: None,
            position: Position::default(),
            px_width: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeederData {
    pub order: i32,
    pub direction: Direction,
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Bus(BusData),
    Feeder(FeederData),
    /// Connection point; `switch_like` marks the padding switches that
    /// primary chains walk through.
    Fictitious { switch_like: bool },
    Switch { kind: SwitchKind, open: bool },
    Shunt,
    Other,
}

/// A vertex of the voltage-level graph.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub component_type: ComponentType,
    pub kind: NodeKind,
    /// Owning cell once detection has run (never set for busbars)
    pub cell: Option<CellId>,
    pub x: f64,
    pub y: f64,
    pub rotated: bool,
    #[serde(skip)]
    x_pinned: bool,
    #[serde(skip)]
    y_pinned: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, component_type: ComponentType, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            component_type,
            kind,
            cell: None,
            x: -1.0,
            y: -1.0,
            rotated: false,
            x_pinned: false,
            y_pinned: false,
        }
    }

    pub fn bus(id: impl Into<String>) -> Self {
        Self::new(
            id,
            ComponentType::BusbarSection,
            NodeKind::Bus(BusData::default()),
        )
    }

    pub fn feeder(
        id: impl Into<String>,
        component_type: ComponentType,
        order: i32,
        direction: Direction,
    ) -> Self {
        Self::new(
            id,
            component_type,
            NodeKind::Feeder(FeederData { order, direction }),
        )
    }

    pub fn switch(id: impl Into<String>, kind: SwitchKind, open: bool) -> Self {
        Self::new(id, kind.into(), NodeKind::Switch { kind, open })
    }

    pub fn fictitious(id: impl Into<String>) -> Self {
        Self::new(
            id,
            ComponentType::Node,
            NodeKind::Fictitious { switch_like: false },
        )
    }

    pub fn fictitious_switch(id: impl Into<String>) -> Self {
        Self::new(
            id,
            ComponentType::Node,
            NodeKind::Fictitious { switch_like: true },
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Bus(_) => NodeType::Bus,
            NodeKind::Feeder(_) => NodeType::Feeder,
            NodeKind::Fictitious { .. } => NodeType::Fictitious,
            NodeKind::Switch { .. } => NodeType::Switch,
            NodeKind::Shunt => NodeType::Shunt,
            NodeKind::Other => NodeType::Other,
        }
    }

    pub fn is_bus(&self) -> bool {
        matches!(self.kind, NodeKind::Bus(_))
    }

    pub fn is_feeder(&self) -> bool {
        matches!(self.kind, NodeKind::Feeder(_))
    }

    /// Switches and fictitious padding switches
    pub fn is_switch_like(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Switch { .. } | NodeKind::Fictitious { switch_like: true }
        )
    }

    /// Fictitious connection point that is not a padding switch
    pub fn is_plain_fictitious(&self) -> bool {
        matches!(self.kind, NodeKind::Fictitious { switch_like: false })
    }

    pub fn switch_kind(&self) -> Option<SwitchKind> {
        match self.kind {
            NodeKind::Switch { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, NodeKind::Switch { open: true, .. })
    }

    pub fn bus_data(&self) -> Option<&BusData> {
        match &self.kind {
            NodeKind::Bus(data) => Some(data),
            _ => None,
        }
    }

    pub fn bus_data_mut(&mut self) -> Option<&mut BusData> {
        match &mut self.kind {
            NodeKind::Bus(data) => Some(data),
            _ => None,
        }
    }

    pub fn feeder_data(&self) -> Option<&FeederData> {
        match &self.kind {
            NodeKind::Feeder(data) => Some(data),
            _ => None,
        }
    }

    pub fn feeder_data_mut(&mut self) -> Option<&mut FeederData> {
        match &mut self.kind {
            NodeKind::Feeder(data) => Some(data),
            _ => None,
        }
    }

    /// Structural position of a busbar, if any was assigned
    pub fn structural_position(&self) -> Option<Position> {
        self.bus_data().and_then(|b| b.structural_position)
    }

    /// Set the x coordinate. A pinned write wins over every later unpinned one.
    pub fn set_x(&mut self, x: f64, pinned: bool) {
        if pinned {
            self.x_pinned = true;
            self.x = x;
        } else if !self.x_pinned {
            self.x = x;
        }
    }

    /// Set the y coordinate. A pinned write wins over every later unpinned one.
    pub fn set_y(&mut self, y: f64, pinned: bool) {
        if pinned {
            self.y_pinned = true;
            self.y = y;
        } else if !self.y_pinned {
            self.y = y;
        }
    }

    pub fn reset_coord(&mut self) {
        self.x = -1.0;
        self.y = -1.0;
        self.x_pinned = false;
        self.y_pinned = false;
        self.rotated = false;
    }
}
