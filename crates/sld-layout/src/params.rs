//! Layout configuration.
//!
//! [`LayoutParameters`] holds every spacing constant used to turn grid
//! positions into pixels; [`LayoutOptions`] switches pipeline stages on and
//! off. Both are plain serde structs with `#[serde(default)]`, so a TOML file
//! only needs the values it overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sld_core::SldResult;

/// Spacing constants, in pixels unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParameters {
    pub translate_x: f64,
    pub translate_y: f64,
    /// x of the first grid column
    pub initial_x_bus: f64,
    /// y of the first busbar row
    pub initial_y_bus: f64,
    /// Distance between two busbar rows
    pub vertical_space_bus: f64,
    /// Gap left between two busbar sections of one row
    pub horizontal_bus_padding: f64,
    /// Width of one grid column
    pub cell_width: f64,
    pub extern_cell_height: f64,
    /// Height of one intern-cell lane
    pub intern_cell_height: f64,
    pub stack_height: f64,
    pub show_grid: bool,
    pub show_internal_nodes: bool,
    pub scale_factor: f64,
    pub horizontal_substation_padding: f64,
    pub vertical_substation_padding: f64,
    pub draw_straight_wires: bool,
    pub horizontal_snake_line_padding: f64,
    pub vertical_snake_line_padding: f64,
    pub arrow_distance: f64,
}

impl Default for LayoutParameters {
    fn default() -> Self {
        Self {
            translate_x: 20.0,
            translate_y: 50.0,
            initial_x_bus: 0.0,
            initial_y_bus: 260.0,
            vertical_space_bus: 25.0,
            horizontal_bus_padding: 20.0,
            cell_width: 50.0,
            extern_cell_height: 250.0,
            intern_cell_height: 40.0,
            stack_height: 30.0,
            show_grid: false,
            show_internal_nodes: false,
            scale_factor: 1.0,
            horizontal_substation_padding: 50.0,
            vertical_substation_padding: 50.0,
            draw_straight_wires: false,
            horizontal_snake_line_padding: 20.0,
            vertical_snake_line_padding: 25.0,
            arrow_distance: 20.0,
        }
    }
}

impl LayoutParameters {
    /// Load parameters from a TOML file; missing keys keep their defaults.
    pub fn load_from(path: &PathBuf) -> SldResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let params: Self = toml::from_str(&contents)?;
        Ok(params)
    }

    pub fn save_to(&self, path: &PathBuf) -> SldResult<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn with_initial_bus(mut self, x: f64, y: f64) -> Self {
        self.initial_x_bus = x;
        self.initial_y_bus = y;
        self
    }

    pub fn with_vertical_space_bus(mut self, space: f64) -> Self {
        self.vertical_space_bus = space;
        self
    }

    pub fn with_horizontal_bus_padding(mut self, padding: f64) -> Self {
        self.horizontal_bus_padding = padding;
        self
    }

    pub fn with_cell_width(mut self, width: f64) -> Self {
        self.cell_width = width;
        self
    }

    pub fn with_extern_cell_height(mut self, height: f64) -> Self {
        self.extern_cell_height = height;
        self
    }

    pub fn with_intern_cell_height(mut self, height: f64) -> Self {
        self.intern_cell_height = height;
        self
    }

    pub fn with_stack_height(mut self, height: f64) -> Self {
        self.stack_height = height;
        self
    }
}

/// Where busbar positions and cell orders come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionFinderKind {
    /// Feeder order/direction hints and busbar positions supplied with the graph
    #[default]
    FromExtension,
    /// Computed from the topology
    Free,
}

/// Pipeline switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub position_finder: PositionFinderKind,
    /// Let bus-side blocks ending at the same node share one column
    pub stack_bus_blocks: bool,
    pub remove_unnecessary_fictitious_nodes: bool,
    pub substitute_singular_fictitious_by_feeder: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            position_finder: PositionFinderKind::FromExtension,
            stack_bus_blocks: true,
            remove_unnecessary_fictitious_nodes: true,
            substitute_singular_fictitious_by_feeder: true,
        }
    }
}

impl LayoutOptions {
    pub fn with_position_finder(mut self, kind: PositionFinderKind) -> Self {
        self.position_finder = kind;
        self
    }

    pub fn with_stack_bus_blocks(mut self, stack: bool) -> Self {
        self.stack_bus_blocks = stack;
        self
    }

    pub fn with_remove_unnecessary_fictitious_nodes(mut self, remove: bool) -> Self {
        self.remove_unnecessary_fictitious_nodes = remove;
        self
    }

    pub fn with_substitute_singular_fictitious_by_feeder(mut self, substitute: bool) -> Self {
        self.substitute_singular_fictitious_by_feeder = substitute;
        self
    }
}
