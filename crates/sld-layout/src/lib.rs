//! # sld-layout: Single-Line Diagram Layout
//!
//! Turns the connectivity graph of one voltage level into grid positions
//! and pixel coordinates.
//!
//! ## Pipeline
//!
//! 1. **Cleaning and cell detection** ([`cell_detector`]): normalize the
//!    graph, then split it into intern, extern and shunt cells
//! 2. **Block decomposition** ([`block_decomposer`]): one block tree per cell
//! 3. **Busbar positions** ([`position_finder`]): structural (section, row)
//!    slot of every busbar, order and direction of every extern cell
//! 4. **Intern cells** ([`intern_cell`]): flat, vertical or horizontal shape
//! 5. **Subsections** ([`subsections`]): left-to-right slices of the level
//! 6. **Dimensions and positions** ([`dimensions`], [`positioner`],
//!    [`lanes`]): grid extent of every block, then its column and lane
//! 7. **Coordinates** ([`coordinates`]): pixels from grid positions
//!
//! The whole run is synchronous and single-threaded; warnings are collected
//! in the [`LayoutReport`] rather than aborting the run.
//!
//! ## Quick Start
//!
//! ```rust
//! use sld_core::*;
//! use sld_layout::{LayoutOptions, LayoutParameters, VoltageLevelLayout};
//!
//! let mut builder = GraphBuilder::new("vl");
//! builder
//!     .visit_bus(0, "bbs", Some((1, 1)))
//!     .visit_feeder(2, "l", ComponentType::Line, 0, Direction::Top)
//!     .visit_switch("d", SwitchKind::Disconnector, false, 0, 1)
//!     .visit_switch("b", SwitchKind::Breaker, false, 1, 2);
//! let mut graph = builder.build(&mut Diagnostics::new()).unwrap();
//!
//! let layout = VoltageLevelLayout::new(LayoutParameters::default(), LayoutOptions::default());
//! let report = layout.run(&mut graph).unwrap();
//! assert_eq!(report.cell_count, 1);
//! ```

pub mod block_decomposer;
pub mod cell_detector;
pub mod context;
pub mod coordinates;
pub mod dimensions;
pub mod intern_cell;
pub mod lanes;
pub mod params;
pub mod position_finder;
pub mod positioner;
pub mod subsections;

pub use cell_detector::ImplicitCellDetector;
pub use context::LayoutContext;
pub use coordinates::CoordinateProjector;
pub use params::{LayoutOptions, LayoutParameters, PositionFinderKind};
pub use position_finder::{PositionFinder, PositionFree, PositionFromExtension};
pub use subsections::{HorizontalSubSection, SubSectionKey, SubSections};

use std::collections::BTreeMap;

use serde::Serialize;
use sld_core::{CellKind, Diagnostics, Graph, SldResult};
use tracing::info;

/// Outcome of a layout run.
#[derive(Debug, Clone, Serialize)]
pub struct LayoutReport {
    pub graph_id: String,
    pub cell_count: usize,
    pub cell_counts: BTreeMap<CellKind, usize>,
    /// Sorted full ids of the detected cells
    pub signature: Vec<String>,
    pub subsections: Vec<SubSectionKey>,
    pub diagnostics: Diagnostics,
}

impl LayoutReport {
    pub fn to_json(&self) -> SldResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| anyhow::anyhow!(e).into())
    }
}

/// Layout of one voltage level.
#[derive(Debug, Clone, Default)]
pub struct VoltageLevelLayout {
    params: LayoutParameters,
    options: LayoutOptions,
}

impl VoltageLevelLayout {
    pub fn new(params: LayoutParameters, options: LayoutOptions) -> Self {
        Self { params, options }
    }

    pub fn params(&self) -> &LayoutParameters {
        &self.params
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Run every stage on `graph`, leaving positions and coordinates on its
    /// nodes and blocks.
    pub fn run(&self, graph: &mut Graph) -> SldResult<LayoutReport> {
        info!(graph = graph.id(), "Running voltage level layout");
        let mut ctx = LayoutContext::new();

        ImplicitCellDetector::from_options(&self.options).detect_cells(graph, &mut ctx)?;
        block_decomposer::decompose_cells(graph, &mut ctx)?;
        if self.options.stack_bus_blocks {
            block_decomposer::determine_stackable_blocks(graph);
        }

        let finder = position_finder::position_finder_for(self.options.position_finder);
        info!(strategy = finder.name(), "Finding busbar positions");
        finder.build_layout(graph, &mut ctx)?;

        intern_cell::post_positioning(graph, &mut ctx)?;
        let subsections = SubSections::build(graph, &mut ctx)?;
        dimensions::dimension_bus_cells(graph, &mut ctx)?;
        positioner::determine_block_positions(graph, &subsections)?;
        lanes::manage_intern_cell_overlaps(graph);
        CoordinateProjector::new(&self.params, graph).run(graph)?;

        let diagnostics = ctx.into_diagnostics();
        info!(
            graph = graph.id(),
            warnings = diagnostics.warning_count(),
            "Layout done"
        );
        Ok(LayoutReport {
            graph_id: graph.id().to_string(),
            cell_count: graph.cell_count(),
            cell_counts: graph.cell_counts(),
            signature: graph.signature_sorted_cells_content(),
            subsections: subsections.keys(),
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sld_core::{ComponentType, Direction, GraphBuilder, SwitchKind};

    fn single_bay() -> Graph {
        let mut builder = GraphBuilder::new("vl");
        builder
            .visit_bus(0, "bbs", Some((1, 1)))
            .visit_feeder(2, "l", ComponentType::Line, 0, Direction::Top)
            .visit_switch("d", SwitchKind::Disconnector, false, 0, 1)
            .visit_switch("b", SwitchKind::Breaker, false, 1, 2);
        builder.build(&mut Diagnostics::new()).unwrap()
    }

    #[test]
    fn test_run_reports_cells() {
        let mut graph = single_bay();
        let report = VoltageLevelLayout::default().run(&mut graph).unwrap();
        assert_eq!(report.cell_count, 1);
        assert_eq!(report.cell_counts.get(&CellKind::Extern), Some(&1));
        assert_eq!(report.subsections, vec![vec![1]]);
        assert_eq!(report.diagnostics.warning_count(), 0);
    }

    #[test]
    fn test_report_serializes() {
        let mut graph = single_bay();
        let report = VoltageLevelLayout::default().run(&mut graph).unwrap();
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["graph_id"], "vl");
        assert_eq!(value["cell_counts"]["EXTERN"], 1);
    }
}
