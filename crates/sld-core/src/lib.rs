//! # sld-core: Single-Line Diagram Model
//!
//! Data model shared by the single-line diagram layout: the connectivity
//! graph of one voltage level, the cells it is partitioned into and the
//! block trees describing each cell.
//!
//! ## Design
//!
//! A voltage level is an **undirected multigraph** where:
//! - **Nodes**: busbars, feeders, switches and fictitious connection points
//! - **Edges**: plain connections, ordered by insertion
//!
//! Everything derived from the graph is stored next to it in arenas:
//! - [`Cell`] values keyed by [`CellId`], iterated by number
//! - [`Block`] values addressed by [`BlockId`]; a block knows its parent and
//!   its cell through those handles, never through references
//!
//! Node and block kinds are closed enums ([`NodeKind`], [`BlockContent`])
//! matched exhaustively by the layout stages.
//!
//! ## Quick Start
//!
//! ```rust
//! use sld_core::*;
//!
//! let mut builder = GraphBuilder::new("vl");
//! builder
//!     .visit_bus(0, "bbs", Some((1, 1)))
//!     .visit_feeder(2, "l", ComponentType::Line, 0, Direction::Top)
//!     .visit_switch("d", SwitchKind::Disconnector, false, 0, 1)
//!     .visit_switch("b", SwitchKind::Breaker, false, 1, 2);
//!
//! let mut diag = Diagnostics::new();
//! let mut graph = builder.build(&mut diag).unwrap();
//!
//! graph.remove_unnecessary_fictitious_nodes();
//! graph.extend_first_outside_node().unwrap();
//! assert!(graph.node_index("FICT_vl_dFictif").is_some());
//! ```
//!
//! ## Modules
//!
//! - [`graph`] - node/edge storage, adjacency, connectivity, cell registry
//! - [`normalize`] - structural rewrites run before cell detection
//! - [`builder`] - node-breaker and bus-breaker construction
//! - [`block`] - block arena and block queries
//! - [`diagnostics`] - warnings collected during a layout run
//! - [`graph_utils`] - statistics and Graphviz export

pub mod block;
pub mod builder;
pub mod cell;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod graph_utils;
pub mod node;
pub mod normalize;
pub mod position;

pub use block::{Block, BlockContent, BlockId, BlockKind, Extremity};
pub use builder::{BusBreakerBuilder, GraphBuilder};
pub use cell::{Cell, CellId, CellKind, InternLayout, InternShape};
pub use diagnostics::{DiagnosticIssue, Diagnostics};
pub use error::{SldError, SldResult};
pub use graph::{Edge, Graph};
pub use graph_utils::*;
pub use node::{BusData, ComponentType, FeederData, Node, NodeKind, NodeType, SwitchKind};
pub use normalize::Padding;
pub use petgraph::stable_graph::NodeIndex;
pub use position::{Coord, Direction, Orientation, Position, Side};
