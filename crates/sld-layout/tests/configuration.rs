//! Layout parameters and options read from TOML, and the position strategies
//! they select.

use std::io::Write;

use sld_core::{
    CellKind, ComponentType, Diagnostics, Direction, Graph, GraphBuilder, SldError, SwitchKind,
};
use sld_layout::{LayoutOptions, LayoutParameters, PositionFinderKind, VoltageLevelLayout};
use tempfile::NamedTempFile;

fn xy(g: &Graph, id: &str) -> (f64, f64) {
    let node = g.node(g.node_index(id).unwrap());
    (node.x, node.y)
}

fn single_bay(order: i32) -> Graph {
    let mut builder = GraphBuilder::new("vl");
    builder
        .visit_bus(0, "bbs", Some((1, 1)))
        .visit_feeder(2, "l", ComponentType::Line, order, Direction::Top)
        .visit_switch("d", SwitchKind::Disconnector, false, 0, 1)
        .visit_switch("b", SwitchKind::Breaker, false, 1, 2);
    builder.build(&mut Diagnostics::new()).unwrap()
}

/// Test that parameters loaded from a file drive the projection
#[test]
fn test_parameters_file_changes_projection() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "cell_width = 80.0").unwrap();
    writeln!(file, "initial_y_bus = 300.0").unwrap();
    let params = LayoutParameters::load_from(&file.path().to_path_buf()).unwrap();
    assert_eq!(params.horizontal_bus_padding, 20.0);

    let mut g = single_bay(1);
    VoltageLevelLayout::new(params, LayoutOptions::default())
        .run(&mut g)
        .unwrap();

    assert_eq!(xy(&g, "bbs"), (10.0, 300.0));
    assert_eq!(xy(&g, "d"), (40.0, 300.0));
    let bbs = g.node(g.node_index("bbs").unwrap());
    assert_eq!(bbs.bus_data().unwrap().px_width, 60.0);
}

/// Test that options parsed from TOML select the topology-driven strategy
#[test]
fn test_options_from_toml() {
    let options: LayoutOptions =
        toml::from_str("position_finder = \"free\"\nstack_bus_blocks = false\n").unwrap();
    assert_eq!(options.position_finder, PositionFinderKind::Free);
    assert!(!options.stack_bus_blocks);
    assert!(options.substitute_singular_fictitious_by_feeder);

    let layout = VoltageLevelLayout::new(LayoutParameters::default(), options.clone());
    assert_eq!(layout.options(), &options);
}

/// Test that the free strategy lays out a level that carries no hints
#[test]
fn test_free_layout_without_hints() {
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
    let mut g = builder.build(&mut Diagnostics::new()).unwrap();

    let options = LayoutOptions::default().with_position_finder(PositionFinderKind::Free);
    let report = VoltageLevelLayout::new(LayoutParameters::default(), options)
        .run(&mut g)
        .unwrap();

    assert_eq!(report.cell_counts.get(&CellKind::Extern), Some(&2));
    assert_eq!(report.cell_counts.get(&CellKind::InternBound), Some(&1));

    let bus_y = xy(&g, "bbs1").1;
    assert_eq!(xy(&g, "bbs2").1, bus_y);
    assert!(xy(&g, "l1").1 < bus_y);
    assert!(xy(&g, "l2").1 > bus_y);
}

/// Test that hint-driven layout refuses a bay whose feeder has no order
#[test]
fn test_missing_feeder_order_is_an_error() {
    let mut g = single_bay(-1);
    let result = VoltageLevelLayout::default().run(&mut g);
    assert!(matches!(result, Err(SldError::Layout(_))));
}
