//! Structural properties that hold for every layout run.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sld_core::{
    BlockContent, BlockId, BlockKind, CellKind, ComponentType, Diagnostics, Direction, Graph,
    GraphBuilder, NodeType, SwitchKind,
};
use sld_layout::{ImplicitCellDetector, LayoutContext, VoltageLevelLayout};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two bays on two sections joined at their connection nodes, plus a
/// coupling between the sections.
fn shunted_pair() -> GraphBuilder {
    let mut builder = GraphBuilder::new("vl");
    builder
        .visit_bus(0, "bbs1", Some((1, 1)))
        .visit_bus(1, "bbs2", Some((2, 1)))
        .visit_feeder(4, "l1", ComponentType::Line, 1, Direction::Top)
        .visit_feeder(5, "l2", ComponentType::Line, 2, Direction::Top)
        .visit_switch("d1", SwitchKind::Disconnector, false, 0, 2)
        .visit_switch("b1", SwitchKind::Breaker, false, 2, 4)
        .visit_switch("s", SwitchKind::Disconnector, false, 2, 3)
        .visit_switch("d2", SwitchKind::Disconnector, false, 1, 3)
        .visit_switch("b2", SwitchKind::Breaker, false, 3, 5)
        .visit_switch("c", SwitchKind::Disconnector, false, 0, 1);
    builder
}

/// Busbar then `len` switches of random kind in series up to a line
fn random_bay(rng: &mut StdRng, len: u32, direction: Direction) -> GraphBuilder {
    let mut builder = GraphBuilder::new("vl");
    builder
        .visit_bus(0, "bbs", Some((1, 1)))
        .visit_feeder(len, "l", ComponentType::Line, 1, direction);
    for i in 0..len {
        let kind = if rng.gen_bool(0.5) {
            SwitchKind::Breaker
        } else {
            SwitchKind::Disconnector
        };
        builder.visit_switch(&format!("sw{i}"), kind, false, i, i + 1);
    }
    builder
}

fn node_ids(g: &Graph, nodes: &[sld_core::NodeIndex]) -> BTreeSet<String> {
    nodes.iter().map(|&n| g.node(n).id.clone()).collect()
}

/// Every non-bus node belongs to exactly one cell, the one it points to.
/// Shunt ends are shared between their extern cell and the shunt cell;
/// busbars are listed by every cell touching them.
fn assert_partition(g: &Graph) {
    for &n in g.nodes() {
        let node = g.node(n);
        if node.is_bus() {
            assert_eq!(node.cell, None, "busbar {} owned by a cell", node.id);
            assert!(g.cells().any(|c| c.nodes.contains(&n)), "busbar {}", node.id);
            continue;
        }
        let owners: Vec<_> = g
            .cells()
            .filter(|c| c.nodes.contains(&n))
            .map(|c| c.id)
            .collect();
        if node.node_type() == NodeType::Shunt {
            assert_eq!(owners.len(), 2, "shunt end {}", node.id);
        } else {
            assert_eq!(owners.len(), 1, "node {}", node.id);
        }
        let owner = node.cell.unwrap_or_else(|| panic!("node {} has no cell", node.id));
        assert!(owners.contains(&owner));
    }
}

/// The leaves of every cell's block tree cover exactly the cell's nodes
fn assert_block_trees(g: &Graph) {
    for cell in g.cells() {
        let root = cell.root.unwrap_or_else(|| panic!("cell {:?} has no root", cell.id));
        assert_eq!(g.block(root).parent, None);
        let leaves = g.primary_leaves(root);
        assert!(leaves
            .iter()
            .all(|&b| g.block(b).kind() == BlockKind::Primary));
        for &leaf in &leaves {
            if let Some(parent) = g.block(leaf).parent {
                assert!(g.block(parent).sub_blocks().contains(&leaf));
            }
        }
        assert_eq!(
            node_ids(g, &g.block_nodes(root)),
            node_ids(g, &cell.nodes),
            "cell {:?}",
            cell.id
        );
    }
}

/// Serially merged blocks account for every edge at their common node
fn assert_serial_cardinality(g: &Graph, block: BlockId) {
    let b = g.block(block);
    if let BlockContent::Serial { lower, upper, .. } = b.content {
        let common = g.block_end(lower);
        assert_eq!(g.block_start(upper), common);
        assert_eq!(
            g.degree(common),
            g.block_cardinality(lower, common) + g.block_cardinality(upper, common),
            "serial merge at {}",
            g.node(common).id
        );
    }
    for sub in b.sub_blocks() {
        assert_serial_cardinality(g, sub);
    }
}

/// Test that cells partition the graph and block trees cover their cells
#[test]
fn test_partition_and_block_trees() {
    init_tracing();
    let mut g = shunted_pair().build(&mut Diagnostics::new()).unwrap();
    VoltageLevelLayout::default().run(&mut g).unwrap();

    assert_eq!(g.cell_counts().get(&CellKind::Shunt), Some(&1));
    assert_partition(&g);
    assert_block_trees(&g);
}

/// Test that random series bays merge exactly and stay in one column on the hinted side
#[test]
fn test_random_series_bays() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..40 {
        let len = rng.gen_range(2..=10);
        let direction = if rng.gen_bool(0.5) {
            Direction::Top
        } else {
            Direction::Bottom
        };
        let mut g = random_bay(&mut rng, len, direction)
            .build(&mut Diagnostics::new())
            .unwrap();
        VoltageLevelLayout::default().run(&mut g).unwrap();

        let cells = g.cell_ids_of_kind(CellKind::Extern);
        assert_eq!(cells.len(), 1, "bay of {len} switches");
        assert_eq!(g.cell_count(), 1);
        assert_partition(&g);
        assert_block_trees(&g);

        let root = g.cell(cells[0]).root.unwrap();
        assert_eq!(g.block(root).kind(), BlockKind::Serial);
        assert_serial_cardinality(&g, root);

        let bus_y = g.node(g.node_index("bbs").unwrap()).y;
        for &n in g.nodes() {
            let node = g.node(n);
            if !node.is_bus() {
                assert_eq!(node.x, 25.0, "node {} off the bay column", node.id);
            }
        }
        let feeder_y = g.node(g.node_index("l").unwrap()).y;
        match direction {
            Direction::Top => assert!(feeder_y < bus_y),
            _ => assert!(feeder_y > bus_y),
        }
    }
}

/// Test that detecting cells on two builds of one level gives the same cells
#[test]
fn test_detection_is_repeatable() {
    let builder = shunted_pair();
    let signature = || {
        let mut g = builder.build(&mut Diagnostics::new()).unwrap();
        let mut ctx = LayoutContext::new();
        ImplicitCellDetector::default()
            .detect_cells(&mut g, &mut ctx)
            .unwrap();
        g.signature_sorted_cells_content()
    };
    let first = signature();
    assert!(!first.is_empty());
    assert_eq!(first, signature());
}

/// Test that two layout runs place every node at the same coordinates
#[test]
fn test_layout_is_deterministic() {
    let builder = shunted_pair();
    let coordinates = || {
        let mut g = builder.build(&mut Diagnostics::new()).unwrap();
        VoltageLevelLayout::default().run(&mut g).unwrap();
        g.nodes()
            .iter()
            .map(|&n| {
                let node = g.node(n);
                (node.id.clone(), node.x.to_bits(), node.y.to_bits(), node.rotated)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(coordinates(), coordinates());
}
