//! Connectivity graph storage, adjacency and component queries.

use sld_core::{
    export_graph, graph_stats, Cell, CellId, CellKind, ComponentType, Diagnostics, Direction,
    Graph, Node, NodeType, SldError, SwitchKind,
};

/// bbs - d - f - b - l, plus a second feeder hanging off f through b2
fn forked_bay() -> Graph {
    let mut g = Graph::new("vl");
    let bbs = g.add_node(Node::bus("bbs")).unwrap();
    let d = g.add_node(Node::switch("d", SwitchKind::Disconnector, false)).unwrap();
    let f = g.add_node(Node::fictitious("f")).unwrap();
    let b = g.add_node(Node::switch("b", SwitchKind::Breaker, false)).unwrap();
    let l = g
        .add_node(Node::feeder("l", ComponentType::Line, 1, Direction::Top))
        .unwrap();
    let b2 = g.add_node(Node::switch("b2", SwitchKind::Breaker, true)).unwrap();
    let l2 = g
        .add_node(Node::feeder("l2", ComponentType::Load, 2, Direction::Bottom))
        .unwrap();
    for (x, y) in [(bbs, d), (d, f), (f, b), (b, l), (f, b2), (b2, l2)] {
        g.add_edge(x, y);
    }
    g
}

fn ix(g: &Graph, id: &str) -> sld_core::NodeIndex {
    g.node_index(id).unwrap()
}

/// Test that duplicate node ids are rejected as construction errors
#[test]
fn test_duplicate_id_rejected() {
    let mut g = forked_bay();
    let result = g.add_node(Node::fictitious("f"));
    assert!(matches!(result, Err(SldError::Graph(_))));
    assert!(matches!(g.require_node("missing"), Err(SldError::Graph(_))));
}

/// Test that removing a node also drops its edges and keeps other handles valid
#[test]
fn test_remove_node_detaches_edges() {
    let mut g = forked_bay();
    let f = ix(&g, "f");
    let d = ix(&g, "d");
    let l = ix(&g, "l");
    assert_eq!(g.edge_count(), 6);

    let removed = g.remove_node(f).unwrap();
    assert_eq!(removed.id, "f");
    assert_eq!(g.edge_count(), 3);
    assert!(g.node_index("f").is_none());
    assert_eq!(g.degree(d), 1);
    assert_eq!(g.node(l).id, "l");
}

/// Test that only the oldest of two parallel edges is removed
#[test]
fn test_remove_edge_first_match() {
    let mut g = Graph::new("vl");
    let a = g.add_node(Node::fictitious("a")).unwrap();
    let b = g.add_node(Node::fictitious("b")).unwrap();
    g.add_edge(a, b);
    g.add_edge(a, b);
    assert_eq!(g.adjacent_nodes(a), vec![b, b]);

    assert!(g.remove_edge(b, a));
    assert_eq!(g.degree(a), 1);
    assert!(g.remove_edge(a, b));
    assert!(!g.remove_edge(a, b));
}

/// Test that neighbours come back in edge insertion order
#[test]
fn test_adjacency_order() {
    let g = forked_bay();
    let f = ix(&g, "f");
    let ids: Vec<&str> = g
        .adjacent_nodes(f)
        .into_iter()
        .map(|n| g.node(n).id.as_str())
        .collect();
    assert_eq!(ids, vec!["d", "b", "b2"]);
}

/// Test that components only use edges inside the subset
#[test]
fn test_connected_components_of_subset() {
    let g = forked_bay();
    let subset: Vec<_> = ["bbs", "d", "b", "l", "b2", "l2"]
        .iter()
        .map(|id| ix(&g, id))
        .collect();
    let components = g.connected_components(&subset);
    assert_eq!(components.len(), 3);
    let mut sizes: Vec<usize> = components.iter().map(|c| c.len()).collect();
    sizes.sort();
    assert_eq!(sizes, vec![2, 2, 2]);

    let all = g.connected_components(g.nodes());
    assert_eq!(all.len(), 1);
}

/// Test that a disconnected graph is a warning, not an error
#[test]
fn test_disconnection_is_a_warning() {
    let mut g = forked_bay();
    g.add_node(Node::bus("lonely")).unwrap();
    let mut diag = Diagnostics::new();
    assert!(!g.check_connected(&mut diag));
    assert_eq!(diag.warning_count(), 1);
    assert!(diag.issues[0].message.contains("2 connected components"));
}

/// Test that a cell owns its non-bus nodes and shows up in the signature
#[test]
fn test_cell_ownership_and_signature() {
    let mut g = forked_bay();
    let nodes = g.nodes().to_vec();
    let cell = g.add_cell(Cell::new(CellId::new(3), CellKind::Extern, nodes));

    assert_eq!(g.node(ix(&g, "bbs")).cell, None);
    assert_eq!(g.node(ix(&g, "d")).cell, Some(cell));
    assert_eq!(g.cell_buses(cell), vec![ix(&g, "bbs")]);
    assert_eq!(
        g.signature_sorted_cells_content(),
        vec!["EXTERN[b, b2, bbs, d, f, l, l2]".to_string()]
    );
    assert_eq!(g.cell_counts().get(&CellKind::Extern), Some(&1));
}

/// Test that statistics and DOT export reflect the topology
#[test]
fn test_stats_and_export() {
    let g = forked_bay();
    let stats = graph_stats(&g).unwrap();
    assert_eq!(stats.node_count, 7);
    assert_eq!(stats.edge_count, 6);
    assert_eq!(stats.connected_components, 1);
    assert_eq!(stats.max_degree, 3);
    assert_eq!(stats.nodes_by_type.get(&NodeType::Feeder), Some(&2));

    let dot = export_graph(&g, "dot").unwrap();
    assert!(dot.starts_with("graph \"vl\""));
    assert!(export_graph(&g, "svg").is_err());
}
