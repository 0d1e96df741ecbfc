use crate::graph::Graph;
use crate::node::NodeType;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;

/// Summary statistics of a voltage-level graph (node kinds, degrees, components).
#[derive(Debug)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub connected_components: usize,
    pub nodes_by_type: BTreeMap<NodeType, usize>,
    pub max_degree: usize,
    pub cell_count: usize,
}

/// Count nodes per kind, edges, components and cells.
pub fn graph_stats(graph: &Graph) -> Result<GraphStats> {
    let mut nodes_by_type = BTreeMap::new();
    let mut max_degree = 0;
    for &n in graph.nodes() {
        *nodes_by_type.entry(graph.node_type(n)).or_insert(0) += 1;
        max_degree = max_degree.max(graph.degree(n));
    }
    let connected_components = graph.connected_components(graph.nodes()).len();
    Ok(GraphStats {
        node_count: graph.node_count(),
        edge_count: graph.edge_count(),
        connected_components,
        nodes_by_type,
        max_degree,
        cell_count: graph.cell_count(),
    })
}

/// Export the topology to a DOT string (Graphviz), one cluster per cell.
pub fn export_graph(graph: &Graph, format: &str) -> Result<String> {
    match format.to_ascii_lowercase().as_str() {
        "graphviz" | "dot" => Ok(render_dot(graph)),
        other => Err(anyhow!("unsupported graph export format '{other}'")),
    }
}

fn render_dot(graph: &Graph) -> String {
    let mut buffer = String::new();
    buffer.push_str(&format!("graph \"{}\" {{\n", sanitize_label(graph.id())));
    for cell in graph.cells() {
        buffer.push_str(&format!("  subgraph cluster_{} {{\n", cell.id.value()));
        buffer.push_str(&format!("    label=\"{}\";\n", cell.kind));
        for &n in &cell.nodes {
            if graph.node(n).cell == Some(cell.id) {
                buffer.push_str(&format!("    n{};\n", n.index()));
            }
        }
        buffer.push_str("  }\n");
    }
    for &n in graph.nodes() {
        let node = graph.node(n);
        let shape = match node.node_type() {
            NodeType::Bus => "box",
            NodeType::Feeder => "triangle",
            NodeType::Switch => "square",
            _ => "point",
        };
        buffer.push_str(&format!(
            "  n{} [label=\"{}\", shape={}];\n",
            n.index(),
            sanitize_label(&node.label),
            shape
        ));
    }
    for (a, b) in graph.edge_list() {
        if let (Some(na), Some(nb)) = (graph.node_index(&a), graph.node_index(&b)) {
            buffer.push_str(&format!("  n{} -- n{};\n", na.index(), nb.index()));
        }
    }
    buffer.push('}');
    buffer
}

fn sanitize_label(label: &str) -> String {
    label.replace('"', "\\\"")
}
