//! Connectivity analysis over the bus-bus graph.

use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashSet, VecDeque};

/// One connected group of buses together with the branches that join them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Sorted bus indices
    pub buses: Vec<usize>,
    /// Sorted branch indices with both terminals inside `buses`
    pub branches: Vec<usize>,
}

/// Labels connected components (breadth-first search) over active buses.
///
/// `edges[k]` is `Some((from, to))` for an active branch and `None` for a
/// branch that is switched off. Inactive buses never belong to a component and
/// branches touching them are dropped. Components are ordered by their
/// smallest bus index, so the output is deterministic.
pub fn connected_components(
    bus_active: &[bool],
    edges: &[Option<(usize, usize)>],
) -> Vec<Component> {
    let n = bus_active.len();
    let mut graph: UnGraph<usize, usize> = UnGraph::with_capacity(n, edges.len());
    let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();

    for (k, edge) in edges.iter().enumerate() {
        if let Some((f, t)) = *edge {
            if f < n && t < n && bus_active[f] && bus_active[t] {
                graph.add_edge(nodes[f], nodes[t], k);
            }
        }
    }

    let mut visited = HashSet::new();
    let mut components = Vec::new();
    for start in graph.node_indices() {
        if visited.contains(&start) || !bus_active[graph[start]] {
            continue;
        }
        let mut queue = VecDeque::new();
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            members.push(graph[node]);
            for neighbor in graph.neighbors(node) {
                if !visited.contains(&neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    // Branch ownership follows the "from" bus.
    let mut owner = vec![usize::MAX; n];
    for (c, members) in components.iter().enumerate() {
        for &bus in members {
            owner[bus] = c;
        }
    }
    let mut branch_sets = vec![Vec::new(); components.len()];
    for edge in graph.edge_indices() {
        if let Some((a, _)) = graph.edge_endpoints(edge) {
            let c = owner[graph[a]];
            if c != usize::MAX {
                branch_sets[c].push(graph[edge]);
            }
        }
    }

    components
        .into_iter()
        .zip(branch_sets)
        .map(|(buses, mut branches)| {
            branches.sort_unstable();
            Component { buses, branches }
        })
        .collect()
}
