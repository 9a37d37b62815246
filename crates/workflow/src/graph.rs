//! Dependency graph derived from a workflow definition.
//!
//! Wraps a petgraph `DiGraph` with the lookups the engine needs: adjacency
//! by connection index, predecessors/successors, and a Kahn topological
//! order that breaks ties by node id so dispatch order is deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use weft_core::NodeId;

use crate::definition::WorkflowDefinition;
use crate::error::WorkflowError;

/// Adjacency, reverse adjacency and topological order over a workflow.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, usize>,
    indices: HashMap<NodeId, NodeIndex>,
    /// Outgoing connection indices (into `WorkflowDefinition::connections`),
    /// in authoring order.
    outgoing: HashMap<NodeId, Vec<usize>>,
    /// Incoming connection indices, in authoring order.
    incoming: HashMap<NodeId, Vec<usize>>,
    topo: Vec<NodeId>,
    topo_index: HashMap<NodeId, usize>,
}

impl DependencyGraph {
    /// Build the dependency graph, verifying acyclicity via Kahn's
    /// algorithm. Ties between simultaneously-available nodes are broken
    /// by node id, so the resulting order is stable across runs.
    pub fn from_definition(definition: &WorkflowDefinition) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            let idx = graph.add_node(node.id);
            indices.insert(node.id, idx);
        }

        let mut outgoing: HashMap<NodeId, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (conn_idx, conn) in definition.connections.iter().enumerate() {
            let source = *indices
                .get(&conn.source)
                .ok_or(WorkflowError::UnknownEndpoint(conn.source))?;
            let target = *indices
                .get(&conn.target)
                .ok_or(WorkflowError::UnknownEndpoint(conn.target))?;
            graph.add_edge(source, target, conn_idx);
            outgoing.entry(conn.source).or_default().push(conn_idx);
            incoming.entry(conn.target).or_default().push(conn_idx);
        }

        // Kahn with a BTreeSet frontier: pops in node-id order.
        let mut in_degree: HashMap<NodeId, usize> = definition
            .nodes
            .iter()
            .map(|n| {
                let unique_preds: HashSet<NodeId> = incoming
                    .get(&n.id)
                    .map(|edges| {
                        edges
                            .iter()
                            .map(|&i| definition.connections[i].source)
                            .collect()
                    })
                    .unwrap_or_default();
                (n.id, unique_preds.len())
            })
            .collect();

        let mut frontier: BTreeSet<NodeId> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut topo = Vec::with_capacity(definition.nodes.len());
        while let Some(&id) = frontier.iter().next() {
            frontier.remove(&id);
            topo.push(id);

            let successors: BTreeSet<NodeId> = outgoing
                .get(&id)
                .map(|edges| {
                    edges
                        .iter()
                        .map(|&i| definition.connections[i].target)
                        .collect()
                })
                .unwrap_or_default();
            for succ in successors {
                let deg = in_degree
                    .get_mut(&succ)
                    .ok_or(WorkflowError::UnknownEndpoint(succ))?;
                *deg -= 1;
                if *deg == 0 {
                    frontier.insert(succ);
                }
            }
        }

        if topo.len() != definition.nodes.len() {
            let mut stuck: Vec<String> = in_degree
                .iter()
                .filter(|&(_, &deg)| deg > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            stuck.sort();
            return Err(WorkflowError::CycleDetected(stuck.join(", ")));
        }

        let topo_index = topo.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        Ok(Self {
            graph,
            indices,
            outgoing,
            incoming,
            topo,
            topo_index,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Connection indices leaving `node`, in authoring order.
    #[must_use]
    pub fn outgoing(&self, node: NodeId) -> &[usize] {
        self.outgoing.get(&node).map_or(&[], Vec::as_slice)
    }

    /// Connection indices entering `node`, in authoring order.
    #[must_use]
    pub fn incoming(&self, node: NodeId) -> &[usize] {
        self.incoming.get(&node).map_or(&[], Vec::as_slice)
    }

    /// Distinct predecessor node ids.
    #[must_use]
    pub fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.indices.get(&node) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .filter_map(|n| {
                let id = self.graph[n];
                seen.insert(id).then_some(id)
            })
            .collect()
    }

    /// Distinct successor node ids.
    #[must_use]
    pub fn successors(&self, node: NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.indices.get(&node) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .filter_map(|n| {
                let id = self.graph[n];
                seen.insert(id).then_some(id)
            })
            .collect()
    }

    /// Nodes with no predecessors, in topological order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.topo
            .iter()
            .copied()
            .filter(|&id| self.incoming(id).is_empty())
            .collect()
    }

    /// Nodes with no successors, in topological order.
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<NodeId> {
        self.topo
            .iter()
            .copied()
            .filter(|&id| self.outgoing(id).is_empty())
            .collect()
    }

    /// The full topological order.
    #[must_use]
    pub fn topo_order(&self) -> &[NodeId] {
        &self.topo
    }

    /// Position of `node` in the topological order.
    #[must_use]
    pub fn topo_index(&self, node: NodeId) -> Option<usize> {
        self.topo_index.get(&node).copied()
    }

    /// All nodes reachable from `seeds` by following outgoing edges,
    /// excluding the seeds themselves unless re-reached.
    #[must_use]
    pub fn downstream_closure(&self, seeds: &[NodeId]) -> HashSet<NodeId> {
        let mut closure = HashSet::new();
        let mut stack: Vec<NodeId> = seeds.to_vec();
        while let Some(id) = stack.pop() {
            for succ in self.successors(id) {
                if closure.insert(succ) {
                    stack.push(succ);
                }
            }
        }
        // seeds are included only when a path re-reaches them (cannot
        // happen in an acyclic graph), so remove for clarity
        for seed in seeds {
            closure.remove(seed);
        }
        closure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::node::{NodeDefinition, NodeKind};
    use pretty_assertions::assert_eq;
    use weft_core::WorkflowId;

    fn workflow(nodes: Vec<NodeDefinition>, connections: Vec<Connection>) -> WorkflowDefinition {
        let mut wf = WorkflowDefinition::new(WorkflowId::v4(), "test");
        wf.nodes = nodes;
        wf.connections = connections;
        wf
    }

    fn node(id: NodeId, name: &str) -> NodeDefinition {
        NodeDefinition::new(id, name, NodeKind::Action, "set")
    }

    #[test]
    fn linear_topo_order() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c")],
            vec![Connection::new(a, b), Connection::new(b, c)],
        );
        let graph = DependencyGraph::from_definition(&wf).unwrap();
        assert_eq!(graph.topo_order(), &[a, b, c]);
        assert_eq!(graph.topo_index(a), Some(0));
        assert_eq!(graph.topo_index(c), Some(2));
        assert_eq!(graph.entry_nodes(), vec![a]);
        assert_eq!(graph.exit_nodes(), vec![c]);
    }

    #[test]
    fn diamond_adjacency() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let d = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c"), node(d, "d")],
            vec![
                Connection::new(a, b),
                Connection::new(a, c),
                Connection::new(b, d),
                Connection::new(c, d),
            ],
        );
        let graph = DependencyGraph::from_definition(&wf).unwrap();

        let mut preds = graph.predecessors(d);
        preds.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(preds, expected);

        assert_eq!(graph.incoming(d).len(), 2);
        assert_eq!(graph.outgoing(a).len(), 2);
        assert_eq!(graph.topo_order()[0], a);
        assert_eq!(graph.topo_order()[3], d);
    }

    #[test]
    fn topo_ties_break_by_node_id() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        // b and c are both roots; the smaller id must come first.
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c")],
            vec![Connection::new(b, a), Connection::new(c, a)],
        );
        let graph = DependencyGraph::from_definition(&wf).unwrap();
        let (first, second) = if b < c { (b, c) } else { (c, b) };
        assert_eq!(graph.topo_order(), &[first, second, a]);
    }

    #[test]
    fn cycle_detected() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b")],
            vec![Connection::new(a, b), Connection::new(b, a)],
        );
        let err = DependencyGraph::from_definition(&wf).unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)));
    }

    #[test]
    fn parallel_edges_counted_once_for_in_degree() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b")],
            vec![
                Connection::new(a, b).with_input_key("input"),
                Connection::new(a, b).with_input_key("input"),
            ],
        );
        let graph = DependencyGraph::from_definition(&wf).unwrap();
        assert_eq!(graph.topo_order(), &[a, b]);
        assert_eq!(graph.incoming(b).len(), 2);
        assert_eq!(graph.predecessors(b), vec![a]);
    }

    #[test]
    fn downstream_closure_from_seed() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let d = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c"), node(d, "d")],
            vec![
                Connection::new(a, b),
                Connection::new(b, c),
                Connection::new(a, d),
            ],
        );
        let graph = DependencyGraph::from_definition(&wf).unwrap();
        let closure = graph.downstream_closure(&[b]);
        assert!(closure.contains(&c));
        assert!(!closure.contains(&d));
        assert!(!closure.contains(&b));
    }

    #[test]
    fn single_node_graph() {
        let a = NodeId::v4();
        let wf = workflow(vec![node(a, "a")], vec![]);
        let graph = DependencyGraph::from_definition(&wf).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.entry_nodes(), vec![a]);
        assert_eq!(graph.exit_nodes(), vec![a]);
        assert!(graph.predecessors(a).is_empty());
        assert!(graph.successors(a).is_empty());
    }
}
