use std::collections::HashMap;
use std::fmt::Write as _;

use super::*;

/// Registry entry describing one node.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Operation that created the node, such as `map` or `window`.
    pub label: String,
    pub slide_ms: i64,
}

/// An edge from a parent to the node reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEdge {
    pub source: NodeId,
    pub target: NodeId,
}

/// Descriptors and parent edges of every node built in a context.
///
/// Ids are handed out in construction order, so rebuilding the same program
/// yields the same ids.
#[derive(Debug, Clone, Default)]
pub struct StreamGraph {
    pub nodes: HashMap<NodeId, NodeDescriptor>,
    pub edges: Vec<StreamEdge>,
    next_id: NodeId,
}

impl StreamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node reading from `parents` and return its id.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        label: impl Into<String>,
        slide_ms: i64,
        parents: &[NodeId],
    ) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeDescriptor {
                id,
                kind,
                label: label.into(),
                slide_ms,
            },
        );
        for &source in parents {
            self.edges.push(StreamEdge { source, target: id });
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeDescriptor> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes reading from `node_id`.
    pub fn downstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.source == node_id)
            .map(|e| e.target)
            .collect()
    }

    /// Parents of `node_id`, in argument order.
    pub fn upstream(&self, node_id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target == node_id)
            .map(|e| e.source)
            .collect()
    }

    /// Input nodes, in id order.
    pub fn sources(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .keys()
            .copied()
            .filter(|id| self.upstream(*id).is_empty())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Nodes on the longest parent path ending at `node_id`, counting both ends.
    pub fn depth(&self, node_id: NodeId) -> usize {
        let mut memo = HashMap::new();
        self.depth_memo(node_id, &mut memo)
    }

    fn depth_memo(&self, node_id: NodeId, memo: &mut HashMap<NodeId, usize>) -> usize {
        if let Some(&d) = memo.get(&node_id) {
            return d;
        }
        let d = 1 + self
            .upstream(node_id)
            .into_iter()
            .map(|p| self.depth_memo(p, memo))
            .max()
            .unwrap_or(0);
        memo.insert(node_id, d);
        d
    }

    /// Topological order (Kahn's algorithm), smallest ready id first.
    pub fn topo_sort(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut adj: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for &id in self.nodes.keys() {
            in_degree.entry(id).or_insert(0);
            adj.entry(id).or_default();
        }
        for edge in &self.edges {
            *in_degree.entry(edge.target).or_insert(0) += 1;
            adj.entry(edge.source).or_default().push(edge.target);
        }

        let mut ready: Vec<NodeId> = in_degree
            .iter()
            .filter(|entry| *entry.1 == 0)
            .map(|entry| *entry.0)
            .collect();
        // Popped from the back, so keep it sorted descending.
        ready.sort_unstable_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop() {
            order.push(node);
            if let Some(next) = adj.get(&node) {
                for target in next {
                    if let Some(deg) = in_degree.get_mut(target) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push(*target);
                            ready.sort_unstable_by(|a, b| b.cmp(a));
                        }
                    }
                }
            }
        }
        order
    }

    /// One line per node in topological order.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        for id in self.topo_sort() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let _ = write!(
                out,
                "#{} {} [{}] slide={} ms",
                node.id, node.label, node.kind, node.slide_ms
            );
            let parents = self.upstream(id);
            if !parents.is_empty() {
                let list: Vec<String> = parents.iter().map(|p| format!("#{p}")).collect();
                let _ = write!(out, " <- {}", list.join(", "));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
#[path = "tests/stream_graph_tests.rs"]
mod tests;
