//! Dependency graph over inspected modules.
//!
//! Nodes live in an arena and are addressed by stable indices; edges are
//! recorded inside the source node as index pairs, so cyclic reference
//! chains need no owning back-pointers. Nodes are linked during analysis and
//! frozen (degrees and weights computed) before the graph reaches a
//! consumer.

use serde::Serialize;

use crate::model::ModuleData;

/// Stable arena index of a node within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub module: ModuleData,
    /// Outbound dependencies, one entry per bound reference.
    pub deps: Vec<NodeId>,
    pub incoming: usize,
    pub outgoing: usize,
    /// `ln(incoming + outgoing + 1)`.
    pub weight: f64,
    /// Binding degradations detected for this node's references.
    pub errors: Vec<String>,
}

impl GraphNode {
    fn new(module: ModuleData) -> Self {
        Self { module, deps: Vec::new(), incoming: 0, outgoing: 0, weight: 0.0, errors: Vec::new() }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add_node(&mut self, module: ModuleData) -> NodeId {
        self.nodes.push(GraphNode::new(module));
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Compute degrees and weights from the recorded edges. Called once,
    /// after linking, before the graph is handed out.
    pub fn finalize(&mut self) {
        let mut incoming = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for dep in &node.deps {
                incoming[dep.0] += 1;
            }
        }
        for (index, node) in self.nodes.iter_mut().enumerate() {
            node.outgoing = node.deps.len();
            node.incoming = incoming[index];
            node.weight = ((node.incoming + node.outgoing + 1) as f64).ln();
        }
    }
}
