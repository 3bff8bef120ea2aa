//! Signal processing graph
//!
//! DAG topology using petgraph's StableGraph. Handles node/edge management,
//! topological ordering, and pull-based block rendering.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::primitives::{AudioBuffer, BoxedNode, NodeDescriptor, Port, ProcessContext};

/// An edge in the signal graph, connecting ports between nodes
#[derive(Debug, Clone)]
struct Edge {
    source_port: String,
    dest_port: String,
}

impl Edge {
    fn new(source_port: impl Into<String>, dest_port: impl Into<String>) -> Self {
        Self {
            source_port: source_port.into(),
            dest_port: dest_port.into(),
        }
    }
}

/// Errors that can occur during graph operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("port not found: {node}.{port}")]
    PortNotFound { node: Uuid, port: String },

    #[error("cannot feed a {output}-channel output into a {input}-channel input")]
    ChannelMismatch { output: u8, input: u8 },

    #[error("cycle detected in graph")]
    CycleDetected,
}

/// Serializable snapshot of a graph edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub source_id: Uuid,
    pub source_port: String,
    pub dest_id: Uuid,
    pub dest_port: String,
}

/// Serializable snapshot of the entire graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<EdgeSnapshot>,
}

/// The signal processing graph
///
/// Wraps petgraph's StableGraph with Uuid-based node lookup and
/// cached topological ordering.
pub struct Graph {
    inner: StableGraph<BoxedNode, Edge>,
    index_map: HashMap<Uuid, NodeIndex>,
    topo_order: Option<Vec<NodeIndex>>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            index_map: HashMap::new(),
            topo_order: None,
        }
    }

    /// Add a node to the graph, returning its id
    pub fn add_node(&mut self, node: BoxedNode) -> Uuid {
        let id = node.descriptor().id;
        let index = self.inner.add_node(node);
        self.index_map.insert(id, index);
        self.invalidate_topo();
        id
    }

    /// Remove a node (and every edge touching it) from the graph
    pub fn remove_node(&mut self, id: Uuid) -> Option<BoxedNode> {
        let index = self.index_map.remove(&id)?;
        let node = self.inner.remove_node(index)?;
        self.invalidate_topo();
        Some(node)
    }

    /// Connect two nodes by their port names
    pub fn connect(
        &mut self,
        source_id: Uuid,
        source_port: &str,
        dest_id: Uuid,
        dest_port: &str,
    ) -> Result<EdgeIndex, GraphError> {
        let source_idx = self.index_of(source_id).ok_or(GraphError::NodeNotFound(source_id))?;
        let dest_idx = self.index_of(dest_id).ok_or(GraphError::NodeNotFound(dest_id))?;

        self.validate_connection(source_id, source_port, dest_id, dest_port)?;

        let edge_idx = self
            .inner
            .add_edge(source_idx, dest_idx, Edge::new(source_port, dest_port));

        if self.has_cycle() {
            self.inner.remove_edge(edge_idx);
            return Err(GraphError::CycleDetected);
        }

        self.invalidate_topo();
        Ok(edge_idx)
    }

    /// Remove every edge into or out of a node. Returns how many were removed.
    pub fn disconnect_all(&mut self, id: Uuid) -> usize {
        let Some(idx) = self.index_of(id) else {
            return 0;
        };

        let edges: Vec<EdgeIndex> = self
            .inner
            .edges_directed(idx, Direction::Incoming)
            .chain(self.inner.edges_directed(idx, Direction::Outgoing))
            .map(|e| e.id())
            .collect();

        for edge in &edges {
            self.inner.remove_edge(*edge);
        }
        if !edges.is_empty() {
            self.invalidate_topo();
        }
        edges.len()
    }

    /// Get a reference to a node by UUID
    pub fn node(&self, id: Uuid) -> Option<&BoxedNode> {
        let index = self.index_map.get(&id)?;
        self.inner.node_weight(*index)
    }

    /// Get a mutable reference to a node by UUID
    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut BoxedNode> {
        let index = self.index_map.get(&id)?;
        self.inner.node_weight_mut(*index)
    }

    /// Get all node UUIDs in the graph
    pub fn node_ids(&self) -> Vec<Uuid> {
        self.index_map.keys().copied().collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index_map.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Get the cached topological processing order, computing if necessary
    fn processing_order(&mut self) -> Result<&[NodeIndex], GraphError> {
        if self.topo_order.is_none() {
            let order = toposort(&self.inner, None).map_err(|_| GraphError::CycleDetected)?;
            self.topo_order = Some(order);
        }
        Ok(self.topo_order.as_deref().unwrap_or(&[]))
    }

    fn index_of(&self, id: Uuid) -> Option<NodeIndex> {
        self.index_map.get(&id).copied()
    }

    /// Render one block and return what arrives at `sink`'s first output.
    ///
    /// Nodes run in topological order. Each input port receives the sum of
    /// every edge feeding it. A node that fails contributes silence for the
    /// block rather than aborting the pass.
    pub fn render(&mut self, ctx: &ProcessContext, sink: Uuid) -> Result<AudioBuffer, GraphError> {
        let sink_idx = self.index_of(sink).ok_or(GraphError::NodeNotFound(sink))?;
        let order = self.processing_order()?.to_vec();
        let mut produced: HashMap<NodeIndex, Vec<AudioBuffer>> = HashMap::new();

        for idx in order {
            let Some(node) = self.inner.node_weight(idx) else {
                continue;
            };
            let descriptor = node.descriptor();

            let mut inputs = blank_buffers(&descriptor.inputs, ctx.buffer_size);
            for edge in self.inner.edges_directed(idx, Direction::Incoming) {
                let Some(source_outputs) = produced.get(&edge.source()) else {
                    continue;
                };
                let weight = edge.weight();
                let out_pos = self.inner[edge.source()]
                    .descriptor()
                    .outputs
                    .iter()
                    .position(|p| p.name == weight.source_port);
                let in_pos = descriptor
                    .inputs
                    .iter()
                    .position(|p| p.name == weight.dest_port);
                if let (Some(o), Some(i)) = (out_pos, in_pos) {
                    inputs[i].mix(&source_outputs[o], 1.0);
                }
            }
            let mut outputs = blank_buffers(&descriptor.outputs, ctx.buffer_size);

            if let Some(node) = self.inner.node_weight_mut(idx) {
                if let Err(e) = node.process(ctx, &inputs, &mut outputs) {
                    error!("node {} failed: {}", node.descriptor().id, e);
                    outputs.iter_mut().for_each(AudioBuffer::clear);
                }
            }

            produced.insert(idx, outputs);
        }

        Ok(produced
            .remove(&sink_idx)
            .and_then(|outputs| outputs.into_iter().next())
            .unwrap_or_else(|| AudioBuffer::new(ctx.buffer_size, 2)))
    }

    /// Create a serializable snapshot of the graph
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes: Vec<_> = self
            .inner
            .node_weights()
            .map(|node| node.descriptor().clone())
            .collect();

        let edges: Vec<_> = self
            .inner
            .edge_references()
            .filter_map(|e| {
                let source = self.inner.node_weight(e.source())?;
                let target = self.inner.node_weight(e.target())?;
                let edge = e.weight();

                Some(EdgeSnapshot {
                    source_id: source.descriptor().id,
                    source_port: edge.source_port.clone(),
                    dest_id: target.descriptor().id,
                    dest_port: edge.dest_port.clone(),
                })
            })
            .collect();

        GraphSnapshot { nodes, edges }
    }

    fn invalidate_topo(&mut self) {
        self.topo_order = None;
    }

    fn has_cycle(&self) -> bool {
        toposort(&self.inner, None).is_err()
    }

    fn validate_connection(
        &self,
        source_id: Uuid,
        source_port: &str,
        dest_id: Uuid,
        dest_port: &str,
    ) -> Result<(), GraphError> {
        let source_node = self.node(source_id).ok_or(GraphError::NodeNotFound(source_id))?;
        let dest_node = self.node(dest_id).ok_or(GraphError::NodeNotFound(dest_id))?;

        let source_port_def = find_port(&source_node.descriptor().outputs, source_port).ok_or(
            GraphError::PortNotFound {
                node: source_id,
                port: source_port.to_string(),
            },
        )?;

        let dest_port_def = find_port(&dest_node.descriptor().inputs, dest_port).ok_or(
            GraphError::PortNotFound {
                node: dest_id,
                port: dest_port.to_string(),
            },
        )?;

        // Mono may feed anything; wider outputs need a matching input
        if source_port_def.channels != 1 && source_port_def.channels != dest_port_def.channels {
            return Err(GraphError::ChannelMismatch {
                output: source_port_def.channels,
                input: dest_port_def.channels,
            });
        }

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

fn find_port<'a>(ports: &'a [Port], name: &str) -> Option<&'a Port> {
    ports.iter().find(|p| p.name == name)
}

fn blank_buffers(ports: &[Port], frames: usize) -> Vec<AudioBuffer> {
    ports
        .iter()
        .map(|p| AudioBuffer::new(frames, p.channels))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{Node, NodeError, NodeKind};

    /// Writes a constant into its output, adding whatever arrives on input
    struct TestNode {
        descriptor: NodeDescriptor,
        value: f32,
    }

    impl TestNode {
        fn new(name: &str, channels: u8) -> Self {
            Self {
                descriptor: NodeDescriptor::new(name, NodeKind::Gain)
                    .with_input(Port::new("input", channels))
                    .with_output(Port::new("output", channels)),
                value: 0.0,
            }
        }

        fn source(name: &str, value: f32) -> Self {
            Self {
                descriptor: NodeDescriptor::new(name, NodeKind::Oscillator)
                    .with_output(Port::new("output", 1)),
                value,
            }
        }

        fn sink(name: &str) -> Self {
            Self {
                descriptor: NodeDescriptor::new(name, NodeKind::Destination)
                    .with_input(Port::new("input", 2))
                    .with_output(Port::new("output", 2)),
                value: 0.0,
            }
        }

        fn id(&self) -> Uuid {
            self.descriptor.id
        }
    }

    impl Node for TestNode {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.descriptor
        }

        fn process(
            &mut self,
            _ctx: &ProcessContext,
            inputs: &[AudioBuffer],
            outputs: &mut [AudioBuffer],
        ) -> Result<(), NodeError> {
            for out in outputs.iter_mut() {
                out.samples.fill(self.value);
                if let Some(input) = inputs.first() {
                    out.mix(input, 1.0);
                }
            }
            Ok(())
        }
    }

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48000,
            buffer_size: 4,
        }
    }

    #[test]
    fn test_add_and_connect() {
        let mut graph = Graph::new();
        let source = TestNode::source("src", 0.5);
        let sink = TestNode::sink("sink");
        let (source_id, sink_id) = (source.id(), sink.id());

        graph.add_node(Box::new(source));
        graph.add_node(Box::new(sink));
        assert_eq!(graph.node_count(), 2);

        assert!(graph.connect(source_id, "output", sink_id, "input").is_ok());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_processing_order() {
        let mut graph = Graph::new();
        let source = TestNode::source("src", 0.5);
        let effect = TestNode::new("fx", 2);
        let sink = TestNode::sink("sink");
        let (source_id, effect_id, sink_id) = (source.id(), effect.id(), sink.id());

        graph.add_node(Box::new(sink));
        graph.add_node(Box::new(effect));
        graph.add_node(Box::new(source));

        graph.connect(source_id, "output", effect_id, "input").unwrap();
        graph.connect(effect_id, "output", sink_id, "input").unwrap();

        let order = graph.processing_order().unwrap().to_vec();
        let pos = |id| {
            let idx = graph.index_of(id).unwrap();
            order.iter().position(|&i| i == idx).unwrap()
        };
        assert!(pos(source_id) < pos(effect_id));
        assert!(pos(effect_id) < pos(sink_id));
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = Graph::new();
        let a = TestNode::new("a", 2);
        let b = TestNode::new("b", 2);
        let (a_id, b_id) = (a.id(), b.id());
        graph.add_node(Box::new(a));
        graph.add_node(Box::new(b));

        graph.connect(a_id, "output", b_id, "input").unwrap();
        let result = graph.connect(b_id, "output", a_id, "input");
        assert!(matches!(result, Err(GraphError::CycleDetected)));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_unknown_port_rejected() {
        let mut graph = Graph::new();
        let source = TestNode::source("src", 0.5);
        let sink = TestNode::sink("sink");
        let (source_id, sink_id) = (source.id(), sink.id());
        graph.add_node(Box::new(source));
        graph.add_node(Box::new(sink));

        let result = graph.connect(source_id, "output", sink_id, "in7");
        assert!(matches!(result, Err(GraphError::PortNotFound { .. })));
    }

    #[test]
    fn test_channel_mismatch() {
        let mut graph = Graph::new();
        let stereo = TestNode::new("stereo", 2);
        let mono_in = TestNode::new("mono", 1);
        let (stereo_id, mono_id) = (stereo.id(), mono_in.id());
        graph.add_node(Box::new(stereo));
        graph.add_node(Box::new(mono_in));

        let result = graph.connect(stereo_id, "output", mono_id, "input");
        assert!(matches!(
            result,
            Err(GraphError::ChannelMismatch {
                output: 2,
                input: 1
            })
        ));
    }

    #[test]
    fn test_render_sums_edges_and_upmixes() {
        let mut graph = Graph::new();
        let a = TestNode::source("a", 0.25);
        let b = TestNode::source("b", 0.5);
        let sink = TestNode::sink("sink");
        let (a_id, b_id, sink_id) = (a.id(), b.id(), sink.id());
        graph.add_node(Box::new(a));
        graph.add_node(Box::new(b));
        graph.add_node(Box::new(sink));
        graph.connect(a_id, "output", sink_id, "input").unwrap();
        graph.connect(b_id, "output", sink_id, "input").unwrap();

        let out = graph.render(&ctx(), sink_id).unwrap();
        assert_eq!(out.channels, 2);
        assert_eq!(out.frames(), 4);
        assert!(out.samples.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_render_unknown_sink() {
        let mut graph = Graph::new();
        let missing = Uuid::new_v4();
        assert_eq!(
            graph.render(&ctx(), missing).unwrap_err(),
            GraphError::NodeNotFound(missing)
        );
    }

    #[test]
    fn test_disconnect_all_and_remove() {
        let mut graph = Graph::new();
        let src = TestNode::source("src", 0.1);
        let fx = TestNode::new("fx", 2);
        let sink = TestNode::sink("sink");
        let (src_id, fx_id, sink_id) = (src.id(), fx.id(), sink.id());
        graph.add_node(Box::new(src));
        graph.add_node(Box::new(fx));
        graph.add_node(Box::new(sink));
        graph.connect(src_id, "output", fx_id, "input").unwrap();
        graph.connect(fx_id, "output", sink_id, "input").unwrap();

        assert_eq!(graph.disconnect_all(fx_id), 2);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.disconnect_all(fx_id), 0);

        assert!(graph.remove_node(fx_id).is_some());
        assert!(graph.node(fx_id).is_none());
        assert_eq!(graph.node_count(), 2);
        assert!(graph.contains(src_id) && graph.contains(sink_id));
    }

    #[test]
    fn test_snapshot() {
        let mut graph = Graph::new();
        let src = TestNode::source("src", 0.1);
        let sink = TestNode::sink("sink");
        let (src_id, sink_id) = (src.id(), sink.id());
        graph.add_node(Box::new(src));
        graph.add_node(Box::new(sink));
        graph.connect(src_id, "output", sink_id, "input").unwrap();

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].source_id, src_id);
        assert_eq!(snapshot.edges[0].dest_id, sink_id);
    }
}
