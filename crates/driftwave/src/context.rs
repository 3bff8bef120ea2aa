//! Processing contexts
//!
//! An `AudioContext` owns one signal graph and renders it through its
//! destination node. Node wiring is synchronous. Creating, resuming and
//! closing a context are the only suspension points, mirroring how a
//! platform audio subsystem behaves.
//!
//! Contexts are handed out by a `ContextFactory`. The shipped
//! `OfflineContextFactory` renders in-process and can simulate platform
//! latency or refuse a role outright.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::graph::{Graph, GraphError, GraphSnapshot};
use crate::nodes::DestinationNode;
use crate::primitives::{AudioBuffer, BoxedNode, NodeError, Param, PlaybackState, ProcessContext};

/// Which slot a context fills. At most one of each may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRole {
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContextError {
    #[error("{role:?} audio context unavailable: {reason}")]
    Unavailable { role: ContextRole, reason: String },

    #[error("a {0:?} context is already open")]
    RoleOccupied(ContextRole),

    #[error("context is closed")]
    Closed,

    #[error("context still has {0} connections; disconnect nodes before closing")]
    NodesStillConnected(usize),

    #[error("node not found: {0}")]
    NodeNotFound(Uuid),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Tracks every open context so a role is never double-booked
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    open: Arc<Mutex<HashMap<ContextRole, Uuid>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ContextRole, Uuid>> {
        self.open.lock().expect("context registry mutex poisoned")
    }

    fn claim(&self, role: ContextRole, id: Uuid) -> Result<(), ContextError> {
        let mut open = self.entries();
        if open.contains_key(&role) {
            return Err(ContextError::RoleOccupied(role));
        }
        open.insert(role, id);
        Ok(())
    }

    fn release(&self, role: ContextRole, id: Uuid) {
        let mut open = self.entries();
        if open.get(&role) == Some(&id) {
            open.remove(&role);
        }
    }

    /// The open context for a role, if any
    pub fn open_context(&self, role: ContextRole) -> Option<Uuid> {
        self.entries().get(&role).copied()
    }

    pub fn open_count(&self) -> usize {
        self.entries().len()
    }
}

/// One audio-rendering context and the graph it plays
pub struct AudioContext {
    id: Uuid,
    role: ContextRole,
    sample_rate: u32,
    created_at: Instant,
    latency: Duration,
    destination: Uuid,
    state: Mutex<ContextState>,
    graph: Mutex<Graph>,
    registry: Option<ContextRegistry>,
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state())
            .finish()
    }
}

impl AudioContext {
    /// A standalone suspended context, not tracked by any registry
    pub fn new(role: ContextRole, sample_rate: u32) -> Self {
        let mut graph = Graph::new();
        let destination = graph.add_node(Box::new(DestinationNode::new()));
        Self {
            id: Uuid::new_v4(),
            role,
            sample_rate,
            created_at: Instant::now(),
            latency: Duration::ZERO,
            destination,
            state: Mutex::new(ContextState::Suspended),
            graph: Mutex::new(graph),
            registry: None,
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn with_registry(mut self, registry: ContextRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().expect("context graph mutex poisoned")
    }

    fn open_graph(&self) -> Result<MutexGuard<'_, Graph>, ContextError> {
        if self.state() == ContextState::Closed {
            return Err(ContextError::Closed);
        }
        Ok(self.graph())
    }

    fn set_state(&self, state: ContextState) {
        *self.state.lock().expect("context state mutex poisoned") = state;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        *self.state.lock().expect("context state mutex poisoned")
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// The output node every graph ultimately feeds
    pub fn destination(&self) -> Uuid {
        self.destination
    }

    pub fn add_node(&self, node: BoxedNode) -> Result<Uuid, ContextError> {
        Ok(self.open_graph()?.add_node(node))
    }

    pub fn connect(
        &self,
        source: Uuid,
        source_port: &str,
        dest: Uuid,
        dest_port: &str,
    ) -> Result<(), ContextError> {
        self.open_graph()?
            .connect(source, source_port, dest, dest_port)?;
        Ok(())
    }

    pub fn connect_to_destination(&self, source: Uuid, source_port: &str) -> Result<(), ContextError> {
        self.connect(source, source_port, self.destination, "input")
    }

    pub fn start_node(&self, id: Uuid) -> Result<(), ContextError> {
        let mut graph = self.open_graph()?;
        let node = graph.node_mut(id).ok_or(ContextError::NodeNotFound(id))?;
        node.start()?;
        Ok(())
    }

    pub fn stop_node(&self, id: Uuid) -> Result<(), ContextError> {
        let mut graph = self.open_graph()?;
        let node = graph.node_mut(id).ok_or(ContextError::NodeNotFound(id))?;
        node.stop()?;
        Ok(())
    }

    /// Remove every edge touching `id`. Returns the number removed.
    pub fn disconnect_node(&self, id: Uuid) -> usize {
        self.graph().disconnect_all(id)
    }

    /// Drop a node that has already been disconnected
    pub fn remove_node(&self, id: Uuid) -> bool {
        self.graph().remove_node(id).is_some()
    }

    pub fn set_param(&self, id: Uuid, param: Param, value: f64) -> Result<(), ContextError> {
        let mut graph = self.open_graph()?;
        let node = graph.node_mut(id).ok_or(ContextError::NodeNotFound(id))?;
        node.set_param(param, value)?;
        Ok(())
    }

    pub fn param(&self, id: Uuid, param: Param) -> Option<f64> {
        self.graph().node(id).and_then(|node| node.param(param))
    }

    pub fn playback_state(&self, id: Uuid) -> Option<PlaybackState> {
        self.graph().node(id).and_then(|node| node.playback_state())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.graph().contains(id)
    }

    /// Nodes in the graph, not counting the destination
    pub fn node_count(&self) -> usize {
        self.graph().node_count().saturating_sub(1)
    }

    pub fn edge_count(&self) -> usize {
        self.graph().edge_count()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph().snapshot()
    }

    /// Render `frames` of stereo output. Suspended contexts are silent.
    pub fn render(&self, frames: usize) -> Result<AudioBuffer, ContextError> {
        match self.state() {
            ContextState::Closed => Err(ContextError::Closed),
            ContextState::Suspended => Ok(AudioBuffer::new(frames, 2)),
            ContextState::Running => {
                let ctx = ProcessContext {
                    sample_rate: self.sample_rate,
                    buffer_size: frames,
                };
                Ok(self.graph().render(&ctx, self.destination)?)
            }
        }
    }

    pub async fn resume(&self) -> Result<(), ContextError> {
        match self.state() {
            ContextState::Closed => return Err(ContextError::Closed),
            ContextState::Running => return Ok(()),
            ContextState::Suspended => {}
        }

        tokio::time::sleep(self.latency).await;

        // close() may have landed while we were waiting
        if self.state() == ContextState::Closed {
            return Err(ContextError::Closed);
        }
        self.set_state(ContextState::Running);
        debug!(context = %self.id, role = ?self.role, "context resumed");
        Ok(())
    }

    /// Close the context. Every node must be disconnected first. Closing an
    /// already-closed context is a no-op.
    pub async fn close(&self) -> Result<(), ContextError> {
        if self.state() == ContextState::Closed {
            return Ok(());
        }
        let edges = self.edge_count();
        if edges > 0 {
            return Err(ContextError::NodesStillConnected(edges));
        }

        tokio::time::sleep(self.latency).await;

        self.set_state(ContextState::Closed);
        if let Some(registry) = &self.registry {
            registry.release(self.role, self.id);
        }
        info!(context = %self.id, role = ?self.role, "context closed");
        Ok(())
    }

    /// Drop every connection in the graph. Last-resort cleanup before close.
    pub fn disconnect_all(&self) -> usize {
        let mut graph = self.graph();
        graph
            .node_ids()
            .into_iter()
            .map(|id| graph.disconnect_all(id))
            .sum()
    }
}

/// Creates processing contexts on demand
#[async_trait]
pub trait ContextFactory: Send + Sync {
    async fn create(&self, role: ContextRole) -> Result<Arc<AudioContext>, ContextError>;
}

/// In-process contexts with optional simulated platform behaviour
pub struct OfflineContextFactory {
    sample_rate: u32,
    latency: Duration,
    denied: Mutex<HashSet<ContextRole>>,
    registry: ContextRegistry,
}

impl OfflineContextFactory {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            latency: Duration::ZERO,
            denied: Mutex::new(HashSet::new()),
            registry: ContextRegistry::new(),
        }
    }

    /// Delay create, resume and close by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Refuse to create contexts for `role` until `allow` is called
    pub fn deny(&self, role: ContextRole) {
        self.denied.lock().expect("denied roles mutex poisoned").insert(role);
    }

    pub fn allow(&self, role: ContextRole) {
        self.denied.lock().expect("denied roles mutex poisoned").remove(&role);
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[async_trait]
impl ContextFactory for OfflineContextFactory {
    async fn create(&self, role: ContextRole) -> Result<Arc<AudioContext>, ContextError> {
        if self.denied.lock().expect("denied roles mutex poisoned").contains(&role) {
            return Err(ContextError::Unavailable {
                role,
                reason: "denied by platform".to_string(),
            });
        }

        tokio::time::sleep(self.latency).await;

        let context = AudioContext::new(role, self.sample_rate)
            .with_latency(self.latency)
            .with_registry(self.registry.clone());
        self.registry.claim(role, context.id())?;

        info!(context = %context.id(), ?role, sample_rate = self.sample_rate, "context created");
        Ok(Arc::new(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{GainNode, OscillatorNode};

    #[tokio::test]
    async fn test_resume_then_render() {
        let ctx = AudioContext::new(ContextRole::Foreground, 8000);
        let osc = ctx
            .add_node(Box::new(OscillatorNode::new("osc", 440.0).unwrap()))
            .unwrap();
        ctx.connect_to_destination(osc, "output").unwrap();
        ctx.start_node(osc).unwrap();

        assert_eq!(ctx.render(64).unwrap().peak(), 0.0);
        ctx.resume().await.unwrap();
        assert_eq!(ctx.state(), ContextState::Running);

        let out = ctx.render(64).unwrap();
        assert_eq!(out.channels, 2);
        assert!(out.peak() > 0.5);
    }

    #[tokio::test]
    async fn test_close_requires_disconnect() {
        let ctx = AudioContext::new(ContextRole::Foreground, 8000);
        let gain = ctx.add_node(Box::new(GainNode::new("gain", 1.0))).unwrap();
        ctx.connect_to_destination(gain, "output").unwrap();

        assert_eq!(ctx.close().await, Err(ContextError::NodesStillConnected(1)));

        assert_eq!(ctx.disconnect_node(gain), 1);
        assert!(ctx.remove_node(gain));
        ctx.close().await.unwrap();
        ctx.close().await.unwrap();

        assert_eq!(ctx.state(), ContextState::Closed);
        assert!(matches!(
            ctx.add_node(Box::new(GainNode::new("late", 1.0))),
            Err(ContextError::Closed)
        ));
        assert_eq!(ctx.resume().await, Err(ContextError::Closed));
        assert!(ctx.render(16).is_err());
    }

    #[tokio::test]
    async fn test_factory_enforces_one_context_per_role() {
        let factory = OfflineContextFactory::new(44100);
        let fg = factory.create(ContextRole::Foreground).await.unwrap();
        let _bg = factory.create(ContextRole::Background).await.unwrap();
        assert_eq!(factory.registry().open_count(), 2);

        let dup = factory.create(ContextRole::Foreground).await;
        assert_eq!(
            dup.unwrap_err(),
            ContextError::RoleOccupied(ContextRole::Foreground)
        );

        fg.close().await.unwrap();
        assert!(factory.registry().open_context(ContextRole::Foreground).is_none());
        assert!(factory.create(ContextRole::Foreground).await.is_ok());
    }

    #[tokio::test]
    async fn test_denied_role() {
        let factory = OfflineContextFactory::new(44100);
        factory.deny(ContextRole::Background);
        assert!(matches!(
            factory.create(ContextRole::Background).await,
            Err(ContextError::Unavailable {
                role: ContextRole::Background,
                ..
            })
        ));
        factory.allow(ContextRole::Background);
        assert!(factory.create(ContextRole::Background).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_latency() {
        let factory = OfflineContextFactory::new(44100).with_latency(Duration::from_millis(50));
        let before = Instant::now();
        let ctx = factory.create(ContextRole::Foreground).await.unwrap();
        ctx.resume().await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(100));
    }
}
