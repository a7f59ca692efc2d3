//! The audio processing context: clock, node graph and worklet host.
//!
//! A node only runs while it has a path to [`AudioContext::destination`], so
//! recorder nodes are wired to the sink even though nothing reads its output.

mod block;
mod param;
mod worklet;

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use once_cell::sync::OnceCell;

pub(crate) use block::BlockAccumulator;
pub use block::SampleBlock;
pub use param::AudioParam;
pub use worklet::{
    AudioWorklet, AudioWorkletNode, MessagePort, ParamDescriptor, ProcessScope,
    ProcessorConstructor, ProcessorDefinition, ProcessorOptions, WorkletMessage, WorkletModule,
    WorkletNodeOptions, WorkletProcessor,
};

use crate::{
    constants::{DEFAULT_SAMPLE_RATE, RENDER_QUANTUM_SIZE},
    errors::CaptureError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// The output sink of every context.
    pub const DESTINATION: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::DESTINATION {
            write!(f, "destination")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// A processing-graph element that consumes render quanta.
pub trait AudioNode: Send + Sync {
    fn process(&self, _input: &SampleBlock, _current_time: f64) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioContextOptions {
    /// Rate every source is resampled to.
    pub sample_rate: u32,
    /// Frames per render quantum.
    pub render_quantum_size: usize,
}

impl Default for AudioContextOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            render_quantum_size: RENDER_QUANTUM_SIZE,
        }
    }
}

#[derive(Default)]
struct Graph {
    nodes: HashMap<NodeId, Arc<dyn AudioNode>>,
    edges: Vec<(NodeId, NodeId)>,
}

impl Graph {
    fn contains(&self, node: NodeId) -> bool {
        node == NodeId::DESTINATION || self.nodes.contains_key(&node)
    }

    fn reaches_destination(&self, start: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![start];

        while let Some(node) = pending.pop() {
            if node == NodeId::DESTINATION {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            pending.extend(
                self.edges
                    .iter()
                    .filter(|(from, _)| *from == node)
                    .map(|(_, to)| *to),
            );
        }

        false
    }
}

pub struct AudioContext {
    sample_rate: u32,
    render_quantum_size: usize,
    started: Instant,
    next_id: AtomicU64,
    graph: Mutex<Graph>,
    worklet: AudioWorklet,
}

static CONTEXT: OnceCell<Arc<AudioContext>> = OnceCell::new();

/// The process-wide context, created on first use and never torn down.
pub fn get_context() -> Arc<AudioContext> {
    Arc::clone(CONTEXT.get_or_init(|| {
        tracing::info!("Creating the shared audio context");
        Arc::new(AudioContext::new(AudioContextOptions::default()))
    }))
}

impl AudioContext {
    pub fn new(options: AudioContextOptions) -> Self {
        tracing::debug!("New audio context: {:?}", options);

        Self {
            sample_rate: options.sample_rate,
            render_quantum_size: options.render_quantum_size.max(1),
            started: Instant::now(),
            next_id: AtomicU64::new(1),
            graph: Mutex::new(Graph::default()),
            worklet: AudioWorklet::default(),
        }
    }

    /// Seconds since the context was created.
    pub fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn render_quantum_size(&self) -> usize {
        self.render_quantum_size
    }

    pub fn destination(&self) -> NodeId {
        NodeId::DESTINATION
    }

    pub fn audio_worklet(&self) -> &AudioWorklet {
        &self.worklet
    }

    /// Connects `from` to `to`. Connecting an existing edge again is a no-op.
    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<(), CaptureError> {
        let mut graph = self.graph();

        for node in [from, to] {
            if !graph.contains(node) {
                return Err(CaptureError::UnknownNode(node));
            }
        }
        if from == NodeId::DESTINATION {
            return Err(CaptureError::UnknownNode(from));
        }

        if !graph.edges.contains(&(from, to)) {
            tracing::debug!("Connecting {} -> {}", from, to);
            graph.edges.push((from, to));
        }

        Ok(())
    }

    pub fn disconnect(&self, from: NodeId, to: NodeId) -> Result<(), CaptureError> {
        let mut graph = self.graph();

        match graph.edges.iter().position(|edge| *edge == (from, to)) {
            Some(index) => {
                tracing::debug!("Disconnecting {} -> {}", from, to);
                graph.edges.remove(index);
                Ok(())
            }
            None => Err(CaptureError::NotConnected { from, to }),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph().nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.graph().edges.len()
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn insert_node(&self, id: NodeId, node: Arc<dyn AudioNode>) {
        self.graph().nodes.insert(id, node);
    }

    /// Registers `node` in the graph. It receives quanta once it is connected
    /// downstream of a source and has a path to the destination.
    pub fn add_node(&self, node: Arc<dyn AudioNode>) -> NodeId {
        let id = self.next_node_id();
        self.insert_node(id, node);
        id
    }

    /// Drops the node and every connection touching it.
    pub fn remove_node(&self, id: NodeId) {
        let mut graph = self.graph();
        graph.nodes.remove(&id);
        graph.edges.retain(|(from, to)| *from != id && *to != id);
    }

    /// Delivers one render quantum from `source` to each downstream node that
    /// reaches the destination. The graph lock is released before any node
    /// runs, so nodes may rewire the graph from inside `process`.
    pub(crate) fn render(&self, source: NodeId, block: &SampleBlock) {
        let targets: Vec<Arc<dyn AudioNode>> = {
            let graph = self.graph();
            graph
                .edges
                .iter()
                .filter(|(from, to)| *from == source && graph.reaches_destination(*to))
                .filter_map(|(_, to)| graph.nodes.get(to).cloned())
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let time = self.current_time();
        for target in targets {
            target.process(block, time);
        }
    }

    fn graph(&self) -> std::sync::MutexGuard<'_, Graph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.sample_rate)
            .field("render_quantum_size", &self.render_quantum_size)
            .field("current_time", &self.current_time())
            .field("worklet", &self.worklet)
            .finish()
    }
}
