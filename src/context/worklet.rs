//! Background processing host.
//!
//! Worklet modules register named processors. The first module load spawns a
//! single scope thread per context that owns every processor instance; nodes
//! forward render quanta to it and processors talk back to their node over a
//! [`MessagePort`].

use std::{
    collections::HashMap,
    fmt, io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use once_cell::sync::OnceCell;

use crate::errors::CaptureError;

use super::{AudioContext, AudioNode, NodeId, block::SampleBlock, param::AudioParam};

/// Messages a processor posts back to its node.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkletMessage {
    Data(SampleBlock),
    Stop,
}

#[derive(Debug, Clone)]
pub struct MessagePort {
    sender: Sender<WorkletMessage>,
}

impl MessagePort {
    pub fn new(sender: Sender<WorkletMessage>) -> Self {
        Self { sender }
    }

    pub fn post_message(&self, message: WorkletMessage) {
        if self.sender.send(message).is_err() {
            tracing::debug!("Message port closed, dropping message");
        }
    }
}

/// What a processor sees for one render quantum.
pub struct ProcessScope<'a> {
    pub current_time: f64,
    pub port: &'a MessagePort,
}

pub trait WorkletProcessor: Send {
    /// Handles one render quantum. Returning `false` retires the processor.
    fn process(&mut self, input: &SampleBlock, scope: &ProcessScope<'_>) -> bool;
}

#[derive(Debug)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub default_value: f32,
}

pub struct ProcessorOptions {
    pub channel_count: u16,
    pub buffer_size: usize,
    pub parameters: HashMap<&'static str, Arc<AudioParam>>,
}

pub type ProcessorConstructor = fn(ProcessorOptions) -> Box<dyn WorkletProcessor>;

pub struct ProcessorDefinition {
    pub name: &'static str,
    pub parameters: &'static [ParamDescriptor],
    pub construct: ProcessorConstructor,
}

pub struct WorkletModule {
    pub name: &'static str,
    pub processors: &'static [ProcessorDefinition],
}

enum ScopeCommand {
    Attach {
        node: NodeId,
        processor: Box<dyn WorkletProcessor>,
        port: MessagePort,
    },
    Render {
        node: NodeId,
        block: SampleBlock,
        time: f64,
    },
    Detach {
        node: NodeId,
    },
}

struct WorkletScope {
    commands: Sender<ScopeCommand>,
    registry: Mutex<HashMap<&'static str, &'static ProcessorDefinition>>,
}

impl WorkletScope {
    fn spawn() -> io::Result<Self> {
        let (commands, receiver) = crossbeam_channel::unbounded();

        thread::Builder::new()
            .name("worklet-scope".to_string())
            .spawn(move || run_scope(receiver))?;

        Ok(Self {
            commands,
            registry: Mutex::new(HashMap::new()),
        })
    }

    fn register(&self, module: &'static WorkletModule) -> Result<(), CaptureError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(duplicate) = module
            .processors
            .iter()
            .find(|definition| registry.contains_key(definition.name))
        {
            return Err(CaptureError::ModuleLoad {
                module: module.name,
                reason: format!("processor '{}' is already registered", duplicate.name),
            });
        }

        for definition in module.processors {
            tracing::debug!("Registering worklet processor '{}'", definition.name);
            registry.insert(definition.name, definition);
        }

        Ok(())
    }

    fn definition(&self, name: &str) -> Option<&'static ProcessorDefinition> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }
}

fn run_scope(commands: Receiver<ScopeCommand>) {
    tracing::debug!("Worklet scope started");
    let mut processors: HashMap<NodeId, (Box<dyn WorkletProcessor>, MessagePort)> =
        HashMap::new();

    for command in commands.iter() {
        match command {
            ScopeCommand::Attach {
                node,
                processor,
                port,
            } => {
                processors.insert(node, (processor, port));
            }
            ScopeCommand::Render { node, block, time } => {
                let Some((processor, port)) = processors.get_mut(&node) else {
                    continue;
                };

                let scope = ProcessScope {
                    current_time: time,
                    port,
                };
                if !processor.process(&block, &scope) {
                    tracing::debug!("Worklet processor for node {} finished", node);
                    processors.remove(&node);
                }
            }
            ScopeCommand::Detach { node } => {
                processors.remove(&node);
            }
        }
    }

    tracing::debug!("Worklet scope exiting");
}

/// Per-context module loader and processor host.
#[derive(Default)]
pub struct AudioWorklet {
    scope: OnceCell<WorkletScope>,
    modules: Mutex<HashMap<&'static str, Arc<OnceCell<()>>>>,
    loads: AtomicUsize,
}

impl AudioWorklet {
    /// Loads `module` once. Concurrent callers block on the same load; a
    /// failed load is not remembered, so the next call tries again.
    pub fn add_module(&self, module: &'static WorkletModule) -> Result<(), CaptureError> {
        let cell = {
            let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(modules.entry(module.name).or_default())
        };

        cell.get_or_try_init(|| self.load(module)).map(|_| ())
    }

    /// How many module loads actually ran.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self, module: &WorkletModule) -> bool {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module.name)
            .is_some_and(|cell| cell.get().is_some())
    }

    fn load(&self, module: &'static WorkletModule) -> Result<(), CaptureError> {
        tracing::info!("Loading worklet module '{}'", module.name);
        self.loads.fetch_add(1, Ordering::SeqCst);

        let scope = self.scope.get_or_try_init(WorkletScope::spawn).map_err(|e| {
            tracing::error!("Failed to start worklet scope: {}", e);
            CaptureError::ModuleLoad {
                module: module.name,
                reason: e.to_string(),
            }
        })?;

        scope.register(module)?;
        tracing::debug!("Worklet module '{}' loaded", module.name);

        Ok(())
    }
}

impl fmt::Debug for AudioWorklet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioWorklet")
            .field("started", &self.scope.get().is_some())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkletNodeOptions {
    pub channel_count: u16,
    pub buffer_size: usize,
}

/// Graph-side half of a worklet node: forwards quanta to the scope thread.
struct WorkletRenderTarget {
    node: NodeId,
    commands: Sender<ScopeCommand>,
}

impl AudioNode for WorkletRenderTarget {
    fn process(&self, input: &SampleBlock, current_time: f64) {
        let command = ScopeCommand::Render {
            node: self.node,
            block: input.clone(),
            time: current_time,
        };

        if self.commands.send(command).is_err() {
            tracing::error!("Worklet scope is gone, dropping quantum for node {}", self.node);
        }
    }
}

#[derive(Debug)]
pub struct AudioWorkletNode {
    id: NodeId,
    parameters: HashMap<&'static str, Arc<AudioParam>>,
    commands: Sender<ScopeCommand>,
}

impl AudioWorkletNode {
    /// Instantiates the processor registered as `name` and adds the node to
    /// the graph. Returns the node and the receiving end of its port.
    pub fn new(
        ctx: &AudioContext,
        name: &str,
        options: WorkletNodeOptions,
    ) -> Result<(Self, Receiver<WorkletMessage>), CaptureError> {
        let worklet = ctx.audio_worklet();
        let scope = worklet
            .scope
            .get()
            .ok_or_else(|| CaptureError::UnknownProcessor(name.to_string()))?;
        let definition = scope
            .definition(name)
            .ok_or_else(|| CaptureError::UnknownProcessor(name.to_string()))?;

        let parameters: HashMap<_, _> = definition
            .parameters
            .iter()
            .map(|descriptor| {
                (
                    descriptor.name,
                    Arc::new(AudioParam::new(descriptor.default_value)),
                )
            })
            .collect();

        let processor = (definition.construct)(ProcessorOptions {
            channel_count: options.channel_count,
            buffer_size: options.buffer_size,
            parameters: parameters.clone(),
        });

        let (sender, receiver) = crossbeam_channel::unbounded();
        let id = ctx.next_node_id();

        scope
            .commands
            .send(ScopeCommand::Attach {
                node: id,
                processor,
                port: MessagePort::new(sender),
            })
            .map_err(|_| CaptureError::Thread("worklet scope is gone".to_string()))?;

        ctx.insert_node(
            id,
            Arc::new(WorkletRenderTarget {
                node: id,
                commands: scope.commands.clone(),
            }),
        );

        tracing::debug!("Created worklet node {} for '{}'", id, name);

        Ok((
            Self {
                id,
                parameters,
                commands: scope.commands.clone(),
            },
            receiver,
        ))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parameter(&self, name: &str) -> Option<Arc<AudioParam>> {
        self.parameters.get(name).cloned()
    }

    /// Removes the node from the graph and drops its processor.
    pub fn release(&self, ctx: &AudioContext) {
        ctx.remove_node(self.id);
        if self
            .commands
            .send(ScopeCommand::Detach { node: self.id })
            .is_err()
        {
            tracing::debug!("Worklet scope already gone for node {}", self.id);
        }
    }
}

impl fmt::Debug for ScopeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeCommand::Attach { node, .. } => write!(f, "Attach({node})"),
            ScopeCommand::Render { node, time, .. } => write!(f, "Render({node}, {time})"),
            ScopeCommand::Detach { node } => write!(f, "Detach({node})"),
        }
    }
}
