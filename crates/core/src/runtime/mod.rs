//! One running instance of a node tree.
//!
//! A [`Runtime`] owns a namespace: its cells, graph, bridges and the timers it
//! registered in a (possibly shared) scheduler. Two kinds of entry point
//! exist. [`Runtime::frame`] and drag handlers are the low-latency side;
//! [`Runtime::poll`], presses and wall-clock timers are the full-capability
//! side. Only the bridges carry work from the first to the second.
//!
//! Time is passed in explicitly as the offset from the runtime's epoch
//! ([`Runtime::elapsed`] for real time).

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use serde_json::Value as Json;

use crate::{
    Animator, Bridge, CellStore, DataStore, Dispatcher, EffectBridge, EffectLog, EffectSink, Event,
    EventParams, ExecutionContext, ExecutionReport, HandlerKind, Invocation,
    ItemScope, MemoryDataStore, NodeGraph, Poller, Record, RenderConsumer, Result, RuntimeConfig,
    RuntimeError, Scheduler, SchedulerHandle, Synthesizer, TimerBody, TimerFamily, TimerKey,
    TimerSpec,
};

const DEFAULT_ITEM_NAME: &str = "item";

/// Assembles a [`Runtime`]. Collaborators left unset get in-memory defaults.
pub struct RuntimeBuilder {
    namespace: String,
    config: RuntimeConfig,
    scheduler: Option<SchedulerHandle>,
    data: Option<Arc<dyn DataStore>>,
    renderer: Option<Arc<dyn RenderConsumer>>,
    sink: Option<Arc<dyn EffectSink>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a scheduler with other namespaces.
    pub fn scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn data_store(mut self, data: Arc<dyn DataStore>) -> Self {
        self.data = Some(data);
        self
    }

    /// Replaces the built-in [`Animator`].
    pub fn renderer(mut self, renderer: Arc<dyn RenderConsumer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn effect_sink(mut self, sink: Arc<dyn EffectSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Runtime {
        let cells = Arc::new(CellStore::new(self.namespace.clone()));
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Scheduler::shared(self.config.frame.interval()));
        let effects = Arc::new(EffectBridge::new());
        let forwarded = Arc::new(Bridge::new());
        let data = self
            .data
            .unwrap_or_else(|| Arc::new(MemoryDataStore::new()));
        let sink = self.sink.unwrap_or_else(|| Arc::new(EffectLog::new()));

        let (animator, renderer) = match self.renderer {
            Some(renderer) => (None, renderer),
            None => {
                let animator = Arc::new(Animator::new());
                (Some(animator.clone()), animator as Arc<dyn RenderConsumer>)
            }
        };

        let dispatcher = Dispatcher::new(
            self.namespace.clone(),
            cells.clone(),
            scheduler.clone(),
            effects.clone(),
            forwarded,
            data.clone(),
            renderer.clone(),
            self.config.animation.clone(),
        );
        let synthesizer = Synthesizer::new(cells.clone(), renderer, self.config.animation.clone());

        tracing::info!(namespace = %self.namespace, "runtime created");
        Runtime {
            namespace: self.namespace,
            config: self.config,
            epoch: Instant::now(),
            cells,
            synthesizer: RwLock::new(synthesizer),
            dispatcher,
            scheduler,
            effects,
            data,
            sink,
            animator,
            torn_down: AtomicBool::new(false),
        }
    }
}

pub struct Runtime {
    namespace: String,
    config: RuntimeConfig,
    epoch: Instant,
    cells: Arc<CellStore>,
    synthesizer: RwLock<Synthesizer>,
    dispatcher: Dispatcher,
    scheduler: SchedulerHandle,
    effects: Arc<EffectBridge>,
    data: Arc<dyn DataStore>,
    sink: Arc<dyn EffectSink>,
    animator: Option<Arc<Animator>>,
    torn_down: AtomicBool,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("namespace", &self.namespace)
            .field("cells", &self.cells.len())
            .field("synthesizer", &*self.synthesizer.read())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl Runtime {
    pub fn builder(namespace: impl Into<String>) -> RuntimeBuilder {
        RuntimeBuilder {
            namespace: namespace.into(),
            config: RuntimeConfig::default(),
            scheduler: None,
            data: None,
            renderer: None,
            sink: None,
        }
    }

    pub fn new(namespace: impl Into<String>) -> Self {
        Self::builder(namespace).build()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Real time since the runtime was built.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    pub fn cells(&self) -> &Arc<CellStore> {
        &self.cells
    }

    pub fn effects(&self) -> &Arc<EffectBridge> {
        &self.effects
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn data_store(&self) -> &Arc<dyn DataStore> {
        &self.data
    }

    /// Reads the node graph under the synthesizer's lock.
    pub fn with_graph<R>(&self, f: impl FnOnce(&NodeGraph) -> R) -> R {
        f(self.synthesizer.read().graph())
    }

    pub fn graph_snapshot(&self) -> NodeGraph {
        self.with_graph(NodeGraph::clone)
    }

    pub fn apply(&self, event: &Event) {
        self.synthesizer.write().apply(event);
    }

    /// Feeds a growing event log; entries seen before are skipped.
    pub fn sync(&self, log: &[Event]) -> usize {
        self.synthesizer.write().sync(log)
    }

    /// Runs a node's handler list in the handler's default context.
    pub fn handle(
        &self,
        node_id: &str,
        kind: HandlerKind,
        params: &EventParams,
        now: Duration,
    ) -> Result<ExecutionReport> {
        self.handle_in(node_id, kind, kind.default_context(), params, None, now)
    }

    /// Runs a handler of a collection template node for one record.
    pub fn handle_item(
        &self,
        node_id: &str,
        kind: HandlerKind,
        params: &EventParams,
        item: Json,
        now: Duration,
    ) -> Result<ExecutionReport> {
        let name = self.with_graph(|graph| {
            graph
                .template_owner(node_id)
                .and_then(|owner| owner.item_name.clone())
                .unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string())
        });
        let scope = ItemScope::new(name, item);
        self.handle_in(node_id, kind, kind.default_context(), params, Some(&scope), now)
    }

    pub fn handle_in(
        &self,
        node_id: &str,
        kind: HandlerKind,
        context: ExecutionContext,
        params: &EventParams,
        scope: Option<&ItemScope>,
        now: Duration,
    ) -> Result<ExecutionReport> {
        let actions = self
            .with_graph(|graph| graph.find(node_id).map(|node| node.handlers.get(kind).to_vec()))
            .ok_or_else(|| RuntimeError::UnknownNode(node_id.to_string()))?;

        let invocation = Invocation::new(context, params, now).with_scope(scope);
        Ok(self.dispatcher.execute(&actions, &invocation))
    }

    /// Records a `Collection` node repeats over.
    pub fn collection_items(&self, node_id: &str) -> Vec<Record> {
        let collection =
            self.with_graph(|graph| graph.find(node_id).and_then(|node| node.collection.clone()));
        collection
            .map(|collection| self.data.get_all(&collection))
            .unwrap_or_default()
    }

    /// Registers an opaque timer callback. Full-capability context.
    pub fn start_timer(&self, id: &str, spec: TimerSpec, now: Duration) {
        if self.is_torn_down() {
            return;
        }
        self.scheduler
            .lock()
            .start(TimerKey::new(&self.namespace, id), spec, now, &self.cells);
    }

    pub fn stop_timer(&self, id: &str) -> bool {
        self.scheduler.lock().stop(&self.namespace, id)
    }

    /// Low-latency frame tick: steps animations and runs due frame timers.
    pub fn frame(&self, now: Duration) -> ExecutionReport {
        if self.is_torn_down() {
            return ExecutionReport::default();
        }
        if let Some(animator) = &self.animator {
            animator.step(&self.cells, now);
        }
        self.run_due(TimerFamily::Frame, ExecutionContext::LowLatency, now)
    }

    /// Full-capability pump: plays queued effects, runs forwarded actions and
    /// due wall-clock timers.
    pub fn poll(&self, now: Duration) -> ExecutionReport {
        if self.is_torn_down() {
            return ExecutionReport::default();
        }
        self.effects.deliver(self.sink.as_ref());
        let mut report = self.dispatcher.run_forwarded(now);
        report.merge(self.run_due(TimerFamily::WallClock, ExecutionContext::FullCapability, now));
        report
    }

    /// [`Runtime::poll`] at the current real time.
    pub fn pump(&self) -> ExecutionReport {
        self.poll(self.elapsed())
    }

    /// Pumps on the configured bridge cadence from a background thread until
    /// the returned [`Poller`] is dropped.
    pub fn spawn_pump_thread(self: &Arc<Self>) -> Poller {
        let runtime: Weak<Self> = Arc::downgrade(self);
        Poller::spawn(self.config.bridge.poll_interval(), move || {
            if let Some(runtime) = runtime.upgrade() {
                let report = runtime.pump();
                for error in &report.errors {
                    tracing::error!(namespace = %runtime.namespace, %error, "pump");
                }
            }
        })
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Stops every timer of this namespace. Later ticks and polls are no-ops.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let stopped = self.scheduler.lock().stop_all_for_namespace(&self.namespace);
        let dropped = self.effects.drain().len();
        tracing::info!(namespace = %self.namespace, stopped, dropped, "runtime torn down");
    }

    fn run_due(
        &self,
        family: TimerFamily,
        context: ExecutionContext,
        now: Duration,
    ) -> ExecutionReport {
        let fired = self
            .scheduler
            .lock()
            .due(&self.namespace, family, now, &self.cells);

        let mut report = ExecutionReport::default();
        for timer in fired {
            if !timer.is_live() {
                continue;
            }
            tracing::trace!(timer = %timer.key, "tick");
            match &timer.body {
                TimerBody::Actions(actions) => {
                    let invocation = Invocation::new(context, &timer.params, now);
                    report.merge(self.dispatcher.execute(actions, &invocation));
                }
                TimerBody::Callback(callback) => (&mut *callback.lock())(),
            }
        }
        report
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.teardown();
    }
}
