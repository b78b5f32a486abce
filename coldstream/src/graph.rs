use crate::cancel::CancelHandle;
use crate::queue::HashByRef;
use crate::queue::TimeQueue;
use crate::types::{NanoTime, Node};

use crossbeam::channel::{Receiver, SendError, Sender, select};
use serde::{Deserialize, Serialize};
use std::cmp::max;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

static GRAPH_ID: AtomicUsize = AtomicUsize::new(0);

struct NodeData {
    node: Rc<dyn Node>,
    upstreams: Vec<(usize, bool)>,
    downstreams: Vec<(usize, bool)>,
    layer: usize,
}

/// Whether the [Graph] should run against the wall clock or a simulated one.
/// Historical runs jump straight to the next scheduled callback, so timed
/// pacing completes instantly and deterministically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    RealTime,
    HistoricalFrom(NanoTime),
}

impl RunMode {
    pub fn start_time(&self) -> NanoTime {
        match self {
            RunMode::RealTime => NanoTime::now(),
            RunMode::HistoricalFrom(start_time) => *start_time,
        }
    }
}

fn average_duration(duration: Duration, n: u64) -> Duration {
    let avg_nanos = if n == 0 {
        0
    } else {
        duration.as_nanos() / n as u128
    };
    Duration::from_nanos(avg_nanos as u64)
}

/// Produced by the [Graph] for a [Node] that is fed from another thread.
/// Notifying asks the graph to cycle that node on its next engine cycle.
#[derive(Clone, Debug)]
pub(crate) struct ReadyNotifier {
    node_index: usize,
    sender: Sender<usize>,
}

impl ReadyNotifier {
    pub fn notify(&self) -> Result<(), SendError<usize>> {
        self.sender.send(self.node_index)
    }
}

/// The parts of the graph state that are accessible to Nodes.
pub struct GraphState {
    time: NanoTime,
    start_time: NanoTime,
    run_mode: RunMode,
    current_node_index: Option<usize>,
    scheduled_callbacks: TimeQueue<usize>,
    always_callbacks: Vec<usize>,
    result: Option<anyhow::Result<()>>,
    node_to_index: HashMap<HashByRef<dyn Node>, usize>,
    ready_notifier: Sender<usize>,
    ready_callbacks: Receiver<usize>,
    cancel: CancelHandle,
    wake: Receiver<()>,
    id: usize,
    nodes: Vec<NodeData>,
    dirty_nodes_by_layer: Vec<Vec<usize>>,
    node_dirty: Vec<bool>,
}

impl GraphState {
    fn new(run_mode: RunMode, cancel: CancelHandle) -> Self {
        let (ready_notifier, ready_callbacks) = crossbeam::channel::unbounded();
        let wake = cancel.wake_receiver();
        Self {
            time: NanoTime::ZERO,
            start_time: NanoTime::ZERO,
            run_mode,
            current_node_index: None,
            scheduled_callbacks: TimeQueue::new(),
            always_callbacks: Vec::new(),
            result: None,
            node_to_index: HashMap::new(),
            ready_notifier,
            ready_callbacks,
            cancel,
            wake,
            id: GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            dirty_nodes_by_layer: Vec::new(),
            node_dirty: Vec::new(),
        }
    }

    /// The current engine time
    pub fn time(&self) -> NanoTime {
        self.time
    }

    /// Engine time since the run started
    pub fn elapsed(&self) -> NanoTime {
        self.time.saturating_sub(self.start_time)
    }

    pub fn start_time(&self) -> NanoTime {
        self.start_time
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn ready_notifier(&self) -> anyhow::Result<ReadyNotifier> {
        let node_index = self
            .current_node_index
            .ok_or_else(|| anyhow::anyhow!("ready notifier requested outside of a node"))?;
        Ok(ReadyNotifier {
            node_index,
            sender: self.ready_notifier.clone(),
        })
    }

    /// Requests a cycle of the current node at `time`.
    pub fn add_callback(&mut self, time: NanoTime) {
        if let Some(ix) = self.current_node_index {
            self.scheduled_callbacks.push(ix, time);
        }
    }

    /// Requests a cycle of the current node on every engine cycle.
    pub fn always_callback(&mut self) {
        if let Some(ix) = self.current_node_index {
            self.always_callbacks.push(ix);
        }
    }

    /// Ends the run once the current engine cycle has finished.
    /// The first result recorded wins.
    pub fn terminate(&mut self, result: anyhow::Result<()>) {
        if self.result.is_none() {
            self.result = Some(result)
        }
    }

    pub fn complete(&mut self) {
        self.terminate(Ok(()))
    }

    fn next_scheduled_time(&self) -> NanoTime {
        self.scheduled_callbacks.next_time().unwrap_or(NanoTime::MAX)
    }

    fn wait_ready_callback(&self, end_time: NanoTime) -> Option<usize> {
        if end_time == NanoTime::MAX {
            select! {
                recv(self.ready_callbacks) -> msg => msg.ok(),
                recv(self.wake) -> _ => None,
            }
        } else {
            let now = NanoTime::now();
            if now >= end_time {
                return None;
            }
            let timeout = Duration::from(end_time - now);
            select! {
                recv(self.ready_callbacks) -> msg => msg.ok(),
                recv(self.wake) -> _ => None,
                default(timeout) => None,
            }
        }
    }

    fn node_index(&self, node: &Rc<dyn Node>) -> Option<usize> {
        self.node_to_index.get(&HashByRef::new(node.clone())).copied()
    }

    fn mark_dirty(&mut self, index: usize) {
        if !self.node_dirty[index] {
            let layer = self.nodes[index].layer;
            self.dirty_nodes_by_layer[layer].push(index);
            self.node_dirty[index] = true;
        }
    }
}

/// Engine for co-ordinating execution of [Node]s
pub struct Graph {
    state: GraphState,
}

impl Graph {
    pub fn new(root_nodes: Vec<Rc<dyn Node>>, run_mode: RunMode) -> Graph {
        Self::new_with(root_nodes, run_mode, CancelHandle::new())
    }

    /// Wires the graph reachable from `root_nodes`.  The run stops early
    /// once `cancel` is cancelled.
    pub fn new_with(root_nodes: Vec<Rc<dyn Node>>, run_mode: RunMode, cancel: CancelHandle) -> Graph {
        let mut graph = Graph {
            state: GraphState::new(run_mode, cancel),
        };
        graph.initialise(root_nodes);
        graph
    }

    /// Starts every node, cycles until the graph completes, fails, is
    /// cancelled or runs out of work, then stops every node.
    pub fn run(&mut self) -> anyhow::Result<()> {
        self.state.start_time = self.state.run_mode.start_time();
        self.state.time = self.state.start_time;
        let result = self.start_nodes().and_then(|_| self.run_nodes());
        let stopped = self.stop_nodes();
        result.and(stopped)
    }

    fn start_nodes(&mut self) -> anyhow::Result<()> {
        let timer = Instant::now();
        for ix in 0..self.state.nodes.len() {
            let node = self.state.nodes[ix].node.clone();
            self.state.current_node_index = Some(ix);
            let started = node.start(&mut self.state);
            self.state.current_node_index = None;
            started?;
        }
        debug!(
            "graph {:?}, start took {:?} for {:?} nodes",
            self.state.id,
            timer.elapsed(),
            self.state.nodes.len()
        );
        Ok(())
    }

    fn stop_nodes(&mut self) -> anyhow::Result<()> {
        let mut result = Ok(());
        for ix in 0..self.state.nodes.len() {
            let node = self.state.nodes[ix].node.clone();
            self.state.current_node_index = Some(ix);
            let stopped = node.stop(&mut self.state);
            self.state.current_node_index = None;
            if let Err(err) = stopped {
                warn!("graph {:?}, failed to stop {}: {err:?}", self.state.id, node);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn run_nodes(&mut self) -> anyhow::Result<()> {
        let run_timer = Instant::now();
        let mut cycles: u64 = 0;
        let mut empty_cycles: u64 = 0;
        let is_realtime = self.state.run_mode == RunMode::RealTime;
        loop {
            if self.state.is_cancelled() {
                debug!("graph {:?} cancelled", self.state.id);
                break;
            }
            if let Some(result) = self.state.result.take() {
                debug!("graph {:?} finished", self.state.id);
                result?;
                break;
            }
            let progressed = if is_realtime {
                self.process_callbacks_realtime()
            } else {
                self.process_callbacks_historical()?
            };
            if !progressed {
                if is_realtime {
                    empty_cycles += 1;
                    continue;
                }
                debug!("graph {:?} has no more callbacks, terminating early.", self.state.id);
                break;
            }
            self.cycle()?;
            cycles += 1;
        }
        let elapsed = run_timer.elapsed();
        debug!("{empty_cycles} empty cycles");
        debug!(
            "Completed {:} cycles in {:?}. {:?} average.",
            cycles,
            elapsed,
            average_duration(elapsed, cycles)
        );
        Ok(())
    }

    fn initialise(&mut self, root_nodes: Vec<Rc<dyn Node>>) {
        let timer = Instant::now();
        for node in root_nodes {
            self.initialise_node(&node);
        }
        let mut layers = 0;
        for i in 0..self.state.nodes.len() {
            layers = max(layers, self.state.nodes[i].layer + 1);
            self.state.node_dirty.push(false);
            for j in 0..self.state.nodes[i].upstreams.len() {
                let (up_index, active) = self.state.nodes[i].upstreams[j];
                self.state.nodes[up_index].downstreams.push((i, active));
            }
        }
        self.state.dirty_nodes_by_layer = vec![Vec::new(); layers];
        for (i, node_data) in self.state.nodes.iter().enumerate() {
            debug!(
                "[{i:02}] {}{}",
                "   ".repeat(node_data.layer),
                node_data.node
            );
        }
        debug!(
            "{:} nodes wired in {:?}",
            self.state.nodes.len(),
            timer.elapsed()
        );
    }

    fn initialise_node(&mut self, node: &Rc<dyn Node>) -> usize {
        // recursively crawl upstream, pushing a NodeData for each
        // node not yet seen, and return its index
        if let Some(index) = self.state.node_index(node) {
            return index;
        }
        let mut layer = 0;
        let mut upstream_indexes = vec![];
        let upstreams = node.upstreams();
        let wired = upstreams
            .active
            .iter()
            .map(|n| (n, true))
            .chain(upstreams.passive.iter().map(|n| (n, false)));
        for (upstream_node, is_active) in wired {
            let upstream_index = self.initialise_node(upstream_node);
            upstream_indexes.push((upstream_index, is_active));
            layer = max(layer, self.state.nodes[upstream_index].layer + 1);
        }
        let index = self.state.nodes.len();
        self.state
            .node_to_index
            .insert(HashByRef::new(node.clone()), index);
        self.state.nodes.push(NodeData {
            node: node.clone(),
            upstreams: upstream_indexes,
            downstreams: vec![],
            layer,
        });
        index
    }

    fn process_scheduled_callbacks(&mut self) -> bool {
        let mut progressed = false;
        for i in 0..self.state.always_callbacks.len() {
            let ix = self.state.always_callbacks[i];
            self.state.mark_dirty(ix);
            progressed = true;
        }
        while let Some(ix) = self.state.scheduled_callbacks.pop_due(self.state.time) {
            self.state.mark_dirty(ix);
            progressed = true;
        }
        progressed
    }

    fn process_callbacks_historical(&mut self) -> anyhow::Result<bool> {
        if !self.state.ready_callbacks.is_empty() {
            anyhow::bail!("ready callbacks are only supported in real-time mode");
        }
        if let Some(next) = self.state.scheduled_callbacks.next_time() {
            self.state.time = max(self.state.time, next);
        }
        Ok(self.process_scheduled_callbacks())
    }

    fn process_ready_callbacks(&mut self) -> bool {
        let mut progressed = false;
        while let Ok(ix) = self.state.ready_callbacks.try_recv() {
            self.state.mark_dirty(ix);
            progressed = true;
        }
        progressed
    }

    fn process_callbacks_realtime(&mut self) -> bool {
        let mut progressed = self.process_ready_callbacks();
        self.state.time = NanoTime::now();
        if self.process_scheduled_callbacks() {
            progressed = true;
        }
        if !progressed {
            let wait_until = self.state.next_scheduled_time();
            if let Some(ix) = self.state.wait_ready_callback(wait_until) {
                self.state.mark_dirty(ix);
                progressed = true;
            }
            self.state.time = NanoTime::now();
            if self.process_scheduled_callbacks() {
                progressed = true;
            }
        }
        progressed
    }

    fn cycle(&mut self) -> anyhow::Result<()> {
        let result = self.cycle_layers();
        for layer in self.state.dirty_nodes_by_layer.iter_mut() {
            layer.clear();
        }
        for dirty in self.state.node_dirty.iter_mut() {
            *dirty = false;
        }
        result
    }

    fn cycle_layers(&mut self) -> anyhow::Result<()> {
        for lyr in 0..self.state.dirty_nodes_by_layer.len() {
            // downstreams always sit on a later layer, so this one
            // cannot grow while it is being cycled
            for i in 0..self.state.dirty_nodes_by_layer[lyr].len() {
                if self.state.is_cancelled() {
                    return Ok(());
                }
                let ix = self.state.dirty_nodes_by_layer[lyr][i];
                self.cycle_node(ix)?;
            }
        }
        Ok(())
    }

    fn cycle_node(&mut self, index: usize) -> anyhow::Result<()> {
        let node = self.state.nodes[index].node.clone();
        self.state.current_node_index = Some(index);
        let ticked = node.cycle(&mut self.state);
        self.state.current_node_index = None;
        if ticked? {
            for i in 0..self.state.nodes[index].downstreams.len() {
                let (downstream_index, active) = self.state.nodes[index].downstreams[i];
                if active {
                    self.state.mark_dirty(downstream_index)
                }
            }
        }
        Ok(())
    }
}
