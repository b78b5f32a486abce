use crossbeam::channel::{Receiver, Select, Sender, TryRecvError, bounded, select};
use std::thread::{self, JoinHandle};

use crate::error::PipelineError;
use crate::graph::{ReadyNotifier, RunMode};
use crate::pacing::Tick;
use crate::types::*;

enum Forwarder {
    Idle,
    Running {
        handle: JoinHandle<()>,
        stop: Sender<()>,
    },
}

impl Forwarder {
    fn start(
        &mut self,
        source: Receiver<Tick>,
        requests: Receiver<()>,
        notifier: ReadyNotifier,
    ) -> anyhow::Result<()> {
        if let Forwarder::Running { .. } = self {
            anyhow::bail!("tick forwarder already started");
        }
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("coldstream-ticks".to_string())
            .spawn(move || forward(source, requests, stopped, notifier))?;
        *self = Forwarder::Running { handle, stop };
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        match std::mem::replace(self, Forwarder::Idle) {
            Forwarder::Running { handle, stop } => {
                let _ = stop.try_send(());
                handle
                    .join()
                    .map_err(|e| anyhow::anyhow!("tick forwarder panicked: {e:?}"))
            }
            Forwarder::Idle => Ok(()),
        }
    }
}

// Runs on its own thread.  For each request from the node it waits until
// the caller's channel has a tick (or is closed) and wakes the graph.  It
// never receives from the channel itself: only the node takes ticks, and
// only when it cycles, so ticks the run does not need stay with the caller.
fn forward(
    source: Receiver<Tick>,
    requests: Receiver<()>,
    stopped: Receiver<()>,
    notifier: ReadyNotifier,
) {
    loop {
        select! {
            recv(requests) -> msg => if msg.is_err() { return },
            recv(stopped) -> _ => return,
        }
        let mut ready = Select::new();
        ready.recv(&source);
        let stop_index = ready.recv(&stopped);
        if ready.ready() == stop_index || notifier.notify().is_err() {
            return;
        }
    }
}

/// Ticks once for every [Tick] taken from a channel fed by another
/// thread.  A tick is taken only when the node cycles, one per cycle.
/// Real-time only.  Fails once the channel is empty and every sender
/// has been dropped.
pub(crate) struct ExternalTickNode {
    source: Receiver<Tick>,
    forwarder: Forwarder,
    requests: Option<Sender<()>>,
}

impl ExternalTickNode {
    pub fn new(source: Receiver<Tick>) -> Self {
        Self {
            source,
            forwarder: Forwarder::Idle,
            requests: None,
        }
    }

    // asks to be woken once the next tick is available
    fn request(&self) {
        if let Some(requests) = &self.requests {
            let _ = requests.try_send(());
        }
    }
}

impl MutableNode for ExternalTickNode {
    fn cycle(&mut self, _state: &mut GraphState) -> anyhow::Result<bool> {
        if self.requests.is_none() {
            anyhow::bail!("external ticks cycled before start");
        }
        match self.source.try_recv() {
            Ok(Tick) => {
                self.request();
                Ok(true)
            }
            // taken by a concurrent run sharing the channel
            Err(TryRecvError::Empty) => {
                self.request();
                Ok(false)
            }
            Err(TryRecvError::Disconnected) => {
                Err(PipelineError::PacingFailure("tick source disconnected".to_string()).into())
            }
        }
    }

    fn upstreams(&self) -> UpStreams {
        UpStreams::none()
    }

    fn start(&mut self, state: &mut GraphState) -> anyhow::Result<()> {
        if state.run_mode() != RunMode::RealTime {
            return Err(PipelineError::Unsupported(
                "external pacing requires RunMode::RealTime".to_string(),
            )
            .into());
        }
        let (requests, pending) = bounded(1);
        self.forwarder
            .start(self.source.clone(), pending, state.ready_notifier()?)?;
        self.requests = Some(requests);
        self.request();
        Ok(())
    }

    fn stop(&mut self, _state: &mut GraphState) -> anyhow::Result<()> {
        self.requests = None;
        self.forwarder.stop()
    }
}
