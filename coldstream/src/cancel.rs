use crossbeam::channel::{Receiver, Sender, unbounded};
use derive_more::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::PipelineError;

/// Lifecycle of one activation.  The last three states are terminal.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
#[repr(u8)]
pub enum ActivationState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Errored = 3,
    Cancelled = 4,
}

impl ActivationState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActivationState::Idle,
            1 => ActivationState::Running,
            2 => ActivationState::Completed,
            3 => ActivationState::Errored,
            4 => ActivationState::Cancelled,
            _ => unreachable!("corrupt activation state {raw}"),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActivationState::Completed | ActivationState::Errored | ActivationState::Cancelled
        )
    }
}

struct Shared {
    state: AtomicU8,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

/// Shared handle onto an activation's state.  Cloning is cheap and every
/// clone observes the same state, so a sink can hold one and cancel the
/// run it is part of.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        let (wake_tx, wake_rx) = unbounded();
        CancelHandle {
            shared: Arc::new(Shared {
                state: AtomicU8::new(ActivationState::Idle as u8),
                wake_tx,
                wake_rx,
            }),
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ActivationState {
        ActivationState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == ActivationState::Cancelled
    }

    /// Stops the activation after any in-flight sink call.  Cancelling twice
    /// is fine; cancelling a completed or errored activation is not.
    pub fn cancel(&self) -> Result<(), PipelineError> {
        let mut current = self.state();
        loop {
            match current {
                ActivationState::Cancelled => return Ok(()),
                ActivationState::Completed | ActivationState::Errored => {
                    return Err(PipelineError::Terminated(current));
                }
                ActivationState::Idle | ActivationState::Running => {}
            }
            match self.transition(current, ActivationState::Cancelled) {
                Ok(()) => break,
                Err(actual) => current = actual,
            }
        }
        debug!("activation cancelled from {current}");
        // wakes a real-time graph blocked waiting for its next tick
        let _ = self.shared.wake_tx.try_send(());
        Ok(())
    }

    /// Idle -> Running.
    pub(crate) fn begin(&self) -> Result<(), PipelineError> {
        match self.transition(ActivationState::Idle, ActivationState::Running) {
            Ok(()) => Ok(()),
            Err(ActivationState::Running) => Err(PipelineError::AlreadyRunning),
            Err(state) => Err(PipelineError::Terminated(state)),
        }
    }

    /// Running -> `to`.  Returns false if the activation was cancelled first.
    pub(crate) fn finish(&self, to: ActivationState) -> bool {
        self.transition(ActivationState::Running, to).is_ok()
    }

    pub(crate) fn wake_receiver(&self) -> Receiver<()> {
        self.shared.wake_rx.clone()
    }

    fn transition(&self, from: ActivationState, to: ActivationState) -> Result<(), ActivationState> {
        self.shared
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ActivationState::from_u8)
    }
}
