use crossbeam::channel::{Receiver, Sender, unbounded};
use std::rc::Rc;
use std::time::Duration;

use crate::nodes::{external, ticker};
use crate::types::Node;

/// Permission to release the next input.  Carries nothing else.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tick;

/// When a pipeline may release its next input.
#[derive(Clone, Debug, Default)]
pub enum Pacing {
    /// As fast as the sink consumes.
    #[default]
    Immediate,
    /// The first input at once, then one per period.
    Interval(Duration),
    /// One input per [Tick] received.  Clones of a pipeline share the
    /// channel, so concurrent runs split the ticks between them.
    External(Receiver<Tick>),
}

impl Pacing {
    pub fn interval(period: Duration) -> Self {
        Pacing::Interval(period)
    }

    /// Externally driven pacing, and the sender that drives it.
    pub fn external() -> (Sender<Tick>, Self) {
        let (sender, receiver) = unbounded();
        (sender, Pacing::External(receiver))
    }

    /// A fresh tick source, starting from the beginning.
    pub(crate) fn source(&self) -> Rc<dyn Node> {
        match self {
            Pacing::Immediate => ticker(Duration::ZERO),
            Pacing::Interval(period) => ticker(*period),
            Pacing::External(receiver) => external(receiver.clone()),
        }
    }
}
