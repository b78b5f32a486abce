//! The nodes a pipeline is wired from, and the operators that wire them.
//!

mod consumer;
mod external;
mod logged;
mod release;
mod scale;
mod tick;

use consumer::*;
use external::*;
use logged::*;
use release::*;
use scale::*;
use tick::*;

use crate::graph::*;
use crate::inputs::Inputs;
use crate::pacing::Tick;
use crate::transform::Scalar;
use crate::types::*;

use crossbeam::channel::Receiver;
use log::Level;
use std::rc::Rc;
use std::time::Duration;

/// Returns a [Node] that ticks with the specified period, starting
/// immediately.  A zero period ticks on every engine cycle.
pub fn ticker(period: Duration) -> Rc<dyn Node> {
    TickNode::new(NanoTime::from(period)).into_node()
}

/// Returns a [Node] that ticks once per [Tick] received on `source`.
pub fn external(source: Receiver<Tick>) -> Rc<dyn Node> {
    ExternalTickNode::new(source).into_node()
}

/// A trait containing operators that can be applied to [Node]s.
/// Used to support method chaining syntax.
pub trait NodeOperators {
    /// Releases one input, tagged with its position, per tick.
    /// Completes the graph once the inputs are exhausted.
    /// ```
    /// # use coldstream::*;
    /// # use std::time::Duration;
    /// // (0, 3), (1, 1), (2, 7)
    /// ticker(Duration::from_millis(10)).release(Inputs::from_vec(vec![3, 1, 7]));
    /// ```
    fn release<T: Scalar>(self: &Rc<Self>, inputs: Inputs<T>) -> Rc<dyn Stream<(usize, T)>>;

    /// Shortcut for [Graph::run] i.e. wire and execute the graph.
    fn run(self: &Rc<Self>, run_mode: RunMode) -> anyhow::Result<()>;
}

impl NodeOperators for dyn Node {
    fn release<T: Scalar>(self: &Rc<Self>, inputs: Inputs<T>) -> Rc<dyn Stream<(usize, T)>> {
        ReleaseStream::new(self.clone(), inputs).into_stream()
    }

    fn run(self: &Rc<Self>, run_mode: RunMode) -> anyhow::Result<()> {
        Graph::new(vec![self.clone()], run_mode).run()
    }
}

/// A trait containing operators that can be applied to [Stream]s.
/// Used to support method chaining syntax.
pub trait StreamOperators<T: Element> {
    /// Logs source and propagates it.  Wires nothing when the level is
    /// disabled.
    fn logged(self: &Rc<Self>, label: &str, level: Level) -> Rc<dyn Stream<T>>;
    /// Hands every value to `func`.  An error from `func` ends the run
    /// as a [PipelineError::SinkFailure](crate::PipelineError::SinkFailure).
    fn sink(self: &Rc<Self>, func: impl FnMut(T) -> anyhow::Result<()> + 'static) -> Rc<dyn Node>;
}

impl<T> StreamOperators<T> for dyn Stream<T>
where
    T: Element,
{
    fn logged(self: &Rc<Self>, label: &str, level: Level) -> Rc<dyn Stream<T>> {
        if log::log_enabled!(target: "coldstream", level) {
            LoggedStream::new(self.clone(), label.to_string(), level).into_stream()
        } else {
            self.clone()
        }
    }

    fn sink(self: &Rc<Self>, func: impl FnMut(T) -> anyhow::Result<()> + 'static) -> Rc<dyn Node> {
        SinkNode::new(self.clone(), Box::new(func)).into_node()
    }
}

/// Operators for the `(position, value)` streams produced by
/// [release](NodeOperators::release).
pub trait ReleasedOperators<T: Scalar> {
    /// Multiplies each value by `factor`, dropping its position.  Fails
    /// the run with [PipelineError::Overflow](crate::PipelineError::Overflow)
    /// or [PipelineError::InvalidInput](crate::PipelineError::InvalidInput).
    fn scale(self: &Rc<Self>, factor: T) -> Rc<dyn Stream<T>>;
}

impl<T: Scalar> ReleasedOperators<T> for dyn Stream<(usize, T)> {
    fn scale(self: &Rc<Self>, factor: T) -> Rc<dyn Stream<T>> {
        ScaleStream::new(self.clone(), factor).into_stream()
    }
}
