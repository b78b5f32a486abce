use std::iter::Peekable;
use std::rc::Rc;

use crate::inputs::{InputIter, Inputs};
use crate::transform::Scalar;
use crate::types::*;

/// Releases the next input, with its position, each time the trigger
/// ticks.  The inputs are not touched before the graph starts, and the
/// graph completes as soon as they run out.
/// Used by [release](crate::nodes::NodeOperators::release).
pub(crate) struct ReleaseStream<T: Scalar> {
    trigger: Rc<dyn Node>,
    inputs: Inputs<T>,
    pending: Option<Peekable<InputIter<T>>>,
    index: usize,
    value: (usize, T),
}

impl<T: Scalar> ReleaseStream<T> {
    pub fn new(trigger: Rc<dyn Node>, inputs: Inputs<T>) -> Self {
        Self {
            trigger,
            inputs,
            pending: None,
            index: 0,
            value: Default::default(),
        }
    }
}

impl<T: Scalar> MutableNode for ReleaseStream<T> {
    fn cycle(&mut self, state: &mut GraphState) -> anyhow::Result<bool> {
        let Some(pending) = self.pending.as_mut() else {
            anyhow::bail!("release cycled before start");
        };
        match pending.next() {
            Some(Ok(value)) => {
                self.value = (self.index, value);
                self.index += 1;
                if pending.peek().is_none() {
                    state.complete();
                }
                Ok(true)
            }
            Some(Err(err)) => Err(err.into()),
            None => {
                state.complete();
                Ok(false)
            }
        }
    }

    fn upstreams(&self) -> UpStreams {
        UpStreams::new(vec![self.trigger.clone()], vec![])
    }

    fn start(&mut self, state: &mut GraphState) -> anyhow::Result<()> {
        let mut pending = self.inputs.iter().peekable();
        if pending.peek().is_none() {
            debug!("no inputs to release");
            state.complete();
        }
        self.index = 0;
        self.pending = Some(pending);
        Ok(())
    }

    fn stop(&mut self, _state: &mut GraphState) -> anyhow::Result<()> {
        self.pending = None;
        Ok(())
    }
}

impl<T: Scalar> StreamPeekRef<(usize, T)> for ReleaseStream<T> {
    fn peek_ref(&self) -> &(usize, T) {
        &self.value
    }
}
