use std::boxed::Box;
use std::rc::Rc;

use crate::error::PipelineError;
use crate::types::*;

/// Hands each value of its source to a sink.  It is a [Node] - it
/// doesn't produce anything.  Used by [sink](crate::nodes::StreamOperators::sink).
pub(crate) struct SinkNode<IN> {
    upstream: Rc<dyn Stream<IN>>,
    func: Box<dyn FnMut(IN) -> anyhow::Result<()>>,
}

impl<IN> SinkNode<IN> {
    pub fn new(upstream: Rc<dyn Stream<IN>>, func: Box<dyn FnMut(IN) -> anyhow::Result<()>>) -> Self {
        Self { upstream, func }
    }
}

impl<IN: 'static> MutableNode for SinkNode<IN> {
    fn cycle(&mut self, state: &mut GraphState) -> anyhow::Result<bool> {
        if state.is_cancelled() {
            return Ok(false);
        }
        (self.func)(self.upstream.peek_value()).map_err(PipelineError::SinkFailure)?;
        Ok(true)
    }

    fn upstreams(&self) -> UpStreams {
        UpStreams::new(vec![self.upstream.clone().as_node()], vec![])
    }
}
