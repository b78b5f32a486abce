use std::rc::Rc;

use crate::transform::{Scalar, scale_at};
use crate::types::*;

/// Multiplies each released value by a fixed factor.  A value that cannot
/// be scaled ends the run with the error reported at its position.
/// Used by [scale](crate::nodes::ReleasedOperators::scale).
pub(crate) struct ScaleStream<T: Scalar> {
    upstream: Rc<dyn Stream<(usize, T)>>,
    factor: T,
    value: T,
}

impl<T: Scalar> ScaleStream<T> {
    pub fn new(upstream: Rc<dyn Stream<(usize, T)>>, factor: T) -> Self {
        Self {
            upstream,
            factor,
            value: T::default(),
        }
    }
}

impl<T: Scalar> MutableNode for ScaleStream<T> {
    fn cycle(&mut self, _state: &mut GraphState) -> anyhow::Result<bool> {
        let (index, value) = self.upstream.peek_value();
        self.value = scale_at(index, self.factor, value)?;
        Ok(true)
    }

    fn upstreams(&self) -> UpStreams {
        UpStreams::new(vec![self.upstream.clone().as_node()], vec![])
    }
}

impl<T: Scalar> StreamPeekRef<T> for ScaleStream<T> {
    fn peek_ref(&self) -> &T {
        &self.value
    }
}
