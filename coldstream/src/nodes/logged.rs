use log::Level;
use std::rc::Rc;

use crate::types::*;

/// Passes its source through unchanged, logging each value with the
/// engine time elapsed since the start of the run.
pub(crate) struct LoggedStream<T: Element> {
    upstream: Rc<dyn Stream<T>>,
    label: String,
    level: Level,
    value: T,
}

impl<T: Element> LoggedStream<T> {
    pub fn new(upstream: Rc<dyn Stream<T>>, label: String, level: Level) -> Self {
        Self {
            upstream,
            label,
            level,
            value: T::default(),
        }
    }
}

impl<T: Element> MutableNode for LoggedStream<T> {
    fn cycle(&mut self, state: &mut GraphState) -> anyhow::Result<bool> {
        self.value = self.upstream.peek_value();
        log!(
            target: "coldstream",
            self.level,
            "{:} {:} {:?}",
            state.elapsed().pretty(),
            self.label,
            self.value
        );
        Ok(true)
    }

    fn upstreams(&self) -> UpStreams {
        UpStreams::new(vec![self.upstream.clone().as_node()], vec![])
    }
}

impl<T: Element> StreamPeekRef<T> for LoggedStream<T> {
    fn peek_ref(&self) -> &T {
        &self.value
    }
}
