use crate::types::*;

/// Ticks with a fixed period, starting on the first engine cycle.  A zero
/// period ticks on every engine cycle.
pub(crate) struct TickNode {
    period: NanoTime,
    next: NanoTime,
}

impl TickNode {
    pub fn new(period: NanoTime) -> Self {
        Self {
            period,
            next: NanoTime::ZERO,
        }
    }
}

impl MutableNode for TickNode {
    fn cycle(&mut self, state: &mut GraphState) -> anyhow::Result<bool> {
        if self.period > NanoTime::ZERO {
            // schedule from the previous slot, not from now, so a
            // late wake-up does not push every later tick back
            self.next = self.next + self.period;
            state.add_callback(self.next);
        }
        Ok(true)
    }

    fn upstreams(&self) -> UpStreams {
        UpStreams::none()
    }

    fn start(&mut self, state: &mut GraphState) -> anyhow::Result<()> {
        if self.period > NanoTime::ZERO {
            self.next = state.time();
            state.add_callback(self.next);
        } else {
            state.always_callback();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::*;
    use crate::inputs::Inputs;
    use crate::nodes::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn ticker_restarts_from_the_beginning() {
        // one ticker shape, two independent graphs
        for _ in 0..2 {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink_seen = seen.clone();
            let node = ticker(Duration::from_millis(5))
                .release(Inputs::from_vec(vec![10_i64, 20, 30]))
                .sink(move |(index, value)| {
                    sink_seen.borrow_mut().push((index, value));
                    Ok(())
                });
            node.run(RunMode::HistoricalFrom(NanoTime::ZERO)).unwrap();
            assert_eq!(*seen.borrow(), vec![(0, 10), (1, 20), (2, 30)]);
        }
    }

    #[test]
    fn zero_period_ticks_every_cycle_in_real_time() {
        let seen = Rc::new(RefCell::new(0));
        let sink_seen = seen.clone();
        let node = ticker(Duration::ZERO)
            .release(Inputs::from_vec((0..1000_u32).collect()))
            .sink(move |_| {
                *sink_seen.borrow_mut() += 1;
                Ok(())
            });
        node.run(RunMode::RealTime).unwrap();
        assert_eq!(*seen.borrow(), 1000);
    }
}
