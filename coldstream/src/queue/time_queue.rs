use derive_new::new;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::hash::Hash;

use super::value_at::ValueAt;
use crate::time::NanoTime;

/// Queue of Ts by time, earliest first.
// ValueAt is the key so that the same value can be queued
// at several different times
#[derive(new, Debug)]
pub(crate) struct TimeQueue<T: Hash + Eq> {
    #[new(default)]
    queue: PriorityQueue<ValueAt<T>, Reverse<NanoTime>>,
}

impl<T: Hash + Eq> TimeQueue<T> {
    pub fn next_time(&self) -> Option<NanoTime> {
        self.queue.peek().map(|(_, time)| time.0)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn push(&mut self, value: T, time: NanoTime) {
        self.queue.push(ValueAt::new(value, time), Reverse(time));
    }

    /// Pops the earliest entry if it is due at `current_time`.
    pub fn pop_due(&mut self, current_time: NanoTime) -> Option<T> {
        if self.pending(current_time) {
            self.queue.pop().map(|(value_at, _)| value_at.value)
        } else {
            None
        }
    }

    pub fn pending(&self, current_time: NanoTime) -> bool {
        match self.next_time() {
            Some(time) => time <= current_time,
            None => false,
        }
    }
}
