#![warn(clippy::perf)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_doctest_main)]

//! ## Cold pipelines
//!
//! Coldstream multiplies a sequence of numbers by a factor and hands the
//! products, in order, to a subscriber.  A [Pipeline] is only a description:
//! nothing is read, scheduled or emitted until it is run, and every run
//! replays the whole sequence from the start.
//!
//! ```rust
//! use coldstream::*;
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! fn main() {
//!     let pipeline = Pipeline::build(2, vec![3, 1, 7], Pacing::interval(Duration::from_secs(1))).unwrap();
//!     for _ in 0..2 {
//!         let seen = Arc::new(Mutex::new(Vec::new()));
//!         let sink_seen = seen.clone();
//!         let subscriber = Subscriber::each(move |value| sink_seen.lock().unwrap().push(value))
//!             .on_complete(|| println!("done"));
//!         pipeline
//!             .clone()
//!             .run(subscriber, RunMode::HistoricalFrom(NanoTime::ZERO))
//!             .unwrap();
//!         assert_eq!(*seen.lock().unwrap(), vec![6, 2, 14]);
//!     }
//! }
//! ```
//!
//! ## Pacing
//!
//! Inputs are released one per tick.  [Pacing::Immediate] ticks on every
//! engine cycle, [Pacing::Interval] on a fixed schedule and
//! [Pacing::External] whenever another thread sends a [Tick].
//!
//! ## Historical vs RealTime
//!
//! Under [RunMode::RealTime] an interval of one second takes one second.
//! Under [RunMode::HistoricalFrom] engine time jumps straight to the next
//! tick, so timed pipelines finish instantly and deterministically, which
//! is what the tests use.
//!
//! ## Cancellation
//!
//! [Pipeline::activate] runs on a dedicated thread and returns an
//! [Activation].  Cancelling it, or the [CancelHandle] a [Subscriber]
//! carries, stops the run before the next value is delivered.  No callback
//! fires after cancellation.

#[macro_use]
extern crate log;
extern crate derive_new;

mod cancel;
mod config;
mod error;
mod graph;
mod inputs;
mod nodes;
mod pacing;
mod pipeline;
mod queue;
mod time;
mod transform;
mod types;

pub use cancel::*;
pub use config::*;
pub use error::*;
pub use graph::*;
pub use inputs::*;
pub use nodes::*;
pub use pacing::*;
pub use pipeline::*;
pub use transform::*;
pub use types::*;
