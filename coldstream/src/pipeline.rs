//! Cold pipelines and the activation boundary.
//!
//! A [Pipeline] is a description only.  Building one reads no inputs,
//! starts no timers and calls no sinks.  All of that happens when it is
//! handed, together with a [Subscriber], to [Pipeline::run] or
//! [Pipeline::activate], each of which wires a fresh graph for that one
//! run.

use log::Level;
use std::any::Any;
use std::rc::Rc;
use std::thread::{self, JoinHandle};

use crate::cancel::{ActivationState, CancelHandle};
use crate::error::PipelineError;
use crate::graph::{Graph, RunMode};
use crate::inputs::Inputs;
use crate::nodes::{NodeOperators, ReleasedOperators, StreamOperators};
use crate::pacing::Pacing;
use crate::transform::{Scalar, check_factor};
use crate::types::Node;

type SinkFn<T> = Box<dyn FnMut(T) -> anyhow::Result<()> + Send>;

/// How a run ended, when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// The consuming side of one activation: a sink for every value, optional
/// completion and error callbacks, and the handle that cancels the run.
pub struct Subscriber<T> {
    sink: SinkFn<T>,
    on_error: Option<Box<dyn FnOnce(&PipelineError) + Send>>,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
    cancel: CancelHandle,
}

impl<T> Subscriber<T> {
    /// An error returned by `sink` ends the run with
    /// [PipelineError::SinkFailure].
    pub fn new(sink: impl FnMut(T) -> anyhow::Result<()> + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            on_error: None,
            on_complete: None,
            cancel: CancelHandle::new(),
        }
    }

    /// A sink that cannot fail.
    pub fn each(mut sink: impl FnMut(T) + Send + 'static) -> Self {
        Self::new(move |value| {
            sink(value);
            Ok(())
        })
    }

    /// Called once if pulling inputs or ticks, or scaling a value, fails.
    pub fn on_error(mut self, func: impl FnOnce(&PipelineError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(func));
        self
    }

    /// Called once when the inputs are exhausted.
    pub fn on_complete(mut self, func: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(func));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// The handle that will control the run, available before it starts
    /// so that the sink itself can hold it.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

/// Scale `inputs` by `factor`, one input per tick of `pacing`.
#[derive(Clone, Debug)]
pub struct Pipeline<T: Scalar> {
    factor: T,
    inputs: Inputs<T>,
    pacing: Pacing,
}

impl<T: Scalar> Pipeline<T> {
    /// Describes a run.  Fails only if `factor` is not a number.
    /// ```
    /// # use coldstream::*;
    /// let pipeline = Pipeline::build(2, vec![3, 1, 7], Pacing::Immediate).unwrap();
    /// let (sender, receiver) = std::sync::mpsc::channel();
    /// let subscriber = Subscriber::each(move |value| sender.send(value).unwrap());
    /// pipeline.run(subscriber, RunMode::RealTime).unwrap();
    /// assert_eq!(receiver.try_iter().collect::<Vec<_>>(), vec![6, 2, 14]);
    /// ```
    pub fn build(factor: T, inputs: impl Into<Inputs<T>>, pacing: Pacing) -> Result<Self, PipelineError> {
        Ok(Self {
            factor: check_factor(factor)?,
            inputs: inputs.into(),
            pacing,
        })
    }

    pub fn factor(&self) -> T {
        self.factor
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Runs on the calling thread, returning once the run has ended.
    pub fn run(self, subscriber: Subscriber<T>, run_mode: RunMode) -> Result<Outcome, PipelineError> {
        subscriber.cancel.begin()?;
        self.execute(subscriber, run_mode)
    }

    /// Runs on a dedicated thread.  The returned [Activation] is already
    /// running; dropping it cancels the run and waits for it.
    pub fn activate(self, subscriber: Subscriber<T>, run_mode: RunMode) -> Result<Activation, PipelineError> {
        let cancel = subscriber.cancel.clone();
        cancel.begin()?;
        let spawned = thread::Builder::new()
            .name("coldstream-activation".to_string())
            .spawn(move || self.execute(subscriber, run_mode));
        match spawned {
            Ok(handle) => Ok(Activation {
                cancel,
                handle: Some(handle),
            }),
            Err(err) => {
                cancel.finish(ActivationState::Errored);
                Err(PipelineError::Engine(err.into()))
            }
        }
    }

    fn wire(self, sink: SinkFn<T>) -> Rc<dyn Node> {
        self.pacing
            .source()
            .release(self.inputs)
            .scale(self.factor)
            .logged("scaled", Level::Debug)
            .sink(sink)
    }

    fn execute(self, subscriber: Subscriber<T>, run_mode: RunMode) -> Result<Outcome, PipelineError> {
        let Subscriber {
            sink,
            on_error,
            on_complete,
            cancel,
        } = subscriber;
        debug!(
            "activating x{:?} with {:?} pacing in {:?}",
            self.factor, self.pacing, run_mode
        );
        let root = self.wire(sink);
        let result = Graph::new_with(vec![root], run_mode, cancel.clone()).run();
        match result {
            Ok(()) => {
                if !cancel.finish(ActivationState::Completed) {
                    return Ok(Outcome::Cancelled);
                }
                if let Some(on_complete) = on_complete {
                    on_complete();
                }
                Ok(Outcome::Completed)
            }
            Err(err) => {
                let err = PipelineError::from_engine(err);
                if !cancel.finish(ActivationState::Errored) {
                    debug!("suppressed after cancel: {err}");
                    return Ok(Outcome::Cancelled);
                }
                debug!("activation failed: {err}");
                if err.is_upstream() {
                    if let Some(on_error) = on_error {
                        on_error(&err);
                    }
                }
                Err(err)
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle onto a pipeline running on its own thread.
pub struct Activation {
    cancel: CancelHandle,
    handle: Option<JoinHandle<Result<Outcome, PipelineError>>>,
}

impl Activation {
    pub fn state(&self) -> ActivationState {
        self.cancel.state()
    }

    /// See [CancelHandle::cancel].
    pub fn cancel(&self) -> Result<(), PipelineError> {
        self.cancel.cancel()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|handle| handle.is_finished())
    }

    /// Waits for the run to end.
    pub fn join(mut self) -> Result<Outcome, PipelineError> {
        self.wait()
    }

    fn wait(&mut self) -> Result<Outcome, PipelineError> {
        let Some(handle) = self.handle.take() else {
            return Err(PipelineError::Terminated(self.state()));
        };
        handle.join().unwrap_or_else(|payload| {
            self.cancel.finish(ActivationState::Errored);
            Err(PipelineError::WorkerPanicked(panic_message(payload)))
        })
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.cancel.cancel() {
                debug!("dropped activation not cancelled: {err}");
            }
            if let Err(err) = self.wait() {
                debug!("dropped activation ended with: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const HISTORICAL: RunMode = RunMode::HistoricalFrom(crate::NanoTime::ZERO);

    struct Recorder<T> {
        values: Arc<Mutex<Vec<T>>>,
        completed: Arc<AtomicUsize>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl<T: Clone + Send + 'static> Recorder<T> {
        fn new() -> Self {
            Self {
                values: Arc::new(Mutex::new(Vec::new())),
                completed: Arc::new(AtomicUsize::new(0)),
                errors: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn subscriber(&self) -> Subscriber<T> {
            let values = self.values.clone();
            let completed = self.completed.clone();
            let errors = self.errors.clone();
            Subscriber::each(move |value| values.lock().unwrap().push(value))
                .on_complete(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |err| errors.lock().unwrap().push(err.to_string()))
        }

        fn values(&self) -> Vec<T> {
            self.values.lock().unwrap().clone()
        }

        fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }

        fn errors(&self) -> Vec<String> {
            self.errors.lock().unwrap().clone()
        }
    }

    fn emitted<T: Scalar>(factor: T, inputs: Vec<T>) -> Vec<T> {
        let recorder = Recorder::new();
        let outcome = Pipeline::build(factor, inputs, Pacing::Immediate)
            .unwrap()
            .run(recorder.subscriber(), HISTORICAL)
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(recorder.completed(), 1);
        assert!(recorder.errors().is_empty());
        recorder.values()
    }

    #[test]
    fn emits_in_input_order_then_completes() {
        let _ = env_logger::try_init();
        assert_eq!(emitted(2, vec![3, 1, 7]), vec![6, 2, 14]);
    }

    #[test]
    fn single_element() {
        assert_eq!(emitted(10, vec![1]), vec![10]);
    }

    #[test]
    fn negative_factor() {
        assert_eq!(emitted(-1, vec![0, 1, 2, 3]), vec![0, -1, -2, -3]);
    }

    #[test]
    fn empty_inputs_complete_once() {
        assert!(emitted(4_u16, vec![]).is_empty());
    }

    #[test]
    fn building_has_no_effect() {
        let generated = Arc::new(AtomicUsize::new(0));
        let counter = generated.clone();
        let recorder = Recorder::<u32>::new();
        let subscriber = recorder.subscriber();
        let pipeline = Pipeline::build(
            3,
            Inputs::<u32>::from_fn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                vec![1, 2]
            }),
            Pacing::interval(Duration::from_millis(1)),
        )
        .unwrap();
        let copy = pipeline.clone();
        drop((pipeline, copy, subscriber));
        assert_eq!(generated.load(Ordering::SeqCst), 0);
        assert!(recorder.values().is_empty());
        assert_eq!(recorder.completed(), 0);
    }

    #[test]
    fn rebuilt_and_cloned_pipelines_replay_identically() {
        let build = || {
            Pipeline::build(
                5_i64,
                Inputs::<i64>::from_fn(|| (1..=4).map(|x| x * x)),
                Pacing::interval(Duration::from_secs(1)),
            )
            .unwrap()
        };
        let runs: Vec<Vec<i64>> = [build(), build().clone(), build()]
            .into_iter()
            .map(|pipeline| {
                let recorder = Recorder::new();
                pipeline.run(recorder.subscriber(), HISTORICAL).unwrap();
                recorder.values()
            })
            .collect();
        assert_eq!(runs[0], vec![5, 20, 45, 80]);
        assert!(runs.iter().all(|run| *run == runs[0]));
    }

    #[test]
    fn invalid_token_reports_once_and_stops() {
        let recorder = Recorder::new();
        let pipeline = Pipeline::build(2, Inputs::<i32>::parse(["1", "2", "x", "4"]), Pacing::Immediate).unwrap();
        let subscriber = recorder.subscriber();
        let handle = subscriber.cancel_handle();
        let err = pipeline.run(subscriber, HISTORICAL).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput { index: 2, .. }));
        assert_eq!(recorder.values(), vec![2, 4]);
        assert_eq!(recorder.errors().len(), 1);
        assert_eq!(recorder.completed(), 0);
        assert_eq!(handle.state(), ActivationState::Errored);
    }

    #[test]
    fn overflow_is_reported_through_on_error() {
        let recorder = Recorder::new();
        let err = Pipeline::build(100_u8, vec![1, 2, 3], Pacing::Immediate)
            .unwrap()
            .run(recorder.subscriber(), HISTORICAL)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Overflow { index: 2, .. }));
        assert_eq!(recorder.values(), vec![100, 200]);
        assert_eq!(recorder.errors().len(), 1);
    }

    #[test]
    fn nan_factor_is_rejected_at_build() {
        let err = Pipeline::build(f64::NAN, vec![1.0], Pacing::Immediate).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFactor { .. }));
    }

    #[test]
    fn sink_failure_goes_to_the_caller_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sink_calls = calls.clone();
        let errors = Arc::new(AtomicUsize::new(0));
        let error_calls = errors.clone();
        let subscriber = Subscriber::new(move |value: i32| {
            sink_calls.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(value < 4, "refusing {value}");
            Ok(())
        })
        .on_error(move |_| {
            error_calls.fetch_add(1, Ordering::SeqCst);
        });
        let handle = subscriber.cancel_handle();
        let err = Pipeline::build(2, vec![1, 2, 3], Pacing::Immediate)
            .unwrap()
            .run(subscriber, HISTORICAL)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SinkFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), ActivationState::Errored);
    }

    #[test]
    fn sink_can_cancel_its_own_run() {
        let recorder = Recorder::<i32>::new();
        let cancel = CancelHandle::new();
        let sink_cancel = cancel.clone();
        let values = recorder.values.clone();
        let completed = recorder.completed.clone();
        let subscriber = Subscriber::each(move |value| {
            values.lock().unwrap().push(value);
            sink_cancel.cancel().unwrap();
        })
        .on_complete(move || {
            completed.fetch_add(1, Ordering::SeqCst);
        })
        .with_cancel(cancel.clone());
        let outcome = Pipeline::build(1, vec![7, 8, 9], Pacing::Immediate)
            .unwrap()
            .run(subscriber, HISTORICAL)
            .unwrap();
        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(recorder.values(), vec![7]);
        assert_eq!(recorder.completed(), 0);
        assert_eq!(cancel.state(), ActivationState::Cancelled);
    }

    #[test]
    fn cancel_from_another_thread_stops_the_ticks() {
        let (sender, receiver) = unbounded();
        let subscriber = Subscriber::each(move |value| sender.send(value).unwrap());
        let activation = Pipeline::build(3, vec![1, 2, 3], Pacing::interval(Duration::from_millis(500)))
            .unwrap()
            .activate(subscriber, RunMode::RealTime)
            .unwrap();
        assert_eq!(activation.state(), ActivationState::Running);
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
        activation.cancel().unwrap();
        let started = std::time::Instant::now();
        assert_eq!(activation.join().unwrap(), Outcome::Cancelled);
        // woken by the cancel, not by the next tick
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn activation_joins_with_the_outcome() {
        let recorder = Recorder::new();
        let activation = Pipeline::build(2, vec![3, 1, 7], Pacing::interval(Duration::from_millis(1)))
            .unwrap()
            .activate(recorder.subscriber(), RunMode::RealTime)
            .unwrap();
        let handle = activation.cancel_handle();
        assert_eq!(activation.join().unwrap(), Outcome::Completed);
        assert_eq!(recorder.values(), vec![6, 2, 14]);
        assert_eq!(recorder.completed(), 1);
        assert!(matches!(
            handle.cancel(),
            Err(PipelineError::Terminated(ActivationState::Completed))
        ));
    }

    #[test]
    fn dropping_a_finished_activation_keeps_its_outcome() {
        let recorder = Recorder::<i32>::new();
        let activation = Pipeline::build(2, vec![5], Pacing::Immediate)
            .unwrap()
            .activate(recorder.subscriber(), RunMode::RealTime)
            .unwrap();
        let handle = activation.cancel_handle();
        while !activation.is_finished() {
            std::thread::sleep(Duration::from_millis(1));
        }
        drop(activation);
        assert_eq!(handle.state(), ActivationState::Completed);
        assert_eq!(recorder.values(), vec![10]);
        assert_eq!(recorder.completed(), 1);
    }

    #[test]
    fn surplus_external_ticks_stay_with_the_caller() {
        let (ticks, pacing) = Pacing::external();
        for _ in 0..5 {
            ticks.send(crate::Tick).unwrap();
        }
        let recorder = Recorder::<i32>::new();
        let pipeline = Pipeline::build(2, vec![1, 2, 3], pacing).unwrap();
        let outcome = pipeline
            .clone()
            .run(recorder.subscriber(), RunMode::RealTime)
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(recorder.values(), vec![2, 4, 6]);
        assert_eq!(ticks.len(), 2);
        // a second run on the clone is paced by what the first left behind
        ticks.send(crate::Tick).unwrap();
        let rerun = Recorder::<i32>::new();
        pipeline.run(rerun.subscriber(), RunMode::RealTime).unwrap();
        assert_eq!(rerun.values(), vec![2, 4, 6]);
        assert!(ticks.is_empty());
    }

    #[test]
    fn terminated_handles_cannot_be_reused() {
        let recorder = Recorder::<i32>::new();
        let subscriber = recorder.subscriber();
        let handle = subscriber.cancel_handle();
        Pipeline::build(1, vec![1], Pacing::Immediate)
            .unwrap()
            .run(subscriber, HISTORICAL)
            .unwrap();
        let err = Pipeline::build(1, vec![1], Pacing::Immediate)
            .unwrap()
            .run(recorder.subscriber().with_cancel(handle), HISTORICAL)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Terminated(ActivationState::Completed)));
        assert_eq!(recorder.values(), vec![1]);
    }

    #[test]
    fn cancelled_before_activation_never_runs() {
        let recorder = Recorder::<i32>::new();
        let subscriber = recorder.subscriber();
        subscriber.cancel_handle().cancel().unwrap();
        let err = Pipeline::build(1, vec![1], Pacing::Immediate)
            .unwrap()
            .activate(subscriber, RunMode::RealTime)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Terminated(ActivationState::Cancelled)));
        assert!(recorder.values().is_empty());
    }

    #[test]
    fn external_ticks_pace_the_run() {
        let (ticks, pacing) = Pacing::external();
        let (sender, receiver) = unbounded();
        let errors = Arc::new(AtomicUsize::new(0));
        let error_calls = errors.clone();
        let subscriber = Subscriber::each(move |value| sender.send(value).unwrap()).on_error(move |err| {
            assert!(matches!(err, PipelineError::PacingFailure(_)));
            error_calls.fetch_add(1, Ordering::SeqCst);
        });
        let activation = Pipeline::build(10, vec![1, 2, 3], pacing)
            .unwrap()
            .activate(subscriber, RunMode::RealTime)
            .unwrap();
        assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());
        ticks.send(crate::Tick).unwrap();
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), 10);
        ticks.send(crate::Tick).unwrap();
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), 20);
        drop(ticks);
        let err = activation.join().unwrap_err();
        assert!(matches!(err, PipelineError::PacingFailure(_)));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn dropping_the_activation_cancels_an_endless_run() {
        let (sender, receiver) = unbounded();
        let subscriber = Subscriber::each(move |value| {
            let _ = sender.send(value);
        });
        let handle = subscriber.cancel_handle();
        let activation = Pipeline::build(2_u64, Inputs::<u64>::from_fn(|| 0..), Pacing::Immediate)
            .unwrap()
            .activate(subscriber, RunMode::RealTime)
            .unwrap();
        assert_eq!(receiver.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        drop(activation);
        assert_eq!(handle.state(), ActivationState::Cancelled);
        let received: Vec<u64> = receiver.try_iter().collect();
        assert!(received.windows(2).all(|pair| pair[1] == pair[0] + 2));
    }
}
