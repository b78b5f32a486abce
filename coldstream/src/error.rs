use crate::cancel::ActivationState;

/// Everything that can end an activation early, or stop one from starting.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input at index {index}: {value:?} is not a number")]
    InvalidInput { index: usize, value: String },
    #[error("invalid scale factor: {value} is not a number")]
    InvalidFactor { value: String },
    #[error("overflow at index {index}: {value} * {factor}")]
    Overflow {
        index: usize,
        value: String,
        factor: String,
    },
    #[error("pacing failure: {0}")]
    PacingFailure(String),
    #[error("sink failed")]
    SinkFailure(#[source] anyhow::Error),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("activation is already {0}")]
    Terminated(ActivationState),
    #[error("activation is already running")]
    AlreadyRunning,
    #[error("activation thread panicked: {0}")]
    WorkerPanicked(String),
    #[error(transparent)]
    Engine(anyhow::Error),
}

impl PipelineError {
    /// Recovers the typed error from whatever the graph propagated.
    pub(crate) fn from_engine(err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(err) => err,
            Err(err) => PipelineError::Engine(err),
        }
    }

    /// Failures raised while pulling inputs or ticks, or while
    /// transforming them.  These are reported through `on_error`;
    /// sink failures go straight back to the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidInput { .. }
                | PipelineError::Overflow { .. }
                | PipelineError::PacingFailure(_)
                | PipelineError::Unsupported(_)
                | PipelineError::Engine(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_survive_the_engine() {
        let err: anyhow::Error = PipelineError::PacingFailure("gone".into()).into();
        let err = PipelineError::from_engine(err);
        assert!(matches!(err, PipelineError::PacingFailure(ref msg) if msg == "gone"));
        assert!(err.is_upstream());
    }

    #[test]
    fn foreign_errors_become_engine_errors() {
        let err = PipelineError::from_engine(anyhow::anyhow!("boom"));
        assert!(matches!(err, PipelineError::Engine(_)));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn sink_failures_are_not_upstream() {
        let err = PipelineError::SinkFailure(anyhow::anyhow!("disk full"));
        assert!(!err.is_upstream());
    }
}
