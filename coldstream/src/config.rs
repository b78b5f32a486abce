//! Pipelines described as data.
//!
//! ```
//! # use coldstream::*;
//! let config: PipelineConfig<i64> = PipelineConfig::from_json(
//!     r#"{ "factor": 3, "inputs": [1, 2], "pacing": { "kind": "interval", "period_ms": 10 } }"#,
//! )
//! .unwrap();
//! let (pipeline, run_mode) = config.build().unwrap();
//! assert_eq!(pipeline.factor(), 3);
//! assert_eq!(run_mode, RunMode::RealTime);
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;
use crate::graph::RunMode;
use crate::pacing::Pacing;
use crate::pipeline::Pipeline;
use crate::transform::Scalar;

/// The pacings that can be written down.  External pacing needs a live
/// channel and is only available through [Pacing::external].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacingConfig {
    #[default]
    Immediate,
    Interval { period_ms: u64 },
}

impl From<PacingConfig> for Pacing {
    fn from(config: PacingConfig) -> Self {
        match config {
            PacingConfig::Immediate => Pacing::Immediate,
            PacingConfig::Interval { period_ms } => Pacing::interval(Duration::from_millis(period_ms)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig<T> {
    pub factor: T,
    #[serde(default)]
    pub inputs: Vec<T>,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub run_mode: RunMode,
}

impl<T: Scalar + DeserializeOwned> PipelineConfig<T> {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    pub fn build(self) -> Result<(Pipeline<T>, RunMode), PipelineError> {
        let pipeline = Pipeline::build(self.factor, self.inputs, self.pacing.into())?;
        Ok((pipeline, self.run_mode))
    }
}
