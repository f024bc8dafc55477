//! Crate-level error types.

use std::fmt;

use crate::dataset::DatasetState;
use crate::gpu::render_context::RenderContextError;
use crate::passes::Stage;

/// Errors produced by the ibl-bake crate.
#[derive(Debug)]
pub enum IblError {
    /// Malformed or missing panorama input.
    InvalidInput(String),
    /// Options that cannot describe a valid pipeline (zero sizes, empty mip
    /// chains, inverted sample budgets).
    InvalidOptions(String),
    /// A texture, framebuffer or host buffer could not be allocated.
    ResourceAllocationFailed(String),
    /// A convolution pass did not complete.
    PrecomputeFailed {
        /// The stage that failed.
        stage: Stage,
        /// Executor-provided failure description.
        reason: String,
    },
    /// The dataset was bound while not `Ready`.
    NotReady(DatasetState),
    /// The precompute was cancelled through its [`CancelToken`].
    ///
    /// [`CancelToken`]: crate::passes::CancelToken
    Aborted,
    /// The BRDF LUT cache file exists but is not a valid cache.
    CacheFormat(String),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// Failed to spawn the background precompute thread.
    ThreadSpawn(std::io::Error),
    /// The background precompute thread exited without a result.
    WorkerLost,
    /// GPU context initialization failure.
    Gpu(RenderContextError),
}

impl fmt::Display for IblError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::InvalidOptions(msg) => write!(f, "invalid options: {msg}"),
            Self::ResourceAllocationFailed(msg) => {
                write!(f, "resource allocation failed: {msg}")
            }
            Self::PrecomputeFailed { stage, reason } => {
                write!(f, "precompute failed during {stage}: {reason}")
            }
            Self::NotReady(state) => {
                write!(f, "IBL dataset is not ready (state: {state})")
            }
            Self::Aborted => write!(f, "precompute aborted"),
            Self::CacheFormat(msg) => write!(f, "cache format error: {msg}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::ThreadSpawn(e) => {
                write!(f, "failed to spawn thread: {e}")
            }
            Self::WorkerLost => {
                write!(f, "precompute thread exited without a result")
            }
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
        }
    }
}

impl std::error::Error for IblError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) | Self::ThreadSpawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for IblError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for IblError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl IblError {
    /// Returns the failing stage for [`IblError::PrecomputeFailed`].
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::PrecomputeFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precompute_failure_names_stage() {
        let err = IblError::PrecomputeFailed {
            stage: Stage::SpecularPrefilter,
            reason: "device lost".to_owned(),
        };
        assert_eq!(err.stage(), Some(Stage::SpecularPrefilter));
        assert_eq!(
            err.to_string(),
            "precompute failed during specular prefilter: device lost"
        );
    }

    #[test]
    fn io_errors_expose_source() {
        use std::error::Error;
        let err = IblError::from(std::io::Error::other("disk full"));
        assert!(err.source().is_some());
        assert!(IblError::Aborted.source().is_none());
    }
}
