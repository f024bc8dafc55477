//! Pass dispatch: the executor seam, the reusable capture target and
//! pipeline-level cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Vec4;
use rayon::prelude::*;

use super::Stage;
use crate::cube::CubeFace;
use crate::error::IblError;

/// Per-texel program: receives texel coordinates `(x, y)` and returns the
/// RGBA value written to the target.
pub type Fragment<'a> = dyn Fn(u32, u32) -> Vec4 + Sync + 'a;

/// Parameters of one dispatch over a square output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInfo {
    /// Pipeline stage issuing the pass.
    pub stage: Stage,
    /// Cube face being written, `None` for 2D targets.
    pub face: Option<CubeFace>,
    /// Destination mip level.
    pub mip: u32,
    /// Edge length of the output surface in texels.
    pub size: u32,
}

/// Failure reported by a [`PassExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteError {
    /// The execution context went away mid-pipeline.
    DeviceLost(String),
    /// The output slice does not match `size * size`.
    TargetMismatch {
        /// Texels implied by `PassInfo::size`.
        expected: usize,
        /// Texels actually provided.
        actual: usize,
    },
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceLost(msg) => write!(f, "device lost: {msg}"),
            Self::TargetMismatch { expected, actual } => write!(
                f,
                "target holds {actual} texels, pass expects {expected}"
            ),
        }
    }
}

impl std::error::Error for ExecuteError {}

/// Runs a fragment program once for every texel of an output surface.
///
/// Implementations may evaluate texels in any order and in parallel; the
/// call returns only once every texel of `out` has been written.
pub trait PassExecutor: Send + Sync {
    /// Evaluate `fragment` over the `info.size`² surface `out` (row-major).
    ///
    /// # Errors
    ///
    /// Returns [`ExecuteError`] if the pass could not be completed.
    fn execute(
        &self,
        info: &PassInfo,
        out: &mut [Vec4],
        fragment: &Fragment<'_>,
    ) -> Result<(), ExecuteError>;
}

/// Data-parallel executor on the host thread pool (one task per row).
#[derive(Debug, Default, Clone, Copy)]
pub struct HostExecutor;

impl PassExecutor for HostExecutor {
    fn execute(
        &self,
        info: &PassInfo,
        out: &mut [Vec4],
        fragment: &Fragment<'_>,
    ) -> Result<(), ExecuteError> {
        let size = info.size as usize;
        let expected = size * size;
        if out.len() != expected || size == 0 {
            return Err(ExecuteError::TargetMismatch {
                expected,
                actual: out.len(),
            });
        }
        out.par_chunks_mut(size).enumerate().for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                *texel = fragment(x as u32, y as u32);
            }
        });
        Ok(())
    }
}

/// Scratch RGBA32F framebuffer reused across every face × mip of a stage.
///
/// Rendered texels only become readable through the `flush` callback of
/// [`CaptureTarget::render`], which runs after the executor reported
/// completion.
pub struct CaptureTarget {
    stage: Stage,
    texels: Vec<Vec4>,
}

impl CaptureTarget {
    /// Acquire a target large enough for `max_size`² texels.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::ResourceAllocationFailed`] if the backing storage
    /// cannot be reserved.
    pub fn acquire(stage: Stage, max_size: u32) -> Result<Self, IblError> {
        let len = max_size as usize * max_size as usize;
        let mut texels = Vec::new();
        texels.try_reserve_exact(len).map_err(|e| {
            IblError::ResourceAllocationFailed(format!(
                "{stage} capture target {max_size}x{max_size}: {e}"
            ))
        })?;
        Ok(Self { stage, texels })
    }

    /// Render one pass into the target, then hand the finished texels to
    /// `flush`.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::Aborted`] if `ctx` was cancelled before dispatch
    /// and [`IblError::PrecomputeFailed`] if the executor failed.
    pub fn render<F>(
        &mut self,
        ctx: &PassContext<'_>,
        face: Option<CubeFace>,
        mip: u32,
        size: u32,
        fragment: &Fragment<'_>,
        flush: F,
    ) -> Result<(), IblError>
    where
        F: FnOnce(&[Vec4]),
    {
        ctx.cancel.check()?;
        let info = PassInfo {
            stage: self.stage,
            face,
            mip,
            size,
        };
        self.texels.clear();
        self.texels
            .resize(size as usize * size as usize, Vec4::ZERO);
        ctx.executor
            .execute(&info, &mut self.texels, fragment)
            .map_err(|e| IblError::PrecomputeFailed {
                stage: self.stage,
                reason: e.to_string(),
            })?;
        flush(&self.texels);
        Ok(())
    }
}

/// Cooperative, pipeline-wide cancellation flag.
///
/// Checked before every dispatch; a dispatched pass always runs to
/// completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the pipeline holding this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a previous cancellation request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Returns [`IblError::Aborted`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check(&self) -> Result<(), IblError> {
        if self.is_cancelled() {
            Err(IblError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// What every stage needs to dispatch passes.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    /// Executor that runs the fragment programs.
    pub executor: &'a dyn PassExecutor,
    /// Pipeline cancellation flag.
    pub cancel: &'a CancelToken,
}
