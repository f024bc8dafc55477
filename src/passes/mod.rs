//! The precompute passes.
//!
//! Control flow per environment: [`equirect::convert`] projects the
//! panorama to a cube and builds its mip chain, then
//! [`irradiance::convolve`] and [`prefilter::prefilter`] read it
//! independently. [`brdf::integrate`] has no environment dependency and
//! runs once per process.
//!
//! Every pass is a fragment program dispatched through a
//! [`PassExecutor`] into a [`CaptureTarget`]; each finished face/mip is
//! flushed into its destination before any later pass can borrow it.

use std::fmt;

pub mod brdf;
pub mod equirect;
pub mod executor;
pub mod irradiance;
pub mod prefilter;

pub use executor::{
    CancelToken, CaptureTarget, ExecuteError, Fragment, HostExecutor,
    PassContext, PassExecutor, PassInfo,
};

/// Pipeline stage, used for logging and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Equirectangular panorama → environment cubemap.
    PanoramaToCubemap,
    /// Box-filtered mip chain of the environment cubemap.
    MipGeneration,
    /// Diffuse irradiance convolution.
    Irradiance,
    /// Roughness-indexed specular prefilter.
    SpecularPrefilter,
    /// Split-sum BRDF lookup table.
    BrdfIntegration,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PanoramaToCubemap => "panorama to cubemap",
            Self::MipGeneration => "mip generation",
            Self::Irradiance => "irradiance convolution",
            Self::SpecularPrefilter => "specular prefilter",
            Self::BrdfIntegration => "BRDF integration",
        };
        f.write_str(name)
    }
}
