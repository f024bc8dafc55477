//! Diffuse irradiance convolution.
//!
//! Every output texel treats its direction as a surface normal and
//! integrates the environment over the hemisphere around it on a regular
//! (φ, θ) grid, weighting each sample by `cos θ · sin θ` (Lambert term
//! times the solid-angle Jacobian) and normalising by the weight sum.

use std::f32::consts::{FRAC_PI_2, PI};
use std::time::Instant;

use glam::Vec3;

use super::equirect::EnvironmentCubemap;
use super::{CaptureTarget, PassContext, Stage};
use crate::cube::{write_face, CubeFace, CubeTexture};
use crate::error::IblError;
use crate::options::MIN_SAMPLE_DELTA;
use crate::util::sampling::tangent_frame;

/// Cosine-convolved environment, sampled by surface normal.
#[derive(Debug, Clone, PartialEq)]
pub struct IrradianceMap {
    cube: CubeTexture,
}

impl IrradianceMap {
    /// The single-level irradiance cube.
    #[must_use]
    pub fn cube(&self) -> &CubeTexture {
        &self.cube
    }

    /// Irradiance arriving at a surface with normal `n`.
    #[must_use]
    pub fn sample(&self, n: Vec3) -> Vec3 {
        self.cube.sample_level(n, 0)
    }

    /// Mean value of one face.
    #[must_use]
    pub fn face_average(&self, face: CubeFace) -> Vec3 {
        self.cube.level(0).face_average(face)
    }
}

/// Precomputed hemisphere integration grid in tangent space.
struct HemisphereGrid {
    /// Tangent-space sample directions.
    dirs: Vec<Vec3>,
    /// `cos θ · sin θ` per direction.
    weights: Vec<f32>,
    total_weight: f32,
}

impl HemisphereGrid {
    fn new(delta: f32) -> Self {
        let phi_steps = ((2.0 * PI / delta).round() as u32).max(1);
        let theta_steps = ((FRAC_PI_2 / delta).round() as u32).max(1);
        let d_phi = 2.0 * PI / phi_steps as f32;
        let d_theta = FRAC_PI_2 / theta_steps as f32;

        let count = phi_steps as usize * theta_steps as usize;
        let mut dirs = Vec::with_capacity(count);
        let mut weights = Vec::with_capacity(count);
        for i in 0..phi_steps {
            let phi = (i as f32 + 0.5) * d_phi;
            for j in 0..theta_steps {
                let theta = (j as f32 + 0.5) * d_theta;
                let (sin_t, cos_t) = theta.sin_cos();
                dirs.push(Vec3::new(sin_t * phi.cos(), sin_t * phi.sin(), cos_t));
                weights.push(cos_t * sin_t);
            }
        }
        let total_weight = weights.iter().sum();
        Self {
            dirs,
            weights,
            total_weight,
        }
    }

    fn len(&self) -> usize {
        self.dirs.len()
    }

    fn integrate(&self, env: &CubeTexture, n: Vec3, lod: f32) -> Vec3 {
        let (tangent, bitangent) = tangent_frame(n);
        let mut sum = Vec3::ZERO;
        for (d, w) in self.dirs.iter().zip(&self.weights) {
            let world = tangent * d.x + bitangent * d.y + n * d.z;
            sum += env.sample(world, lod) * *w;
        }
        sum / self.total_weight
    }
}

/// Source mip whose texels roughly span one integration step of `delta`
/// radians, so the sparse grid does not alias on fine detail.
fn source_lod(delta: f32, env: &CubeTexture) -> f32 {
    let texel_angle = FRAC_PI_2 / env.size() as f32;
    let max_lod = (env.mip_count() - 1) as f32;
    (delta / texel_angle).log2().clamp(0.0, max_lod)
}

/// Convolve `env` into a `size`² irradiance cube.
///
/// # Errors
///
/// Returns [`IblError::InvalidOptions`] for a zero `size` or a
/// `sample_delta` below [`MIN_SAMPLE_DELTA`],
/// [`IblError::ResourceAllocationFailed`] if the output cannot be
/// allocated, and [`IblError::PrecomputeFailed`] or [`IblError::Aborted`]
/// from the passes.
pub fn convolve(
    env: &EnvironmentCubemap,
    size: u32,
    sample_delta: f32,
    ctx: &PassContext<'_>,
) -> Result<IrradianceMap, IblError> {
    if !(sample_delta.is_finite() && sample_delta >= MIN_SAMPLE_DELTA) {
        return Err(IblError::InvalidOptions(format!(
            "irradiance sample delta must be at least {MIN_SAMPLE_DELTA}, \
             got {sample_delta}"
        )));
    }
    let start = Instant::now();
    let source = env.cube();
    let grid = HemisphereGrid::new(sample_delta);
    let lod = source_lod(sample_delta, source);
    log::debug!(
        "irradiance: {size}² faces, {} samples per texel from lod {lod:.2}",
        grid.len()
    );

    let mut cube = CubeTexture::allocate(size, 1)?;
    let mut target = CaptureTarget::acquire(Stage::Irradiance, size)?;
    let out = &mut cube.levels_mut()[0];
    for face in CubeFace::ALL {
        target.render(
            ctx,
            Some(face),
            0,
            size,
            &|x, y| {
                let n = face.texel_direction(x, y, size);
                grid.integrate(source, n, lod).extend(1.0)
            },
            |texels| write_face(out.face_mut(face), texels),
        )?;
    }

    log::info!(
        "irradiance map: {size}² with {} samples per texel in {:.1?}",
        grid.len(),
        start.elapsed()
    );
    Ok(IrradianceMap { cube })
}
