//! Split-sum BRDF integration lookup table.
//!
//! X axis = NdotV, Y axis = roughness (row 0 is the smoothest). Each texel
//! stores `(scale, bias)` for the Fresnel term:
//! `specular = prefiltered * (F0 * scale + bias)`.

use std::time::Instant;

use glam::{Vec2, Vec3, Vec4};

use super::{CaptureTarget, PassContext, Stage};
use crate::error::IblError;
use crate::util::sampling::{
    geometry_smith_ibl, hammersley, importance_sample_ggx_tangent,
};

/// The two-channel split-sum lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct BrdfLut {
    size: u32,
    sample_count: u32,
    texels: Vec<Vec2>,
}

impl BrdfLut {
    /// Wrap `(scale, bias)` pairs laid out row-major.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::CacheFormat`] if `pairs` does not hold exactly
    /// `size * size * 2` floats or any value lies outside `[0, 1]`.
    pub fn from_flat(
        size: u32,
        sample_count: u32,
        pairs: &[f32],
    ) -> Result<Self, IblError> {
        let expected = size as usize * size as usize * 2;
        if size == 0 || pairs.len() != expected {
            return Err(IblError::CacheFormat(format!(
                "{size}² LUT needs {expected} floats, got {}",
                pairs.len()
            )));
        }
        if pairs.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(IblError::CacheFormat(
                "LUT value outside [0, 1]".to_owned(),
            ));
        }
        let texels = pairs
            .chunks_exact(2)
            .map(|p| Vec2::new(p[0], p[1]))
            .collect();
        Ok(Self {
            size,
            sample_count,
            texels,
        })
    }

    /// Edge length.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// GGX samples integrated per texel.
    #[must_use]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// `(scale, bias)` of texel `(x, y)`, clamped to the table.
    #[must_use]
    pub fn texel(&self, x: u32, y: u32) -> Vec2 {
        let x = x.min(self.size - 1) as usize;
        let y = y.min(self.size - 1) as usize;
        self.texels[y * self.size as usize + x]
    }

    /// All texels, row-major.
    #[must_use]
    pub fn texels(&self) -> &[Vec2] {
        &self.texels
    }

    /// Flat `(scale, bias)` float pairs in row-major texel order.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f32> {
        self.texels.iter().flat_map(|t| t.to_array()).collect()
    }

    /// Bilinear lookup at `(n_dot_v, roughness)`, both in `[0, 1]`, clamped
    /// to texel centers like a clamp-to-edge sampler.
    #[must_use]
    pub fn sample(&self, n_dot_v: f32, roughness: f32) -> Vec2 {
        let max = (self.size - 1) as f32;
        let fx = (n_dot_v.clamp(0.0, 1.0) * self.size as f32 - 0.5).clamp(0.0, max);
        let fy = (roughness.clamp(0.0, 1.0) * self.size as f32 - 0.5).clamp(0.0, max);
        let x0 = fx.floor();
        let y0 = fy.floor();
        let (tx, ty) = (fx - x0, fy - y0);
        let (x0, y0) = (x0 as u32, y0 as u32);

        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), tx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }
}

/// Integrate the BRDF for given NdotV and roughness using importance
/// sampling. Returns `(scale, bias)` for the split-sum approximation.
#[must_use]
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let n_dot_v = n_dot_v.clamp(0.001, 1.0); // Avoid division by zero
    let roughness = roughness.clamp(0.01, 1.0);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);

    let mut a = 0.0f32;
    let mut b = 0.0f32;
    for i in 0..sample_count {
        let h = importance_sample_ggx_tangent(hammersley(i, sample_count), roughness);
        let v_dot_h = v.dot(h);
        let l = 2.0 * v_dot_h * h - v;

        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v_dot_h.clamp(0.0, 1.0);

        if n_dot_l > 0.0 {
            let g = geometry_smith_ibl(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(0.0001);
            let fc = (1.0 - v_dot_h).powi(5);

            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }

    let n = sample_count.max(1) as f32;
    Vec2::new(a / n, b / n).clamp(Vec2::ZERO, Vec2::ONE)
}

/// Compute the `size`² LUT with `sample_count` GGX samples per texel.
///
/// Pure: the same arguments always produce the same table.
///
/// # Errors
///
/// Returns [`IblError::InvalidOptions`] for a zero size or sample count,
/// [`IblError::ResourceAllocationFailed`] if the target cannot be
/// allocated, and [`IblError::PrecomputeFailed`] or [`IblError::Aborted`]
/// from the pass.
pub fn integrate(
    size: u32,
    sample_count: u32,
    ctx: &PassContext<'_>,
) -> Result<BrdfLut, IblError> {
    if size == 0 || sample_count == 0 {
        return Err(IblError::InvalidOptions(format!(
            "BRDF LUT needs a non-zero size and sample count \
             (got {size}, {sample_count})"
        )));
    }
    let start = Instant::now();
    log::debug!("BRDF LUT: {size}², {sample_count} samples per texel");

    let mut target = CaptureTarget::acquire(Stage::BrdfIntegration, size)?;
    let mut texels: Vec<Vec2> = Vec::new();
    target.render(
        ctx,
        None,
        0,
        size,
        &|x, y| {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let roughness = (y as f32 + 0.5) / size as f32;
            let t = integrate_brdf(n_dot_v, roughness, sample_count);
            Vec4::new(t.x, t.y, 0.0, 1.0)
        },
        |out| texels = out.iter().map(|t| Vec2::new(t.x, t.y)).collect(),
    )?;

    log::info!(
        "BRDF LUT: {size}² with {sample_count} samples in {:.1?}",
        start.elapsed()
    );
    Ok(BrdfLut {
        size,
        sample_count,
        texels,
    })
}
