//! Roughness-indexed specular prefilter (pre-filtered importance sampling).
//!
//! Mip `m` of `N` stores the environment convolved with a GGX lobe of
//! roughness `m / (N - 1)`, under the usual `N = V = R` assumption. Each
//! sample is fetched from the source mip whose texel solid angle matches
//! the solid angle the sample represents.

use std::f32::consts::PI;
use std::time::Instant;

use glam::Vec3;

use super::equirect::EnvironmentCubemap;
use super::{CaptureTarget, PassContext, Stage};
use crate::cube::{write_face, CubeFace, CubeTexture};
use crate::error::IblError;
use crate::options::PrefilterOptions;
use crate::util::sampling::{
    distribution_ggx, hammersley, importance_sample_ggx, reflect_about,
};

/// Specular environment with one roughness level per mip.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefilteredSpecularMap {
    cube: CubeTexture,
}

impl PrefilteredSpecularMap {
    /// The prefiltered cube; mip `m` holds roughness `m / (mip_count - 1)`.
    #[must_use]
    pub fn cube(&self) -> &CubeTexture {
        &self.cube
    }

    /// Number of roughness levels.
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.cube.mip_count()
    }

    /// Level of detail that stores `roughness`.
    #[must_use]
    pub fn lod_for_roughness(&self, roughness: f32) -> f32 {
        roughness.clamp(0.0, 1.0) * (self.mip_count() - 1) as f32
    }

    /// Prefiltered radiance along reflection vector `r` for `roughness`,
    /// interpolating between the two nearest roughness levels.
    #[must_use]
    pub fn sample(&self, r: Vec3, roughness: f32) -> Vec3 {
        self.cube.sample(r, self.lod_for_roughness(roughness))
    }
}

/// Fixed per-roughness sample pattern, shared by every texel of a mip.
struct LobeSamples {
    /// Unit-square Hammersley points.
    points: Vec<glam::Vec2>,
    roughness: f32,
}

impl LobeSamples {
    fn new(count: u32, roughness: f32) -> Self {
        Self {
            points: (0..count).map(|i| hammersley(i, count)).collect(),
            roughness,
        }
    }

    fn integrate(&self, env: &CubeTexture, n: Vec3) -> Vec3 {
        let source_size = env.size() as f32;
        let sa_texel = 4.0 * PI / (6.0 * source_size * source_size);
        let max_lod = (env.mip_count() - 1) as f32;
        let count = self.points.len() as f32;

        let mut sum = Vec3::ZERO;
        let mut weight = 0.0;
        for xi in &self.points {
            let h = importance_sample_ggx(*xi, n, self.roughness);
            let l = reflect_about(n, h);
            let n_dot_l = n.dot(l);
            if n_dot_l <= 0.0 {
                continue;
            }
            // With V = N, NdotH == HdotV and the pdf reduces to D / 4.
            let n_dot_h = n.dot(h).max(0.0);
            let pdf = distribution_ggx(n_dot_h, self.roughness) / 4.0 + 1e-4;
            let sa_sample = 1.0 / (count * pdf + 1e-4);
            let lod = (0.5 * (sa_sample / sa_texel).log2()).clamp(0.0, max_lod);

            sum += env.sample(l, lod) * n_dot_l;
            weight += n_dot_l;
        }
        if weight > 0.0 {
            sum / weight
        } else {
            env.sample_level(n, 0)
        }
    }
}

/// Source level of detail whose texel size matches an output face of
/// `size`²; zero when the output is at least as fine as the source.
fn mirror_lod(source: &CubeTexture, size: u32) -> f32 {
    (source.size() as f32 / size as f32).log2().max(0.0)
}

/// Build the prefiltered specular chain of `env`.
///
/// # Errors
///
/// Returns [`IblError::InvalidOptions`] if the options describe an empty
/// or overlong chain, [`IblError::ResourceAllocationFailed`] if the output
/// cannot be allocated, and [`IblError::PrecomputeFailed`] or
/// [`IblError::Aborted`] from the passes.
pub fn prefilter(
    env: &EnvironmentCubemap,
    options: &PrefilterOptions,
    ctx: &PassContext<'_>,
) -> Result<PrefilteredSpecularMap, IblError> {
    let start = Instant::now();
    let source = env.cube();
    let mut cube = CubeTexture::allocate(options.base_size, options.mip_count)?;
    let mut target =
        CaptureTarget::acquire(Stage::SpecularPrefilter, options.base_size)?;

    for (mip, level) in cube.levels_mut().iter_mut().enumerate() {
        let mip = mip as u32;
        let size = level.size();
        let roughness = options.roughness_for_mip(mip);
        let samples = options.samples.samples_for(roughness);
        log::debug!(
            "prefilter mip {mip}: {size}², roughness {roughness:.2}, \
             {samples} samples"
        );

        if roughness <= 0.0 {
            // Mirror reflection: a single fetch along N from the source
            // level whose texels match this level's footprint.
            let lod = mirror_lod(source, size);
            for face in CubeFace::ALL {
                target.render(
                    ctx,
                    Some(face),
                    mip,
                    size,
                    &|x, y| {
                        let n = face.texel_direction(x, y, size);
                        source.sample(n, lod).extend(1.0)
                    },
                    |texels| write_face(level.face_mut(face), texels),
                )?;
            }
            continue;
        }

        let lobe = LobeSamples::new(samples, roughness);
        for face in CubeFace::ALL {
            target.render(
                ctx,
                Some(face),
                mip,
                size,
                &|x, y| {
                    let n = face.texel_direction(x, y, size);
                    lobe.integrate(source, n).extend(1.0)
                },
                |texels| write_face(level.face_mut(face), texels),
            )?;
        }
    }

    log::info!(
        "prefiltered specular map: {}² x {} mips, {}..{} samples in {:.1?}",
        options.base_size,
        options.mip_count,
        options.samples.samples_for(0.0),
        options.samples.samples_for(1.0),
        start.elapsed()
    );
    Ok(PrefilteredSpecularMap { cube })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SampleBudget;
    use crate::panorama::Panorama;
    use crate::passes::equirect::convert;
    use crate::passes::{CancelToken, HostExecutor};

    fn small_options() -> PrefilterOptions {
        PrefilterOptions {
            base_size: 8,
            mip_count: 4,
            samples: SampleBudget {
                min_samples: 16,
                max_samples: 64,
            },
        }
    }

    fn run(pano: &Panorama, face_size: u32) -> (EnvironmentCubemap, PrefilteredSpecularMap) {
        let cancel = CancelToken::new();
        let ctx = PassContext {
            executor: &HostExecutor,
            cancel: &cancel,
        };
        let env = convert(pano, face_size, &ctx).unwrap();
        let map = prefilter(&env, &small_options(), &ctx).unwrap();
        (env, map)
    }

    fn gradient() -> Panorama {
        Panorama::from_fn(32, 16, |dir| {
            Vec3::new(dir.x * 0.5 + 0.5, dir.y * 0.5 + 0.5, dir.z * 0.5 + 0.5)
        })
        .unwrap()
    }

    #[test]
    fn mip_zero_matches_source() {
        // Same resolution: roughness 0 reproduces the source texels.
        let (env, map) = run(&gradient(), 8);
        for face in CubeFace::ALL {
            let src = env.cube().level(0).face(face);
            let dst = map.cube().level(0).face(face);
            for (a, b) in src.iter().zip(dst) {
                assert!((*a - *b).abs().max_element() < 1e-5);
            }
        }
    }

    #[test]
    fn mip_zero_is_box_filtered_when_source_is_larger() {
        // One-texel checker: a point sample at the coarse resolution would
        // pick out individual squares instead of their average.
        let (width, height) = (512u32, 256u32);
        let pixels: Vec<f32> = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + y) % 2) as f32))
            .flat_map(|v| [v, v, v])
            .collect();
        let pano = Panorama::new(width, height, 3, &pixels).unwrap();
        let (env, map) = run(&pano, 64);

        assert!((mirror_lod(env.cube(), 8) - 3.0).abs() < 1e-6);
        let mut worst = 0.0f32;
        for face in CubeFace::ALL {
            let src = env.cube().level(3).face(face);
            let dst = map.cube().level(0).face(face);
            for (a, b) in src.iter().zip(dst) {
                worst = worst.max((*a - *b).abs().max_element());
            }
        }
        assert!(worst < 1e-4, "worst difference {worst}");
    }

    #[test]
    fn constant_environment_stays_constant() {
        let color = Vec3::new(2.0, 1.0, 0.5);
        let pano = Panorama::from_fn(16, 8, |_| color).unwrap();
        let (_, map) = run(&pano, 8);
        for level in map.cube().levels() {
            for texel in level.texels() {
                assert!((*texel - color).abs().max_element() < 1e-3);
            }
        }
    }

    #[test]
    fn rough_levels_blur_the_environment() {
        let (env, map) = run(&gradient(), 8);
        // Contrast between opposite faces shrinks as roughness grows.
        let contrast = |cube: &CubeTexture, mip: u32| {
            let level = cube.level(mip);
            (level.face_average(CubeFace::PositiveX)
                - level.face_average(CubeFace::NegativeX))
            .x
        };
        let sharp = contrast(env.cube(), 0);
        let rough = contrast(map.cube(), 3);
        assert!(rough < sharp, "{rough} >= {sharp}");
        assert!(rough > 0.0);
    }

    #[test]
    fn prefilter_is_deterministic() {
        let (_, a) = run(&gradient(), 8);
        let (_, b) = run(&gradient(), 8);
        assert_eq!(a, b);
    }

    #[test]
    fn lod_maps_roughness_linearly() {
        let (_, map) = run(&gradient(), 8);
        assert_eq!(map.mip_count(), 4);
        assert_eq!(map.lod_for_roughness(0.0), 0.0);
        assert_eq!(map.lod_for_roughness(1.0), 3.0);
        assert_eq!(map.lod_for_roughness(2.0), 3.0);
    }
}
