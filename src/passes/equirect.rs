//! Panorama → environment cubemap capture.

use std::time::Instant;

use super::{CaptureTarget, PassContext, Stage};
use crate::cube::{full_mip_count, write_face, CubeFace, CubeTexture};
use crate::error::IblError;
use crate::panorama::Panorama;

/// Environment radiance as a cube texture with a full mip chain.
///
/// Owned exclusively by the dataset that captured it; dropping it releases
/// its storage.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentCubemap {
    cube: CubeTexture,
}

impl EnvironmentCubemap {
    /// The captured cube texture.
    #[must_use]
    pub fn cube(&self) -> &CubeTexture {
        &self.cube
    }

    /// Edge length of mip 0.
    #[must_use]
    pub fn face_size(&self) -> u32 {
        self.cube.size()
    }
}

/// Render each face of a `face_size`² cube by looking up the panorama along
/// the direction through every texel, then build the mip chain.
///
/// # Errors
///
/// Returns [`IblError::InvalidOptions`] for a zero `face_size`,
/// [`IblError::ResourceAllocationFailed`] if the cube or capture target
/// cannot be allocated, and [`IblError::PrecomputeFailed`] or
/// [`IblError::Aborted`] from the passes.
pub fn convert(
    panorama: &Panorama,
    face_size: u32,
    ctx: &PassContext<'_>,
) -> Result<EnvironmentCubemap, IblError> {
    let start = Instant::now();
    log::debug!(
        "capturing {}x{} panorama into {face_size}² cube",
        panorama.width(),
        panorama.height()
    );

    let mut cube = CubeTexture::allocate(face_size, full_mip_count(face_size))?;
    let mut target = CaptureTarget::acquire(Stage::PanoramaToCubemap, face_size)?;
    let base = &mut cube.levels_mut()[0];
    for face in CubeFace::ALL {
        target.render(
            ctx,
            Some(face),
            0,
            face_size,
            &|x, y| {
                let dir = face.texel_direction(x, y, face_size);
                panorama.sample_direction(dir).extend(1.0)
            },
            |texels| write_face(base.face_mut(face), texels),
        )?;
    }
    drop(target);

    cube.generate_mips(ctx)?;

    log::info!(
        "environment cubemap: {face_size}² x {} mips in {:.1?}",
        cube.mip_count(),
        start.elapsed()
    );
    Ok(EnvironmentCubemap { cube })
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::panorama::reproject_to_equirect;
    use crate::passes::{CancelToken, HostExecutor};

    fn with_ctx<R>(f: impl FnOnce(&PassContext<'_>) -> R) -> R {
        let cancel = CancelToken::new();
        f(&PassContext {
            executor: &HostExecutor,
            cancel: &cancel,
        })
    }

    #[test]
    fn constant_panorama_gives_constant_cube() {
        let color = Vec3::new(0.2, 0.4, 3.0);
        let pano = Panorama::from_fn(8, 4, |_| color).unwrap();
        let env = with_ctx(|ctx| convert(&pano, 4, ctx)).unwrap();
        assert_eq!(env.face_size(), 4);
        assert_eq!(env.cube().mip_count(), 3);
        for level in env.cube().levels() {
            for texel in level.texels() {
                assert!((*texel - color).abs().max_element() < 1e-5);
            }
        }
    }

    #[test]
    fn axis_faces_see_matching_hemispheres() {
        // Bright above the horizon, dark below.
        let pano = Panorama::from_fn(64, 32, |dir| {
            if dir.y > 0.0 {
                Vec3::ONE
            } else {
                Vec3::ZERO
            }
        })
        .unwrap();
        let env = with_ctx(|ctx| convert(&pano, 8, ctx)).unwrap();
        let level = env.cube().level(0);
        assert!(level.face_average(CubeFace::PositiveY).x > 0.99);
        assert!(level.face_average(CubeFace::NegativeY).x < 0.01);
        assert!((level.face_average(CubeFace::PositiveZ).x - 0.5).abs() < 0.1);
    }

    #[test]
    fn reprojection_round_trip_is_bounded() {
        let pano = Panorama::from_fn(64, 32, |dir| {
            Vec3::new(dir.x * 0.5 + 0.5, dir.y * 0.5 + 0.5, 1.0)
        })
        .unwrap();
        let env = with_ctx(|ctx| convert(&pano, 32, ctx)).unwrap();
        let back = reproject_to_equirect(env.cube(), 64, 32);
        let mut worst = 0.0f32;
        for y in 0..32 {
            for x in 0..64 {
                let diff = back[y * 64 + x] - pano.pixel(x as i64, y as i64);
                worst = worst.max(diff.abs().max_element());
            }
        }
        assert!(worst < 0.1, "worst per-pixel error {worst}");
    }

    #[test]
    fn cancellation_aborts_capture() {
        let pano = Panorama::from_fn(4, 2, |_| Vec3::ONE).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = PassContext {
            executor: &HostExecutor,
            cancel: &cancel,
        };
        assert!(matches!(convert(&pano, 4, &ctx), Err(IblError::Aborted)));
    }
}
