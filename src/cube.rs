//! Cube faces, face/direction mapping and the host-side HDR cube texture.
//!
//! Face order is +X, -X, +Y, -Y, +Z, -Z, matching the array-layer order of
//! a wgpu cube texture. Face-local coordinates `(u, v)` span `[-1, 1]` with
//! `v` growing downwards in texel space.

use std::fmt;

use glam::{Vec3, Vec4};

use crate::error::IblError;
use crate::passes::{CaptureTarget, PassContext, Stage};

/// One of the six faces of a cube texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubeFace {
    /// All faces in array-layer order.
    pub const ALL: [Self; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Array-layer index of this face.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::PositiveX => 0,
            Self::NegativeX => 1,
            Self::PositiveY => 2,
            Self::NegativeY => 3,
            Self::PositiveZ => 4,
            Self::NegativeZ => 5,
        }
    }

    /// Unnormalized direction through face-local coordinates `(u, v)`.
    #[must_use]
    pub fn direction(self, u: f32, v: f32) -> Vec3 {
        match self {
            Self::PositiveX => Vec3::new(1.0, -v, -u),
            Self::NegativeX => Vec3::new(-1.0, -v, u),
            Self::PositiveY => Vec3::new(u, 1.0, v),
            Self::NegativeY => Vec3::new(u, -1.0, -v),
            Self::PositiveZ => Vec3::new(u, -v, 1.0),
            Self::NegativeZ => Vec3::new(-u, -v, -1.0),
        }
    }

    /// Normalized direction through the center of texel `(x, y)` of a face
    /// with `size`×`size` texels.
    #[must_use]
    pub fn texel_direction(self, x: u32, y: u32, size: u32) -> Vec3 {
        let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
        let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
        self.direction(u, v).normalize()
    }

    /// Inverse of [`CubeFace::direction`]: the face a direction hits and the
    /// face-local coordinates of the hit point. `dir` need not be normalized
    /// but must be non-zero.
    #[must_use]
    pub fn from_direction(dir: Vec3) -> (Self, f32, f32) {
        let abs = dir.abs();
        if abs.x >= abs.y && abs.x >= abs.z {
            if dir.x > 0.0 {
                (Self::PositiveX, -dir.z / abs.x, -dir.y / abs.x)
            } else {
                (Self::NegativeX, dir.z / abs.x, -dir.y / abs.x)
            }
        } else if abs.y >= abs.z {
            if dir.y > 0.0 {
                (Self::PositiveY, dir.x / abs.y, dir.z / abs.y)
            } else {
                (Self::NegativeY, dir.x / abs.y, -dir.z / abs.y)
            }
        } else if dir.z > 0.0 {
            (Self::PositiveZ, dir.x / abs.z, -dir.y / abs.z)
        } else {
            (Self::NegativeZ, -dir.x / abs.z, -dir.y / abs.z)
        }
    }
}

impl fmt::Display for CubeFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PositiveX => "+X",
            Self::NegativeX => "-X",
            Self::PositiveY => "+Y",
            Self::NegativeY => "-Y",
            Self::PositiveZ => "+Z",
            Self::NegativeZ => "-Z",
        };
        f.write_str(name)
    }
}

/// Number of levels in a full mip chain down to 1×1.
#[must_use]
pub const fn full_mip_count(size: u32) -> u32 {
    if size == 0 {
        0
    } else {
        u32::BITS - size.leading_zeros()
    }
}

/// Edge length of mip `mip` for a base edge length `size`.
#[must_use]
pub const fn mip_size(size: u32, mip: u32) -> u32 {
    let shifted = if mip >= u32::BITS { 0 } else { size >> mip };
    if shifted == 0 {
        1
    } else {
        shifted
    }
}

/// One mip level of a cube texture: six square faces stored face-major,
/// rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeLevel {
    size: u32,
    texels: Vec<Vec3>,
}

impl CubeLevel {
    fn allocate(size: u32) -> Result<Self, IblError> {
        let len = 6 * size as usize * size as usize;
        let mut texels = Vec::new();
        texels.try_reserve_exact(len).map_err(|e| {
            IblError::ResourceAllocationFailed(format!(
                "cube level {size}x{size}: {e}"
            ))
        })?;
        texels.resize(len, Vec3::ZERO);
        Ok(Self { size, texels })
    }

    /// Edge length of each face.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    fn face_len(&self) -> usize {
        self.size as usize * self.size as usize
    }

    /// Texels of one face, row-major.
    #[must_use]
    pub fn face(&self, face: CubeFace) -> &[Vec3] {
        let len = self.face_len();
        &self.texels[face.index() * len..(face.index() + 1) * len]
    }

    /// Mutable texels of one face, row-major.
    pub fn face_mut(&mut self, face: CubeFace) -> &mut [Vec3] {
        let len = self.face_len();
        &mut self.texels[face.index() * len..(face.index() + 1) * len]
    }

    /// All texels of all faces, face-major.
    #[must_use]
    pub fn texels(&self) -> &[Vec3] {
        &self.texels
    }

    /// Texel `(x, y)` of `face`, clamped to the face.
    #[must_use]
    pub fn texel(&self, face: CubeFace, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.size - 1) as usize;
        let y = y.min(self.size - 1) as usize;
        self.face(face)[y * self.size as usize + x]
    }

    /// Bilinear sample in direction `dir`, clamping at face edges.
    #[must_use]
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        let (face, u, v) = CubeFace::from_direction(dir);
        let max = (self.size - 1) as f32;
        let fx = ((u + 1.0) * 0.5 * self.size as f32 - 0.5).clamp(0.0, max);
        let fy = ((v + 1.0) * 0.5 * self.size as f32 - 0.5).clamp(0.0, max);

        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as u32, y0 as u32);

        let top = self
            .texel(face, x0, y0)
            .lerp(self.texel(face, x0 + 1, y0), tx);
        let bottom = self
            .texel(face, x0, y0 + 1)
            .lerp(self.texel(face, x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }

    /// 2×2 box average of this level at the texel that maps to `(x, y)` of
    /// the next-smaller level.
    #[must_use]
    pub fn downsample_texel(&self, face: CubeFace, x: u32, y: u32) -> Vec3 {
        let (x, y) = (x * 2, y * 2);
        (self.texel(face, x, y)
            + self.texel(face, x + 1, y)
            + self.texel(face, x, y + 1)
            + self.texel(face, x + 1, y + 1))
            * 0.25
    }

    /// Mean texel value of one face.
    #[must_use]
    pub fn face_average(&self, face: CubeFace) -> Vec3 {
        let texels = self.face(face);
        texels.iter().copied().sum::<Vec3>() / texels.len() as f32
    }
}

/// Host-side HDR cube texture with a mip chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeTexture {
    levels: Vec<CubeLevel>,
}

impl CubeTexture {
    /// Allocate a zero-filled cube of `size`² faces with `mip_count` levels.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::InvalidOptions`] for a zero size or mip count and
    /// [`IblError::ResourceAllocationFailed`] if storage cannot be reserved.
    pub fn allocate(size: u32, mip_count: u32) -> Result<Self, IblError> {
        if size == 0 || mip_count == 0 {
            return Err(IblError::InvalidOptions(format!(
                "cube texture needs a non-zero size and mip count \
                 (got {size}, {mip_count})"
            )));
        }
        if mip_count > full_mip_count(size) {
            return Err(IblError::InvalidOptions(format!(
                "{mip_count} mips requested but a {size}² face only has {}",
                full_mip_count(size)
            )));
        }
        let levels = (0..mip_count)
            .map(|mip| CubeLevel::allocate(mip_size(size, mip)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { levels })
    }

    /// Edge length of mip 0.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.levels[0].size
    }

    /// Number of mip levels.
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Mip level `mip`.
    ///
    /// # Panics
    ///
    /// Panics if `mip >= self.mip_count()`.
    #[must_use]
    pub fn level(&self, mip: u32) -> &CubeLevel {
        &self.levels[mip as usize]
    }

    /// All mip levels, largest first.
    #[must_use]
    pub fn levels(&self) -> &[CubeLevel] {
        &self.levels
    }

    pub(crate) fn levels_mut(&mut self) -> &mut [CubeLevel] {
        &mut self.levels
    }

    /// Rebuild every level below mip 0 with a 2×2 box filter, one level at
    /// a time: level `m` is fully written before level `m + 1` reads it.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::Aborted`] if cancelled between dispatches and
    /// [`IblError::PrecomputeFailed`] (stage [`Stage::MipGeneration`]) if a
    /// pass fails.
    pub fn generate_mips(&mut self, ctx: &PassContext<'_>) -> Result<(), IblError> {
        if self.levels.len() < 2 {
            return Ok(());
        }
        let mut target =
            CaptureTarget::acquire(Stage::MipGeneration, self.levels[1].size)?;
        for mip in 1..self.levels.len() {
            let (coarser, finer) = self.levels.split_at_mut(mip);
            let src = &coarser[mip - 1];
            let dst = &mut finer[0];
            let size = dst.size;
            for face in CubeFace::ALL {
                target.render(
                    ctx,
                    Some(face),
                    mip as u32,
                    size,
                    &|x, y| src.downsample_texel(face, x, y).extend(1.0),
                    |texels| write_face(dst.face_mut(face), texels),
                )?;
            }
        }
        Ok(())
    }

    /// Bilinear sample of a single mip level.
    #[must_use]
    pub fn sample_level(&self, dir: Vec3, mip: u32) -> Vec3 {
        let mip = mip.min(self.mip_count() - 1);
        self.levels[mip as usize].sample(dir)
    }

    /// Trilinear sample at fractional level-of-detail `lod`, clamped to the
    /// available mip range.
    #[must_use]
    pub fn sample(&self, dir: Vec3, lod: f32) -> Vec3 {
        let max_lod = (self.mip_count() - 1) as f32;
        let lod = lod.clamp(0.0, max_lod);
        let lower = lod.floor();
        let t = lod - lower;
        let lower = lower as u32;
        let base = self.sample_level(dir, lower);
        if t <= f32::EPSILON {
            return base;
        }
        base.lerp(self.sample_level(dir, lower + 1), t)
    }
}

/// Copy the RGB channels of a flushed capture target into a cube face.
pub(crate) fn write_face(face: &mut [Vec3], texels: &[Vec4]) {
    for (dst, src) in face.iter_mut().zip(texels) {
        *dst = src.truncate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{CancelToken, HostExecutor};

    #[test]
    fn face_direction_round_trips() {
        for face in CubeFace::ALL {
            for (u, v) in [(0.0, 0.0), (0.5, -0.25), (-0.9, 0.9)] {
                let (hit, hu, hv) = CubeFace::from_direction(face.direction(u, v));
                assert_eq!(hit, face);
                assert!((hu - u).abs() < 1e-6, "{face}: u {hu} != {u}");
                assert!((hv - v).abs() < 1e-6, "{face}: v {hv} != {v}");
            }
        }
    }

    #[test]
    fn face_centers_point_along_axes() {
        let axes = [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ];
        for (face, axis) in CubeFace::ALL.into_iter().zip(axes) {
            assert_eq!(face.direction(0.0, 0.0), axis);
            assert_eq!(CubeFace::ALL[face.index()], face);
        }
    }

    #[test]
    fn mip_helpers() {
        assert_eq!(full_mip_count(1024), 11);
        assert_eq!(full_mip_count(1), 1);
        assert_eq!(full_mip_count(0), 0);
        assert_eq!(mip_size(128, 4), 8);
        assert_eq!(mip_size(3, 5), 1);
    }

    #[test]
    fn allocate_rejects_overlong_mip_chain() {
        assert!(matches!(
            CubeTexture::allocate(8, 5),
            Err(IblError::InvalidOptions(_))
        ));
        assert!(matches!(
            CubeTexture::allocate(0, 1),
            Err(IblError::InvalidOptions(_))
        ));
        let cube = CubeTexture::allocate(8, 4).unwrap();
        assert_eq!(cube.mip_count(), 4);
        assert_eq!(cube.level(3).size(), 1);
    }

    #[test]
    fn bilinear_sample_of_constant_face_is_constant() {
        let mut cube = CubeTexture::allocate(4, 1).unwrap();
        for face in CubeFace::ALL {
            cube.levels_mut()[0]
                .face_mut(face)
                .fill(Vec3::new(0.25, 0.5, 2.0));
        }
        for dir in [Vec3::X, Vec3::new(1.0, 1.0, 0.3), Vec3::new(-0.2, 0.1, -1.0)]
        {
            let s = cube.sample(dir, 0.0);
            assert!((s - Vec3::new(0.25, 0.5, 2.0)).abs().max_element() < 1e-6);
        }
    }

    #[test]
    fn generated_mips_preserve_face_average() {
        let mut cube = CubeTexture::allocate(8, 4).unwrap();
        for face in CubeFace::ALL {
            for (i, texel) in cube.levels_mut()[0].face_mut(face).iter_mut().enumerate() {
                *texel = Vec3::splat((i % 7) as f32 + face.index() as f32);
            }
        }
        let cancel = CancelToken::new();
        let ctx = PassContext {
            executor: &HostExecutor,
            cancel: &cancel,
        };
        cube.generate_mips(&ctx).unwrap();
        for face in CubeFace::ALL {
            let top = cube.level(0).face_average(face);
            let bottom = cube.level(3).texel(face, 0, 0);
            assert!((top - bottom).abs().max_element() < 1e-4, "{face}");
        }
    }

    #[test]
    fn trilinear_sample_blends_levels() {
        let mut cube = CubeTexture::allocate(2, 2).unwrap();
        for face in CubeFace::ALL {
            cube.levels_mut()[0].face_mut(face).fill(Vec3::ZERO);
            cube.levels_mut()[1].face_mut(face).fill(Vec3::ONE);
        }
        let s = cube.sample(Vec3::Y, 0.25);
        assert!((s.x - 0.25).abs() < 1e-6);
        assert_eq!(cube.sample(Vec3::Y, 7.0), Vec3::ONE);
    }
}
