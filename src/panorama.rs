//! Equirectangular HDR panorama input and the direction ↔ (u, v) mapping.
//!
//! Row 0 of the panorama is the top of the image and looks along +Y;
//! `u` runs around the horizon starting at -X.

use std::f32::consts::PI;

use glam::Vec3;

use crate::cube::CubeTexture;
use crate::error::IblError;

/// Decoded linear-light panorama. Immutable once validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Panorama {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl Panorama {
    /// Validate and take ownership of a decoded pixel buffer.
    ///
    /// `pixels` holds `width * height * channels` floats, rows top to
    /// bottom. With 4 channels the alpha channel is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::InvalidInput`] for zero dimensions, a channel
    /// count other than 3 or 4, a buffer of the wrong length, or
    /// non-finite pixel values.
    pub fn new(
        width: u32,
        height: u32,
        channels: u32,
        pixels: &[f32],
    ) -> Result<Self, IblError> {
        if width == 0 || height == 0 {
            return Err(IblError::InvalidInput(format!(
                "panorama has zero extent ({width}x{height})"
            )));
        }
        if !matches!(channels, 3 | 4) {
            return Err(IblError::InvalidInput(format!(
                "panorama must have 3 or 4 channels, got {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(IblError::InvalidInput(format!(
                "panorama buffer holds {} floats, expected {expected}",
                pixels.len()
            )));
        }
        if let Some(index) = pixels.iter().position(|p| !p.is_finite()) {
            return Err(IblError::InvalidInput(format!(
                "panorama contains a non-finite value at float {index}"
            )));
        }

        let pixels = pixels
            .chunks_exact(channels as usize)
            .map(|px| Vec3::new(px[0], px[1], px[2]))
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a panorama by evaluating `f` at the direction through every
    /// pixel center.
    ///
    /// # Errors
    ///
    /// Returns [`IblError::InvalidInput`] for zero dimensions or if `f`
    /// yields non-finite values.
    pub fn from_fn(
        width: u32,
        height: u32,
        f: impl Fn(Vec3) -> Vec3,
    ) -> Result<Self, IblError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                let u = (x as f32 + 0.5) / width as f32;
                let v = (y as f32 + 0.5) / height as f32;
                pixels.extend_from_slice(&f(equirect_direction(u, v)).to_array());
            }
        }
        Self::new(width, height, 3, &pixels)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel `(x, y)`; `x` wraps around the horizon, `y` clamps at the poles.
    #[must_use]
    pub fn pixel(&self, x: i64, y: i64) -> Vec3 {
        let x = x.rem_euclid(i64::from(self.width)) as usize;
        let y = y.clamp(0, i64::from(self.height) - 1) as usize;
        self.pixels[y * self.width as usize + x]
    }

    /// Bilinear sample at equirectangular coordinates `(u, v)` in `[0, 1]`.
    #[must_use]
    pub fn sample_uv(&self, u: f32, v: f32) -> Vec3 {
        let fx = u * self.width as f32 - 0.5;
        let fy = v * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.pixel(x0, y0).lerp(self.pixel(x0 + 1, y0), tx);
        let bottom = self.pixel(x0, y0 + 1).lerp(self.pixel(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }

    /// Bilinear sample of the radiance arriving from direction `dir`.
    #[must_use]
    pub fn sample_direction(&self, dir: Vec3) -> Vec3 {
        let (u, v) = direction_to_equirect(dir);
        self.sample_uv(u, v)
    }
}

/// Equirectangular coordinates of a direction:
/// `u = atan2(z, x) / 2π + 0.5`, `v = acos(y) / π`.
#[must_use]
pub fn direction_to_equirect(dir: Vec3) -> (f32, f32) {
    let dir = dir.normalize();
    let u = dir.z.atan2(dir.x) / (2.0 * PI) + 0.5;
    let v = dir.y.clamp(-1.0, 1.0).acos() / PI;
    (u, v)
}

/// Unit direction for equirectangular coordinates `(u, v)`; inverse of
/// [`direction_to_equirect`].
#[must_use]
pub fn equirect_direction(u: f32, v: f32) -> Vec3 {
    let phi = (u - 0.5) * 2.0 * PI;
    let theta = v * PI;
    Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin())
}

/// Project a cube texture (mip 0) back to an equirectangular pixel grid,
/// rows top to bottom.
#[must_use]
pub fn reproject_to_equirect(
    cube: &CubeTexture,
    width: u32,
    height: u32,
) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let u = (x as f32 + 0.5) / width as f32;
            let v = (y as f32 + 0.5) / height as f32;
            out.push(cube.sample_level(equirect_direction(u, v), 0));
        }
    }
    out
}
