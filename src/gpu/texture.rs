//! Host → GPU texture upload for precomputed IBL maps.

use glam::{Vec2, Vec3};
use half::f16;

use super::render_context::RenderContext;
use crate::cube::{CubeFace, CubeTexture};
use crate::error::IblError;
use crate::passes::brdf::BrdfLut;

/// A sampled GPU texture and its default view. The texture is destroyed
/// when this value is dropped.
pub struct GpuTexture {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// A default full-texture view (cube view for cube textures).
    pub view: wgpu::TextureView,
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

impl GpuTexture {
    /// Upload every mip of `cube` into a new `Rgba16Float` cube texture.
    #[must_use]
    pub fn cube(ctx: &RenderContext, label: &str, cube: &CubeTexture) -> Self {
        let size = cube.size();
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: cube.mip_count(),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (mip, level) in (0u32..).zip(cube.levels()) {
            let level_size = level.size();
            for face in CubeFace::ALL {
                let data = rgba16f_bytes(level.face(face));
                ctx.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: mip,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: face.index() as u32,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &data,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(level_size * 8),
                        rows_per_image: Some(level_size),
                    },
                    wgpu::Extent3d {
                        width: level_size,
                        height: level_size,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self { texture, view }
    }

    /// Upload the BRDF LUT as a `Rg16Float` 2D texture.
    /// R = scale, G = bias.
    #[must_use]
    pub fn brdf_lut(ctx: &RenderContext, lut: &BrdfLut) -> Self {
        let size = lut.size();
        let extent = wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        };
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("BRDF LUT"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rg16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rg16f_bytes(lut.texels()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size * 4),
                rows_per_image: Some(size),
            },
            extent,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Pack RGB texels as RGBA16F with alpha 1 (8 bytes per texel).
fn rgba16f_bytes(texels: &[Vec3]) -> Vec<u8> {
    let one = f16::ONE.to_le_bytes();
    let mut data = Vec::with_capacity(texels.len() * 8);
    for t in texels {
        data.extend_from_slice(&f16::from_f32(t.x).to_le_bytes());
        data.extend_from_slice(&f16::from_f32(t.y).to_le_bytes());
        data.extend_from_slice(&f16::from_f32(t.z).to_le_bytes());
        data.extend_from_slice(&one);
    }
    data
}

/// Pack `(scale, bias)` pairs as RG16F (4 bytes per texel).
fn rg16f_bytes(texels: &[Vec2]) -> Vec<u8> {
    let mut data = Vec::with_capacity(texels.len() * 4);
    for t in texels {
        data.extend_from_slice(&f16::from_f32(t.x).to_le_bytes());
        data.extend_from_slice(&f16::from_f32(t.y).to_le_bytes());
    }
    data
}

/// Reject cube and LUT sizes the device cannot hold before creating
/// anything.
///
/// # Errors
///
/// Returns [`IblError::ResourceAllocationFailed`] naming the texture that
/// exceeds the device limit.
pub fn check_size(
    ctx: &RenderContext,
    label: &str,
    size: u32,
) -> Result<(), IblError> {
    let max = ctx.max_cube_size();
    if size > max {
        return Err(IblError::ResourceAllocationFailed(format!(
            "{label} needs {size}² texels but the device allows {max}²"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_packing_layout() {
        let bytes = rgba16f_bytes(&[Vec3::new(1.0, 0.5, 2.0)]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(f16::from_le_bytes([bytes[2], bytes[3]]).to_f32(), 0.5);
        assert_eq!(f16::from_le_bytes([bytes[6], bytes[7]]).to_f32(), 1.0);

        let bytes = rg16f_bytes(&[Vec2::new(0.25, 0.75), Vec2::ZERO]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(), 0.25);
        assert_eq!(f16::from_le_bytes([bytes[2], bytes[3]]).to_f32(), 0.75);
    }
}
