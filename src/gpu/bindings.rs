//! IBL uniform, textures and bind group for the shading stage.

use wgpu::util::DeviceExt;

use super::render_context::RenderContext;
use super::texture::{check_size, GpuTexture};
use crate::error::IblError;
use crate::passes::brdf::BrdfLut;
use crate::passes::equirect::EnvironmentCubemap;
use crate::passes::irradiance::IrradianceMap;
use crate::passes::prefilter::PrefilteredSpecularMap;

/// GPU-side uniform read by the shading stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IblUniform {
    /// Number of roughness levels in the prefiltered cube; the shader picks
    /// `mip = roughness * (prefilter_mip_count - 1)`.
    pub prefilter_mip_count: u32,
    /// Number of mips in the environment cube (for skybox blur).
    pub environment_mip_count: u32,
    pub(crate) _pad0: u32,
    pub(crate) _pad1: u32,
}

/// The four uploaded IBL textures plus everything needed to bind them.
///
/// Dropping this value destroys the textures.
pub struct GpuIblTextures {
    /// Host copy of the uniform contents.
    pub uniform: IblUniform,
    /// Uniform buffer backing [`IblUniform`].
    pub buffer: wgpu::Buffer,
    /// Environment radiance cube with its full mip chain.
    pub environment: GpuTexture,
    /// Diffuse irradiance cube.
    pub irradiance: GpuTexture,
    /// Roughness-indexed specular cube.
    pub prefiltered: GpuTexture,
    /// Split-sum BRDF LUT.
    pub brdf_lut: GpuTexture,
    /// Shared trilinear clamp sampler.
    pub sampler: wgpu::Sampler,
    /// Layout of [`Self::bind_group`].
    pub layout: wgpu::BindGroupLayout,
    /// Bind group with the uniform, textures and sampler.
    pub bind_group: wgpu::BindGroup,
}

impl Drop for GpuIblTextures {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

fn cube_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    texture_entry(binding, wgpu::TextureViewDimension::Cube)
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

impl GpuIblTextures {
    /// Bind group layout expected by IBL shaders:
    ///
    /// | binding | resource                  |
    /// |---------|---------------------------|
    /// | 0       | [`IblUniform`]            |
    /// | 1       | irradiance cube           |
    /// | 2       | shared sampler            |
    /// | 3       | prefiltered specular cube |
    /// | 4       | BRDF LUT                  |
    /// | 5       | environment cube          |
    #[must_use]
    pub fn create_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("IBL Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                cube_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(
                        wgpu::SamplerBindingType::Filtering,
                    ),
                    count: None,
                },
                cube_entry(3),
                texture_entry(4, wgpu::TextureViewDimension::D2),
                cube_entry(5),
            ],
        })
    }

    /// Upload the maps of a `Ready` dataset.
    ///
    /// All resources are created inside out-of-memory and validation error
    /// scopes; either kind of error is reported as
    /// [`IblError::ResourceAllocationFailed`] and nothing is kept.
    ///
    /// # Errors
    ///
    /// See above. Sizes beyond the device limits are rejected before any
    /// resource is created.
    pub fn new(
        ctx: &RenderContext,
        environment: &EnvironmentCubemap,
        irradiance: &IrradianceMap,
        prefiltered: &PrefilteredSpecularMap,
        brdf: &BrdfLut,
    ) -> Result<Self, IblError> {
        check_size(ctx, "environment cubemap", environment.face_size())?;
        check_size(ctx, "irradiance map", irradiance.cube().size())?;
        check_size(ctx, "prefiltered map", prefiltered.cube().size())?;
        check_size(ctx, "BRDF LUT", brdf.size())?;

        ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let textures = Self::create(ctx, environment, irradiance, prefiltered, brdf);
        ctx.submit(ctx.create_encoder());

        let validation = pollster::block_on(ctx.device.pop_error_scope());
        let oom = pollster::block_on(ctx.device.pop_error_scope());
        if let Some(e) = oom.or(validation) {
            // `textures` is dropped here, destroying whatever was created.
            return Err(IblError::ResourceAllocationFailed(e.to_string()));
        }

        log::info!(
            "uploaded IBL textures: environment {}², irradiance {}², \
             prefiltered {}² x {}, BRDF LUT {}²",
            environment.face_size(),
            irradiance.cube().size(),
            prefiltered.cube().size(),
            prefiltered.mip_count(),
            brdf.size()
        );
        Ok(textures)
    }

    fn create(
        ctx: &RenderContext,
        environment: &EnvironmentCubemap,
        irradiance: &IrradianceMap,
        prefiltered: &PrefilteredSpecularMap,
        brdf: &BrdfLut,
    ) -> Self {
        let uniform = IblUniform {
            prefilter_mip_count: prefiltered.mip_count(),
            environment_mip_count: environment.cube().mip_count(),
            _pad0: 0,
            _pad1: 0,
        };
        let buffer =
            ctx.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("IBL Uniform Buffer"),
                    contents: bytemuck::cast_slice(&[uniform]),
                    usage: wgpu::BufferUsages::UNIFORM
                        | wgpu::BufferUsages::COPY_DST,
                });

        let environment =
            GpuTexture::cube(ctx, "Environment Cubemap", environment.cube());
        let irradiance =
            GpuTexture::cube(ctx, "Irradiance Cubemap", irradiance.cube());
        let prefiltered =
            GpuTexture::cube(ctx, "Prefiltered Cubemap", prefiltered.cube());
        let brdf_lut = GpuTexture::brdf_lut(ctx, brdf);

        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("IBL Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = Self::create_layout(&ctx.device);
        let bind_group =
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("IBL Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            &irradiance.view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(
                            &prefiltered.view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(
                            &brdf_lut.view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::TextureView(
                            &environment.view,
                        ),
                    },
                ],
            });

        Self {
            uniform,
            buffer,
            environment,
            irradiance,
            prefiltered,
            brdf_lut,
            sampler,
            layout,
            bind_group,
        }
    }

    /// Prefilter mip count exposed to the shading stage.
    #[must_use]
    pub fn mip_count(&self) -> u32 {
        self.uniform.prefilter_mip_count
    }
}
