//! GPU resource management for precomputed IBL maps.
//!
//! Provides headless wgpu device initialization, texture upload and the
//! bind group the shading stage consumes.

/// IBL uniform, textures, sampler and bind group.
pub mod bindings;
/// wgpu device and queue initialization.
pub mod render_context;
/// Host → GPU texture upload.
pub mod texture;

pub use bindings::{GpuIblTextures, IblUniform};
pub use render_context::{RenderContext, RenderContextError};
pub use texture::GpuTexture;
