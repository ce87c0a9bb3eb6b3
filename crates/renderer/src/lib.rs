//! Renderer crate root.
//!
//! Owns every GPU resource of the viewer and exposes the per-frame operations
//! the frame loop sequences: preview, budgeted accumulation, postprocess and
//! present.
//!
//! Internal architecture overview:
//! - `scene_compute`: accumulation buffer, preview and tile kernels; the
//!   `TileKernel`/`TimestampQueries` implementation driven by the loop controller.
//! - `timestamps`: GPU timestamp queries with a host-clock fallback.
//! - `params`: uniform layouts and the host-side settings they are built from.
//! - `renderer_init`: device request and `Renderer::new`.
//! - `renderer_frame`: per-frame operations, resize and device health.

use std::sync::mpsc;

use rand::rngs::StdRng;

pub use params::{
    CoreParameters, DitherMode, ParseModeError, PostParameters, RenderSettings, TonemapMode,
    camera_basis,
};
pub use renderer_init::request_renderer_device;
pub use scene_compute::SceneCompute;
pub use timestamps::gpu_timestamp_features;

pub(crate) const PREVIEW_RAYMARCH_SHADER: &str = concat!(
    include_str!("scene.wgsl"),
    include_str!("preview_raymarch.wgsl")
);
pub(crate) const PATHTRACE_TILE_SHADER: &str = concat!(
    include_str!("scene.wgsl"),
    include_str!("pathtrace_tile.wgsl")
);
pub(crate) const POSTPROCESS_SHADER: &str = include_str!("postprocess.wgsl");
pub(crate) const DISPLAY_BLIT_SHADER: &str = include_str!("display_blit.wgsl");

/// Format of the postprocessed image the display blit samples.
pub const DISPLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("tile size {tile_size} must be a non-zero multiple of {}", tiles::TILE_WORKGROUP_EDGE)]
    InvalidTileSize { tile_size: u32 },
    #[error("frame extent {width}x{height} has zero area")]
    EmptyFrame { width: u32, height: u32 },
    #[error("accumulation buffer needs {bytes} bytes, device allows {limit}")]
    AccumulationTooLarge { bytes: u64, limit: u64 },
    #[error("surface texture unavailable: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("gpu device lost ({reason:?}): {message}")]
    DeviceLost {
        reason: wgpu::DeviceLostReason,
        message: String,
    },
    #[error("uncaptured gpu error: {0}")]
    Uncaptured(String),
}

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub tile_size: u32,
    pub settings: RenderSettings,
    /// Seeds the per-frame noise offsets. `None` seeds from the OS.
    pub noise_seed: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            tile_size: tiles::DEFAULT_TILE_SIZE,
            settings: RenderSettings::default(),
            noise_seed: None,
        }
    }
}

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
}

struct PresentState {
    post_uniform_buffer: wgpu::Buffer,
    post_bind_group_layout: wgpu::BindGroupLayout,
    post_bind_group: wgpu::BindGroup,
    post_pipeline: wgpu::ComputePipeline,
    blit_bind_group_layout: wgpu::BindGroupLayout,
    blit_bind_group: wgpu::BindGroup,
    blit_pipeline: wgpu::RenderPipeline,
}

struct ParameterState {
    settings: RenderSettings,
    post: PostParameters,
    noise_rng: StdRng,
}

struct DeviceHealth {
    lost_receiver: mpsc::Receiver<(wgpu::DeviceLostReason, String)>,
    error_receiver: mpsc::Receiver<String>,
}

pub struct Renderer {
    gpu_state: GpuState,
    scene: SceneCompute,
    present_state: PresentState,
    parameter_state: ParameterState,
    health: DeviceHealth,
}

mod params;

mod renderer_frame;

mod renderer_init;

mod scene_compute;

mod timestamps;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod wgsl_tests;
