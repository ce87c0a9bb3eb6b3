//! Accumulation buffer and the two compute kernels that write it.
//!
//! `SceneCompute` is the wgpu side of budgeted accumulation: it implements
//! [`TileKernel`] and [`TimestampQueries`] so the loop controller can drive it
//! directly. Each tile is its own submission, so consecutive tiles are
//! separated by a full barrier.

use frame_scheduler::{TileKernel, TimestampMarker, TimestampQueries};
use tiles::{FrameExtent, TILE_WORKGROUP_EDGE, Tile};

use crate::timestamps::FrameTimestamps;
use crate::{
    CoreParameters, PATHTRACE_TILE_SHADER, PREVIEW_RAYMARCH_SHADER, RenderSettings, RendererError,
};

const ACCUMULATION_TEXEL_BYTES: u64 = 16;

pub struct SceneCompute {
    device: wgpu::Device,
    queue: wgpu::Queue,
    extent: FrameExtent,
    tile_size: u32,
    core: CoreParameters,
    accumulation_buffer: wgpu::Buffer,
    core_uniform_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    preview_pipeline: wgpu::ComputePipeline,
    tile_pipeline: wgpu::ComputePipeline,
    timestamps: FrameTimestamps,
}

impl SceneCompute {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        extent: FrameExtent,
        tile_size: u32,
        settings: &RenderSettings,
    ) -> Result<Self, RendererError> {
        if tile_size == 0 || tile_size % TILE_WORKGROUP_EDGE != 0 {
            return Err(RendererError::InvalidTileSize { tile_size });
        }
        let accumulation_buffer = create_accumulation_buffer(device, extent)?;

        let core = CoreParameters::new(settings, extent, tile_size);
        let core_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.scene.core_uniform"),
            size: std::mem::size_of::<CoreParameters>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&core_uniform_buffer, 0, bytemuck::bytes_of(&core));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("renderer.scene.layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let bind_group = create_scene_bind_group(
            device,
            &bind_group_layout,
            &accumulation_buffer,
            &core_uniform_buffer,
        );

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.scene.pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let preview_pipeline = create_compute_pipeline(
            device,
            &pipeline_layout,
            "renderer.scene.preview",
            PREVIEW_RAYMARCH_SHADER,
        );
        let tile_pipeline = create_compute_pipeline(
            device,
            &pipeline_layout,
            "renderer.scene.pathtrace_tile",
            PATHTRACE_TILE_SHADER,
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            extent,
            tile_size,
            core,
            accumulation_buffer,
            core_uniform_buffer,
            bind_group_layout,
            bind_group,
            preview_pipeline,
            tile_pipeline,
            timestamps: FrameTimestamps::for_device(device, queue),
        })
    }

    pub fn extent(&self) -> FrameExtent {
        self.extent
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn uses_gpu_timestamps(&self) -> bool {
        self.timestamps.is_gpu()
    }

    /// `width * height` texels of `vec4<f32>`: running mean in rgb, sample
    /// count in w.
    pub fn accumulation_buffer(&self) -> &wgpu::Buffer {
        &self.accumulation_buffer
    }

    pub fn set_noise_offset(&mut self, noise_offset: [u32; 2]) {
        self.core.noise_offset = noise_offset;
        self.upload_core();
    }

    /// Reallocates the accumulation buffer for `extent`. The new buffer starts
    /// zeroed, so the next accumulated sample starts a fresh mean.
    pub fn resize(&mut self, extent: FrameExtent) -> Result<(), RendererError> {
        self.accumulation_buffer = create_accumulation_buffer(&self.device, extent)?;
        self.bind_group = create_scene_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.accumulation_buffer,
            &self.core_uniform_buffer,
        );
        self.extent = extent;
        self.core.resolution = [extent.width, extent.height];
        self.upload_core();
        Ok(())
    }

    pub fn clear_accumulation(&mut self) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer.scene.clear"),
            });
        encoder.clear_buffer(&self.accumulation_buffer, 0, None);
        self.queue.submit(Some(encoder.finish()));
    }

    /// Full-frame raymarch. Resets every sample count to zero.
    pub fn dispatch_preview(&mut self) {
        self.core.tile_offset = [0, 0];
        self.upload_core();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer.scene.preview"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("renderer.scene.preview.pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.preview_pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(
                self.extent.width.div_ceil(TILE_WORKGROUP_EDGE),
                self.extent.height.div_ceil(TILE_WORKGROUP_EDGE),
                1,
            );
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn upload_core(&self) {
        self.queue
            .write_buffer(&self.core_uniform_buffer, 0, bytemuck::bytes_of(&self.core));
    }
}

impl TileKernel for SceneCompute {
    fn dispatch_tile(&mut self, tile: Tile) {
        self.core.tile_offset = [tile.x, tile.y];
        self.upload_core();

        let workgroups = self.tile_size / TILE_WORKGROUP_EDGE;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer.scene.tile"),
            });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("renderer.scene.tile.pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.tile_pipeline);
            compute_pass.set_bind_group(0, &self.bind_group, &[]);
            compute_pass.dispatch_workgroups(workgroups, workgroups, 1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}

impl TimestampQueries for SceneCompute {
    fn write_timestamp(&mut self, marker: TimestampMarker) {
        self.timestamps.write(&self.device, &self.queue, marker);
    }

    fn read_timestamp_ns(&mut self, marker: TimestampMarker) -> Option<u64> {
        self.timestamps.read_ns(&self.device, marker)
    }
}

fn create_accumulation_buffer(
    device: &wgpu::Device,
    extent: FrameExtent,
) -> Result<wgpu::Buffer, RendererError> {
    if extent.is_empty() {
        return Err(RendererError::EmptyFrame {
            width: extent.width,
            height: extent.height,
        });
    }
    let bytes = extent.pixel_count() * ACCUMULATION_TEXEL_BYTES;
    let limits = device.limits();
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    if bytes > limit {
        return Err(RendererError::AccumulationTooLarge { bytes, limit });
    }
    Ok(device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("renderer.scene.accumulation"),
        size: bytes,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    }))
}

fn create_scene_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    accumulation_buffer: &wgpu::Buffer,
    core_uniform_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("renderer.scene.bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: accumulation_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: core_uniform_buffer.as_entire_binding(),
            },
        ],
    })
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &str,
    source: &str,
) -> wgpu::ComputePipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}
