//! Renderer initialization and GPU resource construction.
//!
//! This module owns `Renderer::new` and the helpers that allocate the
//! postprocess and display resources which depend on the surface size.

use std::sync::{Arc, mpsc};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tiles::FrameExtent;

use crate::timestamps::gpu_timestamp_features;
use crate::{
    DISPLAY_BLIT_SHADER, DISPLAY_FORMAT, DeviceHealth, GpuState, POSTPROCESS_SHADER,
    ParameterState, PostParameters, PresentState, Renderer, RendererConfig, RendererError,
    SceneCompute,
};

/// Requests a device with encoder timestamp queries when the adapter offers
/// them. Without them accumulation falls back to host-clock timing.
pub async fn request_renderer_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), wgpu::RequestDeviceError> {
    let timestamp_features = gpu_timestamp_features();
    let required_features = if adapter.features().contains(timestamp_features) {
        timestamp_features
    } else {
        wgpu::Features::empty()
    };
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("renderer.device"),
            required_features,
            required_limits: adapter.limits(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
}

impl Renderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface: wgpu::Surface<'static>,
        surface_config: wgpu::SurfaceConfiguration,
        config: RendererConfig,
    ) -> Result<Self, RendererError> {
        let (device_lost_sender, lost_receiver) = mpsc::channel();
        device.set_device_lost_callback(move |reason, message| {
            let _ = device_lost_sender.send((reason, message));
        });
        let (uncaptured_error_sender, error_receiver) = mpsc::channel();
        device.on_uncaptured_error(Arc::new(move |error| {
            let _ = uncaptured_error_sender.send(error.to_string());
        }));

        surface.configure(&device, &surface_config);
        let extent = FrameExtent::new(surface_config.width, surface_config.height);

        let scene = SceneCompute::new(&device, &queue, extent, config.tile_size, &config.settings)?;

        let post = PostParameters::new(&config.settings, extent);
        let post_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.post.uniform"),
            size: std::mem::size_of::<PostParameters>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&post_uniform_buffer, 0, bytemuck::bytes_of(&post));

        let post_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.post.layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
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
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: DISPLAY_FORMAT,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: None,
                    },
                ],
            });
        let blit_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.blit.layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                }],
            });

        let display_view = Self::create_display_view(&device, extent);
        let post_bind_group = Self::create_post_bind_group(
            &device,
            &post_bind_group_layout,
            scene.accumulation_buffer(),
            &post_uniform_buffer,
            &display_view,
        );
        let blit_bind_group =
            Self::create_blit_bind_group(&device, &blit_bind_group_layout, &display_view);

        let post_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.post.pipeline_layout"),
            bind_group_layouts: &[&post_bind_group_layout],
            immediate_size: 0,
        });
        let post_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("renderer.post.shader"),
            source: wgpu::ShaderSource::Wgsl(POSTPROCESS_SHADER.into()),
        });
        let post_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("renderer.post.pipeline"),
            layout: Some(&post_pipeline_layout),
            module: &post_shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.blit.pipeline_layout"),
            bind_group_layouts: &[&blit_bind_group_layout],
            immediate_size: 0,
        });
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("renderer.blit.shader"),
            source: wgpu::ShaderSource::Wgsl(DISPLAY_BLIT_SHADER.into()),
        });
        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("renderer.blit.pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let noise_rng = match config.noise_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        log::info!(
            target: "renderer",
            "renderer ready: {}x{} tile_size={} surface_format={:?} gpu_timestamps={}",
            extent.width,
            extent.height,
            config.tile_size,
            surface_config.format,
            scene.uses_gpu_timestamps()
        );

        Ok(Self {
            gpu_state: GpuState {
                device,
                queue,
                surface,
                surface_config,
            },
            scene,
            present_state: PresentState {
                post_uniform_buffer,
                post_bind_group_layout,
                post_bind_group,
                post_pipeline,
                blit_bind_group_layout,
                blit_bind_group,
                blit_pipeline,
            },
            parameter_state: ParameterState {
                settings: config.settings,
                post,
                noise_rng,
            },
            health: DeviceHealth {
                lost_receiver,
                error_receiver,
            },
        })
    }

    pub(super) fn create_display_view(
        device: &wgpu::Device,
        extent: FrameExtent,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderer.display"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DISPLAY_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub(super) fn create_post_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        accumulation_buffer: &wgpu::Buffer,
        post_uniform_buffer: &wgpu::Buffer,
        display_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("renderer.post.bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: accumulation_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: post_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(display_view),
                },
            ],
        })
    }

    pub(super) fn create_blit_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        display_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("renderer.blit.bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(display_view),
            }],
        })
    }
}
