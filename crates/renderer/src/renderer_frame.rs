//! Per-frame operations.
//!
//! The frame loop calls `begin_frame`, then either `render_preview` or
//! `accumulate`, then `present`. Resize and device health checks live here
//! because they touch the same surface-sized resources.

use frame_scheduler::{AccumulationError, AccumulationLoopController, AccumulationReport};
use rand::Rng;
use tiles::{FrameExtent, TILE_WORKGROUP_EDGE, TileScheduler};

use crate::{Renderer, RendererError};

impl Renderer {
    pub fn extent(&self) -> FrameExtent {
        self.scene.extent()
    }

    pub fn tile_size(&self) -> u32 {
        self.scene.tile_size()
    }

    pub fn uses_gpu_timestamps(&self) -> bool {
        self.scene.uses_gpu_timestamps()
    }

    /// Re-randomizes the kernel noise offset and advances the postprocess
    /// frame index. Called once per frame tick, never per tile.
    pub fn begin_frame(&mut self) {
        let noise_offset = [
            self.parameter_state.noise_rng.random::<u32>(),
            self.parameter_state.noise_rng.random::<u32>(),
        ];
        self.scene.set_noise_offset(noise_offset);

        let post = &mut self.parameter_state.post;
        post.frame_index = post.frame_index.wrapping_add(1);
        self.upload_post();
    }

    pub fn render_preview(&mut self) {
        self.scene.dispatch_preview();
    }

    pub fn accumulate(
        &mut self,
        controller: &mut AccumulationLoopController,
        scheduler: &mut TileScheduler,
        budget_millis: f64,
    ) -> Result<AccumulationReport, AccumulationError> {
        controller.run_accumulation_budget(budget_millis, scheduler, &mut self.scene)
    }

    pub fn clear_accumulation(&mut self) {
        self.scene.clear_accumulation();
    }

    /// Reconfigures the surface and reallocates every surface-sized resource.
    /// Returns `false` when nothing changed, including for a zero-area size,
    /// which is left to the caller to treat as minimized.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, RendererError> {
        let extent = FrameExtent::new(width, height);
        if extent.is_empty() || extent == self.scene.extent() {
            return Ok(false);
        }

        self.gpu_state.surface_config.width = width;
        self.gpu_state.surface_config.height = height;
        self.gpu_state
            .surface
            .configure(&self.gpu_state.device, &self.gpu_state.surface_config);
        self.scene.resize(extent)?;
        self.parameter_state.post.resolution = [width, height];
        self.upload_post();

        let device = &self.gpu_state.device;
        let present_state = &mut self.present_state;
        let display_view = Self::create_display_view(device, extent);
        present_state.post_bind_group = Self::create_post_bind_group(
            device,
            &present_state.post_bind_group_layout,
            self.scene.accumulation_buffer(),
            &present_state.post_uniform_buffer,
            &display_view,
        );
        present_state.blit_bind_group = Self::create_blit_bind_group(
            device,
            &present_state.blit_bind_group_layout,
            &display_view,
        );
        log::info!(target: "renderer", "resized to {width}x{height}");
        Ok(true)
    }

    /// Reconfigures the surface at its current size after `Lost`/`Outdated`.
    pub fn reconfigure_surface(&mut self) {
        self.gpu_state
            .surface
            .configure(&self.gpu_state.device, &self.gpu_state.surface_config);
    }

    /// Postprocesses the accumulation buffer into the display texture and
    /// blits it to the surface.
    pub fn present(&mut self) -> Result<(), RendererError> {
        let frame = self.gpu_state.surface.get_current_texture()?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let extent = self.scene.extent();
        let clear = self.parameter_state.settings.clear_color;

        let mut encoder =
            self.gpu_state
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.frame.present"),
                });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("renderer.post.pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.present_state.post_pipeline);
            compute_pass.set_bind_group(0, &self.present_state.post_bind_group, &[]);
            compute_pass.dispatch_workgroups(
                extent.width.div_ceil(TILE_WORKGROUP_EDGE),
                extent.height.div_ceil(TILE_WORKGROUP_EDGE),
                1,
            );
        }
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("renderer.blit.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear,
                            g: clear,
                            b: clear,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            render_pass.set_pipeline(&self.present_state.blit_pipeline);
            render_pass.set_bind_group(0, &self.present_state.blit_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.gpu_state.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    /// Surfaces device loss or an uncaptured validation error reported since
    /// the last check.
    pub fn check_device_health(&self) -> Result<(), RendererError> {
        if let Ok((reason, message)) = self.health.lost_receiver.try_recv() {
            return Err(RendererError::DeviceLost { reason, message });
        }
        if let Ok(message) = self.health.error_receiver.try_recv() {
            return Err(RendererError::Uncaptured(message));
        }
        Ok(())
    }

    fn upload_post(&self) {
        self.gpu_state.queue.write_buffer(
            &self.present_state.post_uniform_buffer,
            0,
            bytemuck::bytes_of(&self.parameter_state.post),
        );
    }
}
