use std::sync::Arc;

use anyhow::{Context, Result};
use frame_scheduler::{
    AccumulationError, AccumulationLoopController, AccumulationReport, BudgetPolicy, FrameWork,
    RenderMode, RenderModeDispatcher, RenderModeState, RenderPaths,
};
use renderer::{Renderer, RendererError, request_renderer_device};
use tiles::TileScheduler;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::config::PathviewConfig;

/// Owns the renderer together with the scheduling state that drives it.
pub struct Viewer {
    window: Arc<Window>,
    renderer: Renderer,
    scheduler: TileScheduler,
    controller: AccumulationLoopController,
    mode_state: RenderModeState,
    dispatcher: RenderModeDispatcher,
    budget_policy: BudgetPolicy,
    refresh_rate_millihertz: Option<u32>,
    resume_mode: RenderMode,
}

/// Borrows the pieces one frame needs so the dispatcher can pick a path.
struct FramePaths<'a> {
    renderer: &'a mut Renderer,
    scheduler: &'a mut TileScheduler,
    controller: &'a mut AccumulationLoopController,
    budget_millis: f64,
}

impl RenderPaths for FramePaths<'_> {
    type Error = AccumulationError;

    fn render_preview(&mut self) -> Result<(), Self::Error> {
        self.renderer.begin_frame();
        self.renderer.render_preview();
        Ok(())
    }

    fn render_accumulate(&mut self) -> Result<AccumulationReport, Self::Error> {
        self.renderer.begin_frame();
        self.renderer
            .accumulate(self.controller, self.scheduler, self.budget_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Skip,
    Present,
}

/// Runs the path the dispatcher selects for `mode` and decides whether the
/// frame is presented. A timing fault aborts only the accumulation call, and
/// whatever was accumulated before it is still presented.
fn run_mode_path<P>(
    dispatcher: &RenderModeDispatcher,
    mode: RenderMode,
    paths: &mut P,
) -> FrameOutcome
where
    P: RenderPaths<Error = AccumulationError>,
{
    match dispatcher.dispatch(mode, paths) {
        Ok(FrameWork::Idle) => FrameOutcome::Skip,
        Ok(FrameWork::Preview) => FrameOutcome::Present,
        Ok(FrameWork::Accumulated(report)) => {
            log::debug!(
                target: "pathview",
                "accumulated {} tiles in {:.3} ms (passes={}, stop={:?})",
                report.tiles_dispatched,
                report.elapsed_millis,
                report.passes_completed,
                report.stop_reason
            );
            FrameOutcome::Present
        }
        Err(error) => {
            log::error!(
                target: "pathview",
                "accumulation aborted, presenting partial result: {error}"
            );
            FrameOutcome::Present
        }
    }
}

impl Viewer {
    pub async fn new(window: Arc<Window>, config: &PathviewConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("request wgpu adapter")?;
        let info = adapter.get_info();
        log::info!(
            target: "pathview",
            "adapter: {} backend={:?} driver={} {}",
            info.name,
            info.backend,
            info.driver,
            info.driver_info
        );

        let (device, queue) = request_renderer_device(&adapter)
            .await
            .context("request wgpu device")?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let mut size = window.inner_size();
        size.width = size.width.max(1);
        size.height = size.height.max(1);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let renderer = Renderer::new(
            device,
            queue,
            surface,
            surface_config,
            config.renderer_config(),
        )
        .context("create renderer")?;
        log::info!(
            target: "pathview",
            "gpu timestamps: {}",
            if renderer.uses_gpu_timestamps() { "available" } else { "unavailable, using host clock" }
        );

        let extent = renderer.extent();
        let tile_size = renderer.tile_size();
        let scheduler = match config.scheduler.shuffle_seed {
            Some(seed) => TileScheduler::with_seed(extent, tile_size, seed),
            None => TileScheduler::new(extent, tile_size),
        }
        .context("create tile scheduler")?;
        log::info!(
            target: "pathview",
            "frame {}x{} tile_size={} tiles={}",
            extent.width,
            extent.height,
            tile_size,
            scheduler.tile_count()
        );

        let refresh_rate_millihertz = current_refresh_rate(&window);
        let initial_mode = config.render.initial_mode.render_mode();

        Ok(Self {
            window,
            renderer,
            scheduler,
            controller: AccumulationLoopController::new(config.loop_config()),
            mode_state: RenderModeState::new(initial_mode),
            dispatcher: RenderModeDispatcher,
            budget_policy: config.budget_policy(),
            refresh_rate_millihertz,
            resume_mode: initial_mode,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn mode(&self) -> RenderMode {
        self.mode_state.current()
    }

    pub fn is_idle(&self) -> bool {
        self.mode() == RenderMode::Idle
    }

    pub fn budget_millis(&self) -> f64 {
        self.budget_policy.budget_millis(self.refresh_rate_millihertz)
    }

    /// Runs one frame: the mode's render path, then postprocess and present.
    /// Idle frames present nothing.
    pub fn render_frame(&mut self) -> Result<(), RendererError> {
        self.renderer.check_device_health()?;
        let mode = self.mode_state.current();
        let budget_millis = self.budget_millis();
        let mut paths = FramePaths {
            renderer: &mut self.renderer,
            scheduler: &mut self.scheduler,
            controller: &mut self.controller,
            budget_millis,
        };
        match run_mode_path(&self.dispatcher, mode, &mut paths) {
            FrameOutcome::Skip => Ok(()),
            FrameOutcome::Present => self.renderer.present(),
        }
    }

    pub fn toggle_accumulation(&mut self) {
        if let Err(error) = self.mode_state.toggle_accumulation() {
            log::warn!(target: "pathview", "{error}");
        }
    }

    pub fn restart_accumulation(&mut self) {
        self.renderer.clear_accumulation();
        if let Err(error) = self.scheduler.reset(self.renderer.extent()) {
            log::error!(target: "pathview", "tile scheduler reset failed: {error}");
            return;
        }
        log::info!(target: "pathview", "accumulation restarted");
    }

    /// Resizes every surface-sized resource. A zero-area size parks the
    /// viewer in idle until a usable size arrives.
    pub fn resize(&mut self, size: PhysicalSize<u32>) -> Result<(), RendererError> {
        if size.width == 0 || size.height == 0 {
            self.enter_idle();
            return Ok(());
        }

        if self.renderer.resize(size.width, size.height)? {
            let extent = self.renderer.extent();
            if let Err(error) = self.scheduler.reset(extent) {
                log::error!(target: "pathview", "tile scheduler reset failed: {error}");
            } else {
                log::info!(
                    target: "pathview",
                    "tile list rebuilt for {}x{}: tiles={}",
                    extent.width,
                    extent.height,
                    self.scheduler.tile_count()
                );
            }
            self.refresh_rate_millihertz = current_refresh_rate(&self.window);
        }
        self.leave_idle();
        Ok(())
    }

    pub fn reconfigure_surface(&mut self) {
        self.renderer.reconfigure_surface();
    }

    pub fn log_telemetry(&self) {
        let telemetry = self.controller.telemetry();
        log::info!(
            target: "pathview",
            "accumulation calls={} tiles={} timestamp_faults={} passes={}",
            telemetry.calls,
            telemetry.tiles_dispatched,
            telemetry.timestamp_faults,
            self.scheduler.passes_completed()
        );
    }

    fn enter_idle(&mut self) {
        let current = self.mode_state.current();
        if current == RenderMode::Idle {
            return;
        }
        self.resume_mode = current;
        if let Err(error) = self.mode_state.request(RenderMode::Idle) {
            log::warn!(target: "pathview", "{error}");
        }
    }

    fn leave_idle(&mut self) {
        if self.mode_state.current() != RenderMode::Idle {
            return;
        }
        let mut result = self.mode_state.request(RenderMode::Preview);
        if result.is_ok() && self.resume_mode == RenderMode::Accumulate {
            result = self.mode_state.request(RenderMode::Accumulate);
        }
        if let Err(error) = result {
            log::warn!(target: "pathview", "{error}");
        }
    }
}

fn current_refresh_rate(window: &Window) -> Option<u32> {
    window
        .current_monitor()
        .and_then(|monitor| monitor.refresh_rate_millihertz())
}

#[cfg(test)]
mod tests {
    use frame_scheduler::AccumulationStop;

    use super::*;

    #[derive(Default)]
    struct CountingPaths {
        previews: u32,
        accumulations: u32,
        fail_accumulation: bool,
    }

    impl RenderPaths for CountingPaths {
        type Error = AccumulationError;

        fn render_preview(&mut self) -> Result<(), Self::Error> {
            self.previews += 1;
            Ok(())
        }

        fn render_accumulate(&mut self) -> Result<AccumulationReport, Self::Error> {
            self.accumulations += 1;
            if self.fail_accumulation {
                return Err(AccumulationError::TimestampUnavailable {
                    tiles_dispatched: 2,
                    poll_attempts: 64,
                    waited: std::time::Duration::from_millis(250),
                });
            }
            Ok(AccumulationReport {
                tiles_dispatched: 3,
                elapsed_millis: 9.0,
                average_tile_millis: 3.0,
                passes_completed: 0,
                stop_reason: AccumulationStop::BudgetExhausted,
            })
        }
    }

    #[test]
    fn idle_frames_run_no_path_and_skip_present() {
        let mut paths = CountingPaths::default();
        let outcome = run_mode_path(&RenderModeDispatcher, RenderMode::Idle, &mut paths);
        assert_eq!(outcome, FrameOutcome::Skip);
        assert_eq!((paths.previews, paths.accumulations), (0, 0));
    }

    #[test]
    fn working_modes_run_their_path_and_present() {
        let mut paths = CountingPaths::default();
        assert_eq!(
            run_mode_path(&RenderModeDispatcher, RenderMode::Preview, &mut paths),
            FrameOutcome::Present
        );
        assert_eq!(
            run_mode_path(&RenderModeDispatcher, RenderMode::Accumulate, &mut paths),
            FrameOutcome::Present
        );
        assert_eq!((paths.previews, paths.accumulations), (1, 1));
    }

    #[test]
    fn timing_fault_still_presents_the_partial_accumulation() {
        let mut paths = CountingPaths {
            fail_accumulation: true,
            ..CountingPaths::default()
        };
        let outcome = run_mode_path(&RenderModeDispatcher, RenderMode::Accumulate, &mut paths);
        assert_eq!(outcome, FrameOutcome::Present);
        assert_eq!(paths.accumulations, 1);
    }
}
