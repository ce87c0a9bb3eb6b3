use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use pathview::{CliArgs, InputState, PathviewConfig, Viewer, ViewerCommand, ViewerKey};
use renderer::RendererError;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::ModifiersState;
use winit::window::{Window, WindowAttributes, WindowId};

struct App {
    config: PathviewConfig,
    window: Option<Arc<Window>>,
    viewer: Option<Viewer>,
    input: InputState,
    modifiers: ModifiersState,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: PathviewConfig) -> Self {
        Self {
            config,
            window: None,
            viewer: None,
            input: InputState::default(),
            modifiers: ModifiersState::empty(),
            fatal: None,
        }
    }

    fn window_id(&self) -> Option<WindowId> {
        self.window.as_ref().map(|w| w.id())
    }

    fn request_redraw(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!(target: "pathview", "{error:#}");
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: ViewerKey) {
        let Some(command) = self.input.handle_key(key, self.modifiers.shift_key()) else {
            return;
        };
        match command {
            ViewerCommand::Quit => event_loop.exit(),
            ViewerCommand::QuitPromptOpened => {
                log::info!(target: "pathview", "quit? press Y or Enter to confirm, N to cancel");
                if let Some(window) = self.window.as_ref() {
                    window.set_title(&format!("{} - quit? [Y/N]", self.config.window.title));
                }
            }
            ViewerCommand::QuitPromptClosed => {
                if let Some(window) = self.window.as_ref() {
                    window.set_title(&self.config.window.title);
                }
            }
            ViewerCommand::ToggleAccumulation => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.toggle_accumulation();
                }
            }
            ViewerCommand::RestartAccumulation => {
                if let Some(viewer) = self.viewer.as_mut() {
                    viewer.restart_accumulation();
                }
            }
        }
        self.request_redraw();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        match viewer.render_frame() {
            Ok(()) => {}
            Err(RendererError::Surface(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                let size = viewer.window().inner_size();
                if let Err(error) = viewer.resize(size) {
                    self.fail(event_loop, anyhow!(error).context("resize after surface loss"));
                    return;
                }
                viewer.reconfigure_surface();
                self.request_redraw();
            }
            Err(RendererError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                self.fail(event_loop, anyhow!("surface out of memory"));
            }
            Err(RendererError::Surface(_)) => {
                self.request_redraw();
            }
            Err(error) => {
                self.fail(event_loop, anyhow!(error).context("render frame"));
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            WindowAttributes::default()
                .with_title(self.config.window.title.as_str())
                .with_inner_size(PhysicalSize::new(
                    self.config.window.width,
                    self.config.window.height,
                )),
        ) {
            Ok(window) => Arc::new(window),
            Err(error) => {
                self.fail(event_loop, anyhow!(error).context("create window"));
                return;
            }
        };

        match pollster::block_on(Viewer::new(window.clone(), &self.config)) {
            Ok(viewer) => {
                window.request_redraw();
                self.window = Some(window);
                self.viewer = Some(viewer);
            }
            Err(error) => self.fail(event_loop, error.context("initialize viewer")),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id() != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.modifiers = modifiers.state();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if let Some(key) = ViewerKey::from_physical(event.physical_key) {
                    self.handle_key(event_loop, key);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state != ElementState::Pressed {
                    return;
                }
                if let Some(key) = ViewerKey::from_mouse(button) {
                    self.handle_key(event_loop, key);
                }
            }
            WindowEvent::Resized(size) => {
                let Some(viewer) = self.viewer.as_mut() else {
                    return;
                };
                if let Err(error) = viewer.resize(size) {
                    self.fail(event_loop, anyhow!(error).context("resize"));
                    return;
                }
                self.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.viewer.as_ref().is_some_and(|viewer| !viewer.is_idle()) {
            self.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = self.viewer.as_ref() {
            viewer.log_telemetry();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let config = PathviewConfig::from_cli(&args).context("load configuration")?;
    log::info!(
        target: "pathview",
        "{} {} starting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let event_loop = EventLoop::new().context("create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("run event loop")?;

    match app.fatal.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
