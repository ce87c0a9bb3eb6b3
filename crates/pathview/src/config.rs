//! Viewer configuration: an optional TOML file with CLI flags layered on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use frame_scheduler::{AccumulationLoopConfig, BudgetPolicy, DEFAULT_BUDGET_MILLIS, RenderMode};
use renderer::{DitherMode, RenderSettings, RendererConfig, TonemapMode};
use serde::Deserialize;
use tiles::{DEFAULT_TILE_SIZE, TILE_WORKGROUP_EDGE};

#[derive(Debug, Default, Parser)]
#[command(author, version, about = "Interactive preview and tile-budgeted path tracing viewer")]
pub struct CliArgs {
    /// TOML configuration file; flags below override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    #[arg(long)]
    pub tile_size: Option<u32>,
    /// Fixed accumulation budget per frame, in milliseconds.
    #[arg(long)]
    pub budget_ms: Option<f64>,
    /// Seeds tile shuffling and kernel noise for reproducible runs.
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, value_enum)]
    pub mode: Option<StartMode>,
    #[arg(long)]
    pub tonemap: Option<TonemapMode>,
    #[arg(long)]
    pub dither: Option<DitherMode>,
    #[arg(long)]
    pub exposure: Option<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("window size {width}x{height} must be non-zero")]
    EmptyWindow { width: u32, height: u32 },
    #[error("tile size {0} must be a non-zero multiple of {TILE_WORKGROUP_EDGE}")]
    TileSize(u32),
    #[error("fixed budget {0} ms must be finite and non-negative")]
    FixedBudget(f64),
    #[error("refresh budget fraction {0} must be in (0, 1]")]
    RefreshFraction(f64),
    #[error("timestamp poll bounds must be non-zero")]
    PollBounds,
    #[error("exposure {0} must be finite and positive")]
    Exposure(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StartMode {
    #[default]
    Preview,
    Accumulate,
}

impl StartMode {
    pub fn render_mode(self) -> RenderMode {
        match self {
            StartMode::Preview => RenderMode::Preview,
            StartMode::Accumulate => RenderMode::Accumulate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "pathview".to_owned(),
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case", deny_unknown_fields)]
pub enum BudgetConfig {
    Fixed { millis: f64 },
    RefreshRate { fraction: f64 },
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self::Fixed {
            millis: DEFAULT_BUDGET_MILLIS,
        }
    }
}

impl BudgetConfig {
    pub fn policy(self) -> BudgetPolicy {
        match self {
            BudgetConfig::Fixed { millis } => BudgetPolicy::Fixed { millis },
            BudgetConfig::RefreshRate { fraction } => BudgetPolicy::RefreshRate { fraction },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub tile_size: u32,
    pub budget: BudgetConfig,
    pub max_poll_attempts: u32,
    pub poll_timeout_millis: u64,
    pub shuffle_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let loop_config = AccumulationLoopConfig::default();
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            budget: BudgetConfig::default(),
            max_poll_attempts: loop_config.max_poll_attempts,
            poll_timeout_millis: u64::try_from(loop_config.poll_timeout.as_millis())
                .unwrap_or(u64::MAX),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub initial_mode: StartMode,
    pub max_steps: u32,
    pub max_bounces: u32,
    pub max_distance: f32,
    pub epsilon: f32,
    pub exposure: f32,
    pub normal_method: u32,
    pub fov: f32,
    pub basic_diffuse: [f32; 3],
    pub viewer_position: [f32; 3],
    pub rotation_about_x: f32,
    pub rotation_about_y: f32,
    pub rotation_about_z: f32,
    pub tonemap: TonemapMode,
    pub dither: DitherMode,
    pub clear_color: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let settings = RenderSettings::default();
        Self {
            initial_mode: StartMode::default(),
            max_steps: settings.max_steps,
            max_bounces: settings.max_bounces,
            max_distance: settings.max_distance,
            epsilon: settings.epsilon,
            exposure: settings.exposure,
            normal_method: settings.normal_method,
            fov: settings.fov,
            basic_diffuse: settings.basic_diffuse,
            viewer_position: settings.viewer_position,
            rotation_about_x: settings.rotation[0],
            rotation_about_y: settings.rotation[1],
            rotation_about_z: settings.rotation[2],
            tonemap: settings.tonemap,
            dither: settings.dither,
            clear_color: settings.clear_color,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathviewConfig {
    pub window: WindowConfig,
    pub scheduler: SchedulerConfig,
    pub render: RenderConfig,
}

impl PathviewConfig {
    /// Loads the file named by `--config` (or defaults), applies the remaining
    /// flags and validates the result.
    pub fn from_cli(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match args.config.as_deref() {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(args);
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(width) = args.width {
            self.window.width = width;
        }
        if let Some(height) = args.height {
            self.window.height = height;
        }
        if let Some(tile_size) = args.tile_size {
            self.scheduler.tile_size = tile_size;
        }
        if let Some(millis) = args.budget_ms {
            self.scheduler.budget = BudgetConfig::Fixed { millis };
        }
        if let Some(seed) = args.seed {
            self.scheduler.shuffle_seed = Some(seed);
        }
        if let Some(mode) = args.mode {
            self.render.initial_mode = mode;
        }
        if let Some(tonemap) = args.tonemap {
            self.render.tonemap = tonemap;
        }
        if let Some(dither) = args.dither {
            self.render.dither = dither;
        }
        if let Some(exposure) = args.exposure {
            self.render.exposure = exposure;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let WindowConfig { width, height, .. } = self.window;
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyWindow { width, height });
        }
        let tile_size = self.scheduler.tile_size;
        if tile_size == 0 || tile_size % TILE_WORKGROUP_EDGE != 0 {
            return Err(ConfigError::TileSize(tile_size));
        }
        match self.scheduler.budget {
            BudgetConfig::Fixed { millis } if !millis.is_finite() || millis < 0.0 => {
                return Err(ConfigError::FixedBudget(millis));
            }
            BudgetConfig::RefreshRate { fraction } if !(fraction > 0.0 && fraction <= 1.0) => {
                return Err(ConfigError::RefreshFraction(fraction));
            }
            _ => {}
        }
        if self.scheduler.max_poll_attempts == 0 || self.scheduler.poll_timeout_millis == 0 {
            return Err(ConfigError::PollBounds);
        }
        let exposure = self.render.exposure;
        if !exposure.is_finite() || exposure <= 0.0 {
            return Err(ConfigError::Exposure(exposure));
        }
        Ok(())
    }

    pub fn budget_policy(&self) -> BudgetPolicy {
        self.scheduler.budget.policy()
    }

    pub fn loop_config(&self) -> AccumulationLoopConfig {
        AccumulationLoopConfig {
            max_poll_attempts: self.scheduler.max_poll_attempts,
            poll_timeout: Duration::from_millis(self.scheduler.poll_timeout_millis),
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        let render = &self.render;
        RenderSettings {
            max_steps: render.max_steps,
            max_bounces: render.max_bounces,
            max_distance: render.max_distance,
            epsilon: render.epsilon,
            exposure: render.exposure,
            normal_method: render.normal_method,
            fov: render.fov,
            basic_diffuse: render.basic_diffuse,
            viewer_position: render.viewer_position,
            rotation: [
                render.rotation_about_x,
                render.rotation_about_y,
                render.rotation_about_z,
            ],
            tonemap: render.tonemap,
            dither: render.dither,
            clear_color: render.clear_color,
        }
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            tile_size: self.scheduler.tile_size,
            settings: self.render_settings(),
            noise_seed: self.scheduler.shuffle_seed,
        }
    }
}
