//! Interactive viewer that alternates a cheap raymarched preview with
//! time-budgeted, tile-by-tile path tracing.

pub mod config;
pub mod input;
mod viewer;

pub use config::{CliArgs, ConfigError, PathviewConfig, StartMode};
pub use input::{InputState, ViewerCommand, ViewerKey};
pub use viewer::Viewer;
