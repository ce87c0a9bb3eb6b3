//! Per-frame scheduling for the accumulating renderer.
//!
//! - `accumulation`: the budgeted tile loop and the GPU-facing traits it drives.
//! - `budget`: how the per-call time budget is derived.
//! - `render_mode`: the validated mode state machine and the per-frame dispatcher.

mod accumulation;
mod budget;
mod render_mode;

pub use accumulation::{
    AccumulationError, AccumulationLoopConfig, AccumulationLoopController, AccumulationReport,
    AccumulationStop, AccumulationTelemetry, TileKernel, TimestampMarker, TimestampQueries,
};
pub use budget::{BudgetPolicy, DEFAULT_BUDGET_MILLIS};
pub use render_mode::{
    FrameWork, ModeTransition, ModeTransitionError, RenderMode, RenderModeDispatcher,
    RenderModeState, RenderPaths,
};
