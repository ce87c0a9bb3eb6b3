use crate::AccumulationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    Idle,
    #[default]
    Preview,
    Accumulate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: RenderMode,
    pub to: RenderMode,
}

impl ModeTransition {
    pub fn is_change(self) -> bool {
        self.from != self.to
    }

    pub fn enters_accumulation(self) -> bool {
        self.is_change() && self.to == RenderMode::Accumulate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModeTransitionError {
    #[error("render mode transition {from:?} -> {to:?} is not allowed")]
    Illegal { from: RenderMode, to: RenderMode },
}

/// Current render mode, changed only through validated transitions.
#[derive(Debug, Clone, Default)]
pub struct RenderModeState {
    current: RenderMode,
}

impl RenderModeState {
    pub fn new(initial: RenderMode) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> RenderMode {
        self.current
    }

    pub fn request(&mut self, to: RenderMode) -> Result<ModeTransition, ModeTransitionError> {
        let from = self.current;
        if !is_legal_transition(from, to) {
            return Err(ModeTransitionError::Illegal { from, to });
        }
        self.current = to;
        let transition = ModeTransition { from, to };
        if transition.is_change() {
            log::info!(target: "render_mode", "{from:?} -> {to:?}");
        }
        Ok(transition)
    }

    /// Preview switches to accumulate and back. Idle has nothing to toggle.
    pub fn toggle_accumulation(&mut self) -> Result<ModeTransition, ModeTransitionError> {
        let to = match self.current {
            RenderMode::Preview => RenderMode::Accumulate,
            RenderMode::Accumulate => RenderMode::Preview,
            RenderMode::Idle => RenderMode::Accumulate,
        };
        self.request(to)
    }
}

fn is_legal_transition(from: RenderMode, to: RenderMode) -> bool {
    use RenderMode::{Accumulate, Idle, Preview};
    matches!(
        (from, to),
        (Idle, Idle)
            | (Preview, Preview)
            | (Accumulate, Accumulate)
            | (Idle, Preview)
            | (Preview, Accumulate)
            | (Accumulate, Preview)
            | (Preview, Idle)
            | (Accumulate, Idle)
    )
}

/// The two working render paths of a frame.
pub trait RenderPaths {
    type Error;

    fn render_preview(&mut self) -> Result<(), Self::Error>;

    fn render_accumulate(&mut self) -> Result<AccumulationReport, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameWork {
    Idle,
    Preview,
    Accumulated(AccumulationReport),
}

/// Runs exactly one render path per frame based on the mode it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderModeDispatcher;

impl RenderModeDispatcher {
    pub fn dispatch<P: RenderPaths>(
        &self,
        mode: RenderMode,
        paths: &mut P,
    ) -> Result<FrameWork, P::Error> {
        match mode {
            RenderMode::Idle => Ok(FrameWork::Idle),
            RenderMode::Preview => {
                paths.render_preview()?;
                Ok(FrameWork::Preview)
            }
            RenderMode::Accumulate => paths.render_accumulate().map(FrameWork::Accumulated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccumulationStop;

    #[derive(Default)]
    struct RecordingPaths {
        previews: u32,
        accumulations: u32,
    }

    impl RenderPaths for RecordingPaths {
        type Error = &'static str;

        fn render_preview(&mut self) -> Result<(), Self::Error> {
            self.previews += 1;
            Ok(())
        }

        fn render_accumulate(&mut self) -> Result<AccumulationReport, Self::Error> {
            self.accumulations += 1;
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
    fn starts_in_preview_by_default() {
        assert_eq!(RenderModeState::default().current(), RenderMode::Preview);
    }

    #[test]
    fn allows_the_documented_transitions() {
        let mut state = RenderModeState::new(RenderMode::Idle);
        for to in [
            RenderMode::Preview,
            RenderMode::Accumulate,
            RenderMode::Preview,
            RenderMode::Idle,
            RenderMode::Preview,
            RenderMode::Accumulate,
            RenderMode::Idle,
        ] {
            let transition = state.request(to).expect("legal transition");
            assert!(transition.is_change());
            assert_eq!(state.current(), to);
        }
    }

    #[test]
    fn rejects_accumulate_straight_from_idle() {
        let mut state = RenderModeState::new(RenderMode::Idle);
        let error = state
            .request(RenderMode::Accumulate)
            .expect_err("idle cannot accumulate");
        assert_eq!(
            error,
            ModeTransitionError::Illegal {
                from: RenderMode::Idle,
                to: RenderMode::Accumulate,
            }
        );
        assert_eq!(state.current(), RenderMode::Idle);
        assert!(state.toggle_accumulation().is_err());
    }

    #[test]
    fn requesting_the_current_mode_is_a_no_op() {
        let mut state = RenderModeState::new(RenderMode::Accumulate);
        let transition = state.request(RenderMode::Accumulate).expect("no-op");
        assert!(!transition.is_change());
        assert!(!transition.enters_accumulation());
    }

    #[test]
    fn toggle_switches_between_preview_and_accumulate() {
        let mut state = RenderModeState::default();
        let transition = state.toggle_accumulation().expect("toggle");
        assert!(transition.enters_accumulation());
        assert_eq!(state.current(), RenderMode::Accumulate);
        state.toggle_accumulation().expect("toggle back");
        assert_eq!(state.current(), RenderMode::Preview);
    }

    #[test]
    fn dispatcher_runs_exactly_one_path() {
        let dispatcher = RenderModeDispatcher;
        let mut paths = RecordingPaths::default();

        assert_eq!(
            dispatcher.dispatch(RenderMode::Idle, &mut paths),
            Ok(FrameWork::Idle)
        );
        assert_eq!((paths.previews, paths.accumulations), (0, 0));

        assert_eq!(
            dispatcher.dispatch(RenderMode::Preview, &mut paths),
            Ok(FrameWork::Preview)
        );
        assert_eq!((paths.previews, paths.accumulations), (1, 0));

        let work = dispatcher
            .dispatch(RenderMode::Accumulate, &mut paths)
            .expect("accumulate");
        let FrameWork::Accumulated(report) = work else {
            panic!("expected accumulation work, got {work:?}");
        };
        assert_eq!(report.tiles_dispatched, 3);
        assert_eq!((paths.previews, paths.accumulations), (1, 1));
    }
}
