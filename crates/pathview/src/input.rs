//! Keyboard and mouse handling, reduced to viewer commands.
//!
//! Quitting is a two-step affair: Escape (or the mouse back button) opens a
//! confirmation prompt that Y/Enter accepts and N/Escape dismisses.
//! Shift+Escape skips the prompt.

use winit::event::MouseButton;
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerKey {
    Escape,
    Space,
    Backspace,
    Confirm,
    Decline,
    MouseBack,
}

impl ViewerKey {
    pub fn from_physical(key: PhysicalKey) -> Option<Self> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        match code {
            KeyCode::Escape => Some(Self::Escape),
            KeyCode::Space => Some(Self::Space),
            KeyCode::Backspace => Some(Self::Backspace),
            KeyCode::KeyY | KeyCode::Enter | KeyCode::NumpadEnter => Some(Self::Confirm),
            KeyCode::KeyN => Some(Self::Decline),
            _ => None,
        }
    }

    pub fn from_mouse(button: MouseButton) -> Option<Self> {
        (button == MouseButton::Back).then_some(Self::MouseBack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerCommand {
    ToggleAccumulation,
    RestartAccumulation,
    QuitPromptOpened,
    QuitPromptClosed,
    Quit,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    quit_prompt_open: bool,
}

impl InputState {
    pub fn quit_prompt_open(&self) -> bool {
        self.quit_prompt_open
    }

    pub fn handle_key(&mut self, key: ViewerKey, shift_held: bool) -> Option<ViewerCommand> {
        if key == ViewerKey::Escape && shift_held {
            return Some(ViewerCommand::Quit);
        }

        if self.quit_prompt_open {
            return match key {
                ViewerKey::Confirm => Some(ViewerCommand::Quit),
                ViewerKey::Decline | ViewerKey::Escape | ViewerKey::MouseBack => {
                    self.quit_prompt_open = false;
                    Some(ViewerCommand::QuitPromptClosed)
                }
                _ => None,
            };
        }

        match key {
            ViewerKey::Escape | ViewerKey::MouseBack => {
                self.quit_prompt_open = true;
                Some(ViewerCommand::QuitPromptOpened)
            }
            ViewerKey::Space => Some(ViewerCommand::ToggleAccumulation),
            ViewerKey::Backspace => Some(ViewerCommand::RestartAccumulation),
            ViewerKey::Confirm | ViewerKey::Decline => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_opens_prompt_and_confirm_quits() {
        let mut input = InputState::default();
        assert_eq!(
            input.handle_key(ViewerKey::Escape, false),
            Some(ViewerCommand::QuitPromptOpened)
        );
        assert!(input.quit_prompt_open());
        assert_eq!(
            input.handle_key(ViewerKey::Confirm, false),
            Some(ViewerCommand::Quit)
        );
    }

    #[test]
    fn decline_or_second_escape_closes_prompt() {
        let mut input = InputState::default();
        input.handle_key(ViewerKey::MouseBack, false);
        assert_eq!(
            input.handle_key(ViewerKey::Decline, false),
            Some(ViewerCommand::QuitPromptClosed)
        );
        assert!(!input.quit_prompt_open());

        input.handle_key(ViewerKey::Escape, false);
        assert_eq!(
            input.handle_key(ViewerKey::Escape, false),
            Some(ViewerCommand::QuitPromptClosed)
        );
    }

    #[test]
    fn shift_escape_quits_without_prompt() {
        let mut input = InputState::default();
        assert_eq!(
            input.handle_key(ViewerKey::Escape, true),
            Some(ViewerCommand::Quit)
        );
        assert!(!input.quit_prompt_open());
    }

    #[test]
    fn render_keys_are_ignored_while_prompt_is_open() {
        let mut input = InputState::default();
        assert_eq!(
            input.handle_key(ViewerKey::Space, false),
            Some(ViewerCommand::ToggleAccumulation)
        );
        assert_eq!(
            input.handle_key(ViewerKey::Backspace, false),
            Some(ViewerCommand::RestartAccumulation)
        );
        assert_eq!(input.handle_key(ViewerKey::Confirm, false), None);

        input.handle_key(ViewerKey::Escape, false);
        assert_eq!(input.handle_key(ViewerKey::Space, false), None);
        assert_eq!(input.handle_key(ViewerKey::Backspace, false), None);
        assert!(input.quit_prompt_open());
    }

    #[test]
    fn maps_physical_keys_and_mouse_buttons() {
        assert_eq!(
            ViewerKey::from_physical(PhysicalKey::Code(KeyCode::KeyY)),
            Some(ViewerKey::Confirm)
        );
        assert_eq!(
            ViewerKey::from_physical(PhysicalKey::Code(KeyCode::KeyQ)),
            None
        );
        assert_eq!(
            ViewerKey::from_mouse(MouseButton::Back),
            Some(ViewerKey::MouseBack)
        );
        assert_eq!(ViewerKey::from_mouse(MouseButton::Left), None);
    }
}
