use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextTree,
    PrevTree,
    Down,
    Up,
    Top,
    Bottom,
    Activate,
    Refresh,
    SetDefault,
    RemoveSelected,
    OpenLogin,
    FocusPanel,
    FocusTrees,
    ClosePanel,
    ToggleHelp,
    ConfirmYes,
    ConfirmNo,
    NextField,
    PrevField,
    Submit,
    ReloadPanel,
    EndFromPanel,
    Backspace,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Form => map_form_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            KeyCode::Char('t') => Some(Action::FocusPanel),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Tab | KeyCode::Right => Some(Action::NextTree),
        KeyCode::BackTab | KeyCode::Left => Some(Action::PrevTree),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::Enter => Some(Action::Activate),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('d') => Some(Action::SetDefault),
        KeyCode::Char('x') | KeyCode::Delete => Some(Action::RemoveSelected),
        KeyCode::Char('l') => Some(Action::OpenLogin),
        KeyCode::Char('p') => Some(Action::FocusPanel),
        KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(Action::ConfirmNo),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Esc => Some(Action::ClosePanel),
        _ => None,
    }
}

fn map_form_mode_key(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('r') => Some(Action::ReloadPanel),
            KeyCode::Char('e') => Some(Action::EndFromPanel),
            KeyCode::Char('t') => Some(Action::FocusTrees),
            KeyCode::Char('c') => Some(Action::Quit),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Tab | KeyCode::Down => Some(Action::NextField),
        KeyCode::BackTab | KeyCode::Up => Some(Action::PrevField),
        KeyCode::Enter => Some(Action::Submit),
        KeyCode::Esc => Some(Action::ClosePanel),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c) => Some(Action::InputChar(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, map_key};
    use crate::app::InputMode;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    #[test]
    fn normal_mode_maps_quit() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Normal, key), Some(Action::Quit));
    }

    #[test]
    fn normal_mode_maps_tree_operations() {
        let cases = [
            ('d', Action::SetDefault),
            ('x', Action::RemoveSelected),
            ('l', Action::OpenLogin),
            ('r', Action::Refresh),
        ];
        for (c, expected) in cases {
            let key = KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);
            assert_eq!(map_key(InputMode::Normal, key), Some(expected));
        }
    }

    #[test]
    fn form_mode_types_letters_that_are_shortcuts_elsewhere() {
        let key = KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(map_key(InputMode::Form, key), Some(Action::InputChar('q')));
    }

    #[test]
    fn form_mode_maps_panel_shortcuts() {
        let reload = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        let end = KeyEvent::new(KeyCode::Char('e'), KeyModifiers::CONTROL);
        assert_eq!(map_key(InputMode::Form, reload), Some(Action::ReloadPanel));
        assert_eq!(map_key(InputMode::Form, end), Some(Action::EndFromPanel));
    }

    #[test]
    fn form_mode_ignores_unknown_control_chords() {
        let key = KeyEvent::new(KeyCode::Char('z'), KeyModifiers::CONTROL);
        assert_eq!(map_key(InputMode::Form, key), None);
    }
}
