use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    Select,
    Back,
    Sync,
    Push,
    RefreshFeeds,
    Reconnect,
    ToggleRead,
    ToggleFavorite,
    OpenInBrowser,
    CycleFilter,
    CycleViewMode,
    DeleteFeed,
    ShowHelp,
    HideHelp,
}

pub fn handle_key_event(key: KeyEvent, show_help: bool) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(AppAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(AppAction::Quit),

        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(AppAction::MoveDown),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(AppAction::MoveUp),

        (KeyCode::Enter, _) => Some(AppAction::Select),
        (KeyCode::Esc, _) | (KeyCode::Char('h'), _) => Some(AppAction::Back),

        (KeyCode::Char('s'), _) => Some(AppAction::Sync),
        (KeyCode::Char('p'), _) => Some(AppAction::Push),
        (KeyCode::Char('r'), _) => Some(AppAction::RefreshFeeds),
        (KeyCode::Char('c'), KeyModifiers::NONE) => Some(AppAction::Reconnect),

        (KeyCode::Char('m'), _) => Some(AppAction::ToggleRead),
        (KeyCode::Char('v'), _) => Some(AppAction::ToggleFavorite),
        (KeyCode::Char('o'), _) => Some(AppAction::OpenInBrowser),

        (KeyCode::Char('f'), _) => Some(AppAction::CycleFilter),
        (KeyCode::Tab, _) => Some(AppAction::CycleViewMode),
        (KeyCode::Char('D'), KeyModifiers::SHIFT) => Some(AppAction::DeleteFeed),

        (KeyCode::Char('?'), _) => Some(AppAction::ShowHelp),

        _ => None,
    }
}
