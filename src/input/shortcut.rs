#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKey {
    Character(char),
    Enter,
    Escape,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortcutModifiers {
    pub ctrl: bool,
    pub shift: bool,
}

impl ShortcutModifiers {
    pub const fn new(ctrl: bool, shift: bool) -> Self {
        Self { ctrl, shift }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputContext {
    /// A prompt field has focus; keys belong to it.
    pub text_input_active: bool,
    /// The active tool is waiting on a generation.
    pub tool_busy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    Undo,
    Redo,
    Confirm,
    Cancel,
    PreviousVariant,
    NextVariant,
    ZoomIn,
    ZoomOut,
}

fn resolve_busy_shortcut(key: ShortcutKey) -> Option<ShortcutAction> {
    match key {
        ShortcutKey::Escape => Some(ShortcutAction::Cancel),
        _ => None,
    }
}

fn resolve_history_shortcut(key: ShortcutKey, modifiers: ShortcutModifiers) -> Option<ShortcutAction> {
    match (key, modifiers.shift) {
        (ShortcutKey::Character('z'), false) => Some(ShortcutAction::Undo),
        (ShortcutKey::Character('z'), true) | (ShortcutKey::Character('y'), false) => {
            Some(ShortcutAction::Redo)
        }
        _ => None,
    }
}

fn resolve_canvas_shortcut(key: ShortcutKey) -> Option<ShortcutAction> {
    match key {
        ShortcutKey::Enter => Some(ShortcutAction::Confirm),
        ShortcutKey::Escape => Some(ShortcutAction::Cancel),
        ShortcutKey::Left => Some(ShortcutAction::PreviousVariant),
        ShortcutKey::Right => Some(ShortcutAction::NextVariant),
        ShortcutKey::Character('[') => Some(ShortcutAction::ZoomOut),
        ShortcutKey::Character(']') => Some(ShortcutAction::ZoomIn),
        _ => None,
    }
}

pub fn resolve_shortcut(
    key: ShortcutKey,
    modifiers: ShortcutModifiers,
    context: InputContext,
) -> Option<ShortcutAction> {
    if context.text_input_active {
        return None;
    }

    if context.tool_busy {
        return resolve_busy_shortcut(key);
    }

    let key = match key {
        ShortcutKey::Character(c) => ShortcutKey::Character(c.to_ascii_lowercase()),
        other => other,
    };
    if modifiers.ctrl {
        return resolve_history_shortcut(key, modifiers);
    }
    if modifiers.shift {
        return None;
    }
    resolve_canvas_shortcut(key)
}
