mod augment;
mod base;
mod enhance;
mod inpaint;
mod pencil;
mod selection;
mod smudge;
#[cfg(test)]
pub(crate) mod testing;
mod variants;

use std::fmt;

use serde_json::Value;

use super::{PointerEvent, ToolResult, WheelEvent};
use crate::geometry::Color;
use crate::input::{ShortcutKey, ShortcutModifiers};
use crate::pixels::EncodeFormat;
use crate::render::Renderer;

pub use augment::{AugmentState, AugmentTool};
pub use enhance::{EnhanceArgs, EnhanceTool};
pub use inpaint::{InpaintArgs, InpaintTool};
pub use pencil::{PencilArgs, PencilTool};
pub use selection::{SelectionArgs, SelectionTool};
pub use smudge::{SmudgeArgs, SmudgeTool};

pub(crate) use base::ToolCore;
pub(crate) use selection::SelectionHandler;
pub(crate) use variants::{GenerationUpdate, PendingGeneration, VariantSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Select,
    Inpaint,
    Smudge,
    Pencil,
    Enhance,
    Augment,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        Self::Select,
        Self::Inpaint,
        Self::Smudge,
        Self::Pencil,
        Self::Enhance,
        Self::Augment,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Inpaint => "inpaint",
            Self::Smudge => "smudge",
            Self::Pencil => "pencil",
            Self::Enhance => "enhance",
            Self::Augment => "augment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantDirection {
    Left,
    Right,
}

/// Tool-specific buttons of the surrounding UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCommand {
    /// Accept the current selection and move on.
    Continue,
    BeginErase,
    BeginPrompt,
    BeginMask,
    FinishMask,
    DeleteMask,
    InvertMask,
    ResetMask,
    Submit,
    PickColor,
    Upscale,
    FaceRestore,
    Revert,
    Save,
}

/// An image emitted for saving by a confirmed edit.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedImage {
    pub bytes: Vec<u8>,
    pub format: EncodeFormat,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
}

impl SavedImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            format: EncodeFormat::Png,
            prompt: None,
            negative_prompt: None,
            model: None,
        }
    }
}

type Listener<T> = Option<Box<dyn FnMut(T)>>;

/// One replaceable callback per notification class.
#[derive(Default)]
pub struct ToolListeners {
    dirty: Listener<bool>,
    progress: Listener<f32>,
    error: Listener<Option<String>>,
    state_change: Listener<&'static str>,
    save: Listener<SavedImage>,
    selection_controls: Listener<bool>,
    mask_change: Listener<bool>,
    color_picked: Listener<Color>,
}

impl fmt::Debug for ToolListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolListeners")
            .field("dirty", &self.dirty.is_some())
            .field("progress", &self.progress.is_some())
            .field("error", &self.error.is_some())
            .field("state_change", &self.state_change.is_some())
            .field("save", &self.save.is_some())
            .field("selection_controls", &self.selection_controls.is_some())
            .field("mask_change", &self.mask_change.is_some())
            .field("color_picked", &self.color_picked.is_some())
            .finish()
    }
}

macro_rules! listener_methods {
    ($($register:ident / $notify:ident: $field:ident($ty:ty);)*) => {
        impl ToolListeners {
            $(
                pub fn $register(&mut self, listener: impl FnMut($ty) + 'static) {
                    self.$field = Some(Box::new(listener));
                }

                pub(crate) fn $notify(&mut self, value: $ty) {
                    if let Some(listener) = self.$field.as_mut() {
                        listener(value);
                    }
                }
            )*
        }
    };
}

listener_methods! {
    on_dirty / notify_dirty: dirty(bool);
    on_progress / notify_progress: progress(f32);
    on_error / notify_error: error(Option<String>);
    on_state_change / notify_state_change: state_change(&'static str);
    on_save / notify_save: save(SavedImage);
    on_selection_controls / notify_selection_controls: selection_controls(bool);
    on_mask_change / notify_mask_change: mask_change(bool);
    on_color_picked / notify_color_picked: color_picked(Color);
}

/// Contract every editing tool implements. The controller owns the renderer and lends
/// it to the active tool for each call.
pub trait Tool {
    fn name(&self) -> &'static str;

    /// Short name of the tool's current state, for the UI.
    fn state_name(&self) -> &'static str {
        "default"
    }

    fn is_dirty(&self) -> bool {
        false
    }

    /// Waiting on a remote generation.
    fn is_busy(&self) -> bool {
        false
    }

    fn on_pointer_down(&mut self, renderer: &mut Renderer, event: PointerEvent);
    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent);
    fn on_pointer_up(&mut self, renderer: &mut Renderer, event: PointerEvent);
    fn on_pointer_leave(&mut self, renderer: &mut Renderer);
    fn on_wheel(&mut self, renderer: &mut Renderer, event: WheelEvent);

    /// Returns whether the key was handled.
    fn on_key_down(
        &mut self,
        _renderer: &mut Renderer,
        _key: ShortcutKey,
        _modifiers: ShortcutModifiers,
    ) -> bool {
        false
    }

    fn get_args(&self) -> Value;

    /// Merges `patch` over the stored arguments, persists and applies them.
    fn update_args(&mut self, renderer: &mut Renderer, patch: &Value) -> ToolResult<()>;

    /// Cycles through generated variants, including "none".
    fn select(&mut self, _renderer: &mut Renderer, _direction: VariantDirection) {}

    fn command(&mut self, _renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        Err(super::ToolError::Unsupported {
            tool: self.name(),
            command,
        })
    }

    fn confirm(&mut self, _renderer: &mut Renderer) -> ToolResult<()> {
        Ok(())
    }

    fn cancel(&mut self, _renderer: &mut Renderer) {}

    /// Picks up results of background work. Returns whether anything changed.
    fn poll(&mut self, _renderer: &mut Renderer) -> bool {
        false
    }

    /// Tears the tool down. `confirm_discard` is asked before unsaved work is thrown
    /// away; returning false keeps the tool active.
    fn destroy(&mut self, renderer: &mut Renderer, confirm_discard: &mut dyn FnMut() -> bool) -> bool;

    fn listeners_mut(&mut self) -> &mut ToolListeners;
}
