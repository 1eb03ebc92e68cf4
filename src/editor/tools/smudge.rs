use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Tool, ToolCommand, ToolCore, ToolListeners};
use crate::editor::{PointerButton, PointerEvent, ToolEnvironment, ToolError, ToolResult, WheelEvent};
use crate::geometry::{CanvasPoint, Color};
use crate::render::{Cursor, CursorShape, Renderer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmudgeArgs {
    pub brush_size: u32,
}

/// Smears a working copy of the whole image held in the edit layer. Nothing reaches the
/// base layer until `confirm`.
pub struct SmudgeTool {
    core: ToolCore,
    args: SmudgeArgs,
    opacity: f32,
    smudging: bool,
    last: Option<CanvasPoint>,
}

impl SmudgeTool {
    pub const NAME: &'static str = "smudge";

    pub fn new(env: &ToolEnvironment, renderer: &mut Renderer) -> Self {
        let core = ToolCore::new(Self::NAME, env.args.clone());
        let args = core.load_args(SmudgeArgs {
            brush_size: env.config.smudge.brush_size,
        });
        renderer.copy_edit_image_from_base_image();
        Self {
            core,
            args,
            opacity: env.config.smudge.opacity,
            smudging: false,
            last: None,
        }
    }

    fn sync_cursor(&self, renderer: &mut Renderer) {
        let cursor = self.last.map(|point| {
            Cursor::new(
                CursorShape::Circle,
                point,
                f64::from(self.args.brush_size) / 2.0,
                Color::WHITE,
            )
        });
        renderer.set_cursor(cursor);
    }
}

impl Tool for SmudgeTool {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    fn on_pointer_down(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.core.pan_start(event) {
            return;
        }
        if event.button == PointerButton::Primary {
            self.smudging = true;
            self.last = Some(ToolCore::to_canvas(renderer, event.position));
        }
        self.sync_cursor(renderer);
    }

    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        let point = ToolCore::to_canvas(renderer, event.position);
        if !self.core.pan_move(renderer, event) && self.smudging {
            if let Some(last) = self.last {
                renderer.smudge_line(last, point, self.args.brush_size, self.opacity);
                self.core.set_dirty(true);
            }
        }
        self.last = Some(point);
        self.sync_cursor(renderer);
    }

    fn on_pointer_up(&mut self, _renderer: &mut Renderer, _event: PointerEvent) {
        self.core.pan_end();
        self.smudging = false;
    }

    fn on_pointer_leave(&mut self, renderer: &mut Renderer) {
        self.core.pan_end();
        self.smudging = false;
        self.last = None;
        renderer.set_cursor(None);
    }

    fn on_wheel(&mut self, renderer: &mut Renderer, event: WheelEvent) {
        ToolCore::zoom(renderer, event);
        self.sync_cursor(renderer);
    }

    fn get_args(&self) -> Value {
        self.core.args_value(&self.args)
    }

    fn update_args(&mut self, renderer: &mut Renderer, patch: &Value) -> ToolResult<()> {
        self.args = self.core.update_args(&self.args, patch)?;
        self.sync_cursor(renderer);
        Ok(())
    }

    fn command(&mut self, renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        match command {
            ToolCommand::Save => self.confirm(renderer),
            ToolCommand::Revert => {
                self.cancel(renderer);
                Ok(())
            }
            command => Err(ToolError::Unsupported {
                tool: Self::NAME,
                command,
            }),
        }
    }

    fn confirm(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        if !self.core.is_dirty() {
            return Err(ToolError::NothingToConfirm { tool: Self::NAME });
        }
        renderer.commit_selection();
        let saved = ToolCore::save_png(renderer)?;
        self.core.emit_save(saved);
        renderer.copy_edit_image_from_base_image();
        self.core.set_dirty(false);
        Ok(())
    }

    fn cancel(&mut self, renderer: &mut Renderer) {
        renderer.copy_edit_image_from_base_image();
        self.core.set_dirty(false);
    }

    fn destroy(&mut self, renderer: &mut Renderer, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.core.is_dirty() && !confirm_discard() {
            return false;
        }
        renderer.set_cursor(None);
        if let Err(err) = renderer.set_edit_image(None) {
            tracing::warn!(?err, "failed to clear smudge working copy");
        }
        true
    }

    fn listeners_mut(&mut self) -> &mut ToolListeners {
        self.core.listeners_mut()
    }
}
