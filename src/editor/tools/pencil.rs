use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Tool, ToolCommand, ToolCore, ToolListeners};
use crate::editor::{PointerButton, PointerEvent, ToolEnvironment, ToolError, ToolResult, WheelEvent};
use crate::geometry::{CanvasPoint, Color};
use crate::render::{BrushTarget, Cursor, CursorShape, Renderer};

const MAX_PALETTE_SIZE: usize = 30;
/// Colour-picker swatch radius as a fraction of the image width.
const PICKER_RADIUS_DIVISOR: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PencilArgs {
    pub brush_size: u32,
    pub brush_color: Color,
    pub palette: Vec<Color>,
}

/// Puts a freshly picked colour first and caps the palette length.
fn add_to_palette(palette: &mut Vec<Color>, color: Color) {
    if !palette.contains(&color) {
        palette.insert(0, color);
    }
    palette.truncate(MAX_PALETTE_SIZE);
}

/// Round-brush drawing on the edit layer, or in white on the mask layer.
pub struct PencilTool {
    core: ToolCore,
    target: BrushTarget,
    args: PencilArgs,
    drawing: bool,
    picking: bool,
    picked: Color,
    last: Option<CanvasPoint>,
}

impl PencilTool {
    pub const NAME: &'static str = "pencil";
    pub const MASK_NAME: &'static str = "mask-editor";

    pub fn new(env: &ToolEnvironment) -> Self {
        let palette = env.config.pencil.palette.clone();
        let defaults = PencilArgs {
            brush_size: env.config.pencil.brush_size,
            brush_color: palette.first().copied().unwrap_or(Color::WHITE),
            palette,
        };
        Self::with_target(env, Self::NAME, BrushTarget::Edit, defaults)
    }

    /// Mask painter embedded in the enhance tool. Always paints white.
    pub fn for_mask(env: &ToolEnvironment) -> Self {
        let defaults = PencilArgs {
            brush_size: env.config.pencil.brush_size,
            brush_color: Color::WHITE,
            palette: vec![Color::WHITE],
        };
        let mut tool = Self::with_target(env, Self::MASK_NAME, BrushTarget::Mask, defaults);
        tool.args.brush_color = Color::WHITE;
        tool
    }

    fn with_target(env: &ToolEnvironment, name: &'static str, target: BrushTarget, defaults: PencilArgs) -> Self {
        let core = ToolCore::new(name, env.args.clone());
        let args = core.load_args(defaults);
        Self {
            core,
            target,
            args,
            drawing: false,
            picking: false,
            picked: Color::BLACK,
            last: None,
        }
    }

    pub const fn target(&self) -> BrushTarget {
        self.target
    }

    pub fn brush_color(&self) -> Color {
        self.args.brush_color
    }

    pub fn begin_color_picker(&mut self, renderer: &mut Renderer) {
        self.picking = true;
        self.sync_cursor(renderer);
    }

    fn sync_cursor(&self, renderer: &mut Renderer) {
        let Some(point) = self.last else {
            renderer.set_cursor(None);
            return;
        };
        let cursor = if self.picking {
            Cursor::new(
                CursorShape::ColorPicker,
                point,
                f64::from(renderer.width()) / PICKER_RADIUS_DIVISOR,
                self.picked,
            )
        } else {
            Cursor::new(
                CursorShape::CircleFill,
                point,
                f64::from(self.args.brush_size) / 2.0,
                self.args.brush_color,
            )
        };
        renderer.set_cursor(Some(cursor));
    }

    fn finish_pick(&mut self) {
        self.picking = false;
        let color = self.picked;
        self.args.brush_color = color;
        add_to_palette(&mut self.args.palette, color);
        tracing::debug!(%color, "colour picked");
        self.core.listeners_mut().notify_color_picked(color);
    }
}

impl Tool for PencilTool {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn state_name(&self) -> &'static str {
        if self.picking {
            "pick-color"
        } else {
            "default"
        }
    }

    fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    fn on_pointer_down(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.picking || self.core.pan_start(event) {
            return;
        }
        if event.button == PointerButton::Primary {
            let point = ToolCore::to_canvas(renderer, event.position);
            renderer.draw_point(point, self.args.brush_size, self.args.brush_color, self.target);
            self.drawing = true;
            self.last = Some(point);
            self.core.set_dirty(true);
        }
        self.sync_cursor(renderer);
    }

    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        let point = ToolCore::to_canvas(renderer, event.position);
        if self.picking {
            if let Some(color) = renderer.get_pixel(point) {
                self.picked = color;
            }
        } else if !self.core.pan_move(renderer, event) && self.drawing {
            if let Some(last) = self.last {
                renderer.draw_line(last, point, self.args.brush_size, self.args.brush_color, self.target);
                self.core.set_dirty(true);
            }
        }
        self.last = Some(point);
        self.sync_cursor(renderer);
    }

    fn on_pointer_up(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.core.pan_end() {
            return;
        }
        if event.button == PointerButton::Primary {
            self.drawing = false;
            if self.picking {
                self.finish_pick();
            }
        }
        self.sync_cursor(renderer);
    }

    fn on_pointer_leave(&mut self, renderer: &mut Renderer) {
        self.core.pan_end();
        self.drawing = false;
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
        if self.target == BrushTarget::Mask {
            self.args.brush_color = Color::WHITE;
        }
        self.sync_cursor(renderer);
        Ok(())
    }

    fn command(&mut self, renderer: &mut Renderer, command: ToolCommand) -> ToolResult<()> {
        match command {
            ToolCommand::PickColor if self.target == BrushTarget::Edit => {
                self.begin_color_picker(renderer);
                Ok(())
            }
            ToolCommand::Save => self.confirm(renderer),
            ToolCommand::Revert => {
                self.cancel(renderer);
                Ok(())
            }
            command => Err(ToolError::Unsupported {
                tool: self.core.name(),
                command,
            }),
        }
    }

    fn confirm(&mut self, renderer: &mut Renderer) -> ToolResult<()> {
        if self.target == BrushTarget::Mask || !self.core.is_dirty() {
            return Err(ToolError::NothingToConfirm { tool: self.core.name() });
        }
        renderer.commit_selection();
        let saved = ToolCore::save_png(renderer)?;
        self.core.emit_save(saved);
        self.core.set_dirty(false);
        Ok(())
    }

    fn cancel(&mut self, renderer: &mut Renderer) {
        if self.target == BrushTarget::Edit {
            if let Err(err) = renderer.set_edit_image(None) {
                tracing::warn!(?err, "failed to clear pencil strokes");
            }
        }
        self.picking = false;
        self.core.set_dirty(false);
    }

    /// Pencil work is kept rather than discarded when switching tools.
    fn destroy(&mut self, renderer: &mut Renderer, _confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.target == BrushTarget::Edit && self.core.is_dirty() {
            renderer.commit_selection();
            self.core.set_dirty(false);
        }
        renderer.set_cursor(None);
        true
    }

    fn listeners_mut(&mut self) -> &mut ToolListeners {
        self.core.listeners_mut()
    }
}
