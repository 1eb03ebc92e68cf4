use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Tool, ToolCore, ToolListeners};
use crate::editor::{PointerEvent, ToolEnvironment, ToolResult, WheelEvent};
use crate::geometry::{round_up_to_multiple, snap_to_grid, CanvasPoint, ImageBounds, Rect};
use crate::render::Renderer;

/// Hover-and-drag placement of a fixed-size selection rectangle, snapped to a grid.
/// Shared by the region-based tools while they are in their select state. Sizes are
/// kept to multiples of the grid step.
#[derive(Debug, Clone)]
pub(crate) struct SelectionHandler {
    grid_step: u32,
    width: u32,
    height: u32,
    outpaint: bool,
    pressed: bool,
    preview: Option<Rect>,
}

impl SelectionHandler {
    pub fn new(grid_step: u32, width: u32, height: u32) -> Self {
        Self {
            grid_step,
            width: round_up_to_multiple(width.max(1), grid_step),
            height: round_up_to_multiple(height.max(1), grid_step),
            outpaint: false,
            pressed: false,
            preview: None,
        }
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = round_up_to_multiple(width.max(1), self.grid_step);
        self.height = round_up_to_multiple(height.max(1), self.grid_step);
    }

    /// With outpainting on, the selection may hang past the image as long as one grid
    /// step of it still overlaps the image.
    pub fn set_outpaint(&mut self, outpaint: bool) {
        self.outpaint = outpaint;
    }

    pub const fn outpaint(&self) -> bool {
        self.outpaint
    }

    /// Selection centered on `center`, snapped and kept within the allowed area.
    pub fn placement(&self, bounds: ImageBounds, center: CanvasPoint) -> Rect {
        let (width, height) = if self.outpaint {
            (self.width, self.height)
        } else {
            (
                self.fit_to_grid(self.width, bounds.width),
                self.fit_to_grid(self.height, bounds.height),
            )
        };
        let x = snap_to_grid(center.x - f64::from(width) / 2.0, self.grid_step);
        let y = snap_to_grid(center.y - f64::from(height) / 2.0, self.grid_step);
        let rect = Rect::new(x, y, width, height);
        if !self.outpaint {
            return rect.clamped_into(bounds);
        }

        let grid = i64::from(self.grid_step.max(1));
        let clamp_axis = |value: i32, size: u32, limit: u32| {
            let low = grid - i64::from(size);
            let high = (i64::from(limit) - grid).max(low);
            i64::from(value).clamp(low, high) as i32
        };
        Rect::new(
            clamp_axis(x, width, bounds.width),
            clamp_axis(y, height, bounds.height),
            width,
            height,
        )
    }

    /// Caps `size` at `limit`, rounding down to a grid multiple unless the image is
    /// smaller than one step.
    fn fit_to_grid(&self, size: u32, limit: u32) -> u32 {
        let capped = size.min(limit);
        let step = self.grid_step.max(1);
        if capped < step {
            capped
        } else {
            capped - capped % step
        }
    }

    pub fn pointer_down(&mut self, renderer: &mut Renderer, point: CanvasPoint) {
        self.pressed = true;
        self.pointer_move(renderer, point);
    }

    pub fn pointer_move(&mut self, renderer: &mut Renderer, point: CanvasPoint) {
        let preview = self.placement(renderer.bounds(), point);
        if self.preview != Some(preview) {
            self.preview = Some(preview);
            renderer.set_selection_overlay_preview(Some(preview));
        }
    }

    /// Commits the previewed rectangle when a press is released. Returns whether the
    /// selection changed.
    pub fn pointer_up(&mut self, renderer: &mut Renderer) -> bool {
        let pressed = std::mem::replace(&mut self.pressed, false);
        let Some(preview) = self.preview.take().filter(|_| pressed) else {
            return false;
        };
        tracing::debug!(?preview, "selection committed");
        renderer.set_selection_overlay(Some(preview));
        renderer.set_selection_overlay_preview(None);
        true
    }

    /// Drops the preview and any press in progress.
    pub fn finish(&mut self, renderer: &mut Renderer) {
        self.pressed = false;
        self.preview = None;
        renderer.set_selection_overlay_preview(None);
    }

    /// Square selection of `min(width, height, size)` at the origin.
    pub fn reset(&mut self, renderer: &mut Renderer, size: u32) {
        let side = size.min(renderer.width()).min(renderer.height());
        self.finish(renderer);
        renderer.set_selection_overlay(Some(Rect::new(0, 0, side, side)));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionArgs {
    pub selection_width: u32,
    pub selection_height: u32,
    pub outpaint: bool,
}

/// Standalone rectangle placement tool.
pub struct SelectionTool {
    core: ToolCore,
    handler: SelectionHandler,
    args: SelectionArgs,
}

impl SelectionTool {
    pub const NAME: &'static str = "select";

    pub fn new(env: &ToolEnvironment) -> Self {
        let core = ToolCore::new(Self::NAME, env.args.clone());
        let size = env.config.selection.default_size;
        let args = core.load_args(SelectionArgs {
            selection_width: size,
            selection_height: size,
            outpaint: false,
        });
        let mut tool = Self {
            core,
            handler: SelectionHandler::new(env.config.selection.grid_step, size, size),
            args: args.clone(),
        };
        tool.apply_args(args);
        tool
    }

    fn apply_args(&mut self, args: SelectionArgs) {
        self.handler.set_size(args.selection_width, args.selection_height);
        self.handler.set_outpaint(args.outpaint);
        self.args = args;
    }
}

impl Tool for SelectionTool {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn on_pointer_down(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.core.pan_start(event) {
            return;
        }
        let point = ToolCore::to_canvas(renderer, event.position);
        self.handler.pointer_down(renderer, point);
    }

    fn on_pointer_move(&mut self, renderer: &mut Renderer, event: PointerEvent) {
        if self.core.pan_move(renderer, event) {
            return;
        }
        let point = ToolCore::to_canvas(renderer, event.position);
        self.handler.pointer_move(renderer, point);
    }

    fn on_pointer_up(&mut self, renderer: &mut Renderer, _event: PointerEvent) {
        if self.core.pan_end() {
            return;
        }
        self.handler.pointer_up(renderer);
    }

    fn on_pointer_leave(&mut self, renderer: &mut Renderer) {
        self.core.pan_end();
        self.handler.finish(renderer);
    }

    fn on_wheel(&mut self, renderer: &mut Renderer, event: WheelEvent) {
        ToolCore::zoom(renderer, event);
    }

    fn get_args(&self) -> Value {
        self.core.args_value(&self.args)
    }

    fn update_args(&mut self, _renderer: &mut Renderer, patch: &Value) -> ToolResult<()> {
        let args = self.core.update_args(&self.args, patch)?;
        self.apply_args(args);
        Ok(())
    }

    fn destroy(&mut self, renderer: &mut Renderer, _confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        self.handler.finish(renderer);
        true
    }

    fn listeners_mut(&mut self) -> &mut ToolListeners {
        self.core.listeners_mut()
    }
}
