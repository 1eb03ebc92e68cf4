use std::time::{Duration, Instant};

use serde_json::Value;

use super::tools::{
    AugmentTool, EnhanceTool, InpaintTool, PencilTool, SelectionTool, SmudgeTool, Tool,
    ToolCommand, ToolKind, VariantDirection,
};
use super::{ImageContext, PointerEvent, ToolEnvironment, ToolError, ToolResult, WheelEvent};
use crate::geometry::CanvasPoint;
use crate::input::{resolve_shortcut, InputContext, ShortcutAction, ShortcutKey, ShortcutModifiers};
use crate::pixels::RgbaImage;
use crate::render::Renderer;
use crate::viewport::{PinchGesture, ZoomDirection};

/// How long a single touch waits for a second finger before it starts drawing.
pub const TOUCH_DEFER: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy)]
enum TouchState {
    Idle,
    /// One finger is down but not yet forwarded.
    Deferred { position: CanvasPoint, since: Instant },
    Drawing { last: CanvasPoint },
    Pinching(PinchGesture),
}

/// Owns the renderer and the active tool, and routes input between them.
pub struct ToolController {
    renderer: Renderer,
    tool: Box<dyn Tool>,
    kind: ToolKind,
    env: ToolEnvironment,
    touch: TouchState,
}

impl ToolController {
    pub fn new(renderer: Renderer, env: ToolEnvironment) -> Self {
        let tool: Box<dyn Tool> = Box::new(SelectionTool::new(&env));
        Self {
            renderer,
            tool,
            kind: ToolKind::Select,
            env,
            touch: TouchState::Idle,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn tool(&self) -> &dyn Tool {
        self.tool.as_ref()
    }

    /// Mutable access for registering listeners on the active tool.
    pub fn tool_mut(&mut self) -> &mut dyn Tool {
        self.tool.as_mut()
    }

    pub const fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn environment(&self) -> &ToolEnvironment {
        &self.env
    }

    fn build(kind: ToolKind, env: &ToolEnvironment, renderer: &mut Renderer) -> Box<dyn Tool> {
        match kind {
            ToolKind::Select => Box::new(SelectionTool::new(env)),
            ToolKind::Inpaint => Box::new(InpaintTool::new(env, renderer)),
            ToolKind::Smudge => Box::new(SmudgeTool::new(env, renderer)),
            ToolKind::Pencil => Box::new(PencilTool::new(env)),
            ToolKind::Enhance => Box::new(EnhanceTool::new(env, renderer)),
            ToolKind::Augment => Box::new(AugmentTool::new(env)),
        }
    }

    /// Tears the current tool down and starts `kind`. Returns false, keeping the
    /// current tool, when it refuses to discard unsaved work.
    pub fn select_tool(&mut self, kind: ToolKind, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if !self.tool.destroy(&mut self.renderer, confirm_discard) {
            tracing::debug!(current = self.kind.name(), requested = kind.name(), "tool switch refused");
            return false;
        }
        self.touch = TouchState::Idle;
        self.tool = Self::build(kind, &self.env, &mut self.renderer);
        self.kind = kind;
        tracing::info!(tool = kind.name(), "tool selected");
        true
    }

    /// Starts a new editing session on `image` and restarts the active tool on it.
    pub fn load_image(&mut self, image: RgbaImage, context: ImageContext) {
        self.tool.destroy(&mut self.renderer, &mut || true);
        self.renderer.set_base_image(image);
        self.env.image = context;
        self.touch = TouchState::Idle;
        self.tool = Self::build(self.kind, &self.env, &mut self.renderer);
    }

    pub fn pointer_down(&mut self, event: PointerEvent) {
        self.tool.on_pointer_down(&mut self.renderer, event);
    }

    pub fn pointer_move(&mut self, event: PointerEvent) {
        self.tool.on_pointer_move(&mut self.renderer, event);
    }

    pub fn pointer_up(&mut self, event: PointerEvent) {
        self.tool.on_pointer_up(&mut self.renderer, event);
    }

    pub fn pointer_leave(&mut self) {
        self.tool.on_pointer_leave(&mut self.renderer);
    }

    pub fn wheel(&mut self, event: WheelEvent) {
        self.tool.on_wheel(&mut self.renderer, event);
    }

    pub fn command(&mut self, command: ToolCommand) -> ToolResult<()> {
        self.tool.command(&mut self.renderer, command)
    }

    pub fn get_args(&self) -> Value {
        self.tool.get_args()
    }

    pub fn update_args(&mut self, patch: &Value) -> ToolResult<()> {
        self.tool.update_args(&mut self.renderer, patch)
    }

    pub fn confirm(&mut self) -> ToolResult<()> {
        self.tool.confirm(&mut self.renderer)
    }

    pub fn cancel(&mut self) {
        self.tool.cancel(&mut self.renderer);
    }

    pub fn select_variant(&mut self, direction: VariantDirection) {
        self.tool.select(&mut self.renderer, direction);
    }

    pub fn undo(&mut self) -> bool {
        self.renderer.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.renderer.redo()
    }

    /// Drains finished background work into the active tool. Returns whether anything
    /// changed.
    pub fn poll(&mut self) -> bool {
        self.tool.poll(&mut self.renderer)
    }

    /// Returns whether the key was handled.
    pub fn key_down(&mut self, key: ShortcutKey, modifiers: ShortcutModifiers, text_input_active: bool) -> bool {
        let busy = self.tool.is_busy();
        if !text_input_active && !busy && self.tool.on_key_down(&mut self.renderer, key, modifiers) {
            return true;
        }
        let context = InputContext {
            text_input_active,
            tool_busy: busy,
        };
        let Some(action) = resolve_shortcut(key, modifiers, context) else {
            return false;
        };
        tracing::debug!(?action, tool = self.kind.name(), "shortcut");
        match action {
            ShortcutAction::Undo => {
                self.renderer.undo();
            }
            ShortcutAction::Redo => {
                self.renderer.redo();
            }
            ShortcutAction::Confirm => match self.tool.confirm(&mut self.renderer) {
                Ok(()) | Err(ToolError::NothingToConfirm { .. }) => {}
                Err(err) => tracing::warn!(?err, "confirm failed"),
            },
            ShortcutAction::Cancel => self.tool.cancel(&mut self.renderer),
            ShortcutAction::PreviousVariant => self.select_variant(VariantDirection::Left),
            ShortcutAction::NextVariant => self.select_variant(VariantDirection::Right),
            ShortcutAction::ZoomIn => self.zoom_at_center(ZoomDirection::In),
            ShortcutAction::ZoomOut => self.zoom_at_center(ZoomDirection::Out),
        }
        true
    }

    fn zoom_at_center(&mut self, direction: ZoomDirection) {
        let geometry = self.renderer.viewport().geometry();
        let center = CanvasPoint::new(geometry.display_width / 2.0, geometry.display_height / 2.0);
        self.renderer
            .update_viewport(|viewport| viewport.zoom_at_point(center, direction));
    }

    /// `touches` are the positions of every finger now down.
    pub fn touch_start(&mut self, touches: &[CanvasPoint], now: Instant) {
        match touches {
            [] => {}
            [position] => {
                self.touch = TouchState::Deferred {
                    position: *position,
                    since: now,
                };
            }
            [first, second, ..] => {
                if let TouchState::Drawing { last } = self.touch {
                    self.pointer_up(PointerEvent::primary(last.x, last.y));
                }
                let gesture = self.renderer.viewport().begin_pinch(*first, *second);
                self.touch = TouchState::Pinching(gesture);
            }
        }
    }

    pub fn touch_move(&mut self, touches: &[CanvasPoint]) {
        match (self.touch, touches) {
            (TouchState::Deferred { .. }, [position]) => {
                self.flush_deferred();
                self.pointer_move(PointerEvent::primary(position.x, position.y));
                self.touch = TouchState::Drawing { last: *position };
            }
            (TouchState::Drawing { .. }, [position, ..]) => {
                self.pointer_move(PointerEvent::primary(position.x, position.y));
                self.touch = TouchState::Drawing { last: *position };
            }
            (TouchState::Pinching(gesture), [first, second, ..]) => {
                self.renderer
                    .update_viewport(|viewport| viewport.apply_pinch(&gesture, *first, *second));
            }
            _ => {}
        }
    }

    /// `remaining` are the fingers still down after the release.
    pub fn touch_end(&mut self, remaining: &[CanvasPoint]) {
        match self.touch {
            TouchState::Deferred { position, .. } => {
                self.flush_deferred();
                self.pointer_up(PointerEvent::primary(position.x, position.y));
                self.touch = TouchState::Idle;
            }
            TouchState::Drawing { last } => {
                self.pointer_up(PointerEvent::primary(last.x, last.y));
                self.touch = TouchState::Idle;
            }
            TouchState::Pinching(_) if remaining.len() < 2 => self.touch = TouchState::Idle,
            TouchState::Pinching(_) | TouchState::Idle => {}
        }
    }

    /// Starts drawing with a deferred touch once it has waited out `TOUCH_DEFER`.
    pub fn touch_tick(&mut self, now: Instant) {
        if let TouchState::Deferred { position, since } = self.touch {
            if now.saturating_duration_since(since) >= TOUCH_DEFER {
                self.flush_deferred();
                self.touch = TouchState::Drawing { last: position };
            }
        }
    }

    fn flush_deferred(&mut self) {
        if let TouchState::Deferred { position, .. } = self.touch {
            self.pointer_down(PointerEvent::primary(position.x, position.y));
        }
    }
}
