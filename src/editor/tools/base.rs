use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{SavedImage, ToolListeners};
use crate::editor::{PointerButton, PointerEvent, ToolResult, WheelEvent};
use crate::geometry::CanvasPoint;
use crate::pixels::EncodeFormat;
use crate::render::{Cursor, Renderer};
use crate::storage::{merge_args, StorageError, ToolArgsStore};
use crate::viewport::ZoomDirection;

/// State and behaviour every tool shares: view navigation, listeners, the dirty flag
/// and argument persistence.
pub(crate) struct ToolCore {
    name: &'static str,
    store: Arc<dyn ToolArgsStore>,
    listeners: ToolListeners,
    pan_anchor: Option<CanvasPoint>,
    dirty: bool,
}

impl ToolCore {
    pub fn new(name: &'static str, store: Arc<dyn ToolArgsStore>) -> Self {
        Self {
            name,
            store,
            listeners: ToolListeners::default(),
            pan_anchor: None,
            dirty: false,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub fn listeners_mut(&mut self) -> &mut ToolListeners {
        &mut self.listeners
    }

    pub fn to_canvas(renderer: &Renderer, position: CanvasPoint) -> CanvasPoint {
        renderer.viewport().to_canvas(position)
    }

    /// Starts a middle-button pan. Returns whether the event was consumed.
    pub fn pan_start(&mut self, event: PointerEvent) -> bool {
        if event.button != PointerButton::Middle {
            return false;
        }
        self.pan_anchor = Some(event.position);
        true
    }

    pub fn pan_move(&mut self, renderer: &mut Renderer, event: PointerEvent) -> bool {
        let Some(anchor) = self.pan_anchor else {
            return false;
        };
        let (delta_x, delta_y) = (event.position.x - anchor.x, event.position.y - anchor.y);
        renderer.update_viewport(|viewport| viewport.pan(delta_x, delta_y));
        self.pan_anchor = Some(event.position);
        true
    }

    pub fn pan_end(&mut self) -> bool {
        self.pan_anchor.take().is_some()
    }

    pub const fn is_panning(&self) -> bool {
        self.pan_anchor.is_some()
    }

    pub fn zoom(renderer: &mut Renderer, event: WheelEvent) {
        let direction = ZoomDirection::from_wheel_delta(event.delta_y);
        renderer.update_viewport(|viewport| viewport.zoom_at_point(event.position, direction));
    }

    pub fn show_crosshairs(renderer: &mut Renderer, position: CanvasPoint) {
        let point = Self::to_canvas(renderer, position);
        renderer.set_cursor(Some(Cursor::crosshairs(point)));
    }

    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        if self.dirty == dirty {
            return;
        }
        self.dirty = dirty;
        self.listeners.notify_dirty(dirty);
    }

    pub fn report_progress(&mut self, progress: f32) {
        self.listeners.notify_progress(progress.clamp(0.0, 1.0));
    }

    pub fn report_error(&mut self, message: Option<String>) {
        self.listeners.notify_error(message);
    }

    pub fn report_state(&mut self, state: &'static str) {
        tracing::debug!(tool = self.name, state, "tool state changed");
        self.listeners.notify_state_change(state);
    }

    pub fn emit_save(&mut self, saved: SavedImage) {
        tracing::info!(tool = self.name, bytes = saved.bytes.len(), "emitting saved image");
        self.listeners.notify_save(saved);
    }

    pub fn save_png(renderer: &Renderer) -> ToolResult<SavedImage> {
        Ok(SavedImage::png(renderer.encoded_image(None, EncodeFormat::Png)?))
    }

    /// Stored arguments merged over `defaults`. A corrupt entry logs and falls back.
    pub fn load_args<T: Serialize + DeserializeOwned>(&self, defaults: T) -> T {
        let stored = match self.store.load(self.name) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(?err, tool = self.name, "failed to load tool arguments");
                return defaults;
            }
        };
        match merge_over(&defaults, &stored) {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(?err, tool = self.name, "ignoring invalid stored tool arguments");
                defaults
            }
        }
    }

    /// Persists `patch` and returns it merged over the stored keys and `current`.
    pub fn update_args<T: Serialize + DeserializeOwned>(&self, current: &T, patch: &Value) -> ToolResult<T> {
        let stored = self.store.update(self.name, patch)?;
        Ok(merge_over(current, &stored)?)
    }

    pub fn args_value<T: Serialize>(&self, args: &T) -> Value {
        serde_json::to_value(args).unwrap_or_else(|err| {
            tracing::warn!(?err, tool = self.name, "failed to serialize tool arguments");
            Value::Null
        })
    }
}

fn merge_over<T: Serialize + DeserializeOwned>(base: &T, stored: &Value) -> Result<T, StorageError> {
    let mut merged = serde_json::to_value(base)?;
    merge_args(&mut merged, stored);
    Ok(serde_json::from_value(merged)?)
}
