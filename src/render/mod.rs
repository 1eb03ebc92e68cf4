//! Layered renderer: owns the raster layers, the snapshot history and the view, and is the
//! only path through which base-layer pixels are read or written.

mod history;
mod layer;
mod overlay;

use std::fmt;

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::geometry::{CanvasPoint, Color, ImageBounds, Rect};
use crate::pixels::{
    self, composite_over, crop_region, encode_image, erasure_to_mask, fill_circle, invert_rgb,
    paste_region, stamp_line, EncodeFormat, PixelError,
};
use crate::viewport::{CanvasGeometry, Viewport, ZoomLimits};

pub use history::{HistoryAction, Snapshot, SnapshotHistory, DEFAULT_MAX_SNAPSHOTS};
pub use layer::{BrushTarget, LayerKind, MaskSource, RasterLayer};
pub use overlay::{overlay_line_width, Cursor, CursorShape, OverlayState};

const MASK_LAYER_OPACITY: f32 = 0.3;
const CHECKER_SIZE: u32 = 20;
const CHECKER_DARK: Rgba<u8> = Rgba([0x80, 0x80, 0x80, 255]);
const CHECKER_LIGHT: Rgba<u8> = Rgba([0xAA, 0xAA, 0xAA, 255]);
const MASK_FILL: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no selection overlay is set")]
    NoSelection,
    #[error("no mask layer exists")]
    NoMask,
    #[error(transparent)]
    Pixel(#[from] PixelError),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub zoom: ZoomLimits,
    pub max_snapshots: usize,
    pub default_selection_size: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            zoom: ZoomLimits::default(),
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            default_selection_size: 512,
        }
    }
}

/// Notified with `(can_undo, can_redo)` whenever history or edit visibility changes.
pub type SnapshotListener = Box<dyn FnMut(bool, bool)>;

pub struct Renderer {
    base: RasterLayer,
    edit: RasterLayer,
    mask: Option<RasterLayer>,
    overlay_layer: RasterLayer,
    overlay: OverlayState,
    edit_visible: bool,
    history: SnapshotHistory,
    viewport: Viewport,
    settings: RendererSettings,
    frame: RgbaImage,
    snapshot_listener: Option<SnapshotListener>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("size", &self.base.dimensions())
            .field("selection", &self.overlay.selection)
            .field("edit_visible", &self.edit_visible)
            .field("masked", &self.mask.is_some())
            .field("undo_depth", &self.history.undo_depth())
            .field("redo_depth", &self.history.redo_depth())
            .finish()
    }
}

impl Renderer {
    pub fn new(geometry: CanvasGeometry, settings: RendererSettings) -> Self {
        Self {
            base: RasterLayer::new(0, 0),
            edit: RasterLayer::new(0, 0),
            mask: None,
            overlay_layer: RasterLayer::new(0, 0),
            overlay: OverlayState::default(),
            edit_visible: false,
            history: SnapshotHistory::new(settings.max_snapshots),
            viewport: Viewport::new(geometry, settings.zoom),
            settings,
            frame: RgbaImage::new(geometry.backing_width, geometry.backing_height),
            snapshot_listener: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.base.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.base.dimensions().1
    }

    pub fn bounds(&self) -> ImageBounds {
        let (width, height) = self.base.dimensions();
        ImageBounds::new(width, height)
    }

    pub const fn settings(&self) -> RendererSettings {
        self.settings
    }

    /// Replaceable callback fired when undo/redo availability may have changed.
    pub fn on_snapshot(&mut self, listener: SnapshotListener) {
        self.snapshot_listener = Some(listener);
    }

    fn notify_snapshot(&mut self) {
        let (can_undo, can_redo) = (self.can_undo(), self.can_redo());
        if let Some(listener) = self.snapshot_listener.as_mut() {
            listener(can_undo, can_redo);
        }
    }

    /// Starts a new session on `image`: resizes every layer, drops the mask, centers a
    /// default selection, fits the view and resets history to this image.
    pub fn set_base_image(&mut self, image: RgbaImage) {
        tracing::info!(
            width = image.width(),
            height = image.height(),
            "loading base image"
        );
        self.install_base(image);
        let bounds = self.bounds();
        self.overlay.selection = Some(Rect::centered(bounds, self.settings.default_selection_size));
        self.viewport.fit_to(bounds);
        self.history.reset(Snapshot::capture(self.base.pixels()));
        self.render();
        self.notify_snapshot();
    }

    /// Swaps the base image as an undoable step, keeping history. The selection is kept
    /// (clamped) when `keep_selection` is set, otherwise re-centered.
    pub fn replace_base_image(&mut self, image: RgbaImage, keep_selection: bool) {
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            keep_selection,
            "replacing base image"
        );
        self.install_base(image);
        let bounds = self.bounds();
        self.overlay.selection = match self.overlay.selection {
            Some(selection) if keep_selection => Some(selection.clamped_into(bounds)),
            _ => Some(Rect::centered(bounds, self.settings.default_selection_size)),
        };
        self.viewport.fit_to(bounds);
        self.snapshot();
    }

    fn install_base(&mut self, image: RgbaImage) {
        let (width, height) = image.dimensions();
        self.base.replace(image);
        self.edit.reset(width, height);
        self.overlay_layer.reset(width, height);
        self.mask = None;
        self.edit_visible = false;
        self.overlay.preview = None;
        self.overlay.cursor = None;
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let (width, height) = snapshot.dimensions();
        if self.base.dimensions() != (width, height) {
            self.edit.reset(width, height);
            self.overlay_layer.reset(width, height);
            self.mask = None;
            let bounds = ImageBounds::new(width, height);
            self.overlay.selection = self.overlay.selection.map(|rect| rect.clamped_into(bounds));
            self.viewport.fit_to(bounds);
        }
        self.base.replace(snapshot.pixels().clone());
    }

    /// Writes `pixels` into the edit layer at the selection origin, or clears it.
    pub fn set_edit_image(&mut self, pixels: Option<&RgbaImage>) -> RenderResult<()> {
        let selection = match pixels {
            Some(_) => Some(self.overlay.selection.ok_or(RenderError::NoSelection)?),
            None => None,
        };
        self.edit.clear();
        match (pixels, selection) {
            (Some(pixels), Some(selection)) => {
                paste_region(
                    self.edit.pixels_mut(),
                    pixels,
                    i64::from(selection.x),
                    i64::from(selection.y),
                );
                self.edit_visible = true;
            }
            _ => self.edit_visible = false,
        }
        self.render();
        self.notify_snapshot();
        Ok(())
    }

    pub const fn has_edit_image(&self) -> bool {
        self.edit_visible
    }

    /// Merges the edit layer into base and records the result.
    pub fn commit_selection(&mut self) {
        composite_over(self.base.pixels_mut(), self.edit.pixels(), 0, 0, 1.0);
        self.edit.clear();
        self.edit_visible = false;
        tracing::debug!("committed edit layer into base");
        self.snapshot();
    }

    pub fn snapshot(&mut self) {
        if self.history.push(Snapshot::capture(self.base.pixels())).is_some() {
            tracing::debug!(limit = self.history.limit(), "evicted oldest snapshot");
        }
        self.render();
        self.notify_snapshot();
    }

    pub fn undo(&mut self) -> bool {
        self.step_history(HistoryAction::Undo)
    }

    pub fn redo(&mut self) -> bool {
        self.step_history(HistoryAction::Redo)
    }

    fn step_history(&mut self, action: HistoryAction) -> bool {
        if self.edit_visible {
            tracing::debug!(?action, "history is locked while edit content is showing");
            return false;
        }
        let snapshot = match action {
            HistoryAction::Undo => self.history.undo().cloned(),
            HistoryAction::Redo => self.history.redo().cloned(),
        };
        let Some(snapshot) = snapshot else {
            tracing::debug!("{}", action.empty_message());
            return false;
        };
        self.restore(snapshot);
        tracing::debug!("{}", action.applied_message());
        self.render();
        self.notify_snapshot();
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.edit_visible && self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        !self.edit_visible && self.history.can_redo()
    }

    pub fn clear_redo(&mut self) {
        self.history.clear_redo();
        self.notify_snapshot();
    }

    /// Throws away base-layer changes made since the last snapshot (erasures) and
    /// clears redo.
    pub fn discard_uncommitted(&mut self) {
        if let Some(current) = self.history.current().cloned() {
            self.restore(current);
        }
        self.history.clear_redo();
        self.render();
        self.notify_snapshot();
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    fn layer(&self, kind: LayerKind) -> RenderResult<&RgbaImage> {
        match kind {
            LayerKind::Base => Ok(self.base.pixels()),
            LayerKind::Edit => Ok(self.edit.pixels()),
            LayerKind::Mask => self
                .mask
                .as_ref()
                .map(RasterLayer::pixels)
                .ok_or(RenderError::NoMask),
        }
    }

    /// Copies a region (default: the whole image) out of a layer.
    pub fn image_data(&self, region: Option<Rect>, kind: LayerKind) -> RenderResult<RgbaImage> {
        let pixels = self.layer(kind)?;
        Ok(match region {
            Some(region) => crop_region(pixels, region),
            None => pixels.clone(),
        })
    }

    pub fn encoded_image(&self, region: Option<Rect>, format: EncodeFormat) -> RenderResult<Vec<u8>> {
        let pixels = self.image_data(region, LayerKind::Base)?;
        Ok(encode_image(&pixels, format)?)
    }

    /// PNG mask of `region`: erased base pixels or the painted mask layer.
    pub fn encoded_mask(&self, region: Option<Rect>, source: MaskSource) -> RenderResult<Vec<u8>> {
        let mask = match source {
            MaskSource::Erasure => erasure_to_mask(&self.image_data(region, LayerKind::Base)?),
            MaskSource::MaskLayer => self.image_data(region, LayerKind::Mask)?,
        };
        Ok(encode_image(&mask, EncodeFormat::Png)?)
    }

    pub fn get_pixel(&self, point: CanvasPoint) -> Option<Color> {
        if point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        let (x, y) = (point.x as u32, point.y as u32);
        let pixels = self.base.pixels();
        (x < pixels.width() && y < pixels.height()).then(|| Color::from_rgba(*pixels.get_pixel(x, y)))
    }

    fn brush_layer(&mut self, target: BrushTarget) -> Option<&mut RgbaImage> {
        match target {
            BrushTarget::Edit => Some(self.edit.pixels_mut()),
            BrushTarget::Mask => self.mask.as_mut().map(RasterLayer::pixels_mut),
        }
    }

    pub fn draw_point(&mut self, point: CanvasPoint, brush_size: u32, color: Color, target: BrushTarget) {
        let Some(layer) = self.brush_layer(target) else {
            return;
        };
        fill_circle(layer, point, f64::from(brush_size) / 2.0, color);
        self.render();
    }

    pub fn draw_line(
        &mut self,
        from: CanvasPoint,
        to: CanvasPoint,
        brush_size: u32,
        color: Color,
        target: BrushTarget,
    ) {
        let Some(layer) = self.brush_layer(target) else {
            return;
        };
        stamp_line(layer, from, to, f64::from(brush_size), color);
        self.render();
    }

    /// Clears base-layer alpha under a round brush, limited to the selection shrunk by
    /// `barrier` pixels on every edge that is not flush with the image.
    pub fn erase_point(&mut self, point: CanvasPoint, brush_size: u32, barrier: u32) -> RenderResult<()> {
        let selection = self.overlay.selection.ok_or(RenderError::NoSelection)?;
        let bounds = self.bounds();
        let (flush_left, flush_top, flush_right, flush_bottom) = selection.flush_edges(bounds);
        let barrier = f64::from(barrier);
        let inset = |flush: bool| if flush { 0.0 } else { barrier };
        let left = f64::from(selection.x) + inset(flush_left);
        let top = f64::from(selection.y) + inset(flush_top);
        let right = selection.right() as f64 - inset(flush_right);
        let bottom = selection.bottom() as f64 - inset(flush_bottom);

        let radius = f64::from(brush_size) / 2.0;
        let origin_x = (point.x - radius).floor() as i64;
        let origin_y = (point.y - radius).floor() as i64;
        let pixels = self.base.pixels_mut();
        for j in 0..i64::from(brush_size) {
            for i in 0..i64::from(brush_size) {
                let (x, y) = (origin_x + i, origin_y + j);
                if x < 0 || y < 0 || x >= i64::from(bounds.width) || y >= i64::from(bounds.height) {
                    continue;
                }
                let (abs_x, abs_y) = (x as f64, y as f64);
                if abs_x < left || abs_x >= right || abs_y < top || abs_y >= bottom {
                    continue;
                }
                if (i as f64 - radius).hypot(j as f64 - radius) < radius {
                    pixels.get_pixel_mut(x as u32, y as u32)[3] = 0;
                }
            }
        }
        self.render();
        Ok(())
    }

    pub fn smudge_line(&mut self, from: CanvasPoint, to: CanvasPoint, brush_size: u32, opacity: f32) {
        pixels::smudge_line(self.edit.pixels_mut(), from, to, brush_size, opacity);
        self.render();
    }

    /// Seeds the edit layer with a full working copy of base.
    pub fn copy_edit_image_from_base_image(&mut self) {
        self.edit.replace(self.base.pixels().clone());
        self.edit_visible = true;
        self.render();
        self.notify_snapshot();
    }

    pub fn selection(&self) -> Option<Rect> {
        self.overlay.selection
    }

    pub fn selection_preview(&self) -> Option<Rect> {
        self.overlay.preview
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.overlay.cursor
    }

    pub fn set_selection_overlay(&mut self, selection: Option<Rect>) {
        self.overlay.selection = selection;
        self.render();
    }

    pub fn set_selection_overlay_preview(&mut self, preview: Option<Rect>) {
        self.overlay.preview = preview;
        self.render();
    }

    pub fn set_cursor(&mut self, cursor: Option<Cursor>) {
        self.overlay.cursor = cursor;
        self.render();
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Mutates the view and repaints; pixel data is untouched.
    pub fn update_viewport(&mut self, update: impl FnOnce(&mut Viewport)) {
        update(&mut self.viewport);
        self.render();
    }

    pub fn update_zoom_and_offset(&mut self, zoom: f64, offset_x: f64, offset_y: f64) {
        self.update_viewport(|viewport| viewport.set_transform(zoom, offset_x, offset_y));
    }

    pub fn reset_view(&mut self) {
        let bounds = self.bounds();
        self.update_viewport(|viewport| viewport.fit_to(bounds));
    }

    pub fn set_canvas_geometry(&mut self, geometry: CanvasGeometry) {
        self.viewport.set_geometry(geometry);
        self.frame = RgbaImage::new(geometry.backing_width, geometry.backing_height);
        self.render();
    }

    /// Grows the canvas so it contains the selection, keeping existing pixels at their
    /// old position relative to the selection. Newly exposed pixels are transparent.
    pub fn expand_to_overlay(&mut self) -> RenderResult<()> {
        let selection = self.overlay.selection.ok_or(RenderError::NoSelection)?;
        let (width, height) = (i64::from(self.width()), i64::from(self.height()));
        let min_x = i64::from(selection.x).min(0);
        let min_y = i64::from(selection.y).min(0);
        let max_x = selection.right().max(width);
        let max_y = selection.bottom().max(height);
        let (new_width, new_height) = ((max_x - min_x) as u32, (max_y - min_y) as u32);
        if (i64::from(new_width), i64::from(new_height)) == (width, height) {
            return Ok(());
        }

        let mut expanded = RgbaImage::new(new_width, new_height);
        paste_region(&mut expanded, self.base.pixels(), -min_x, -min_y);
        tracing::info!(
            from_width = width,
            from_height = height,
            width = new_width,
            height = new_height,
            "expanded canvas for outpaint"
        );
        self.overlay.selection = Some(Rect::new(
            selection.x.max(0),
            selection.y.max(0),
            selection.width,
            selection.height,
        ));
        self.replace_base_image(expanded, true);
        Ok(())
    }

    /// Adds an opaque black mask layer, replacing any existing one.
    pub fn create_mask(&mut self) {
        let (width, height) = self.base.dimensions();
        self.mask = Some(RasterLayer::filled(width, height, MASK_FILL));
        self.render();
    }

    pub fn reset_mask(&mut self) {
        if let Some(mask) = self.mask.as_mut() {
            mask.pixels_mut().pixels_mut().for_each(|pixel| *pixel = MASK_FILL);
            self.render();
        }
    }

    pub fn invert_mask(&mut self) {
        if let Some(mask) = self.mask.as_mut() {
            invert_rgb(mask.pixels_mut());
            self.render();
        }
    }

    pub fn delete_mask(&mut self) {
        if self.mask.take().is_some() {
            self.render();
        }
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Last composited frame of the visible canvas.
    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    /// Repaints the visible canvas: background, then base, edit, mask and overlay through
    /// the view transform.
    pub fn render(&mut self) {
        overlay::draw_overlay(self.overlay_layer.pixels_mut(), &self.overlay, self.edit_visible);

        let transform = self.viewport.transform();
        let (image_width, image_height) = self.base.dimensions();
        let base = self.base.pixels();
        let edit = self.edit.pixels();
        let mask = self.mask.as_ref().map(RasterLayer::pixels);
        let chrome = self.overlay_layer.pixels();

        for (fx, fy, pixel) in self.frame.enumerate_pixels_mut() {
            *pixel = checker_color(fx, fy);
            let x = (f64::from(fx) + 0.5) / transform.zoom - transform.offset_x;
            let y = (f64::from(fy) + 0.5) / transform.zoom - transform.offset_y;
            if x < 0.0 || y < 0.0 {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            if x >= image_width || y >= image_height {
                continue;
            }
            *pixel = pixels::blend_pixel(*pixel, *base.get_pixel(x, y), 1.0);
            *pixel = pixels::blend_pixel(*pixel, *edit.get_pixel(x, y), 1.0);
            if let Some(mask) = mask {
                *pixel = pixels::blend_pixel(*pixel, *mask.get_pixel(x, y), MASK_LAYER_OPACITY);
            }
            *pixel = pixels::blend_pixel(*pixel, *chrome.get_pixel(x, y), 1.0);
        }
    }
}

fn checker_color(x: u32, y: u32) -> Rgba<u8> {
    if (x / CHECKER_SIZE + y / CHECKER_SIZE) % 2 == 0 {
        CHECKER_DARK
    } else {
        CHECKER_LIGHT
    }
}
