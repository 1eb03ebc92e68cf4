use image::RgbaImage;

use crate::geometry::{CanvasPoint, Color, Rect};
use crate::pixels::fill_circle;

const SELECTION_REFERENCE_SIZE: f64 = 512.0;
const CURSOR_FILL_ALPHA: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorShape {
    Circle,
    CircleFill,
    Crosshairs,
    ColorPicker,
}

/// Brush cursor drawn on the overlay; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub shape: CursorShape,
    pub position: CanvasPoint,
    pub radius: f64,
    pub color: Color,
}

impl Cursor {
    pub const fn new(shape: CursorShape, position: CanvasPoint, radius: f64, color: Color) -> Self {
        Self {
            shape,
            position,
            radius,
            color,
        }
    }

    pub const fn crosshairs(position: CanvasPoint) -> Self {
        Self::new(CursorShape::Crosshairs, position, 10.0, Color::WHITE)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayState {
    pub selection: Option<Rect>,
    pub preview: Option<Rect>,
    pub cursor: Option<Cursor>,
}

/// Stroke width that stays visible on large images.
pub fn overlay_line_width(width: u32, height: u32) -> f64 {
    (f64::from(width) / SELECTION_REFERENCE_SIZE)
        .max(f64::from(height) / SELECTION_REFERENCE_SIZE)
        .max(1.0)
}

/// Redraws the overlay layer from scratch. Selection chrome is hidden while edit
/// content is showing.
pub fn draw_overlay(layer: &mut RgbaImage, state: &OverlayState, edit_visible: bool) {
    layer.pixels_mut().for_each(|pixel| pixel.0 = [0, 0, 0, 0]);
    let (width, height) = layer.dimensions();
    let line_width = overlay_line_width(width, height);

    stroke_rect(layer, Rect::new(0, 0, width, height), line_width, Color::WHITE);
    if !edit_visible {
        if let Some(selection) = state.selection {
            stroke_rect(layer, selection, line_width, Color::WHITE);
        }
        if let Some(preview) = state.preview {
            stroke_rect(layer, preview, line_width, Color::CYAN);
        }
    }
    if let Some(cursor) = state.cursor {
        draw_cursor(layer, &cursor, line_width);
    }
}

fn fill_rect(layer: &mut RgbaImage, left: i64, top: i64, right: i64, bottom: i64, color: Color) {
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(i64::from(layer.width()));
    let bottom = bottom.min(i64::from(layer.height()));
    for y in top..bottom {
        for x in left..right {
            layer.put_pixel(x as u32, y as u32, color.to_rgba());
        }
    }
}

fn stroke_rect(layer: &mut RgbaImage, rect: Rect, line_width: f64, color: Color) {
    let line = line_width.ceil() as i64;
    let (left, top) = (i64::from(rect.x), i64::from(rect.y));
    let (right, bottom) = (rect.right(), rect.bottom());
    fill_rect(layer, left, top, right, top + line, color);
    fill_rect(layer, left, bottom - line, right, bottom, color);
    fill_rect(layer, left, top, left + line, bottom, color);
    fill_rect(layer, right - line, top, right, bottom, color);
}

fn stroke_circle(layer: &mut RgbaImage, center: CanvasPoint, radius: f64, line_width: f64, color: Color) {
    let half = line_width / 2.0;
    let reach = radius + half;
    let min_x = (center.x - reach).floor().max(0.0) as i64;
    let min_y = (center.y - reach).floor().max(0.0) as i64;
    let max_x = ((center.x + reach).ceil() as i64).min(i64::from(layer.width()));
    let max_y = ((center.y + reach).ceil() as i64).min(i64::from(layer.height()));
    for y in min_y..max_y {
        for x in min_x..max_x {
            let distance = (x as f64 + 0.5 - center.x).hypot(y as f64 + 0.5 - center.y);
            if (distance - radius).abs() <= half {
                layer.put_pixel(x as u32, y as u32, color.to_rgba());
            }
        }
    }
}

fn draw_cursor(layer: &mut RgbaImage, cursor: &Cursor, line_width: f64) {
    let Cursor {
        shape,
        position,
        radius,
        color,
    } = *cursor;
    match shape {
        CursorShape::Circle => stroke_circle(layer, position, radius, line_width, color),
        CursorShape::CircleFill => {
            fill_circle(layer, position, radius, color.with_alpha(CURSOR_FILL_ALPHA));
            stroke_circle(layer, position, radius, line_width, color);
        }
        CursorShape::Crosshairs => {
            let half = (line_width / 2.0).max(0.5);
            let (x, y) = (position.x, position.y);
            fill_rect(
                layer,
                (x - radius) as i64,
                (y - half) as i64,
                (x + radius) as i64,
                (y + half).ceil() as i64,
                color,
            );
            fill_rect(
                layer,
                (x - half) as i64,
                (y - radius) as i64,
                (x + half).ceil() as i64,
                (y + radius) as i64,
                color,
            );
        }
        CursorShape::ColorPicker => {
            fill_circle(layer, position, radius, color);
            stroke_circle(layer, position, radius, line_width, Color::WHITE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_width_scales_with_large_images() {
        assert_eq!(overlay_line_width(512, 512), 1.0);
        assert_eq!(overlay_line_width(2048, 1024), 4.0);
        assert_eq!(overlay_line_width(100, 100), 1.0);
    }

    #[test]
    fn selection_is_hidden_while_edit_content_is_visible() {
        let mut layer = RgbaImage::new(64, 64);
        let state = OverlayState {
            selection: Some(Rect::new(16, 16, 32, 32)),
            preview: None,
            cursor: None,
        };

        draw_overlay(&mut layer, &state, false);
        assert_eq!(layer.get_pixel(16, 30)[3], 255);

        draw_overlay(&mut layer, &state, true);
        assert_eq!(layer.get_pixel(16, 30)[3], 0);
        assert_eq!(layer.get_pixel(0, 30)[3], 255);
    }

    #[test]
    fn preview_is_drawn_in_cyan() {
        let mut layer = RgbaImage::new(64, 64);
        let state = OverlayState {
            selection: None,
            preview: Some(Rect::new(8, 8, 16, 16)),
            cursor: None,
        };

        draw_overlay(&mut layer, &state, false);

        assert_eq!(*layer.get_pixel(8, 12), Color::CYAN.to_rgba());
    }

    #[test]
    fn circle_cursor_leaves_center_clear() {
        let mut layer = RgbaImage::new(64, 64);
        let state = OverlayState {
            cursor: Some(Cursor::new(
                CursorShape::Circle,
                CanvasPoint::new(32.0, 32.0),
                10.0,
                Color::WHITE,
            )),
            ..OverlayState::default()
        };

        draw_overlay(&mut layer, &state, false);

        assert_eq!(layer.get_pixel(32, 32)[3], 0);
        assert_eq!(layer.get_pixel(41, 31)[3], 255);
    }
}
