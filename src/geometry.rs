/// Shared geometric and color primitives used across the renderer, tools and pixel passes.
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl CanvasPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Axis-aligned region in base-layer pixels. The origin may be negative while an
/// outpaint selection hangs past the image edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_bounds(bounds: ImageBounds) -> Self {
        Self::new(0, 0, bounds.width, bounds.height)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= f64::from(self.x)
            && y >= f64::from(self.y)
            && x < self.right() as f64
            && y < self.bottom() as f64
    }

    /// True when the rectangle lies entirely inside `bounds`.
    pub fn is_within(&self, bounds: ImageBounds) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.right() <= i64::from(bounds.width)
            && self.bottom() <= i64::from(bounds.height)
    }

    pub fn intersect(&self, bounds: ImageBounds) -> Option<Rect> {
        let left = i64::from(self.x).max(0);
        let top = i64::from(self.y).max(0);
        let right = self.right().min(i64::from(bounds.width));
        let bottom = self.bottom().min(i64::from(bounds.height));
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Shrinks to fit and slides the origin so the rectangle stays inside `bounds`.
    pub fn clamped_into(&self, bounds: ImageBounds) -> Rect {
        let width = self.width.min(bounds.width);
        let height = self.height.min(bounds.height);
        let max_x = i64::from(bounds.width - width);
        let max_y = i64::from(bounds.height - height);
        Rect::new(
            i64::from(self.x).clamp(0, max_x) as i32,
            i64::from(self.y).clamp(0, max_y) as i32,
            width,
            height,
        )
    }

    /// Square-ish default selection centered in the image.
    pub fn centered(bounds: ImageBounds, size: u32) -> Rect {
        let width = size.min(bounds.width);
        let height = size.min(bounds.height);
        Rect::new(
            ((bounds.width - width) / 2) as i32,
            ((bounds.height - height) / 2) as i32,
            width,
            height,
        )
    }

    /// Whether each edge lies on the matching image boundary: (left, top, right, bottom).
    pub fn flush_edges(&self, bounds: ImageBounds) -> (bool, bool, bool, bool) {
        (
            self.x <= 0,
            self.y <= 0,
            self.right() >= i64::from(bounds.width),
            self.bottom() >= i64::from(bounds.height),
        )
    }
}

/// Rounds `value` to the nearest multiple of `step`.
pub fn snap_to_grid(value: f64, step: u32) -> i32 {
    if step <= 1 {
        return value.round() as i32;
    }
    let step = f64::from(step);
    ((value / step).round() * step) as i32
}

/// Rounds `value` up to the next multiple of `multiple`.
pub const fn round_up_to_multiple(value: u32, multiple: u32) -> u32 {
    if multiple <= 1 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBounds {
    pub width: u32,
    pub height: u32,
}

impl ImageBounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const CYAN: Color = Color::new(0, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    pub const fn rgb(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }

    pub const fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    pub const fn from_rgba(pixel: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        Self { r, g, b, a }
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        if !digits.is_ascii() {
            return None;
        }
        let channel = |index: usize| u8::from_str_radix(digits.get(index..index + 2)?, 16).ok();
        match digits.len() {
            6 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::new(channel(0)?, channel(2)?, channel(4)?).with_alpha(channel(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!(
                "#{:02X}{:02X}{:02X}{:02X}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color `{value}`"))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}
