//! Screen/canvas coordinate mapping under zoom and pan.
//!
//! Forward mapping used by the render pass: `screen = (canvas + offset) * zoom`, in
//! backing-buffer pixels. Pointer events arrive in displayed (CSS-like) pixels, so both
//! directions also scale by the ratio between the backing buffer and its display size.

use crate::geometry::{CanvasPoint, ImageBounds};

pub const DEFAULT_ZOOM_MIN: f64 = 0.1;
pub const DEFAULT_ZOOM_MAX: f64 = 8.0;
pub const DEFAULT_ZOOM_STEP: f64 = 0.1;

const MIN_PINCH_DISTANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    /// Multiplicative step applied per wheel notch.
    pub step: f64,
}

impl ZoomLimits {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    pub fn clamp(&self, zoom: f64) -> f64 {
        if !zoom.is_finite() {
            return self.min;
        }
        zoom.clamp(self.min, self.max)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self::new(DEFAULT_ZOOM_MIN, DEFAULT_ZOOM_MAX, DEFAULT_ZOOM_STEP)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Wheel convention: scrolling up (negative delta) zooms in.
    pub fn from_wheel_delta(delta_y: f64) -> Self {
        if delta_y < 0.0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ViewTransform {
    pub const fn new(zoom: f64, offset_x: f64, offset_y: f64) -> Self {
        Self {
            zoom,
            offset_x,
            offset_y,
        }
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }
}

/// Size of the visible canvas: its pixel buffer and how large it is displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    pub backing_width: u32,
    pub backing_height: u32,
    pub display_width: f64,
    pub display_height: f64,
}

impl CanvasGeometry {
    pub fn new(backing_width: u32, backing_height: u32) -> Self {
        Self {
            backing_width,
            backing_height,
            display_width: f64::from(backing_width),
            display_height: f64::from(backing_height),
        }
    }

    pub fn with_display_size(mut self, display_width: f64, display_height: f64) -> Self {
        self.display_width = display_width;
        self.display_height = display_height;
        self
    }

    fn ratio_x(&self) -> f64 {
        if self.display_width <= 0.0 {
            return 1.0;
        }
        f64::from(self.backing_width) / self.display_width
    }

    fn ratio_y(&self) -> f64 {
        if self.display_height <= 0.0 {
            return 1.0;
        }
        f64::from(self.backing_height) / self.display_height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    transform: ViewTransform,
    geometry: CanvasGeometry,
    limits: ZoomLimits,
}

impl Viewport {
    pub fn new(geometry: CanvasGeometry, limits: ZoomLimits) -> Self {
        Self {
            transform: ViewTransform::default(),
            geometry,
            limits,
        }
    }

    pub const fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub const fn zoom(&self) -> f64 {
        self.transform.zoom
    }

    pub const fn geometry(&self) -> CanvasGeometry {
        self.geometry
    }

    pub const fn limits(&self) -> ZoomLimits {
        self.limits
    }

    pub fn set_geometry(&mut self, geometry: CanvasGeometry) {
        self.geometry = geometry;
    }

    pub fn set_transform(&mut self, zoom: f64, offset_x: f64, offset_y: f64) {
        self.transform = ViewTransform::new(self.limits.clamp(zoom), offset_x, offset_y);
    }

    /// Pointer position (display pixels) to base-layer pixels.
    pub fn to_canvas(&self, screen: CanvasPoint) -> CanvasPoint {
        to_canvas_with(self.transform, self.geometry, screen)
    }

    /// Base-layer pixels to pointer position (display pixels).
    pub fn to_screen(&self, canvas: CanvasPoint) -> CanvasPoint {
        let ViewTransform {
            zoom,
            offset_x,
            offset_y,
        } = self.transform;
        CanvasPoint::new(
            (canvas.x + offset_x) * zoom / self.geometry.ratio_x(),
            (canvas.y + offset_y) * zoom / self.geometry.ratio_y(),
        )
    }

    /// Accumulates a display-space pointer delta into the pan offset.
    pub fn pan(&mut self, delta_x: f64, delta_y: f64) {
        if delta_x == 0.0 && delta_y == 0.0 {
            return;
        }
        let zoom = self.transform.zoom;
        self.transform.offset_x += delta_x * self.geometry.ratio_x() / zoom;
        self.transform.offset_y += delta_y * self.geometry.ratio_y() / zoom;
    }

    /// Steps the zoom while keeping the base-layer point under `screen` fixed on screen.
    pub fn zoom_at_point(&mut self, screen: CanvasPoint, direction: ZoomDirection) {
        let old_zoom = self.transform.zoom;
        let factor = match direction {
            ZoomDirection::In => 1.0 + self.limits.step,
            ZoomDirection::Out => 1.0 - self.limits.step,
        };
        let new_zoom = self.limits.clamp(old_zoom * factor);
        if new_zoom == old_zoom {
            return;
        }
        let anchor = self.to_canvas(screen);
        // anchor + offset is the anchor's screen position divided by zoom.
        let diff_x = anchor.x + self.transform.offset_x;
        let diff_y = anchor.y + self.transform.offset_y;
        let keep = old_zoom / new_zoom;
        self.transform = ViewTransform::new(
            new_zoom,
            self.transform.offset_x - diff_x * (1.0 - keep),
            self.transform.offset_y - diff_y * (1.0 - keep),
        );
    }

    /// Fits the whole image in the visible canvas and centers it.
    pub fn fit_to(&mut self, image: ImageBounds) {
        if image.width == 0 || image.height == 0 {
            return;
        }
        let canvas_width = f64::from(self.geometry.backing_width.max(1));
        let canvas_height = f64::from(self.geometry.backing_height.max(1));
        let (image_width, image_height) = (f64::from(image.width), f64::from(image.height));

        if image_width / image_height > canvas_width / canvas_height {
            let zoom = self.limits.clamp(canvas_width / image_width);
            self.transform = ViewTransform::new(zoom, 0.0, (image_height - canvas_height / zoom) / -2.0);
        } else {
            let zoom = self.limits.clamp(canvas_height / image_height);
            self.transform = ViewTransform::new(zoom, (image_width - canvas_width / zoom) / -2.0, 0.0);
        }
    }

    /// Captures the state a two-finger gesture is measured against.
    pub fn begin_pinch(&self, first: CanvasPoint, second: CanvasPoint) -> PinchGesture {
        PinchGesture {
            start_transform: self.transform,
            start_distance: first.distance_to(second),
            start_midpoint: first.midpoint(second),
        }
    }

    /// Applies a pinch relative to its start state so repeated moves do not drift.
    pub fn apply_pinch(&mut self, gesture: &PinchGesture, first: CanvasPoint, second: CanvasPoint) {
        let distance = first.distance_to(second);
        let factor = if gesture.start_distance < MIN_PINCH_DISTANCE || distance < MIN_PINCH_DISTANCE {
            1.0
        } else {
            distance / gesture.start_distance
        };
        let zoom = self.limits.clamp(gesture.start_transform.zoom * factor);
        let anchor = to_canvas_with(gesture.start_transform, self.geometry, gesture.start_midpoint);
        let midpoint = first.midpoint(second);

        // Put the base-layer point that sat under the starting midpoint under the current one.
        self.transform = ViewTransform::new(
            zoom,
            midpoint.x * self.geometry.ratio_x() / zoom - anchor.x,
            midpoint.y * self.geometry.ratio_y() / zoom - anchor.y,
        );
    }
}

fn to_canvas_with(transform: ViewTransform, geometry: CanvasGeometry, screen: CanvasPoint) -> CanvasPoint {
    CanvasPoint::new(
        screen.x / transform.zoom * geometry.ratio_x() - transform.offset_x,
        screen.y / transform.zoom * geometry.ratio_y() - transform.offset_y,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchGesture {
    start_transform: ViewTransform,
    start_distance: f64,
    start_midpoint: CanvasPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(
            CanvasGeometry::new(1024, 768).with_display_size(512.0, 384.0),
            ZoomLimits::default(),
        )
    }

    fn assert_close(actual: CanvasPoint, expected: CanvasPoint) {
        assert!(
            (actual.x - expected.x).abs() < 1e-6 && (actual.y - expected.y).abs() < 1e-6,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn coordinate_round_trip_holds_across_zoom_range() {
        let mut viewport = viewport();
        for zoom in [0.1, 0.37, 1.0, 2.5, 8.0] {
            for (offset_x, offset_y) in [(0.0, 0.0), (-130.5, 42.0), (300.0, -77.25)] {
                viewport.set_transform(zoom, offset_x, offset_y);
                let point = CanvasPoint::new(123.4, 56.7);
                assert_close(viewport.to_canvas(viewport.to_screen(point)), point);
            }
        }
    }

    #[test]
    fn to_canvas_scales_by_display_ratio_then_removes_offset() {
        let mut viewport = viewport();
        viewport.set_transform(2.0, 10.0, 20.0);

        let point = viewport.to_canvas(CanvasPoint::new(100.0, 50.0));

        assert_close(point, CanvasPoint::new(90.0, 30.0));
    }

    #[test]
    fn zoom_at_point_keeps_point_under_cursor_fixed() {
        let mut viewport = viewport();
        viewport.set_transform(1.3, -40.0, 25.0);
        let screen = CanvasPoint::new(311.0, 97.0);

        for direction in [ZoomDirection::In, ZoomDirection::In, ZoomDirection::Out] {
            let before = viewport.to_canvas(screen);
            viewport.zoom_at_point(screen, direction);
            assert_close(viewport.to_screen(before), screen);
        }
        assert!((viewport.zoom() - 1.3 * 1.1 * 1.1 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn zoom_is_clamped_to_limits() {
        let mut viewport = viewport();
        for _ in 0..200 {
            viewport.zoom_at_point(CanvasPoint::new(0.0, 0.0), ZoomDirection::In);
        }
        assert_eq!(viewport.zoom(), DEFAULT_ZOOM_MAX);

        for _ in 0..400 {
            viewport.zoom_at_point(CanvasPoint::new(0.0, 0.0), ZoomDirection::Out);
        }
        assert_eq!(viewport.zoom(), DEFAULT_ZOOM_MIN);
    }

    #[test]
    fn pan_converts_display_delta_to_canvas_units() {
        let mut viewport = viewport();
        viewport.set_transform(4.0, 0.0, 0.0);

        viewport.pan(20.0, -8.0);

        let transform = viewport.transform();
        assert_eq!(transform.offset_x, 10.0);
        assert_eq!(transform.offset_y, -4.0);
    }

    #[test]
    fn fit_to_centers_wide_image() {
        let mut viewport = Viewport::new(CanvasGeometry::new(800, 600), ZoomLimits::default());

        viewport.fit_to(ImageBounds::new(1600, 600));

        let transform = viewport.transform();
        assert_eq!(transform.zoom, 0.5);
        assert_eq!(transform.offset_x, 0.0);
        assert_eq!(transform.offset_y, 300.0);
    }

    #[test]
    fn pinch_zooms_relative_to_start_state() {
        let mut viewport = viewport();
        let gesture = viewport.begin_pinch(CanvasPoint::new(100.0, 100.0), CanvasPoint::new(200.0, 100.0));
        let anchor = viewport.to_canvas(CanvasPoint::new(150.0, 100.0));

        viewport.apply_pinch(&gesture, CanvasPoint::new(80.0, 100.0), CanvasPoint::new(280.0, 100.0));
        viewport.apply_pinch(&gesture, CanvasPoint::new(50.0, 100.0), CanvasPoint::new(250.0, 100.0));

        assert!((viewport.zoom() - 2.0).abs() < 1e-9);
        assert_close(viewport.to_screen(anchor), CanvasPoint::new(150.0, 100.0));
    }

    #[test]
    fn degenerate_pinch_does_not_divide_by_zero() {
        let mut viewport = viewport();
        let point = CanvasPoint::new(40.0, 40.0);
        let gesture = viewport.begin_pinch(point, point);

        viewport.apply_pinch(&gesture, CanvasPoint::new(10.0, 10.0), CanvasPoint::new(90.0, 90.0));

        assert_eq!(viewport.zoom(), 1.0);
        assert!(viewport.transform().offset_x.is_finite());
    }
}
