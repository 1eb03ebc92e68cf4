//! Interactive editing tools and the controller that routes input to them.

pub mod controller;
mod services;
pub mod tools;

use thiserror::Error;

use crate::geometry::CanvasPoint;
use crate::pixels::PixelError;
use crate::remote::RemoteError;
use crate::render::RenderError;
use crate::state::StateError;
use crate::storage::StorageError;

pub use controller::{ToolController, TOUCH_DEFER};
pub use services::{ImageContext, RemoteServices, ToolEnvironment};
pub use tools::{
    AugmentTool, EnhanceTool, InpaintTool, PencilTool, SavedImage, SelectionTool, SmudgeTool,
    Tool, ToolCommand, ToolKind, ToolListeners, VariantDirection,
};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} is busy with a generation")]
    Busy { tool: &'static str },
    #[error("{tool} has nothing to confirm")]
    NothingToConfirm { tool: &'static str },
    #[error("{tool} does not support {command:?}")]
    Unsupported {
        tool: &'static str,
        command: ToolCommand,
    },
    #[error("no remote generator is configured")]
    RemoteUnavailable,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Pixel(#[from] PixelError),
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

/// Pointer position in displayed canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: CanvasPoint,
    pub button: PointerButton,
}

impl PointerEvent {
    pub const fn primary(x: f64, y: f64) -> Self {
        Self {
            position: CanvasPoint::new(x, y),
            button: PointerButton::Primary,
        }
    }

    pub const fn middle(x: f64, y: f64) -> Self {
        Self {
            position: CanvasPoint::new(x, y),
            button: PointerButton::Middle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub position: CanvasPoint,
    pub delta_y: f64,
}

impl WheelEvent {
    pub const fn new(x: f64, y: f64, delta_y: f64) -> Self {
        Self {
            position: CanvasPoint::new(x, y),
            delta_y,
        }
    }
}
