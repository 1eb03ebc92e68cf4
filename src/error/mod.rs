use std::io;

use thiserror::Error;

use crate::editor::ToolError;
use crate::pixels::PixelError;
use crate::remote::RemoteError;
use crate::render::RenderError;
use crate::state::StateError;
use crate::storage::StorageError;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Pixel(#[from] PixelError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
