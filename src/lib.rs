pub mod config;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod input;
pub mod logging;
pub mod pixels;
pub mod remote;
pub mod render;
pub mod state;
pub mod storage;
pub mod viewport;
pub mod worker;
pub use error::{AppError, AppResult};

use std::fs;
use std::path::Path;
use std::sync::Arc;

use editor::{ImageContext, ToolController, ToolEnvironment};
use pixels::{encode_image, EncodeFormat};
use remote::{FilePixelSource, ImageId, PixelSource};
use render::{LayerKind, Renderer};
use storage::{JsonFileArgsStore, MemoryArgsStore, ToolArgsStore};
use viewport::CanvasGeometry;

/// Headless session: loads `input`, opens it in a fresh controller, renders one frame
/// and writes the base image to `output` as PNG.
pub fn run(input: &Path, output: &Path) -> AppResult<()> {
    logging::init();
    tracing::info!(input = %input.display(), "starting brushcanvas");

    let config = config::load_editor_config();
    let id = ImageId::new(input.to_string_lossy());
    let image = FilePixelSource::new().load_pixels(&id)?;
    let geometry = CanvasGeometry::new(image.width(), image.height());
    let renderer = Renderer::new(geometry, config.renderer_settings());
    let (xdg_config_home, home) = config::config_env_dirs();
    let args = open_args_store(xdg_config_home.as_deref(), home.as_deref());
    let env = ToolEnvironment::new(config).with_args_store(args);
    let mut controller = ToolController::new(renderer, env);
    controller.load_image(
        image,
        ImageContext {
            id: Some(id),
            ..ImageContext::default()
        },
    );

    let renderer = controller.renderer_mut();
    renderer.reset_view();
    renderer.render();
    let base = renderer.image_data(None, LayerKind::Base)?;
    fs::write(output, encode_image(&base, EncodeFormat::Png)?)?;

    tracing::info!(
        output = %output.display(),
        width = base.width(),
        height = base.height(),
        "session written"
    );
    Ok(())
}

/// Tool arguments persisted in the config directory, or kept in memory for this session
/// when no directory can be resolved.
fn open_args_store(xdg_config_home: Option<&Path>, home: Option<&Path>) -> Arc<dyn ToolArgsStore> {
    match JsonFileArgsStore::in_config_dir(xdg_config_home, home) {
        Ok(store) => {
            tracing::debug!(path = %store.path().display(), "persisting tool arguments");
            Arc::new(store)
        }
        Err(err) => {
            tracing::warn!(?err, "tool arguments will not persist");
            Arc::new(MemoryArgsStore::new())
        }
    }
}
