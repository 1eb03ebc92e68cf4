use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::geometry::Color;
use crate::pixels::TileLayout;
use crate::render::RendererSettings;
use crate::viewport::ZoomLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPathError {
    MissingHomeDirectory,
}

pub(crate) const APP_DIR: &str = "brushcanvas";
const APP_CONFIG_FILE: &str = "config.json";

/// Editor settings from `config.json`. Every tool keeps its own constants.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub view: ViewConfig,
    pub history: HistoryConfig,
    pub selection: SelectionConfig,
    pub inpaint: InpaintConfig,
    pub enhance: EnhanceConfig,
    pub smudge: SmudgeConfig,
    pub pencil: PencilConfig,
    pub upscale: UpscaleConfig,
    pub polling: PollingConfig,
}

impl EditorConfig {
    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            zoom: ZoomLimits::new(self.view.zoom_min, self.view.zoom_max, self.view.zoom_step),
            max_snapshots: self.history.max_snapshots,
            default_selection_size: self.selection.default_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub zoom_step: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        let limits = ZoomLimits::default();
        Self {
            zoom_min: limits.min,
            zoom_max: limits.max,
            zoom_step: limits.step,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_snapshots: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_snapshots: 10 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    pub default_size: u32,
    pub grid_step: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            default_size: 512,
            grid_step: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InpaintConfig {
    pub grid_step: u32,
    pub brush_size: u32,
    /// Pixels kept unerasable along selection edges that are not flush with the image.
    pub erase_barrier: u32,
    pub feather_width: u32,
    pub mask_spread: u32,
    pub count: u32,
    pub size_multiple: u32,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            grid_step: 16,
            brush_size: 10,
            erase_barrier: 10,
            feather_width: 10,
            mask_spread: 10,
            count: 4,
            size_multiple: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnhanceConfig {
    pub grid_step: u32,
    pub variation_strength: f32,
    pub count: u32,
    pub size_multiple: u32,
    /// `None` feathers by an eighth of the selection's short side.
    pub feather_width: Option<u32>,
    pub mask_spread: u32,
    pub eraser_width_modifier: f64,
    /// Scale variant channels toward the original region's mean color.
    pub color_balance: bool,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            grid_step: 64,
            variation_strength: 0.35,
            count: 4,
            size_multiple: 64,
            feather_width: None,
            mask_spread: 10,
            eraser_width_modifier: 1.3,
            color_balance: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmudgeConfig {
    pub brush_size: u32,
    pub opacity: f32,
}

impl Default for SmudgeConfig {
    fn default() -> Self {
        Self {
            brush_size: 10,
            opacity: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PencilConfig {
    pub brush_size: u32,
    pub palette: Vec<Color>,
}

pub const DEFAULT_PALETTE: [Color; 10] = [
    Color::new(0xFF, 0xFF, 0xFF),
    Color::new(0x5A, 0x2C, 0x02),
    Color::new(0x38, 0x6E, 0xB6),
    Color::new(0x6B, 0x31, 0xA1),
    Color::new(0xCB, 0x2C, 0x26),
    Color::new(0x00, 0x00, 0x00),
    Color::new(0x88, 0x88, 0x88),
    Color::new(0x50, 0xB0, 0x50),
    Color::new(0xFB, 0xDB, 0x37),
    Color::new(0xE8, 0x8D, 0x2D),
];

impl Default for PencilConfig {
    fn default() -> Self {
        Self {
            brush_size: 10,
            palette: DEFAULT_PALETTE.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpscaleConfig {
    pub tile_size: u32,
    pub tile_overlap: u32,
    pub seam_feather: u32,
    pub scale: u32,
    pub size_multiple: u32,
}

impl UpscaleConfig {
    pub const fn tile_layout(&self) -> TileLayout {
        TileLayout::new(self.tile_size, self.tile_overlap)
    }
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            tile_overlap: 32,
            seam_feather: 64,
            scale: 2,
            size_multiple: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub tick_ms: u64,
    pub fallback_poll_secs: u64,
    pub idle_timeout_secs: u64,
    pub absolute_timeout_secs: u64,
    pub augment_poll_ms: u64,
}

impl PollingConfig {
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub const fn fallback_poll(&self) -> Duration {
        Duration::from_secs(self.fallback_poll_secs)
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub const fn absolute_timeout(&self) -> Duration {
        Duration::from_secs(self.absolute_timeout_secs)
    }

    pub const fn augment_poll(&self) -> Duration {
        Duration::from_millis(self.augment_poll_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            fallback_poll_secs: 10,
            idle_timeout_secs: 30,
            absolute_timeout_secs: 120,
            augment_poll_ms: 2000,
        }
    }
}

pub fn load_editor_config() -> EditorConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_editor_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_editor_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> EditorConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return EditorConfig::default(),
    };
    if !path.exists() {
        return EditorConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            EditorConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            EditorConfig::default()
        }
    }
}

pub(crate) fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub(crate) fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}
