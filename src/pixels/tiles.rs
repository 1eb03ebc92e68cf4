use image::RgbaImage;

use super::blend::{composite_over, paste_region};
use super::feather::{feather_edges_with, FeatherEdges};
use super::{ensure_dimensions, PixelResult};
use crate::geometry::{ImageBounds, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub max_tile: u32,
    pub overlap: u32,
}

impl TileLayout {
    pub const fn new(max_tile: u32, overlap: u32) -> Self {
        Self { max_tile, overlap }
    }
}

impl Default for TileLayout {
    fn default() -> Self {
        Self::new(512, 32)
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub column: u32,
    pub row: u32,
    /// Where the tile was cut from, in source-image pixels.
    pub source: Rect,
    pub pixels: RgbaImage,
}

#[derive(Debug, Clone)]
pub struct TileGrid {
    pub columns: u32,
    pub rows: u32,
    pub tile_size: u32,
    pub overlap: u32,
    pub image: ImageBounds,
    /// Row-major.
    pub tiles: Vec<Tile>,
}

/// Offsets of square tiles along one axis; the last tile is pulled back so it stays full size.
fn tile_offsets(length: u32, tile_size: u32, stride: u32) -> Vec<u32> {
    if length <= tile_size {
        return vec![0];
    }
    let count = 1 + (length - tile_size).div_ceil(stride);
    (0..count)
        .map(|index| (index * stride).min(length - tile_size))
        .collect()
}

/// Cuts `image` into overlapping square tiles, or returns `None` when it already fits in
/// a single tile.
pub fn split_image(image: &RgbaImage, layout: TileLayout) -> Option<TileGrid> {
    let bounds = ImageBounds::new(image.width(), image.height());
    if bounds.area() <= u64::from(layout.max_tile) * u64::from(layout.max_tile) {
        return None;
    }
    let tile_size = image.width().min(image.height()).min(layout.max_tile);
    if tile_size <= layout.overlap {
        return None;
    }
    let stride = tile_size - layout.overlap;
    let column_offsets = tile_offsets(bounds.width, tile_size, stride);
    let row_offsets = tile_offsets(bounds.height, tile_size, stride);

    let mut tiles = Vec::with_capacity(column_offsets.len() * row_offsets.len());
    for (row, &y) in row_offsets.iter().enumerate() {
        for (column, &x) in column_offsets.iter().enumerate() {
            let source = Rect::new(x as i32, y as i32, tile_size, tile_size);
            let pixels = image::imageops::crop_imm(image, x, y, tile_size, tile_size).to_image();
            tiles.push(Tile {
                column: column as u32,
                row: row as u32,
                source,
                pixels,
            });
        }
    }

    tracing::debug!(
        columns = column_offsets.len(),
        rows = row_offsets.len(),
        tile_size,
        "split image into tiles"
    );
    Some(TileGrid {
        columns: column_offsets.len() as u32,
        rows: row_offsets.len() as u32,
        tile_size,
        overlap: layout.overlap,
        image: bounds,
        tiles,
    })
}

/// Reassembles a grid whose tiles were each scaled by `scale`.
///
/// Without `seam_feather` tiles are copied as-is, later tiles overwriting the overlap.
/// With `seam_feather`, every tile is faded in over its left/top neighbours across the
/// overlap so seams between independently processed tiles blend.
pub fn merge_tiles(grid: &TileGrid, scale: u32, seam_feather: Option<u32>) -> PixelResult<RgbaImage> {
    let scale = scale.max(1);
    let mut merged = RgbaImage::new(grid.image.width * scale, grid.image.height * scale);
    let feather_limit = grid.overlap * scale;

    for tile in &grid.tiles {
        ensure_dimensions(
            "merge_tiles",
            &tile.pixels,
            tile.source.width * scale,
            tile.source.height * scale,
        )?;
        let x = i64::from(tile.source.x) * i64::from(scale);
        let y = i64::from(tile.source.y) * i64::from(scale);

        match seam_feather {
            Some(width) if tile.column > 0 || tile.row > 0 => {
                let mut pixels = tile.pixels.clone();
                let edges = FeatherEdges::new(tile.column > 0, tile.row > 0, false, false);
                feather_edges_with(&mut pixels, edges, width.min(feather_limit));
                composite_over(&mut merged, &pixels, x, y, 1.0);
            }
            _ => paste_region(&mut merged, &tile.pixels, x, y),
        }
    }
    Ok(merged)
}
