//! Render targets. Depth and color live in horizontal row tiles so that the raster stage can hand
//! each tile to exactly one worker.

use std::mem;
use std::ops::Range;

use image::{Rgba, RgbaImage};

use crate::config::{DepthConvention, DisplayMode};
use crate::error::{RenderError, RenderResult};
use crate::scene::setup::pixel_index;
use crate::scene::util::{black, to_rgba8, Color};

/// Filled buffer of `len` elements, reporting allocation failure instead of aborting.
fn allocate<T: Clone>(len: usize, value: T, what: &'static str) -> RenderResult<Vec<T>> {
    let bytes = len.saturating_mul(mem::size_of::<T>());
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| RenderError::Allocation { what, bytes })?;
    buffer.resize(len, value);
    return Ok(buffer);
}

/// Black, transparent presentable image, allocated through `allocate`.
fn allocate_image(width: u32, height: u32, what: &'static str) -> RenderResult<RgbaImage> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or(RenderError::Allocation { what, bytes: usize::MAX })?;
    let buffer = allocate(len, 0u8, what)?;
    return RgbaImage::from_raw(width, height, buffer).ok_or(RenderError::Allocation { what, bytes: len });
}

/// A band of full-width rows: `rows` rows starting at `origin_y`. Color is empty for depth-only
/// targets.
#[derive(Debug, Clone)]
pub struct Tile {
    origin_y: usize,
    rows: usize,
    width: usize,
    depth: Vec<f32>,
    color: Vec<Color>,
}

impl Tile {
    /// Screen rows covered by the tile.
    pub fn row_range(&self) -> Range<usize> {
        return self.origin_y..self.origin_y + self.rows;
    }

    pub fn has_color(&self) -> bool {
        return !self.color.is_empty();
    }

    /// Index into the tile's buffers for a pixel given in screen coordinates.
    fn local_index(&self, x: usize, y: usize) -> usize {
        return pixel_index(x, y - self.origin_y, self.width);
    }

    pub fn depth_at(&self, x: usize, y: usize) -> f32 {
        return self.depth[self.local_index(x, y)];
    }

    pub fn set_depth(&mut self, x: usize, y: usize, depth: f32) {
        let index = self.local_index(x, y);
        self.depth[index] = depth;
    }

    pub fn color_at(&self, x: usize, y: usize) -> Color {
        if !self.has_color() {
            return black();
        }
        return self.color[self.local_index(x, y)];
    }

    /// Ignored for depth-only tiles.
    pub fn set_color(&mut self, x: usize, y: usize, color: Color) {
        if self.has_color() {
            let index = self.local_index(x, y);
            self.color[index] = color;
        }
    }

    fn clear(&mut self, depth: f32) {
        self.depth.fill(depth);
        self.color.fill(black());
    }
}

/// A width x height target split into row tiles. (0, 0) is the bottom left pixel.
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tile_rows: usize,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Allocates every tile up front, cleared to `clear_depth` and black.
    pub fn new(
        width: usize,
        height: usize,
        tile_rows: usize,
        with_color: bool,
        clear_depth: f32,
        what: &'static str,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 || tile_rows == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "{} of {}x{} with {} rows per tile",
                what, width, height, tile_rows
            )));
        }
        let mut tiles = Vec::with_capacity((height + tile_rows - 1) / tile_rows);
        let mut origin_y = 0;
        while origin_y < height {
            let rows = tile_rows.min(height - origin_y);
            let pixels = width * rows;
            let color = if with_color { allocate(pixels, black(), what)? } else { Vec::new() };
            tiles.push(Tile {
                origin_y,
                rows,
                width,
                depth: allocate(pixels, clear_depth, what)?,
                color,
            });
            origin_y += rows;
        }
        return Ok(Self { width, height, tile_rows, tiles });
    }

    pub fn width(&self) -> usize {
        return self.width;
    }

    pub fn height(&self) -> usize {
        return self.height;
    }

    pub fn tile_count(&self) -> usize {
        return (self.height + self.tile_rows - 1) / self.tile_rows;
    }

    /// Tiles touched by the rows in `rows`.
    pub fn tiles_for_rows(&self, rows: Range<usize>) -> Range<usize> {
        if rows.start >= rows.end {
            return 0..0;
        }
        return rows.start / self.tile_rows..(rows.end - 1) / self.tile_rows + 1;
    }

    pub fn clear(&mut self, depth: f32) {
        for tile in self.tiles.iter_mut() {
            tile.clear(depth);
        }
    }

    fn tile(&self, y: usize) -> &Tile {
        return &self.tiles[y / self.tile_rows];
    }

    pub fn depth_at(&self, x: usize, y: usize) -> f32 {
        return self.tile(y).depth_at(x, y);
    }

    pub fn color_at(&self, x: usize, y: usize) -> Color {
        return self.tile(y).color_at(x, y);
    }

    pub fn set_depth(&mut self, x: usize, y: usize, depth: f32) {
        let tile_rows = self.tile_rows;
        self.tiles[y / tile_rows].set_depth(x, y, depth);
    }

    /// Moves the tiles out for the raster stage. The grid has no tiles until `restore_tiles`.
    pub fn take_tiles(&mut self) -> Vec<Tile> {
        return mem::take(&mut self.tiles);
    }

    pub fn restore_tiles(&mut self, tiles: Vec<Tile>) {
        debug_assert_eq!(tiles.len(), self.tile_count());
        self.tiles = tiles;
    }

    /// Grayscale of the written depths into `image`, nearest brightest, unwritten pixels black.
    /// Rows are flipped so the image's first row is the top of the frame.
    fn depth_to_image(&self, convention: DepthConvention, image: &mut RgbaImage) {
        let clear_value = convention.clear_value();
        let mut z_min = f32::MAX;
        let mut z_max = f32::MIN;
        for tile in self.tiles.iter() {
            for &depth in tile.depth.iter().filter(|&&depth| depth != clear_value) {
                z_min = z_min.min(depth);
                z_max = z_max.max(depth);
            }
        }
        let scale = z_max - z_min;

        for y in 0..self.height {
            for x in 0..self.width {
                let depth = self.depth_at(x, y);
                let value = if depth == clear_value {
                    0.0
                } else {
                    let t = if scale > 0.0 { (depth - z_min) / scale } else { 1.0 };
                    match convention {
                        DepthConvention::GreaterWins => t,
                        DepthConvention::LessWins => 1.0 - t,
                    }
                };
                let channel = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
                image.put_pixel(x as u32, (self.height - 1 - y) as u32, Rgba([channel, channel, channel, 255]));
            }
        }
    }
}

/// Color and depth of the camera view, plus the image presented after a flush.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub grid: TileGrid,
    image: RgbaImage,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, tile_rows: usize, convention: DepthConvention) -> RenderResult<Self> {
        let grid = TileGrid::new(
            width as usize,
            height as usize,
            tile_rows,
            true,
            convention.clear_value(),
            "frame buffer",
        )?;
        return Ok(Self { grid, image: allocate_image(width, height, "frame image")? });
    }

    pub fn clear(&mut self, convention: DepthConvention) {
        self.grid.clear(convention.clear_value());
    }

    /// Updates the presentable image for `Color` or `Depth`. Other modes leave it alone.
    pub fn flush(&mut self, mode: DisplayMode, convention: DepthConvention) {
        match mode {
            DisplayMode::Color => {
                let height = self.grid.height();
                for y in 0..height {
                    for x in 0..self.grid.width() {
                        let pixel = to_rgba8(self.grid.color_at(x, y));
                        self.image.put_pixel(x as u32, (height - 1 - y) as u32, Rgba(pixel));
                    }
                }
            }
            DisplayMode::Depth => self.grid.depth_to_image(convention, &mut self.image),
            DisplayMode::ShadowMap => {}
        }
    }

    pub fn image(&self) -> &RgbaImage {
        return &self.image;
    }
}

/// Depth as seen from the light, resolution x resolution.
#[derive(Debug, Clone)]
pub struct ShadowBuffer {
    pub grid: TileGrid,
    image: RgbaImage,
}

impl ShadowBuffer {
    pub fn new(resolution: u32, tile_rows: usize, convention: DepthConvention) -> RenderResult<Self> {
        let grid = TileGrid::new(
            resolution as usize,
            resolution as usize,
            tile_rows,
            false,
            convention.clear_value(),
            "shadow buffer",
        )?;
        return Ok(Self { grid, image: allocate_image(resolution, resolution, "shadow map image")? });
    }

    pub fn clear(&mut self, convention: DepthConvention) {
        self.grid.clear(convention.clear_value());
    }

    /// Updates the shadow map visualization.
    pub fn flush(&mut self, convention: DepthConvention) {
        self.grid.depth_to_image(convention, &mut self.image);
    }

    pub fn image(&self) -> &RgbaImage {
        return &self.image;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::vector;

    #[test]
    fn test_allocation_failure_is_an_error() {
        let result = allocate(usize::MAX, 0u8, "huge buffer");
        assert!(matches!(result, Err(RenderError::Allocation { what: "huge buffer", .. })));
        let result = allocate(usize::MAX / 2, 0.0f32, "huge depth");
        assert!(matches!(result, Err(RenderError::Allocation { what: "huge depth", .. })));

        let image = allocate_image(3, 2, "image").unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert!(image.pixels().all(|pixel| pixel.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_tiles_cover_every_row_once() {
        let grid = TileGrid::new(7, 10, 4, true, 0.0, "test").unwrap();
        assert_eq!(grid.tile_count(), 3);
        let mut covered = vec![0; 10];
        for tile in grid.tiles.iter() {
            for y in tile.row_range() {
                covered[y] += 1;
            }
        }
        assert!(covered.iter().all(|&count| count == 1));
        assert_eq!(grid.tiles_for_rows(3..5), 0..2);
        assert_eq!(grid.tiles_for_rows(8..10), 2..3);
        assert_eq!(grid.tiles_for_rows(5..5), 0..0);
    }

    #[test]
    fn test_take_and_restore_keep_contents() {
        let mut grid = TileGrid::new(4, 4, 2, true, 0.0, "test").unwrap();
        let mut tiles = grid.take_tiles();
        tiles[1].set_depth(3, 2, 0.75);
        tiles[1].set_color(3, 2, vector![1.0, 0.0, 0.0, 1.0]);
        grid.restore_tiles(tiles);
        assert_eq!(grid.depth_at(3, 2), 0.75);
        assert_eq!(grid.color_at(3, 2), vector![1.0, 0.0, 0.0, 1.0]);

        grid.clear(0.25);
        assert_eq!(grid.depth_at(3, 2), 0.25);
        assert_eq!(grid.color_at(3, 2), black());
    }

    #[test]
    fn test_color_flush_flips_rows() {
        let mut frame = FrameBuffer::new(3, 2, 1, DepthConvention::GreaterWins).unwrap();
        let mut tiles = frame.grid.take_tiles();
        tiles[0].set_color(0, 0, vector![1.0, 1.0, 1.0, 1.0]);
        frame.grid.restore_tiles(tiles);
        frame.flush(DisplayMode::Color, DepthConvention::GreaterWins);
        assert_eq!(frame.image().get_pixel(0, 1).0, [255, 255, 255, 255]);
        assert_eq!(frame.image().get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_depth_flush_nearer_is_brighter() {
        for convention in [DepthConvention::GreaterWins, DepthConvention::LessWins] {
            let mut shadow = ShadowBuffer::new(2, 2, convention).unwrap();
            let near = convention.near_ndc() * 0.25 + 0.5;
            let far = 1.0 - near;
            shadow.grid.set_depth(0, 0, near);
            shadow.grid.set_depth(1, 0, far);
            shadow.flush(convention);
            let image = shadow.image();
            assert_eq!(image.get_pixel(0, 1).0, [255, 255, 255, 255]);
            assert_eq!(image.get_pixel(1, 1).0, [0, 0, 0, 255]);
            assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 255]);
        }
    }
}
