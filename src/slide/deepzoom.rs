//! Deep Zoom pyramid geometry and tile rendering
//!
//! Level 0 is a 1x1 image and the last level is the full-resolution slide;
//! each level halves the next one (rounding up). Tiles are `tile_size`
//! pixels square plus `overlap` pixels on every interior edge.

use image::{imageops, imageops::FilterType, Rgb, RgbImage, RgbaImage};

use super::{SlideError, SlideReader, SlideResult};
use crate::config::TileFormat;

/// XML namespace of DZI descriptors
pub const DZI_NAMESPACE: &str = "http://schemas.microsoft.com/deepzoom/2008";

/// Area covered by one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    /// Top-left corner in level 0 pixels
    pub l0_x: u32,
    pub l0_y: u32,
    /// Size of the level 0 area to read, clamped to the slide
    pub l0_width: u32,
    pub l0_height: u32,
    /// Output tile size, overlap included
    pub width: u32,
    pub height: u32,
}

/// Level layout for one slide, independent of pixel data
#[derive(Debug, Clone, PartialEq)]
pub struct DeepZoomGeometry {
    width: u32,
    height: u32,
    tile_size: u32,
    overlap: u32,
    level_dimensions: Vec<(u32, u32)>,
    level_tiles: Vec<(u32, u32)>,
}

impl DeepZoomGeometry {
    pub fn new(dimensions: (u32, u32), tile_size: u32, overlap: u32) -> Self {
        let (width, height) = (dimensions.0.max(1), dimensions.1.max(1));
        let tile_size = tile_size.max(1);

        let mut level_dimensions = vec![(width, height)];
        let (mut w, mut h) = (width, height);
        while w > 1 || h > 1 {
            w = w.div_ceil(2).max(1);
            h = h.div_ceil(2).max(1);
            level_dimensions.push((w, h));
        }
        level_dimensions.reverse();

        let level_tiles = level_dimensions
            .iter()
            .map(|&(w, h)| (w.div_ceil(tile_size), h.div_ceil(tile_size)))
            .collect();

        Self {
            width,
            height,
            tile_size,
            overlap,
            level_dimensions,
            level_tiles,
        }
    }

    pub fn level_count(&self) -> usize {
        self.level_dimensions.len()
    }

    pub fn level_dimensions(&self) -> &[(u32, u32)] {
        &self.level_dimensions
    }

    /// `(columns, rows)` per level
    pub fn level_tiles(&self) -> &[(u32, u32)] {
        &self.level_tiles
    }

    pub fn tile_count(&self) -> u64 {
        self.level_tiles
            .iter()
            .map(|&(c, r)| c as u64 * r as u64)
            .sum()
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    /// Factor between level 0 and `level`
    pub fn downsample(&self, level: usize) -> u64 {
        1u64 << (self.level_count() - 1 - level)
    }

    /// Region of the slide rendered into tile `(col, row)` of `level`
    pub fn tile_region(&self, level: usize, col: u32, row: u32) -> SlideResult<TileRegion> {
        let invalid = SlideError::InvalidTile { level, col, row };
        let &(cols, rows) = self.level_tiles.get(level).ok_or(invalid)?;
        if col >= cols || row >= rows {
            return Err(SlideError::InvalidTile { level, col, row });
        }
        let (level_w, level_h) = self.level_dimensions[level];

        let axis = |index: u32, count: u32, level_len: u32| {
            let before = if index > 0 { self.overlap } else { 0 };
            let after = if index + 1 < count { self.overlap } else { 0 };
            let start = self.tile_size * index;
            let size = self.tile_size.min(level_len - start) + before + after;
            (start - before, size)
        };
        let (x, width) = axis(col, cols, level_w);
        let (y, height) = axis(row, rows, level_h);

        let ds = self.downsample(level);
        let l0_x = (x as u64 * ds) as u32;
        let l0_y = (y as u64 * ds) as u32;
        let l0_width = ((width as u64 * ds).min((self.width - l0_x) as u64)) as u32;
        let l0_height = ((height as u64 * ds).min((self.height - l0_y) as u64)) as u32;

        Ok(TileRegion {
            l0_x,
            l0_y,
            l0_width,
            l0_height,
            width,
            height,
        })
    }

    /// DZI descriptor for the full-resolution size
    pub fn dzi(&self, format: TileFormat) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "\n",
                r#"<Image xmlns="{}" Format="{}" Overlap="{}" TileSize="{}">"#,
                r#"<Size Width="{}" Height="{}"/></Image>"#,
                "\n"
            ),
            DZI_NAMESPACE,
            format.extension(),
            self.overlap,
            self.tile_size,
            self.width,
            self.height
        )
    }
}

/// Renders Deep Zoom tiles from a slide
pub struct DeepZoomGenerator<'a> {
    slide: &'a dyn SlideReader,
    geometry: DeepZoomGeometry,
}

impl<'a> DeepZoomGenerator<'a> {
    pub fn new(slide: &'a dyn SlideReader, tile_size: u32, overlap: u32) -> Self {
        Self {
            geometry: DeepZoomGeometry::new(slide.dimensions(), tile_size, overlap),
            slide,
        }
    }

    pub fn geometry(&self) -> &DeepZoomGeometry {
        &self.geometry
    }

    pub fn level_count(&self) -> usize {
        self.geometry.level_count()
    }

    pub fn level_dimensions(&self) -> &[(u32, u32)] {
        self.geometry.level_dimensions()
    }

    pub fn level_tiles(&self) -> &[(u32, u32)] {
        self.geometry.level_tiles()
    }

    /// Render one tile, flattened onto white
    pub fn get_tile(&self, level: usize, col: u32, row: u32) -> SlideResult<RgbImage> {
        let region = self.geometry.tile_region(level, col, row)?;
        let pixels = self
            .slide
            .read_region(region.l0_x, region.l0_y, region.l0_width, region.l0_height);
        let tile = flatten_on_white(&pixels);

        if tile.dimensions() == (region.width, region.height) {
            Ok(tile)
        } else {
            Ok(imageops::resize(
                &tile,
                region.width,
                region.height,
                FilterType::Lanczos3,
            ))
        }
    }

    pub fn get_dzi(&self, format: TileFormat) -> String {
        self.geometry.dzi(format)
    }
}

/// Composite RGBA pixels over an opaque white background
pub fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
