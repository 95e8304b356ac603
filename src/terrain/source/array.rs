use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;

use super::{
    TerrainConfiguration, TerrainDataProvider, TerrainSource, TextureConfiguration,
    TextureSource,
};
use crate::terrain::error::{Error, Result};
use crate::terrain::heightmap::{
    is_valid_height, BasicHeightmap, BasicHeightmapPyramid, HeightmapPyramid, MipFilter,
};
use crate::terrain::texel::TextureFormat;
use crate::terrain::tile::Tile;

const TILE_SIZE: u32 = 128;

/// Clip levels needed until a level no longer fills a single tile.
pub(super) fn clip_level_count(size: usize, tile_size: u32) -> u32 {
    let mut levels = 1;
    while (size >> levels) >= tile_size as usize {
        levels += 1;
    }
    levels
}

/// Copy one tile out of a pyramid level. Samples past the edge are invalid.
fn slice_tile(pyramid: &BasicHeightmapPyramid, level: u32, tile: Tile, tile_size: u32) -> Result<Vec<f32>> {
    if level >= pyramid.heightmap_count() {
        return Err(Error::out_of_bounds(level, tile));
    }
    let size = pyramid.size(level).unwrap_or(0) as i32;
    let (ox, oz) = tile.origin(tile_size);
    let edge = tile_size as i32;
    if ox + edge <= 0 || oz + edge <= 0 || ox >= size || oz >= size {
        return Err(Error::out_of_bounds(level, tile));
    }

    let mut heights = Vec::with_capacity(tile_size as usize * tile_size as usize);
    for z in oz..oz + edge {
        for x in ox..ox + edge {
            heights.push(pyramid.height(level, x, z));
        }
    }
    Ok(heights)
}

pub struct ArrayTerrainSource {
    pyramid: Arc<BasicHeightmapPyramid>,
    configuration: TerrainConfiguration,
}

impl ArrayTerrainSource {
    pub fn new(pyramid: Arc<BasicHeightmapPyramid>, configuration: TerrainConfiguration) -> Self {
        Self {
            pyramid,
            configuration,
        }
    }
}

impl TerrainSource for ArrayTerrainSource {
    fn configuration(&self) -> Result<TerrainConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<f32>> {
        slice_tile(&self.pyramid, level, tile, self.configuration.cache_grid_size)
    }
}

/// Greyscale texture derived from the heights.
pub struct ArrayTextureSource {
    pyramid: Arc<BasicHeightmapPyramid>,
    configuration: TextureConfiguration,
    height_range: (f32, f32),
}

impl ArrayTextureSource {
    pub fn new(
        pyramid: Arc<BasicHeightmapPyramid>,
        configuration: TextureConfiguration,
        height_range: (f32, f32),
    ) -> Self {
        Self {
            pyramid,
            configuration,
            height_range,
        }
    }
}

impl TextureSource for ArrayTextureSource {
    fn configuration(&self) -> Result<TextureConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<u8>> {
        let heights = slice_tile(&self.pyramid, level, tile, self.configuration.cache_grid_size)?;
        let (min, max) = self.height_range;
        let span = (max - min).max(f32::EPSILON);
        Ok(heights
            .into_iter()
            .map(|height| {
                if is_valid_height(height) {
                    (((height - min) / span).clamp(0.0, 1.0) * 255.0).round() as u8
                } else {
                    0
                }
            })
            .collect())
    }
}

/// Provider over a square `size x size` array of heights.
pub struct ArrayTerrainDataProvider {
    pyramid: Arc<BasicHeightmapPyramid>,
    tile_size: u32,
    scale: Vec3,
    height_range: (f32, f32),
}

impl ArrayTerrainDataProvider {
    pub fn new(data: Vec<f32>, size: usize, scale: Vec3) -> Result<Self> {
        Self::with_tile_size(data, size, scale, TILE_SIZE)
    }

    pub fn with_tile_size(data: Vec<f32>, size: usize, scale: Vec3, tile_size: u32) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::configuration("tile_size", "must be positive"));
        }
        let height_range = data
            .iter()
            .copied()
            .filter(|height| is_valid_height(*height))
            .fold((f32::MAX, f32::MIN), |(min, max), h| (min.min(h), max.max(h)));
        let height_range = if height_range.0 > height_range.1 {
            (0.0, 0.0)
        } else {
            height_range
        };

        let base = BasicHeightmap::from_data(data, size)?.with_wrap(false);
        let levels = clip_level_count(size, tile_size);
        let pyramid = BasicHeightmapPyramid::from_base(base, levels, MipFilter::PointSample)?;
        Ok(Self {
            pyramid: Arc::new(pyramid),
            tile_size,
            scale,
            height_range,
        })
    }

    pub fn pyramid(&self) -> &BasicHeightmapPyramid {
        &self.pyramid
    }

    pub fn height_range(&self) -> (f32, f32) {
        self.height_range
    }

    fn levels(&self) -> u32 {
        self.pyramid.heightmap_count()
    }
}

impl TerrainDataProvider for ArrayTerrainDataProvider {
    fn available_maps(&self) -> Result<BTreeMap<u32, String>> {
        Ok(BTreeMap::from([(0, "ArrayBasedMap".to_string())]))
    }

    fn terrain_source(&self, _map_id: u32) -> Result<Arc<dyn TerrainSource>> {
        let configuration = TerrainConfiguration::new(self.levels(), self.tile_size, self.scale)
            .with_height_range(self.height_range.0, self.height_range.1);
        Ok(Arc::new(ArrayTerrainSource::new(
            Arc::clone(&self.pyramid),
            configuration,
        )))
    }

    fn texture_source(&self, _map_id: u32) -> Result<Option<Arc<dyn TextureSource>>> {
        let configuration =
            TextureConfiguration::new(self.levels(), self.tile_size, TextureFormat::Luminance8)
                .with_texture_density(1.0 / self.scale.x);
        Ok(Some(Arc::new(ArrayTextureSource::new(
            Arc::clone(&self.pyramid),
            configuration,
            self.height_range,
        ))))
    }
}
