use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;

use super::array::clip_level_count;
use super::{
    TerrainConfiguration, TerrainDataProvider, TerrainSource, TextureConfiguration,
    TextureSource,
};
use crate::terrain::double_buffer::DoubleBufferedList;
use crate::terrain::error::{Error, Result};
use crate::terrain::heightmap::INVALID_HEIGHT;
use crate::terrain::texel::{Rgba8, TextureFormat};
use crate::terrain::tile::Tile;

struct Layers {
    heights: Vec<f32>,
    colors: Vec<Rgba8>,
}

/// Editable terrain held in memory.
///
/// Writes go to level 0; coarser levels point-sample it. Every write marks
/// the tiles it touched on each level so the caches streaming this data
/// reload them on their next update.
pub struct InMemoryTerrainData {
    size: usize,
    tile_size: u32,
    levels: u32,
    layers: RwLock<Layers>,
    dirty_heights: Vec<DoubleBufferedList<Tile>>,
    dirty_colors: Vec<DoubleBufferedList<Tile>>,
}

impl InMemoryTerrainData {
    /// Flat terrain of `size x size` samples.
    pub fn new(size: usize, tile_size: u32) -> Result<Self> {
        Self::from_heights(vec![0.0; size * size], size, tile_size)
    }

    pub fn from_heights(heights: Vec<f32>, size: usize, tile_size: u32) -> Result<Self> {
        if size == 0 || heights.len() != size * size {
            return Err(Error::configuration(
                "in_memory.size",
                format!("{} samples cannot form a {size}x{size} map", heights.len()),
            ));
        }
        if tile_size == 0 {
            return Err(Error::configuration("tile_size", "must be positive"));
        }
        let levels = clip_level_count(size, tile_size);
        Ok(Self {
            size,
            tile_size,
            levels,
            layers: RwLock::new(Layers {
                heights,
                colors: vec![Rgba8::BLACK; size * size],
            }),
            dirty_heights: (0..levels).map(|_| DoubleBufferedList::new()).collect(),
            dirty_colors: (0..levels).map(|_| DoubleBufferedList::new()).collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn height(&self, x: i32, z: i32) -> f32 {
        match self.index(x, z) {
            Some(index) => self.read().heights[index],
            None => INVALID_HEIGHT,
        }
    }

    /// Returns `false` when `(x, z)` lies outside the map.
    pub fn set_height(&self, x: i32, z: i32, height: f32) -> bool {
        let Some(index) = self.index(x, z) else {
            return false;
        };
        self.write().heights[index] = height;
        self.mark_dirty(&self.dirty_heights, x, z);
        true
    }

    pub fn color(&self, x: i32, z: i32) -> Option<Rgba8> {
        self.index(x, z).map(|index| self.read().colors[index])
    }

    pub fn set_color(&self, x: i32, z: i32, color: Rgba8) -> bool {
        let Some(index) = self.index(x, z) else {
            return false;
        };
        self.write().colors[index] = color;
        self.mark_dirty(&self.dirty_colors, x, z);
        true
    }

    fn index(&self, x: i32, z: i32) -> Option<usize> {
        let size = self.size as i32;
        if x < 0 || z < 0 || x >= size || z >= size {
            return None;
        }
        Some(z as usize * self.size + x as usize)
    }

    // Level n only sees level 0 samples on multiples of 2^n.
    fn mark_dirty(&self, lists: &[DoubleBufferedList<Tile>], x: i32, z: i32) {
        for (level, list) in lists.iter().enumerate() {
            let step = 1 << level;
            if x % step != 0 || z % step != 0 {
                break;
            }
            list.add(Tile::containing(x / step, z / step, self.tile_size));
        }
    }

    fn take_dirty(lists: &[DoubleBufferedList<Tile>], level: u32) -> Vec<Tile> {
        lists
            .get(level as usize)
            .map(DoubleBufferedList::switch_and_get)
            .unwrap_or_default()
    }

    /// Visit the level 0 index of every sample in `tile`, `None` where the
    /// sample lies outside the map.
    fn sample_tile<T>(
        &self,
        level: u32,
        tile: Tile,
        mut visit: impl FnMut(Option<usize>) -> T,
    ) -> Result<Vec<T>> {
        if level >= self.levels {
            return Err(Error::out_of_bounds(level, tile));
        }
        let level_size = (self.size >> level) as i32;
        let (ox, oz) = tile.origin(self.tile_size);
        let edge = self.tile_size as i32;
        if ox + edge <= 0 || oz + edge <= 0 || ox >= level_size || oz >= level_size {
            return Err(Error::out_of_bounds(level, tile));
        }

        let mut out = Vec::with_capacity(edge as usize * edge as usize);
        for z in oz..oz + edge {
            for x in ox..ox + edge {
                out.push(visit(self.index(x << level, z << level)));
            }
        }
        Ok(out)
    }

    fn read(&self) -> RwLockReadGuard<'_, Layers> {
        self.layers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Layers> {
        self.layers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct InMemoryTerrainSource {
    data: Arc<InMemoryTerrainData>,
    configuration: TerrainConfiguration,
}

impl InMemoryTerrainSource {
    pub fn new(data: Arc<InMemoryTerrainData>, configuration: TerrainConfiguration) -> Self {
        Self {
            data,
            configuration,
        }
    }
}

impl TerrainSource for InMemoryTerrainSource {
    fn configuration(&self) -> Result<TerrainConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<f32>> {
        let layers = self.data.read();
        self.data.sample_tile(level, tile, |index| {
            index.map_or(INVALID_HEIGHT, |index| layers.heights[index])
        })
    }

    fn invalid_tiles(&self, level: u32) -> Vec<Tile> {
        InMemoryTerrainData::take_dirty(&self.data.dirty_heights, level)
    }
}

pub struct InMemoryTextureSource {
    data: Arc<InMemoryTerrainData>,
    configuration: TextureConfiguration,
}

impl InMemoryTextureSource {
    pub fn new(data: Arc<InMemoryTerrainData>, configuration: TextureConfiguration) -> Self {
        Self {
            data,
            configuration,
        }
    }
}

impl TextureSource for InMemoryTextureSource {
    fn configuration(&self) -> Result<TextureConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<u8>> {
        let format = self.configuration.format;
        let layers = self.data.read();
        let colors = self.data.sample_tile(level, tile, |index| {
            index.map_or(Rgba8::default(), |index| layers.colors[index])
        })?;
        let mut texels = Vec::with_capacity(format.tile_len(self.data.tile_size));
        for color in colors {
            color.write_texel(format, &mut texels);
        }
        Ok(texels)
    }

    fn invalid_tiles(&self, level: u32) -> Vec<Tile> {
        InMemoryTerrainData::take_dirty(&self.data.dirty_colors, level)
    }
}

pub struct InMemoryTerrainDataProvider {
    data: Arc<InMemoryTerrainData>,
    scale: Vec3,
}

impl InMemoryTerrainDataProvider {
    pub fn new(data: Arc<InMemoryTerrainData>, scale: Vec3) -> Self {
        Self { data, scale }
    }

    pub fn data(&self) -> &Arc<InMemoryTerrainData> {
        &self.data
    }
}

impl TerrainDataProvider for InMemoryTerrainDataProvider {
    fn available_maps(&self) -> Result<BTreeMap<u32, String>> {
        Ok(BTreeMap::from([(0, "InMemoryData".to_string())]))
    }

    fn terrain_source(&self, _map_id: u32) -> Result<Arc<dyn TerrainSource>> {
        let configuration =
            TerrainConfiguration::new(self.data.levels, self.data.tile_size, self.scale);
        Ok(Arc::new(InMemoryTerrainSource::new(
            Arc::clone(&self.data),
            configuration,
        )))
    }

    fn texture_source(&self, _map_id: u32) -> Result<Option<Arc<dyn TextureSource>>> {
        let configuration =
            TextureConfiguration::new(self.data.levels, self.data.tile_size, TextureFormat::Rgba8)
                .with_texture_density(1.0 / self.scale.x);
        Ok(Some(Arc::new(InMemoryTextureSource::new(
            Arc::clone(&self.data),
            configuration,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_mark_every_level_that_sees_them() {
        let data = Arc::new(InMemoryTerrainData::new(16, 4).expect("data"));
        let source = InMemoryTerrainDataProvider::new(Arc::clone(&data), Vec3::ONE)
            .terrain_source(0)
            .expect("source");
        assert_eq!(data.levels(), 3);

        assert!(data.set_height(8, 4, 2.0));
        assert_eq!(source.invalid_tiles(0), vec![Tile::new(2, 1)]);
        assert_eq!(source.invalid_tiles(1), vec![Tile::new(1, 0)]);
        assert_eq!(source.invalid_tiles(2), vec![Tile::new(0, 0)]);
        assert!(source.invalid_tiles(0).is_empty());

        // odd coordinates only exist on level 0
        assert!(data.set_height(3, 3, 1.0));
        assert_eq!(source.invalid_tiles(0), vec![Tile::new(0, 0)]);
        assert!(source.invalid_tiles(1).is_empty());
    }

    #[test]
    fn out_of_range_writes_are_rejected() {
        let data = InMemoryTerrainData::new(8, 4).expect("data");
        assert!(!data.set_height(-1, 0, 1.0));
        assert!(!data.set_color(0, 8, Rgba8::BLACK));
        assert_eq!(data.height(9, 9), INVALID_HEIGHT);
    }

    #[test]
    fn tiles_reflect_writes() {
        let data = Arc::new(InMemoryTerrainData::new(8, 4).expect("data"));
        let provider = InMemoryTerrainDataProvider::new(Arc::clone(&data), Vec3::ONE);
        data.set_height(6, 4, 5.0);
        data.set_color(6, 4, Rgba8::new(1, 2, 3, 4));

        let heights = provider.terrain_source(0).expect("terrain");
        let tile = heights.request_tile(1, Tile::new(0, 0)).expect("coarse");
        assert_eq!(tile[2 * 4 + 3], 5.0);

        let colors = provider.texture_source(0).expect("texture").expect("some");
        let tile = colors.request_tile(0, Tile::new(1, 1)).expect("tile");
        assert_eq!(&tile[8..12], &[1, 2, 3, 4]);
        assert!(matches!(
            colors.request_tile(0, Tile::new(2, 0)),
            Err(Error::TileOutOfBounds(_))
        ));
    }
}
