use super::{HeightmapPyramid, INVALID_HEIGHT};
use crate::terrain::cache::TerrainGridCache;

/// Read-only pyramid view over a live terrain cache chain.
///
/// Level `n` of the pyramid is the cache for clip level `n`; samples the
/// chain has not streamed in yet fall back to coarser levels or read as
/// [`INVALID_HEIGHT`].
pub struct StreamingHeightmapPyramid<'a> {
    root: &'a TerrainGridCache,
}

impl<'a> StreamingHeightmapPyramid<'a> {
    pub fn new(root: &'a TerrainGridCache) -> Self {
        Self { root }
    }

    fn cache(&self, level: u32) -> &'a TerrainGridCache {
        let mut cache = self.root;
        while cache.level() < level {
            match cache.parent() {
                Some(parent) => cache = parent,
                None => break,
            }
        }
        cache
    }
}

impl HeightmapPyramid for StreamingHeightmapPyramid<'_> {
    fn height(&self, level: u32, x: i32, y: i32) -> f32 {
        self.cache(level).height(x, y).unwrap_or(INVALID_HEIGHT)
    }

    fn size(&self, level: u32) -> Option<usize> {
        let cache = self.cache(level);
        Some(cache.cache_size() as usize * cache.tile_size() as usize)
    }

    fn heightmap_count(&self) -> u32 {
        self.root.levels().count() as u32
    }

    fn is_ready(&self, level: u32) -> bool {
        self.cache(level).is_ready()
    }
}
