use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use tracing::trace;

use super::cache::{CacheStats, TerrainGridCache, TextureGridCache};
use super::double_buffer::DoubleBufferedList;
use super::heightmap::{StreamingHeightmapPyramid, INVALID_HEIGHT};
use super::picking::TerrainPicker;
use super::source::{TerrainConfiguration, TextureConfiguration};
use super::texel::Rgba8;
use super::tile::Region;
use crate::utils::timer::Timer;

// Keeps windows and neighbour lookups clear of i32 overflow.
const MAX_SAMPLE_COORDINATE: i32 = 1 << 28;

/// Nearest sample at or below `value`, clamped to the addressable range.
fn to_sample(value: f32) -> i32 {
    (value.floor() as i32).clamp(-MAX_SAMPLE_COORDINATE, MAX_SAMPLE_COORDINATE)
}

/// Sample position of level `level` over level 0 sample `position`.
fn level_position(position: (i32, i32), level: u32) -> (i32, i32) {
    let step = 1i32 << level;
    (position.0.div_euclid(step), position.1.div_euclid(step))
}

/// Height clip-map: a chain of terrain caches, finest first, following the
/// camera.
///
/// Call [`Terrain::update`] once per frame with the camera position. Reads
/// never block; samples the finest levels have not streamed in yet come from
/// coarser ones.
pub struct Terrain {
    cache: TerrainGridCache,
    configuration: TerrainConfiguration,
    clip_size: u32,
    texture_clipmaps: Vec<TextureClipmap>,
    updated_regions: Arc<DoubleBufferedList<Region>>,
    picker: TerrainPicker,
    camera_position: Option<Vec3>,
    sample_position: (i32, i32),
    last_valid_height: f32,
    update_timer: Timer,
    last_update: Duration,
}

impl Terrain {
    pub fn new(
        mut cache: TerrainGridCache,
        configuration: TerrainConfiguration,
        clip_size: u32,
        picker: TerrainPicker,
    ) -> Self {
        let updated_regions = Arc::new(DoubleBufferedList::new());
        cache.set_region_mailbox(Arc::clone(&updated_regions));
        Self {
            cache,
            configuration,
            clip_size,
            texture_clipmaps: Vec::new(),
            updated_regions,
            picker,
            camera_position: None,
            sample_position: (0, 0),
            last_valid_height: 0.0,
            update_timer: Timer::new(),
            last_update: Duration::ZERO,
        }
    }

    pub fn add_texture_clipmap(&mut self, clipmap: TextureClipmap) {
        self.texture_clipmaps.push(clipmap);
    }

    pub fn texture_clipmaps(&self) -> &[TextureClipmap] {
        &self.texture_clipmaps
    }

    pub fn configuration(&self) -> &TerrainConfiguration {
        &self.configuration
    }

    /// Samples per edge of each clip level's renderable window.
    pub fn clip_size(&self) -> u32 {
        self.clip_size
    }

    pub fn level_count(&self) -> u32 {
        self.cache.levels().count() as u32
    }

    /// Finest cache of the chain.
    pub fn cache(&self) -> &TerrainGridCache {
        &self.cache
    }

    pub fn update(&mut self, camera: Vec3) {
        self.update_timer.start();

        let scale = self.configuration.scale;
        self.sample_position = (to_sample(camera.x / scale.x), to_sample(camera.z / scale.z));
        self.cache.update(self.sample_position.0, self.sample_position.1);
        for clipmap in &mut self.texture_clipmaps {
            clipmap.update(camera);
        }

        if let Some(height) = self.height_at(camera.x, camera.z) {
            self.last_valid_height = height;
        }
        self.camera_position = Some(camera);

        self.update_timer.stop();
        self.last_update = self.update_timer.elapsed_duration();
        trace!(
            "terrain update at ({}, {}) took {}us",
            self.sample_position.0,
            self.sample_position.1,
            self.update_timer.elapsed_micro()
        );
    }

    pub fn camera_position(&self) -> Option<Vec3> {
        self.camera_position
    }

    /// World height under the camera as of the last update that had data
    /// there.
    pub fn last_valid_height(&self) -> f32 {
        self.last_valid_height
    }

    pub fn last_update_duration(&self) -> Duration {
        self.last_update
    }

    /// Interpolated world height at a world position.
    pub fn height_at(&self, world_x: f32, world_z: f32) -> Option<f32> {
        let scale = self.configuration.scale;
        self.cache
            .sub_height(world_x / scale.x, world_z / scale.z)
            .map(|height| height * scale.y)
    }

    /// Raw sample of clip `level`, falling back to coarser levels.
    pub fn sample_height(&self, level: u32, x: i32, z: i32) -> f32 {
        self.cache
            .level_cache(level)
            .and_then(|cache| cache.height(x, z))
            .unwrap_or(INVALID_HEIGHT)
    }

    /// Colour of the first texture clip-map at a world position.
    pub fn color_at(&self, world_x: f32, world_z: f32) -> Option<Rgba8> {
        self.texture_clipmaps.first()?.color_at(world_x, world_z)
    }

    /// Level sample regions merged since the previous call.
    ///
    /// Regions of tiles evicted before being taken are withdrawn, so the
    /// queue never outgrows the resident tiles of the chain.
    pub fn take_updated_regions(&self) -> Vec<Region> {
        self.updated_regions.switch_and_get()
    }

    /// Copy the `clip_size` square around the camera at `level` into `dest`.
    ///
    /// Returns `None` for a level the chain does not have, otherwise how many
    /// samples came from `level` itself.
    pub fn copy_clip_heights(&self, level: u32, dest: &mut [f32]) -> Option<usize> {
        let cache = self.cache.level_cache(level)?;
        let region = self.clip_region(level);
        Some(cache.copy_heights(region.x, region.y, region.width, region.height, dest))
    }

    /// Level samples covered by `level`'s clip window.
    pub fn clip_region(&self, level: u32) -> Region {
        let (x, z) = level_position(self.sample_position, level);
        let half = (self.clip_size / 2) as i32;
        Region::new(level, x - half, z - half, self.clip_size, self.clip_size)
    }

    pub fn pyramid(&self) -> StreamingHeightmapPyramid<'_> {
        StreamingHeightmapPyramid::new(&self.cache)
    }

    /// World position where a ray first meets the resident terrain.
    pub fn pick(&self, origin: Vec3, direction: Vec3) -> Option<Vec3> {
        self.picker.pick(&self.pyramid(), origin, direction)
    }

    /// Whether the coarsest level holds data under the camera.
    pub fn is_ready(&self) -> bool {
        self.cache.levels().last().is_some_and(|cache| cache.is_ready())
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        self.cache.levels().map(|cache| cache.stats()).collect()
    }
}

/// Colour clip-map following the same camera as its [`Terrain`].
pub struct TextureClipmap {
    cache: TextureGridCache,
    configuration: TextureConfiguration,
    texture_size: u32,
    updated_regions: Arc<DoubleBufferedList<Region>>,
    sample_position: (i32, i32),
}

impl TextureClipmap {
    pub fn new(
        mut cache: TextureGridCache,
        configuration: TextureConfiguration,
        texture_size: u32,
    ) -> Self {
        let updated_regions = Arc::new(DoubleBufferedList::new());
        cache.set_region_mailbox(Arc::clone(&updated_regions));
        Self {
            cache,
            configuration,
            texture_size,
            updated_regions,
            sample_position: (0, 0),
        }
    }

    pub fn configuration(&self) -> &TextureConfiguration {
        &self.configuration
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    pub fn cache(&self) -> &TextureGridCache {
        &self.cache
    }

    pub fn update(&mut self, camera: Vec3) {
        let density = self.configuration.texture_density;
        self.sample_position = (to_sample(camera.x * density), to_sample(camera.z * density));
        self.cache.update(self.sample_position.0, self.sample_position.1);
    }

    pub fn color_at(&self, world_x: f32, world_z: f32) -> Option<Rgba8> {
        let density = self.configuration.texture_density;
        self.cache
            .color(to_sample(world_x * density), to_sample(world_z * density))
    }

    /// RGBA8 texels of a block of clip `level`, `None` for an unknown level.
    pub fn copy_region(&self, level: u32, x: i32, z: i32, width: u32, height: u32) -> Option<Vec<u8>> {
        self.cache
            .level_cache(level)
            .map(|cache| cache.copy_texels(x, z, width, height))
    }

    /// RGBA8 texels of the `texture_size` square around the camera at `level`.
    pub fn copy_clip(&self, level: u32) -> Option<Vec<u8>> {
        let (x, z) = level_position(self.sample_position, level);
        let half = (self.texture_size / 2) as i32;
        self.copy_region(level, x - half, z - half, self.texture_size, self.texture_size)
    }

    pub fn take_updated_regions(&self) -> Vec<Region> {
        self.updated_regions.switch_and_get()
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        self.cache.levels().map(|cache| cache.stats()).collect()
    }
}
