//! Backing data for the terrain caches.
//!
//! A source answers tile requests for one map. Requests run on loader
//! threads, so implementations may block on I/O or burn CPU; they must be
//! `Send + Sync` and keep their own synchronisation.

mod array;
mod image;
mod in_memory;
mod procedural;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;

use super::error::Result;
use super::texel::TextureFormat;
use super::tile::Tile;

pub use array::{ArrayTerrainDataProvider, ArrayTerrainSource, ArrayTextureSource};
pub use image::ImageTerrainDataProvider;
pub use in_memory::{
    InMemoryTerrainData, InMemoryTerrainDataProvider, InMemoryTerrainSource,
    InMemoryTextureSource,
};
pub use procedural::{
    Fbm, ProceduralTerrainDataProvider, ProceduralTerrainSource, ProceduralTextureSource,
};

/// Static description of a height source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainConfiguration {
    pub total_clipmap_levels: u32,
    /// Samples per tile edge.
    pub cache_grid_size: u32,
    /// World units per sample on x/z, and per height unit on y.
    pub scale: Vec3,
    pub height_range: (f32, f32),
}

impl TerrainConfiguration {
    pub fn new(total_clipmap_levels: u32, cache_grid_size: u32, scale: Vec3) -> Self {
        Self {
            total_clipmap_levels,
            cache_grid_size,
            scale,
            height_range: (0.0, 1.0),
        }
    }

    pub fn with_height_range(mut self, min: f32, max: f32) -> Self {
        self.height_range = (min, max);
        self
    }
}

impl fmt::Display for TerrainConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TerrainConfiguration [levels={}, tile size={}, scale={}, heights={}..{}]",
            self.total_clipmap_levels,
            self.cache_grid_size,
            self.scale,
            self.height_range.0,
            self.height_range.1
        )
    }
}

/// Static description of a colour source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureConfiguration {
    pub total_clipmap_levels: u32,
    /// Texels per tile edge.
    pub cache_grid_size: u32,
    pub format: TextureFormat,
    /// Level 0 texels per world unit.
    pub texture_density: f32,
}

impl TextureConfiguration {
    pub fn new(total_clipmap_levels: u32, cache_grid_size: u32, format: TextureFormat) -> Self {
        Self {
            total_clipmap_levels,
            cache_grid_size,
            format,
            texture_density: 1.0,
        }
    }

    pub fn with_texture_density(mut self, texture_density: f32) -> Self {
        self.texture_density = texture_density;
        self
    }
}

impl fmt::Display for TextureConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TextureConfiguration [levels={}, tile size={}, format={:?}, density={}]",
            self.total_clipmap_levels, self.cache_grid_size, self.format, self.texture_density
        )
    }
}

pub trait TerrainSource: Send + Sync {
    fn configuration(&self) -> Result<TerrainConfiguration>;

    /// Produce the `tile_size * tile_size` heights of `tile` at clip `level`,
    /// row-major.
    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<f32>>;

    /// Tiles whose data changed since the previous call for `level`.
    fn invalid_tiles(&self, _level: u32) -> Vec<Tile> {
        Vec::new()
    }
}

pub trait TextureSource: Send + Sync {
    fn configuration(&self) -> Result<TextureConfiguration>;

    /// Produce the texels of `tile` at clip `level` in the configured format.
    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<u8>>;

    fn invalid_tiles(&self, _level: u32) -> Vec<Tile> {
        Vec::new()
    }
}

/// Entry point handing out the sources for each map a provider knows.
pub trait TerrainDataProvider {
    fn available_maps(&self) -> Result<BTreeMap<u32, String>>;

    fn terrain_source(&self, map_id: u32) -> Result<Arc<dyn TerrainSource>>;

    fn texture_source(&self, map_id: u32) -> Result<Option<Arc<dyn TextureSource>>>;
}
