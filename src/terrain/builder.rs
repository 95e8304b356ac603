use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::cache::{
    CacheKind, ColorFetch, GridCache, GridCacheInfo, HeightFetch, TileFetch, TileLoader,
};
use super::clipmap::{Terrain, TextureClipmap};
use super::error::{Error, Result};
use super::picking::{TerrainPicker, MAX_PICK_CHECKS};
use super::source::{TerrainDataProvider, TextureSource};

/// Threads fetching tiles for the streaming levels.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum LoaderMode {
    /// One worker per streaming level.
    #[default]
    PerLevel,
    /// A single pool shared by every streaming level.
    Shared { threads: usize },
}

/// Information used to build a [`Terrain`] with [`TerrainBuilder`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TerrainBuilderInfo {
    /// Upper bound on height clip levels; the source may offer fewer.
    pub clipmap_terrain_count: u32,
    /// Samples per edge of a height clip window. Must be `2^k - 1`.
    pub clipmap_terrain_size: u32,
    pub clipmap_texture_count: u32,
    /// Texels per edge of a texture clip window. Must be a power of two.
    pub clipmap_texture_size: u32,
    /// Tiles per cache edge. Derived from the clip size when unset.
    pub cache_size: Option<u32>,
    pub max_retries: u32,
    pub retry_delay_cycles: u64,
    pub loader: LoaderMode,
    pub max_pick_checks: usize,
    /// Also stream the provider's own texture source, if it has one.
    pub provider_texture: bool,
}

impl Default for TerrainBuilderInfo {
    fn default() -> Self {
        Self {
            clipmap_terrain_count: 20,
            clipmap_terrain_size: 127,
            clipmap_texture_count: 20,
            clipmap_texture_size: 128,
            cache_size: None,
            max_retries: 3,
            retry_delay_cycles: 30,
            loader: LoaderMode::PerLevel,
            max_pick_checks: MAX_PICK_CHECKS,
            provider_texture: true,
        }
    }
}

impl TerrainBuilderInfo {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading terrain configuration {}", path.display());
        let json_data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json_data)?)
    }
}

/// Hands out loaders to streaming levels according to [`LoaderMode`].
struct LoaderPool {
    mode: LoaderMode,
    shared: Option<Arc<TileLoader>>,
}

impl LoaderPool {
    fn new(mode: LoaderMode) -> Self {
        Self { mode, shared: None }
    }

    fn loader(&mut self, name: &str) -> Result<Arc<TileLoader>> {
        match self.mode {
            LoaderMode::PerLevel => Ok(Arc::new(TileLoader::new(name, 1)?)),
            LoaderMode::Shared { threads } => {
                if let Some(loader) = &self.shared {
                    return Ok(Arc::clone(loader));
                }
                let loader = Arc::new(TileLoader::new("tile-loader", threads)?);
                self.shared = Some(Arc::clone(&loader));
                Ok(loader)
            }
        }
    }
}

/// Tiles per cache edge for a clip window of `clip_size` samples.
///
/// The window must fit with a tile to spare on each side while the camera
/// crosses a tile; a few more tiles let loads get ahead of the camera.
fn cache_size_for(clip_size: u32, tile_size: u32, requested: Option<u32>) -> Result<u32> {
    let minimum = (clip_size + 1).div_ceil(tile_size) + 1;
    match requested {
        Some(size) if size < minimum => Err(Error::configuration(
            "cache_size",
            format!(
                "{size} tiles cannot hold a {clip_size} sample clip window of {tile_size} sample tiles, need at least {minimum}"
            ),
        )),
        Some(size) => Ok(size),
        None => {
            let size = minimum + 3;
            Ok(if size % 2 == 0 { size + 1 } else { size })
        }
    }
}

/// Build the cache chain coarsest first, handing each level its parent.
/// The coarsest level loads synchronously so reads always have a fallback.
fn build_chain<F: TileFetch>(
    fetch: Arc<F>,
    levels: u32,
    template: GridCacheInfo,
    loaders: &mut LoaderPool,
) -> Result<GridCache<F>> {
    let mut parent: Option<Box<GridCache<F>>> = None;
    for level in (0..levels).rev() {
        let kind = match parent {
            None => CacheKind::Resident,
            Some(_) => CacheKind::Streaming(
                loaders.loader(&format!("{}-level-{level}", fetch.kind()))?,
            ),
        };
        let info = GridCacheInfo { level, ..template };
        let cache = GridCache::new(info, Arc::clone(&fetch), kind, parent.take())?;
        parent = Some(Box::new(cache));
    }
    parent
        .map(|cache| *cache)
        .ok_or_else(|| Error::configuration("clipmap_terrain_count", "no clip levels to build"))
}

/// Wires a data provider into a [`Terrain`] and its texture clip-maps.
pub struct TerrainBuilder {
    provider: Arc<dyn TerrainDataProvider>,
    info: TerrainBuilderInfo,
    texture_connections: Vec<Arc<dyn TextureSource>>,
}

impl TerrainBuilder {
    pub fn new(provider: Arc<dyn TerrainDataProvider>, info: TerrainBuilderInfo) -> Self {
        Self {
            provider,
            info,
            texture_connections: Vec::new(),
        }
    }

    pub fn info(&self) -> &TerrainBuilderInfo {
        &self.info
    }

    /// Stream an extra texture source alongside the heights.
    pub fn add_texture_connection(&mut self, source: Arc<dyn TextureSource>) -> &mut Self {
        self.texture_connections.push(source);
        self
    }

    pub fn build(&self) -> Result<Terrain> {
        let info = &self.info;
        let clip_size = info.clipmap_terrain_size;
        if clip_size < 3 || !(clip_size + 1).is_power_of_two() {
            return Err(Error::configuration(
                "clipmap_terrain_size",
                format!("{clip_size} is not of the form 2^k - 1"),
            ));
        }

        let maps = self.provider.available_maps()?;
        let Some((&map_id, map_name)) = maps.iter().next() else {
            return Err(Error::configuration("map", "provider offers no maps"));
        };
        info!("Building terrain for map {} '{}'", map_id, map_name);

        let source = self.provider.terrain_source(map_id)?;
        let configuration = source.configuration()?;
        let tile_size = configuration.cache_grid_size;
        if tile_size == 0 {
            return Err(Error::configuration("cache_grid_size", "must be positive"));
        }
        let scale = configuration.scale;
        if !scale.is_finite() || scale.x == 0.0 || scale.z == 0.0 {
            return Err(Error::configuration(
                "scale",
                format!("{scale} must be finite with non-zero x and z"),
            ));
        }
        let levels = configuration
            .total_clipmap_levels
            .min(info.clipmap_terrain_count);
        if levels == 0 {
            return Err(Error::configuration(
                "clipmap_terrain_count",
                "at least one clip level is required",
            ));
        }
        let cache_size = cache_size_for(clip_size, tile_size, info.cache_size)?;
        info!("{}", configuration);
        info!(
            "Terrain: {} level(s), {}x{} tiles per level",
            levels, cache_size, cache_size
        );

        let mut loaders = LoaderPool::new(info.loader);
        let template = GridCacheInfo {
            level: 0,
            cache_size,
            tile_size,
            max_retries: info.max_retries,
            retry_delay_cycles: info.retry_delay_cycles,
        };
        let fetch = Arc::new(HeightFetch::new(source, tile_size));
        let cache = build_chain(fetch, levels, template, &mut loaders)?;

        let picker = TerrainPicker::new(configuration.scale).with_max_checks(info.max_pick_checks);
        let mut terrain = Terrain::new(cache, configuration, clip_size, picker);

        let mut texture_sources = Vec::new();
        if info.provider_texture {
            if let Some(texture) = self.provider.texture_source(map_id)? {
                texture_sources.push(texture);
            }
        }
        texture_sources.extend(self.texture_connections.iter().cloned());
        for texture in texture_sources {
            terrain.add_texture_clipmap(self.build_texture(texture, &mut loaders)?);
        }

        Ok(terrain)
    }

    fn build_texture(
        &self,
        source: Arc<dyn TextureSource>,
        loaders: &mut LoaderPool,
    ) -> Result<TextureClipmap> {
        let info = &self.info;
        let texture_size = info.clipmap_texture_size;
        if !texture_size.is_power_of_two() {
            return Err(Error::configuration(
                "clipmap_texture_size",
                format!("{texture_size} is not a power of two"),
            ));
        }

        let configuration = source.configuration()?;
        let tile_size = configuration.cache_grid_size;
        if tile_size == 0 {
            return Err(Error::configuration("cache_grid_size", "must be positive"));
        }
        let density = configuration.texture_density;
        if !density.is_finite() || density <= 0.0 {
            return Err(Error::configuration(
                "texture_density",
                format!("{density} must be finite and positive"),
            ));
        }
        let levels = configuration
            .total_clipmap_levels
            .min(info.clipmap_texture_count);
        if levels == 0 {
            return Err(Error::configuration(
                "clipmap_texture_count",
                "at least one texture clip level is required",
            ));
        }
        let cache_size = cache_size_for(texture_size - 1, tile_size, info.cache_size)?;
        info!("{}", configuration);

        let template = GridCacheInfo {
            level: 0,
            cache_size,
            tile_size,
            max_retries: info.max_retries,
            retry_delay_cycles: info.retry_delay_cycles,
        };
        let fetch = Arc::new(ColorFetch::new(source, tile_size, configuration.format));
        let cache = build_chain(fetch, levels, template, loaders)?;
        Ok(TextureClipmap::new(cache, configuration, texture_size))
    }
}
