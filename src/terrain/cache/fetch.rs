use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::terrain::error::{Error, Result};
use crate::terrain::source::{TerrainSource, TextureSource};
use crate::terrain::texel::TextureFormat;
use crate::terrain::tile::Tile;

/// Adapter between a grid cache and the source it streams from.
pub trait TileFetch: Send + Sync + 'static {
    type Payload: Send + 'static;

    /// Short name used in log lines.
    fn kind(&self) -> &'static str;

    fn fetch(&self, level: u32, tile: Tile) -> Result<Self::Payload>;

    fn invalid_tiles(&self, level: u32) -> Vec<Tile>;
}

/// Call `fetch` and turn a panicking source into `SourceUnavailable`.
pub(crate) fn fetch_guarded<F: TileFetch>(fetch: &F, level: u32, tile: Tile) -> Result<F::Payload> {
    panic::catch_unwind(AssertUnwindSafe(|| fetch.fetch(level, tile)))
        .unwrap_or_else(|_| Err(Error::source_unavailable(level, tile, "source panicked")))
}

pub struct HeightFetch {
    source: Arc<dyn TerrainSource>,
    tile_size: u32,
}

impl HeightFetch {
    pub fn new(source: Arc<dyn TerrainSource>, tile_size: u32) -> Self {
        Self { source, tile_size }
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

impl TileFetch for HeightFetch {
    type Payload = Vec<f32>;

    fn kind(&self) -> &'static str {
        "terrain"
    }

    fn fetch(&self, level: u32, tile: Tile) -> Result<Vec<f32>> {
        let data = self.source.request_tile(level, tile)?;
        let expected = self.tile_size as usize * self.tile_size as usize;
        if data.len() != expected {
            return Err(Error::source_unavailable(
                level,
                tile,
                format!("expected {expected} heights, got {}", data.len()),
            ));
        }
        Ok(data)
    }

    fn invalid_tiles(&self, level: u32) -> Vec<Tile> {
        self.source.invalid_tiles(level)
    }
}

pub struct ColorFetch {
    source: Arc<dyn TextureSource>,
    tile_size: u32,
    format: TextureFormat,
}

impl ColorFetch {
    pub fn new(source: Arc<dyn TextureSource>, tile_size: u32, format: TextureFormat) -> Self {
        Self {
            source,
            tile_size,
            format,
        }
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }
}

impl TileFetch for ColorFetch {
    type Payload = Vec<u8>;

    fn kind(&self) -> &'static str {
        "texture"
    }

    fn fetch(&self, level: u32, tile: Tile) -> Result<Vec<u8>> {
        let data = self.source.request_tile(level, tile)?;
        let expected = self.format.tile_len(self.tile_size);
        if data.len() != expected {
            return Err(Error::source_unavailable(
                level,
                tile,
                format!("expected {expected} texel bytes, got {}", data.len()),
            ));
        }
        Ok(data)
    }

    fn invalid_tiles(&self, level: u32) -> Vec<Tile> {
        self.source.invalid_tiles(level)
    }
}
