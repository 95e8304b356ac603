mod fetch;
mod grid;
mod loader;

pub use fetch::{ColorFetch, HeightFetch, TileFetch};
pub use grid::{
    CacheKind, CacheStats, GridCache, GridCacheInfo, Levels, TerrainGridCache,
    TextureGridCache, TileResult, TileState, TileWindow,
};
pub use loader::{LoadJob, TileLoader};
