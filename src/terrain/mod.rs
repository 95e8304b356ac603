//! Clip-map terrain streaming.
//!
//! Heights and colours are kept in one toroidal tile cache per clip level,
//! level 0 being the finest. Each cache follows the camera, streams the tiles
//! entering its window from a [`source::TerrainSource`] or
//! [`source::TextureSource`] on loader threads, and falls back on its coarser
//! parent for anything not loaded yet.

pub mod builder;
pub mod cache;
pub mod clipmap;
pub mod double_buffer;
pub mod error;
pub mod heightmap;
pub mod picking;
pub mod source;
pub mod texel;
pub mod tile;

pub use builder::{LoaderMode, TerrainBuilder, TerrainBuilderInfo};
pub use clipmap::{Terrain, TextureClipmap};
pub use double_buffer::DoubleBufferedList;
pub use error::{Error, Result};
pub use picking::TerrainPicker;
pub use texel::{Rgba8, TextureFormat};
pub use tile::{Region, Tile};
