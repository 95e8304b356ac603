mod basic;
mod procedural;
mod streaming;

pub use basic::{BasicHeightmap, BasicHeightmapPyramid, MipFilter};
pub use procedural::{HeightFunction, ProceduralHeightmap};
pub use streaming::StreamingHeightmapPyramid;

/// Height returned for samples that have no data.
///
/// Callers must check for it (see [`is_valid_height`]) before using a height.
pub const INVALID_HEIGHT: f32 = f32::NEG_INFINITY;

#[inline]
pub fn is_valid_height(height: f32) -> bool {
    height != INVALID_HEIGHT && !height.is_nan()
}

/// A single grid of elevation samples.
pub trait Heightmap: Send + Sync {
    fn height(&self, x: i32, y: i32) -> f32;

    /// Samples per edge, or `None` for unbounded sources.
    fn size(&self) -> Option<usize>;

    fn is_ready(&self) -> bool;

    /// Whether coordinates outside `size` wrap around.
    fn wraps(&self) -> bool {
        false
    }
}

/// Elevation samples at several resolutions, level 0 being the finest.
///
/// Levels past [`HeightmapPyramid::heightmap_count`] clamp to the coarsest one.
pub trait HeightmapPyramid {
    fn height(&self, level: u32, x: i32, y: i32) -> f32;

    fn size(&self, level: u32) -> Option<usize>;

    fn heightmap_count(&self) -> u32;

    fn is_ready(&self, level: u32) -> bool;
}
