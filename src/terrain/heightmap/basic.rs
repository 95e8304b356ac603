use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Heightmap, HeightmapPyramid, INVALID_HEIGHT};
use crate::terrain::error::{Error, Result};
use crate::terrain::tile::wrap;

/// Square heightmap backed by a flat row-major array.
#[derive(Clone, Debug)]
pub struct BasicHeightmap {
    size: usize,
    wrap: bool,
    height_data: Vec<f32>,
}

impl BasicHeightmap {
    /// A wrapping heightmap of `size * size` zero samples.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            wrap: true,
            height_data: vec![0.0; size * size],
        }
    }

    pub fn from_data(height_data: Vec<f32>, size: usize) -> Result<Self> {
        if size == 0 || height_data.len() != size * size {
            return Err(Error::configuration(
                "heightmap.size",
                format!(
                    "{} samples cannot form a {size}x{size} heightmap",
                    height_data.len()
                ),
            ));
        }
        Ok(Self {
            size,
            wrap: true,
            height_data,
        })
    }

    /// Enable or disable coordinate wrapping.
    ///
    /// Without wrapping, out of range samples read as [`INVALID_HEIGHT`].
    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn data(&self) -> &[f32] {
        &self.height_data
    }

    /// Write a sample. Out of range writes are ignored unless wrapping.
    pub fn set_height(&mut self, x: i32, y: i32, height: f32) {
        if let Some(index) = self.index(x, y) {
            self.height_data[index] = height;
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let size = self.size as i32;
        let (x, y) = if self.wrap {
            (wrap(x, size), wrap(y, size))
        } else if x < 0 || y < 0 || x >= size || y >= size {
            return None;
        } else {
            (x, y)
        };
        Some(y as usize * self.size + x as usize)
    }
}

impl Heightmap for BasicHeightmap {
    fn height(&self, x: i32, y: i32) -> f32 {
        match self.index(x, y) {
            Some(index) => self.height_data[index],
            None => INVALID_HEIGHT,
        }
    }

    fn size(&self) -> Option<usize> {
        Some(self.size)
    }

    fn is_ready(&self) -> bool {
        !self.height_data.is_empty()
    }

    fn wraps(&self) -> bool {
        self.wrap
    }
}

/// How a coarser mip level is derived from its parent.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum MipFilter {
    /// Take the parent sample at `(2x, 2y)`.
    #[default]
    PointSample,
    /// Average the 2x2 parent footprint.
    Box,
}

/// Pyramid built by decimating a base heightmap.
pub struct BasicHeightmapPyramid {
    heightmaps: Vec<Box<dyn Heightmap>>,
    filter: MipFilter,
}

impl BasicHeightmapPyramid {
    pub fn new() -> Self {
        Self {
            heightmaps: Vec::new(),
            filter: MipFilter::PointSample,
        }
    }

    /// Build `clip_level_count` levels on top of `base_heightmap`.
    pub fn from_base(
        base_heightmap: impl Heightmap + 'static,
        clip_level_count: u32,
        filter: MipFilter,
    ) -> Result<Self> {
        let mut pyramid = Self {
            heightmaps: vec![Box::new(base_heightmap)],
            filter,
        };
        pyramid.build_levels(clip_level_count)?;
        Ok(pyramid)
    }

    pub fn filter(&self) -> MipFilter {
        self.filter
    }

    pub fn heightmaps(&self) -> &[Box<dyn Heightmap>] {
        &self.heightmaps
    }

    /// Regenerate every level above the base, `levels` in total.
    ///
    /// Level `i` is `base_size >> i` samples wide; generation stops early once
    /// a level would be empty. Generated levels wrap when the base does.
    pub fn build_levels(&mut self, levels: u32) -> Result<()> {
        self.heightmaps.truncate(1);
        let Some(base) = self.heightmaps.first() else {
            return Ok(());
        };
        let wrap = base.wraps();
        let base_size = base.size().ok_or_else(|| {
            Error::configuration("heightmap.size", "cannot build mip levels over an unbounded heightmap")
        })?;

        debug!("building heightmap pyramid from base size {}", base_size);
        for i in 1..levels as usize {
            let current_size = base_size >> i;
            if current_size == 0 {
                break;
            }
            let parent = &self.heightmaps[i - 1];
            let mut data = vec![0.0f32; current_size * current_size];
            let filter = self.filter;
            data.par_chunks_mut(current_size)
                .enumerate()
                .for_each(|(y, row)| {
                    let py = y as i32 * 2;
                    for (x, sample) in row.iter_mut().enumerate() {
                        let px = x as i32 * 2;
                        *sample = match filter {
                            MipFilter::PointSample => parent.height(px, py),
                            MipFilter::Box => {
                                (parent.height(px, py)
                                    + parent.height(px + 1, py)
                                    + parent.height(px, py + 1)
                                    + parent.height(px + 1, py + 1))
                                    * 0.25
                            }
                        };
                    }
                });
            debug!("built pyramid level {} ({}x{})", i, current_size, current_size);
            let heightmap = BasicHeightmap::from_data(data, current_size)?.with_wrap(wrap);
            self.heightmaps.push(Box::new(heightmap));
        }
        Ok(())
    }

    fn heightmap(&self, level: u32) -> Option<&dyn Heightmap> {
        let last = self.heightmaps.len().checked_sub(1)?;
        let level = (level as usize).min(last);
        Some(self.heightmaps[level].as_ref())
    }
}

impl Default for BasicHeightmapPyramid {
    fn default() -> Self {
        Self::new()
    }
}

impl HeightmapPyramid for BasicHeightmapPyramid {
    fn height(&self, level: u32, x: i32, y: i32) -> f32 {
        self.heightmap(level)
            .map_or(INVALID_HEIGHT, |heightmap| heightmap.height(x, y))
    }

    fn size(&self, level: u32) -> Option<usize> {
        self.heightmap(level).and_then(|heightmap| heightmap.size())
    }

    fn heightmap_count(&self) -> u32 {
        self.heightmaps.len() as u32
    }

    fn is_ready(&self, level: u32) -> bool {
        self.heightmap(level)
            .is_some_and(|heightmap| heightmap.is_ready())
    }
}
