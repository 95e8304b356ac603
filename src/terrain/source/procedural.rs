use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;
use rayon::prelude::*;

use super::{
    TerrainConfiguration, TerrainDataProvider, TerrainSource, TextureConfiguration,
    TextureSource,
};
use crate::terrain::error::Result;
use crate::terrain::heightmap::HeightFunction;
use crate::terrain::texel::{Rgba8, TextureFormat};
use crate::terrain::tile::Tile;

const TILE_SIZE: u32 = 128;
const CLIP_LEVELS: u32 = 8;

/// Fractal value noise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fbm {
    pub seed: u32,
    pub octaves: u32,
    pub frequency: f64,
    pub lacunarity: f64,
    pub persistence: f64,
}

impl Default for Fbm {
    fn default() -> Self {
        Self {
            seed: 1337,
            octaves: 6,
            frequency: 1.0 / 256.0,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

impl Fbm {
    /// Noise in roughly `[-1, 1]`.
    pub fn sample(&self, x: f64, y: f64) -> f32 {
        let mut total = 0.0;
        let mut norm = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        for octave in 0..self.octaves {
            let seed = self.seed.wrapping_add(octave.wrapping_mul(0x9e37));
            total += value_noise(x * frequency, y * frequency, seed) * amplitude;
            norm += amplitude;
            amplitude *= self.persistence;
            frequency *= self.lacunarity;
        }
        if norm > 0.0 {
            (total / norm) as f32
        } else {
            0.0
        }
    }

    pub fn into_function(self) -> HeightFunction {
        Arc::new(move |x, y| self.sample(x, y))
    }
}

fn lattice(ix: i64, iy: i64, seed: u32) -> f64 {
    let mut h = (ix as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ (iy as u64).wrapping_mul(0xc2b2_ae3d_27d4_eb4f)
        ^ (seed as u64).wrapping_mul(0x1656_67b1_9e37_79f9);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    (h >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
}

fn value_noise(x: f64, y: f64, seed: u32) -> f64 {
    let (x0, y0) = (x.floor(), y.floor());
    let (ix, iy) = (x0 as i64, y0 as i64);
    let smooth = |t: f64| t * t * (3.0 - 2.0 * t);
    let (tx, ty) = (smooth(x - x0), smooth(y - y0));
    let top = lattice(ix, iy, seed) + (lattice(ix + 1, iy, seed) - lattice(ix, iy, seed)) * tx;
    let bottom = lattice(ix, iy + 1, seed)
        + (lattice(ix + 1, iy + 1, seed) - lattice(ix, iy + 1, seed)) * tx;
    top + (bottom - top) * ty
}

/// Evaluate `function` over one tile. Level `n` samples every `2^n` level 0
/// samples, so coarser tiles point-sample the same surface.
fn generate_tile(function: &HeightFunction, level: u32, tile: Tile, tile_size: u32) -> Vec<f32> {
    let step = 1i64 << level;
    let (ox, oz) = tile.origin(tile_size);
    let size = tile_size as usize;
    let mut heights = vec![0.0f32; size * size];
    heights
        .par_chunks_mut(size)
        .enumerate()
        .for_each(|(row, samples)| {
            let z = (oz as i64 + row as i64) * step;
            for (col, sample) in samples.iter_mut().enumerate() {
                let x = (ox as i64 + col as i64) * step;
                *sample = function(x as f64, z as f64);
            }
        });
    heights
}

pub struct ProceduralTerrainSource {
    function: HeightFunction,
    configuration: TerrainConfiguration,
}

impl ProceduralTerrainSource {
    pub fn new(function: HeightFunction, configuration: TerrainConfiguration) -> Self {
        Self {
            function,
            configuration,
        }
    }
}

impl TerrainSource for ProceduralTerrainSource {
    fn configuration(&self) -> Result<TerrainConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<f32>> {
        Ok(generate_tile(
            &self.function,
            level,
            tile,
            self.configuration.cache_grid_size,
        ))
    }
}

/// Colours the procedural surface with a height ramp.
pub struct ProceduralTextureSource {
    function: HeightFunction,
    configuration: TextureConfiguration,
    height_range: (f32, f32),
}

impl ProceduralTextureSource {
    const RAMP: [(f32, Rgba8); 6] = [
        (0.0, Rgba8::new(18, 42, 96, 255)),
        (0.3, Rgba8::new(40, 90, 160, 255)),
        (0.35, Rgba8::new(194, 178, 128, 255)),
        (0.5, Rgba8::new(70, 130, 50, 255)),
        (0.75, Rgba8::new(120, 110, 100, 255)),
        (1.0, Rgba8::new(245, 245, 250, 255)),
    ];

    pub fn new(
        function: HeightFunction,
        configuration: TextureConfiguration,
        height_range: (f32, f32),
    ) -> Self {
        Self {
            function,
            configuration,
            height_range,
        }
    }

    pub fn ramp_color(&self, height: f32) -> Rgba8 {
        let (min, max) = self.height_range;
        let t = if max > min {
            ((height - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        for pair in Self::RAMP.windows(2) {
            let (t0, c0) = pair[0];
            let (t1, c1) = pair[1];
            if t <= t1 {
                return c0.lerp(c1, (t - t0) / (t1 - t0));
            }
        }
        Self::RAMP[Self::RAMP.len() - 1].1
    }
}

impl TextureSource for ProceduralTextureSource {
    fn configuration(&self) -> Result<TextureConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<u8>> {
        let format = self.configuration.format;
        let heights = generate_tile(&self.function, level, tile, self.configuration.cache_grid_size);
        let mut texels = Vec::with_capacity(format.tile_len(self.configuration.cache_grid_size));
        for height in heights {
            self.ramp_color(height).write_texel(format, &mut texels);
        }
        Ok(texels)
    }
}

pub struct ProceduralTerrainDataProvider {
    function: HeightFunction,
    scale: Vec3,
    min_height: f32,
    max_height: f32,
}

impl ProceduralTerrainDataProvider {
    pub fn new(function: HeightFunction, scale: Vec3, min_height: f32, max_height: f32) -> Self {
        Self {
            function,
            scale,
            min_height,
            max_height,
        }
    }
}

impl TerrainDataProvider for ProceduralTerrainDataProvider {
    fn available_maps(&self) -> Result<BTreeMap<u32, String>> {
        Ok(BTreeMap::from([(0, "ProceduralMap".to_string())]))
    }

    fn terrain_source(&self, _map_id: u32) -> Result<Arc<dyn TerrainSource>> {
        let configuration = TerrainConfiguration::new(CLIP_LEVELS, TILE_SIZE, self.scale)
            .with_height_range(self.min_height, self.max_height);
        Ok(Arc::new(ProceduralTerrainSource::new(
            Arc::clone(&self.function),
            configuration,
        )))
    }

    fn texture_source(&self, _map_id: u32) -> Result<Option<Arc<dyn TextureSource>>> {
        let configuration = TextureConfiguration::new(CLIP_LEVELS, TILE_SIZE, TextureFormat::Rgba8)
            .with_texture_density(1.0 / self.scale.x);
        Ok(Some(Arc::new(ProceduralTextureSource::new(
            Arc::clone(&self.function),
            configuration,
            (self.min_height, self.max_height),
        ))))
    }
}
