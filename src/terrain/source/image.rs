use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use ::image::RgbaImage;
use glam::Vec3;
use tracing::info;

use super::array::clip_level_count;
use super::{
    ArrayTerrainDataProvider, TerrainDataProvider, TerrainSource, TextureConfiguration,
    TextureSource,
};
use crate::terrain::error::{Error, Result};
use crate::terrain::texel::{Rgba8, TextureFormat};
use crate::terrain::tile::Tile;

const TILE_SIZE: u32 = 128;

/// Colour tiles point-sampled out of a single RGBA image.
struct ImageTextureSource {
    image: RgbaImage,
    configuration: TextureConfiguration,
}

impl TextureSource for ImageTextureSource {
    fn configuration(&self) -> Result<TextureConfiguration> {
        Ok(self.configuration)
    }

    fn request_tile(&self, level: u32, tile: Tile) -> Result<Vec<u8>> {
        if level >= self.configuration.total_clipmap_levels {
            return Err(Error::out_of_bounds(level, tile));
        }
        let tile_size = self.configuration.cache_grid_size;
        let (width, height) = (
            (self.image.width() >> level) as i32,
            (self.image.height() >> level) as i32,
        );
        let (ox, oz) = tile.origin(tile_size);
        let edge = tile_size as i32;
        if ox + edge <= 0 || oz + edge <= 0 || ox >= width || oz >= height {
            return Err(Error::out_of_bounds(level, tile));
        }

        let format = self.configuration.format;
        let mut texels = Vec::with_capacity(format.tile_len(tile_size));
        for z in oz..oz + edge {
            for x in ox..ox + edge {
                let texel = if x < 0 || z < 0 || x >= width || z >= height {
                    Rgba8::default()
                } else {
                    let pixel = self.image.get_pixel((x as u32) << level, (z as u32) << level);
                    let [r, g, b, a] = pixel.0;
                    Rgba8::new(r, g, b, a)
                };
                texel.write_texel(format, &mut texels);
            }
        }
        Ok(texels)
    }
}

/// Provider reading a greyscale height image and an optional colour image.
///
/// Height image luminance maps linearly onto `[0, 1]`; the y component of
/// the scale turns it into world units. The height image must be square.
pub struct ImageTerrainDataProvider {
    heights: ArrayTerrainDataProvider,
    color: Option<Arc<ImageTextureSource>>,
    size: usize,
}

impl ImageTerrainDataProvider {
    pub fn open(height_path: &Path, color_path: Option<&Path>, scale: Vec3) -> Result<Self> {
        Self::open_with_tile_size(height_path, color_path, scale, TILE_SIZE)
    }

    pub fn open_with_tile_size(
        height_path: &Path,
        color_path: Option<&Path>,
        scale: Vec3,
        tile_size: u32,
    ) -> Result<Self> {
        let luma = ::image::open(height_path)?.to_luma16();
        if luma.width() != luma.height() {
            return Err(Error::configuration(
                "height_image",
                format!(
                    "{} is {}x{}, expected a square image",
                    height_path.display(),
                    luma.width(),
                    luma.height()
                ),
            ));
        }
        let size = luma.width() as usize;
        let data = luma
            .pixels()
            .map(|pixel| pixel.0[0] as f32 / u16::MAX as f32)
            .collect();
        let heights = ArrayTerrainDataProvider::with_tile_size(data, size, scale, tile_size)?;
        info!(
            "loaded {}x{} height image '{}'",
            size,
            size,
            height_path.display()
        );

        let color = match color_path {
            Some(path) => {
                let image = ::image::open(path)?.to_rgba8();
                let edge = image.width().min(image.height()) as usize;
                // Texels per world unit along x.
                let density = image.width() as f32 / (size as f32 * scale.x);
                let configuration = TextureConfiguration::new(
                    clip_level_count(edge, tile_size),
                    tile_size,
                    TextureFormat::Rgba8,
                )
                .with_texture_density(density);
                info!(
                    "loaded {}x{} colour image '{}'",
                    image.width(),
                    image.height(),
                    path.display()
                );
                Some(Arc::new(ImageTextureSource {
                    image,
                    configuration,
                }))
            }
            None => None,
        };

        Ok(Self {
            heights,
            color,
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl TerrainDataProvider for ImageTerrainDataProvider {
    fn available_maps(&self) -> Result<BTreeMap<u32, String>> {
        Ok(BTreeMap::from([(0, "ImageMap".to_string())]))
    }

    fn terrain_source(&self, map_id: u32) -> Result<Arc<dyn TerrainSource>> {
        self.heights.terrain_source(map_id)
    }

    /// The colour image when one was given, otherwise height shading.
    fn texture_source(&self, map_id: u32) -> Result<Option<Arc<dyn TextureSource>>> {
        match &self.color {
            Some(color) => Ok(Some(Arc::clone(color) as Arc<dyn TextureSource>)),
            None => self.heights.texture_source(map_id),
        }
    }
}
