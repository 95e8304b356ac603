use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Layout of the texels a texture source delivers.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TextureFormat {
    #[default]
    Rgba8,
    Rgb8,
    Luminance8,
}

impl TextureFormat {
    pub const fn bytes_per_texel(&self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgb8 => 3,
            TextureFormat::Luminance8 => 1,
        }
    }

    /// Bytes in one square tile of `tile_size` texels per edge.
    pub const fn tile_len(&self, tile_size: u32) -> usize {
        tile_size as usize * tile_size as usize * self.bytes_per_texel()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn grey(value: u8) -> Self {
        Self::new(value, value, value, 255)
    }

    /// Decode one texel. `bytes` must hold at least one texel of `format`.
    pub fn from_texel(format: TextureFormat, bytes: &[u8]) -> Self {
        match format {
            TextureFormat::Rgba8 => Self::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            TextureFormat::Rgb8 => Self::new(bytes[0], bytes[1], bytes[2], 255),
            TextureFormat::Luminance8 => Self::grey(bytes[0]),
        }
    }

    /// Append this colour to `out` in `format`.
    pub fn write_texel(&self, format: TextureFormat, out: &mut Vec<u8>) {
        match format {
            TextureFormat::Rgba8 => out.extend_from_slice(bytemuck::bytes_of(self)),
            TextureFormat::Rgb8 => out.extend_from_slice(&[self.r, self.g, self.b]),
            TextureFormat::Luminance8 => out.push(self.luminance()),
        }
    }

    pub fn luminance(&self) -> u8 {
        let l = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        l.round().clamp(0.0, 255.0) as u8
    }

    pub fn lerp(&self, other: Rgba8, t: f32) -> Rgba8 {
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgba8::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
            mix(self.a, other.a),
        )
    }
}
