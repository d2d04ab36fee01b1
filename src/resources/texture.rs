//! Texture data loading and GPU texture creation

use crate::gpu::{
    Gpu, RenderError, RenderResult, SamplerDescriptor, SamplerHandle, TextureDescriptor,
    TextureFormat, TextureHandle, TextureUsage, TextureViewDescriptor, TextureViewHandle,
};

/// CPU-side RGBA8 image
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn from_file(path: &str) -> RenderResult<Self> {
        let image = image::open(path)
            .map_err(|e| RenderError::ImageLoadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    pub fn solid_color(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![r, g, b, a],
        }
    }

    pub fn white() -> Self {
        Self::solid_color(255, 255, 255, 255)
    }

    pub fn black() -> Self {
        Self::solid_color(0, 0, 0, 255)
    }

    /// Flat tangent-space normal pointing out of the surface
    pub fn default_normal() -> Self {
        Self::solid_color(128, 128, 255, 255)
    }
}

/// An uploaded texture with its view and sampler
pub struct GpuTexture {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub sampler: SamplerHandle,
}

impl GpuTexture {
    pub fn create(gpu: &mut Gpu, label: &str, data: &TextureData, srgb: bool) -> Self {
        let format = if srgb {
            TextureFormat::Rgba8UnormSrgb
        } else {
            TextureFormat::Rgba8Unorm
        };
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            width: data.width,
            height: data.height,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        });
        gpu.write_texture(texture, &data.pixels, data.width, data.height, 4);
        let view = gpu
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap_or_else(|_| unreachable!("view of a texture created just above"));
        let sampler = gpu.create_sampler(&SamplerDescriptor {
            label: Some(label.to_string()),
            address_mode: crate::gpu::AddressMode::Repeat,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Upload the same image into all six faces of a cube map. Cube-typed
    /// shader slots fall back to this; a 2D view would fail bind group
    /// validation there.
    pub fn create_cube(gpu: &mut Gpu, label: &str, data: &TextureData) -> Self {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            width: data.width,
            height: data.height,
            array_layers: 6,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        });
        for layer in 0..6 {
            gpu.write_texture_layer(texture, &data.pixels, data.width, data.height, layer, 4);
        }
        let view = gpu
            .create_texture_view(texture, &TextureViewDescriptor::cube(label))
            .unwrap_or_else(|_| unreachable!("view of a texture created just above"));
        let sampler = gpu.create_sampler(&SamplerDescriptor {
            label: Some(label.to_string()),
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Load from disk, falling back to the given solid color on failure.
    pub fn from_file_or(gpu: &mut Gpu, path: &str, fallback: TextureData, srgb: bool) -> Self {
        match TextureData::from_file(path) {
            Ok(data) => Self::create(gpu, path, &data, srgb),
            Err(e) => {
                log::error!("{e}; using fallback color");
                Self::create(gpu, path, &fallback, srgb)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_colors_are_single_pixels() {
        let white = TextureData::white();
        assert_eq!((white.width, white.height), (1, 1));
        assert_eq!(white.pixels, [255, 255, 255, 255]);

        let normal = TextureData::default_normal();
        assert_eq!(normal.pixels, [128, 128, 255, 255]);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = TextureData::from_file("/nonexistent/albedo.png").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/albedo.png"));
    }
}
