//! PBR material: the five texture maps a surface carries

use crate::gpu::Gpu;
use crate::resources::texture::{GpuTexture, TextureData};
use crate::shader::ShaderProgram;

/// Paths to the five PBR maps of one material
#[derive(Debug, Clone, Default)]
pub struct MaterialPaths {
    pub albedo: Option<String>,
    pub normal: Option<String>,
    pub metallic: Option<String>,
    pub roughness: Option<String>,
    pub ao: Option<String>,
}

/// Loaded PBR maps. Maps that fail to load fall back to neutral solid
/// colors so a broken asset dims one channel instead of killing the model.
pub struct Material {
    pub albedo: GpuTexture,
    pub normal: GpuTexture,
    pub metallic: GpuTexture,
    pub roughness: GpuTexture,
    pub ao: GpuTexture,
}

impl Material {
    pub fn load(gpu: &mut Gpu, paths: &MaterialPaths) -> Self {
        let map = |gpu: &mut Gpu, path: &Option<String>, fallback: TextureData, srgb: bool| {
            match path {
                Some(path) => GpuTexture::from_file_or(gpu, path, fallback, srgb),
                None => GpuTexture::create(gpu, "default map", &fallback, srgb),
            }
        };
        Self {
            albedo: map(gpu, &paths.albedo, TextureData::solid_color(128, 128, 128, 255), true),
            normal: map(gpu, &paths.normal, TextureData::default_normal(), false),
            metallic: map(gpu, &paths.metallic, TextureData::black(), false),
            roughness: map(gpu, &paths.roughness, TextureData::solid_color(128, 128, 128, 255), false),
            ao: map(gpu, &paths.ao, TextureData::white(), false),
        }
    }

    /// Attach the maps to the shader's material slots.
    pub fn bind(&self, shader: &ShaderProgram) {
        shader.set_texture("material.albedoMap", self.albedo.view, self.albedo.sampler);
        shader.set_texture("material.normalMap", self.normal.view, self.normal.sampler);
        shader.set_texture(
            "material.metallicMap",
            self.metallic.view,
            self.metallic.sampler,
        );
        shader.set_texture(
            "material.roughnessMap",
            self.roughness.view,
            self.roughness.sampler,
        );
        shader.set_texture("material.aoMap", self.ao.view, self.ao.sampler);
    }
}
