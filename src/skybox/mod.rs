//! Environment skybox and image-based-lighting baker
//!
//! The baking pipeline turns one equirectangular HDR image into the three
//! textures the PBR shaders sample:
//!
//!   1. the HDR image is projected onto a 512 cube map (six capture draws),
//!   2. the cube map gets a full mip chain (per-face downsample passes),
//!   3. a 32x32 irradiance cube map is convolved from it,
//!   4. a 128-base prefiltered cube map is rendered mip by mip, each mip at
//!      its own roughness,
//!   5. a 512x512 BRDF integration LUT is rendered with one quad draw.
//!
//! The LUT does not depend on the HDR image and is baked even when loading
//! failed. Every stage logs failures and leaves its output texture unset;
//! the PBR commands check for that and skip the bindings. After baking, the
//! viewport is restored to the current window framebuffer size.

use glam::{Mat4, Vec3};

use crate::gpu::{
    ColorAttachment, ColorTargetState, CompareFunction, CullMode, DepthStencilAttachment,
    DepthStencilState, FallbackBindings, FilterMode, Gpu, LoadOp, PrimitiveTopology,
    RenderPassDescriptor, SamplerDescriptor, SamplerHandle, TextureDescriptor, TextureFormat,
    TextureHandle, TextureUsage, TextureViewDescriptor, TextureViewHandle, Viewport,
};
use crate::resources::mesh::{Mesh, MeshData, Vertex};
use crate::resources::texture::{GpuTexture, TextureData};
use crate::shader::{ShaderProgram, ShaderProgramDescriptor, TextureSlot, UniformLayout, UniformType};

pub const ENV_CUBEMAP_SIZE: u32 = 512;
pub const IRRADIANCE_SIZE: u32 = 32;
pub const PREFILTER_SIZE: u32 = 128;
pub const PREFILTER_MIP_LEVELS: u32 = 5;
pub const BRDF_LUT_SIZE: u32 = 512;

/// Roughness assigned to one prefilter mip. Mip 0 is mirror-sharp, the last
/// mip is fully rough. A single-mip chain has nothing to interpolate and
/// stays at 0.0.
pub fn mip_roughness(mip: u32, max_mip_levels: u32) -> f32 {
    if max_mip_levels <= 1 {
        0.0
    } else {
        mip as f32 / (max_mip_levels - 1) as f32
    }
}

/// Edge length of a mip level, never below one texel.
pub fn mip_extent(base: u32, mip: u32) -> u32 {
    (base >> mip).max(1)
}

/// Mip count of a full chain for a square texture.
pub fn full_mip_chain(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

/// View matrices for the six cube map faces, +X -X +Y -Y +Z -Z. The up
/// vectors match the cube map face orientation convention, flipped for the
/// vertical faces.
pub fn capture_views() -> [Mat4; 6] {
    let eye = Vec3::ZERO;
    [
        Mat4::look_at_rh(eye, Vec3::X, Vec3::NEG_Y),
        Mat4::look_at_rh(eye, Vec3::NEG_X, Vec3::NEG_Y),
        Mat4::look_at_rh(eye, Vec3::Y, Vec3::Z),
        Mat4::look_at_rh(eye, Vec3::NEG_Y, Vec3::NEG_Z),
        Mat4::look_at_rh(eye, Vec3::Z, Vec3::NEG_Y),
        Mat4::look_at_rh(eye, Vec3::NEG_Z, Vec3::NEG_Y),
    ]
}

/// Capture projection: 90 degree vertical FOV at unit aspect, so six faces
/// tile the sphere exactly.
pub fn capture_projection() -> Mat4 {
    Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 10.0)
}

/// IEEE 754 binary32 to binary16, round to nearest even.
pub fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exp == 255 {
        // infinity or NaN; keep NaNs signaling a payload bit
        return sign | 0x7c00 | if mantissa != 0 { 0x0200 } else { 0 };
    }

    let unbiased = exp - 127;
    if unbiased > 15 {
        return sign | 0x7c00;
    }
    if unbiased >= -14 {
        let half_exp = ((unbiased + 15) as u16) << 10;
        let half_man = (mantissa >> 13) as u16;
        let round = mantissa & 0x1fff;
        let mut result = sign | half_exp | half_man;
        if round > 0x1000 || (round == 0x1000 && (half_man & 1) == 1) {
            result += 1;
        }
        result
    } else if unbiased >= -24 {
        // subnormal range
        let shift = (13 + (-14 - unbiased)) as u32;
        let full = mantissa | 0x0080_0000;
        let mut result = (full >> shift) as u16;
        let rem = full & ((1u32 << shift) - 1);
        let half = 1u32 << (shift - 1);
        if rem > half || (rem == half && (result & 1) == 1) {
            result += 1;
        }
        sign | result
    } else {
        sign
    }
}

struct CubeMap {
    texture: TextureHandle,
    view: TextureViewHandle,
}

/// Depth target reused across capture passes. Reallocated whenever a pass
/// needs a different extent, which happens once per prefilter mip.
struct CaptureTarget {
    texture: Option<TextureHandle>,
    view: Option<TextureViewHandle>,
    width: u32,
    height: u32,
}

impl CaptureTarget {
    fn new() -> Self {
        Self {
            texture: None,
            view: None,
            width: 0,
            height: 0,
        }
    }

    /// Forget the current allocation and hand back whatever must be
    /// destroyed. The next `ensure` always reallocates.
    fn retire(&mut self) -> (Option<TextureHandle>, Option<TextureViewHandle>) {
        self.width = 0;
        self.height = 0;
        (self.texture.take(), self.view.take())
    }

    fn ensure(&mut self, gpu: &mut Gpu, width: u32, height: u32) -> Option<TextureViewHandle> {
        if self.width != width || self.height != height {
            let (old_texture, old_view) = self.retire();
            if let Some(texture) = old_texture {
                gpu.destroy_texture(texture);
            }
            if let Some(view) = old_view {
                gpu.destroy_texture_view(view);
            }
            let texture = gpu.create_texture(&TextureDescriptor {
                label: Some("capture depth".to_string()),
                width,
                height,
                format: TextureFormat::Depth32Float,
                usage: TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            });
            let view = match gpu.create_texture_view(texture, &TextureViewDescriptor::default()) {
                Ok(view) => view,
                Err(e) => {
                    gpu.destroy_texture(texture);
                    log::error!("capture depth view failed: {e}");
                    return None;
                }
            };
            self.texture = Some(texture);
            self.view = Some(view);
            self.width = width;
            self.height = height;
        }
        self.view
    }
}

/// The environment skybox: holds the HDR source, the baked IBL textures,
/// and the shader programs for baking and for drawing the background.
pub struct Skybox {
    cube: Mesh,
    quad: Mesh,
    equirect_program: ShaderProgram,
    irradiance_program: ShaderProgram,
    prefilter_program: ShaderProgram,
    brdf_program: ShaderProgram,
    downsample_program: ShaderProgram,
    background_program: ShaderProgram,
    sampler: SamplerHandle,
    capture: CaptureTarget,
    hdr: Option<(TextureHandle, TextureViewHandle)>,
    env: Option<CubeMap>,
    irradiance: Option<CubeMap>,
    prefilter: Option<CubeMap>,
    brdf_lut: Option<(TextureHandle, TextureViewHandle)>,
    projection: Mat4,
}

impl Skybox {
    pub fn new(gpu: &mut Gpu) -> Self {
        let cube = Mesh::upload(gpu, "skybox cube", &MeshData::cube());
        let quad = Mesh::upload(gpu, "skybox quad", &MeshData::quad());

        let sampler = gpu.create_sampler(&SamplerDescriptor {
            label: Some("skybox sampler".to_string()),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            ..Default::default()
        });

        // fallback bindings for slots not yet set, per view dimension
        let white = TextureData::white();
        let fallback = FallbackBindings {
            d2: GpuTexture::create(gpu, "skybox fallback", &white, false).view,
            cube: GpuTexture::create_cube(gpu, "skybox fallback cube", &white).view,
            sampler,
        };

        let capture_uniforms = || {
            UniformLayout::builder()
                .with("view", UniformType::Mat4)
                .with("projection", UniformType::Mat4)
        };
        let capture_depth = Some(DepthStencilState {
            format: TextureFormat::Depth32Float,
            depth_write_enabled: true,
            depth_compare: CompareFunction::LessEqual,
            stencil: None,
        });
        let hdr_target = vec![ColorTargetState {
            format: TextureFormat::Rgba16Float,
            blend: false,
        }];

        let equirect_program = ShaderProgram::new(
            gpu,
            ShaderProgramDescriptor {
                label: "equirect_to_cubemap".to_string(),
                shader_source: include_str!("../shaders/equirect_to_cubemap.wgsl").to_string(),
                vertex_layouts: vec![Vertex::layout()],
                topology: PrimitiveTopology::TriangleList,
                cull_mode: CullMode::None,
                depth_stencil: capture_depth.clone(),
                color_targets: hdr_target.clone(),
                uniforms: capture_uniforms().build(),
                texture_slots: vec![TextureSlot::d2("equirectangularMap")],
            },
            fallback,
        );

        let irradiance_program = ShaderProgram::new(
            gpu,
            ShaderProgramDescriptor {
                label: "irradiance_convolution".to_string(),
                shader_source: include_str!("../shaders/irradiance_convolution.wgsl").to_string(),
                vertex_layouts: vec![Vertex::layout()],
                topology: PrimitiveTopology::TriangleList,
                cull_mode: CullMode::None,
                depth_stencil: capture_depth.clone(),
                color_targets: hdr_target.clone(),
                uniforms: capture_uniforms().build(),
                texture_slots: vec![TextureSlot::cube("environmentMap")],
            },
            fallback,
        );

        let prefilter_program = ShaderProgram::new(
            gpu,
            ShaderProgramDescriptor {
                label: "prefilter".to_string(),
                shader_source: include_str!("../shaders/prefilter.wgsl").to_string(),
                vertex_layouts: vec![Vertex::layout()],
                topology: PrimitiveTopology::TriangleList,
                cull_mode: CullMode::None,
                depth_stencil: capture_depth,
                color_targets: hdr_target.clone(),
                uniforms: capture_uniforms().with("roughness", UniformType::Float).build(),
                texture_slots: vec![TextureSlot::cube("environmentMap")],
            },
            fallback,
        );

        let brdf_program = ShaderProgram::new(
            gpu,
            ShaderProgramDescriptor {
                label: "brdf_lut".to_string(),
                shader_source: include_str!("../shaders/brdf_lut.wgsl").to_string(),
                vertex_layouts: vec![Vertex::layout()],
                topology: PrimitiveTopology::TriangleStrip,
                cull_mode: CullMode::None,
                depth_stencil: None,
                color_targets: vec![ColorTargetState {
                    format: TextureFormat::Rg16Float,
                    blend: false,
                }],
                uniforms: UniformLayout::default(),
                texture_slots: vec![],
            },
            fallback,
        );

        let downsample_program = ShaderProgram::new(
            gpu,
            ShaderProgramDescriptor {
                label: "mip_downsample".to_string(),
                shader_source: include_str!("../shaders/mip_downsample.wgsl").to_string(),
                vertex_layouts: vec![Vertex::layout()],
                topology: PrimitiveTopology::TriangleStrip,
                cull_mode: CullMode::None,
                depth_stencil: None,
                color_targets: hdr_target,
                uniforms: UniformLayout::default(),
                texture_slots: vec![TextureSlot::d2("source")],
            },
            fallback,
        );

        let background_program = ShaderProgram::new(
            gpu,
            ShaderProgramDescriptor {
                label: "background".to_string(),
                shader_source: include_str!("../shaders/background.wgsl").to_string(),
                vertex_layouts: vec![Vertex::layout()],
                topology: PrimitiveTopology::TriangleList,
                cull_mode: CullMode::None,
                // drawn last at depth 1.0; LessEqual lets it fill the far plane
                depth_stencil: Some(DepthStencilState {
                    format: TextureFormat::Depth24PlusStencil8,
                    depth_write_enabled: false,
                    depth_compare: CompareFunction::LessEqual,
                    stencil: None,
                }),
                color_targets: vec![ColorTargetState {
                    format: gpu.swapchain_format(),
                    blend: false,
                }],
                uniforms: capture_uniforms().build(),
                texture_slots: vec![TextureSlot::cube("environmentMap")],
            },
            fallback,
        );

        Self {
            cube,
            quad,
            equirect_program,
            irradiance_program,
            prefilter_program,
            brdf_program,
            downsample_program,
            background_program,
            sampler,
            capture: CaptureTarget::new(),
            hdr: None,
            env: None,
            irradiance: None,
            prefilter: None,
            brdf_lut: None,
            projection: Mat4::IDENTITY,
        }
    }

    /// Load the equirectangular HDR source. Decode failure is logged and
    /// leaves the skybox without a source; cube baking will then be skipped.
    pub fn load_hdr(&mut self, gpu: &mut Gpu, path: &str) {
        let image = match image::open(path) {
            Ok(image) => image.into_rgba32f(),
            Err(e) => {
                log::error!("failed to load HDR environment {path}: {e}");
                return;
            }
        };
        let (width, height) = image.dimensions();
        let halves: Vec<u16> = image.into_raw().iter().map(|&v| f32_to_f16_bits(v)).collect();

        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some(format!("hdr {path}")),
            width,
            height,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ..Default::default()
        });
        gpu.write_texture(texture, bytemuck::cast_slice(&halves), width, height, 8);
        match gpu.create_texture_view(texture, &TextureViewDescriptor::default()) {
            Ok(view) => {
                log::info!("loaded HDR environment {path} ({width}x{height})");
                self.hdr = Some((texture, view));
            }
            Err(e) => log::error!("failed to create HDR view for {path}: {e}"),
        }
    }

    pub fn has_environment(&self) -> bool {
        self.env.is_some()
    }

    pub fn irradiance_view(&self) -> Option<TextureViewHandle> {
        self.irradiance.as_ref().map(|c| c.view)
    }

    pub fn prefilter_view(&self) -> Option<TextureViewHandle> {
        self.prefilter.as_ref().map(|c| c.view)
    }

    pub fn brdf_lut_view(&self) -> Option<TextureViewHandle> {
        self.brdf_lut.map(|(_, view)| view)
    }

    pub fn sampler(&self) -> SamplerHandle {
        self.sampler
    }

    pub fn set_projection(&mut self, projection: Mat4) {
        self.projection = projection;
    }

    /// Run the full baking pipeline. The BRDF LUT is baked regardless of
    /// whether an HDR source is present.
    pub fn bake(&mut self, gpu: &mut Gpu) {
        if self.hdr.is_some() {
            self.bake_environment(gpu, ENV_CUBEMAP_SIZE);
            self.bake_irradiance(gpu, IRRADIANCE_SIZE);
            self.bake_prefilter(gpu, PREFILTER_SIZE, PREFILTER_MIP_LEVELS);
        } else {
            log::warn!("no HDR environment loaded; skipping cube map baking");
        }
        self.bake_brdf_lut(gpu, BRDF_LUT_SIZE);

        // hand the window back its viewport, size queried fresh in case the
        // window was resized while baking
        let (width, height) = gpu.surface_size();
        gpu.set_viewport(Viewport::new(width, height));
        gpu.flush();
    }

    fn create_cubemap(
        gpu: &mut Gpu,
        label: &str,
        size: u32,
        mip_levels: u32,
    ) -> Option<CubeMap> {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            width: size,
            height: size,
            array_layers: 6,
            mip_levels,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        });
        let view = gpu
            .create_texture_view(texture, &TextureViewDescriptor::cube(label))
            .ok()?;
        Some(CubeMap { texture, view })
    }

    /// One capture draw: render the unit cube into one face view through
    /// `program` at the given extent.
    fn capture_face(
        gpu: &mut Gpu,
        capture: &mut CaptureTarget,
        cube: &Mesh,
        program: &ShaderProgram,
        target: TextureViewHandle,
        face: usize,
        extent: u32,
    ) {
        let Some(depth_view) = capture.ensure(gpu, extent, extent) else {
            log::error!("capture depth target unavailable; face skipped");
            return;
        };
        program.set_mat4("view", capture_views()[face]);
        program.set_mat4("projection", capture_projection());

        gpu.set_viewport(Viewport::new(extent, extent));
        gpu.begin_render_pass(&RenderPassDescriptor {
            label: Some("cube capture".to_string()),
            color_attachments: vec![ColorAttachment {
                view: target,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: depth_view,
                clear_depth: true,
                clear_stencil: false,
            }),
        });
        if program.bind(gpu) {
            cube.draw(gpu);
        }
        gpu.end_render_pass();
    }

    /// Project the equirectangular HDR image onto a cube map, then build
    /// its mip chain.
    fn bake_environment(&mut self, gpu: &mut Gpu, size: u32) {
        let Some((_, hdr_view)) = self.hdr else {
            return;
        };
        let mip_levels = full_mip_chain(size);
        let Some(env) = Self::create_cubemap(gpu, "environment cubemap", size, mip_levels) else {
            log::error!("failed to create environment cube map");
            return;
        };
        let env_texture = env.texture;
        self.env = Some(env);

        self.equirect_program.set_texture("equirectangularMap", hdr_view, self.sampler);
        for face in 0..6 {
            let target = match gpu.create_texture_view(
                env_texture,
                &TextureViewDescriptor::cube_face("env face", face as u32, 0),
            ) {
                Ok(view) => view,
                Err(e) => {
                    log::error!("environment face view failed: {e}");
                    continue;
                }
            };
            Self::capture_face(
                gpu,
                &mut self.capture,
                &self.cube,
                &self.equirect_program,
                target,
                face,
                size,
            );
        }
        gpu.flush();

        self.generate_mips(gpu, env_texture, size, mip_levels);
        log::info!("environment cube map baked at {size} with {mip_levels} mips");
    }

    /// Downsample each face mip by mip, the render-pass analog of a
    /// full mip chain generation.
    fn generate_mips(&mut self, gpu: &mut Gpu, texture: TextureHandle, size: u32, mip_levels: u32) {
        for mip in 1..mip_levels {
            let extent = mip_extent(size, mip);
            for face in 0..6u32 {
                let source = gpu.create_texture_view(
                    texture,
                    &TextureViewDescriptor::cube_face("mip source", face, mip - 1),
                );
                let target = gpu.create_texture_view(
                    texture,
                    &TextureViewDescriptor::cube_face("mip target", face, mip),
                );
                let (Ok(source), Ok(target)) = (source, target) else {
                    log::error!("mip views failed at level {mip}; chain truncated");
                    return;
                };

                self.downsample_program.set_texture("source", source, self.sampler);
                gpu.set_viewport(Viewport::new(extent, extent));
                gpu.begin_render_pass(&RenderPassDescriptor {
                    label: Some("mip downsample".to_string()),
                    color_attachments: vec![ColorAttachment {
                        view: target,
                        load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                    }],
                    depth_stencil_attachment: None,
                });
                if self.downsample_program.bind(gpu) {
                    self.quad.draw(gpu);
                }
                gpu.end_render_pass();
            }
            gpu.flush();
        }
    }

    /// Convolve the environment into a small diffuse irradiance cube map.
    fn bake_irradiance(&mut self, gpu: &mut Gpu, size: u32) {
        let Some(env_view) = self.env.as_ref().map(|e| e.view) else {
            log::warn!("no environment cube map; skipping irradiance");
            return;
        };
        let Some(irradiance) = Self::create_cubemap(gpu, "irradiance map", size, 1) else {
            log::error!("failed to create irradiance map");
            return;
        };
        let texture = irradiance.texture;
        self.irradiance = Some(irradiance);

        self.irradiance_program.set_texture("environmentMap", env_view, self.sampler);
        for face in 0..6 {
            let target = match gpu.create_texture_view(
                texture,
                &TextureViewDescriptor::cube_face("irradiance face", face as u32, 0),
            ) {
                Ok(view) => view,
                Err(e) => {
                    log::error!("irradiance face view failed: {e}");
                    continue;
                }
            };
            Self::capture_face(
                gpu,
                &mut self.capture,
                &self.cube,
                &self.irradiance_program,
                target,
                face,
                size,
            );
        }
        gpu.flush();
        log::info!("irradiance map baked at {size}");
    }

    /// Render the prefiltered specular cube map, one roughness per mip.
    fn bake_prefilter(&mut self, gpu: &mut Gpu, size: u32, max_mip_levels: u32) {
        let Some(env_view) = self.env.as_ref().map(|e| e.view) else {
            log::warn!("no environment cube map; skipping prefilter");
            return;
        };
        let Some(prefilter) = Self::create_cubemap(gpu, "prefilter map", size, max_mip_levels)
        else {
            log::error!("failed to create prefilter map");
            return;
        };
        let texture = prefilter.texture;
        self.prefilter = Some(prefilter);

        self.prefilter_program.set_texture("environmentMap", env_view, self.sampler);
        for mip in 0..max_mip_levels {
            let extent = mip_extent(size, mip);
            self.prefilter_program
                .set_float("roughness", mip_roughness(mip, max_mip_levels));
            for face in 0..6 {
                let target = match gpu.create_texture_view(
                    texture,
                    &TextureViewDescriptor::cube_face("prefilter face", face as u32, mip),
                ) {
                    Ok(view) => view,
                    Err(e) => {
                        log::error!("prefilter face view failed: {e}");
                        continue;
                    }
                };
                Self::capture_face(
                    gpu,
                    &mut self.capture,
                    &self.cube,
                    &self.prefilter_program,
                    target,
                    face,
                    extent,
                );
            }
            gpu.flush();
        }
        log::info!("prefilter map baked at {size} with {max_mip_levels} mips");
    }

    /// Integrate the split-sum BRDF into a 2D lookup table. Independent of
    /// the environment stages.
    fn bake_brdf_lut(&mut self, gpu: &mut Gpu, size: u32) {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some("brdf lut".to_string()),
            width: size,
            height: size,
            format: TextureFormat::Rg16Float,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        });
        let view = match gpu.create_texture_view(texture, &TextureViewDescriptor::default()) {
            Ok(view) => view,
            Err(e) => {
                log::error!("BRDF LUT view failed: {e}");
                return;
            }
        };

        gpu.set_viewport(Viewport::new(size, size));
        gpu.begin_render_pass(&RenderPassDescriptor {
            label: Some("brdf lut".to_string()),
            color_attachments: vec![ColorAttachment {
                view,
                load_op: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
            }],
            depth_stencil_attachment: None,
        });
        if self.brdf_program.bind(gpu) {
            self.quad.draw(gpu);
        }
        gpu.end_render_pass();
        gpu.flush();

        self.brdf_lut = Some((texture, view));
        log::info!("BRDF LUT baked at {size}");
    }

    /// Draw the environment as the scene background. Call last in the
    /// frame, after opaque geometry.
    pub fn draw(&self, gpu: &mut Gpu, view: Mat4) {
        let Some(env) = &self.env else {
            log::debug!("skybox draw without a baked environment");
            return;
        };
        self.background_program.set_mat4("view", view);
        self.background_program.set_mat4("projection", self.projection);
        self.background_program
            .set_texture("environmentMap", env.view, self.sampler);
        if self.background_program.bind(gpu) {
            self.cube.draw(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefilter_mip_roughness_spans_zero_to_one() {
        let max = PREFILTER_MIP_LEVELS;
        let got: Vec<f32> = (0..max).map(|mip| mip_roughness(mip, max)).collect();
        assert_eq!(got, [0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn single_mip_chain_stays_sharp() {
        assert_eq!(mip_roughness(0, 1), 0.0);
        assert_eq!(mip_roughness(0, 0), 0.0);
    }

    #[test]
    fn mip_extents_floor_at_one_texel() {
        assert_eq!(mip_extent(128, 0), 128);
        assert_eq!(mip_extent(128, 1), 64);
        assert_eq!(mip_extent(128, 4), 8);
        assert_eq!(mip_extent(128, 9), 1);
        assert_eq!(mip_extent(1, 3), 1);
    }

    #[test]
    fn full_chain_counts_down_to_one() {
        assert_eq!(full_mip_chain(512), 10);
        assert_eq!(full_mip_chain(128), 8);
        assert_eq!(full_mip_chain(1), 1);
    }

    #[test]
    fn capture_views_cover_all_axes() {
        let views = capture_views();
        let forwards = [
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
        ];
        for (view, forward) in views.iter().zip(forwards) {
            // a point straight ahead lands on the camera's -Z axis
            let seen = view.transform_point3(forward);
            assert!(seen.z < 0.0, "face toward {forward:?} looks the wrong way");
            assert!(seen.x.abs() < 1e-6 && seen.y.abs() < 1e-6);
        }
    }

    #[test]
    fn capture_projection_is_square_90_degrees() {
        let proj = capture_projection();
        // unit aspect with a 90 degree FOV puts the frustum edge at 45
        // degrees, so x == z on the image plane edge
        let edge = proj.project_point3(Vec3::new(1.0, 0.0, -1.0));
        assert!((edge.x.abs() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn retired_capture_target_holds_no_stale_view() {
        let mut target = CaptureTarget::new();
        target.width = 64;
        target.height = 64;

        let (texture, view) = target.retire();
        // nothing was ever allocated, so nothing to destroy
        assert!(texture.is_none());
        assert!(view.is_none());
        // dimensions reset, so the next ensure reallocates instead of
        // returning a view of a destroyed texture
        assert_eq!((target.width, target.height), (0, 0));
        assert!(target.view.is_none());
    }

    #[test]
    fn f16_conversion_round_trips_common_values() {
        assert_eq!(f32_to_f16_bits(0.0), 0x0000);
        assert_eq!(f32_to_f16_bits(1.0), 0x3c00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xc000);
        assert_eq!(f32_to_f16_bits(0.5), 0x3800);
        assert_eq!(f32_to_f16_bits(65504.0), 0x7bff);
    }

    #[test]
    fn f16_conversion_saturates_and_flushes() {
        // above the representable range goes to infinity
        assert_eq!(f32_to_f16_bits(1e9), 0x7c00);
        assert_eq!(f32_to_f16_bits(-1e9), 0xfc00);
        // below the subnormal range goes to signed zero
        assert_eq!(f32_to_f16_bits(1e-10), 0x0000);
        assert_eq!(f32_to_f16_bits(-1e-10), 0x8000);
        assert_eq!(f32_to_f16_bits(f32::INFINITY), 0x7c00);
    }
}
