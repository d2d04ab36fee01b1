//! Shader programs with named uniforms and texture slots
//!
//! A [`ShaderProgram`] couples a render pipeline with a CPU staging block
//! for its uniform struct and a list of named texture slots. Render
//! commands address uniforms by the names the shaders use
//! (`"material.albedoMap"`, `"lightPositions[0]"`) instead of raw offsets.
//!
//! A program whose pipeline failed to build stays usable as a no-op: sets
//! are accepted, `bind` does nothing, and the failure is logged once at
//! creation. Rendering degrades instead of aborting.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use glam::{Mat3, Mat4, Vec3};

use crate::gpu::{
    BindGroupEntry, BindGroupHandle, BindGroupLayoutEntry, BindGroupLayoutHandle, BindingType,
    BufferDescriptor, BufferHandle, BufferUsage, ColorTargetState, CullMode, DepthStencilState,
    FallbackBindings, Gpu, PrimitiveTopology, RenderPipelineDescriptor, RenderPipelineHandle,
    SamplerHandle, TextureViewHandle, VertexBufferLayout, ViewDimension,
    UNIFORM_OFFSET_ALIGNMENT,
};

/// Draws one program can issue per frame before the uniform ring wraps
const UNIFORM_RING_SLOTS: u64 = 256;

/// Uniform value type, laid out per std140 rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Int,
    Bool,
    Vec3,
    Mat3,
    Mat4,
}

impl UniformType {
    fn align(&self) -> u64 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Bool => 4,
            UniformType::Vec3 | UniformType::Mat3 | UniformType::Mat4 => 16,
        }
    }

    fn size(&self) -> u64 {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Bool => 4,
            UniformType::Vec3 => 12,
            // three column vectors, each padded to vec4
            UniformType::Mat3 => 48,
            UniformType::Mat4 => 64,
        }
    }

    /// Element stride inside an array. std140 rounds every array element up
    /// to vec4 alignment.
    fn array_stride(&self) -> u64 {
        let size = self.size();
        size.div_ceil(16) * 16
    }
}

/// Offsets of named uniforms inside one uniform buffer
#[derive(Debug, Clone, Default)]
pub struct UniformLayout {
    entries: HashMap<String, (u64, UniformType)>,
    size: u64,
}

impl UniformLayout {
    pub fn builder() -> UniformLayoutBuilder {
        UniformLayoutBuilder::default()
    }

    pub fn offset_of(&self, name: &str) -> Option<(u64, UniformType)> {
        self.entries.get(name).copied()
    }

    /// Buffer size, rounded up to a 16-byte boundary
    pub fn size(&self) -> u64 {
        self.size.div_ceil(16) * 16
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct UniformLayoutBuilder {
    entries: HashMap<String, (u64, UniformType)>,
    cursor: u64,
}

impl UniformLayoutBuilder {
    pub fn with(mut self, name: &str, ty: UniformType) -> Self {
        let offset = self.cursor.div_ceil(ty.align()) * ty.align();
        self.entries.insert(name.to_string(), (offset, ty));
        self.cursor = offset + ty.size();
        self
    }

    /// Register `name[0]` .. `name[count-1]` with std140 array strides.
    pub fn with_array(mut self, name: &str, ty: UniformType, count: usize) -> Self {
        let stride = ty.array_stride();
        let base = self.cursor.div_ceil(16) * 16;
        for i in 0..count {
            let offset = base + stride * i as u64;
            self.entries
                .insert(format!("{name}[{i}]"), (offset, ty));
        }
        self.cursor = base + stride * count as u64;
        self
    }

    pub fn build(self) -> UniformLayout {
        UniformLayout {
            entries: self.entries,
            size: self.cursor,
        }
    }
}

/// Named texture binding slot
#[derive(Debug, Clone)]
pub struct TextureSlot {
    pub name: String,
    pub dimension: ViewDimension,
}

impl TextureSlot {
    pub fn d2(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension: ViewDimension::D2,
        }
    }

    pub fn cube(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dimension: ViewDimension::Cube,
        }
    }
}

pub struct ShaderProgramDescriptor {
    pub label: String,
    pub shader_source: String,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
    pub uniforms: UniformLayout,
    pub texture_slots: Vec<TextureSlot>,
}

struct GpuResources {
    pipeline: RenderPipelineHandle,
    uniform_buffer: Option<BufferHandle>,
    uniform_group: Option<BindGroupHandle>,
    /// byte stride between ring slots, a multiple of the offset alignment
    uniform_stride: u64,
    texture_group_layout: Option<BindGroupLayoutHandle>,
}

struct ProgramState {
    staging: Vec<u8>,
    bound_textures: Vec<Option<(TextureViewHandle, SamplerHandle)>>,
    /// bind groups keyed by the exact texture/sampler combination, so a
    /// program drawing several materials reuses groups across frames
    texture_groups: HashMap<Vec<(TextureViewHandle, SamplerHandle)>, BindGroupHandle>,
    ring_cursor: u64,
    warned: HashSet<String>,
}

/// A pipeline plus the uniform and texture state render commands feed it
pub struct ShaderProgram {
    label: String,
    layout: UniformLayout,
    slots: Vec<TextureSlot>,
    gpu_resources: Option<GpuResources>,
    fallback: Option<FallbackBindings>,
    state: RefCell<ProgramState>,
}

impl ShaderProgram {
    /// Build the pipeline and its bind group layouts. A pipeline that fails
    /// validation yields a degraded program rather than an error; the caller
    /// keeps going with a program that draws nothing.
    ///
    /// Group 0 holds the uniform buffer, group 1 holds texture/sampler pairs
    /// in slot order (texture at binding 2*i, sampler at 2*i+1). `fallback`
    /// fills slots no command has set yet, matched to each slot's dimension.
    pub fn new(gpu: &mut Gpu, desc: ShaderProgramDescriptor, fallback: FallbackBindings) -> Self {
        let mut bind_group_layouts = Vec::new();

        let uniform_stride = desc
            .uniforms
            .size()
            .div_ceil(UNIFORM_OFFSET_ALIGNMENT)
            * UNIFORM_OFFSET_ALIGNMENT;
        let uniform_buffer = if desc.uniforms.is_empty() {
            None
        } else {
            Some(gpu.create_buffer(&BufferDescriptor {
                label: Some(format!("{} uniform ring", desc.label)),
                size: uniform_stride * UNIFORM_RING_SLOTS,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            }))
        };
        let uniform_group_layout = uniform_buffer.map(|_| {
            gpu.create_bind_group_layout(
                &format!("{} uniform layout", desc.label),
                &[BindGroupLayoutEntry {
                    binding: 0,
                    ty: BindingType::UniformBuffer,
                }],
            )
        });
        if let Some(layout) = uniform_group_layout {
            bind_group_layouts.push(layout);
        }

        let texture_group_layout = if desc.texture_slots.is_empty() {
            None
        } else {
            let mut entries = Vec::new();
            for (i, slot) in desc.texture_slots.iter().enumerate() {
                entries.push(BindGroupLayoutEntry {
                    binding: 2 * i as u32,
                    ty: match slot.dimension {
                        ViewDimension::D2 => BindingType::Texture2d,
                        ViewDimension::Cube => BindingType::TextureCube,
                    },
                });
                entries.push(BindGroupLayoutEntry {
                    binding: 2 * i as u32 + 1,
                    ty: BindingType::Sampler,
                });
            }
            Some(gpu.create_bind_group_layout(&format!("{} texture layout", desc.label), &entries))
        };
        if let Some(layout) = texture_group_layout {
            bind_group_layouts.push(layout);
        }

        let pipeline = gpu.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(desc.label.clone()),
            shader_source: desc.shader_source,
            vertex_layouts: desc.vertex_layouts,
            bind_group_layouts,
            topology: desc.topology,
            cull_mode: desc.cull_mode,
            depth_stencil: desc.depth_stencil,
            color_targets: desc.color_targets,
        });

        let gpu_resources = match pipeline {
            Ok(pipeline) => {
                let uniform_group = match (uniform_buffer, uniform_group_layout) {
                    (Some(buffer), Some(layout)) => gpu
                        .create_bind_group(
                            layout,
                            &[(
                                0,
                                BindGroupEntry::Buffer {
                                    buffer,
                                    offset: 0,
                                    size: Some(desc.uniforms.size()),
                                },
                            )],
                        )
                        .ok(),
                    _ => None,
                };
                Some(GpuResources {
                    pipeline,
                    uniform_buffer,
                    uniform_group,
                    uniform_stride,
                    texture_group_layout,
                })
            }
            Err(e) => {
                log::error!("shader '{}' failed to build, draws disabled: {}", desc.label, e);
                None
            }
        };

        let slot_count = desc.texture_slots.len();
        Self {
            label: desc.label,
            layout: desc.uniforms.clone(),
            slots: desc.texture_slots,
            gpu_resources,
            fallback: Some(fallback),
            state: RefCell::new(ProgramState {
                staging: vec![0; desc.uniforms.size() as usize],
                bound_textures: vec![None; slot_count],
                texture_groups: HashMap::new(),
                ring_cursor: 0,
                warned: HashSet::new(),
            }),
        }
    }

    /// A program with no pipeline behind it. Uniform sets still land in the
    /// staging block, binds are no-ops.
    pub fn degraded(label: &str, uniforms: UniformLayout, texture_slots: Vec<TextureSlot>) -> Self {
        let slot_count = texture_slots.len();
        Self {
            label: label.to_string(),
            layout: uniforms.clone(),
            slots: texture_slots,
            gpu_resources: None,
            fallback: None,
            state: RefCell::new(ProgramState {
                staging: vec![0; uniforms.size() as usize],
                bound_textures: vec![None; slot_count],
                texture_groups: HashMap::new(),
                ring_cursor: 0,
                warned: HashSet::new(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_degraded(&self) -> bool {
        self.gpu_resources.is_none()
    }

    fn write(&self, name: &str, expected: UniformType, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        match self.layout.offset_of(name) {
            Some((offset, ty)) if ty == expected => {
                let offset = offset as usize;
                state.staging[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
            Some(_) => {
                if state.warned.insert(name.to_string()) {
                    log::warn!("uniform '{}' in '{}' set with wrong type", name, self.label);
                }
            }
            None => {
                if state.warned.insert(name.to_string()) {
                    log::warn!("unknown uniform '{}' in '{}'", name, self.label);
                }
            }
        }
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.write(name, UniformType::Float, bytemuck::bytes_of(&value));
    }

    pub fn set_int(&self, name: &str, value: i32) {
        self.write(name, UniformType::Int, bytemuck::bytes_of(&value));
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.write(name, UniformType::Bool, bytemuck::bytes_of(&(value as i32)));
    }

    pub fn set_vec3(&self, name: &str, value: Vec3) {
        self.write(name, UniformType::Vec3, bytemuck::bytes_of(&value));
    }

    pub fn set_mat3(&self, name: &str, value: Mat3) {
        // each column padded to a vec4
        let cols = [value.x_axis, value.y_axis, value.z_axis];
        let mut padded = [0.0f32; 12];
        for (i, col) in cols.iter().enumerate() {
            padded[i * 4..i * 4 + 3].copy_from_slice(&col.to_array());
        }
        self.write(name, UniformType::Mat3, bytemuck::bytes_of(&padded));
    }

    pub fn set_mat4(&self, name: &str, value: Mat4) {
        self.write(name, UniformType::Mat4, bytemuck::bytes_of(&value));
    }

    /// Attach a texture to a named slot. Takes effect on the next `bind`.
    pub fn set_texture(&self, name: &str, view: TextureViewHandle, sampler: SamplerHandle) {
        let mut state = self.state.borrow_mut();
        match self.slots.iter().position(|s| s.name == name) {
            Some(index) => {
                state.bound_textures[index] = Some((view, sampler));
            }
            None => {
                if state.warned.insert(name.to_string()) {
                    log::warn!("unknown texture slot '{}' in '{}'", name, self.label);
                }
            }
        }
    }

    /// Raw staging block contents for a named uniform.
    pub fn uniform_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let (offset, ty) = self.layout.offset_of(name)?;
        let state = self.state.borrow();
        let offset = offset as usize;
        Some(state.staging[offset..offset + ty.size() as usize].to_vec())
    }

    /// Upload the staging block into the next uniform ring slot and set the
    /// pipeline and bind groups on the open pass. Every draw gets its own
    /// slot, so several draws through one program in one pass each keep
    /// their own uniform values.
    ///
    /// Returns false for a degraded program, which binds nothing.
    pub fn bind(&self, gpu: &mut Gpu) -> bool {
        let Some(resources) = &self.gpu_resources else {
            log::debug!("skipping draw with degraded shader '{}'", self.label);
            return false;
        };

        let mut state = self.state.borrow_mut();
        let mut group = 0;
        if let Some(buffer) = resources.uniform_buffer {
            let offset = state.ring_cursor * resources.uniform_stride;
            state.ring_cursor = (state.ring_cursor + 1) % UNIFORM_RING_SLOTS;
            gpu.write_buffer(buffer, offset, &state.staging);

            gpu.set_pipeline(resources.pipeline);
            if let Some(uniform_group) = resources.uniform_group {
                gpu.set_bind_group(group, uniform_group, vec![offset as u32]);
                group += 1;
            }
        } else {
            gpu.set_pipeline(resources.pipeline);
        }

        let texture_group = self.texture_group(gpu, resources, &mut state);
        if let Some(texture_group) = texture_group {
            gpu.set_bind_group(group, texture_group, vec![]);
        }
        true
    }

    fn texture_group(
        &self,
        gpu: &mut Gpu,
        resources: &GpuResources,
        state: &mut ProgramState,
    ) -> Option<BindGroupHandle> {
        let layout = resources.texture_group_layout?;
        let fallback = self.fallback?;

        let key: Vec<(TextureViewHandle, SamplerHandle)> = state
            .bound_textures
            .iter()
            .zip(&self.slots)
            .map(|(bound, slot)| bound.unwrap_or_else(|| fallback.binding_for(slot.dimension)))
            .collect();
        if let Some(group) = state.texture_groups.get(&key) {
            return Some(*group);
        }

        let mut entries = Vec::with_capacity(key.len() * 2);
        for (i, (view, sampler)) in key.iter().enumerate() {
            entries.push((2 * i as u32, BindGroupEntry::Texture(*view)));
            entries.push((2 * i as u32 + 1, BindGroupEntry::Sampler(*sampler)));
        }
        match gpu.create_bind_group(layout, &entries) {
            Ok(group) => {
                state.texture_groups.insert(key, group);
                Some(group)
            }
            Err(e) => {
                log::warn!("texture bind group for '{}' failed: {}", self.label, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_offsets() {
        let layout = UniformLayout::builder()
            .with("roughness", UniformType::Float)
            .with("camPos", UniformType::Vec3)
            .with("model", UniformType::Mat4)
            .with("normalMatrix", UniformType::Mat3)
            .build();

        assert_eq!(layout.offset_of("roughness"), Some((0, UniformType::Float)));
        // vec3 after a float aligns up to 16
        assert_eq!(layout.offset_of("camPos"), Some((16, UniformType::Vec3)));
        // mat4 starts after the vec3's 12 bytes, aligned to 16
        assert_eq!(layout.offset_of("model"), Some((32, UniformType::Mat4)));
        assert_eq!(
            layout.offset_of("normalMatrix"),
            Some((96, UniformType::Mat3))
        );
        assert_eq!(layout.size(), 144);
    }

    #[test]
    fn vec3_arrays_use_vec4_stride() {
        let layout = UniformLayout::builder()
            .with_array("lightPositions", UniformType::Vec3, 4)
            .with_array("lightColors", UniformType::Vec3, 4)
            .build();

        assert_eq!(
            layout.offset_of("lightPositions[0]"),
            Some((0, UniformType::Vec3))
        );
        assert_eq!(
            layout.offset_of("lightPositions[3]"),
            Some((48, UniformType::Vec3))
        );
        assert_eq!(
            layout.offset_of("lightColors[0]"),
            Some((64, UniformType::Vec3))
        );
        assert_eq!(layout.size(), 128);
    }

    #[test]
    fn sets_land_in_staging_block() {
        let layout = UniformLayout::builder()
            .with("roughness", UniformType::Float)
            .with("camPos", UniformType::Vec3)
            .build();
        let program = ShaderProgram::degraded("test", layout, vec![]);

        program.set_float("roughness", 0.75);
        program.set_vec3("camPos", Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(
            program.uniform_bytes("roughness").unwrap(),
            0.75f32.to_le_bytes()
        );
        assert_eq!(
            program.uniform_bytes("camPos").unwrap(),
            bytemuck::bytes_of(&Vec3::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn unknown_uniform_is_tolerated() {
        let layout = UniformLayout::builder()
            .with("roughness", UniformType::Float)
            .build();
        let program = ShaderProgram::degraded("test", layout, vec![]);

        // logs once, never panics
        program.set_float("doesNotExist", 1.0);
        program.set_float("doesNotExist", 2.0);
        assert!(program.uniform_bytes("doesNotExist").is_none());
    }

    #[test]
    fn degraded_program_reports_itself() {
        let program = ShaderProgram::degraded("broken", UniformLayout::default(), vec![]);
        assert!(program.is_degraded());
    }
}
