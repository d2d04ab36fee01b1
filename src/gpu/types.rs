//! Descriptor and state types shared by the GPU submission layer

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rg16Float,
    Depth32Float,
    Depth24PlusStencil8,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rg16Float
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8 => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const MAP_READ: Self = Self(1 << 0);
    pub const COPY_SRC: Self = Self(1 << 1);
    pub const COPY_DST: Self = Self(1 << 2);
    pub const INDEX: Self = Self(1 << 3);
    pub const VERTEX: Self = Self(1 << 4);
    pub const UNIFORM: Self = Self(1 << 5);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
///
/// Cube maps are textures with `array_layers == 6`; the prefiltered
/// environment map additionally carries a mip chain.
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            array_layers: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// View dimension for texture views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewDimension {
    D2,
    Cube,
}

/// Texture view descriptor
///
/// The IBL baker uses face views (`base_array_layer = face`,
/// `array_layer_count = 1`, one mip) as render attachments and cube views
/// (all six layers) for sampling.
#[derive(Debug, Clone)]
pub struct TextureViewDescriptor {
    pub label: Option<String>,
    pub dimension: ViewDimension,
    pub base_mip_level: u32,
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    pub array_layer_count: Option<u32>,
}

impl Default for TextureViewDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            dimension: ViewDimension::D2,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        }
    }
}

impl TextureViewDescriptor {
    /// View of the whole texture as a cube map
    pub fn cube(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            dimension: ViewDimension::Cube,
            ..Default::default()
        }
    }

    /// Single face of a cube map at one mip level, usable as a render target
    pub fn cube_face(label: &str, face: u32, mip: u32) -> Self {
        Self {
            label: Some(label.to_string()),
            dimension: ViewDimension::D2,
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: face,
            array_layer_count: Some(1),
        }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth/stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Stencil operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
}

/// Stencil face state, applied to both faces
#[derive(Debug, Clone, Copy)]
pub struct StencilState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub read_mask: u32,
    pub write_mask: u32,
}

impl StencilState {
    /// Geometry-pass configuration: always pass, tag covered pixels with the
    /// stencil reference.
    pub fn write_tag() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Replace,
            pass_op: StencilOperation::Replace,
            read_mask: 0xFF,
            write_mask: 0xFF,
        }
    }

    /// Lighting-pass configuration: shade only pixels the geometry pass
    /// tagged, never write.
    pub fn test_tag() -> Self {
        Self {
            compare: CompareFunction::Equal,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            read_mask: 0xFF,
            write_mask: 0x00,
        }
    }
}

/// Depth/stencil pipeline state
#[derive(Debug, Clone)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
    pub stencil: Option<StencilState>,
}

#[derive(Debug, Clone)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: bool,
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Sampler descriptor
#[derive(Debug, Clone)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: FilterMode::Linear,
            address_mode: AddressMode::ClampToEdge,
        }
    }
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Load operation for pass attachments
#[derive(Debug, Clone)]
pub enum LoadOp {
    Clear([f64; 4]),
    Load,
}

/// Color attachment for a render pass
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    pub view: super::TextureViewHandle,
    pub load_op: LoadOp,
}

/// Depth/stencil attachment for a render pass
#[derive(Debug, Clone)]
pub struct DepthStencilAttachment {
    pub view: super::TextureViewHandle,
    pub clear_depth: bool,
    pub clear_stencil: bool,
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_stencil_attachment: Option<DepthStencilAttachment>,
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }
}

/// CPU-tracked pipeline state shared by every render command.
///
/// wgpu has no ambient state the way GL does; this struct is the explicit
/// stand-in. Passes that change the viewport or stencil reference are
/// responsible for leaving it in the state the next pass expects, and the
/// IBL baker must restore the viewport to the window framebuffer size when
/// it finishes.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub viewport: Viewport,
    pub stencil_reference: u32,
}

impl PipelineState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            viewport: Viewport::new(width, height),
            stencil_reference: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_flags_combine() {
        let usage = TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT;
        assert!(usage.contains(TextureUsage::TEXTURE_BINDING));
        assert!(usage.contains(TextureUsage::RENDER_ATTACHMENT));
        assert!(!usage.contains(TextureUsage::COPY_SRC));
    }

    #[test]
    fn depth_formats() {
        assert!(TextureFormat::Depth24PlusStencil8.is_depth());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(!TextureFormat::Rgba16Float.is_depth());
    }

    #[test]
    fn cube_face_view_selects_one_layer_and_mip() {
        let view = TextureViewDescriptor::cube_face("prefilter face", 3, 2);
        assert_eq!(view.base_array_layer, 3);
        assert_eq!(view.array_layer_count, Some(1));
        assert_eq!(view.base_mip_level, 2);
        assert_eq!(view.mip_level_count, Some(1));
        assert_eq!(view.dimension, ViewDimension::D2);
    }

    #[test]
    fn pipeline_state_tracks_viewport() {
        let mut state = PipelineState::new(1280, 720);
        assert_eq!(state.viewport.dimensions(), (1280, 720));

        // A baking pass shrinks the viewport to the capture resolution...
        state.viewport = Viewport::new(32, 32);
        assert_eq!(state.viewport.dimensions(), (32, 32));

        // ...and restoration brings it back to the window framebuffer size.
        state.viewport = Viewport::new(1280, 720);
        assert_eq!(state.viewport.dimensions(), (1280, 720));
    }
}
