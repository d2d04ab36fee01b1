//! GPU resource handles and immediate-mode command submission over wgpu
//!
//! All GPU work in the renderer goes through [`Gpu`]: resource creation,
//! render pass recording, and frame presentation. Pass commands are buffered
//! per render pass and replayed on `end_render_pass`, which sidesteps the
//! borrow between `wgpu::RenderPass` and its encoder and lets render
//! commands drive the pass through plain `&mut Gpu` calls.

pub mod types;

pub use types::*;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use wgpu::util::DeviceExt;

/// GPU layer error type
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to initialize GPU: {0}")]
    InitializationFailed(String),
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("failed to acquire swapchain image: {0}")]
    AcquireImageFailed(String),
    #[error("failed to create shader module: {0}")]
    ShaderCreationFailed(String),
    #[error("failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("unknown resource handle: {0}")]
    UnknownHandle(&'static str),
    #[error("failed to read back framebuffer: {0}")]
    ReadbackFailed(String),
    #[error("failed to load image {path}: {reason}")]
    ImageLoadFailed { path: String, reason: String },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Required alignment for dynamic uniform buffer offsets
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u64);

/// Handle to a texture view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewHandle(u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(u64);

/// Handle to a render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineHandle(u64);

/// Handle to a bind group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(u64);

/// Handle to a bind group layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutHandle(u64);

/// Bindings used for texture slots no command has set. Bind group
/// validation requires the view dimension to match the layout entry, so
/// cube slots get their own 1x1x6 fallback instead of the 2D one.
#[derive(Debug, Clone, Copy)]
pub struct FallbackBindings {
    pub d2: TextureViewHandle,
    pub cube: TextureViewHandle,
    pub sampler: SamplerHandle,
}

impl FallbackBindings {
    pub fn binding_for(&self, dimension: ViewDimension) -> (TextureViewHandle, SamplerHandle) {
        match dimension {
            ViewDimension::D2 => (self.d2, self.sampler),
            ViewDimension::Cube => (self.cube, self.sampler),
        }
    }
}

/// Bind group entry
#[derive(Debug, Clone)]
pub enum BindGroupEntry {
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        size: Option<u64>,
    },
    Texture(TextureViewHandle),
    Sampler(SamplerHandle),
}

/// Binding type for bind group layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    UniformBuffer,
    Texture2d,
    TextureCube,
    Sampler,
}

/// Bind group layout entry; visible to both vertex and fragment stages
#[derive(Debug, Clone)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub ty: BindingType,
}

/// Render pipeline descriptor; `shader_source` is one WGSL module with
/// `vs_main`/`fs_main` entry points.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor {
    pub label: Option<String>,
    pub shader_source: String,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub bind_group_layouts: Vec<BindGroupLayoutHandle>,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<ColorTargetState>,
}

/// Swapchain target returned when a frame begins
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

/// Buffered render pass command, replayed on `end_render_pass`
#[derive(Clone)]
enum PassCommand {
    SetPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
        offsets: Vec<u32>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: BufferHandle,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    SetViewport(Viewport),
    SetStencilReference(u32),
    Draw {
        vertices: std::ops::Range<u32>,
    },
    DrawIndexed {
        indices: std::ops::Range<u32>,
    },
}

struct PendingPass {
    descriptor: RenderPassDescriptor,
    commands: Vec<PassCommand>,
}

/// The GPU context: device, queue, surface, resource registries, and the
/// explicit pipeline state shared by every render command.
pub struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,

    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
    texture_views: HashMap<u64, wgpu::TextureView>,
    samplers: HashMap<u64, wgpu::Sampler>,
    bind_group_layouts: HashMap<u64, wgpu::BindGroupLayout>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,
    render_pipelines: HashMap<u64, wgpu::RenderPipeline>,
    pipeline_topologies: HashMap<u64, PrimitiveTopology>,
    next_id: u64,

    encoder: Option<wgpu::CommandEncoder>,
    pending_pass: Option<PendingPass>,
    current_frame: Option<FrameTarget>,
    current_surface_texture: Option<wgpu::SurfaceTexture>,
    /// topology of the pipeline set on the open pass, for draw checks
    current_topology: Option<PrimitiveTopology>,

    /// Explicit stand-in for GL's ambient pipeline state. Every pass that
    /// begins without its own viewport call inherits this viewport.
    pub state: PipelineState,
}

impl Gpu {
    /// Create the GPU context for a window. This is the one place where
    /// failure aborts startup rather than degrading.
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> RenderResult<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(RenderError::NoAdapter)?;

        log::info!("using adapter: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pbr renderer device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::DeviceCreationFailed(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(caps.formats[0]);
        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let surface_config = wgpu::SurfaceConfiguration {
            // COPY_SRC so the render-test facade can read frames back
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format,
            width,
            height,
            present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &surface_config);

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            texture_views: HashMap::new(),
            samplers: HashMap::new(),
            bind_group_layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            render_pipelines: HashMap::new(),
            pipeline_topologies: HashMap::new(),
            next_id: 1,
            encoder: None,
            pending_pass: None,
            current_frame: None,
            current_surface_texture: None,
            current_topology: None,
            state: PipelineState::new(width, height),
        })
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    pub fn swapchain_format(&self) -> TextureFormat {
        match self.surface_config.format {
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb => TextureFormat::Rgba8UnormSrgb,
            _ => TextureFormat::Rgba8Unorm,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.state.viewport = Viewport::new(width, height);
    }

    // ---- frames -----------------------------------------------------------

    /// Acquire the next swapchain image and start recording a frame.
    pub fn begin_frame(&mut self) -> RenderResult<FrameTarget> {
        let surface_texture = self
            .surface
            .get_current_texture()
            .map_err(|e| RenderError::AcquireImageFailed(e.to_string()))?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.alloc_id();
        self.texture_views.insert(id, view);

        let target = FrameTarget {
            view: TextureViewHandle(id),
            width: self.surface_config.width,
            height: self.surface_config.height,
        };
        self.current_surface_texture = Some(surface_texture);
        self.current_frame = Some(target);
        self.ensure_encoder();
        Ok(target)
    }

    /// Submit recorded work and present the frame.
    pub fn end_frame(&mut self) {
        self.flush();
        if let Some(frame) = self.current_frame.take() {
            self.texture_views.remove(&frame.view.0);
        }
        if let Some(surface_texture) = self.current_surface_texture.take() {
            surface_texture.present();
        }
    }

    /// The swapchain target of the frame in flight, if any.
    pub fn current_frame(&self) -> Option<FrameTarget> {
        self.current_frame
    }

    fn ensure_encoder(&mut self) -> &mut wgpu::CommandEncoder {
        if self.encoder.is_none() {
            self.encoder = Some(self.device.create_command_encoder(
                &wgpu::CommandEncoderDescriptor {
                    label: Some("pbr renderer encoder"),
                },
            ));
        }
        self.encoder.as_mut().unwrap()
    }

    /// Submit all recorded commands without presenting. The IBL baker uses
    /// this between stages; it is also implied by `end_frame`.
    pub fn flush(&mut self) {
        if self.pending_pass.is_some() {
            log::warn!("flush with an open render pass; ending it");
            self.end_render_pass();
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    // ---- resources --------------------------------------------------------

    pub fn create_buffer(&mut self, desc: &BufferDescriptor) -> BufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: desc.label.as_deref(),
            size: desc.size,
            usage: convert_buffer_usage(desc.usage),
            mapped_at_creation: false,
        });
        let id = self.alloc_id();
        self.buffers.insert(id, buffer);
        BufferHandle(id)
    }

    pub fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BufferHandle {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: desc.label.as_deref(),
                contents: data,
                usage: convert_buffer_usage(desc.usage),
            });
        let id = self.alloc_id();
        self.buffers.insert(id, buffer);
        BufferHandle(id)
    }

    pub fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buf) = self.buffers.get(&buffer.0) {
            self.queue.write_buffer(buf, offset, data);
        } else {
            log::warn!("write_buffer on unknown buffer handle");
        }
    }

    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> TextureHandle {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_layers,
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(desc.format),
            usage: convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let id = self.alloc_id();
        self.textures.insert(id, texture);
        TextureHandle(id)
    }

    pub fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> RenderResult<TextureViewHandle> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or(RenderError::UnknownHandle("texture"))?;
        let view = tex.create_view(&wgpu::TextureViewDescriptor {
            label: desc.label.as_deref(),
            format: None,
            dimension: Some(match desc.dimension {
                ViewDimension::D2 => wgpu::TextureViewDimension::D2,
                ViewDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: desc.base_mip_level,
            mip_level_count: desc.mip_level_count,
            base_array_layer: desc.base_array_layer,
            array_layer_count: desc.array_layer_count,
        });
        let id = self.alloc_id();
        self.texture_views.insert(id, view);
        Ok(TextureViewHandle(id))
    }

    /// Upload pixel data into one mip of one layer of a texture.
    pub fn write_texture_layer(
        &mut self,
        texture: TextureHandle,
        data: &[u8],
        width: u32,
        height: u32,
        layer: u32,
        bytes_per_pixel: u32,
    ) {
        let Some(tex) = self.textures.get(&texture.0) else {
            log::warn!("write_texture on unknown texture handle");
            return;
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: tex,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    pub fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32, bytes_per_pixel: u32) {
        self.write_texture_layer(texture, data, width, height, 0, bytes_per_pixel);
    }

    pub fn create_sampler(&mut self, desc: &SamplerDescriptor) -> SamplerHandle {
        let address = match desc.address_mode {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: convert_filter(desc.mag_filter),
            min_filter: convert_filter(desc.min_filter),
            mipmap_filter: convert_filter(desc.mipmap_filter),
            ..Default::default()
        });
        let id = self.alloc_id();
        self.samplers.insert(id, sampler);
        SamplerHandle(id)
    }

    pub fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[BindGroupLayoutEntry],
    ) -> BindGroupLayoutHandle {
        let wgpu_entries: Vec<wgpu::BindGroupLayoutEntry> = entries
            .iter()
            .map(|e| wgpu::BindGroupLayoutEntry {
                binding: e.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: match e.ty {
                    // uniform bindings are always dynamic: shader programs
                    // slice per-draw uniforms out of one ring buffer
                    BindingType::UniformBuffer => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: None,
                    },
                    BindingType::Texture2d => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    BindingType::TextureCube => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    BindingType::Sampler => {
                        wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                    }
                },
                count: None,
            })
            .collect();

        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &wgpu_entries,
            });
        let id = self.alloc_id();
        self.bind_group_layouts.insert(id, layout);
        BindGroupLayoutHandle(id)
    }

    pub fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> RenderResult<BindGroupHandle> {
        let layout = self
            .bind_group_layouts
            .get(&layout.0)
            .ok_or(RenderError::UnknownHandle("bind group layout"))?;

        let mut wgpu_entries = Vec::with_capacity(entries.len());
        for (binding, entry) in entries {
            let resource = match entry {
                BindGroupEntry::Buffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let buf = self
                        .buffers
                        .get(&buffer.0)
                        .ok_or(RenderError::UnknownHandle("buffer"))?;
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: buf,
                        offset: *offset,
                        size: size.and_then(std::num::NonZeroU64::new),
                    })
                }
                BindGroupEntry::Texture(view) => {
                    let view = self
                        .texture_views
                        .get(&view.0)
                        .ok_or(RenderError::UnknownHandle("texture view"))?;
                    wgpu::BindingResource::TextureView(view)
                }
                BindGroupEntry::Sampler(sampler) => {
                    let sampler = self
                        .samplers
                        .get(&sampler.0)
                        .ok_or(RenderError::UnknownHandle("sampler"))?;
                    wgpu::BindingResource::Sampler(sampler)
                }
            };
            wgpu_entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &wgpu_entries,
        });
        let id = self.alloc_id();
        self.bind_groups.insert(id, bind_group);
        Ok(BindGroupHandle(id))
    }

    pub fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> RenderResult<RenderPipelineHandle> {
        // Validation errors in user shader source must degrade, not panic.
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: desc.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(desc.shader_source.as_str().into()),
            });

        let mut layouts = Vec::with_capacity(desc.bind_group_layouts.len());
        for handle in &desc.bind_group_layouts {
            layouts.push(
                self.bind_group_layouts
                    .get(&handle.0)
                    .ok_or(RenderError::UnknownHandle("bind group layout"))?,
            );
        }
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: desc.label.as_deref(),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let vertex_attributes: Vec<Vec<wgpu::VertexAttribute>> = desc
            .vertex_layouts
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|a| wgpu::VertexAttribute {
                        format: match a.format {
                            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
                            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
                            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
                        },
                        offset: a.offset,
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layouts
            .iter()
            .zip(vertex_attributes.iter())
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_targets
            .iter()
            .map(|t| {
                Some(wgpu::ColorTargetState {
                    format: convert_texture_format(t.format),
                    blend: t.blend.then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = desc.depth_stencil.as_ref().map(|ds| {
            let stencil_face = |s: &StencilState| wgpu::StencilFaceState {
                compare: convert_compare(s.compare),
                fail_op: convert_stencil_op(s.fail_op),
                depth_fail_op: convert_stencil_op(s.depth_fail_op),
                pass_op: convert_stencil_op(s.pass_op),
            };
            let stencil = match &ds.stencil {
                Some(s) => wgpu::StencilState {
                    front: stencil_face(s),
                    back: stencil_face(s),
                    read_mask: s.read_mask,
                    write_mask: s.write_mask,
                },
                None => wgpu::StencilState::default(),
            };
            wgpu::DepthStencilState {
                format: convert_texture_format(ds.format),
                depth_write_enabled: ds.depth_write_enabled,
                depth_compare: convert_compare(ds.depth_compare),
                stencil,
                bias: wgpu::DepthBiasState::default(),
            }
        });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    compilation_options: Default::default(),
                    buffers: &vertex_buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    compilation_options: Default::default(),
                    targets: &color_targets,
                }),
                primitive: wgpu::PrimitiveState {
                    topology: match desc.topology {
                        PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
                        PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
                    },
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: match desc.cull_mode {
                        CullMode::None => None,
                        CullMode::Front => Some(wgpu::Face::Front),
                        CullMode::Back => Some(wgpu::Face::Back),
                    },
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::PipelineCreationFailed(err.to_string()));
        }

        let id = self.alloc_id();
        self.render_pipelines.insert(id, pipeline);
        self.pipeline_topologies.insert(id, desc.topology);
        Ok(RenderPipelineHandle(id))
    }

    pub fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.destroy();
        }
    }

    /// Drop a view from the registry. Passes and bind groups built from it
    /// must not be used afterwards.
    pub fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        self.texture_views.remove(&view.0);
    }

    pub fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    // ---- render passes ----------------------------------------------------

    /// Begin buffering a render pass. Commands issued until
    /// `end_render_pass` are replayed in order against the real pass.
    pub fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if self.pending_pass.is_some() {
            log::warn!("begin_render_pass while a pass is already open; ending previous pass");
            self.end_render_pass();
        }
        self.current_topology = None;
        self.pending_pass = Some(PendingPass {
            descriptor: desc.clone(),
            commands: vec![
                // Every pass starts from the tracked pipeline state.
                PassCommand::SetViewport(self.state.viewport),
                PassCommand::SetStencilReference(self.state.stencil_reference),
            ],
        });
    }

    /// Replay the buffered commands into a real wgpu render pass.
    pub fn end_render_pass(&mut self) {
        let Some(pending) = self.pending_pass.take() else {
            log::warn!("end_render_pass without an open pass");
            return;
        };
        self.ensure_encoder();
        let encoder = self.encoder.as_mut().unwrap();

        let mut color_attachments = Vec::new();
        for attachment in &pending.descriptor.color_attachments {
            let Some(view) = self.texture_views.get(&attachment.view.0) else {
                log::warn!(
                    "render pass '{}' has a missing color attachment; pass skipped",
                    pending.descriptor.label.as_deref().unwrap_or("unnamed")
                );
                return;
            };
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match &attachment.load_op {
                        LoadOp::Clear(c) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: c[0],
                            g: c[1],
                            b: c[2],
                            a: c[3],
                        }),
                        LoadOp::Load => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
            }));
        }

        let depth_stencil_attachment = match &pending.descriptor.depth_stencil_attachment {
            Some(ds) => match self.texture_views.get(&ds.view.0) {
                Some(view) => Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if ds.clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if ds.clear_stencil {
                            wgpu::LoadOp::Clear(0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                None => {
                    log::warn!("render pass depth attachment missing; continuing without it");
                    None
                }
            },
            None => None,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: pending.descriptor.label.as_deref(),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for command in &pending.commands {
            match command {
                PassCommand::SetPipeline(handle) => {
                    if let Some(pipeline) = self.render_pipelines.get(&handle.0) {
                        rpass.set_pipeline(pipeline);
                    }
                }
                PassCommand::SetBindGroup {
                    index,
                    bind_group,
                    offsets,
                } => {
                    if let Some(bg) = self.bind_groups.get(&bind_group.0) {
                        rpass.set_bind_group(*index, bg, offsets);
                    }
                }
                PassCommand::SetVertexBuffer { slot, buffer } => {
                    if let Some(buf) = self.buffers.get(&buffer.0) {
                        rpass.set_vertex_buffer(*slot, buf.slice(..));
                    }
                }
                PassCommand::SetIndexBuffer { buffer, format } => {
                    if let Some(buf) = self.buffers.get(&buffer.0) {
                        rpass.set_index_buffer(
                            buf.slice(..),
                            match format {
                                IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                                IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
                            },
                        );
                    }
                }
                PassCommand::SetViewport(vp) => {
                    rpass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);
                }
                PassCommand::SetStencilReference(r) => {
                    rpass.set_stencil_reference(*r);
                }
                PassCommand::Draw { vertices } => {
                    rpass.draw(vertices.clone(), 0..1);
                }
                PassCommand::DrawIndexed { indices } => {
                    rpass.draw_indexed(indices.clone(), 0, 0..1);
                }
            }
        }
    }

    fn record(&mut self, command: PassCommand) {
        match &mut self.pending_pass {
            Some(pass) => pass.commands.push(command),
            None => log::warn!("pass command recorded outside a render pass; dropped"),
        }
    }

    pub fn set_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.current_topology = self.pipeline_topologies.get(&pipeline.0).copied();
        self.record(PassCommand::SetPipeline(pipeline));
    }

    /// Primitive topology of the pipeline set on the open pass, if any.
    pub fn current_topology(&self) -> Option<PrimitiveTopology> {
        self.current_topology
    }

    pub fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle, offsets: Vec<u32>) {
        self.record(PassCommand::SetBindGroup {
            index,
            bind_group,
            offsets,
        });
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.record(PassCommand::SetVertexBuffer { slot, buffer });
    }

    pub fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.record(PassCommand::SetIndexBuffer { buffer, format });
    }

    /// Update the tracked viewport; applies to the open pass if there is one,
    /// and to every subsequent pass until changed again.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
        if self.pending_pass.is_some() {
            self.record(PassCommand::SetViewport(viewport));
        }
    }

    /// Update the tracked stencil reference, same scoping as `set_viewport`.
    pub fn set_stencil_reference(&mut self, reference: u32) {
        self.state.stencil_reference = reference;
        if self.pending_pass.is_some() {
            self.record(PassCommand::SetStencilReference(reference));
        }
    }

    pub fn draw(&mut self, vertices: std::ops::Range<u32>) {
        self.record(PassCommand::Draw { vertices });
    }

    pub fn draw_indexed(&mut self, indices: std::ops::Range<u32>) {
        self.record(PassCommand::DrawIndexed { indices });
    }

    // ---- readback ---------------------------------------------------------

    /// Copy the frame in flight into host memory as tightly packed RGBA8.
    /// Must be called after the frame's passes have ended and before
    /// `end_frame` presents.
    pub fn read_framebuffer(&mut self) -> RenderResult<Vec<u8>> {
        if self.pending_pass.is_some() {
            self.end_render_pass();
        }
        self.ensure_encoder();
        let Some(surface_texture) = self.current_surface_texture.as_ref() else {
            return Err(RenderError::ReadbackFailed("no frame in flight".into()));
        };

        let width = self.surface_config.width;
        let height = self.surface_config.height;
        let bytes_per_row = (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("framebuffer readback"),
            size: (bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let Some(encoder) = self.encoder.as_mut() else {
            return Err(RenderError::ReadbackFailed("no command encoder".into()));
        };
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &surface_texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.flush();

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?
            .map_err(|e| RenderError::ReadbackFailed(e.to_string()))?;

        let swizzle_bgra = matches!(
            self.surface_config.format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        );
        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for row in 0..height {
            let start = (row * bytes_per_row) as usize;
            let end = start + (width * 4) as usize;
            pixels.extend_from_slice(&mapped[start..end]);
        }
        drop(mapped);
        buffer.unmap();

        if swizzle_bgra {
            for px in pixels.chunks_exact_mut(4) {
                px.swap(0, 2);
            }
        }
        Ok(pixels)
    }
}

fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
    }
}

fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();
    if usage.contains(TextureUsage::COPY_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    result
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();
    if usage.contains(BufferUsage::MAP_READ) {
        result |= wgpu::BufferUsages::MAP_READ;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    result
}

fn convert_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn convert_compare(func: CompareFunction) -> wgpu::CompareFunction {
    match func {
        CompareFunction::Never => wgpu::CompareFunction::Never,
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::Equal => wgpu::CompareFunction::Equal,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn convert_stencil_op(op: StencilOperation) -> wgpu::StencilOperation {
    match op {
        StencilOperation::Keep => wgpu::StencilOperation::Keep,
        StencilOperation::Zero => wgpu::StencilOperation::Zero,
        StencilOperation::Replace => wgpu::StencilOperation::Replace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_bindings_follow_slot_dimension() {
        let fallback = FallbackBindings {
            d2: TextureViewHandle(1),
            cube: TextureViewHandle(2),
            sampler: SamplerHandle(3),
        };
        assert_eq!(
            fallback.binding_for(ViewDimension::D2),
            (TextureViewHandle(1), SamplerHandle(3))
        );
        assert_eq!(
            fallback.binding_for(ViewDimension::Cube),
            (TextureViewHandle(2), SamplerHandle(3))
        );
    }
}
