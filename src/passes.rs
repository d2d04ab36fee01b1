//! Built-in render command constructors
//!
//! Each function builds the shader program(s) for one rendering technique
//! and returns ready-to-queue commands. Queue depths follow the demo
//! convention: geometry at 1000, screen-space lighting at 2000, overlays
//! like light boxes at 3000.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat3, Mat4, Vec3};

use crate::gpu::{
    ColorAttachment, ColorTargetState, CompareFunction, CullMode, DepthStencilAttachment,
    DepthStencilState, FallbackBindings, Gpu, LoadOp, PrimitiveTopology, RenderPassDescriptor,
    StencilState,
};
use crate::queue::RenderCommand;
use crate::renderer::{RenderContext, WINDOW_DEPTH_FORMAT};
use crate::resources::gbuffer::{GBuffer, GBUFFER_COLOR_FORMAT, GBUFFER_DEPTH_FORMAT};
use crate::resources::material::{Material, MaterialPaths};
use crate::resources::mesh::{Mesh, MeshData, Vertex};
use crate::scene::LIGHT_COUNT;
use crate::shader::{
    ShaderProgram, ShaderProgramDescriptor, TextureSlot, UniformLayout, UniformLayoutBuilder,
    UniformType,
};

pub const DEPTH_GEOMETRY: i32 = 1000;
pub const DEPTH_LIGHTING: i32 = 2000;
pub const DEPTH_OVERLAY: i32 = 3000;

/// stencil value the geometry pass tags shaded pixels with
const GEOMETRY_STENCIL_TAG: u32 = 1;

fn material_slots() -> Vec<TextureSlot> {
    vec![
        TextureSlot::d2("material.albedoMap"),
        TextureSlot::d2("material.normalMap"),
        TextureSlot::d2("material.metallicMap"),
        TextureSlot::d2("material.roughnessMap"),
        TextureSlot::d2("material.aoMap"),
    ]
}

fn ibl_slots() -> Vec<TextureSlot> {
    vec![
        TextureSlot::cube("irradianceMap"),
        TextureSlot::cube("prefilterMap"),
        TextureSlot::d2("brdfLUT"),
    ]
}

fn transform_uniforms() -> UniformLayoutBuilder {
    UniformLayout::builder()
        .with("view", UniformType::Mat4)
        .with("projection", UniformType::Mat4)
        .with("model", UniformType::Mat4)
        .with("normalMatrix", UniformType::Mat3)
}

fn light_uniforms(builder: UniformLayoutBuilder) -> UniformLayoutBuilder {
    builder
        .with("camPos", UniformType::Vec3)
        .with_array("lightPositions", UniformType::Vec3, LIGHT_COUNT)
        .with_array("lightColors", UniformType::Vec3, LIGHT_COUNT)
}

fn set_lights(shader: &ShaderProgram, positions: &[Vec3], colors: &[Vec3]) {
    for (i, (position, color)) in positions.iter().zip(colors).enumerate() {
        shader.set_vec3(&format!("lightPositions[{i}]"), *position);
        shader.set_vec3(&format!("lightColors[{i}]"), *color);
    }
}

/// Bind the baked IBL textures if the skybox has them. Unbaked textures
/// are never bound; the slots keep their previous (or fallback) binding.
fn set_ibl_textures(shader: &ShaderProgram, ctx: &RenderContext) {
    let scene = ctx.scene.borrow();
    let Some(skybox) = scene.skybox() else {
        return;
    };
    let skybox = skybox.borrow();
    let sampler = skybox.sampler();
    if let Some(view) = skybox.irradiance_view() {
        shader.set_texture("irradianceMap", view, sampler);
    }
    if let Some(view) = skybox.prefilter_view() {
        shader.set_texture("prefilterMap", view, sampler);
    }
    if let Some(view) = skybox.brdf_lut_view() {
        shader.set_texture("brdfLUT", view, sampler);
    }
}

/// Forward PBR: an init command that fixes the projection and a render
/// command that draws every scene model plus the sky background.
pub fn forward_pbr_commands(
    gpu: &mut Gpu,
    fallback: FallbackBindings,
) -> (RenderCommand<RenderContext>, RenderCommand<RenderContext>) {
    let mut slots = material_slots();
    slots.extend(ibl_slots());
    let shader = Rc::new(ShaderProgram::new(
        gpu,
        ShaderProgramDescriptor {
            label: "pbr".to_string(),
            shader_source: include_str!("shaders/pbr.wgsl").to_string(),
            vertex_layouts: vec![Vertex::layout()],
            topology: PrimitiveTopology::TriangleStrip,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: WINDOW_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::LessEqual,
                stencil: None,
            }),
            color_targets: vec![ColorTargetState {
                format: gpu.swapchain_format(),
                blend: false,
            }],
            uniforms: light_uniforms(transform_uniforms()).build(),
            texture_slots: slots,
        },
        fallback,
    ));

    let light_sphere = Mesh::upload(gpu, "light sphere", &MeshData::sphere());
    let light_material = Material::load(gpu, &MaterialPaths::default());

    let init = RenderCommand::new(
        "pbr",
        DEPTH_GEOMETRY,
        shader.clone(),
        |shader, ctx: &mut RenderContext| {
            let projection = ctx.camera.borrow().projection_matrix(ctx.aspect());
            shader.set_mat4("projection", projection);
            ctx.scene.borrow().set_skybox_projection(projection);
        },
    );

    let render = RenderCommand::new(
        "pbr",
        DEPTH_GEOMETRY,
        shader,
        move |shader, ctx: &mut RenderContext| {
            let Some(frame) = ctx.frame else {
                log::warn!("pbr command executed outside a frame");
                return;
            };
            let view = {
                let camera = ctx.camera.borrow();
                shader.set_vec3("camPos", camera.position);
                camera.view_matrix()
            };
            shader.set_mat4("view", view);

            let scene = ctx.scene.borrow();
            set_lights(shader, &scene.light_positions, &scene.light_colors);
            set_ibl_textures(shader, ctx);

            let mut gpu = ctx.gpu.borrow_mut();
            gpu.begin_render_pass(&RenderPassDescriptor {
                label: Some("forward pbr".to_string()),
                color_attachments: vec![ColorAttachment {
                    view: frame.view,
                    load_op: LoadOp::Load,
                }],
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    view: ctx.window_depth,
                    clear_depth: false,
                    clear_stencil: false,
                }),
            });
            for model in scene.models() {
                model.draw(shader, &mut gpu);
            }
            // small spheres marking the light positions, lit like any surface
            for position in &scene.light_positions {
                let model = Mat4::from_translation(*position) * Mat4::from_scale(Vec3::splat(0.5));
                shader.set_mat4("model", model);
                shader.set_mat3("normalMatrix", Mat3::from_mat4(model.inverse().transpose()));
                light_material.bind(shader);
                if shader.bind(&mut gpu) {
                    light_sphere.draw(&mut gpu);
                }
            }
            if let Some(skybox) = scene.skybox() {
                skybox.borrow().draw(&mut gpu, view);
            }
            gpu.end_render_pass();
        },
    );

    (init, render)
}

/// The deferred technique's commands, sharing one G-buffer.
pub struct DeferredCommands {
    pub init: RenderCommand<RenderContext>,
    pub light_box_init: RenderCommand<RenderContext>,
    pub geometry: RenderCommand<RenderContext>,
    pub lighting: RenderCommand<RenderContext>,
    pub light_boxes: RenderCommand<RenderContext>,
}

/// Deferred shading: geometry into the G-buffer at 1000, stencil-masked
/// fullscreen lighting at 2000, light boxes and sky on top at 3000.
pub fn deferred_commands(
    gpu: &mut Gpu,
    fallback: FallbackBindings,
    width: u32,
    height: u32,
) -> DeferredCommands {
    let gbuffer = Rc::new(RefCell::new(GBuffer::new(gpu, width, height)));

    let geometry_shader = Rc::new(ShaderProgram::new(
        gpu,
        ShaderProgramDescriptor {
            label: "deferred geometry".to_string(),
            shader_source: include_str!("shaders/gbuffer_geometry.wgsl").to_string(),
            vertex_layouts: vec![Vertex::layout()],
            topology: PrimitiveTopology::TriangleStrip,
            cull_mode: CullMode::None,
            depth_stencil: Some(DepthStencilState {
                format: GBUFFER_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::LessEqual,
                stencil: Some(StencilState::write_tag()),
            }),
            color_targets: vec![
                ColorTargetState {
                    format: GBUFFER_COLOR_FORMAT,
                    blend: false,
                };
                3
            ],
            uniforms: transform_uniforms().build(),
            texture_slots: material_slots(),
        },
        fallback,
    ));

    let mut lighting_slots = vec![
        TextureSlot::d2("gPositionRoughness"),
        TextureSlot::d2("gNormalAo"),
        TextureSlot::d2("gAlbedoMetallic"),
    ];
    lighting_slots.extend(ibl_slots());
    let lighting_shader = Rc::new(ShaderProgram::new(
        gpu,
        ShaderProgramDescriptor {
            label: "deferred lighting".to_string(),
            shader_source: include_str!("shaders/deferred_lighting.wgsl").to_string(),
            vertex_layouts: vec![Vertex::layout()],
            topology: PrimitiveTopology::TriangleStrip,
            cull_mode: CullMode::None,
            // shade only where the geometry pass tagged; the quad itself
            // must not touch depth
            depth_stencil: Some(DepthStencilState {
                format: GBUFFER_DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: CompareFunction::Always,
                stencil: Some(StencilState::test_tag()),
            }),
            color_targets: vec![ColorTargetState {
                format: gpu.swapchain_format(),
                blend: false,
            }],
            uniforms: light_uniforms(UniformLayout::builder()).build(),
            texture_slots: lighting_slots,
        },
        fallback,
    ));

    let light_box_shader = Rc::new(ShaderProgram::new(
        gpu,
        ShaderProgramDescriptor {
            label: "light box".to_string(),
            shader_source: include_str!("shaders/light_box.wgsl").to_string(),
            vertex_layouts: vec![Vertex::layout()],
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            depth_stencil: Some(DepthStencilState {
                format: GBUFFER_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::LessEqual,
                stencil: None,
            }),
            color_targets: vec![ColorTargetState {
                format: gpu.swapchain_format(),
                blend: false,
            }],
            uniforms: UniformLayout::builder()
                .with("view", UniformType::Mat4)
                .with("projection", UniformType::Mat4)
                .with("model", UniformType::Mat4)
                .with("lightColor", UniformType::Vec3)
                .build(),
            texture_slots: vec![],
        },
        fallback,
    ));

    let quad = Rc::new(Mesh::upload(gpu, "lighting quad", &MeshData::quad()));
    let cube = Rc::new(Mesh::upload(gpu, "light box cube", &MeshData::cube()));

    let init = RenderCommand::new(
        "deferred",
        DEPTH_GEOMETRY,
        geometry_shader.clone(),
        |shader, ctx: &mut RenderContext| {
            let projection = ctx.camera.borrow().projection_matrix(ctx.aspect());
            shader.set_mat4("projection", projection);
            ctx.scene.borrow().set_skybox_projection(projection);
        },
    );

    let light_box_init = RenderCommand::new(
        "light_box",
        DEPTH_LIGHTING,
        light_box_shader.clone(),
        |shader, ctx: &mut RenderContext| {
            let projection = ctx.camera.borrow().projection_matrix(ctx.aspect());
            shader.set_mat4("projection", projection);
        },
    );

    let geometry = {
        let gbuffer = gbuffer.clone();
        RenderCommand::new(
            "geometry",
            DEPTH_GEOMETRY,
            geometry_shader,
            move |shader, ctx: &mut RenderContext| {
                if ctx.frame.is_none() {
                    log::warn!("geometry command executed outside a frame");
                    return;
                }
                shader.set_mat4("view", ctx.camera.borrow().view_matrix());

                let scene = ctx.scene.borrow();
                let mut gpu = ctx.gpu.borrow_mut();
                // the lighting and light box passes attach the depth target
                // next to swapchain-sized color targets, so the whole
                // G-buffer follows the surface size
                let (width, height) = gpu.surface_size();
                let mut gbuffer = gbuffer.borrow_mut();
                gbuffer.resize(&mut gpu, width, height);
                gpu.set_stencil_reference(GEOMETRY_STENCIL_TAG);
                gpu.begin_render_pass(&gbuffer.geometry_pass());
                for model in scene.models() {
                    model.draw(shader, &mut gpu);
                }
                gpu.end_render_pass();
            },
        )
    };

    let lighting = {
        let gbuffer = gbuffer.clone();
        RenderCommand::new(
            "lighting",
            DEPTH_LIGHTING,
            lighting_shader,
            move |shader, ctx: &mut RenderContext| {
                let Some(frame) = ctx.frame else {
                    log::warn!("lighting command executed outside a frame");
                    return;
                };
                shader.set_vec3("camPos", ctx.camera.borrow().position);
                {
                    let scene = ctx.scene.borrow();
                    set_lights(shader, &scene.light_positions, &scene.light_colors);
                }
                let gbuffer = gbuffer.borrow();
                shader.set_texture(
                    "gPositionRoughness",
                    gbuffer.position_roughness_view(),
                    gbuffer.sampler,
                );
                shader.set_texture("gNormalAo", gbuffer.normal_ao_view(), gbuffer.sampler);
                shader.set_texture(
                    "gAlbedoMetallic",
                    gbuffer.albedo_metallic_view(),
                    gbuffer.sampler,
                );
                set_ibl_textures(shader, ctx);

                let mut gpu = ctx.gpu.borrow_mut();
                gpu.set_stencil_reference(GEOMETRY_STENCIL_TAG);
                gpu.begin_render_pass(&RenderPassDescriptor {
                    label: Some("deferred lighting".to_string()),
                    color_attachments: vec![ColorAttachment {
                        view: frame.view,
                        load_op: LoadOp::Load,
                    }],
                    depth_stencil_attachment: Some(DepthStencilAttachment {
                        view: gbuffer.depth_view(),
                        clear_depth: false,
                        clear_stencil: false,
                    }),
                });
                if shader.bind(&mut gpu) {
                    quad.draw(&mut gpu);
                }
                gpu.end_render_pass();
            },
        )
    };

    let light_boxes = {
        let gbuffer = gbuffer.clone();
        RenderCommand::new(
            "light_box",
            DEPTH_OVERLAY,
            light_box_shader,
            move |shader, ctx: &mut RenderContext| {
                let Some(frame) = ctx.frame else {
                    log::warn!("light box command executed outside a frame");
                    return;
                };
                let view = ctx.camera.borrow().view_matrix();
                shader.set_mat4("view", view);

                let scene = ctx.scene.borrow();
                let gbuffer = gbuffer.borrow();
                let mut gpu = ctx.gpu.borrow_mut();
                gpu.begin_render_pass(&RenderPassDescriptor {
                    label: Some("light boxes".to_string()),
                    color_attachments: vec![ColorAttachment {
                        view: frame.view,
                        load_op: LoadOp::Load,
                    }],
                    depth_stencil_attachment: Some(DepthStencilAttachment {
                        view: gbuffer.depth_view(),
                        clear_depth: false,
                        clear_stencil: false,
                    }),
                });
                for (position, color) in scene
                    .light_positions
                    .iter()
                    .zip(scene.light_colors.iter())
                {
                    shader.set_mat4(
                        "model",
                        Mat4::from_translation(*position) * Mat4::from_scale(Vec3::splat(0.5)),
                    );
                    shader.set_vec3("lightColor", *color);
                    if shader.bind(&mut gpu) {
                        cube.draw(&mut gpu);
                    }
                }
                if let Some(skybox) = scene.skybox() {
                    skybox.borrow().draw(&mut gpu, view);
                }
                gpu.end_render_pass();
            },
        )
    };

    DeferredCommands {
        init,
        light_box_init,
        geometry,
        lighting,
        light_boxes,
    }
}
