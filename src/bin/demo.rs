//! Demo scene: a grid of spheres lit by four point lights, drawn through
//! the deferred pipeline with light boxes on top, plus an HDR environment
//! when one is supplied on the command line.

use std::rc::Rc;

use glam::{Mat4, Vec3};

use pbr_renderer::gpu::RenderResult;
use pbr_renderer::passes;
use pbr_renderer::renderer::{PbrRenderer, RendererConfig};
use pbr_renderer::resources::mesh::{Mesh, MeshData};
use pbr_renderer::resources::{Material, MaterialPaths, Model};
use pbr_renderer::scene::Scene;
use pbr_renderer::skybox::Skybox;

fn main() -> RenderResult<()> {
    env_logger::init();

    let hdr_path = std::env::args().nth(1);

    let mut renderer = PbrRenderer::new(RendererConfig {
        title: "pbr deferred demo".to_string(),
        ..Default::default()
    })?;
    let fallback = renderer.fallback_binding();
    let (width, height) = renderer.window_size();

    let mut scene = Scene::new("sphere grid");
    {
        let gpu = renderer.gpu();
        let mut gpu = gpu.borrow_mut();

        let sphere = MeshData::sphere();
        for row in 0..3 {
            for col in 0..3 {
                let mesh = Mesh::upload(&mut gpu, "sphere", &sphere);
                let material = Material::load(&mut gpu, &MaterialPaths::default());
                let translation = Vec3::new(
                    (col as f32 - 1.0) * 2.5,
                    (row as f32 - 1.0) * 2.5,
                    0.0,
                );
                scene.add_model(Rc::new(
                    Model::new(
                        &format!("sphere {row}x{col}"),
                        vec![mesh],
                        material,
                    )
                    .with_transform(Mat4::from_translation(translation)),
                ));
            }
        }

        match &hdr_path {
            Some(path) => scene.load_skybox(&mut gpu, path),
            None => {
                log::warn!("no HDR path given; rendering without an environment");
                scene.set_skybox(Skybox::new(&mut gpu));
            }
        }
        scene.bake(&mut gpu);
    }
    renderer.set_scene(scene);

    let commands = {
        let gpu = renderer.gpu();
        let mut gpu = gpu.borrow_mut();
        passes::deferred_commands(&mut gpu, fallback, width, height)
    };
    renderer.add_init_command(commands.init);
    renderer.add_init_command(commands.light_box_init);
    renderer.add_render_command(commands.geometry);
    renderer.add_render_command(commands.lighting);
    renderer.add_render_command(commands.light_boxes);

    renderer.run()
}
