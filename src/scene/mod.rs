//! Scene contents: models, lights, and the environment skybox

pub mod camera;

pub use camera::Camera;

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::gpu::Gpu;
use crate::resources::Model;
use crate::skybox::Skybox;

pub const LIGHT_COUNT: usize = 4;

/// Everything the render commands draw: models, point lights, and an
/// optional environment skybox shared with the IBL baker.
pub struct Scene {
    name: String,
    skybox: Option<Rc<RefCell<Skybox>>>,
    models: Vec<Rc<Model>>,
    pub light_positions: [Vec3; LIGHT_COUNT],
    pub light_colors: [Vec3; LIGHT_COUNT],
}

impl Scene {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skybox: None,
            models: Vec::new(),
            light_positions: [
                Vec3::new(-10.0, 10.0, 10.0),
                Vec3::new(10.0, 10.0, 10.0),
                Vec3::new(-10.0, -10.0, 10.0),
                Vec3::new(10.0, -10.0, 10.0),
            ],
            light_colors: [Vec3::splat(300.0); LIGHT_COUNT],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_model(&mut self, model: Rc<Model>) {
        self.models.push(model);
    }

    pub fn models(&self) -> &[Rc<Model>] {
        &self.models
    }

    pub fn set_skybox(&mut self, skybox: Skybox) {
        self.skybox = Some(Rc::new(RefCell::new(skybox)));
    }

    /// Create the skybox and decode its HDR source. Baking is a separate
    /// step so callers control when the heavy GPU work happens.
    pub fn load_skybox(&mut self, gpu: &mut Gpu, hdr_path: &str) {
        let mut skybox = Skybox::new(gpu);
        skybox.load_hdr(gpu, hdr_path);
        self.set_skybox(skybox);
    }

    /// Run the IBL baking pipeline on the skybox, if there is one.
    pub fn bake(&mut self, gpu: &mut Gpu) {
        match &self.skybox {
            Some(skybox) => skybox.borrow_mut().bake(gpu),
            None => log::warn!("bake requested for scene '{}' without a skybox", self.name),
        }
    }

    pub fn set_skybox_projection(&self, projection: Mat4) {
        if let Some(skybox) = &self.skybox {
            skybox.borrow_mut().set_projection(projection);
        }
    }

    pub fn skybox(&self) -> Option<&Rc<RefCell<Skybox>>> {
        self.skybox.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lights_sit_on_the_near_plane() {
        let scene = Scene::new("test");
        assert_eq!(scene.light_positions.len(), LIGHT_COUNT);
        for position in scene.light_positions {
            assert_eq!(position.z, 10.0);
            assert_eq!(position.x.abs(), 10.0);
            assert_eq!(position.y.abs(), 10.0);
        }
        for color in scene.light_colors {
            assert_eq!(color, Vec3::splat(300.0));
        }
    }

    #[test]
    fn scene_starts_without_a_skybox() {
        let scene = Scene::new("empty");
        assert!(scene.skybox().is_none());
        assert!(scene.models().is_empty());
    }
}
