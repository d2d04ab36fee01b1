//! A drawable model: meshes plus the material they share

use glam::Mat4;

use crate::gpu::Gpu;
use crate::resources::material::Material;
use crate::resources::mesh::Mesh;
use crate::shader::ShaderProgram;

pub struct Model {
    name: String,
    meshes: Vec<Mesh>,
    material: Material,
    pub transform: Mat4,
}

impl Model {
    pub fn new(name: &str, meshes: Vec<Mesh>, material: Material) -> Self {
        Self {
            name: name.to_string(),
            meshes,
            material,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Set per-model uniforms and textures, bind, and draw every mesh.
    /// A degraded shader binds nothing and the model is skipped.
    pub fn draw(&self, shader: &ShaderProgram, gpu: &mut Gpu) {
        shader.set_mat4("model", self.transform);
        shader.set_mat3(
            "normalMatrix",
            glam::Mat3::from_mat4(self.transform.inverse().transpose()),
        );
        self.material.bind(shader);
        if !shader.bind(gpu) {
            return;
        }
        for mesh in &self.meshes {
            mesh.draw(gpu);
        }
    }
}
