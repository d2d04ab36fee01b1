//! Renderable resources: meshes, textures, materials, models, render targets

pub mod gbuffer;
pub mod material;
pub mod mesh;
pub mod model;
pub mod texture;

pub use gbuffer::GBuffer;
pub use material::{Material, MaterialPaths};
pub use mesh::{Mesh, MeshData, Vertex};
pub use model::Model;
pub use texture::{GpuTexture, TextureData};
