//! Mesh primitives and GPU mesh buffers
//!
//! Geometry is generated on the CPU as [`MeshData`], then uploaded once
//! into vertex/index buffers. The three built-in primitives cover the demo
//! scenes and the baker: a unit cube for cube map capture and the sky, a
//! fullscreen-style quad for the BRDF LUT and deferred lighting, and a
//! UV sphere for PBR material spheres.

use std::cell::Cell;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::gpu::{
    BufferDescriptor, BufferHandle, BufferUsage, Gpu, IndexFormat, PrimitiveTopology,
    VertexAttribute, VertexBufferLayout, VertexFormat,
};

pub const SPHERE_SEGMENTS: u32 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            attributes: vec![
                VertexAttribute {
                    location: 0,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: 1,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
                VertexAttribute {
                    location: 2,
                    format: VertexFormat::Float32x2,
                    offset: 24,
                },
            ],
        }
    }
}

/// CPU-side geometry
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: PrimitiveTopology,
}

impl MeshData {
    /// Unit cube centered at the origin, 36 vertices, outward normals.
    /// Capture and sky passes draw it with culling disabled and sample by
    /// direction, so winding never matters for them.
    pub fn cube() -> Self {
        struct Face {
            normal: Vec3,
            tangent: Vec3,
            bitangent: Vec3,
        }
        let faces = [
            Face { normal: Vec3::X, tangent: Vec3::NEG_Z, bitangent: Vec3::Y },
            Face { normal: Vec3::NEG_X, tangent: Vec3::Z, bitangent: Vec3::Y },
            Face { normal: Vec3::Y, tangent: Vec3::X, bitangent: Vec3::NEG_Z },
            Face { normal: Vec3::NEG_Y, tangent: Vec3::X, bitangent: Vec3::Z },
            Face { normal: Vec3::Z, tangent: Vec3::X, bitangent: Vec3::Y },
            Face { normal: Vec3::NEG_Z, tangent: Vec3::NEG_X, bitangent: Vec3::Y },
        ];

        let mut vertices = Vec::with_capacity(36);
        for face in &faces {
            let corner = |u: f32, v: f32| Vertex {
                position: (face.normal + face.tangent * u + face.bitangent * v).to_array(),
                normal: face.normal.to_array(),
                uv: [(u + 1.0) * 0.5, (v + 1.0) * 0.5],
            };
            let (bl, br, tr, tl) = (
                corner(-1.0, -1.0),
                corner(1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, 1.0),
            );
            vertices.extend_from_slice(&[bl, br, tr, tr, tl, bl]);
        }

        Self {
            vertices,
            indices: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
        }
    }

    /// Fullscreen quad in clip space, drawn as a 4-vertex strip.
    pub fn quad() -> Self {
        let vertices = vec![
            Vertex { position: [-1.0, 1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 1.0] },
            Vertex { position: [-1.0, -1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0] },
            Vertex { position: [1.0, 1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [1.0, 1.0] },
            Vertex { position: [1.0, -1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [1.0, 0.0] },
        ];
        Self {
            vertices,
            indices: Vec::new(),
            topology: PrimitiveTopology::TriangleStrip,
        }
    }

    /// Unit UV sphere as one long triangle strip. Rows alternate direction
    /// so consecutive rows connect without degenerate triangles.
    pub fn sphere() -> Self {
        let x_segments = SPHERE_SEGMENTS;
        let y_segments = SPHERE_SEGMENTS;

        let mut vertices = Vec::with_capacity(((x_segments + 1) * (y_segments + 1)) as usize);
        for y in 0..=y_segments {
            for x in 0..=x_segments {
                let u = x as f32 / x_segments as f32;
                let v = y as f32 / y_segments as f32;
                let position = Vec3::new(
                    (u * std::f32::consts::TAU).cos() * (v * std::f32::consts::PI).sin(),
                    (v * std::f32::consts::PI).cos(),
                    (u * std::f32::consts::TAU).sin() * (v * std::f32::consts::PI).sin(),
                );
                vertices.push(Vertex {
                    position: position.to_array(),
                    normal: position.to_array(),
                    uv: [u, v],
                });
            }
        }

        let mut indices = Vec::new();
        let mut odd_row = false;
        for y in 0..y_segments {
            if !odd_row {
                for x in 0..=x_segments {
                    indices.push(y * (x_segments + 1) + x);
                    indices.push((y + 1) * (x_segments + 1) + x);
                }
            } else {
                for x in (0..=x_segments).rev() {
                    indices.push((y + 1) * (x_segments + 1) + x);
                    indices.push(y * (x_segments + 1) + x);
                }
            }
            odd_row = !odd_row;
        }

        Self {
            vertices,
            indices,
            topology: PrimitiveTopology::TriangleStrip,
        }
    }
}

/// A draw only goes through when the bound pipeline assembles the same
/// primitive kind the mesh was built with. Strip geometry fed to a list
/// pipeline would render garbage without any validation error.
fn topology_matches(mesh: PrimitiveTopology, pipeline: Option<PrimitiveTopology>) -> bool {
    pipeline.map_or(true, |p| p == mesh)
}

/// Geometry uploaded to the GPU
pub struct Mesh {
    vertex_buffer: BufferHandle,
    index_buffer: Option<BufferHandle>,
    vertex_count: u32,
    index_count: u32,
    topology: PrimitiveTopology,
    warned: Cell<bool>,
}

impl Mesh {
    pub fn upload(gpu: &mut Gpu, label: &str, data: &MeshData) -> Self {
        let vertex_buffer = gpu.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{label} vertices")),
                size: 0,
                usage: BufferUsage::VERTEX,
            },
            bytemuck::cast_slice(&data.vertices),
        );
        let index_buffer = (!data.indices.is_empty()).then(|| {
            gpu.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{label} indices")),
                    size: 0,
                    usage: BufferUsage::INDEX,
                },
                bytemuck::cast_slice(&data.indices),
            )
        });
        Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
            topology: data.topology,
            warned: Cell::new(false),
        }
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Issue buffer binds and the draw call on the open render pass.
    /// Skipped when the bound pipeline assembles a different primitive
    /// topology than this mesh carries.
    pub fn draw(&self, gpu: &mut Gpu) {
        if !topology_matches(self.topology, gpu.current_topology()) {
            if !self.warned.replace(true) {
                log::warn!(
                    "mesh built as {:?} drawn through a {:?} pipeline; draws skipped",
                    self.topology,
                    gpu.current_topology()
                );
            }
            return;
        }
        gpu.set_vertex_buffer(0, self.vertex_buffer);
        match self.index_buffer {
            Some(index_buffer) => {
                gpu.set_index_buffer(index_buffer, IndexFormat::Uint32);
                gpu.draw_indexed(0..self.index_count);
            }
            None => gpu.draw(0..self.vertex_count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_36_vertices_with_unit_normals() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 36);
        assert!(cube.indices.is_empty());
        for v in &cube.vertices {
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-6);
            // every corner touches the unit cube surface
            let p = Vec3::from_array(v.position);
            assert_eq!(p.abs().max_element(), 1.0);
        }
    }

    #[test]
    fn quad_is_a_four_vertex_strip() {
        let quad = MeshData::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert_eq!(quad.topology, PrimitiveTopology::TriangleStrip);
    }

    #[test]
    fn sphere_lies_on_the_unit_sphere() {
        let sphere = MeshData::sphere();
        assert_eq!(
            sphere.vertices.len(),
            ((SPHERE_SEGMENTS + 1) * (SPHERE_SEGMENTS + 1)) as usize
        );
        for v in &sphere.vertices {
            let p = Vec3::from_array(v.position);
            assert!((p.length() - 1.0).abs() < 1e-4);
            assert_eq!(v.position, v.normal);
        }
    }

    #[test]
    fn draws_require_a_matching_pipeline_topology() {
        use PrimitiveTopology::{TriangleList, TriangleStrip};
        assert!(topology_matches(TriangleList, Some(TriangleList)));
        assert!(topology_matches(TriangleStrip, Some(TriangleStrip)));
        assert!(!topology_matches(TriangleList, Some(TriangleStrip)));
        assert!(!topology_matches(TriangleStrip, Some(TriangleList)));
        // no pipeline set yet; nothing to check against
        assert!(topology_matches(TriangleStrip, None));
    }

    #[test]
    fn sphere_strip_indices_stay_in_bounds() {
        let sphere = MeshData::sphere();
        let expected = (SPHERE_SEGMENTS * (SPHERE_SEGMENTS + 1) * 2) as usize;
        assert_eq!(sphere.indices.len(), expected);
        let max = *sphere.indices.iter().max().unwrap() as usize;
        assert!(max < sphere.vertices.len());
    }
}
