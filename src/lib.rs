//! A physically based rendering demo engine over wgpu.
//!
//! The renderer is driven by depth-sorted queues of named render commands:
//! an init queue that runs once before the first frame and a render queue
//! that runs every frame. Scenes carry models, four point lights, and an
//! optional environment skybox whose image-based lighting textures are
//! baked up front from a single equirectangular HDR image.
//!
//! ```no_run
//! use pbr_renderer::passes;
//! use pbr_renderer::renderer::{PbrRenderer, RendererConfig};
//!
//! # fn main() -> Result<(), pbr_renderer::gpu::RenderError> {
//! let mut renderer = PbrRenderer::new(RendererConfig::default())?;
//! let fallback = renderer.fallback_binding();
//! let (init, render) = {
//!     let gpu = renderer.gpu();
//!     let mut gpu = gpu.borrow_mut();
//!     passes::forward_pbr_commands(&mut gpu, fallback)
//! };
//! renderer.add_init_command(init);
//! renderer.add_render_command(render);
//! renderer.run()
//! # }
//! ```

pub mod gpu;
pub mod passes;
pub mod queue;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod skybox;
pub mod window;

pub use queue::{RenderCommand, RenderQueue};
pub use renderer::{PbrRenderer, RenderContext, RendererConfig};
pub use scene::{Camera, Scene};
pub use skybox::Skybox;
