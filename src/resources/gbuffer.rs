//! Deferred shading geometry buffer

use crate::gpu::{
    ColorAttachment, DepthStencilAttachment, Gpu, LoadOp, RenderPassDescriptor, SamplerDescriptor,
    SamplerHandle, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
    TextureViewDescriptor, TextureViewHandle,
};

pub const GBUFFER_COLOR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
pub const GBUFFER_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

struct Attachment {
    texture: TextureHandle,
    view: TextureViewHandle,
}

/// A rebuild only happens for a new non-degenerate extent.
fn should_resize(current: (u32, u32), requested: (u32, u32)) -> bool {
    requested.0 != 0 && requested.1 != 0 && current != requested
}

/// Three color targets plus a depth/stencil target at window resolution.
/// Layout: world position + roughness, world normal + ao, albedo + metallic.
pub struct GBuffer {
    position_roughness: Attachment,
    normal_ao: Attachment,
    albedo_metallic: Attachment,
    depth: Attachment,
    pub sampler: SamplerHandle,
    width: u32,
    height: u32,
}

impl GBuffer {
    fn color_attachment(gpu: &mut Gpu, label: &str, width: u32, height: u32) -> Attachment {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some(label.to_string()),
            width,
            height,
            format: GBUFFER_COLOR_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            ..Default::default()
        });
        let view = gpu
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap_or_else(|_| unreachable!("view of a texture created just above"));
        Attachment { texture, view }
    }

    fn depth_attachment(gpu: &mut Gpu, width: u32, height: u32) -> Attachment {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some("gbuffer depth".to_string()),
            width,
            height,
            format: GBUFFER_DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        });
        let view = gpu
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap_or_else(|_| unreachable!("view of a texture created just above"));
        Attachment { texture, view }
    }

    pub fn new(gpu: &mut Gpu, width: u32, height: u32) -> Self {
        let position_roughness =
            Self::color_attachment(gpu, "gbuffer position+roughness", width, height);
        let normal_ao = Self::color_attachment(gpu, "gbuffer normal+ao", width, height);
        let albedo_metallic = Self::color_attachment(gpu, "gbuffer albedo+metallic", width, height);
        let depth = Self::depth_attachment(gpu, width, height);

        let sampler = gpu.create_sampler(&SamplerDescriptor {
            label: Some("gbuffer sampler".to_string()),
            mag_filter: crate::gpu::FilterMode::Nearest,
            min_filter: crate::gpu::FilterMode::Nearest,
            mipmap_filter: crate::gpu::FilterMode::Nearest,
            ..Default::default()
        });

        log::info!("gbuffer ready at {width}x{height}");
        Self {
            position_roughness,
            normal_ao,
            albedo_metallic,
            depth,
            sampler,
            width,
            height,
        }
    }

    /// Rebuild the attachments at a new extent. Attaching the old depth
    /// target to a pass with swapchain-sized color targets would fail
    /// render pass validation after a window resize.
    pub fn resize(&mut self, gpu: &mut Gpu, width: u32, height: u32) {
        if !should_resize((self.width, self.height), (width, height)) {
            return;
        }
        for old in [
            &self.position_roughness,
            &self.normal_ao,
            &self.albedo_metallic,
            &self.depth,
        ] {
            gpu.destroy_texture(old.texture);
            gpu.destroy_texture_view(old.view);
        }
        self.position_roughness =
            Self::color_attachment(gpu, "gbuffer position+roughness", width, height);
        self.normal_ao = Self::color_attachment(gpu, "gbuffer normal+ao", width, height);
        self.albedo_metallic =
            Self::color_attachment(gpu, "gbuffer albedo+metallic", width, height);
        self.depth = Self::depth_attachment(gpu, width, height);
        self.width = width;
        self.height = height;
        log::info!("gbuffer resized to {width}x{height}");
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn position_roughness_view(&self) -> TextureViewHandle {
        self.position_roughness.view
    }

    pub fn normal_ao_view(&self) -> TextureViewHandle {
        self.normal_ao.view
    }

    pub fn albedo_metallic_view(&self) -> TextureViewHandle {
        self.albedo_metallic.view
    }

    pub fn depth_view(&self) -> TextureViewHandle {
        self.depth.view
    }

    /// Pass descriptor for the geometry pass: all targets cleared.
    pub fn geometry_pass(&self) -> RenderPassDescriptor {
        RenderPassDescriptor {
            label: Some("deferred geometry".to_string()),
            color_attachments: vec![
                ColorAttachment {
                    view: self.position_roughness.view,
                    load_op: LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
                },
                ColorAttachment {
                    view: self.normal_ao.view,
                    load_op: LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
                },
                ColorAttachment {
                    view: self.albedo_metallic.view,
                    load_op: LoadOp::Clear([0.0, 0.0, 0.0, 0.0]),
                },
            ],
            depth_stencil_attachment: Some(DepthStencilAttachment {
                view: self.depth.view,
                clear_depth: true,
                clear_stencil: true,
            }),
        }
    }

    pub fn release(self, gpu: &mut Gpu) {
        for attachment in [
            &self.position_roughness,
            &self.normal_ao,
            &self.albedo_metallic,
            &self.depth,
        ] {
            gpu.destroy_texture(attachment.texture);
            gpu.destroy_texture_view(attachment.view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_skips_same_and_degenerate_extents() {
        assert!(!should_resize((1280, 720), (1280, 720)));
        assert!(!should_resize((1280, 720), (0, 720)));
        assert!(!should_resize((1280, 720), (640, 0)));
        assert!(should_resize((1280, 720), (1920, 1080)));
        assert!(should_resize((1280, 720), (1280, 600)));
    }
}
