//! Window creation and event loop ownership

use std::sync::Arc;

use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::WindowBuilder;

use crate::gpu::{RenderError, RenderResult};

/// Wraps the winit window and holds the event loop until the renderer
/// takes it for the main loop or pumps it step by step.
pub struct Window {
    window: Arc<winit::window::Window>,
    event_loop: Option<EventLoop<()>>,
}

impl Window {
    pub fn new(width: u32, height: u32, title: &str) -> RenderResult<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(&event_loop)
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        Ok(Self {
            window: Arc::new(window),
            event_loop: Some(event_loop),
        })
    }

    pub fn winit_window(&self) -> Arc<winit::window::Window> {
        self.window.clone()
    }

    /// Current framebuffer size, queried fresh on every call.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width.max(1), size.height.max(1))
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Hand the event loop to the caller. Can only happen once.
    pub fn take_event_loop(&mut self) -> Option<EventLoop<()>> {
        self.event_loop.take()
    }

    /// Borrow the event loop for step-by-step pumping.
    pub fn event_loop_mut(&mut self) -> Option<&mut EventLoop<()>> {
        self.event_loop.as_mut()
    }
}
