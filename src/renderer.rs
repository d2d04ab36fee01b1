//! The renderer driver: window, GPU, scene, and the two command queues
//!
//! Startup failures here are fatal; everything past startup logs and
//! degrades. The init queue runs once, sorted, before the first frame. The
//! render queue is sorted at the same time and executed every frame in
//! storage order.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::EventLoopExtPumpEvents;

use crate::gpu::{
    ColorAttachment, DepthStencilAttachment, FallbackBindings, FrameTarget, Gpu, LoadOp,
    RenderError, RenderPassDescriptor, RenderResult, TextureDescriptor, TextureFormat,
    TextureHandle, TextureUsage, TextureViewDescriptor, TextureViewHandle,
};
use crate::queue::{RenderCommand, RenderQueue};
use crate::resources::texture::{GpuTexture, TextureData};
use crate::scene::{Camera, Scene};
use crate::window::Window;

/// Format of the depth/stencil target every swapchain pass shares
pub const WINDOW_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "pbr renderer".to_string(),
            vsync: true,
        }
    }
}

/// Everything a render command callback can reach
pub struct RenderContext {
    pub gpu: Rc<RefCell<Gpu>>,
    pub camera: Rc<RefCell<Camera>>,
    pub scene: Rc<RefCell<Scene>>,
    /// swapchain target, None while the init queue runs
    pub frame: Option<FrameTarget>,
    pub window_depth: TextureViewHandle,
    pub time: f32,
}

impl RenderContext {
    pub fn aspect(&self) -> f32 {
        let (width, height) = self.gpu.borrow().surface_size();
        width as f32 / height as f32
    }
}

pub struct PbrRenderer {
    window: Window,
    gpu: Rc<RefCell<Gpu>>,
    camera: Rc<RefCell<Camera>>,
    scene: Rc<RefCell<Scene>>,
    init_queue: RenderQueue<RenderContext>,
    render_queue: RenderQueue<RenderContext>,
    window_depth: (TextureHandle, TextureViewHandle),
    fallback: GpuTexture,
    fallback_cube: GpuTexture,
    initialized: bool,
    close_requested: bool,
    start: Instant,
    last_frame: Instant,
    dt: f32,
    frames: u32,
    fps_timer: Instant,
}

impl PbrRenderer {
    pub fn new(config: RendererConfig) -> RenderResult<Self> {
        let window = Window::new(config.width, config.height, &config.title)?;
        let mut gpu = Gpu::new(window.winit_window(), config.vsync)?;

        let (width, height) = window.framebuffer_size();
        let window_depth = Self::create_window_depth(&mut gpu, width, height)?;
        let fallback = GpuTexture::create(&mut gpu, "fallback white", &TextureData::white(), false);
        let fallback_cube =
            GpuTexture::create_cube(&mut gpu, "fallback white cube", &TextureData::white());

        log::info!("renderer ready, window {width}x{height}");
        let now = Instant::now();
        Ok(Self {
            window,
            gpu: Rc::new(RefCell::new(gpu)),
            camera: Rc::new(RefCell::new(Camera::new(glam::Vec3::new(0.0, 0.0, 12.0)))),
            scene: Rc::new(RefCell::new(Scene::new("default"))),
            init_queue: RenderQueue::new(),
            render_queue: RenderQueue::new(),
            window_depth,
            fallback,
            fallback_cube,
            initialized: false,
            close_requested: false,
            start: now,
            last_frame: now,
            dt: 0.0,
            frames: 0,
            fps_timer: now,
        })
    }

    fn create_window_depth(
        gpu: &mut Gpu,
        width: u32,
        height: u32,
    ) -> RenderResult<(TextureHandle, TextureViewHandle)> {
        let texture = gpu.create_texture(&TextureDescriptor {
            label: Some("window depth".to_string()),
            width,
            height,
            format: WINDOW_DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
            ..Default::default()
        });
        let view = gpu.create_texture_view(texture, &TextureViewDescriptor::default())?;
        Ok((texture, view))
    }

    pub fn gpu(&self) -> Rc<RefCell<Gpu>> {
        self.gpu.clone()
    }

    pub fn camera(&self) -> Rc<RefCell<Camera>> {
        self.camera.clone()
    }

    pub fn scene(&self) -> Rc<RefCell<Scene>> {
        self.scene.clone()
    }

    pub fn set_scene(&self, scene: Scene) {
        *self.scene.borrow_mut() = scene;
    }

    /// Fallback white textures handed to shader programs for unset slots,
    /// one per view dimension.
    pub fn fallback_binding(&self) -> FallbackBindings {
        FallbackBindings {
            d2: self.fallback.view,
            cube: self.fallback_cube.view,
            sampler: self.fallback.sampler,
        }
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window.framebuffer_size()
    }

    pub fn add_init_command(&mut self, command: RenderCommand<RenderContext>) {
        self.init_queue.add(command);
    }

    pub fn add_render_command(&mut self, command: RenderCommand<RenderContext>) {
        self.render_queue.add(command);
    }

    pub fn remove_render_command(&mut self, name: &str) {
        self.render_queue.remove(name);
    }

    pub fn render_queue_mut(&mut self) -> &mut RenderQueue<RenderContext> {
        &mut self.render_queue
    }

    fn context(&self, frame: Option<FrameTarget>) -> RenderContext {
        RenderContext {
            gpu: self.gpu.clone(),
            camera: self.camera.clone(),
            scene: self.scene.clone(),
            frame,
            window_depth: self.window_depth.1,
            time: self.start.elapsed().as_secs_f32(),
        }
    }

    /// Sort both queues and run the init queue once.
    fn prepare(&mut self) {
        self.init_queue.sort();
        self.render_queue.sort();
        let mut ctx = self.context(None);
        self.init_queue.execute(&mut ctx);
        self.gpu.borrow_mut().flush();
        self.initialized = true;
        log::info!(
            "init queue ran ({} commands), render queue holds {}",
            self.init_queue.len(),
            self.render_queue.len()
        );
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let mut gpu = self.gpu.borrow_mut();
        gpu.resize(width, height);
        gpu.destroy_texture(self.window_depth.0);
        gpu.destroy_texture_view(self.window_depth.1);
        match Self::create_window_depth(&mut gpu, width, height) {
            Ok(depth) => self.window_depth = depth,
            Err(e) => log::error!("window depth target lost on resize: {e}"),
        }
    }

    /// Render one frame: clear, execute the render queue, present.
    /// With `readback` the frame is copied to host memory before presenting.
    fn render_frame(&mut self, readback: bool) -> RenderResult<Option<Vec<u8>>> {
        if !self.initialized {
            self.prepare();
        }

        let now = Instant::now();
        self.dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        let frame = self.gpu.borrow_mut().begin_frame()?;
        {
            let mut gpu = self.gpu.borrow_mut();
            gpu.begin_render_pass(&RenderPassDescriptor {
                label: Some("frame clear".to_string()),
                color_attachments: vec![ColorAttachment {
                    view: frame.view,
                    load_op: LoadOp::Clear([0.1, 0.1, 0.1, 1.0]),
                }],
                depth_stencil_attachment: Some(DepthStencilAttachment {
                    view: self.window_depth.1,
                    clear_depth: true,
                    clear_stencil: true,
                }),
            });
            gpu.end_render_pass();
        }

        let mut ctx = self.context(Some(frame));
        self.render_queue.execute(&mut ctx);

        let pixels = if readback {
            Some(self.gpu.borrow_mut().read_framebuffer()?)
        } else {
            None
        };
        self.gpu.borrow_mut().end_frame();

        self.frames += 1;
        if self.fps_timer.elapsed() >= Duration::from_secs(1) {
            log::info!("fps: {}", self.frames);
            self.frames = 0;
            self.fps_timer = Instant::now();
        }
        Ok(pixels)
    }

    fn handle_key(&mut self, event: KeyEvent) {
        use crate::scene::camera::CameraMovement;
        if event.state != ElementState::Pressed {
            return;
        }
        let movement = match event.physical_key {
            PhysicalKey::Code(KeyCode::KeyW) => Some(CameraMovement::Forward),
            PhysicalKey::Code(KeyCode::KeyS) => Some(CameraMovement::Backward),
            PhysicalKey::Code(KeyCode::KeyA) => Some(CameraMovement::Left),
            PhysicalKey::Code(KeyCode::KeyD) => Some(CameraMovement::Right),
            _ => None,
        };
        if let Some(movement) = movement {
            let dt = if self.dt > 0.0 { self.dt } else { 1.0 / 60.0 };
            self.camera.borrow_mut().process_movement(movement, dt);
        }
    }

    /// Run the main loop until the window closes.
    pub fn run(mut self) -> RenderResult<()> {
        let event_loop = self
            .window
            .take_event_loop()
            .ok_or_else(|| RenderError::InitializationFailed("event loop already taken".into()))?;

        event_loop
            .run(move |event, elwt| match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                            elwt.exit();
                        } else {
                            self.handle_key(event);
                        }
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let dy = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                        };
                        self.camera.borrow_mut().process_scroll(dy);
                    }
                    WindowEvent::Resized(size) => self.resize(size.width, size.height),
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = self.render_frame(false) {
                            log::error!("frame dropped: {e}");
                        }
                    }
                    _ => {}
                },
                Event::DeviceEvent {
                    event: DeviceEvent::MouseMotion { delta: (dx, dy) },
                    ..
                } => {
                    self.camera
                        .borrow_mut()
                        .process_mouse(dx as f32, -dy as f32);
                }
                Event::AboutToWait => self.window.request_redraw(),
                _ => {}
            })
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))
    }

    // ---- step-by-step facade for driving the renderer without an owning
    // event loop, one frame at a time ----

    /// Sort the queues and run the init queue now instead of lazily on the
    /// first frame.
    pub fn render_test_init(&mut self) {
        if !self.initialized {
            self.prepare();
        }
    }

    /// Pump window events and render a single frame.
    pub fn render_test_update(&mut self) -> RenderResult<()> {
        self.pump_events();
        if self.close_requested {
            return Ok(());
        }
        self.render_frame(false).map(|_| ())
    }

    pub fn render_test_should_close(&self) -> bool {
        self.close_requested
    }

    /// Render one frame and return its pixels as tightly packed RGBA8.
    pub fn read_framebuffer(&mut self) -> RenderResult<Vec<u8>> {
        self.pump_events();
        self.render_frame(true)?
            .ok_or_else(|| RenderError::ReadbackFailed("frame produced no pixels".into()))
    }

    fn pump_events(&mut self) {
        let mut close = false;
        let mut resized = None;
        if let Some(event_loop) = self.window.event_loop_mut() {
            let _ = event_loop.pump_events(Some(Duration::ZERO), |event, _| {
                if let Event::WindowEvent { event, .. } = event {
                    match event {
                        WindowEvent::CloseRequested => close = true,
                        WindowEvent::Resized(size) => resized = Some((size.width, size.height)),
                        _ => {}
                    }
                }
            });
        }
        if close {
            self.close_requested = true;
        }
        if let Some((width, height)) = resized {
            self.resize(width, height);
        }
    }
}
