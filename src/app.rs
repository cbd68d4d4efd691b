// =============================================================================
// DEMO APPLICATION - winit front end driving the frame engine
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit ApplicationHandler: window, input, FPS, hot reload) │
// │    └── Renderer                                                 │
// │          ├── FrameScheduler (sync pool, surface, recorder)      │
// │          ├── RenderPipeline (render pass + pipeline)            │
// │          └── VulkanDevice                                       │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW (one RedrawRequested):
// 1. Update push constants (rotation, aspect correction)
// 2. FrameScheduler::draw_frame - wait, acquire, reset, record, submit, present
// 3. Recreation, minimize and out-of-date are handled inside the scheduler;
//    only fatal errors come back here and end the event loop.
//
// =============================================================================

use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

use frame_pacer::backend::{RenderPipeline, ShaderModule, Vertex, VulkanDevice};
use frame_pacer::config::{Config, CONFIG_PATH};
use frame_pacer::diagnostics::LogEvents;
use frame_pacer::error::FrameResult;
use frame_pacer::gpu::BufferKind;
use frame_pacer::recorder::{CommandBufferRecorder, DrawResources};
use frame_pacer::scheduler::{FrameScheduler, FrameStatus};
use frame_pacer::surface::SurfaceLifecycle;
use frame_pacer::sync_pool::SyncObjectPool;
use frame_pacer::transfer::TransferScheduler;

use crate::hot_reload::{ConfigUpdate, ConfigWatcher};

/// Unit quad, one colour per corner.
const QUAD_VERTICES: [Vertex; 4] = [
    Vertex { position: [-0.5, -0.5], color: [1.0, 0.0, 0.0] },
    Vertex { position: [0.5, -0.5], color: [0.0, 1.0, 0.0] },
    Vertex { position: [0.5, 0.5], color: [0.0, 0.0, 1.0] },
    Vertex { position: [-0.5, 0.5], color: [1.0, 1.0, 1.0] },
];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Everything that lives on the GPU.
///
/// IMPORTANT: Field order is drop order. The scheduler idles the device and
/// releases swapchain, buffers and sync objects before the render pass they
/// were built against, and the device goes last.
struct Renderer {
    scheduler: FrameScheduler<VulkanDevice, Arc<Window>>,
    _pipeline: RenderPipeline,
    device: Arc<VulkanDevice>,
}

impl Renderer {
    /// Set up the device, upload the geometry and build the frame engine.
    fn new(config: &Config, window: Arc<Window>) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Device, surface, queues
        // ─────────────────────────────────────────────────────────────────────
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(
            &config.window.title,
            enable_validation,
            window.as_ref(),
            config.present_mode(),
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Pipeline (shader modules only live until it exists)
        // ─────────────────────────────────────────────────────────────────────
        let pipeline = {
            let vert = ShaderModule::load(&device, &config.shaders.vertex)?;
            let frag = ShaderModule::load(&device, &config.shaders.fragment)?;
            RenderPipeline::new(device.clone(), &vert, &frag)?
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Sync objects, then geometry through the transfer queue
        // ─────────────────────────────────────────────────────────────────────
        // All uploads have retired before the first frame is scheduled.
        let frames = config.graphics.max_frames_in_flight;
        let timeout = config.fence_timeout_ns();
        let sync = SyncObjectPool::create(device.clone(), frames)?;

        let (vertex_buffer, index_buffer) = {
            let mut transfer = TransferScheduler::new(device.clone(), sync.transfer_fence(), timeout)?;
            let vertices = transfer.stage(bytemuck::cast_slice(&QUAD_VERTICES), BufferKind::Vertex)?;
            let indices = transfer.stage(bytemuck::cast_slice(&QUAD_INDICES), BufferKind::Index)?;
            (vertices, indices)
        };

        let resources = DrawResources {
            pipeline: pipeline.pipeline,
            layout: pipeline.layout,
            vertex_buffer,
            vertex_count: QUAD_VERTICES.len() as u32,
            index_buffer: Some((index_buffer, QUAD_INDICES.len() as u32)),
            descriptor_sets: Vec::new(),
            clear_color: config.graphics.clear_color,
        };

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Swapchain generation, recorder, scheduler
        // ─────────────────────────────────────────────────────────────────────
        let surface = SurfaceLifecycle::new(device.clone(), window, pipeline.render_pass)?;
        let recorder = CommandBufferRecorder::new(device.clone(), frames, resources)?;
        let scheduler = FrameScheduler::new(
            device.clone(),
            sync,
            surface,
            recorder,
            Box::new(LogEvents),
            timeout,
        )?;

        log::info!(
            "Vulkan initialized: {} frames in flight, {} swapchain images",
            scheduler.frames_in_flight(),
            scheduler.image_count()
        );

        Ok(Self {
            scheduler,
            _pipeline: pipeline,
            device,
        })
    }

    fn draw(&mut self, elapsed: f32) -> FrameResult<FrameStatus> {
        // Keep the quad square whatever the window shape
        let aspect = self.scheduler.current_extent().aspect_ratio();
        let transform = Mat4::from_scale(Vec3::new(1.0 / aspect, 1.0, 1.0))
            * Mat4::from_rotation_z(elapsed * 0.5);
        self.scheduler
            .recorder_mut()
            .set_push_constants(bytemuck::bytes_of(&transform));

        self.scheduler.draw_frame()
    }

    fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(mode) = update.present_mode {
            match self.device.set_present_mode(mode) {
                // Takes effect at the next recreation
                Ok(true) => self.scheduler.request_resize(),
                Ok(false) => {}
                Err(e) => log::warn!("Could not query present modes: {}", e),
            }
        }
        if let Some(color) = update.clear_color {
            self.scheduler.recorder_mut().set_clear_color(color);
        }
    }
}

/// Main application struct
pub struct App {
    config: Config,
    fullscreen_key: KeyCode,
    quit_key: KeyCode,

    // Dropped before the window it renders into
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    watcher: Option<ConfigWatcher>,
    is_fullscreen: bool,
    is_minimized: bool,

    /// First fatal error; ends the event loop
    error: Option<anyhow::Error>,

    // FPS tracking
    start: Instant,
    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let fullscreen_key = parse_key(&config.controls.fullscreen_key).unwrap_or_else(|| {
            log::warn!("Unknown fullscreen key '{}', using F11", config.controls.fullscreen_key);
            KeyCode::F11
        });
        let quit_key = parse_key(&config.controls.quit_key).unwrap_or_else(|| {
            log::warn!("Unknown quit key '{}', using Escape", config.controls.quit_key);
            KeyCode::Escape
        });
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();

        Self {
            config,
            fullscreen_key,
            quit_key,
            renderer: None,
            window: None,
            watcher: None,
            is_fullscreen,
            is_minimized: false,
            error: None,
            start: now,
            frame_count: 0,
            last_fps_update: now,
        }
    }

    /// The fatal error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                // Enter fullscreen (use current monitor)
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(ref mut renderer) = self.renderer {
                renderer.scheduler.request_resize();
            }
        }
    }

    /// Counts presented frames; once a second puts the rate and the pacing
    /// state (slots in flight, swapchain generation) in the window title.
    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let now = Instant::now();
        let window_secs = now.duration_since(self.last_fps_update).as_secs_f32();
        if window_secs < 1.0 {
            return;
        }

        let fps = self.frame_count as f32 / window_secs;
        let avg_ms = window_secs * 1000.0 / self.frame_count as f32;
        if let (Some(window), Some(renderer)) = (&self.window, &self.renderer) {
            let scheduler = &renderer.scheduler;
            window.set_title(&format!(
                "{} | {:.0} fps, {:.2} ms | {} in flight, swapchain gen {}",
                self.config.window.title,
                fps,
                avg_ms,
                scheduler.frames_in_flight(),
                scheduler.generation()
            ));
        }

        self.frame_count = 0;
        self.last_fps_update = now;
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let elapsed = self.start.elapsed().as_secs_f32();
        let Some(ref mut renderer) = self.renderer else {
            return;
        };

        match renderer.draw(elapsed) {
            Ok(FrameStatus::Presented { .. }) => self.update_fps(),
            Ok(FrameStatus::Skipped) => {}
            Ok(FrameStatus::Minimized) => self.is_minimized = true,
            Err(e) => {
                let kind = e.kind();
                self.fail(event_loop, anyhow::Error::new(e).context(format!("{:?} error in frame loop", kind)));
            }
        }
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Create window with settings from config
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop
            .create_window(window_attributes)
            .context("Failed to create window")
        {
            Ok(w) => Arc::new(w),
            Err(e) => return self.fail(event_loop, e),
        };

        match Renderer::new(&self.config, window.clone()) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => return self.fail(event_loop, e.context("Failed to initialize Vulkan")),
        }
        self.window = Some(window);

        if self.config.debug.hot_reload {
            match ConfigWatcher::new(CONFIG_PATH, self.config.clone()) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => log::warn!("Hot reload disabled: {:#}", e),
            }
        }
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                self.is_minimized = size.width == 0 || size.height == 0;
                if let Some(ref mut renderer) = self.renderer {
                    renderer.scheduler.request_resize();
                }
                if !self.is_minimized {
                    if let Some(ref window) = self.window {
                        window.request_redraw();
                    }
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        if key == self.quit_key {
                            log::info!("{:?} pressed, exiting...", key);
                            event_loop.exit();
                        } else if key == self.fullscreen_key {
                            self.toggle_fullscreen();
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Redraw continuously, except while minimized: a Resized event wakes us.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let (Some(watcher), Some(renderer)) = (self.watcher.as_mut(), self.renderer.as_mut()) {
            if let Some(update) = watcher.poll() {
                renderer.apply(&update);
            }
        }

        if !self.is_minimized {
            if let Some(ref window) = self.window {
                window.request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("Cleaning up Vulkan resources...");
        // Renderer drop waits for the device before releasing anything.
        self.renderer = None;
        log::info!("Cleanup complete");
    }
}

/// Key names as written in config.toml ("F11", "Escape", "Q", "Space", ...).
fn parse_key(name: &str) -> Option<KeyCode> {
    let name = name.trim();
    let key = match name.to_ascii_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        "f" => KeyCode::KeyF,
        "q" => KeyCode::KeyQ,
        "x" => KeyCode::KeyX,
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bindings_parse() {
        let controls = frame_pacer::config::ControlsConfig::default();
        assert_eq!(parse_key(&controls.fullscreen_key), Some(KeyCode::F11));
        assert_eq!(parse_key(&controls.quit_key), Some(KeyCode::Escape));
    }

    #[test]
    fn key_names_are_case_insensitive() {
        assert_eq!(parse_key(" esc "), Some(KeyCode::Escape));
        assert_eq!(parse_key("Q"), Some(KeyCode::KeyQ));
        assert_eq!(parse_key("PrintScreen"), None);
    }

    #[test]
    fn quad_geometry_matches_the_pipeline_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&QUAD_VERTICES).len(), 80);
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < QUAD_VERTICES.len()));
        assert_eq!(
            std::mem::size_of::<Mat4>() as u32,
            frame_pacer::backend::PUSH_CONSTANT_SIZE
        );
    }
}
