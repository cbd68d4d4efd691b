// Surface lifecycle - swapchain generations and their recreation
//
// A generation is one swapchain plus the image views and framebuffers built
// on its images. Nothing from a generation outlives it: dropping the
// generation destroys framebuffers, then image views, then the swapchain.
//
// Recreation protocol:
//   1. zero-sized window -> defer, touch nothing
//   2. wait for the device to go idle
//   3. retire the old generation (framebuffers, views, swapchain)
//   4. build the new one (swapchain, views, framebuffers)
// The render pass and the sync objects are never rebuilt here.

use std::sync::Arc;

use crate::error::{FrameError, FrameResult};
use crate::gpu::{AcquireOutcome, Extent2D, PresentOutcome, SurfaceDevice};

/// Anything that can report the current framebuffer size of the window.
pub trait ExtentSource {
    fn framebuffer_extent(&self) -> Extent2D;
}

impl<T: ExtentSource + ?Sized> ExtentSource for Arc<T> {
    fn framebuffer_extent(&self) -> Extent2D {
        (**self).framebuffer_extent()
    }
}

impl ExtentSource for winit::window::Window {
    fn framebuffer_extent(&self) -> Extent2D {
        let size = self.inner_size();
        Extent2D::new(size.width, size.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    Recreated { generation: u64, extent: Extent2D },
    /// The window has no area; the current generation (if any) is untouched.
    Deferred,
}

struct SwapchainGeneration<D: SurfaceDevice> {
    device: Arc<D>,
    swapchain: D::Swapchain,
    image_views: Vec<D::ImageView>,
    framebuffers: Vec<D::Framebuffer>,
    extent: Extent2D,
}

impl<D: SurfaceDevice> SwapchainGeneration<D> {
    fn build(device: Arc<D>, render_pass: D::RenderPass, requested: Extent2D) -> FrameResult<Self> {
        let (swapchain, extent) = device.create_swapchain(requested)?;

        // Owned from here on; a failure below drops what exists so far.
        let mut generation = Self {
            device,
            swapchain,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            extent,
        };

        let images = generation.device.swapchain_images(swapchain)?;
        generation.image_views.reserve(images.len());
        for image in images {
            let view = generation.device.create_image_view(image)?;
            generation.image_views.push(view);
        }

        generation.framebuffers.reserve(generation.image_views.len());
        for i in 0..generation.image_views.len() {
            let view = generation.image_views[i];
            let framebuffer = generation
                .device
                .create_framebuffer(render_pass, view, extent)?;
            generation.framebuffers.push(framebuffer);
        }

        Ok(generation)
    }
}

impl<D: SurfaceDevice> Drop for SwapchainGeneration<D> {
    fn drop(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer);
        }
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        self.device.destroy_swapchain(self.swapchain);
    }
}

pub struct SurfaceLifecycle<D: SurfaceDevice, W: ExtentSource> {
    device: Arc<D>,
    window: W,
    render_pass: D::RenderPass,
    current: Option<SwapchainGeneration<D>>,
    generation: u64,
}

impl<D: SurfaceDevice, W: ExtentSource> SurfaceLifecycle<D, W> {
    /// Builds the first generation, unless the window starts minimized, in
    /// which case the surface stays empty until the first recreate().
    pub fn new(device: Arc<D>, window: W, render_pass: D::RenderPass) -> FrameResult<Self> {
        let mut surface = Self {
            device,
            window,
            render_pass,
            current: None,
            generation: 0,
        };

        let extent = surface.window.framebuffer_extent();
        if extent.is_zero() {
            log::info!("Window starts minimized, swapchain creation deferred");
        } else {
            surface.build(extent)?;
        }
        Ok(surface)
    }

    /// Runs the recreation protocol against the window's current size.
    pub fn recreate(&mut self) -> FrameResult<RecreateOutcome> {
        let extent = self.window.framebuffer_extent();
        if extent.is_zero() {
            return Ok(RecreateOutcome::Deferred);
        }

        // In-flight submissions may still reference the views and
        // framebuffers we are about to destroy.
        self.device.wait_idle()?;
        self.current = None;

        self.build(extent)?;
        Ok(RecreateOutcome::Recreated {
            generation: self.generation,
            extent: self.extent(),
        })
    }

    fn build(&mut self, requested: Extent2D) -> FrameResult<()> {
        let generation = SwapchainGeneration::build(self.device.clone(), self.render_pass, requested)?;
        self.generation += 1;
        log::info!(
            "Created swapchain generation {}: {}x{}, {} images",
            self.generation,
            generation.extent.width,
            generation.extent.height,
            generation.image_views.len()
        );
        self.current = Some(generation);
        Ok(())
    }

    fn live(&self) -> FrameResult<&SwapchainGeneration<D>> {
        self.current.as_ref().ok_or(FrameError::NoSwapchain)
    }

    pub fn acquire(&self, signal: D::Semaphore, timeout_ns: u64) -> FrameResult<AcquireOutcome> {
        let live = self.live()?;
        self.device.acquire_next_image(live.swapchain, signal, timeout_ns)
    }

    pub fn present(&self, image_index: u32, wait: D::Semaphore) -> FrameResult<PresentOutcome> {
        let live = self.live()?;
        self.device.present(live.swapchain, image_index, wait)
    }

    pub fn framebuffer(&self, image_index: u32) -> FrameResult<D::Framebuffer> {
        let live = self.live()?;
        live.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(FrameError::InvalidImage {
                index: image_index,
                count: live.framebuffers.len(),
            })
    }

    /// True when a generation exists to render into.
    pub fn is_live(&self) -> bool {
        self.current.is_some()
    }

    /// Extent of the live generation; zero when none exists.
    pub fn extent(&self) -> Extent2D {
        self.current.as_ref().map(|g| g.extent).unwrap_or_default()
    }

    pub fn image_count(&self) -> usize {
        self.current.as_ref().map_or(0, |g| g.image_views.len())
    }

    /// Number of generations built so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn render_pass(&self) -> D::RenderPass {
        self.render_pass
    }
}
