// GPU capability interfaces
//
// The engine (sync pool, surface lifecycle, recorder, schedulers) is written
// against these traits only. The ash backend implements all of them for
// VulkanDevice; tests implement them with a scripted fake.
//
// Handles are small Copy values owned by whichever engine component created
// them; that component releases them in its Drop.

use std::fmt::Debug;

use crate::error::FrameResult;

/// Width x height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports zero in at least one dimension.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Which queue a submission goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Graphics,
    Transfer,
}

/// Result of asking the surface for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image can be rendered to. `suboptimal` asks for a rebuild after present.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was signaled.
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// What a buffer is for; decides usage flags and memory placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Host-visible, host-coherent copy source.
    Staging,
    /// Device-local, copy destination.
    Vertex,
    Index,
    Uniform,
}

impl BufferKind {
    pub fn is_host_visible(self) -> bool {
        matches!(self, BufferKind::Staging)
    }
}

/// Semaphores, fences and whole-device idle.
pub trait SyncDevice {
    type Semaphore: Copy + Debug;
    type Fence: Copy + Debug;

    fn create_semaphore(&self) -> FrameResult<Self::Semaphore>;
    fn create_fence(&self, signaled: bool) -> FrameResult<Self::Fence>;
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);
    fn destroy_fence(&self, fence: Self::Fence);

    /// Blocks the host until the fence is signaled. A timeout is fatal.
    fn wait_for_fence(&self, fence: Self::Fence, timeout_ns: u64) -> FrameResult<()>;
    fn reset_fence(&self, fence: Self::Fence) -> FrameResult<()>;
    fn fence_signaled(&self, fence: Self::Fence) -> FrameResult<bool>;

    /// Blocks until no submission is outstanding on any queue.
    fn wait_idle(&self) -> FrameResult<()>;
}

/// Command pools, command buffers and queue submission.
pub trait CommandDevice: SyncDevice {
    type CommandPool: Copy + Debug;
    type CommandBuffer: Copy + Debug;

    fn create_command_pool(&self, queue: QueueKind, transient: bool)
        -> FrameResult<Self::CommandPool>;
    fn destroy_command_pool(&self, pool: Self::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: Self::CommandPool,
        count: u32,
    ) -> FrameResult<Vec<Self::CommandBuffer>>;

    fn reset_command_buffer(&self, command_buffer: Self::CommandBuffer) -> FrameResult<()>;
    fn begin_command_buffer(&self, command_buffer: Self::CommandBuffer, one_time: bool)
        -> FrameResult<()>;
    fn end_command_buffer(&self, command_buffer: Self::CommandBuffer) -> FrameResult<()>;

    /// Enqueues one command buffer. `wait` semaphores are waited at the
    /// color-attachment-output stage.
    fn submit(
        &self,
        queue: QueueKind,
        command_buffer: Self::CommandBuffer,
        wait: &[Self::Semaphore],
        signal: &[Self::Semaphore],
        fence: Option<Self::Fence>,
    ) -> FrameResult<()>;
}

/// Presentation surface: swapchain, its images and everything derived from them.
pub trait SurfaceDevice: SyncDevice {
    type Swapchain: Copy + Debug;
    type Image: Copy + Debug;
    type ImageView: Copy + Debug;
    type Framebuffer: Copy + Debug;
    type RenderPass: Copy + Debug;

    /// Creates a swapchain sized for `requested`; returns it with the extent
    /// the surface actually granted.
    fn create_swapchain(&self, requested: Extent2D) -> FrameResult<(Self::Swapchain, Extent2D)>;
    fn swapchain_images(&self, swapchain: Self::Swapchain) -> FrameResult<Vec<Self::Image>>;
    fn create_image_view(&self, image: Self::Image) -> FrameResult<Self::ImageView>;
    fn create_framebuffer(
        &self,
        render_pass: Self::RenderPass,
        view: Self::ImageView,
        extent: Extent2D,
    ) -> FrameResult<Self::Framebuffer>;

    fn destroy_framebuffer(&self, framebuffer: Self::Framebuffer);
    fn destroy_image_view(&self, view: Self::ImageView);
    fn destroy_swapchain(&self, swapchain: Self::Swapchain);

    fn acquire_next_image(
        &self,
        swapchain: Self::Swapchain,
        signal: Self::Semaphore,
        timeout_ns: u64,
    ) -> FrameResult<AcquireOutcome>;
    fn present(
        &self,
        swapchain: Self::Swapchain,
        image_index: u32,
        wait: Self::Semaphore,
    ) -> FrameResult<PresentOutcome>;
}

/// Buffer + backing memory pairs and the copy between them.
pub trait BufferDevice: CommandDevice {
    type Buffer: Copy + Debug;
    type Memory;

    fn create_buffer(&self, size: u64, kind: BufferKind)
        -> FrameResult<(Self::Buffer, Self::Memory)>;
    /// Writes into host-visible memory at offset 0.
    fn write_buffer(&self, memory: &mut Self::Memory, data: &[u8]) -> FrameResult<()>;
    fn destroy_buffer(&self, buffer: Self::Buffer, memory: Self::Memory);

    fn cmd_copy_buffer(
        &self,
        command_buffer: Self::CommandBuffer,
        src: Self::Buffer,
        dst: Self::Buffer,
        size: u64,
    );
}

/// Render-pass recording commands.
pub trait DrawDevice: SurfaceDevice + BufferDevice {
    type Pipeline: Copy + Debug;
    type PipelineLayout: Copy + Debug;
    type DescriptorSet: Copy + Debug;

    fn cmd_begin_render_pass(
        &self,
        command_buffer: Self::CommandBuffer,
        render_pass: Self::RenderPass,
        framebuffer: Self::Framebuffer,
        extent: Extent2D,
        clear_color: [f32; 4],
    );
    fn cmd_bind_pipeline(&self, command_buffer: Self::CommandBuffer, pipeline: Self::Pipeline);
    fn cmd_set_viewport_scissor(&self, command_buffer: Self::CommandBuffer, extent: Extent2D);
    fn cmd_bind_vertex_buffer(&self, command_buffer: Self::CommandBuffer, buffer: Self::Buffer);
    fn cmd_bind_index_buffer(&self, command_buffer: Self::CommandBuffer, buffer: Self::Buffer);
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: Self::CommandBuffer,
        layout: Self::PipelineLayout,
        set: Self::DescriptorSet,
    );
    fn cmd_push_constants(
        &self,
        command_buffer: Self::CommandBuffer,
        layout: Self::PipelineLayout,
        bytes: &[u8],
    );
    fn cmd_draw(&self, command_buffer: Self::CommandBuffer, vertex_count: u32);
    fn cmd_draw_indexed(&self, command_buffer: Self::CommandBuffer, index_count: u32);
    fn cmd_end_render_pass(&self, command_buffer: Self::CommandBuffer);
}

/// Everything the frame scheduler needs from a device.
pub trait RenderDevice: DrawDevice {}

impl<T: DrawDevice> RenderDevice for T {}
