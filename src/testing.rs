// Scripted fake device for engine tests
//
// Implements every capability trait with integer handles. Submissions stay
// pending until someone waits on their fence (or the device goes idle), which
// lets tests observe how many frames are in flight and whether a wait blocked.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FrameError, FrameResult};
use crate::gpu::{
    AcquireOutcome, BufferDevice, BufferKind, CommandDevice, DrawDevice, Extent2D, PresentOutcome,
    QueueKind, SurfaceDevice, SyncDevice,
};
use crate::recorder::DrawResources;
use crate::surface::ExtentSource;
use crate::sync_pool::SyncObjectPool;
use crate::transfer::TransferScheduler;

pub type Handle = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateSemaphore(Handle),
    CreateFence { fence: Handle, signaled: bool },
    DestroySemaphore(Handle),
    DestroyFence(Handle),
    WaitFence { fence: Handle, blocked: bool },
    ResetFence(Handle),
    WaitIdle,
    CreatePool(Handle, QueueKind),
    DestroyPool(Handle),
    AllocateCommandBuffers { pool: Handle, count: u32 },
    ResetCommandBuffer(Handle),
    Begin(Handle),
    End(Handle),
    Submit {
        queue: QueueKind,
        command_buffer: Handle,
        wait: Vec<Handle>,
        signal: Vec<Handle>,
        fence: Option<Handle>,
    },
    CreateSwapchain { swapchain: Handle, extent: Extent2D },
    DestroySwapchain(Handle),
    CreateImageView(Handle),
    DestroyImageView(Handle),
    CreateFramebuffer { framebuffer: Handle, view: Handle },
    DestroyFramebuffer(Handle),
    Acquire { swapchain: Handle, signal: Handle },
    Present { swapchain: Handle, image_index: u32, wait: Handle },
    CreateBuffer { buffer: Handle, kind: BufferKind },
    WriteBuffer(Handle),
    DestroyBuffer(Handle),
    CopyBuffer { src: Handle, dst: Handle, size: u64 },
    BeginRenderPass { framebuffer: Handle, extent: Extent2D },
    BindPipeline(Handle),
    SetViewportScissor(Extent2D),
    BindVertexBuffer(Handle),
    BindIndexBuffer(Handle),
    BindDescriptorSet(Handle),
    PushConstants(Vec<u8>),
    Draw(u32),
    DrawIndexed(u32),
    EndRenderPass,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FenceState {
    pub signaled: bool,
    pub pending: bool,
}

#[derive(Debug)]
pub struct MockMemory {
    pub buffer: Handle,
    pub host_visible: bool,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct State {
    next_handle: Handle,
    calls: Vec<Call>,
    fences: HashMap<Handle, FenceState>,
    live: HashMap<Handle, &'static str>,
    in_flight: usize,
    max_in_flight: usize,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    image_count: u32,
    next_image: u32,
    // (operation, successful calls left before it fails)
    fail: Option<(&'static str, usize)>,
}

impl State {
    fn handle(&mut self, kind: &'static str) -> Handle {
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        self.next_handle
    }

    fn release(&mut self, handle: Handle, kind: &'static str) {
        let removed = self.live.remove(&handle);
        assert_eq!(removed, Some(kind), "{kind} {handle} released twice or never created");
    }

    fn check_fail(&mut self, op: &'static str) -> FrameResult<()> {
        if let Some((target, left)) = self.fail {
            if target == op {
                if left == 0 {
                    self.fail = None;
                    return Err(FrameError::creation(op, "scripted failure"));
                }
                self.fail = Some((target, left - 1));
            }
        }
        Ok(())
    }

    fn retire(&mut self, fence: Handle) {
        if let Some(state) = self.fences.get_mut(&fence) {
            if state.pending {
                state.pending = false;
                state.signaled = true;
                self.in_flight -= 1;
            }
        }
    }
}

pub struct MockDevice {
    state: Mutex<State>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                image_count: 3,
                ..State::default()
            }),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Handles created and not yet destroyed.
    pub fn live(&self, kind: &str) -> usize {
        self.state.lock().live.values().filter(|k| **k == kind).count()
    }

    pub fn live_total(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn fence_state(&self, fence: Handle) -> FenceState {
        self.state.lock().fences.get(&fence).copied().unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Lets the "GPU" finish every pending submission without a host wait.
    pub fn complete_all(&self) {
        let mut state = self.state.lock();
        let pending: Vec<Handle> = state
            .fences
            .iter()
            .filter(|(_, f)| f.pending)
            .map(|(h, _)| *h)
            .collect();
        for fence in pending {
            state.retire(fence);
        }
    }

    pub fn script_acquire(&self, outcome: AcquireOutcome) {
        self.state.lock().acquire_script.push_back(outcome);
    }

    pub fn script_present(&self, outcome: PresentOutcome) {
        self.state.lock().present_script.push_back(outcome);
    }

    pub fn set_image_count(&self, count: u32) {
        self.state.lock().image_count = count;
    }

    /// The operation succeeds `after` more times, then fails once.
    pub fn fail_after(&self, op: &'static str, after: usize) {
        self.state.lock().fail = Some((op, after));
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

impl SyncDevice for MockDevice {
    type Semaphore = Handle;
    type Fence = Handle;

    fn create_semaphore(&self) -> FrameResult<Handle> {
        let mut state = self.state.lock();
        state.check_fail("semaphore")?;
        let semaphore = state.handle("semaphore");
        state.calls.push(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn create_fence(&self, signaled: bool) -> FrameResult<Handle> {
        let mut state = self.state.lock();
        state.check_fail("fence")?;
        let fence = state.handle("fence");
        state.fences.insert(
            fence,
            FenceState {
                signaled,
                pending: false,
            },
        );
        state.calls.push(Call::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_semaphore(&self, semaphore: Handle) {
        let mut state = self.state.lock();
        state.release(semaphore, "semaphore");
        state.calls.push(Call::DestroySemaphore(semaphore));
    }

    fn destroy_fence(&self, fence: Handle) {
        let mut state = self.state.lock();
        state.release(fence, "fence");
        state.fences.remove(&fence);
        state.calls.push(Call::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: Handle, timeout_ns: u64) -> FrameResult<()> {
        let mut state = self.state.lock();
        state
            .check_fail("wait")
            .map_err(|_| FrameError::Timeout(timeout_ns))?;
        let current = state.fences.get(&fence).copied().unwrap_or_default();
        if current.signaled {
            state.calls.push(Call::WaitFence { fence, blocked: false });
            return Ok(());
        }
        if current.pending {
            state.retire(fence);
            state.calls.push(Call::WaitFence { fence, blocked: true });
            return Ok(());
        }
        // Unsignaled with nothing queued to signal it: a real wait never returns.
        Err(FrameError::Timeout(timeout_ns))
    }

    fn reset_fence(&self, fence: Handle) -> FrameResult<()> {
        let mut state = self.state.lock();
        if let Some(f) = state.fences.get_mut(&fence) {
            assert!(!f.pending, "reset of fence {fence} with pending work");
            f.signaled = false;
        }
        state.calls.push(Call::ResetFence(fence));
        Ok(())
    }

    fn fence_signaled(&self, fence: Handle) -> FrameResult<bool> {
        Ok(self.fence_state(fence).signaled)
    }

    fn wait_idle(&self) -> FrameResult<()> {
        self.complete_all();
        self.record(Call::WaitIdle);
        Ok(())
    }
}

impl CommandDevice for MockDevice {
    type CommandPool = Handle;
    type CommandBuffer = Handle;

    fn create_command_pool(&self, queue: QueueKind, _transient: bool) -> FrameResult<Handle> {
        let mut state = self.state.lock();
        state.check_fail("command pool")?;
        let pool = state.handle("pool");
        state.calls.push(Call::CreatePool(pool, queue));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: Handle) {
        let mut state = self.state.lock();
        state.release(pool, "pool");
        state.calls.push(Call::DestroyPool(pool));
    }

    fn allocate_command_buffers(&self, pool: Handle, count: u32) -> FrameResult<Vec<Handle>> {
        let mut state = self.state.lock();
        state.check_fail("command buffer")?;
        state.calls.push(Call::AllocateCommandBuffers { pool, count });
        // Owned by the pool; not tracked as live objects.
        Ok((0..count)
            .map(|_| {
                state.next_handle += 1;
                state.next_handle
            })
            .collect())
    }

    fn reset_command_buffer(&self, command_buffer: Handle) -> FrameResult<()> {
        self.record(Call::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: Handle, _one_time: bool) -> FrameResult<()> {
        let mut state = self.state.lock();
        state.check_fail("begin").map_err(|e| FrameError::Recording(e.to_string()))?;
        state.calls.push(Call::Begin(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: Handle) -> FrameResult<()> {
        self.record(Call::End(command_buffer));
        Ok(())
    }

    fn submit(
        &self,
        queue: QueueKind,
        command_buffer: Handle,
        wait: &[Handle],
        signal: &[Handle],
        fence: Option<Handle>,
    ) -> FrameResult<()> {
        let mut state = self.state.lock();
        state.check_fail("submit").map_err(|e| FrameError::Submission(e.to_string()))?;
        if let Some(f) = fence {
            let current = state.fences.get(&f).copied().unwrap_or_default();
            if current.signaled || current.pending {
                return Err(FrameError::Submission(format!("fence {f} already in use")));
            }
            if let Some(entry) = state.fences.get_mut(&f) {
                entry.pending = true;
            }
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        state.calls.push(Call::Submit {
            queue,
            command_buffer,
            wait: wait.to_vec(),
            signal: signal.to_vec(),
            fence,
        });
        Ok(())
    }
}

impl SurfaceDevice for MockDevice {
    type Swapchain = Handle;
    type Image = Handle;
    type ImageView = Handle;
    type Framebuffer = Handle;
    type RenderPass = Handle;

    fn create_swapchain(&self, requested: Extent2D) -> FrameResult<(Handle, Extent2D)> {
        let mut state = self.state.lock();
        state.check_fail("swapchain")?;
        let swapchain = state.handle("swapchain");
        state.next_image = 0;
        state.calls.push(Call::CreateSwapchain {
            swapchain,
            extent: requested,
        });
        Ok((swapchain, requested))
    }

    fn swapchain_images(&self, _swapchain: Handle) -> FrameResult<Vec<Handle>> {
        let mut state = self.state.lock();
        let count = state.image_count;
        Ok((0..count)
            .map(|_| {
                state.next_handle += 1;
                state.next_handle
            })
            .collect())
    }

    fn create_image_view(&self, _image: Handle) -> FrameResult<Handle> {
        let mut state = self.state.lock();
        state.check_fail("image view")?;
        let view = state.handle("image view");
        state.calls.push(Call::CreateImageView(view));
        Ok(view)
    }

    fn create_framebuffer(
        &self,
        _render_pass: Handle,
        view: Handle,
        _extent: Extent2D,
    ) -> FrameResult<Handle> {
        let mut state = self.state.lock();
        state.check_fail("framebuffer")?;
        let framebuffer = state.handle("framebuffer");
        state.calls.push(Call::CreateFramebuffer { framebuffer, view });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: Handle) {
        let mut state = self.state.lock();
        state.release(framebuffer, "framebuffer");
        state.calls.push(Call::DestroyFramebuffer(framebuffer));
    }

    fn destroy_image_view(&self, view: Handle) {
        let mut state = self.state.lock();
        state.release(view, "image view");
        state.calls.push(Call::DestroyImageView(view));
    }

    fn destroy_swapchain(&self, swapchain: Handle) {
        let mut state = self.state.lock();
        state.release(swapchain, "swapchain");
        state.calls.push(Call::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: Handle,
        signal: Handle,
        _timeout_ns: u64,
    ) -> FrameResult<AcquireOutcome> {
        let mut state = self.state.lock();
        state.calls.push(Call::Acquire { swapchain, signal });
        state
            .check_fail("acquire")
            .map_err(|_| FrameError::DeviceLost("scripted acquire failure".into()))?;
        if let Some(outcome) = state.acquire_script.pop_front() {
            return Ok(outcome);
        }
        let image_index = state.next_image % state.image_count.max(1);
        state.next_image += 1;
        Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn present(&self, swapchain: Handle, image_index: u32, wait: Handle) -> FrameResult<PresentOutcome> {
        let mut state = self.state.lock();
        state.calls.push(Call::Present {
            swapchain,
            image_index,
            wait,
        });
        state
            .check_fail("present")
            .map_err(|_| FrameError::Presentation("scripted present failure".into()))?;
        Ok(state
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented))
    }
}

impl BufferDevice for MockDevice {
    type Buffer = Handle;
    type Memory = MockMemory;

    fn create_buffer(&self, size: u64, kind: BufferKind) -> FrameResult<(Handle, MockMemory)> {
        let mut state = self.state.lock();
        state.check_fail("buffer")?;
        let buffer = state.handle("buffer");
        state.calls.push(Call::CreateBuffer { buffer, kind });
        Ok((
            buffer,
            MockMemory {
                buffer,
                host_visible: kind.is_host_visible(),
                bytes: vec![0; size as usize],
            },
        ))
    }

    fn write_buffer(&self, memory: &mut MockMemory, data: &[u8]) -> FrameResult<()> {
        if !memory.host_visible {
            return Err(FrameError::NotHostVisible);
        }
        memory.bytes[..data.len()].copy_from_slice(data);
        self.record(Call::WriteBuffer(memory.buffer));
        Ok(())
    }

    fn destroy_buffer(&self, buffer: Handle, _memory: MockMemory) {
        let mut state = self.state.lock();
        state.release(buffer, "buffer");
        state.calls.push(Call::DestroyBuffer(buffer));
    }

    fn cmd_copy_buffer(&self, _command_buffer: Handle, src: Handle, dst: Handle, size: u64) {
        self.record(Call::CopyBuffer { src, dst, size });
    }
}

impl DrawDevice for MockDevice {
    type Pipeline = Handle;
    type PipelineLayout = Handle;
    type DescriptorSet = Handle;

    fn cmd_begin_render_pass(
        &self,
        _command_buffer: Handle,
        _render_pass: Handle,
        framebuffer: Handle,
        extent: Extent2D,
        _clear_color: [f32; 4],
    ) {
        self.record(Call::BeginRenderPass { framebuffer, extent });
    }

    fn cmd_bind_pipeline(&self, _command_buffer: Handle, pipeline: Handle) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_set_viewport_scissor(&self, _command_buffer: Handle, extent: Extent2D) {
        self.record(Call::SetViewportScissor(extent));
    }

    fn cmd_bind_vertex_buffer(&self, _command_buffer: Handle, buffer: Handle) {
        self.record(Call::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, _command_buffer: Handle, buffer: Handle) {
        self.record(Call::BindIndexBuffer(buffer));
    }

    fn cmd_bind_descriptor_set(&self, _command_buffer: Handle, _layout: Handle, set: Handle) {
        self.record(Call::BindDescriptorSet(set));
    }

    fn cmd_push_constants(&self, _command_buffer: Handle, _layout: Handle, bytes: &[u8]) {
        self.record(Call::PushConstants(bytes.to_vec()));
    }

    fn cmd_draw(&self, _command_buffer: Handle, vertex_count: u32) {
        self.record(Call::Draw(vertex_count));
    }

    fn cmd_draw_indexed(&self, _command_buffer: Handle, index_count: u32) {
        self.record(Call::DrawIndexed(index_count));
    }

    fn cmd_end_render_pass(&self, _command_buffer: Handle) {
        self.record(Call::EndRenderPass);
    }
}

/// Window whose framebuffer size the test controls.
#[derive(Clone)]
pub struct MockWindow(Arc<Mutex<Extent2D>>);

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self(Arc::new(Mutex::new(Extent2D::new(width, height))))
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.0.lock() = Extent2D::new(width, height);
    }
}

impl ExtentSource for MockWindow {
    fn framebuffer_extent(&self) -> Extent2D {
        *self.0.lock()
    }
}

/// Draw inputs uploaded through a throwaway transfer scheduler. Pipeline is
/// handle 500, layout 501; indexed draws use 6 indices, plain draws 3 vertices.
pub fn draw_resources(
    device: &Arc<MockDevice>,
    indexed: bool,
    descriptor_sets: Vec<Handle>,
) -> DrawResources<MockDevice> {
    let sync = SyncObjectPool::create(device.clone(), 1).unwrap();
    let mut transfer = TransferScheduler::new(device.clone(), sync.transfer_fence(), u64::MAX).unwrap();
    let vertex_buffer = transfer.stage(&[0u8; 36], BufferKind::Vertex).unwrap();
    let index_buffer = if indexed {
        Some((transfer.stage(&[0u8; 12], BufferKind::Index).unwrap(), 6))
    } else {
        None
    };
    DrawResources {
        pipeline: 500,
        layout: 501,
        vertex_buffer,
        vertex_count: 3,
        index_buffer,
        descriptor_sets,
        clear_color: [0.0, 0.0, 0.0, 1.0],
    }
}
