//! Mock device for unit tests (no GPU required)
//!
//! Implements every device trait over plain bookkeeping:
//! - objects get increasing raw handles and are tracked while alive
//! - creations of a given kind can be scripted to fail
//! - fences model GPU completion (pending until completed by the test, or
//!   immediately when `auto_complete` is on)
//! - swapchains can be marked out of date, and are retired when passed as a
//!   recreation hint
//! - every call is appended to an ordered event log

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::device::*;
use crate::error::{Error, Result};
use crate::frame_pipeline::SubmitSync;
use crate::handle::*;
use crate::swapchain::*;

// ============================================================================
// Scripting types
// ============================================================================

/// Kinds of objects the mock creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockObject {
    Fence,
    Semaphore,
    CommandPool,
    CommandBuffer,
    Swapchain,
    ImageView,
}

/// Ordered log of device calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Create(MockObject, u64),
    Destroy(MockObject, u64),
    WaitIdle,
    WaitFence(FenceHandle),
    ResetFence(FenceHandle),
    ResetCommandBuffer(CommandBufferHandle),
    BeginCommandBuffer(CommandBufferHandle),
    EndCommandBuffer(CommandBufferHandle),
    CreateSwapchain { swapchain: SwapchainHandle, old: SwapchainHandle, old_alive: bool },
    Acquire { swapchain: SwapchainHandle, signal: SemaphoreHandle, image_index: u32 },
    Submit(SubmitSync),
    Present { swapchain: SwapchainHandle, image_index: u32, wait: SemaphoreHandle },
}

#[derive(Debug, Clone, Copy, Default)]
struct FenceState {
    signaled: bool,
    /// Submitted work not yet completed
    pending: bool,
}

#[derive(Debug, Clone)]
struct SwapchainState {
    desc: SwapchainDesc,
    images: Vec<ImageHandle>,
    next_image: u32,
    out_of_date: bool,
}

struct MockState {
    initialized: bool,
    next_handle: u64,
    live: FxHashMap<u64, MockObject>,
    created: FxHashMap<MockObject, u32>,
    fail_at: FxHashMap<MockObject, u32>,
    fail_command_buffer_reset: bool,
    fail_submit: bool,
    auto_complete: bool,
    suboptimal: bool,
    fences: FxHashMap<u64, FenceState>,
    /// Command pool -> its command buffer
    pool_buffers: FxHashMap<u64, u64>,
    swapchains: FxHashMap<u64, SwapchainState>,
    retired: FxHashSet<u64>,
    support: SurfaceSupport,
    events: Vec<MockEvent>,
}

impl MockState {
    fn create(&mut self, kind: MockObject) -> Result<u64> {
        let count = {
            let created = self.created.entry(kind).or_insert(0);
            *created += 1;
            *created
        };
        if self.fail_at.get(&kind) == Some(&count) {
            self.fail_at.remove(&kind);
            return Err(Error::InitializationFailed(format!("Scripted {:?} creation failure", kind)));
        }

        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.insert(raw, kind);
        self.events.push(MockEvent::Create(kind, raw));
        Ok(raw)
    }

    fn destroy(&mut self, kind: MockObject, raw: u64) {
        assert_eq!(
            self.live.remove(&raw),
            Some(kind),
            "destroying {:?} {} which is not alive",
            kind,
            raw
        );
        self.events.push(MockEvent::Destroy(kind, raw));
    }

    fn is_alive(&self, kind: MockObject, raw: u64) -> bool {
        self.live.get(&raw) == Some(&kind)
    }

    fn submit(&mut self, sync: &SubmitSync) {
        let fence = self.fences.get_mut(&sync.fence.as_raw()).expect("submit with unknown fence");
        assert!(!fence.signaled, "submit with a fence that was not reset");
        fence.pending = true;
        self.events.push(MockEvent::Submit(*sync));
    }
}

/// Default surface: every format/mode the tests need, window-defined extent
pub fn default_support() -> SurfaceSupport {
    SurfaceSupport {
        capabilities: SurfaceCapabilities {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: None,
            min_extent: Extent2D::new(1, 1),
            max_extent: Extent2D::new(8192, 8192),
            supported_usage: SwapchainUsage::all(),
        },
        formats: vec![
            SurfaceFormat::new(TextureFormat::B8G8R8A8_UNORM, ColorSpace::SrgbNonlinear),
            SurfaceFormat::new(TextureFormat::B8G8R8A8_SRGB, ColorSpace::SrgbNonlinear),
        ],
        present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
    }
}

// ============================================================================
// Mock Device
// ============================================================================

pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                initialized: true,
                next_handle: 0,
                live: FxHashMap::default(),
                created: FxHashMap::default(),
                fail_at: FxHashMap::default(),
                fail_command_buffer_reset: false,
                fail_submit: false,
                auto_complete: true,
                suboptimal: false,
                fences: FxHashMap::default(),
                pool_buffers: FxHashMap::default(),
                swapchains: FxHashMap::default(),
                retired: FxHashSet::default(),
                support: default_support(),
                events: Vec::new(),
            }),
        }
    }

    /// A device context that reports itself as not initialized
    pub fn uninitialized() -> Self {
        let device = Self::new();
        device.lock().initialized = false;
        device
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    // ===== SCRIPTING =====

    /// Make the `nth` (1-based) creation of `kind` from now on fail
    pub fn fail_nth(&self, kind: MockObject, nth: u32) {
        let mut state = self.lock();
        let already = state.created.get(&kind).copied().unwrap_or(0);
        state.fail_at.insert(kind, already + nth);
    }

    pub fn fail_command_buffer_reset(&self, fail: bool) {
        self.lock().fail_command_buffer_reset = fail;
    }

    /// Reject every later queue submission (nothing reaches the GPU)
    pub fn fail_submit(&self, fail: bool) {
        self.lock().fail_submit = fail;
    }

    /// When on, a pending fence completes as soon as it is waited on
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.lock().auto_complete = auto_complete;
    }

    pub fn set_support(&self, support: SurfaceSupport) {
        self.lock().support = support;
    }

    /// Report every later acquire/present as suboptimal
    pub fn set_suboptimal(&self, suboptimal: bool) {
        self.lock().suboptimal = suboptimal;
    }

    /// Make every existing swapchain stale (window resized)
    pub fn mark_surface_out_of_date(&self) {
        for swapchain in self.lock().swapchains.values_mut() {
            swapchain.out_of_date = true;
        }
    }

    /// Simulate a queue submission with the given wiring
    pub fn submit(&self, sync: &SubmitSync) {
        self.lock().submit(sync);
    }

    /// Complete the GPU work guarded by `fence`
    pub fn complete(&self, fence: FenceHandle) {
        if let Some(state) = self.lock().fences.get_mut(&fence.as_raw()) {
            state.pending = false;
            state.signaled = true;
        }
    }

    // ===== INSPECTION =====

    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Objects currently alive
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn live_count_of(&self, kind: MockObject) -> usize {
        self.lock().live.values().filter(|k| **k == kind).count()
    }

    pub fn is_alive(&self, kind: MockObject, raw: u64) -> bool {
        self.lock().is_alive(kind, raw)
    }

    pub fn fence_signaled(&self, fence: FenceHandle) -> bool {
        self.lock().fences.get(&fence.as_raw()).map_or(false, |f| f.signaled)
    }

    pub fn fence_pending(&self, fence: FenceHandle) -> bool {
        self.lock().fences.get(&fence.as_raw()).map_or(false, |f| f.pending)
    }

    pub fn count_events(&self, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        self.lock().events.iter().filter(|e| predicate(e)).count()
    }

    /// Extent a live swapchain was created with
    pub fn swapchain_extent(&self, swapchain: SwapchainHandle) -> Option<Extent2D> {
        self.lock().swapchains.get(&swapchain.as_raw()).map(|s| s.desc.extent)
    }
}

impl DeviceContext for MockDevice {
    fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    fn device(&self) -> DeviceHandle {
        DeviceHandle::from_raw(0xd0)
    }

    fn queues(&self) -> DeviceQueues {
        let queue = QueueHandle::from_raw(0x10);
        DeviceQueues { graphics: queue, present: queue, compute: queue, transfer: queue }
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices::single_family(0)
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.lock();
        for fence in state.fences.values_mut() {
            if fence.pending {
                fence.pending = false;
                fence.signaled = true;
            }
        }
        state.events.push(MockEvent::WaitIdle);
        Ok(())
    }
}

impl SyncDevice for MockDevice {
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let mut state = self.lock();
        let raw = state.create(MockObject::Fence)?;
        state.fences.insert(raw, FenceState { signaled, pending: false });
        Ok(FenceHandle::from_raw(raw))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.lock();
        assert!(!state.fences[&fence.as_raw()].pending, "destroying a fence with pending work");
        state.fences.remove(&fence.as_raw());
        state.destroy(MockObject::Fence, fence.as_raw());
    }

    fn wait_for_fence(&self, fence: FenceHandle, _timeout: Option<Duration>) -> Result<()> {
        let mut state = self.lock();
        let auto_complete = state.auto_complete;
        state.events.push(MockEvent::WaitFence(fence));
        let fence_state = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or_else(|| Error::BackendError("wait on unknown fence".to_string()))?;

        if fence_state.signaled {
            return Ok(());
        }
        if fence_state.pending && auto_complete {
            fence_state.pending = false;
            fence_state.signaled = true;
            return Ok(());
        }
        Err(Error::Timeout("Timeout waiting for fence".to_string()))
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let mut state = self.lock();
        let fence_state = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or_else(|| Error::BackendError("reset of unknown fence".to_string()))?;
        fence_state.signaled = false;
        state.events.push(MockEvent::ResetFence(fence));
        Ok(())
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        self.lock().create(MockObject::Semaphore).map(SemaphoreHandle::from_raw)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.lock().destroy(MockObject::Semaphore, semaphore.as_raw());
    }

    fn create_command_pool(&self, _queue_family: u32) -> Result<CommandPoolHandle> {
        self.lock().create(MockObject::CommandPool).map(CommandPoolHandle::from_raw)
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        let mut state = self.lock();
        // Buffers are freed with their pool
        if let Some(raw) = state.pool_buffers.remove(&pool.as_raw()) {
            state.destroy(MockObject::CommandBuffer, raw);
        }
        state.destroy(MockObject::CommandPool, pool.as_raw());
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let mut state = self.lock();
        assert!(state.is_alive(MockObject::CommandPool, pool.as_raw()));
        let raw = state.create(MockObject::CommandBuffer)?;
        state.pool_buffers.insert(pool.as_raw(), raw);
        Ok(CommandBufferHandle::from_raw(raw))
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        let mut state = self.lock();
        if state.fail_command_buffer_reset {
            return Err(Error::BackendError("Failed to reset command buffer".to_string()));
        }
        state.events.push(MockEvent::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        self.lock().events.push(MockEvent::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        self.lock().events.push(MockEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn queue_submit(&self, command_buffer: CommandBufferHandle, sync: &SubmitSync) -> Result<()> {
        let mut state = self.lock();
        assert!(state.live.contains_key(&command_buffer.as_raw()), "submit of a freed command buffer");
        if state.fail_submit {
            return Err(Error::OutOfMemory);
        }
        state.submit(sync);
        Ok(())
    }
}

impl SurfaceDevice for MockDevice {
    fn surface_support(&self, _surface: SurfaceHandle) -> Result<SurfaceSupport> {
        Ok(self.lock().support.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc, old: SwapchainHandle) -> Result<SwapchainHandle> {
        let mut state = self.lock();
        let old_alive = !old.is_null() && state.is_alive(MockObject::Swapchain, old.as_raw());
        if !old.is_null() {
            // Passing a swapchain as the hint retires it, even if creation fails
            state.retired.insert(old.as_raw());
        }

        let raw = state.create(MockObject::Swapchain)?;
        let images = (0..desc.min_image_count)
            .map(|i| ImageHandle::from_raw(0x1000 * raw + u64::from(i)))
            .collect();
        state.swapchains.insert(raw, SwapchainState {
            desc: *desc,
            images,
            next_image: 0,
            out_of_date: false,
        });

        let swapchain = SwapchainHandle::from_raw(raw);
        state.events.push(MockEvent::CreateSwapchain { swapchain, old, old_alive });
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        let mut state = self.lock();
        state.swapchains.remove(&swapchain.as_raw());
        state.retired.remove(&swapchain.as_raw());
        state.destroy(MockObject::Swapchain, swapchain.as_raw());
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> Result<Vec<ImageHandle>> {
        self.lock()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|s| s.images.clone())
            .ok_or_else(|| Error::BackendError("unknown swapchain".to_string()))
    }

    fn create_image_view(&self, _image: ImageHandle, _format: TextureFormat) -> Result<ImageViewHandle> {
        self.lock().create(MockObject::ImageView).map(ImageViewHandle::from_raw)
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        self.lock().destroy(MockObject::ImageView, view.as_raw());
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        _timeout: Option<Duration>,
    ) -> Result<(u32, SurfaceStatus)> {
        let mut state = self.lock();
        let retired = state.retired.contains(&swapchain.as_raw());
        let suboptimal = state.suboptimal;
        let chain = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or_else(|| Error::BackendError("unknown swapchain".to_string()))?;

        if chain.out_of_date || retired {
            return Err(Error::SurfaceOutOfDate("Swapchain out of date".to_string()));
        }

        let image_index = chain.next_image;
        chain.next_image = (chain.next_image + 1) % chain.images.len() as u32;
        state.events.push(MockEvent::Acquire { swapchain, signal, image_index });

        let status = if suboptimal { SurfaceStatus::Suboptimal } else { SurfaceStatus::Optimal };
        Ok((image_index, status))
    }

    fn queue_present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> Result<SurfaceStatus> {
        let mut state = self.lock();
        let out_of_date = state
            .swapchains
            .get(&swapchain.as_raw())
            .map_or(true, |s| s.out_of_date);
        state.events.push(MockEvent::Present { swapchain, image_index, wait });

        if out_of_date {
            return Err(Error::SurfaceOutOfDate("Swapchain out of date".to_string()));
        }
        Ok(if state.suboptimal { SurfaceStatus::Suboptimal } else { SurfaceStatus::Optimal })
    }
}
