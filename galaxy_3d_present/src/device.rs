//! Device traits - the seam between the frame logic and a graphics backend
//!
//! The device context itself (instance, physical device selection, queue
//! creation) is built elsewhere; this crate only borrows it. Backends
//! implement these traits over their own API, tests implement them with a
//! scripted fake.

use std::time::Duration;
use crate::error::Result;
use crate::frame_pipeline::SubmitSync;
use crate::handle::*;
use crate::swapchain::{SurfaceSupport, SwapchainDesc, TextureFormat};

/// Queue family indices of the logical device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
    pub present: u32,
    /// Transfer lives on its own family
    pub has_discrete_transfer: bool,
    /// Compute lives on its own family
    pub has_discrete_compute: bool,
}

impl QueueFamilyIndices {
    /// Every queue role served by the same family
    pub const fn single_family(family: u32) -> Self {
        Self {
            graphics: family,
            compute: family,
            transfer: family,
            present: family,
            has_discrete_transfer: false,
            has_discrete_compute: false,
        }
    }
}

/// Queues of the logical device
///
/// Roles without a dedicated queue carry the graphics queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceQueues {
    pub graphics: QueueHandle,
    pub present: QueueHandle,
    pub compute: QueueHandle,
    pub transfer: QueueHandle,
}

/// An initialized logical device with its queues
pub trait DeviceContext {
    /// True once the device exists; every entry point checks this first
    fn is_initialized(&self) -> bool;

    fn device(&self) -> DeviceHandle;

    fn queues(&self) -> DeviceQueues;

    fn queue_families(&self) -> QueueFamilyIndices;

    /// Block until the device has no outstanding work
    fn wait_idle(&self) -> Result<()>;
}

/// Per-frame synchronization primitives and command recording scopes
pub trait SyncDevice: DeviceContext {
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);

    /// Wait for the fence to be signaled
    ///
    /// `None` waits forever. Returns `Error::Timeout` on expiry and leaves the
    /// fence untouched.
    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<()>;
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    fn create_semaphore(&self) -> Result<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Create a command pool whose buffers can be reset individually
    fn create_command_pool(&self, queue_family: u32) -> Result<CommandPoolHandle>;
    /// Destroy a pool, freeing its command buffers
    fn destroy_command_pool(&self, pool: CommandPoolHandle);
    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle>;
    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()>;

    /// Open the recording scope for a single submission
    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()>;
    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()>;

    /// Submit on the graphics queue
    ///
    /// Waits on `sync.wait_semaphore` before color output, signals
    /// `sync.signal_semaphore` and `sync.fence` on completion.
    fn queue_submit(&self, command_buffer: CommandBufferHandle, sync: &SubmitSync) -> Result<()>;
}

/// Raw result of an acquire or present call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// Swapchain matches the surface
    Optimal,
    /// Usable, but recreating soon would improve quality or performance
    Suboptimal,
}

/// Swapchain operations on a window surface
pub trait SurfaceDevice: DeviceContext {
    fn surface_support(&self, surface: SurfaceHandle) -> Result<SurfaceSupport>;

    /// Create a swapchain; `old` (possibly null) is passed as the recreation hint
    fn create_swapchain(&self, desc: &SwapchainDesc, old: SwapchainHandle) -> Result<SwapchainHandle>;
    fn destroy_swapchain(&self, swapchain: SwapchainHandle);

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> Result<Vec<ImageHandle>>;

    fn create_image_view(&self, image: ImageHandle, format: TextureFormat) -> Result<ImageViewHandle>;
    fn destroy_image_view(&self, view: ImageViewHandle);

    /// Acquire the next image, signaling `signal` once it can be written
    ///
    /// Stale swapchains fail with `Error::SurfaceOutOfDate`, expiry with
    /// `Error::Timeout`.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        timeout: Option<Duration>,
    ) -> Result<(u32, SurfaceStatus)>;

    /// Queue `image_index` for presentation once `wait` is signaled
    fn queue_present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> Result<SurfaceStatus>;
}

/// Convert an optional timeout to the nanosecond form graphics APIs expect
pub fn timeout_nanos(timeout: Option<Duration>) -> u64 {
    timeout.map_or(u64::MAX, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_nanos() {
        assert_eq!(timeout_nanos(None), u64::MAX);
        assert_eq!(timeout_nanos(Some(Duration::from_millis(2))), 2_000_000);
        assert_eq!(timeout_nanos(Some(Duration::MAX)), u64::MAX);
    }

    #[test]
    fn test_single_family() {
        let families = QueueFamilyIndices::single_family(3);
        assert_eq!(families.graphics, 3);
        assert_eq!(families.present, 3);
        assert!(!families.has_discrete_compute);
        assert!(!families.has_discrete_transfer);
    }
}
