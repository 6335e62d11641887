//! FramePipeline - frames in flight and their synchronization
//!
//! Each of the N frame slots owns one completion fence, one image-acquired
//! semaphore, one render-complete semaphore and one command pool with a single
//! primary command buffer. Frame k always runs on slot `k % N`, and a slot is
//! only reused after its fence reports that the GPU finished the previous use,
//! so at most N frames of GPU work are ever outstanding.

use std::time::Duration;
use crate::device::SyncDevice;
use crate::error::{Error, Result};
use crate::handle::{CommandBufferHandle, CommandPoolHandle, FenceHandle, SemaphoreHandle};

const SOURCE: &str = "galaxy3d::FramePipeline";

/// Largest supported number of frames in flight
pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

/// Synchronization objects and command buffer of one frame in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSlot {
    index: u32,
    in_flight_fence: FenceHandle,
    image_available: SemaphoreHandle,
    render_finished: SemaphoreHandle,
    command_pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
}

impl FrameSlot {
    /// Slot index in `[0, frames_in_flight)`
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Signaled by the GPU when this slot's submission completes
    pub fn fence(&self) -> FenceHandle {
        self.in_flight_fence
    }

    /// Signaled when the acquired swapchain image can be written
    pub fn image_available_semaphore(&self) -> SemaphoreHandle {
        self.image_available
    }

    /// Signaled when this slot's rendering is done; present waits on it
    pub fn render_finished_semaphore(&self) -> SemaphoreHandle {
        self.render_finished
    }

    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }
}

/// Which signals a frame's queue submission must wait on and signal
///
/// Acquire signals `wait_semaphore`, the submission waits on it and signals
/// `signal_semaphore` + `fence`, present waits on `signal_semaphore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSync {
    pub wait_semaphore: SemaphoreHandle,
    pub signal_semaphore: SemaphoreHandle,
    pub fence: FenceHandle,
}

/// Partially built slot; destroys whatever it holds unless finished
struct SlotBuilder<'a, D: SyncDevice + ?Sized> {
    device: &'a D,
    fence: Option<FenceHandle>,
    image_available: Option<SemaphoreHandle>,
    render_finished: Option<SemaphoreHandle>,
    command_pool: Option<CommandPoolHandle>,
}

impl<'a, D: SyncDevice + ?Sized> SlotBuilder<'a, D> {
    fn build(device: &'a D, index: u32, queue_family: u32) -> Result<FrameSlot> {
        let mut builder = Self {
            device,
            fence: None,
            image_available: None,
            render_finished: None,
            command_pool: None,
        };

        // Created signaled so the first wait on each slot returns immediately
        let fence = *builder.fence.insert(device.create_fence(true)?);
        let image_available = *builder.image_available.insert(device.create_semaphore()?);
        let render_finished = *builder.render_finished.insert(device.create_semaphore()?);
        let command_pool = *builder.command_pool.insert(device.create_command_pool(queue_family)?);
        let command_buffer = device.allocate_command_buffer(command_pool)?;

        builder.fence = None;
        builder.image_available = None;
        builder.render_finished = None;
        builder.command_pool = None;

        Ok(FrameSlot {
            index,
            in_flight_fence: fence,
            image_available,
            render_finished,
            command_pool,
            command_buffer,
        })
    }
}

impl<D: SyncDevice + ?Sized> Drop for SlotBuilder<'_, D> {
    fn drop(&mut self) {
        if let Some(pool) = self.command_pool.take() {
            self.device.destroy_command_pool(pool);
        }
        if let Some(semaphore) = self.render_finished.take() {
            self.device.destroy_semaphore(semaphore);
        }
        if let Some(semaphore) = self.image_available.take() {
            self.device.destroy_semaphore(semaphore);
        }
        if let Some(fence) = self.fence.take() {
            self.device.destroy_fence(fence);
        }
    }
}

/// Destroy a slot in reverse creation order (the pool frees its command buffer)
fn destroy_slot<D: SyncDevice + ?Sized>(device: &D, slot: &FrameSlot) {
    device.destroy_command_pool(slot.command_pool);
    device.destroy_semaphore(slot.render_finished);
    device.destroy_semaphore(slot.image_available);
    device.destroy_fence(slot.in_flight_fence);
}

/// Round-robin owner of the frames in flight
///
/// Borrows the device context, so it can never outlive it.
///
/// # Example
///
/// ```ignore
/// let mut frames = FramePipeline::new();
/// frames.initialize(&device, 2)?;
/// loop {
///     frames.begin_frame()?;
///     let sync = frames.submit_sync()?;
///     // record into frames.current_frame()?.command_buffer(), submit with `sync`
///     frames.end_frame();
/// }
/// ```
pub struct FramePipeline<'ctx, D: SyncDevice + ?Sized> {
    context: Option<&'ctx D>,
    slots: Vec<FrameSlot>,
    current_frame: u32,
}

impl<'ctx, D: SyncDevice + ?Sized> FramePipeline<'ctx, D> {
    /// Create an uninitialized pipeline
    pub fn new() -> Self {
        Self {
            context: None,
            slots: Vec::new(),
            current_frame: 0,
        }
    }

    /// Create `frames_in_flight` slots (1 to 4)
    ///
    /// Either every slot is built or none is: on failure the slots created so
    /// far are destroyed and the pipeline stays uninitialized.
    pub fn initialize(&mut self, context: &'ctx D, frames_in_flight: u32) -> Result<()> {
        if !context.is_initialized() {
            return Err(Error::NotInitialized("Invalid or uninitialized device context".to_string()));
        }
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight) {
            return Err(Error::InvalidArgument(format!(
                "Frames in flight must be between 1 and {}, got {}",
                MAX_FRAMES_IN_FLIGHT, frames_in_flight
            )));
        }
        if self.is_initialized() {
            return Err(Error::InvalidArgument("Frame pipeline already initialized".to_string()));
        }

        let queue_family = context.queue_families().graphics;
        let mut slots = Vec::with_capacity(frames_in_flight as usize);

        for index in 0..frames_in_flight {
            match SlotBuilder::build(context, index, queue_family) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    crate::engine_error!(SOURCE, "Failed to create frame slot {}: {}", index, e);
                    for slot in slots.iter().rev() {
                        destroy_slot(context, slot);
                    }
                    return Err(e);
                }
            }
        }

        self.context = Some(context);
        self.slots = slots;
        self.current_frame = 0;

        crate::engine_info!(SOURCE, "Initialized with {} frames in flight", frames_in_flight);
        Ok(())
    }

    /// Wait for the device to go idle, then destroy every slot
    ///
    /// Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        if let Err(e) = context.wait_idle() {
            crate::engine_warn!(SOURCE, "wait_idle failed during shutdown: {}", e);
        }

        for slot in self.slots.drain(..) {
            destroy_slot(context, &slot);
        }
        self.current_frame = 0;

        crate::engine_info!(SOURCE, "Shut down");
    }

    /// Wait (without limit) for the current slot, then reset it for recording
    pub fn begin_frame(&self) -> Result<()> {
        self.begin_frame_with_timeout(None)
    }

    /// Wait for the current slot's previous GPU work, then reset it for recording
    ///
    /// On timeout nothing is reset, so the call can simply be retried.
    pub fn begin_frame_with_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.wait_for_frame(timeout)?;
        self.reset_frame()
    }

    /// Advance to the next slot
    pub fn end_frame(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight();
    }

    /// Wait for the current slot's fence
    pub fn wait_for_frame(&self, timeout: Option<Duration>) -> Result<()> {
        let (context, slot) = self.current()?;
        context.wait_for_fence(slot.in_flight_fence, timeout).map_err(|e| {
            if e.is_transient() {
                crate::engine_debug!(SOURCE, "Timed out waiting for frame {}", slot.index);
            } else {
                crate::engine_error!(SOURCE, "Failed to wait for frame {}: {}", slot.index, e);
            }
            e
        })
    }

    /// Unsignal the current slot's fence
    pub fn reset_fence(&self) -> Result<()> {
        let (context, slot) = self.current()?;
        context.reset_fence(slot.in_flight_fence)
    }

    /// Reset the current slot's command buffer, then its fence
    ///
    /// Only valid after [`Self::wait_for_frame`] succeeded for this slot. The
    /// fence goes last so a failed command buffer reset leaves it signaled.
    pub fn reset_frame(&self) -> Result<()> {
        self.reset_command_buffer()?;
        self.reset_fence()
    }

    /// Replace the current slot's fence with a new signaled one
    ///
    /// For a slot whose fence was reset but whose submission then failed:
    /// nothing will ever signal the old fence.
    pub fn recreate_fence(&mut self) -> Result<()> {
        let (context, slot) = self.current()?;
        let (index, old_fence) = (slot.index, slot.in_flight_fence);

        let fence = context.create_fence(true)?;
        context.destroy_fence(old_fence);
        self.slots[index as usize].in_flight_fence = fence;

        crate::engine_debug!(SOURCE, "Recreated fence of frame {}", index);
        Ok(())
    }

    /// Reset the current slot's command buffer for a new recording
    pub fn reset_command_buffer(&self) -> Result<()> {
        let (context, slot) = self.current()?;
        context.reset_command_buffer(slot.command_buffer).map_err(|e| {
            crate::engine_error!(SOURCE, "Failed to reset command buffer of frame {}: {}", slot.index, e);
            e
        })
    }

    /// The current slot
    pub fn current_frame(&self) -> Result<&FrameSlot> {
        self.current().map(|(_, slot)| slot)
    }

    /// Submission wiring for the current slot
    pub fn submit_sync(&self) -> Result<SubmitSync> {
        let slot = self.current_frame()?;
        Ok(SubmitSync {
            wait_semaphore: slot.image_available,
            signal_semaphore: slot.render_finished,
            fence: slot.in_flight_fence,
        })
    }

    pub fn current_frame_index(&self) -> u32 {
        self.current_frame
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.slots.len() as u32
    }

    /// All slots, in index order
    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some() && !self.slots.is_empty()
    }

    fn current(&self) -> Result<(&'ctx D, &FrameSlot)> {
        match (self.context, self.slots.get(self.current_frame as usize)) {
            (Some(context), Some(slot)) => Ok((context, slot)),
            _ => Err(Error::NotInitialized("Frame pipeline not initialized".to_string())),
        }
    }
}

impl<D: SyncDevice + ?Sized> Default for FramePipeline<'_, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SyncDevice + ?Sized> Drop for FramePipeline<'_, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "frame_pipeline_tests.rs"]
mod tests;
