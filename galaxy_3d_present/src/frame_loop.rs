//! FrameLoop - one frame pipeline and one presentation surface driving frames
//!
//! There is no global "current frame" state: every window owns its own
//! `FrameLoop`, and several loops can share one device context.

use crate::device::{SurfaceDevice, SurfaceStatus, SyncDevice};
use crate::error::{Error, Result};
use crate::frame_pipeline::{FramePipeline, SubmitSync};
use crate::handle::{CommandBufferHandle, ImageHandle, ImageViewHandle, SurfaceHandle};
use crate::presentation_surface::PresentationSurface;
use crate::swapchain::{Extent2D, SwapchainConfig};

const SOURCE: &str = "galaxy3d::FrameLoop";

/// What the record callback gets for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Frame slot in use, in `[0, frames_in_flight)`
    pub frame_index: u32,
    /// Already in the recording state
    pub command_buffer: CommandBufferHandle,
    pub image_index: u32,
    pub image: ImageHandle,
    pub image_view: ImageViewHandle,
    pub extent: Extent2D,
    pub sync: SubmitSync,
}

/// Outcome of [`FrameLoop::run_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, but the swapchain should be recreated
    Suboptimal,
    /// The surface changed; call [`FrameLoop::recreate`] before the next frame
    OutOfDate,
}

/// Frames in flight plus the swapchain they present to
pub struct FrameLoop<'ctx, D: SyncDevice + SurfaceDevice + ?Sized> {
    context: Option<&'ctx D>,
    frames: FramePipeline<'ctx, D>,
    surface: PresentationSurface<'ctx, D>,
}

impl<'ctx, D: SyncDevice + SurfaceDevice + ?Sized> FrameLoop<'ctx, D> {
    pub fn new() -> Self {
        Self {
            context: None,
            frames: FramePipeline::new(),
            surface: PresentationSurface::new(),
        }
    }

    /// Create the frame slots, then the swapchain
    ///
    /// If the swapchain cannot be created the slots are destroyed again.
    pub fn initialize(
        &mut self,
        context: &'ctx D,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        frames_in_flight: u32,
        config: SwapchainConfig,
    ) -> Result<()> {
        self.frames.initialize(context, frames_in_flight)?;

        if let Err(e) = self.surface.initialize(context, surface, width, height, config) {
            self.frames.shutdown();
            return Err(e);
        }

        self.context = Some(context);
        Ok(())
    }

    /// Record, submit and present one frame
    ///
    /// `record` gets the frame's command buffer already in the recording
    /// state; it only records commands. Submission and presentation are done
    /// here with the slot's semaphores and fence.
    ///
    /// On `FrameStatus::OutOfDate` from the acquire nothing was reset or
    /// submitted and the loop stays on the same slot; recreate and call again.
    ///
    /// If recording or submission fails the loop also stays on the same slot
    /// with a signaled fence. The acquired image was never presented, so
    /// recreate (or shut down) before the next frame.
    pub fn run_frame<F>(&mut self, record: F) -> Result<FrameStatus>
    where
        F: FnOnce(&FrameContext) -> Result<()>,
    {
        let Some(context) = self.context else {
            return Err(Error::NotInitialized("Frame loop not initialized".to_string()));
        };

        self.frames.wait_for_frame(None)?;
        let slot = self.frames.current_frame()?;
        let frame_index = slot.index();
        let command_buffer = slot.command_buffer();
        let sync = self.frames.submit_sync()?;

        let acquired = match self.surface.acquire_next_image(sync.wait_semaphore, None) {
            Ok(acquired) => acquired,
            Err(e) if e.is_surface_out_of_date() => return Ok(FrameStatus::OutOfDate),
            Err(e) => return Err(e),
        };

        let (Some(image), Some(image_view)) = (
            self.surface.image(acquired.index),
            self.surface.image_view(acquired.index),
        ) else {
            crate::engine_bail!(SOURCE, "Acquired image index {} out of range", acquired.index);
        };
        crate::engine_trace!(SOURCE, "Frame {} acquired image {}", frame_index, acquired.index);

        self.frames.reset_command_buffer()?;
        context.begin_command_buffer(command_buffer)?;

        let frame = FrameContext {
            frame_index,
            command_buffer,
            image_index: acquired.index,
            image,
            image_view,
            extent: self.surface.extent(),
            sync,
        };
        record(&frame)?;

        context.end_command_buffer(command_buffer)?;

        // Reset right before submitting so the fence is never left unsignaled
        // without work that will signal it
        self.frames.reset_fence()?;
        if let Err(e) = context.queue_submit(command_buffer, &sync) {
            crate::engine_error!(SOURCE, "Failed to submit frame {}: {}", frame_index, e);
            // Nothing was queued: the slot needs a signaled fence again
            if let Err(fence_error) = self.frames.recreate_fence() {
                crate::engine_error!(SOURCE, "Failed to restore fence of frame {}: {}", frame_index, fence_error);
            }
            return Err(e);
        }

        let status = match self.surface.present(acquired.index, sync.signal_semaphore) {
            Ok(SurfaceStatus::Optimal) if !acquired.is_suboptimal() => FrameStatus::Presented,
            Ok(_) => FrameStatus::Suboptimal,
            Err(e) if e.is_surface_out_of_date() => FrameStatus::OutOfDate,
            Err(e) => return Err(e),
        };

        self.frames.end_frame();
        Ok(status)
    }

    /// Rebuild the swapchain at a new size
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        self.surface.recreate(width, height)
    }

    /// Destroy the frame slots, then the swapchain
    pub fn shutdown(&mut self) {
        if self.context.take().is_none() {
            return;
        }
        self.frames.shutdown();
        self.surface.shutdown();
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn frames(&self) -> &FramePipeline<'ctx, D> {
        &self.frames
    }

    pub fn surface(&self) -> &PresentationSurface<'ctx, D> {
        &self.surface
    }
}

impl<D: SyncDevice + SurfaceDevice + ?Sized> Default for FrameLoop<'_, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SyncDevice + SurfaceDevice + ?Sized> Drop for FrameLoop<'_, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "frame_loop_tests.rs"]
mod tests;
