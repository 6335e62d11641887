/*!
# Galaxy 3D Present

Frame pipelining and swapchain lifecycle for the Galaxy 3D rendering engine.

This crate keeps the CPU recording frames ahead of the GPU without corrupting
in-flight resources, and keeps the presentation surface alive across resizes
and out-of-date notifications. It never talks to a graphics API directly:
every GPU call goes through the device traits, which backends (Vulkan, ...)
implement over their own handles.

## Architecture

- **DeviceContext / SyncDevice / SurfaceDevice**: backend seam (device, queues, primitives)
- **FramePipeline**: N frames in flight, one fence + two semaphores + one command buffer each
- **PresentationSurface**: swapchain creation, recreation, acquire and present
- **FrameLoop**: one pipeline + one surface driving a complete frame
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod handle;
pub mod device;
pub mod swapchain;
pub mod frame_pipeline;
pub mod presentation_surface;
pub mod frame_loop;

// Scripted device for unit tests (no GPU required)
#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod mock_device;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, ErrorKind, Result, ResultExt};

    // Logger hub
    pub use crate::engine::Engine;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Backend seam
    pub use crate::device::{
        DeviceContext, SyncDevice, SurfaceDevice, DeviceQueues, QueueFamilyIndices,
        SurfaceStatus, timeout_nanos,
    };
    pub use crate::handle::*;

    // Presentation sub-module
    pub mod present {
        pub use crate::swapchain::*;
        pub use crate::frame_pipeline::{FramePipeline, FrameSlot, SubmitSync, MAX_FRAMES_IN_FLIGHT};
        pub use crate::presentation_surface::{PresentationSurface, AcquiredImage};
        pub use crate::frame_loop::{FrameLoop, FrameContext, FrameStatus};
    }
}
