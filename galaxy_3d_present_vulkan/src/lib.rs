/*!
# Galaxy 3D Present - Vulkan Backend

Vulkan implementation of the galaxy_3d_present device traits, using the Ash
library for Vulkan bindings.

Instance and logical device creation stay with the application; this crate
wraps the finished device and provides fences, semaphores, command buffers and
swapchains to `FramePipeline`, `PresentationSurface` and `FrameLoop`.

# Example

```ignore
use galaxy_3d_present::galaxy3d::present::{FrameLoop, SwapchainConfig};
use galaxy_3d_present_vulkan::galaxy3d::VulkanDeviceContext;

let context = VulkanDeviceContext::new(&entry, &instance, physical_device, &device, families);
let mut frame_loop = FrameLoop::new();
frame_loop.initialize(&context, surface, 800, 600, 2, SwapchainConfig::default())?;
```
*/

mod vulkan_format;
mod vulkan_device_context;

// Main galaxy3d namespace module
pub mod galaxy3d {
    pub use crate::vulkan_device_context::VulkanDeviceContext;
}
