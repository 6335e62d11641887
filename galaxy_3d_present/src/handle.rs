//! Opaque GPU object handles
//!
//! The core never dereferences these: they are raw 64-bit values handed back
//! and forth with the backend. A distinct type per object kind keeps a fence
//! from being passed where a semaphore is expected.

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u64);

        impl $name {
            /// The null handle
            pub const NULL: Self = Self(0);

            /// Wrap a raw backend handle value
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw backend handle value
            pub const fn as_raw(self) -> u64 {
                self.0
            }

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// Logical device
    DeviceHandle
);
define_handle!(
    /// Device queue
    QueueHandle
);
define_handle!(
    /// Window surface, owned by the window-system integration
    SurfaceHandle
);
define_handle!(
    /// Chain of presentable images
    SwapchainHandle
);
define_handle!(
    /// Swapchain image, owned by the swapchain
    ImageHandle
);
define_handle!(
    /// View onto a swapchain image
    ImageViewHandle
);
define_handle!(
    /// GPU-to-CPU completion signal
    FenceHandle
);
define_handle!(
    /// GPU-to-GPU ordering signal
    SemaphoreHandle
);
define_handle!(
    /// Command pool backing one frame slot
    CommandPoolHandle
);
define_handle!(
    /// Primary command buffer of one frame slot
    CommandBufferHandle
);
