//! PresentationSurface - swapchain lifecycle on a window surface
//!
//! State machine: `Uninitialized -> Ready` (initialize), `Ready -> Ready`
//! (recreate), `Ready -> Uninitialized` (shutdown). Acquire and present never
//! repair a stale swapchain themselves; they report
//! `Error::SurfaceOutOfDate` and the caller recreates.

use std::time::Duration;
use crate::device::{SurfaceDevice, SurfaceStatus};
use crate::error::{Error, Result};
use crate::handle::{ImageHandle, ImageViewHandle, SemaphoreHandle, SurfaceHandle, SwapchainHandle};
use crate::swapchain::{
    negotiate, ColorSpace, Extent2D, PresentMode, SurfaceFormat, SwapchainConfig, SwapchainDesc, TextureFormat,
};

const SOURCE: &str = "galaxy3d::PresentationSurface";

/// Image handed out by [`PresentationSurface::acquire_next_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index into the swapchain images
    pub index: u32,
    /// `Suboptimal` means the image is usable but the caller should recreate soon
    pub status: SurfaceStatus,
}

impl AcquiredImage {
    pub fn is_suboptimal(&self) -> bool {
        self.status == SurfaceStatus::Suboptimal
    }
}

/// A live swapchain with its images and views
struct Swapchain {
    handle: SwapchainHandle,
    desc: SwapchainDesc,
    images: Vec<ImageHandle>,
    image_views: Vec<ImageViewHandle>,
}

fn destroy_views<D: SurfaceDevice + ?Sized>(context: &D, views: &mut Vec<ImageViewHandle>) {
    for view in views.drain(..).rev() {
        context.destroy_image_view(view);
    }
}

/// Negotiate and create a swapchain with its views
///
/// On failure everything created here is destroyed again; `old` is only
/// passed along as the recreation hint, never destroyed.
fn build_swapchain<D: SurfaceDevice + ?Sized>(
    context: &D,
    surface: SurfaceHandle,
    width: u32,
    height: u32,
    config: &SwapchainConfig,
    old: SwapchainHandle,
) -> Result<Swapchain> {
    let support = context.surface_support(surface)?;
    let desc = negotiate(surface, width, height, config, &support)?;

    let handle = context.create_swapchain(&desc, old)?;

    let images = match context.swapchain_images(handle) {
        Ok(images) => images,
        Err(e) => {
            context.destroy_swapchain(handle);
            return Err(e);
        }
    };

    let mut image_views = Vec::with_capacity(images.len());
    for &image in &images {
        match context.create_image_view(image, desc.format.format) {
            Ok(view) => image_views.push(view),
            Err(e) => {
                destroy_views(context, &mut image_views);
                context.destroy_swapchain(handle);
                return Err(e);
            }
        }
    }

    Ok(Swapchain { handle, desc, images, image_views })
}

/// Swapchain manager for one window surface
///
/// Borrows the device context and never owns the surface: the window-system
/// integration creates the surface and must keep it alive longer than this.
pub struct PresentationSurface<'ctx, D: SurfaceDevice + ?Sized> {
    context: Option<&'ctx D>,
    surface: SurfaceHandle,
    config: SwapchainConfig,
    swapchain: Option<Swapchain>,
}

impl<'ctx, D: SurfaceDevice + ?Sized> PresentationSurface<'ctx, D> {
    /// Create an uninitialized surface manager
    pub fn new() -> Self {
        Self {
            context: None,
            surface: SurfaceHandle::NULL,
            config: SwapchainConfig::default(),
            swapchain: None,
        }
    }

    /// Create the swapchain for `surface` at `width` x `height`
    ///
    /// Unsupported preferences in `config` fall back to documented defaults
    /// (see [`crate::swapchain::negotiate`]).
    pub fn initialize(
        &mut self,
        context: &'ctx D,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        config: SwapchainConfig,
    ) -> Result<()> {
        if !context.is_initialized() {
            return Err(Error::NotInitialized("Invalid or uninitialized device context".to_string()));
        }
        if surface.is_null() {
            return Err(Error::InvalidArgument("Invalid surface provided".to_string()));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!("Invalid swapchain dimensions {}x{}", width, height)));
        }
        if self.is_initialized() {
            return Err(Error::InvalidArgument("Presentation surface already initialized".to_string()));
        }

        let swapchain = build_swapchain(context, surface, width, height, &config, SwapchainHandle::NULL)
            .map_err(|e| {
                crate::engine_error!(SOURCE, "Failed to create swapchain: {}", e);
                e
            })?;

        crate::engine_info!(
            SOURCE,
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            swapchain.desc.extent.width,
            swapchain.desc.extent.height,
            swapchain.images.len(),
            swapchain.desc.format.format,
            swapchain.desc.present_mode
        );

        self.context = Some(context);
        self.surface = surface;
        self.config = config;
        self.swapchain = Some(swapchain);
        Ok(())
    }

    /// Rebuild the swapchain at a new size (e.g. after a window resize)
    ///
    /// Waits for the device to go idle first. The new swapchain is created
    /// with the current one as recreation hint, and the current one is only
    /// destroyed once its replacement exists. If creation fails the previous
    /// swapchain stays in place (retired: acquiring from it reports out of
    /// date) and the call can be retried.
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(context) = self.context else {
            return Err(Error::NotInitialized("Swapchain not initialized".to_string()));
        };
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!("Invalid swapchain dimensions {}x{}", width, height)));
        }

        context.wait_idle()?;

        let old_handle = self.swapchain.as_ref().map_or(SwapchainHandle::NULL, |s| s.handle);
        let new_swapchain = build_swapchain(context, self.surface, width, height, &self.config, old_handle)
            .map_err(|e| {
                crate::engine_error!(SOURCE, "Failed to recreate swapchain: {}", e);
                e
            })?;

        if let Some(mut old) = self.swapchain.replace(new_swapchain) {
            destroy_views(context, &mut old.image_views);
            context.destroy_swapchain(old.handle);
        }

        let extent = self.extent();
        crate::engine_info!(SOURCE, "Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Acquire the next image to render into
    ///
    /// `signal` is signaled once the image may be written, which can be after
    /// this call returns.
    pub fn acquire_next_image(&self, signal: SemaphoreHandle, timeout: Option<Duration>) -> Result<AcquiredImage> {
        let (context, swapchain) = self.ready()?;

        match context.acquire_next_image(swapchain.handle, signal, timeout) {
            Ok((index, status)) => {
                if status == SurfaceStatus::Suboptimal {
                    crate::engine_debug!(SOURCE, "Acquired image {} from a suboptimal swapchain", index);
                }
                Ok(AcquiredImage { index, status })
            }
            Err(e) => {
                if e.is_surface_out_of_date() {
                    crate::engine_debug!(SOURCE, "Swapchain out of date during acquire");
                } else if !e.is_transient() {
                    crate::engine_error!(SOURCE, "Failed to acquire swapchain image: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Present `image_index` once `wait` is signaled
    pub fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<SurfaceStatus> {
        let (context, swapchain) = self.ready()?;
        if image_index as usize >= swapchain.images.len() {
            return Err(Error::InvalidArgument(format!(
                "Image index {} out of range (count: {})",
                image_index,
                swapchain.images.len()
            )));
        }

        context.queue_present(swapchain.handle, image_index, wait).map_err(|e| {
            if e.is_surface_out_of_date() {
                crate::engine_debug!(SOURCE, "Swapchain out of date during present");
            } else {
                crate::engine_error!(SOURCE, "Failed to present swapchain image: {}", e);
            }
            e
        })
    }

    /// Destroy the image views, then the swapchain
    ///
    /// Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        if let Some(mut swapchain) = self.swapchain.take() {
            if let Err(e) = context.wait_idle() {
                crate::engine_warn!(SOURCE, "wait_idle failed during shutdown: {}", e);
            }
            destroy_views(context, &mut swapchain.image_views);
            context.destroy_swapchain(swapchain.handle);
        }
        self.surface = SurfaceHandle::NULL;

        crate::engine_info!(SOURCE, "Shut down");
    }

    // ===== ACCESSORS =====

    pub fn is_initialized(&self) -> bool {
        self.swapchain.is_some()
    }

    /// Swapchain handle (null when uninitialized)
    pub fn swapchain(&self) -> SwapchainHandle {
        self.swapchain.as_ref().map_or(SwapchainHandle::NULL, |s| s.handle)
    }

    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    /// Preferences this surface was initialized with
    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    pub fn surface_format(&self) -> Option<SurfaceFormat> {
        self.swapchain.as_ref().map(|s| s.desc.format)
    }

    pub fn format(&self) -> Option<TextureFormat> {
        self.surface_format().map(|f| f.format)
    }

    pub fn color_space(&self) -> Option<ColorSpace> {
        self.surface_format().map(|f| f.color_space)
    }

    pub fn present_mode(&self) -> Option<PresentMode> {
        self.swapchain.as_ref().map(|s| s.desc.present_mode)
    }

    /// Current image size (zero when uninitialized)
    pub fn extent(&self) -> Extent2D {
        self.swapchain.as_ref().map_or(Extent2D::default(), |s| s.desc.extent)
    }

    pub fn image_count(&self) -> u32 {
        self.images().len() as u32
    }

    pub fn images(&self) -> &[ImageHandle] {
        self.swapchain.as_ref().map(|s| s.images.as_slice()).unwrap_or(&[])
    }

    pub fn image_views(&self) -> &[ImageViewHandle] {
        self.swapchain.as_ref().map(|s| s.image_views.as_slice()).unwrap_or(&[])
    }

    pub fn image(&self, index: u32) -> Option<ImageHandle> {
        self.images().get(index as usize).copied()
    }

    pub fn image_view(&self, index: u32) -> Option<ImageViewHandle> {
        self.image_views().get(index as usize).copied()
    }

    fn ready(&self) -> Result<(&'ctx D, &Swapchain)> {
        match (self.context, self.swapchain.as_ref()) {
            (Some(context), Some(swapchain)) => Ok((context, swapchain)),
            _ => Err(Error::NotInitialized("Swapchain not initialized".to_string())),
        }
    }
}

impl<D: SurfaceDevice + ?Sized> Default for PresentationSurface<'_, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SurfaceDevice + ?Sized> Drop for PresentationSurface<'_, D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "presentation_surface_tests.rs"]
mod tests;
