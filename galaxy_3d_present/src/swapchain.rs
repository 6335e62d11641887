//! Swapchain configuration and negotiation
//!
//! A [`SwapchainConfig`] states what the application would like; the surface
//! reports what it supports ([`SurfaceSupport`]); [`negotiate`] turns both
//! into the concrete [`SwapchainDesc`] handed to the backend.

use bitflags::bitflags;
use crate::error::{Error, Result};
use crate::handle::SurfaceHandle;

const SOURCE: &str = "galaxy3d::Swapchain";

/// Pixel formats a swapchain can be created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    A2B10G10R10_UNORM,
    A2R10G10B10_UNORM,
    R16G16B16A16_SFLOAT,
    R5G6B5_UNORM,
    B5G6R5_UNORM,
}

/// Color spaces a surface can present in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    ExtendedSrgbLinear,
    DisplayP3Nonlinear,
    Hdr10St2084,
    PassThrough,
}

/// Presentation modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// No vsync, may tear
    Immediate,
    /// Vsync, newest frame replaces the queued one
    Mailbox,
    /// Vsync, strict queue (always supported)
    Fifo,
    /// Vsync unless a frame is late
    FifoRelaxed,
}

/// Format + color space pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: TextureFormat,
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    pub const fn new(format: TextureFormat, color_space: ColorSpace) -> Self {
        Self { format, color_space }
    }
}

/// Size of the swapchain images in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

bitflags! {
    /// How swapchain images will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SwapchainUsage: u32 {
        const COLOR_ATTACHMENT = 1 << 0;
        const TRANSFER_SRC = 1 << 1;
        const TRANSFER_DST = 1 << 2;
        const STORAGE = 1 << 3;
    }
}

/// Formats tried, in order, when the preferred format is unavailable
pub const FALLBACK_FORMATS: [SurfaceFormat; 2] = [
    SurfaceFormat::new(TextureFormat::B8G8R8A8_SRGB, ColorSpace::SrgbNonlinear),
    SurfaceFormat::new(TextureFormat::R8G8B8A8_SRGB, ColorSpace::SrgbNonlinear),
];

/// Present mode used when the preferred one is unavailable
pub const FALLBACK_PRESENT_MODE: PresentMode = PresentMode::Fifo;

/// Application preferences for a swapchain
///
/// Fixed for the lifetime of a presentation surface; recreation reuses it
/// with the new extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub preferred_present_mode: PresentMode,
    pub preferred_format: SurfaceFormat,
    pub min_image_count: u32,
    pub usage: SwapchainUsage,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            preferred_present_mode: PresentMode::Mailbox,
            preferred_format: SurfaceFormat::new(TextureFormat::B8G8R8A8_UNORM, ColorSpace::SrgbNonlinear),
            min_image_count: 3,
            usage: SwapchainUsage::COLOR_ATTACHMENT,
        }
    }
}

/// Surface capabilities as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means no upper bound
    pub max_image_count: u32,
    /// `None` when the window lets the swapchain pick its size
    pub current_extent: Option<Extent2D>,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
    pub supported_usage: SwapchainUsage,
}

/// Everything the surface supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSupport {
    pub capabilities: SurfaceCapabilities,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

/// Negotiated swapchain parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub surface: SurfaceHandle,
    pub min_image_count: u32,
    pub format: SurfaceFormat,
    pub extent: Extent2D,
    pub present_mode: PresentMode,
    pub usage: SwapchainUsage,
}

/// Pick the surface format: preferred, then [`FALLBACK_FORMATS`], then whatever comes first
pub fn choose_surface_format(preferred: SurfaceFormat, available: &[SurfaceFormat]) -> Result<SurfaceFormat> {
    let first = available.first().copied().ok_or_else(|| {
        Error::InitializationFailed("Surface reports no supported formats".to_string())
    })?;

    let chosen = std::iter::once(preferred)
        .chain(FALLBACK_FORMATS)
        .find(|candidate| available.contains(candidate));

    match chosen {
        Some(format) => {
            if format != preferred {
                crate::engine_warn!(SOURCE, "Preferred format {:?} unsupported, falling back to {:?}", preferred, format);
            }
            Ok(format)
        }
        None => {
            crate::engine_warn!(SOURCE, "No preferred or fallback format supported, using {:?}", first);
            Ok(first)
        }
    }
}

/// Pick the present mode: preferred, else FIFO
pub fn choose_present_mode(preferred: PresentMode, available: &[PresentMode]) -> PresentMode {
    if available.contains(&preferred) {
        preferred
    } else {
        crate::engine_warn!(SOURCE, "Present mode {:?} unsupported, falling back to {:?}", preferred, FALLBACK_PRESENT_MODE);
        FALLBACK_PRESENT_MODE
    }
}

/// Clamp the desired image count into the supported range
pub fn choose_image_count(desired: u32, caps: &SurfaceCapabilities) -> u32 {
    let mut count = desired.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

/// The fixed surface extent, or the requested one clamped to the supported range
pub fn choose_extent(width: u32, height: u32, caps: &SurfaceCapabilities) -> Extent2D {
    match caps.current_extent {
        Some(extent) => extent,
        None => Extent2D {
            width: width.clamp(caps.min_extent.width, caps.max_extent.width.max(caps.min_extent.width)),
            height: height.clamp(caps.min_extent.height, caps.max_extent.height.max(caps.min_extent.height)),
        },
    }
}

/// Build a swapchain description from preferences and surface support
pub fn negotiate(
    surface: SurfaceHandle,
    width: u32,
    height: u32,
    config: &SwapchainConfig,
    support: &SurfaceSupport,
) -> Result<SwapchainDesc> {
    let caps = &support.capabilities;

    let usage = config.usage & caps.supported_usage;
    if !usage.contains(SwapchainUsage::COLOR_ATTACHMENT) {
        return Err(Error::InitializationFailed(
            "Surface does not support color attachment usage".to_string(),
        ));
    }
    if usage != config.usage {
        crate::engine_warn!(SOURCE, "Dropping unsupported swapchain usage {:?}", config.usage - usage);
    }

    let extent = choose_extent(width, height, caps);
    if extent.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "Surface extent {}x{} has zero area",
            extent.width, extent.height
        )));
    }

    Ok(SwapchainDesc {
        surface,
        min_image_count: choose_image_count(config.min_image_count, caps),
        format: choose_surface_format(config.preferred_format, &support.formats)?,
        extent,
        present_mode: choose_present_mode(config.preferred_present_mode, &support.present_modes),
        usage,
    })
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
