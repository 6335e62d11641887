//! Conversions between engine presentation types and Vulkan types
//!
//! Pure functions only, testable without a GPU.

use ash::vk;
use galaxy_3d_present::galaxy3d::{Error, QueueFamilyIndices, SurfaceStatus};
use galaxy_3d_present::galaxy3d::present::{
    ColorSpace, Extent2D, PresentMode, SurfaceCapabilities, SurfaceFormat, SwapchainUsage, TextureFormat,
};

// ===== FORMATS =====

pub(crate) fn format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::A2B10G10R10_UNORM => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::A2R10G10B10_UNORM => vk::Format::A2R10G10B10_UNORM_PACK32,
        TextureFormat::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R5G6B5_UNORM => vk::Format::R5G6B5_UNORM_PACK16,
        TextureFormat::B5G6R5_UNORM => vk::Format::B5G6R5_UNORM_PACK16,
    }
}

/// `None` for formats a swapchain of this engine never uses
pub(crate) fn vk_to_format(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::B8G8R8A8_UNORM),
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::B8G8R8A8_SRGB),
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::R8G8B8A8_UNORM),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::R8G8B8A8_SRGB),
        vk::Format::A2B10G10R10_UNORM_PACK32 => Some(TextureFormat::A2B10G10R10_UNORM),
        vk::Format::A2R10G10B10_UNORM_PACK32 => Some(TextureFormat::A2R10G10B10_UNORM),
        vk::Format::R16G16B16A16_SFLOAT => Some(TextureFormat::R16G16B16A16_SFLOAT),
        vk::Format::R5G6B5_UNORM_PACK16 => Some(TextureFormat::R5G6B5_UNORM),
        vk::Format::B5G6R5_UNORM_PACK16 => Some(TextureFormat::B5G6R5_UNORM),
        _ => None,
    }
}

pub(crate) fn color_space_to_vk(color_space: ColorSpace) -> vk::ColorSpaceKHR {
    match color_space {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::ExtendedSrgbLinear => vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        ColorSpace::DisplayP3Nonlinear => vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        ColorSpace::Hdr10St2084 => vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        ColorSpace::PassThrough => vk::ColorSpaceKHR::PASS_THROUGH_EXT,
    }
}

pub(crate) fn vk_to_color_space(color_space: vk::ColorSpaceKHR) -> Option<ColorSpace> {
    match color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => Some(ColorSpace::SrgbNonlinear),
        vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => Some(ColorSpace::ExtendedSrgbLinear),
        vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT => Some(ColorSpace::DisplayP3Nonlinear),
        vk::ColorSpaceKHR::HDR10_ST2084_EXT => Some(ColorSpace::Hdr10St2084),
        vk::ColorSpaceKHR::PASS_THROUGH_EXT => Some(ColorSpace::PassThrough),
        _ => None,
    }
}

/// Split the surface's formats into the ones the engine can use (in the
/// surface's order) and the ones it has no mapping for
pub(crate) fn surface_formats_from_vk(
    formats: &[vk::SurfaceFormatKHR],
) -> (Vec<SurfaceFormat>, Vec<vk::SurfaceFormatKHR>) {
    let mut supported = Vec::with_capacity(formats.len());
    let mut unmapped = Vec::new();

    for &format in formats {
        match (vk_to_format(format.format), vk_to_color_space(format.color_space)) {
            (Some(texture_format), Some(color_space)) => {
                supported.push(SurfaceFormat::new(texture_format, color_space));
            }
            _ => unmapped.push(format),
        }
    }

    (supported, unmapped)
}

// ===== PRESENT MODES =====

pub(crate) fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub(crate) fn vk_to_present_mode(mode: vk::PresentModeKHR) -> Option<PresentMode> {
    match mode {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

/// Status for the `suboptimal` flag ash returns from acquire and present
pub(crate) fn surface_status(suboptimal: bool) -> SurfaceStatus {
    if suboptimal { SurfaceStatus::Suboptimal } else { SurfaceStatus::Optimal }
}

// ===== USAGE / CAPABILITIES =====

const USAGE_MAP: [(SwapchainUsage, vk::ImageUsageFlags); 4] = [
    (SwapchainUsage::COLOR_ATTACHMENT, vk::ImageUsageFlags::COLOR_ATTACHMENT),
    (SwapchainUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
    (SwapchainUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
    (SwapchainUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
];

pub(crate) fn usage_to_vk(usage: SwapchainUsage) -> vk::ImageUsageFlags {
    USAGE_MAP
        .iter()
        .filter(|(engine, _)| usage.contains(*engine))
        .fold(vk::ImageUsageFlags::empty(), |flags, (_, vk_flag)| flags | *vk_flag)
}

pub(crate) fn vk_to_usage(flags: vk::ImageUsageFlags) -> SwapchainUsage {
    USAGE_MAP
        .iter()
        .filter(|(_, vk_flag)| flags.contains(*vk_flag))
        .fold(SwapchainUsage::empty(), |usage, (engine, _)| usage | *engine)
}

pub(crate) fn capabilities_from_vk(caps: &vk::SurfaceCapabilitiesKHR) -> SurfaceCapabilities {
    // u32::MAX means the swapchain extent decides the window size
    let current_extent = (caps.current_extent.width != u32::MAX)
        .then(|| Extent2D::new(caps.current_extent.width, caps.current_extent.height));

    SurfaceCapabilities {
        min_image_count: caps.min_image_count,
        max_image_count: caps.max_image_count,
        current_extent,
        min_extent: Extent2D::new(caps.min_image_extent.width, caps.min_image_extent.height),
        max_extent: Extent2D::new(caps.max_image_extent.width, caps.max_image_extent.height),
        supported_usage: vk_to_usage(caps.supported_usage_flags),
    }
}

/// Opaque when supported, else the first mode the surface offers
pub(crate) fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Queue families that must share swapchain images, if graphics and present differ
pub(crate) fn concurrent_families(families: &QueueFamilyIndices) -> Option<[u32; 2]> {
    (families.graphics != families.present).then_some([families.graphics, families.present])
}

// ===== ERRORS =====

/// Map a failed Vulkan call to an engine error
pub(crate) fn vk_result_to_error(result: vk::Result, what: &str) -> Error {
    match result {
        vk::Result::TIMEOUT | vk::Result::NOT_READY => Error::Timeout(format!("{}: {:?}", what, result)),
        vk::Result::ERROR_OUT_OF_DATE_KHR => Error::SurfaceOutOfDate(format!("{}: {:?}", what, result)),
        vk::Result::ERROR_DEVICE_LOST => Error::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Error::OutOfMemory,
        _ => Error::BackendError(format!("{}: {:?}", what, result)),
    }
}

/// Map a failed object creation; anything but memory exhaustion or device
/// loss is an initialization failure
pub(crate) fn vk_creation_error(result: vk::Result, what: &str) -> Error {
    match vk_result_to_error(result, what) {
        Error::BackendError(_) | Error::Timeout(_) | Error::SurfaceOutOfDate(_) => {
            Error::InitializationFailed(format!("{}: {:?}", what, result))
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
