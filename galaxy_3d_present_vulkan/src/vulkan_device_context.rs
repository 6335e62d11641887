//! VulkanDeviceContext - device traits implemented over ash
//!
//! Wraps an already created logical device. The instance, the device and the
//! window surface stay owned by the caller and must outlive this context.

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_present::galaxy3d::{
    DeviceContext, DeviceQueues, Error, QueueFamilyIndices, Result, SurfaceDevice, SurfaceStatus, SyncDevice,
    timeout_nanos,
};
use galaxy_3d_present::galaxy3d::{
    CommandBufferHandle, CommandPoolHandle, DeviceHandle, FenceHandle, ImageHandle, ImageViewHandle,
    QueueHandle, SemaphoreHandle, SurfaceHandle, SwapchainHandle,
};
use galaxy_3d_present::galaxy3d::present::{SubmitSync, SurfaceSupport, SwapchainDesc, TextureFormat};
use galaxy_3d_present::{engine_debug, engine_error, engine_info};
use std::time::Duration;

use crate::vulkan_format::*;

const SOURCE: &str = "galaxy3d::vulkan";

/// Vulkan handle for an engine handle of the same object
fn vk_handle<H: Handle>(raw: u64) -> H {
    H::from_raw(raw)
}

/// Log a failed call (except the expected transient ones) and map it
fn vk_error(result: vk::Result, what: &str) -> Error {
    let error = vk_result_to_error(result, what);
    if error.is_transient() || error.is_surface_out_of_date() {
        engine_debug!(SOURCE, "{}: {:?}", what, result);
    } else {
        engine_error!(SOURCE, "{}: {:?}", what, result);
    }
    error
}

fn vk_create_error(result: vk::Result, what: &str) -> Error {
    engine_error!(SOURCE, "Failed to create {}: {:?}", what, result);
    vk_creation_error(result, &format!("Failed to create {}", what))
}

/// Vulkan implementation of the device traits
pub struct VulkanDeviceContext {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    transfer_queue: vk::Queue,
}

impl VulkanDeviceContext {
    /// Wrap an existing logical device
    ///
    /// The device must have been created with the swapchain extension and one
    /// queue (index 0) in every family of `families`.
    ///
    /// # Arguments
    ///
    /// * `entry` - Vulkan entry (for the surface loader)
    /// * `instance` - Instance the device was created from
    /// * `physical_device` - Physical device behind `device`
    /// * `device` - Logical device
    /// * `families` - Queue family of each role
    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        families: QueueFamilyIndices,
    ) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(entry, instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device);

        let (graphics_queue, present_queue, compute_queue, transfer_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
                device.get_device_queue(families.compute, 0),
                device.get_device_queue(families.transfer, 0),
            )
        };

        engine_info!(
            SOURCE,
            "Device context ready (graphics family {}, present family {})",
            families.graphics,
            families.present
        );

        Self {
            device: device.clone(),
            physical_device,
            surface_loader,
            swapchain_loader,
            families,
            graphics_queue,
            present_queue,
            compute_queue,
            transfer_queue,
        }
    }

    /// The wrapped ash device, for recording commands
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }
}

impl DeviceContext for VulkanDeviceContext {
    fn is_initialized(&self) -> bool {
        self.device.handle() != vk::Device::null()
    }

    fn device(&self) -> DeviceHandle {
        DeviceHandle::from_raw(self.device.handle().as_raw())
    }

    fn queues(&self) -> DeviceQueues {
        DeviceQueues {
            graphics: QueueHandle::from_raw(self.graphics_queue.as_raw()),
            present: QueueHandle::from_raw(self.present_queue.as_raw()),
            compute: QueueHandle::from_raw(self.compute_queue.as_raw()),
            transfer: QueueHandle::from_raw(self.transfer_queue.as_raw()),
        }
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.families
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| vk_error(e, "Failed to wait idle"))
        }
    }
}

impl SyncDevice for VulkanDeviceContext {
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        unsafe {
            self.device
                .create_fence(&create_info, None)
                .map(|fence| FenceHandle::from_raw(fence.as_raw()))
                .map_err(|e| vk_create_error(e, "fence"))
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.device.destroy_fence(vk_handle(fence.as_raw()), None);
        }
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<()> {
        let fences = [vk_handle::<vk::Fence>(fence.as_raw())];
        unsafe {
            self.device
                .wait_for_fences(&fences, true, timeout_nanos(timeout))
                .map_err(|e| vk_error(e, "Failed to wait for fence"))
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        let fences = [vk_handle::<vk::Fence>(fence.as_raw())];
        unsafe {
            self.device
                .reset_fences(&fences)
                .map_err(|e| vk_error(e, "Failed to reset fence"))
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe {
            self.device
                .create_semaphore(&create_info, None)
                .map(|semaphore| SemaphoreHandle::from_raw(semaphore.as_raw()))
                .map_err(|e| vk_create_error(e, "semaphore"))
        }
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.device.destroy_semaphore(vk_handle(semaphore.as_raw()), None);
        }
    }

    fn create_command_pool(&self, queue_family: u32) -> Result<CommandPoolHandle> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        unsafe {
            self.device
                .create_command_pool(&create_info, None)
                .map(|pool| CommandPoolHandle::from_raw(pool.as_raw()))
                .map_err(|e| vk_create_error(e, "command pool"))
        }
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.device.destroy_command_pool(vk_handle(pool.as_raw()), None);
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk_handle(pool.as_raw()))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| vk_create_error(e, "command buffer"))?
        };

        buffers
            .first()
            .map(|buffer| CommandBufferHandle::from_raw(buffer.as_raw()))
            .ok_or_else(|| vk_create_error(vk::Result::ERROR_UNKNOWN, "command buffer"))
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(vk_handle(command_buffer.as_raw()), vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error(e, "Failed to reset command buffer"))
        }
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(vk_handle(command_buffer.as_raw()), &begin_info)
                .map_err(|e| vk_error(e, "Failed to begin command buffer"))
        }
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(vk_handle(command_buffer.as_raw()))
                .map_err(|e| vk_error(e, "Failed to end command buffer"))
        }
    }

    fn queue_submit(&self, command_buffer: CommandBufferHandle, sync: &SubmitSync) -> Result<()> {
        let command_buffers = [vk_handle::<vk::CommandBuffer>(command_buffer.as_raw())];
        let wait_semaphores = [vk_handle::<vk::Semaphore>(sync.wait_semaphore.as_raw())];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [vk_handle::<vk::Semaphore>(sync.signal_semaphore.as_raw())];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], vk_handle(sync.fence.as_raw()))
                .map_err(|e| vk_error(e, "Failed to submit commands to GPU queue"))
        }
    }
}

impl SurfaceDevice for VulkanDeviceContext {
    fn surface_support(&self, surface: SurfaceHandle) -> Result<SurfaceSupport> {
        let surface = vk_handle::<vk::SurfaceKHR>(surface.as_raw());

        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
                .map_err(|e| vk_error(e, "Failed to get surface capabilities"))?;
            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
                .map_err(|e| vk_error(e, "Failed to get surface formats"))?;
            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
                .map_err(|e| vk_error(e, "Failed to get surface present modes"))?;

            let (supported_formats, unmapped) = surface_formats_from_vk(&formats);
            if !unmapped.is_empty() {
                engine_debug!(SOURCE, "Ignoring {} surface formats with no engine mapping: {:?}", unmapped.len(), unmapped);
            }

            Ok(SurfaceSupport {
                capabilities: capabilities_from_vk(&capabilities),
                formats: supported_formats,
                present_modes: present_modes.into_iter().filter_map(vk_to_present_mode).collect(),
            })
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc, old: SwapchainHandle) -> Result<SwapchainHandle> {
        let surface = vk_handle::<vk::SurfaceKHR>(desc.surface.as_raw());

        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
                .map_err(|e| vk_error(e, "Failed to get surface capabilities"))?
        };

        let shared_families = concurrent_families(&self.families);
        let (sharing_mode, family_indices) = match &shared_families {
            Some(indices) => (vk::SharingMode::CONCURRENT, indices.as_slice()),
            None => (vk::SharingMode::EXCLUSIVE, [].as_slice()),
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(desc.min_image_count)
            .image_format(format_to_vk(desc.format.format))
            .image_color_space(color_space_to_vk(desc.format.color_space))
            .image_extent(vk::Extent2D { width: desc.extent.width, height: desc.extent.height })
            .image_array_layers(1)
            .image_usage(usage_to_vk(desc.usage))
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(choose_composite_alpha(capabilities.supported_composite_alpha))
            .present_mode(present_mode_to_vk(desc.present_mode))
            .clipped(true)
            .old_swapchain(vk_handle(old.as_raw()));

        unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map(|swapchain| SwapchainHandle::from_raw(swapchain.as_raw()))
                .map_err(|e| vk_create_error(e, "swapchain"))
        }
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        unsafe {
            self.swapchain_loader.destroy_swapchain(vk_handle(swapchain.as_raw()), None);
        }
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> Result<Vec<ImageHandle>> {
        unsafe {
            self.swapchain_loader
                .get_swapchain_images(vk_handle(swapchain.as_raw()))
                .map(|images| images.iter().map(|image| ImageHandle::from_raw(image.as_raw())).collect())
                .map_err(|e| vk_error(e, "Failed to get swapchain images"))
        }
    }

    fn create_image_view(&self, image: ImageHandle, format: TextureFormat) -> Result<ImageViewHandle> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(vk_handle(image.as_raw()))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format_to_vk(format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map(|view| ImageViewHandle::from_raw(view.as_raw()))
                .map_err(|e| vk_create_error(e, "swapchain image view"))
        }
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe {
            self.device.destroy_image_view(vk_handle(view.as_raw()), None);
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
        timeout: Option<Duration>,
    ) -> Result<(u32, SurfaceStatus)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(
                    vk_handle(swapchain.as_raw()),
                    timeout_nanos(timeout),
                    vk_handle(signal.as_raw()),
                    vk::Fence::null(),
                )
                .map(|(index, suboptimal)| (index, surface_status(suboptimal)))
                .map_err(|e| vk_error(e, "Failed to acquire next swapchain image"))
        }
    }

    fn queue_present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> Result<SurfaceStatus> {
        let swapchains = [vk_handle::<vk::SwapchainKHR>(swapchain.as_raw())];
        let image_indices = [image_index];
        let wait_semaphores = [vk_handle::<vk::Semaphore>(wait.as_raw())];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // ash reports SUBOPTIMAL_KHR as Ok(true)
        unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
                .map(surface_status)
                .map_err(|e| vk_error(e, "Failed to present swapchain image"))
        }
    }
}
