use crate::{
    deletion::DeletionQueue,
    image::create_image_view,
    renderer::RenderData,
};

use vulkanalia::{
    prelude::v1_0::*,
    vk::KhrSurfaceExtension,
    vk::KhrSwapchainExtension,
};

use log::*;
use anyhow::Result;
use winit::window::Window;

pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub fn get_swapchain_support(
    instance: &Instance,
    data: &RenderData,
    physical_device: vk::PhysicalDevice,
) -> Result<SwapchainSupport> {
    // The swapchain is the queue of images waiting to be
    // presented to the window surface; since not every device
    // can present to every surface, its capabilities, formats
    // and present modes have to be queried up front.
    Ok(SwapchainSupport {
        capabilities: unsafe {
            instance.get_physical_device_surface_capabilities_khr(
                physical_device,
                data.surface,
            )?
        },
        formats: unsafe {
            instance.get_physical_device_surface_formats_khr(
                physical_device,
                data.surface,
            )?
        },
        present_modes: unsafe {
            instance.get_physical_device_surface_present_modes_khr(
                physical_device,
                data.surface,
            )?
        },
    })
}

fn get_swapchain_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> vk::SurfaceFormatKHR {
    // Preferred surface format: 8 bits per channel BGRA in the
    // standard non-linear sRGB color space. If the surface does
    // not offer it, fall back on whatever comes first.
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .cloned()
        .unwrap_or(formats[0])
}

fn get_swapchain_present_mode(
    present_modes: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    // MAILBOX replaces queued images with newer ones instead of
    // blocking when the queue is full (commonly called triple
    // buffering); FIFO, the only mode guaranteed to exist,
    // presents on the vertical blank like classic VSync and
    // caps the frame rate to the monitor's refresh rate.
    present_modes
        .iter()
        .cloned()
        .find(|&m| m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn get_swapchain_extent(
    window: &Window,
    capabilities: vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    // The extent is the resolution of the swapchain images,
    // normally the current surface resolution. Window managers
    // that allow the two to differ signal it by setting the
    // current extent to u32::MAX, in which case we clamp the
    // window's framebuffer size to the supported range.
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        let size = window.inner_size();
        vk::Extent2D::builder()
            .width(size.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ))
            .height(size.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ))
            .build()
    }
}

pub fn create_swapchain(
    window: &Window,
    instance: &Instance,
    device: &Device,
    data: &mut RenderData,
    deletion: &mut DeletionQueue<Device>,
) -> Result<()> {
    let support = get_swapchain_support(instance, data, data.physical_device)?;

    let surface_format = get_swapchain_surface_format(&support.formats);
    let present_mode = get_swapchain_present_mode(&support.present_modes);
    let extent = get_swapchain_extent(window, support.capabilities);

    // Sticking to the minimum image count means occasionally
    // waiting on the driver between frames, so ask for one
    // more (clamped to the maximum, where 0 means unbounded).
    let mut image_count = support.capabilities.min_image_count + 1;
    if support.capabilities.max_image_count != 0
        && image_count > support.capabilities.max_image_count {
        image_count = support.capabilities.max_image_count;
    }

    // All work goes through the one graphics queue, so the
    // images can stay EXCLUSIVE to its family and never need an
    // ownership transfer. The images are used both as color
    // attachments (for future pipeline work) and as transfer
    // destinations, since the frame loop clears them with a
    // transfer-stage clear command.
    let queue_family_indices = &[data.graphics_queue_family];

    let info = vk::SwapchainCreateInfoKHR::builder()
        .surface(data.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .queue_family_indices(queue_family_indices)
        .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(vk::SwapchainKHR::null());

    data.swapchain = unsafe { device.create_swapchain_khr(&info, None)? };
    data.swapchain_images = unsafe { device.get_swapchain_images_khr(data.swapchain)? };
    data.swapchain_format = surface_format.format;
    data.swapchain_extent = extent;

    let swapchain = data.swapchain;
    deletion.push(move |device: &Device| unsafe {
        device.destroy_swapchain_khr(swapchain, None);
    });

    info!("Swapchain created.");
    Ok(())
}

pub fn create_swapchain_image_views(
    device: &Device,
    data: &mut RenderData,
    deletion: &mut DeletionQueue<Device>,
) -> Result<()> {
    // Images are never accessed directly, only through image
    // views describing how to read them; one color view per
    // swapchain image.
    data.swapchain_image_views = data
        .swapchain_images
        .iter()
        .map(|&i| create_image_view(
            device,
            i,
            data.swapchain_format,
            vk::ImageAspectFlags::COLOR,
        ))
        .collect::<Result<Vec<_>, _>>()?;

    let views = data.swapchain_image_views.clone();
    deletion.push(move |device: &Device| unsafe {
        views.iter().for_each(|&v| device.destroy_image_view(v, None));
    });

    info!("Swapchain image views created.");
    Ok(())
}
