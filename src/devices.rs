use std::collections::HashSet;

use crate::{
    queues::get_graphics_family_index,
    renderer::{
        RenderData,
        PORTABILITY_MACOS_VERSION,
        VALIDATION_ENABLED,
        VALIDATION_LAYER,
    },
    swapchain::get_swapchain_support,
};

use thiserror::Error;
use vulkanalia::prelude::v1_0::*;
use anyhow::{anyhow, Result};
use log::*;

/// Required device extensions:
///  - `KHR_SWAPCHAIN_EXTENSION`: presenting rendered images to
///    a surface is not part of the render-agnostic core API.
///  - `KHR_DYNAMIC_RENDERING_EXTENSION`: drawing into image
///    views directly, without render pass objects.
///  - `KHR_SYNCHRONIZATION2_EXTENSION`: the extended barrier
///    and queue submission interface.
pub const REQUIRED_EXTENSIONS: &[vk::ExtensionName] = &[
    vk::KHR_SWAPCHAIN_EXTENSION.name,
    vk::KHR_DYNAMIC_RENDERING_EXTENSION.name,
    vk::KHR_SYNCHRONIZATION2_EXTENSION.name,
];

// The macro will create an error type with a Display impl that
// prints the given string.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SuitabilityError(pub &'static str);

fn check_physical_device(
    instance: &Instance,
    data: &mut RenderData,
    physical_device: vk::PhysicalDevice,
) -> Result<()> {
    // The frame loop relies on Vulkan 1.3 features (dynamic
    // rendering and synchronization2), so anything older is
    // rejected up front.
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    if properties.api_version < vk::make_version(1, 3, 0) {
        return Err(anyhow!(SuitabilityError("Device does not support Vulkan 1.3.")));
    }

    // The device must expose a queue family with graphics
    // support; its index is stored for command pool and
    // swapchain creation later on.
    data.graphics_queue_family = get_graphics_family_index(instance, physical_device)?;

    // Check that every required device extension is present.
    let extensions = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device, None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>()
    };

    if !REQUIRED_EXTENSIONS.iter().all(|e| extensions.contains(e)) {
        return Err(anyhow!(SuitabilityError("Missing required device extensions.")));
    }

    // Finally, the device's swapchain support for our surface
    // must offer at least one image format and one present
    // mode, otherwise there is nothing to present to.
    let support = get_swapchain_support(instance, data, physical_device)?;
    if support.formats.is_empty() || support.present_modes.is_empty() {
        return Err(anyhow!(SuitabilityError("Insufficient swapchain support.")));
    }

    Ok(())
}

pub fn pick_physical_device(
    instance: &Instance,
    data: &mut RenderData,
) -> Result<vk::PhysicalDevice> {
    // A system may expose several physical devices (a dedicated
    // and an integrated GPU, for example). We enumerate them in
    // order and pick the first one that satisfies the engine's
    // requirements, logging the reason for every rejection.
    for device in unsafe { instance.enumerate_physical_devices()? } {
        let properties = unsafe { instance.get_physical_device_properties(device) };

        if let Err(error) = check_physical_device(instance, data, device) {
            warn!("Skipping physical device ({}): {}", properties.device_name, error);
        } else {
            info!("Selected physical device: {}", properties.device_name);
            return Ok(device);
        }
    }

    Err(anyhow!(SuitabilityError("Failed to find suitable physical device.")))
}

pub fn create_logical_device(
    entry: &Entry,
    instance: &Instance,
    data: &mut RenderData,
) -> Result<Device> {
    // The logical device is the application's interface to the
    // physical device; every other Vulkan object is created
    // through it. We request a single queue from the graphics
    // family, with the mandatory priority array (one queue, so
    // a lone 1.0).
    let priorities = &[1.0];
    let graphics_queues = &[
        vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(data.graphics_queue_family)
            .queue_priorities(priorities)
            .build()
    ];

    // Device-level validation layers are deprecated, but
    // setting them keeps older implementations happy.
    let layers = if VALIDATION_ENABLED {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let mut extensions = REQUIRED_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    // Some implementations are not fully conformant, so certain
    // Vulkan extensions need to be enabled to ensure
    // portability.
    if cfg!(target_os = "macos") && entry.version()? >= PORTABILITY_MACOS_VERSION {
        extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());
    }

    // Vulkan 1.2 features: buffer device addresses (raw GPU
    // pointers to buffer memory) and descriptor indexing
    // (bindless-style descriptor arrays), both of which later
    // resource abstractions will build on.
    let mut features12 = vk::PhysicalDeviceVulkan12Features::builder()
        .buffer_device_address(true)
        .descriptor_indexing(true);

    // Vulkan 1.3 features: synchronization2 for the extended
    // barrier/submit interface the frame loop records with, and
    // dynamic rendering to draw without render pass objects.
    let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
        .synchronization2(true)
        .dynamic_rendering(true);

    let info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(graphics_queues)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .push_next(&mut features12)
        .push_next(&mut features13);

    // Finally, create the device and retrieve our handle to the
    // graphics queue.
    let device = unsafe { instance.create_device(data.physical_device, &info, None)? };
    data.graphics_queue = unsafe { device.get_device_queue(data.graphics_queue_family, 0) };

    info!("Logical device created.");
    Ok(device)
}
