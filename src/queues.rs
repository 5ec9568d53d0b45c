use crate::devices::SuitabilityError;

use vulkanalia::prelude::v1_0::*;
use anyhow::{anyhow, Result};

pub fn get_graphics_family_index(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    // Every command in Vulkan is submitted to a queue, and each
    // queue belongs to a family that supports a subset of
    // operations (graphics, compute, transfer...). We drive the
    // whole engine from a single graphics queue, so all we need
    // is the index of the first family with the GRAPHICS flag.
    // Presentation support is not queried separately: on every
    // common device a graphics-capable family can also present.
    let queues = unsafe {
        instance.get_physical_device_queue_family_properties(physical_device)
    };

    queues
        .iter()
        .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)
        .ok_or_else(|| anyhow!(SuitabilityError("Missing graphics queue family.")))
}
