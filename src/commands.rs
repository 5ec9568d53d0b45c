use crate::{
    deletion::DeletionQueue,
    renderer::RenderData,
};

use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use log::info;

pub fn create_command_pools(
    device: &Device,
    data: &mut RenderData,
    deletion: &mut DeletionQueue<Device>,
) -> Result<()> {
    // GPU commands are not executed directly but recorded into
    // command buffers, whose memory is managed by a command
    // pool tied to one queue family. Each frame slot gets its
    // own pool: the RESET_COMMAND_BUFFER flag lets the frame
    // loop reset the slot's buffer individually before each
    // re-recording, instead of resetting pools wholesale.
    let info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(data.graphics_queue_family);

    for frame in &mut data.frames {
        let command_pool = unsafe { device.create_command_pool(&info, None)? };
        frame.command_pool = command_pool;

        deletion.push(move |device: &Device| unsafe {
            device.destroy_command_pool(command_pool, None);
        });
    }

    info!("Command pools created.");
    Ok(())
}

pub fn create_command_buffers(
    device: &Device,
    data: &mut RenderData,
) -> Result<()> {
    // One PRIMARY command buffer per frame slot, allocated from
    // the slot's own pool. Primary buffers are the ones a queue
    // accepts directly; the loop re-records this single buffer
    // every time the slot comes around, so one is enough.
    // Freeing is left to the pool's destruction.
    for frame in &mut data.frames {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(frame.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        frame.main_buffer = unsafe { device.allocate_command_buffers(&allocate_info)?[0] };
    }

    info!("Command buffers created.");
    Ok(())
}
