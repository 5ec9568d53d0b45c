use crate::{
    deletion::DeletionQueue,
    renderer::RenderData,
};

use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use log::info;

pub fn create_sync_objects(
    device: &Device,
    data: &mut RenderData,
    deletion: &mut DeletionQueue<Device>,
) -> Result<()> {
    // Acquiring, rendering and presenting all run
    // asynchronously, so the ordering between them has to be
    // declared explicitly. Semaphores order operations on the
    // GPU timeline without involving the CPU; fences have
    // CPU-visible state, so the host can wait on them, which
    // makes them the CPU-GPU half of the synchronization. Each
    // frame slot owns one of each signal and one fence.
    //
    // The fences are created SIGNALED: the frame loop starts
    // every iteration by waiting on the slot's fence, and on
    // the very first use there is no submission to wait for;
    // an unsignaled fence there would block forever.
    let semaphore_info = vk::SemaphoreCreateInfo::builder();
    let fence_info = vk::FenceCreateInfo::builder()
        .flags(vk::FenceCreateFlags::SIGNALED);

    for frame in &mut data.frames {
        frame.image_available_semaphore = unsafe { device.create_semaphore(&semaphore_info, None)? };
        frame.render_finished_semaphore = unsafe { device.create_semaphore(&semaphore_info, None)? };
        frame.in_flight_fence = unsafe { device.create_fence(&fence_info, None)? };

        let image_available = frame.image_available_semaphore;
        let render_finished = frame.render_finished_semaphore;
        let fence = frame.in_flight_fence;

        deletion.push(move |device: &Device| unsafe {
            device.destroy_semaphore(image_available, None);
        });
        deletion.push(move |device: &Device| unsafe {
            device.destroy_semaphore(render_finished, None);
        });
        deletion.push(move |device: &Device| unsafe {
            device.destroy_fence(fence, None);
        });
    }

    info!("Sync objects created.");
    Ok(())
}

pub fn semaphore_submit(
    stage_mask: vk::PipelineStageFlags2,
    semaphore: vk::Semaphore,
) -> vk::SemaphoreSubmitInfo {
    // A semaphore submit operation names the semaphore, the
    // pipeline stages its dependency covers, the device index
    // (0, single device) and a counter value, which binary
    // semaphores like ours ignore.
    vk::SemaphoreSubmitInfo::builder()
        .semaphore(semaphore)
        .stage_mask(stage_mask)
        .device_index(0)
        .value(1)
        .build()
}
