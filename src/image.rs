use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::DeviceV1_3;
use anyhow::Result;

pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspects: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    // A view wraps an image with the information Vulkan needs
    // to access it: dimensionality, format, component mapping
    // (identity here) and the accessible subresource range.
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::_2D)
        .format(format)
        .subresource_range(subresource_range(aspects));

    Ok(unsafe { device.create_image_view(&info, None)? })
}

pub fn subresource_range(
    aspects: vk::ImageAspectFlags,
) -> vk::ImageSubresourceRange {
    // The subresource range selects which parts of the image an
    // operation touches: the aspect (color or depth bits), and
    // the mipmap levels and array layers, here always all of
    // them via the REMAINING sentinels.
    vk::ImageSubresourceRange::builder()
        .aspect_mask(aspects)
        .base_mip_level(0)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .base_array_layer(0)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
        .build()
}

pub fn transition_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier2 {
    // Images live in layouts optimized for particular accesses,
    // and moving between them takes an image memory barrier,
    // which doubles as the execution dependency between the
    // commands on each side of the transition. Stage and access
    // masks are deliberately the broadest ones (ALL_COMMANDS,
    // memory write before, write/read after): this stalls more
    // of the pipeline than a tuned mask would, but is correct
    // for every transition the frame loop performs.
    //
    // The aspect is derived from the destination layout alone:
    // a transition into the depth-attachment layout concerns
    // the depth bits, anything else the color bits.
    let aspects = if new_layout == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(subresource_range(aspects))
        .image(image)
        .build()
}

pub fn transition_image(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    // Record the transition into the command stream. With
    // synchronization2, barriers are bundled in a dependency
    // info struct; ours only ever carries the one image
    // barrier.
    let barriers = &[transition_barrier(image, old_layout, new_layout)];
    let dependency_info = vk::DependencyInfo::builder()
        .image_memory_barriers(barriers);

    unsafe { device.cmd_pipeline_barrier2(command_buffer, &dependency_info) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_destination_selects_depth_aspect() {
        let barrier = transition_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );

        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::DEPTH,
        );
    }

    #[test]
    fn color_destinations_select_color_aspect() {
        for new_layout in [
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ] {
            let barrier = transition_barrier(
                vk::Image::null(),
                vk::ImageLayout::UNDEFINED,
                new_layout,
            );

            assert_eq!(
                barrier.subresource_range.aspect_mask,
                vk::ImageAspectFlags::COLOR,
            );
        }
    }

    #[test]
    fn barrier_blocks_all_stages_on_both_sides() {
        let barrier = transition_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );

        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn barrier_covers_the_whole_image() {
        let range = transition_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        )
        .subresource_range;

        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(range.base_array_layer, 0);
        assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
    }
}
