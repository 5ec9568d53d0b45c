use crate::{
    commands::*,
    deletion::DeletionQueue,
    devices::*,
    frame::*,
    image::*,
    swapchain::*,
    sync::*,
};

use std::collections::HashSet;

use winit::window::Window;
use vulkanalia::{
    prelude::v1_0::*,
    vk::DeviceV1_3,
    window as vk_window,
    loader::{LibloadingLoader, LIBRARY},
    Version,
    vk::ExtDebugUtilsExtension,
    vk::KhrSurfaceExtension,
    vk::KhrSwapchainExtension,
};
use anyhow::{anyhow, Result};
use log::*;

pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const VALIDATION_LAYER: vk::ExtensionName = vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");
pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);

/// The rendering context: every handle the frame loop and the
/// setup functions need, owned in one place and passed by
/// reference, so no subsystem has to reach for globals.
#[derive(Default)]
pub struct RenderData {
    pub surface: vk::SurfaceKHR,
    pub debug_messenger: vk::DebugUtilsMessengerEXT,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_format: vk::Format,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub frames: [FrameData; MAX_FRAMES_IN_FLIGHT],
}

pub struct Renderer {
    // - Entry: the Vulkan entry point, the first function to
    //   call to load the Vulkan library
    // - Instance: the handle to the Vulkan library, and the
    //   first object to create
    // - Data: the rendering context, containing all the objects
    //   necessary for rendering
    // - Device: the logical device, the interface to the
    //   physical device through which every other object is
    //   created
    // - Frame loop: the frame counter and the per-frame
    //   protocol driver
    // - Deletion queue: deferred teardown of device-owned
    //   resources, flushed in reverse creation order
    entry: Entry,
    instance: Instance,
    data: RenderData,
    pub device: Device,
    frame_loop: FrameLoop,
    deletion: DeletionQueue<Device>,
}

impl Renderer {
    pub fn create(window: &Window) -> Result<Self> {
        // The first calls into Vulkan go through a loader for
        // the Vulkan shared library, wrapped by an entry point
        // from which the instance is created.
        let loader = unsafe { LibloadingLoader::new(LIBRARY)? };
        let entry = unsafe { Entry::new(loader) }.map_err(|b| anyhow!("{}", b))?;
        let mut data = RenderData::default();
        let instance = create_instance(window, &entry, &mut data)?;

        // Vulkan itself is platform agnostic, so rendering to a
        // window goes through a surface object abstracting the
        // native window handle; vulkanalia covers the
        // per-platform differences for us.
        data.surface = unsafe { vk_window::create_surface(&instance, window, window)? };
        info!("Surface created.");

        // Pick a GPU that can do what the engine needs, and
        // create the logical device (and its graphics queue)
        // that the rest of the code talks to.
        data.physical_device = pick_physical_device(&instance, &mut data)?;
        let device = create_logical_device(&entry, &instance, &mut data)?;

        // Everything created from the device downwards registers
        // its cleanup on the deletion queue as it is created;
        // teardown replays those actions backwards.
        let mut deletion = DeletionQueue::new();

        // The swapchain holds the images presented to the
        // surface, accessed through one view per image.
        create_swapchain(window, &instance, &device, &mut data, &mut deletion)?;
        create_swapchain_image_views(&device, &mut data, &mut deletion)?;

        // Per-frame recording and synchronization resources:
        // one command pool and buffer, two semaphores and a
        // fence for each frame slot.
        create_command_pools(&device, &mut data, &mut deletion)?;
        create_command_buffers(&device, &mut data)?;
        create_sync_objects(&device, &mut data, &mut deletion)?;

        Ok(Self {
            entry,
            instance,
            data,
            device,
            frame_loop: FrameLoop::new(),
            deletion,
        })
    }

    /// Renders one frame. Any error is unrecoverable: nothing
    /// here is retried, and a failed frame leaves the counter
    /// where it was.
    pub fn render(&mut self) -> Result<()> {
        let mut queue = GpuQueue {
            device: &self.device,
            data: &self.data,
        };

        self.frame_loop.draw(&mut queue)
    }

    pub fn destroy(&mut self) {
        // Rendering is asynchronous: the GPU may still be
        // executing the last submitted frame, and no resource
        // may be destroyed while the GPU can still reference
        // it, so teardown starts by draining the device.
        if let Err(error) = unsafe { self.device.device_wait_idle() } {
            warn!("Failed to wait for device idle: {:?}", error);
        }

        // Device-owned resources go first, in reverse creation
        // order, then the device itself and the instance-level
        // objects, again newest first.
        self.deletion.flush(&self.device);

        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_surface_khr(self.data.surface, None);

            if VALIDATION_ENABLED {
                self.instance.destroy_debug_utils_messenger_ext(self.data.debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }

        info!("Destroyed the Vulkan instance.");
    }
}

/// The real [`FrameQueue`]: drives the logical device, the
/// graphics queue and the swapchain for one frame slot at a
/// time.
struct GpuQueue<'a> {
    device: &'a Device,
    data: &'a RenderData,
}

impl FrameQueue for GpuQueue<'_> {
    fn wait_frame(&mut self, slot: usize, timeout: u64) -> Result<()> {
        // Block until the GPU is done with this slot's previous
        // submission. The wait is bounded: a fence that does
        // not signal within the timeout means the GPU is hung,
        // which is reported as fatal instead of retried.
        let frame = &self.data.frames[slot];
        let result = unsafe {
            self.device.wait_for_fences(&[frame.in_flight_fence], true, timeout)
        };

        match result {
            Ok(vk::SuccessCode::TIMEOUT) => {
                Err(anyhow!(GpuTimeout("Timed out waiting for the frame fence.")))
            },
            Ok(_) => Ok(()),
            Err(e) => Err(anyhow!("Failed to wait for the frame fence: {:?}", e)),
        }
    }

    fn reset_frame(&mut self, slot: usize) -> Result<()> {
        // Fences stay signaled until explicitly reset; the
        // submission at the end of the frame requires this one
        // unsignaled.
        let frame = &self.data.frames[slot];
        unsafe { self.device.reset_fences(&[frame.in_flight_fence])? };
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize, timeout: u64) -> Result<usize> {
        // Ask the swapchain for the next presentable image,
        // handing it the slot's semaphore to signal once the
        // image is actually free; the index comes back
        // immediately and may still be on screen. A swapchain
        // that has become out of date or suboptimal (after a
        // resize, say) surfaces here as a non-success result;
        // there is no recreation path yet, so it is fatal like
        // any other failure.
        let frame = &self.data.frames[slot];
        let result = unsafe {
            self.device.acquire_next_image_khr(
                self.data.swapchain,
                timeout,
                frame.image_available_semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((_, vk::SuccessCode::TIMEOUT)) => {
                Err(anyhow!(GpuTimeout("Timed out acquiring a swapchain image.")))
            },
            Ok((index, vk::SuccessCode::SUCCESS)) => Ok(index as usize),
            Ok((_, code)) => Err(anyhow!("Failed to acquire swapchain image: {:?}", code)),
            Err(e) => Err(anyhow!("Failed to acquire swapchain image: {:?}", e)),
        }
    }

    fn record(&mut self, slot: usize, image_index: usize, frame_count: u64) -> Result<()> {
        let frame = &self.data.frames[slot];

        // The buffer was fully executed (the fence wait
        // guarantees it), so it can be reset and re-recorded
        // from scratch. ONE_TIME_SUBMIT marks it as recorded
        // for exactly one submission, which is what the loop
        // does anyway.
        unsafe {
            self.device.reset_command_buffer(
                frame.main_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;

            let info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.device.begin_command_buffer(frame.main_buffer, &info)?;
        }

        // Fresh swapchain images come back in an undefined
        // layout; move the image to GENERAL, which supports the
        // clear write below.
        let image = self.data.swapchain_images[image_index];
        transition_image(
            self.device,
            frame.main_buffer,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );

        // Draw: clear the whole color aspect with a slow
        // sinusoidal blue flash derived from the frame counter.
        let flash = (frame_count as f32 / 120.0).sin().abs();
        let clear_color = vk::ClearColorValue {
            float32: [0.0, 0.0, flash, 1.0],
        };

        let ranges = &[subresource_range(vk::ImageAspectFlags::COLOR)];
        unsafe {
            self.device.cmd_clear_color_image(
                frame.main_buffer,
                image,
                vk::ImageLayout::GENERAL,
                &clear_color,
                ranges,
            );
        }

        // The presentation engine only accepts images in the
        // PRESENT_SRC layout.
        transition_image(
            self.device,
            frame.main_buffer,
            image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        unsafe { self.device.end_command_buffer(frame.main_buffer)? };
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &self.data.frames[slot];

        // The submission waits on the "image available"
        // semaphore at the color output stage, so the recorded
        // commands only start writing color once the
        // presentation engine has released the image...
        let wait_info = &[semaphore_submit(
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            frame.image_available_semaphore,
        )];

        // ...and signals "render finished" once every graphics
        // stage has completed, which is what presentation waits
        // on.
        let signal_info = &[semaphore_submit(
            vk::PipelineStageFlags2::ALL_GRAPHICS,
            frame.render_finished_semaphore,
        )];

        let cmd_info = &[vk::CommandBufferSubmitInfo::builder()
            .command_buffer(frame.main_buffer)];

        let submit_info = vk::SubmitInfo2::builder()
            .wait_semaphore_infos(wait_info)
            .signal_semaphore_infos(signal_info)
            .command_buffer_infos(cmd_info);

        // The slot's fence rides along with the submission:
        // once the GPU finishes this exact batch, the fence
        // signals and the CPU is allowed back into the slot.
        unsafe {
            self.device.queue_submit2(
                self.data.graphics_queue,
                &[submit_info],
                frame.in_flight_fence,
            )?;
        }

        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: usize) -> Result<()> {
        // Hand the image back to the swapchain. Presentation
        // waits on the "render finished" semaphore so the
        // presentation engine never reads a half-rendered
        // image. As with acquisition, a suboptimal or
        // out-of-date swapchain is not recovered from here.
        let frame = &self.data.frames[slot];

        let wait_semaphores = &[frame.render_finished_semaphore];
        let swapchains = &[self.data.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = unsafe {
            self.device.queue_present_khr(self.data.graphics_queue, &present_info)
        };

        match result {
            Ok(vk::SuccessCode::SUCCESS) => Ok(()),
            Ok(code) => Err(anyhow!("Failed to present swapchain image: {:?}", code)),
            Err(e) => Err(anyhow!("Failed to present swapchain image: {:?}", e)),
        }
    }
}

fn create_instance(window: &Window, entry: &Entry, data: &mut RenderData) -> Result<Instance> {
    // Vulkan is designed around minimal driver overhead, and
    // does next to no error checking by itself; that job falls
    // to the optional validation layers, which hook into API
    // calls when enabled. They must be installed on the system
    // (the LunarG SDK ships them), so check for availability
    // first.
    let available_layers = unsafe {
        entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>()
    };

    if VALIDATION_ENABLED && !available_layers.contains(&VALIDATION_LAYER) {
        return Err(anyhow!("Validation layer not available."));
    }

    let layers = if VALIDATION_ENABLED {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    // Application info: names and versions, plus the required
    // API version; the synchronization and rendering features
    // the engine is built on need 1.3.
    let application_info = vk::ApplicationInfo::builder()
        .application_name(b"sycorax\0")
        .application_version(vk::make_version(1, 0, 0))
        .engine_name(b"sycorax\0")
        .engine_version(vk::make_version(1, 0, 0))
        .api_version(vk::make_version(1, 3, 0));

    // The window system integration extensions are dictated by
    // the platform the window lives on.
    let mut extensions = vk_window::get_required_instance_extensions(window)
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    if VALIDATION_ENABLED {
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
    }

    // Platforms without a fully conformant Vulkan
    // implementation (macOS) require the portability
    // enumeration extensions from API version 1.3.216 on.
    let flags = if
        cfg!(target_os = "macos") &&
        entry.version()? >= PORTABILITY_MACOS_VERSION
    {
        info!("Enabling extensions for macOS portability.");
        extensions.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name.as_ptr());
        extensions.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name.as_ptr());

        vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
    }
    else {
        vk::InstanceCreateFlags::empty()
    };

    let mut info = vk::InstanceCreateInfo::builder()
        .application_info(&application_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .flags(flags);

    // When validating, extend the instance info with a debug
    // messenger routing layer messages of every severity and
    // type into our own logging.
    let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
        .message_type(vk::DebugUtilsMessageTypeFlagsEXT::all())
        .user_callback(Some(debug_callback));

    if VALIDATION_ENABLED {
        info = info.push_next(&mut debug_info);
    }

    let instance = unsafe { entry.create_instance(&info, None)? };

    if VALIDATION_ENABLED {
        data.debug_messenger = unsafe {
            instance.create_debug_utils_messenger_ext(&debug_info, None)?
        };
    }

    info!("Vulkan instance created.");
    Ok(instance)
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // Forward validation layer messages through the log crate
    // at the matching level. The 'extern "system"' ABI is what
    // Vulkan expects of the callback, and the prototype matches
    // vk::PFN_vkDebugUtilsMessengerCallbackEXT.
    let data = unsafe { *data };
    let message = unsafe { std::ffi::CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({type_:?}) {message}");
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({type_:?}) {message}");
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!("({type_:?}) {message}");
    } else {
        trace!("({type_:?}) {message}");
    }

    // Returning true would abort the offending call; that is
    // only for testing the layers themselves.
    vk::FALSE
}
