use vulkanalia::prelude::v1_0::*;
use anyhow::Result;
use thiserror::Error;

// Data relative to a single render frame:
//  - Command pool: pool where the main buffer is allocated
//  - Main buffer: handle frame commands
//  - Image available semaphore: signaled by the presentation
//    engine when the acquired swapchain image is ready
//  - Render finished semaphore: signaled when drawing is done,
//    waited on by presentation
//  - In-flight fence: signaled when the GPU finishes the
//    frame's submission, waited on by the CPU before the slot
//    is reused

/// How many frames are recorded and submitted concurrently.
/// With two, the CPU records frame N+1 while the GPU still
/// works on frame N; each in-flight frame owns a [`FrameData`]
/// slot so their resources never overlap.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound, in nanoseconds, on every CPU-side wait in the
/// frame loop (fence waits and image acquisition). A frame
/// taking longer than a full second means the GPU is gone or
/// hung, and the loop treats it as fatal rather than retrying.
pub const GPU_TIMEOUT: u64 = 1_000_000_000;

/// Error raised when a frame-loop wait (fence or image
/// acquisition) exceeds [`GPU_TIMEOUT`].
#[derive(Error, Debug)]
#[error("{0}")]
pub struct GpuTimeout(pub &'static str);

/// Data for a single render frame.
#[derive(Default)]
pub struct FrameData {
    /// Command pool where the main buffer is allocated.
    pub command_pool: vk::CommandPool,
    /// Main buffer to handle frame commands.
    pub main_buffer: vk::CommandBuffer,
    /// Semaphore to signal that the swapchain image has been
    /// acquired and is ready for rendering.
    pub image_available_semaphore: vk::Semaphore,
    /// Semaphore to signal that rendering has finished and
    /// presentation can happen.
    pub render_finished_semaphore: vk::Semaphore,
    /// Fence to wait for the draw commands on the device to
    /// complete.
    pub in_flight_fence: vk::Fence,
}

/// The queue-side operations the frame loop drives once per
/// frame, in slot order. [`Renderer`](crate::renderer::Renderer)
/// implements this over the real device and swapchain; tests
/// substitute a mock to exercise the protocol without a GPU.
pub trait FrameQueue {
    /// Blocks until the slot's previous submission has finished
    /// executing, within `timeout` nanoseconds.
    fn wait_frame(&mut self, slot: usize, timeout: u64) -> Result<()>;

    /// Restores the slot's fence to the unsignaled state. A
    /// fence does not reset itself, and the next submission
    /// requires it unsignaled.
    fn reset_frame(&mut self, slot: usize) -> Result<()>;

    /// Requests the next presentable image, arranging for the
    /// slot's image-available semaphore to be signaled once the
    /// image really is free. The returned index may still be on
    /// screen; the semaphore, not the index, carries the
    /// ordering.
    fn acquire_image(&mut self, slot: usize, timeout: u64) -> Result<usize>;

    /// Re-records the slot's command buffer for this frame:
    /// transition the image to a writable layout, draw, then
    /// transition it for presentation.
    fn record(&mut self, slot: usize, image_index: usize, frame_count: u64) -> Result<()>;

    /// Submits the recorded commands, waiting on the
    /// image-available semaphore, signaling the render-finished
    /// semaphore and the slot's fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Queues the image for presentation, waiting on the
    /// render-finished semaphore.
    fn present(&mut self, slot: usize, image_index: usize) -> Result<()>;
}

/// Drives the per-frame protocol and owns the frame counter.
///
/// The counter only ever increases; the active [`FrameData`]
/// slot is its value modulo [`MAX_FRAMES_IN_FLIGHT`], so the
/// slots are reused round-robin and a slot is only touched
/// again once its previous submission has been waited on.
pub struct FrameLoop {
    count: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    /// Number of frames completed so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Index of the slot the next frame will use.
    pub fn slot(&self) -> usize {
        (self.count % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    /// Runs one full frame: wait on the slot's fence, reset it,
    /// acquire a swapchain image, record, submit, present, and
    /// advance the counter. Every step must succeed before the
    /// counter moves; any error leaves the loop un-advanced and
    /// is the caller's to escalate (there is no retry and no
    /// partial-frame recovery, since a half-recorded command
    /// buffer cannot be resubmitted).
    pub fn draw(&mut self, queue: &mut impl FrameQueue) -> Result<()> {
        let slot = self.slot();

        queue.wait_frame(slot, GPU_TIMEOUT)?;
        queue.reset_frame(slot)?;

        let image_index = queue.acquire_image(slot, GPU_TIMEOUT)?;

        queue.record(slot, image_index, self.count)?;
        queue.submit(slot)?;
        queue.present(slot, image_index)?;

        self.count += 1;
        Ok(())
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    // A stand-in for the device/swapchain side of the loop. It
    // keeps one pending submission per slot (the fence), hands
    // out image indices round-robin over a fixed-size swapchain,
    // and records every call so tests can check ordering.
    struct MockQueue {
        events: Vec<String>,
        waits: [usize; MAX_FRAMES_IN_FLIGHT],
        pending: [Option<u64>; MAX_FRAMES_IN_FLIGHT],
        observed: Vec<u64>,
        submissions: u64,
        acquires: usize,
        presents: usize,
        image_count: usize,
        next_image: usize,
        max_in_flight: usize,
        time_out_at_wait: Option<usize>,
    }

    impl MockQueue {
        fn new(image_count: usize) -> Self {
            Self {
                events: Vec::new(),
                waits: [0; MAX_FRAMES_IN_FLIGHT],
                pending: [None; MAX_FRAMES_IN_FLIGHT],
                observed: Vec::new(),
                submissions: 0,
                acquires: 0,
                presents: 0,
                image_count,
                next_image: 0,
                max_in_flight: 0,
                time_out_at_wait: None,
            }
        }

        fn in_flight(&self) -> usize {
            self.pending.iter().flatten().count()
        }
    }

    impl FrameQueue for MockQueue {
        fn wait_frame(&mut self, slot: usize, timeout: u64) -> Result<()> {
            assert_eq!(timeout, GPU_TIMEOUT);

            let total_waits: usize = self.waits.iter().sum();
            if self.time_out_at_wait == Some(total_waits) {
                return Err(anyhow!(GpuTimeout("Timed out waiting for frame fence.")));
            }

            self.waits[slot] += 1;
            self.events.push(format!("wait:{slot}"));

            // The wait is the point where the CPU observes the
            // completion of the slot's own submission, whatever
            // the GPU did in between.
            if let Some(id) = self.pending[slot].take() {
                self.observed.push(id);
            }

            Ok(())
        }

        fn reset_frame(&mut self, slot: usize) -> Result<()> {
            assert!(
                self.pending[slot].is_none(),
                "fence reset while its submission was still in flight",
            );
            self.events.push(format!("reset:{slot}"));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize, timeout: u64) -> Result<usize> {
            assert_eq!(timeout, GPU_TIMEOUT);

            self.acquires += 1;
            let image = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            self.events.push(format!("acquire:{slot}:{image}"));
            Ok(image)
        }

        fn record(&mut self, slot: usize, image_index: usize, _frame_count: u64) -> Result<()> {
            self.events.push(format!("record:{slot}:{image_index}"));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> Result<()> {
            assert!(
                self.pending[slot].is_none(),
                "slot resubmitted before its fence was waited on",
            );

            self.submissions += 1;
            self.pending[slot] = Some(self.submissions);
            self.max_in_flight = self.max_in_flight.max(self.in_flight());
            self.events.push(format!("submit:{slot}"));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: usize) -> Result<()> {
            self.presents += 1;
            self.events.push(format!("present:{slot}:{image_index}"));
            Ok(())
        }
    }

    #[test]
    fn one_frame_runs_the_protocol_in_order() {
        let mut queue = MockQueue::new(3);
        let mut frame_loop = FrameLoop::new();

        frame_loop.draw(&mut queue).unwrap();

        assert_eq!(queue.events, vec![
            "wait:0",
            "reset:0",
            "acquire:0:0",
            "record:0:0",
            "submit:0",
            "present:0:0",
        ]);
        assert_eq!(frame_loop.count(), 1);
    }

    #[test]
    fn slots_rotate_with_the_frame_counter() {
        let mut queue = MockQueue::new(3);
        let mut frame_loop = FrameLoop::new();

        for frame in 0..7u64 {
            assert_eq!(frame_loop.count(), frame);
            assert_eq!(frame_loop.slot(), (frame % 2) as usize);
            frame_loop.draw(&mut queue).unwrap();
        }

        assert_eq!(frame_loop.count(), 7);
        assert_eq!(queue.waits, [4, 3]);
    }

    #[test]
    fn five_frames_on_a_single_image_swapchain() {
        let mut queue = MockQueue::new(1);
        let mut frame_loop = FrameLoop::new();

        for _ in 0..5 {
            frame_loop.draw(&mut queue).unwrap();
        }

        assert_eq!(queue.acquires, 5);
        assert_eq!(queue.submissions, 5);
        assert_eq!(queue.presents, 5);

        // The two fences split the five waits between them.
        assert_eq!(queue.waits, [3, 2]);

        // No partial frames: six events per frame, ending on a
        // presentation.
        assert_eq!(queue.events.len(), 30);
        assert!(queue.events.last().unwrap().starts_with("present"));
    }

    #[test]
    fn at_most_two_submissions_in_flight() {
        let mut queue = MockQueue::new(3);
        let mut frame_loop = FrameLoop::new();

        for _ in 0..10 {
            frame_loop.draw(&mut queue).unwrap();
        }

        assert_eq!(queue.max_in_flight, MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn each_fence_observes_its_own_submission() {
        let mut queue = MockQueue::new(2);
        let mut frame_loop = FrameLoop::new();

        for _ in 0..8 {
            frame_loop.draw(&mut queue).unwrap();
        }

        // Submissions alternate between the two slots, and every
        // fence wait must observe exactly the submission that
        // was issued on its slot, in program order; a fence
        // signaled by a different (or not-yet-finished)
        // submission would break this sequence.
        assert_eq!(queue.observed, (1..=6).collect::<Vec<u64>>());
    }

    #[test]
    fn fence_timeout_is_fatal_and_does_not_advance() {
        let mut queue = MockQueue::new(1);
        let mut frame_loop = FrameLoop::new();

        // Let two frames through, then time out on the third
        // wait.
        queue.time_out_at_wait = Some(2);

        frame_loop.draw(&mut queue).unwrap();
        frame_loop.draw(&mut queue).unwrap();

        let error = frame_loop.draw(&mut queue).unwrap_err();
        assert!(error.downcast_ref::<GpuTimeout>().is_some());

        // The failed iteration is not silently skipped: nothing
        // was acquired or submitted, and the counter stands.
        assert_eq!(frame_loop.count(), 2);
        assert_eq!(queue.acquires, 2);
        assert_eq!(queue.submissions, 2);
        assert_eq!(queue.presents, 2);
    }

    #[test]
    fn quit_between_frames_leaves_no_partial_frame() {
        let mut queue = MockQueue::new(2);
        let mut frame_loop = FrameLoop::new();

        // A close request is only observed between iterations,
        // the way the event loop polls it; the frame in flight
        // when it arrives still runs to submit and present.
        let mut quit = false;
        let mut frames = 0;
        while !quit {
            frame_loop.draw(&mut queue).unwrap();
            frames += 1;
            if frames == 3 {
                quit = true;
            }
        }

        assert_eq!(frame_loop.count(), 3);
        assert_eq!(queue.events.len() % 6, 0);
        assert!(queue.events.last().unwrap().starts_with("present"));
    }
}
