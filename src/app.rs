use crate::renderer::Renderer;

use std::process;

use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow},
    window::{Window, WindowId},
};
use anyhow::Result;
use log::*;

pub const WINDOW_TITLE: &str = "sycorax";
pub const WINDOW_WIDTH: u32 = 800;
pub const WINDOW_HEIGHT: u32 = 600;

/// The application shell: owns the window and the renderer,
/// and turns window events into engine calls. Every failure
/// reaching this level is final; it is logged and the process
/// exits with a non-zero status, since a half-initialized
/// engine or a half-recorded frame cannot be resumed.
#[derive(Default)]
pub struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attr = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT));

        let window = event_loop.create_window(window_attr)?;

        if self.renderer.is_none() {
            self.renderer = Some(Renderer::create(&window)?);
        }

        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Poll instead of waiting for events: the engine draws
        // every iteration of the event loop, whether or not the
        // window system has something to say.
        event_loop.set_control_flow(ControlFlow::Poll);

        if self.window.is_none() {
            if let Err(error) = self.init(event_loop) {
                error!("Failed to initialize the engine: {error}");
                process::exit(1);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                // The close request is observed between frames,
                // so the frame in flight has already been
                // submitted and presented in full; taking the
                // renderer out also stops any further redraws
                // from reaching it while the loop winds down.
                if let Some(mut renderer) = self.renderer.take() {
                    renderer.destroy();
                }

                event_loop.exit();
            },
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(error) = renderer.render() {
                        error!("Fatal rendering error: {error}");
                        process::exit(1);
                    }
                }
            },
            _ => (),
        }
    }

    fn about_to_wait(&mut self, _: &ActiveEventLoop) {
        // Keep the frames coming.
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
