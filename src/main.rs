mod app;
mod commands;
mod deletion;
mod devices;
mod frame;
mod image;
mod pipeline;
mod queues;
mod renderer;
mod shaders;
mod swapchain;
mod sync;

use winit::event_loop::EventLoop;
use anyhow::Result;

use app::App;

fn main() -> Result<()> {
    std::env::set_var("RUST_LOG", "info");
    pretty_env_logger::init();

    let event_loop = EventLoop::new()?;
    let mut app = App::default();
    event_loop.run_app(&mut app)?;

    Ok(())
}
