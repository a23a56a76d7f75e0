use std::error::Error;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Instant;

use sdl2::event::{Event, WindowEvent};
use sdl2::keyboard::Keycode;
use sdl2::video::{GLProfile, SwapInterval};

mod renderer;
mod ui;

use renderer::gltf::Model;
use renderer::Renderer;
use ui::Ui;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let model_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("chess/chess.gltf"));
    let shader_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shaders"));

    let sdl_context = sdl2::init().map_err(SdlErr)?;
    let video_subsystem = sdl_context.video().map_err(SdlErr)?;
    let gl_attr = video_subsystem.gl_attr();
    gl_attr.set_context_profile(GLProfile::Core);
    gl_attr.set_context_version(3, 3);
    gl_attr.set_multisample_buffers(1);
    gl_attr.set_multisample_samples(16);
    let window = video_subsystem
        .window(env!("CARGO_PKG_NAME"), 1280, 720)
        .resizable()
        .opengl()
        .build()?;
    let _gl_context = window.gl_create_context().map_err(SdlErr)?;
    // Present as fast as possible; the frame rate is uncapped.
    video_subsystem
        .gl_set_swap_interval(SwapInterval::Immediate)
        .map_err(SdlErr)?;
    let mut event_pump = sdl_context.event_pump().map_err(SdlErr)?;

    let mut renderer = Renderer::new(&video_subsystem, &window, &shader_dir)?;
    let model = Model::load(&model_path)?;

    let mut ui = Ui::new();
    let mut last_frame = Instant::now();

    'frame: loop {
        let now = Instant::now();
        let delta_time = (now - last_frame).as_secs_f32();
        last_frame = now;

        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'frame,
                Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'frame,
                Event::KeyDown {
                    keycode: Some(Keycode::R),
                    ..
                } => renderer.reload_shaders(),
                Event::KeyDown {
                    keycode: Some(keycode),
                    ..
                } => ui.handle_key(keycode),
                Event::MouseMotion {
                    mousestate,
                    xrel,
                    yrel,
                    ..
                } if mousestate.left() => {
                    let (_, height) = window.drawable_size();
                    ui.look(xrel as f32, yrel as f32, height as f32);
                }
                Event::Window {
                    win_event: WindowEvent::Resized(..),
                    ..
                } => {
                    let (width, height) = window.drawable_size();
                    renderer.resize(width as i32, height as i32);
                }
                _ => {}
            }
        }

        ui.movement(delta_time, &event_pump.keyboard_state());
        ui.tick(delta_time);

        let (width, height) = window.drawable_size();
        let params = ui.frame_params(width as i32, height as i32);
        renderer.render(&params, &model);
        window.gl_swap_window();
    }

    Ok(())
}

#[derive(Debug)]
pub struct SdlErr(String);
impl Display for SdlErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sdl error: {}", self.0)
    }
}
impl Error for SdlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
