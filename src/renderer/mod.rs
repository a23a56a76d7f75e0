//! The deferred rendering pipeline.
//!
//! Each frame runs two strictly sequential phases: a geometry pass that
//! rasterizes the scene into the G-buffer (base color and view-space normal
//! in two color attachments, depth in a depth texture), then a lighting
//! resolve that reads those textures back and shades a single full-screen
//! triangle. All pipeline state lives in [`Renderer`]; nothing is global.

pub mod draw_calls;
mod error;
pub mod gl;
pub mod gltf;
pub mod guards;
pub mod params;
pub mod program;

pub use error::Error;

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::ptr;

use glam::Vec3;
use sdl2::video::Window;
use sdl2::VideoSubsystem;

use self::draw_calls::DrawCalls;
use self::gltf::{Model, Pass};
use self::params::FrameParams;
use self::program::Programs;

const GBUF_COLOR_TEXTURES: usize = 2;

/// One oversized triangle covers the viewport without the diagonal seam a
/// two-triangle quad would have.
const FULL_SCREEN_TRIANGLE: [f32; 6] = [0.0, 0.0, 2.0, 0.0, 0.0, 2.0];

pub struct Renderer {
    programs: Programs,
    shader_dir: PathBuf,
    gbuffer: GBuffer,
    fullscreen_vao: gl::types::GLuint,
    fullscreen_vbo: gl::types::GLuint,
    draw_calls: DrawCalls,
}

impl Renderer {
    pub fn new(
        video: &VideoSubsystem,
        window: &Window,
        shader_dir: &Path,
    ) -> Result<Renderer, Error> {
        gl::load_with(|s| video.gl_get_proc_address(s) as *const c_void);
        let (width, height) = window.drawable_size();
        gl::call!(gl::Viewport(0, 0, width as i32, height as i32));

        let programs = Programs::load(shader_dir)?;
        let gbuffer = GBuffer::new(width as i32, height as i32)?;

        let mut fullscreen_vbo = 0;
        let mut fullscreen_vao = 0;
        gl::call!(gl::GenBuffers(1, &mut fullscreen_vbo));
        gl::call!(gl::GenVertexArrays(1, &mut fullscreen_vao));
        {
            let _bound_vbo = guards::buffer(gl::ARRAY_BUFFER, fullscreen_vbo);
            let data: &[u8] = bytemuck::cast_slice(&FULL_SCREEN_TRIANGLE);
            gl::call!(gl::BufferData(
                gl::ARRAY_BUFFER,
                data.len() as isize,
                data.as_ptr() as *const c_void,
                gl::STATIC_DRAW,
            ));
            let _bound_vao = guards::vertex_array(fullscreen_vao);
            gl::call!(gl::EnableVertexAttribArray(0));
            gl::call!(gl::VertexAttribPointer(
                0,
                2,
                gl::FLOAT,
                gl::FALSE,
                0,
                ptr::null(),
            ));
        }

        Ok(Renderer {
            programs,
            shader_dir: shader_dir.to_path_buf(),
            gbuffer,
            fullscreen_vao,
            fullscreen_vbo,
            draw_calls: DrawCalls::new(),
        })
    }

    /// Reallocates the G-buffer at the new drawable size.
    pub fn resize(&mut self, width: i32, height: i32) {
        gl::call!(gl::Viewport(0, 0, width, height));
        self.gbuffer.resize(width, height);
    }

    /// Reloads both shader programs from disk. On failure the previous
    /// programs stay bound and the error is only logged.
    pub fn reload_shaders(&mut self) {
        match Programs::load(&self.shader_dir) {
            Ok(programs) => {
                self.programs = programs;
                log::info!("reloaded shaders from {}", self.shader_dir.display());
            }
            Err(err) => {
                log::warn!("shader reload failed, keeping previous programs: {err}");
            }
        }
    }

    pub fn render(&mut self, params: &FrameParams, model: &Model) {
        self.geometry_pass(params, model);
        self.lighting_pass(params);
    }

    fn geometry_pass(&mut self, params: &FrameParams, model: &Model) {
        let _bound_fbo = guards::framebuffer(gl::FRAMEBUFFER, self.gbuffer.fbo);
        let _used_program = guards::program(self.programs.gbuf.program.id);

        let attachments = [gl::COLOR_ATTACHMENT0, gl::COLOR_ATTACHMENT1];
        gl::call!(gl::DrawBuffers(
            attachments.len() as i32,
            attachments.as_ptr(),
        ));

        gl::call!(gl::Enable(gl::MULTISAMPLE));
        gl::call!(gl::Enable(gl::DEPTH_TEST));
        gl::call!(gl::Enable(gl::CULL_FACE));

        // Reversed depth: clear to the far sentinel 0.0 and let nearer
        // fragments win with GREATER.
        gl::call!(gl::ClearColor(1.0, 0.75, 0.5, 0.0));
        gl::call!(gl::ClearDepth(0.0));
        gl::call!(gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT));
        gl::call!(gl::DepthFunc(gl::GREATER));

        let gbuf = &self.programs.gbuf;
        let mat_view = params.mat_view.to_cols_array();
        gl::call!(gl::UniformMatrix4fv(
            gbuf.u_mat_view,
            1,
            gl::FALSE,
            mat_view.as_ptr(),
        ));
        let mat_proj = params.mat_proj.to_cols_array();
        gl::call!(gl::UniformMatrix4fv(
            gbuf.u_mat_proj,
            1,
            gl::FALSE,
            mat_proj.as_ptr(),
        ));

        gl::call!(gl::Uniform1i(gbuf.u_is_textured, 1));
        self.draw_calls.clear();
        model.collect_pass(
            Pass::Textured,
            params.mat_view,
            params.mat_model,
            &mut self.draw_calls,
        );
        self.draw_calls.issue(gbuf);

        gl::call!(gl::Uniform1i(gbuf.u_is_textured, 0));
        self.draw_calls.clear();
        model.collect_pass(
            Pass::Flat,
            params.mat_view,
            params.mat_model,
            &mut self.draw_calls,
        );
        self.draw_calls.issue(gbuf);

        gl::call!(gl::Disable(gl::CULL_FACE));
        gl::call!(gl::Disable(gl::DEPTH_TEST));
        gl::call!(gl::Disable(gl::MULTISAMPLE));
    }

    fn lighting_pass(&mut self, params: &FrameParams) {
        let screen = &self.programs.screen;
        let _used_program = guards::program(screen.program.id);

        gl::call!(gl::ClearColor(0.0, 0.0, 0.0, 0.0));
        gl::call!(gl::Clear(gl::COLOR_BUFFER_BIT));

        gl::call!(gl::Uniform1i(screen.u_g_base_color, 0));
        gl::call!(gl::Uniform1i(screen.u_g_normal, 1));
        gl::call!(gl::Uniform1i(screen.u_g_depth, 2));
        let (width, height) = params.viewport;
        gl::call!(gl::Uniform4f(
            screen.u_viewport,
            width as f32,
            height as f32,
            params.z_near,
            params.z_far,
        ));
        gl::call!(gl::Uniform1f(screen.u_fov_y, params.fov_y_deg));
        gl::call!(gl::Uniform1f(screen.u_specular_pow, params.specular_pow));
        gl::call!(gl::Uniform1f(screen.u_morph_progress, params.morph_progress));
        uniform_vec3(screen.u_dir_light_dir, params.dir_light_dir);
        uniform_vec3(screen.u_dir_light_color, params.dir_light_color);
        uniform_vec3(screen.u_spot_light_pos, params.spot_light_pos);
        uniform_vec3(screen.u_spot_light_dir, params.spot_light_dir);
        uniform_vec3(screen.u_spot_light_color, params.spot_light_color);
        gl::call!(gl::Uniform2f(
            screen.u_spot_light_angle_cos,
            params.spot_light_angle_cos.x,
            params.spot_light_angle_cos.y,
        ));

        let _bound_vao = guards::vertex_array(self.fullscreen_vao);
        let inputs = [
            self.gbuffer.color[0],
            self.gbuffer.color[1],
            self.gbuffer.depth,
        ];
        for (unit, texture) in inputs.into_iter().enumerate() {
            gl::call!(gl::ActiveTexture(gl::TEXTURE0 + unit as u32));
            gl::call!(gl::BindTexture(gl::TEXTURE_2D, texture));
        }
        gl::call!(gl::DrawArrays(gl::TRIANGLES, 0, 3));
        for unit in (0..inputs.len()).rev() {
            gl::call!(gl::ActiveTexture(gl::TEXTURE0 + unit as u32));
            gl::call!(gl::BindTexture(gl::TEXTURE_2D, 0));
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        gl::call!(gl::DeleteVertexArrays(1, &self.fullscreen_vao));
        gl::call!(gl::DeleteBuffers(1, &self.fullscreen_vbo));
    }
}

fn uniform_vec3(location: gl::types::GLint, value: Vec3) {
    gl::call!(gl::Uniform3f(location, value.x, value.y, value.z));
}

/// The offscreen render target for the geometry pass: two color textures
/// (base color, view-space normal) and a depth texture on one framebuffer.
/// Texture storage is reallocated, never stretched, when the window resizes.
struct GBuffer {
    fbo: gl::types::GLuint,
    color: [gl::types::GLuint; GBUF_COLOR_TEXTURES],
    depth: gl::types::GLuint,
}

impl GBuffer {
    fn new(width: i32, height: i32) -> Result<GBuffer, Error> {
        let mut color = [0; GBUF_COLOR_TEXTURES];
        let mut depth = 0;
        gl::call!(gl::GenTextures(
            GBUF_COLOR_TEXTURES as i32,
            color.as_mut_ptr(),
        ));
        gl::call!(gl::GenTextures(1, &mut depth));
        let mut gbuffer = GBuffer { fbo: 0, color, depth };
        gbuffer.resize(width, height);

        gl::call!(gl::GenFramebuffers(1, &mut gbuffer.fbo));
        {
            let _bound_fbo = guards::framebuffer(gl::FRAMEBUFFER, gbuffer.fbo);
            for (i, &texture) in gbuffer.color.iter().enumerate() {
                let _bound = guards::texture(gl::TEXTURE_2D, texture);
                gl::call!(gl::TexParameteri(
                    gl::TEXTURE_2D,
                    gl::TEXTURE_MIN_FILTER,
                    gl::LINEAR as i32,
                ));
                gl::call!(gl::TexParameteri(
                    gl::TEXTURE_2D,
                    gl::TEXTURE_MAG_FILTER,
                    gl::LINEAR as i32,
                ));
                gl::call!(gl::FramebufferTexture2D(
                    gl::FRAMEBUFFER,
                    gl::COLOR_ATTACHMENT0 + i as u32,
                    gl::TEXTURE_2D,
                    texture,
                    0,
                ));
            }
            {
                let _bound = guards::texture(gl::TEXTURE_2D, gbuffer.depth);
                gl::call!(gl::TexParameteri(
                    gl::TEXTURE_2D,
                    gl::TEXTURE_MIN_FILTER,
                    gl::LINEAR as i32,
                ));
                gl::call!(gl::TexParameteri(
                    gl::TEXTURE_2D,
                    gl::TEXTURE_MAG_FILTER,
                    gl::LINEAR as i32,
                ));
                gl::call!(gl::FramebufferTexture2D(
                    gl::FRAMEBUFFER,
                    gl::DEPTH_ATTACHMENT,
                    gl::TEXTURE_2D,
                    gbuffer.depth,
                    0,
                ));
            }

            // Checked once at setup; an incomplete G-buffer aborts startup.
            let status = gl::call!(gl::CheckFramebufferStatus(gl::FRAMEBUFFER));
            if status != gl::FRAMEBUFFER_COMPLETE {
                return Err(Error::FramebufferIncomplete);
            }
        }
        Ok(gbuffer)
    }

    /// Reallocates the texture storage at the new size. The attachments and
    /// handles stay put, so this is safe to call every resize.
    fn resize(&mut self, width: i32, height: i32) {
        log::debug!("reallocating G-buffer storage at {width}x{height}");
        for &texture in &self.color {
            let _bound = guards::texture(gl::TEXTURE_2D, texture);
            gl::call!(gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA8 as i32,
                width,
                height,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                ptr::null(),
            ));
        }
        let _bound = guards::texture(gl::TEXTURE_2D, self.depth);
        gl::call!(gl::TexImage2D(
            gl::TEXTURE_2D,
            0,
            gl::DEPTH_COMPONENT32F as i32,
            width,
            height,
            0,
            gl::DEPTH_COMPONENT,
            gl::FLOAT,
            ptr::null(),
        ));
    }
}

impl Drop for GBuffer {
    fn drop(&mut self) {
        gl::call!(gl::DeleteFramebuffers(1, &self.fbo));
        gl::call!(gl::DeleteTextures(
            GBUF_COLOR_TEXTURES as i32,
            self.color.as_ptr(),
        ));
        gl::call!(gl::DeleteTextures(1, &self.depth));
    }
}
