//! Draw calls recorded by the scene-graph walk and issued by the geometry
//! pass. Recording and issuing are separate steps so the walk itself never
//! touches GL state.

use std::ffi::c_void;

use glam::Mat4;

use crate::renderer::gl;
use crate::renderer::guards;
use crate::renderer::program::GbufProgram;

/// One indexed draw of a mesh primitive, with everything the geometry pass
/// needs to issue it: the mesh's vertex array, the index buffer layout, the
/// material state, and the per-draw matrices.
#[derive(Clone)]
pub struct DrawCall {
    pub vao: gl::types::GLuint,
    pub mode: gl::types::GLenum,
    pub index_buffer: gl::types::GLuint,
    pub index_count: i32,
    pub index_type: gl::types::GLenum,
    pub index_byte_offset: usize,
    /// Bound to texture unit 0 for the draw; `None` in the flat pass.
    pub texture: Option<gl::types::GLuint>,
    pub color_factor: [f32; 4],
    pub mat_model: Mat4,
    pub mat_normal: Mat4,
}

#[derive(Default)]
pub struct DrawCalls {
    calls: Vec<DrawCall>,
}

impl DrawCalls {
    pub fn new() -> DrawCalls {
        DrawCalls::default()
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn add(&mut self, call: DrawCall) {
        self.calls.push(call);
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    /// Issues the recorded calls in order. The geometry program must be in
    /// use; per-draw uniforms go through its locations.
    pub fn issue(&self, program: &GbufProgram) {
        for call in &self.calls {
            let _bound_vao = guards::vertex_array(call.vao);
            let _bound_indices = guards::buffer(gl::ELEMENT_ARRAY_BUFFER, call.index_buffer);

            let mat_normal = call.mat_normal.to_cols_array();
            gl::call!(gl::UniformMatrix4fv(
                program.u_mat_normal,
                1,
                gl::FALSE,
                mat_normal.as_ptr(),
            ));
            let mat_model = call.mat_model.to_cols_array();
            gl::call!(gl::UniformMatrix4fv(
                program.u_mat_model,
                1,
                gl::FALSE,
                mat_model.as_ptr(),
            ));
            let [r, g, b, a] = call.color_factor;
            gl::call!(gl::Uniform4f(program.u_color_factor, r, g, b, a));

            let _bound_texture = call.texture.map(|texture| {
                gl::call!(gl::ActiveTexture(gl::TEXTURE0));
                guards::texture(gl::TEXTURE_2D, texture)
            });
            gl::call!(gl::DrawElements(
                call.mode,
                call.index_count,
                call.index_type,
                call.index_byte_offset as *const c_void,
            ));
        }
    }
}
