//! Scoped GL bind guards.
//!
//! Every object bound for a batch of operations is rebound to the zero
//! handle when the guard drops, so no binding leaks into unrelated draw
//! calls. The factories take the GL bind function itself, which keeps the
//! guard types independent of any particular object class.

use crate::renderer::gl;
use crate::renderer::gl::types::{GLenum, GLuint};

/// Guard for bind points that take a target enum (buffers, textures,
/// framebuffers).
#[must_use = "the binding is released as soon as the guard drops"]
pub struct TargetBinding {
    bind: unsafe fn(GLenum, GLuint),
    target: GLenum,
}

impl Drop for TargetBinding {
    fn drop(&mut self) {
        gl::call!((self.bind)(self.target, 0));
    }
}

/// Guard for bind points addressed by the object name alone (vertex arrays,
/// programs).
#[must_use = "the binding is released as soon as the guard drops"]
pub struct ObjectBinding {
    bind: unsafe fn(GLuint),
}

impl Drop for ObjectBinding {
    fn drop(&mut self) {
        gl::call!((self.bind)(0));
    }
}

fn bind_target(bind: unsafe fn(GLenum, GLuint), target: GLenum, name: GLuint) -> TargetBinding {
    gl::call!(bind(target, name));
    TargetBinding { bind, target }
}

fn bind_object(bind: unsafe fn(GLuint), name: GLuint) -> ObjectBinding {
    gl::call!(bind(name));
    ObjectBinding { bind }
}

pub fn buffer(target: GLenum, name: GLuint) -> TargetBinding {
    bind_target(gl::BindBuffer, target, name)
}

pub fn texture(target: GLenum, name: GLuint) -> TargetBinding {
    bind_target(gl::BindTexture, target, name)
}

pub fn framebuffer(target: GLenum, name: GLuint) -> TargetBinding {
    bind_target(gl::BindFramebuffer, target, name)
}

pub fn vertex_array(name: GLuint) -> ObjectBinding {
    bind_object(gl::BindVertexArray, name)
}

pub fn program(name: GLuint) -> ObjectBinding {
    bind_object(gl::UseProgram, name)
}
