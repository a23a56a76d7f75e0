//! OpenGL bindings generated at build time, plus the small amount of plumbing
//! shared by everything that talks to the driver.

#![allow(clippy::all)]

use crate::renderer::Error;

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

/// Wraps a GL call and, in debug builds, panics if the driver reports an
/// error afterwards.
macro_rules! call {
    ($expr:expr) => {{
        let result = unsafe { $expr };
        if cfg!(debug_assertions) {
            let error = unsafe { $crate::renderer::gl::GetError() };
            if error != $crate::renderer::gl::NO_ERROR {
                let error_number_stringified;
                let error_name = match error {
                    $crate::renderer::gl::INVALID_ENUM => "INVALID_ENUM",
                    $crate::renderer::gl::INVALID_VALUE => "INVALID_VALUE",
                    $crate::renderer::gl::INVALID_OPERATION => "INVALID_OPERATION",
                    $crate::renderer::gl::OUT_OF_MEMORY => "OUT_OF_MEMORY",
                    $crate::renderer::gl::INVALID_FRAMEBUFFER_OPERATION => {
                        "INVALID_FRAMEBUFFER_OPERATION"
                    }
                    _ => {
                        error_number_stringified = format!("{error}");
                        &error_number_stringified
                    }
                };
                panic!(
                    "OpenGL error {error_name} at {}:{}:{}",
                    file!(),
                    line!(),
                    column!(),
                );
            }
        }
        result
    }};
}
pub(crate) use call;

/// Compiles a shader of the given kind, returning the shader object or the
/// driver's info log on failure.
pub fn create_shader(kind: types::GLenum, source: &str) -> Result<types::GLuint, Error> {
    let shader = call!(CreateShader(kind));
    let sources = [source.as_bytes().as_ptr() as *const types::GLchar];
    let source_lens = [source.len() as types::GLint];
    call!(ShaderSource(
        shader,
        1,
        sources.as_ptr(),
        source_lens.as_ptr(),
    ));
    call!(CompileShader(shader));
    let info_log = shader_info_log(shader);
    if !info_log.is_empty() {
        log::debug!("shader compile log:\n{info_log}");
    }
    let mut compile_status = 0;
    call!(GetShaderiv(shader, COMPILE_STATUS, &mut compile_status));
    if compile_status == FALSE as types::GLint {
        call!(DeleteShader(shader));
        return Err(Error::Link(format!("compilation failed: {info_log}")));
    }
    Ok(shader)
}

/// Links the given shaders into a program, returning the program object or
/// the driver's info log on failure.
pub fn create_program(shaders: &[types::GLuint]) -> Result<types::GLuint, Error> {
    let program = call!(CreateProgram());
    for &shader in shaders {
        call!(AttachShader(program, shader));
    }
    call!(LinkProgram(program));
    let info_log = program_info_log(program);
    if !info_log.is_empty() {
        log::debug!("program link log:\n{info_log}");
    }
    let mut link_status = 0;
    call!(GetProgramiv(program, LINK_STATUS, &mut link_status));
    if link_status == FALSE as types::GLint {
        call!(DeleteProgram(program));
        return Err(Error::Link(format!("linking failed: {info_log}")));
    }
    Ok(program)
}

/// Looks up a uniform location by name. A missing name yields the GL
/// sentinel location (-1); writes to it are ignored by the driver, which is
/// the intended behavior for uniforms the current shader does not use.
pub fn get_uniform_location(program: types::GLuint, name: &str) -> types::GLint {
    let cname = std::ffi::CString::new(name).unwrap();
    let location = call!(GetUniformLocation(program, cname.as_ptr()));
    if location == -1 {
        log::debug!("uniform {name} not found (unused or optimized out)");
    }
    location
}

fn shader_info_log(shader: types::GLuint) -> String {
    let mut info_log = [0u8; 4096];
    let mut length = 0;
    call!(GetShaderInfoLog(
        shader,
        info_log.len() as types::GLsizei,
        &mut length,
        info_log.as_mut_ptr() as *mut types::GLchar,
    ));
    String::from_utf8_lossy(&info_log[..length.max(0) as usize]).into_owned()
}

fn program_info_log(program: types::GLuint) -> String {
    let mut info_log = [0u8; 4096];
    let mut length = 0;
    call!(GetProgramInfoLog(
        program,
        info_log.len() as types::GLsizei,
        &mut length,
        info_log.as_mut_ptr() as *mut types::GLchar,
    ));
    String::from_utf8_lossy(&info_log[..length.max(0) as usize]).into_owned()
}
