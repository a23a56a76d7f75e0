//! Shader program loading.
//!
//! Both program pairs are read from plain GLSL files so they can be edited
//! and reloaded while the viewer runs. Uniform locations are resolved by
//! name right after linking; names the shader does not use resolve to the GL
//! sentinel location and writes to them are ignored.

use std::fs;
use std::path::Path;

use crate::renderer::gl;
use crate::renderer::Error;

/// An owned, linked GL program object.
pub struct ShaderProgram {
    pub id: gl::types::GLuint,
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        gl::call!(gl::DeleteProgram(self.id));
    }
}

fn load_shader(kind: gl::types::GLenum, path: &Path) -> Result<gl::types::GLuint, Error> {
    let source = fs::read_to_string(path)
        .map_err(|err| Error::Load(format!("could not read shader {}: {err}", path.display())))?;
    log::debug!("compiling shader {}", path.display());
    gl::create_shader(kind, &source).map_err(|err| match err {
        Error::Link(log) => Error::Link(format!("{}: {log}", path.display())),
        other => other,
    })
}

fn load_program(dir: &Path, vert: &str, frag: &str) -> Result<ShaderProgram, Error> {
    let vertex_shader = load_shader(gl::VERTEX_SHADER, &dir.join(vert))?;
    let fragment_shader = match load_shader(gl::FRAGMENT_SHADER, &dir.join(frag)) {
        Ok(shader) => shader,
        Err(err) => {
            gl::call!(gl::DeleteShader(vertex_shader));
            return Err(err);
        }
    };
    let program = gl::create_program(&[vertex_shader, fragment_shader]);
    gl::call!(gl::DeleteShader(vertex_shader));
    gl::call!(gl::DeleteShader(fragment_shader));
    Ok(ShaderProgram { id: program? })
}

/// The geometry-pass program and its uniform locations.
pub struct GbufProgram {
    pub program: ShaderProgram,
    pub u_is_textured: gl::types::GLint,
    pub u_color_factor: gl::types::GLint,
    pub u_mat_model: gl::types::GLint,
    pub u_mat_view: gl::types::GLint,
    pub u_mat_proj: gl::types::GLint,
    pub u_mat_normal: gl::types::GLint,
}

impl GbufProgram {
    pub fn load(dir: &Path) -> Result<GbufProgram, Error> {
        let program = load_program(dir, "gbuf.vert", "gbuf.frag")?;
        let id = program.id;
        Ok(GbufProgram {
            u_is_textured: gl::get_uniform_location(id, "isTextured"),
            u_color_factor: gl::get_uniform_location(id, "colorFactor"),
            u_mat_model: gl::get_uniform_location(id, "matModel"),
            u_mat_view: gl::get_uniform_location(id, "matView"),
            u_mat_proj: gl::get_uniform_location(id, "matProj"),
            u_mat_normal: gl::get_uniform_location(id, "matNormal"),
            program,
        })
    }
}

/// The lighting-resolve program and its uniform locations.
pub struct ScreenProgram {
    pub program: ShaderProgram,
    pub u_g_base_color: gl::types::GLint,
    pub u_g_normal: gl::types::GLint,
    pub u_g_depth: gl::types::GLint,
    pub u_viewport: gl::types::GLint,
    pub u_fov_y: gl::types::GLint,
    pub u_specular_pow: gl::types::GLint,
    pub u_morph_progress: gl::types::GLint,
    pub u_dir_light_dir: gl::types::GLint,
    pub u_dir_light_color: gl::types::GLint,
    pub u_spot_light_pos: gl::types::GLint,
    pub u_spot_light_dir: gl::types::GLint,
    pub u_spot_light_color: gl::types::GLint,
    pub u_spot_light_angle_cos: gl::types::GLint,
}

impl ScreenProgram {
    pub fn load(dir: &Path) -> Result<ScreenProgram, Error> {
        let program = load_program(dir, "screen.vert", "screen.frag")?;
        let id = program.id;
        Ok(ScreenProgram {
            u_g_base_color: gl::get_uniform_location(id, "gBaseColor"),
            u_g_normal: gl::get_uniform_location(id, "gNormal"),
            u_g_depth: gl::get_uniform_location(id, "gDepth"),
            u_viewport: gl::get_uniform_location(id, "viewport"),
            u_fov_y: gl::get_uniform_location(id, "fovY"),
            u_specular_pow: gl::get_uniform_location(id, "specularPow"),
            u_morph_progress: gl::get_uniform_location(id, "morphProgress"),
            u_dir_light_dir: gl::get_uniform_location(id, "dirLightDir"),
            u_dir_light_color: gl::get_uniform_location(id, "dirLightColor"),
            u_spot_light_pos: gl::get_uniform_location(id, "spotLightPos"),
            u_spot_light_dir: gl::get_uniform_location(id, "spotLightDir"),
            u_spot_light_color: gl::get_uniform_location(id, "spotLightColor"),
            u_spot_light_angle_cos: gl::get_uniform_location(id, "spotLightAngleCos"),
            program,
        })
    }
}

pub struct Programs {
    pub gbuf: GbufProgram,
    pub screen: ScreenProgram,
}

impl Programs {
    /// Loads both program pairs from the shader directory. Used at startup
    /// (where failure is fatal) and for hot reloads (where the caller keeps
    /// the previous programs on failure).
    pub fn load(dir: &Path) -> Result<Programs, Error> {
        Ok(Programs {
            gbuf: GbufProgram::load(dir)?,
            screen: ScreenProgram::load(dir)?,
        })
    }
}
