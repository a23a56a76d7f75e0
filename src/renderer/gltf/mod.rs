//! glTF models on the GPU: liveness-pruned resource upload and the
//! scene-graph walk that turns the node DAG into draw calls.

pub mod document;
pub mod liveness;

use std::ffi::c_void;
use std::path::Path;

use glam::Mat4;

use crate::renderer::draw_calls::{DrawCall, DrawCalls};
use crate::renderer::gl;
use crate::renderer::guards;
use crate::renderer::Error;

use self::document::{Document, Image, PixelType};
use self::liveness::Liveness;

/// The vertex attribute location of the POSITION attribute.
pub const ATTR_LOC_POSITION: gl::types::GLuint = 0;
/// The vertex attribute location of the NORMAL attribute.
pub const ATTR_LOC_NORMAL: gl::types::GLuint = 1;
/// The vertex attribute location of the TEXCOORD_0 attribute.
pub const ATTR_LOC_TEXCOORD_0: gl::types::GLuint = 2;

/// Which half of the geometry pass is being collected. Splitting the scene
/// by texture state lets the caller flip the sampler toggle once per pass
/// instead of once per primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Textured,
    Flat,
}

/// GL handles parallel to the document's buffer view, texture and mesh
/// tables. Zero means "nothing uploaded for this slot": the view had no
/// binding target, or liveness analysis proved the slot unreachable.
pub struct GpuResources {
    pub buffers: Vec<gl::types::GLuint>,
    pub textures: Vec<gl::types::GLuint>,
    pub vaos: Vec<gl::types::GLuint>,
}

/// A loaded model: the parsed document plus every GL object created for it.
/// The GL objects are deleted together when the model drops.
pub struct Model {
    document: Document,
    gpu: GpuResources,
}

impl Model {
    pub fn load(path: &Path) -> Result<Model, Error> {
        let document = Document::from_path(path)?;
        let live = liveness::analyze(&document)?;
        let gpu = upload(&document, &live)?;
        log::info!(
            "loaded {}: {}/{} nodes live, {}/{} buffer views uploaded, {}/{} textures uploaded",
            path.display(),
            live.nodes.iter().filter(|&&live| live).count(),
            document.nodes.len(),
            gpu.buffers.iter().filter(|&&handle| handle != 0).count(),
            document.buffer_views.len(),
            gpu.textures.iter().filter(|&&handle| handle != 0).count(),
            document.textures.len(),
        );
        Ok(Model { document, gpu })
    }

    /// Records draw calls for one half of the geometry pass, walking the
    /// whole scene graph from the default scene's roots.
    pub fn collect_pass(&self, pass: Pass, mat_view: Mat4, mat_model: Mat4, out: &mut DrawCalls) {
        collect_pass(&self.document, &self.gpu, pass, mat_view, mat_model, out);
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        gl::call!(gl::DeleteVertexArrays(
            self.gpu.vaos.len() as i32,
            self.gpu.vaos.as_ptr(),
        ));
        gl::call!(gl::DeleteBuffers(
            self.gpu.buffers.len() as i32,
            self.gpu.buffers.as_ptr(),
        ));
        gl::call!(gl::DeleteTextures(
            self.gpu.textures.len() as i32,
            self.gpu.textures.as_ptr(),
        ));
    }
}

fn upload(doc: &Document, live: &Liveness) -> Result<GpuResources, Error> {
    let buffers = upload_buffer_views(doc, live)?;
    let textures = upload_textures(doc, live)?;
    let vaos = bind_meshes(doc, live, &buffers)?;
    Ok(GpuResources {
        buffers,
        textures,
        vaos,
    })
}

/// Uploads the exact byte range of every live buffer view that carries a
/// binding target hint. Views used as generic data never become buffer
/// objects.
fn upload_buffer_views(doc: &Document, live: &Liveness) -> Result<Vec<gl::types::GLuint>, Error> {
    let mut buffers = vec![0; doc.buffer_views.len()];
    for (view_id, view) in doc.buffer_views.iter().enumerate() {
        if !live.buffer_views[view_id] {
            continue;
        }
        let Some(target) = view.target else {
            continue;
        };
        let buffer = doc.buffers.get(view.buffer).ok_or_else(|| {
            Error::Load(format!(
                "buffer view {view_id} references buffer {} which is out of range",
                view.buffer
            ))
        })?;
        let end = view.byte_offset + view.byte_length;
        if end > buffer.data.len() {
            return Err(Error::Load(format!(
                "buffer view {view_id} overruns buffer {} ({end} > {})",
                view.buffer,
                buffer.data.len()
            )));
        }
        let bytes = &buffer.data[view.byte_offset..end];

        let mut vbo = 0;
        gl::call!(gl::GenBuffers(1, &mut vbo));
        buffers[view_id] = vbo;
        let _bound = guards::buffer(target, vbo);
        gl::call!(gl::BufferData(
            target,
            bytes.len() as isize,
            bytes.as_ptr() as *const c_void,
            gl::STATIC_DRAW,
        ));
    }
    Ok(buffers)
}

fn upload_textures(doc: &Document, live: &Liveness) -> Result<Vec<gl::types::GLuint>, Error> {
    let mut textures = vec![0; doc.textures.len()];
    for (texture_id, texture) in doc.textures.iter().enumerate() {
        if !live.textures[texture_id] {
            continue;
        }
        let image = texture
            .source
            .and_then(|source| doc.images.get(source))
            .ok_or_else(|| {
                Error::Load(format!("texture {texture_id} references a missing image"))
            })?;
        let (format, pixel_type) = image_gl_format(image)?;

        let mut tex = 0;
        gl::call!(gl::GenTextures(1, &mut tex));
        textures[texture_id] = tex;
        let _bound = guards::texture(gl::TEXTURE_2D, tex);

        gl::call!(gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1));
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
        gl::call!(gl::TexParameteri(
            gl::TEXTURE_2D,
            gl::TEXTURE_WRAP_S,
            gl::REPEAT as i32,
        ));
        gl::call!(gl::TexParameteri(
            gl::TEXTURE_2D,
            gl::TEXTURE_WRAP_T,
            gl::REPEAT as i32,
        ));
        gl::call!(gl::TexImage2D(
            gl::TEXTURE_2D,
            0,
            gl::RGBA as i32,
            image.width as i32,
            image.height as i32,
            0,
            format,
            pixel_type,
            image.pixels.as_ptr() as *const c_void,
        ));
        gl::call!(gl::GenerateMipmap(gl::TEXTURE_2D));
    }
    Ok(textures)
}

/// Maps an image's channel count and pixel type to a GL upload format. No
/// conversion is attempted; unrepresentable images fail the load.
pub(crate) fn image_gl_format(
    image: &Image,
) -> Result<(gl::types::GLenum, gl::types::GLenum), Error> {
    let format = match image.components {
        1 => gl::RED,
        2 => gl::RG,
        3 => gl::RGB,
        4 => gl::RGBA,
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "image with {other} channels"
            )));
        }
    };
    let pixel_type = match image.pixel_type {
        PixelType::U8 => gl::UNSIGNED_BYTE,
        PixelType::U16 => gl::UNSIGNED_SHORT,
        PixelType::F32 => {
            return Err(Error::UnsupportedFormat(
                "floating point image pixels".to_string(),
            ));
        }
    };
    Ok((format, pixel_type))
}

/// Builds one vertex array per mesh that a live node references. All of the
/// mesh's primitives wire their attributes into the same array.
fn bind_meshes(
    doc: &Document,
    live: &Liveness,
    buffers: &[gl::types::GLuint],
) -> Result<Vec<gl::types::GLuint>, Error> {
    let mut mesh_used = vec![false; doc.meshes.len()];
    for (node_id, node) in doc.nodes.iter().enumerate() {
        if !live.nodes[node_id] {
            continue;
        }
        if let Some(mesh_id) = doc.valid_mesh(node) {
            mesh_used[mesh_id] = true;
        }
    }

    let mut vaos = vec![0; doc.meshes.len()];
    for (mesh_id, &used) in mesh_used.iter().enumerate() {
        if used {
            vaos[mesh_id] = bind_mesh(doc, mesh_id, buffers)?;
        }
    }
    Ok(vaos)
}

fn bind_mesh(
    doc: &Document,
    mesh_id: usize,
    buffers: &[gl::types::GLuint],
) -> Result<gl::types::GLuint, Error> {
    let mut vao = 0;
    gl::call!(gl::GenVertexArrays(1, &mut vao));
    let _bound_vao = guards::vertex_array(vao);

    for primitive in &doc.meshes[mesh_id].primitives {
        for (name, accessor_id) in &primitive.attributes {
            let location = match name.as_str() {
                "POSITION" => ATTR_LOC_POSITION,
                "NORMAL" => ATTR_LOC_NORMAL,
                "TEXCOORD_0" => ATTR_LOC_TEXCOORD_0,
                other => {
                    log::warn!("skipping unknown vertex attribute \"{other}\"");
                    continue;
                }
            };
            let accessor = doc.resolve_accessor(*accessor_id)?;
            let _bound_buffer = guards::buffer(gl::ARRAY_BUFFER, buffers[accessor.buffer_view]);
            gl::call!(gl::EnableVertexAttribArray(location));
            gl::call!(gl::VertexAttribPointer(
                location,
                accessor.element_count as i32,
                accessor.component_type,
                if accessor.normalized { gl::TRUE } else { gl::FALSE },
                accessor.byte_stride as i32,
                accessor.byte_offset as *const c_void,
            ));
        }
    }
    Ok(vao)
}

/// Walks the node DAG from the default scene's roots, composing node-local
/// transforms onto the inherited parent transform (parent first, children on
/// top), and records a draw call for every primitive whose texture state
/// matches the pass. Unlike the liveness walk this one deliberately
/// revisits shared nodes: each path from a root is a separate instance.
fn collect_pass(
    doc: &Document,
    gpu: &GpuResources,
    pass: Pass,
    mat_view: Mat4,
    mat_model: Mat4,
    out: &mut DrawCalls,
) {
    let Ok(scene) = doc.default_scene() else {
        return;
    };
    let mut worklist: Vec<(Mat4, usize)> = scene
        .nodes
        .iter()
        .map(|&node_id| (mat_model, node_id))
        .collect();
    while let Some((parent_transform, node_id)) = worklist.pop() {
        let Some(node) = doc.nodes.get(node_id) else {
            continue;
        };
        let transform = parent_transform * node.transform.to_matrix();
        if let Some(mesh_id) = doc.valid_mesh(node) {
            collect_mesh(doc, gpu, pass, mat_view, transform, mesh_id, out);
        }
        for &child_id in &node.children {
            worklist.push((transform, child_id));
        }
    }
}

fn collect_mesh(
    doc: &Document,
    gpu: &GpuResources,
    pass: Pass,
    mat_view: Mat4,
    mat_model: Mat4,
    mesh_id: usize,
    out: &mut DrawCalls,
) {
    let mat_normal = (mat_view * mat_model).inverse().transpose();
    for primitive in &doc.meshes[mesh_id].primitives {
        let texture = doc.base_color_texture(primitive);
        if texture.is_some() != (pass == Pass::Textured) {
            continue;
        }
        let indices = &doc.accessors[primitive.indices];
        out.add(DrawCall {
            vao: gpu.vaos[mesh_id],
            mode: primitive.mode,
            index_buffer: gpu.buffers[indices.buffer_view],
            index_count: indices.count as i32,
            index_type: indices.component_type,
            index_byte_offset: indices.byte_offset,
            texture: texture.map(|texture_id| gpu.textures[texture_id]),
            color_factor: doc.base_color_factor(primitive),
            mat_model,
            mat_normal,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::document::{Material, Node, NodeTransform, Primitive, Texture};
    use glam::{Quat, Vec3};

    const WALK_GLTF: &str = r#"{
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"mesh": 0}],
        "meshes": [{
            "primitives": [
                {"attributes": {"POSITION": 1}, "indices": 0, "material": 0},
                {"attributes": {"POSITION": 1}, "indices": 0, "material": 1}
            ]
        }],
        "accessors": [
            {"bufferView": 0, "componentType": 5123, "count": 3, "type": "SCALAR", "byteOffset": 2},
            {"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"}
        ],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 8, "target": 34963},
            {"buffer": 0, "byteOffset": 8, "byteLength": 36, "target": 34962}
        ],
        "buffers": [{"uri": "walk.bin", "byteLength": 44}],
        "materials": [
            {"pbrMetallicRoughness": {"baseColorTexture": {"index": 0}}},
            {"pbrMetallicRoughness": {"baseColorFactor": [0.0, 1.0, 0.0, 1.0]}}
        ],
        "textures": [{"source": 0}],
        "images": []
    }"#;

    fn walk_document() -> Document {
        static BIN: [u8; 44] = [0; 44];
        let resources: Vec<(&str, &[u8])> = vec![("walk.bin", &BIN)];
        Document::parse(WALK_GLTF, &resources).unwrap()
    }

    fn fake_gpu(doc: &Document) -> GpuResources {
        GpuResources {
            buffers: (0..doc.buffer_views.len() as u32).map(|i| 100 + i).collect(),
            textures: (0..doc.textures.len() as u32).map(|i| 200 + i).collect(),
            vaos: (0..doc.meshes.len() as u32).map(|i| 300 + i).collect(),
        }
    }

    fn collect(doc: &Document, gpu: &GpuResources, pass: Pass) -> DrawCalls {
        let mut out = DrawCalls::new();
        collect_pass(doc, gpu, pass, Mat4::IDENTITY, Mat4::IDENTITY, &mut out);
        out
    }

    #[test]
    fn each_primitive_lands_in_exactly_one_pass() {
        let doc = walk_document();
        let gpu = fake_gpu(&doc);

        let textured = collect(&doc, &gpu, Pass::Textured);
        assert_eq!(1, textured.calls().len());
        assert_eq!(Some(200), textured.calls()[0].texture);
        assert_eq!([1.0; 4], textured.calls()[0].color_factor);

        let flat = collect(&doc, &gpu, Pass::Flat);
        assert_eq!(1, flat.calls().len());
        assert_eq!(None, flat.calls()[0].texture);
        assert_eq!([0.0, 1.0, 0.0, 1.0], flat.calls()[0].color_factor);
    }

    #[test]
    fn draw_call_carries_the_index_layout() {
        let doc = walk_document();
        let gpu = fake_gpu(&doc);
        let calls = collect(&doc, &gpu, Pass::Flat);
        let call = &calls.calls()[0];
        assert_eq!(300, call.vao);
        assert_eq!(gl::TRIANGLES, call.mode);
        assert_eq!(100, call.index_buffer);
        assert_eq!(3, call.index_count);
        assert_eq!(gl::UNSIGNED_SHORT, call.index_type);
        assert_eq!(2, call.index_byte_offset);
    }

    #[test]
    fn a_broken_texture_reference_degrades_to_the_flat_pass() {
        let mut doc = walk_document();
        doc.materials[0].base_color_texture = Some(9);
        let gpu = fake_gpu(&doc);
        assert_eq!(0, collect(&doc, &gpu, Pass::Textured).calls().len());
        assert_eq!(2, collect(&doc, &gpu, Pass::Flat).calls().len());
    }

    #[test]
    fn transforms_compose_parent_before_child() {
        let mut doc = walk_document();
        let translation = Vec3::new(3.0, 0.0, 0.0);
        let rotation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
        doc.nodes = vec![
            Node {
                mesh: None,
                children: vec![1],
                transform: NodeTransform::Decomposed {
                    translation: Some(translation),
                    rotation: None,
                },
            },
            Node {
                mesh: Some(0),
                children: vec![],
                transform: NodeTransform::Decomposed {
                    translation: None,
                    rotation: Some(rotation),
                },
            },
        ];
        let gpu = fake_gpu(&doc);
        let calls = collect(&doc, &gpu, Pass::Flat);
        let expected = Mat4::from_translation(translation) * Mat4::from_quat(rotation);
        assert!(calls.calls()[0].mat_model.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn normal_matrix_is_inverse_transpose_of_view_model() {
        let doc = walk_document();
        let gpu = fake_gpu(&doc);
        let mat_view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let mat_model = Mat4::from_rotation_y(0.7);
        let mut out = DrawCalls::new();
        collect_pass(&doc, &gpu, Pass::Flat, mat_view, mat_model, &mut out);
        let expected = (mat_view * mat_model).inverse().transpose();
        assert!(out.calls()[0].mat_normal.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn shared_nodes_draw_once_per_path() {
        let mut doc = walk_document();
        doc.nodes = vec![
            Node {
                mesh: None,
                children: vec![1, 1],
                transform: NodeTransform::Decomposed {
                    translation: None,
                    rotation: None,
                },
            },
            Node {
                mesh: Some(0),
                children: vec![],
                transform: NodeTransform::Decomposed {
                    translation: None,
                    rotation: None,
                },
            },
        ];
        let gpu = fake_gpu(&doc);
        assert_eq!(2, collect(&doc, &gpu, Pass::Flat).calls().len());
    }

    #[test]
    fn image_formats_map_by_channel_count_and_pixel_type() {
        let image = |components, pixel_type| Image {
            width: 1,
            height: 1,
            components,
            pixel_type,
            pixels: vec![0; 8],
        };
        assert_eq!(
            (gl::RED, gl::UNSIGNED_BYTE),
            image_gl_format(&image(1, PixelType::U8)).unwrap()
        );
        assert_eq!(
            (gl::RG, gl::UNSIGNED_SHORT),
            image_gl_format(&image(2, PixelType::U16)).unwrap()
        );
        assert_eq!(
            (gl::RGB, gl::UNSIGNED_BYTE),
            image_gl_format(&image(3, PixelType::U8)).unwrap()
        );
        assert_eq!(
            (gl::RGBA, gl::UNSIGNED_BYTE),
            image_gl_format(&image(4, PixelType::U8)).unwrap()
        );
        assert!(matches!(
            image_gl_format(&image(5, PixelType::U8)),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            image_gl_format(&image(3, PixelType::F32)),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unused_material_and_texture_tables_stay_consistent() {
        let mut doc = walk_document();
        doc.materials.push(Material {
            base_color_factor: [0.5; 4],
            base_color_texture: None,
        });
        doc.textures.push(Texture { source: None });
        doc.meshes[0].primitives.push(Primitive {
            indices: 0,
            attributes: vec![("POSITION".to_string(), 1)],
            material: None,
            mode: gl::TRIANGLES,
        });
        let gpu = fake_gpu(&doc);
        // The material-less primitive joins the flat pass with the default
        // factor.
        let flat = collect(&doc, &gpu, Pass::Flat);
        assert_eq!(2, flat.calls().len());
        assert!(flat
            .calls()
            .iter()
            .any(|call| call.color_factor == [1.0; 4]));
    }
}
