//! In-memory scene description parsed from a glTF 2.0 ASCII document.
//!
//! The parse is deliberately dumb: it produces the indexed tables the rest
//! of the renderer works on (buffers, buffer views, accessors, meshes,
//! materials, textures, images, nodes, scenes) and resolves nothing ahead of
//! time. Referenced `.bin` buffers and image files are read from disk next
//! to the document; GLB containers and `data:` URIs are not supported.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glam::{Mat4, Quat, Vec3};
use image::{DynamicImage, GenericImageView};
use tinyjson::JsonValue;

use crate::renderer::gl;
use crate::renderer::Error;

#[derive(Debug)]
pub struct Document {
    pub buffers: Vec<Buffer>,
    pub buffer_views: Vec<BufferView>,
    pub accessors: Vec<Accessor>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<Image>,
    pub nodes: Vec<Node>,
    pub scenes: Vec<Scene>,
    /// Index of the default scene.
    pub scene: usize,
}

#[derive(Debug)]
pub struct Buffer {
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct BufferView {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub byte_stride: Option<usize>,
    /// GL buffer binding target hint. Views without one hold generic data
    /// and are never uploaded as buffer objects.
    pub target: Option<gl::types::GLenum>,
}

#[derive(Debug)]
pub struct Accessor {
    pub buffer_view: usize,
    /// Offset into the buffer view, which is also the offset into the
    /// uploaded buffer object.
    pub byte_offset: usize,
    pub component_type: gl::types::GLenum,
    pub count: usize,
    /// Components per element: 1 for SCALAR, 2-4 for VEC*, 4/9/16 for MAT*.
    pub element_count: usize,
    pub normalized: bool,
}

#[derive(Debug)]
pub struct Mesh {
    pub primitives: Vec<Primitive>,
}

#[derive(Debug)]
pub struct Primitive {
    pub indices: usize,
    /// Attribute semantic name to accessor index, sorted by name.
    pub attributes: Vec<(String, usize)>,
    pub material: Option<usize>,
    pub mode: gl::types::GLenum,
}

#[derive(Debug)]
pub struct Material {
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<usize>,
}

#[derive(Debug)]
pub struct Texture {
    pub source: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
    F32,
}

#[derive(Debug)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    pub pixel_type: PixelType,
    pub pixels: Vec<u8>,
}

#[derive(Debug)]
pub struct Node {
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
    pub transform: NodeTransform,
}

#[derive(Debug)]
pub enum NodeTransform {
    Matrix(Mat4),
    Decomposed {
        translation: Option<Vec3>,
        rotation: Option<Quat>,
    },
}

impl NodeTransform {
    /// The node-local transform; translation applies before rotation, and
    /// absent components default to identity.
    pub fn to_matrix(&self) -> Mat4 {
        match self {
            NodeTransform::Matrix(matrix) => *matrix,
            NodeTransform::Decomposed {
                translation,
                rotation,
            } => {
                let mut matrix = Mat4::IDENTITY;
                if let Some(translation) = translation {
                    matrix *= Mat4::from_translation(*translation);
                }
                if let Some(rotation) = rotation {
                    matrix *= Mat4::from_quat(*rotation);
                }
                matrix
            }
        }
    }
}

#[derive(Debug)]
pub struct Scene {
    pub nodes: Vec<usize>,
}

/// An accessor with its layout fully computed: stride falls back to the
/// tightly-packed element size when the owning buffer view declares none.
#[derive(Debug)]
pub struct ResolvedAccessor {
    pub buffer_view: usize,
    pub byte_offset: usize,
    pub component_type: gl::types::GLenum,
    pub component_size: usize,
    pub element_count: usize,
    pub byte_stride: usize,
    pub count: usize,
    pub normalized: bool,
}

impl Document {
    /// Reads and parses a glTF document, loading referenced buffers and
    /// images from sibling files.
    pub fn from_path(path: &Path) -> Result<Document, Error> {
        let text = fs::read_to_string(path)
            .map_err(|err| Error::Load(format!("could not read {}: {err}", path.display())))?;
        let json: JsonValue = text
            .parse()
            .map_err(|err| Error::Load(format!("could not parse {}: {err}", path.display())))?;
        let root = as_obj(&json, "glTF document")?;

        let dir = path.parent().unwrap_or(Path::new(""));
        let mut resources: Vec<(String, Vec<u8>)> = Vec::new();
        for key in ["buffers", "images"] {
            let Some(entries) = root.get(key) else { continue };
            for (i, entry) in as_arr(entries, key)?.iter().enumerate() {
                let what = format!("{key}[{i}]");
                let uri = uri_of(as_obj(entry, &what)?, &what)?;
                if resources.iter().any(|(name, _)| *name == uri) {
                    continue;
                }
                let data = fs::read(dir.join(&uri))
                    .map_err(|err| Error::Load(format!("could not read \"{uri}\": {err}")))?;
                resources.push((uri, data));
            }
        }
        let resources: Vec<(&str, &[u8])> = resources
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        build(&json, &resources)
    }

    /// Parses a glTF document with referenced resources supplied in memory,
    /// keyed by URI.
    pub fn parse(gltf: &str, resources: &[(&str, &[u8])]) -> Result<Document, Error> {
        let json: JsonValue = gltf
            .parse()
            .map_err(|err| Error::Load(format!("could not parse glTF document: {err}")))?;
        build(&json, resources)
    }

    pub fn default_scene(&self) -> Result<&Scene, Error> {
        self.scenes
            .get(self.scene)
            .ok_or_else(|| Error::Load(format!("default scene {} out of range", self.scene)))
    }

    /// The node's mesh index, if it has one and it is in range. An
    /// out-of-range index means "no mesh", not an error.
    pub fn valid_mesh(&self, node: &Node) -> Option<usize> {
        node.mesh.filter(|&mesh| mesh < self.meshes.len())
    }

    /// The primitive's base color texture, if its whole reference chain
    /// (material, texture index) is valid. Primitives without one are drawn
    /// untextured.
    pub fn base_color_texture(&self, primitive: &Primitive) -> Option<usize> {
        let material = self.materials.get(primitive.material?)?;
        let texture = material.base_color_texture?;
        (texture < self.textures.len()).then_some(texture)
    }

    pub fn base_color_factor(&self, primitive: &Primitive) -> [f32; 4] {
        primitive
            .material
            .and_then(|material| self.materials.get(material))
            .map(|material| material.base_color_factor)
            .unwrap_or([1.0; 4])
    }

    pub fn resolve_accessor(&self, id: usize) -> Result<ResolvedAccessor, Error> {
        let accessor = self
            .accessors
            .get(id)
            .ok_or_else(|| Error::Load(format!("accessor {id} out of range")))?;
        let view = self.buffer_views.get(accessor.buffer_view).ok_or_else(|| {
            Error::Load(format!(
                "accessor {id} references buffer view {} which is out of range",
                accessor.buffer_view
            ))
        })?;
        let component_size = component_byte_size(accessor.component_type)?;
        Ok(ResolvedAccessor {
            buffer_view: accessor.buffer_view,
            byte_offset: accessor.byte_offset,
            component_type: accessor.component_type,
            component_size,
            element_count: accessor.element_count,
            byte_stride: view
                .byte_stride
                .unwrap_or(component_size * accessor.element_count),
            count: accessor.count,
            normalized: accessor.normalized,
        })
    }

    /// Like [`Document::resolve_accessor`], with the additional requirement
    /// that index data is contiguous: the draw call addresses the index
    /// buffer by byte offset alone, so a stride other than the component
    /// size cannot be represented.
    pub fn resolve_index_accessor(&self, id: usize) -> Result<ResolvedAccessor, Error> {
        let resolved = self.resolve_accessor(id)?;
        if resolved.byte_stride != resolved.component_size {
            return Err(Error::Load(format!(
                "index accessor {id} is not tightly packed (stride {}, component size {})",
                resolved.byte_stride, resolved.component_size
            )));
        }
        let end = resolved.byte_offset + resolved.count * resolved.component_size;
        let view = &self.buffer_views[resolved.buffer_view];
        if end > view.byte_length {
            return Err(Error::Load(format!(
                "index accessor {id} overruns its buffer view ({end} > {})",
                view.byte_length
            )));
        }
        Ok(resolved)
    }
}

pub fn component_byte_size(component_type: gl::types::GLenum) -> Result<usize, Error> {
    match component_type {
        gl::BYTE | gl::UNSIGNED_BYTE => Ok(1),
        gl::SHORT | gl::UNSIGNED_SHORT => Ok(2),
        gl::UNSIGNED_INT | gl::FLOAT => Ok(4),
        other => Err(Error::Load(format!(
            "unsupported accessor component type {other}"
        ))),
    }
}

fn entries<'a>(root: &'a Obj, key: &str) -> Result<&'a [JsonValue], Error> {
    match root.get(key) {
        Some(value) => as_arr(value, key).map(Vec::as_slice),
        None => Ok(&[]),
    }
}

fn build(json: &JsonValue, resources: &[(&str, &[u8])]) -> Result<Document, Error> {
    let root = as_obj(json, "glTF document")?;

    let mut buffers = Vec::new();
    for (i, entry) in entries(root, "buffers")?.iter().enumerate() {
        let what = format!("buffers[{i}]");
        let buffer = as_obj(entry, &what)?;
        let uri = uri_of(buffer, &what)?;
        let data = lookup_resource(resources, &uri)?;
        let byte_length = req_usize(buffer, "byteLength", &what)?;
        if data.len() < byte_length {
            return Err(Error::Load(format!(
                "buffer \"{uri}\" holds {} bytes, expected {byte_length}",
                data.len()
            )));
        }
        buffers.push(Buffer {
            data: data[..byte_length].to_vec(),
        });
    }

    let mut buffer_views = Vec::new();
    for (i, entry) in entries(root, "bufferViews")?.iter().enumerate() {
        let what = format!("bufferViews[{i}]");
        let view = as_obj(entry, &what)?;
        buffer_views.push(BufferView {
            buffer: req_usize(view, "buffer", &what)?,
            byte_offset: opt_usize(view, "byteOffset", &what)?.unwrap_or(0),
            byte_length: req_usize(view, "byteLength", &what)?,
            byte_stride: opt_usize(view, "byteStride", &what)?,
            target: opt_usize(view, "target", &what)?
                .map(|target| target as gl::types::GLenum)
                .filter(|&target| target != 0),
        });
    }

    let mut accessors = Vec::new();
    for (i, entry) in entries(root, "accessors")?.iter().enumerate() {
        let what = format!("accessors[{i}]");
        let accessor = as_obj(entry, &what)?;
        let buffer_view = opt_usize(accessor, "bufferView", &what)?.ok_or_else(|| {
            Error::Load(format!("{what} has no bufferView (sparse accessors are unsupported)"))
        })?;
        let element_count = match as_str(req(accessor, "type", &what)?, &what)? {
            "SCALAR" => 1,
            "VEC2" => 2,
            "VEC3" => 3,
            "VEC4" | "MAT2" => 4,
            "MAT3" => 9,
            "MAT4" => 16,
            other => {
                return Err(Error::Load(format!("{what} has unknown type \"{other}\"")));
            }
        };
        accessors.push(Accessor {
            buffer_view,
            byte_offset: opt_usize(accessor, "byteOffset", &what)?.unwrap_or(0),
            component_type: req_usize(accessor, "componentType", &what)? as gl::types::GLenum,
            count: req_usize(accessor, "count", &what)?,
            element_count,
            normalized: match accessor.get("normalized") {
                Some(value) => *value
                    .get::<bool>()
                    .ok_or_else(|| Error::Load(format!("{what} normalized is not a bool")))?,
                None => false,
            },
        });
    }

    let mut meshes = Vec::new();
    for (i, entry) in entries(root, "meshes")?.iter().enumerate() {
        let what = format!("meshes[{i}]");
        let mesh = as_obj(entry, &what)?;
        let mut primitives = Vec::new();
        for (j, entry) in as_arr(req(mesh, "primitives", &what)?, &what)?.iter().enumerate() {
            let what = format!("{what}.primitives[{j}]");
            let primitive = as_obj(entry, &what)?;
            let mut attributes = Vec::new();
            for (name, value) in as_obj(req(primitive, "attributes", &what)?, &what)? {
                attributes.push((name.clone(), as_usize(value, &what)?));
            }
            attributes.sort();
            let indices = opt_usize(primitive, "indices", &what)?.ok_or_else(|| {
                Error::Load(format!("{what} has no indices (unindexed primitives are unsupported)"))
            })?;
            primitives.push(Primitive {
                indices,
                attributes,
                material: opt_usize(primitive, "material", &what)?,
                mode: opt_usize(primitive, "mode", &what)?
                    .map(|mode| mode as gl::types::GLenum)
                    .unwrap_or(gl::TRIANGLES),
            });
        }
        meshes.push(Mesh { primitives });
    }

    let mut materials = Vec::new();
    for (i, entry) in entries(root, "materials")?.iter().enumerate() {
        let what = format!("materials[{i}]");
        let material = as_obj(entry, &what)?;
        let mut base_color_factor = [1.0; 4];
        let mut base_color_texture = None;
        if let Some(pbr) = material.get("pbrMetallicRoughness") {
            let pbr = as_obj(pbr, &what)?;
            if let Some(factor) = pbr.get("baseColorFactor") {
                base_color_factor = as_f32_array::<4>(factor, &what)?;
            }
            if let Some(texture) = pbr.get("baseColorTexture") {
                let texture = as_obj(texture, &what)?;
                base_color_texture = Some(req_usize(texture, "index", &what)?);
            }
        }
        materials.push(Material {
            base_color_factor,
            base_color_texture,
        });
    }

    let mut textures = Vec::new();
    for (i, entry) in entries(root, "textures")?.iter().enumerate() {
        let what = format!("textures[{i}]");
        textures.push(Texture {
            source: opt_usize(as_obj(entry, &what)?, "source", &what)?,
        });
    }

    let mut images = Vec::new();
    for (i, entry) in entries(root, "images")?.iter().enumerate() {
        let what = format!("images[{i}]");
        let uri = uri_of(as_obj(entry, &what)?, &what)?;
        images.push(decode_image(&uri, lookup_resource(resources, &uri)?)?);
    }

    let mut nodes = Vec::new();
    for (i, entry) in entries(root, "nodes")?.iter().enumerate() {
        let what = format!("nodes[{i}]");
        let node = as_obj(entry, &what)?;
        let children = match node.get("children") {
            Some(children) => as_arr(children, &what)?
                .iter()
                .map(|child| as_usize(child, &what))
                .collect::<Result<Vec<usize>, Error>>()?,
            None => Vec::new(),
        };
        let transform = if let Some(matrix) = node.get("matrix") {
            NodeTransform::Matrix(Mat4::from_cols_slice(&as_f32_array::<16>(matrix, &what)?))
        } else {
            NodeTransform::Decomposed {
                translation: node
                    .get("translation")
                    .map(|value| as_f32_array::<3>(value, &what))
                    .transpose()?
                    .map(Vec3::from),
                rotation: node
                    .get("rotation")
                    .map(|value| as_f32_array::<4>(value, &what))
                    .transpose()?
                    .map(|[x, y, z, w]| Quat::from_xyzw(x, y, z, w)),
            }
        };
        nodes.push(Node {
            mesh: opt_usize(node, "mesh", &what)?,
            children,
            transform,
        });
    }

    let mut scenes = Vec::new();
    for (i, entry) in entries(root, "scenes")?.iter().enumerate() {
        let what = format!("scenes[{i}]");
        let scene = as_obj(entry, &what)?;
        let node_indices = match scene.get("nodes") {
            Some(node_indices) => as_arr(node_indices, &what)?
                .iter()
                .map(|node| as_usize(node, &what))
                .collect::<Result<Vec<usize>, Error>>()?,
            None => Vec::new(),
        };
        scenes.push(Scene {
            nodes: node_indices,
        });
    }

    let scene = match root.get("scene") {
        Some(scene) => as_usize(scene, "scene")?,
        None => 0,
    };

    Ok(Document {
        buffers,
        buffer_views,
        accessors,
        meshes,
        materials,
        textures,
        images,
        nodes,
        scenes,
        scene,
    })
}

fn decode_image(uri: &str, bytes: &[u8]) -> Result<Image, Error> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| Error::Load(format!("could not decode image \"{uri}\": {err}")))?;
    let (components, pixel_type) = match &decoded {
        DynamicImage::ImageLuma8(_) => (1, PixelType::U8),
        DynamicImage::ImageLumaA8(_) => (2, PixelType::U8),
        DynamicImage::ImageRgb8(_) => (3, PixelType::U8),
        DynamicImage::ImageRgba8(_) => (4, PixelType::U8),
        DynamicImage::ImageLuma16(_) => (1, PixelType::U16),
        DynamicImage::ImageLumaA16(_) => (2, PixelType::U16),
        DynamicImage::ImageRgb16(_) => (3, PixelType::U16),
        DynamicImage::ImageRgba16(_) => (4, PixelType::U16),
        DynamicImage::ImageRgb32F(_) => (3, PixelType::F32),
        DynamicImage::ImageRgba32F(_) => (4, PixelType::F32),
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "image \"{uri}\" decoded to an unrecognized pixel layout"
            )));
        }
    };
    Ok(Image {
        width: decoded.width(),
        height: decoded.height(),
        components,
        pixel_type,
        pixels: decoded.into_bytes(),
    })
}

fn lookup_resource<'a>(resources: &[(&'a str, &'a [u8])], uri: &str) -> Result<&'a [u8], Error> {
    for (name, data) in resources {
        if *name == uri {
            return Ok(data);
        }
    }
    Err(Error::Load(format!(
        "could not find resource with uri \"{uri}\""
    )))
}

fn uri_of(map: &Obj, what: &str) -> Result<String, Error> {
    let uri = as_str(req(map, "uri", what)?, what)?;
    if uri.starts_with("data:") {
        return Err(Error::Load(format!(
            "{what}: data: URIs are not supported"
        )));
    }
    Ok(uri.to_string())
}

type Obj = HashMap<String, JsonValue>;

fn as_obj<'a>(value: &'a JsonValue, what: &str) -> Result<&'a Obj, Error> {
    value
        .get()
        .ok_or_else(|| Error::Load(format!("{what} is not a JSON object")))
}

fn as_arr<'a>(value: &'a JsonValue, what: &str) -> Result<&'a Vec<JsonValue>, Error> {
    value
        .get()
        .ok_or_else(|| Error::Load(format!("{what} is not a JSON array")))
}

fn as_str<'a>(value: &'a JsonValue, what: &str) -> Result<&'a str, Error> {
    value
        .get::<String>()
        .map(String::as_str)
        .ok_or_else(|| Error::Load(format!("{what} is not a JSON string")))
}

fn as_usize(value: &JsonValue, what: &str) -> Result<usize, Error> {
    let number: &f64 = value
        .get()
        .ok_or_else(|| Error::Load(format!("{what} is not a JSON number")))?;
    Ok(*number as usize)
}

fn as_f32_array<const N: usize>(value: &JsonValue, what: &str) -> Result<[f32; N], Error> {
    let values = as_arr(value, what)?;
    if values.len() != N {
        return Err(Error::Load(format!(
            "{what} holds {} numbers, expected {N}",
            values.len()
        )));
    }
    let mut array = [0.0; N];
    for (i, value) in values.iter().enumerate() {
        let number: &f64 = value
            .get()
            .ok_or_else(|| Error::Load(format!("{what} is not a JSON number array")))?;
        array[i] = *number as f32;
    }
    Ok(array)
}

fn req<'a>(map: &'a Obj, key: &str, what: &str) -> Result<&'a JsonValue, Error> {
    map.get(key)
        .ok_or_else(|| Error::Load(format!("{what} is missing \"{key}\"")))
}

fn req_usize(map: &Obj, key: &str, what: &str) -> Result<usize, Error> {
    as_usize(req(map, key, what)?, what)
}

fn opt_usize(map: &Obj, key: &str, what: &str) -> Result<Option<usize>, Error> {
    map.get(key).map(|value| as_usize(value, what)).transpose()
}
