//! Reachability analysis over the node graph.
//!
//! Only resources reachable from the default scene's root nodes are worth
//! uploading. Nodes form a DAG, not a tree: a node may be referenced by
//! several parents, so the traversal keeps a visited bitmap and processes
//! each node at most once. The worklist is an explicit `Vec` rather than
//! recursion, so arbitrarily deep chains cannot overflow the stack.

use crate::renderer::gltf::document::Document;
use crate::renderer::Error;

/// Which nodes, buffer views and textures are reachable from the default
/// scene. Produced once per load and discarded after upload.
#[derive(Debug)]
pub struct Liveness {
    pub nodes: Vec<bool>,
    pub buffer_views: Vec<bool>,
    pub textures: Vec<bool>,
}

pub fn analyze(doc: &Document) -> Result<Liveness, Error> {
    let mut nodes = vec![false; doc.nodes.len()];
    let mut worklist = doc.default_scene()?.nodes.clone();
    while let Some(node_id) = worklist.pop() {
        let node = doc
            .nodes
            .get(node_id)
            .ok_or_else(|| Error::Load(format!("node {node_id} out of range")))?;
        if nodes[node_id] {
            continue;
        }
        nodes[node_id] = true;
        worklist.extend_from_slice(&node.children);
    }

    let mut buffer_views = vec![false; doc.buffer_views.len()];
    let mut textures = vec![false; doc.textures.len()];
    for (node_id, node) in doc.nodes.iter().enumerate() {
        if !nodes[node_id] {
            continue;
        }
        let Some(mesh_id) = doc.valid_mesh(node) else {
            continue;
        };
        for primitive in &doc.meshes[mesh_id].primitives {
            let indices = doc.resolve_index_accessor(primitive.indices)?;
            buffer_views[indices.buffer_view] = true;
            for &(_, accessor_id) in &primitive.attributes {
                let attribute = doc.resolve_accessor(accessor_id)?;
                buffer_views[attribute.buffer_view] = true;
            }
            if let Some(texture_id) = doc.base_color_texture(primitive) {
                textures[texture_id] = true;
            }
        }
    }

    Ok(Liveness {
        nodes,
        buffer_views,
        textures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::gltf::document::{Node, NodeTransform, Scene};

    const TWO_MESH_GLTF: &str = r#"{
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [
            {"mesh": 0},
            {"mesh": 1}
        ],
        "meshes": [
            {"primitives": [{"attributes": {"POSITION": 1}, "indices": 0}]},
            {"primitives": [{"attributes": {"POSITION": 3}, "indices": 2}]}
        ],
        "accessors": [
            {"bufferView": 0, "componentType": 5123, "count": 3, "type": "SCALAR"},
            {"bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3"},
            {"bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR"},
            {"bufferView": 3, "componentType": 5126, "count": 3, "type": "VEC3"}
        ],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 6, "target": 34963},
            {"buffer": 0, "byteOffset": 8, "byteLength": 36, "target": 34962},
            {"buffer": 0, "byteOffset": 44, "byteLength": 6, "target": 34963},
            {"buffer": 0, "byteOffset": 52, "byteLength": 36, "target": 34962}
        ],
        "buffers": [{"uri": "scene.bin", "byteLength": 88}]
    }"#;

    fn two_mesh_document() -> Document {
        static BIN: [u8; 88] = [0; 88];
        let resources: Vec<(&str, &[u8])> = vec![("scene.bin", &BIN)];
        Document::parse(TWO_MESH_GLTF, &resources).unwrap()
    }

    fn plain_node(mesh: Option<usize>, children: Vec<usize>) -> Node {
        Node {
            mesh,
            children,
            transform: NodeTransform::Decomposed {
                translation: None,
                rotation: None,
            },
        }
    }

    #[test]
    fn orphaned_meshes_stay_dead() {
        // The scene only roots node 0; node 1 and everything mesh 1
        // references must stay unmarked.
        let doc = two_mesh_document();
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![true, false], live.nodes);
        assert_eq!(vec![true, true, false, false], live.buffer_views);
    }

    #[test]
    fn reachable_children_are_marked() {
        let mut doc = two_mesh_document();
        doc.nodes[0].children = vec![1];
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![true, true], live.nodes);
        assert_eq!(vec![true, true, true, true], live.buffer_views);
    }

    #[test]
    fn diamond_references_terminate() {
        let mut doc = two_mesh_document();
        doc.nodes = vec![
            plain_node(None, vec![1, 2]),
            plain_node(None, vec![3]),
            plain_node(None, vec![3]),
            plain_node(Some(0), vec![]),
        ];
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![true; 4], live.nodes);
        assert_eq!(vec![true, true, false, false], live.buffer_views);
    }

    #[test]
    fn cyclic_references_terminate() {
        let mut doc = two_mesh_document();
        doc.nodes = vec![plain_node(Some(0), vec![1]), plain_node(None, vec![0])];
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![true, true], live.nodes);
    }

    #[test]
    fn deep_chains_do_not_overflow_the_stack() {
        let mut doc = two_mesh_document();
        // A 10k-node chain where every link also adds a second edge one
        // step ahead; without the visited bitmap this walk would be
        // exponential in the chain length.
        let count = 10_000;
        doc.nodes = (0..count)
            .map(|i| {
                let children: Vec<usize> = (i + 1..(i + 3).min(count)).collect();
                plain_node(if i == count - 1 { Some(0) } else { None }, children)
            })
            .collect();
        let live = analyze(&doc).unwrap();
        assert!(live.nodes.iter().all(|&live| live));
    }

    #[test]
    fn out_of_range_mesh_is_skipped_silently() {
        let mut doc = two_mesh_document();
        doc.nodes[0].mesh = Some(42);
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![false; 4], live.buffer_views);
    }

    #[test]
    fn out_of_range_node_is_a_load_error() {
        let mut doc = two_mesh_document();
        doc.scenes = vec![Scene { nodes: vec![9] }];
        let err = analyze(&doc).unwrap_err();
        assert!(err.to_string().contains("node 9"));
    }

    #[test]
    fn in_range_texture_goes_live_with_its_primitive() {
        let mut doc = two_mesh_document();
        doc.materials
            .push(crate::renderer::gltf::document::Material {
                base_color_factor: [1.0; 4],
                base_color_texture: Some(0),
            });
        doc.textures
            .push(crate::renderer::gltf::document::Texture { source: None });
        doc.meshes[0].primitives[0].material = Some(0);
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![true], live.textures);

        // An out-of-range texture index is ignored rather than marked.
        doc.materials[0].base_color_texture = Some(5);
        let live = analyze(&doc).unwrap();
        assert_eq!(vec![false], live.textures);
    }

    #[test]
    fn non_contiguous_index_accessor_fails_analysis() {
        let mut doc = two_mesh_document();
        doc.buffer_views[0].byte_stride = Some(4);
        let err = analyze(&doc).unwrap_err();
        assert!(err.to_string().contains("not tightly packed"));
    }
}
