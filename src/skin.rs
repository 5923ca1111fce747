//! Skin serializer: one `<controller>` per (armature, mesh) pair.
//!
//! Joint order is the armature's depth-first bone order; that order is the
//! index space for both the inverse bind matrices and the per-vertex weight
//! pairs. Bind poses come straight from the snapshot, with the Z basis axis
//! negated to bridge the authoring tool's and the engine's conventions.

use hashbrown::HashMap;
use xmltree::Element;

use crate::document::{fixed_text, write_input, write_source, ElementExt, SourceData};
use crate::error::ExportError;
use crate::scene::{Armature, Bone, Mesh, SceneObject, SceneSnapshot};

/// Influences accepted per vertex; entries beyond this are dropped with a
/// diagnostic, never an error.
pub const MAX_VERTEX_INFLUENCES: usize = 8;

/// Joint name suffix carrying the originating export-node name, so the
/// downstream compiler can tell same-named bones of different units apart.
pub(crate) fn props_bone_name(bone_name: &str, node_name: &str) -> String {
    format!("%{}%--PRprops_name={}", node_name, bone_name.replace("__", "*"))
}

/// Negate the Z component of the basis rows (column 2 of the upper 3x3),
/// flipping the matrix's Z axis.
pub(crate) fn negate_z_axis(mut matrix: [[f32; 4]; 4]) -> [[f32; 4]; 4] {
    for row in matrix.iter_mut().take(3) {
        row[2] = -row[2];
    }
    matrix
}

pub fn write_library_controllers(snapshot: &SceneSnapshot) -> Result<Element, ExportError> {
    let mut library = Element::new("library_controllers");
    for object in snapshot.geometry_objects() {
        if object.is_bone_geometry() {
            continue;
        }
        let Some(mesh) = &object.mesh else { continue };
        let Some(armature_name) = &object.armature else {
            continue;
        };
        let Some(armature) = snapshot.armature(armature_name) else {
            tracing::warn!(
                "object '{}' references unknown armature '{}'",
                object.name,
                armature_name
            );
            continue;
        };
        library.push_elem(write_controller(snapshot, object, mesh, armature)?);
    }
    Ok(library)
}

fn write_controller(
    snapshot: &SceneSnapshot,
    object: &SceneObject,
    mesh: &Mesh,
    armature: &Armature,
) -> Result<Element, ExportError> {
    let id = format!("{}_{}", armature.name, object.name);
    let node_name = snapshot
        .node_for_object(&object.name)
        .map(|n| n.name.as_str())
        .unwrap_or(snapshot.name.as_str());
    let bones = armature.bones_depth_first();

    let mut controller = Element::new("controller");
    controller.set_attr("id", id.as_str());

    let mut skin = Element::new("skin");
    skin.set_attr("source", format!("#{}-mesh", object.name));

    let mut bind_shape = Element::new("bind_shape_matrix");
    bind_shape.push_text(fixed_text(&identity_matrix()));
    skin.push_elem(bind_shape);

    skin.push_elem(write_joints_source(&id, &bones, node_name));
    skin.push_elem(write_matrices_source(&id, armature, &bones)?);
    write_weights(&id, object, mesh, &bones, &mut skin);

    let mut joints = Element::new("joints");
    joints.push_elem(write_input(&id, None, "joints", "JOINT"));
    joints.push_elem(write_input(&id, None, "matrices", "INV_BIND_MATRIX"));
    skin.push_elem(joints);

    controller.push_elem(skin);
    Ok(controller)
}

fn identity_matrix() -> [f32; 16] {
    let mut m = [0.0; 16];
    for i in 0..4 {
        m[i * 5] = 1.0;
    }
    m
}

fn write_joints_source(id: &str, bones: &[&Bone], node_name: &str) -> Element {
    let names: Vec<String> = bones
        .iter()
        .map(|bone| format!("{}{}", bone.name, props_bone_name(&bone.name, node_name)))
        .collect();
    write_source(&format!("{}-joints", id), &SourceData::Idrefs(names), &[])
}

fn write_matrices_source(
    id: &str,
    armature: &Armature,
    bones: &[&Bone],
) -> Result<Element, ExportError> {
    let mut matrices = Vec::with_capacity(bones.len());
    for bone in bones {
        let bind = bone.bind_matrix.ok_or_else(|| ExportError::MissingBindPose {
            armature: armature.name.clone(),
            bone: bone.name.clone(),
        })?;
        let corrected = negate_z_axis(bind);
        let mut flat = [0.0f32; 16];
        for (row_index, row) in corrected.iter().enumerate() {
            flat[row_index * 4..row_index * 4 + 4].copy_from_slice(row);
        }
        matrices.push(flat);
    }
    Ok(write_source(
        &format!("{}-matrices", id),
        &SourceData::Matrices(matrices),
        &[],
    ))
}

/// Flat weight payload for one mesh: parallel `vcount`, `(joint, slot)`
/// pairs and weight magnitudes. `sum(vcounts) == pairs.len() / 2
/// == weights.len()` always holds.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct VertexWeightStreams {
    pub weights: Vec<f32>,
    /// Flattened (bone index, weight slot) pairs.
    pub pairs: Vec<usize>,
    pub vcounts: Vec<usize>,
}

/// Walk each vertex's group memberships in host order: zero weights and
/// groups that are not bones are skipped, and everything past the
/// 8-influence cap is dropped with a diagnostic.
pub(crate) fn collect_vertex_weights(
    mesh: &Mesh,
    bones: &[&Bone],
    object_name: &str,
) -> VertexWeightStreams {
    let bone_index: HashMap<&str, usize> = bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();

    let mut streams = VertexWeightStreams::default();
    let mut slot = 0usize;
    for vertex in &mesh.vertices {
        let mut accepted = 0usize;
        for group in &vertex.groups {
            if group.weight == 0.0 {
                continue;
            }
            let Some(&bone) = bone_index.get(group.group.as_str()) else {
                continue;
            };
            if accepted == MAX_VERTEX_INFLUENCES {
                tracing::warn!(
                    "too many bone references in {}:{} vertex group",
                    object_name,
                    group.group
                );
                continue;
            }
            streams.weights.push(group.weight);
            streams.pairs.push(bone);
            streams.pairs.push(slot);
            slot += 1;
            accepted += 1;
        }
        streams.vcounts.push(accepted);
    }
    streams
}

fn write_weights(id: &str, object: &SceneObject, mesh: &Mesh, bones: &[&Bone], skin: &mut Element) {
    let streams = collect_vertex_weights(mesh, bones, &object.name);

    skin.push_elem(write_source(
        &format!("{}-weights", id),
        &SourceData::Floats(streams.weights),
        &[],
    ));

    let mut vertex_weights = Element::new("vertex_weights");
    vertex_weights.set_attr("count", mesh.vertices.len().to_string());
    vertex_weights.push_elem(write_input(id, Some(0), "joints", "JOINT"));
    vertex_weights.push_elem(write_input(id, Some(1), "weights", "WEIGHT"));

    let mut vcount = Element::new("vcount");
    vcount.push_text(join(&streams.vcounts));
    vertex_weights.push_elem(vcount);

    let mut v = Element::new("v");
    v.push_text(join(&streams.pairs));
    vertex_weights.push_elem(v);

    skin.push_elem(vertex_weights);
}

fn join(values: &[usize]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Vertex, VertexWeight};

    fn bone(name: &str) -> Bone {
        Bone {
            name: name.to_string(),
            parent: None,
            bind_matrix: Some([[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [
                0.0, 0.0, 0.0, 1.0,
            ]]),
            phys_proxy: None,
            ik: None,
        }
    }

    fn weighted_vertex(groups: &[(&str, f32)]) -> Vertex {
        Vertex {
            position: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            groups: groups
                .iter()
                .map(|(name, weight)| VertexWeight {
                    group: (*name).to_string(),
                    weight: *weight,
                })
                .collect(),
        }
    }

    fn mesh_of(vertices: Vec<Vertex>) -> Mesh {
        Mesh {
            vertices,
            faces: Vec::new(),
            uv_layers: Vec::new(),
            color_layers: Vec::new(),
            material_slots: Vec::new(),
        }
    }

    #[test]
    fn invalid_group_entries_are_dropped_silently() {
        let root = bone("Bone");
        let bones = vec![&root];
        let mesh = mesh_of(vec![
            weighted_vertex(&[("Bone", 1.0)]),
            weighted_vertex(&[("Bone", 0.5), ("NotABone", 0.5)]),
        ]);

        let streams = collect_vertex_weights(&mesh, &bones, "body");
        assert_eq!(streams.vcounts, vec![1, 1]);
        assert_eq!(streams.pairs, vec![0, 0, 0, 1]);
        assert_eq!(streams.weights.len(), 2);
    }

    #[test]
    fn zero_weights_are_skipped() {
        let root = bone("Bone");
        let bones = vec![&root];
        let mesh = mesh_of(vec![weighted_vertex(&[("Bone", 0.0), ("Bone", 0.25)])]);

        let streams = collect_vertex_weights(&mesh, &bones, "body");
        assert_eq!(streams.vcounts, vec![1]);
        assert_eq!(streams.weights, vec![0.25]);
    }

    #[test]
    fn influences_are_capped_at_eight() {
        let bones: Vec<Bone> = (0..10).map(|i| bone(&format!("b{}", i))).collect();
        let bone_refs: Vec<&Bone> = bones.iter().collect();
        let groups: Vec<(String, f32)> = (0..10).map(|i| (format!("b{}", i), 0.1)).collect();
        let group_slice: Vec<(&str, f32)> =
            groups.iter().map(|(n, w)| (n.as_str(), *w)).collect();
        let mesh = mesh_of(vec![weighted_vertex(&group_slice)]);

        let streams = collect_vertex_weights(&mesh, &bone_refs, "body");
        assert_eq!(streams.vcounts, vec![MAX_VERTEX_INFLUENCES]);
        assert_eq!(streams.weights.len(), MAX_VERTEX_INFLUENCES);
        assert_eq!(streams.pairs.len(), MAX_VERTEX_INFLUENCES * 2);
    }

    #[test]
    fn weight_streams_stay_parallel() {
        let a = bone("a");
        let b = bone("b");
        let bones = vec![&a, &b];
        let mesh = mesh_of(vec![
            weighted_vertex(&[("a", 0.7), ("b", 0.3)]),
            weighted_vertex(&[("b", 1.0)]),
            weighted_vertex(&[]),
        ]);

        let streams = collect_vertex_weights(&mesh, &bones, "body");
        let total: usize = streams.vcounts.iter().sum();
        assert_eq!(total, streams.pairs.len() / 2);
        assert_eq!(total, streams.weights.len());
        // Slots are globally sequential across vertices.
        let slots: Vec<usize> = streams.pairs.chunks(2).map(|c| c[1]).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }

    #[test]
    fn z_axis_negation_flips_basis_z_components() {
        let m = [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let n = negate_z_axis(m);
        assert_eq!(n[0], [1.0, 2.0, -3.0, 4.0]);
        assert_eq!(n[1], [5.0, 6.0, -7.0, 8.0]);
        assert_eq!(n[2], [9.0, 10.0, -11.0, 12.0]);
        assert_eq!(n[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
