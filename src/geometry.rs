//! Geometry serializer: one `<geometry>` per mesh object.
//!
//! Buffers are written in a fixed order (positions, normals, UVs, colors,
//! vertices wrapper, polylists) because vertex order is the join key the
//! skin serializer relies on. The normal and texcoord index counters run
//! over the whole face list for every material group, so attribute indices
//! stay aligned with the flat per-face enumeration even for faces the
//! current group filters out.

use glam::Vec3;
use xmltree::Element;

use crate::document::{write_input, write_source, ElementExt, SourceData};
use crate::material::{double_sided_extra, MaterialIndex};
use crate::scene::{Face, Mesh, SceneObject};

/// Faces within this angle of each other (≈3°) are merged by the optional
/// planar-average normal pass.
const PLANAR_MERGE_ANGLE: f32 = 0.052;

pub fn write_geometry(
    object: &SceneObject,
    mesh: &Mesh,
    materials: &MaterialIndex,
    average_planar: bool,
) -> Element {
    let name = object.name.as_str();

    // The `-mesh` suffix keeps geometry ids out of the scene-node id space.
    let mut geometry = Element::new("geometry");
    geometry.set_attr("id", format!("{}-mesh", name));
    geometry.set_attr("name", name);

    let mut mesh_node = Element::new("mesh");
    mesh_node.push_elem(write_positions(name, mesh));
    mesh_node.push_elem(write_normals(name, mesh, average_planar));
    mesh_node.push_elem(write_uvs(name, mesh));
    if let Some(colors) = write_vertex_colors(name, mesh) {
        mesh_node.push_elem(colors);
    }
    mesh_node.push_elem(write_vertices(name));
    write_polylists(name, mesh, materials, &mut mesh_node);
    mesh_node.push_elem(double_sided_extra("MAYA"));

    geometry.push_elem(mesh_node);
    geometry
}

/// One XYZ triple per vertex, in host vertex index order.
fn write_positions(name: &str, mesh: &Mesh) -> Element {
    let mut floats = Vec::with_capacity(mesh.vertices.len() * 3);
    for vertex in &mesh.vertices {
        floats.extend_from_slice(&vertex.position);
    }
    write_source(
        &format!("{}-positions", name),
        &SourceData::Floats(floats),
        &["X", "Y", "Z"],
    )
}

/// Smooth faces emit the host-averaged vertex normal per referenced vertex;
/// flat faces emit one normal per face, optionally averaged with all faces
/// within [`PLANAR_MERGE_ANGLE`] (an O(F²) pass).
fn write_normals(name: &str, mesh: &Mesh, average_planar: bool) -> Element {
    let mut floats = Vec::new();
    for face in &mesh.faces {
        if face.smooth {
            for &vert in &face.vertices {
                floats.extend_from_slice(&mesh.vertices[vert as usize].normal);
            }
        } else if average_planar {
            floats.extend_from_slice(&planar_average(mesh, face));
        } else {
            floats.extend_from_slice(&face.normal);
        }
    }
    write_source(
        &format!("{}-normals", name),
        &SourceData::Floats(floats),
        &["X", "Y", "Z"],
    )
}

/// Mean of this face's normal and every face normal within the merge angle.
/// The scan over all faces matches the face against itself too, so the face
/// normal enters the sum twice; a mesh with no near-planar neighbours
/// therefore gets its own normal back unchanged.
fn planar_average(mesh: &Mesh, face: &Face) -> [f32; 3] {
    let base = Vec3::from_array(face.normal);
    let mut sum = base;
    let mut count = 1.0f32;
    for other in &mesh.faces {
        let angle = base.angle_between(Vec3::from_array(other.normal));
        if angle < PLANAR_MERGE_ANGLE {
            sum += Vec3::from_array(other.normal);
            count += 1.0;
        }
    }
    (sum / count).to_array()
}

/// Only the first UV layer is serialized; additional layers are a known
/// fidelity boundary and are dropped with a diagnostic.
fn write_uvs(name: &str, mesh: &Mesh) -> Element {
    let mut floats = Vec::new();
    match mesh.uv_layers.first() {
        Some(layer) => {
            if mesh.uv_layers.len() > 1 {
                tracing::warn!(
                    "mesh '{}': only UV layer '{}' is exported, {} further layer(s) dropped",
                    name,
                    layer.name,
                    mesh.uv_layers.len() - 1
                );
            }
            for face_uvs in &layer.uvs {
                for uv in face_uvs {
                    floats.extend_from_slice(uv);
                }
            }
        }
        None => {
            tracing::warn!("mesh '{}' has no UV map, writing zeroed coordinates", name);
            for face in &mesh.faces {
                for _ in &face.vertices {
                    floats.extend_from_slice(&[0.0, 0.0]);
                }
            }
        }
    }
    write_source(
        &format!("{}-UVMap-0", name),
        &SourceData::Floats(floats),
        &["S", "T"],
    )
}

/// Vertex colors across all layers, RGB per corner. A layer literally named
/// "alpha" switches the buffer to RGBA: the stored color becomes white and
/// the alpha term is the mean of that layer's RGB channels.
fn write_vertex_colors(name: &str, mesh: &Mesh) -> Option<Element> {
    let mut floats = Vec::new();
    let mut alpha_found = false;

    for layer in &mesh.color_layers {
        let is_alpha = layer.name.eq_ignore_ascii_case("alpha");
        for face_colors in &layer.colors {
            for color in face_colors {
                if is_alpha {
                    alpha_found = true;
                    let alpha = (color[0] + color[1] + color[2]) / 3.0;
                    floats.extend_from_slice(&[1.0, 1.0, 1.0, alpha]);
                } else {
                    floats.extend_from_slice(color);
                }
            }
        }
    }

    if floats.is_empty() {
        return None;
    }
    let params: &[&str] = if alpha_found {
        &["R", "G", "B", "A"]
    } else {
        &["R", "G", "B"]
    };
    Some(write_source(
        &format!("{}-colors", name),
        &SourceData::Floats(floats),
        params,
    ))
}

/// Binds the position buffer as the POSITION semantic.
fn write_vertices(name: &str) -> Element {
    let mut vertices = Element::new("vertices");
    vertices.set_attr("id", format!("{}-vertices", name));
    vertices.push_elem(write_input(name, None, "positions", "POSITION"));
    vertices
}

// ---------------------------------------------------------------------------
// Polylists
// ---------------------------------------------------------------------------

/// Running attribute-index state threaded through a polylist face scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PolylistCursor {
    /// Flat-normal index; advances by the face's vertex count for smooth
    /// faces and by one for flat faces, matched or not.
    pub normal: usize,
    /// Texcoord index; advances once per face vertex scanned, matched or not.
    pub texcoord: usize,
}

impl PolylistCursor {
    fn advance_normal(&mut self, face: &Face) {
        if face.smooth {
            self.normal += face.vertices.len();
        } else {
            self.normal += 1;
        }
    }
}

/// Index streams for one material group.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PolylistStreams {
    pub poly_count: usize,
    pub vcount: Vec<usize>,
    /// Flattened index tuples, 3 or 4 columns per face vertex.
    pub indices: Vec<usize>,
}

/// Scan every face against one material index, emitting index tuples for
/// matching faces while still advancing the counters for the rest.
pub(crate) fn scan_material_faces(
    mesh: &Mesh,
    material_index: usize,
    has_colors: bool,
) -> PolylistStreams {
    let mut cursor = PolylistCursor::default();
    let mut streams = PolylistStreams::default();

    for face in &mesh.faces {
        if face.material_index == material_index {
            streams.vcount.push(face.vertices.len());
            streams.poly_count += 1;
            for &vert in &face.vertices {
                let normal = if face.smooth { vert as usize } else { cursor.normal };
                streams.indices.push(vert as usize);
                streams.indices.push(normal);
                streams.indices.push(cursor.texcoord);
                if has_colors {
                    streams.indices.push(cursor.texcoord);
                }
                cursor.texcoord += 1;
            }
        } else {
            cursor.texcoord += face.vertices.len();
        }
        cursor.advance_normal(face);
    }

    streams
}

fn write_polylists(name: &str, mesh: &Mesh, materials: &MaterialIndex, parent: &mut Element) {
    let has_colors = !mesh.color_layers.is_empty();

    for (material_index, entry) in materials.for_slots(&mesh.material_slots).iter().enumerate() {
        let Some(entry) = entry else {
            continue;
        };
        let streams = scan_material_faces(mesh, material_index, has_colors);
        // No empty polylist for unused slots.
        if streams.poly_count == 0 {
            continue;
        }

        let mut polylist = Element::new("polylist");
        polylist.set_attr("material", entry.export_name.as_str());
        polylist.set_attr("count", streams.poly_count.to_string());

        polylist.push_elem(write_input(name, Some(0), "vertices", "VERTEX"));
        polylist.push_elem(write_input(name, Some(1), "normals", "NORMAL"));
        polylist.push_elem(write_input(name, Some(2), "UVMap-0", "TEXCOORD"));
        if has_colors {
            polylist.push_elem(write_input(name, Some(3), "colors", "COLOR"));
        }

        let mut vcount = Element::new("vcount");
        vcount.push_text(join_counts(&streams.vcount));
        polylist.push_elem(vcount);

        let mut p = Element::new("p");
        p.push_text(join_counts(&streams.indices));
        polylist.push_elem(p);

        parent.push_elem(polylist);
    }
}

fn join_counts(values: &[usize]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
