//! Snapshot builders shared by the pipeline tests.

use dae_export::scene::{
    Action, Armature, Bone, BoundingBox, Curve, DataPath, ExportNode, Face, ImageRef,
    Interpolation, Keyframe, Material, Mesh, NodeType, PropertyValue, SceneObject, SceneSnapshot,
    TextureMap, TextureSlot, UserProperty, UvLayer, Vertex, VertexWeight,
};

pub fn vertex(position: [f32; 3], normal: [f32; 3]) -> Vertex {
    Vertex {
        position,
        normal,
        groups: Vec::new(),
    }
}

pub fn weighted_vertex(position: [f32; 3], groups: &[(&str, f32)]) -> Vertex {
    Vertex {
        position,
        normal: [0.0, 0.0, 1.0],
        groups: groups
            .iter()
            .map(|(group, weight)| VertexWeight {
                group: (*group).to_string(),
                weight: *weight,
            })
            .collect(),
    }
}

pub fn face(vertices: &[u32], material_index: usize, smooth: bool, normal: [f32; 3]) -> Face {
    Face {
        vertices: vertices.to_vec(),
        material_index,
        smooth,
        normal,
    }
}

pub fn plain_material(name: &str) -> Material {
    Material {
        name: name.to_string(),
        emission: [0.0; 3],
        ambient: [0.0; 3],
        diffuse: [0.8; 3],
        specular: [0.5; 3],
        shininess: 50.0,
        index_refraction: 1.0,
        textures: Vec::new(),
    }
}

pub fn textured_material(name: &str, image: Option<(&str, &str)>) -> Material {
    let mut material = plain_material(name);
    material.textures.push(TextureSlot {
        map: TextureMap::Diffuse,
        image: image.map(|(image_name, path)| ImageRef {
            name: image_name.to_string(),
            path: path.to_string(),
        }),
    });
    material
}

pub fn mesh_object(name: &str, mesh: Mesh) -> SceneObject {
    SceneObject {
        name: name.to_string(),
        location: [0.0; 3],
        rotation_euler: [0.0; 3],
        scale: [1.0; 3],
        mesh: Some(mesh),
        armature: None,
        action: None,
        properties: Vec::new(),
        bounding_box: None,
    }
}

pub fn export_node(name: &str, node_type: NodeType, objects: &[&str]) -> ExportNode {
    ExportNode {
        name: name.to_string(),
        node_type,
        objects: objects.iter().map(|o| (*o).to_string()).collect(),
    }
}

pub fn snapshot(
    export_nodes: Vec<ExportNode>,
    objects: Vec<SceneObject>,
    armatures: Vec<Armature>,
    materials: Vec<Material>,
) -> SceneSnapshot {
    SceneSnapshot {
        name: "scene".to_string(),
        frame_start: 0,
        frame_end: 24,
        frame_rate: 24.0,
        export_nodes,
        objects,
        armatures,
        materials,
    }
}

pub fn bone(name: &str, parent: Option<&str>, with_bind_pose: bool) -> Bone {
    Bone {
        name: name.to_string(),
        parent: parent.map(str::to_string),
        bind_matrix: with_bind_pose.then_some([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]),
        phys_proxy: None,
        ik: None,
    }
}

/// One triangle, one UV layer, one material slot.
pub fn triangle_mesh(material: &str) -> Mesh {
    Mesh {
        vertices: vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ],
        faces: vec![face(&[0, 1, 2], 0, false, [0.0, 0.0, 1.0])],
        uv_layers: vec![UvLayer {
            name: "UVMap".to_string(),
            uvs: vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]],
        }],
        color_layers: Vec::new(),
        material_slots: vec![material.to_string()],
    }
}

/// Two quads sharing a material plus one triangle on a second slot, so
/// polylist grouping and the running index counters get exercised.
pub fn two_group_mesh(first: &str, second: &str) -> Mesh {
    Mesh {
        vertices: vec![
            vertex([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([1.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([2.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ],
        faces: vec![
            face(&[0, 1, 2, 3], 0, true, [0.0, 0.0, 1.0]),
            face(&[1, 4, 2], 1, false, [0.0, 0.0, 1.0]),
            face(&[0, 2, 3], 0, false, [0.0, 0.0, 1.0]),
        ],
        uv_layers: vec![UvLayer {
            name: "UVMap".to_string(),
            uvs: vec![
                vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
                vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
                vec![[0.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            ],
        }],
        color_layers: Vec::new(),
        material_slots: vec![first.to_string(), second.to_string()],
    }
}

/// A full-featured scene: a static prop, a skinned character with an
/// animated turret node, a joint locator and user properties.
pub fn full_snapshot() -> SceneSnapshot {
    let crate_object = {
        let mut object = mesh_object("crate", two_group_mesh("wood", "metal"));
        object.properties.push(UserProperty {
            name: "mass".to_string(),
            value: PropertyValue::Number(12.5),
        });
        object
    };

    let joint = SceneObject {
        name: "_joint_hinge".to_string(),
        location: [0.0; 3],
        rotation_euler: [0.0; 3],
        scale: [1.0; 3],
        mesh: Some(triangle_mesh("wood")),
        armature: None,
        action: None,
        properties: Vec::new(),
        bounding_box: Some(BoundingBox {
            min: [-0.5, -0.5, -0.5],
            max: [0.5, 0.5, 0.5],
        }),
    };

    let body = {
        let mut mesh = triangle_mesh("skinmat");
        mesh.vertices = vec![
            weighted_vertex([0.0, 0.0, 0.0], &[("Root", 1.0)]),
            weighted_vertex([1.0, 0.0, 0.0], &[("Root", 0.5), ("Arm", 0.5)]),
            weighted_vertex([0.0, 1.0, 0.0], &[("Arm", 1.0)]),
        ];
        let mut object = mesh_object("body", mesh);
        object.armature = Some("rig".to_string());
        object
    };

    let turret = {
        let mut object = mesh_object("turret", triangle_mesh("metal"));
        object.action = Some(Action {
            name: "spin".to_string(),
            curves: vec![Curve {
                data_path: DataPath::RotationEuler,
                array_index: 2,
                keyframes: vec![
                    Keyframe {
                        frame: 0.0,
                        value: 0.0,
                        handle_left: [-0.5, 0.0],
                        handle_right: [0.5, 0.0],
                        interpolation: Interpolation::Bezier,
                    },
                    Keyframe {
                        frame: 24.0,
                        value: std::f32::consts::PI,
                        handle_left: [23.5, std::f32::consts::PI],
                        handle_right: [24.5, std::f32::consts::PI],
                        interpolation: Interpolation::Bezier,
                    },
                ],
            }],
        });
        object
    };

    snapshot(
        vec![
            export_node("Crate", NodeType::Cgf, &["crate", "_joint_hinge"]),
            export_node("Pawn", NodeType::Chr, &["body"]),
            export_node("Turret", NodeType::Cga, &["turret"]),
        ],
        vec![crate_object, joint, body, turret],
        vec![Armature {
            name: "rig".to_string(),
            bones: vec![bone("Root", None, true), bone("Arm", Some("Root"), true)],
        }],
        vec![
            textured_material("wood", Some(("wood_diff", "textures/wood_diff.dds"))),
            plain_material("metal"),
            plain_material("skinmat"),
        ],
    )
}
