//! Visual scene serializer: one `CryExportNode_*` wrapper per export node,
//! member object nodes with their instance elements, and recursive bone
//! hierarchies for skinned members.

use glam::{EulerRot, Mat4};
use hashbrown::HashSet;
use xmltree::Element;

use crate::document::{fixed_text, float_text, ElementExt};
use crate::error::ExportError;
use crate::export::ExportConfig;
use crate::material::MaterialIndex;
use crate::scene::{
    Armature, Bone, ExportNode, IkProperties, PropertyValue, SceneObject, SceneSnapshot,
    TO_DEGREES,
};
use crate::skin::props_bone_name;

pub fn write_library_visual_scenes(
    snapshot: &SceneSnapshot,
    materials: &MaterialIndex,
    config: &ExportConfig,
) -> Result<Element, ExportError> {
    warn_on_duplicate_node_names(snapshot);

    let mut library = Element::new("library_visual_scenes");
    let mut scene = Element::new("visual_scene");
    scene.set_attr("id", "scene");
    scene.set_attr("name", "scene");

    for node in &snapshot.export_nodes {
        scene.push_elem(write_export_node(snapshot, materials, config, node)?);
    }

    library.push_elem(scene);
    Ok(library)
}

fn warn_on_duplicate_node_names(snapshot: &SceneSnapshot) {
    let mut seen = HashSet::new();
    for node in &snapshot.export_nodes {
        if !seen.insert(node.name.as_str()) {
            tracing::warn!("duplicate export node name '{}'", node.name);
        }
    }
}

fn write_export_node(
    snapshot: &SceneSnapshot,
    materials: &MaterialIndex,
    config: &ExportConfig,
    node: &ExportNode,
) -> Result<Element, ExportError> {
    let mut wrapper = Element::new("node");
    if config.export_for_lumberyard {
        wrapper.set_attr("id", node.name.as_str());
        wrapper.set_attr("LumberyardExportNode", "1");
    } else {
        wrapper.set_attr("id", format!("CryExportNode_{}", node.name));
    }
    write_transforms(&mut wrapper, [0.0; 3], [0.0; 3], [1.0; 3]);

    for member in &node.objects {
        let Some(object) = snapshot.object(member) else {
            continue;
        };
        if object.mesh.is_none() || object.is_bone_geometry() {
            continue;
        }
        wrapper.push_elem(write_object_node(snapshot, materials, node, object)?);
    }

    wrapper.push_elem(export_node_extra(node, config));
    Ok(wrapper)
}

/// `<extra>` carrying the compiler directives for a whole export node.
fn export_node_extra(node: &ExportNode, config: &ExportConfig) -> Element {
    let mut text = format!("fileType={}", node.node_type.as_str());
    if config.do_not_merge {
        text.push('\n');
        text.push_str("DoNotMerge");
    }
    cryengine_properties_extra(&text)
}

fn cryengine_properties_extra(text: &str) -> Element {
    let mut extra = Element::new("extra");
    let mut technique = Element::new("technique");
    technique.set_attr("profile", "CryEngine");
    let mut properties = Element::new("properties");
    properties.push_text(text);
    technique.push_elem(properties);
    extra.push_elem(technique);
    extra
}

fn write_object_node(
    snapshot: &SceneSnapshot,
    materials: &MaterialIndex,
    node: &ExportNode,
    object: &SceneObject,
) -> Result<Element, ExportError> {
    let mut element = Element::new("node");
    element.set_attr("id", object.name.as_str());
    element.set_attr("name", object.name.as_str());

    let rotation = [
        object.rotation_euler[0] * TO_DEGREES,
        object.rotation_euler[1] * TO_DEGREES,
        object.rotation_euler[2] * TO_DEGREES,
    ];
    write_transforms(&mut element, object.location, rotation, object.scale);

    if let Some(armature_name) = &object.armature {
        let mut instance = Element::new("instance_controller");
        instance.set_attr("url", format!("#{}_{}", armature_name, object.name));
        if let Some(bind) = bind_material(materials, object) {
            instance.push_elem(bind);
        }
        element.push_elem(instance);
    } else if !object.is_joint_locator() {
        let mut instance = Element::new("instance_geometry");
        instance.set_attr("url", format!("#{}-mesh", object.name));
        if let Some(bind) = bind_material(materials, object) {
            instance.push_elem(bind);
        }
        element.push_elem(instance);
    }

    if let Some(extra) = object_extra(object) {
        element.push_elem(extra);
    }

    if let Some(armature_name) = &object.armature {
        if let Some(armature) = snapshot.armature(armature_name) {
            for root in armature.root_bones() {
                element.push_elem(write_bone_node(
                    snapshot, materials, node, armature, root,
                )?);
            }
        }
    }

    Ok(element)
}

/// Bind every material slot that made it into the index, in slot order.
fn bind_material(materials: &MaterialIndex, object: &SceneObject) -> Option<Element> {
    let mesh = object.mesh.as_ref()?;
    let entries: Vec<_> = materials
        .for_slots(&mesh.material_slots)
        .into_iter()
        .flatten()
        .collect();
    if entries.is_empty() {
        return None;
    }

    let mut bind = Element::new("bind_material");
    let mut technique = Element::new("technique_common");
    for entry in entries {
        let mut instance = Element::new("instance_material");
        instance.set_attr("symbol", entry.export_name.as_str());
        instance.set_attr("target", format!("#{}", entry.export_name));
        let mut input = Element::new("bind_vertex_input");
        input.set_attr("semantic", "UVMap");
        input.set_attr("input_semantic", "TEXCOORD");
        input.set_attr("input_set", "0");
        instance.push_elem(input);
        technique.push_elem(instance);
    }
    bind.push_elem(technique);
    Some(bind)
}

/// User properties and, for `_joint` locators, the dummy helper carrying the
/// bounding box.
fn object_extra(object: &SceneObject) -> Option<Element> {
    let mut lines: Vec<String> = Vec::new();
    for property in &object.properties {
        let value = match &property.value {
            PropertyValue::Text(text) => text.clone(),
            PropertyValue::Number(number) => number.to_string(),
        };
        lines.push(format!("{}={}", property.name, value));
    }

    let helper = if object.is_joint_locator() {
        object.bounding_box.as_ref().map(|bounds| {
            let mut helper = Element::new("helper");
            helper.set_attr("type", "dummy");
            let mut min = Element::new("bound_box_min");
            min.push_text(float_text(&bounds.min));
            helper.push_elem(min);
            let mut max = Element::new("bound_box_max");
            max.push_text(float_text(&bounds.max));
            helper.push_elem(max);
            helper
        })
    } else {
        None
    };

    if lines.is_empty() && helper.is_none() {
        return None;
    }

    let mut extra = Element::new("extra");
    let mut technique = Element::new("technique");
    technique.set_attr("profile", "CryEngine");
    if !lines.is_empty() {
        let mut properties = Element::new("properties");
        properties.push_text(lines.join("\n"));
        technique.push_elem(properties);
    }
    if let Some(helper) = helper {
        technique.push_elem(helper);
    }
    extra.push_elem(technique);
    Some(extra)
}

fn write_bone_node(
    snapshot: &SceneSnapshot,
    materials: &MaterialIndex,
    node: &ExportNode,
    armature: &Armature,
    bone: &Bone,
) -> Result<Element, ExportError> {
    let mut name = format!("{}{}", bone.name, props_bone_name(&bone.name, &node.name));
    if bone.is_physical() {
        if let Some(ik) = &bone.ik {
            name.push_str(&ik_suffix(ik));
        }
    }

    let mut element = Element::new("node");
    element.set_attr("id", name.as_str());
    element.set_attr("name", name.as_str());

    let bind = bone.bind_matrix.ok_or_else(|| ExportError::MissingBindPose {
        armature: armature.name.clone(),
        bone: bone.name.clone(),
    })?;
    let matrix = Mat4::from_cols_array_2d(&bind).transpose();
    let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
    let (rx, ry, rz) = rotation.to_euler(EulerRot::XYZ);
    write_transforms(
        &mut element,
        translation.to_array(),
        [rx * TO_DEGREES, ry * TO_DEGREES, rz * TO_DEGREES],
        scale.to_array(),
    );

    let geometry_name = format!("{}_boneGeometry", bone.name);
    if let Some(geometry_object) = snapshot.object(&geometry_name) {
        let mut instance = Element::new("instance_geometry");
        instance.set_attr("url", format!("#{}-mesh", geometry_name));
        if let Some(bind) = bind_material(materials, geometry_object) {
            instance.push_elem(bind);
        }
        element.push_elem(instance);
    }

    if let Some(proxy) = &bone.phys_proxy {
        element.push_elem(cryengine_properties_extra(proxy));
    }

    for child in armature.children_of(&bone.name) {
        element.push_elem(write_bone_node(snapshot, materials, node, armature, child)?);
    }

    Ok(element)
}

/// IK limit suffix appended to physical bone names; the compiler parses the
/// per-axis tokens out of the joint name.
fn ik_suffix(ik: &IkProperties) -> String {
    let mut suffix = String::new();
    for (index, axis) in ["x", "y", "z"].iter().enumerate() {
        suffix.push_str(&format!(
            "_{a}max={}_{a}min={}_{a}damping={}_{a}springangle={}_{a}springtension={}",
            ik.max[index],
            ik.min[index],
            ik.damping[index],
            ik.spring_angle[index],
            ik.spring_tension[index],
            a = axis,
        ));
    }
    suffix
}

/// Append translate/rotate/scale children. Rotation is in degrees.
fn write_transforms(element: &mut Element, location: [f32; 3], rotation: [f32; 3], scale: [f32; 3]) {
    let mut translate = Element::new("translate");
    translate.set_attr("sid", "translation");
    translate.push_text(fixed_text(&location));
    element.push_elem(translate);

    let axes = [
        ("rotation_X", [1, 0, 0], rotation[0]),
        ("rotation_Y", [0, 1, 0], rotation[1]),
        ("rotation_Z", [0, 0, 1], rotation[2]),
    ];
    for (sid, axis, angle) in axes {
        let mut rotate = Element::new("rotate");
        rotate.set_attr("sid", sid);
        rotate.push_text(format!(
            "{} {} {} {:.6}",
            axis[0], axis[1], axis[2], angle
        ));
        element.push_elem(rotate);
    }

    let mut scale_element = Element::new("scale");
    scale_element.set_attr("sid", "scale");
    scale_element.push_text(float_text(&scale));
    element.push_elem(scale_element);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{ExportNode, NodeType};

    fn snapshot_with_cube() -> SceneSnapshot {
        use crate::scene::{Face, Mesh, Vertex};
        SceneSnapshot {
            name: "scene".to_string(),
            frame_start: 0,
            frame_end: 24,
            frame_rate: 24.0,
            export_nodes: vec![ExportNode {
                name: "Crate".to_string(),
                node_type: NodeType::Cgf,
                objects: vec!["cube".to_string()],
            }],
            objects: vec![SceneObject {
                name: "cube".to_string(),
                location: [1.0, 2.0, 3.0],
                rotation_euler: [0.0, 0.0, std::f32::consts::FRAC_PI_2],
                scale: [1.0; 3],
                mesh: Some(Mesh {
                    vertices: vec![Vertex {
                        position: [0.0; 3],
                        normal: [0.0, 0.0, 1.0],
                        groups: Vec::new(),
                    }],
                    faces: vec![Face {
                        vertices: vec![0, 0, 0],
                        material_index: 0,
                        smooth: false,
                        normal: [0.0, 0.0, 1.0],
                    }],
                    uv_layers: Vec::new(),
                    color_layers: Vec::new(),
                    material_slots: Vec::new(),
                }),
                armature: None,
                action: None,
                properties: Vec::new(),
                bounding_box: None,
            }],
            armatures: Vec::new(),
            materials: Vec::new(),
        }
    }

    fn first_node(library: &Element) -> &Element {
        library
            .get_child("visual_scene")
            .and_then(|s| s.get_child("node"))
            .expect("export node wrapper")
    }

    #[test]
    fn export_node_gets_prefixed_wrapper_and_file_type_extra() {
        let snapshot = snapshot_with_cube();
        let materials = MaterialIndex::build(&snapshot);
        let config = ExportConfig::default();
        let library = write_library_visual_scenes(&snapshot, &materials, &config).unwrap();

        let wrapper = first_node(&library);
        assert_eq!(wrapper.attributes["id"], "CryExportNode_Crate");

        let properties = wrapper
            .get_child("extra")
            .and_then(|e| e.get_child("technique"))
            .and_then(|t| t.get_child("properties"))
            .and_then(|p| p.get_text())
            .expect("properties text");
        assert_eq!(properties, "fileType=cgf");
    }

    #[test]
    fn do_not_merge_directive_is_appended() {
        let snapshot = snapshot_with_cube();
        let materials = MaterialIndex::build(&snapshot);
        let config = ExportConfig {
            do_not_merge: true,
            ..ExportConfig::default()
        };
        let library = write_library_visual_scenes(&snapshot, &materials, &config).unwrap();
        let properties = first_node(&library)
            .get_child("extra")
            .and_then(|e| e.get_child("technique"))
            .and_then(|t| t.get_child("properties"))
            .and_then(|p| p.get_text())
            .expect("properties text");
        assert_eq!(properties, "fileType=cgf\nDoNotMerge");
    }

    #[test]
    fn lumberyard_wrapper_uses_plain_name_and_marker_attribute() {
        let snapshot = snapshot_with_cube();
        let materials = MaterialIndex::build(&snapshot);
        let config = ExportConfig {
            export_for_lumberyard: true,
            ..ExportConfig::default()
        };
        let library = write_library_visual_scenes(&snapshot, &materials, &config).unwrap();
        let wrapper = first_node(&library);
        assert_eq!(wrapper.attributes["id"], "Crate");
        assert_eq!(wrapper.attributes["LumberyardExportNode"], "1");
    }

    #[test]
    fn object_node_rotation_is_exported_in_degrees() {
        let snapshot = snapshot_with_cube();
        let materials = MaterialIndex::build(&snapshot);
        let config = ExportConfig::default();
        let library = write_library_visual_scenes(&snapshot, &materials, &config).unwrap();

        let object = first_node(&library).get_child("node").expect("object node");
        let rotate_z = object
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .find(|e| e.attributes.get("sid").map(String::as_str) == Some("rotation_Z"))
            .and_then(|e| e.get_text())
            .expect("rotation_Z");
        let angle: f32 = rotate_z
            .strip_prefix("0 0 1 ")
            .expect("z axis prefix")
            .parse()
            .unwrap();
        assert!((angle - 90.0).abs() < 1e-3);
    }

    #[test]
    fn ik_suffix_lists_every_axis_limit() {
        let ik = IkProperties {
            max: [1.0, 2.0, 3.0],
            min: [-1.0, -2.0, -3.0],
            damping: [0.5; 3],
            spring_angle: [0.0; 3],
            spring_tension: [1.0; 3],
        };
        let suffix = ik_suffix(&ik);
        assert!(suffix.contains("_xmax=1_xmin=-1_xdamping=0.5"));
        assert!(suffix.contains("_ymax=2_ymin=-2"));
        assert!(suffix.contains("_zspringangle=0_zspringtension=1"));
    }
}
