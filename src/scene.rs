//! Immutable scene snapshot consumed by the exporter.
//!
//! The host (a Blender-side dumper or any other scene-graph collaborator)
//! serializes its scene into these structures once, before export. The
//! exporter never mutates them and never talks back to the host: bind poses
//! that historically required temporary proxy objects in the live scene are
//! plain matrices here.

use serde::{Deserialize, Serialize};

/// Axis labels in channel-target order.
pub const AXES: [&str; 3] = ["X", "Y", "Z"];

/// Degrees per radian, used for rotation curve output and node transforms.
pub const TO_DEGREES: f32 = 180.0 / std::f32::consts::PI;

/// Read-only snapshot of everything the exporter needs from the host scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Scene name, used as a fallback grouping name.
    pub name: String,
    pub frame_start: i32,
    pub frame_end: i32,
    pub frame_rate: f32,
    pub export_nodes: Vec<ExportNode>,
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub armatures: Vec<Armature>,
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl SceneSnapshot {
    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn armature(&self, name: &str) -> Option<&Armature> {
        self.armatures.iter().find(|a| a.name == name)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Convert a frame number to seconds using the scene frame rate.
    pub fn frame_to_time(&self, frame: f32) -> f32 {
        frame / self.frame_rate
    }

    /// Export node containing the given object, if any.
    pub fn node_for_object(&self, object_name: &str) -> Option<&ExportNode> {
        self.export_nodes
            .iter()
            .find(|n| n.objects.iter().any(|o| o == object_name))
    }

    /// Mesh-carrying objects in export-node member order, each object once.
    pub fn geometry_objects(&self) -> Vec<&SceneObject> {
        let mut seen = hashbrown::HashSet::new();
        let mut result = Vec::new();
        for node in &self.export_nodes {
            for member in &node.objects {
                if !seen.insert(member.as_str()) {
                    continue;
                }
                match self.object(member) {
                    Some(object) if object.mesh.is_some() => result.push(object),
                    Some(_) => {}
                    None => {
                        tracing::warn!(
                            "export node '{}' references unknown object '{}'",
                            node.name,
                            member
                        );
                    }
                }
            }
        }
        result
    }
}

/// Output unit type tag. Determines whether animation extras apply and what
/// `fileType` the downstream compiler sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Cgf,
    Cga,
    Chr,
    Skin,
    Anm,
    ICaf,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Cgf => "cgf",
            NodeType::Cga => "cga",
            NodeType::Chr => "chr",
            NodeType::Skin => "skin",
            NodeType::Anm => "anm",
            NodeType::ICaf => "i_caf",
        }
    }

    /// Node types that get an animation clip.
    pub fn is_animated(&self) -> bool {
        matches!(self, NodeType::Cga | NodeType::Anm | NodeType::ICaf)
    }
}

/// A named grouping of scene objects slated for one output unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportNode {
    pub name: String,
    pub node_type: NodeType,
    /// Member object names, in host enumeration order.
    pub objects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(default)]
    pub location: [f32; 3],
    /// Euler rotation in radians, XYZ order.
    #[serde(default)]
    pub rotation_euler: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default)]
    pub mesh: Option<Mesh>,
    /// Name of the armature deforming this object, if skinned.
    #[serde(default)]
    pub armature: Option<String>,
    #[serde(default)]
    pub action: Option<Action>,
    /// User-defined properties passed through to the engine `extra` block.
    #[serde(default)]
    pub properties: Vec<UserProperty>,
    /// Object-space bounding box, used for `_joint` locator helpers.
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl SceneObject {
    /// Proxy geometry for a bone, named `{bone}_boneGeometry` by convention.
    pub fn is_bone_geometry(&self) -> bool {
        self.name.ends_with("_boneGeometry")
    }

    /// Non-renderable joint locator, reserved `_joint` name prefix.
    pub fn is_joint_locator(&self) -> bool {
        self.name.starts_with("_joint")
    }
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProperty {
    pub name: String,
    pub value: PropertyValue,
}

/// Bare strings are emitted verbatim, numbers as `name=value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
}

// ---------------------------------------------------------------------------
// Mesh data
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    /// Per-face, per-corner UV coordinates. Only the first layer is exported.
    #[serde(default)]
    pub uv_layers: Vec<UvLayer>,
    /// Per-face, per-corner vertex colors.
    #[serde(default)]
    pub color_layers: Vec<ColorLayer>,
    /// Material names by slot index; faces index into this list.
    #[serde(default)]
    pub material_slots: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    /// Host-averaged vertex normal, shared across adjacent smooth faces.
    pub normal: [f32; 3],
    /// Vertex-group memberships in host order; group names match bone names
    /// for skinned meshes.
    #[serde(default)]
    pub groups: Vec<VertexWeight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexWeight {
    pub group: String,
    pub weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    /// Ordered vertex indices (tri or quad).
    pub vertices: Vec<u32>,
    #[serde(default)]
    pub material_index: usize,
    #[serde(default)]
    pub smooth: bool,
    pub normal: [f32; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UvLayer {
    pub name: String,
    /// `uvs[face][corner]`, corner order matching `Face::vertices`.
    pub uvs: Vec<Vec<[f32; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorLayer {
    pub name: String,
    /// `colors[face][corner]` RGB, corner order matching `Face::vertices`.
    pub colors: Vec<Vec<[f32; 3]>>,
}

// ---------------------------------------------------------------------------
// Materials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(default)]
    pub emission: [f32; 3],
    #[serde(default)]
    pub ambient: [f32; 3],
    #[serde(default = "default_diffuse")]
    pub diffuse: [f32; 3],
    #[serde(default)]
    pub specular: [f32; 3],
    #[serde(default)]
    pub shininess: f32,
    #[serde(default = "default_ior")]
    pub index_refraction: f32,
    #[serde(default)]
    pub textures: Vec<TextureSlot>,
}

fn default_diffuse() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

fn default_ior() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureSlot {
    pub map: TextureMap,
    /// `None` means the host left the slot without an image, which is a
    /// data-integrity failure at export time.
    #[serde(default)]
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureMap {
    Diffuse,
    Specular,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    /// Game-relative texture path, already resolved by the host.
    pub path: String,
}

// ---------------------------------------------------------------------------
// Armatures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Armature {
    pub name: String,
    /// Bones in host declaration order; the exporter walks them depth-first.
    pub bones: Vec<Bone>,
}

impl Armature {
    /// Bones in depth-first order, roots in declaration order. This ordering
    /// is the joint index space for skinning.
    pub fn bones_depth_first(&self) -> Vec<&Bone> {
        let mut result = Vec::with_capacity(self.bones.len());
        for bone in self.bones.iter().filter(|b| b.parent.is_none()) {
            self.collect_depth_first(bone, &mut result);
        }
        result
    }

    fn collect_depth_first<'a>(&'a self, bone: &'a Bone, out: &mut Vec<&'a Bone>) {
        out.push(bone);
        for child in self.children_of(&bone.name) {
            self.collect_depth_first(child, out);
        }
    }

    pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Bone> + 'a {
        self.bones
            .iter()
            .filter(move |b| b.parent.as_deref() == Some(parent))
    }

    pub fn root_bones(&self) -> impl Iterator<Item = &Bone> {
        self.bones.iter().filter(|b| b.parent.is_none())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// World-space bind pose, row-major. Historically read from a temporary
    /// proxy object in the live scene; the host now supplies it directly.
    /// `None` on a skinned armature aborts controller serialization.
    #[serde(default)]
    pub bind_matrix: Option<[[f32; 4]; 4]>,
    /// Physics proxy tag forwarded to the engine `extra` block.
    #[serde(default)]
    pub phys_proxy: Option<String>,
    /// IK limits for physical bones, encoded into the exported node name.
    #[serde(default)]
    pub ik: Option<IkProperties>,
}

impl Bone {
    /// Physical bones carry the reserved `_Phys` suffix.
    pub fn is_physical(&self) -> bool {
        self.name.ends_with("_Phys")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IkProperties {
    pub max: [f32; 3],
    pub min: [f32; 3],
    pub damping: [f32; 3],
    pub spring_angle: [f32; 3],
    pub spring_tension: [f32; 3],
}

// ---------------------------------------------------------------------------
// Animation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub curves: Vec<Curve>,
}

impl Action {
    pub fn curve(&self, data_path: DataPath, array_index: usize) -> Option<&Curve> {
        self.curves
            .iter()
            .find(|c| c.data_path == data_path && c.array_index == array_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Curve {
    pub data_path: DataPath,
    /// Axis index: 0 = X, 1 = Y, 2 = Z.
    pub array_index: usize,
    pub keyframes: Vec<Keyframe>,
}

/// Attribute families the exporter samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPath {
    Location,
    RotationEuler,
}

impl DataPath {
    /// Identifier fragment used in animation ids and instance urls.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataPath::Location => "location",
            DataPath::RotationEuler => "rotation_euler",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: f32,
    pub value: f32,
    /// Left handle as (frame, value).
    pub handle_left: [f32; 2],
    /// Right handle as (frame, value).
    pub handle_right: [f32; 2],
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Interpolation {
    Constant,
    Linear,
    Bezier,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Constant => "CONSTANT",
            Interpolation::Linear => "LINEAR",
            Interpolation::Bezier => "BEZIER",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bone(name: &str, parent: Option<&str>) -> Bone {
        Bone {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            bind_matrix: None,
            phys_proxy: None,
            ik: None,
        }
    }

    #[test]
    fn depth_first_ordering_nests_children_before_siblings() {
        let armature = Armature {
            name: "rig".to_string(),
            bones: vec![
                bone("root", None),
                bone("arm", Some("root")),
                bone("leg", Some("root")),
                bone("hand", Some("arm")),
            ],
        };

        let names: Vec<&str> = armature
            .bones_depth_first()
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(names, ["root", "arm", "hand", "leg"]);
    }

    #[test]
    fn children_of_returns_direct_children_only() {
        let armature = Armature {
            name: "rig".to_string(),
            bones: vec![
                bone("root", None),
                bone("arm", Some("root")),
                bone("hand", Some("arm")),
                bone("leg", Some("root")),
            ],
        };

        let children: Vec<&str> = armature
            .children_of("root")
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(children, ["arm", "leg"]);
        assert!(armature.children_of("hand").next().is_none());
    }

    #[test]
    fn frame_to_time_uses_scene_frame_rate() {
        let snapshot = SceneSnapshot {
            name: "scene".to_string(),
            frame_start: 0,
            frame_end: 24,
            frame_rate: 24.0,
            export_nodes: Vec::new(),
            objects: Vec::new(),
            armatures: Vec::new(),
            materials: Vec::new(),
        };
        assert_eq!(snapshot.frame_to_time(0.0), 0.0);
        assert_eq!(snapshot.frame_to_time(24.0), 1.0);
    }
}
