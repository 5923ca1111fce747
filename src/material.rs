//! Material name mangling and the image/effect/material libraries.
//!
//! Exported material names follow the downstream compiler's
//! `{node}__{NN}__{name}__{physics}` convention. Materials whose authored
//! name already conforms keep their position; the rest are assigned slots
//! from a per-node counter starting above 50.

use hashbrown::HashSet;
use xmltree::Element;

use crate::document::{float_text, ElementExt};
use crate::error::ExportError;
use crate::scene::{ImageRef, Material, SceneSnapshot, TextureMap};

const BASE_MATERIAL_POSITION: u32 = 50;

const PHYSICS_TYPES: [&str; 5] = [
    "physDefault",
    "physProxyNoDraw",
    "physNoCollide",
    "physObstruct",
    "physNone",
];

/// One exportable material: the authored name plus its mangled export name.
#[derive(Debug, Clone)]
pub struct MaterialEntry {
    pub material: String,
    pub export_name: String,
}

/// Ordered map of every distinct material encountered across export nodes.
#[derive(Debug, Default)]
pub struct MaterialIndex {
    entries: Vec<MaterialEntry>,
}

impl MaterialIndex {
    /// Walk export nodes in order and assign export names, first encounter
    /// wins. Unknown material references are skipped with a diagnostic.
    pub fn build(snapshot: &SceneSnapshot) -> Self {
        let mut entries: Vec<MaterialEntry> = Vec::new();
        for node in &snapshot.export_nodes {
            let mut counter = BASE_MATERIAL_POSITION;
            for member in &node.objects {
                let Some(object) = snapshot.object(member) else {
                    continue;
                };
                let Some(mesh) = &object.mesh else {
                    continue;
                };
                for slot in &mesh.material_slots {
                    if entries.iter().any(|e| &e.material == slot) {
                        continue;
                    }
                    if snapshot.material(slot).is_none() {
                        tracing::warn!(
                            "object '{}' references unknown material '{}'",
                            object.name,
                            slot
                        );
                        continue;
                    }

                    let (part_node, mut index, name, physics) = material_parts(&node.name, slot);
                    // Materials without an explicit position get the next
                    // free slot above the reserved range.
                    if index == 0 {
                        counter += 1;
                        index = counter;
                    }
                    entries.push(MaterialEntry {
                        material: slot.clone(),
                        export_name: format!(
                            "{}__{:02}__{}__{}",
                            part_node, index, name, physics
                        ),
                    });
                }
            }
        }
        MaterialIndex { entries }
    }

    pub fn entries(&self) -> &[MaterialEntry] {
        &self.entries
    }

    pub fn export_name(&self, material: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.material == material)
            .map(|e| e.export_name.as_str())
    }

    /// Entries used by the given slot list, in slot order.
    pub fn for_slots<'a>(&'a self, slots: &'a [String]) -> Vec<Option<&'a MaterialEntry>> {
        slots
            .iter()
            .map(|slot| self.entries.iter().find(|e| &e.material == slot))
            .collect()
    }
}

/// Split a material name into `(node, position, name, physics)`. Names not
/// following the convention keep position 0 and default physics.
pub(crate) fn material_parts(node_name: &str, material_name: &str) -> (String, u32, String, String) {
    let parts: Vec<&str> = material_name.split("__").collect();
    if let [node, index, name, physics] = parts.as_slice() {
        if let Ok(index) = index.parse::<u32>() {
            let physics = if PHYSICS_TYPES.contains(physics) {
                (*physics).to_string()
            } else {
                "physDefault".to_string()
            };
            return ((*node).to_string(), index, (*name).to_string(), physics);
        }
    }
    (
        node_name.to_string(),
        0,
        material_name.to_string(),
        "physDefault".to_string(),
    )
}

// ---------------------------------------------------------------------------
// library_images
// ---------------------------------------------------------------------------

/// Distinct images referenced by indexed materials, first-encounter order.
pub fn collect_images<'a>(
    snapshot: &'a SceneSnapshot,
    materials: &MaterialIndex,
) -> Vec<&'a ImageRef> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for entry in materials.entries() {
        let Some(material) = snapshot.material(&entry.material) else {
            continue;
        };
        for slot in &material.textures {
            if let Some(image) = &slot.image {
                if seen.insert(image.name.as_str()) {
                    images.push(image);
                }
            }
        }
    }
    images
}

pub fn write_library_images(snapshot: &SceneSnapshot, materials: &MaterialIndex) -> Element {
    let mut library = Element::new("library_images");
    for image in collect_images(snapshot, materials) {
        let mut element = Element::new("image");
        element.set_attr("id", image.name.as_str());
        element.set_attr("name", image.name.as_str());
        let mut init_from = Element::new("init_from");
        init_from.push_text(image.path.as_str());
        element.push_elem(init_from);
        library.push_elem(element);
    }
    library
}

// ---------------------------------------------------------------------------
// library_effects
// ---------------------------------------------------------------------------

pub fn write_library_effects(
    snapshot: &SceneSnapshot,
    materials: &MaterialIndex,
) -> Result<Element, ExportError> {
    let mut library = Element::new("library_effects");
    for entry in materials.entries() {
        let Some(material) = snapshot.material(&entry.material) else {
            continue;
        };
        library.push_elem(write_effect(material, &entry.export_name)?);
    }
    Ok(library)
}

fn write_effect(material: &Material, export_name: &str) -> Result<Element, ExportError> {
    // Image slots by map kind: diffuse, specular, normal.
    let mut images: [Option<&ImageRef>; 3] = [None; 3];
    for slot in &material.textures {
        let image = slot.image.as_ref().ok_or_else(|| ExportError::TextureWithoutImage {
            material: material.name.clone(),
        })?;
        let index = match slot.map {
            TextureMap::Diffuse => 0,
            TextureMap::Specular => 1,
            TextureMap::Normal => 2,
        };
        images[index] = Some(image);
    }

    let mut effect = Element::new("effect");
    effect.set_attr("id", format!("{}_fx", export_name));

    let mut profile = Element::new("profile_COMMON");
    for image in images.iter().flatten() {
        let (surface, sampler) = surface_and_sampler(&image.name);
        profile.push_elem(surface);
        profile.push_elem(sampler);
    }

    let mut technique = Element::new("technique");
    technique.set_attr("sid", "common");
    technique.push_elem(phong_node(material, &images));
    profile.push_elem(technique);
    profile.push_elem(double_sided_extra("GOOGLEEARTH"));

    effect.push_elem(profile);
    effect.push_elem(double_sided_extra("MAX3D"));
    Ok(effect)
}

fn surface_and_sampler(image_name: &str) -> (Element, Element) {
    let mut surface_param = Element::new("newparam");
    surface_param.set_attr("sid", format!("{}-surface", image_name));
    let mut surface = Element::new("surface");
    surface.set_attr("type", "2D");
    let mut init_from = Element::new("init_from");
    init_from.push_text(image_name);
    surface.push_elem(init_from);
    surface_param.push_elem(surface);

    let mut sampler_param = Element::new("newparam");
    sampler_param.set_attr("sid", format!("{}-sampler", image_name));
    let mut sampler = Element::new("sampler2D");
    let mut source = Element::new("source");
    source.push_text(format!("{}-surface", image_name));
    sampler.push_elem(source);
    sampler_param.push_elem(sampler);

    (surface_param, sampler_param)
}

fn phong_node(material: &Material, images: &[Option<&ImageRef>; 3]) -> Element {
    let mut phong = Element::new("phong");

    phong.push_elem(color_node("emission", material.emission));
    phong.push_elem(color_node("ambient", material.ambient));
    phong.push_elem(match images[0] {
        Some(image) => texture_node("diffuse", &image.name),
        None => color_node("diffuse", material.diffuse),
    });
    phong.push_elem(match images[1] {
        Some(image) => texture_node("specular", &image.name),
        None => color_node("specular", material.specular),
    });
    phong.push_elem(attribute_node("shininess", material.shininess));
    phong.push_elem(attribute_node("index_refraction", material.index_refraction));
    if let Some(image) = images[2] {
        phong.push_elem(texture_node("normal", &image.name));
    }

    phong
}

fn color_node(kind: &str, rgb: [f32; 3]) -> Element {
    let mut node = Element::new(kind);
    let mut color = Element::new("color");
    color.set_attr("sid", kind);
    color.push_text(float_text(&[rgb[0], rgb[1], rgb[2], 1.0]));
    node.push_elem(color);
    node
}

fn texture_node(kind: &str, image_name: &str) -> Element {
    let mut node = Element::new(kind);
    let mut texture = Element::new("texture");
    texture.set_attr("texture", format!("{}-sampler", image_name));
    node.push_elem(texture);
    node
}

fn attribute_node(kind: &str, value: f32) -> Element {
    let mut node = Element::new(kind);
    let mut float = Element::new("float");
    float.set_attr("sid", kind);
    float.push_text(value.to_string());
    node.push_elem(float);
    node
}

/// `<extra>` marking the material double-sided for the given tool profile.
pub(crate) fn double_sided_extra(profile: &str) -> Element {
    let mut extra = Element::new("extra");
    let mut technique = Element::new("technique");
    technique.set_attr("profile", profile);
    let mut double_sided = Element::new("double_sided");
    double_sided.push_text("1");
    technique.push_elem(double_sided);
    extra.push_elem(technique);
    extra
}

// ---------------------------------------------------------------------------
// library_materials
// ---------------------------------------------------------------------------

pub fn write_library_materials(materials: &MaterialIndex) -> Element {
    let mut library = Element::new("library_materials");
    for entry in materials.entries() {
        let mut material = Element::new("material");
        material.set_attr("id", entry.export_name.as_str());
        let mut instance_effect = Element::new("instance_effect");
        instance_effect.set_attr("url", format!("#{}_fx", entry.export_name));
        material.push_elem(instance_effect);
        library.push_elem(material);
    }
    library
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conformant_material_names_keep_their_position() {
        let (node, index, name, physics) = material_parts("Props", "Crate__04__wood__physProxyNoDraw");
        assert_eq!(node, "Crate");
        assert_eq!(index, 4);
        assert_eq!(name, "wood");
        assert_eq!(physics, "physProxyNoDraw");
    }

    #[test]
    fn unknown_physics_token_falls_back_to_default() {
        let (_, _, _, physics) = material_parts("Props", "Crate__04__wood__physBogus");
        assert_eq!(physics, "physDefault");
    }

    #[test]
    fn plain_names_get_node_prefix_and_zero_position() {
        let (node, index, name, physics) = material_parts("Props", "wood");
        assert_eq!(node, "Props");
        assert_eq!(index, 0);
        assert_eq!(name, "wood");
        assert_eq!(physics, "physDefault");
    }
}
