//! Top-level document assembly.
//!
//! Libraries are appended in a fixed order so every `#`-reference points at
//! an id that was emitted earlier in the document. The controller, animation
//! and visual-scene libraries form one guarded stage: a recoverable error in
//! any of them drops all three and leaves the already-written geometry and
//! material libraries intact.

use xmltree::Element;

use crate::animation::write_animation_libraries;
use crate::document::{duplicate_ids, ElementExt};
use crate::error::ExportError;
use crate::geometry::write_geometry;
use crate::material::{
    write_library_effects, write_library_images, write_library_materials, MaterialIndex,
};
use crate::scene::SceneSnapshot;
use crate::skin::write_library_controllers;
use crate::visual_scene::write_library_visual_scenes;

pub const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";
pub const COLLADA_VERSION: &str = "1.4.1";

/// Knobs affecting document content. Everything else comes from the
/// snapshot itself.
#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    /// Replace flat-face normals with the average over near-coplanar
    /// neighbour faces.
    pub average_planar: bool,
    /// Emit the `DoNotMerge` compiler directive on every export node.
    pub do_not_merge: bool,
    /// Mark export nodes with the `LumberyardExportNode` attribute instead
    /// of the name prefix.
    pub export_for_lumberyard: bool,
    /// Text for the asset `created` stamp. Left empty when unset so equal
    /// snapshots serialize to equal documents.
    pub created: Option<String>,
}

pub struct DaeExporter {
    snapshot: SceneSnapshot,
    config: ExportConfig,
    materials: MaterialIndex,
}

impl DaeExporter {
    pub fn new(snapshot: SceneSnapshot, config: ExportConfig) -> Self {
        let materials = MaterialIndex::build(&snapshot);
        DaeExporter {
            snapshot,
            config,
            materials,
        }
    }

    /// Assemble the whole document tree.
    pub fn export(&self) -> Result<Element, ExportError> {
        let mut root = Element::new("collada");
        root.set_attr("xmlns", COLLADA_NAMESPACE);
        root.set_attr("version", COLLADA_VERSION);

        root.push_elem(self.write_asset());
        root.push_elem(Element::new("library_cameras"));
        root.push_elem(Element::new("library_lights"));
        root.push_elem(write_library_images(&self.snapshot, &self.materials));
        root.push_elem(write_library_effects(&self.snapshot, &self.materials)?);
        root.push_elem(write_library_materials(&self.materials));
        root.push_elem(self.write_library_geometries());

        match self.write_guarded_libraries() {
            Ok(libraries) => {
                for library in libraries {
                    root.push_elem(library);
                }
            }
            Err(error) if error.is_recoverable() => {
                tracing::warn!(
                    "{}; skipping controllers, animations and the visual scene",
                    error
                );
            }
            Err(error) => return Err(error),
        }

        let mut scene = Element::new("scene");
        let mut instance = Element::new("instance_visual_scene");
        instance.set_attr("url", "#scene");
        scene.push_elem(instance);
        root.push_elem(scene);

        for id in duplicate_ids(&root) {
            tracing::warn!("duplicate id '{}' in exported document", id);
        }
        Ok(root)
    }

    fn write_asset(&self) -> Element {
        let mut asset = Element::new("asset");

        let mut contributor = Element::new("contributor");
        let mut author = Element::new("author");
        author.push_text("Blender User");
        contributor.push_elem(author);
        let mut tool = Element::new("authoring_tool");
        tool.push_text(format!("dae-export v{}", env!("CARGO_PKG_VERSION")));
        contributor.push_elem(tool);
        asset.push_elem(contributor);

        let mut created = Element::new("created");
        if let Some(stamp) = &self.config.created {
            created.push_text(stamp.as_str());
        }
        asset.push_elem(created);
        asset.push_elem(Element::new("modified"));

        let mut unit = Element::new("unit");
        unit.set_attr("name", "meter");
        unit.set_attr("meter", "1");
        asset.push_elem(unit);

        let mut up_axis = Element::new("up_axis");
        up_axis.push_text("Z_UP");
        asset.push_elem(up_axis);

        asset
    }

    fn write_library_geometries(&self) -> Element {
        let mut library = Element::new("library_geometries");
        for object in self.snapshot.geometry_objects() {
            let Some(mesh) = &object.mesh else { continue };
            library.push_elem(write_geometry(
                object,
                mesh,
                &self.materials,
                self.config.average_planar,
            ));
        }
        library
    }

    /// Build the controller, animation and visual-scene libraries fully
    /// before any of them is appended, so a recoverable failure leaves no
    /// partial stage in the document.
    fn write_guarded_libraries(&self) -> Result<[Element; 4], ExportError> {
        let controllers = write_library_controllers(&self.snapshot)?;
        let (clips, animations) = write_animation_libraries(&self.snapshot);
        let scenes = write_library_visual_scenes(&self.snapshot, &self.materials, &self.config)?;
        // Animations precede clips so instance_animation urls never point
        // forward in the document.
        Ok([controllers, animations, clips, scenes])
    }
}
