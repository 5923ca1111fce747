//! Animation serializer: per-channel `<animation>` blocks plus one
//! `<animation_clip>` per animated export node.
//!
//! Each exported channel covers a single (data path, axis) curve. Times are
//! scene frames divided by the frame rate; rotation values go out in degrees
//! because the engine's `.ANGLE` targets expect them.

use xmltree::Element;

use crate::document::{fixed_text, write_input, write_source, ElementExt, SourceData};
use crate::scene::{Curve, DataPath, SceneSnapshot, AXES, TO_DEGREES};
use crate::skin::props_bone_name;

/// Build `library_animation_clips` and `library_animations` together, so the
/// clip's `instance_animation` list covers exactly the channels that were
/// emitted.
pub fn write_animation_libraries(snapshot: &SceneSnapshot) -> (Element, Element) {
    let mut clips = Element::new("library_animation_clips");
    let mut animations = Element::new("library_animations");

    for node in &snapshot.export_nodes {
        if !node.node_type.is_animated() {
            continue;
        }

        let mut clip = Element::new("animation_clip");
        clip.set_attr("id", format!("{0}-{0}", node.name));
        clip.set_attr(
            "start",
            fixed_text(&[snapshot.frame_to_time(snapshot.frame_start as f32)]),
        );
        clip.set_attr(
            "end",
            fixed_text(&[snapshot.frame_to_time(snapshot.frame_end as f32)]),
        );

        let mut emitted_any = false;
        for member in &node.objects {
            let Some(object) = snapshot.object(member) else {
                continue;
            };
            let Some(action) = &object.action else {
                continue;
            };
            let target_name =
                format!("{}{}", object.name, props_bone_name(&object.name, &node.name));

            for (path, multiplier) in [
                (DataPath::Location, 1.0f32),
                (DataPath::RotationEuler, TO_DEGREES),
            ] {
                for (axis_index, axis) in AXES.iter().enumerate() {
                    let Some(curve) = action.curve(path, axis_index) else {
                        continue;
                    };
                    let id = format!("{}_{}_{}", object.name, path.as_str(), axis);
                    animations.push_elem(write_animation(
                        snapshot,
                        &id,
                        &target_name,
                        path,
                        axis,
                        multiplier,
                        curve,
                    ));
                    let mut instance = Element::new("instance_animation");
                    instance.set_attr("url", format!("#{}", id));
                    clip.push_elem(instance);
                    emitted_any = true;
                }
            }
        }

        if emitted_any {
            clips.push_elem(clip);
        }
    }

    (clips, animations)
}

fn channel_target(target_name: &str, path: DataPath, axis: &str) -> String {
    match path {
        DataPath::Location => format!("{}/translation.{}", target_name, axis),
        DataPath::RotationEuler => format!("{}/rotation_{}.ANGLE", target_name, axis),
    }
}

fn write_animation(
    snapshot: &SceneSnapshot,
    id: &str,
    target_name: &str,
    path: DataPath,
    axis: &str,
    multiplier: f32,
    curve: &Curve,
) -> Element {
    let mut animation = Element::new("animation");
    animation.set_attr("id", id);

    let times: Vec<f32> = curve
        .keyframes
        .iter()
        .map(|k| snapshot.frame_to_time(k.frame))
        .collect();
    let values: Vec<f32> = curve.keyframes.iter().map(|k| k.value * multiplier).collect();
    let interpolations: Vec<String> = curve
        .keyframes
        .iter()
        .map(|k| k.interpolation.as_str().to_string())
        .collect();
    // Handle X components are frame positions; convert them like key times.
    let in_tangents: Vec<f32> = curve
        .keyframes
        .iter()
        .flat_map(|k| [snapshot.frame_to_time(k.handle_left[0]), k.handle_left[1]])
        .collect();
    let out_tangents: Vec<f32> = curve
        .keyframes
        .iter()
        .flat_map(|k| [snapshot.frame_to_time(k.handle_right[0]), k.handle_right[1]])
        .collect();

    animation.push_elem(write_source(
        &format!("{}-input", id),
        &SourceData::Floats(times),
        &["TIME"],
    ));
    animation.push_elem(write_source(
        &format!("{}-output", id),
        &SourceData::Floats(values),
        &["VALUE"],
    ));
    animation.push_elem(write_source(
        &format!("{}-interpolation", id),
        &SourceData::Names(interpolations),
        &["INTERPOLATION"],
    ));
    animation.push_elem(write_source(
        &format!("{}-intangent", id),
        &SourceData::Floats(in_tangents),
        &["X", "Y"],
    ));
    animation.push_elem(write_source(
        &format!("{}-outangent", id),
        &SourceData::Floats(out_tangents),
        &["X", "Y"],
    ));

    let sampler_id = format!("{}-sampler", id);
    let mut sampler = Element::new("sampler");
    sampler.set_attr("id", sampler_id.as_str());
    sampler.push_elem(write_input(id, None, "input", "INPUT"));
    sampler.push_elem(write_input(id, None, "output", "OUTPUT"));
    sampler.push_elem(write_input(id, None, "interpolation", "INTERPOLATION"));
    sampler.push_elem(write_input(id, None, "intangent", "IN_TANGENT"));
    sampler.push_elem(write_input(id, None, "outangent", "OUT_TANGENT"));
    animation.push_elem(sampler);

    let mut channel = Element::new("channel");
    channel.set_attr("source", format!("#{}", sampler_id));
    channel.set_attr("target", channel_target(target_name, path, axis));
    animation.push_elem(channel);

    animation
}
