//! Document-tree primitives: source/input writers, ID bookkeeping and the
//! cross-reference closure check.
//!
//! Every serializer funnels its numeric payload through [`write_source`],
//! which is the one place array counts, accessor strides and parameter
//! signatures are derived. The caller guarantees values/signature
//! compatibility; only the arithmetic is enforced here.

use hashbrown::HashSet;
use xmltree::{Element, XMLNode};

/// Small conveniences over `xmltree::Element`.
pub(crate) trait ElementExt {
    fn set_attr(&mut self, name: &str, value: impl Into<String>);
    fn push_elem(&mut self, child: Element);
    fn push_text(&mut self, text: impl Into<String>);
}

impl ElementExt for Element {
    fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    fn push_elem(&mut self, child: Element) {
        self.children.push(XMLNode::Element(child));
    }

    fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XMLNode::Text(text.into()));
    }
}

/// Payload accepted by [`write_source`].
#[derive(Debug, Clone)]
pub enum SourceData {
    /// Scalar floats; stride comes from the parameter signature.
    Floats(Vec<f32>),
    /// Plain names (interpolation modes).
    Names(Vec<String>),
    /// ID references (joint names).
    Idrefs(Vec<String>),
    /// 4x4 matrices flattened row-major, stride 16.
    Matrices(Vec<[f32; 16]>),
}

/// Join float values with single spaces.
pub(crate) fn float_text(values: &[f32]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&v.to_string());
    }
    out
}

/// Fixed-point text used for transforms and clip times, matching the
/// authoring tool's six-decimal convention.
pub(crate) fn fixed_text(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| format!("{:.6}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a `<source>` element: data array plus accessor.
///
/// `params` is the accessor parameter signature: per-component names like
/// `["X", "Y", "Z"]` or `["S", "T"]`, a single semantic name like
/// `["TIME"]`, or empty for one unnamed parameter per element (names,
/// matrices, bare weight lists). The recorded array count always equals the
/// number of values; the accessor stride is the signature length, 16 for
/// matrices, 1 when the signature is empty.
pub fn write_source(id: &str, data: &SourceData, params: &[&str]) -> Element {
    let mut source = Element::new("source");
    source.set_attr("id", id);

    let array_id = format!("{}-array", id);
    let (mut array, value_count, stride, param_type) = match data {
        SourceData::Floats(values) => {
            let stride = if params.is_empty() { 1 } else { params.len() };
            (Element::new("float_array"), values.len(), stride, "float")
        }
        SourceData::Names(values) => (Element::new("Name_array"), values.len(), 1, "name"),
        SourceData::Idrefs(values) => (Element::new("IDREF_array"), values.len(), 1, "IDREF"),
        SourceData::Matrices(values) => {
            (Element::new("float_array"), values.len() * 16, 16, "float4x4")
        }
    };
    array.set_attr("id", array_id.as_str());
    array.set_attr("count", value_count.to_string());
    match data {
        SourceData::Floats(values) => array.push_text(float_text(values)),
        SourceData::Names(values) | SourceData::Idrefs(values) => {
            array.push_text(values.join(" "));
        }
        SourceData::Matrices(values) => {
            let text = values
                .iter()
                .map(|m| float_text(m))
                .collect::<Vec<_>>()
                .join(" ");
            array.push_text(text);
        }
    }
    source.push_elem(array);

    let mut technique = Element::new("technique_common");
    let mut accessor = Element::new("accessor");
    accessor.set_attr("source", format!("#{}", array_id));
    accessor.set_attr("count", (value_count / stride).to_string());
    accessor.set_attr("stride", stride.to_string());

    if params.is_empty() {
        let mut param = Element::new("param");
        param.set_attr("type", param_type);
        accessor.push_elem(param);
    } else {
        for name in params {
            let mut param = Element::new("param");
            param.set_attr("name", *name);
            param.set_attr("type", param_type);
            accessor.push_elem(param);
        }
    }

    technique.push_elem(accessor);
    source.push_elem(technique);
    source
}

/// Build an `<input>` element referencing `#{parent_id}-{suffix}`.
pub fn write_input(parent_id: &str, offset: Option<usize>, suffix: &str, semantic: &str) -> Element {
    let mut input = Element::new("input");
    input.set_attr("semantic", semantic);
    input.set_attr("source", format!("#{}-{}", parent_id, suffix));
    if let Some(offset) = offset {
        input.set_attr("offset", offset.to_string());
    }
    input
}

/// Collect every `id` attribute in document (pre-)order.
pub fn collect_ids(root: &Element) -> Vec<String> {
    let mut ids = Vec::new();
    collect_ids_into(root, &mut ids);
    ids
}

fn collect_ids_into(element: &Element, out: &mut Vec<String>) {
    if let Some(id) = element.attributes.get("id") {
        out.push(id.clone());
    }
    for child in &element.children {
        if let XMLNode::Element(child) = child {
            collect_ids_into(child, out);
        }
    }
}

/// IDs that appear on more than one element, in first-duplicate order.
pub fn duplicate_ids(root: &Element) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for id in collect_ids(root) {
        if !seen.insert(id.clone()) && !duplicates.contains(&id) {
            duplicates.push(id);
        }
    }
    duplicates
}

/// Check the cross-reference closure invariant: every `source`/`url`/`target`
/// attribute holding a `#`-reference must resolve to an `id` emitted earlier
/// in document order. Returns the offending references on failure.
pub fn verify_cross_references(root: &Element) -> Result<(), Vec<String>> {
    let mut emitted: HashSet<String> = HashSet::new();
    let mut unresolved = Vec::new();
    visit_references(root, &mut emitted, &mut unresolved);
    if unresolved.is_empty() {
        Ok(())
    } else {
        Err(unresolved)
    }
}

fn visit_references(
    element: &Element,
    emitted: &mut HashSet<String>,
    unresolved: &mut Vec<String>,
) {
    if let Some(id) = element.attributes.get("id") {
        emitted.insert(id.clone());
    }
    for attr in ["source", "url", "target"] {
        if let Some(value) = element.attributes.get(attr) {
            if let Some(id) = value.strip_prefix('#') {
                if !emitted.contains(id) {
                    unresolved.push(format!("<{} {}=\"{}\">", element.name, attr, value));
                }
            }
        }
    }
    for child in &element.children {
        if let XMLNode::Element(child) = child {
            visit_references(child, emitted, unresolved);
        }
    }
}
