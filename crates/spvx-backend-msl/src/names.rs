//! Metal spellings of builtins, attributes and reserved names.

use spirv::{BuiltIn, ExecutionModel, StorageClass};

/// Entry point functions cannot be called `main` in Metal.
pub const ENTRY_MAIN: &str = "main0";
/// Helper functions called `main` are renamed out of the way.
pub const HELPER_MAIN: &str = "mmain";

/// The GLSL-style name a builtin is declared and referenced under.
pub fn builtin_name(builtin: BuiltIn) -> &'static str {
    match builtin {
        BuiltIn::Position => "gl_Position",
        BuiltIn::PointSize => "gl_PointSize",
        BuiltIn::ClipDistance => "gl_ClipDistance",
        BuiltIn::CullDistance => "gl_CullDistance",
        BuiltIn::VertexId => "gl_VertexID",
        BuiltIn::InstanceId => "gl_InstanceID",
        BuiltIn::VertexIndex => "gl_VertexIndex",
        BuiltIn::InstanceIndex => "gl_InstanceIndex",
        BuiltIn::Layer => "gl_Layer",
        BuiltIn::FragCoord => "gl_FragCoord",
        BuiltIn::PointCoord => "gl_PointCoord",
        BuiltIn::FrontFacing => "gl_FrontFacing",
        BuiltIn::SampleId => "gl_SampleID",
        BuiltIn::SampleMask => "gl_SampleMask",
        BuiltIn::FragDepth => "gl_FragDepth",
        BuiltIn::NumWorkgroups => "gl_NumWorkGroups",
        BuiltIn::WorkgroupId => "gl_WorkGroupID",
        BuiltIn::LocalInvocationId => "gl_LocalInvocationID",
        BuiltIn::GlobalInvocationId => "gl_GlobalInvocationID",
        BuiltIn::LocalInvocationIndex => "gl_LocalInvocationIndex",
        _ => "gl_???",
    }
}

/// The `[[...]]` attribute a builtin carries in an entry point signature
/// or interface struct. `None` when Metal has no such attribute for the
/// stage and direction.
pub fn builtin_qualifier(
    builtin: BuiltIn,
    model: ExecutionModel,
    storage: StorageClass,
    depth_mode: Option<&'static str>,
    rendering_points: bool,
) -> Option<String> {
    let input = storage == StorageClass::Input;
    let attr = match (model, input, builtin) {
        (ExecutionModel::Vertex, true, BuiltIn::VertexId | BuiltIn::VertexIndex) => "vertex_id",
        (ExecutionModel::Vertex, true, BuiltIn::InstanceId | BuiltIn::InstanceIndex) => "instance_id",
        (ExecutionModel::Vertex, false, BuiltIn::Position) => "position",
        (ExecutionModel::Vertex, false, BuiltIn::PointSize) if rendering_points => "point_size",
        (ExecutionModel::Vertex, false, BuiltIn::Layer) => "render_target_array_index",

        (ExecutionModel::Fragment, true, BuiltIn::FrontFacing) => "front_facing",
        (ExecutionModel::Fragment, true, BuiltIn::PointCoord) => "point_coord",
        (ExecutionModel::Fragment, true, BuiltIn::FragCoord) => "position",
        (ExecutionModel::Fragment, true, BuiltIn::Layer) => "render_target_array_index",
        (ExecutionModel::Fragment, true, BuiltIn::SampleId) => "sample_id",
        (ExecutionModel::Fragment, _, BuiltIn::SampleMask) => "sample_mask",
        (ExecutionModel::Fragment, false, BuiltIn::FragDepth) => {
            return Some(format!("depth({})", depth_mode.unwrap_or("any")));
        }

        (ExecutionModel::GLCompute, true, BuiltIn::GlobalInvocationId) => "thread_position_in_grid",
        (ExecutionModel::GLCompute, true, BuiltIn::WorkgroupId) => "threadgroup_position_in_grid",
        (ExecutionModel::GLCompute, true, BuiltIn::NumWorkgroups) => "threadgroups_per_grid",
        (ExecutionModel::GLCompute, true, BuiltIn::LocalInvocationId) => "thread_position_in_threadgroup",
        (ExecutionModel::GLCompute, true, BuiltIn::LocalInvocationIndex) => "thread_index_in_threadgroup",
        _ => return None,
    };
    Some(attr.to_string())
}

/// Prefixes names that collide with the `_<digit>` temporaries.
pub fn ensure_valid_name(name: String, prefix: &str) -> String {
    let mut chars = name.chars();
    if chars.next() == Some('_') && chars.next().is_some_and(|c| c.is_ascii_digit()) {
        format!("{prefix}{name}")
    } else {
        name
    }
}

/// Name of a non-entry function.
pub fn clean_func_name(name: String) -> String {
    if name == "main" { HELPER_MAIN.to_string() } else { name }
}

/// Name of the entry point function.
pub fn clean_entry_name(name: &str) -> String {
    if name == "main" || name.is_empty() {
        ENTRY_MAIN.to_string()
    } else {
        name.to_string()
    }
}
