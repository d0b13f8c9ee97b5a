//! Reflection over parsed modules.

mod common;

use spirv::{Decoration, ExecutionModel, Op, StorageClass};
use spvx_analysis::reflect::{
    BufferRange, get_active_buffer_ranges, get_active_interface_variables,
    get_declared_struct_size, get_entry_points, get_shader_resources,
    get_specialization_constants,
};
use spvx_ir::{Id, Module, Type};

use common::SpvBuilder;

/// Ids of interest in the module built by `resource_module`.
struct Ids {
    main: u32,
    ubo_t: u32,
    ubo: u32,
    uv: u32,
    unused: u32,
    color: u32,
}

/// Fragment shader touching one member of a uniform block, a combined
/// sampler and its input, and declaring resources it never reads.
fn resource_module() -> (Module, Ids) {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    let (float, vec2, vec4, int) = (b.id(), b.id(), b.id(), b.id());
    let (ubo_t, ptr_ubo, ubo, ptr_u_float, c1) = (b.id(), b.id(), b.id(), b.id(), b.id());
    let (pc_t, ptr_pc, pc) = (b.id(), b.id(), b.id());
    let (img_t, si_t, ptr_si, combined) = (b.id(), b.id(), b.id(), b.id());
    let (ptr_img, img, smp_t, ptr_smp, smp) = (b.id(), b.id(), b.id(), b.id(), b.id());
    let (ptr_in, uv, unused, ptr_out, color) = (b.id(), b.id(), b.id(), b.id(), b.id());
    let spec = b.id();
    let (chain, scale, coord, sampled, texel, result) =
        (b.id(), b.id(), b.id(), b.id(), b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[uv, unused, color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(ubo_t, "UBO")
        .member_name(ubo_t, 0, "a")
        .member_name(ubo_t, 1, "b")
        .name(ubo, "ubo")
        .name(pc_t, "Push")
        .name(combined, "tex")
        .name(img, "img")
        .name(smp, "smp")
        .name(uv, "uv")
        .name(unused, "unused")
        .name(color, "color");
    b.decorate(ubo_t, Decoration::Block, &[])
        .member_decorate(ubo_t, 0, Decoration::Offset, &[0])
        .member_decorate(ubo_t, 1, Decoration::Offset, &[16])
        .decorate(ubo, Decoration::DescriptorSet, &[0])
        .decorate(ubo, Decoration::Binding, &[0])
        .decorate(pc_t, Decoration::Block, &[])
        .member_decorate(pc_t, 0, Decoration::Offset, &[0])
        .decorate(combined, Decoration::DescriptorSet, &[0])
        .decorate(combined, Decoration::Binding, &[1])
        .decorate(img, Decoration::DescriptorSet, &[1])
        .decorate(img, Decoration::Binding, &[0])
        .decorate(smp, Decoration::DescriptorSet, &[1])
        .decorate(smp, Decoration::Binding, &[1])
        .decorate(uv, Decoration::Location, &[0])
        .decorate(unused, Decoration::Location, &[1])
        .decorate(color, Decoration::Location, &[0])
        .decorate(spec, Decoration::SpecId, &[7]);

    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeVector, &[vec2, float, 2])
        .op(Op::TypeVector, &[vec4, float, 4])
        .op(Op::TypeInt, &[int, 32, 1])
        .op(Op::TypeStruct, &[ubo_t, vec4, float])
        .op(Op::TypePointer, &[ptr_ubo, StorageClass::Uniform as u32, ubo_t])
        .op(Op::Variable, &[ptr_ubo, ubo, StorageClass::Uniform as u32])
        .op(Op::TypePointer, &[ptr_u_float, StorageClass::Uniform as u32, float])
        .op(Op::Constant, &[int, c1, 1])
        .op(Op::TypeStruct, &[pc_t, float])
        .op(Op::TypePointer, &[ptr_pc, StorageClass::PushConstant as u32, pc_t])
        .op(Op::Variable, &[ptr_pc, pc, StorageClass::PushConstant as u32])
        .op(
            Op::TypeImage,
            &[img_t, float, spirv::Dim::Dim2D as u32, 0, 0, 0, 1, 0],
        )
        .op(Op::TypeSampledImage, &[si_t, img_t])
        .op(Op::TypePointer, &[ptr_si, StorageClass::UniformConstant as u32, si_t])
        .op(Op::Variable, &[ptr_si, combined, StorageClass::UniformConstant as u32])
        .op(Op::TypePointer, &[ptr_img, StorageClass::UniformConstant as u32, img_t])
        .op(Op::Variable, &[ptr_img, img, StorageClass::UniformConstant as u32])
        .op(Op::TypeSampler, &[smp_t])
        .op(Op::TypePointer, &[ptr_smp, StorageClass::UniformConstant as u32, smp_t])
        .op(Op::Variable, &[ptr_smp, smp, StorageClass::UniformConstant as u32])
        .op(Op::TypePointer, &[ptr_in, StorageClass::Input as u32, vec2])
        .op(Op::Variable, &[ptr_in, uv, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_in, unused, StorageClass::Input as u32])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, vec4])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32])
        .op(Op::SpecConstant, &[float, spec, 1.0f32.to_bits()]);

    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[label])
        .op(Op::AccessChain, &[ptr_u_float, chain, ubo, c1])
        .op(Op::Load, &[float, scale, chain])
        .op(Op::Load, &[vec2, coord, uv])
        .op(Op::Load, &[si_t, sampled, combined])
        .op(Op::ImageSampleImplicitLod, &[vec4, texel, sampled, coord])
        .op(Op::VectorTimesScalar, &[vec4, result, texel, scale])
        .op(Op::Store, &[color, result])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);

    let module = spvx_parser::parse(&b.words()).unwrap();
    let ids = Ids {
        main,
        ubo_t,
        ubo,
        uv,
        unused,
        color,
    };
    (module, ids)
}

fn names(resources: &[spvx_analysis::reflect::Resource]) -> Vec<&str> {
    resources.iter().map(|r| r.name.as_str()).collect()
}

#[test]
fn resources_are_sorted_into_classes() {
    let (module, _) = resource_module();
    let res = get_shader_resources(&module, None);
    assert_eq!(names(&res.uniform_buffers), vec!["UBO"]);
    assert_eq!(res.push_constant_buffers.len(), 1);
    assert_eq!(names(&res.sampled_images), vec!["tex"]);
    assert_eq!(names(&res.separate_images), vec!["img"]);
    assert_eq!(names(&res.separate_samplers), vec!["smp"]);
    assert_eq!(names(&res.stage_inputs), vec!["uv", "unused"]);
    assert_eq!(names(&res.stage_outputs), vec!["color"]);
    assert!(res.storage_buffers.is_empty());
    assert!(res.storage_images.is_empty());
}

#[test]
fn active_variables_exclude_untouched_inputs() {
    let (module, ids) = resource_module();
    let active = get_active_interface_variables(&module, Id::new(ids.main)).unwrap();
    assert!(active.contains(&Id::new(ids.uv)));
    assert!(active.contains(&Id::new(ids.color)));
    assert!(active.contains(&Id::new(ids.ubo)));
    assert!(!active.contains(&Id::new(ids.unused)));

    let res = get_shader_resources(&module, Some(&active));
    assert_eq!(names(&res.stage_inputs), vec!["uv"]);
    assert!(res.separate_images.is_empty());
    assert!(res.push_constant_buffers.is_empty());
}

#[test]
fn block_size_ends_at_the_last_member() {
    let (module, ids) = resource_module();
    let ty: &Type = module.get(Id::new(ids.ubo_t)).unwrap();
    assert_eq!(get_declared_struct_size(&module, ty).unwrap(), 20);
}

#[test]
fn only_indexed_members_are_active_ranges() {
    let (module, ids) = resource_module();
    let ranges =
        get_active_buffer_ranges(&module, Id::new(ids.ubo), Id::new(ids.main)).unwrap();
    assert_eq!(
        ranges,
        vec![BufferRange {
            index: 1,
            offset: 16,
            range: 4,
        }]
    );
}

#[test]
fn specialization_constants_and_entry_points_are_listed() {
    let (module, _) = resource_module();
    let constants = get_specialization_constants(&module);
    assert_eq!(constants.len(), 1);
    assert_eq!(constants[0].constant_id, 7);
    assert_eq!(get_entry_points(&module), vec!["main".to_string()]);
}
