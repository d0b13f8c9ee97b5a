//! Metal Shading Language output of whole modules.

mod common;

use spvx_backend_core::CompilerOptions;
use spvx_backend_core::options::{MslOptions, VertexOptions};

use common::{
    branch_module, compile_text, compile_words, compute_module, first_text,
    separate_sampler_module, vertex_transform_module,
};

#[test]
fn vertex_interface_becomes_stage_structs() {
    let source = compile_text(&vertex_transform_module(), "msl");
    assert!(source.contains("struct main0_in"));
    assert!(source.contains("float4 local_pos [[attribute(0)]];"));
    assert!(source.contains("struct main0_out"));
    assert!(source.contains("float4 v_pos [[user(locn0)]];"));
    assert!(source.contains("float4 gl_Position [[position]];"));
    assert!(source.contains(
        "vertex main0_out main0(main0_in in [[stage_in]], uint gl_VertexIndex [[vertex_id]], \
         uint gl_InstanceIndex [[instance_id]])"
    ));
    assert!(source.contains("out.gl_Position = in.mvp * in.local_pos;"));
    assert!(source.contains("return out;"));
}

#[test]
fn clip_space_fixups_are_appended_before_return() {
    let options = CompilerOptions {
        vertex: VertexOptions { fixup_clipspace: true },
        msl: MslOptions {
            flip_vert_y: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let output = compile_words(&vertex_transform_module(), "msl", options).unwrap();
    let source = first_text(&output);
    let depth = source
        .find("out.gl_Position.z = 2.0 * out.gl_Position.z - out.gl_Position.w;")
        .unwrap();
    let flip = source.find("out.gl_Position.y = -(out.gl_Position.y);").unwrap();
    let ret = source.rfind("return out;").unwrap();
    assert!(depth < flip && flip < ret);
}

#[test]
fn fragment_locals_and_branches_translate() {
    let source = compile_text(&branch_module(), "msl");
    assert!(source.contains("fragment main0_out main0(main0_in in [[stage_in]])"));
    assert!(source.contains("float a [[user(locn0)]];"));
    assert!(source.contains("float color [[color(0)]];"));
    assert!(source.contains("if (in.a > 0.5)"));
    assert!(source.contains("out.color = x;"));
}

#[test]
fn separate_textures_and_samplers_take_their_own_slots() {
    let source = compile_text(&separate_sampler_module(1), "msl");
    assert!(source.contains("texture2d<float> tex [[texture(0)]]"));
    assert!(source.contains("sampler s1 [[sampler(0)]]"));
    assert!(source.contains("float2 uv [[user(locn0)]];"));
    assert!(source.contains("tex.sample(s1, in.uv)"));
}

#[test]
fn kernels_use_the_kernel_qualifier() {
    let source = compile_text(&compute_module(4, 4, 1), "msl");
    assert!(source.contains("kernel void main0("));
    assert!(!source.contains("main0_out"));
}
