//! C++ output of whole modules.

mod common;

use common::{compile_text, compute_module, separate_sampler_module, vertex_transform_module};

#[test]
fn stage_variables_register_by_location() {
    let source = compile_text(&vertex_transform_module(), "cpp");
    assert!(source.starts_with("// This C++ shader is generated by spvx."));
    assert!(source.contains("struct Resources : VertexResources"));
    assert!(source.contains("internal::StageInput<vec4> local_pos__;"));
    assert!(source.contains("internal::StageInput<mat4> mvp__;"));
    assert!(source.contains("internal::StageOutput<vec4> v_pos__;"));
    assert!(source.contains("s.register_stage_input(local_pos__, 0);"));
    assert!(source.contains("s.register_stage_input(mvp__, 1);"));
    assert!(source.contains("s.register_stage_output(v_pos__, 0);"));
    assert!(source.contains("gl_Position = mvp * local_pos;"));
    assert!(source.contains("return new VertexShader<Impl::Shader>();"));
}

#[test]
fn opaque_uniforms_register_as_resources() {
    let source = compile_text(&separate_sampler_module(1), "cpp");
    assert!(source.contains("struct Resources : FragmentResources"));
    assert!(source.contains("s.register_resource(tex__, 0, 0);"));
    assert!(source.contains("s.register_resource(s1__, 0, 1);"));
    assert!(source.contains("texture(sampler2D(tex, s1), uv)"));
}

#[test]
fn translation_units_expose_the_c_interface() {
    let source = compile_text(&compute_module(16, 1, 1), "cpp");
    assert!(source.contains("namespace Impl"));
    assert!(source.contains("ComputeShader<Impl::Shader, 16, 1, 1>"));
    assert!(source.contains("spvx_get_interface"));
    assert_eq!(source.matches('{').count(), source.matches('}').count());
}
