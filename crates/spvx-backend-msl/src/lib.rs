//! Metal Shading Language backend for spvx.
//!
//! Stage inputs and outputs are gathered into `<entry>_in`/`<entry>_out`
//! structs, resources become entry point arguments with `[[buffer]]`,
//! `[[texture]]` and `[[sampler]]` indices, and helper functions receive
//! the globals they touch as extra parameters.

mod dialect;
mod interface;
mod names;
mod resources;
mod texture;

use spvx_backend_core::emit::compile;
use spvx_backend_core::{Backend, BackendError, BackendOptions, BackendOutput, OutputContent, OutputFile};
use spvx_ir::Module;

pub use dialect::Msl;

/// Metal backend.
#[derive(Debug, Default)]
pub struct MslBackend;

impl Backend for MslBackend {
    fn name(&self) -> &str {
        "MSL"
    }

    fn targets(&self) -> &[&str] {
        &["msl"]
    }

    fn compile(
        &self,
        module: &Module,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let source = compile(module, &opts.compiler, Msl::default())?;
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "shader.metal".into(),
                content: OutputContent::Text(source),
            }],
            diagnostics: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use spirv::{BuiltIn, Decoration, ExecutionMode, ExecutionModel, Op, StorageClass};
    use spvx_backend_core::CompilerOptions;
    use spvx_backend_core::options::{MslOptions, MslResourceBinding, VertexOptions};
    use spvx_ir::ErrorClass;

    use super::*;

    fn inst(op: Op, operands: &[u32]) -> Vec<u32> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | op as u32];
        words.extend_from_slice(operands);
        words
    }

    fn string(s: &str) -> Vec<u32> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn parse(bound: u32, body: &[Vec<u32>]) -> Module {
        let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, bound, 0];
        for inst in body {
            words.extend_from_slice(inst);
        }
        spvx_parser::parse(&words).unwrap()
    }

    fn entry(model: ExecutionModel, interface: &[u32]) -> Vec<u32> {
        let mut operands = vec![model as u32, 4];
        operands.extend(string("main"));
        operands.extend_from_slice(interface);
        inst(Op::EntryPoint, &operands)
    }

    fn named(id: u32, name: &str) -> Vec<u32> {
        let mut operands = vec![id];
        operands.extend(string(name));
        inst(Op::Name, &operands)
    }

    /// `color = vec4(1.0)` in a fragment shader.
    fn fragment_module() -> Module {
        let body = vec![
            inst(Op::Capability, &[spirv::Capability::Shader as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            entry(ExecutionModel::Fragment, &[9]),
            inst(Op::ExecutionMode, &[4, ExecutionMode::OriginUpperLeft as u32]),
            named(9, "color"),
            inst(Op::Decorate, &[9, Decoration::Location as u32, 0]),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::TypeFloat, &[6, 32]),
            inst(Op::TypeVector, &[7, 6, 4]),
            inst(Op::TypePointer, &[8, StorageClass::Output as u32, 7]),
            inst(Op::Variable, &[8, 9, StorageClass::Output as u32]),
            inst(Op::Constant, &[6, 10, 1.0f32.to_bits()]),
            inst(Op::ConstantComposite, &[7, 11, 10, 10, 10, 10]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::Store, &[9, 11]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ];
        parse(12, &body)
    }

    /// `gl_Position = pos` in a vertex shader.
    fn vertex_module() -> Module {
        let body = vec![
            inst(Op::Capability, &[spirv::Capability::Shader as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            entry(ExecutionModel::Vertex, &[9, 10]),
            named(9, "pos"),
            named(10, "gl_Position"),
            inst(Op::Decorate, &[9, Decoration::Location as u32, 0]),
            inst(Op::Decorate, &[10, Decoration::BuiltIn as u32, BuiltIn::Position as u32]),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::TypeFloat, &[6, 32]),
            inst(Op::TypeVector, &[7, 6, 4]),
            inst(Op::TypePointer, &[8, StorageClass::Input as u32, 7]),
            inst(Op::TypePointer, &[11, StorageClass::Output as u32, 7]),
            inst(Op::Variable, &[8, 9, StorageClass::Input as u32]),
            inst(Op::Variable, &[11, 10, StorageClass::Output as u32]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::Load, &[7, 12, 9]),
            inst(Op::Store, &[10, 12]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ];
        parse(13, &body)
    }

    /// A fragment shader reading one uniform block member.
    fn uniform_module() -> Module {
        let body = vec![
            inst(Op::Capability, &[spirv::Capability::Shader as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            entry(ExecutionModel::Fragment, &[9]),
            inst(Op::ExecutionMode, &[4, ExecutionMode::OriginUpperLeft as u32]),
            named(9, "color"),
            named(12, "UBO"),
            named(14, "ubo"),
            inst(Op::Decorate, &[9, Decoration::Location as u32, 0]),
            inst(Op::Decorate, &[12, Decoration::Block as u32]),
            inst(Op::MemberDecorate, &[12, 0, Decoration::Offset as u32, 0]),
            inst(Op::Decorate, &[14, Decoration::DescriptorSet as u32, 0]),
            inst(Op::Decorate, &[14, Decoration::Binding as u32, 1]),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::TypeFloat, &[6, 32]),
            inst(Op::TypeVector, &[7, 6, 4]),
            inst(Op::TypePointer, &[8, StorageClass::Output as u32, 7]),
            inst(Op::Variable, &[8, 9, StorageClass::Output as u32]),
            inst(Op::TypeStruct, &[12, 7]),
            inst(Op::TypePointer, &[13, StorageClass::Uniform as u32, 12]),
            inst(Op::Variable, &[13, 14, StorageClass::Uniform as u32]),
            inst(Op::TypeInt, &[15, 32, 1]),
            inst(Op::Constant, &[15, 16, 0]),
            inst(Op::TypePointer, &[17, StorageClass::Uniform as u32, 7]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::AccessChain, &[17, 18, 14, 16]),
            inst(Op::Load, &[7, 19, 18]),
            inst(Op::Store, &[9, 19]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ];
        parse(20, &body)
    }

    fn text(module: &Module, compiler: CompilerOptions) -> Result<String, BackendError> {
        let output = MslBackend.compile(module, &BackendOptions { compiler })?;
        assert_eq!(output.files[0].name, "shader.metal");
        Ok(output.first_text().unwrap().to_string())
    }

    #[test]
    fn fragment_outputs_become_a_color_struct() {
        let source = text(&fragment_module(), CompilerOptions::default()).unwrap();
        assert!(source.starts_with("#include <metal_stdlib>\n#include <simd/simd.h>\n"));
        assert!(source.contains("using namespace metal;"));
        assert!(source.contains("struct main0_out"));
        assert!(source.contains("float4 color [[color(0)]];"));
        assert!(source.contains("fragment main0_out main0()"));
        assert!(source.contains("out.color = "));
        assert!(source.contains("return out;"));
    }

    #[test]
    fn vertex_inputs_arrive_through_stage_in() {
        let source = text(&vertex_module(), CompilerOptions::default()).unwrap();
        assert!(source.contains("struct main0_in"));
        assert!(source.contains("float4 pos [[attribute(0)]];"));
        assert!(source.contains("float4 gl_Position [[position]];"));
        assert!(source.contains(
            "vertex main0_out main0(main0_in in [[stage_in]], uint gl_VertexIndex [[vertex_id]], \
             uint gl_InstanceIndex [[instance_id]])"
        ));
        assert!(source.contains("out.gl_Position = in.pos;"));
        assert!(!source.contains("Invert Y-axis"));
    }

    #[test]
    fn vertex_fixups_follow_the_options() {
        let options = CompilerOptions {
            vertex: VertexOptions {
                fixup_clipspace: true,
                ..VertexOptions::default()
            },
            msl: MslOptions {
                flip_vert_y: true,
                ..MslOptions::default()
            },
            ..CompilerOptions::default()
        };
        let source = text(&vertex_module(), options).unwrap();
        assert!(source.contains(
            "out.gl_Position.z = 2.0 * out.gl_Position.z - out.gl_Position.w;    // Adjust clip-space for Metal"
        ));
        assert!(source.contains("out.gl_Position.y = -(out.gl_Position.y);    // Invert Y-axis for Metal"));
    }

    #[test]
    fn uniform_blocks_take_buffer_indices() {
        let source = text(&uniform_module(), CompilerOptions::default()).unwrap();
        assert!(source.contains("struct UBO"));
        assert!(source.contains("constant UBO& ubo [[buffer(0)]]"));

        let options = CompilerOptions {
            msl: MslOptions {
                resource_bindings: vec![MslResourceBinding {
                    stage: ExecutionModel::Fragment,
                    desc_set: 0,
                    binding: 1,
                    msl_buffer: 5,
                    msl_texture: 0,
                    msl_sampler: 0,
                }],
                ..MslOptions::default()
            },
            ..CompilerOptions::default()
        };
        let source = text(&uniform_module(), options).unwrap();
        assert!(source.contains("constant UBO& ubo [[buffer(5)]]"));
    }

    #[test]
    fn geometry_stages_are_unsupported() {
        let body = vec![
            inst(Op::Capability, &[spirv::Capability::Geometry as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            entry(ExecutionModel::Geometry, &[]),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ];
        let err = text(&parse(6, &body), CompilerOptions::default()).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unsupported);
    }
}
