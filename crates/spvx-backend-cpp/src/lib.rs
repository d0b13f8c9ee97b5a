//! C++ backend for spvx.
//!
//! Emits a translation unit that runs the shader on the CPU: resources
//! become members of `Impl::Shader::Resources`, registered with the host
//! runtime by descriptor set and binding or by location, and the shader
//! body becomes inline member functions over glm types.

mod dialect;

use spvx_backend_core::emit::compile;
use spvx_backend_core::{Backend, BackendError, BackendOptions, BackendOutput, OutputContent, OutputFile};
use spvx_ir::Module;

pub use dialect::Cpp;

/// C++ backend.
#[derive(Debug, Default)]
pub struct CppBackend;

impl Backend for CppBackend {
    fn name(&self) -> &str {
        "C++"
    }

    fn targets(&self) -> &[&str] {
        &["cpp"]
    }

    fn compile(
        &self,
        module: &Module,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let source = compile(module, &opts.compiler, Cpp::default())?;
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "shader.cpp".into(),
                content: OutputContent::Text(source),
            }],
            diagnostics: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use spirv::{Decoration, ExecutionMode, ExecutionModel, Op, StorageClass};
    use spvx_backend_core::CompilerOptions;

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

    /// `color = ubo.tint` in a fragment shader.
    fn fragment_module() -> Module {
        let body = vec![
            inst(Op::Capability, &[spirv::Capability::Shader as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            entry(ExecutionModel::Fragment, &[9]),
            inst(Op::ExecutionMode, &[4, ExecutionMode::OriginUpperLeft as u32]),
            named(9, "color"),
            named(12, "UBO"),
            inst(Op::MemberName, &{
                let mut operands = vec![12, 0];
                operands.extend(string("tint"));
                operands
            }),
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

    /// `void main() {}` with an 8x4x1 workgroup.
    fn compute_module() -> Module {
        let body = vec![
            inst(Op::Capability, &[spirv::Capability::Shader as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            entry(ExecutionModel::GLCompute, &[]),
            inst(Op::ExecutionMode, &[4, ExecutionMode::LocalSize as u32, 8, 4, 1]),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ];
        parse(6, &body)
    }

    fn text(module: &Module) -> String {
        let output = CppBackend
            .compile(module, &BackendOptions { compiler: CompilerOptions::default() })
            .unwrap();
        assert_eq!(output.files[0].name, "shader.cpp");
        output.first_text().unwrap().to_string()
    }

    #[test]
    fn resources_register_by_binding_and_location() {
        let source = text(&fragment_module());
        assert!(source.contains("namespace Impl"));
        assert!(source.contains("struct Resources : FragmentResources"));
        assert!(source.contains("internal::Resource<UBO> ubo__;"));
        assert!(source.contains("#define ubo __res->ubo__.get()"));
        assert!(source.contains("internal::StageOutput<vec4> color__;"));
        assert!(source.contains("FragmentResources::init(s);"));
        assert!(source.contains("s.register_resource(ubo__, 0, 1);"));
        assert!(source.contains("s.register_stage_output(color__, 0);"));
        assert!(source.contains("inline void main()"));
        assert!(source.contains("color = ubo.tint;"));
    }

    #[test]
    fn block_structs_are_declared_inside_resources() {
        let source = text(&fragment_module());
        let resources = source.find("struct Resources").unwrap();
        let block = source.find("struct UBO").unwrap();
        assert!(block > resources);
        assert!(source.contains("vec4 tint;"));
    }

    #[test]
    fn compute_shaders_carry_their_workgroup_size() {
        let source = text(&compute_module());
        assert!(source.contains("struct Resources : ComputeResources"));
        assert!(source.contains("ComputePrivateResources __priv_res;"));
        assert!(source.contains("return new ComputeShader<Impl::Shader, 8, 4, 1>();"));
        assert!(source.contains("const struct spvx_interface *spvx_get_interface(void)"));
    }

    #[test]
    fn scopes_are_balanced() {
        let source = text(&compute_module());
        assert_eq!(source.matches('{').count(), source.matches('}').count());
    }
}
