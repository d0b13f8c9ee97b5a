use spirv::{Decoration, ExecutionModel, Op, StorageClass};
use spvx_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, BackendRegistry, CompilerOptions,
    OutputContent,
};

/// Assembles a SPIR-V module in memory. Ids are handed out in order and
/// the bound is written when the words are taken.
#[allow(dead_code)]
pub struct SpvBuilder {
    next_id: u32,
    body: Vec<u32>,
}

#[allow(dead_code)]
impl SpvBuilder {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            body: Vec::new(),
        }
    }

    /// Allocates a fresh id.
    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn op(&mut self, op: Op, operands: &[u32]) -> &mut Self {
        self.body
            .push(((operands.len() as u32 + 1) << 16) | op as u32);
        self.body.extend_from_slice(operands);
        self
    }

    /// `Capability Shader`, `MemoryModel GLSL450` and an entry point named
    /// `main` for `func`.
    pub fn shader(&mut self, model: ExecutionModel, func: u32, interface: &[u32]) -> &mut Self {
        self.op(Op::Capability, &[spirv::Capability::Shader as u32]);
        self.op(Op::MemoryModel, &[0, 1]);
        let mut operands = vec![model as u32, func];
        operands.extend(string("main"));
        operands.extend_from_slice(interface);
        self.op(Op::EntryPoint, &operands)
    }

    pub fn name(&mut self, id: u32, name: &str) -> &mut Self {
        let mut operands = vec![id];
        operands.extend(string(name));
        self.op(Op::Name, &operands)
    }

    pub fn member_name(&mut self, ty: u32, member: u32, name: &str) -> &mut Self {
        let mut operands = vec![ty, member];
        operands.extend(string(name));
        self.op(Op::MemberName, &operands)
    }

    pub fn decorate(&mut self, id: u32, decoration: Decoration, args: &[u32]) -> &mut Self {
        let mut operands = vec![id, decoration as u32];
        operands.extend_from_slice(args);
        self.op(Op::Decorate, &operands)
    }

    pub fn member_decorate(
        &mut self,
        ty: u32,
        member: u32,
        decoration: Decoration,
        args: &[u32],
    ) -> &mut Self {
        let mut operands = vec![ty, member, decoration as u32];
        operands.extend_from_slice(args);
        self.op(Op::MemberDecorate, &operands)
    }

    /// Declares `float` constant `id` of type `ty`.
    pub fn constant_f32(&mut self, ty: u32, id: u32, value: f32) -> &mut Self {
        self.op(Op::Constant, &[ty, id, value.to_bits()])
    }

    /// The finished module: header followed by every instruction.
    pub fn words(&self) -> Vec<u32> {
        let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, self.next_id, 0];
        words.extend_from_slice(&self.body);
        words
    }
}

/// Packs a nul-terminated literal string into words.
#[allow(dead_code)]
pub fn string(s: &str) -> Vec<u32> {
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

/// Every backend the CLI offers.
#[allow(dead_code)]
pub fn registry() -> BackendRegistry {
    let mut registry = BackendRegistry::with_builtins();
    for backend in spvx_backend_glsl::GlslBackend::all() {
        registry.register(backend);
    }
    registry.register(Box::new(spvx_backend_msl::MslBackend));
    registry.register(Box::new(spvx_backend_cpp::CppBackend));
    registry
}

/// Parses `words` and compiles them for `target`.
#[allow(dead_code)]
pub fn compile_words(
    words: &[u32],
    target: &str,
    compiler: CompilerOptions,
) -> Result<BackendOutput, BackendError> {
    let registry = registry();
    let backend: &dyn Backend = registry
        .find(target)
        .unwrap_or_else(|| panic!("no backend for {target}"));
    backend.compile_spirv(words, &BackendOptions { compiler })
}

/// Like `compile_words` with default options, returning the source text.
#[allow(dead_code)]
pub fn compile_text(words: &[u32], target: &str) -> String {
    let output = compile_words(words, target, CompilerOptions::default())
        .unwrap_or_else(|e| panic!("{target} compilation failed: {e}"));
    first_text(&output).to_string()
}

/// Extract the first text output from a `BackendOutput`.
#[allow(dead_code)]
pub fn first_text(output: &BackendOutput) -> &str {
    match &output.files[0].content {
        OutputContent::Text(t) => t,
        OutputContent::Binary(_) => panic!("expected text output, got binary"),
    }
}

/// Vertex shader: `gl_Position = mvp * local_pos; v_pos = gl_Position;`.
#[allow(dead_code)]
pub fn vertex_transform_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    let (float, vec4, mat4) = (b.id(), b.id(), b.id());
    let (ptr_in_vec4, ptr_in_mat4, ptr_out_vec4) = (b.id(), b.id(), b.id());
    let (local_pos, mvp, gl_pos, v_pos) = (b.id(), b.id(), b.id(), b.id());
    let (lp, m, p, q) = (b.id(), b.id(), b.id(), b.id());

    b.shader(ExecutionModel::Vertex, main, &[local_pos, mvp, gl_pos, v_pos]);
    b.name(local_pos, "local_pos")
        .name(mvp, "mvp")
        .name(gl_pos, "gl_Position")
        .name(v_pos, "v_pos");
    b.decorate(local_pos, Decoration::Location, &[0])
        .decorate(mvp, Decoration::Location, &[1])
        .decorate(gl_pos, Decoration::BuiltIn, &[spirv::BuiltIn::Position as u32])
        .decorate(v_pos, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeVector, &[vec4, float, 4])
        .op(Op::TypeMatrix, &[mat4, vec4, 4])
        .op(Op::TypePointer, &[ptr_in_vec4, StorageClass::Input as u32, vec4])
        .op(Op::TypePointer, &[ptr_in_mat4, StorageClass::Input as u32, mat4])
        .op(Op::TypePointer, &[ptr_out_vec4, StorageClass::Output as u32, vec4])
        .op(Op::Variable, &[ptr_in_vec4, local_pos, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_in_mat4, mvp, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_out_vec4, gl_pos, StorageClass::Output as u32])
        .op(Op::Variable, &[ptr_out_vec4, v_pos, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[label])
        .op(Op::Load, &[vec4, lp, local_pos])
        .op(Op::Load, &[mat4, m, mvp])
        .op(Op::MatrixTimesVector, &[vec4, p, m, lp])
        .op(Op::Store, &[gl_pos, p])
        .op(Op::Load, &[vec4, q, gl_pos])
        .op(Op::Store, &[v_pos, q])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader writing `color` from a local chosen by `a > 0.5`.
#[allow(dead_code)]
pub fn branch_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main) = (b.id(), b.id(), b.id());
    let (entry, then, other, merge) = (b.id(), b.id(), b.id(), b.id());
    let (float, boolean) = (b.id(), b.id());
    let (ptr_in, ptr_out, ptr_fn) = (b.id(), b.id(), b.id());
    let (half, one, zero) = (b.id(), b.id(), b.id());
    let (a, color, x) = (b.id(), b.id(), b.id());
    let (av, cond, xv) = (b.id(), b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[a, color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(a, "a").name(color, "color").name(x, "x");
    b.decorate(a, Decoration::Location, &[0])
        .decorate(color, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeBool, &[boolean])
        .op(Op::TypePointer, &[ptr_in, StorageClass::Input as u32, float])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, float])
        .op(Op::TypePointer, &[ptr_fn, StorageClass::Function as u32, float]);
    b.constant_f32(float, half, 0.5)
        .constant_f32(float, one, 1.0)
        .constant_f32(float, zero, 0.0);
    b.op(Op::Variable, &[ptr_in, a, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[entry])
        .op(Op::Variable, &[ptr_fn, x, StorageClass::Function as u32])
        .op(Op::Load, &[float, av, a])
        .op(Op::FOrdGreaterThan, &[boolean, cond, av, half])
        .op(Op::SelectionMerge, &[merge, 0])
        .op(Op::BranchConditional, &[cond, then, other])
        .op(Op::Label, &[then])
        .op(Op::Store, &[x, one])
        .op(Op::Branch, &[merge])
        .op(Op::Label, &[other])
        .op(Op::Store, &[x, zero])
        .op(Op::Branch, &[merge])
        .op(Op::Label, &[merge])
        .op(Op::Load, &[float, xv, x])
        .op(Op::Store, &[color, xv])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader summing `i` for `i` in `0..10` with the header, the
/// condition block and the continue block laid out the way glslang does.
#[allow(dead_code)]
pub fn counting_loop_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main) = (b.id(), b.id(), b.id());
    let (entry, header, check, body, cont, merge) =
        (b.id(), b.id(), b.id(), b.id(), b.id(), b.id());
    let (int, boolean, float) = (b.id(), b.id(), b.id());
    let (ptr_fn, ptr_out) = (b.id(), b.id());
    let (c0, c1, c10) = (b.id(), b.id(), b.id());
    let (i, sum, result) = (b.id(), b.id(), b.id());
    let (iv, lt, s, i2, ns, i3, inc, sv, sf) = (
        b.id(),
        b.id(),
        b.id(),
        b.id(),
        b.id(),
        b.id(),
        b.id(),
        b.id(),
        b.id(),
    );

    b.shader(ExecutionModel::Fragment, main, &[result]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(i, "i").name(sum, "sum").name(result, "result");
    b.decorate(result, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeInt, &[int, 32, 1])
        .op(Op::TypeBool, &[boolean])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypePointer, &[ptr_fn, StorageClass::Function as u32, int])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, float])
        .op(Op::Constant, &[int, c0, 0])
        .op(Op::Constant, &[int, c1, 1])
        .op(Op::Constant, &[int, c10, 10])
        .op(Op::Variable, &[ptr_out, result, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[entry])
        .op(Op::Variable, &[ptr_fn, i, StorageClass::Function as u32])
        .op(Op::Variable, &[ptr_fn, sum, StorageClass::Function as u32])
        .op(Op::Store, &[i, c0])
        .op(Op::Store, &[sum, c0])
        .op(Op::Branch, &[header])
        .op(Op::Label, &[header])
        .op(Op::LoopMerge, &[merge, cont, 0])
        .op(Op::Branch, &[check])
        .op(Op::Label, &[check])
        .op(Op::Load, &[int, iv, i])
        .op(Op::SLessThan, &[boolean, lt, iv, c10])
        .op(Op::BranchConditional, &[lt, body, merge])
        .op(Op::Label, &[body])
        .op(Op::Load, &[int, s, sum])
        .op(Op::Load, &[int, i2, i])
        .op(Op::IAdd, &[int, ns, s, i2])
        .op(Op::Store, &[sum, ns])
        .op(Op::Branch, &[cont])
        .op(Op::Label, &[cont])
        .op(Op::Load, &[int, i3, i])
        .op(Op::IAdd, &[int, inc, i3, c1])
        .op(Op::Store, &[i, inc])
        .op(Op::Branch, &[header])
        .op(Op::Label, &[merge])
        .op(Op::Load, &[int, sv, sum])
        .op(Op::ConvertSToF, &[float, sf, sv])
        .op(Op::Store, &[result, sf])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Empty compute shader with the given workgroup size.
#[allow(dead_code)]
pub fn compute_module(x: u32, y: u32, z: u32) -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    b.shader(ExecutionModel::GLCompute, main, &[]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::LocalSize as u32, x, y, z],
    );
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[label])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader sampling texture `tex` through `samplers` separate
/// samplers `s1`, `s2`, ... at `uv` and writing the sum to `color`.
#[allow(dead_code)]
pub fn separate_sampler_module(samplers: u32) -> Vec<u32> {
    assert!((1..=2).contains(&samplers));
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    let (float, vec2, vec4) = (b.id(), b.id(), b.id());
    let (image_t, sampler_t, sampled_t) = (b.id(), b.id(), b.id());
    let (ptr_image, ptr_sampler, ptr_in, ptr_out) = (b.id(), b.id(), b.id(), b.id());
    let (tex, uv, color) = (b.id(), b.id(), b.id());
    let sampler_ids: Vec<u32> = (0..samplers).map(|_| b.id()).collect();

    b.shader(ExecutionModel::Fragment, main, &[uv, color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(tex, "tex").name(uv, "uv").name(color, "color");
    for (k, &s) in sampler_ids.iter().enumerate() {
        b.name(s, &format!("s{}", k + 1));
    }
    b.decorate(tex, Decoration::DescriptorSet, &[0])
        .decorate(tex, Decoration::Binding, &[0])
        .decorate(uv, Decoration::Location, &[0])
        .decorate(color, Decoration::Location, &[0]);
    for (k, &s) in sampler_ids.iter().enumerate() {
        b.decorate(s, Decoration::DescriptorSet, &[0])
            .decorate(s, Decoration::Binding, &[k as u32 + 1]);
    }
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeVector, &[vec2, float, 2])
        .op(Op::TypeVector, &[vec4, float, 4])
        .op(
            Op::TypeImage,
            &[image_t, float, spirv::Dim::Dim2D as u32, 0, 0, 0, 1, 0],
        )
        .op(Op::TypeSampler, &[sampler_t])
        .op(Op::TypeSampledImage, &[sampled_t, image_t])
        .op(Op::TypePointer, &[ptr_image, StorageClass::UniformConstant as u32, image_t])
        .op(Op::TypePointer, &[ptr_sampler, StorageClass::UniformConstant as u32, sampler_t])
        .op(Op::TypePointer, &[ptr_in, StorageClass::Input as u32, vec2])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, vec4])
        .op(Op::Variable, &[ptr_image, tex, StorageClass::UniformConstant as u32]);
    for &s in &sampler_ids {
        b.op(Op::Variable, &[ptr_sampler, s, StorageClass::UniformConstant as u32]);
    }
    b.op(Op::Variable, &[ptr_in, uv, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32]);

    b.op(Op::Function, &[void, main, 0, fnty]).op(Op::Label, &[label]);
    let mut samples = Vec::new();
    for &s in &sampler_ids {
        let (t, smp, combined, coord, sample) = (b.id(), b.id(), b.id(), b.id(), b.id());
        b.op(Op::Load, &[image_t, t, tex])
            .op(Op::Load, &[sampler_t, smp, s])
            .op(Op::SampledImage, &[sampled_t, combined, t, smp])
            .op(Op::Load, &[vec2, coord, uv])
            .op(Op::ImageSampleImplicitLod, &[vec4, sample, combined, coord]);
        samples.push(sample);
    }
    let value = if let [first, second] = samples[..] {
        let sum = b.id();
        b.op(Op::FAdd, &[vec4, sum, first, second]);
        sum
    } else {
        samples[0]
    };
    b.op(Op::Store, &[color, value])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader writing `color = ubo.tint * ubo.scale` from uniform
/// block `Globals` at set 0, binding 0.
#[allow(dead_code)]
pub fn uniform_block_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    let (float, vec4, int, globals) = (b.id(), b.id(), b.id(), b.id());
    let (ptr_ubo, ptr_u_vec4, ptr_u_float, ptr_out) = (b.id(), b.id(), b.id(), b.id());
    let (c0, c1) = (b.id(), b.id());
    let (ubo, color) = (b.id(), b.id());
    let (tint_ptr, tint, scale_ptr, scale, product) = (b.id(), b.id(), b.id(), b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(globals, "Globals")
        .member_name(globals, 0, "tint")
        .member_name(globals, 1, "scale")
        .name(ubo, "ubo")
        .name(color, "color");
    b.decorate(globals, Decoration::Block, &[])
        .member_decorate(globals, 0, Decoration::Offset, &[0])
        .member_decorate(globals, 1, Decoration::Offset, &[16])
        .decorate(ubo, Decoration::DescriptorSet, &[0])
        .decorate(ubo, Decoration::Binding, &[0])
        .decorate(color, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeVector, &[vec4, float, 4])
        .op(Op::TypeInt, &[int, 32, 1])
        .op(Op::TypeStruct, &[globals, vec4, float])
        .op(Op::TypePointer, &[ptr_ubo, StorageClass::Uniform as u32, globals])
        .op(Op::TypePointer, &[ptr_u_vec4, StorageClass::Uniform as u32, vec4])
        .op(Op::TypePointer, &[ptr_u_float, StorageClass::Uniform as u32, float])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, vec4])
        .op(Op::Constant, &[int, c0, 0])
        .op(Op::Constant, &[int, c1, 1])
        .op(Op::Variable, &[ptr_ubo, ubo, StorageClass::Uniform as u32])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[label])
        .op(Op::AccessChain, &[ptr_u_vec4, tint_ptr, ubo, c0])
        .op(Op::Load, &[vec4, tint, tint_ptr])
        .op(Op::AccessChain, &[ptr_u_float, scale_ptr, ubo, c1])
        .op(Op::Load, &[float, scale, scale_ptr])
        .op(Op::VectorTimesScalar, &[vec4, product, tint, scale])
        .op(Op::Store, &[color, product])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Vertex shader writing `gl_Position = pc.mvp * pos` with `mvp` held in
/// push constant block `PushConsts`.
#[allow(dead_code)]
pub fn push_constant_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    let (float, vec4, mat4, int, block) = (b.id(), b.id(), b.id(), b.id(), b.id());
    let (ptr_pc, ptr_pc_mat4, ptr_in, ptr_out) = (b.id(), b.id(), b.id(), b.id());
    let c0 = b.id();
    let (pc, pos, gl_pos) = (b.id(), b.id(), b.id());
    let (mvp_ptr, mvp, p, product) = (b.id(), b.id(), b.id(), b.id());

    b.shader(ExecutionModel::Vertex, main, &[pos, gl_pos]);
    b.name(block, "PushConsts")
        .member_name(block, 0, "mvp")
        .name(pc, "pc")
        .name(pos, "pos")
        .name(gl_pos, "gl_Position");
    b.decorate(block, Decoration::Block, &[])
        .member_decorate(block, 0, Decoration::ColMajor, &[])
        .member_decorate(block, 0, Decoration::Offset, &[0])
        .member_decorate(block, 0, Decoration::MatrixStride, &[16])
        .decorate(pos, Decoration::Location, &[0])
        .decorate(gl_pos, Decoration::BuiltIn, &[spirv::BuiltIn::Position as u32]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeVector, &[vec4, float, 4])
        .op(Op::TypeMatrix, &[mat4, vec4, 4])
        .op(Op::TypeInt, &[int, 32, 1])
        .op(Op::TypeStruct, &[block, mat4])
        .op(Op::TypePointer, &[ptr_pc, StorageClass::PushConstant as u32, block])
        .op(Op::TypePointer, &[ptr_pc_mat4, StorageClass::PushConstant as u32, mat4])
        .op(Op::TypePointer, &[ptr_in, StorageClass::Input as u32, vec4])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, vec4])
        .op(Op::Constant, &[int, c0, 0])
        .op(Op::Variable, &[ptr_pc, pc, StorageClass::PushConstant as u32])
        .op(Op::Variable, &[ptr_in, pos, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_out, gl_pos, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[label])
        .op(Op::AccessChain, &[ptr_pc_mat4, mvp_ptr, pc, c0])
        .op(Op::Load, &[mat4, mvp, mvp_ptr])
        .op(Op::Load, &[vec4, p, pos])
        .op(Op::MatrixTimesVector, &[vec4, product, mvp, p])
        .op(Op::Store, &[gl_pos, product])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader switching on flat input `sel`: case 0 and case 1 feed
/// φ `shade` 1.0 and 2.0, and the default edge goes straight to the merge
/// with 0.0.
#[allow(dead_code)]
pub fn switch_phi_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main) = (b.id(), b.id(), b.id());
    let (entry, case0, case1, merge) = (b.id(), b.id(), b.id(), b.id());
    let (int, float) = (b.id(), b.id());
    let (ptr_in, ptr_out) = (b.id(), b.id());
    let (zero, one, two) = (b.id(), b.id(), b.id());
    let (sel, color) = (b.id(), b.id());
    let (selector, shade) = (b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[sel, color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(sel, "sel").name(color, "color").name(shade, "shade");
    b.decorate(sel, Decoration::Location, &[0])
        .decorate(sel, Decoration::Flat, &[])
        .decorate(color, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeInt, &[int, 32, 1])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypePointer, &[ptr_in, StorageClass::Input as u32, int])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, float]);
    b.constant_f32(float, zero, 0.0)
        .constant_f32(float, one, 1.0)
        .constant_f32(float, two, 2.0);
    b.op(Op::Variable, &[ptr_in, sel, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[entry])
        .op(Op::Load, &[int, selector, sel])
        .op(Op::SelectionMerge, &[merge, 0])
        .op(Op::Switch, &[selector, merge, 0, case0, 1, case1])
        .op(Op::Label, &[case0])
        .op(Op::Branch, &[merge])
        .op(Op::Label, &[case1])
        .op(Op::Branch, &[merge])
        .op(Op::Label, &[merge])
        .op(Op::Phi, &[float, shade, one, case0, two, case1, zero, entry])
        .op(Op::Store, &[color, shade])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader counting `i` up to 10 in a loop whose continue block
/// holds the exit test, the shape of a `do { } while` loop.
#[allow(dead_code)]
pub fn do_while_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main) = (b.id(), b.id(), b.id());
    let (entry, header, body, cont, merge) = (b.id(), b.id(), b.id(), b.id(), b.id());
    let (int, boolean, float) = (b.id(), b.id(), b.id());
    let (ptr_fn, ptr_out) = (b.id(), b.id());
    let (c0, c1, c10) = (b.id(), b.id(), b.id());
    let (i, result) = (b.id(), b.id());
    let (iv, inc, i2, lt, i3, f) = (b.id(), b.id(), b.id(), b.id(), b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[result]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(i, "i").name(result, "result");
    b.decorate(result, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeInt, &[int, 32, 1])
        .op(Op::TypeBool, &[boolean])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypePointer, &[ptr_fn, StorageClass::Function as u32, int])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, float])
        .op(Op::Constant, &[int, c0, 0])
        .op(Op::Constant, &[int, c1, 1])
        .op(Op::Constant, &[int, c10, 10])
        .op(Op::Variable, &[ptr_out, result, StorageClass::Output as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[entry])
        .op(Op::Variable, &[ptr_fn, i, StorageClass::Function as u32])
        .op(Op::Store, &[i, c0])
        .op(Op::Branch, &[header])
        .op(Op::Label, &[header])
        .op(Op::LoopMerge, &[merge, cont, 0])
        .op(Op::Branch, &[body])
        .op(Op::Label, &[body])
        .op(Op::Load, &[int, iv, i])
        .op(Op::IAdd, &[int, inc, iv, c1])
        .op(Op::Store, &[i, inc])
        .op(Op::Branch, &[cont])
        .op(Op::Label, &[cont])
        .op(Op::Load, &[int, i2, i])
        .op(Op::SLessThan, &[boolean, lt, i2, c10])
        .op(Op::BranchConditional, &[lt, header, merge])
        .op(Op::Label, &[merge])
        .op(Op::Load, &[int, i3, i])
        .op(Op::ConvertSToF, &[float, f, i3])
        .op(Op::Store, &[result, f])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader passing image `tex` and sampler `s1` to helper
/// `shade_tex(t, s, coord)`, which pairs them and samples at `coord`.
#[allow(dead_code)]
pub fn sampler_parameter_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, helper_ty, main, helper) = (b.id(), b.id(), b.id(), b.id(), b.id());
    let (main_label, helper_label) = (b.id(), b.id());
    let (float, vec2, vec4) = (b.id(), b.id(), b.id());
    let (image_t, sampler_t, sampled_t) = (b.id(), b.id(), b.id());
    let (ptr_image, ptr_sampler, ptr_in, ptr_out) = (b.id(), b.id(), b.id(), b.id());
    let (tex, s1, uv, color) = (b.id(), b.id(), b.id(), b.id());
    let (t, s, coord) = (b.id(), b.id(), b.id());
    let (ti, si, combined, sample) = (b.id(), b.id(), b.id(), b.id());
    let (uvv, result) = (b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[uv, color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(tex, "tex")
        .name(s1, "s1")
        .name(uv, "uv")
        .name(color, "color")
        .name(helper, "shade_tex")
        .name(t, "t")
        .name(s, "s")
        .name(coord, "coord");
    b.decorate(tex, Decoration::DescriptorSet, &[0])
        .decorate(tex, Decoration::Binding, &[0])
        .decorate(s1, Decoration::DescriptorSet, &[0])
        .decorate(s1, Decoration::Binding, &[1])
        .decorate(uv, Decoration::Location, &[0])
        .decorate(color, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeVector, &[vec2, float, 2])
        .op(Op::TypeVector, &[vec4, float, 4])
        .op(
            Op::TypeImage,
            &[image_t, float, spirv::Dim::Dim2D as u32, 0, 0, 0, 1, 0],
        )
        .op(Op::TypeSampler, &[sampler_t])
        .op(Op::TypeSampledImage, &[sampled_t, image_t])
        .op(Op::TypePointer, &[ptr_image, StorageClass::UniformConstant as u32, image_t])
        .op(Op::TypePointer, &[ptr_sampler, StorageClass::UniformConstant as u32, sampler_t])
        .op(Op::TypePointer, &[ptr_in, StorageClass::Input as u32, vec2])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, vec4])
        .op(Op::TypeFunction, &[helper_ty, vec4, ptr_image, ptr_sampler, vec2])
        .op(Op::Variable, &[ptr_image, tex, StorageClass::UniformConstant as u32])
        .op(Op::Variable, &[ptr_sampler, s1, StorageClass::UniformConstant as u32])
        .op(Op::Variable, &[ptr_in, uv, StorageClass::Input as u32])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32]);

    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[main_label])
        .op(Op::Load, &[vec2, uvv, uv])
        .op(Op::FunctionCall, &[vec4, result, helper, tex, s1, uvv])
        .op(Op::Store, &[color, result])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);

    b.op(Op::Function, &[vec4, helper, 0, helper_ty])
        .op(Op::FunctionParameter, &[ptr_image, t])
        .op(Op::FunctionParameter, &[ptr_sampler, s])
        .op(Op::FunctionParameter, &[vec2, coord])
        .op(Op::Label, &[helper_label])
        .op(Op::Load, &[image_t, ti, t])
        .op(Op::Load, &[sampler_t, si, s])
        .op(Op::SampledImage, &[sampled_t, combined, ti, si])
        .op(Op::ImageSampleImplicitLod, &[vec4, sample, combined, coord])
        .op(Op::ReturnValue, &[sample])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Compute shader reading shared `counter`, hitting a workgroup barrier,
/// then storing the value read plus one back into `counter`.
#[allow(dead_code)]
pub fn barrier_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, label) = (b.id(), b.id(), b.id(), b.id());
    let (float, uint, ptr_shared) = (b.id(), b.id(), b.id());
    let (one, scope, semantics) = (b.id(), b.id(), b.id());
    let counter = b.id();
    let (v, sum) = (b.id(), b.id());

    b.shader(ExecutionModel::GLCompute, main, &[]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::LocalSize as u32, 64, 1, 1],
    );
    b.name(counter, "counter");
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypeInt, &[uint, 32, 0])
        .op(Op::TypePointer, &[ptr_shared, StorageClass::Workgroup as u32, float]);
    b.constant_f32(float, one, 1.0)
        .op(Op::Constant, &[uint, scope, 2])
        .op(Op::Constant, &[uint, semantics, 0x100])
        .op(Op::Variable, &[ptr_shared, counter, StorageClass::Workgroup as u32]);
    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[label])
        .op(Op::Load, &[float, v, counter])
        .op(Op::ControlBarrier, &[scope, scope, semantics])
        .op(Op::FAdd, &[float, sum, v, one])
        .op(Op::Store, &[counter, sum])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}

/// Fragment shader reading private `g`, calling `bump()` which overwrites
/// `g`, then writing the value read before the call to `color`.
#[allow(dead_code)]
pub fn call_invalidation_module() -> Vec<u32> {
    let mut b = SpvBuilder::new();
    let (void, fnty, main, bump) = (b.id(), b.id(), b.id(), b.id());
    let (main_label, bump_label) = (b.id(), b.id());
    let (float, ptr_private, ptr_out) = (b.id(), b.id(), b.id());
    let two = b.id();
    let (g, color) = (b.id(), b.id());
    let (v, call) = (b.id(), b.id());

    b.shader(ExecutionModel::Fragment, main, &[color]);
    b.op(
        Op::ExecutionMode,
        &[main, spirv::ExecutionMode::OriginUpperLeft as u32],
    );
    b.name(g, "g").name(color, "color").name(bump, "bump");
    b.decorate(color, Decoration::Location, &[0]);
    b.op(Op::TypeVoid, &[void])
        .op(Op::TypeFunction, &[fnty, void])
        .op(Op::TypeFloat, &[float, 32])
        .op(Op::TypePointer, &[ptr_private, StorageClass::Private as u32, float])
        .op(Op::TypePointer, &[ptr_out, StorageClass::Output as u32, float]);
    b.constant_f32(float, two, 2.0)
        .op(Op::Variable, &[ptr_private, g, StorageClass::Private as u32])
        .op(Op::Variable, &[ptr_out, color, StorageClass::Output as u32]);

    b.op(Op::Function, &[void, main, 0, fnty])
        .op(Op::Label, &[main_label])
        .op(Op::Load, &[float, v, g])
        .op(Op::FunctionCall, &[void, call, bump])
        .op(Op::Store, &[color, v])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);

    b.op(Op::Function, &[void, bump, 0, fnty])
        .op(Op::Label, &[bump_label])
        .op(Op::Store, &[g, two])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    b.words()
}
