//! Type spelling, qualifiers and declarations.

use spirv::{BuiltIn, Decoration, Dim, ExecutionModel, StorageClass};
use spvx_ir::{BaseType, Flags64, Id, Parameter, Type, Variable};

use super::{Dialect, Emitter};
use crate::BackendError;
use crate::options::Precision;

fn flag(decoration: Decoration) -> u32 {
    decoration as u32
}

impl<D: Dialect> Emitter<'_, D> {
    /// Spells `ty` through the dialect.
    pub fn type_to_glsl(&mut self, ty: &Type) -> Result<String, BackendError> {
        D::type_to_glsl(self, ty)
    }

    /// The type declared at `id`.
    pub fn type_of(&self, id: Id) -> Result<Type, BackendError> {
        Ok(self.module.get::<Type>(id)?.clone())
    }

    /// The type of the value `id` evaluates to.
    pub fn expression_type(&self, id: Id) -> Result<Type, BackendError> {
        Ok(self.module.expression_type(id)?.clone())
    }

    /// Spells scalars, vectors, matrices, structs and opaque types.
    pub fn default_type_to_glsl(&mut self, ty: &Type) -> Result<String, BackendError> {
        match ty.basetype {
            BaseType::Struct => {
                let name = self.to_name(ty.self_id);
                return Ok(if self.traits.explicit_struct_type {
                    format!("struct {name}")
                } else {
                    name
                });
            }
            BaseType::Image | BaseType::SampledImage => return D::image_type(self, ty),
            BaseType::Sampler => return Ok("sampler".into()),
            BaseType::Void => return Ok("void".into()),
            _ => {}
        }

        let prefix = |vector: bool| -> Option<&'static str> {
            Some(match ty.basetype {
                BaseType::Boolean => "b",
                BaseType::Int => "i",
                BaseType::UInt => "u",
                BaseType::Float => "",
                BaseType::Double => "d",
                BaseType::Int64 if vector => "i64",
                BaseType::UInt64 if vector => "u64",
                _ => return None,
            })
        };

        let spelled = if ty.is_scalar() {
            match ty.basetype {
                BaseType::Boolean => "bool".to_string(),
                BaseType::Int => self.traits.basic_int_type.to_string(),
                BaseType::UInt => self.traits.basic_uint_type.to_string(),
                BaseType::AtomicCounter => "atomic_uint".to_string(),
                BaseType::Float => "float".to_string(),
                BaseType::Double => "double".to_string(),
                BaseType::Int64 => "int64_t".to_string(),
                BaseType::UInt64 => "uint64_t".to_string(),
                _ => "???".to_string(),
            }
        } else if ty.is_vector() {
            match prefix(true) {
                Some(p) => format!("{p}vec{}", ty.vecsize),
                None => "???".to_string(),
            }
        } else if ty.vecsize == ty.columns {
            match prefix(false) {
                Some(p) => format!("{p}mat{}", ty.vecsize),
                None => "???".to_string(),
            }
        } else {
            match prefix(false) {
                Some(p) => format!("{p}mat{}x{}", ty.columns, ty.vecsize),
                None => "???".to_string(),
            }
        };
        Ok(spelled)
    }

    /// Spells an image, sampler or combined image type in GLSL.
    pub fn default_image_type(&mut self, ty: &Type) -> Result<String, BackendError> {
        let sampled = self.module.get::<Type>(ty.image.sampled_type)?.basetype;
        let mut res = String::from(match sampled {
            BaseType::Int => "i",
            BaseType::UInt => "u",
            _ => "",
        });

        if ty.basetype == BaseType::Image && ty.image.dim == Dim::DimSubpassData && self.options.vulkan_semantics {
            res.push_str("subpassInput");
            if ty.image.ms {
                res.push_str("MS");
            }
            return Ok(res);
        }

        if ty.basetype == BaseType::Image && ty.image.dim != Dim::DimSubpassData {
            res.push_str(if ty.image.sampled == 2 { "image" } else { "texture" });
        } else {
            res.push_str("sampler");
        }

        match ty.image.dim {
            Dim::Dim1D => res.push_str("1D"),
            Dim::Dim2D | Dim::DimSubpassData => res.push_str("2D"),
            Dim::Dim3D => res.push_str("3D"),
            Dim::DimCube => res.push_str("Cube"),
            Dim::DimBuffer => {
                if self.es && self.version < 320 {
                    self.require_extension("GL_OES_texture_buffer");
                } else if !self.es && self.version < 300 {
                    self.require_extension("GL_EXT_texture_buffer_object");
                }
                res.push_str("Buffer");
            }
            other => {
                return Err(BackendError::Unsupported(format!(
                    "image dimension {other:?}; only 1D, 2D, 3D, Cube, Buffer and subpass inputs are supported"
                )));
            }
        }

        if ty.image.ms {
            res.push_str("MS");
        }
        if ty.image.arrayed {
            if self.is_legacy_desktop() {
                self.require_extension("GL_EXT_texture_array");
            }
            res.push_str("Array");
        }
        if ty.image.depth {
            res.push_str("Shadow");
        }
        Ok(res)
    }

    /// The type spelled for a constructor call, with `[]` per array dimension.
    pub fn type_to_glsl_constructor(&mut self, ty: &Type) -> Result<String, BackendError> {
        let mut spelled = self.type_to_glsl(ty)?;
        for _ in &ty.array {
            spelled.push_str("[]");
        }
        Ok(spelled)
    }

    /// Size of array dimension `index`; empty for a runtime array.
    pub fn to_array_size(&mut self, ty: &Type, index: usize) -> Result<String, BackendError> {
        let size = ty.array[index];
        if !ty.array_size_literal.get(index).copied().unwrap_or(true) {
            self.to_expression(Id::new(size))
        } else if size != 0 {
            Ok(size.to_string())
        } else if !self.traits.flexible_member_array_supported {
            // Runtime arrays end their block, so one element stands in.
            Ok("1".into())
        } else {
            Ok(String::new())
        }
    }

    /// Array suffix of a declaration, outermost dimension first.
    pub fn type_to_array_glsl(&mut self, ty: &Type) -> Result<String, BackendError> {
        let mut res = String::new();
        for index in (0..ty.array.len()).rev() {
            res.push('[');
            res.push_str(&self.to_array_size(ty, index)?);
            res.push(']');
        }
        Ok(res)
    }

    /// Size of array dimension `index`, which must be a literal.
    pub fn to_array_size_literal(&self, ty: &Type, index: usize) -> Result<u32, BackendError> {
        if !ty.array_size_literal.get(index).copied().unwrap_or(false) {
            return Err(BackendError::Unsupported(
                "array size is a specialization constant, not a literal".into(),
            ));
        }
        Ok(ty.array[index])
    }

    /// Declares `name` as `ty`, array suffix included.
    pub fn variable_decl_typed(&mut self, ty: &Type, name: &str) -> Result<String, BackendError> {
        let spelled = self.type_to_glsl(ty)?;
        let array = self.type_to_array_glsl(ty)?;
        Ok(format!("{spelled} {name}{array}"))
    }

    /// Full declaration of a variable, including any initializer.
    pub fn variable_decl(&mut self, var: &Variable) -> Result<String, BackendError> {
        let ty = self.type_of(var.basetype)?;
        let qualifiers = self.to_qualifiers(var.self_id)?;
        let name = self.to_name(var.self_id);
        let mut res = format!("{qualifiers}{}", self.variable_decl_typed(&ty, &name)?);
        if var.loop_variable {
            if let Some(init) = var.static_expression {
                res.push_str(" = ");
                res.push_str(&self.to_expression(init)?);
            }
        } else if let Some(init) = var.initializer {
            res.push_str(" = ");
            res.push_str(&self.to_expression(init)?);
        }
        Ok(res)
    }

    /// Interpolation keywords for `flags`, each followed by a space.
    pub fn to_interpolation_qualifiers(&self, flags: Flags64) -> String {
        let mut res = String::new();
        for (decoration, keyword) in [
            (Decoration::Flat, "flat "),
            (Decoration::NoPerspective, "noperspective "),
            (Decoration::Centroid, "centroid "),
            (Decoration::Patch, "patch "),
            (Decoration::Sample, "sample "),
            (Decoration::Invariant, "invariant "),
        ] {
            if flags.contains(flag(decoration)) {
                res.push_str(keyword);
            }
        }
        res
    }

    /// ES precision qualifier for a value of `ty`, omitted when it matches
    /// the stage default.
    pub fn flags_to_precision(&self, ty: &Type, flags: Flags64) -> Result<&'static str, BackendError> {
        if !self.es {
            return Ok("");
        }
        if !matches!(
            ty.basetype,
            BaseType::Float
                | BaseType::Int
                | BaseType::UInt
                | BaseType::Image
                | BaseType::SampledImage
                | BaseType::Sampler
        ) {
            return Ok("");
        }

        let fragment = self.execution_model()? == ExecutionModel::Fragment;
        let is_float = ty.basetype == BaseType::Float;
        let is_int = matches!(ty.basetype, BaseType::Int | BaseType::UInt);
        let defaults = &self.options.fragment;

        if flags.contains(flag(Decoration::RelaxedPrecision)) {
            let implied = fragment
                && ((is_float && defaults.default_float_precision == Precision::Mediump)
                    || (is_int && defaults.default_int_precision == Precision::Mediump));
            Ok(if implied { "" } else { "mediump " })
        } else {
            let implied_f = is_float && (!fragment || defaults.default_float_precision == Precision::Highp);
            let implied_i = is_int && (!fragment || defaults.default_int_precision == Precision::Highp);
            Ok(if implied_f || implied_i { "" } else { "highp " })
        }
    }

    /// Precision keyword for the value `id`, or nothing outside ES.
    pub fn to_precision_qualifiers(&self, id: Id) -> Result<&'static str, BackendError> {
        let ty = self.module.expression_type(id)?;
        self.flags_to_precision(ty, self.module.decoration_flags(id))
    }

    /// Storage, precision, interpolation and memory qualifiers of `id`.
    pub fn to_qualifiers(&self, id: Id) -> Result<String, BackendError> {
        let flags = self.module.decoration_flags(id);
        let mut res = String::new();

        if self
            .module
            .maybe_get::<Variable>(id)
            .is_some_and(|v| v.storage == StorageClass::Workgroup)
            && !self.traits.shared_is_implied
        {
            res.push_str("shared ");
        }

        res.push_str(self.to_precision_qualifiers(id)?);
        res.push_str(&self.to_interpolation_qualifiers(flags));

        let ty = self.module.expression_type(id)?;
        if ty.image.dim != Dim::DimSubpassData && ty.image.sampled == 2 {
            if flags.contains(flag(Decoration::NonWritable)) {
                res.push_str("readonly ");
            }
            if flags.contains(flag(Decoration::NonReadable)) {
                res.push_str("writeonly ");
            }
        }
        Ok(res)
    }

    /// Declares a parameter with its `in`, `out` or `inout` direction.
    pub fn default_argument_decl(&mut self, arg: &Parameter) -> Result<String, BackendError> {
        let ty = self.expression_type(arg.id)?;
        let direction = if ty.pointer && arg.write_count > 0 {
            if arg.read_count > 0 { "inout " } else { "out " }
        } else {
            ""
        };
        let qualifiers = self.to_qualifiers(arg.id)?;
        let name = self.to_name(arg.id);
        Ok(format!("{direction}{qualifiers}{}", self.variable_decl_typed(&ty, &name)?))
    }

    /// Whether `ty` is an interface block.
    pub fn is_block(&self, ty: &Type) -> bool {
        let flags = self.module.decoration_flags(ty.self_id);
        flags.contains(flag(Decoration::Block)) || flags.contains(flag(Decoration::BufferBlock))
    }

    /// Decorations of member `index` together with those of every member
    /// nested inside it.
    pub fn combined_decoration_for_member(&self, ty: &Type, index: u32) -> Result<Flags64, BackendError> {
        let Some(member) = self.module.meta(ty.self_id).member(index) else {
            return Ok(Flags64::empty());
        };
        let mut bits = member.flags.bits();
        let Some(&member_type) = ty.member_types.get(index as usize) else {
            return Ok(Flags64::from_bits(bits));
        };
        let member_type = self.module.get::<Type>(member_type)?;
        for i in 0..member_type.member_types.len() as u32 {
            bits |= self.combined_decoration_for_member(member_type, i)?.bits();
        }
        Ok(Flags64::from_bits(bits))
    }

    /// `layout()` of a block member. Struct-level matrix layouts are hoisted
    /// onto the block member that contains them.
    pub fn layout_for_member(&self, ty: &Type, index: u32) -> Result<String, BackendError> {
        if !self.is_block(ty) {
            return Ok(String::new());
        }
        let Some(dec) = self.module.meta(ty.self_id).member(index) else {
            return Ok(String::new());
        };

        let mut attr = Vec::new();
        if self
            .combined_decoration_for_member(ty, index)?
            .contains(flag(Decoration::RowMajor))
        {
            attr.push("row_major".to_string());
        }
        if dec.has(Decoration::Location) {
            attr.push(format!("location = {}", dec.location));
        }
        if attr.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("layout({}) ", attr.join(", ")))
        }
    }

    /// Name of member `index` of struct `ty`.
    pub fn to_member_name(&self, ty: &Type, index: u32) -> String {
        let alias = self.module.member_name(ty.self_id, index);
        if alias.is_empty() {
            format!("_{index}")
        } else {
            alias.to_string()
        }
    }

    /// Declares member `index` of `ty` through the dialect.
    pub fn member_decl(&mut self, ty: &Type, index: u32) -> Result<String, BackendError> {
        D::member_decl(self, ty, index)
    }

    /// Declares a struct member with its qualifiers.
    pub fn default_member_decl(&mut self, ty: &Type, index: u32) -> Result<String, BackendError> {
        let member_type = self.member_type(ty, index)?;
        let flags = self.module.member_decoration_flags(ty.self_id, index);
        let interpolation = if self.is_block(ty) {
            self.to_interpolation_qualifiers(flags)
        } else {
            String::new()
        };
        let layout = self.layout_for_member(ty, index)?;
        let precision = self.flags_to_precision(&member_type, flags)?;
        let name = self.to_member_name(ty, index);
        Ok(format!(
            "{layout}{precision}{interpolation}{}",
            self.variable_decl_typed(&member_type, &name)?
        ))
    }

    /// Type of member `index` of `ty`.
    pub fn member_type(&self, ty: &Type, index: u32) -> Result<Type, BackendError> {
        let id = ty.member_types.get(index as usize).copied().ok_or_else(|| {
            BackendError::Internal(format!("struct {} has no member {index}", ty.self_id))
        })?;
        self.type_of(id)
    }

    /// Declares a plain struct type. Aliased duplicates are skipped.
    pub fn emit_struct(&mut self, ty: &Type) -> Result<(), BackendError> {
        if ty.type_alias.is_some() {
            return Ok(());
        }
        self.add_resource_name(ty.self_id);
        let name = self.type_to_glsl(ty)?;
        if self.traits.explicit_struct_type {
            self.statement(&name);
        } else {
            self.statement(&format!("struct {name}"));
        }
        self.begin_scope();

        let mut member_names = std::collections::HashSet::new();
        for index in 0..ty.member_types.len() as u32 {
            self.add_member_name(ty.self_id, index, &mut member_names);
            let decl = self.member_decl(ty, index)?;
            self.statement(&format!("{decl};"));
        }
        self.end_scope_decl("")?;
        if !ty.member_types.is_empty() {
            self.statement("");
        }
        Ok(())
    }

    /// Spells `builtin` through the dialect.
    pub fn builtin_to_glsl(&mut self, builtin: BuiltIn) -> Result<String, BackendError> {
        D::builtin_to_glsl(self, builtin)
    }

    /// The `gl_*` name of a builtin, emulating what the language lacks.
    pub fn default_builtin_to_glsl(&mut self, builtin: BuiltIn) -> Result<String, BackendError> {
        let vulkan = self.options.vulkan_semantics;
        let name = match builtin {
            BuiltIn::Position => "gl_Position",
            BuiltIn::PointSize => "gl_PointSize",
            BuiltIn::VertexId | BuiltIn::InstanceId if vulkan => {
                return Err(BackendError::Unsupported(format!(
                    "{builtin:?} has no Vulkan GLSL spelling; the shader was created with GL semantics"
                )));
            }
            BuiltIn::VertexId => "gl_VertexID",
            BuiltIn::InstanceId => "gl_InstanceID",
            BuiltIn::VertexIndex if vulkan => "gl_VertexIndex",
            // gl_VertexID already includes the base vertex.
            BuiltIn::VertexIndex => "gl_VertexID",
            BuiltIn::InstanceIndex if vulkan => "gl_InstanceIndex",
            BuiltIn::InstanceIndex => "(gl_InstanceID + spvx_BaseInstance)",
            BuiltIn::PrimitiveId => "gl_PrimitiveID",
            BuiltIn::InvocationId => "gl_InvocationID",
            BuiltIn::Layer => "gl_Layer",
            BuiltIn::TessLevelOuter => "gl_TessLevelOuter",
            BuiltIn::TessLevelInner => "gl_TessLevelInner",
            BuiltIn::TessCoord => "gl_TessCoord",
            BuiltIn::FragCoord => "gl_FragCoord",
            BuiltIn::PointCoord => "gl_PointCoord",
            BuiltIn::FrontFacing => "gl_FrontFacing",
            BuiltIn::FragDepth => "gl_FragDepth",
            BuiltIn::NumWorkgroups => "gl_NumWorkGroups",
            BuiltIn::WorkgroupSize => "gl_WorkGroupSize",
            BuiltIn::WorkgroupId => "gl_WorkGroupID",
            BuiltIn::LocalInvocationId => "gl_LocalInvocationID",
            BuiltIn::GlobalInvocationId => "gl_GlobalInvocationID",
            BuiltIn::LocalInvocationIndex => "gl_LocalInvocationIndex",
            BuiltIn::SampleId => "gl_SampleID",
            BuiltIn::SamplePosition => "gl_SamplePosition",
            BuiltIn::SampleMask => "gl_SampleMask",
            BuiltIn::ClipDistance => "gl_ClipDistance",
            BuiltIn::CullDistance => "gl_CullDistance",
            _ => "gl_???",
        };
        Ok(name.to_string())
    }

    /// Whether a value read from `id` is a row-major matrix this target
    /// has to transpose.
    pub fn is_non_native_row_major_matrix(&self, id: Id) -> Result<bool, BackendError> {
        if self.traits.native_row_major_matrix
            || !self
                .module
                .decoration_flags(id)
                .contains(flag(Decoration::RowMajor))
        {
            return Ok(false);
        }
        let ty = self.module.expression_type(id)?;
        if ty.columns != ty.vecsize {
            return Err(BackendError::Unsupported(
                "row-major matrices must be square on this target".into(),
            ));
        }
        Ok(true)
    }

    /// Whether member `index` is a row-major matrix that needs a transpose
    /// on load.
    pub fn member_is_non_native_row_major_matrix(&self, ty: &Type, index: u32) -> Result<bool, BackendError> {
        if self.traits.native_row_major_matrix
            || !self
                .combined_decoration_for_member(ty, index)?
                .contains(flag(Decoration::RowMajor))
        {
            return Ok(false);
        }
        let member = self.member_type(ty, index)?;
        if member.columns != member.vecsize {
            return Err(BackendError::Unsupported(
                "row-major matrices must be square on this target".into(),
            ));
        }
        Ok(true)
    }

    /// Transposes a row-major matrix expression.
    pub fn convert_row_major_matrix(&self, expr: &str) -> String {
        format!("transpose({})", strip_enclosed(expr))
    }

    /// Names the bitcast from `input` to `output` through the dialect.
    pub fn bitcast_glsl_op(&mut self, output: &Type, input: &Type) -> Result<String, BackendError> {
        D::bitcast_glsl_op(self, output, input)
    }

    /// Names the GLSL bit reinterpretation builtin, or an empty string when
    /// no cast is needed.
    pub fn default_bitcast_glsl_op(&mut self, output: &Type, input: &Type) -> Result<String, BackendError> {
        use BaseType::*;
        let name = match (output.basetype, input.basetype) {
            (UInt, Int) | (UInt64, Int64) | (Int, UInt) | (Int64, UInt64) => {
                return self.type_to_glsl(output);
            }
            (UInt, Float) => "floatBitsToUint",
            (Int, Float) => "floatBitsToInt",
            (Float, UInt) => "uintBitsToFloat",
            (Float, Int) => "intBitsToFloat",
            (Int64, Double) => "doubleBitsToInt64",
            (UInt64, Double) => "doubleBitsToUint64",
            (Double, Int64) => "int64BitsToDouble",
            (Double, UInt64) => "uint64BitsToDouble",
            _ => "",
        };
        Ok(name.to_string())
    }

    /// `argument` reinterpreted as `result`, or the bare operand when no
    /// cast is needed.
    pub fn bitcast_glsl(&mut self, result: &Type, argument: Id) -> Result<String, BackendError> {
        let input = self.expression_type(argument)?;
        let op = self.bitcast_glsl_op(result, &input)?;
        if op.is_empty() {
            self.to_enclosed_expression(argument)
        } else {
            Ok(format!("{op}({})", self.to_expression(argument)?))
        }
    }
}

/// Removes one pair of parentheses that encloses the whole expression.
pub fn strip_enclosed(expr: &str) -> &str {
    let bytes = expr.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'(' || bytes[bytes.len() - 1] != b')' {
        return expr;
    }
    let mut depth = 0i32;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 && i != bytes.len() - 1 {
                    return expr;
                }
            }
            _ => {}
        }
    }
    &expr[1..expr.len() - 1]
}

#[cfg(test)]
mod tests {
    use spirv::StorageClass;
    use spvx_ir::{BaseType, Module};

    use super::*;
    use crate::emit::testing::{pointer, scalar, variable, vector, with_emitter};

    #[test]
    fn scalar_vector_and_matrix_names() {
        let mut module = Module::with_bound(16);
        let f = scalar(&mut module, 1, BaseType::Float);
        let v4 = vector(&mut module, 2, f, 4);
        let i = scalar(&mut module, 3, BaseType::Int);
        let iv2 = vector(&mut module, 4, i, 2);
        let mut m3x4 = module.get::<Type>(v4).unwrap().clone();
        m3x4.columns = 3;
        let mut m4 = m3x4.clone();
        m4.columns = 4;

        with_emitter(module, |em| {
            let float = em.type_of(f).unwrap();
            assert_eq!(em.type_to_glsl(&float).unwrap(), "float");
            let vec4 = em.type_of(v4).unwrap();
            assert_eq!(em.type_to_glsl(&vec4).unwrap(), "vec4");
            let ivec2 = em.type_of(iv2).unwrap();
            assert_eq!(em.type_to_glsl(&ivec2).unwrap(), "ivec2");
            assert_eq!(em.type_to_glsl(&m4).unwrap(), "mat4");
            assert_eq!(em.type_to_glsl(&m3x4).unwrap(), "mat3x4");
        });
    }

    #[test]
    fn arrays_print_outermost_first() {
        let mut module = Module::with_bound(8);
        let f = scalar(&mut module, 1, BaseType::Float);
        let mut arr = module.get::<Type>(f).unwrap().clone();
        // float[2][3] in source order: the inner length is recorded first.
        arr.array = vec![3, 2];
        arr.array_size_literal = vec![true, true];
        with_emitter(module, |em| {
            assert_eq!(em.variable_decl_typed(&arr, "a").unwrap(), "float a[2][3]");
            assert_eq!(em.type_to_glsl_constructor(&arr).unwrap(), "float[][]");
        });
    }

    #[test]
    fn out_parameters_get_direction() {
        let mut module = Module::with_bound(8);
        let f = scalar(&mut module, 1, BaseType::Float);
        let ptr = pointer(&mut module, 2, f, StorageClass::Function);
        let p = variable(&mut module, 3, ptr, StorageClass::Function, "result");
        with_emitter(module, |em| {
            let mut arg = Parameter::new(ptr, p);
            assert_eq!(em.default_argument_decl(&arg).unwrap(), "float result");
            arg.write_count = 1;
            assert_eq!(em.default_argument_decl(&arg).unwrap(), "out float result");
            arg.read_count = 1;
            assert_eq!(em.default_argument_decl(&arg).unwrap(), "inout float result");
        });
    }

    #[test]
    fn interpolation_qualifiers_in_order() {
        with_emitter(Module::with_bound(1), |em| {
            let mut flags = Flags64::empty();
            flags.insert(Decoration::Centroid as u32);
            flags.insert(Decoration::Flat as u32);
            assert_eq!(em.to_interpolation_qualifiers(flags), "flat centroid ");
        });
    }

    #[test]
    fn bitcasts() {
        let mut module = Module::with_bound(8);
        let f = scalar(&mut module, 1, BaseType::Float);
        let u = scalar(&mut module, 2, BaseType::UInt);
        let i = scalar(&mut module, 3, BaseType::Int);
        with_emitter(module, |em| {
            let (f, u, i) = (em.type_of(f).unwrap(), em.type_of(u).unwrap(), em.type_of(i).unwrap());
            assert_eq!(em.bitcast_glsl_op(&u, &f).unwrap(), "floatBitsToUint");
            assert_eq!(em.bitcast_glsl_op(&u, &i).unwrap(), "uint");
            assert_eq!(em.bitcast_glsl_op(&f, &f).unwrap(), "");
        });
    }

    #[test]
    fn strip_only_fully_enclosing_parens() {
        assert_eq!(strip_enclosed("(a + b)"), "a + b");
        assert_eq!(strip_enclosed("(a) + (b)"), "(a) + (b)");
        assert_eq!(strip_enclosed("a"), "a");
    }
}
