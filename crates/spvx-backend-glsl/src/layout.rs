//! `layout()` qualifiers of global variables and std140/std430 inference.
//!
//! SPIR-V carries explicit offsets instead of a packing rule, so the rule is
//! recovered from them: a block is std430 unless one of its offsets or array
//! strides contradicts std430, in which case it is declared std140.

use spirv::{Decoration, ImageFormat, StorageClass};
use spvx_backend_core::BackendError;
use spvx_backend_core::emit::Emitter;
use spvx_ir::{BaseType, Flags64, Module, Type, Variable};

use crate::dialect::Glsl;

fn flag(decoration: Decoration) -> u32 {
    decoration as u32
}

fn align(value: u32, alignment: u32) -> u32 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

fn base_size(ty: &Type) -> u32 {
    match ty.basetype {
        BaseType::Double | BaseType::Int64 | BaseType::UInt64 => 8,
        _ => 4,
    }
}

/// std430 alignment of `ty` when declared with the member decorations `flags`.
pub fn std430_alignment(module: &Module, ty: &Type, flags: Flags64) -> Result<u32, BackendError> {
    let base = base_size(ty);

    if ty.basetype == BaseType::Struct {
        // Rule 9: the largest member alignment.
        let mut alignment = 0;
        for (index, &member) in ty.member_types.iter().enumerate() {
            let member_flags = module.member_decoration_flags(ty.self_id, index as u32);
            let member = module.get::<Type>(member)?;
            alignment = alignment.max(std430_alignment(module, member, member_flags)?);
        }
        return Ok(alignment);
    }

    if ty.vecsize == 1 && ty.columns == 1 {
        return Ok(base);
    }
    if ty.columns == 1 {
        return Ok(if ty.vecsize == 3 { 4 * base } else { ty.vecsize * base });
    }
    // Matrices are arrays of their columns, or of their rows when row-major.
    if flags.contains(flag(Decoration::RowMajor)) && ty.vecsize > 1 {
        return Ok(if ty.columns == 3 { 4 * base } else { ty.columns * base });
    }
    if ty.columns > 1 {
        return Ok(if ty.vecsize == 3 { 4 * base } else { ty.vecsize * base });
    }

    Err(BackendError::Unsupported(
        "no std430 alignment rule matches this type; the decorations are inconsistent".into(),
    ))
}

/// Element stride of the outermost dimension of an array type.
pub fn std430_array_stride(module: &Module, ty: &Type, flags: Flags64) -> Result<u32, BackendError> {
    let mut element = ty.clone();
    element.array.pop();
    element.array_size_literal.pop();
    let size = std430_size(module, &element, flags)?;
    let alignment = std430_alignment(module, &element, flags)?;
    Ok(align(size, alignment))
}

pub fn std430_size(module: &Module, ty: &Type, flags: Flags64) -> Result<u32, BackendError> {
    if let Some(&length) = ty.array.last() {
        let literal = ty.array_size_literal.last().copied().unwrap_or(true);
        if !literal {
            return Err(BackendError::Unsupported(
                "array sized by a specialization constant inside a buffer block".into(),
            ));
        }
        return Ok(length * std430_array_stride(module, ty, flags)?);
    }

    let base = base_size(ty);
    if ty.basetype == BaseType::Struct {
        let mut size = 0;
        let mut pad_alignment = 1;
        for (index, &member) in ty.member_types.iter().enumerate() {
            let member_flags = module.member_decoration_flags(ty.self_id, index as u32);
            let member = module.get::<Type>(member)?;
            let member_alignment = std430_alignment(module, member, member_flags)?;
            let alignment = member_alignment.max(pad_alignment);
            // A member following a struct is aligned to that struct's alignment.
            pad_alignment = if member.basetype == BaseType::Struct {
                member_alignment
            } else {
                1
            };
            size = align(size, alignment) + std430_size(module, member, member_flags)?;
        }
        return Ok(size);
    }

    if ty.columns == 1 {
        return Ok(ty.vecsize * base);
    }
    let row_major = flags.contains(flag(Decoration::RowMajor)) && ty.vecsize > 1;
    Ok(if row_major {
        ty.vecsize * if ty.columns == 3 { 4 } else { ty.columns } * base
    } else {
        ty.columns * if ty.vecsize == 3 { 4 } else { ty.vecsize } * base
    })
}

/// Whether the declared offsets and strides of `ty` follow std430.
pub fn is_std430_packing(module: &Module, ty: &Type) -> Result<bool, BackendError> {
    let mut offset = 0;
    let mut pad_alignment = 1;

    for (index, &member_id) in ty.member_types.iter().enumerate() {
        let index = index as u32;
        let member = module.get::<Type>(member_id)?;
        let member_flags = module.member_decoration_flags(ty.self_id, index);

        let member_alignment = std430_alignment(module, member, member_flags)?;
        offset = align(offset, member_alignment.max(pad_alignment));
        pad_alignment = if member.basetype == BaseType::Struct {
            member_alignment
        } else {
            1
        };

        if module.member_decoration(ty.self_id, index, Decoration::Offset) != offset {
            return Ok(false);
        }
        if !member.array.is_empty()
            && std430_array_stride(module, member, member_flags)?
                != module.decoration(member_id, Decoration::ArrayStride)
        {
            return Ok(false);
        }
        if !member.member_types.is_empty() && !is_std430_packing(module, member)? {
            return Ok(false);
        }

        offset += std430_size(module, member, member_flags)?;
    }
    Ok(true)
}

/// The `layout()` spelling of an image format, if it has one.
pub fn format_to_glsl(format: ImageFormat, es: bool) -> Result<Option<&'static str>, BackendError> {
    let (name, desktop_only) = match format {
        ImageFormat::Rgba32f => ("rgba32f", false),
        ImageFormat::Rgba16f => ("rgba16f", false),
        ImageFormat::R32f => ("r32f", false),
        ImageFormat::Rgba8 => ("rgba8", false),
        ImageFormat::Rgba8Snorm => ("rgba8_snorm", false),
        ImageFormat::Rg32f => ("rg32f", false),
        ImageFormat::Rg16f => ("rg16f", false),

        ImageFormat::Rgba32i => ("rgba32i", false),
        ImageFormat::Rgba16i => ("rgba16i", false),
        ImageFormat::R32i => ("r32i", false),
        ImageFormat::Rgba8i => ("rgba8i", false),
        ImageFormat::Rg32i => ("rg32i", false),
        ImageFormat::Rg16i => ("rg16i", false),

        ImageFormat::Rgba32ui => ("rgba32ui", false),
        ImageFormat::Rgba16ui => ("rgba16ui", false),
        ImageFormat::R32ui => ("r32ui", false),
        ImageFormat::Rgba8ui => ("rgba8ui", false),
        ImageFormat::Rg32ui => ("rg32ui", false),
        ImageFormat::Rg16ui => ("rg16ui", false),

        ImageFormat::R11fG11fB10f => ("r11f_g11f_b10f", true),
        ImageFormat::R16f => ("r16f", true),
        ImageFormat::Rgb10A2 => ("rgb10_a2", true),
        ImageFormat::R8 => ("r8", true),
        ImageFormat::Rg8 => ("rg8", true),
        ImageFormat::R16 => ("r16", true),
        ImageFormat::Rg16 => ("rg16", true),
        ImageFormat::Rgba16 => ("rgba16", true),
        ImageFormat::R16Snorm => ("r16_snorm", true),
        ImageFormat::Rg16Snorm => ("rg16_snorm", true),
        ImageFormat::Rgba16Snorm => ("rgba16_snorm", true),
        ImageFormat::R8Snorm => ("r8_snorm", true),
        ImageFormat::Rg8Snorm => ("rg8_snorm", true),
        ImageFormat::R8ui => ("r8ui", true),
        ImageFormat::Rg8ui => ("rg8ui", true),
        ImageFormat::R16ui => ("r16ui", true),
        ImageFormat::Rgb10a2ui => ("rgb10_a2ui", true),
        ImageFormat::R8i => ("r8i", true),
        ImageFormat::Rg8i => ("rg8i", true),
        ImageFormat::R16i => ("r16i", true),
        _ => return Ok(None),
    };
    if desktop_only && es {
        return Err(BackendError::Unsupported(format!(
            "image format {name} is not available in the ES profile"
        )));
    }
    Ok(Some(name))
}

/// `layout(...) ` of a global variable, or an empty string.
///
/// Legacy targets get no layouts at all.
pub fn layout_for_variable(em: &mut Emitter<'_, Glsl>, var: &Variable) -> Result<String, BackendError> {
    if em.is_legacy() {
        return Ok(String::new());
    }

    let vulkan = em.options.vulkan_semantics;
    let module = &em.module;
    let dec = module.meta(var.self_id).decoration.clone();
    let ty = module.get::<Type>(var.basetype)?;
    let push_constant = var.storage == StorageClass::PushConstant;
    let mut attr = Vec::new();

    if vulkan && push_constant {
        attr.push("push_constant".to_string());
    }
    if dec.has(Decoration::RowMajor) {
        attr.push("row_major".into());
    }
    if dec.has(Decoration::ColMajor) {
        attr.push("column_major".into());
    }
    if vulkan && dec.has(Decoration::InputAttachmentIndex) {
        attr.push(format!("input_attachment_index = {}", dec.input_attachment));
    }

    if dec.has(Decoration::Location) {
        // Members with their own locations make the block-level one redundant.
        let members = module.meta(ty.self_id).members.len() as u32;
        let mut member_locations = false;
        for index in 0..members {
            member_locations |= em
                .combined_decoration_for_member(ty, index)?
                .contains(flag(Decoration::Location));
        }
        if !member_locations {
            attr.push(format!("location = {}", dec.location));
        }
    }

    // set = 0 is implied outside Vulkan.
    if !push_constant && dec.has(Decoration::DescriptorSet) && (dec.set != 0 || vulkan) {
        attr.push(format!("set = {}", dec.set));
    }
    if dec.has(Decoration::Binding) {
        attr.push(format!("binding = {}", dec.binding));
    }
    if dec.has(Decoration::Coherent) {
        attr.push("coherent".into());
    }
    if dec.has(Decoration::Offset) {
        attr.push(format!("offset = {}", dec.offset));
    }

    let type_flags = module.decoration_flags(ty.self_id);
    if var.storage == StorageClass::Uniform && type_flags.contains(flag(Decoration::Block)) {
        attr.push("std140".into());
    } else if var.storage == StorageClass::StorageBuffer
        || (var.storage == StorageClass::Uniform && type_flags.contains(flag(Decoration::BufferBlock)))
        || (vulkan && push_constant)
    {
        let packing = if is_std430_packing(module, ty)? { "std430" } else { "std140" };
        attr.push(packing.into());
    }

    if ty.basetype == BaseType::Image {
        if let Some(format) = format_to_glsl(ty.image.format, em.es)? {
            attr.push(format.into());
        }
    }

    if attr.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("layout({}) ", attr.join(", ")))
    }
}
