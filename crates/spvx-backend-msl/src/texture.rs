//! Lowering of image instructions to Metal texture member functions.

use spirv::{Decoration, Dim, ExecutionModel, Op};
use spvx_backend_core::BackendError;
use spvx_backend_core::emit::Emitter;
use spvx_backend_core::emit::instr::Operands;
use spvx_backend_core::emit::texture::TextureArgs;
use spvx_backend_core::emit::tracker::enclose_expression;
use spvx_ir::{BaseType, Id, Instruction, Type, Variable};

use crate::dialect::Msl;

/// Coordinate components addressing one texel, without the array layer.
fn dim_components(dim: Dim) -> u32 {
    match dim {
        Dim::Dim1D | Dim::DimBuffer => 1,
        Dim::Dim3D | Dim::DimCube => 3,
        _ => 2,
    }
}

const SWIZZLE: [&str; 4] = ["x", "y", "z", "w"];

fn swizzle(first: u32, count: u32) -> String {
    SWIZZLE
        .iter()
        .skip(first as usize)
        .take(count as usize)
        .copied()
        .collect()
}

/// The sampler paired with `image`: the one an `OpSampledImage` recorded,
/// else the `Smplr` companion of the combined variable.
pub fn sampler_expression(em: &mut Emitter<'_, Msl>, image: Id) -> Result<String, BackendError> {
    if let Some(sampler) = em.module.meta(image).sampler {
        return em.to_expression(sampler);
    }
    let var = em.module.maybe_get_backing_variable(image).unwrap_or(image);
    Ok(format!("{}Smplr", em.to_name(var)))
}

/// `coord` split into the texel address and the array layer, if any.
fn split_coord(
    em: &mut Emitter<'_, Msl>,
    args: &TextureArgs,
    image_type: &Type,
) -> Result<(String, Option<String>), BackendError> {
    let components = dim_components(image_type.image.dim);
    let coord_type = em.expression_type(args.coord)?;
    let full = em.to_expression(args.coord)?;
    let coord = enclose_expression(full.clone());

    let address = if coord_type.vecsize == components && !args.proj {
        full
    } else {
        format!("{coord}.{}", swizzle(0, components))
    };
    let address = if args.proj {
        let w = swizzle(components + u32::from(image_type.image.arrayed), 1);
        format!("{address} / {coord}.{w}")
    } else {
        address
    };
    let layer = image_type
        .image
        .arrayed
        .then(|| format!("{coord}.{}", swizzle(components, 1)));
    Ok((address, layer))
}

fn flip_y(em: &Emitter<'_, Msl>, image_type: &Type) -> Result<bool, BackendError> {
    Ok(em.options.msl.flip_frag_y
        && em.execution_model()? == ExecutionModel::Fragment
        && image_type.image.dim == Dim::Dim2D)
}

fn unsigned_vector(components: u32) -> String {
    if components == 1 {
        "uint".to_string()
    } else {
        format!("uint{components}")
    }
}

pub fn emit_texture_op(em: &mut Emitter<'_, Msl>, inst: &Instruction) -> Result<(), BackendError> {
    let args = TextureArgs::parse(inst)?;
    let image_type = em.expression_type(args.image)?;
    let components = dim_components(image_type.image.dim);
    let flip = flip_y(em, &image_type)?;

    let method = match (args.fetch, args.gather, args.dref.is_some()) {
        (true, _, _) => "read",
        (_, true, true) => "gather_compare",
        (_, true, false) => "gather",
        (_, false, true) => "sample_compare",
        (_, false, false) => "sample",
    };

    let mut forward = em.should_forward(args.coord)?;
    let mut params = Vec::new();
    if !args.fetch {
        params.push(sampler_expression(em, args.image)?);
    }

    let (address, layer) = split_coord(em, &args, &image_type)?;
    if args.fetch {
        params.push(format!("{}({address})", unsigned_vector(components)));
    } else if flip {
        let coord = enclose_expression(address);
        params.push(format!("float2({coord}.x, (1.0 - {coord}.y))"));
    } else {
        params.push(address);
    }
    if let Some(layer) = layer {
        params.push(if args.fetch {
            format!("uint({layer})")
        } else {
            format!("uint(round({layer}))")
        });
    }

    if let Some(dref) = args.dref {
        forward = forward && em.should_forward(dref)?;
        params.push(em.to_expression(dref)?);
    }

    if let Some(bias) = args.bias {
        forward = forward && em.should_forward(bias)?;
        params.push(format!("bias({})", em.to_expression(bias)?));
    }
    if let Some(lod) = args.lod {
        forward = forward && em.should_forward(lod)?;
        let lod = em.to_expression(lod)?;
        params.push(if args.fetch { lod } else { format!("level({lod})") });
    }
    if let Some((dx, dy)) = args.grad {
        forward = forward && em.should_forward(dx)? && em.should_forward(dy)?;
        let kind = match image_type.image.dim {
            Dim::Dim3D => "gradient3d",
            Dim::DimCube => "gradientcube",
            _ => "gradient2d",
        };
        params.push(format!("{kind}({}, {})", em.to_expression(dx)?, em.to_expression(dy)?));
    }
    if let Some(sample) = args.sample {
        params.push(em.to_expression(sample)?);
    }

    let offset = args.const_offset.or(args.offset);
    if let Some(offset) = offset {
        forward = forward && em.should_forward(offset)?;
        let offset = em.to_enclosed_expression(offset)?;
        params.push(if flip {
            format!("int2({offset}.x, -{offset}.y)")
        } else {
            offset
        });
    }
    if let Some(component) = args.component {
        let component = em.constant_u32(component)?;
        if offset.is_none() && components == 2 {
            params.push("int2(0)".to_string());
        }
        params.push(format!("component::{}", swizzle(component, 1)));
    }

    let img = em.to_expression(args.image)?;
    let expr = format!("{img}.{method}({})", params.join(", "));
    em.emit_op(args.result_type, args.id, &expr, forward, false)
}

/// Records the sampler an image is paired with; Metal passes the two
/// separately, so the combined value is the image itself.
pub fn emit_sampled_image_op(
    em: &mut Emitter<'_, Msl>,
    result_type: Id,
    id: Id,
    image: Id,
    sampler: Id,
) -> Result<(), BackendError> {
    let expr = em.to_expression(image)?;
    em.emit_op(result_type, id, &expr, true, false)?;
    em.module.meta_mut(id).sampler = Some(sampler);
    Ok(())
}

fn image_variable(em: &Emitter<'_, Msl>, image: Id) -> Option<Id> {
    em.module.maybe_get_backing_variable(image)
}

/// `uint2(x)`-style texel address and optional array layer of a storage
/// image access.
fn texel_address(em: &mut Emitter<'_, Msl>, image_type: &Type, coord: Id) -> Result<String, BackendError> {
    let components = dim_components(image_type.image.dim);
    let coord_type = em.expression_type(coord)?;
    let full = em.to_expression(coord)?;
    let enclosed = enclose_expression(full.clone());
    let address = if coord_type.vecsize == components {
        format!("{}({full})", unsigned_vector(components))
    } else {
        format!("{}({enclosed}.{})", unsigned_vector(components), swizzle(0, components))
    };
    if image_type.image.arrayed {
        Ok(format!("{address}, uint({enclosed}.{})", swizzle(components, 1)))
    } else {
        Ok(address)
    }
}

pub fn emit_image_read(em: &mut Emitter<'_, Msl>, ops: &Operands<'_>) -> Result<(), BackendError> {
    let (result_type, id, image, coord) = (ops.id(0)?, ops.id(1)?, ops.id(2)?, ops.id(3)?);
    if let Some(var) = image_variable(em, image) {
        em.clear_speculative_decoration(var, Decoration::NonReadable);
    }
    let image_type = em.expression_type(image)?;
    let address = texel_address(em, &image_type, coord)?;
    let expr = format!("{}.read({address})", em.to_expression(image)?);
    em.emit_op(result_type, id, &expr, false, false)
}

pub fn emit_image_write(em: &mut Emitter<'_, Msl>, ops: &Operands<'_>) -> Result<(), BackendError> {
    let (image, coord, texel) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
    let var = image_variable(em, image);
    if let Some(var) = var {
        em.clear_speculative_decoration(var, Decoration::NonWritable);
    }
    let image_type = em.expression_type(image)?;
    let address = texel_address(em, &image_type, coord)?;
    let img = em.to_expression(image)?;
    let texel = em.to_expression(texel)?;
    em.statement(&format!("{img}.write({texel}, {address});"));

    if let Some(var) = var {
        let v = em.module.get::<Variable>(var)?;
        if em.module.variable_storage_is_aliased(v)? {
            em.flush_all_aliased_variables()?;
        }
    }
    Ok(())
}

/// Image size queries become per-axis `get_*()` calls.
pub fn emit_image_query_size(em: &mut Emitter<'_, Msl>, ops: &Operands<'_>) -> Result<(), BackendError> {
    let (result_type, id, image) = (ops.id(0)?, ops.id(1)?, ops.id(2)?);
    let lod = if ops.op == Op::ImageQuerySizeLod {
        em.to_expression(ops.id(3)?)?
    } else {
        String::new()
    };
    let image_type = em.expression_type(image)?;
    if !matches!(image_type.basetype, BaseType::Image | BaseType::SampledImage) {
        return Err(BackendError::Malformed(format!("size query on {image}, which is not an image")));
    }
    let img = em.to_enclosed_expression(image)?;

    let mut axes = vec![format!("{img}.get_width({lod})")];
    let components = dim_components(image_type.image.dim);
    if components > 1 {
        axes.push(format!("{img}.get_height({lod})"));
    }
    if image_type.image.dim == Dim::Dim3D {
        axes.push(format!("{img}.get_depth({lod})"));
    }
    if image_type.image.arrayed {
        axes.push(format!("{img}.get_array_size()"));
    }

    let result = em.type_of(result_type)?;
    let ctor = em.type_to_glsl_constructor(&result)?;
    let expr = format!("{ctor}({})", axes.join(", "));
    em.emit_op(result_type, id, &expr, true, false)
}
