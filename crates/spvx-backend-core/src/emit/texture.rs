//! Texture sampling and combined image/sampler lookups.

use spirv::{Dim, ImageOperands, Op};
use spvx_ir::{Id, Instruction, Type};

use super::{Dialect, Emitter};
use crate::BackendError;

/// Decoded operands of an image sampling, fetch or gather instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextureArgs {
    /// Type of the sampled value.
    pub result_type: Id,
    /// Result id.
    pub id: Id,
    /// The sampled image.
    pub image: Id,
    /// Texture coordinate.
    pub coord: Id,
    /// Depth reference of a shadow lookup.
    pub dref: Option<Id>,
    /// Gather component.
    pub component: Option<Id>,
    /// `textureGather`.
    pub gather: bool,
    /// Projective lookup.
    pub proj: bool,
    /// `texelFetch`.
    pub fetch: bool,
    /// LOD bias.
    pub bias: Option<Id>,
    /// Explicit LOD.
    pub lod: Option<Id>,
    /// Explicit derivatives.
    pub grad: Option<(Id, Id)>,
    /// Constant texel offset.
    pub const_offset: Option<Id>,
    /// Dynamic texel offset.
    pub offset: Option<Id>,
    /// Per-texel gather offsets.
    pub const_offsets: Option<Id>,
    /// Sample index of a multisampled fetch.
    pub sample: Option<Id>,
}

impl TextureArgs {
    /// Decodes `inst`, which must be one of the image sampling opcodes.
    pub fn parse(inst: &Instruction) -> Result<Self, BackendError> {
        let op = inst
            .op()
            .ok_or_else(|| BackendError::Malformed(format!("unknown opcode {}", inst.opcode)))?;
        let words = &inst.words;
        let word = |i: usize| -> Result<u32, BackendError> {
            words
                .get(i)
                .copied()
                .ok_or_else(|| BackendError::Malformed(format!("{op:?} is missing operand {i}")))
        };

        let mut args = Self {
            result_type: Id::new(word(0)?),
            id: Id::new(word(1)?),
            image: Id::new(word(2)?),
            coord: Id::new(word(3)?),
            fetch: op == Op::ImageFetch,
            ..Self::default()
        };

        let rest = match op {
            Op::ImageSampleDrefImplicitLod | Op::ImageSampleDrefExplicitLod => {
                args.dref = Some(Id::new(word(4)?));
                5
            }
            Op::ImageSampleProjDrefImplicitLod | Op::ImageSampleProjDrefExplicitLod => {
                args.dref = Some(Id::new(word(4)?));
                args.proj = true;
                5
            }
            Op::ImageDrefGather => {
                args.dref = Some(Id::new(word(4)?));
                args.gather = true;
                5
            }
            Op::ImageGather => {
                args.component = Some(Id::new(word(4)?));
                args.gather = true;
                5
            }
            Op::ImageSampleProjImplicitLod | Op::ImageSampleProjExplicitLod => {
                args.proj = true;
                4
            }
            _ => 4,
        };

        let mut operands = words.get(rest..).unwrap_or(&[]).iter().copied();
        let Some(mask) = operands.next() else {
            return Ok(args);
        };
        let flags = ImageOperands::from_bits_truncate(mask);
        let mut take = |flag: ImageOperands| -> Option<Id> {
            if flags.contains(flag) {
                operands.next().map(Id::new)
            } else {
                None
            }
        };

        args.bias = take(ImageOperands::BIAS);
        args.lod = take(ImageOperands::LOD);
        let grad_x = take(ImageOperands::GRAD);
        let grad_y = take(ImageOperands::GRAD);
        args.grad = grad_x.zip(grad_y);
        args.const_offset = take(ImageOperands::CONST_OFFSET);
        args.offset = take(ImageOperands::OFFSET);
        args.const_offsets = take(ImageOperands::CONST_OFFSETS);
        args.sample = take(ImageOperands::SAMPLE);
        Ok(args)
    }

    /// Coordinate components the image dimension consumes.
    pub fn coord_components(&self, image_type: &Type) -> u32 {
        let base = match image_type.image.dim {
            Dim::Dim1D | Dim::DimBuffer => 1,
            Dim::Dim3D | Dim::DimCube => 3,
            _ => 2,
        };
        base + u32::from(self.proj) + u32::from(image_type.image.arrayed)
    }
}

impl<D: Dialect> Emitter<'_, D> {
    /// Renames a texture builtin for GLSL versions that spell it with the
    /// sampler dimension, as in `texture2DLod`.
    pub fn legacy_tex_op(&mut self, op: &str, image_type: &Type) -> Result<String, BackendError> {
        let arrayed = image_type.image.arrayed && !self.es;
        let dim = match image_type.image.dim {
            Dim::Dim1D if arrayed => "1DArray",
            Dim::Dim1D => "1D",
            Dim::Dim2D if arrayed => "2DArray",
            Dim::Dim2D | Dim::DimSubpassData => "2D",
            Dim::Dim3D => "3D",
            Dim::DimCube => "Cube",
            Dim::DimBuffer => "Buffer",
            _ => "",
        };

        if op == "textureLod" || op == "textureProjLod" {
            if self.is_legacy_es() {
                self.require_extension("GL_EXT_shader_texture_lod");
            } else if self.is_legacy() {
                self.require_extension("GL_ARB_shader_texture_lod");
            }
        }

        let lod_suffix = if self.is_legacy_es() { "EXT" } else { "" };
        match op {
            "texture" => Ok(format!("texture{dim}")),
            "textureLod" => Ok(format!("texture{dim}Lod{lod_suffix}")),
            "textureProj" => Ok(format!("texture{dim}Proj")),
            "textureProjLod" => Ok(format!("texture{dim}ProjLod{lod_suffix}")),
            other => Err(BackendError::Unsupported(format!(
                "texture function {other} has no legacy equivalent"
            ))),
        }
    }

    /// `.xy`-style swizzle trimming a coordinate of `input` lanes to
    /// `needed` lanes, or nothing when they match.
    pub fn coord_swizzle(&self, needed: u32, input: u32) -> &'static str {
        if needed == input {
            return "";
        }
        match (needed, self.traits.swizzle_is_function) {
            (1, _) => ".x",
            (2, false) => ".xy",
            (2, true) => ".xy()",
            (3, false) => ".xyz",
            (3, true) => ".xyz()",
            _ => "",
        }
    }

    /// Lowers a sample, fetch or gather to the GLSL builtin that matches its operands.
    pub fn default_emit_texture_op(&mut self, inst: &Instruction) -> Result<(), BackendError> {
        let args = TextureArgs::parse(inst)?;
        let image_type = self.expression_type(args.image)?;
        let coord_components = args.coord_components(&image_type);

        let mut texop = String::new();
        if args.fetch {
            texop.push_str("texelFetch");
        } else {
            texop.push_str("texture");
            if args.gather {
                texop.push_str("Gather");
            }
            if args.const_offsets.is_some() {
                texop.push_str("Offsets");
            }
            if args.proj {
                texop.push_str("Proj");
            }
            if args.grad.is_some() {
                texop.push_str("Grad");
            }
            if args.lod.is_some() {
                texop.push_str("Lod");
            }
        }
        if args.const_offset.is_some() || args.offset.is_some() {
            texop.push_str("Offset");
        }
        if self.is_legacy() {
            texop = self.legacy_tex_op(&texop, &image_type)?;
        }

        let mut expr = format!("{texop}({}", self.to_expression(args.image)?);
        let mut forward = self.should_forward(args.coord)?;

        let coord_type = self.expression_type(args.coord)?;
        let swizzle = self.coord_swizzle(coord_components, coord_type.vecsize);
        let coord_expr = if swizzle.is_empty() {
            self.to_expression(args.coord)?
        } else {
            self.to_enclosed_expression(args.coord)? + swizzle
        };

        if let Some(dref) = args.dref {
            forward = forward && self.should_forward(dref)?;
            if coord_components == 4 {
                expr.push_str(&format!(
                    ", {}, {}",
                    self.to_expression(args.coord)?,
                    self.to_expression(dref)?
                ));
            } else {
                let mut merged = coord_type.clone();
                merged.vecsize = coord_components + 1;
                let ctor = self.type_to_glsl_constructor(&merged)?;
                expr.push_str(&format!(", {ctor}({coord_expr}, {})", self.to_expression(dref)?));
            }
        } else {
            expr.push_str(", ");
            expr.push_str(&coord_expr);
        }

        let trailing = [
            args.grad.map(|g| g.0),
            args.grad.map(|g| g.1),
            args.lod,
            args.const_offset.or(args.offset),
            args.bias,
            args.component,
        ];
        for operand in trailing.into_iter().flatten() {
            forward = forward && self.should_forward(operand)?;
            expr.push_str(", ");
            expr.push_str(&self.to_expression(operand)?);
        }
        if let Some(sample) = args.sample {
            expr.push_str(", ");
            expr.push_str(&self.to_expression(sample)?);
        }
        expr.push(')');

        self.emit_op(args.result_type, args.id, &expr, forward, false)
    }

    /// The combined variable or parameter standing in for `image` sampled
    /// with `sampler`.
    pub fn to_combined_image_sampler(&mut self, image: Id, sampler: Id) -> Result<String, BackendError> {
        let image = self.module.maybe_get_backing_variable(image).unwrap_or(image);
        let sampler = self.module.maybe_get_backing_variable(sampler).unwrap_or(sampler);

        let func_id = self
            .current_function
            .ok_or_else(|| BackendError::Internal("sampling outside of a function".into()))?;
        let func = self.module.get::<spvx_ir::Function>(func_id)?;
        let image_param = func.arguments.iter().position(|p| p.id == image);
        let sampler_param = func.arguments.iter().position(|p| p.id == sampler);

        if image_param.is_some() || sampler_param.is_some() {
            let global_image = image_param.is_none();
            let global_sampler = sampler_param.is_none();
            let image_key = image_param.map_or(image, |i| Id::new(i as u32));
            let sampler_key = sampler_param.map_or(sampler, |i| Id::new(i as u32));
            let found = func.combined_parameters.iter().find(|p| {
                p.global_image == global_image
                    && p.global_sampler == global_sampler
                    && p.image_id == image_key
                    && p.sampler_id == sampler_key
            });
            return match found {
                Some(p) => {
                    let id = p.id;
                    self.to_expression(id)
                }
                None => Err(BackendError::Internal(format!(
                    "cannot find mapping for combined sampler parameter of {image} and {sampler}"
                ))),
            };
        }

        let combined = self
            .module
            .combined_image_samplers
            .iter()
            .find(|c| c.image_id == image && c.sampler_id == sampler)
            .map(|c| c.combined_id);
        match combined {
            Some(id) => self.to_expression(id),
            None => Err(BackendError::Internal(format!(
                "cannot find mapping for combined sampler of {image} and {sampler}"
            ))),
        }
    }

    /// Lowers `OpSampledImage`: a `sampler2D(image, sampler)` constructor under
    /// Vulkan semantics, else the combined sampler built for the pair.
    pub fn default_emit_sampled_image_op(
        &mut self,
        result_type: Id,
        id: Id,
        image: Id,
        sampler: Id,
    ) -> Result<(), BackendError> {
        if self.options.vulkan_semantics && self.module.combined_image_samplers.is_empty() {
            let ty = self.type_of(result_type)?;
            let ctor = self.type_to_glsl(&ty)?;
            self.emit_binary_func_op(result_type, id, image, sampler, &ctor)
        } else {
            let expr = self.to_combined_image_sampler(image, sampler)?;
            self.emit_op(result_type, id, &expr, true, false)
        }
    }
}
