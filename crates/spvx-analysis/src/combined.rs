//! Synthesis of combined image/sampler variables for targets without
//! separate textures and samplers.
//!
//! Every `OpSampledImage` pairing two globals gets one new `UniformConstant`
//! variable. Pairs that involve function parameters become shadow parameters
//! of that function, propagated up the call chain until both halves resolve
//! to globals.

use std::collections::{HashMap, HashSet};

use log::debug;
use spirv::{Decoration, Op, StorageClass};
use spvx_ir::{
    BaseType, Block, CombinedImageSampler, CombinedParameter, Function, Id, IrError, Module,
    Parameter, Type, Variable,
};

use crate::traverse::{arg_id, call_target};

/// Display name of a synthesized combined variable.
pub fn combined_sampler_name(module: &Module, image: Id, sampler: Id) -> String {
    format!(
        "{}_{}",
        module.to_name(image, false),
        module.to_name(sampler, false)
    )
}

/// Rebuilds `module.combined_image_samplers` and the combined shadow
/// parameters of every function reachable from the active entry point.
pub fn build_combined_image_samplers(module: &mut Module) -> Result<(), IrError> {
    // Variables from an earlier build would otherwise be declared as orphans.
    let mut stale: Vec<Id> = module
        .combined_image_samplers
        .drain(..)
        .map(|c| c.combined_id)
        .collect();
    let funcs = module.ids.ids_of::<Function>();
    for id in funcs {
        let func = module.get_mut::<Function>(id)?;
        stale.extend(func.combined_parameters.drain(..).map(|p| p.id));
        func.shadow_arguments.clear();
        func.do_combined_parameters = true;
    }
    for id in stale {
        module.ids.reset(id);
    }

    let entry = module.entry_point()?.self_id;
    let mut builder = CombinedBuilder::default();
    builder.walk(module, entry)?;
    debug!(
        "synthesized {} combined image samplers",
        module.combined_image_samplers.len()
    );
    Ok(())
}

#[derive(Default)]
struct CombinedBuilder {
    /// Called functions, innermost last. The entry point is not on the stack.
    functions: Vec<Id>,
    /// Per call frame, parameter variable to the caller-side value it binds.
    parameter_remapping: Vec<HashMap<Id, Id>>,
    /// Load results of images and samplers, to the variable they came from.
    loaded_from: HashMap<Id, Id>,
    call_stack: HashSet<Id>,
}

impl CombinedBuilder {
    fn walk(&mut self, module: &mut Module, func: Id) -> Result<(), IrError> {
        if !self.call_stack.insert(func) {
            return Err(IrError::Malformed(format!(
                "function {func} calls itself recursively"
            )));
        }

        let blocks = module.get::<Function>(func)?.blocks.clone();
        for block in blocks {
            // Cloned: handling an instruction may add IDs to the module.
            let ops = module.get::<Block>(block)?.ops.clone();
            for inst in &ops {
                let Some(op) = inst.op() else { continue };
                self.handle(module, op, &inst.words)?;

                if op == Op::FunctionCall {
                    let callee = call_target(&inst.words)?;
                    self.begin_function_scope(module, callee, &inst.words)?;
                    self.walk(module, callee)?;
                    self.end_function_scope(module, &inst.words)?;
                }
            }
        }

        self.call_stack.remove(&func);
        Ok(())
    }

    fn backing(&self, module: &Module, id: Id) -> Id {
        if module.maybe_get::<Variable>(id).is_some() {
            return id;
        }
        self.loaded_from.get(&id).copied().unwrap_or(id)
    }

    fn remap_parameter(&self, module: &Module, id: Id) -> Id {
        let id = self.backing(module, id);
        self.parameter_remapping
            .last()
            .and_then(|frame| frame.get(&id))
            .copied()
            .unwrap_or(id)
    }

    fn begin_function_scope(
        &mut self,
        module: &Module,
        callee: Id,
        args: &[u32],
    ) -> Result<(), IrError> {
        let params = &module.get::<Function>(callee)?.arguments;
        let frame = params
            .iter()
            .zip(args.iter().skip(3))
            .map(|(param, &arg)| (param.id, self.remap_parameter(module, Id::new(arg))))
            .collect();
        self.parameter_remapping.push(frame);
        self.functions.push(callee);
        Ok(())
    }

    fn end_function_scope(&mut self, module: &mut Module, args: &[u32]) -> Result<(), IrError> {
        let callee = self.functions.pop();
        self.parameter_remapping.pop();
        let (Some(callee), Some(&caller)) = (callee, self.functions.last()) else {
            return Ok(());
        };

        let callee = module.get_mut::<Function>(callee)?;
        callee.do_combined_parameters = false;
        let params = callee.combined_parameters.clone();

        if !module.get::<Function>(caller)?.do_combined_parameters {
            return Ok(());
        }

        let call_args = &args[3.min(args.len())..];
        let resolve = |index: Id| -> Result<Id, IrError> {
            call_args
                .get(index.index())
                .map(|&w| Id::new(w))
                .ok_or_else(|| {
                    IrError::Malformed(format!("call passes no argument {}", index.raw()))
                })
        };
        for param in params {
            let image = if param.global_image {
                param.image_id
            } else {
                self.backing(module, resolve(param.image_id)?)
            };
            let sampler = if param.global_sampler {
                param.sampler_id
            } else {
                self.backing(module, resolve(param.sampler_id)?)
            };
            self.register_combined_parameter(module, caller, image, sampler)?;
        }
        Ok(())
    }

    /// Adds a combined shadow parameter to `caller` when either half is one
    /// of its parameters.
    fn register_combined_parameter(
        &mut self,
        module: &mut Module,
        caller: Id,
        image: Id,
        sampler: Id,
    ) -> Result<(), IrError> {
        let func = module.get::<Function>(caller)?;
        let position = |id: Id| func.arguments.iter().position(|p| p.id == id);
        let image_index = position(image);
        let sampler_index = position(sampler);
        if image_index.is_none() && sampler_index.is_none() {
            return Ok(());
        }

        // Parameter halves are stored as argument indices, globals as IDs.
        let param = CombinedParameter {
            id: Id::default(),
            image_id: image_index.map_or(image, |i| Id::new(i as u32)),
            sampler_id: sampler_index.map_or(sampler, |i| Id::new(i as u32)),
            global_image: image_index.is_none(),
            global_sampler: sampler_index.is_none(),
        };
        let exists = func.combined_parameters.iter().any(|p| {
            p.image_id == param.image_id
                && p.sampler_id == param.sampler_id
                && p.global_image == param.global_image
                && p.global_sampler == param.global_sampler
        });
        if exists {
            return Ok(());
        }

        let base = module.increase_bound_by(3);
        let type_id = base;
        let ptr_type_id = Id::new(base.raw() + 1);
        let combined_id = Id::new(base.raw() + 2);

        let mut ty = module.expression_type(image)?.clone();
        ty.basetype = BaseType::SampledImage;
        ty.pointer = false;
        ty.storage = StorageClass::Generic;
        ty.self_id = type_id;
        ty.parent_type = None;
        module.set(type_id, ty.clone())?;

        let mut ptr_type = ty;
        ptr_type.pointer = true;
        ptr_type.storage = StorageClass::UniformConstant;
        ptr_type.parent_type = Some(type_id);
        module.set(ptr_type_id, ptr_type)?;

        let mut var = Variable::new(combined_id, ptr_type_id, StorageClass::Function, None);
        var.parameter = Some(caller);
        module.set(combined_id, var)?;

        if module.has_decoration(sampler, Decoration::RelaxedPrecision) {
            module.set_decoration(combined_id, Decoration::RelaxedPrecision, 0);
        }
        let name = combined_sampler_name(module, image, sampler);
        module.set_name(combined_id, &name);

        let func = module.get_mut::<Function>(caller)?;
        func.combined_parameters.push(CombinedParameter {
            id: combined_id,
            ..param
        });
        func.shadow_arguments
            .push(Parameter::new(ptr_type_id, combined_id));
        Ok(())
    }

    fn handle(&mut self, module: &mut Module, op: Op, args: &[u32]) -> Result<(), IrError> {
        match op {
            Op::Load => {
                let result = arg_id(args, 1, op)?;
                let ptr = arg_id(args, 2, op)?;
                // Access chain results have no IR entry until emission.
                let ty = module.get::<Type>(arg_id(args, 0, op)?)?;
                let separate = (ty.basetype == BaseType::Image && ty.image.sampled == 1)
                    || ty.basetype == BaseType::Sampler;
                if separate {
                    let var = self.backing(module, ptr);
                    self.loaded_from.insert(result, var);
                }
            }
            Op::AccessChain | Op::InBoundsAccessChain => {
                let ty = module.get::<Type>(arg_id(args, 0, op)?)?;
                let separate = (ty.basetype == BaseType::Image && ty.image.sampled == 1)
                    || ty.basetype == BaseType::Sampler;
                if separate {
                    return Err(IrError::Unsupported(
                        "arrays of separate images or samplers cannot be combined".into(),
                    ));
                }
            }
            Op::SampledImage => self.sampled_image(module, args)?,
            _ => {}
        }
        Ok(())
    }

    fn sampled_image(&mut self, module: &mut Module, args: &[u32]) -> Result<(), IrError> {
        let result_type = arg_id(args, 0, Op::SampledImage)?;
        let image = arg_id(args, 2, Op::SampledImage)?;
        let sampler = arg_id(args, 3, Op::SampledImage)?;

        if let Some(&func) = self.functions.last() {
            if module.get::<Function>(func)?.do_combined_parameters {
                let image = self.backing(module, image);
                let sampler = self.backing(module, sampler);
                self.register_combined_parameter(module, func, image, sampler)?;
            }
        }

        let image = self.remap_parameter(module, image);
        let sampler = self.remap_parameter(module, sampler);
        // Still a parameter: the pair is resolved when the call returns.
        let is_parameter = |id: Id| {
            module
                .maybe_get::<Variable>(id)
                .is_none_or(|v| v.parameter.is_some())
        };
        if is_parameter(image) || is_parameter(sampler) {
            return Ok(());
        }

        if module
            .combined_image_samplers
            .iter()
            .any(|c| c.image_id == image && c.sampler_id == sampler)
        {
            return Ok(());
        }

        let base = module.increase_bound_by(2);
        let ptr_type_id = base;
        let combined_id = Id::new(base.raw() + 1);

        let mut ptr_type = module.get::<Type>(result_type)?.clone();
        ptr_type.pointer = true;
        ptr_type.storage = StorageClass::UniformConstant;
        ptr_type.parent_type = Some(result_type);
        module.set(ptr_type_id, ptr_type)?;
        module.set(
            combined_id,
            Variable::new(combined_id, ptr_type_id, StorageClass::UniformConstant, None),
        )?;

        if module.has_decoration(sampler, Decoration::RelaxedPrecision) {
            module.set_decoration(combined_id, Decoration::RelaxedPrecision, 0);
        }
        let name = combined_sampler_name(module, image, sampler);
        module.set_name(combined_id, &name);

        debug!("combined {image} and {sampler} into {combined_id}");
        module.combined_image_samplers.push(CombinedImageSampler {
            combined_id,
            image_id: image,
            sampler_id: sampler,
        });
        Ok(())
    }
}
