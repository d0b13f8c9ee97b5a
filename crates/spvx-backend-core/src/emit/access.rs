//! Access chains, swizzles and composite construction.

use spvx_ir::{BaseType, Constant, Expression, Id, Type, VariantKind};

use super::types::strip_enclosed;
use super::{Dialect, Emitter};
use crate::BackendError;

/// The component letter of vector lane `index`.
pub fn index_to_swizzle(index: u32) -> Result<&'static str, BackendError> {
    match index {
        0 => Ok("x"),
        1 => Ok("y"),
        2 => Ok("z"),
        3 => Ok("w"),
        _ => Err(BackendError::Malformed(format!("swizzle index {index} out of range"))),
    }
}

/// `true` when `swizzle` is a prefix of `xyzw`.
fn is_identity_swizzle(swizzle: &str) -> bool {
    swizzle.len() <= 4 && "xyzw".starts_with(swizzle)
}

impl<D: Dialect> Emitter<'_, D> {
    /// Spells a chain of indices into `base`.
    ///
    /// `indices` are constant or value IDs unless `index_is_literal`, in
    /// which case they are raw member and lane numbers. With `chain_only`
    /// the base expression is left off.
    pub fn access_chain(
        &mut self,
        base: Id,
        indices: &[u32],
        index_is_literal: bool,
        chain_only: bool,
    ) -> Result<String, BackendError> {
        let mut expr = if chain_only {
            String::new()
        } else {
            self.to_enclosed_expression(base)?
        };

        let mut ty: Type = self.expression_type(base)?;
        let mut arrayed = false;
        let mut needs_row_major_conversion = self.is_non_native_row_major_matrix(base)?;

        for &index in indices {
            if !ty.array.is_empty() {
                expr.push('[');
                if index_is_literal {
                    expr.push_str(&index.to_string());
                } else {
                    expr.push_str(&self.to_expression(Id::new(index))?);
                }
                expr.push(']');
                ty.array.pop();
                ty.array_size_literal.pop();
                arrayed = true;
            } else if ty.basetype == BaseType::Struct {
                let member = if index_is_literal {
                    index
                } else {
                    self.module.get::<Constant>(Id::new(index))?.scalar(0, 0)
                };
                let member_type = *ty.member_types.get(member as usize).ok_or_else(|| {
                    BackendError::Malformed(format!(
                        "member index {member} out of bounds for struct {}",
                        ty.self_id
                    ))
                })?;

                if let Some(builtin) = self.module.member_builtin(&ty, member) {
                    let name = self.builtin_to_glsl(builtin)?;
                    if arrayed {
                        expr.push('.');
                        expr.push_str(&name);
                    } else {
                        expr = name;
                    }
                } else {
                    // Members of flattened interface blocks live under a new path.
                    let qualified = self
                        .module
                        .meta(ty.self_id)
                        .member(member)
                        .map(|m| m.qualified_alias.clone())
                        .unwrap_or_default();
                    if !qualified.is_empty() && !arrayed && self.in_entry_function() {
                        expr = qualified;
                    } else {
                        expr.push('.');
                        expr.push_str(&self.to_member_name(&ty, member));
                    }
                }
                needs_row_major_conversion = self.member_is_non_native_row_major_matrix(&ty, member)?;
                ty = self.type_of(member_type)?;
            } else if ty.columns > 1 {
                if needs_row_major_conversion {
                    expr = self.convert_row_major_matrix(&expr);
                    needs_row_major_conversion = false;
                }
                expr.push('[');
                if index_is_literal {
                    expr.push_str(&index.to_string());
                } else {
                    expr.push_str(&self.to_expression(Id::new(index))?);
                }
                expr.push(']');
                ty.columns = 1;
            } else if ty.vecsize > 1 {
                let id = Id::new(index);
                if index_is_literal {
                    expr.push('.');
                    expr.push_str(index_to_swizzle(index)?);
                } else if self.module.kind(id) == VariantKind::Constant
                    && !self.module.get::<Constant>(id)?.specialization
                {
                    let lane = self.module.get::<Constant>(id)?.scalar(0, 0);
                    expr.push('.');
                    expr.push_str(index_to_swizzle(lane)?);
                } else {
                    expr.push('[');
                    expr.push_str(&self.to_expression(id)?);
                    expr.push(']');
                }
                ty.vecsize = 1;
            } else {
                return Err(BackendError::Malformed(format!(
                    "access chain on {base} indexes into a scalar"
                )));
            }
        }
        Ok(expr)
    }

    /// Drops the final swizzle of `foo.wyx.xy`, giving `foo.wy`.
    pub fn remove_duplicate_swizzle(&self, op: &mut String) -> bool {
        let Some(pos) = op.rfind('.').filter(|&p| p > 0) else {
            return false;
        };
        let mut final_swizzle = op[pos + 1..].to_string();
        if self.traits.swizzle_is_function {
            match final_swizzle.strip_suffix("()") {
                Some(stripped) => final_swizzle = stripped.to_string(),
                None => return false,
            }
        }
        if !is_identity_swizzle(&final_swizzle) {
            return false;
        }

        let Some(prev) = op[..pos].rfind('.') else {
            return false;
        };
        let prev = prev + 1;
        let previous = &op[prev..pos];
        let previous = if self.traits.swizzle_is_function {
            previous.strip_suffix("()").unwrap_or(previous)
        } else {
            previous
        };
        if !previous.bytes().all(|c| (b'w'..=b'z').contains(&c)) {
            return false;
        }

        if previous.len() >= final_swizzle.len() {
            op.truncate(prev + final_swizzle.len());
            if self.traits.swizzle_is_function {
                op.push_str("()");
            }
        }
        true
    }

    /// Drops `.xyz` from `foo.xyz` when `foo` is itself a three-lane vector.
    pub fn remove_unity_swizzle(&self, base: Id, op: &mut String) -> Result<bool, BackendError> {
        let Some(pos) = op.rfind('.').filter(|&p| p > 0) else {
            return Ok(false);
        };
        let mut final_swizzle = &op[pos + 1..];
        if self.traits.swizzle_is_function {
            match final_swizzle.strip_suffix("()") {
                Some(stripped) => final_swizzle = stripped,
                None => return Ok(false),
            }
        }
        if !is_identity_swizzle(final_swizzle) {
            return Ok(false);
        }

        let ty = self.module.expression_type(base)?;
        if ty.columns == 1 && ty.array.is_empty() && ty.vecsize as usize == final_swizzle.len() {
            op.truncate(pos);
        }
        Ok(true)
    }

    /// The argument list of a composite constructor, merging lanes
    /// extracted from one vector into a single swizzle.
    pub fn build_composite_combiner(&mut self, elems: &[Id]) -> Result<String, BackendError> {
        let mut op = String::new();
        let mut subop = String::new();
        let mut base: Option<Id> = None;
        let mut merging = false;

        for (i, &elem) in elems.iter().enumerate() {
            let expr = self.module.maybe_get::<Expression>(elem);
            let elem_base = expr.and_then(|e| e.base_expression);

            if elem_base.is_some() && elem_base == base {
                let text = expr.map(|e| e.text.clone()).unwrap_or_default();
                subop.push_str(text.strip_prefix('.').unwrap_or(&text));
                merging = true;
            } else {
                if merging {
                    self.finish_swizzle_merge(base, &mut subop)?;
                    merging = false;
                }
                op.push_str(&subop);
                if i > 0 {
                    op.push_str(", ");
                }
                subop = self.to_expression(elem)?;
            }
            base = elem_base;
        }

        if merging {
            self.finish_swizzle_merge(base, &mut subop)?;
        }
        op.push_str(&subop);
        Ok(op)
    }

    fn finish_swizzle_merge(&self, base: Option<Id>, subop: &mut String) -> Result<(), BackendError> {
        if self.traits.swizzle_is_function {
            subop.push_str("()");
        }
        if !self.remove_duplicate_swizzle(subop) {
            if let Some(base) = base {
                self.remove_unity_swizzle(base, subop)?;
            }
        }
        *subop = strip_enclosed(subop).to_string();
        Ok(())
    }

    /// Separate samplers and sampled images are folded into combined
    /// parameters unless the target keeps them apart.
    pub fn default_skip_argument(&self, id: Id) -> Result<bool, BackendError> {
        if !self.module.combined_image_samplers.is_empty() || !self.options.vulkan_semantics {
            let ty = self.module.expression_type(id)?;
            return Ok(ty.basetype == BaseType::Sampler
                || (ty.basetype == BaseType::Image && ty.image.sampled == 1));
        }
        Ok(false)
    }

    /// Emits `lhs op= rhs` (or `lhs++`) when `rhs` is `lhs op expr`.
    pub fn optimize_read_modify_write(&mut self, lhs: &str, rhs: &str) -> bool {
        if rhs.len() < lhs.len() + 3 || !rhs.starts_with(lhs) {
            return false;
        }
        let bytes = rhs.as_bytes();
        if bytes[lhs.len()] != b' ' || bytes[lhs.len() + 2] != b' ' {
            return false;
        }
        let bop = bytes[lhs.len() + 1] as char;
        if !"+-/*%|&^".contains(bop) {
            return false;
        }
        let expr = &rhs[lhs.len() + 3..];
        if matches!(bop, '+' | '-') && matches!(expr, "1" | "uint(1)" | "1u" | "int(1u)") {
            self.statement(&format!("{lhs}{bop}{bop};"));
        } else {
            self.statement(&format!("{lhs} {bop}= {expr};"));
        }
        true
    }
}
