//! spvx intermediate representation.
//!
//! A dense, ID-indexed store of everything a SPIR-V module declares, plus a
//! parallel metadata table of names and decorations. IDs keep their original
//! SPIR-V numbering; backends may allocate fresh IDs past the original bound
//! with [`Module::increase_bound_by`].

pub mod arena;
mod display;
mod entry;
mod error;
mod meta;
mod types;
mod value;

use std::collections::HashSet;

use spirv::{BuiltIn, Decoration, StorageClass};

pub use arena::{Id, IdStore, Kind, Variant, VariantKind};
pub use display::{dump_module, format_type};
pub use entry::{EntryPoint, WorkgroupSize};
pub use error::{ErrorClass, IrError};
pub use meta::{Decorations, Flags64, Meta, sanitize_name, update_name_cache};
pub use types::{BaseType, ImageInfo, Type};
pub use value::{
    Block, Case, CombinedParameter, Constant, ConstantOp, ConstantVector, ContinueBlockType,
    Expression, ExtInstImport, ExtSet, Function, FunctionPrototype, Instruction, LoopDominator,
    LoopMethod, Merge, Parameter, Phi, Terminator, Undef, Variable, storage_is_interface,
};

/// The source language recorded by `OpSource`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceInfo {
    pub version: u32,
    pub es: bool,
    /// `false` when the module did not name GLSL or ESSL as its source.
    pub known: bool,
}

/// A synthesized combined image/sampler variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CombinedImageSampler {
    pub combined_id: Id,
    pub image_id: Id,
    pub sampler_id: Id,
}

static EMPTY_META: Meta = Meta::new();

/// A parsed SPIR-V module.
#[derive(Clone, Debug, Default)]
pub struct Module {
    pub ids: IdStore,
    /// Names and decorations, indexed like `ids`.
    pub meta: Vec<Meta>,
    /// Entry points in declaration order.
    pub entry_points: Vec<EntryPoint>,
    /// The active entry point's function; the first declared by default.
    pub entry_point: Option<Id>,
    /// Module-scope variables that are not part of the resource interface.
    pub global_variables: Vec<Id>,
    /// Variables whose storage may alias through other pointers.
    pub aliased_variables: Vec<Id>,
    pub source: SourceInfo,
    pub capabilities: Vec<spirv::Capability>,
    pub loop_blocks: HashSet<Id>,
    pub continue_blocks: HashSet<Id>,
    pub loop_merge_targets: HashSet<Id>,
    pub selection_merge_targets: HashSet<Id>,
    pub multiselect_merge_targets: HashSet<Id>,
    pub combined_image_samplers: Vec<CombinedImageSampler>,
    /// When set, interface variables outside this set are treated as hidden.
    pub active_interface_variables: Option<HashSet<Id>>,
}

impl Module {
    /// Creates an empty module with `bound` ID slots.
    pub fn with_bound(bound: u32) -> Self {
        Self {
            ids: IdStore::with_bound(bound),
            meta: vec![Meta::default(); bound as usize],
            ..Self::default()
        }
    }

    pub fn bound(&self) -> u32 {
        self.ids.bound()
    }

    /// Appends `count` fresh IDs and returns the first one.
    pub fn increase_bound_by(&mut self, count: u32) -> Id {
        let first = self.ids.grow(count);
        self.meta.resize(self.ids.bound() as usize, Meta::default());
        first
    }

    pub fn get<T: Kind>(&self, id: Id) -> Result<&T, IrError> {
        self.ids.get(id)
    }

    pub fn get_mut<T: Kind>(&mut self, id: Id) -> Result<&mut T, IrError> {
        self.ids.get_mut(id)
    }

    pub fn maybe_get<T: Kind>(&self, id: Id) -> Option<&T> {
        self.ids.maybe_get(id)
    }

    pub fn maybe_get_mut<T: Kind>(&mut self, id: Id) -> Option<&mut T> {
        self.ids.maybe_get_mut(id)
    }

    pub fn set<T: Kind>(&mut self, id: Id, value: T) -> Result<&mut T, IrError> {
        self.ids.set(id, value)
    }

    pub fn kind(&self, id: Id) -> VariantKind {
        self.ids.kind(id)
    }

    // ---- metadata ----

    /// Returns the metadata of `id`, or an empty record for unknown IDs.
    pub fn meta(&self, id: Id) -> &Meta {
        self.meta.get(id.index()).unwrap_or(&EMPTY_META)
    }

    pub fn meta_mut(&mut self, id: Id) -> &mut Meta {
        let index = id.index();
        if self.meta.len() <= index {
            self.meta.resize(index + 1, Meta::default());
        }
        &mut self.meta[index]
    }

    /// Returns the sanitized name of `id`, possibly empty.
    pub fn name(&self, id: Id) -> &str {
        &self.meta(id).decoration.alias
    }

    /// Sets the name of `id` after sanitizing it.
    pub fn set_name(&mut self, id: Id, name: &str) {
        self.meta_mut(id).decoration.alias = sanitize_name(name);
    }

    pub fn set_member_name(&mut self, id: Id, index: u32, name: &str) {
        self.meta_mut(id).member_mut(index).alias = sanitize_name(name);
    }

    pub fn member_name(&self, id: Id, index: u32) -> &str {
        self.meta(id)
            .member(index)
            .map_or("", |m| m.alias.as_str())
    }

    pub fn set_member_qualified_name(&mut self, id: Id, index: u32, name: &str) {
        self.meta_mut(id).member_mut(index).qualified_alias = name.to_string();
    }

    /// Returns the display name of `id`, falling back to `_<id>`.
    ///
    /// Struct types that alias an earlier declaration use the earlier name.
    pub fn to_name(&self, id: Id, allow_alias: bool) -> String {
        if allow_alias {
            if let Some(alias) = self.maybe_get::<Type>(id).and_then(|t| t.type_alias) {
                return self.to_name(alias, false);
            }
        }
        let alias = self.name(id);
        if alias.is_empty() {
            format!("_{id}")
        } else {
            alias.to_string()
        }
    }

    pub fn has_decoration(&self, id: Id, decoration: Decoration) -> bool {
        self.meta(id).decoration.has(decoration)
    }

    pub fn decoration(&self, id: Id, decoration: Decoration) -> u32 {
        self.meta(id).decoration.get(decoration)
    }

    pub fn set_decoration(&mut self, id: Id, decoration: Decoration, argument: u32) {
        self.meta_mut(id).decoration.set(decoration, argument);
    }

    pub fn unset_decoration(&mut self, id: Id, decoration: Decoration) {
        self.meta_mut(id).decoration.unset(decoration);
    }

    pub fn decoration_flags(&self, id: Id) -> Flags64 {
        self.meta(id).decoration.flags
    }

    pub fn has_member_decoration(&self, id: Id, index: u32, decoration: Decoration) -> bool {
        self.meta(id)
            .member(index)
            .is_some_and(|m| m.has(decoration))
    }

    pub fn member_decoration(&self, id: Id, index: u32, decoration: Decoration) -> u32 {
        self.meta(id)
            .member(index)
            .map_or(0, |m| m.get(decoration))
    }

    pub fn set_member_decoration(
        &mut self,
        id: Id,
        index: u32,
        decoration: Decoration,
        argument: u32,
    ) {
        self.meta_mut(id)
            .member_mut(index)
            .set(decoration, argument);
    }

    pub fn member_decoration_flags(&self, id: Id, index: u32) -> Flags64 {
        self.meta(id).member(index).map_or(Flags64::empty(), |m| m.flags)
    }

    // ---- entry points ----

    /// Returns the active entry point.
    pub fn entry_point(&self) -> Result<&EntryPoint, IrError> {
        let id = self.entry_point.ok_or(IrError::NoEntryPoint)?;
        self.entry_points
            .iter()
            .find(|e| e.self_id == id)
            .ok_or(IrError::NoEntryPoint)
    }

    pub fn entry_point_mut(&mut self) -> Result<&mut EntryPoint, IrError> {
        let id = self.entry_point.ok_or(IrError::NoEntryPoint)?;
        self.entry_points
            .iter_mut()
            .find(|e| e.self_id == id)
            .ok_or(IrError::NoEntryPoint)
    }

    /// Returns the entry point declared for function `id`, creating a
    /// placeholder when an execution mode precedes its `OpEntryPoint`.
    pub fn entry_point_for_mut(&mut self, id: Id) -> &mut EntryPoint {
        let index = match self.entry_points.iter().position(|e| e.self_id == id) {
            Some(index) => index,
            None => {
                self.entry_points.push(EntryPoint::new(
                    id,
                    spirv::ExecutionModel::Vertex,
                    String::new(),
                ));
                self.entry_points.len() - 1
            }
        };
        &mut self.entry_points[index]
    }

    /// Makes the entry point called `name` active.
    pub fn set_entry_point(&mut self, name: &str) -> Result<(), IrError> {
        let id = self
            .entry_points
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.self_id)
            .ok_or_else(|| IrError::UnknownEntryPoint(name.to_string()))?;
        self.entry_point = Some(id);
        Ok(())
    }

    /// Returns `true` if the active entry point lists `id` in its interface.
    ///
    /// Single-entry-point modules are assumed to use every interface
    /// variable, since old front-ends did not list them.
    pub fn interface_variable_exists_in_entry_point(&self, id: Id) -> bool {
        if self.entry_points.len() <= 1 {
            return true;
        }
        self.entry_point()
            .is_ok_and(|e| e.interface_variables.contains(&id))
    }

    // ---- control-flow roles ----

    /// `id` is the continue target of some loop.
    pub fn is_continue(&self, id: Id) -> bool {
        self.continue_blocks.contains(&id)
    }

    /// Branching to `id` leaves a loop or a switch.
    pub fn is_break(&self, id: Id) -> bool {
        self.loop_merge_targets.contains(&id) || self.multiselect_merge_targets.contains(&id)
    }

    /// `id` is where an `if` merges back.
    pub fn is_conditional(&self, id: Id) -> bool {
        self.selection_merge_targets.contains(&id) && !self.multiselect_merge_targets.contains(&id)
    }

    // ---- type queries ----

    /// Returns the type ID of any value-producing entity.
    pub fn expression_type_id(&self, id: Id) -> Result<Id, IrError> {
        match self.ids.variant(id)? {
            Variant::Variable(v) => Ok(v.basetype),
            Variant::Expression(e) => Ok(e.expression_type),
            Variant::Constant(c) => Ok(c.constant_type),
            Variant::ConstantOp(c) => Ok(c.basetype),
            Variant::Undef(u) => Ok(u.basetype),
            other => Err(IrError::Invalid(format!(
                "cannot resolve the type of id {id} ({})",
                other.kind()
            ))),
        }
    }

    pub fn expression_type(&self, id: Id) -> Result<&Type, IrError> {
        self.get::<Type>(self.expression_type_id(id)?)
    }

    /// Opaque handles can never be assigned to.
    pub fn expression_is_lvalue(&self, id: Id) -> Result<bool, IrError> {
        Ok(!self.expression_type(id)?.is_opaque())
    }

    /// Returns `true` if reading `id` always yields the same value.
    pub fn is_immutable(&self, id: Id) -> Result<bool, IrError> {
        match self.ids.variant(id)? {
            Variant::Variable(var) => Ok(var.storage == StorageClass::UniformConstant
                || var.phi_variable
                || !self.expression_is_lvalue(id)?),
            Variant::Expression(e) => Ok(e.immutable),
            Variant::Constant(_) | Variant::ConstantOp(_) | Variant::Undef(_) => Ok(true),
            _ => Ok(false),
        }
    }

    /// Returns the variable a pointer expression was derived from.
    pub fn maybe_get_backing_variable(&self, chain: Id) -> Option<Id> {
        if self.maybe_get::<Variable>(chain).is_some() {
            return Some(chain);
        }
        self.maybe_get::<Expression>(chain)
            .and_then(|e| e.loaded_from)
            .filter(|v| self.maybe_get::<Variable>(*v).is_some())
    }

    /// Writes through these variables may be observed via other pointers.
    pub fn variable_storage_is_aliased(&self, var: &Variable) -> Result<bool, IrError> {
        let ty = self.get::<Type>(var.basetype)?;
        let ssbo = self.has_decoration(ty.self_id, Decoration::BufferBlock);
        let image = ty.basetype == BaseType::Image;
        let counter = ty.basetype == BaseType::AtomicCounter;
        let restrict = self.has_decoration(var.self_id, Decoration::Restrict);
        Ok(!restrict && (ssbo || image || counter))
    }

    /// Returns the builtin of struct member `index`, if any.
    pub fn member_builtin(&self, ty: &Type, index: u32) -> Option<BuiltIn> {
        self.meta(ty.self_id).member(index).and_then(|m| m.builtin)
    }

    /// Returns `true` for builtins and for blocks containing builtin members.
    pub fn is_builtin_variable(&self, var: &Variable) -> bool {
        if var.compat_builtin || self.meta(var.self_id).decoration.builtin.is_some() {
            return true;
        }
        self.maybe_get::<Type>(var.basetype).is_some_and(|ty| {
            self.meta(ty.self_id)
                .members
                .iter()
                .any(|m| m.builtin.is_some())
        })
    }

    /// Returns `true` if `var` should not be declared or reflected.
    pub fn is_hidden_variable(&self, var: &Variable, include_builtins: bool) -> bool {
        if (self.is_builtin_variable(var) && !include_builtins) || var.remapped_variable {
            return true;
        }
        if self
            .combined_image_samplers
            .iter()
            .any(|c| c.combined_id == var.self_id)
        {
            return false;
        }
        match &self.active_interface_variables {
            Some(active) if storage_is_interface(var.storage) => !active.contains(&var.self_id),
            _ => false,
        }
    }

    /// Structural equality used to detect duplicated struct declarations.
    pub fn types_are_logically_equivalent(&self, a: &Type, b: &Type) -> bool {
        if a.basetype != b.basetype
            || a.width != b.width
            || a.vecsize != b.vecsize
            || a.columns != b.columns
            || a.array != b.array
        {
            return false;
        }
        if matches!(a.basetype, BaseType::Image | BaseType::SampledImage) && a.image != b.image {
            return false;
        }
        if a.member_types.len() != b.member_types.len() {
            return false;
        }
        a.member_types.iter().zip(&b.member_types).all(|(&ma, &mb)| {
            match (self.maybe_get::<Type>(ma), self.maybe_get::<Type>(mb)) {
                (Some(ta), Some(tb)) => self.types_are_logically_equivalent(ta, tb),
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_type(module: &mut Module, id: u32) -> Id {
        let id = Id::new(id);
        module
            .set(
                id,
                Type {
                    self_id: id,
                    basetype: BaseType::Float,
                    width: 32,
                    ..Type::default()
                },
            )
            .unwrap();
        id
    }

    #[test]
    fn to_name_falls_back_to_id() {
        let mut module = Module::with_bound(8);
        module.set_name(Id::new(3), "color");
        assert_eq!(module.to_name(Id::new(3), true), "color");
        assert_eq!(module.to_name(Id::new(4), true), "_4");
    }

    #[test]
    fn to_name_follows_struct_alias() {
        let mut module = Module::with_bound(8);
        let a = Id::new(1);
        let b = Id::new(2);
        module.set(a, Type { self_id: a, basetype: BaseType::Struct, ..Type::default() }).unwrap();
        module
            .set(
                b,
                Type {
                    self_id: b,
                    basetype: BaseType::Struct,
                    type_alias: Some(a),
                    ..Type::default()
                },
            )
            .unwrap();
        module.set_name(a, "Light");
        module.set_name(b, "Light_dup");
        assert_eq!(module.to_name(b, true), "Light");
        assert_eq!(module.to_name(b, false), "Light_dup");
    }

    #[test]
    fn increase_bound_grows_meta() {
        let mut module = Module::with_bound(4);
        let first = module.increase_bound_by(3);
        assert_eq!(first, Id::new(4));
        assert_eq!(module.bound(), 7);
        assert_eq!(module.meta.len(), 7);
        module.set_name(Id::new(6), "fresh");
        assert_eq!(module.name(Id::new(6)), "fresh");
    }

    #[test]
    fn immutable_rules() {
        let mut module = Module::with_bound(8);
        let f = float_type(&mut module, 1);
        let ptr = Id::new(2);
        module
            .set(
                ptr,
                Type {
                    self_id: f,
                    basetype: BaseType::Float,
                    width: 32,
                    pointer: true,
                    storage: StorageClass::Function,
                    ..Type::default()
                },
            )
            .unwrap();
        module
            .set(Id::new(3), Variable::new(Id::new(3), ptr, StorageClass::Function, None))
            .unwrap();
        module
            .set(Id::new(4), Constant::scalar_bits(f, 0))
            .unwrap();
        assert!(!module.is_immutable(Id::new(3)).unwrap());
        assert!(module.is_immutable(Id::new(4)).unwrap());
        module.get_mut::<Variable>(Id::new(3)).unwrap().phi_variable = true;
        assert!(module.is_immutable(Id::new(3)).unwrap());
    }

    #[test]
    fn unknown_entry_point_errors() {
        let mut module = Module::with_bound(2);
        assert!(matches!(module.entry_point(), Err(IrError::NoEntryPoint)));
        assert!(matches!(
            module.set_entry_point("nope"),
            Err(IrError::UnknownEntryPoint(_))
        ));
    }
}
