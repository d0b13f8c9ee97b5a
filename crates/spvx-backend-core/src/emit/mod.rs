//! The GLSL-family emission engine.
//!
//! One [`Emitter`] runs one pass over a private copy of the module. A pass
//! either produces the final source or asks for another pass because a
//! decision it already committed to text turned out to be wrong; the
//! [`driver`] records that decision in [`Legalization`] and starts over.
//!
//! The engine is split by concern:
//!
//! - [`types`]: type spelling, qualifiers and declarations.
//! - [`constant`]: literal and specialization-constant expressions.
//! - [`tracker`]: forwarding, invalidation and temporaries.
//! - [`access`]: access chains, swizzles and composite construction.
//! - [`instr`], [`ext`], [`texture`]: per-opcode lowering.
//! - [`flow`]: functions and structured control flow.

pub mod access;
pub mod constant;
pub mod dialect;
pub mod driver;
pub mod ext;
pub mod flow;
pub mod instr;
pub mod names;
pub mod texture;
pub mod tracker;
pub mod types;

use std::collections::{HashMap, HashSet};

use log::debug;
use spirv::ExecutionModel;
use spvx_analysis::Purity;
use spvx_ir::{EntryPoint, Id, Module};

use crate::BackendError;
use crate::options::CompilerOptions;

pub use dialect::{Dialect, DialectTraits};
pub use driver::{Legalization, MAX_PASSES, PassOutcome, compile, run_to_fixpoint};

/// State of one emission pass.
pub struct Emitter<'a, D: Dialect> {
    /// The pass-private module; expressions and emission flags on it are
    /// discarded with the pass.
    pub module: Module,
    /// Options of the compile this pass belongs to.
    pub options: &'a CompilerOptions,
    /// Decisions that survive into later passes.
    pub legal: &'a mut Legalization,
    /// The target's hooks and per-compile state.
    pub dialect: D,
    /// Spelling switches, copied from the dialect.
    pub traits: DialectTraits,
    /// Effective language version.
    pub version: u32,
    /// Whether the effective language is an ES profile.
    pub es: bool,

    buffer: String,
    redirect: Option<Vec<String>>,
    indent: u32,
    /// Statements emitted so far.
    pub statement_count: u32,
    recompile: Option<String>,

    /// Forwarded expressions that read a variable written since.
    pub invalid_expressions: HashSet<Id>,
    pub(crate) usage_counts: HashMap<Id, u32>,
    /// Results whose text is substituted instead of stored.
    pub forwarded_temporaries: HashSet<Id>,
    pub(crate) suppressed_usage_tracking: HashSet<Id>,
    /// Names claimed by global resources.
    pub resource_names: HashSet<String>,
    /// Names claimed inside the current function.
    pub local_variable_names: HashSet<String>,

    /// The function being emitted.
    pub current_function: Option<Id>,
    /// The continue block being folded into a `for` header.
    pub current_continue_block: Option<Id>,
    /// Whether the entry point's body is being emitted.
    pub processing_entry_point: bool,
    pub(crate) purity: Purity,
}

impl<'a, D: Dialect> Emitter<'a, D> {
    /// Starts a pass over `module` at the given `(version, es)` language.
    pub fn new(
        module: Module,
        options: &'a CompilerOptions,
        legal: &'a mut Legalization,
        dialect: D,
        (version, es): (u32, bool),
    ) -> Self {
        let purity = Purity::new(&module);
        let traits = dialect.traits();
        Self {
            module,
            options,
            legal,
            dialect,
            traits,
            version,
            es,
            buffer: String::new(),
            redirect: None,
            indent: 0,
            statement_count: 0,
            recompile: None,
            invalid_expressions: HashSet::new(),
            usage_counts: HashMap::new(),
            forwarded_temporaries: HashSet::new(),
            suppressed_usage_tracking: HashSet::new(),
            resource_names: HashSet::new(),
            local_variable_names: HashSet::new(),
            current_function: None,
            current_continue_block: None,
            processing_entry_point: false,
            purity,
        }
    }

    /// Runs the pass and returns its text and recompile request.
    pub fn run(mut self) -> Result<PassOutcome, BackendError> {
        D::emit_source(&mut self)?;
        Ok(PassOutcome {
            source: self.buffer,
            recompile: self.recompile,
        })
    }

    /// Header, resources, then the entry point and everything it calls.
    pub fn default_emit_source(&mut self) -> Result<(), BackendError> {
        D::emit_header(self)?;
        D::emit_resources(self)?;
        let entry = self.entry_function()?;
        self.emit_function(entry)
    }

    // ---- output ----

    /// Emits one line at the current indentation.
    pub fn statement(&mut self, text: &str) {
        self.statement_count += 1;
        if let Some(lines) = &mut self.redirect {
            lines.push(text.to_string());
            return;
        }
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.buffer.push_str("    ");
            }
            self.buffer.push_str(text);
        }
        self.buffer.push('\n');
    }

    /// Emits text without indentation, for preprocessor lines.
    pub fn statement_no_indent(&mut self, text: &str) {
        self.statement_count += 1;
        self.buffer.push_str(text);
        self.buffer.push('\n');
    }

    /// Opens a `{` scope.
    pub fn begin_scope(&mut self) {
        self.statement("{");
        self.indent += 1;
    }

    /// Closes the innermost scope.
    pub fn end_scope(&mut self) -> Result<(), BackendError> {
        self.pop_indent()?;
        self.statement("}");
        Ok(())
    }

    /// Closes a scope that ends a declaration, as in `} name;`.
    pub fn end_scope_decl(&mut self, decl: &str) -> Result<(), BackendError> {
        self.pop_indent()?;
        if decl.is_empty() {
            self.statement("};");
        } else {
            self.statement(&format!("}} {decl};"));
        }
        Ok(())
    }

    fn pop_indent(&mut self) -> Result<(), BackendError> {
        self.indent = self
            .indent
            .checked_sub(1)
            .ok_or_else(|| BackendError::Internal("popping an empty indent stack".into()))?;
        Ok(())
    }

    /// Collects statements into a list instead of the output until
    /// [`Emitter::end_redirect`]. Returns the enclosing redirect, if any.
    pub(crate) fn begin_redirect(&mut self) -> Option<Vec<String>> {
        self.redirect.replace(Vec::new())
    }

    /// Restores `saved` and returns the statements collected since the
    /// matching [`Emitter::begin_redirect`].
    pub(crate) fn end_redirect(&mut self, saved: Option<Vec<String>>) -> Vec<String> {
        std::mem::replace(&mut self.redirect, saved).unwrap_or_default()
    }

    // ---- pass control ----

    /// Requests another pass. The first reason of a pass is kept.
    pub fn force_recompile(&mut self, reason: impl Into<String>) {
        if self.recompile.is_none() {
            let reason = reason.into();
            debug!("recompile requested: {reason}");
            self.recompile = Some(reason);
        }
    }

    /// Whether this pass asked for another one.
    pub fn recompile_requested(&self) -> bool {
        self.recompile.is_some()
    }

    /// Makes `ext` part of the header, restarting if it was not already.
    pub fn require_extension(&mut self, ext: &str) {
        if !self.legal.extensions.iter().any(|e| e == ext) {
            self.legal.extensions.push(ext.to_string());
            self.force_recompile(format!("extension {ext} required"));
        }
    }

    // ---- language queries ----

    /// Pre-GLSL 1.30 or pre-ESSL 3.00.
    pub fn is_legacy(&self) -> bool {
        (self.es && self.version < 300) || (!self.es && self.version < 130)
    }

    /// ESSL 1.00.
    pub fn is_legacy_es(&self) -> bool {
        self.es && self.version < 300
    }

    /// Desktop GLSL before 1.30.
    pub fn is_legacy_desktop(&self) -> bool {
        !self.es && self.version < 130
    }

    /// The active entry point.
    pub fn execution(&self) -> Result<&EntryPoint, BackendError> {
        Ok(self.module.entry_point()?)
    }

    /// Stage of the active entry point.
    pub fn execution_model(&self) -> Result<ExecutionModel, BackendError> {
        Ok(self.execution()?.model)
    }

    /// Function id of the active entry point.
    pub fn entry_function(&self) -> Result<Id, BackendError> {
        Ok(self.execution()?.self_id)
    }

    /// Whether the function being emitted is the entry point.
    pub fn in_entry_function(&self) -> bool {
        self.current_function.is_some() && self.current_function == self.module.entry_point
    }

    /// The identifier `id` is emitted under, following aliases.
    pub fn to_name(&self, id: Id) -> String {
        D::to_name(self, id, true)
    }

    /// The identifier `id` is emitted under, ignoring aliases.
    pub fn to_name_no_alias(&self, id: Id) -> String {
        D::to_name(self, id, false)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A minimal dialect and module builder for engine unit tests.

    use spirv::StorageClass;
    use spvx_ir::{BaseType, Constant, Id, Module, Type, Variable};

    use super::*;

    #[derive(Clone, Debug, Default)]
    pub struct Plain;

    impl Dialect for Plain {
        fn emit_header(em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
            em.statement("// header");
            Ok(())
        }

        fn emit_resources(_em: &mut Emitter<'_, Self>) -> Result<(), BackendError> {
            Ok(())
        }
    }

    pub fn scalar(module: &mut Module, id: u32, basetype: BaseType) -> Id {
        let id = Id::new(id);
        module
            .set(
                id,
                Type {
                    self_id: id,
                    basetype,
                    width: 32,
                    ..Type::default()
                },
            )
            .unwrap();
        id
    }

    pub fn vector(module: &mut Module, id: u32, base: Id, vecsize: u32) -> Id {
        let id = Id::new(id);
        let mut ty = module.get::<Type>(base).unwrap().clone();
        ty.self_id = id;
        ty.vecsize = vecsize;
        module.set(id, ty).unwrap();
        id
    }

    pub fn pointer(module: &mut Module, id: u32, base: Id, storage: StorageClass) -> Id {
        let id = Id::new(id);
        let mut ty = module.get::<Type>(base).unwrap().clone();
        ty.pointer = true;
        ty.storage = storage;
        ty.parent_type = Some(base);
        module.set(id, ty).unwrap();
        id
    }

    pub fn variable(module: &mut Module, id: u32, ptr: Id, storage: StorageClass, name: &str) -> Id {
        let id = Id::new(id);
        module.set(id, Variable::new(id, ptr, storage, None)).unwrap();
        module.set_name(id, name);
        id
    }

    pub fn constant_f32(module: &mut Module, id: u32, ty: Id, value: f32) -> Id {
        let id = Id::new(id);
        let mut c = Constant::scalar_bits(ty, u64::from(value.to_bits()));
        c.self_id = id;
        module.set(id, c).unwrap();
        id
    }

    pub fn with_emitter<R>(module: Module, f: impl FnOnce(&mut Emitter<'_, Plain>) -> R) -> R {
        let options = CompilerOptions::default();
        let mut legal = Legalization::default();
        let mut em = Emitter::new(module, &options, &mut legal, Plain, (450, false));
        f(&mut em)
    }

    pub fn output<'a, D: Dialect>(em: &'a Emitter<'_, D>) -> &'a str {
        &em.buffer
    }

    #[test]
    fn statements_are_indented() {
        with_emitter(Module::with_bound(1), |em| {
            em.statement("void f()");
            em.begin_scope();
            em.statement("x = 1;");
            em.statement("");
            em.end_scope().unwrap();
            assert_eq!(output(em), "void f()\n{\n    x = 1;\n\n}\n");
            assert_eq!(em.statement_count, 5);
        });
    }

    #[test]
    fn unbalanced_scope_is_internal() {
        with_emitter(Module::with_bound(1), |em| {
            let err = em.end_scope().unwrap_err();
            assert_eq!(err.class(), spvx_ir::ErrorClass::Internal);
        });
    }

    #[test]
    fn redirect_collects_statements() {
        with_emitter(Module::with_bound(1), |em| {
            let outer = em.begin_redirect();
            em.statement("i++;");
            let inner = em.begin_redirect();
            em.statement("j++;");
            assert_eq!(em.end_redirect(inner), vec!["j++;".to_string()]);
            em.statement("k++;");
            let lines = em.end_redirect(outer);
            assert_eq!(lines, vec!["i++;".to_string(), "k++;".to_string()]);
            assert!(output(em).is_empty());
        });
    }

    #[test]
    fn extensions_request_one_recompile() {
        with_emitter(Module::with_bound(1), |em| {
            em.require_extension("GL_EXT_texture_array");
            em.require_extension("GL_EXT_texture_array");
            assert!(em.recompile_requested());
            assert_eq!(em.legal.extensions, vec!["GL_EXT_texture_array".to_string()]);
        });
    }
}
