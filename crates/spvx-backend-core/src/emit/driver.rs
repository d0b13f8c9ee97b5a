//! The multi-pass fixpoint around [`Emitter`].
//!
//! Every pass starts from a fresh copy of the prepared module with the
//! accumulated [`Legalization`] applied to it. A pass that discovers a new
//! legalization decision records it and asks for another pass; the first
//! pass that asks for nothing produces the output.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use spirv::Decoration;
use spvx_ir::{Block, Function, Id, IrError, Module, VariantKind};

use super::{Dialect, Emitter};
use crate::BackendError;
use crate::options::CompilerOptions;

/// Upper bound on emission passes for one compile.
pub const MAX_PASSES: u32 = 3;

/// Decisions that survive from one pass into the next.
#[derive(Clone, Debug, Default)]
pub struct Legalization {
    /// Results that must be bound to a temporary instead of forwarded.
    pub forced_temporaries: HashSet<Id>,
    /// Extensions discovered while emitting, in discovery order.
    pub extensions: Vec<String>,
    /// Temporaries `(type, id)` declared ahead of a loop header because a
    /// continue block computes them.
    pub hoisted_temporaries: HashMap<Id, Vec<(Id, Id)>>,
    /// Function parameters stored to, which become `out`/`inout`.
    pub written_parameters: HashSet<Id>,
    /// Function parameters loaded from.
    pub read_parameters: HashSet<Id>,
    /// Speculative access decorations (`NonReadable`/`NonWritable`) that
    /// were contradicted by the code.
    pub cleared_decorations: HashSet<(Id, u32)>,
    /// Loop headers that fall back to `for (;;)`.
    pub disabled_loop_headers: HashSet<Id>,
    /// Continue blocks emitted inline at every continue site.
    pub complex_continues: HashSet<Id>,
    /// Loop headers whose loop variables are declared as plain locals.
    pub demoted_loop_headers: HashSet<Id>,
}

impl Legalization {
    /// Writes the decisions onto a fresh copy of the module.
    pub fn apply(&self, module: &mut Module) -> Result<(), IrError> {
        for (&header, temporaries) in &self.hoisted_temporaries {
            let block = module.get_mut::<Block>(header)?;
            for &tmp in temporaries {
                if !block.declare_temporary.contains(&tmp) {
                    block.declare_temporary.push(tmp);
                }
            }
        }

        for &header in &self.disabled_loop_headers {
            module.get_mut::<Block>(header)?.disable_block_optimization = true;
        }
        for &block in &self.complex_continues {
            module.get_mut::<Block>(block)?.complex_continue = true;
        }

        for &(id, decoration) in &self.cleared_decorations {
            if let Some(decoration) = Decoration::from_u32(decoration) {
                module.unset_decoration(id, decoration);
            }
        }

        for func in module.ids.ids_of::<Function>() {
            let func = module.get_mut::<Function>(func)?;
            for param in &mut func.arguments {
                if self.written_parameters.contains(&param.id) {
                    param.write_count = param.write_count.max(1);
                }
                if self.read_parameters.contains(&param.id) {
                    param.read_count = param.read_count.max(1);
                }
            }
        }
        Ok(())
    }
}

/// The result of one pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassOutcome {
    /// The emitted text.
    pub source: String,
    /// Why the pass must be repeated, if it must.
    pub recompile: Option<String>,
}

/// Runs passes until one needs no new legalization.
pub fn run_to_fixpoint<D: Dialect>(
    prepared: &Module,
    options: &CompilerOptions,
    dialect: &D,
    language: (u32, bool),
) -> Result<String, BackendError> {
    let mut legal = Legalization::default();
    run_passes(&mut legal, |legal| {
        let mut module = prepared.clone();
        legal.apply(&mut module)?;
        Emitter::new(module, options, legal, dialect.clone(), language).run()
    })
}

/// The fixpoint loop itself, over any pass function.
pub fn run_passes(
    legal: &mut Legalization,
    mut pass: impl FnMut(&mut Legalization) -> Result<PassOutcome, BackendError>,
) -> Result<String, BackendError> {
    for count in 1..=MAX_PASSES {
        let outcome = pass(legal)?;
        match outcome.recompile {
            None => {
                info!("compiled in {count} pass(es)");
                return Ok(outcome.source);
            }
            Some(reason) => debug!("pass {count} discarded: {reason}"),
        }
    }
    Err(BackendError::Internal(format!(
        "emission did not converge within {MAX_PASSES} passes"
    )))
}

/// The language version a compile targets: the configured one, else the
/// module's own, else GLSL 450.
pub fn resolve_language(module: &Module, options: &CompilerOptions) -> (u32, bool) {
    match options.version {
        Some(version) => (version, options.es),
        None if module.source.known => (module.source.version, module.source.es || options.es),
        None => (450, options.es),
    }
}

/// Renames every variable and type called `from` to `to`.
pub fn apply_renames(module: &mut Module, options: &CompilerOptions) {
    for rename in &options.renames {
        let targets: Vec<Id> = (1..module.bound())
            .map(Id::new)
            .filter(|&id| matches!(module.kind(id), VariantKind::Variable | VariantKind::Type))
            .filter(|&id| module.name(id) == rename.from)
            .collect();
        for id in targets {
            debug!("renaming {id} from {} to {}", rename.from, rename.to);
            module.set_name(id, &rename.to);
        }
    }
}

/// Prepares `module` for `dialect` and emits it.
pub fn compile<D: Dialect>(
    module: &Module,
    options: &CompilerOptions,
    mut dialect: D,
) -> Result<String, BackendError> {
    let mut prepared = module.clone();
    if let Some(name) = &options.entry_point {
        prepared.set_entry_point(name)?;
    }
    prepared.entry_point()?;
    apply_renames(&mut prepared, options);

    let (version, es) = resolve_language(&prepared, options);
    dialect.prepare(&mut prepared, options)?;
    let language = dialect.language_version(version, es);
    debug!("emitting for language version {} (es: {})", language.0, language.1);
    run_to_fixpoint(&prepared, options, &dialect, language)
}

#[cfg(test)]
mod tests {
    use spvx_ir::{ErrorClass, Parameter};

    use super::*;

    fn outcome(source: &str, recompile: Option<&str>) -> PassOutcome {
        PassOutcome {
            source: source.to_string(),
            recompile: recompile.map(str::to_string),
        }
    }

    #[test]
    fn first_stable_pass_wins() {
        let mut legal = Legalization::default();
        let mut passes = 0;
        let source = run_passes(&mut legal, |legal| {
            passes += 1;
            if legal.forced_temporaries.insert(Id::new(7)) {
                return Ok(outcome("stale", Some("forced 7")));
            }
            Ok(outcome("final", None))
        })
        .unwrap();
        assert_eq!(source, "final");
        assert_eq!(passes, 2);
    }

    #[test]
    fn endless_recompiles_are_internal_errors() {
        let mut legal = Legalization::default();
        let mut passes = 0;
        let err = run_passes(&mut legal, |_| {
            passes += 1;
            Ok(outcome("", Some("always")))
        })
        .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Internal);
        assert_eq!(passes, MAX_PASSES);
    }

    #[test]
    fn pass_errors_stop_the_loop() {
        let mut legal = Legalization::default();
        let err = run_passes(&mut legal, |_| Err(BackendError::Unsupported("x".into()))).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Unsupported);
    }

    #[test]
    fn apply_restores_decisions() {
        let mut module = Module::with_bound(16);
        let (func, header, param) = (Id::new(1), Id::new(2), Id::new(3));
        let mut f = Function::new(func, Id::new(0), Id::new(0));
        f.arguments.push(Parameter::new(Id::new(0), param));
        module.set(func, f).unwrap();
        module.set(header, Block::new(header)).unwrap();
        module.set_decoration(param, Decoration::NonWritable, 0);

        let mut legal = Legalization::default();
        legal.written_parameters.insert(param);
        legal.disabled_loop_headers.insert(header);
        legal.hoisted_temporaries.insert(header, vec![(Id::new(4), Id::new(5))]);
        legal.cleared_decorations.insert((param, Decoration::NonWritable as u32));

        legal.apply(&mut module).unwrap();
        legal.apply(&mut module).unwrap();

        let block = module.get::<Block>(header).unwrap();
        assert!(block.disable_block_optimization);
        assert_eq!(block.declare_temporary, vec![(Id::new(4), Id::new(5))]);
        let f = module.get::<Function>(func).unwrap();
        assert_eq!(f.arguments[0].write_count, 1);
        assert_eq!(f.arguments[0].read_count, 0);
        assert!(!module.has_decoration(param, Decoration::NonWritable));
    }

    #[test]
    fn version_falls_back_to_source_then_450() {
        let mut module = Module::with_bound(1);
        let mut options = CompilerOptions::default();
        assert_eq!(resolve_language(&module, &options), (450, false));

        module.source.known = true;
        module.source.version = 310;
        module.source.es = true;
        assert_eq!(resolve_language(&module, &options), (310, true));

        options.version = Some(330);
        options.es = false;
        assert_eq!(resolve_language(&module, &options), (330, false));
    }
}
