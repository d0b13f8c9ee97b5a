//! GLSL backend for spvx.
//!
//! Emits desktop GLSL, GLSL ES and Vulkan GLSL from a parsed SPIR-V module.
//! All three share one [`dialect::Glsl`]; the flavor only decides the
//! profile and whether Vulkan-only constructs (push constant blocks,
//! separate samplers, `constant_id`) survive.

mod dialect;
mod layout;

use log::debug;
use spirv::{BuiltIn, ExecutionModel};
use spvx_backend_core::emit::compile;
use spvx_backend_core::{
    Backend, BackendError, BackendOptions, BackendOutput, Diagnostic, DiagnosticLevel,
    OutputContent, OutputFile,
};
use spvx_ir::{Module, Variable};

pub use dialect::{Glsl, PlsSlot};
pub use layout::{is_std430_packing, std430_alignment, std430_array_stride, std430_size};

/// Which GLSL profile a [`GlslBackend`] emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlslFlavor {
    Desktop,
    Es,
    Vulkan,
}

/// GLSL backend for one profile.
#[derive(Debug)]
pub struct GlslBackend {
    flavor: GlslFlavor,
}

impl GlslBackend {
    pub const fn new(flavor: GlslFlavor) -> Self {
        Self { flavor }
    }

    /// One backend per profile, ready for registration.
    pub fn all() -> Vec<Box<dyn Backend>> {
        [GlslFlavor::Desktop, GlslFlavor::Es, GlslFlavor::Vulkan]
            .into_iter()
            .map(|flavor| Box::new(Self::new(flavor)) as Box<dyn Backend>)
            .collect()
    }
}

/// Conventional file extension of a stage.
fn stage_extension(model: ExecutionModel) -> &'static str {
    match model {
        ExecutionModel::Vertex => "vert",
        ExecutionModel::Fragment => "frag",
        ExecutionModel::GLCompute => "comp",
        ExecutionModel::Geometry => "geom",
        ExecutionModel::TessellationControl => "tesc",
        ExecutionModel::TessellationEvaluation => "tese",
        _ => "glsl",
    }
}

fn uses_instance_index(module: &Module) -> bool {
    module
        .ids
        .iter::<Variable>()
        .any(|(id, _)| module.meta(id).decoration.builtin == Some(BuiltIn::InstanceIndex))
}

impl Backend for GlslBackend {
    fn name(&self) -> &str {
        match self.flavor {
            GlslFlavor::Desktop => "GLSL",
            GlslFlavor::Es => "GLSL ES",
            GlslFlavor::Vulkan => "Vulkan GLSL",
        }
    }

    fn targets(&self) -> &[&str] {
        match self.flavor {
            GlslFlavor::Desktop => &["glsl"],
            GlslFlavor::Es => &["glsl-es"],
            GlslFlavor::Vulkan => &["vulkan"],
        }
    }

    fn compile(
        &self,
        module: &Module,
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let mut options = opts.compiler.clone();
        match self.flavor {
            GlslFlavor::Desktop => {
                options.es = false;
                if options.version.is_none() && module.source.es {
                    debug!("module was written in ESSL, emitting desktop GLSL 450");
                    options.version = Some(450);
                }
            }
            GlslFlavor::Es => options.es = true,
            GlslFlavor::Vulkan => options.vulkan_semantics = true,
        }

        let source = compile(module, &options, Glsl::default())?;

        let mut selected = module.clone();
        if let Some(name) = &options.entry_point {
            selected.set_entry_point(name)?;
        }
        let model = selected.entry_point()?.model;

        let mut diagnostics = Vec::new();
        if !options.vulkan_semantics && uses_instance_index(module) {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Warning,
                message: "gl_InstanceIndex is emulated; the application must set the \
                          spvx_BaseInstance uniform"
                    .into(),
            });
        }

        Ok(BackendOutput {
            files: vec![OutputFile {
                name: format!("shader.{}", stage_extension(model)),
                content: OutputContent::Text(source),
            }],
            diagnostics,
        })
    }
}
