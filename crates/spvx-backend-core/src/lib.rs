//! Backend trait and shared emission engine for spvx.
//!
//! Defines the [`Backend`] trait that every target emitter implements,
//! along with supporting types ([`BackendOptions`], [`BackendOutput`],
//! [`BackendError`]) and a [`BackendRegistry`] for CLI dispatch.
//!
//! The [`emit`] module holds the GLSL-family emission engine that the GLSL,
//! MSL and C++ backends share. A backend supplies a [`emit::Dialect`] and
//! the engine drives parsing-independent work: expression forwarding,
//! structured control flow and the multi-pass fixpoint.

#![warn(missing_docs)]

use std::fmt::{self, Debug};

use spvx_ir::{ErrorClass, IrError, Module};
use spvx_parser::ParseError;

pub mod emit;
pub mod options;

pub use options::CompilerOptions;

/// A backend that compiles spvx IR to target-specific output.
pub trait Backend: Debug + Send + Sync {
    /// Human-readable name (e.g. "GLSL").
    fn name(&self) -> &str;

    /// Target identifiers this backend handles (for `--target` dispatch).
    fn targets(&self) -> &[&str];

    /// Compile a parsed module to backend-specific output.
    fn compile(&self, module: &Module, opts: &BackendOptions)
    -> Result<BackendOutput, BackendError>;

    /// Parse a SPIR-V binary and compile it.
    fn compile_spirv(
        &self,
        words: &[u32],
        opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let module = spvx_parser::parse(words)?;
        self.compile(&module, opts)
    }
}

/// Options passed to a backend during compilation.
#[derive(Clone, Debug, Default)]
pub struct BackendOptions {
    /// Language and legalization options shared by every target.
    pub compiler: CompilerOptions,
}

impl fmt::Display for BackendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.compiler;
        let version = c
            .version
            .map_or_else(|| "auto".to_string(), |v| v.to_string());
        write!(
            f,
            "BackendOptions {{ version: {version}, es: {}, vulkan: {}, force_temporary: {} }}",
            c.es, c.vulkan_semantics, c.force_temporary
        )
    }
}

/// The output produced by a backend.
#[derive(Clone, Debug)]
pub struct BackendOutput {
    /// One or more output files.
    pub files: Vec<OutputFile>,
    /// Non-fatal diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl BackendOutput {
    /// Returns the text of the first text file, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.files.iter().find_map(|f| match &f.content {
            OutputContent::Text(s) => Some(s.as_str()),
            OutputContent::Binary(_) => None,
        })
    }
}

impl fmt::Display for BackendOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s), {} diagnostic(s)",
            self.files.len(),
            self.diagnostics.len()
        )
    }
}

/// A single output file.
#[derive(Clone, Debug)]
pub struct OutputFile {
    /// Suggested filename (e.g. "shader.frag", "module.ir").
    pub name: String,
    /// The file content.
    pub content: OutputContent,
}

impl fmt::Display for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Content of an output file.
#[derive(Clone, Debug)]
pub enum OutputContent {
    /// UTF-8 text.
    Text(String),
    /// Raw binary data.
    Binary(Vec<u8>),
}

impl fmt::Display for OutputContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "Text({} chars)", s.len()),
            Self::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
        }
    }
}

/// A non-fatal diagnostic message from a backend.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity level.
    pub level: DiagnosticLevel,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Severity of a [`Diagnostic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// Something the user should look at.
    Warning,
    /// Informational only.
    Info,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Warning => "Warning",
            Self::Info => "Info",
        })
    }
}

/// Errors that can occur during backend compilation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The module is valid but the target cannot express it.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The module lacks something emission needs.
    #[error("malformed module: {0}")]
    Malformed(String),
    /// An invariant of the emitter itself was violated.
    #[error("internal error: {0}")]
    Internal(String),
    /// The SPIR-V binary could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// An IR query failed.
    #[error(transparent)]
    Ir(#[from] IrError),
}

impl BackendError {
    /// Returns the error class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Unsupported(_) => ErrorClass::Unsupported,
            Self::Malformed(_) => ErrorClass::MalformedInput,
            Self::Internal(_) => ErrorClass::Internal,
            Self::Parse(e) => e.class(),
            Self::Ir(e) => e.class(),
        }
    }
}

/// Registry of available backends, used for CLI `--target` dispatch.
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Creates a registry pre-populated with built-in backends.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(IrDumpBackend));
        reg
    }

    /// Registers a backend.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Finds a backend that handles the given target identifier.
    pub fn find(&self, target: &str) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.targets().contains(&target))
            .map(|b| &**b)
    }

    /// Lists all supported target identifiers.
    pub fn list_targets(&self) -> Vec<&str> {
        self.backends
            .iter()
            .flat_map(|b| b.targets().iter().copied())
            .collect()
    }
}

/// Built-in backend that dumps the IR as text using [`spvx_ir::dump_module`].
#[derive(Debug)]
pub struct IrDumpBackend;

impl Backend for IrDumpBackend {
    fn name(&self) -> &str {
        "IR Dump"
    }

    fn targets(&self) -> &[&str] {
        &["ir-dump", "ir"]
    }

    fn compile(
        &self,
        module: &Module,
        _opts: &BackendOptions,
    ) -> Result<BackendOutput, BackendError> {
        let text = spvx_ir::dump_module(module);
        Ok(BackendOutput {
            files: vec![OutputFile {
                name: "module.ir".into(),
                content: OutputContent::Text(text),
            }],
            diagnostics: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_dump_backend_targets() {
        let backend = IrDumpBackend;
        assert_eq!(backend.name(), "IR Dump");
        assert!(backend.targets().contains(&"ir-dump"));
        assert!(backend.targets().contains(&"ir"));
    }

    #[test]
    fn ir_dump_backend_compile() {
        let module = Module::default();
        let opts = BackendOptions::default();
        let output = IrDumpBackend.compile(&module, &opts).unwrap();
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files[0].name, "module.ir");
        match &output.files[0].content {
            OutputContent::Text(text) => assert!(text.contains("Types:")),
            _ => panic!("expected text output"),
        }
    }

    #[test]
    fn compile_spirv_reports_parse_errors() {
        let err = IrDumpBackend
            .compile_spirv(&[0x0723_0203, 0x0001_0000], &BackendOptions::default())
            .unwrap_err();
        assert!(matches!(err, BackendError::Parse(_)));
        assert_eq!(err.class(), ErrorClass::MalformedInput);
    }

    #[test]
    fn registry_find_builtin() {
        let reg = BackendRegistry::with_builtins();
        assert!(reg.find("ir-dump").is_some());
        assert!(reg.find("ir").is_some());
        assert!(reg.find("nonexistent").is_none());
    }

    #[test]
    fn registry_list_targets() {
        let reg = BackendRegistry::with_builtins();
        let targets = reg.list_targets();
        assert!(targets.contains(&"ir-dump"));
        assert!(targets.contains(&"ir"));
    }

    #[test]
    fn registry_custom_backend() {
        #[derive(Debug)]
        struct TestBackend;
        impl Backend for TestBackend {
            fn name(&self) -> &str {
                "Test"
            }
            fn targets(&self) -> &[&str] {
                &["test-target"]
            }
            fn compile(
                &self,
                _module: &Module,
                _opts: &BackendOptions,
            ) -> Result<BackendOutput, BackendError> {
                Ok(BackendOutput {
                    files: vec![],
                    diagnostics: vec![],
                })
            }
        }

        let mut reg = BackendRegistry::new();
        reg.register(Box::new(TestBackend));
        assert!(reg.find("test-target").is_some());
        assert_eq!(reg.find("test-target").unwrap().name(), "Test");
    }

    #[test]
    fn display_backend_options() {
        let mut opts = BackendOptions::default();
        opts.compiler.version = Some(310);
        opts.compiler.es = true;
        let s = format!("{opts}");
        assert!(s.contains("version: 310"));
        assert!(s.contains("es: true"));
        assert!(format!("{}", BackendOptions::default()).contains("version: auto"));
    }

    #[test]
    fn display_backend_output() {
        let output = BackendOutput {
            files: vec![
                OutputFile {
                    name: "a.bin".into(),
                    content: OutputContent::Binary(vec![1, 2, 3]),
                },
                OutputFile {
                    name: "b.txt".into(),
                    content: OutputContent::Text("hello".into()),
                },
            ],
            diagnostics: vec![Diagnostic {
                level: DiagnosticLevel::Info,
                message: "done".into(),
            }],
        };
        assert_eq!(format!("{output}"), "2 file(s), 1 diagnostic(s)");
        assert_eq!(output.first_text(), Some("hello"));
    }

    #[test]
    fn display_output_file() {
        let f = OutputFile {
            name: "shader.frag".into(),
            content: OutputContent::Binary(vec![]),
        };
        assert_eq!(format!("{f}"), "shader.frag");
    }

    #[test]
    fn display_output_content_all_variants() {
        assert_eq!(
            format!("{}", OutputContent::Text("abc".into())),
            "Text(3 chars)"
        );
        assert_eq!(
            format!("{}", OutputContent::Binary(vec![0; 100])),
            "Binary(100 bytes)"
        );
    }

    #[test]
    fn display_diagnostic_and_level() {
        let warn = Diagnostic {
            level: DiagnosticLevel::Warning,
            message: "unmapped GLSL.std.450 op".into(),
        };
        assert_eq!(format!("{warn}"), "[Warning] unmapped GLSL.std.450 op");
        assert_eq!(format!("{}", DiagnosticLevel::Info), "Info");
    }

    #[test]
    fn registry_default_is_empty() {
        assert!(BackendRegistry::default().list_targets().is_empty());
        assert!(BackendRegistry::new().list_targets().is_empty());
    }

    #[test]
    fn backend_error_display_and_class() {
        let e1 = BackendError::Unsupported("int64 in ES".into());
        assert_eq!(format!("{e1}"), "unsupported: int64 in ES");
        assert_eq!(e1.class(), ErrorClass::Unsupported);

        let e2 = BackendError::Internal("indent underflow".into());
        assert_eq!(format!("{e2}"), "internal error: indent underflow");
        assert_eq!(e2.class(), ErrorClass::Internal);

        let e3 = BackendError::from(IrError::NoEntryPoint);
        assert_eq!(e3.class(), ErrorClass::MalformedInput);
    }
}
