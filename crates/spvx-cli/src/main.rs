use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use spirv::ExecutionModel;

use spvx_backend_core::options::{
    MslResourceBinding, MslVertexAttr, PUSH_CONSTANT_DESC_SET, PlsFormat, PlsRemap,
    ResourceRename,
};
use spvx_backend_core::{BackendOptions, BackendRegistry, CompilerOptions, OutputContent};

/// spvx: SPIR-V to GLSL, MSL and C++ translator
#[derive(Parser)]
#[command(about, disable_version_flag = true)]
struct Cli {
    /// Input SPIR-V binary
    input: PathBuf,

    /// Target backend (glsl, glsl-es, vulkan, msl, cpp, ir-dump)
    #[arg(short, long, default_value = "glsl")]
    target: String,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Shading-language version (default: the module's OpSource, else 450)
    #[arg(long = "version")]
    glsl_version: Option<u32>,

    /// Emit GLSL ES
    #[arg(long)]
    es: bool,

    /// Keep Vulkan-only constructs in GLSL output
    #[arg(long)]
    vulkan_semantics: bool,

    /// Store every value in a temporary
    #[arg(long)]
    force_temporary: bool,

    /// Remap clip-space Z from [-w, w] to [0, w]
    #[arg(long)]
    fixup_clipspace: bool,

    /// Invert the vertical axis of vertex positions (MSL)
    #[arg(long)]
    flip_vert_y: bool,

    /// Entry point to translate (default: the first one)
    #[arg(long)]
    entry: Option<String>,

    /// Rename a resource before emission (old=new)
    #[arg(long, value_parser = parse_rename)]
    rename: Vec<ResourceRename>,

    /// Extra extension to require
    #[arg(long)]
    extension: Vec<String>,

    /// Read a fragment input from pixel local storage (name=format)
    #[arg(long, value_parser = parse_pls)]
    pls_in: Vec<PlsRemap>,

    /// Write a fragment output to pixel local storage (name=format)
    #[arg(long, value_parser = parse_pls)]
    pls_out: Vec<PlsRemap>,

    /// Metal argument indices of a resource (stage:set:binding=buffer,texture,sampler)
    #[arg(long, value_parser = parse_msl_resource)]
    msl_resource: Vec<MslResourceBinding>,

    /// Metal vertex buffer placement of an attribute (loc=buffer,offset,stride[,instance])
    #[arg(long, value_parser = parse_msl_vertex_attr)]
    msl_vertex_attr: Vec<MslVertexAttr>,

    /// Print the shader's resources to stderr
    #[arg(long)]
    dump_resources: bool,
}

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    s.split_once('=')
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .ok_or_else(|| format!("expected 'key=value', got '{s}'"))
}

fn parse_u32(s: &str, what: &str) -> Result<u32, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("invalid {what} '{s}'"))
}

fn parse_rename(s: &str) -> Result<ResourceRename, String> {
    let (from, to) = split_pair(s)?;
    Ok(ResourceRename {
        from: from.to_string(),
        to: to.to_string(),
    })
}

fn parse_pls(s: &str) -> Result<PlsRemap, String> {
    let (name, format) = split_pair(s)?;
    let format = format.parse::<PlsFormat>().map_err(|e| e.to_string())?;
    Ok(PlsRemap {
        name: name.to_string(),
        format,
    })
}

fn parse_stage(s: &str) -> Result<ExecutionModel, String> {
    match s {
        "vert" | "vertex" => Ok(ExecutionModel::Vertex),
        "frag" | "fragment" => Ok(ExecutionModel::Fragment),
        "comp" | "compute" => Ok(ExecutionModel::GLCompute),
        _ => Err(format!(
            "invalid stage '{s}', expected vert, frag, or comp"
        )),
    }
}

fn parse_msl_resource(s: &str) -> Result<MslResourceBinding, String> {
    let (key, value) = split_pair(s)?;
    let key: Vec<&str> = key.split(':').collect();
    let value: Vec<&str> = value.split(',').collect();
    let ([stage, set, binding], [buffer, texture, sampler]) = (key.as_slice(), value.as_slice()) else {
        return Err(format!(
            "expected 'stage:set:binding=buffer,texture,sampler', got '{s}'"
        ));
    };
    let desc_set = if *set == "push" {
        PUSH_CONSTANT_DESC_SET
    } else {
        parse_u32(set, "descriptor set")?
    };
    Ok(MslResourceBinding {
        stage: parse_stage(stage)?,
        desc_set,
        binding: parse_u32(binding, "binding")?,
        msl_buffer: parse_u32(buffer, "buffer index")?,
        msl_texture: parse_u32(texture, "texture index")?,
        msl_sampler: parse_u32(sampler, "sampler index")?,
    })
}

fn parse_msl_vertex_attr(s: &str) -> Result<MslVertexAttr, String> {
    let (location, value) = split_pair(s)?;
    let value: Vec<&str> = value.split(',').collect();
    let (buffer, offset, stride, per_instance) = match value.as_slice() {
        [buffer, offset, stride] => (buffer, offset, stride, false),
        [buffer, offset, stride, "instance"] => (buffer, offset, stride, true),
        _ => {
            return Err(format!(
                "expected 'loc=buffer,offset,stride[,instance]', got '{s}'"
            ));
        }
    };
    Ok(MslVertexAttr {
        location: parse_u32(location, "location")?,
        msl_buffer: parse_u32(buffer, "buffer index")?,
        msl_offset: parse_u32(offset, "offset")?,
        msl_stride: parse_u32(stride, "stride")?,
        per_instance,
    })
}

impl Cli {
    fn compiler_options(&self) -> CompilerOptions {
        let mut options = CompilerOptions {
            version: self.glsl_version,
            es: self.es,
            vulkan_semantics: self.vulkan_semantics,
            force_temporary: self.force_temporary,
            entry_point: self.entry.clone(),
            renames: self.rename.clone(),
            extensions: self.extension.clone(),
            pls_inputs: self.pls_in.clone(),
            pls_outputs: self.pls_out.clone(),
            ..CompilerOptions::default()
        };
        options.vertex.fixup_clipspace = self.fixup_clipspace;
        options.msl.flip_vert_y = self.flip_vert_y;
        options.msl.resource_bindings = self.msl_resource.clone();
        options.msl.vertex_attributes = self.msl_vertex_attr.clone();
        options
    }
}

fn registry() -> BackendRegistry {
    let mut registry = BackendRegistry::with_builtins();
    for backend in spvx_backend_glsl::GlslBackend::all() {
        registry.register(backend);
    }
    registry.register(Box::new(spvx_backend_msl::MslBackend));
    registry.register(Box::new(spvx_backend_cpp::CppBackend));
    registry
}

fn dump_resources(module: &spvx_ir::Module, entry: Option<&str>) -> miette::Result<()> {
    let mut module = module.clone();
    if let Some(name) = entry {
        module
            .set_entry_point(name)
            .map_err(|e| miette::miette!("{e}"))?;
    }
    let entry_fn = module
        .entry_point()
        .map_err(|e| miette::miette!("{e}"))?
        .self_id;
    let active = spvx_analysis::reflect::get_active_interface_variables(&module, entry_fn)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("reflection failed")?;
    let resources = spvx_analysis::reflect::get_shader_resources(&module, Some(&active));

    eprintln!(
        "entry points: {}",
        spvx_analysis::reflect::get_entry_points(&module).join(", ")
    );
    eprint!(
        "{}",
        spvx_analysis::reflect::describe_resources(&module, &resources)
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    // 1. Read the binary.
    let bytes = std::fs::read(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Parse SPIR-V to IR.
    let module = spvx_parser::parse_bytes(&bytes)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("SPIR-V parse failed")?;

    // 3. Optionally reflect.
    if cli.dump_resources {
        dump_resources(&module, cli.entry.as_deref())?;
    }

    // 4. Backend dispatch.
    let registry = registry();
    let backend = registry.find(&cli.target).ok_or_else(|| {
        let available = registry.list_targets().join(", ");
        miette::miette!("unknown target '{}' (available: {})", cli.target, available)
    })?;

    let opts = BackendOptions {
        compiler: cli.compiler_options(),
    };
    log::debug!("compiling for {} with {opts}", backend.name());

    let output = backend
        .compile(&module, &opts)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("{} compilation failed", backend.name()))?;

    // 5. Print diagnostics.
    for diag in &output.diagnostics {
        eprintln!("{:?}: {}", diag.level, diag.message);
    }

    // 6. Write output. Nothing is written unless compilation succeeded.
    for file in &output.files {
        match (&cli.output, &file.content) {
            (Some(path), OutputContent::Text(text)) => {
                std::fs::write(path, text)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (Some(path), OutputContent::Binary(data)) => {
                std::fs::write(path, data)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (None, OutputContent::Text(text)) => {
                print!("{text}");
            }
            (None, OutputContent::Binary(_)) => {
                return Err(miette::miette!(
                    "backend produced binary output but no --output path was specified"
                ));
            }
        }
    }

    Ok(())
}
