#![no_main]

use libfuzzer_sys::fuzz_target;
use spvx_backend_core::{Backend, BackendOptions};
use spvx_backend_glsl::{GlslBackend, GlslFlavor};

fuzz_target!(|data: &[u8]| {
    // Anything the parser accepts must compile or fail with an error.
    if let Ok(module) = spvx_parser::parse_bytes(data) {
        let backend = GlslBackend::new(GlslFlavor::Desktop);
        let _ = backend.compile(&module, &BackendOptions::default());
    }
});
