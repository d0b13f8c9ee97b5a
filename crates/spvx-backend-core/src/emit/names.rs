//! Name caches and reserved-word handling.

use std::collections::HashSet;

use spvx_ir::{Id, Variable, update_name_cache};

use super::{Dialect, Emitter};

/// Identifiers GLSL reserves, which a user variable name must not shadow.
pub const GLSL_KEYWORDS: &[&str] = &[
    "active", "asm", "atomic_uint", "attribute", "bool", "break", "bvec2", "bvec3", "bvec4", "case",
    "cast", "centroid", "class", "coherent", "common", "const", "continue", "default", "discard",
    "dmat2", "dmat2x2", "dmat2x3", "dmat2x4", "dmat3", "dmat3x2", "dmat3x3", "dmat3x4", "dmat4",
    "dmat4x2", "dmat4x3", "dmat4x4", "do", "double", "dvec2", "dvec3", "dvec4", "else", "enum",
    "extern", "external", "false", "filter", "fixed", "flat", "float", "for", "fvec2", "fvec3",
    "fvec4", "goto", "half", "highp", "hvec2", "hvec3", "hvec4", "if", "iimage1D", "iimage1DArray",
    "iimage2D", "iimage2DArray", "iimage2DMS", "iimage2DMSArray", "iimage2DRect", "iimage3D",
    "iimageBuffer", "iimageCube", "iimageCubeArray", "image1D", "image1DArray", "image2D",
    "image2DArray", "image2DMS", "image2DMSArray", "image2DRect", "image3D", "imageBuffer",
    "imageCube", "imageCubeArray", "in", "inline", "inout", "input", "int", "interface",
    "invariant", "isampler1D", "isampler1DArray", "isampler2D", "isampler2DArray", "isampler2DMS",
    "isampler2DMSArray", "isampler2DRect", "isampler3D", "isamplerBuffer", "isamplerCube",
    "isamplerCubeArray", "ivec2", "ivec3", "ivec4", "layout", "long", "lowp", "mat2", "mat2x2",
    "mat2x3", "mat2x4", "mat3", "mat3x2", "mat3x3", "mat3x4", "mat4", "mat4x2", "mat4x3", "mat4x4",
    "mediump", "namespace", "noinline", "noperspective", "out", "output", "packed", "partition",
    "patch", "precision", "public", "readonly", "resource", "restrict", "return", "row_major",
    "sample", "sampler1D", "sampler1DArray", "sampler1DArrayShadow", "sampler1DShadow",
    "sampler2D", "sampler2DArray", "sampler2DArrayShadow", "sampler2DMS", "sampler2DMSArray",
    "sampler2DRect", "sampler2DRectShadow", "sampler2DShadow", "sampler3D", "sampler3DRect",
    "samplerBuffer", "samplerCube", "samplerCubeArray", "samplerCubeArrayShadow",
    "samplerCubeShadow", "short", "sizeof", "smooth", "static", "struct", "subroutine", "superp",
    "switch", "template", "this", "true", "typedef", "uimage1D", "uimage1DArray", "uimage2D",
    "uimage2DArray", "uimage2DMS", "uimage2DMSArray", "uimage2DRect", "uimage3D", "uimageBuffer",
    "uimageCube", "uimageCubeArray", "uint", "uniform", "union", "unsigned", "usampler1D",
    "usampler1DArray", "usampler2D", "usampler2DArray", "usampler2DMS", "usampler2DMSArray",
    "usampler2DRect", "usampler3D", "usamplerBuffer", "usamplerCube", "usamplerCubeArray",
    "using", "uvec2", "uvec3", "uvec4", "varying", "vec2", "vec3", "vec4", "void", "volatile",
    "while", "writeonly",
];

/// Names starting with `_<digit>` belong to compiler temporaries.
fn is_reserved_temporary(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0] == b'_' && bytes[1].is_ascii_digit()
}

/// Claims the name of `id` in `cache`, suffixing it on collision.
fn claim(module: &mut spvx_ir::Module, cache: &mut HashSet<String>, id: Id) {
    let alias = &mut module.meta_mut(id).decoration.alias;
    if alias.is_empty() {
        return;
    }
    if is_reserved_temporary(alias) {
        alias.clear();
        return;
    }
    update_name_cache(cache, alias);
}

impl<D: Dialect> Emitter<'_, D> {
    /// Makes the name of a global resource unique among resources.
    pub fn add_resource_name(&mut self, id: Id) {
        claim(&mut self.module, &mut self.resource_names, id);
    }

    /// Makes the name of a local unique within the current function.
    pub fn add_local_variable_name(&mut self, id: Id) {
        claim(&mut self.module, &mut self.local_variable_names, id);
    }

    /// Makes member `index` of struct `ty` unique within the struct.
    pub fn add_member_name(&mut self, ty: Id, index: u32, cache: &mut HashSet<String>) {
        let alias = &mut self.module.meta_mut(ty).member_mut(index).alias;
        if alias.is_empty() {
            return;
        }
        if is_reserved_temporary(alias) {
            alias.clear();
            return;
        }
        update_name_cache(cache, alias);
    }

    /// Prefixes user variables that collide with GLSL keywords or the
    /// `gl_` namespace with `_`.
    pub fn replace_illegal_names(&mut self) {
        let vars: Vec<Id> = self.module.ids.ids_of::<Variable>();
        for id in vars {
            let hidden = self
                .module
                .maybe_get::<Variable>(id)
                .is_none_or(|v| self.module.is_hidden_variable(v, false));
            if hidden {
                continue;
            }
            let alias = &mut self.module.meta_mut(id).decoration.alias;
            if alias.starts_with("gl_") || GLSL_KEYWORDS.contains(&alias.as_str()) {
                alias.insert(0, '_');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use spirv::StorageClass;
    use spvx_ir::{BaseType, Module};

    use crate::emit::testing::{pointer, scalar, variable, with_emitter};

    #[test]
    fn keywords_and_gl_names_are_prefixed() {
        let mut module = Module::with_bound(8);
        let f = scalar(&mut module, 1, BaseType::Float);
        let ptr = pointer(&mut module, 2, f, StorageClass::Private);
        variable(&mut module, 3, ptr, StorageClass::Private, "sample");
        variable(&mut module, 4, ptr, StorageClass::Private, "gl_Thing");
        variable(&mut module, 5, ptr, StorageClass::Private, "color");
        with_emitter(module, |em| {
            em.replace_illegal_names();
            assert_eq!(em.module.name(spvx_ir::Id::new(3)), "_sample");
            assert_eq!(em.module.name(spvx_ir::Id::new(4)), "_gl_Thing");
            assert_eq!(em.module.name(spvx_ir::Id::new(5)), "color");
        });
    }

    #[test]
    fn colliding_locals_get_suffixes() {
        let mut module = Module::with_bound(8);
        let f = scalar(&mut module, 1, BaseType::Float);
        let ptr = pointer(&mut module, 2, f, StorageClass::Function);
        variable(&mut module, 3, ptr, StorageClass::Function, "tmp");
        variable(&mut module, 4, ptr, StorageClass::Function, "tmp");
        with_emitter(module, |em| {
            em.add_local_variable_name(spvx_ir::Id::new(3));
            em.add_local_variable_name(spvx_ir::Id::new(4));
            assert_eq!(em.module.name(spvx_ir::Id::new(3)), "tmp");
            assert_ne!(em.module.name(spvx_ir::Id::new(4)), "tmp");
            assert!(em.module.name(spvx_ir::Id::new(4)).starts_with("tmp_"));
        });
    }
}
