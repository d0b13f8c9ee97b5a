//! Values, functions and blocks.

use spirv::StorageClass;

use crate::arena::Id;

/// One column (or the whole value, for vectors) of a [`Constant`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConstantVector {
    /// Raw lane bits; 32-bit lanes use the low half.
    pub lanes: [u64; 4],
    /// Lanes that refer to a specialization constant instead of a literal.
    pub ids: [Option<Id>; 4],
    pub vecsize: u32,
}

/// A scalar, vector, matrix or composite constant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constant {
    pub self_id: Id,
    pub constant_type: Id,
    pub columns: [ConstantVector; 4],
    /// Columns that refer to another constant instead of a literal vector.
    pub column_ids: [Option<Id>; 4],
    pub column_count: u32,
    /// Member constants of a struct or array constant.
    pub subconstants: Vec<Id>,
    /// Pipeline specialization constants are emitted by name, never inlined.
    pub specialization: bool,
}

impl Constant {
    /// A scalar constant from raw lane bits.
    pub fn scalar_bits(constant_type: Id, bits: u64) -> Self {
        let mut c = Self {
            constant_type,
            column_count: 1,
            ..Self::default()
        };
        c.columns[0].vecsize = 1;
        c.columns[0].lanes[0] = bits;
        c
    }

    /// A vector constant from its lanes.
    pub fn vector(constant_type: Id, vector: ConstantVector) -> Self {
        let mut c = Self {
            constant_type,
            column_count: 1,
            ..Self::default()
        };
        c.columns[0] = vector;
        c
    }

    /// A matrix constant from its column vectors.
    pub fn matrix(constant_type: Id, columns: &[ConstantVector]) -> Self {
        let mut c = Self {
            constant_type,
            column_count: columns.len() as u32,
            ..Self::default()
        };
        for (dst, src) in c.columns.iter_mut().zip(columns) {
            *dst = *src;
        }
        c
    }

    /// A struct or array constant built from member constants.
    pub fn composite(constant_type: Id, subconstants: Vec<Id>) -> Self {
        Self {
            constant_type,
            subconstants,
            ..Self::default()
        }
    }

    pub fn scalar(&self, col: usize, row: usize) -> u32 {
        self.columns[col].lanes[row] as u32
    }

    pub fn scalar_i32(&self, col: usize, row: usize) -> i32 {
        self.scalar(col, row) as i32
    }

    pub fn scalar_f32(&self, col: usize, row: usize) -> f32 {
        f32::from_bits(self.scalar(col, row))
    }

    pub fn scalar_u64(&self, col: usize, row: usize) -> u64 {
        self.columns[col].lanes[row]
    }

    pub fn scalar_i64(&self, col: usize, row: usize) -> i64 {
        self.scalar_u64(col, row) as i64
    }

    pub fn scalar_f64(&self, col: usize, row: usize) -> f64 {
        f64::from_bits(self.scalar_u64(col, row))
    }

    /// The first column as a vector.
    pub fn first_vector(&self) -> ConstantVector {
        self.columns[0]
    }

    /// Number of components in each column.
    pub fn vector_size(&self) -> u32 {
        self.columns[0].vecsize
    }
}

/// A constant computed by `OpSpecConstantOp`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantOp {
    pub self_id: Id,
    pub basetype: Id,
    /// The wrapped opcode.
    pub opcode: u32,
    /// Operand words after the opcode: IDs, or literals for swizzle and extract.
    pub arguments: Vec<u32>,
}

/// An `OpUndef` value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Undef {
    pub basetype: Id,
}

/// The extended instruction sets a module may import.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtSet {
    Glsl450,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtInstImport {
    pub set: ExtSet,
}

/// A variable in any storage class.
///
/// The boolean fields beyond `storage` are derived during analysis and
/// emission; the parser only sets `phi_variable`.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub self_id: Id,
    /// Pointer type of the variable.
    pub basetype: Id,
    pub storage: StorageClass,
    pub initializer: Option<Id>,
    /// Forwarded expressions read from this variable.
    pub dependees: Vec<Id>,
    pub forwardable: bool,
    pub deferred_declaration: bool,
    pub phi_variable: bool,
    pub remapped_variable: bool,
    pub remapped_components: u32,
    /// Behaves as a builtin even without a `BuiltIn` decoration.
    pub compat_builtin: bool,
    /// Written exactly once with a value that dominates every read.
    pub statically_assigned: bool,
    pub static_expression: Option<Id>,
    /// Declared in a `for` header instead of the function body.
    pub loop_variable: bool,
    /// Set once the loop header that owns this variable has been emitted.
    pub loop_variable_enable: bool,
    /// The owning function when this variable is a function parameter.
    pub parameter: Option<Id>,
}

impl Variable {
    pub fn new(self_id: Id, basetype: Id, storage: StorageClass, initializer: Option<Id>) -> Self {
        Self {
            self_id,
            basetype,
            storage,
            initializer,
            dependees: Vec::new(),
            forwardable: true,
            deferred_declaration: false,
            phi_variable: false,
            remapped_variable: false,
            remapped_components: 0,
            compat_builtin: false,
            statically_assigned: false,
            static_expression: None,
            loop_variable: false,
            loop_variable_enable: false,
            parameter: None,
        }
    }
}

/// A textual expression produced during emission.
///
/// Expressions live only for one emission pass; a restart clears them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    pub self_id: Id,
    pub text: String,
    pub expression_type: Id,
    /// The expression this one swizzles or indexes, for chain folding.
    pub base_expression: Option<Id>,
    /// The variable this value was loaded from.
    pub loaded_from: Option<Id>,
    pub immutable: bool,
    /// The value is a row-major matrix that must be transposed on use.
    pub need_transpose: bool,
    pub expression_dependencies: Vec<Id>,
    pub used_while_invalidated: bool,
}

impl Expression {
    pub fn new(self_id: Id, text: String, expression_type: Id, immutable: bool) -> Self {
        Self {
            self_id,
            text,
            expression_type,
            immutable,
            ..Self::default()
        }
    }
}

/// A function parameter with the usage counts that pick its in/out qualifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parameter {
    pub ty: Id,
    pub id: Id,
    pub read_count: u32,
    pub write_count: u32,
}

impl Parameter {
    pub fn new(ty: Id, id: Id) -> Self {
        Self {
            ty,
            id,
            read_count: 0,
            write_count: 0,
        }
    }
}

/// A combined image/sampler parameter synthesized for a function.
///
/// `image_id` and `sampler_id` hold either a global variable ID or, when the
/// matching flag is clear, the index of a parameter of the same function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombinedParameter {
    pub id: Id,
    pub image_id: Id,
    pub sampler_id: Id,
    pub global_image: bool,
    pub global_sampler: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FunctionPrototype {
    pub return_type: Id,
    pub parameter_types: Vec<Id>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Function {
    pub self_id: Id,
    pub return_type: Id,
    pub function_type: Id,
    pub arguments: Vec<Parameter>,
    /// Extra parameters appended by target legalization.
    pub shadow_arguments: Vec<Parameter>,
    pub local_variables: Vec<Id>,
    pub entry_block: Option<Id>,
    pub blocks: Vec<Id>,
    pub combined_parameters: Vec<CombinedParameter>,
    /// Guard against emitting a function while it is being emitted.
    pub active: bool,
    pub flush_undeclared: bool,
    pub do_combined_parameters: bool,
    pub analyzed_variable_scope: bool,
}

impl Function {
    pub fn new(self_id: Id, return_type: Id, function_type: Id) -> Self {
        Self {
            self_id,
            return_type,
            function_type,
            flush_undeclared: true,
            do_combined_parameters: true,
            ..Self::default()
        }
    }

    pub fn add_local_variable(&mut self, id: Id) {
        self.local_variables.push(id);
    }

    pub fn add_parameter(&mut self, ty: Id, id: Id) {
        self.arguments.push(Parameter::new(ty, id));
    }

    /// Looks up the parameter for a variable, including shadow arguments.
    pub fn parameter_mut(&mut self, id: Id) -> Option<&mut Parameter> {
        self.arguments
            .iter_mut()
            .chain(self.shadow_arguments.iter_mut())
            .find(|p| p.id == id)
    }

    pub fn parameter(&self, id: Id) -> Option<&Parameter> {
        self.arguments
            .iter()
            .chain(self.shadow_arguments.iter())
            .find(|p| p.id == id)
    }
}

/// How a block hands control to its successors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Terminator {
    #[default]
    Unknown,
    Direct,
    Select,
    MultiSelect,
    Return,
    Unreachable,
    Kill,
}

/// The structured-control-flow role declared by a merge instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Merge {
    #[default]
    None,
    Loop,
    Selection,
}

/// Shape of a loop header considered for `for`/`while` emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopMethod {
    /// The header itself evaluates the condition and selects body or merge.
    MergeToSelectForLoop,
    /// The header branches straight to a block that evaluates the condition.
    MergeToDirectForLoop,
}

/// Classification of a loop's continue block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContinueBlockType {
    ContinueNone,
    ForLoop,
    WhileLoop,
    DoWhileLoop,
    ComplexLoop,
}

/// The innermost loop header enclosing a block, as seen during emission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoopDominator {
    /// Not yet propagated in this pass.
    #[default]
    Unset,
    /// The block is not inside any loop.
    NoDominator,
    Header(Id),
}

/// One incoming value of a φ node on a specific edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Phi {
    /// Value arriving on the edge.
    pub local_variable: Id,
    /// Predecessor block of the edge.
    pub parent: Id,
    /// Function variable that receives the value.
    pub function_variable: Id,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Case {
    pub value: u32,
    pub block: Id,
}

/// An instruction left for interpretation at emission time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u32,
    pub words: Vec<u32>,
}

impl Instruction {
    pub fn op(&self) -> Option<spirv::Op> {
        spirv::Op::from_u32(self.opcode)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub self_id: Id,
    pub terminator: Terminator,
    pub merge: Merge,
    /// Branch target for `Direct`; the selection merge block for `Selection`.
    pub next_block: Option<Id>,
    pub merge_block: Option<Id>,
    pub continue_block: Option<Id>,
    pub return_value: Option<Id>,
    pub condition: Option<Id>,
    pub true_block: Option<Id>,
    pub false_block: Option<Id>,
    pub default_block: Option<Id>,
    pub ops: Vec<Instruction>,
    pub phi_variables: Vec<Phi>,
    /// Temporaries `(type, id)` that must be declared ahead of this block.
    pub declare_temporary: Vec<(Id, Id)>,
    pub cases: Vec<Case>,
    /// A structured loop header attempt failed; always emit the generic form.
    pub disable_block_optimization: bool,
    /// The continue block must be emitted inline as a statement list.
    pub complex_continue: bool,
    pub loop_dominator: LoopDominator,
    /// Variables declared at the top of this block.
    pub dominated_variables: Vec<Id>,
    /// Variables declared in the `for` header of this loop block.
    pub loop_variables: Vec<Id>,
}

impl Block {
    pub fn new(self_id: Id) -> Self {
        Self {
            self_id,
            ..Self::default()
        }
    }
}

/// Returns `true` for storage classes that form the external shader interface.
pub fn storage_is_interface(storage: StorageClass) -> bool {
    matches!(
        storage,
        StorageClass::Input
            | StorageClass::Output
            | StorageClass::Uniform
            | StorageClass::UniformConstant
            | StorageClass::AtomicCounter
            | StorageClass::PushConstant
    )
}
