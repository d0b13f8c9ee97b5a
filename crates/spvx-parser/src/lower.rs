//! Lowering of decoded instructions into the IR store.

use spirv::{Decoration, Dim, ExecutionModel, ImageFormat, Op, StorageClass};
use spvx_ir::{
    BaseType, Block, Case, Constant, ConstantOp, ConstantVector, ExtInstImport, ExtSet, Function,
    FunctionPrototype, Id, ImageInfo, Instruction, Merge, Module, Phi, Terminator, Type, Undef,
    Variable,
};

use crate::ParseError;
use crate::reader::{RawInstruction, read_string};

/// Checked access to the operand words of one instruction.
struct Operands<'a> {
    opcode: u16,
    words: &'a [u32],
    bound: u32,
}

impl<'a> Operands<'a> {
    fn new(inst: &RawInstruction<'a>, bound: u32) -> Self {
        Self {
            opcode: inst.opcode,
            words: inst.operands,
            bound,
        }
    }

    fn len(&self) -> usize {
        self.words.len()
    }

    fn require(&self, needed: usize) -> Result<(), ParseError> {
        if self.words.len() < needed {
            return Err(ParseError::MissingOperands {
                opcode: self.opcode,
                needed,
                found: self.words.len(),
            });
        }
        Ok(())
    }

    fn word(&self, index: usize) -> Result<u32, ParseError> {
        self.require(index + 1)?;
        Ok(self.words[index])
    }

    fn id(&self, index: usize) -> Result<Id, ParseError> {
        let raw = self.word(index)?;
        if raw == 0 || raw >= self.bound {
            return Err(ParseError::BadId {
                id: raw,
                bound: self.bound,
            });
        }
        Ok(Id::new(raw))
    }

    /// Reads a literal string; returns it with the index of the next operand.
    fn string(&self, index: usize) -> Result<(String, usize), ParseError> {
        self.require(index + 1)?;
        let (s, used) = read_string(&self.words[index..]).ok_or(ParseError::BadString {
            opcode: self.opcode,
        })?;
        Ok((s, index + used))
    }

    fn ids_from(&self, index: usize) -> Result<Vec<Id>, ParseError> {
        (index..self.len()).map(|i| self.id(i)).collect()
    }
}

/// Checks a vector component or matrix column count.
fn shape_count(id: Id, what: &'static str, count: u32) -> Result<u32, ParseError> {
    if (1..=4).contains(&count) {
        Ok(count)
    } else {
        Err(ParseError::BadShape {
            id: id.raw(),
            what,
            count,
        })
    }
}

/// Parser position state threaded through the instruction handlers.
pub(crate) struct ParseCtx {
    module: Module,
    current_function: Option<Id>,
    current_block: Option<Id>,
    /// Struct types that are not aliases, in declaration order.
    struct_cache: Vec<Id>,
}

impl ParseCtx {
    pub(crate) fn new(bound: u32) -> Self {
        Self {
            module: Module::with_bound(bound),
            current_function: None,
            current_block: None,
            struct_cache: Vec::new(),
        }
    }

    /// Validates end-of-stream invariants and returns the module.
    pub(crate) fn finish(self) -> Result<Module, ParseError> {
        if self.current_block.is_some() {
            return Err(ParseError::Structure("module ends inside a block"));
        }
        if self.current_function.is_some() {
            return Err(ParseError::Structure("module ends inside a function"));
        }
        Ok(self.module)
    }

    fn function_mut(&mut self, context: &'static str) -> Result<&mut Function, ParseError> {
        let id = self.current_function.ok_or(ParseError::Structure(context))?;
        Ok(self.module.get_mut::<Function>(id)?)
    }

    fn block_mut(&mut self, context: &'static str) -> Result<&mut Block, ParseError> {
        let id = self.current_block.ok_or(ParseError::Structure(context))?;
        Ok(self.module.get_mut::<Block>(id)?)
    }

    /// Closes the current block with `terminator`, letting `f` fill in successors.
    fn end_block(
        &mut self,
        terminator: Terminator,
        f: impl FnOnce(&mut Block),
    ) -> Result<(), ParseError> {
        let block = self.block_mut("trying to end a non-existing block")?;
        block.terminator = terminator;
        f(block);
        self.current_block = None;
        Ok(())
    }

    fn type_of(&self, id: Id) -> Result<&Type, ParseError> {
        Ok(self.module.get::<Type>(id)?)
    }

    pub(crate) fn handle(&mut self, inst: &RawInstruction<'_>) -> Result<(), ParseError> {
        let ops = Operands::new(inst, self.module.bound());
        let Some(op) = Op::from_u32(u32::from(inst.opcode)) else {
            log::trace!("unknown opcode {} at word {}", inst.opcode, inst.offset);
            return self.append_to_block(inst);
        };
        log::trace!("{op:?} {:?}", inst.operands);

        match op {
            Op::MemoryModel
            | Op::SourceExtension
            | Op::Nop
            | Op::Line
            | Op::NoLine
            | Op::String
            | Op::Extension
            | Op::ModuleProcessed
            | Op::DecorationGroup => {}

            Op::Source => {
                let lang = ops.word(0)?;
                let source = &mut self.module.source;
                match spirv::SourceLanguage::from_u32(lang) {
                    Some(spirv::SourceLanguage::ESSL) => {
                        source.es = true;
                        source.version = ops.word(1)?;
                        source.known = true;
                    }
                    Some(spirv::SourceLanguage::GLSL) => {
                        source.es = false;
                        source.version = ops.word(1)?;
                        source.known = true;
                    }
                    _ => source.known = false,
                }
            }

            Op::Undef => {
                let ty = ops.id(0)?;
                self.module.set(ops.id(1)?, Undef { basetype: ty })?;
            }

            Op::Capability => {
                let cap = spirv::Capability::from_u32(ops.word(0)?);
                if cap == Some(spirv::Capability::Kernel) {
                    return Err(ParseError::UnsupportedCapability(spirv::Capability::Kernel));
                }
                if let Some(cap) = cap {
                    self.module.capabilities.push(cap);
                }
            }

            Op::ExtInstImport => {
                let id = ops.id(0)?;
                let (name, _) = ops.string(1)?;
                if name != "GLSL.std.450" {
                    return Err(ParseError::UnsupportedExtInstSet(name));
                }
                self.module.set(id, ExtInstImport { set: ExtSet::Glsl450 })?;
            }

            Op::EntryPoint => self.entry_point(&ops)?,

            Op::ExecutionMode => {
                let id = ops.id(0)?;
                let Some(mode) = spirv::ExecutionMode::from_u32(ops.word(1)?) else {
                    log::debug!("ignoring unknown execution mode {}", ops.word(1)?);
                    return Ok(());
                };
                let args = &ops.words[2..];
                self.module.entry_point_for_mut(id).set_mode(mode, args);
            }

            Op::Name => {
                let id = ops.id(0)?;
                let (name, _) = ops.string(1)?;
                self.module.set_name(id, &name);
            }

            Op::MemberName => {
                let id = ops.id(0)?;
                let member = ops.word(1)?;
                let (name, _) = ops.string(2)?;
                self.module.set_member_name(id, member, &name);
            }

            Op::Decorate => {
                let id = ops.id(0)?;
                if let Some(dec) = Decoration::from_u32(ops.word(1)?) {
                    let arg = ops.words.get(2).copied().unwrap_or(0);
                    self.module.set_decoration(id, dec, arg);
                }
            }

            Op::MemberDecorate => {
                let id = ops.id(0)?;
                let member = ops.word(1)?;
                if let Some(dec) = Decoration::from_u32(ops.word(2)?) {
                    let arg = ops.words.get(3).copied().unwrap_or(0);
                    self.module.set_member_decoration(id, member, dec, arg);
                }
            }

            Op::GroupDecorate => {
                let group = ops.id(0)?;
                let decorations = self.module.meta(group).decoration.clone();
                for target in ops.ids_from(1)? {
                    let meta = self.module.meta_mut(target);
                    let alias = std::mem::take(&mut meta.decoration.alias);
                    meta.decoration = decorations.clone();
                    meta.decoration.alias = alias;
                }
            }

            Op::GroupMemberDecorate => {
                let group = ops.id(0)?;
                let decorations = self.module.meta(group).decoration.clone();
                let mut i = 1;
                while i + 1 < ops.len() {
                    let target = ops.id(i)?;
                    let member = ops.word(i + 1)?;
                    for flag in decorations.flags.iter() {
                        if let Some(dec) = Decoration::from_u32(flag) {
                            let arg = decorations.get(dec);
                            self.module.set_member_decoration(target, member, dec, arg);
                        }
                    }
                    i += 2;
                }
            }

            Op::TypeVoid
            | Op::TypeBool
            | Op::TypeFloat
            | Op::TypeInt
            | Op::TypeVector
            | Op::TypeMatrix
            | Op::TypeArray
            | Op::TypeRuntimeArray
            | Op::TypeImage
            | Op::TypeSampledImage
            | Op::TypeSampler
            | Op::TypePointer
            | Op::TypeStruct => self.declare_type(op, &ops)?,

            Op::TypeFunction => {
                let id = ops.id(0)?;
                let return_type = ops.id(1)?;
                let parameter_types = ops.ids_from(2)?;
                self.module.set(
                    id,
                    FunctionPrototype {
                        return_type,
                        parameter_types,
                    },
                )?;
            }

            Op::Variable => self.variable(&ops)?,

            Op::Phi => {
                let ty = ops.id(0)?;
                let id = ops.id(1)?;
                self.function_mut("OpPhi outside of a function")?;
                self.block_mut("OpPhi outside of a block")?;

                let mut var = Variable::new(id, ty, StorageClass::Function, None);
                var.phi_variable = true;
                self.module.set(id, var)?;
                self.function_mut("OpPhi outside of a function")?
                    .add_local_variable(id);

                let mut phis = Vec::new();
                let mut i = 2;
                while i + 2 <= ops.len() {
                    phis.push(Phi {
                        local_variable: ops.id(i)?,
                        parent: ops.id(i + 1)?,
                        function_variable: id,
                    });
                    i += 2;
                }
                self.block_mut("OpPhi outside of a block")?
                    .phi_variables
                    .extend(phis);
            }

            Op::Constant | Op::SpecConstant => {
                let ty = ops.id(0)?;
                let id = ops.id(1)?;
                let bits = if self.type_of(ty)?.width > 32 {
                    u64::from(ops.word(2)?) | (u64::from(ops.word(3)?) << 32)
                } else {
                    u64::from(ops.word(2)?)
                };
                let mut c = Constant::scalar_bits(ty, bits);
                c.self_id = id;
                c.specialization = op == Op::SpecConstant;
                self.module.set(id, c)?;
            }

            Op::ConstantTrue | Op::ConstantFalse | Op::SpecConstantTrue | Op::SpecConstantFalse => {
                let ty = ops.id(0)?;
                let id = ops.id(1)?;
                let value = matches!(op, Op::ConstantTrue | Op::SpecConstantTrue);
                let mut c = Constant::scalar_bits(ty, u64::from(value));
                c.self_id = id;
                c.specialization = matches!(op, Op::SpecConstantTrue | Op::SpecConstantFalse);
                self.module.set(id, c)?;
            }

            Op::ConstantNull => {
                let ty = ops.id(0)?;
                let id = ops.id(1)?;
                self.null_constant(id, ty)?;
            }

            Op::ConstantComposite | Op::SpecConstantComposite => {
                self.composite_constant(&ops, op == Op::SpecConstantComposite)?;
            }

            Op::SpecConstantOp => {
                ops.require(3)?;
                let basetype = ops.id(0)?;
                let id = ops.id(1)?;
                self.module.set(
                    id,
                    ConstantOp {
                        self_id: id,
                        basetype,
                        opcode: ops.word(2)?,
                        arguments: ops.words[3..].to_vec(),
                    },
                )?;
            }

            Op::Function => {
                let return_type = ops.id(0)?;
                let id = ops.id(1)?;
                let function_type = ops.id(3)?;
                if self.current_function.is_some() {
                    return Err(ParseError::Structure(
                        "must end a function before starting a new one",
                    ));
                }
                self.module
                    .set(id, Function::new(id, return_type, function_type))?;
                self.current_function = Some(id);
            }

            Op::FunctionParameter => {
                let ty = ops.id(0)?;
                let id = ops.id(1)?;
                let func = self.current_function.ok_or(ParseError::Structure(
                    "function parameter outside of a function",
                ))?;
                self.module.get_mut::<Function>(func)?.add_parameter(ty, id);
                let mut var = Variable::new(id, ty, StorageClass::Function, None);
                var.parameter = Some(func);
                self.module.set(id, var)?;
            }

            Op::FunctionEnd => {
                if self.current_block.is_some() {
                    return Err(ParseError::Structure(
                        "cannot end a function before ending the current block",
                    ));
                }
                if self.current_function.take().is_none() {
                    return Err(ParseError::Structure("OpFunctionEnd outside of a function"));
                }
            }

            Op::Label => {
                let id = ops.id(0)?;
                let func = self.function_mut("blocks cannot exist outside functions")?;
                func.blocks.push(id);
                if func.entry_block.is_none() {
                    func.entry_block = Some(id);
                }
                if self.current_block.is_some() {
                    return Err(ParseError::Structure(
                        "cannot start a block before ending the current block",
                    ));
                }
                self.module.set(id, Block::new(id))?;
                self.current_block = Some(id);
            }

            Op::Branch => {
                let target = ops.id(0)?;
                self.end_block(Terminator::Direct, |b| b.next_block = Some(target))?;
            }

            Op::BranchConditional => {
                let condition = ops.id(0)?;
                let true_block = ops.id(1)?;
                let false_block = ops.id(2)?;
                self.end_block(Terminator::Select, |b| {
                    b.condition = Some(condition);
                    b.true_block = Some(true_block);
                    b.false_block = Some(false_block);
                })?;
            }

            Op::Switch => {
                let condition = ops.id(0)?;
                let default_block = ops.id(1)?;
                let mut cases = Vec::new();
                let mut i = 2;
                while i + 2 <= ops.len() {
                    cases.push(Case {
                        value: ops.word(i)?,
                        block: ops.id(i + 1)?,
                    });
                    i += 2;
                }

                let block = self.block_mut("trying to end a non-existing block")?;
                if block.merge == Merge::None {
                    return Err(ParseError::Structure("switch statement is not structured"));
                }
                let merge = block.next_block;
                self.end_block(Terminator::MultiSelect, |b| {
                    b.condition = Some(condition);
                    b.default_block = Some(default_block);
                    b.cases = cases;
                })?;
                if let Some(merge) = merge {
                    self.module.multiselect_merge_targets.insert(merge);
                }
            }

            Op::Kill => self.end_block(Terminator::Kill, |_| {})?,
            Op::Return => self.end_block(Terminator::Return, |_| {})?,
            Op::Unreachable => self.end_block(Terminator::Unreachable, |_| {})?,
            Op::ReturnValue => {
                let value = ops.id(0)?;
                self.end_block(Terminator::Return, |b| b.return_value = Some(value))?;
            }

            Op::SelectionMerge => {
                let merge = ops.id(0)?;
                let block = self.block_mut("trying to modify a non-existing block")?;
                block.next_block = Some(merge);
                block.merge = Merge::Selection;
                self.module.selection_merge_targets.insert(merge);
            }

            Op::LoopMerge => {
                let merge = ops.id(0)?;
                let cont = ops.id(1)?;
                let block = self.block_mut("trying to modify a non-existing block")?;
                block.merge_block = Some(merge);
                block.continue_block = Some(cont);
                block.merge = Merge::Loop;
                let header = block.self_id;

                self.module.loop_blocks.insert(header);
                self.module.loop_merge_targets.insert(merge);
                // A self-continuing header must stay reachable as a loop header.
                if cont != header {
                    self.module.continue_blocks.insert(cont);
                }
            }

            _ => self.append_to_block(inst)?,
        }
        Ok(())
    }

    fn append_to_block(&mut self, inst: &RawInstruction<'_>) -> Result<(), ParseError> {
        let block = self.block_mut("currently no block to insert opcode")?;
        block.ops.push(Instruction {
            opcode: u32::from(inst.opcode),
            words: inst.operands.to_vec(),
        });
        Ok(())
    }

    fn entry_point(&mut self, ops: &Operands<'_>) -> Result<(), ParseError> {
        let model = ExecutionModel::from_u32(ops.word(0)?).ok_or(ParseError::Structure(
            "unknown execution model in OpEntryPoint",
        ))?;
        let id = ops.id(1)?;
        let (name, next) = ops.string(2)?;
        let interface = ops.ids_from(next)?;

        // Execution modes may have created a placeholder already.
        let ep = self.module.entry_point_for_mut(id);
        ep.model = model;
        ep.name = name.clone();
        ep.interface_variables = interface;

        self.module.set_name(id, &name);
        if self.module.entry_point.is_none() {
            self.module.entry_point = Some(id);
        }
        Ok(())
    }

    fn declare_type(&mut self, op: Op, ops: &Operands<'_>) -> Result<(), ParseError> {
        let id = ops.id(0)?;
        let leaf = |basetype, width| Type {
            self_id: id,
            basetype,
            width,
            ..Type::default()
        };

        let ty = match op {
            Op::TypeVoid => leaf(BaseType::Void, 0),
            Op::TypeBool => leaf(BaseType::Boolean, 1),
            Op::TypeFloat => {
                let width = ops.word(1)?;
                let base = if width > 32 {
                    BaseType::Double
                } else {
                    BaseType::Float
                };
                leaf(base, width)
            }
            Op::TypeInt => {
                let width = ops.word(1)?;
                let base = match (ops.word(2)? != 0, width > 32) {
                    (true, true) => BaseType::Int64,
                    (true, false) => BaseType::Int,
                    (false, true) => BaseType::UInt64,
                    (false, false) => BaseType::UInt,
                };
                leaf(base, width)
            }
            Op::TypeVector => {
                let mut ty = self.type_of(ops.id(1)?)?.clone();
                ty.vecsize = shape_count(id, "components", ops.word(2)?)?;
                ty.self_id = id;
                ty
            }
            Op::TypeMatrix => {
                let mut ty = self.type_of(ops.id(1)?)?.clone();
                ty.columns = shape_count(id, "columns", ops.word(2)?)?;
                ty.self_id = id;
                ty
            }
            Op::TypeArray => {
                let element = ops.id(1)?;
                let length = ops.id(2)?;
                let mut ty = self.type_of(element)?.clone();
                let literal = self
                    .module
                    .maybe_get::<Constant>(length)
                    .filter(|c| !c.specialization)
                    .map(|c| c.scalar(0, 0));
                ty.array_size_literal.push(literal.is_some());
                ty.array.push(literal.unwrap_or(length.raw()));
                ty.parent_type = Some(element);
                ty
            }
            Op::TypeRuntimeArray => {
                let element = ops.id(1)?;
                let mut ty = self.type_of(element)?.clone();
                ty.array.push(0);
                ty.array_size_literal.push(true);
                ty.parent_type = Some(element);
                ty
            }
            Op::TypeImage => {
                ops.require(8)?;
                let dim = Dim::from_u32(ops.word(2)?)
                    .ok_or(ParseError::Structure("unknown image dimension"))?;
                let format = ImageFormat::from_u32(ops.word(7)?).unwrap_or(ImageFormat::Unknown);
                Type {
                    image: ImageInfo {
                        sampled_type: ops.id(1)?,
                        dim,
                        depth: ops.word(3)? != 0,
                        arrayed: ops.word(4)? != 0,
                        ms: ops.word(5)? != 0,
                        sampled: ops.word(6)?,
                        format,
                    },
                    ..leaf(BaseType::Image, 0)
                }
            }
            Op::TypeSampledImage => {
                let mut ty = self.type_of(ops.id(1)?)?.clone();
                ty.basetype = BaseType::SampledImage;
                ty.self_id = id;
                ty
            }
            Op::TypeSampler => leaf(BaseType::Sampler, 0),
            Op::TypePointer => {
                let storage = StorageClass::from_u32(ops.word(1)?)
                    .ok_or(ParseError::Structure("unknown storage class"))?;
                let pointee = ops.id(2)?;
                let mut ty = self.type_of(pointee)?.clone();
                if ty.pointer {
                    return Err(ParseError::PointerToPointer(id.raw()));
                }
                ty.pointer = true;
                ty.storage = storage;
                ty.parent_type = Some(pointee);
                if storage == StorageClass::AtomicCounter {
                    ty.basetype = BaseType::AtomicCounter;
                }
                ty
            }
            Op::TypeStruct => {
                let mut ty = Type {
                    member_types: ops.ids_from(1)?,
                    ..leaf(BaseType::Struct, 0)
                };
                // Some front-ends emit one struct declaration per use with
                // identical names and layout.
                let alias = self.struct_cache.iter().copied().find(|&other| {
                    self.module.name(id) == self.module.name(other)
                        && self
                            .module
                            .maybe_get::<Type>(other)
                            .is_some_and(|o| self.module.types_are_logically_equivalent(&ty, o))
                });
                match alias {
                    Some(other) => ty.type_alias = Some(other),
                    None => self.struct_cache.push(id),
                }
                ty
            }
            _ => return Err(ParseError::Structure("unexpected type declaration opcode")),
        };

        self.module.set(id, ty)?;
        Ok(())
    }

    fn variable(&mut self, ops: &Operands<'_>) -> Result<(), ParseError> {
        let ty = ops.id(0)?;
        let id = ops.id(1)?;
        let storage = StorageClass::from_u32(ops.word(2)?)
            .ok_or(ParseError::Structure("unknown storage class"))?;
        let initializer = if ops.len() == 4 {
            Some(ops.id(3)?)
        } else {
            None
        };

        match storage {
            StorageClass::Function => {
                self.function_mut("no function currently in scope")?
                    .add_local_variable(id);
            }
            StorageClass::Private | StorageClass::Workgroup | StorageClass::Output => {
                self.module.global_variables.push(id);
            }
            _ => {}
        }

        let var = Variable::new(id, ty, storage, initializer);
        if self.module.variable_storage_is_aliased(&var)? {
            self.module.aliased_variables.push(id);
        }
        self.module.set(id, var)?;

        // Images start as restrictive as possible and loosen on use.
        if self.type_of(ty)?.basetype == BaseType::Image {
            self.module.set_decoration(id, Decoration::NonWritable, 0);
            self.module.set_decoration(id, Decoration::NonReadable, 0);
        }
        Ok(())
    }

    fn composite_constant(&mut self, ops: &Operands<'_>, spec: bool) -> Result<(), ParseError> {
        let ty_id = ops.id(0)?;
        let id = ops.id(1)?;
        let elements = ops.ids_from(2)?;
        let ty = self.type_of(ty_id)?;

        let mut constant = if ty.is_struct() || ty.is_array() {
            Constant::composite(ty_id, elements)
        } else if ty.columns > 1 {
            if !(1..=4).contains(&elements.len()) {
                return Err(ParseError::BadComposite {
                    id: id.raw(),
                    count: elements.len(),
                });
            }
            let mut columns = Vec::with_capacity(elements.len());
            let mut column_ids = [None; 4];
            for (i, &element) in elements.iter().enumerate() {
                match self.module.maybe_get::<Constant>(element) {
                    Some(c) if !c.specialization => columns.push(c.first_vector()),
                    _ => {
                        columns.push(ConstantVector {
                            vecsize: ty.vecsize,
                            ..ConstantVector::default()
                        });
                        column_ids[i] = Some(element);
                    }
                }
            }
            let mut c = Constant::matrix(ty_id, &columns);
            c.column_ids = column_ids;
            c
        } else {
            if !(1..=4).contains(&elements.len()) {
                return Err(ParseError::BadComposite {
                    id: id.raw(),
                    count: elements.len(),
                });
            }
            let mut vector = ConstantVector {
                vecsize: elements.len() as u32,
                ..ConstantVector::default()
            };
            for (i, &element) in elements.iter().enumerate() {
                match self.module.maybe_get::<Constant>(element) {
                    Some(c) if !c.specialization => vector.lanes[i] = c.scalar_u64(0, 0),
                    _ => vector.ids[i] = Some(element),
                }
            }
            Constant::vector(ty_id, vector)
        };

        constant.self_id = id;
        constant.specialization = spec;
        self.module.set(id, constant)?;
        Ok(())
    }

    /// Builds an all-zero constant of type `ty` at `id`, allocating fresh IDs
    /// for the members of composites.
    fn null_constant(&mut self, id: Id, ty_id: Id) -> Result<(), ParseError> {
        let ty = self.type_of(ty_id)?.clone();

        let mut constant = if ty.is_array() {
            let element = ty.parent_type.ok_or(ParseError::Structure(
                "array type without an element type",
            ))?;
            let count = match (ty.array.last(), ty.array_size_literal.last()) {
                (Some(&n), Some(true)) => n,
                _ => {
                    return Err(ParseError::Structure(
                        "OpConstantNull of a specialization-sized array",
                    ));
                }
            };
            let first = self.module.increase_bound_by(count);
            let members: Vec<Id> = (0..count).map(|i| Id::new(first.raw() + i)).collect();
            for &member in &members {
                self.null_constant(member, element)?;
            }
            Constant::composite(ty_id, members)
        } else if ty.is_struct() {
            let count = ty.member_types.len() as u32;
            let first = self.module.increase_bound_by(count);
            let mut members = Vec::with_capacity(ty.member_types.len());
            for (i, &member_ty) in ty.member_types.iter().enumerate() {
                let member = Id::new(first.raw() + i as u32);
                self.null_constant(member, member_ty)?;
                members.push(member);
            }
            Constant::composite(ty_id, members)
        } else {
            let column = ConstantVector {
                vecsize: ty.vecsize,
                ..ConstantVector::default()
            };
            let columns = vec![column; ty.columns as usize];
            Constant::matrix(ty_id, &columns)
        };

        constant.self_id = id;
        self.module.set(id, constant)?;
        Ok(())
    }
}
