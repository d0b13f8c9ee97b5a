//! Integration tests for the SPIR-V parser.

use spirv::{Decoration, ExecutionMode, ExecutionModel, Op, StorageClass};
use spvx_ir::{
    BaseType, Block, Constant, ErrorClass, Function, Id, Merge, Terminator, Type, Variable,
    dump_module,
};
use spvx_parser::{ParseError, parse, parse_bytes};

fn inst(op: Op, operands: &[u32]) -> Vec<u32> {
    let mut words = vec![((operands.len() as u32 + 1) << 16) | op as u32];
    words.extend_from_slice(operands);
    words
}

fn string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn module(bound: u32, body: &[Vec<u32>]) -> Vec<u32> {
    let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, bound, 0];
    for inst in body {
        words.extend_from_slice(inst);
    }
    words
}

/// A fragment shader: `void main() { color = vec4(1.0); }` with a selection
/// merge and a phi.
fn fragment_module() -> Vec<u32> {
    let mut entry = vec![ExecutionModel::Fragment as u32, 4];
    entry.extend(string("main"));
    entry.push(9);

    let mut name = vec![9];
    name.extend(string("color"));

    module(
        30,
        &[
            inst(Op::Capability, &[spirv::Capability::Shader as u32]),
            inst(Op::MemoryModel, &[0, 1]),
            inst(Op::EntryPoint, &entry),
            inst(
                Op::ExecutionMode,
                &[4, ExecutionMode::OriginUpperLeft as u32],
            ),
            inst(Op::Source, &[spirv::SourceLanguage::ESSL as u32, 310]),
            inst(Op::Name, &name),
            inst(Op::Decorate, &[9, Decoration::Location as u32, 0]),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::TypeFloat, &[6, 32]),
            inst(Op::TypeVector, &[7, 6, 4]),
            inst(Op::TypePointer, &[8, StorageClass::Output as u32, 7]),
            inst(Op::Variable, &[8, 9, StorageClass::Output as u32]),
            inst(Op::Constant, &[6, 10, 1.0f32.to_bits()]),
            inst(Op::ConstantComposite, &[7, 11, 10, 10, 10, 10]),
            inst(Op::TypeBool, &[12]),
            inst(Op::ConstantTrue, &[12, 13]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::SelectionMerge, &[15, 0]),
            inst(Op::BranchConditional, &[13, 14, 15]),
            inst(Op::Label, &[14]),
            inst(Op::Branch, &[15]),
            inst(Op::Label, &[15]),
            inst(Op::Phi, &[6, 16, 10, 5, 10, 14]),
            inst(Op::Store, &[9, 11]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ],
    )
}

#[test]
fn parse_fragment_shader() {
    let module = parse(&fragment_module()).expect("fragment module should parse");

    assert_eq!(module.entry_points.len(), 1);
    let ep = module.entry_point().unwrap();
    assert_eq!(ep.name, "main");
    assert_eq!(ep.model, ExecutionModel::Fragment);
    assert_eq!(ep.interface_variables, vec![Id::new(9)]);
    assert!(ep.has_mode(ExecutionMode::OriginUpperLeft));

    assert!(module.source.known && module.source.es);
    assert_eq!(module.source.version, 310);

    assert_eq!(module.name(Id::new(9)), "color");
    assert_eq!(module.decoration(Id::new(9), Decoration::Location), 0);
    assert!(module.has_decoration(Id::new(9), Decoration::Location));
    assert_eq!(module.global_variables, vec![Id::new(9)]);

    let vec4 = module.get::<Type>(Id::new(7)).unwrap();
    assert_eq!(vec4.basetype, BaseType::Float);
    assert_eq!(vec4.vecsize, 4);
    assert_eq!(vec4.self_id, Id::new(7));

    let ptr = module.get::<Type>(Id::new(8)).unwrap();
    assert!(ptr.pointer);
    assert_eq!(ptr.storage, StorageClass::Output);
    // Pointers keep the decoration identity of their pointee.
    assert_eq!(ptr.self_id, Id::new(7));

    let splat = module.get::<Constant>(Id::new(11)).unwrap();
    assert_eq!(splat.vector_size(), 4);
    assert_eq!(splat.scalar_f32(0, 3), 1.0);

    let func = module.get::<Function>(Id::new(4)).unwrap();
    assert_eq!(func.blocks, vec![Id::new(5), Id::new(14), Id::new(15)]);
    assert_eq!(func.entry_block, Some(Id::new(5)));
    assert_eq!(func.local_variables, vec![Id::new(16)]);

    let header = module.get::<Block>(Id::new(5)).unwrap();
    assert_eq!(header.terminator, Terminator::Select);
    assert_eq!(header.merge, Merge::Selection);
    assert_eq!(header.next_block, Some(Id::new(15)));
    assert!(module.selection_merge_targets.contains(&Id::new(15)));

    let merge = module.get::<Block>(Id::new(15)).unwrap();
    assert_eq!(merge.phi_variables.len(), 2);
    assert_eq!(merge.phi_variables[1].parent, Id::new(14));
    assert_eq!(merge.ops.len(), 1);
    assert_eq!(merge.ops[0].op(), Some(Op::Store));
    assert!(module.get::<Variable>(Id::new(16)).unwrap().phi_variable);

    let dump = dump_module(&module);
    assert!(dump.contains("Entry Points:"));
    assert!(dump.contains("Fragment main"));
}

#[test]
fn parse_bytes_matches_words() {
    let words = fragment_module();
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let module = parse_bytes(&bytes).unwrap();
    assert_eq!(module.entry_points.len(), 1);

    assert!(matches!(
        parse_bytes(&bytes[..bytes.len() - 1]),
        Err(ParseError::Misaligned(_))
    ));
}

#[test]
fn parse_big_endian_module() {
    let words: Vec<u32> = fragment_module().iter().map(|w| w.swap_bytes()).collect();
    let module = parse(&words).expect("byte-swapped module should parse");
    assert_eq!(module.entry_point().unwrap().name, "main");
}

#[test]
fn compute_workgroup_size() {
    let mut entry = vec![ExecutionModel::GLCompute as u32, 4];
    entry.extend(string("main"));
    let words = module(
        8,
        &[
            inst(Op::EntryPoint, &entry),
            inst(
                Op::ExecutionMode,
                &[4, ExecutionMode::LocalSize as u32, 8, 8, 1],
            ),
            inst(Op::TypeVoid, &[2]),
            inst(Op::TypeFunction, &[3, 2]),
            inst(Op::Function, &[2, 4, 0, 3]),
            inst(Op::Label, &[5]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ],
    );
    let module = parse(&words).unwrap();
    let ep = module.entry_point().unwrap();
    assert_eq!(
        (ep.workgroup_size.x, ep.workgroup_size.y, ep.workgroup_size.z),
        (8, 8, 1)
    );
}

#[test]
fn arrays_do_not_take_element_identity() {
    let words = module(
        10,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypeInt, &[2, 32, 0]),
            inst(Op::Constant, &[2, 3, 4]),
            inst(Op::TypeArray, &[4, 1, 3]),
            inst(Op::SpecConstant, &[2, 5, 2]),
            inst(Op::TypeArray, &[6, 1, 5]),
            inst(Op::TypeRuntimeArray, &[7, 1]),
        ],
    );
    let module = parse(&words).unwrap();

    let fixed = module.get::<Type>(Id::new(4)).unwrap();
    assert_eq!(fixed.array, vec![4]);
    assert_eq!(fixed.array_size_literal, vec![true]);
    assert_eq!(fixed.self_id, Id::new(1));

    let spec = module.get::<Type>(Id::new(6)).unwrap();
    assert_eq!(spec.array, vec![5]);
    assert_eq!(spec.array_size_literal, vec![false]);

    let runtime = module.get::<Type>(Id::new(7)).unwrap();
    assert_eq!(runtime.array, vec![0]);
    assert!(module.get::<Constant>(Id::new(5)).unwrap().specialization);
}

#[test]
fn duplicate_structs_are_aliased() {
    let mut name_a = vec![3];
    name_a.extend(string("Light"));
    let mut name_b = vec![4];
    name_b.extend(string("Light"));
    let words = module(
        8,
        &[
            inst(Op::Name, &name_a),
            inst(Op::Name, &name_b),
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypeVector, &[2, 1, 4]),
            inst(Op::TypeStruct, &[3, 2, 1]),
            inst(Op::TypeStruct, &[4, 2, 1]),
            inst(Op::TypeStruct, &[5, 1]),
        ],
    );
    let module = parse(&words).unwrap();
    assert_eq!(module.get::<Type>(Id::new(3)).unwrap().type_alias, None);
    assert_eq!(
        module.get::<Type>(Id::new(4)).unwrap().type_alias,
        Some(Id::new(3))
    );
    assert_eq!(module.get::<Type>(Id::new(5)).unwrap().type_alias, None);
}

#[test]
fn constant_null_builds_zero_composites() {
    let words = module(
        8,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypeVector, &[2, 1, 3]),
            inst(Op::TypeStruct, &[3, 2, 1]),
            inst(Op::ConstantNull, &[3, 4]),
        ],
    );
    let module = parse(&words).unwrap();
    let null = module.get::<Constant>(Id::new(4)).unwrap();
    assert_eq!(null.subconstants.len(), 2);
    let member = module.get::<Constant>(null.subconstants[0]).unwrap();
    assert_eq!(member.vector_size(), 3);
    assert_eq!(member.scalar(0, 2), 0);
    assert!(module.bound() > 8);
}

#[test]
fn image_variables_start_restricted() {
    let words = module(
        8,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypeImage, &[2, 1, 1, 0, 0, 0, 2, 0]),
            inst(Op::TypePointer, &[3, StorageClass::UniformConstant as u32, 2]),
            inst(Op::Variable, &[3, 4, StorageClass::UniformConstant as u32]),
        ],
    );
    let module = parse(&words).unwrap();
    assert!(module.has_decoration(Id::new(4), Decoration::NonWritable));
    assert!(module.has_decoration(Id::new(4), Decoration::NonReadable));
    assert_eq!(module.aliased_variables, vec![Id::new(4)]);
}

#[test]
fn loop_merge_records_targets() {
    let words = module(
        12,
        &[
            inst(Op::TypeVoid, &[1]),
            inst(Op::TypeFunction, &[2, 1]),
            inst(Op::Function, &[1, 3, 0, 2]),
            inst(Op::Label, &[4]),
            inst(Op::Branch, &[5]),
            inst(Op::Label, &[5]),
            inst(Op::LoopMerge, &[7, 6, 0]),
            inst(Op::Branch, &[6]),
            inst(Op::Label, &[6]),
            inst(Op::Branch, &[5]),
            inst(Op::Label, &[7]),
            inst(Op::Return, &[]),
            inst(Op::FunctionEnd, &[]),
        ],
    );
    let module = parse(&words).unwrap();
    assert!(module.loop_blocks.contains(&Id::new(5)));
    assert!(module.loop_merge_targets.contains(&Id::new(7)));
    assert!(module.continue_blocks.contains(&Id::new(6)));
    let header = module.get::<Block>(Id::new(5)).unwrap();
    assert_eq!(header.merge, Merge::Loop);
    assert_eq!(header.continue_block, Some(Id::new(6)));
}

// ---- errors ----

#[test]
fn truncated_buffer_is_malformed() {
    let err = parse(&[spirv::MAGIC_NUMBER, 0x0001_0000, 0]).unwrap_err();
    assert!(matches!(err, ParseError::TooSmall(3)));
    assert_eq!(err.class(), ErrorClass::MalformedInput);
}

#[test]
fn bad_magic_is_rejected() {
    let err = parse(&[0xdead_beef, 0x0001_0000, 0, 4, 0]).unwrap_err();
    assert!(matches!(err, ParseError::BadMagic(0xdead_beef)));
}

#[test]
fn pointer_to_pointer_is_rejected() {
    let words = module(
        6,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypePointer, &[2, StorageClass::Function as u32, 1]),
            inst(Op::TypePointer, &[3, StorageClass::Function as u32, 2]),
        ],
    );
    let err = parse(&words).unwrap_err();
    assert!(matches!(err, ParseError::PointerToPointer(3)));
    assert!(err.to_string().contains("pointer to pointer"));
}

#[test]
fn vector_and_matrix_shapes_are_bounded() {
    let words = module(
        4,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypeVector, &[2, 1, 5]),
        ],
    );
    let err = parse(&words).unwrap_err();
    assert!(matches!(
        err,
        ParseError::BadShape {
            id: 2,
            what: "components",
            count: 5
        }
    ));
    assert_eq!(err.class(), ErrorClass::MalformedInput);

    let words = module(
        4,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypeVector, &[2, 1, 4]),
            inst(Op::TypeMatrix, &[3, 2, 0x4000_0000]),
        ],
    );
    assert!(matches!(
        parse(&words).unwrap_err(),
        ParseError::BadShape {
            id: 3,
            what: "columns",
            ..
        }
    ));
}

#[test]
fn huge_bound_is_rejected_before_allocation() {
    let err = parse(&[spirv::MAGIC_NUMBER, 0x0001_0000, 0, 0x4000_0000, 0]).unwrap_err();
    assert!(matches!(err, ParseError::BadBound(0x4000_0000)));
    assert_eq!(err.class(), ErrorClass::MalformedInput);
}

#[test]
fn nested_function_is_rejected() {
    let words = module(
        8,
        &[
            inst(Op::TypeVoid, &[1]),
            inst(Op::TypeFunction, &[2, 1]),
            inst(Op::Function, &[1, 3, 0, 2]),
            inst(Op::Function, &[1, 4, 0, 2]),
        ],
    );
    let err = parse(&words).unwrap_err();
    assert!(err.to_string().contains("must end a function"));
}

#[test]
fn unterminated_block_is_rejected() {
    let words = module(
        8,
        &[
            inst(Op::TypeVoid, &[1]),
            inst(Op::TypeFunction, &[2, 1]),
            inst(Op::Function, &[1, 3, 0, 2]),
            inst(Op::Label, &[4]),
            inst(Op::FunctionEnd, &[]),
        ],
    );
    let err = parse(&words).unwrap_err();
    assert!(err.to_string().contains("ending the current block"));
    assert_eq!(err.class(), ErrorClass::MalformedInput);
}

#[test]
fn function_variable_outside_function_is_rejected() {
    let words = module(
        6,
        &[
            inst(Op::TypeFloat, &[1, 32]),
            inst(Op::TypePointer, &[2, StorageClass::Function as u32, 1]),
            inst(Op::Variable, &[2, 3, StorageClass::Function as u32]),
        ],
    );
    assert!(matches!(parse(&words), Err(ParseError::Structure(_))));
}

#[test]
fn unstructured_switch_is_rejected() {
    let words = module(
        10,
        &[
            inst(Op::TypeVoid, &[1]),
            inst(Op::TypeFunction, &[2, 1]),
            inst(Op::TypeInt, &[5, 32, 1]),
            inst(Op::Constant, &[5, 6, 0]),
            inst(Op::Function, &[1, 3, 0, 2]),
            inst(Op::Label, &[4]),
            inst(Op::Switch, &[6, 7]),
        ],
    );
    let err = parse(&words).unwrap_err();
    assert!(err.to_string().contains("not structured"));
}

#[test]
fn kernel_capability_is_unsupported() {
    let words = module(
        4,
        &[inst(Op::Capability, &[spirv::Capability::Kernel as u32])],
    );
    let err = parse(&words).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Unsupported);
}

#[test]
fn unknown_ext_inst_set_is_unsupported() {
    let mut operands = vec![1];
    operands.extend(string("OpenCL.std"));
    let words = module(4, &[inst(Op::ExtInstImport, &operands)]);
    let err = parse(&words).unwrap_err();
    assert!(matches!(err, ParseError::UnsupportedExtInstSet(ref s) if s == "OpenCL.std"));
    assert_eq!(err.class(), ErrorClass::Unsupported);
}

#[test]
fn missing_operands_are_reported() {
    let words = module(4, &[inst(Op::TypeVector, &[1])]);
    assert!(matches!(
        parse(&words),
        Err(ParseError::MissingOperands { needed: 2, found: 1, .. })
    ));
}

#[test]
fn id_past_bound_is_rejected() {
    let words = module(4, &[inst(Op::TypeFloat, &[9, 32])]);
    assert!(matches!(
        parse(&words),
        Err(ParseError::BadId { id: 9, bound: 4 })
    ));
}
