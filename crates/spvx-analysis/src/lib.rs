//! Analyses over spvx IR shared by every backend.
//!
//! - [`cfg`]: reachable-block ordering, predecessors and dominators.
//! - [`flow`]: structured control-flow queries used to pick loop shapes.
//! - [`scope`]: where each function-local variable must be declared.
//! - [`purity`]: whether blocks and functions have side effects.
//! - [`combined`]: synthesis of combined image/sampler variables.
//! - [`reflect`]: the resource interface of an entry point.

pub mod cfg;
pub mod combined;
pub mod flow;
pub mod purity;
pub mod reflect;
pub mod scope;
pub mod traverse;

pub use cfg::{Cfg, DominatorBuilder};
pub use combined::{build_combined_image_samplers, combined_sampler_name};
pub use flow::{
    block_is_loop_candidate, block_is_outside_flow_control_from_block, continue_block_type,
    execution_is_branchless, execution_is_noop, loop_header_of_continue,
};
pub use purity::Purity;
pub use reflect::{
    BufferRange, Resource, ShaderResources, SpecializationConstant, describe_resources,
    get_active_buffer_ranges, get_active_interface_variables, get_declared_struct_member_size,
    get_declared_struct_size, get_entry_points, get_shader_resources,
    get_specialization_constants,
};
pub use scope::analyze_variable_scope;
pub use traverse::{OpcodeHandler, traverse_all_reachable_opcodes};
