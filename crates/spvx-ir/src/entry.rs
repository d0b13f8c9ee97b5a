//! Entry points and their execution modes.

use spirv::{ExecutionMode, ExecutionModel};

use crate::arena::Id;
use crate::meta::Flags64;

/// Compute workgroup dimensions declared with `LocalSize`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// One `OpEntryPoint` with the modes declared for it.
#[derive(Clone, Debug, PartialEq)]
pub struct EntryPoint {
    /// The function implementing the entry point.
    pub self_id: Id,
    pub name: String,
    pub model: ExecutionModel,
    /// Interface variables listed on the entry point, in declaration order.
    pub interface_variables: Vec<Id>,
    pub flags: Flags64,
    pub workgroup_size: WorkgroupSize,
    pub invocations: u32,
    pub output_vertices: u32,
}

impl EntryPoint {
    pub fn new(self_id: Id, model: ExecutionModel, name: String) -> Self {
        Self {
            self_id,
            name,
            model,
            interface_variables: Vec::new(),
            flags: Flags64::empty(),
            workgroup_size: WorkgroupSize::default(),
            invocations: 0,
            output_vertices: 0,
        }
    }

    pub fn has_mode(&self, mode: ExecutionMode) -> bool {
        self.flags.contains(mode as u32)
    }

    /// Records an execution mode and its literal arguments.
    pub fn set_mode(&mut self, mode: ExecutionMode, args: &[u32]) {
        self.flags.insert(mode as u32);
        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        match mode {
            ExecutionMode::Invocations => self.invocations = arg(0),
            ExecutionMode::LocalSize => {
                self.workgroup_size = WorkgroupSize {
                    x: arg(0),
                    y: arg(1),
                    z: arg(2),
                };
            }
            ExecutionMode::OutputVertices => self.output_vertices = arg(0),
            _ => {}
        }
    }

    /// Returns the literal argument of a mode, or 0 when absent or argument-less.
    pub fn mode_argument(&self, mode: ExecutionMode, index: u32) -> u32 {
        if !self.has_mode(mode) {
            return 0;
        }
        match (mode, index) {
            (ExecutionMode::Invocations, 0) => self.invocations,
            (ExecutionMode::LocalSize, 0) => self.workgroup_size.x,
            (ExecutionMode::LocalSize, 1) => self.workgroup_size.y,
            (ExecutionMode::LocalSize, 2) => self.workgroup_size.z,
            (ExecutionMode::OutputVertices, 0) => self.output_vertices,
            _ => 0,
        }
    }

    /// Iterates over the declared execution modes.
    pub fn modes(&self) -> impl Iterator<Item = ExecutionMode> + '_ {
        self.flags.iter().filter_map(ExecutionMode::from_u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_size_is_recorded() {
        let mut ep = EntryPoint::new(Id::new(4), ExecutionModel::GLCompute, "main".into());
        ep.set_mode(ExecutionMode::LocalSize, &[8, 8, 1]);
        assert!(ep.has_mode(ExecutionMode::LocalSize));
        assert_eq!(ep.workgroup_size, WorkgroupSize { x: 8, y: 8, z: 1 });
        assert_eq!(ep.mode_argument(ExecutionMode::LocalSize, 1), 8);
        assert_eq!(ep.mode_argument(ExecutionMode::Invocations, 0), 0);
    }

    #[test]
    fn modes_iterates_flags() {
        let mut ep = EntryPoint::new(Id::new(1), ExecutionModel::Fragment, "main".into());
        ep.set_mode(ExecutionMode::OriginUpperLeft, &[]);
        ep.set_mode(ExecutionMode::EarlyFragmentTests, &[]);
        let modes: Vec<_> = ep.modes().collect();
        assert_eq!(
            modes,
            vec![ExecutionMode::OriginUpperLeft, ExecutionMode::EarlyFragmentTests]
        );
    }
}
