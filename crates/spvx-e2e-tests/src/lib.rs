//! End-to-end tests for spvx.
//!
//! The tests live under `tests/` and assemble SPIR-V modules in memory,
//! run them through the parser and a backend from the registry, and check
//! the emitted source.
