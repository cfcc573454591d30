//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific layer
//! against the scripted mock wire. All tests run on the host with no
//! board attached.

mod fs_tests;
mod mock_wire;
