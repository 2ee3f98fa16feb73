//! Helpers shared by the gpu-probe workspace crates.

mod build_info;
pub mod logging;
pub mod version;
