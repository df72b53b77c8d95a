//! bindscope
//!
//! CLI library crate. The binary in `main.rs` stays thin; the command
//! helpers live here (and re-export the rendering helpers) so integration
//! tests can exercise them directly.

pub mod commands;
