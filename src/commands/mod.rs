//! CLI command implementations for bbs-discovery.
//!
//! - `collect`: one-shot refresh and template dump
//! - `config`: configuration file generation
//! - `generate-fixture`: synthetic BBS fixture generation

pub mod collect;
pub mod config;
pub mod generate;

pub use collect::command_collect;
pub use config::{command_config, show_config};
pub use generate::command_generate_fixture;
