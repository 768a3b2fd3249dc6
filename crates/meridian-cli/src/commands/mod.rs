//! CLI command implementations.

pub mod common;
pub mod cpu;
pub mod inspect;
pub mod run;
