//! The lipcut pipeline.
//!
//! This crate provides:
//! - The five stages: download, convert, analyze, adjust and compile
//! - Stitching compiled videos together
//! - Command-line parsing and stage dispatch
//! - Environment configuration and structured stage logging

pub mod adjust;
pub mod analyze;
pub mod cli;
pub mod compile;
pub mod config;
pub mod convert;
pub mod download;
pub mod error;
pub mod logging;
pub mod runner;

pub use cli::Cli;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::StageLogger;
pub use runner::PipelineRunner;
