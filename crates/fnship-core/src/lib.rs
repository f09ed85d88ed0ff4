//! fnship-core — types, run configuration, and function discovery shared by
//! every fnship crate.

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::{Backend, ConfigOverrides, FileConfig, RunConfig, RunMode};
pub use error::{CoreError, CoreResult};
pub use registry::FunctionRegistry;
pub use types::*;
