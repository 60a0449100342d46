//! External tool adapters for polyprep.
//!
//! Every collaborator is a blocking process call that yields either its
//! captured output or a [`ToolFailure`] carrying the exit code and stderr.

pub mod process;
pub mod toolchain;
pub mod transformer;

pub use process::*;
pub use toolchain::*;
pub use transformer::*;
