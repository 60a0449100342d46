//! polyprep harness: setup, manifest handling and the per-kernel batch driver.

pub mod archive;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod driver;
pub mod layout;
pub mod manifest;
pub mod report;

pub use archive::*;
#[cfg(feature = "cli")]
pub use cli::*;
pub use config::*;
pub use driver::*;
pub use layout::*;
pub use manifest::*;
pub use report::*;
