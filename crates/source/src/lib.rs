//! Kernel source handling for polyprep.
//!
//! Finds a named kernel in C source text by line scanning, extracts its body,
//! and splices original or transformed bodies back into the untouched
//! surrounding text.

pub mod extract;
pub mod listing;
pub mod locator;
pub mod splice;

pub use extract::*;
pub use listing::*;
pub use locator::*;
pub use splice::*;
