//! Mach-O file format handling.
//!
//! This module reads the parts of a Mach-O file (thin or universal) that the
//! bundler cares about: the libraries an image links against, its own
//! install name, and the rpath entries it declares.

mod constants;
mod context;
mod structs;

pub use constants::*;
pub use context::*;
pub use structs::*;
