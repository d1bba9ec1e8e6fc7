//! Architecture-specific code
//!
//! `traits` holds the contracts the core is written against; `aarch64`
//! holds the EL2 backends for them.

pub mod aarch64;
pub mod traits;

pub use traits::*;
