//! Middle end of the Viper toolchain: a typed linear IL with block
//! parameters, SSA construction over it, lowering of BASIC control flow into
//! it, and the slot ABI the VM uses to pass IL values to native helpers.

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use error::{Error, Result};
