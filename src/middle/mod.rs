//! The IL, the passes over it, and the lowering of BASIC into it.

pub mod basic_lowering;
pub mod il;
pub mod optimization;
