//! The BASIC frontend's outbound contract: a type-checked AST with source
//! locations, and a per-procedure symbol table.

pub mod ast;
pub mod symbols;
