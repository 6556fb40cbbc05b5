//! Inbound contracts from the language frontends. Lexing and parsing live
//! outside this crate; what arrives here is an already type-checked AST whose
//! nodes carry source locations, plus a symbol table per procedure.

use std::path::PathBuf;

pub mod basic;
pub mod intern;

/// Position of a construct in its source file. Lowering stamps this on every
/// instruction it emits so diagnostics can map IR back to source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLoc {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub const fn new(file_id: u32, line: u32, column: u32) -> Self {
        Self {
            file_id,
            line,
            column,
        }
    }

    /// Locations with a zero line were synthesised by a pass rather than
    /// taken from source.
    pub fn is_known(self) -> bool {
        self.line != 0
    }
}

impl core::fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file_id, self.line, self.column)
    }
}

#[derive(Debug)]
pub struct SourceFile {
    pub contents: String,
    pub origin: SourceFileOrigin,
}

#[derive(Debug)]
pub enum SourceFileOrigin {
    Memory,
    File(PathBuf),
}

impl core::fmt::Display for SourceFileOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFileOrigin::Memory => f.write_str("<memory>"),
            SourceFileOrigin::File(path) => f.write_fmt(format_args!("{}", path.display())),
        }
    }
}
