//! Lowering from the BASIC AST to IL.
//!
//! Each procedure becomes one function. Every variable gets a stack slot
//! allocated in the entry block, and every read or write goes through a load
//! or store; turning those slots into SSA values is left to mem2reg.
//! Structured control flow becomes labelled blocks whose names come from a
//! [`BlockNames`] generator, so lowering the same program twice yields
//! identical text.
//!
//! Blocks are only ever referred to by [`BlockId`]: appending a block may
//! reallocate the function's block list.

use core::fmt;

use hashbrown::HashMap;
use strum::IntoStaticStr;
use tracing::{debug, warn};

use crate::{
    frontend::{
        SourceLoc,
        basic::{
            ast::{Body, Parameter, Procedure, Program},
            symbols::{SlotId, SymbolTable},
        },
        intern::InternedSymbol,
    },
    index::IndexVec,
    middle::il::{BlockId, Function, Module, TempId, TypeKind, Value, builder::Builder},
};

mod expressions;
mod loop_state;
mod loops;
mod names;
mod statements;

pub use loop_state::{LoopFrame, LoopStack};
pub use names::{BlockNamer, BlockNames, ForHeads, ForLabels, LoopLabels, NameMangler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowerOptions {
    /// Readable `loop_head_0` style labels instead of mangled ones
    pub use_block_namer: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            use_block_namer: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweringDiagnostic {
    pub severity: Severity,
    pub loc: SourceLoc,
    pub message: String,
}

impl fmt::Display for LoweringDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.loc, self.severity, self.message)
    }
}

#[derive(Debug)]
pub struct LoweringOutput {
    pub module: Module,
    pub diagnostics: Vec<LoweringDiagnostic>,
}

/// Lowers every procedure of `program`, then its main body as
/// `main() -> i64`.
pub fn lower_program(program: &Program, options: &LowerOptions) -> LoweringOutput {
    let mut lowerer = Lowerer::new(*options);

    for procedure in &program.procedures {
        lowerer.declare(procedure);
    }

    for procedure in &program.procedures {
        let role = match procedure.kind.return_type() {
            TypeKind::Void => Role::Sub,
            ty => Role::Function(ty),
        };
        let name = procedure_symbol(procedure.name.name());
        lowerer.lower_body(&name, role, &procedure.params, &procedure.body, procedure.loc);
    }

    let main_loc = program
        .main
        .statements
        .first()
        .map(|s| s.loc)
        .unwrap_or_default();
    lowerer.lower_body("main", Role::Main, &[], &program.main, main_loc);

    debug!(
        functions = lowerer.module.functions.len(),
        diagnostics = lowerer.diagnostics.len(),
        "lowered program"
    );

    LoweringOutput {
        module: lowerer.module,
        diagnostics: lowerer.diagnostics,
    }
}

/// IL name of a BASIC procedure: lower case, type sigils dropped.
pub fn procedure_symbol(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone)]
struct Signature {
    symbol: String,
    params: Vec<TypeKind>,
    ret: TypeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Main,
    Function(TypeKind),
    Sub,
}

impl Role {
    fn return_type(self) -> TypeKind {
        match self {
            Role::Main => TypeKind::I64,
            Role::Function(ty) => ty,
            Role::Sub => TypeKind::Void,
        }
    }
}

/// A construct lowering cannot express. The statement that hit it is cut
/// short with a `trap`.
#[derive(Debug)]
struct Unsupported(String);

type LowerResult<T> = Result<T, Unsupported>;

struct Lowerer {
    options: LowerOptions,
    module: Module,
    diagnostics: Vec<LoweringDiagnostic>,
    signatures: HashMap<InternedSymbol, Signature>,
}

impl Lowerer {
    fn new(options: LowerOptions) -> Self {
        Self {
            options,
            module: Module::new(),
            diagnostics: Vec::new(),
            signatures: HashMap::new(),
        }
    }

    fn declare(&mut self, procedure: &Procedure) {
        self.signatures.insert(
            procedure.name.symbol,
            Signature {
                symbol: procedure_symbol(procedure.name.name()),
                params: procedure
                    .params
                    .iter()
                    .map(|p| p.ty.to_type_kind())
                    .collect(),
                ret: procedure.kind.return_type(),
            },
        );
    }

    fn lower_body(
        &mut self,
        name: &str,
        role: Role,
        params: &[Parameter],
        body: &Body,
        loc: SourceLoc,
    ) {
        let mut function = Function::new(name, role.return_type());
        let incoming = params
            .iter()
            .map(|param| {
                let name = param.name.name().to_ascii_lowercase();
                function.add_param(param.ty.to_type_kind(), &name)
            })
            .collect::<Vec<_>>();

        {
            let mut procedure = ProcedureLowerer {
                builder: Builder::new(&mut function),
                module: &mut self.module,
                diagnostics: &mut self.diagnostics,
                signatures: &self.signatures,
                symbols: SymbolTable::for_procedure(params, body),
                slots: IndexVec::new(),
                names: BlockNames::new(self.options.use_block_namer),
                loops: LoopStack::default(),
                role,
                loc,
            };

            procedure.prologue(&incoming);
            procedure.lower_statements(&body.statements);
            procedure.finish();
        }

        self.module.functions.push(function);
    }
}

/// Lowering state for one procedure.
struct ProcedureLowerer<'a, 'f> {
    builder: Builder<'f>,
    module: &'a mut Module,
    diagnostics: &'a mut Vec<LoweringDiagnostic>,
    signatures: &'a HashMap<InternedSymbol, Signature>,
    symbols: SymbolTable,
    /// The alloca backing each variable
    slots: IndexVec<SlotId, TempId>,
    names: BlockNames,
    loops: LoopStack,
    role: Role,
    loc: SourceLoc,
}

impl ProcedureLowerer<'_, '_> {
    /// Creates the entry block, one slot per variable, and spills the
    /// incoming parameters into their slots.
    fn prologue(&mut self, incoming: &[TempId]) {
        let entry = self.builder.add_block("entry");
        self.builder.position_at_end(entry);
        self.builder.set_loc(self.loc);

        for info in self.symbols.iter() {
            let slot = self
                .builder
                .alloca(&info.name.value().to_ascii_lowercase());
            self.slots.push(slot);
        }

        // Parameters were declared first, so they own the leading slots.
        for (info, &param) in self.symbols.iter().zip(incoming) {
            let slot = self.slots[info.slot];
            self.builder
                .store(info.ty, Value::temp(slot), Value::temp(param));
        }
    }

    /// Closes the block lowering ended in, and any block that was left
    /// without a terminator, with the procedure's default return.
    fn finish(&mut self) {
        if !self.builder.is_terminated() {
            self.builder.set_loc(self.loc);
            self.emit_epilogue();
        }

        let open = self
            .builder
            .function
            .blocks
            .enumerate()
            .filter(|(_, block)| block.terminator().is_none())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        for block in open {
            self.builder.position_at_end(block);
            self.builder.set_loc(self.loc);
            self.emit_epilogue();

            let label = self.builder.function.blocks[block].label.clone();
            self.note(
                self.loc,
                format!("block `{label}` cannot fall through; closed with a return"),
            );
        }
    }

    fn emit_epilogue(&mut self) {
        match self.role {
            Role::Main => self.builder.ret(TypeKind::I64, Some(Value::int(0))),
            Role::Sub => self.builder.ret(TypeKind::Void, None),
            Role::Function(ty) => {
                let value = self.default_value(ty);
                self.builder.ret(ty, Some(value));
            }
        }
    }

    fn note(&mut self, loc: SourceLoc, message: String) {
        debug!(%loc, detail = %message, "lowering note");
        self.diagnostics.push(LoweringDiagnostic {
            severity: Severity::Note,
            loc,
            message,
        });
    }

    /// Ends the current block with a `trap` and records why.
    fn unsupported(&mut self, loc: SourceLoc, Unsupported(message): Unsupported) {
        warn!(%loc, detail = %message, "unsupported construct lowered to trap");
        self.builder.set_loc(loc);
        self.builder.trap();
        self.note(loc, message);
    }

    fn add_block(&mut self, label: String) -> BlockId {
        self.builder.add_block(label)
    }
}
