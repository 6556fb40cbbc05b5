//! The typed linear IL. Functions are ordered lists of basic blocks; every
//! block ends in exactly one terminator and carries typed parameters that play
//! the role of phi nodes. Terminators name their successors by label and pass
//! one argument vector per successor.
//!
//! Blocks are addressed by [`BlockId`] (their position in the function) and
//! values by [`TempId`]. Neither is ever renumbered by a pass, so both are safe
//! to keep across calls that append blocks.

use std::collections::BTreeMap;

use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    frontend::SourceLoc,
    index::{Index, IndexVec, simple_index},
};

pub mod builder;
pub mod cfg;
pub mod dominators;
pub mod parse;
pub mod pretty_print;
pub mod verify;

/// The closed set of representable IL types. The slot ABI keeps one table row
/// per variant, so adding a kind means adding a row there as well.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumCount,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum TypeKind {
    Void,
    I1,
    I16,
    I32,
    I64,
    F64,
    Ptr,
    Str,
    Error,
    #[strum(serialize = "resume_tok")]
    ResumeTok,
}

impl TypeKind {
    pub fn is_integer(self) -> bool {
        matches!(self, Self::I1 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Kinds with no runtime representation in a slot.
    pub fn is_void_like(self) -> bool {
        matches!(self, Self::Void | Self::Error | Self::ResumeTok)
    }

    /// Element types mem2reg is willing to turn into SSA values.
    pub fn is_promotable(self) -> bool {
        matches!(
            self,
            Self::I1 | Self::I16 | Self::I32 | Self::I64 | Self::F64
        )
    }
}

simple_index! {
    /// Identifies a basic block by its position in the function
    pub struct BlockId;
}

impl BlockId {
    pub const ENTRY: Self = Self(0);
}

simple_index! {
    /// Identifies an SSA temporary. Unique within a function.
    pub struct TempId;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    ConstInt { value: i64, ty: TypeKind },
    ConstFloat(f64),
    Temp(TempId),
    Global(String),
    Label(String),
}

impl Value {
    pub fn int(value: i64) -> Self {
        Self::ConstInt {
            value,
            ty: TypeKind::I64,
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::ConstInt {
            value: value as i64,
            ty: TypeKind::I1,
        }
    }

    pub fn float(value: f64) -> Self {
        Self::ConstFloat(value)
    }

    pub fn temp(id: TempId) -> Self {
        Self::Temp(id)
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::Global(name.into())
    }

    /// The zero value of a promotable type: `0.0` for floats, `0` otherwise.
    pub fn zero_of(ty: TypeKind) -> Self {
        match ty {
            TypeKind::F64 => Self::ConstFloat(0.0),
            TypeKind::I1 => Self::bool(false),
            _ => Self::ConstInt { value: 0, ty },
        }
    }

    pub fn as_temp(&self) -> Option<TempId> {
        match self {
            Self::Temp(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_temp(&self, id: TempId) -> bool {
        self.as_temp() == Some(id)
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Self::ConstInt { value, .. } => Some(*value),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    Alloca,
    Load,
    Store,
    Gep,
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    #[strum(serialize = "iadd.ovf")]
    IAddOvf,
    #[strum(serialize = "isub.ovf")]
    ISubOvf,
    #[strum(serialize = "imul.ovf")]
    IMulOvf,
    #[strum(serialize = "sdiv.chk0")]
    SDivChk0,
    #[strum(serialize = "srem.chk0")]
    SRemChk0,
    FAdd,
    FSub,
    FMul,
    FDiv,
    #[strum(serialize = "icmp_eq")]
    ICmpEq,
    #[strum(serialize = "icmp_ne")]
    ICmpNe,
    #[strum(serialize = "scmp_lt")]
    SCmpLT,
    #[strum(serialize = "scmp_le")]
    SCmpLE,
    #[strum(serialize = "scmp_gt")]
    SCmpGT,
    #[strum(serialize = "scmp_ge")]
    SCmpGE,
    #[strum(serialize = "fcmp_eq")]
    FCmpEQ,
    #[strum(serialize = "fcmp_ne")]
    FCmpNE,
    #[strum(serialize = "fcmp_lt")]
    FCmpLT,
    #[strum(serialize = "fcmp_le")]
    FCmpLE,
    #[strum(serialize = "fcmp_gt")]
    FCmpGT,
    #[strum(serialize = "fcmp_ge")]
    FCmpGE,
    Sitofp,
    Fptosi,
    Zext1,
    Trunc1,
    #[strum(serialize = "const_str")]
    ConstStr,
    Call,
    Br,
    CBr,
    Ret,
    Trap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtMost(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtMost(n) => count <= n,
            Arity::Variadic => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultArity {
    None,
    One,
    Optional,
}

/// Operand class an opcode expects, used by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandClass {
    /// Checked per opcode (memory ops, calls, returns, branches)
    Special,
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub operands: Arity,
    pub result: ResultArity,
    pub operand_class: OperandClass,
    pub terminator: bool,
    pub successors: usize,
}

impl OpcodeInfo {
    const fn new(operands: Arity, result: ResultArity, operand_class: OperandClass) -> Self {
        Self {
            operands,
            result,
            operand_class,
            terminator: false,
            successors: 0,
        }
    }

    const fn terminator(operands: Arity, successors: usize) -> Self {
        Self {
            operands,
            result: ResultArity::None,
            operand_class: OperandClass::Special,
            terminator: true,
            successors,
        }
    }
}

impl Opcode {
    pub fn info(self) -> OpcodeInfo {
        use Arity::*;
        use OperandClass::*;

        match self {
            Opcode::Alloca => OpcodeInfo::new(Exact(1), ResultArity::One, Special),
            Opcode::Load => OpcodeInfo::new(Exact(1), ResultArity::One, Special),
            Opcode::Store => OpcodeInfo::new(Exact(2), ResultArity::None, Special),
            Opcode::Gep => OpcodeInfo::new(Exact(2), ResultArity::One, Special),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::SDiv
            | Opcode::SRem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::IAddOvf
            | Opcode::ISubOvf
            | Opcode::IMulOvf
            | Opcode::SDivChk0
            | Opcode::SRemChk0 => OpcodeInfo::new(Exact(2), ResultArity::One, Integer),
            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
                OpcodeInfo::new(Exact(2), ResultArity::One, Float)
            }
            Opcode::ICmpEq
            | Opcode::ICmpNe
            | Opcode::SCmpLT
            | Opcode::SCmpLE
            | Opcode::SCmpGT
            | Opcode::SCmpGE => OpcodeInfo::new(Exact(2), ResultArity::One, Integer),
            Opcode::FCmpEQ
            | Opcode::FCmpNE
            | Opcode::FCmpLT
            | Opcode::FCmpLE
            | Opcode::FCmpGT
            | Opcode::FCmpGE => OpcodeInfo::new(Exact(2), ResultArity::One, Float),
            Opcode::Sitofp | Opcode::Zext1 | Opcode::Trunc1 => {
                OpcodeInfo::new(Exact(1), ResultArity::One, Integer)
            }
            Opcode::Fptosi => OpcodeInfo::new(Exact(1), ResultArity::One, Float),
            Opcode::ConstStr => OpcodeInfo::new(Exact(1), ResultArity::One, Special),
            Opcode::Call => OpcodeInfo::new(Variadic, ResultArity::Optional, Special),
            Opcode::Br => OpcodeInfo::terminator(Exact(0), 1),
            Opcode::CBr => OpcodeInfo::terminator(Exact(1), 2),
            Opcode::Ret => OpcodeInfo::terminator(AtMost(1), 0),
            Opcode::Trap => OpcodeInfo::terminator(Exact(0), 0),
        }
    }

    pub fn is_terminator(self) -> bool {
        self.info().terminator
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::ICmpEq
                | Opcode::ICmpNe
                | Opcode::SCmpLT
                | Opcode::SCmpLE
                | Opcode::SCmpGT
                | Opcode::SCmpGE
                | Opcode::FCmpEQ
                | Opcode::FCmpNE
                | Opcode::FCmpLT
                | Opcode::FCmpLE
                | Opcode::FCmpGT
                | Opcode::FCmpGE
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub result: Option<TempId>,
    pub opcode: Opcode,
    /// Result type, or the element type for `store`, or the returned type for
    /// `ret`
    pub ty: TypeKind,
    pub operands: Vec<Value>,
    /// Target symbol of a `call`
    pub callee: Option<String>,
    /// Successor labels of a terminator
    pub labels: Vec<String>,
    /// One argument vector per entry in `labels`
    pub br_args: Vec<Vec<Value>>,
    pub loc: SourceLoc,
}

impl Instr {
    pub fn new(opcode: Opcode, ty: TypeKind) -> Self {
        Self {
            result: None,
            opcode,
            ty,
            operands: Vec::new(),
            callee: None,
            labels: Vec::new(),
            br_args: Vec::new(),
            loc: SourceLoc::default(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    /// Branch arguments passed along successor slot `index`.
    pub fn successor_args(&self, index: usize) -> &[Value] {
        self.br_args.get(index).map(Vec::as_slice).unwrap_or_default()
    }
}

/// A typed input of a function or block
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: TempId,
    pub ty: TypeKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub params: Vec<Param>,
    pub instructions: Vec<Instr>,
    /// Set once control can no longer fall out of the block
    pub terminated: bool,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            params: Vec::new(),
            instructions: Vec::new(),
            terminated: false,
        }
    }

    /// Appends an instruction, flagging the block terminated when it is a
    /// terminator.
    pub fn push(&mut self, instruction: Instr) {
        if instruction.is_terminator() {
            self.terminated = true;
        }
        self.instructions.push(instruction);
    }

    pub fn terminator(&self) -> Option<&Instr> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut Instr> {
        self.instructions.last_mut().filter(|i| i.is_terminator())
    }

    pub fn successor_labels(&self) -> &[String] {
        self.terminator()
            .map(|t| t.labels.as_slice())
            .unwrap_or_default()
    }

    pub fn is_well_formed(&self) -> bool {
        let Some((last, rest)) = self.instructions.split_last() else {
            return false;
        };

        self.terminated && last.is_terminator() && rest.iter().all(|i| !i.is_terminator())
    }
}

/// Side table entry for a temporary
#[derive(Debug, Clone, PartialEq)]
pub struct TempInfo {
    pub ty: TypeKind,
    pub name: Option<String>,
}

/// Where a temporary is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UseSite {
    pub block: BlockId,
    pub instruction: usize,
    pub position: UsePosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UsePosition {
    Operand(usize),
    BranchArgument { successor: usize, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub return_type: TypeKind,
    pub params: Vec<Param>,
    pub blocks: IndexVec<BlockId, BasicBlock>,
    pub temps: BTreeMap<TempId, TempInfo>,
    /// One past the highest registered temp id.
    next_temp: usize,
}

impl Function {
    pub fn new(name: impl Into<String>, return_type: TypeKind) -> Self {
        Self {
            name: name.into(),
            return_type,
            params: Vec::new(),
            blocks: IndexVec::new(),
            temps: BTreeMap::new(),
            next_temp: 0,
        }
    }

    /// First temp id not yet handed out. Only ids that went through
    /// [`Function::register_temp`] are counted; call
    /// [`Function::recount_temps`] after pushing definitions by hand.
    pub fn next_temp_id(&self) -> TempId {
        TempId::new(self.next_temp)
    }

    /// Raises the temp counter past every definition in the function,
    /// including results that were never registered.
    pub fn recount_temps(&mut self) {
        let mut next = self.next_temp;
        let mut update = |id: TempId| next = next.max(id.index() + 1);

        for param in &self.params {
            update(param.id);
        }
        for block in &self.blocks {
            for param in &block.params {
                update(param.id);
            }
            for instruction in &block.instructions {
                if let Some(result) = instruction.result {
                    update(result);
                }
            }
        }

        self.next_temp = next;
    }

    /// Allocates a fresh temporary and records its type and name.
    pub fn new_temp(&mut self, ty: TypeKind, name: Option<&str>) -> TempId {
        let id = self.next_temp_id();
        self.register_temp(id, ty, name);
        id
    }

    pub fn register_temp(&mut self, id: TempId, ty: TypeKind, name: Option<&str>) {
        self.next_temp = self.next_temp.max(id.index() + 1);
        self.temps.insert(
            id,
            TempInfo {
                ty,
                name: name.map(str::to_owned),
            },
        );
    }

    pub fn add_param(&mut self, ty: TypeKind, name: &str) -> TempId {
        let id = self.new_temp(ty, Some(name));
        self.params.push(Param {
            id,
            ty,
            name: name.to_owned(),
        });
        id
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        self.blocks.push(BasicBlock::new(label))
    }

    pub fn entry(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then_some(BlockId::ENTRY)
    }

    pub fn block_id(&self, label: &str) -> Option<BlockId> {
        self.blocks
            .enumerate()
            .find(|(_, block)| block.label == label)
            .map(|(id, _)| id)
    }

    pub fn block_by_label(&self, label: &str) -> Option<&BasicBlock> {
        self.block_id(label).map(|id| &self.blocks[id])
    }

    /// Distinct successors of `block`, in terminator label order.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let mut successors = Vec::new();
        for label in self.blocks[block].successor_labels() {
            if let Some(id) = self.block_id(label) {
                if !successors.contains(&id) {
                    successors.push(id);
                }
            }
        }
        successors
    }

    /// Distinct predecessors of `block`, ordered by (block index, successor
    /// slot) of the branching terminator. Passes that query predecessors
    /// repeatedly should build a [`cfg::FunctionCfg`] instead.
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        let label = &self.blocks[block].label;
        self.blocks
            .enumerate()
            .filter(|(_, b)| b.successor_labels().iter().any(|l| l == label))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn temp_type(&self, id: TempId) -> Option<TypeKind> {
        self.temps.get(&id).map(|info| info.ty)
    }

    pub fn temp_name(&self, id: TempId) -> Option<&str> {
        self.temps.get(&id).and_then(|info| info.name.as_deref())
    }

    pub fn value_type(&self, value: &Value) -> Option<TypeKind> {
        match value {
            Value::ConstInt { ty, .. } => Some(*ty),
            Value::ConstFloat(_) => Some(TypeKind::F64),
            Value::Temp(id) => self.temp_type(*id),
            Value::Global(_) => Some(TypeKind::Ptr),
            Value::Label(_) => None,
        }
    }

    pub fn uses_of(&self, temp: TempId) -> Vec<UseSite> {
        let mut uses = Vec::new();

        for (block_id, block) in self.blocks.enumerate() {
            for (i, instruction) in block.instructions.iter().enumerate() {
                for (n, operand) in instruction.operands.iter().enumerate() {
                    if operand.is_temp(temp) {
                        uses.push(UseSite {
                            block: block_id,
                            instruction: i,
                            position: UsePosition::Operand(n),
                        });
                    }
                }
                for (successor, args) in instruction.br_args.iter().enumerate() {
                    for (index, arg) in args.iter().enumerate() {
                        if arg.is_temp(temp) {
                            uses.push(UseSite {
                                block: block_id,
                                instruction: i,
                                position: UsePosition::BranchArgument { successor, index },
                            });
                        }
                    }
                }
            }
        }

        uses
    }

    /// Rewrites every operand and branch argument equal to `temp` into
    /// `value`. Returns how many slots were rewritten.
    pub fn replace_all_uses(&mut self, temp: TempId, value: &Value) -> usize {
        let mut replaced = 0;

        for block in self.blocks.iter_mut() {
            for instruction in &mut block.instructions {
                let slots = instruction
                    .operands
                    .iter_mut()
                    .chain(instruction.br_args.iter_mut().flatten());

                for slot in slots {
                    if slot.is_temp(temp) {
                        *slot = value.clone();
                        replaced += 1;
                    }
                }
            }
        }

        replaced
    }
}

/// Declaration of a runtime helper implemented outside the module
#[derive(Debug, Clone, PartialEq)]
pub struct Extern {
    pub name: String,
    pub params: Vec<TypeKind>,
    pub ret: TypeKind,
}

/// Read-only string data
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub externs: Vec<Extern>,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn find_extern(&self, name: &str) -> Option<&Extern> {
        self.externs.iter().find(|e| e.name == name)
    }

    pub fn declare_extern(&mut self, name: &str, params: &[TypeKind], ret: TypeKind) {
        if self.find_extern(name).is_none() {
            self.externs.push(Extern {
                name: name.to_owned(),
                params: params.to_vec(),
                ret,
            });
        }
    }

    /// Interns a string literal as read-only data and returns its symbol.
    pub fn intern_string(&mut self, value: &str) -> String {
        if let Some(global) = self.globals.iter().find(|g| g.value == value) {
            return global.name.clone();
        }

        let name = format!(".str{}", self.globals.len());
        self.globals.push(Global {
            name: name.clone(),
            value: value.to_owned(),
        });
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Function {
        let mut f = Function::new("diamond", TypeKind::I64);
        let c = f.add_param(TypeKind::I1, "c");
        let entry = f.add_block("entry");
        let left = f.add_block("left");
        let right = f.add_block("right");
        let join = f.add_block("join");

        f.blocks[entry].push(Instr::cbr(Value::temp(c), "left", vec![], "right", vec![]));
        f.blocks[left].push(Instr::br("join", vec![]));
        f.blocks[right].push(Instr::br("join", vec![]));
        f.blocks[join].push(Instr::ret(TypeKind::I64, Some(Value::int(0))));
        f
    }

    #[test]
    fn successors_and_predecessors_follow_label_order() {
        let f = diamond();

        assert_eq!(
            f.successors(BlockId::ENTRY),
            vec![BlockId::new(1), BlockId::new(2)]
        );
        assert_eq!(
            f.predecessors(BlockId::new(3)),
            vec![BlockId::new(1), BlockId::new(2)]
        );
        assert!(f.predecessors(BlockId::ENTRY).is_empty());
    }

    #[test]
    fn replace_all_uses_rewrites_operands_and_branch_arguments() {
        let mut f = Function::new("f", TypeKind::I64);
        let entry = f.add_block("entry");
        let exit = f.add_block("exit");
        let t = f.new_temp(TypeKind::I64, None);
        let p = f.new_temp(TypeKind::I64, None);
        f.blocks[exit].params.push(Param {
            id: p,
            ty: TypeKind::I64,
            name: "p".into(),
        });

        let sum = f.new_temp(TypeKind::I64, None);
        f.blocks[entry].push(Instr::binary(
            Opcode::Add,
            sum,
            TypeKind::I64,
            Value::temp(t),
            Value::temp(t),
        ));
        f.blocks[entry].push(Instr::br("exit", vec![Value::temp(t)]));
        f.blocks[exit].push(Instr::ret(TypeKind::I64, Some(Value::temp(p))));

        assert_eq!(f.uses_of(t).len(), 3);
        assert_eq!(f.replace_all_uses(t, &Value::int(4)), 3);
        assert!(f.uses_of(t).is_empty());
        assert_eq!(f.blocks[entry].instructions[1].br_args[0], vec![Value::int(4)]);
    }

    #[test]
    fn next_temp_id_accounts_for_unregistered_definitions() {
        let mut f = Function::new("f", TypeKind::Void);
        let entry = f.add_block("entry");
        let mut alloca = Instr::new(Opcode::Alloca, TypeKind::Ptr);
        alloca.result = Some(TempId::new(41));
        alloca.operands.push(Value::int(8));
        f.blocks[entry].push(alloca);
        assert_eq!(f.next_temp_id(), TempId::new(0));

        f.recount_temps();
        assert_eq!(f.next_temp_id(), TempId::new(42));
        assert_eq!(f.new_temp(TypeKind::I64, None), TempId::new(42));
    }

    #[test]
    fn temp_counter_follows_registration() {
        let mut f = Function::new("f", TypeKind::I64);
        let x = f.add_param(TypeKind::I64, "x");
        f.register_temp(TempId::new(9), TypeKind::I1, None);
        let fresh = f.new_temp(TypeKind::I64, Some("y"));

        assert_eq!(x, TempId::new(0));
        assert_eq!(fresh, TempId::new(10));
        assert_eq!(f.temp_name(fresh), Some("y"));

        for _ in 0..10_000 {
            f.new_temp(TypeKind::I64, None);
        }
        assert_eq!(f.next_temp_id(), TempId::new(10_011));
    }

    #[test]
    fn block_well_formedness() {
        let mut block = BasicBlock::new("b");
        assert!(!block.is_well_formed());

        block.push(Instr::trap());
        assert!(block.terminated);
        assert!(block.is_well_formed());

        block.push(Instr::trap());
        assert!(!block.is_well_formed());
    }

    #[test]
    fn module_interns_strings_once() {
        let mut module = Module::new();
        let a = module.intern_string("hello");
        let b = module.intern_string("hello");
        let c = module.intern_string("world");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.globals.len(), 2);
    }
}
