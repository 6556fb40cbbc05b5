//! Constructors for the common instruction shapes, and a small cursor for
//! emitting into a function block by block.

use crate::frontend::SourceLoc;

use super::{BlockId, Function, Instr, Opcode, Param, TempId, TypeKind, Value};

impl Instr {
    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = loc;
        self
    }

    pub fn alloca(result: TempId, size: i64) -> Self {
        Self {
            result: Some(result),
            operands: vec![Value::int(size)],
            ..Self::new(Opcode::Alloca, TypeKind::Ptr)
        }
    }

    pub fn load(result: TempId, ty: TypeKind, address: Value) -> Self {
        Self {
            result: Some(result),
            operands: vec![address],
            ..Self::new(Opcode::Load, ty)
        }
    }

    pub fn store(ty: TypeKind, address: Value, value: Value) -> Self {
        Self {
            operands: vec![address, value],
            ..Self::new(Opcode::Store, ty)
        }
    }

    pub fn binary(opcode: Opcode, result: TempId, ty: TypeKind, lhs: Value, rhs: Value) -> Self {
        Self {
            result: Some(result),
            operands: vec![lhs, rhs],
            ..Self::new(opcode, ty)
        }
    }

    pub fn unary(opcode: Opcode, result: TempId, ty: TypeKind, operand: Value) -> Self {
        Self {
            result: Some(result),
            operands: vec![operand],
            ..Self::new(opcode, ty)
        }
    }

    pub fn call(result: Option<TempId>, ty: TypeKind, callee: &str, args: Vec<Value>) -> Self {
        Self {
            result,
            operands: args,
            callee: Some(callee.to_owned()),
            ..Self::new(Opcode::Call, ty)
        }
    }

    pub fn const_str(result: TempId, global: &str) -> Self {
        Self {
            result: Some(result),
            operands: vec![Value::global(global)],
            ..Self::new(Opcode::ConstStr, TypeKind::Str)
        }
    }

    pub fn br(target: &str, args: Vec<Value>) -> Self {
        Self {
            labels: vec![target.to_owned()],
            br_args: vec![args],
            ..Self::new(Opcode::Br, TypeKind::Void)
        }
    }

    pub fn cbr(
        condition: Value,
        if_true: &str,
        true_args: Vec<Value>,
        if_false: &str,
        false_args: Vec<Value>,
    ) -> Self {
        Self {
            operands: vec![condition],
            labels: vec![if_true.to_owned(), if_false.to_owned()],
            br_args: vec![true_args, false_args],
            ..Self::new(Opcode::CBr, TypeKind::Void)
        }
    }

    /// `ret` with `value`, or a bare `ret` when `value` is `None`
    pub fn ret(ty: TypeKind, value: Option<Value>) -> Self {
        match value {
            Some(value) => Self {
                operands: vec![value],
                ..Self::new(Opcode::Ret, ty)
            },
            None => Self::new(Opcode::Ret, TypeKind::Void),
        }
    }

    pub fn trap() -> Self {
        Self::new(Opcode::Trap, TypeKind::Void)
    }
}

/// Emits instructions at the end of a chosen block. Only the block index is
/// held, so appending blocks through [`Builder::add_block`] never leaves the
/// cursor dangling.
pub struct Builder<'f> {
    pub function: &'f mut Function,
    current: Option<BlockId>,
    loc: SourceLoc,
}

impl<'f> Builder<'f> {
    pub fn new(function: &'f mut Function) -> Self {
        Self {
            function,
            current: None,
            loc: SourceLoc::default(),
        }
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        self.function.add_block(label)
    }

    pub fn add_block_param(&mut self, block: BlockId, ty: TypeKind, name: &str) -> TempId {
        let id = self.function.new_temp(ty, Some(name));
        self.function.blocks[block].params.push(Param {
            id,
            ty,
            name: name.to_owned(),
        });
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    pub fn set_loc(&mut self, loc: SourceLoc) {
        self.loc = loc;
    }

    pub fn loc(&self) -> SourceLoc {
        self.loc
    }

    pub fn is_terminated(&self) -> bool {
        self.current
            .is_none_or(|block| self.function.blocks[block].terminated)
    }

    pub fn temp(&mut self, ty: TypeKind) -> TempId {
        self.function.new_temp(ty, None)
    }

    /// Appends `instr` to the current block, stamping the current location
    /// when the instruction carries none.
    ///
    /// # Panics
    /// Panics when no block has been selected.
    pub fn emit(&mut self, mut instr: Instr) {
        if !instr.loc.is_known() {
            instr.loc = self.loc;
        }

        let block = self.current.expect("builder has no insertion block");
        self.function.blocks[block].push(instr);
    }

    pub fn emit_value(&mut self, opcode: Opcode, ty: TypeKind, operands: Vec<Value>) -> Value {
        let ty = if opcode.is_comparison() {
            TypeKind::I1
        } else {
            ty
        };
        let result = self.temp(ty);

        self.emit(Instr {
            result: Some(result),
            operands,
            ..Instr::new(opcode, ty)
        });

        Value::temp(result)
    }

    pub fn alloca(&mut self, name: &str) -> TempId {
        let result = self.function.new_temp(TypeKind::Ptr, Some(name));
        self.emit(Instr::alloca(result, 8));
        result
    }

    pub fn load(&mut self, ty: TypeKind, address: Value) -> Value {
        let result = self.temp(ty);
        self.emit(Instr::load(result, ty, address));
        Value::temp(result)
    }

    pub fn store(&mut self, ty: TypeKind, address: Value, value: Value) {
        self.emit(Instr::store(ty, address, value));
    }

    pub fn call(&mut self, ty: TypeKind, callee: &str, args: Vec<Value>) -> Option<Value> {
        let result = (!ty.is_void_like()).then(|| self.temp(ty));
        self.emit(Instr::call(result, ty, callee, args));
        result.map(Value::temp)
    }

    pub fn br(&mut self, target: BlockId) {
        let label = self.function.blocks[target].label.clone();
        self.emit(Instr::br(&label, Vec::new()));
    }

    pub fn cbr(&mut self, condition: Value, if_true: BlockId, if_false: BlockId) {
        let true_label = self.function.blocks[if_true].label.clone();
        let false_label = self.function.blocks[if_false].label.clone();
        self.emit(Instr::cbr(
            condition,
            &true_label,
            Vec::new(),
            &false_label,
            Vec::new(),
        ));
    }

    pub fn ret(&mut self, ty: TypeKind, value: Option<Value>) {
        self.emit(Instr::ret(ty, value));
    }

    pub fn trap(&mut self) {
        self.emit(Instr::trap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_stamps_location_and_tracks_termination() {
        let mut function = Function::new("f", TypeKind::I64);
        let mut builder = Builder::new(&mut function);
        let entry = builder.add_block("entry");
        let exit = builder.add_block("exit");

        builder.position_at_end(entry);
        builder.set_loc(SourceLoc::new(1, 3, 5));
        let slot = builder.alloca("X");
        builder.store(TypeKind::I64, Value::temp(slot), Value::int(1));
        assert!(!builder.is_terminated());
        builder.br(exit);
        assert!(builder.is_terminated());

        builder.position_at_end(exit);
        let x = builder.load(TypeKind::I64, Value::temp(slot));
        builder.ret(TypeKind::I64, Some(x));

        let entry_block = &function.blocks[entry];
        assert!(entry_block.is_well_formed());
        assert!(
            entry_block
                .instructions
                .iter()
                .all(|i| i.loc == SourceLoc::new(1, 3, 5))
        );
        assert_eq!(entry_block.successor_labels(), ["exit".to_owned()]);
        assert_eq!(function.temp_name(slot), Some("X"));
    }

    #[test]
    fn comparison_results_are_boolean() {
        let mut function = Function::new("f", TypeKind::Void);
        let mut builder = Builder::new(&mut function);
        let entry = builder.add_block("entry");
        builder.position_at_end(entry);

        let c = builder.emit_value(
            Opcode::SCmpLE,
            TypeKind::I64,
            vec![Value::int(1), Value::int(2)],
        );

        assert_eq!(function.value_type(&c), Some(TypeKind::I1));
    }
}
