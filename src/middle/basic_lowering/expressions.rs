use super::{LowerResult, ProcedureLowerer, Unsupported};
use crate::{
    frontend::{
        SourceLoc,
        basic::ast::{BinaryOperator, Expression, ExpressionKind, Identifier, UnaryOperator},
    },
    middle::il::{BlockId, Instr, Opcode, TypeKind, Value},
};

/// Runtime entry points lowering may call, declared on first use.
pub(super) const RUNTIME_EXTERNS: &[(&str, &[TypeKind], TypeKind)] = &[
    ("rt_print_i64", &[TypeKind::I64], TypeKind::Void),
    ("rt_print_f64", &[TypeKind::F64], TypeKind::Void),
    ("rt_print_str", &[TypeKind::Str], TypeKind::Void),
    ("rt_print_newline", &[], TypeKind::Void),
    ("rt_abs_i64", &[TypeKind::I64], TypeKind::I64),
    ("rt_abs_f64", &[TypeKind::F64], TypeKind::F64),
    ("rt_sqrt", &[TypeKind::F64], TypeKind::F64),
    ("rt_concat", &[TypeKind::Str, TypeKind::Str], TypeKind::Str),
    ("rt_str_eq", &[TypeKind::Str, TypeKind::Str], TypeKind::I1),
    ("rt_end", &[], TypeKind::Void),
];

/// A lowered expression and its IL type
#[derive(Debug, Clone)]
pub(super) struct Typed {
    pub value: Value,
    pub ty: TypeKind,
}

impl Typed {
    fn new(value: Value, ty: TypeKind) -> Self {
        Self { value, ty }
    }

    fn as_i64_constant(&self) -> Option<i64> {
        match (&self.value, self.ty) {
            (Value::ConstInt { value, .. }, TypeKind::I64) => Some(*value),
            _ => None,
        }
    }
}

fn unsupported<T>(message: impl Into<String>) -> LowerResult<T> {
    Err(Unsupported(message.into()))
}

impl ProcedureLowerer<'_, '_> {
    pub(super) fn lower_expression(&mut self, expression: &Expression) -> LowerResult<Typed> {
        match &expression.kind {
            ExpressionKind::IntegerLiteral(value) => {
                Ok(Typed::new(Value::int(*value), TypeKind::I64))
            }
            ExpressionKind::FloatLiteral(value) => {
                Ok(Typed::new(Value::float(*value), TypeKind::F64))
            }
            ExpressionKind::BooleanLiteral(value) => {
                Ok(Typed::new(Value::bool(*value), TypeKind::I1))
            }
            ExpressionKind::StringLiteral(value) => {
                let global = self.module.intern_string(value);
                let result = self.builder.temp(TypeKind::Str);
                self.builder.emit(Instr::const_str(result, &global));
                Ok(Typed::new(Value::temp(result), TypeKind::Str))
            }
            ExpressionKind::Variable(identifier) => self.load_variable(identifier),
            ExpressionKind::Unary { operator, operand } => {
                let operand = self.lower_expression(operand)?;
                self.lower_unary(*operator, operand)
            }
            ExpressionKind::Binary { lhs, operator, rhs } => {
                let lhs = self.lower_expression(lhs)?;
                let rhs = self.lower_expression(rhs)?;
                self.lower_binary(*operator, lhs, rhs)
            }
            ExpressionKind::Call { callee, args } => match self.lower_call(callee, args)? {
                Some(result) => Ok(result),
                None => unsupported(format!("SUB `{}` does not produce a value", callee.name())),
            },
        }
    }

    /// Address and element type of `identifier`'s slot.
    pub(super) fn variable_slot(&self, identifier: &Identifier) -> LowerResult<(Value, TypeKind)> {
        match self.symbols.lookup(identifier.symbol) {
            Some(info) => Ok((Value::temp(self.slots[info.slot]), info.ty)),
            None => unsupported(format!("unknown variable `{}`", identifier.name())),
        }
    }

    fn load_variable(&mut self, identifier: &Identifier) -> LowerResult<Typed> {
        let (address, ty) = self.variable_slot(identifier)?;
        let value = self.builder.load(ty, address);
        Ok(Typed::new(value, ty))
    }

    /// Converts `typed` to `target`. Integers widen to floats, floats
    /// truncate to integers, and anything numeric tests against zero when a
    /// truth value is wanted.
    pub(super) fn coerce(&mut self, typed: Typed, target: TypeKind) -> LowerResult<Value> {
        use TypeKind::*;

        let Typed { value, ty } = typed;
        let converted = match (ty, target) {
            (from, to) if from == to => value,
            (I1, I64) => self.builder.emit_value(Opcode::Zext1, I64, vec![value]),
            (I64, F64) => self.builder.emit_value(Opcode::Sitofp, F64, vec![value]),
            (I1, F64) => {
                let wide = self.builder.emit_value(Opcode::Zext1, I64, vec![value]);
                self.builder.emit_value(Opcode::Sitofp, F64, vec![wide])
            }
            (F64, I64) => self.builder.emit_value(Opcode::Fptosi, I64, vec![value]),
            (I64, I1) => self
                .builder
                .emit_value(Opcode::ICmpNe, I64, vec![value, Value::int(0)]),
            (F64, I1) => self
                .builder
                .emit_value(Opcode::FCmpNE, F64, vec![value, Value::float(0.0)]),
            (from, to) => return unsupported(format!("cannot convert {from} to {to}")),
        };
        Ok(converted)
    }

    pub(super) fn lower_condition(&mut self, condition: &Expression) -> LowerResult<Value> {
        let typed = self.lower_expression(condition)?;
        self.coerce(typed, TypeKind::I1)
    }

    /// Evaluates `condition` in the current block and branches on it. A
    /// condition that cannot be lowered ends the block with a trap instead,
    /// in which case neither target is reached and `false` is returned.
    pub(super) fn branch_on(
        &mut self,
        condition: &Expression,
        if_true: BlockId,
        if_false: BlockId,
        loc: SourceLoc,
    ) -> bool {
        self.builder.set_loc(loc);
        match self.lower_condition(condition) {
            Ok(value) => {
                self.builder.set_loc(loc);
                self.builder.cbr(value, if_true, if_false);
                true
            }
            Err(error) => {
                self.unsupported(loc, error);
                false
            }
        }
    }

    fn lower_unary(&mut self, operator: UnaryOperator, operand: Typed) -> LowerResult<Typed> {
        match (operator, operand.ty) {
            (_, TypeKind::Str) => unsupported("string operand to a numeric operator"),
            (UnaryOperator::Negate, TypeKind::F64) => {
                let value = match operand.value {
                    Value::ConstFloat(value) => Value::float(-value),
                    value => self.builder.emit_value(
                        Opcode::FSub,
                        TypeKind::F64,
                        vec![Value::float(0.0), value],
                    ),
                };
                Ok(Typed::new(value, TypeKind::F64))
            }
            (UnaryOperator::Negate, _) => {
                if let Some(negated) = operand
                    .as_i64_constant()
                    .and_then(|value| value.checked_neg())
                {
                    return Ok(Typed::new(Value::int(negated), TypeKind::I64));
                }

                let value = self.coerce(operand, TypeKind::I64)?;
                let negated = self.builder.emit_value(
                    Opcode::ISubOvf,
                    TypeKind::I64,
                    vec![Value::int(0), value],
                );
                Ok(Typed::new(negated, TypeKind::I64))
            }
            (UnaryOperator::Not, TypeKind::I1) => {
                let value = self.builder.emit_value(
                    Opcode::Xor,
                    TypeKind::I1,
                    vec![operand.value, Value::bool(true)],
                );
                Ok(Typed::new(value, TypeKind::I1))
            }
            (UnaryOperator::Not, _) => {
                let value = self.coerce(operand, TypeKind::I64)?;
                let inverted =
                    self.builder
                        .emit_value(Opcode::Xor, TypeKind::I64, vec![value, Value::int(-1)]);
                Ok(Typed::new(inverted, TypeKind::I64))
            }
        }
    }

    fn lower_binary(
        &mut self,
        operator: BinaryOperator,
        lhs: Typed,
        rhs: Typed,
    ) -> LowerResult<Typed> {
        use BinaryOperator::*;

        let strings = (lhs.ty == TypeKind::Str, rhs.ty == TypeKind::Str);
        match (operator, strings) {
            (Add, (true, true)) => {
                let value = self.call_runtime("rt_concat", vec![lhs.value, rhs.value]);
                return Ok(Typed::new(value, TypeKind::Str));
            }
            (Eq | Ne, (true, true)) => return self.compare_strings(operator, lhs, rhs),
            (_, (false, false)) => {}
            _ => return unsupported(format!("operator {operator:?} does not apply to strings")),
        }

        match operator {
            Add | Sub | Mul => self.lower_arithmetic(operator, lhs, rhs),
            Div => {
                let lhs = self.coerce(lhs, TypeKind::F64)?;
                let rhs = self.coerce(rhs, TypeKind::F64)?;
                let value = self
                    .builder
                    .emit_value(Opcode::FDiv, TypeKind::F64, vec![lhs, rhs]);
                Ok(Typed::new(value, TypeKind::F64))
            }
            IntDiv | Mod => {
                let opcode = if operator == IntDiv {
                    Opcode::SDivChk0
                } else {
                    Opcode::SRemChk0
                };
                let lhs = self.coerce(lhs, TypeKind::I64)?;
                let rhs = self.coerce(rhs, TypeKind::I64)?;
                let value = self.builder.emit_value(opcode, TypeKind::I64, vec![lhs, rhs]);
                Ok(Typed::new(value, TypeKind::I64))
            }
            Eq | Ne | Lt | Le | Gt | Ge => self.lower_comparison(operator, lhs, rhs),
            And | Or => self.lower_logical(operator, lhs, rhs),
        }
    }

    fn lower_arithmetic(
        &mut self,
        operator: BinaryOperator,
        lhs: Typed,
        rhs: Typed,
    ) -> LowerResult<Typed> {
        let float = lhs.ty == TypeKind::F64 || rhs.ty == TypeKind::F64;
        let (opcode, ty) = match (operator, float) {
            (BinaryOperator::Add, true) => (Opcode::FAdd, TypeKind::F64),
            (BinaryOperator::Sub, true) => (Opcode::FSub, TypeKind::F64),
            (BinaryOperator::Mul, true) => (Opcode::FMul, TypeKind::F64),
            (BinaryOperator::Add, false) => (Opcode::IAddOvf, TypeKind::I64),
            (BinaryOperator::Sub, false) => (Opcode::ISubOvf, TypeKind::I64),
            (BinaryOperator::Mul, false) => (Opcode::IMulOvf, TypeKind::I64),
            _ => return unsupported(format!("{operator:?} is not arithmetic")),
        };

        let lhs = self.coerce(lhs, ty)?;
        let rhs = self.coerce(rhs, ty)?;
        let value = self.builder.emit_value(opcode, ty, vec![lhs, rhs]);
        Ok(Typed::new(value, ty))
    }

    fn lower_comparison(
        &mut self,
        operator: BinaryOperator,
        lhs: Typed,
        rhs: Typed,
    ) -> LowerResult<Typed> {
        use BinaryOperator::*;

        let float = lhs.ty == TypeKind::F64 || rhs.ty == TypeKind::F64;
        let boolean = lhs.ty == TypeKind::I1 && rhs.ty == TypeKind::I1;

        let (opcode, operand_ty) = match (operator, float) {
            (Eq, true) => (Opcode::FCmpEQ, TypeKind::F64),
            (Ne, true) => (Opcode::FCmpNE, TypeKind::F64),
            (Lt, true) => (Opcode::FCmpLT, TypeKind::F64),
            (Le, true) => (Opcode::FCmpLE, TypeKind::F64),
            (Gt, true) => (Opcode::FCmpGT, TypeKind::F64),
            (Ge, true) => (Opcode::FCmpGE, TypeKind::F64),
            (Eq, false) if boolean => (Opcode::ICmpEq, TypeKind::I1),
            (Ne, false) if boolean => (Opcode::ICmpNe, TypeKind::I1),
            (Eq, false) => (Opcode::ICmpEq, TypeKind::I64),
            (Ne, false) => (Opcode::ICmpNe, TypeKind::I64),
            (Lt, false) => (Opcode::SCmpLT, TypeKind::I64),
            (Le, false) => (Opcode::SCmpLE, TypeKind::I64),
            (Gt, false) => (Opcode::SCmpGT, TypeKind::I64),
            (Ge, false) => (Opcode::SCmpGE, TypeKind::I64),
            _ => return unsupported(format!("{operator:?} is not a comparison")),
        };

        let lhs = self.coerce(lhs, operand_ty)?;
        let rhs = self.coerce(rhs, operand_ty)?;
        let value = self.builder.emit_value(opcode, operand_ty, vec![lhs, rhs]);
        Ok(Typed::new(value, TypeKind::I1))
    }

    fn compare_strings(
        &mut self,
        operator: BinaryOperator,
        lhs: Typed,
        rhs: Typed,
    ) -> LowerResult<Typed> {
        let equal = self.call_runtime("rt_str_eq", vec![lhs.value, rhs.value]);
        let value = if operator == BinaryOperator::Ne {
            self.builder
                .emit_value(Opcode::Xor, TypeKind::I1, vec![equal, Value::bool(true)])
        } else {
            equal
        };
        Ok(Typed::new(value, TypeKind::I1))
    }

    /// `AND`/`OR` are logical on booleans and bitwise on integers.
    fn lower_logical(
        &mut self,
        operator: BinaryOperator,
        lhs: Typed,
        rhs: Typed,
    ) -> LowerResult<Typed> {
        let opcode = match operator {
            BinaryOperator::And => Opcode::And,
            BinaryOperator::Or => Opcode::Or,
            _ => return unsupported(format!("{operator:?} is not a logical operator")),
        };
        let ty = if lhs.ty == TypeKind::I1 && rhs.ty == TypeKind::I1 {
            TypeKind::I1
        } else {
            TypeKind::I64
        };

        let lhs = self.coerce(lhs, ty)?;
        let rhs = self.coerce(rhs, ty)?;
        let value = self.builder.emit_value(opcode, ty, vec![lhs, rhs]);
        Ok(Typed::new(value, ty))
    }

    /// Calls a numeric builtin or a user procedure. Returns `None` for a
    /// `SUB`.
    pub(super) fn lower_call(
        &mut self,
        callee: &Identifier,
        args: &[Expression],
    ) -> LowerResult<Option<Typed>> {
        let name = callee.name();
        let signatures = self.signatures;

        if let Some(signature) = signatures.get(&callee.symbol) {
            if signature.params.len() != args.len() {
                return unsupported(format!(
                    "`{name}` expects {} argument(s), got {}",
                    signature.params.len(),
                    args.len()
                ));
            }

            let mut values = Vec::with_capacity(args.len());
            for (arg, &ty) in args.iter().zip(&signature.params) {
                let typed = self.lower_expression(arg)?;
                values.push(self.coerce(typed, ty)?);
            }

            let result = self
                .builder
                .call(signature.ret, &signature.symbol, values);
            return Ok(result.map(|value| Typed::new(value, signature.ret)));
        }

        let [arg] = args else {
            return unsupported(format!("unknown procedure `{name}`"));
        };

        match name {
            "ABS" => {
                let typed = self.lower_expression(arg)?;
                if typed.ty == TypeKind::F64 {
                    let value = self.call_runtime("rt_abs_f64", vec![typed.value]);
                    Ok(Some(Typed::new(value, TypeKind::F64)))
                } else {
                    let value = self.coerce(typed, TypeKind::I64)?;
                    let value = self.call_runtime("rt_abs_i64", vec![value]);
                    Ok(Some(Typed::new(value, TypeKind::I64)))
                }
            }
            "SQR" => {
                let typed = self.lower_expression(arg)?;
                let value = self.coerce(typed, TypeKind::F64)?;
                let value = self.call_runtime("rt_sqrt", vec![value]);
                Ok(Some(Typed::new(value, TypeKind::F64)))
            }
            _ => unsupported(format!("unknown procedure `{name}`")),
        }
    }

    /// Calls runtime helper `name`, declaring it on first use. Void helpers
    /// yield a placeholder zero that callers discard.
    pub(super) fn call_runtime(&mut self, name: &str, args: Vec<Value>) -> Value {
        let (params, ret) = match RUNTIME_EXTERNS.iter().find(|(helper, ..)| *helper == name) {
            Some(&(_, params, ret)) => (params, ret),
            None => (&[][..], TypeKind::Void),
        };

        self.module.declare_extern(name, params, ret);
        self.builder
            .call(ret, name, args)
            .unwrap_or_else(|| Value::int(0))
    }

    /// The value a procedure returns when it falls off its end.
    pub(super) fn default_value(&mut self, ty: TypeKind) -> Value {
        if ty != TypeKind::Str {
            return Value::zero_of(ty);
        }

        let global = self.module.intern_string("");
        let result = self.builder.temp(TypeKind::Str);
        self.builder.emit(Instr::const_str(result, &global));
        Value::temp(result)
    }
}
