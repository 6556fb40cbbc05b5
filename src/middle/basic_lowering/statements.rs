use std::iter;

use super::{LowerResult, ProcedureLowerer, Role};
use crate::{
    frontend::{
        SourceLoc,
        basic::ast::{Expression, Identifier, IfStatement, Statement, StatementKind},
    },
    middle::il::{Instr, TypeKind, Value},
};

impl ProcedureLowerer<'_, '_> {
    /// Lowers `statements` in order, stopping at the first one that leaves
    /// the current block terminated.
    pub(super) fn lower_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            if self.builder.is_terminated() {
                break;
            }
            self.lower_statement(statement);
        }
    }

    fn lower_statement(&mut self, statement: &Statement) {
        self.builder.set_loc(statement.loc);

        if let Err(error) = self.lower_statement_kind(statement) {
            self.unsupported(statement.loc, error);
        }
    }

    fn lower_statement_kind(&mut self, statement: &Statement) -> LowerResult<()> {
        let loc = statement.loc;

        match &statement.kind {
            StatementKind::Let { target, value } => self.lower_let(target, value),
            StatementKind::Print { items, newline } => self.lower_print(items, *newline),
            StatementKind::If(if_statement) => {
                self.lower_if(if_statement, loc);
                Ok(())
            }
            StatementKind::While { condition, body } => {
                self.lower_while(condition, body, loc);
                Ok(())
            }
            StatementKind::Do(do_loop) => {
                self.lower_do(do_loop, loc);
                Ok(())
            }
            StatementKind::For(for_loop) => self.lower_for(for_loop, loc),
            StatementKind::Next { .. } => Ok(()),
            StatementKind::Exit { kind } => self.lower_exit(*kind, loc),
            StatementKind::Return { value } => self.lower_return(value.as_ref()),
            StatementKind::End => {
                if self.role != Role::Main {
                    self.call_runtime("rt_end", Vec::new());
                }
                self.emit_epilogue();
                Ok(())
            }
            StatementKind::Call { callee, args } => self.lower_call(callee, args).map(drop),
        }
    }

    fn lower_let(&mut self, target: &Identifier, value: &Expression) -> LowerResult<()> {
        let (address, ty) = self.variable_slot(target)?;
        let typed = self.lower_expression(value)?;
        let value = self.coerce(typed, ty)?;

        self.builder.store(ty, address, value);
        Ok(())
    }

    fn lower_print(&mut self, items: &[Expression], newline: bool) -> LowerResult<()> {
        for item in items {
            let typed = self.lower_expression(item)?;
            match typed.ty {
                TypeKind::Str => self.call_runtime("rt_print_str", vec![typed.value]),
                TypeKind::F64 => self.call_runtime("rt_print_f64", vec![typed.value]),
                _ => {
                    let value = self.coerce(typed, TypeKind::I64)?;
                    self.call_runtime("rt_print_i64", vec![value])
                }
            };
        }

        if newline {
            self.call_runtime("rt_print_newline", Vec::new());
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expression>) -> LowerResult<()> {
        match (self.role, value) {
            (Role::Function(ty), Some(value)) => {
                let typed = self.lower_expression(value)?;
                let value = self.coerce(typed, ty)?;
                self.builder.ret(ty, Some(value));
            }
            _ => self.emit_epilogue(),
        }
        Ok(())
    }

    /// Lowers an IF ladder. Each arm gets a test block and a then block; the
    /// final else block always exists and the exit block is only created
    /// when some branch falls through to it.
    fn lower_if(&mut self, if_statement: &IfStatement, loc: SourceLoc) {
        let arms = iter::once((&if_statement.condition, &if_statement.then_branch))
            .chain(
                if_statement
                    .else_ifs
                    .iter()
                    .map(|else_if| (&else_if.condition, &else_if.body)),
            )
            .collect::<Vec<_>>();

        let mut tests = Vec::with_capacity(arms.len());
        let mut thens = Vec::with_capacity(arms.len());
        let mut first_id = 0;
        for arm in 0..arms.len() {
            let (labels, id) = self.names.if_arm(arm);
            if arm == 0 {
                first_id = id;
            }
            tests.push(self.add_block(labels.test));
            thens.push(self.add_block(labels.then));
        }

        let (else_label, exit_label) = self.names.if_tail(first_id);
        let else_block = self.add_block(else_label);

        self.builder.set_loc(loc);
        self.builder.br(tests[0]);

        let mut falls_through = false;
        for (arm, (condition, body)) in arms.into_iter().enumerate() {
            let if_false = tests.get(arm + 1).copied().unwrap_or(else_block);

            self.builder.position_at_end(tests[arm]);
            self.branch_on(condition, thens[arm], if_false, loc);

            self.builder.position_at_end(thens[arm]);
            falls_through |= self.lower_branch(body, &exit_label, loc);
        }

        self.builder.position_at_end(else_block);
        let else_body = if_statement.else_branch.as_deref().unwrap_or_default();
        falls_through |= self.lower_branch(else_body, &exit_label, loc);

        if falls_through {
            let exit = self.add_block(exit_label);
            self.builder.position_at_end(exit);
        }
    }

    /// Lowers one IF branch and jumps to `exit_label` if control reaches
    /// its end. The exit block may not exist yet.
    fn lower_branch(&mut self, body: &[Statement], exit_label: &str, loc: SourceLoc) -> bool {
        self.lower_statements(body);
        if self.builder.is_terminated() {
            return false;
        }

        self.builder.set_loc(loc);
        self.builder.emit(Instr::br(exit_label, Vec::new()));
        true
    }
}
