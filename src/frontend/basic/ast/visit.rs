//! Trait definition for an AST visitor which walks the tree in DFS order

use super::{
    Body, DoLoop, Expression, ExpressionKind, ForLoop, Identifier, IfStatement, Procedure,
    Program, Statement, StatementKind,
};

pub trait Visitor<'ast>: Sized {
    fn visit_procedure(&mut self, procedure: &'ast Procedure) {
        walk_procedure(self, procedure)
    }

    fn visit_body(&mut self, body: &'ast Body) {
        walk_body(self, body)
    }

    fn visit_statement(&mut self, statement: &'ast Statement) {
        walk_statement(self, statement)
    }

    fn visit_if(&mut self, if_statement: &'ast IfStatement) {
        walk_if(self, if_statement)
    }

    fn visit_do_loop(&mut self, do_loop: &'ast DoLoop) {
        walk_do_loop(self, do_loop)
    }

    fn visit_for_loop(&mut self, for_loop: &'ast ForLoop) {
        walk_for_loop(self, for_loop)
    }

    fn visit_expression(&mut self, expression: &'ast Expression) {
        walk_expression(self, expression)
    }

    fn visit_identifier(&mut self, _identifier: &'ast Identifier) {}

    /// Identifier in a callee position, which never names a variable
    fn visit_callee(&mut self, _callee: &'ast Identifier) {}
}

pub fn walk_program<'a>(visitor: &mut impl Visitor<'a>, program: &'a Program) {
    for procedure in &program.procedures {
        visitor.visit_procedure(procedure);
    }

    visitor.visit_body(&program.main);
}

pub fn walk_procedure<'a>(visitor: &mut impl Visitor<'a>, procedure: &'a Procedure) {
    visitor.visit_callee(&procedure.name);

    for param in &procedure.params {
        visitor.visit_identifier(&param.name);
    }

    visitor.visit_body(&procedure.body);
}

pub fn walk_body<'a>(visitor: &mut impl Visitor<'a>, body: &'a Body) {
    walk_statements(visitor, &body.statements);
}

pub fn walk_statements<'a>(visitor: &mut impl Visitor<'a>, statements: &'a [Statement]) {
    for statement in statements {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement<'a>(visitor: &mut impl Visitor<'a>, statement: &'a Statement) {
    match &statement.kind {
        StatementKind::Let { target, value } => {
            visitor.visit_identifier(target);
            visitor.visit_expression(value);
        }
        StatementKind::Print { items, .. } => {
            for item in items {
                visitor.visit_expression(item);
            }
        }
        StatementKind::If(if_statement) => visitor.visit_if(if_statement),
        StatementKind::While { condition, body } => {
            visitor.visit_expression(condition);
            walk_statements(visitor, body);
        }
        StatementKind::Do(do_loop) => visitor.visit_do_loop(do_loop),
        StatementKind::For(for_loop) => visitor.visit_for_loop(for_loop),
        StatementKind::Next { variable } => {
            if let Some(variable) = variable {
                visitor.visit_identifier(variable);
            }
        }
        StatementKind::Return { value } => {
            if let Some(value) = value {
                visitor.visit_expression(value);
            }
        }
        StatementKind::Call { callee, args } => {
            visitor.visit_callee(callee);
            for arg in args {
                visitor.visit_expression(arg);
            }
        }
        StatementKind::Exit { .. } | StatementKind::End => {}
    }
}

pub fn walk_if<'a>(visitor: &mut impl Visitor<'a>, if_statement: &'a IfStatement) {
    visitor.visit_expression(&if_statement.condition);
    walk_statements(visitor, &if_statement.then_branch);

    for else_if in &if_statement.else_ifs {
        visitor.visit_expression(&else_if.condition);
        walk_statements(visitor, &else_if.body);
    }

    if let Some(else_branch) = &if_statement.else_branch {
        walk_statements(visitor, else_branch);
    }
}

pub fn walk_do_loop<'a>(visitor: &mut impl Visitor<'a>, do_loop: &'a DoLoop) {
    if let Some(condition) = &do_loop.condition {
        visitor.visit_expression(&condition.expr);
    }

    walk_statements(visitor, &do_loop.body);
}

pub fn walk_for_loop<'a>(visitor: &mut impl Visitor<'a>, for_loop: &'a ForLoop) {
    visitor.visit_identifier(&for_loop.variable);
    visitor.visit_expression(&for_loop.start);
    visitor.visit_expression(&for_loop.end);

    if let Some(step) = &for_loop.step {
        visitor.visit_expression(step);
    }

    walk_statements(visitor, &for_loop.body);
}

pub fn walk_expression<'a>(visitor: &mut impl Visitor<'a>, expression: &'a Expression) {
    match &expression.kind {
        ExpressionKind::IntegerLiteral(_)
        | ExpressionKind::FloatLiteral(_)
        | ExpressionKind::StringLiteral(_)
        | ExpressionKind::BooleanLiteral(_) => {}
        ExpressionKind::Variable(identifier) => visitor.visit_identifier(identifier),
        ExpressionKind::Unary { operand, .. } => visitor.visit_expression(operand),
        ExpressionKind::Binary { lhs, rhs, .. } => {
            visitor.visit_expression(lhs);
            visitor.visit_expression(rhs);
        }
        ExpressionKind::Call { callee, args } => {
            visitor.visit_callee(callee);
            for arg in args {
                visitor.visit_expression(arg);
            }
        }
    }
}
