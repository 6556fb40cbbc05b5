use super::symbols::SymbolTable;
use crate::{
    frontend::{SourceLoc, intern::InternedSymbol},
    middle::il::TypeKind,
};

pub mod visit;

#[derive(Debug, Default)]
pub struct Program {
    /// `FUNCTION` and `SUB` definitions, in source order
    pub procedures: Vec<Procedure>,
    /// Statements outside any procedure
    pub main: Body,
}

#[derive(Debug, Default)]
pub struct Body {
    pub statements: Vec<Statement>,
    /// Declarations the frontend resolved ahead of lowering (`DIM`, `AS`
    /// clauses). Names missing here are typed from their suffix.
    pub symbols: SymbolTable,
}

impl Body {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            symbols: SymbolTable::default(),
        }
    }
}

#[derive(Debug)]
pub struct Procedure {
    pub loc: SourceLoc,
    pub name: Identifier,
    pub kind: ProcedureKind,
    pub params: Vec<Parameter>,
    pub body: Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Function(ScalarType),
    Sub,
}

impl ProcedureKind {
    pub fn return_type(self) -> TypeKind {
        match self {
            ProcedureKind::Function(ty) => ty.to_type_kind(),
            ProcedureKind::Sub => TypeKind::Void,
        }
    }
}

#[derive(Debug)]
pub struct Parameter {
    pub name: Identifier,
    pub ty: ScalarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Integer,
    Float,
    String,
    Boolean,
}

impl ScalarType {
    pub fn to_type_kind(self) -> TypeKind {
        match self {
            ScalarType::Integer => TypeKind::I64,
            ScalarType::Float => TypeKind::F64,
            ScalarType::String => TypeKind::Str,
            ScalarType::Boolean => TypeKind::I1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Identifier {
    pub loc: SourceLoc,
    pub symbol: InternedSymbol,
}

impl Identifier {
    pub fn new(name: &str) -> Self {
        Self {
            loc: SourceLoc::default(),
            symbol: InternedSymbol::identifier(name),
        }
    }

    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = loc;
        self
    }

    pub fn name(&self) -> &'static str {
        self.symbol.value()
    }
}

#[derive(Debug)]
pub struct Statement {
    pub loc: SourceLoc,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            loc: SourceLoc::default(),
            kind,
        }
    }

    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = loc;
        self
    }

    pub fn assign(target: &str, value: Expression) -> Self {
        Self::new(StatementKind::Let {
            target: Identifier::new(target),
            value,
        })
    }

    pub fn print(items: Vec<Expression>) -> Self {
        Self::new(StatementKind::Print {
            items,
            newline: true,
        })
    }

    pub fn while_loop(condition: Expression, body: Vec<Statement>) -> Self {
        Self::new(StatementKind::While { condition, body })
    }

    pub fn do_loop(condition: Option<DoCondition>, body: Vec<Statement>) -> Self {
        Self::new(StatementKind::Do(Box::new(DoLoop { condition, body })))
    }

    pub fn for_loop(
        variable: &str,
        start: Expression,
        end: Expression,
        step: Option<Expression>,
        body: Vec<Statement>,
    ) -> Self {
        Self::new(StatementKind::For(Box::new(ForLoop {
            variable: Identifier::new(variable),
            start,
            end,
            step,
            body,
        })))
    }

    pub fn exit(kind: Option<LoopKind>) -> Self {
        Self::new(StatementKind::Exit { kind })
    }

    pub fn ret(value: Option<Expression>) -> Self {
        Self::new(StatementKind::Return { value })
    }
}

#[derive(Debug)]
pub enum StatementKind {
    Let {
        target: Identifier,
        value: Expression,
    },
    /// `PRINT a; b`. A trailing separator suppresses the newline.
    Print {
        items: Vec<Expression>,
        newline: bool,
    },
    If(Box<IfStatement>),
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    Do(Box<DoLoop>),
    For(Box<ForLoop>),
    /// Closes a `FOR`; the parser has already attached the body to its loop.
    Next {
        variable: Option<Identifier>,
    },
    /// `EXIT` alone leaves the innermost loop; `EXIT FOR` and friends leave
    /// the innermost loop of that kind.
    Exit {
        kind: Option<LoopKind>,
    },
    Return {
        value: Option<Expression>,
    },
    End,
    Call {
        callee: Identifier,
        args: Vec<Expression>,
    },
}

#[derive(Debug)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Vec<Statement>,
    pub else_ifs: Vec<ElseIf>,
    pub else_branch: Option<Vec<Statement>>,
}

#[derive(Debug)]
pub struct ElseIf {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub struct DoLoop {
    /// `None` for a bare `DO ... LOOP`
    pub condition: Option<DoCondition>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub struct DoCondition {
    pub position: TestPosition,
    pub kind: ConditionKind,
    pub expr: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPosition {
    /// `DO WHILE c ... LOOP`
    Pre,
    /// `DO ... LOOP WHILE c`
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    While,
    Until,
}

#[derive(Debug)]
pub struct ForLoop {
    pub variable: Identifier,
    pub start: Expression,
    pub end: Expression,
    pub step: Option<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    Do,
    For,
}

#[derive(Debug)]
pub struct Expression {
    pub loc: SourceLoc,
    pub kind: ExpressionKind,
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            loc: SourceLoc::default(),
            kind,
        }
    }

    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.loc = loc;
        self
    }

    pub fn integer(value: i64) -> Self {
        Self::new(ExpressionKind::IntegerLiteral(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(ExpressionKind::FloatLiteral(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(ExpressionKind::StringLiteral(value.to_owned()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExpressionKind::BooleanLiteral(value))
    }

    pub fn variable(name: &str) -> Self {
        Self::new(ExpressionKind::Variable(Identifier::new(name)))
    }

    pub fn unary(operator: UnaryOperator, operand: Expression) -> Self {
        Self::new(ExpressionKind::Unary {
            operator,
            operand: Box::new(operand),
        })
    }

    pub fn binary(lhs: Expression, operator: BinaryOperator, rhs: Expression) -> Self {
        Self::new(ExpressionKind::Binary {
            lhs: Box::new(lhs),
            operator,
            rhs: Box::new(rhs),
        })
    }

    pub fn call(callee: &str, args: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Call {
            callee: Identifier::new(callee),
            args,
        })
    }
}

#[derive(Debug)]
pub enum ExpressionKind {
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    Variable(Identifier),
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Binary {
        lhs: Box<Expression>,
        operator: BinaryOperator,
        rhs: Box<Expression>,
    },
    /// A user `FUNCTION` or one of the numeric builtins (`ABS`, `SQR`)
    Call {
        callee: Identifier,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    /// `/`, always floating point
    Div,
    /// `\`
    IntDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}
