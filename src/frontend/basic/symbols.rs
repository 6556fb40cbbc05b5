//! Per-procedure symbol tables. Every variable a procedure touches gets one
//! stack slot, numbered in declaration order: parameters first, then names
//! the frontend declared, then the rest in order of first appearance.

use hashbrown::HashMap;

use super::ast::{
    Body, Identifier, Parameter,
    visit::{Visitor, walk_statements},
};
use crate::{
    frontend::intern::InternedSymbol,
    index::{IndexVec, simple_index},
    middle::il::TypeKind,
};

simple_index! {
    /// Position of a variable in its procedure's slot list
    pub struct SlotId;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub name: InternedSymbol,
    pub ty: TypeKind,
    pub slot: SlotId,
}

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: IndexVec<SlotId, SymbolInfo>,
    by_name: HashMap<InternedSymbol, SlotId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table for a procedure with `params` and `body`.
    pub fn for_procedure(params: &[Parameter], body: &Body) -> Self {
        let mut table = Self::new();

        for param in params {
            table.declare(param.name.symbol, param.ty.to_type_kind());
        }

        for info in body.symbols.iter() {
            table.declare(info.name, info.ty);
        }

        let mut collector = SymbolCollector { table: &mut table };
        walk_statements(&mut collector, &body.statements);
        table
    }

    /// Declares `name` with `ty`. Redeclaring keeps the first type and slot.
    pub fn declare(&mut self, name: InternedSymbol, ty: TypeKind) -> SlotId {
        if let Some(&slot) = self.by_name.get(&name) {
            return slot;
        }

        let slot = self.entries.next_index();
        self.entries.push(SymbolInfo { name, ty, slot });
        self.by_name.insert(name, slot);
        slot
    }

    pub fn lookup(&self, name: InternedSymbol) -> Option<&SymbolInfo> {
        self.by_name.get(&name).map(|&slot| &self.entries[slot])
    }

    /// Entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Type implied by a BASIC name's suffix character.
pub fn suffix_type(name: &str) -> TypeKind {
    match name.chars().last() {
        Some('$') => TypeKind::Str,
        Some('#' | '!') => TypeKind::F64,
        _ => TypeKind::I64,
    }
}

struct SymbolCollector<'t> {
    table: &'t mut SymbolTable,
}

impl<'ast> Visitor<'ast> for SymbolCollector<'_> {
    fn visit_identifier(&mut self, identifier: &'ast Identifier) {
        self.table
            .declare(identifier.symbol, suffix_type(identifier.name()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::basic::ast::{Expression, ScalarType, Statement};

    #[test]
    fn suffixes_select_types() {
        assert_eq!(suffix_type("NAME$"), TypeKind::Str);
        assert_eq!(suffix_type("X#"), TypeKind::F64);
        assert_eq!(suffix_type("Y!"), TypeKind::F64);
        assert_eq!(suffix_type("N%"), TypeKind::I64);
        assert_eq!(suffix_type("COUNT"), TypeKind::I64);
    }

    #[test]
    fn slots_follow_parameters_then_declarations_then_first_use() {
        let mut body = Body::new(vec![
            Statement::assign("b", Expression::variable("a")),
            Statement::assign("total#", Expression::variable("b")),
            Statement::assign("a", Expression::integer(1)),
        ]);
        body.symbols
            .declare(InternedSymbol::identifier("flag"), TypeKind::I1);
        let params = [Parameter {
            name: Identifier::new("n"),
            ty: ScalarType::Integer,
        }];

        let table = SymbolTable::for_procedure(&params, &body);
        let names = table.iter().map(|s| s.name.value()).collect::<Vec<_>>();

        assert_eq!(names, ["N", "FLAG", "B", "A", "TOTAL#"]);
        let flag = table.lookup(InternedSymbol::identifier("FLAG")).unwrap();
        assert_eq!(flag.ty, TypeKind::I1);
        let total = table.lookup(InternedSymbol::identifier("total#")).unwrap();
        assert_eq!(total.ty, TypeKind::F64);
    }

    #[test]
    fn callees_are_not_variables() {
        let body = Body::new(vec![Statement::assign(
            "x",
            Expression::call("abs", vec![Expression::variable("y")]),
        )]);

        let table = SymbolTable::for_procedure(&[], &body);

        assert_eq!(table.len(), 2);
        assert!(table.lookup(InternedSymbol::identifier("ABS")).is_none());
    }
}
