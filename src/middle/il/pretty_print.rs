//! Textual form of the IL. The plain rendering (the `Display` impls) is
//! bit-stable and is what [`super::parse`] reads back; the highlighted one is
//! only for terminals.

use core::fmt::{self, Write};

use colored::{Color, Colorize};
use itertools::Itertools;

use crate::index::Index;

use super::{BasicBlock, Extern, Function, Global, Instr, Module, Opcode, TempId, TypeKind, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlighter {
    enabled: bool,
}

impl Highlighter {
    pub const PLAIN: Self = Self { enabled: false };
    pub const COLORED: Self = Self { enabled: true };

    fn paint(self, text: &str, color: Color) -> String {
        if self.enabled {
            text.color(color).to_string()
        } else {
            text.to_owned()
        }
    }

    fn keyword(self, text: &str) -> String {
        self.paint(text, Color::Magenta)
    }

    fn opcode(self, opcode: Opcode) -> String {
        self.paint(opcode.into(), Color::Cyan)
    }

    fn ty(self, ty: TypeKind) -> String {
        self.paint(ty.into(), Color::Green)
    }

    fn label(self, text: &str) -> String {
        self.paint(text, Color::BrightRed)
    }

    fn symbol(self, text: &str) -> String {
        self.paint(&format!("@{text}"), Color::Blue)
    }

    fn temp(self, id: TempId) -> String {
        self.paint(&id.to_string(), Color::Yellow)
    }

    fn constant(self, text: &str) -> String {
        self.paint(text, Color::Magenta)
    }
}

/// Renders `module`, with ANSI colors when `colored` is set.
pub fn pretty_print_module(module: &Module, colored: bool) -> String {
    let highlighter = if colored {
        Highlighter::COLORED
    } else {
        Highlighter::PLAIN
    };

    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut output, module, highlighter);
    output
}

pub fn write_value(f: &mut impl Write, value: &Value, hl: Highlighter) -> fmt::Result {
    match value {
        Value::ConstInt {
            value,
            ty: TypeKind::I1,
        } => f.write_str(&hl.constant(if *value != 0 { "true" } else { "false" })),
        Value::ConstInt { value, .. } => f.write_str(&hl.constant(&value.to_string())),
        Value::ConstFloat(value) => f.write_str(&hl.constant(&format!("{value:?}"))),
        Value::Temp(id) => f.write_str(&hl.temp(*id)),
        Value::Global(name) => f.write_str(&hl.symbol(name)),
        Value::Label(label) => f.write_str(&hl.label(&format!("^{label}"))),
    }
}

fn write_values(f: &mut impl Write, values: &[Value], hl: Highlighter) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_value(f, value, hl)?;
    }
    Ok(())
}

fn write_target(f: &mut impl Write, instr: &Instr, slot: usize, hl: Highlighter) -> fmt::Result {
    f.write_str(&hl.label(&instr.labels[slot]))?;

    let args = instr.successor_args(slot);
    if !args.is_empty() {
        f.write_char('(')?;
        write_values(f, args, hl)?;
        f.write_char(')')?;
    }
    Ok(())
}

pub fn write_instr(f: &mut impl Write, instr: &Instr, hl: Highlighter) -> fmt::Result {
    if let Some(result) = instr.result {
        write!(f, "{} = ", hl.temp(result))?;
    }
    f.write_str(&hl.opcode(instr.opcode))?;

    match instr.opcode {
        Opcode::Br | Opcode::CBr => {
            if !instr.operands.is_empty() {
                f.write_char(' ')?;
                write_values(f, &instr.operands, hl)?;
                f.write_char(',')?;
            }
            for slot in 0..instr.labels.len() {
                f.write_str(if slot == 0 { " " } else { ", " })?;
                write_target(f, instr, slot, hl)?;
            }
        }
        Opcode::Call => {
            if instr.ty != TypeKind::Void {
                write!(f, " {}", hl.ty(instr.ty))?;
            }
            let callee = instr.callee.as_deref().unwrap_or_default();
            write!(f, " {}(", hl.symbol(callee))?;
            write_values(f, &instr.operands, hl)?;
            f.write_char(')')?;
        }
        _ => {
            if instr.ty != TypeKind::Void {
                write!(f, " {}", hl.ty(instr.ty))?;
            }
            if !instr.operands.is_empty() {
                f.write_char(' ')?;
                write_values(f, &instr.operands, hl)?;
            }
        }
    }

    Ok(())
}

fn write_params<'a>(
    f: &mut impl Write,
    params: impl Iterator<Item = (TempId, TypeKind)> + 'a,
    hl: Highlighter,
) -> fmt::Result {
    let rendered = params
        .map(|(id, ty)| format!("{}: {}", hl.temp(id), hl.ty(ty)))
        .join(", ");
    f.write_str(&rendered)
}

pub fn write_block(f: &mut impl Write, block: &BasicBlock, hl: Highlighter) -> fmt::Result {
    f.write_str(&hl.label(&block.label))?;
    if !block.params.is_empty() {
        f.write_char('(')?;
        write_params(f, block.params.iter().map(|p| (p.id, p.ty)), hl)?;
        f.write_char(')')?;
    }
    f.write_str(":\n")?;

    for instr in &block.instructions {
        f.write_str("  ")?;
        write_instr(f, instr, hl)?;
        f.write_char('\n')?;
    }
    Ok(())
}

pub fn write_function(f: &mut impl Write, function: &Function, hl: Highlighter) -> fmt::Result {
    write!(
        f,
        "{} {}(",
        hl.keyword("func"),
        hl.paint(&function.name, Color::Blue)
    )?;
    write_params(f, function.params.iter().map(|p| (p.id, p.ty)), hl)?;
    writeln!(f, ") -> {} {{", hl.ty(function.return_type))?;

    for block in &function.blocks {
        write_block(f, block, hl)?;
    }
    f.write_str("}\n")
}

pub fn write_extern(f: &mut impl Write, ext: &Extern, hl: Highlighter) -> fmt::Result {
    let params = ext.params.iter().map(|ty| hl.ty(*ty)).join(", ");
    write!(
        f,
        "{} {}({params}) -> {}",
        hl.keyword("extern"),
        hl.symbol(&ext.name),
        hl.ty(ext.ret)
    )
}

pub fn write_global(f: &mut impl Write, global: &Global, hl: Highlighter) -> fmt::Result {
    write!(
        f,
        "{} {} = {}",
        hl.keyword("global const str"),
        hl.symbol(&global.name),
        hl.constant(&format!("\"{}\"", global.value.escape_debug()))
    )
}

pub fn write_module(f: &mut impl Write, module: &Module, hl: Highlighter) -> fmt::Result {
    let mut sections = 0;

    if !module.externs.is_empty() {
        for ext in &module.externs {
            write_extern(f, ext, hl)?;
            f.write_char('\n')?;
        }
        sections += 1;
    }

    if !module.globals.is_empty() {
        if sections > 0 {
            f.write_char('\n')?;
        }
        for global in &module.globals {
            write_global(f, global, hl)?;
            f.write_char('\n')?;
        }
        sections += 1;
    }

    for function in &module.functions {
        if sections > 0 {
            f.write_char('\n')?;
        }
        write_function(f, function, hl)?;
        sections += 1;
    }

    Ok(())
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).into())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).into())
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.index())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, Highlighter::PLAIN)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_instr(f, self, Highlighter::PLAIN)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, self, Highlighter::PLAIN)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, self, Highlighter::PLAIN)
    }
}

impl fmt::Display for Extern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_extern(f, self, Highlighter::PLAIN)
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_global(f, self, Highlighter::PLAIN)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_module(f, self, Highlighter::PLAIN)
    }
}
