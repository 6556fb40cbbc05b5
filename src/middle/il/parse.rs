//! Reads the textual IL produced by [`super::pretty_print`] back into a
//! [`Module`]. The grammar is line based: one declaration, block header or
//! instruction per line. Lines starting with `//` are comments.

use std::str::FromStr;

use thiserror::Error;

use crate::index::Index;

use super::{
    BlockId, Extern, Function, Global, Instr, Module, Opcode, Param, TempId, TypeKind, Value,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

type ParseResult<T> = Result<T, String>;

pub fn parse_module(text: &str) -> Result<Module, ParseError> {
    let mut parser = Parser::default();

    for (index, raw) in text.lines().enumerate() {
        parser
            .parse_line(raw.trim())
            .map_err(|message| ParseError {
                line: index + 1,
                message,
            })?;
    }

    parser.finish().map_err(|message| ParseError {
        line: text.lines().count(),
        message,
    })
}

#[derive(Default)]
struct Parser {
    module: Module,
    function: Option<Function>,
    block: Option<BlockId>,
}

impl Parser {
    fn parse_line(&mut self, line: &str) -> ParseResult<()> {
        if line.is_empty() || line.starts_with("//") {
            return Ok(());
        }

        if self.function.is_some() {
            return self.parse_function_line(line);
        }

        if let Some(rest) = line.strip_prefix("extern ") {
            let ext = parse_extern(rest)?;
            self.module.externs.push(ext);
        } else if let Some(rest) = line.strip_prefix("global ") {
            let global = parse_global(rest)?;
            self.module.globals.push(global);
        } else if let Some(rest) = line.strip_prefix("func ") {
            self.function = Some(parse_function_header(rest)?);
            self.block = None;
        } else {
            return Err(format!("expected a declaration, found `{line}`"));
        }

        Ok(())
    }

    fn parse_function_line(&mut self, line: &str) -> ParseResult<()> {
        let Some(function) = self.function.as_mut() else {
            return Err("instruction outside of a function".to_owned());
        };

        if line == "}" {
            if let Some(function) = self.function.take() {
                self.module.functions.push(function);
            }
            return Ok(());
        }

        if let Some(header) = line.strip_suffix(':') {
            let block = parse_block_header(function, header)?;
            self.block = Some(block);
            return Ok(());
        }

        let Some(block) = self.block else {
            return Err(format!("instruction `{line}` precedes the first block label"));
        };

        let instr = parse_instruction(function, line)?;
        function.blocks[block].push(instr);
        Ok(())
    }

    fn finish(self) -> ParseResult<Module> {
        match self.function {
            Some(function) => Err(format!(
                "function `{}` is missing its closing brace",
                function.name
            )),
            None => Ok(self.module),
        }
    }
}

fn parse_extern(text: &str) -> ParseResult<Extern> {
    let (signature, ret) = text
        .rsplit_once(" -> ")
        .ok_or_else(|| format!("extern `{text}` lacks a return type"))?;
    let (name, params) = split_call(signature)?;

    Ok(Extern {
        name: parse_symbol(name)?.to_owned(),
        params: split_top_level(params)
            .into_iter()
            .map(parse_type)
            .collect::<ParseResult<_>>()?,
        ret: parse_type(ret)?,
    })
}

fn parse_global(text: &str) -> ParseResult<Global> {
    let rest = text
        .strip_prefix("const str ")
        .ok_or_else(|| format!("unsupported global `{text}`"))?;
    let (name, literal) = rest
        .split_once(" = ")
        .ok_or_else(|| format!("global `{rest}` lacks an initialiser"))?;

    Ok(Global {
        name: parse_symbol(name)?.to_owned(),
        value: parse_string_literal(literal.trim())?,
    })
}

fn parse_function_header(text: &str) -> ParseResult<Function> {
    let header = text
        .strip_suffix('{')
        .ok_or_else(|| "function header must end with `{`".to_owned())?
        .trim_end();
    let (signature, ret) = header
        .rsplit_once(" -> ")
        .ok_or_else(|| format!("function `{header}` lacks a return type"))?;
    let (name, params) = split_call(signature)?;

    let mut function = Function::new(name, parse_type(ret)?);
    for (id, ty) in parse_params(params)? {
        function.register_temp(id, ty, None);
        function.params.push(Param {
            id,
            ty,
            name: format!("arg{}", function.params.len()),
        });
    }

    Ok(function)
}

fn parse_block_header(function: &mut Function, header: &str) -> ParseResult<BlockId> {
    let (label, params) = match header.find('(') {
        Some(_) => {
            let (label, params) = split_call(header)?;
            (label, parse_params(params)?)
        }
        None => (header, Vec::new()),
    };

    if label.is_empty() || label.contains(char::is_whitespace) {
        return Err(format!("invalid block label `{label}`"));
    }

    let block = function.add_block(label);
    for (id, ty) in params {
        let name = format!("t{}", id.index());
        function.register_temp(id, ty, None);
        function.blocks[block].params.push(Param { id, ty, name });
    }

    Ok(block)
}

fn parse_instruction(function: &mut Function, line: &str) -> ParseResult<Instr> {
    let (result, body) = match line.split_once(" = ") {
        Some((lhs, rhs)) if lhs.starts_with('%') => (Some(parse_temp(lhs)?), rhs),
        _ => (None, line),
    };

    let (word, rest) = body.split_once(' ').unwrap_or((body, ""));
    let opcode = Opcode::from_str(word).map_err(|_| format!("unknown opcode `{word}`"))?;
    let rest = rest.trim();

    let mut instr = Instr::new(opcode, TypeKind::Void);
    instr.result = result;

    match opcode {
        Opcode::Br => {
            let (label, args) = parse_target(rest)?;
            instr.labels.push(label);
            instr.br_args.push(args);
        }
        Opcode::CBr => {
            let parts = split_top_level(rest);
            let [condition, if_true, if_false] = parts.as_slice() else {
                return Err(format!("cbr expects a condition and two targets, found `{rest}`"));
            };
            instr.operands.push(parse_value(condition)?);
            for target in [if_true, if_false] {
                let (label, args) = parse_target(target)?;
                instr.labels.push(label);
                instr.br_args.push(args);
            }
        }
        Opcode::Call => {
            let callee = match rest.split_once(' ') {
                Some((ty, callee)) if !rest.starts_with('@') => {
                    instr.ty = parse_type(ty)?;
                    callee
                }
                _ => rest,
            };
            let (name, args) = split_call(callee)?;
            instr.callee = Some(parse_symbol(name)?.to_owned());
            instr.operands = parse_values(args)?;
        }
        _ => {
            let (first, remainder) = rest.split_once(' ').unwrap_or((rest, ""));
            let operands = match TypeKind::from_str(first) {
                Ok(ty) => {
                    instr.ty = ty;
                    remainder
                }
                Err(_) => rest,
            };
            instr.operands = parse_values(operands)?;
        }
    }

    if let Some(result) = result {
        function.register_temp(result, instr.ty, None);
    }

    Ok(instr)
}

/// Splits `name(inner)` into `name` and `inner`.
fn split_call(text: &str) -> ParseResult<(&str, &str)> {
    let open = text
        .find('(')
        .ok_or_else(|| format!("expected `(` in `{text}`"))?;
    let inner = text[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| format!("expected `)` at the end of `{text}`"))?;

    Ok((text[..open].trim(), inner))
}

fn parse_target(text: &str) -> ParseResult<(String, Vec<Value>)> {
    let text = text.trim();
    if text.contains('(') {
        let (label, args) = split_call(text)?;
        Ok((label.to_owned(), parse_values(args)?))
    } else if text.is_empty() {
        Err("missing branch target".to_owned())
    } else {
        Ok((text.to_owned(), Vec::new()))
    }
}

fn parse_params(text: &str) -> ParseResult<Vec<(TempId, TypeKind)>> {
    split_top_level(text)
        .into_iter()
        .map(|param| {
            let (id, ty) = param
                .split_once(':')
                .ok_or_else(|| format!("parameter `{param}` lacks a type"))?;
            Ok((parse_temp(id.trim())?, parse_type(ty)?))
        })
        .collect()
}

/// Splits on commas outside parentheses and string literals.
fn split_top_level(text: &str) -> Vec<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

fn parse_values(text: &str) -> ParseResult<Vec<Value>> {
    split_top_level(text).into_iter().map(parse_value).collect()
}

fn parse_type(text: &str) -> ParseResult<TypeKind> {
    let text = text.trim();
    TypeKind::from_str(text).map_err(|_| format!("unknown type `{text}`"))
}

fn parse_temp(text: &str) -> ParseResult<TempId> {
    text.strip_prefix('%')
        .and_then(|digits| digits.parse::<usize>().ok())
        .map(TempId::new)
        .ok_or_else(|| format!("invalid temporary `{text}`"))
}

fn parse_symbol(text: &str) -> ParseResult<&str> {
    text.trim()
        .strip_prefix('@')
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format!("invalid symbol `{text}`"))
}

fn parse_value(text: &str) -> ParseResult<Value> {
    let text = text.trim();

    match text {
        "true" => return Ok(Value::bool(true)),
        "false" => return Ok(Value::bool(false)),
        _ => {}
    }

    if text.starts_with('%') {
        return parse_temp(text).map(Value::Temp);
    }
    if text.starts_with('@') {
        return parse_symbol(text).map(Value::global);
    }
    if let Some(label) = text.strip_prefix('^') {
        return Ok(Value::Label(label.to_owned()));
    }

    let is_float = text.contains(['.', 'e', 'E']) || text.ends_with("inf") || text == "NaN";
    if is_float {
        text.parse::<f64>()
            .map(Value::ConstFloat)
            .map_err(|_| format!("invalid float constant `{text}`"))
    } else {
        text.parse::<i64>()
            .map(Value::int)
            .map_err(|_| format!("invalid operand `{text}`"))
    }
}

fn parse_string_literal(text: &str) -> ParseResult<String> {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| format!("expected a quoted string, found `{text}`"))?;

    let mut value = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }

        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some(c @ ('\\' | '"' | '\'')) => c,
            Some('u') => {
                let code: String = chars.by_ref().take_while(|c| *c != '}').collect();
                code.strip_prefix('{')
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid unicode escape in {text}"))?
            }
            other => return Err(format!("invalid escape `\\{}`", other.unwrap_or(' '))),
        };
        value.push(escaped);
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const LOOP: &str = indoc! {r#"
        extern @rt_print_i64(i64) -> void

        global const str @.str0 = "tab\there \"q\" \u{1b}"

        func main() -> i64 {
        entry:
          br loop_head_0(0)
        loop_head_0(%0: i64):
          %1 = scmp_lt i1 %0, 10
          cbr %1, loop_body_0, done_0
        loop_body_0:
          %2 = iadd.ovf i64 %0, 1
          call @rt_print_i64(%2)
          br loop_head_0(%2)
        done_0:
          %3 = sitofp f64 %0
          %4 = fadd f64 %3, 0.5
          ret i64 0
        }

        func helper(%0: i64, %1: f64) -> void {
        entry:
          %2 = call f64 @rt_abs_f64(%1)
          ret
        }
    "#};

    #[test]
    fn printed_text_round_trips() {
        let module = parse_module(LOOP).unwrap();
        assert_eq!(module.to_string(), LOOP);
    }

    #[test]
    fn parses_structure() {
        let module = parse_module(LOOP).unwrap();
        let main = module.function("main").unwrap();

        assert_eq!(module.globals[0].value, "tab\there \"q\" \u{1b}");
        assert_eq!(main.blocks.len(), 4);
        assert!(main.blocks.iter().all(|b| b.is_well_formed()));

        let head = main.block_by_label("loop_head_0").unwrap();
        assert_eq!(head.params.len(), 1);
        assert_eq!(main.temp_type(TempId::new(1)), Some(TypeKind::I1));
        assert_eq!(main.temp_type(TempId::new(4)), Some(TypeKind::F64));

        let helper = module.function("helper").unwrap();
        assert_eq!(helper.params.len(), 2);
        assert_eq!(helper.return_type, TypeKind::Void);
        let call = &helper.blocks[BlockId::ENTRY].instructions[0];
        assert_eq!(call.callee.as_deref(), Some("rt_abs_f64"));
    }

    #[test]
    fn reports_line_numbers() {
        let error = parse_module("func f() -> i64 {\nentry:\n  frobnicate i64 1\n}\n").unwrap_err();
        assert_eq!(error.line, 3);
        assert!(error.message.contains("frobnicate"));

        let error = parse_module("func f() -> i64 {\nentry:\n  ret i64 0\n").unwrap_err();
        assert!(error.message.contains("closing brace"));

        let error = parse_module("func f() -> i64 {\n  ret i64 0\n}\n").unwrap_err();
        assert_eq!(error.line, 2);
    }

    #[test]
    fn operand_forms() {
        assert_eq!(parse_value("-12").unwrap(), Value::int(-12));
        assert_eq!(parse_value("1e20").unwrap(), Value::float(1e20));
        assert_eq!(parse_value("-inf").unwrap(), Value::float(f64::NEG_INFINITY));
        assert_eq!(parse_value("^done_3").unwrap(), Value::Label("done_3".into()));
        assert_eq!(parse_value("@.str1").unwrap(), Value::global(".str1"));
        assert!(parse_value("%x").is_err());
    }
}
