//! Structural and type checks over a [`Module`]. The first problem found is
//! reported; nothing is mutated.

use hashbrown::{HashMap, HashSet};
use thiserror::Error;

use crate::frontend::SourceLoc;

use super::{
    BlockId, Function, Instr, Module, Opcode, OperandClass, ResultArity, TempId, TypeKind, Value,
    cfg::FunctionCfg, dominators::DominatorTree,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", self.location())]
pub struct VerifyError {
    pub function: String,
    pub block: Option<String>,
    /// Index of the offending instruction within `block`
    pub instruction: Option<usize>,
    /// The offending instruction in textual form
    pub snippet: String,
    pub message: String,
    pub loc: SourceLoc,
}

impl VerifyError {
    fn location(&self) -> String {
        let mut location = self.function.clone();
        if let Some(block) = &self.block {
            location.push(':');
            location.push_str(block);
        }
        if !self.snippet.is_empty() {
            location.push_str(": ");
            location.push_str(&self.snippet);
        }
        if self.loc.is_known() {
            location.push_str(&format!(" (at {})", self.loc));
        }
        location
    }

    /// The diagnostic followed by the IR of the affected block, or of the
    /// whole function when no block is implicated.
    pub fn render(&self, module: &Module) -> String {
        let mut rendered = format!("error: {self}\n");
        let Some(function) = module.function(&self.function) else {
            return rendered;
        };

        match self.block.as_deref().and_then(|l| function.block_by_label(l)) {
            Some(block) => {
                rendered.push_str(&format!("in function {}:\n", function.name));
                rendered.push_str(&block.to_string());
            }
            None => rendered.push_str(&function.to_string()),
        }
        rendered
    }
}

pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    let mut names = HashSet::new();
    for name in module
        .externs
        .iter()
        .map(|e| &e.name)
        .chain(module.functions.iter().map(|f| &f.name))
    {
        if !names.insert(name.as_str()) {
            return Err(module_error(name, "duplicate symbol"));
        }
    }

    let mut globals = HashSet::new();
    for global in &module.globals {
        if !globals.insert(global.name.as_str()) {
            return Err(module_error(&global.name, "duplicate global"));
        }
    }

    for function in &module.functions {
        verify_function(module, function)?;
    }
    Ok(())
}

fn module_error(name: &str, message: &str) -> VerifyError {
    VerifyError {
        function: name.to_owned(),
        block: None,
        instruction: None,
        snippet: String::new(),
        message: message.to_owned(),
        loc: SourceLoc::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Definition {
    FunctionParam,
    BlockParam(BlockId),
    Instruction(BlockId, usize),
}

struct FunctionVerifier<'m> {
    module: &'m Module,
    function: &'m Function,
    types: HashMap<TempId, TypeKind>,
    definitions: HashMap<TempId, Definition>,
}

pub fn verify_function(module: &Module, function: &Function) -> Result<(), VerifyError> {
    let mut verifier = FunctionVerifier {
        module,
        function,
        types: HashMap::new(),
        definitions: HashMap::new(),
    };
    verifier.run()
}

impl<'m> FunctionVerifier<'m> {
    fn error(
        &self,
        block: Option<BlockId>,
        instruction: Option<usize>,
        message: String,
    ) -> VerifyError {
        let instr = block
            .zip(instruction)
            .and_then(|(b, i)| self.function.blocks[b].instructions.get(i));

        VerifyError {
            function: self.function.name.clone(),
            block: block.map(|b| self.function.blocks[b].label.clone()),
            instruction,
            snippet: instr.map(Instr::to_string).unwrap_or_default(),
            message,
            loc: instr.map(|i| i.loc).unwrap_or_default(),
        }
    }

    fn run(&mut self) -> Result<(), VerifyError> {
        if self.function.blocks.is_empty() {
            return Err(self.error(None, None, "function has no blocks".to_owned()));
        }

        let mut labels = HashSet::new();
        for (id, block) in self.function.blocks.enumerate() {
            if !labels.insert(block.label.as_str()) {
                return Err(self.error(Some(id), None, "duplicate block label".to_owned()));
            }
        }

        if !self.function.blocks[BlockId::ENTRY].params.is_empty() {
            return Err(self.error(
                Some(BlockId::ENTRY),
                None,
                "entry block cannot take parameters".to_owned(),
            ));
        }

        self.collect_definitions()?;

        for id in self.function.blocks.indices() {
            self.check_block_shape(id)?;
            for index in 0..self.function.blocks[id].instructions.len() {
                self.check_instruction(id, index)?;
            }
        }

        self.check_dominance()
    }

    fn define(
        &mut self,
        id: TempId,
        ty: TypeKind,
        at: Definition,
        block: Option<BlockId>,
        index: Option<usize>,
    ) -> Result<(), VerifyError> {
        if self.definitions.insert(id, at).is_some() {
            return Err(self.error(block, index, format!("{id} is defined more than once")));
        }
        self.types.insert(id, ty);
        Ok(())
    }

    fn collect_definitions(&mut self) -> Result<(), VerifyError> {
        let function = self.function;

        for param in &function.params {
            self.define(param.id, param.ty, Definition::FunctionParam, None, None)?;
        }

        for (id, block) in function.blocks.enumerate() {
            for param in &block.params {
                self.define(param.id, param.ty, Definition::BlockParam(id), Some(id), None)?;
            }
            for (index, instr) in block.instructions.iter().enumerate() {
                if let Some(result) = instr.result {
                    self.define(
                        result,
                        instr.ty,
                        Definition::Instruction(id, index),
                        Some(id),
                        Some(index),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn check_block_shape(&self, id: BlockId) -> Result<(), VerifyError> {
        let block = &self.function.blocks[id];
        let Some(last) = block.instructions.len().checked_sub(1) else {
            return Err(self.error(Some(id), None, "empty block".to_owned()));
        };

        for (index, instr) in block.instructions.iter().enumerate() {
            if instr.is_terminator() && index != last {
                return Err(self.error(
                    Some(id),
                    Some(index),
                    "terminator in the middle of a block".to_owned(),
                ));
            }
        }

        if !block.instructions[last].is_terminator() {
            return Err(self.error(Some(id), Some(last), "missing terminator".to_owned()));
        }
        if !block.terminated {
            return Err(self.error(
                Some(id),
                Some(last),
                "block ends in a terminator but is not flagged terminated".to_owned(),
            ));
        }
        Ok(())
    }

    fn value_type(&self, value: &Value) -> Option<TypeKind> {
        match value {
            Value::Temp(id) => self.types.get(id).copied(),
            other => self.function.value_type(other),
        }
    }

    /// Whether `value` can stand where a `expected` value is required.
    /// Integer constants are untyped at the text level and fit any integer
    /// kind.
    fn fits(&self, value: &Value, expected: TypeKind) -> bool {
        match value {
            Value::ConstInt { .. } => expected.is_integer(),
            Value::ConstFloat(_) => expected == TypeKind::F64,
            Value::Global(_) => matches!(expected, TypeKind::Ptr | TypeKind::Str),
            Value::Label(_) => false,
            Value::Temp(_) => self.value_type(value) == Some(expected),
        }
    }

    fn check_instruction(&self, block: BlockId, index: usize) -> Result<(), VerifyError> {
        let instr = &self.function.blocks[block].instructions[index];
        let info = instr.opcode.info();
        let fail = |message: String| Err(self.error(Some(block), Some(index), message));

        for value in instr.operands.iter().chain(instr.br_args.iter().flatten()) {
            if let Value::Temp(id) = value {
                if !self.types.contains_key(id) {
                    return fail(format!("use of undefined temp {id}"));
                }
            }
        }

        if !info.operands.accepts(instr.operands.len()) {
            return fail(format!(
                "{} does not take {} operand(s)",
                instr.opcode,
                instr.operands.len()
            ));
        }

        match (info.result, instr.result) {
            (ResultArity::One, None) => {
                return fail(format!("{} must produce a result", instr.opcode));
            }
            (ResultArity::None, Some(_)) => {
                return fail(format!("{} cannot produce a result", instr.opcode));
            }
            _ => {}
        }

        match info.operand_class {
            OperandClass::Integer => self.check_integer(instr).map_or(Ok(()), fail)?,
            OperandClass::Float => self.check_float(instr).map_or(Ok(()), fail)?,
            OperandClass::Special => self.check_special(instr).map_or(Ok(()), fail)?,
        }

        if info.terminator {
            self.check_edges(block, index)?;
        }
        Ok(())
    }

    fn check_integer(&self, instr: &Instr) -> Option<String> {
        let operand_ty = match instr.opcode {
            Opcode::Sitofp | Opcode::Trunc1 => TypeKind::I64,
            Opcode::Zext1 => TypeKind::I1,
            _ => instr
                .operands
                .iter()
                .find_map(|v| matches!(v, Value::Temp(_)).then(|| self.value_type(v)).flatten())
                .unwrap_or(if instr.opcode.is_comparison() {
                    TypeKind::I64
                } else {
                    instr.ty
                }),
        };

        if !operand_ty.is_integer() {
            return Some(format!("{} expects integer operands", instr.opcode));
        }
        if let Some(bad) = instr.operands.iter().find(|v| !self.fits(v, operand_ty)) {
            return Some(format!("operand {bad} is not of type {operand_ty}"));
        }

        let result_ty = match instr.opcode {
            Opcode::Sitofp => TypeKind::F64,
            Opcode::Zext1 => TypeKind::I64,
            Opcode::Trunc1 => TypeKind::I1,
            op if op.is_comparison() => TypeKind::I1,
            _ => operand_ty,
        };
        (instr.ty != result_ty).then(|| format!("{} must produce {result_ty}", instr.opcode))
    }

    fn check_float(&self, instr: &Instr) -> Option<String> {
        if let Some(bad) = instr.operands.iter().find(|v| !self.fits(v, TypeKind::F64)) {
            return Some(format!("operand {bad} is not of type f64"));
        }

        let result_ty = match instr.opcode {
            Opcode::Fptosi => TypeKind::I64,
            op if op.is_comparison() => TypeKind::I1,
            _ => TypeKind::F64,
        };
        (instr.ty != result_ty).then(|| format!("{} must produce {result_ty}", instr.opcode))
    }

    fn check_special(&self, instr: &Instr) -> Option<String> {
        let operands = &instr.operands;

        match instr.opcode {
            Opcode::Alloca => {
                if instr.ty != TypeKind::Ptr {
                    return Some("alloca must produce ptr".to_owned());
                }
                (!self.fits(&operands[0], TypeKind::I64))
                    .then(|| "alloca size must be an integer".to_owned())
            }
            Opcode::Load => {
                if instr.ty.is_void_like() {
                    return Some(format!("cannot load a value of type {}", instr.ty));
                }
                (!self.fits(&operands[0], TypeKind::Ptr))
                    .then(|| "load address must be a ptr".to_owned())
            }
            Opcode::Store => {
                if instr.ty.is_void_like() {
                    return Some(format!("cannot store a value of type {}", instr.ty));
                }
                if !self.fits(&operands[0], TypeKind::Ptr) {
                    return Some("store address must be a ptr".to_owned());
                }
                (!self.fits(&operands[1], instr.ty))
                    .then(|| format!("stored value {} is not of type {}", operands[1], instr.ty))
            }
            Opcode::Gep => {
                if instr.ty != TypeKind::Ptr || !self.fits(&operands[0], TypeKind::Ptr) {
                    return Some("gep takes and produces a ptr".to_owned());
                }
                (!self.fits(&operands[1], TypeKind::I64))
                    .then(|| "gep offset must be an integer".to_owned())
            }
            Opcode::ConstStr => {
                if instr.ty != TypeKind::Str {
                    return Some("const_str must produce str".to_owned());
                }
                match &operands[0] {
                    Value::Global(name) if self.module.globals.iter().any(|g| &g.name == name) => {
                        None
                    }
                    other => Some(format!("{other} is not a string global")),
                }
            }
            Opcode::Call => self.check_call(instr),
            Opcode::Ret => {
                let expected = self.function.return_type;
                match operands.first() {
                    None if expected == TypeKind::Void => None,
                    None => Some(format!("missing return value of type {expected}")),
                    Some(_) if expected == TypeKind::Void => {
                        Some("void function returns a value".to_owned())
                    }
                    Some(value) => (!self.fits(value, expected) || instr.ty != expected)
                        .then(|| format!("return value must be of type {expected}")),
                }
            }
            Opcode::CBr => (!self.fits(&operands[0], TypeKind::I1))
                .then(|| "branch condition must be i1".to_owned()),
            _ => None,
        }
    }

    fn check_call(&self, instr: &Instr) -> Option<String> {
        let Some(callee) = instr.callee.as_deref() else {
            return Some("call without a callee".to_owned());
        };

        let (params, ret): (Vec<TypeKind>, TypeKind) = if let Some(ext) =
            self.module.find_extern(callee)
        {
            (ext.params.clone(), ext.ret)
        } else if let Some(function) = self.module.function(callee) {
            (function.params.iter().map(|p| p.ty).collect(), function.return_type)
        } else {
            return Some(format!("unknown callee @{callee}"));
        };

        if params.len() != instr.operands.len() {
            return Some(format!(
                "@{callee} expects {} argument(s), got {}",
                params.len(),
                instr.operands.len()
            ));
        }
        if let Some((arg, ty)) = instr
            .operands
            .iter()
            .zip(&params)
            .find(|(arg, ty)| !self.fits(arg, **ty))
        {
            return Some(format!("argument {arg} is not of type {ty}"));
        }
        if instr.ty != ret {
            return Some(format!("@{callee} returns {ret}, not {}", instr.ty));
        }
        if ret.is_void_like() && instr.result.is_some() {
            return Some(format!("@{callee} returns no value"));
        }
        None
    }

    fn check_edges(&self, block: BlockId, index: usize) -> Result<(), VerifyError> {
        let instr = &self.function.blocks[block].instructions[index];
        let fail = |message: String| Err(self.error(Some(block), Some(index), message));

        if instr.labels.len() != instr.opcode.info().successors {
            return fail(format!(
                "{} needs {} successor(s)",
                instr.opcode,
                instr.opcode.info().successors
            ));
        }
        if instr.br_args.len() > instr.labels.len() {
            return fail("more branch argument lists than successors".to_owned());
        }

        for (slot, label) in instr.labels.iter().enumerate() {
            let Some(target) = self.function.block_by_label(label) else {
                return fail(format!("unknown branch target `{label}`"));
            };
            let args = instr.successor_args(slot);
            if args.len() != target.params.len() {
                return fail(format!(
                    "`{label}` takes {} argument(s), got {}",
                    target.params.len(),
                    args.len()
                ));
            }
            for (arg, param) in args.iter().zip(&target.params) {
                if !self.fits(arg, param.ty) {
                    return fail(format!(
                        "argument {arg} for `{label}` is not of type {}",
                        param.ty
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_dominance(&self) -> Result<(), VerifyError> {
        let cfg = FunctionCfg::new(self.function);
        let tree = DominatorTree::compute(&cfg);

        for (block_id, block) in self.function.blocks.enumerate() {
            if !tree.is_reachable(block_id) {
                continue;
            }

            for (index, instr) in block.instructions.iter().enumerate() {
                let used = instr.operands.iter().chain(instr.br_args.iter().flatten());
                for id in used.filter_map(Value::as_temp) {
                    let dominated = match self.definitions.get(&id) {
                        Some(Definition::FunctionParam) => true,
                        Some(Definition::BlockParam(def)) => tree.dominates(*def, block_id),
                        Some(Definition::Instruction(def, def_index)) if *def == block_id => {
                            *def_index < index
                        }
                        Some(Definition::Instruction(def, _)) => tree.dominates(*def, block_id),
                        None => false,
                    };

                    if !dominated {
                        return Err(self.error(
                            Some(block_id),
                            Some(index),
                            format!("{id} is not dominated by its definition"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
