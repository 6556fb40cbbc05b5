//! Promotes stack slots to SSA values carried by block parameters, using the
//! seal-and-rename construction of Braun et al. Blocks are visited from the
//! entry in worklist order; a block is sealed once every predecessor has been
//! visited, and reads in unsealed blocks get placeholder parameters that are
//! wired up at sealing time.

use std::collections::VecDeque;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::{
    index::{Index, IndexVec, simple_index},
    middle::il::{
        BlockId, Function, Module, Opcode, Param, TempId, TypeKind, Value, cfg::FunctionCfg,
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mem2RegStats {
    pub promoted_vars: usize,
    pub removed_loads: usize,
    pub removed_stores: usize,
}

impl core::ops::AddAssign for Mem2RegStats {
    fn add_assign(&mut self, rhs: Self) {
        self.promoted_vars += rhs.promoted_vars;
        self.removed_loads += rhs.removed_loads;
        self.removed_stores += rhs.removed_stores;
    }
}

impl core::fmt::Display for Mem2RegStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "promoted {} variable(s), removed {} load(s) and {} store(s)",
            self.promoted_vars, self.removed_loads, self.removed_stores
        )
    }
}

/// Runs mem2reg over every function in `module`, adding the counters to
/// `stats` when a sink is given.
pub fn mem2reg(module: &mut Module, stats: Option<&mut Mem2RegStats>) {
    let mut total = Mem2RegStats::default();

    for function in &mut module.functions {
        let function_stats = mem2reg_function(function);
        debug!(
            function = %function.name,
            promoted = function_stats.promoted_vars,
            loads = function_stats.removed_loads,
            stores = function_stats.removed_stores,
            "mem2reg"
        );
        total += function_stats;
    }

    if let Some(stats) = stats {
        *stats += total;
    }
}

pub fn mem2reg_function(function: &mut Function) -> Mem2RegStats {
    let allocas = collect_allocas(function);
    if allocas.is_empty() {
        return Mem2RegStats::default();
    }

    let mut promoter = Promoter::new(function, allocas);
    promoter.run();
    promoter.stats
}

#[derive(Debug)]
struct AllocaInfo {
    id: TempId,
    ty: Option<TypeKind>,
    address_taken: bool,
    has_store: bool,
    conflicting_types: bool,
}

impl AllocaInfo {
    fn record_access(&mut self, ty: TypeKind) {
        match self.ty {
            None => self.ty = Some(ty),
            Some(existing) if existing != ty => self.conflicting_types = true,
            Some(_) => {}
        }
    }

    fn promotable_type(&self) -> Option<TypeKind> {
        let ty = self.ty.filter(|ty| ty.is_promotable())?;
        (!self.address_taken && self.has_store && !self.conflicting_types).then_some(ty)
    }
}

/// Gathers every alloca in `function` that can be promoted, in definition
/// order.
fn collect_allocas(function: &Function) -> Vec<(TempId, TypeKind)> {
    let mut infos: Vec<AllocaInfo> = Vec::new();
    let mut by_id: HashMap<TempId, usize> = HashMap::new();

    for block in &function.blocks {
        for instr in &block.instructions {
            if let (Opcode::Alloca, Some(id)) = (instr.opcode, instr.result) {
                by_id.insert(id, infos.len());
                infos.push(AllocaInfo {
                    id,
                    ty: None,
                    address_taken: false,
                    has_store: false,
                    conflicting_types: false,
                });
            }
        }
    }

    for block in &function.blocks {
        for instr in &block.instructions {
            for (position, operand) in instr.operands.iter().enumerate() {
                let Some(&index) = operand.as_temp().and_then(|id| by_id.get(&id)) else {
                    continue;
                };
                let info = &mut infos[index];

                match (instr.opcode, position) {
                    (Opcode::Load, 0) => info.record_access(instr.ty),
                    (Opcode::Store, 0) => {
                        info.has_store = true;
                        info.record_access(instr.ty);
                    }
                    _ => info.address_taken = true,
                }
            }

            for arg in instr.br_args.iter().flatten() {
                if let Some(&index) = arg.as_temp().and_then(|id| by_id.get(&id)) {
                    infos[index].address_taken = true;
                }
            }
        }
    }

    infos
        .into_iter()
        .filter_map(|info| {
            let promotable = info.promotable_type();
            trace!(
                alloca = %info.id,
                ?promotable,
                address_taken = info.address_taken,
                "mem2reg candidate"
            );
            promotable.map(|ty| (info.id, ty))
        })
        .collect()
}

simple_index! {
    struct VarId;
}

struct Variable {
    alloca: TempId,
    ty: TypeKind,
    name: String,
    /// Current definition of the variable at the end of each block
    defs: HashMap<BlockId, Value>,
}

#[derive(Default)]
struct BlockState {
    sealed: bool,
    visited: bool,
    total_preds: usize,
    seen_preds: usize,
    /// Index of the block parameter synthesised for each variable
    params: HashMap<VarId, usize>,
    /// Variables that got a placeholder parameter before sealing
    incomplete: Vec<VarId>,
}

struct Promoter<'f> {
    function: &'f mut Function,
    cfg: FunctionCfg,
    reachable: Vec<bool>,
    vars: IndexVec<VarId, Variable>,
    by_alloca: HashMap<TempId, VarId>,
    blocks: IndexVec<BlockId, BlockState>,
    next_temp: TempId,
    stats: Mem2RegStats,
}

impl<'f> Promoter<'f> {
    fn new(function: &'f mut Function, allocas: Vec<(TempId, TypeKind)>) -> Self {
        function.recount_temps();
        let cfg = FunctionCfg::new(function);

        let mut reachable = vec![false; cfg.len()];
        for block in cfg.reverse_post_order() {
            reachable[block.index()] = true;
        }

        let mut vars = IndexVec::with_capacity(allocas.len());
        let mut by_alloca = HashMap::with_capacity(allocas.len());
        for (alloca, ty) in allocas {
            let name = function
                .temp_name(alloca)
                .map_or_else(|| format!("t{}", alloca.index()), str::to_owned);
            let var = vars.push(Variable {
                alloca,
                ty,
                name,
                defs: HashMap::new(),
            });
            by_alloca.insert(alloca, var);
        }

        let blocks = cfg
            .blocks()
            .map(|block| {
                let total_preds = cfg.predecessors(block).len();
                BlockState {
                    sealed: total_preds == 0,
                    total_preds,
                    ..BlockState::default()
                }
            })
            .collect();

        let stats = Mem2RegStats {
            promoted_vars: vars.len(),
            ..Mem2RegStats::default()
        };

        Self {
            next_temp: function.next_temp_id(),
            function,
            cfg,
            reachable,
            vars,
            by_alloca,
            blocks,
            stats,
        }
    }

    fn run(&mut self) {
        let mut worklist = VecDeque::new();
        let mut queued = vec![false; self.blocks.len()];

        if self.blocks.is_empty() {
            return;
        }
        worklist.push_back(BlockId::ENTRY);
        queued[BlockId::ENTRY.index()] = true;

        loop {
            while let Some(block) = worklist.pop_front() {
                self.process_block(block);

                for successor in self.cfg.successors(block).to_vec() {
                    let state = &mut self.blocks[successor];
                    state.seen_preds += 1;
                    assert!(
                        state.seen_preds <= state.total_preds,
                        "block visited from more predecessors than it has"
                    );

                    if !queued[successor.index()] {
                        queued[successor.index()] = true;
                        worklist.push_back(successor);
                    }
                    if state.seen_preds == state.total_preds {
                        self.seal(successor);
                    }
                }
            }

            // Blocks unreachable from the entry still get processed so that no
            // access to a promoted slot survives in them.
            match queued.iter().position(|queued| !queued) {
                Some(index) => {
                    queued[index] = true;
                    worklist.push_back(BlockId::new(index));
                }
                None => break,
            }
        }

        debug_assert!(self.blocks.iter().all(|b| b.sealed && b.visited));
    }

    fn process_block(&mut self, block: BlockId) {
        self.blocks[block].visited = true;

        let mut index = 0;
        while index < self.function.blocks[block].instructions.len() {
            let instr = &self.function.blocks[block].instructions[index];
            let target = match instr.opcode {
                Opcode::Alloca => instr.result,
                Opcode::Load | Opcode::Store => instr.operands.first().and_then(Value::as_temp),
                _ => None,
            };
            let Some(&var) = target.and_then(|id| self.by_alloca.get(&id)) else {
                index += 1;
                continue;
            };

            let instr = self.function.blocks[block].instructions.remove(index);
            match instr.opcode {
                Opcode::Load => {
                    let value = self.read_var(block, var);
                    if let Some(result) = instr.result {
                        self.replace_uses(result, &value);
                    }
                    self.stats.removed_loads += 1;
                }
                Opcode::Store => {
                    if let Some(value) = instr.operands.get(1) {
                        self.vars[var].defs.insert(block, value.clone());
                    }
                    self.stats.removed_stores += 1;
                }
                _ => {}
            }
        }
    }

    /// Rewrites uses of a removed load, including definitions already
    /// recorded for other variables.
    fn replace_uses(&mut self, result: TempId, value: &Value) {
        self.function.replace_all_uses(result, value);

        for var in self.vars.iter_mut() {
            for def in var.defs.values_mut() {
                if def.is_temp(result) {
                    *def = value.clone();
                }
            }
        }
    }

    fn read_var(&mut self, block: BlockId, var: VarId) -> Value {
        if let Some(value) = self.vars[var].defs.get(&block) {
            return value.clone();
        }

        if !self.blocks[block].sealed {
            let (_, value) = self.ensure_param(block, var);
            self.vars[var].defs.insert(block, value.clone());
            if !self.blocks[block].incomplete.contains(&var) {
                self.blocks[block].incomplete.push(var);
            }
            return value;
        }

        self.read_from_preds(block, var)
    }

    fn read_from_preds(&mut self, block: BlockId, var: VarId) -> Value {
        let preds = self.cfg.predecessors(block).to_vec();

        let value = match preds.as_slice() {
            [] => Value::zero_of(self.vars[var].ty),
            // Only reachable blocks take the shortcut: a chain of
            // single-predecessor blocks can only cycle in dead code.
            [pred] if self.reachable[block.index()] => self.read_var(*pred, var),
            _ => {
                let (param, value) = self.ensure_param(block, var);
                // Recorded before recursing so that cycles end here.
                self.vars[var].defs.insert(block, value.clone());
                for &pred in &preds {
                    let incoming = self.read_var(pred, var);
                    self.add_incoming(pred, block, param, incoming);
                }
                value
            }
        };

        self.vars[var].defs.insert(block, value.clone());
        value
    }

    fn seal(&mut self, block: BlockId) {
        assert!(!self.blocks[block].sealed, "block sealed twice");

        let incomplete = std::mem::take(&mut self.blocks[block].incomplete);
        let preds = self.cfg.predecessors(block).to_vec();

        for var in incomplete {
            let param = self.blocks[block].params[&var];
            for &pred in &preds {
                let incoming = self.read_var(pred, var);
                self.add_incoming(pred, block, param, incoming);
            }
        }

        self.blocks[block].sealed = true;
    }

    fn ensure_param(&mut self, block: BlockId, var: VarId) -> (usize, Value) {
        if let Some(&index) = self.blocks[block].params.get(&var) {
            let id = self.function.blocks[block].params[index].id;
            return (index, Value::temp(id));
        }

        let Variable { ty, name, .. } = &self.vars[var];
        let (ty, name) = (*ty, name.clone());

        let id = self.next_temp;
        self.next_temp = id.plus(1);
        self.function.register_temp(id, ty, Some(&name));

        let params = &mut self.function.blocks[block].params;
        params.push(Param { id, ty, name });
        let index = params.len() - 1;
        self.blocks[block].params.insert(var, index);

        trace!(
            block = %self.function.blocks[block].label,
            param = %id,
            alloca = %self.vars[var].alloca,
            "mem2reg block parameter"
        );
        (index, Value::temp(id))
    }

    /// Passes `value` for parameter `param` of `block` along every edge from
    /// `pred`.
    fn add_incoming(&mut self, pred: BlockId, block: BlockId, param: usize, value: Value) {
        let target = &self.function.blocks[block];
        let label = target.label.clone();
        let param_types: Vec<TypeKind> = target.params.iter().map(|p| p.ty).collect();

        let Some(terminator) = self.function.blocks[pred].terminator_mut() else {
            return;
        };

        for slot in 0..terminator.labels.len() {
            if terminator.labels[slot] != label {
                continue;
            }
            if terminator.br_args.len() <= slot {
                terminator.br_args.resize_with(slot + 1, Vec::new);
            }

            let args = &mut terminator.br_args[slot];
            while args.len() <= param {
                // Filled with the real value once the owning variable's edge
                // is wired.
                let ty = param_types.get(args.len()).copied().unwrap_or(TypeKind::I64);
                args.push(Value::zero_of(ty));
            }
            args[param] = value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::il::{parse::parse_module, verify::verify_module};

    fn promote(text: &str) -> (Module, Mem2RegStats) {
        let mut module = parse_module(text).unwrap();
        verify_module(&module).unwrap();

        let mut stats = Mem2RegStats::default();
        mem2reg(&mut module, Some(&mut stats));
        verify_module(&module).unwrap();
        (module, stats)
    }

    #[test]
    fn uninitialised_read_is_not_promoted() {
        let text = indoc! {"
            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              %1 = load i64 %0
              ret i64 %1
            }
        "};
        let (module, stats) = promote(text);

        assert_eq!(stats, Mem2RegStats::default());
        assert_eq!(module.to_string(), text);
    }

    #[test]
    fn straight_line_store_propagates_without_parameters() {
        let (module, stats) = promote(indoc! {"
            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              store i64 %0, 7
              br tail
            tail:
              %1 = load i64 %0
              ret i64 %1
            }
        "});

        assert_eq!(
            module.to_string(),
            indoc! {"
                func main() -> i64 {
                entry:
                  br tail
                tail:
                  ret i64 7
                }
            "}
        );
        assert_eq!(
            stats,
            Mem2RegStats {
                promoted_vars: 1,
                removed_loads: 1,
                removed_stores: 1,
            }
        );
    }

    #[test]
    fn diamond_gets_one_join_parameter() {
        let (module, _) = promote(indoc! {"
            func main(%0: i1) -> i64 {
            entry:
              %1 = alloca ptr 8
              cbr %0, left, right
            left:
              store i64 %1, 1
              br join
            right:
              store i64 %1, 2
              br join
            join:
              %2 = load i64 %1
              ret i64 %2
            }
        "});

        assert_eq!(
            module.to_string(),
            indoc! {"
                func main(%0: i1) -> i64 {
                entry:
                  cbr %0, left, right
                left:
                  br join(1)
                right:
                  br join(2)
                join(%3: i64):
                  ret i64 %3
                }
            "}
        );
    }

    #[test]
    fn loop_header_receives_parameter_after_sealing() {
        let (module, stats) = promote(indoc! {"
            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              store i64 %0, 0
              br loop_head_0
            loop_head_0:
              %1 = load i64 %0
              %2 = scmp_lt i1 %1, 10
              cbr %2, loop_body_0, done_0
            loop_body_0:
              %3 = load i64 %0
              %4 = iadd.ovf i64 %3, 1
              store i64 %0, %4
              br loop_head_0
            done_0:
              %5 = load i64 %0
              ret i64 %5
            }
        "});

        assert_eq!(
            module.to_string(),
            indoc! {"
                func main() -> i64 {
                entry:
                  br loop_head_0(0)
                loop_head_0(%6: i64):
                  %2 = scmp_lt i1 %6, 10
                  cbr %2, loop_body_0, done_0
                loop_body_0:
                  %4 = iadd.ovf i64 %6, 1
                  br loop_head_0(%4)
                done_0:
                  ret i64 %6
                }
            "}
        );
        assert_eq!(stats.removed_loads, 3);
        assert_eq!(stats.removed_stores, 2);
    }

    #[test]
    fn address_taken_slot_is_preserved() {
        let text = indoc! {"
            extern @consume(ptr) -> void

            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              store i64 %0, 3
              call @consume(%0)
              %1 = load i64 %0
              ret i64 %1
            }
        "};
        let (module, stats) = promote(text);

        assert_eq!(stats.promoted_vars, 0);
        assert_eq!(module.to_string(), text);
    }

    #[test]
    fn conflicting_access_types_are_not_promoted() {
        let text = indoc! {"
            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              store f64 %0, 1.5
              %1 = load i64 %0
              ret i64 %1
            }
        "};
        let (module, stats) = promote(text);

        assert_eq!(stats.promoted_vars, 0);
        assert_eq!(module.to_string(), text);
    }

    #[test]
    fn promotes_floats_and_booleans() {
        let (module, stats) = promote(indoc! {"
            func main(%0: i1) -> f64 {
            entry:
              %1 = alloca ptr 8
              %2 = alloca ptr 8
              store f64 %1, 0.5
              store i1 %2, %0
              br next
            next:
              %3 = load i1 %2
              %4 = load f64 %1
              cbr %3, yes, no
            yes:
              ret f64 %4
            no:
              ret f64 0.0
            }
        "});

        assert_eq!(stats.promoted_vars, 2);
        let text = module.to_string();
        assert!(text.contains("cbr %0, yes, no"));
        assert!(text.contains("ret f64 0.5"));
    }

    #[test]
    fn unreachable_blocks_are_rewritten_too() {
        let (module, stats) = promote(indoc! {"
            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              store i64 %0, 4
              br exit
            dead:
              %1 = load i64 %0
              store i64 %0, %1
              br exit
            exit:
              %2 = load i64 %0
              ret i64 %2
            }
        "});

        assert_eq!(stats.removed_loads, 2);
        assert_eq!(stats.removed_stores, 2);
        assert_eq!(
            module.to_string(),
            indoc! {"
                func main() -> i64 {
                entry:
                  br exit(4)
                dead:
                  br exit(0)
                exit(%3: i64):
                  ret i64 %3
                }
            "}
        );
    }

    #[test]
    fn running_twice_is_idempotent() {
        let (once, _) = promote(indoc! {"
            func main(%0: i1) -> i64 {
            entry:
              %1 = alloca ptr 8
              %2 = alloca ptr 8
              store i64 %1, 1
              store i64 %2, 5
              cbr %0, left, join
            left:
              store i64 %1, 2
              call @use(%2)
              br join
            join:
              %3 = load i64 %1
              ret i64 %3
            }

            func use(%0: ptr) -> void {
            entry:
              ret
            }
        "});

        let mut twice = once.clone();
        let mut stats = Mem2RegStats::default();
        mem2reg(&mut twice, Some(&mut stats));

        assert_eq!(stats, Mem2RegStats::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn no_stats_sink_behaves_the_same() {
        let text = indoc! {"
            func main() -> i64 {
            entry:
              %0 = alloca ptr 8
              store i64 %0, 7
              %1 = load i64 %0
              ret i64 %1
            }
        "};
        let mut with_sink = parse_module(text).unwrap();
        let mut without_sink = with_sink.clone();

        mem2reg(&mut with_sink, Some(&mut Mem2RegStats::default()));
        mem2reg(&mut without_sink, None);

        assert_eq!(with_sink, without_sink);
        assert!(with_sink.to_string().contains("ret i64 7"));
    }
}
