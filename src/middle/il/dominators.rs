use crate::index::IndexVec;

use super::{BlockId, cfg::FunctionCfg};

/// Immediate dominators computed with the iterative scheme of Cooper, Harvey
/// and Kennedy over reverse post-order. Blocks unreachable from the entry have
/// no dominator and dominate nothing.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: IndexVec<BlockId, Option<BlockId>>,
    rpo_number: IndexVec<BlockId, Option<usize>>,
}

impl DominatorTree {
    pub fn compute(cfg: &FunctionCfg) -> Self {
        let rpo = cfg.reverse_post_order();

        let mut rpo_number: IndexVec<BlockId, Option<usize>> = cfg.blocks().map(|_| None).collect();
        for (n, block) in rpo.iter().enumerate() {
            rpo_number[*block] = Some(n);
        }

        let mut idom: IndexVec<BlockId, Option<BlockId>> = cfg.blocks().map(|_| None).collect();
        let Some(&entry) = rpo.first() else {
            return Self { idom, rpo_number };
        };
        idom[entry] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;

            for &block in &rpo[1..] {
                let mut new_idom = None;
                for &pred in cfg.predecessors(block) {
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &rpo_number, pred, current),
                    });
                }

                if new_idom.is_some() && idom[block] != new_idom {
                    idom[block] = new_idom;
                    changed = true;
                }
            }
        }

        Self { idom, rpo_number }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_number
            .get(block)
            .is_some_and(|number| number.is_some())
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom
            .get(block)
            .copied()
            .flatten()
            .filter(|idom| *idom != block)
    }

    /// Whether every path from the entry to `block` passes through
    /// `dominator`. Every reachable block dominates itself.
    pub fn dominates(&self, dominator: BlockId, block: BlockId) -> bool {
        if !self.is_reachable(block) || !self.is_reachable(dominator) {
            return false;
        }

        let mut current = block;
        loop {
            if current == dominator {
                return true;
            }
            match self.immediate_dominator(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}

fn intersect(
    idom: &IndexVec<BlockId, Option<BlockId>>,
    rpo_number: &IndexVec<BlockId, Option<usize>>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    let number = |block: BlockId| rpo_number[block].unwrap_or(usize::MAX);

    while a != b {
        while number(a) > number(b) {
            match idom[a] {
                Some(parent) => a = parent,
                None => return b,
            }
        }
        while number(b) > number(a) {
            match idom[b] {
                Some(parent) => b = parent,
                None => return a,
            }
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::il::{Function, Instr, TypeKind, Value};

    #[test]
    fn diamond_join_is_dominated_by_entry_only() {
        let mut f = Function::new("f", TypeKind::Void);
        let entry = f.add_block("entry");
        let left = f.add_block("left");
        let right = f.add_block("right");
        let join = f.add_block("join");
        let dead = f.add_block("dead");

        f.blocks[entry].push(Instr::cbr(Value::bool(true), "left", vec![], "right", vec![]));
        f.blocks[left].push(Instr::br("join", vec![]));
        f.blocks[right].push(Instr::br("join", vec![]));
        f.blocks[join].push(Instr::ret(TypeKind::Void, None));
        f.blocks[dead].push(Instr::br("join", vec![]));

        let tree = DominatorTree::compute(&FunctionCfg::new(&f));

        assert_eq!(tree.immediate_dominator(join), Some(entry));
        assert_eq!(tree.immediate_dominator(entry), None);
        assert!(tree.dominates(entry, left));
        assert!(!tree.dominates(left, join));
        assert!(tree.dominates(join, join));
        assert!(!tree.is_reachable(dead));
        assert!(!tree.dominates(entry, dead));
    }

    #[test]
    fn loop_header_dominates_body() {
        let mut f = Function::new("f", TypeKind::Void);
        let entry = f.add_block("entry");
        let head = f.add_block("head");
        let body = f.add_block("body");
        let done = f.add_block("done");

        f.blocks[entry].push(Instr::br("head", vec![]));
        f.blocks[head].push(Instr::cbr(Value::bool(true), "body", vec![], "done", vec![]));
        f.blocks[body].push(Instr::br("head", vec![]));
        f.blocks[done].push(Instr::ret(TypeKind::Void, None));

        let tree = DominatorTree::compute(&FunctionCfg::new(&f));

        assert_eq!(tree.immediate_dominator(body), Some(head));
        assert_eq!(tree.immediate_dominator(done), Some(head));
        assert!(!tree.dominates(body, head));
    }
}
