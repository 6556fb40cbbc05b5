//! Memoised control-flow edges. Predecessors are never stored on the blocks
//! themselves; a pass builds a [`FunctionCfg`] once and refreshes it whenever
//! it rewrites terminator labels.

use hashbrown::HashMap;

use crate::index::{Index, IndexVec};

use super::{BlockId, Function, Module};

#[derive(Debug, Clone, Default)]
pub struct FunctionCfg {
    successors: IndexVec<BlockId, Vec<BlockId>>,
    predecessors: IndexVec<BlockId, Vec<BlockId>>,
    labels: HashMap<String, BlockId>,
}

impl FunctionCfg {
    pub fn new(function: &Function) -> Self {
        let mut labels = HashMap::with_capacity(function.blocks.len());
        for (id, block) in function.blocks.enumerate() {
            labels.entry(block.label.clone()).or_insert(id);
        }

        let successors: IndexVec<BlockId, Vec<BlockId>> = function
            .blocks
            .iter()
            .map(|block| {
                let mut targets = Vec::new();
                for label in block.successor_labels() {
                    if let Some(&target) = labels.get(label) {
                        if !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
                targets
            })
            .collect();

        // Visiting blocks in order keeps each predecessor list sorted by
        // (block index, successor slot).
        let mut predecessors: IndexVec<BlockId, Vec<BlockId>> =
            function.blocks.iter().map(|_| Vec::new()).collect();
        for (block, targets) in successors.enumerate() {
            for &target in targets {
                predecessors[target].push(block);
            }
        }

        Self {
            successors,
            predecessors,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        &self.successors[block]
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self.predecessors[block]
    }

    pub fn block_id(&self, label: &str) -> Option<BlockId> {
        self.labels.get(label).copied()
    }

    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + use<> {
        self.successors.indices()
    }

    /// Blocks reachable from the entry, in reverse post-order.
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut visited = vec![false; self.len()];
        let mut post_order = Vec::with_capacity(self.len());
        let mut stack = vec![(BlockId::ENTRY, 0usize)];
        visited[BlockId::ENTRY.index()] = true;

        while let Some((block, next)) = stack.last_mut() {
            let block = *block;
            match self.successors[block].get(*next) {
                Some(&successor) => {
                    *next += 1;
                    if !visited[successor.index()] {
                        visited[successor.index()] = true;
                        stack.push((successor, 0));
                    }
                }
                None => {
                    post_order.push(block);
                    stack.pop();
                }
            }
        }

        post_order.reverse();
        post_order
    }
}

/// Per-module cache of [`FunctionCfg`]s, indexed like `Module::functions`.
#[derive(Debug, Clone, Default)]
pub struct CfgContext {
    functions: Vec<FunctionCfg>,
}

impl CfgContext {
    pub fn new(module: &Module) -> Self {
        Self {
            functions: module.functions.iter().map(FunctionCfg::new).collect(),
        }
    }

    pub fn function(&self, index: usize) -> Option<&FunctionCfg> {
        self.functions.get(index)
    }

    /// Rebuilds the cached edges of one function after its terminators
    /// changed.
    pub fn refresh(&mut self, index: usize, function: &Function) {
        let cfg = FunctionCfg::new(function);
        match self.functions.get_mut(index) {
            Some(slot) => *slot = cfg,
            None => self.functions.push(cfg),
        }
    }
}
