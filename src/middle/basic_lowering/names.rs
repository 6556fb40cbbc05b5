//! Block labels for lowered control flow. The namer produces readable labels
//! numbered per procedure (`loop_head_0`, `for_inc_2`); the mangler is the
//! fallback that only promises uniqueness.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopLabels {
    pub head: String,
    pub body: String,
    pub done: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForHeads {
    /// Constant step: the comparison is chosen at lowering time
    Single(String),
    /// Runtime step: one head per step sign
    Split { positive: String, negative: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLabels {
    pub heads: ForHeads,
    pub body: String,
    pub inc: String,
    pub done: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfArmLabels {
    pub test: String,
    pub then: String,
}

#[derive(Debug, Default, Clone)]
pub struct BlockNamer {
    next_loop: u32,
    next_if: u32,
}

impl BlockNamer {
    /// Every loop form draws from one counter, so `loop_head_1` and
    /// `for_head_1` never both exist in a procedure.
    fn next_loop(&mut self) -> u32 {
        let id = self.next_loop;
        self.next_loop += 1;
        id
    }

    fn next_if(&mut self) -> u32 {
        let id = self.next_if;
        self.next_if += 1;
        id
    }
}

#[derive(Debug, Default, Clone)]
pub struct NameMangler {
    next: u32,
}

impl NameMangler {
    pub fn block(&mut self, hint: &str) -> String {
        let label = format!("L{}_{hint}", self.next);
        self.next += 1;
        label
    }
}

#[derive(Debug, Clone)]
pub enum BlockNames {
    Namer(BlockNamer),
    Mangler(NameMangler),
}

impl BlockNames {
    pub fn new(use_block_namer: bool) -> Self {
        if use_block_namer {
            BlockNames::Namer(BlockNamer::default())
        } else {
            BlockNames::Mangler(NameMangler::default())
        }
    }

    pub fn while_loop(&mut self) -> LoopLabels {
        self.loop_labels(["loop_head", "loop_body", "done"])
    }

    pub fn do_loop(&mut self) -> LoopLabels {
        self.loop_labels(["do_head", "do_body", "do_done"])
    }

    fn loop_labels(&mut self, [head, body, done]: [&str; 3]) -> LoopLabels {
        let id = self.next_loop_id();

        LoopLabels {
            head: self.label(id, head),
            body: self.label(id, body),
            done: self.label(id, done),
        }
    }

    pub fn for_loop(&mut self, variable_step: bool) -> ForLabels {
        let id = self.next_loop_id();

        let heads = if variable_step {
            ForHeads::Split {
                positive: self.label(id, "for_head_pos"),
                negative: self.label(id, "for_head_neg"),
            }
        } else {
            ForHeads::Single(self.label(id, "for_head"))
        };

        ForLabels {
            heads,
            body: self.label(id, "for_body"),
            inc: self.label(id, "for_inc"),
            done: self.label(id, "for_done"),
        }
    }

    fn next_loop_id(&mut self) -> u32 {
        match self {
            BlockNames::Namer(namer) => namer.next_loop(),
            BlockNames::Mangler(_) => 0,
        }
    }

    fn label(&mut self, id: u32, hint: &str) -> String {
        match self {
            BlockNames::Namer(_) => format!("{hint}_{id}"),
            BlockNames::Mangler(mangler) => mangler.block(hint),
        }
    }

    /// Labels for the `arm`-th condition of an IF ladder. Returns the id the
    /// ladder's else and exit blocks are named after when `arm` is 0.
    pub fn if_arm(&mut self, arm: usize) -> (IfArmLabels, u32) {
        match self {
            BlockNames::Namer(namer) => {
                let id = namer.next_if();
                let labels = IfArmLabels {
                    test: format!("if_test_{id}"),
                    then: format!("if_then_{id}"),
                };
                (labels, id)
            }
            BlockNames::Mangler(mangler) => {
                let labels = IfArmLabels {
                    test: mangler.block(&format!("if_test_{arm}")),
                    then: mangler.block(&format!("if_then_{arm}")),
                };
                (labels, arm as u32)
            }
        }
    }

    /// The else and exit labels of the IF ladder whose first arm got `id`.
    pub fn if_tail(&mut self, id: u32) -> (String, String) {
        match self {
            BlockNames::Namer(_) => (format!("if_else_{id}"), format!("if_exit_{id}")),
            BlockNames::Mangler(mangler) => (mangler.block("if_else"), mangler.block("if_exit")),
        }
    }
}
