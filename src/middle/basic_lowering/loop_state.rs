use crate::{frontend::basic::ast::LoopKind, middle::il::BlockId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopFrame {
    pub kind: LoopKind,
    /// Block an `EXIT` out of this loop branches to
    pub exit: BlockId,
    pub exit_taken: bool,
}

/// Enclosing loops of the statement being lowered, innermost last.
#[derive(Debug, Default)]
pub struct LoopStack {
    frames: Vec<LoopFrame>,
}

impl LoopStack {
    pub fn push(&mut self, kind: LoopKind, exit: BlockId) {
        self.frames.push(LoopFrame {
            kind,
            exit,
            exit_taken: false,
        });
    }

    /// # Panics
    /// Panics when no loop is open.
    pub fn pop(&mut self) -> LoopFrame {
        self.frames.pop().expect("loop stack underflow")
    }

    /// Resolves an `EXIT` and records that it was taken. `kind` restricts
    /// the search to loops of that kind; the innermost match wins.
    pub fn take_exit(&mut self, kind: Option<LoopKind>) -> Option<BlockId> {
        let frame = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| kind.is_none_or(|kind| frame.kind == kind))?;

        frame.exit_taken = true;
        Some(frame.exit)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
