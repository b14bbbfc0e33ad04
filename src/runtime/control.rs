//! Block stack for structured control flow
//!
//! Each active `block`, `loop` or `if` in the running function has a
//! [`BlockFrame`] recording where it starts in the code and how high the
//! operand stack was on entry. Branch depth `n` names the `n`-th frame from
//! the top.

/// Kind of an active construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Branches target the end of the block.
    Block,
    /// Branches target the beginning of the loop.
    Loop,
    If,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFrame {
    /// Code offset of the opening opcode; key into the position maps.
    pub start: usize,
    pub kind: BlockKind,
    /// Operand stack height on entry.
    pub height: usize,
    /// Number of results the construct produces.
    pub arity: usize,
}

impl BlockFrame {
    /// Number of values a branch to this construct keeps. A loop takes no
    /// parameters, so branching to it keeps nothing.
    pub fn branch_arity(&self) -> usize {
        match self.kind {
            BlockKind::Loop => 0,
            _ => self.arity,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockStack {
    frames: Vec<BlockFrame>,
}

impl BlockStack {
    pub fn new() -> Self {
        BlockStack { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: BlockFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<BlockFrame> {
        self.frames.pop()
    }

    /// The `depth`-th frame from the top (0 = innermost).
    pub fn get(&self, depth: u32) -> Option<&BlockFrame> {
        let len = self.frames.len();
        if depth as usize >= len {
            return None;
        }
        self.frames.get(len - 1 - depth as usize)
    }

    /// Pops frames down to and including the `depth`-th, returning it.
    pub fn unwind(&mut self, depth: u32) -> Option<BlockFrame> {
        let target = *self.get(depth)?;
        self.frames.truncate(self.frames.len() - 1 - depth as usize);
        Some(target)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
