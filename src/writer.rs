//! Binary writer for function bodies.
//!
//! [`CodeWriter`] serialises instructions into an append-only buffer and
//! records, for every `block`/`loop`/`if`, the byte offset of its matching
//! `end` (and `else`, if any). The interpreter uses these maps to jump
//! straight to a construct's continuation instead of scanning for it.

use std::collections::HashMap;

use tracing::trace;

use crate::error::BuildError;
use crate::instr::Instr;
use crate::opcode;

/// A finished function body: code bytes plus structured-control position
/// maps. Keys are offsets of `block`/`loop`/`if` opcodes, values are
/// offsets of the matching `end` or `else` opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wasm {
    code: Vec<u8>,
    end_positions: HashMap<usize, usize>,
    else_positions: HashMap<usize, usize>,
}

impl Wasm {
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Offset of the `end` closing the construct that starts at `start`.
    pub fn end_position(&self, start: usize) -> Option<usize> {
        self.end_positions.get(&start).copied()
    }

    /// Offset of the `else` of the `if` that starts at `start`.
    pub fn else_position(&self, start: usize) -> Option<usize> {
        self.else_positions.get(&start).copied()
    }

    pub fn end_positions(&self) -> &HashMap<usize, usize> {
        &self.end_positions
    }

    pub fn else_positions(&self) -> &HashMap<usize, usize> {
        &self.else_positions
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    start: usize,
    opcode: u8,
}

#[derive(Debug, Default)]
pub struct CodeWriter {
    code: Vec<u8>,
    open_blocks: Vec<OpenBlock>,
    end_positions: HashMap<usize, usize>,
    else_positions: HashMap<usize, usize>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write offset.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Number of constructs opened and not yet ended.
    pub fn open_blocks(&self) -> usize {
        self.open_blocks.len()
    }

    pub fn emit(&mut self, instr: &Instr) -> Result<(), BuildError> {
        let at = self.code.len();
        match instr {
            Instr::Block(_) | Instr::Loop(_) | Instr::If(_) => {
                self.open_blocks.push(OpenBlock {
                    start: at,
                    opcode: instr.opcode(),
                });
            }
            Instr::Else => {
                let block = self.open_blocks.last().ok_or(BuildError::ElseWithoutIf)?;
                if block.opcode != opcode::IF || self.else_positions.contains_key(&block.start) {
                    return Err(BuildError::ElseWithoutIf);
                }
                self.else_positions.insert(block.start, at);
            }
            Instr::End => {
                // An end with nothing open terminates the function body.
                if let Some(block) = self.open_blocks.pop() {
                    self.end_positions.insert(block.start, at);
                }
            }
            _ => {}
        }
        instr.encode(&mut self.code);
        Ok(())
    }

    pub fn emit_all<'a>(&mut self, instrs: impl IntoIterator<Item = &'a Instr>) -> Result<(), BuildError> {
        for instr in instrs {
            self.emit(instr)?;
        }
        Ok(())
    }

    /// Cuts the buffer back to `position` and returns the removed bytes.
    /// Position-map entries past the cut are dropped and constructs whose
    /// `end` was removed become open again.
    pub fn trunc(&mut self, position: usize) -> Vec<u8> {
        if position >= self.code.len() {
            return Vec::new();
        }
        let removed = self.code.split_off(position);

        self.open_blocks.retain(|b| b.start < position);
        self.else_positions
            .retain(|&start, &mut at| start < position && at < position);

        let mut reopened = Vec::new();
        self.end_positions.retain(|&start, &mut end| {
            if start >= position {
                false
            } else if end >= position {
                reopened.push(start);
                false
            } else {
                true
            }
        });
        for start in reopened {
            self.open_blocks.push(OpenBlock {
                start,
                opcode: self.code[start],
            });
        }
        self.open_blocks.sort_by_key(|b| b.start);

        trace!(position, removed = removed.len(), "truncated code buffer");
        removed
    }

    /// Finishes the body. Fails if any construct is still open.
    pub fn to_wasm(self) -> Result<Wasm, BuildError> {
        if !self.open_blocks.is_empty() {
            return Err(BuildError::UnclosedBlock(self.open_blocks.len()));
        }
        Ok(Wasm {
            code: self.code,
            end_positions: self.end_positions,
            else_positions: self.else_positions,
        })
    }
}
