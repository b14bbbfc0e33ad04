use tracing::trace;

use crate::error::BuildError;
use crate::expr::{Expr, ExprKind};
use crate::instr::{BlockType, Instr, MemArg};
use crate::module::{CompiledFunction, Func, Global, Local, Signature};
use crate::types::{BinaryOp, FuncType, RelOp, StoreOp, ValueType};
use crate::writer::CodeWriter;

use super::ModuleBuilder;

/// Names a `block`, `loop` or `if` for use as a branch target.
///
/// Created by [`FunctionBuilder::label`] and attached to the construct that
/// is opened next. Ids are unique within a module, so a label never
/// resolves inside another function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

/// Type-checking state of one open construct.
#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    label: Option<Label>,
    results: Vec<ValueType>,
    stack: Vec<ValueType>,
    /// Set after an unconditional branch; the operand stack is then
    /// polymorphic until the construct ends.
    unreachable: bool,
}

impl Scope {
    fn new(kind: ScopeKind, label: Option<Label>, results: Vec<ValueType>) -> Self {
        Scope {
            kind,
            label,
            results,
            stack: Vec::new(),
            unreachable: false,
        }
    }

    /// Values a branch to this construct carries.
    fn branch_types(&self) -> &[ValueType] {
        match self.kind {
            ScopeKind::Loop => &[],
            _ => &self.results,
        }
    }

    fn check_results(&self) -> Result<(), BuildError> {
        let ok = if self.unreachable {
            self.results.ends_with(&self.stack)
        } else {
            self.stack == self.results
        };
        if !ok {
            return Err(BuildError::TypeMismatch {
                expected: self.results.clone(),
                actual: self.stack.clone(),
            });
        }
        Ok(())
    }
}

/// An `if` that was just closed. A following `else_` reopens it.
#[derive(Debug)]
struct ClosedIf {
    scope: Scope,
    parent_height: usize,
}

/// Writes the body of one function.
///
/// Parameters come first, then locals, then statements; each phase closes
/// the previous one. Every statement is type checked against the operand
/// stack of the innermost open construct, and the body is compiled to bytes
/// by [`finish`](Self::finish).
pub struct FunctionBuilder<'m> {
    module: &'m mut ModuleBuilder,
    index: u32,
    params: Vec<ValueType>,
    results: Vec<ValueType>,
    locals: Vec<ValueType>,
    signature: Option<Signature>,
    forward_declared: bool,
    body: Vec<Instr>,
    scopes: Vec<Scope>,
    pending_label: Option<Label>,
    closed_if: Option<ClosedIf>,
}

impl<'m> FunctionBuilder<'m> {
    pub(super) fn new(
        module: &'m mut ModuleBuilder,
        index: u32,
        params: Vec<ValueType>,
        results: Vec<ValueType>,
        signature: Option<Signature>,
    ) -> Self {
        let forward_declared = signature.is_some();
        let scopes = vec![Scope::new(ScopeKind::Function, None, results.clone())];
        FunctionBuilder {
            module,
            index,
            params,
            results,
            locals: Vec::new(),
            signature,
            forward_declared,
            body: Vec::new(),
            scopes,
            pending_label: None,
            closed_if: None,
        }
    }

    /// Index of this function in the module's function index space.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn param(&mut self, ty: ValueType) -> Result<Local, BuildError> {
        if let Some(signature) = &self.signature {
            if self.forward_declared {
                let mut params = self.params.clone();
                params.push(ty);
                return Err(BuildError::SignatureMismatch {
                    func: self.index,
                    declared: signature.ty.to_string(),
                    actual: FuncType::new(params, self.results.clone()).to_string(),
                });
            }
            return Err(BuildError::ParamAfterBody);
        }
        let index = self.params.len() as u32;
        self.params.push(ty);
        Ok(Local { index, ty })
    }

    /// Handles for the declared parameters, in order.
    pub fn params(&self) -> Vec<Local> {
        self.params
            .iter()
            .enumerate()
            .map(|(index, &ty)| Local {
                index: index as u32,
                ty,
            })
            .collect()
    }

    pub fn local(&mut self, ty: ValueType) -> Result<Local, BuildError> {
        if !self.body.is_empty() || self.scopes.len() > 1 {
            return Err(BuildError::LocalAfterBody);
        }
        self.seal();
        let index = (self.params.len() + self.locals.len()) as u32;
        self.locals.push(ty);
        Ok(Local { index, ty })
    }

    /// Handle to the function being built, for recursive calls. Fixes the
    /// signature.
    pub fn func(&mut self) -> Func {
        let signature = self.seal();
        Func {
            index: self.index,
            signature,
        }
    }

    /// Instructions emitted so far.
    pub fn instructions(&self) -> &[Instr] {
        &self.body
    }

    fn seal(&mut self) -> Signature {
        if let Some(signature) = &self.signature {
            return signature.clone();
        }
        let signature = self.module.signature(self.params.clone(), self.results.clone());
        self.signature = Some(signature.clone());
        signature
    }

    // -- Operand stack bookkeeping --

    fn scope(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn scope_at(&self, depth: u32) -> &Scope {
        &self.scopes[self.scopes.len() - 1 - depth as usize]
    }

    fn pop_types(&mut self, expected: &[ValueType]) -> Result<(), BuildError> {
        self.peek_types(expected)?;
        let scope = self.scope_mut();
        let keep = scope.stack.len().saturating_sub(expected.len());
        scope.stack.truncate(keep);
        Ok(())
    }

    /// Checks that the top of the stack holds `expected` without popping.
    fn peek_types(&self, expected: &[ValueType]) -> Result<(), BuildError> {
        let scope = self.scope();
        let available = expected.len().min(scope.stack.len());
        let top = &scope.stack[scope.stack.len() - available..];
        let missing = available < expected.len() && !scope.unreachable;
        if missing || top != &expected[expected.len() - available..] {
            return Err(BuildError::TypeMismatch {
                expected: expected.to_vec(),
                actual: top.to_vec(),
            });
        }
        Ok(())
    }

    fn mark_unreachable(&mut self) {
        let scope = self.scope_mut();
        scope.stack.clear();
        scope.unreachable = true;
    }

    /// Common prologue of every statement.
    fn begin(&mut self) -> Result<(), BuildError> {
        if self.pending_label.is_some() {
            return Err(BuildError::MisplacedLabel);
        }
        self.seal();
        self.closed_if = None;
        Ok(())
    }

    fn emit(&mut self, instr: Instr) {
        trace!(func = self.index, %instr, "emit");
        self.body.push(instr);
    }

    /// Checks that everything `expr` references exists in this function
    /// and module.
    fn check_refs(&self, expr: &Expr) -> Result<(), BuildError> {
        let declared = self.params.len() + self.locals.len();
        expr.walk(&mut |node: &Expr| match node.kind() {
            ExprKind::LocalGet(local) | ExprKind::LocalTee(local, _) => {
                let index = local.index as usize;
                let ty = if index < self.params.len() {
                    Some(self.params[index])
                } else if index < declared {
                    Some(self.locals[index - self.params.len()])
                } else {
                    None
                };
                if ty != Some(local.ty) {
                    return Err(BuildError::UnknownLocal {
                        index: local.index,
                        ty: local.ty,
                    });
                }
                Ok(())
            }
            ExprKind::GlobalGet(global) => self.check_global(global),
            ExprKind::Load { .. } | ExprKind::MemorySize | ExprKind::MemoryGrow(_) => {
                if !self.module.has_memory() {
                    return Err(BuildError::NoMemory);
                }
                Ok(())
            }
            ExprKind::Call { func, .. } | ExprKind::RefFunc(func) => {
                if func.index as usize >= self.module.function_count() {
                    return Err(BuildError::UnknownFunction(func.index));
                }
                Ok(())
            }
            ExprKind::CallIndirect { table, .. } => {
                if table.0 as usize >= self.module.table_count() {
                    return Err(BuildError::UnknownTable(table.0));
                }
                Ok(())
            }
            _ => Ok(()),
        })
    }

    fn check_global(&self, global: &Global) -> Result<(), BuildError> {
        match self.module.global_entry(global.index) {
            Some(entry) if entry.ty == global.ty => Ok(()),
            _ => Err(BuildError::UnknownGlobal(global.index)),
        }
    }

    fn lower(&mut self, expr: &Expr) {
        let start = self.body.len();
        expr.lower(&mut self.body);
        for instr in &self.body[start..] {
            trace!(func = self.index, %instr, "emit");
        }
    }

    // -- Statements --

    /// Evaluates `expr` and leaves its results on the stack.
    pub fn push(&mut self, expr: Expr) -> Result<(), BuildError> {
        self.begin()?;
        self.check_refs(&expr)?;
        self.lower(&expr);
        self.scope_mut().stack.extend_from_slice(expr.result_types());
        Ok(())
    }

    /// Discards the value on top of the stack.
    pub fn drop(&mut self) -> Result<(), BuildError> {
        self.begin()?;
        let scope = self.scope_mut();
        if scope.stack.pop().is_none() && !scope.unreachable {
            return Err(BuildError::ArityMismatch {
                context: "drop",
                expected: 1,
                actual: 0,
            });
        }
        self.emit(Instr::Drop);
        Ok(())
    }

    /// Evaluates `expr` for its side effects, dropping every result.
    pub fn exec(&mut self, expr: Expr) -> Result<(), BuildError> {
        let results = expr.result_types().len();
        self.push(expr)?;
        for _ in 0..results {
            self.drop()?;
        }
        Ok(())
    }

    /// Calls `func` as a statement, discarding its results.
    pub fn call_stmt(&mut self, func: &Func, args: Vec<Expr>) -> Result<(), BuildError> {
        self.exec(Expr::call(func, args)?)
    }

    pub fn set(&mut self, local: Local, value: Expr) -> Result<(), BuildError> {
        self.begin()?;
        self.check_refs(&Expr::local(local))?;
        self.check_value(&value, local.ty)?;
        self.lower(&value);
        self.emit(Instr::LocalSet(local.index));
        Ok(())
    }

    pub fn global_set(&mut self, global: Global, value: Expr) -> Result<(), BuildError> {
        self.begin()?;
        self.check_global(&global)?;
        if !global.mutable {
            return Err(BuildError::ImmutableGlobal(global.index));
        }
        self.check_value(&value, global.ty)?;
        self.lower(&value);
        self.emit(Instr::GlobalSet(global.index));
        Ok(())
    }

    /// Writes `value` to memory at `addr + offset`.
    pub fn store(&mut self, op: StoreOp, offset: u32, addr: Expr, value: Expr) -> Result<(), BuildError> {
        self.begin()?;
        if !self.module.has_memory() {
            return Err(BuildError::NoMemory);
        }
        self.check_value(&addr, ValueType::I32)?;
        self.check_value(&value, op.value_type())?;
        self.lower(&addr);
        self.lower(&value);
        self.emit(Instr::Store(
            op,
            MemArg {
                align: op.natural_alignment(),
                offset,
            },
        ));
        Ok(())
    }

    fn check_value(&self, value: &Expr, ty: ValueType) -> Result<(), BuildError> {
        self.check_refs(value)?;
        if value.result_types() != [ty] {
            return Err(BuildError::TypeMismatch {
                expected: vec![ty],
                actual: value.result_types().to_vec(),
            });
        }
        Ok(())
    }

    fn check_condition(&self, cond: &Expr) -> Result<(), BuildError> {
        self.check_refs(cond)?;
        if cond.result_types() != [ValueType::Bool] {
            return Err(BuildError::ConditionNotBool(cond.result_types().to_vec()));
        }
        Ok(())
    }

    // -- Structured control --

    /// Creates a label that names the next `block`, `loop` or `if`.
    pub fn label(&mut self) -> Result<Label, BuildError> {
        if self.pending_label.is_some() {
            return Err(BuildError::MisplacedLabel);
        }
        let label = Label(self.module.next_label());
        self.pending_label = Some(label);
        Ok(label)
    }

    pub fn block(&mut self) -> Result<(), BuildError> {
        self.block_with(&[])
    }

    pub fn block_with(&mut self, results: &[ValueType]) -> Result<(), BuildError> {
        self.open(ScopeKind::Block, results, None)
    }

    pub fn loop_(&mut self) -> Result<(), BuildError> {
        self.loop_with(&[])
    }

    pub fn loop_with(&mut self, results: &[ValueType]) -> Result<(), BuildError> {
        self.open(ScopeKind::Loop, results, None)
    }

    pub fn if_(&mut self, cond: Expr) -> Result<(), BuildError> {
        self.if_with(cond, &[])
    }

    /// Opens an `if` producing `results`. Both arms must leave exactly those
    /// values, so an `else_` is required when `results` is not empty.
    pub fn if_with(&mut self, cond: Expr, results: &[ValueType]) -> Result<(), BuildError> {
        self.open(ScopeKind::If, results, Some(cond))
    }

    fn open(&mut self, kind: ScopeKind, results: &[ValueType], cond: Option<Expr>) -> Result<(), BuildError> {
        if let Some(cond) = &cond {
            self.check_condition(cond)?;
        }
        let label = self.pending_label.take();
        self.seal();
        self.closed_if = None;
        if let Some(cond) = &cond {
            self.lower(cond);
        }
        let block_type = match results {
            [] => BlockType::Empty,
            [ty] => BlockType::Value(*ty),
            many => BlockType::Func(self.module.signature(Vec::new(), many.to_vec()).index),
        };
        self.emit(match kind {
            ScopeKind::Loop => Instr::Loop(block_type),
            ScopeKind::If => Instr::If(block_type),
            _ => Instr::Block(block_type),
        });
        self.scopes.push(Scope::new(kind, label, results.to_vec()));
        Ok(())
    }

    /// Switches the innermost `if` to its else arm. May also directly follow
    /// the `end` of an `if`, which reopens it.
    pub fn else_(&mut self) -> Result<(), BuildError> {
        if self.pending_label.is_some() {
            return Err(BuildError::MisplacedLabel);
        }
        if let Some(closed) = self.closed_if.take() {
            self.body.pop();
            let parent = self.scope_mut();
            parent.stack.truncate(closed.parent_height);
            self.scopes.push(closed.scope);
        }
        if self.scope().kind != ScopeKind::If {
            return Err(BuildError::ElseWithoutIf);
        }
        self.scope().check_results()?;
        let scope = self.scope_mut();
        scope.kind = ScopeKind::Else;
        scope.stack.clear();
        scope.unreachable = false;
        self.emit(Instr::Else);
        Ok(())
    }

    /// Closes the innermost construct and pushes its results.
    pub fn end(&mut self) -> Result<(), BuildError> {
        if self.pending_label.is_some() {
            return Err(BuildError::MisplacedLabel);
        }
        if self.scopes.len() == 1 {
            return Err(BuildError::NoOpenBlock);
        }
        let scope = self.scope();
        scope.check_results()?;
        if scope.kind == ScopeKind::If && !scope.results.is_empty() {
            return Err(BuildError::MissingElse);
        }
        self.closed_if = None;
        self.emit(Instr::End);
        let Some(scope) = self.scopes.pop() else {
            return Err(BuildError::NoOpenBlock);
        };
        let parent = self.scope_mut();
        let parent_height = parent.stack.len();
        parent.stack.extend_from_slice(&scope.results);
        if scope.kind == ScopeKind::If {
            self.closed_if = Some(ClosedIf { scope, parent_height });
        }
        Ok(())
    }

    fn depth_of(&self, label: Label) -> Result<u32, BuildError> {
        self.scopes
            .iter()
            .rev()
            .position(|s| s.label == Some(label))
            .map(|depth| depth as u32)
            .ok_or(BuildError::LabelOutOfScope(label.0))
    }

    fn branch(&mut self, depth: u32, cond: Option<Expr>) -> Result<(), BuildError> {
        self.begin()?;
        let types = self.scope_at(depth).branch_types().to_vec();
        match cond {
            None => {
                self.pop_types(&types)?;
                self.emit(Instr::Br(depth));
                self.mark_unreachable();
            }
            Some(cond) => {
                self.check_condition(&cond)?;
                self.peek_types(&types)?;
                self.lower(&cond);
                self.emit(Instr::BrIf(depth));
            }
        }
        Ok(())
    }

    /// Unconditional branch. Branching to a loop restarts it; branching to
    /// anything else leaves it.
    pub fn br(&mut self, label: Label) -> Result<(), BuildError> {
        let depth = self.depth_of(label)?;
        self.branch(depth, None)
    }

    pub fn br_if(&mut self, label: Label, cond: Expr) -> Result<(), BuildError> {
        let depth = self.depth_of(label)?;
        self.branch(depth, Some(cond))
    }

    /// Branches to `targets[index]`, or to `default` when `index` is out of
    /// range.
    pub fn br_table(&mut self, targets: &[Label], default: Label, index: Expr) -> Result<(), BuildError> {
        self.begin()?;
        let default = self.depth_of(default)?;
        let types = self.scope_at(default).branch_types().to_vec();
        let mut depths = Vec::with_capacity(targets.len());
        for label in targets {
            let depth = self.depth_of(*label)?;
            let target = self.scope_at(depth).branch_types();
            if target != types.as_slice() {
                return Err(BuildError::TypeMismatch {
                    expected: types,
                    actual: target.to_vec(),
                });
            }
            depths.push(depth);
        }
        self.check_value(&index, ValueType::I32)?;
        self.pop_types(&types)?;
        self.lower(&index);
        self.emit(Instr::BrTable(depths, default));
        self.mark_unreachable();
        Ok(())
    }

    /// Returns from the function with the values on top of the stack.
    pub fn ret(&mut self) -> Result<(), BuildError> {
        self.begin()?;
        let results = self.results.clone();
        self.pop_types(&results)?;
        self.emit(Instr::Return);
        self.mark_unreachable();
        Ok(())
    }

    pub fn unreachable(&mut self) -> Result<(), BuildError> {
        self.begin()?;
        self.emit(Instr::Unreachable);
        self.mark_unreachable();
        Ok(())
    }

    pub fn nop(&mut self) -> Result<(), BuildError> {
        self.begin()?;
        self.emit(Instr::Nop);
        Ok(())
    }

    // -- Loops --

    /// `while cond { body }`. A pending label names the enclosing block, so
    /// branching to it breaks out of the loop.
    pub fn while_<F>(&mut self, cond: Expr, body: F) -> Result<(), BuildError>
    where
        F: FnOnce(&mut Self) -> Result<(), BuildError>,
    {
        self.check_condition(&cond)?;
        let exit = Expr::not(cond)?;
        self.block()?;
        self.loop_()?;
        self.branch(1, Some(exit))?;
        body(self)?;
        self.branch(0, None)?;
        self.end()?;
        self.end()
    }

    /// `for var = init; var < until; var += step { body }` with a signed
    /// comparison. A pending label names the enclosing block.
    pub fn for_<F>(&mut self, var: Local, init: Expr, until: Expr, step: Expr, body: F) -> Result<(), BuildError>
    where
        F: FnOnce(&mut Self) -> Result<(), BuildError>,
    {
        if !var.ty.is_integer() {
            return Err(BuildError::IllegalOperator {
                op: "for".to_string(),
                ty: var.ty,
            });
        }
        let label = self.pending_label.take();
        let init = self.set(var, init);
        self.pending_label = label;
        init?;

        let exit = Expr::compare(RelOp::GeS, Expr::local(var), until)?;
        let next = Expr::binary(BinaryOp::Add, Expr::local(var), step)?;
        self.check_condition(&exit)?;
        self.block()?;
        self.loop_()?;
        self.branch(1, Some(exit))?;
        body(self)?;
        self.set(var, next)?;
        self.branch(0, None)?;
        self.end()?;
        self.end()
    }

    /// Closes the body and compiles it.
    pub fn finish(mut self) -> Result<Func, BuildError> {
        if self.pending_label.is_some() {
            return Err(BuildError::MisplacedLabel);
        }
        if self.scopes.len() > 1 {
            return Err(BuildError::UnclosedBlock(self.scopes.len() - 1));
        }
        self.scope().check_results()?;
        let signature = self.seal();
        self.body.push(Instr::End);

        let mut writer = CodeWriter::new();
        writer.emit_all(&self.body)?;
        let compiled = CompiledFunction {
            type_index: signature.index,
            locals: std::mem::take(&mut self.locals),
            body: writer.to_wasm()?,
        };
        self.module.define(self.index, compiled);
        Ok(Func {
            index: self.index,
            signature,
        })
    }
}
