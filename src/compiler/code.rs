//! The emitted instruction stream, with single-pass backpatching.
//!
//! Forward jumps (skip-over-declarations, `if` exits, `while` exits) are
//! emitted with a placeholder immediate and corrected via [`CodeGen::backpatch`]
//! once the target position exists, so one compilation pass suffices.

use core::fmt;

use crate::compiler::table::{RelAddr, SymbolTable, TableError};

/// Opcodes carrying a mutable integer immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    /// Push the immediate.
    Lit,
    /// Grow the frame: `top += immediate`.
    Ict,
    /// Unconditional jump.
    Jmp,
    /// Pop; jump when the popped value is zero.
    Jpc,
}

/// Opcodes carrying a `(level, offset)` relative address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOp {
    /// Push the addressed slot.
    Lod,
    /// Pop into the addressed slot.
    Sto,
    /// Call the addressed function.
    Cal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Odd,
    Eq,
    NotEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    Write,
    WriteLn,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Neg => "neg",
            Operator::Add => "add",
            Operator::Sub => "sub",
            Operator::Mul => "mul",
            Operator::Div => "div",
            Operator::Odd => "odd",
            Operator::Eq => "eq",
            Operator::NotEq => "neq",
            Operator::Less => "ls",
            Operator::Greater => "gr",
            Operator::LessEq => "lseq",
            Operator::GreaterEq => "greq",
            Operator::Write => "wrt",
            Operator::WriteLn => "wrl",
        };
        write!(f, "{name}")
    }
}

/// One stack-machine instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inst {
    Value { op: ValueOp, v: i64 },
    Ref { op: RefOp, addr: RelAddr },
    Op(Operator),
    Ret { level: usize, pars: usize },
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Value { op: ValueOp::Lit, v } => write!(f, "lit {v}"),
            Inst::Value { op: ValueOp::Ict, v } => write!(f, "ict {v}"),
            Inst::Value { op: ValueOp::Jmp, v } => write!(f, "jmp {v}"),
            Inst::Value { op: ValueOp::Jpc, v } => write!(f, "jpc {v}"),
            Inst::Ref { op: RefOp::Lod, addr } => write!(f, "lod {addr}"),
            Inst::Ref { op: RefOp::Sto, addr } => write!(f, "sto {addr}"),
            Inst::Ref { op: RefOp::Cal, addr } => write!(f, "cal {addr}"),
            Inst::Op(op) => write!(f, "opr {op}"),
            Inst::Ret { level, pars } => write!(f, "ret {level},{pars}"),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Clone)]
pub enum CodeError {
    #[error("position {0} does not hold a patchable instruction")]
    MalformedBackpatchTarget(usize),
}

/// Accumulates the instruction sequence during compilation. Positions
/// returned by the `emit_*` methods are opaque handles into the sequence.
#[derive(Debug, Default)]
pub struct CodeGen {
    insts: Vec<Inst>,
}

impl CodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position the next emitted instruction will occupy.
    pub fn next_position(&self) -> usize {
        self.insts.len()
    }

    pub fn emit_value(&mut self, op: ValueOp, v: i64) -> usize {
        self.push(Inst::Value { op, v })
    }

    /// Emits a reference instruction, resolving the symbol's relative
    /// address through the table now. Variable and parameter offsets are
    /// stable once declared; function entries must already be patched
    /// when a call site against them is emitted.
    pub fn emit_addressed(
        &mut self,
        op: RefOp,
        index: usize,
        table: &SymbolTable,
    ) -> Result<usize, TableError> {
        let addr = table.relative_address_of(index)?;
        Ok(self.push(Inst::Ref { op, addr }))
    }

    pub fn emit_operator(&mut self, op: Operator) -> usize {
        self.push(Inst::Op(op))
    }

    /// Emits a return for the scope about to close. When the previous
    /// instruction is already a return this is a no-op yielding the
    /// existing position, so a block's implicit end-of-body return never
    /// duplicates an explicit one.
    pub fn emit_return(&mut self, table: &SymbolTable) -> usize {
        if let Some(Inst::Ret { .. }) = self.insts.last() {
            return self.insts.len() - 1;
        }
        self.push(Inst::Ret {
            level: table.current_level(),
            pars: table.enclosing_function_parameter_count(),
        })
    }

    /// Rewrites the immediate of the value instruction at `position`.
    pub fn backpatch(&mut self, position: usize, v: i64) -> Result<(), CodeError> {
        match self.insts.get_mut(position) {
            Some(Inst::Value { v: immediate, .. }) => {
                *immediate = v;
                Ok(())
            }
            _ => Err(CodeError::MalformedBackpatchTarget(position)),
        }
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn into_insts(self) -> Vec<Inst> {
        self.insts
    }

    fn push(&mut self, inst: Inst) -> usize {
        let position = self.insts.len();
        self.insts.push(inst);
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn emit_returns_consecutive_positions() {
        let mut code = CodeGen::new();
        check!(code.next_position() == 0);
        check!(code.emit_value(ValueOp::Jmp, 0) == 0);
        check!(code.emit_operator(Operator::Add) == 1);
        check!(code.next_position() == 2);
    }

    #[test]
    fn backpatch_rewrites_only_the_target() {
        let mut code = CodeGen::new();
        let jump = code.emit_value(ValueOp::Jmp, 0);
        code.emit_value(ValueOp::Lit, 7);
        code.backpatch(jump, 2).unwrap();
        check!(
            code.insts()
                == [
                    Inst::Value {
                        op: ValueOp::Jmp,
                        v: 2
                    },
                    Inst::Value {
                        op: ValueOp::Lit,
                        v: 7
                    },
                ]
        );
    }

    #[test]
    fn backpatch_rejects_non_value_positions() {
        let mut code = CodeGen::new();
        let pos = code.emit_operator(Operator::Mul);
        check!(code.backpatch(pos, 4) == Err(CodeError::MalformedBackpatchTarget(pos)));
        check!(code.backpatch(99, 4) == Err(CodeError::MalformedBackpatchTarget(99)));
    }

    #[test]
    fn emit_return_is_idempotent() {
        let mut table = SymbolTable::new();
        table.begin_scope(2);
        let mut code = CodeGen::new();
        let first = code.emit_return(&table);
        let second = code.emit_return(&table);
        check!(first == second);
        check!(code.insts() == [Inst::Ret { level: 0, pars: 0 }]);
    }

    #[test]
    fn emit_return_reads_level_and_parameter_count() {
        let mut table = SymbolTable::new();
        table.begin_scope(2);
        table.declare_function("f", 0);
        table.begin_scope(2);
        table.declare_parameter("a").unwrap();
        table.declare_parameter("b").unwrap();
        table.end_parameter_list();

        let mut code = CodeGen::new();
        code.emit_return(&table);
        check!(code.insts() == [Inst::Ret { level: 1, pars: 2 }]);
    }

    #[test]
    fn emit_addressed_resolves_through_the_table() {
        let mut table = SymbolTable::new();
        table.begin_scope(2);
        let x = table.declare_variable("x");
        let m = table.declare_const("m", 9);

        let mut code = CodeGen::new();
        code.emit_addressed(RefOp::Lod, x, &table).unwrap();
        check!(
            code.insts()
                == [Inst::Ref {
                    op: RefOp::Lod,
                    addr: RelAddr {
                        level: 0,
                        offset: 2
                    }
                }]
        );
        check!(code.emit_addressed(RefOp::Sto, m, &table).is_err());
    }
}
