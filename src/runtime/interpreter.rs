//! The interpreter proper: a fetch-execute loop over fixed-capacity
//! machine state.
//!
//! Frame layout, bottom to top: the caller's arguments sit at negative
//! offsets below the frame base, the base itself holds the saved display
//! slot and the return address, and locals start at offset 2. The
//! display array maps each nesting level to the base of its active
//! frame, which is what makes an enclosing scope's locals reachable in
//! one load.

use core::cmp::Ordering;
use std::io;

use crate::compiler::code::{Inst, Operator, RefOp, ValueOp};
use crate::compiler::table::RelAddr;
use crate::runtime::{RuntimeError, Value, MAX_LEVEL, STACK_SIZE};

/// Runs a finalized instruction sequence, sending `write`/`writeln`
/// output to `out`.
pub fn execute(code: &[Inst], out: impl io::Write) -> Result<(), RuntimeError> {
    Machine::new(code, out).run()
}

pub struct Machine<'c, W> {
    code: &'c [Inst],
    out: W,
    stack: Vec<Value>,
    display: [usize; MAX_LEVEL],
    pc: usize,
    top: usize,
}

impl<'c, W: io::Write> Machine<'c, W> {
    pub fn new(code: &'c [Inst], out: W) -> Self {
        Self {
            code,
            out,
            stack: vec![Value::Int(0); STACK_SIZE],
            display: [0; MAX_LEVEL],
            pc: 0,
            top: 0,
        }
    }

    /// Fetch-execute until a return at the outermost level resets the
    /// program counter to 0.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let inst = *self
                .code
                .get(self.pc)
                .ok_or(RuntimeError::BadJumpTarget(self.pc as i64))?;
            self.pc += 1;
            match inst {
                Inst::Value { op, v } => self.value_op(op, v)?,
                Inst::Ref { op, addr } => self.ref_op(op, addr)?,
                Inst::Op(op) => self.operator(op)?,
                Inst::Ret { level, pars } => {
                    self.ret(level, pars)?;
                    if self.pc == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn value_op(&mut self, op: ValueOp, v: i64) -> Result<(), RuntimeError> {
        match op {
            ValueOp::Lit => self.push(Value::Int(v))?,
            ValueOp::Ict => {
                let top = self
                    .top
                    .checked_add_signed(v as isize)
                    .ok_or(RuntimeError::StackOverflow)?;
                if top > STACK_SIZE {
                    return Err(RuntimeError::StackOverflow);
                }
                self.top = top;
            }
            ValueOp::Jmp => self.pc = self.target(v)?,
            ValueOp::Jpc => {
                if self.pop()?.is_zero() {
                    self.pc = self.target(v)?;
                }
            }
        }
        Ok(())
    }

    fn ref_op(&mut self, op: RefOp, addr: RelAddr) -> Result<(), RuntimeError> {
        match op {
            RefOp::Lod => {
                let value = self.stack[self.slot(addr)?];
                self.push(value)?;
            }
            RefOp::Sto => {
                let value = self.pop()?;
                let slot = self.slot(addr)?;
                self.stack[slot] = value;
            }
            RefOp::Cal => {
                let level = addr.level + 1;
                if level >= MAX_LEVEL {
                    return Err(RuntimeError::NestingTooDeep);
                }
                let base = self.top;
                self.push(Value::Int(self.display[level] as i64))?;
                self.push(Value::Int(self.pc as i64))?;
                self.display[level] = base;
                self.pc = self.target(addr.offset)?;
            }
        }
        Ok(())
    }

    /// Tear down the frame at `level`: cut the stack back to the frame
    /// base, restore the display slot and return address from the
    /// header, drop the caller's `pars` argument slots, and push the
    /// result back for the caller.
    fn ret(&mut self, level: usize, pars: usize) -> Result<(), RuntimeError> {
        let result = self.pop()?;
        let base = *self
            .display
            .get(level)
            .ok_or(RuntimeError::NestingTooDeep)?;
        if base + 1 >= STACK_SIZE {
            return Err(RuntimeError::CorruptFrame(base));
        }
        let Value::Int(saved) = self.stack[base] else {
            return Err(RuntimeError::CorruptFrame(base));
        };
        let Value::Int(ret_pc) = self.stack[base + 1] else {
            return Err(RuntimeError::CorruptFrame(base + 1));
        };
        self.display[level] =
            usize::try_from(saved).map_err(|_| RuntimeError::CorruptFrame(base))?;
        self.pc = usize::try_from(ret_pc).map_err(|_| RuntimeError::CorruptFrame(base + 1))?;
        self.top = base
            .checked_sub(pars)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.push(result)
    }

    fn operator(&mut self, op: Operator) -> Result<(), RuntimeError> {
        match op {
            Operator::Neg => {
                let value = self.pop()?;
                self.push(value.neg())?;
            }
            Operator::Add => {
                let (a, b) = self.pop2()?;
                self.push(a.add(b))?;
            }
            Operator::Sub => {
                let (a, b) = self.pop2()?;
                self.push(a.sub(b))?;
            }
            Operator::Mul => {
                let (a, b) = self.pop2()?;
                self.push(a.mul(b))?;
            }
            Operator::Div => {
                let (a, b) = self.pop2()?;
                let quotient = a.div(b)?;
                self.push(quotient)?;
            }
            Operator::Odd => {
                let value = self.pop()?;
                self.push(value.odd())?;
            }
            Operator::Eq => self.comparison(|ord| ord == Ordering::Equal)?,
            Operator::NotEq => self.comparison(|ord| ord != Ordering::Equal)?,
            Operator::Less => self.comparison(|ord| ord == Ordering::Less)?,
            Operator::Greater => self.comparison(|ord| ord == Ordering::Greater)?,
            Operator::LessEq => self.comparison(|ord| ord != Ordering::Greater)?,
            Operator::GreaterEq => self.comparison(|ord| ord != Ordering::Less)?,
            Operator::Write => {
                let value = self.pop()?;
                write!(self.out, "{value}")?;
            }
            Operator::WriteLn => writeln!(self.out)?,
        }
        Ok(())
    }

    fn comparison(&mut self, truth: impl FnOnce(Ordering) -> bool) -> Result<(), RuntimeError> {
        let (a, b) = self.pop2()?;
        let holds = a.compare(b).is_some_and(truth);
        self.push(Value::Int(holds as i64))
    }

    /// Maps a `(level, offset)` pair to an absolute stack slot through
    /// the display.
    fn slot(&self, addr: RelAddr) -> Result<usize, RuntimeError> {
        let base = *self
            .display
            .get(addr.level)
            .ok_or(RuntimeError::NestingTooDeep)? as i64;
        let slot = base + addr.offset;
        usize::try_from(slot)
            .ok()
            .filter(|&slot| slot < STACK_SIZE)
            .ok_or(RuntimeError::AddressOutOfRange(slot))
    }

    fn target(&self, v: i64) -> Result<usize, RuntimeError> {
        usize::try_from(v)
            .ok()
            .filter(|&target| target < self.code.len())
            .ok_or(RuntimeError::BadJumpTarget(v))
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.top >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.top] = value;
        self.top += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.top = self
            .top
            .checked_sub(1)
            .ok_or(RuntimeError::StackUnderflow)?;
        Ok(self.stack[self.top])
    }

    fn pop2(&mut self) -> Result<(Value, Value), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    fn lit(v: i64) -> Inst {
        Inst::Value {
            op: ValueOp::Lit,
            v,
        }
    }

    fn ict(v: i64) -> Inst {
        Inst::Value {
            op: ValueOp::Ict,
            v,
        }
    }

    fn opr(op: Operator) -> Inst {
        Inst::Op(op)
    }

    fn ret(level: usize, pars: usize) -> Inst {
        Inst::Ret { level, pars }
    }

    fn run(code: &[Inst]) -> Result<String, RuntimeError> {
        let mut out = Vec::new();
        execute(code, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn literal_write_halt() {
        let out = run(&[ict(2), lit(5), opr(Operator::Write), ret(0, 0)]).unwrap();
        check!(out == "5");
    }

    #[test]
    fn division_writes_the_floating_quotient() {
        let out = run(&[
            ict(2),
            lit(7),
            lit(2),
            opr(Operator::Div),
            opr(Operator::Write),
            ret(0, 0),
        ])
        .unwrap();
        check!(out == "3.5");
    }

    #[test]
    fn comparisons_produce_truth_cells() {
        let out = run(&[
            ict(2),
            lit(1),
            lit(2),
            opr(Operator::Less),
            opr(Operator::Write),
            lit(1),
            lit(2),
            opr(Operator::GreaterEq),
            opr(Operator::Write),
            ret(0, 0),
        ])
        .unwrap();
        check!(out == "10");
    }

    #[test]
    fn conditional_jump_takes_the_zero_branch() {
        // jpc skips the write because the popped condition is 0
        let out = run(&[
            ict(2),
            lit(0),
            Inst::Value {
                op: ValueOp::Jpc,
                v: 5,
            },
            lit(9),
            opr(Operator::Write),
            ret(0, 0),
        ])
        .unwrap();
        check!(out == "");
    }

    #[test]
    fn writeln_emits_a_bare_newline() {
        let out = run(&[ict(2), opr(Operator::WriteLn), ret(0, 0)]).unwrap();
        check!(out == "\n");
    }

    #[test]
    fn call_and_return_rebuild_the_caller_frame() {
        // main pushes 4 and 7, calls a two-parameter body that adds its
        // arguments from offsets -2 and -1, and writes the result
        let code = [
            Inst::Value {
                op: ValueOp::Jmp,
                v: 8,
            },
            // callee, entry 1
            ict(2),
            Inst::Ref {
                op: RefOp::Lod,
                addr: RelAddr {
                    level: 1,
                    offset: -2,
                },
            },
            Inst::Ref {
                op: RefOp::Lod,
                addr: RelAddr {
                    level: 1,
                    offset: -1,
                },
            },
            opr(Operator::Add),
            ret(1, 2),
            lit(0), // unreachable padding
            lit(0),
            // main, entry 8
            ict(2),
            lit(4),
            lit(7),
            Inst::Ref {
                op: RefOp::Cal,
                addr: RelAddr {
                    level: 0,
                    offset: 1,
                },
            },
            opr(Operator::Write),
            ret(0, 0),
        ];
        check!(run(&code).unwrap() == "11");
    }

    #[test]
    fn stack_underflow_is_fatal() {
        check!(matches!(
            run(&[opr(Operator::Add)]),
            Err(RuntimeError::StackUnderflow)
        ));
    }

    #[test]
    fn stack_overflow_is_fatal() {
        check!(matches!(
            run(&[ict(STACK_SIZE as i64 + 1)]),
            Err(RuntimeError::StackOverflow)
        ));
    }

    #[test]
    fn nesting_past_the_display_is_fatal() {
        let code = [Inst::Ref {
            op: RefOp::Cal,
            addr: RelAddr {
                level: MAX_LEVEL,
                offset: 0,
            },
        }];
        check!(matches!(run(&code), Err(RuntimeError::NestingTooDeep)));
    }

    #[test]
    fn jump_out_of_range_is_fatal() {
        check!(matches!(
            run(&[Inst::Value {
                op: ValueOp::Jmp,
                v: 99,
            }]),
            Err(RuntimeError::BadJumpTarget(99)),
        ));
    }

    #[test]
    fn out_of_range_address_is_fatal() {
        let code = [
            ict(2),
            Inst::Ref {
                op: RefOp::Lod,
                addr: RelAddr {
                    level: 0,
                    offset: -5,
                },
            },
        ];
        check!(matches!(run(&code), Err(RuntimeError::AddressOutOfRange(-5))));
    }
}
