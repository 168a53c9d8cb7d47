//! Stack-machine execution of a finalized instruction sequence.
//!
//! The runtime needs nothing from compilation except the instructions
//! themselves; every name has already been resolved to a relative
//! address. Faults are fatal, never recovered.

use core::cmp::Ordering;
use core::fmt;

pub mod interpreter;

pub use interpreter::{execute, Machine};

/// Operand-stack capacity, in cells. Exceeding it is a fault, not a
/// resizing event.
pub const STACK_SIZE: usize = 2000;

/// Display capacity, one base slot per supported nesting level.
pub const MAX_LEVEL: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("operand stack overflow")]
    StackOverflow,
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("storage address {0} out of range")]
    AddressOutOfRange(i64),
    #[error("call nesting exceeds {MAX_LEVEL} levels")]
    NestingTooDeep,
    #[error("jump target {0} out of range")]
    BadJumpTarget(i64),
    #[error("corrupt frame header at stack slot {0}")]
    CorruptFrame(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One flat numeric stack cell. Division always produces a `Real`; all
/// other arithmetic stays in `Int` until a `Real` operand shows up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
}

impl Value {
    fn as_real(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Real(v) => v,
        }
    }

    fn as_int(self) -> i64 {
        match self {
            Value::Int(v) => v,
            Value::Real(v) => v as i64,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Value::Int(v) => v == 0,
            Value::Real(v) => v == 0.0,
        }
    }

    pub fn neg(self) -> Value {
        match self {
            Value::Int(v) => Value::Int(v.wrapping_neg()),
            Value::Real(v) => Value::Real(-v),
        }
    }

    pub fn add(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
            _ => Value::Real(self.as_real() + rhs.as_real()),
        }
    }

    pub fn sub(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(b)),
            _ => Value::Real(self.as_real() - rhs.as_real()),
        }
    }

    pub fn mul(self, rhs: Value) -> Value {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(b)),
            _ => Value::Real(self.as_real() * rhs.as_real()),
        }
    }

    /// Floating quotient regardless of operand kinds: 7 / 2 is 3.5.
    pub fn div(self, rhs: Value) -> Result<Value, RuntimeError> {
        if rhs.is_zero() {
            return Err(RuntimeError::DivisionByZero);
        }
        Ok(Value::Real(self.as_real() / rhs.as_real()))
    }

    /// The value modulo 2, as an `Int` truth cell.
    pub fn odd(self) -> Value {
        Value::Int(self.as_int().rem_euclid(2))
    }

    /// `None` only when a NaN sneaks into a comparison; the comparison
    /// then counts as false.
    pub fn compare(self, rhs: Value) -> Option<Ordering> {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(&b)),
            _ => self.as_real().partial_cmp(&rhs.as_real()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn integer_arithmetic_stays_integral() {
        check!(Value::Int(4).add(Value::Int(7)) == Value::Int(11));
        check!(Value::Int(3).sub(Value::Int(5)) == Value::Int(-2));
        check!(Value::Int(6).mul(Value::Int(7)) == Value::Int(42));
    }

    #[test]
    fn division_always_yields_a_real() {
        check!(Value::Int(7).div(Value::Int(2)).unwrap() == Value::Real(3.5));
        check!(Value::Int(6).div(Value::Int(2)).unwrap() == Value::Real(3.0));
    }

    #[test]
    fn division_by_zero_faults() {
        check!(matches!(
            Value::Int(1).div(Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        ));
    }

    #[test]
    fn reals_are_contagious() {
        check!(Value::Real(1.5).add(Value::Int(1)) == Value::Real(2.5));
        check!(Value::Int(2).mul(Value::Real(0.5)) == Value::Real(1.0));
    }

    #[test]
    fn odd_is_modulo_two() {
        check!(Value::Int(7).odd() == Value::Int(1));
        check!(Value::Int(6).odd() == Value::Int(0));
        check!(Value::Int(-3).odd() == Value::Int(1));
    }

    #[test]
    fn display_prints_plain_decimals() {
        check!(Value::Int(5).to_string() == "5");
        check!(Value::Int(-5).to_string() == "-5");
        check!(Value::Real(3.5).to_string() == "3.5");
    }
}
