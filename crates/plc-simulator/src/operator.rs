//! Named binary operators for `operation` simulations.

use plc_common::error::PlcError;

/// A binary operator applied left-to-right across an operand list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Floor division.
    FloorDiv,
    /// Modulo.
    Mod,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Left shift.
    Lshift,
    /// Right shift.
    Rshift,
}

impl Operator {
    /// Parse an operator by its configured name.
    ///
    /// # Errors
    ///
    /// Returns [`PlcError::Config`] if `name` is not one of the fixed
    /// enumeration of supported operators.
    pub fn parse(name: &str) -> Result<Self, PlcError> {
        match name {
            "add" => Ok(Operator::Add),
            "sub" => Ok(Operator::Sub),
            "mul" => Ok(Operator::Mul),
            "floordiv" => Ok(Operator::FloorDiv),
            "mod" => Ok(Operator::Mod),
            "and" | "and_" => Ok(Operator::And),
            "or" | "or_" => Ok(Operator::Or),
            "xor" => Ok(Operator::Xor),
            "lshift" => Ok(Operator::Lshift),
            "rshift" => Ok(Operator::Rshift),
            other => Err(PlcError::Config(format!("unknown operator: {other}"))),
        }
    }

    /// Apply the operator to an accumulator and the next operand.
    ///
    /// Division-like operators (`floordiv`, `mod`) by zero saturate to
    /// zero rather than panicking; a simulation tick should never take
    /// down its task over a configuration edge case like a zero operand.
    #[must_use]
    pub fn apply(self, acc: i128, rhs: i128) -> i128 {
        match self {
            Operator::Add => acc.wrapping_add(rhs),
            Operator::Sub => acc.wrapping_sub(rhs),
            Operator::Mul => acc.wrapping_mul(rhs),
            Operator::FloorDiv => {
                if rhs == 0 {
                    0
                } else {
                    acc.div_euclid(rhs)
                }
            }
            Operator::Mod => {
                if rhs == 0 {
                    0
                } else {
                    acc.rem_euclid(rhs)
                }
            }
            Operator::And => acc & rhs,
            Operator::Or => acc | rhs,
            Operator::Xor => acc ^ rhs,
            Operator::Lshift => acc.wrapping_shl(rhs as u32),
            Operator::Rshift => acc.wrapping_shr(rhs as u32),
        }
    }
}
