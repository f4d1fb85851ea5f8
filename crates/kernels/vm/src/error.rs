use thiserror::Error;

use jac_foundation::ValueError;

/// Errors raised while decoding or executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MachineError {
    #[error("bytecode header missing or unsupported")]
    BadHeader,

    #[error("unknown opcode 0x{op:02x} at {at}")]
    UnknownOpcode { op: u8, at: usize },

    #[error("truncated instruction at {at}")]
    Truncated { at: usize },

    #[error("invalid operand at {at}: {reason}")]
    InvalidOperand { at: usize, reason: String },

    #[error("stack underflow at {at}")]
    StackUnderflow { at: usize },

    /// Assignment to an operand that does not name a variable.
    #[error("cannot assign to a {0} value")]
    NotAssignable(&'static str),

    #[error(transparent)]
    Value(#[from] ValueError),
}
