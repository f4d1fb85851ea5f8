//! Bytecode executor
//!
//! Stack-based VM that executes compiled bytecode. Variables live outside
//! the machine: loads and stores go through a [`MachineContext`].

use tracing::trace;

use jac_foundation::{ElementId, IncOp, LogicalOp, UnaryOp, Value};

use crate::bytecode::{unseal, Decoder, Instr};
use crate::MachineError;

/// Storage location an operand was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    /// Local variable of the running frame.
    Local(String),
    /// Sentinel-level global.
    Global(String),
    /// Context field of a graph element.
    Field { owner: ElementId, name: String },
    /// Item of a list or dict held in another place.
    Index { base: Box<Place>, key: Value },
}

/// A stack entry: a value, plus where it lives when it names a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub value: Value,
    pub place: Option<Place>,
}

impl Operand {
    /// A temporary with no backing storage.
    pub fn value(value: Value) -> Self {
        Self { value, place: None }
    }

    pub fn at(value: Value, place: Place) -> Self {
        Self {
            value,
            place: Some(place),
        }
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

/// Variable access for running code.
pub trait MachineContext {
    type Error: From<MachineError>;

    /// Resolve `name`; with `create`, a missing variable becomes a null local.
    fn load_variable(&mut self, name: &str, create: bool) -> Result<Operand, Self::Error>;

    /// Store `src` into `dest` and return the updated destination.
    fn assign(&mut self, dest: Operand, src: Operand) -> Result<Operand, Self::Error>;

    /// Copy the context fields of `src` onto the element or dict in `dest`.
    fn copy_fields(&mut self, dest: Operand, src: Operand) -> Result<Operand, Self::Error>;

    /// `dest <op>= src`.
    fn increment(&mut self, dest: Operand, src: Operand, op: IncOp) -> Result<Operand, Self::Error> {
        let updated = op.apply(&dest.value, &src.value).map_err(MachineError::from)?;
        self.assign(dest, Operand::value(updated))
    }

    /// Source location marker; `file` is `None` when unchanged.
    fn set_location(&mut self, _line: u32, _file: Option<&str>) {}
}

fn pop(stack: &mut Vec<Operand>, at: usize) -> Result<Operand, MachineError> {
    stack.pop().ok_or(MachineError::StackUnderflow { at })
}

/// Run sealed code. Returns the operand left on top of the stack, if any.
pub fn execute<C: MachineContext + ?Sized>(code: &[u8], ctx: &mut C) -> Result<Option<Operand>, C::Error> {
    let body = unseal(code)?;
    let mut stack: Vec<Operand> = Vec::with_capacity(16);

    for item in Decoder::new(body) {
        let (at, instr) = item?;
        trace!(at, ?instr, depth = stack.len(), "exec");
        match instr {
            Instr::LoadConst(value) => {
                stack.push(Operand::value(value));
            }

            Instr::LoadVar(name) => {
                stack.push(ctx.load_variable(&name, false)?);
            }

            Instr::CreateVar(name) => {
                stack.push(ctx.load_variable(&name, true)?);
            }

            Instr::Binary(op) => {
                let lhs = pop(&mut stack, at)?;
                let rhs = pop(&mut stack, at)?;
                let value = op.apply(&lhs.value, &rhs.value).map_err(MachineError::from)?;
                stack.push(Operand::value(value));
            }

            Instr::Negate => {
                let operand = pop(&mut stack, at)?;
                let value = UnaryOp::Neg.apply(&operand.value).map_err(MachineError::from)?;
                stack.push(Operand::value(value));
            }

            Instr::Not => {
                let operand = pop(&mut stack, at)?;
                stack.push(Operand::value(Value::Bool(!operand.value.is_truthy())));
            }

            Instr::Compare(op) => {
                let lhs = pop(&mut stack, at)?;
                let rhs = pop(&mut stack, at)?;
                let result = op.apply(&lhs.value, &rhs.value).map_err(MachineError::from)?;
                stack.push(Operand::value(Value::Bool(result)));
            }

            Instr::Logical(op) => {
                let lhs = pop(&mut stack, at)?.value;
                let rhs = pop(&mut stack, at)?.value;
                let result = match (op, lhs.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => lhs,
                    _ => rhs,
                };
                stack.push(Operand::value(result));
            }

            Instr::Assign => {
                let dest = pop(&mut stack, at)?;
                let src = pop(&mut stack, at)?;
                stack.push(ctx.assign(dest, src)?);
            }

            Instr::CopyFields => {
                let dest = pop(&mut stack, at)?;
                let src = pop(&mut stack, at)?;
                stack.push(ctx.copy_fields(dest, src)?);
            }

            Instr::Increment(op) => {
                let dest = pop(&mut stack, at)?;
                let src = pop(&mut stack, at)?;
                stack.push(ctx.increment(dest, src, op)?);
            }

            Instr::DebugInfo { line, file } => {
                ctx.set_location(line, file.as_deref());
            }
        }
    }

    Ok(stack.pop())
}
