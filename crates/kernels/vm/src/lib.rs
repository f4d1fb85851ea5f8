//! Jac VM - Stack-based bytecode virtual machine
//!
//! Compiles expression subtrees of the parse tree to flat bytecode and runs
//! it against a [`MachineContext`] supplied by the interpreter.

pub mod bytecode;
pub mod compiler;
pub mod disasm;
mod error;
pub mod executor;

pub use bytecode::{seal, unseal, Decoder, Instr, Op, FORMAT_VERSION, MAGIC};
pub use compiler::{compile_tree, CodeGenerator};
pub use disasm::disassemble;
pub use error::MachineError;
pub use executor::{execute, MachineContext, Operand, Place};
