/*!
## Rust Machine Module

This Rust module is the bytecode container and the virtual machine
that runs it.

*/

pub type Address = usize;

mod opcode;
mod operation;
mod program;
mod runtime;
mod stack;
mod sysio;
mod val;

pub use opcode::Opcode;
pub use opcode::OperandKind;
pub use opcode::Register;
pub use opcode::Syscall;
pub use operation::Operation;
pub use program::Instruction;
pub use program::Operand;
pub use program::Program;
pub use runtime::Config;
pub use runtime::Interrupt;
pub use runtime::Runtime;
pub use stack::Stack;
pub use sysio::Debugger;
pub use sysio::Snapshot;
pub use sysio::Sysio;
pub use val::Val;
pub use val::MAX_POINTER;
