/*!
# BASIC Language Module

Lexical analysis and single pass compilation of BASIC into
[`Program`](crate::mach::Program) bytecode.

*/

#[macro_use]
mod error;
mod builtin;
mod compile;
mod env;
mod lex;
mod token;

pub use builtin::Builtin;
pub use compile::{compile, DATA_BASE, DATA_CURSOR, FP_CELL};
pub use env::{Environment, Slot};
pub use error::Error;
pub use error::ErrorCode;
pub use lex::lex;
pub use token::{Operator, Token, Word};
