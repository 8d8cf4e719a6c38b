//! # BASIC VM
//!
//! A small virtual machine for 8-bit style programs. Every memory cell
//! and stack slot holds a tagged value: unset, a 16-bit integer, a
//! 32-bit float or a 21-bit pointer.
//!
//! Programs reach the machine two ways. The [`lang`] module compiles
//! line numbered BASIC and the [`asm`] module assembles a textual
//! listing. Both produce a [`mach::Program`] that a [`mach::Runtime`]
//! executes in cycle-budgeted slices against a host [`mach::Sysio`].

pub mod asm;
pub mod lang;
pub mod mach;
