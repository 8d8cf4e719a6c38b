//! # BASIC
//!
//! Run BASIC, assembly or program images on the tagged-value machine.
//!

mod term;

fn main() {
    term::main()
}
