use crate::mach::{Instruction, Opcode};

/// One parsed element of an assembly listing.
#[derive(Debug, Clone, PartialEq)]
pub enum AsmToken {
    /// `name:` marks the next instruction.
    Label(String),
    /// An instruction with its operand fully decoded.
    Instruction(Instruction),
    /// A SHORT operand naming a label, resolved once every label is known.
    Jump(Opcode, String),
    /// `.entry name`
    Entry(String),
    /// `.static cells`
    Static(usize),
}

impl std::fmt::Display for AsmToken {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AsmToken::Label(name) => write!(f, "{}:", name),
            AsmToken::Instruction(inst) => write!(f, "    {}", inst),
            AsmToken::Jump(op, label) => write!(f, "    {} {}", op, label),
            AsmToken::Entry(label) => write!(f, ".entry {}", label),
            AsmToken::Static(n) => write!(f, ".static {}", n),
        }
    }
}
