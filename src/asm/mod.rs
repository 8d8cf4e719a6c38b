/*!
# Assembler Module

A line oriented assembler for the machine's instruction set.

```text
; comments run to the end of the line
.static 4            ; cells reserved below the heap
.entry start
start:  PUSHI 10
        STORE 0
loop:   LOAD 0
        POPA
        SYSCALL PRINT, A
        LOAD 0
        PUSHI 1
        SUB
        DUP
        STORE 0
        JNZ loop
        HALT
```

SHORT operands are signed decimals or label names. VALUE operands are
`42`, `1.5`, `@100` or `UNSET`. SYSCALL takes a call name or number and
a register. STRING operands are double quoted with backslash escapes.

*/

mod parse;
mod token;

pub use parse::parse_line;
pub use token::AsmToken;

use crate::error;
use crate::lang::Error;
use crate::mach::{Instruction, Operand, OperandKind, Program};

type Result<T> = std::result::Result<T, Error>;

/// Parse a whole listing. Errors carry the 1-based source line.
pub fn parse(source: &str) -> Result<Vec<AsmToken>> {
    let mut tokens = vec![];
    for (index, line) in source.lines().enumerate() {
        let parsed = parse_line(line).map_err(|e| e.in_line_number(index + 1))?;
        tokens.extend(parsed);
    }
    Ok(tokens)
}

/// Lay tokens out into a [`Program`], resolving labels in a second pass.
/// Without `.entry` execution starts at offset 0.
pub fn assemble(tokens: &[AsmToken]) -> Result<Program> {
    let mut program = Program::new();
    let mut jumps = vec![];
    let mut entry = None;
    for token in tokens {
        match token {
            AsmToken::Label(name) => {
                if program.labels().contains_key(name) {
                    return Err(error!(SyntaxError; format!("DUPLICATE LABEL {}", name)));
                }
                let here = program.len();
                program.add_label(name.clone(), here);
            }
            AsmToken::Instruction(inst) => add(&mut program, inst)?,
            AsmToken::Jump(opcode, label) => {
                if opcode.operand() != OperandKind::Short {
                    return Err(error!(SyntaxError; format!("{} TAKES NO LABEL", opcode)));
                }
                let site = program.add_short(*opcode, 0);
                jumps.push((site, label));
            }
            AsmToken::Entry(label) => entry = Some(label),
            AsmToken::Static(n) => program.set_static_size(*n),
        }
    }
    for (site, label) in jumps {
        let target = program.get_label(label)?;
        if target > u16::MAX as usize {
            return Err(error!(OutOfMemory; format!("LABEL {} OUT OF RANGE", label)));
        }
        program.update_short(site, target as u16 as i16)?;
    }
    if let Some(label) = entry {
        let target = program.get_label(label)?;
        program.set_entry(target);
    }
    Ok(program)
}

fn add(program: &mut Program, inst: &Instruction) -> Result<()> {
    let op = inst.opcode;
    match (op.operand(), &inst.operand) {
        (OperandKind::None, Operand::None) => program.add(op),
        (OperandKind::Short, Operand::Short(n)) => program.add_short(op, *n),
        (OperandKind::Float, Operand::Float(n)) => program.add_float(op, *n),
        (OperandKind::Pointer, Operand::Pointer(p)) => program.add_pointer(op, *p),
        (OperandKind::Value, Operand::Value(v)) => program.add_value(op, *v),
        (OperandKind::Syscall, Operand::Syscall(call, reg)) => program.add_syscall(*call, *reg),
        (OperandKind::String, Operand::String(s)) => program.add_string(op, s),
        _ => return Err(error!(SyntaxError; format!("BAD OPERAND FOR {}", op))),
    };
    Ok(())
}
