use crate::mach::{Opcode, Program, Register, Syscall};

/// ## Built-in functions
///
/// Arguments are compiled first, left to right; [`Builtin::emit`] then
/// appends the code that turns them into the result.

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin {
    Abs,
    Atn,
    Cos,
    Exp,
    Inkey,
    Int,
    Key,
    Len,
    Log,
    Peek,
    Point,
    Rnd,
    Sgn,
    Sin,
    Sqr,
    Tan,
}

impl Builtin {
    pub const ALL: &'static [Builtin] = &[
        Builtin::Abs,
        Builtin::Atn,
        Builtin::Cos,
        Builtin::Exp,
        Builtin::Inkey,
        Builtin::Int,
        Builtin::Key,
        Builtin::Len,
        Builtin::Log,
        Builtin::Peek,
        Builtin::Point,
        Builtin::Rnd,
        Builtin::Sgn,
        Builtin::Sin,
        Builtin::Sqr,
        Builtin::Tan,
    ];

    pub fn name(self) -> &'static str {
        use Builtin::*;
        match self {
            Abs => "ABS",
            Atn => "ATN",
            Cos => "COS",
            Exp => "EXP",
            Inkey => "INKEY",
            Int => "INT",
            Key => "KEY",
            Len => "LEN",
            Log => "LOG",
            Peek => "PEEK",
            Point => "POINT",
            Rnd => "RND",
            Sgn => "SGN",
            Sin => "SIN",
            Sqr => "SQR",
            Tan => "TAN",
        }
    }

    pub fn arity(self) -> usize {
        use Builtin::*;
        match self {
            Inkey => 0,
            Point => 2,
            _ => 1,
        }
    }

    pub fn emit(self, program: &mut Program) {
        use Builtin::*;
        match self {
            Abs => {
                program.add(Opcode::Abs);
            }
            Atn => {
                program.add(Opcode::Atn);
            }
            Cos => {
                program.add(Opcode::Cos);
            }
            Exp => {
                program.add_float(Opcode::PushF, std::f32::consts::E);
                program.add(Opcode::Swap);
                program.add(Opcode::Exp);
            }
            Inkey => {
                program.add_syscall(Syscall::ReadKey, Register::A);
                program.add(Opcode::PushA);
            }
            Int => {
                program.add(Opcode::Int);
            }
            Key => {
                program.add(Opcode::PopA);
                program.add_syscall(Syscall::KeySet, Register::A);
                program.add(Opcode::PushA);
            }
            Len => {
                program.add(Opcode::Len);
            }
            Log => {
                program.add(Opcode::Log);
            }
            Peek => {
                program.add(Opcode::Ptr);
                program.add(Opcode::PopIdx);
                program.add(Opcode::LoadI);
            }
            Point => {
                program.add_syscall(Syscall::GetPixel, Register::A);
                program.add(Opcode::PushA);
            }
            Rnd => {
                program.add(Opcode::Rnd);
            }
            Sgn => {
                program.add_short(Opcode::PushI, 0);
                program.add(Opcode::Cmp);
            }
            Sin => {
                program.add(Opcode::Sin);
            }
            Sqr => {
                program.add(Opcode::Sqr);
            }
            Tan => {
                program.add(Opcode::Tan);
            }
        }
    }
}
